// Catalog service - Use case for listing filter options
use crate::application::recovery_repository::RecoveryRepository;
use crate::domain::recovery::IssueCategory;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOption {
    pub value: String,
    pub label: String,
}

#[derive(Clone)]
pub struct CatalogService {
    repository: Arc<dyn RecoveryRepository>,
}

impl CatalogService {
    pub fn new(repository: Arc<dyn RecoveryRepository>) -> Self {
        Self { repository }
    }

    pub async fn list_platforms(&self) -> anyhow::Result<Vec<FilterOption>> {
        Ok(named_options(self.repository.list_platforms().await?))
    }

    pub async fn list_chains(&self) -> anyhow::Result<Vec<FilterOption>> {
        Ok(named_options(self.repository.list_chains().await?))
    }

    pub fn list_issue_types(&self) -> Vec<FilterOption> {
        IssueCategory::ALL
            .into_iter()
            .map(|c| FilterOption {
                value: c.slug().to_string(),
                label: c.label().to_string(),
            })
            .collect()
    }
}

fn named_options(names: Vec<String>) -> Vec<FilterOption> {
    names
        .into_iter()
        .map(|name| FilterOption {
            value: name.clone(),
            label: name,
        })
        .collect()
}
