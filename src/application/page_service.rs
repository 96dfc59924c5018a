// Page service - Use case for rendering a whole page in one pass
use crate::application::pages::{self, RenderContext};
use crate::application::recovery_repository::{PageData, RecoveryRepository};
use crate::domain::dashboard::{Page, PageView};
use crate::domain::filter::FilterSet;
use crate::domain::format::Formatter;
use crate::domain::recovery::BusinessRules;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct PageService {
    repository: Arc<dyn RecoveryRepository>,
    rules: BusinessRules,
    formatter: Formatter,
}

impl PageService {
    pub fn new(repository: Arc<dyn RecoveryRepository>, rules: BusinessRules, formatter: Formatter) -> Self {
        Self {
            repository,
            rules,
            formatter,
        }
    }

    /// Query every dataset the page needs, then render all panels.
    /// Dataset failures end up as placeholders inside the view.
    pub async fn render_page(&self, page: Page, filter: &FilterSet) -> PageView {
        let started = Instant::now();
        let datasets = pages::datasets(page);
        let data = PageData::fetch_all(self.repository.as_ref(), &datasets, filter).await;

        let ctx = RenderContext {
            filter,
            rules: &self.rules,
            formatter: &self.formatter,
        };
        let view = pages::render(page, &ctx, &data);

        tracing::info!(
            page = page.slug(),
            range = %filter.range,
            datasets = datasets.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "page rendered"
        );
        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::memory_repository::{MemoryRepository, january_records};
    use crate::domain::filter::DateRange;

    #[tokio::test]
    async fn test_render_page_queries_each_dataset_once() {
        let repository = Arc::new(MemoryRepository::new(january_records()));
        let service = PageService::new(repository.clone(), BusinessRules::default(), Formatter::default());
        let filter = FilterSet::new(DateRange::parse("2024-01-01", "2024-01-31").unwrap());

        let view = service.render_page(Page::ExecutiveSummary, &filter).await;

        assert_eq!(view.title, "Executive Summary");
        assert_eq!(view.panels.len(), 5);
        assert_eq!(repository.query_count(), 3);
    }

    #[tokio::test]
    async fn test_each_page_load_reissues_queries() {
        let repository = Arc::new(MemoryRepository::new(january_records()));
        let service = PageService::new(repository.clone(), BusinessRules::default(), Formatter::default());
        let filter = FilterSet::new(DateRange::parse("2024-01-01", "2024-01-31").unwrap());

        service.render_page(Page::FinancialImpact, &filter).await;
        service.render_page(Page::FinancialImpact, &filter).await;

        // Monthly and order value bands, once per load
        assert_eq!(repository.query_count(), 4);
    }
}
