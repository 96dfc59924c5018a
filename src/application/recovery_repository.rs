// Repository trait for recovery data access
use crate::domain::dashboard::Dataset;
use crate::domain::filter::FilterSet;
use crate::domain::recovery::{
    ChainAttention, ChainPerformance, DailyRecovery, LocationRecovery, MonthlyPerformance, OrderValueBand,
    PlatformIssuePerformance, StatusBreakdown, SubcategoryRecovery,
};
use async_trait::async_trait;

/// Given a filter set, return typed aggregate rows.
/// Every method only ever sees a validated filter (start <= end).
#[async_trait]
pub trait RecoveryRepository: Send + Sync {
    /// Distinct platforms present in the warehouse, for the filter form
    async fn list_platforms(&self) -> anyhow::Result<Vec<String>>;

    /// Distinct chains from the location mapping, for the filter form
    async fn list_chains(&self) -> anyhow::Result<Vec<String>>;

    /// Per month, chain and platform
    async fn monthly_performance(&self, filter: &FilterSet) -> anyhow::Result<Vec<MonthlyPerformance>>;

    /// Per platform and issue category, rows with orders only
    async fn platform_issue_performance(&self, filter: &FilterSet) -> anyhow::Result<Vec<PlatformIssuePerformance>>;

    /// One row per day with data, ascending
    async fn daily_recovery(&self, filter: &FilterSet) -> anyhow::Result<Vec<DailyRecovery>>;

    /// Total recovered per location over the whole range
    async fn location_recovery(&self, filter: &FilterSet) -> anyhow::Result<Vec<LocationRecovery>>;

    /// Per chain, highest recovery first
    async fn chain_performance(&self, filter: &FilterSet) -> anyhow::Result<Vec<ChainPerformance>>;

    async fn status_breakdown(&self, filter: &FilterSet) -> anyhow::Result<Vec<StatusBreakdown>>;

    /// Per error subcategory, largest potential first
    async fn subcategory_recovery(&self, filter: &FilterSet) -> anyhow::Result<Vec<SubcategoryRecovery>>;

    /// Chains whose last 90 days trail their twelve-month recovery rate.
    /// Looks back from the filter's end date and ignores its start date.
    async fn chain_attention(&self, filter: &FilterSet) -> anyhow::Result<Vec<ChainAttention>>;

    /// Per order value band, in band order
    async fn order_value_bands(&self, filter: &FilterSet) -> anyhow::Result<Vec<OrderValueBand>>;
}

/// Outcome of one dataset query; failures keep only their message
pub type Fetched<T> = Result<Vec<T>, String>;

/// Query results for a single render pass. `None` means the dataset
/// was not requested for this page.
#[derive(Debug, Clone, Default)]
pub struct PageData {
    pub monthly: Option<Fetched<MonthlyPerformance>>,
    pub platform_issue: Option<Fetched<PlatformIssuePerformance>>,
    pub daily: Option<Fetched<DailyRecovery>>,
    pub locations: Option<Fetched<LocationRecovery>>,
    pub chains: Option<Fetched<ChainPerformance>>,
    pub status: Option<Fetched<StatusBreakdown>>,
    pub subcategories: Option<Fetched<SubcategoryRecovery>>,
    pub attention: Option<Fetched<ChainAttention>>,
    pub order_value: Option<Fetched<OrderValueBand>>,
}

fn settle<T>(dataset: Dataset, result: anyhow::Result<Vec<T>>) -> Option<Fetched<T>> {
    match result {
        Ok(rows) => {
            tracing::debug!(?dataset, rows = rows.len(), "dataset loaded");
            Some(Ok(rows))
        }
        Err(e) => {
            tracing::error!(?dataset, error = %format!("{:#}", e), "dataset query failed");
            Some(Err(format!("{:#}", e)))
        }
    }
}

impl PageData {
    /// Run the query behind one dataset
    pub async fn fetch_one(repository: &dyn RecoveryRepository, dataset: Dataset, filter: &FilterSet) -> Self {
        let mut data = Self::default();
        match dataset {
            Dataset::Monthly => {
                data.monthly = settle(dataset, repository.monthly_performance(filter).await);
            }
            Dataset::PlatformIssue => {
                data.platform_issue = settle(dataset, repository.platform_issue_performance(filter).await);
            }
            Dataset::Daily => {
                data.daily = settle(dataset, repository.daily_recovery(filter).await);
            }
            Dataset::Locations => {
                data.locations = settle(dataset, repository.location_recovery(filter).await);
            }
            Dataset::Chains => {
                data.chains = settle(dataset, repository.chain_performance(filter).await);
            }
            Dataset::Status => {
                data.status = settle(dataset, repository.status_breakdown(filter).await);
            }
            Dataset::Subcategories => {
                data.subcategories = settle(dataset, repository.subcategory_recovery(filter).await);
            }
            Dataset::ChainAttention => {
                data.attention = settle(dataset, repository.chain_attention(filter).await);
            }
            Dataset::OrderValue => {
                data.order_value = settle(dataset, repository.order_value_bands(filter).await);
            }
        }
        data
    }

    /// Run several datasets concurrently and merge the results
    pub async fn fetch_all(repository: &dyn RecoveryRepository, datasets: &[Dataset], filter: &FilterSet) -> Self {
        let fetches = datasets
            .iter()
            .map(|dataset| Self::fetch_one(repository, *dataset, filter));
        futures::future::join_all(fetches)
            .await
            .into_iter()
            .fold(Self::default(), Self::merge)
    }

    fn merge(self, other: Self) -> Self {
        Self {
            monthly: self.monthly.or(other.monthly),
            platform_issue: self.platform_issue.or(other.platform_issue),
            daily: self.daily.or(other.daily),
            locations: self.locations.or(other.locations),
            chains: self.chains.or(other.chains),
            status: self.status.or(other.status),
            subcategories: self.subcategories.or(other.subcategories),
            attention: self.attention.or(other.attention),
            order_value: self.order_value.or(other.order_value),
        }
    }
}
