// In-memory repository over raw records, used by page and service tests
use crate::application::recovery_repository::RecoveryRepository;
use crate::domain::dashboard::Dataset;
use crate::domain::filter::{DateRange, FilterSet};
use crate::domain::recovery::{
    BusinessRules, ChainAttention, ChainPerformance, DailyRecovery, IssueCategory, LocationRecovery,
    MonthlyPerformance, OrderValueBand, PlatformIssuePerformance, StatusBreakdown, SubcategoryRecovery,
    order_value_band,
};
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
pub struct RecoveryRecord {
    pub date: NaiveDate,
    pub platform: String,
    pub slug: String,
    pub chain: String,
    pub issue: IssueCategory,
    pub subcategory: String,
    pub status: String,
    pub order_value: f64,
    pub orders: i64,
    pub disputes_won: i64,
    pub potential: f64,
    pub recovered: f64,
}

impl RecoveryRecord {
    pub fn new(date: &str, platform: &str, slug: &str, recovered: f64) -> Self {
        Self {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            platform: platform.to_string(),
            slug: slug.to_string(),
            chain: format!("Chain {}", slug.chars().next().unwrap_or('X').to_ascii_uppercase()),
            issue: IssueCategory::InaccurateOrder,
            subcategory: "Missing Item".to_string(),
            status: "ACCEPTED".to_string(),
            order_value: 30.0,
            orders: 10,
            disputes_won: 4,
            potential: recovered * 2.0,
            recovered,
        }
    }

    pub fn issue(mut self, issue: IssueCategory) -> Self {
        self.issue = issue;
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn chain(mut self, chain: &str) -> Self {
        self.chain = chain.to_string();
        self
    }

    pub fn subcategory(mut self, subcategory: &str) -> Self {
        self.subcategory = subcategory.to_string();
        self
    }

    pub fn order_value(mut self, order_value: f64) -> Self {
        self.order_value = order_value;
        self
    }

    pub fn potential(mut self, potential: f64) -> Self {
        self.potential = potential;
        self
    }
}

#[derive(Default)]
pub struct MemoryRepository {
    records: Vec<RecoveryRecord>,
    failing: HashSet<Dataset>,
    queries: AtomicUsize,
}

impl MemoryRepository {
    pub fn new(records: Vec<RecoveryRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn failing(mut self, dataset: Dataset) -> Self {
        self.failing.insert(dataset);
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn matching(&self, dataset: Dataset, filter: &FilterSet) -> anyhow::Result<Vec<&RecoveryRecord>> {
        self.matching_in(dataset, filter, filter.range)
    }

    fn matching_in(
        &self,
        dataset: Dataset,
        filter: &FilterSet,
        window: DateRange,
    ) -> anyhow::Result<Vec<&RecoveryRecord>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&dataset) {
            anyhow::bail!("warehouse unreachable");
        }
        Ok(self
            .records
            .iter()
            .filter(|r| window.contains(r.date))
            .filter(|r| filter.all_platforms() || filter.platforms.contains(&r.platform))
            .filter(|r| filter.all_chains() || filter.chains.contains(&r.chain))
            .filter(|r| filter.all_issue_categories() || filter.issue_categories.contains(&r.issue))
            .collect())
    }
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap()
}

#[derive(Default)]
struct Acc {
    orders: i64,
    won: i64,
    potential: f64,
    recovered: f64,
    slugs: BTreeSet<String>,
}

impl Acc {
    fn add(&mut self, record: &RecoveryRecord) {
        self.orders += record.orders;
        self.won += record.disputes_won;
        self.potential += record.potential;
        self.recovered += record.recovered;
        self.slugs.insert(record.slug.clone());
    }
}

#[async_trait]
impl RecoveryRepository for MemoryRepository {
    async fn list_platforms(&self) -> anyhow::Result<Vec<String>> {
        let platforms: BTreeSet<String> = self.records.iter().map(|r| r.platform.clone()).collect();
        Ok(platforms.into_iter().collect())
    }

    async fn list_chains(&self) -> anyhow::Result<Vec<String>> {
        let chains: BTreeSet<String> = self.records.iter().map(|r| r.chain.clone()).collect();
        Ok(chains.into_iter().collect())
    }

    async fn monthly_performance(&self, filter: &FilterSet) -> anyhow::Result<Vec<MonthlyPerformance>> {
        let mut groups: BTreeMap<(NaiveDate, String, String), Acc> = BTreeMap::new();
        for record in self.matching(Dataset::Monthly, filter)? {
            let month = month_start(record.date);
            groups
                .entry((month, record.chain.clone(), record.platform.clone()))
                .or_default()
                .add(record);
        }
        let mut rows: Vec<MonthlyPerformance> = groups
            .into_iter()
            .map(|((month, chain, platform), acc)| MonthlyPerformance {
                month,
                chain,
                platform,
                active_locations: acc.slugs.len() as i64,
                total_orders: acc.orders,
                disputes_won: acc.won,
                potential: acc.potential,
                recovered: acc.recovered,
            })
            .collect();
        rows.sort_by(|a, b| {
            a.month
                .cmp(&b.month)
                .then(b.recovered.total_cmp(&a.recovered))
                .then(a.chain.cmp(&b.chain))
                .then(a.platform.cmp(&b.platform))
        });
        Ok(rows)
    }

    async fn platform_issue_performance(&self, filter: &FilterSet) -> anyhow::Result<Vec<PlatformIssuePerformance>> {
        let mut groups: BTreeMap<(String, IssueCategory), Acc> = BTreeMap::new();
        for record in self.matching(Dataset::PlatformIssue, filter)? {
            groups
                .entry((record.platform.clone(), record.issue))
                .or_default()
                .add(record);
        }
        let mut rows: Vec<PlatformIssuePerformance> = groups
            .into_iter()
            .filter(|(_, acc)| acc.orders > 0)
            .map(|((platform, issue_category), acc)| PlatformIssuePerformance {
                platform,
                issue_category,
                total_orders: acc.orders,
                disputes_won: acc.won,
                potential: acc.potential,
                recovered: acc.recovered,
            })
            .collect();
        rows.sort_by(|a, b| b.recovered.total_cmp(&a.recovered));
        Ok(rows)
    }

    async fn daily_recovery(&self, filter: &FilterSet) -> anyhow::Result<Vec<DailyRecovery>> {
        let mut groups: BTreeMap<NaiveDate, Acc> = BTreeMap::new();
        for record in self.matching(Dataset::Daily, filter)? {
            groups.entry(record.date).or_default().add(record);
        }
        Ok(groups
            .into_iter()
            .map(|(date, acc)| DailyRecovery {
                date,
                orders: acc.orders,
                disputes_won: acc.won,
                recovered: acc.recovered,
            })
            .collect())
    }

    async fn location_recovery(&self, filter: &FilterSet) -> anyhow::Result<Vec<LocationRecovery>> {
        let mut groups: BTreeMap<(String, String), f64> = BTreeMap::new();
        for record in self.matching(Dataset::Locations, filter)? {
            *groups
                .entry((record.slug.clone(), record.chain.clone()))
                .or_default() += record.recovered;
        }
        let mut rows: Vec<LocationRecovery> = groups
            .into_iter()
            .map(|((slug, chain), recovered)| LocationRecovery { slug, chain, recovered })
            .collect();
        rows.sort_by(|a, b| b.recovered.total_cmp(&a.recovered).then(a.slug.cmp(&b.slug)));
        Ok(rows)
    }

    async fn chain_performance(&self, filter: &FilterSet) -> anyhow::Result<Vec<ChainPerformance>> {
        let mut groups: BTreeMap<String, Acc> = BTreeMap::new();
        for record in self.matching(Dataset::Chains, filter)? {
            groups.entry(record.chain.clone()).or_default().add(record);
        }
        let mut rows: Vec<ChainPerformance> = groups
            .into_iter()
            .map(|(chain, acc)| ChainPerformance {
                chain,
                locations: acc.slugs.len() as i64,
                total_orders: acc.orders,
                disputes_won: acc.won,
                potential: acc.potential,
                recovered: acc.recovered,
            })
            .collect();
        rows.sort_by(|a, b| b.recovered.total_cmp(&a.recovered).then(a.chain.cmp(&b.chain)));
        Ok(rows)
    }

    async fn status_breakdown(&self, filter: &FilterSet) -> anyhow::Result<Vec<StatusBreakdown>> {
        let mut groups: BTreeMap<String, (f64, i64)> = BTreeMap::new();
        for record in self.matching(Dataset::Status, filter)? {
            let entry = groups.entry(record.status.clone()).or_default();
            entry.0 += record.potential;
            entry.1 += 1;
        }
        let mut rows: Vec<StatusBreakdown> = groups
            .into_iter()
            .map(|(status, (amount, count))| StatusBreakdown { status, amount, count })
            .collect();
        rows.sort_by(|a, b| b.amount.total_cmp(&a.amount).then(a.status.cmp(&b.status)));
        Ok(rows)
    }

    async fn subcategory_recovery(&self, filter: &FilterSet) -> anyhow::Result<Vec<SubcategoryRecovery>> {
        let mut groups: BTreeMap<String, (Acc, i64)> = BTreeMap::new();
        for record in self.matching(Dataset::Subcategories, filter)? {
            let entry = groups.entry(record.subcategory.clone()).or_default();
            entry.0.add(record);
            entry.1 += 1;
        }
        let mut rows: Vec<SubcategoryRecovery> = groups
            .into_iter()
            .filter(|(_, (acc, _))| acc.potential > 0.0)
            .map(|(subcategory, (acc, disputes))| SubcategoryRecovery {
                subcategory,
                locations: acc.slugs.len() as i64,
                disputes,
                potential: acc.potential,
                recovered: acc.recovered,
            })
            .collect();
        rows.sort_by(|a, b| b.potential.total_cmp(&a.potential).then(a.subcategory.cmp(&b.subcategory)));
        Ok(rows)
    }

    async fn chain_attention(&self, filter: &FilterSet) -> anyhow::Result<Vec<ChainAttention>> {
        let end = filter.range.end();
        let window = DateRange::new(end - Duration::days(365), end)?;
        let recent_from = end - Duration::days(90);
        let rules = BusinessRules::default();

        let mut groups: BTreeMap<(String, String), BTreeMap<NaiveDate, (f64, f64)>> = BTreeMap::new();
        for record in self.matching_in(Dataset::ChainAttention, filter, window)? {
            let month = groups
                .entry((record.chain.clone(), record.platform.clone()))
                .or_default()
                .entry(month_start(record.date))
                .or_default();
            month.0 += record.potential;
            month.1 += record.recovered;
        }

        let mean = |rates: &[f64]| rates.iter().sum::<f64>() / rates.len() as f64;
        let mut rows = Vec::new();
        for ((chain, platform), months) in groups {
            let rated: Vec<(NaiveDate, f64, f64)> = months
                .into_iter()
                .filter(|(_, (potential, _))| *potential > 0.0)
                .map(|(month, (potential, recovered))| (month, potential, 100.0 * recovered / potential))
                .collect();
            let all: Vec<f64> = rated.iter().map(|(_, _, rate)| *rate).collect();
            let recent: Vec<f64> = rated
                .iter()
                .filter(|(month, _, _)| *month >= recent_from)
                .map(|(_, _, rate)| *rate)
                .collect();
            if all.len() < 3 || recent.is_empty() {
                continue;
            }
            let row = ChainAttention {
                chain,
                platform,
                baseline_rate: mean(&all[..]),
                recent_rate: mean(&recent[..]),
                months: all.len() as i64,
                potential: rated.iter().map(|(_, potential, _)| potential).sum(),
            };
            let declined = row
                .decline_pct()
                .is_some_and(|pct| pct >= rules.attention_decline_pct);
            if row.recent_rate > 0.0 && row.potential > rules.attention_min_potential && declined {
                rows.push(row);
            }
        }
        rows.sort_by(|a, b| {
            let decline = |r: &ChainAttention| (r.baseline_rate - r.recent_rate) / r.baseline_rate;
            decline(b)
                .total_cmp(&decline(a))
                .then(a.chain.cmp(&b.chain))
                .then(a.platform.cmp(&b.platform))
        });
        Ok(rows)
    }

    async fn order_value_bands(&self, filter: &FilterSet) -> anyhow::Result<Vec<OrderValueBand>> {
        let mut groups: BTreeMap<usize, (Acc, i64, f64)> = BTreeMap::new();
        for record in self.matching(Dataset::OrderValue, filter)? {
            let entry = groups.entry(order_value_band(record.order_value)).or_default();
            entry.0.add(record);
            entry.1 += 1;
            entry.2 += record.order_value;
        }
        Ok(groups
            .into_iter()
            .filter(|(_, (acc, _, _))| acc.potential > 0.0)
            .map(|(band, (acc, disputes, order_total))| OrderValueBand {
                band,
                disputes,
                potential: acc.potential,
                recovered: acc.recovered,
                avg_order_value: Some(order_total / disputes as f64),
            })
            .collect())
    }
}

/// January 2024 across two platforms, plus a December record outside the month
pub fn january_records() -> Vec<RecoveryRecord> {
    vec![
        RecoveryRecord::new("2023-12-31", "DoorDash", "alpha-1", 999.99),
        RecoveryRecord::new("2024-01-01", "DoorDash", "alpha-1", 120.105),
        RecoveryRecord::new("2024-01-02", "UberEats", "alpha-2", 75.5),
        RecoveryRecord::new("2024-01-10", "DoorDash", "bravo-1", 310.25)
            .issue(IssueCategory::CancelledOrder)
            .status("DENIED"),
        RecoveryRecord::new("2024-01-15", "UberEats", "bravo-1", 45.333),
        RecoveryRecord::new("2024-01-31", "Grubhub", "charlie-1", 12.01).issue(IssueCategory::Other),
        RecoveryRecord::new("2024-02-01", "DoorDash", "alpha-1", 500.0),
    ]
}
