// Page composition - each page is an ordered list of panels, each panel a pure
// function of the filter set and one dataset's rows
mod executive;
mod financial;
mod operations;
mod trends;

use crate::application::recovery_repository::{Fetched, PageData};
use crate::domain::dashboard::{Dataset, Page, PageView, Panel};
use crate::domain::filter::FilterSet;
use crate::domain::format::Formatter;
use crate::domain::recovery::BusinessRules;
use crate::domain::widget::{Notice, Tone, Widget};

/// Inputs every panel renderer may read besides its rows
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub filter: &'a FilterSet,
    pub rules: &'a BusinessRules,
    pub formatter: &'a Formatter,
}

impl RenderContext<'_> {
    pub(crate) fn money(&self, value: f64) -> String {
        self.formatter.currency(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelKind {
    RecoveryKpis,
    LocationHealth,
    MonthlyTrend,
    PlatformPerformance,
    TopChains,
    IssueMatrix,
    DailyOperations,
    PlatformWinRate,
    PlatformValue,
    StatusBreakdown,
    SubcategoryRecovery,
    ChainAttention,
    FinancialSummary,
    MonthlyFinancials,
    PlatformFinancials,
    OrderValueWinRate,
    RecoveryTrend,
    CohortPerformance,
    WinRateTrend,
}

impl PanelKind {
    pub fn id(self) -> &'static str {
        match self {
            PanelKind::RecoveryKpis => "recovery-kpis",
            PanelKind::LocationHealth => "location-health",
            PanelKind::MonthlyTrend => "monthly-trend",
            PanelKind::PlatformPerformance => "platform-performance",
            PanelKind::TopChains => "top-chains",
            PanelKind::IssueMatrix => "issue-matrix",
            PanelKind::DailyOperations => "daily-operations",
            PanelKind::PlatformWinRate => "platform-win-rate",
            PanelKind::PlatformValue => "platform-value",
            PanelKind::StatusBreakdown => "status-breakdown",
            PanelKind::SubcategoryRecovery => "subcategory-recovery",
            PanelKind::ChainAttention => "chains-attention",
            PanelKind::FinancialSummary => "financial-summary",
            PanelKind::MonthlyFinancials => "monthly-financials",
            PanelKind::PlatformFinancials => "platform-financials",
            PanelKind::OrderValueWinRate => "order-value-win-rate",
            PanelKind::RecoveryTrend => "recovery-trend",
            PanelKind::CohortPerformance => "cohort-performance",
            PanelKind::WinRateTrend => "win-rate-trend",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            PanelKind::RecoveryKpis => "Key Performance Indicators",
            PanelKind::LocationHealth => "Location Profitability",
            PanelKind::MonthlyTrend => "Monthly Recovery Trend",
            PanelKind::PlatformPerformance => "Platform Performance",
            PanelKind::TopChains => "Top Performing Chains",
            PanelKind::IssueMatrix => "Platform & Issue Type Performance",
            PanelKind::DailyOperations => "Daily Operations Trend",
            PanelKind::PlatformWinRate => "Win Rate by Platform",
            PanelKind::PlatformValue => "Recovery Value by Platform",
            PanelKind::StatusBreakdown => "Dispute Status Breakdown",
            PanelKind::SubcategoryRecovery => "Recovery by Error Subcategory",
            PanelKind::ChainAttention => "Chains Requiring Attention",
            PanelKind::FinancialSummary => "Financial Summary",
            PanelKind::MonthlyFinancials => "Monthly Financial Performance",
            PanelKind::PlatformFinancials => "Platform Financial Contribution",
            PanelKind::OrderValueWinRate => "Win Rate by Order Value",
            PanelKind::RecoveryTrend => "Recovery Trend Analysis",
            PanelKind::CohortPerformance => "Monthly Cohort Performance",
            PanelKind::WinRateTrend => "Win Rate Trend",
        }
    }

    pub fn dataset(self) -> Dataset {
        match self {
            PanelKind::RecoveryKpis
            | PanelKind::MonthlyTrend
            | PanelKind::PlatformPerformance
            | PanelKind::FinancialSummary
            | PanelKind::MonthlyFinancials
            | PanelKind::PlatformFinancials
            | PanelKind::CohortPerformance => Dataset::Monthly,
            PanelKind::LocationHealth => Dataset::Locations,
            PanelKind::TopChains => Dataset::Chains,
            PanelKind::IssueMatrix | PanelKind::PlatformWinRate | PanelKind::PlatformValue => {
                Dataset::PlatformIssue
            }
            PanelKind::DailyOperations | PanelKind::RecoveryTrend | PanelKind::WinRateTrend => {
                Dataset::Daily
            }
            PanelKind::StatusBreakdown => Dataset::Status,
            PanelKind::SubcategoryRecovery => Dataset::Subcategories,
            PanelKind::ChainAttention => Dataset::ChainAttention,
            PanelKind::OrderValueWinRate => Dataset::OrderValue,
        }
    }
}

pub fn layout(page: Page) -> &'static [PanelKind] {
    match page {
        Page::ExecutiveSummary => &[
            PanelKind::RecoveryKpis,
            PanelKind::LocationHealth,
            PanelKind::MonthlyTrend,
            PanelKind::PlatformPerformance,
            PanelKind::TopChains,
        ],
        Page::Operations => &[
            PanelKind::IssueMatrix,
            PanelKind::DailyOperations,
            PanelKind::PlatformWinRate,
            PanelKind::PlatformValue,
            PanelKind::StatusBreakdown,
            PanelKind::SubcategoryRecovery,
            PanelKind::ChainAttention,
        ],
        Page::FinancialImpact => &[
            PanelKind::FinancialSummary,
            PanelKind::MonthlyFinancials,
            PanelKind::PlatformFinancials,
            PanelKind::OrderValueWinRate,
        ],
        Page::TrendsAnalytics => &[
            PanelKind::RecoveryTrend,
            PanelKind::CohortPerformance,
            PanelKind::WinRateTrend,
        ],
    }
}

/// Distinct datasets a page needs, in first-use order
pub fn datasets(page: Page) -> Vec<Dataset> {
    let mut needed = Vec::new();
    for panel in layout(page) {
        let dataset = panel.dataset();
        if !needed.contains(&dataset) {
            needed.push(dataset);
        }
    }
    needed
}

pub fn render(page: Page, ctx: &RenderContext<'_>, data: &PageData) -> PageView {
    let panels = layout(page)
        .iter()
        .map(|kind| render_panel(*kind, ctx, data))
        .collect();
    PageView::new(page, ctx.filter.clone(), panels)
}

pub fn render_panel(kind: PanelKind, ctx: &RenderContext<'_>, data: &PageData) -> Panel {
    let widgets = match kind {
        PanelKind::RecoveryKpis => from_rows(&data.monthly, executive::recovery_kpis),
        PanelKind::LocationHealth => from_rows(&data.locations, |rows| executive::location_health(ctx, rows)),
        PanelKind::MonthlyTrend => from_rows(&data.monthly, executive::monthly_trend),
        PanelKind::PlatformPerformance => from_rows(&data.monthly, executive::platform_performance),
        PanelKind::TopChains => from_rows(&data.chains, |rows| executive::top_chains(ctx, rows)),
        PanelKind::IssueMatrix => from_rows(&data.platform_issue, operations::issue_matrix),
        PanelKind::DailyOperations => from_rows(&data.daily, operations::daily_operations),
        PanelKind::PlatformWinRate => from_rows(&data.platform_issue, operations::platform_win_rate),
        PanelKind::PlatformValue => from_rows(&data.platform_issue, operations::platform_value),
        PanelKind::StatusBreakdown => from_rows(&data.status, operations::status_breakdown),
        PanelKind::SubcategoryRecovery => from_rows(&data.subcategories, operations::subcategory_recovery),
        PanelKind::ChainAttention => from_rows(&data.attention, |rows| operations::chains_attention(ctx, rows)),
        PanelKind::FinancialSummary => from_rows(&data.monthly, financial::financial_summary),
        PanelKind::MonthlyFinancials => from_rows(&data.monthly, |rows| financial::monthly_financials(ctx, rows)),
        PanelKind::PlatformFinancials => from_rows(&data.monthly, |rows| financial::platform_financials(ctx, rows)),
        PanelKind::OrderValueWinRate => from_rows(&data.order_value, |rows| financial::order_value_win_rate(ctx, rows)),
        PanelKind::RecoveryTrend => from_rows(&data.daily, trends::recovery_trend),
        PanelKind::CohortPerformance => from_rows(&data.monthly, |rows| trends::cohort_performance(ctx, rows)),
        PanelKind::WinRateTrend => from_rows(&data.daily, trends::win_rate_trend),
    };
    Panel::new(kind.id(), kind.title(), widgets)
}

fn from_rows<T>(slot: &Option<Fetched<T>>, render: impl FnOnce(&[T]) -> Vec<Widget>) -> Vec<Widget> {
    match slot {
        Some(Ok(rows)) => render(rows),
        Some(Err(reason)) => vec![Widget::unavailable(reason.clone())],
        None => vec![Widget::unavailable("query was not run")],
    }
}

pub(crate) fn no_data_notice() -> Widget {
    Widget::Notice(Notice::new(Tone::Info, "No data for the selected filters."))
}

pub(crate) fn month_label(month: chrono::NaiveDate) -> String {
    month.format("%Y-%m").to_string()
}

pub(crate) fn day_label(day: chrono::NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::memory_repository::{MemoryRepository, RecoveryRecord, january_records};
    use crate::domain::filter::DateRange;
    use crate::domain::recovery::round_to;
    use crate::domain::widget::{KpiTile, Widget};
    use std::sync::LazyLock;

    static FORMATTER: LazyLock<Formatter> = LazyLock::new(Formatter::default);

    fn january() -> FilterSet {
        FilterSet::new(DateRange::parse("2024-01-01", "2024-01-31").unwrap())
    }

    fn ctx<'a>(filter: &'a FilterSet, rules: &'a BusinessRules) -> RenderContext<'a> {
        RenderContext {
            filter,
            rules,
            formatter: &FORMATTER,
        }
    }

    async fn load(repository: &MemoryRepository, page: Page, filter: &FilterSet) -> PageData {
        PageData::fetch_all(repository, &datasets(page), filter).await
    }

    fn kpi<'a>(view: &'a PageView, panel: &str, id: &str) -> &'a KpiTile {
        view.panel(panel)
            .unwrap()
            .widgets
            .iter()
            .find_map(|w| match w {
                Widget::Kpi(tile) if tile.id == id => Some(tile),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_datasets_are_deduplicated() {
        assert_eq!(
            datasets(Page::ExecutiveSummary),
            vec![Dataset::Monthly, Dataset::Locations, Dataset::Chains]
        );
        assert_eq!(datasets(Page::FinancialImpact), vec![Dataset::Monthly, Dataset::OrderValue]);
        assert_eq!(
            datasets(Page::Operations),
            vec![
                Dataset::PlatformIssue,
                Dataset::Daily,
                Dataset::Status,
                Dataset::Subcategories,
                Dataset::ChainAttention
            ]
        );
    }

    #[tokio::test]
    async fn test_total_recovered_matches_warehouse_sum() {
        let repository = MemoryRepository::new(january_records());
        let filter = january().with_platforms(["all"]);
        let rules = BusinessRules::default();
        let data = load(&repository, Page::ExecutiveSummary, &filter).await;
        let view = render(Page::ExecutiveSummary, &ctx(&filter, &rules), &data);

        let expected: f64 = january_records()
            .iter()
            .filter(|r| filter.range.contains(r.date))
            .map(|r| r.recovered)
            .sum();
        let tile = kpi(&view, "recovery-kpis", "total-recovered");
        assert_eq!(tile.value, Some(round_to(expected, 2)));
        assert_eq!(tile.value, Some(563.2));
    }

    #[tokio::test]
    async fn test_empty_results_render_empty_state() {
        let repository = MemoryRepository::new(Vec::new());
        let filter = january();
        let rules = BusinessRules::default();

        for page in [Page::Operations, Page::FinancialImpact] {
            let data = load(&repository, page, &filter).await;
            let view = render(page, &ctx(&filter, &rules), &data);
            assert_eq!(view.panels.len(), layout(page).len());
            for panel in &view.panels {
                assert!(!panel.widgets.is_empty(), "panel {} rendered nothing", panel.id);
                assert!(
                    !panel.widgets.iter().any(|w| matches!(w, Widget::Unavailable(_))),
                    "panel {} treated empty rows as a failure",
                    panel.id
                );
            }
        }
    }

    #[tokio::test]
    async fn test_failed_dataset_only_blanks_its_panels() {
        let repository = MemoryRepository::new(january_records()).failing(Dataset::Locations);
        let filter = january();
        let rules = BusinessRules::default();
        let data = load(&repository, Page::ExecutiveSummary, &filter).await;
        let view = render(Page::ExecutiveSummary, &ctx(&filter, &rules), &data);

        let health = view.panel("location-health").unwrap();
        assert!(matches!(&health.widgets[..], [Widget::Unavailable(u)] if u.reason.contains("unreachable")));
        let kpis = view.panel("recovery-kpis").unwrap();
        assert!(kpis.widgets.iter().all(|w| matches!(w, Widget::Kpi(_))));
    }

    #[tokio::test]
    async fn test_rendering_is_idempotent() {
        let repository = MemoryRepository::new(january_records());
        let filter = january().with_platforms(["DoorDash"]);
        let rules = BusinessRules::default();

        for page in Page::ALL {
            let first = render(page, &ctx(&filter, &rules), &load(&repository, page, &filter).await);
            let second = render(page, &ctx(&filter, &rules), &load(&repository, page, &filter).await);
            assert_eq!(first, second);
        }
    }

    #[tokio::test]
    async fn test_platform_filter_narrows_totals() {
        let records = vec![
            RecoveryRecord::new("2024-01-03", "DoorDash", "alpha-1", 100.0),
            RecoveryRecord::new("2024-01-04", "UberEats", "alpha-1", 40.0),
        ];
        let repository = MemoryRepository::new(records);
        let rules = BusinessRules::default();

        let all = january();
        let only_uber = january().with_platforms(["UberEats"]);
        let all_view = render(
            Page::FinancialImpact,
            &ctx(&all, &rules),
            &load(&repository, Page::FinancialImpact, &all).await,
        );
        let uber_view = render(
            Page::FinancialImpact,
            &ctx(&only_uber, &rules),
            &load(&repository, Page::FinancialImpact, &only_uber).await,
        );

        assert_eq!(kpi(&all_view, "financial-summary", "total-recovered").value, Some(140.0));
        assert_eq!(kpi(&uber_view, "financial-summary", "total-recovered").value, Some(40.0));
    }
}
