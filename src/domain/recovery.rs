// Recovery domain models - typed aggregate rows and the metrics derived from them
use super::filter::{DateRange, FilterError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Issue category derived from the record's error category/subcategory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum IssueCategory {
    #[serde(rename = "Inaccurate Order")]
    InaccurateOrder,
    #[serde(rename = "Cancelled Order")]
    CancelledOrder,
    #[serde(rename = "Other")]
    Other,
}

impl IssueCategory {
    pub const ALL: [IssueCategory; 3] = [
        IssueCategory::InaccurateOrder,
        IssueCategory::CancelledOrder,
        IssueCategory::Other,
    ];

    /// Label as produced by the warehouse CASE expression
    pub fn label(self) -> &'static str {
        match self {
            IssueCategory::InaccurateOrder => "Inaccurate Order",
            IssueCategory::CancelledOrder => "Cancelled Order",
            IssueCategory::Other => "Other",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            IssueCategory::InaccurateOrder => "inaccurate",
            IssueCategory::CancelledOrder => "cancelled",
            IssueCategory::Other => "other",
        }
    }
}

impl FromStr for IssueCategory {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        IssueCategory::ALL
            .into_iter()
            .find(|c| c.slug().eq_ignore_ascii_case(wanted) || c.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| FilterError::UnknownIssueType(s.to_string()))
    }
}

/// `100 * numerator / denominator`, undefined for an empty denominator
pub fn ratio_pct(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator > 0.0 {
        Some(100.0 * numerator / denominator)
    } else {
        None
    }
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyPerformance {
    pub month: NaiveDate,
    pub chain: String,
    pub platform: String,
    pub active_locations: i64,
    pub total_orders: i64,
    pub disputes_won: i64,
    pub potential: f64,
    pub recovered: f64,
}

impl MonthlyPerformance {
    pub fn recovery_rate(&self) -> Option<f64> {
        ratio_pct(self.recovered, self.potential)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformIssuePerformance {
    pub platform: String,
    pub issue_category: IssueCategory,
    pub total_orders: i64,
    pub disputes_won: i64,
    pub potential: f64,
    pub recovered: f64,
}

impl PlatformIssuePerformance {
    pub fn recovery_rate(&self) -> Option<f64> {
        ratio_pct(self.recovered, self.potential)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRecovery {
    pub date: NaiveDate,
    pub orders: i64,
    pub disputes_won: i64,
    pub recovered: f64,
}

impl DailyRecovery {
    pub fn win_rate(&self) -> Option<f64> {
        ratio_pct(self.disputes_won as f64, self.orders as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationRecovery {
    pub slug: String,
    pub chain: String,
    pub recovered: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainPerformance {
    pub chain: String,
    pub locations: i64,
    pub total_orders: i64,
    pub disputes_won: i64,
    pub potential: f64,
    pub recovered: f64,
}

impl ChainPerformance {
    pub fn recovered_per_location(&self) -> Option<f64> {
        if self.locations > 0 {
            Some(self.recovered / self.locations as f64)
        } else {
            None
        }
    }

    pub fn recovery_rate(&self) -> Option<f64> {
        ratio_pct(self.recovered, self.potential)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusBreakdown {
    pub status: String,
    pub amount: f64,
    pub count: i64,
}

/// Recovery per error subcategory, e.g. "Missing Item"
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubcategoryRecovery {
    pub subcategory: String,
    pub locations: i64,
    pub disputes: i64,
    pub potential: f64,
    pub recovered: f64,
}

impl SubcategoryRecovery {
    pub fn recovery_rate(&self) -> Option<f64> {
        ratio_pct(self.recovered, self.potential)
    }
}

/// A chain and platform whose recent recovery rate fell well below its
/// trailing twelve-month average
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainAttention {
    pub chain: String,
    pub platform: String,
    pub baseline_rate: f64,
    pub recent_rate: f64,
    pub months: i64,
    pub potential: f64,
}

impl ChainAttention {
    /// Relative decline of the recent rate against the baseline, in percent
    pub fn decline_pct(&self) -> Option<f64> {
        ratio_pct(self.baseline_rate - self.recent_rate, self.baseline_rate)
    }
}

/// Upper bounds of the order value bands; the last band is open ended
pub const ORDER_VALUE_EDGES: [f64; 7] = [20.0, 40.0, 60.0, 80.0, 100.0, 150.0, 200.0];

/// Zero-based band index for an order subtotal. Bounds are inclusive.
pub fn order_value_band(value: f64) -> usize {
    ORDER_VALUE_EDGES
        .iter()
        .position(|edge| value <= *edge)
        .unwrap_or(ORDER_VALUE_EDGES.len())
}

/// Lower and upper bound of a band, `None` for the open top band
pub fn order_value_bounds(band: usize) -> (f64, Option<f64>) {
    let lower = if band == 0 {
        0.0
    } else {
        ORDER_VALUE_EDGES[(band - 1).min(ORDER_VALUE_EDGES.len() - 1)]
    };
    (lower, ORDER_VALUE_EDGES.get(band).copied())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderValueBand {
    pub band: usize,
    pub disputes: i64,
    pub potential: f64,
    pub recovered: f64,
    pub avg_order_value: Option<f64>,
}

impl OrderValueBand {
    pub fn recovery_rate(&self) -> Option<f64> {
        ratio_pct(self.recovered, self.potential)
    }
}

/// Running sums over any of the aggregate row types
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub orders: i64,
    pub disputes_won: i64,
    pub potential: f64,
    pub recovered: f64,
}

impl Totals {
    pub fn add(&mut self, orders: i64, disputes_won: i64, potential: f64, recovered: f64) {
        self.orders += orders;
        self.disputes_won += disputes_won;
        self.potential += potential;
        self.recovered += recovered;
    }

    pub fn of_monthly<'a>(rows: impl IntoIterator<Item = &'a MonthlyPerformance>) -> Self {
        let mut totals = Self::default();
        for row in rows {
            totals.add(row.total_orders, row.disputes_won, row.potential, row.recovered);
        }
        totals
    }

    pub fn of_platform_issue<'a>(rows: impl IntoIterator<Item = &'a PlatformIssuePerformance>) -> Self {
        let mut totals = Self::default();
        for row in rows {
            totals.add(row.total_orders, row.disputes_won, row.potential, row.recovered);
        }
        totals
    }

    pub fn unrecovered(&self) -> f64 {
        self.potential - self.recovered
    }

    pub fn recovery_rate(&self) -> Option<f64> {
        ratio_pct(self.recovered, self.potential)
    }

    pub fn win_rate(&self) -> Option<f64> {
        ratio_pct(self.disputes_won as f64, self.orders as f64)
    }
}

/// Trailing moving average; undefined until the window is full
pub fn moving_average(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    let mut averages = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (idx, value) in values.iter().enumerate() {
        sum += value;
        if idx >= window {
            sum -= values[idx - window];
        }
        if idx + 1 >= window {
            averages.push(Some(sum / window as f64));
        } else {
            averages.push(None);
        }
    }
    averages
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

/// Compares the latest week against days 24-30 back. `daily` must be in
/// ascending date order; needs more than 30 days of history.
pub fn trend_direction(daily: &[DailyRecovery]) -> Option<TrendDirection> {
    if daily.len() <= 30 {
        return None;
    }
    let newest_first: Vec<f64> = daily.iter().rev().map(|d| d.recovered).collect();
    let mean = |slice: &[f64]| slice.iter().sum::<f64>() / slice.len() as f64;
    let recent = mean(&newest_first[..7]);
    let older = mean(&newest_first[23..30]);

    if recent > older * 1.1 {
        Some(TrendDirection::Improving)
    } else if recent < older * 0.9 {
        Some(TrendDirection::Declining)
    } else {
        Some(TrendDirection::Stable)
    }
}

/// Scales an amount observed over `range` to a 30-day month
pub fn monthly_equivalent(amount: f64, range: &DateRange) -> f64 {
    amount * 30.0 / range.days() as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tier {
    Star,
    Profitable,
    BreakEven,
    Unprofitable,
}

impl Tier {
    pub fn label(self) -> &'static str {
        match self {
            Tier::Star => "Star",
            Tier::Profitable => "Profitable",
            Tier::BreakEven => "Break-even",
            Tier::Unprofitable => "Unprofitable",
        }
    }
}

fn default_fee_per_location() -> f64 {
    150.0
}

fn default_top_threshold() -> f64 {
    500.0
}

fn default_star_threshold() -> f64 {
    300.0
}

fn default_breakeven_threshold() -> f64 {
    100.0
}

fn default_top_chain_min_orders() -> i64 {
    100
}

fn default_top_chain_limit() -> usize {
    10
}

fn default_cohort_chains() -> usize {
    10
}

fn default_attention_decline_pct() -> f64 {
    20.0
}

fn default_attention_critical_pct() -> f64 {
    30.0
}

fn default_attention_min_potential() -> f64 {
    1000.0
}

/// Pricing and tiering rules used to judge location profitability.
/// A location is profitable once its monthly recovery covers the fee.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BusinessRules {
    #[serde(default = "default_fee_per_location")]
    pub fee_per_location: f64,
    #[serde(default = "default_top_threshold")]
    pub top_threshold: f64,
    #[serde(default = "default_star_threshold")]
    pub star_threshold: f64,
    #[serde(default = "default_breakeven_threshold")]
    pub breakeven_threshold: f64,
    #[serde(default = "default_top_chain_min_orders")]
    pub top_chain_min_orders: i64,
    #[serde(default = "default_top_chain_limit")]
    pub top_chain_limit: usize,
    #[serde(default = "default_cohort_chains")]
    pub cohort_chains: usize,
    /// Relative decline that puts a chain on the attention list
    #[serde(default = "default_attention_decline_pct")]
    pub attention_decline_pct: f64,
    #[serde(default = "default_attention_critical_pct")]
    pub attention_critical_pct: f64,
    /// Twelve-month potential a chain needs before it is judged
    #[serde(default = "default_attention_min_potential")]
    pub attention_min_potential: f64,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            fee_per_location: default_fee_per_location(),
            top_threshold: default_top_threshold(),
            star_threshold: default_star_threshold(),
            breakeven_threshold: default_breakeven_threshold(),
            top_chain_min_orders: default_top_chain_min_orders(),
            top_chain_limit: default_top_chain_limit(),
            cohort_chains: default_cohort_chains(),
            attention_decline_pct: default_attention_decline_pct(),
            attention_critical_pct: default_attention_critical_pct(),
            attention_min_potential: default_attention_min_potential(),
        }
    }
}

impl BusinessRules {
    pub fn tier(&self, monthly_per_location: f64) -> Tier {
        if monthly_per_location >= self.star_threshold {
            Tier::Star
        } else if monthly_per_location >= self.fee_per_location {
            Tier::Profitable
        } else if monthly_per_location >= self.breakeven_threshold {
            Tier::BreakEven
        } else {
            Tier::Unprofitable
        }
    }

    /// Location counts per monthly-recovery band, highest band first
    pub fn distribution(&self, monthly_recoveries: &[f64]) -> Vec<(String, i64)> {
        let bands = [
            (format!("${:.0}+", self.top_threshold), self.top_threshold, f64::INFINITY),
            (
                format!("${:.0}-{:.0}", self.star_threshold, self.top_threshold),
                self.star_threshold,
                self.top_threshold,
            ),
            (
                format!("${:.0}-{:.0}", self.fee_per_location, self.star_threshold),
                self.fee_per_location,
                self.star_threshold,
            ),
            (
                format!("${:.0}-{:.0}", self.breakeven_threshold, self.fee_per_location),
                self.breakeven_threshold,
                self.fee_per_location,
            ),
            (
                format!("<${:.0}", self.breakeven_threshold),
                f64::NEG_INFINITY,
                self.breakeven_threshold,
            ),
        ];

        bands
            .into_iter()
            .map(|(label, low, high)| {
                let count = monthly_recoveries
                    .iter()
                    .filter(|v| **v >= low && **v < high)
                    .count() as i64;
                (label, count)
            })
            .collect()
    }
}

/// Location-level rollup used by the executive summary
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSummary {
    pub total_locations: i64,
    pub profitable_locations: i64,
    pub profitable_pct: Option<f64>,
    pub avg_monthly_recovery: Option<f64>,
    pub monthly_recoveries: Vec<f64>,
}

impl LocationSummary {
    pub fn from_rows(rows: &[LocationRecovery], range: &DateRange, rules: &BusinessRules) -> Self {
        let monthly_recoveries: Vec<f64> = rows
            .iter()
            .map(|row| monthly_equivalent(row.recovered, range))
            .collect();
        let total_locations = monthly_recoveries.len() as i64;
        let profitable_locations = monthly_recoveries
            .iter()
            .filter(|v| **v >= rules.fee_per_location)
            .count() as i64;
        let avg_monthly_recovery = if total_locations > 0 {
            Some(monthly_recoveries.iter().sum::<f64>() / total_locations as f64)
        } else {
            None
        };

        Self {
            total_locations,
            profitable_locations,
            profitable_pct: ratio_pct(profitable_locations as f64, total_locations as f64),
            avg_monthly_recovery,
            monthly_recoveries,
        }
    }
}
