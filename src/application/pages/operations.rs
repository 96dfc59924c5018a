// Operations panels
use super::{RenderContext, day_label, no_data_notice};
use crate::domain::recovery::{
    ChainAttention, DailyRecovery, IssueCategory, PlatformIssuePerformance, StatusBreakdown, SubcategoryRecovery,
    Totals, moving_average, ratio_pct, round_to,
};
use crate::domain::widget::{
    ChartData, ChartKind, ChartPoint, HeatmapData, Notice, SeriesData, SeriesStyle, TableCell, TableData, Tone,
    Unit, Widget,
};
use std::collections::BTreeMap;

/// Cancelled-order recovery below this rate is not worth disputing
const CANCELLED_RECOVERY_FLOOR: f64 = 1.0;

fn by_platform(rows: &[PlatformIssuePerformance]) -> Vec<(&str, Totals)> {
    let mut grouped: BTreeMap<&str, Totals> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.platform.as_str()).or_default().add(
            row.total_orders,
            row.disputes_won,
            row.potential,
            row.recovered,
        );
    }
    grouped.into_iter().collect()
}

pub fn issue_matrix(rows: &[PlatformIssuePerformance]) -> Vec<Widget> {
    let mut platforms: Vec<String> = rows.iter().map(|r| r.platform.clone()).collect();
    platforms.sort();
    platforms.dedup();
    let categories: Vec<IssueCategory> = IssueCategory::ALL
        .into_iter()
        .filter(|c| rows.iter().any(|r| r.issue_category == *c))
        .collect();

    let cells = categories
        .iter()
        .map(|category| {
            platforms
                .iter()
                .map(|platform| {
                    rows.iter()
                        .find(|r| r.issue_category == *category && &r.platform == platform)
                        .and_then(|r| r.recovery_rate())
                })
                .collect()
        })
        .collect();

    let heatmap = HeatmapData {
        id: "issue-recovery-rate".to_string(),
        title: "Recovery Rate % by Platform and Issue Category".to_string(),
        unit: Unit::Percent,
        x_labels: platforms,
        y_labels: categories.iter().map(|c| c.label().to_string()).collect(),
        cells,
    };

    let mut widgets = vec![Widget::Heatmap(heatmap)];

    let rated: Vec<(&PlatformIssuePerformance, f64)> = rows
        .iter()
        .filter_map(|r| r.recovery_rate().map(|rate| (r, rate)))
        .collect();
    if rated.is_empty() {
        widgets.push(no_data_notice());
        return widgets;
    }

    if let Some((best, rate)) = rated.iter().max_by(|a, b| a.1.total_cmp(&b.1)) {
        widgets.push(Widget::Notice(Notice::new(
            Tone::Success,
            format!("Best: {} - {} ({:.1}%)", best.platform, best.issue_category.label(), rate),
        )));
    }
    if let Some((worst, rate)) = rated
        .iter()
        .filter(|(_, rate)| *rate > 0.0)
        .min_by(|a, b| a.1.total_cmp(&b.1))
    {
        widgets.push(Widget::Notice(Notice::new(
            Tone::Error,
            format!("Worst: {} - {} ({:.1}%)", worst.platform, worst.issue_category.label(), rate),
        )));
    }

    let cancelled: Vec<f64> = rated
        .iter()
        .filter(|(r, _)| r.issue_category == IssueCategory::CancelledOrder)
        .map(|(_, rate)| *rate)
        .collect();
    if !cancelled.is_empty() {
        let mean = cancelled.iter().sum::<f64>() / cancelled.len() as f64;
        if mean < CANCELLED_RECOVERY_FLOOR {
            widgets.push(Widget::Notice(Notice::new(
                Tone::Warning,
                format!("Cancelled orders: {:.1}% recovery - consider stopping disputes", mean),
            )));
        }
    }

    widgets
}

pub fn daily_operations(rows: &[DailyRecovery]) -> Vec<Widget> {
    let values: Vec<f64> = rows.iter().map(|d| d.recovered).collect();
    let average = moving_average(&values, 7);

    let daily = rows
        .iter()
        .map(|d| ChartPoint::new(day_label(d.date), Some(round_to(d.recovered, 2))))
        .collect();
    let smoothed = rows
        .iter()
        .zip(average)
        .map(|(d, ma)| ChartPoint::new(day_label(d.date), ma))
        .collect();

    let chart = ChartData::new(
        "daily-recovery",
        "Daily Recovery",
        ChartKind::Line,
        Unit::Currency,
        vec![
            SeriesData::new("daily-recovery", "Daily Recovery", SeriesStyle::Line, daily).with_color("#2563eb"),
            SeriesData::new("ma7", "7-Day Average", SeriesStyle::DashedLine, smoothed).with_color("#ef4444"),
        ],
    )
    .with_x_label("Date");

    vec![Widget::Chart(chart)]
}

pub fn platform_win_rate(rows: &[PlatformIssuePerformance]) -> Vec<Widget> {
    let points = by_platform(rows)
        .into_iter()
        .map(|(platform, totals)| ChartPoint::new(platform, totals.win_rate()))
        .collect();
    let chart = ChartData::new(
        "platform-win-rate",
        "Win Rate by Platform",
        ChartKind::Bar,
        Unit::Percent,
        vec![SeriesData::new("win-rate", "Win Rate %", SeriesStyle::Bar, points).with_color("#84cc16")],
    )
    .with_x_label("Platform");
    vec![Widget::Chart(chart)]
}

pub fn platform_value(rows: &[PlatformIssuePerformance]) -> Vec<Widget> {
    let mut platforms = by_platform(rows);
    platforms.sort_by(|a, b| b.1.recovered.total_cmp(&a.1.recovered).then(a.0.cmp(b.0)));
    let grand_total = Totals::of_platform_issue(rows).recovered;

    let points = platforms
        .iter()
        .map(|(platform, totals)| ChartPoint::new(*platform, Some(round_to(totals.recovered, 2))))
        .collect();
    let chart = ChartData::new(
        "platform-value",
        "Recovery Value by Platform",
        ChartKind::Bar,
        Unit::Currency,
        vec![SeriesData::new("recovered", "Recovered", SeriesStyle::Bar, points).with_color("#0d9488")],
    );

    let mut table = TableData::new("platform-share", "Share of Recovery", &["Platform", "Recovered", "Share %"]);
    for (platform, totals) in &platforms {
        table.push_row(vec![
            TableCell::Text(platform.to_string()),
            TableCell::Currency(round_to(totals.recovered, 2)),
            TableCell::Percent(ratio_pct(totals.recovered, grand_total)),
        ]);
    }

    vec![Widget::Chart(chart), Widget::Table(table)]
}

pub fn status_breakdown(rows: &[StatusBreakdown]) -> Vec<Widget> {
    let total_count: i64 = rows.iter().map(|r| r.count).sum();
    let mut table = TableData::new(
        "status-breakdown",
        "Dispute Status Breakdown",
        &["Status", "Amount", "Disputes", "Share of Disputes %"],
    );
    for row in rows {
        table.push_row(vec![
            TableCell::Text(row.status.clone()),
            TableCell::Currency(round_to(row.amount, 2)),
            TableCell::Count(row.count),
            TableCell::Percent(ratio_pct(row.count as f64, total_count as f64)),
        ]);
    }
    vec![Widget::Table(table)]
}

pub fn subcategory_recovery(rows: &[SubcategoryRecovery]) -> Vec<Widget> {
    if rows.is_empty() {
        return vec![no_data_notice()];
    }
    let mut ranked: Vec<&SubcategoryRecovery> = rows.iter().collect();
    ranked.sort_by(|a, b| b.recovered.total_cmp(&a.recovered).then(a.subcategory.cmp(&b.subcategory)));

    let points = ranked
        .iter()
        .map(|r| ChartPoint::new(r.subcategory.as_str(), r.recovery_rate()))
        .collect();
    let chart = ChartData::new(
        "subcategory-rate",
        "Recovery Rate by Error Subcategory",
        ChartKind::HorizontalBar,
        Unit::Percent,
        vec![SeriesData::new("recovery-rate", "Recovery Rate %", SeriesStyle::Bar, points).with_color("#7c3aed")],
    );

    let mut table = TableData::new(
        "subcategory-recovery",
        "Recovery by Error Subcategory",
        &["Subcategory", "Locations", "Disputes", "Potential", "Recovered", "Recovery %"],
    );
    for row in &ranked {
        table.push_row(vec![
            TableCell::Text(row.subcategory.clone()),
            TableCell::Count(row.locations),
            TableCell::Count(row.disputes),
            TableCell::Currency(round_to(row.potential, 2)),
            TableCell::Currency(round_to(row.recovered, 2)),
            TableCell::Percent(row.recovery_rate()),
        ]);
    }

    vec![Widget::Chart(chart), Widget::Table(table)]
}

/// Chain and platform pairs whose recent recovery fell against their
/// trailing-year average, worst decline first
pub fn chains_attention(ctx: &RenderContext<'_>, rows: &[ChainAttention]) -> Vec<Widget> {
    let mut flagged: Vec<(&ChainAttention, f64)> = rows
        .iter()
        .filter_map(|r| r.decline_pct().map(|decline| (r, decline)))
        .filter(|(_, decline)| *decline >= ctx.rules.attention_decline_pct)
        .collect();
    if flagged.is_empty() {
        return vec![Widget::Notice(Notice::new(
            Tone::Success,
            "No chains need attention: recent recovery is in line with the trailing year.",
        ))];
    }
    flagged.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.chain.cmp(&b.0.chain)));

    let mut table = TableData::new(
        "chains-attention",
        "Chains Requiring Attention",
        &["Chain", "Platform", "12-Month Rate %", "Recent Rate %", "Decline %", "Potential", "Status"],
    );
    let mut critical = 0;
    for (row, decline) in &flagged {
        let status = if *decline > ctx.rules.attention_critical_pct {
            critical += 1;
            "Critical"
        } else {
            "Warning"
        };
        table.push_row(vec![
            TableCell::Text(row.chain.clone()),
            TableCell::Text(row.platform.clone()),
            TableCell::Percent(Some(round_to(row.baseline_rate, 1))),
            TableCell::Percent(Some(round_to(row.recent_rate, 1))),
            TableCell::Percent(Some(round_to(*decline, 1))),
            TableCell::Currency(round_to(row.potential, 2)),
            TableCell::Text(status.to_string()),
        ]);
    }

    let rules = ctx.rules;
    let (tone, message) = if critical > 0 {
        let message = format!(
            "{} of {} flagged chains declined more than {:.0}%",
            critical,
            flagged.len(),
            rules.attention_critical_pct
        );
        (Tone::Error, message)
    } else {
        let message = format!(
            "{} chains declined at least {:.0}% in the last 90 days",
            flagged.len(),
            rules.attention_decline_pct
        );
        (Tone::Warning, message)
    };
    vec![Widget::Notice(Notice::new(tone, message)), Widget::Table(table)]
}
