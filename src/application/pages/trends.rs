// Trends & Analytics panels
use super::{RenderContext, day_label, month_label};
use crate::domain::recovery::{
    DailyRecovery, MonthlyPerformance, Totals, TrendDirection, moving_average, round_to, trend_direction,
};
use crate::domain::widget::{
    ChartData, ChartKind, ChartPoint, HeatmapData, Notice, SeriesData, SeriesStyle, Tone, Unit, Widget,
};
use std::collections::{BTreeMap, BTreeSet};

fn smoothed(rows: &[DailyRecovery], values: &[f64], window: usize) -> Vec<ChartPoint> {
    rows.iter()
        .zip(moving_average(values, window))
        .map(|(d, ma)| ChartPoint::new(day_label(d.date), ma.map(|v| round_to(v, 2))))
        .collect()
}

pub fn recovery_trend(rows: &[DailyRecovery]) -> Vec<Widget> {
    let values: Vec<f64> = rows.iter().map(|d| d.recovered).collect();
    let daily = rows
        .iter()
        .map(|d| ChartPoint::new(day_label(d.date), Some(round_to(d.recovered, 2))))
        .collect();

    let chart = ChartData::new(
        "recovery-trend",
        "Recovery Trend Analysis",
        ChartKind::Line,
        Unit::Currency,
        vec![
            SeriesData::new("daily", "Daily Recovery", SeriesStyle::Line, daily).with_color("#cbd5e1"),
            SeriesData::new("ma7", "7-Day MA", SeriesStyle::Line, smoothed(rows, &values, 7)).with_color("#2563eb"),
            SeriesData::new("ma30", "30-Day MA", SeriesStyle::Line, smoothed(rows, &values, 30)).with_color("#dc2626"),
        ],
    )
    .with_x_label("Date");

    let mut widgets = vec![Widget::Chart(chart)];
    if let Some(direction) = trend_direction(rows) {
        let notice = match direction {
            TrendDirection::Improving => Notice::new(
                Tone::Success,
                "Trend: Improving (7-day average up more than 10% against the prior month)",
            ),
            TrendDirection::Declining => Notice::new(
                Tone::Error,
                "Trend: Declining (7-day average down more than 10% against the prior month)",
            ),
            TrendDirection::Stable => Notice::new(Tone::Info, "Trend: Stable"),
        };
        widgets.push(Widget::Notice(notice));
    }
    widgets
}

/// Recovery rate per chain and month for the chains recovering the most
pub fn cohort_performance(ctx: &RenderContext<'_>, rows: &[MonthlyPerformance]) -> Vec<Widget> {
    let mut chain_totals: BTreeMap<&str, f64> = BTreeMap::new();
    for row in rows {
        *chain_totals.entry(row.chain.as_str()).or_default() += row.recovered;
    }
    let mut ranked: Vec<(&str, f64)> = chain_totals.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(b.0)));
    let chains: Vec<&str> = ranked
        .into_iter()
        .take(ctx.rules.cohort_chains)
        .map(|(chain, _)| chain)
        .collect();

    let months: BTreeSet<chrono::NaiveDate> = rows.iter().map(|r| r.month).collect();
    let mut grid: BTreeMap<(&str, chrono::NaiveDate), Totals> = BTreeMap::new();
    for row in rows.iter().filter(|r| chains.contains(&r.chain.as_str())) {
        grid.entry((row.chain.as_str(), row.month)).or_default().add(
            row.total_orders,
            row.disputes_won,
            row.potential,
            row.recovered,
        );
    }

    let cells = chains
        .iter()
        .map(|chain| {
            months
                .iter()
                .map(|month| grid.get(&(*chain, *month)).and_then(|t| t.recovery_rate()))
                .collect()
        })
        .collect();

    let heatmap = HeatmapData {
        id: "cohort-recovery-rate".to_string(),
        title: "Recovery Rate % by Chain and Month".to_string(),
        unit: Unit::Percent,
        x_labels: months.iter().map(|m| month_label(*m)).collect(),
        y_labels: chains.iter().map(|c| c.to_string()).collect(),
        cells,
    };
    vec![Widget::Heatmap(heatmap)]
}

pub fn win_rate_trend(rows: &[DailyRecovery]) -> Vec<Widget> {
    let daily: Vec<ChartPoint> = rows
        .iter()
        .map(|d| ChartPoint::new(day_label(d.date), d.win_rate()))
        .collect();
    // Days without orders count as 0% in the average
    let values: Vec<f64> = rows.iter().map(|d| d.win_rate().unwrap_or(0.0)).collect();

    let chart = ChartData::new(
        "win-rate-trend",
        "Win Rate Trend",
        ChartKind::Line,
        Unit::Percent,
        vec![
            SeriesData::new("daily", "Daily Win Rate", SeriesStyle::Area, daily).with_color("#93c5fd"),
            SeriesData::new("ma7", "7-Day MA Win Rate", SeriesStyle::Line, smoothed(rows, &values, 7))
                .with_color("#1e3a8a"),
        ],
    )
    .with_x_label("Date");

    vec![Widget::Chart(chart)]
}
