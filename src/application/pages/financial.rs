// Financial Impact panels
use super::{RenderContext, month_label, no_data_notice};
use crate::domain::recovery::{MonthlyPerformance, OrderValueBand, Totals, order_value_bounds, round_to};
use crate::domain::widget::{
    ChartData, ChartKind, ChartPoint, KpiTile, Notice, SeriesData, SeriesStyle, Tone, Unit, Widget,
};
use std::collections::BTreeMap;

pub fn financial_summary(rows: &[MonthlyPerformance]) -> Vec<Widget> {
    let totals = Totals::of_monthly(rows);
    vec![
        Widget::Kpi(KpiTile::new(
            "total-opportunity",
            "Total Opportunity",
            Unit::Currency,
            Some(round_to(totals.potential, 2)),
        )),
        Widget::Kpi(KpiTile::new(
            "total-recovered",
            "Total Recovered",
            Unit::Currency,
            Some(round_to(totals.recovered, 2)),
        )),
        Widget::Kpi(KpiTile::new(
            "unrecovered",
            "Unrecovered",
            Unit::Currency,
            Some(round_to(totals.unrecovered(), 2)),
        )),
        Widget::Kpi(KpiTile::new(
            "recovery-rate",
            "Recovery Rate",
            Unit::Percent,
            totals.recovery_rate(),
        )),
    ]
}

#[derive(Default)]
struct MonthFinancials {
    totals: Totals,
    locations: i64,
}

/// Recovered vs unrecovered per month, with net value after per-location fees.
/// Active locations are summed over chain and platform rows.
pub fn monthly_financials(ctx: &RenderContext<'_>, rows: &[MonthlyPerformance]) -> Vec<Widget> {
    let mut by_month: BTreeMap<chrono::NaiveDate, MonthFinancials> = BTreeMap::new();
    for row in rows {
        let entry = by_month.entry(row.month).or_default();
        entry
            .totals
            .add(row.total_orders, row.disputes_won, row.potential, row.recovered);
        entry.locations += row.active_locations;
    }

    let mut recovered = Vec::new();
    let mut unrecovered = Vec::new();
    let mut net = Vec::new();
    for (month, m) in &by_month {
        let label = month_label(*month);
        let fees = m.locations as f64 * ctx.rules.fee_per_location;
        recovered.push(ChartPoint::new(label.clone(), Some(round_to(m.totals.recovered, 2))));
        unrecovered.push(ChartPoint::new(label.clone(), Some(round_to(m.totals.unrecovered(), 2))));
        net.push(ChartPoint::new(label, Some(round_to(m.totals.recovered - fees, 2))));
    }

    let chart = ChartData::new(
        "monthly-financials",
        "Monthly Financial Performance",
        ChartKind::StackedBar,
        Unit::Currency,
        vec![
            SeriesData::new("recovered", "Recovered", SeriesStyle::Bar, recovered).with_color("#16a34a"),
            SeriesData::new("unrecovered", "Unrecovered", SeriesStyle::Bar, unrecovered).with_color("#dc2626"),
            SeriesData::new("net-value", "Net Value (Recovery - Fees)", SeriesStyle::Line, net).with_color("#2563eb"),
        ],
    )
    .with_x_label("Month");

    vec![Widget::Chart(chart)]
}

pub fn platform_financials(ctx: &RenderContext<'_>, rows: &[MonthlyPerformance]) -> Vec<Widget> {
    let mut by_platform: BTreeMap<&str, Totals> = BTreeMap::new();
    for row in rows {
        by_platform.entry(row.platform.as_str()).or_default().add(
            row.total_orders,
            row.disputes_won,
            row.potential,
            row.recovered,
        );
    }

    let recovered = by_platform
        .iter()
        .map(|(platform, t)| ChartPoint::new(*platform, Some(round_to(t.recovered, 2))))
        .collect();
    let potential = by_platform
        .iter()
        .map(|(platform, t)| ChartPoint::new(*platform, Some(round_to(t.potential, 2))))
        .collect();

    let chart = ChartData::new(
        "platform-financials",
        "Recovered vs Potential by Platform",
        ChartKind::GroupedBar,
        Unit::Currency,
        vec![
            SeriesData::new("recovered", "Total Recovered", SeriesStyle::Bar, recovered).with_color("#16a34a"),
            SeriesData::new("potential", "Total Potential", SeriesStyle::Bar, potential).with_color("#94a3b8"),
        ],
    )
    .with_x_label("Platform");

    let mut widgets = vec![Widget::Chart(chart)];
    for (platform, totals) in &by_platform {
        widgets.push(Widget::Kpi(
            KpiTile::new(
                format!("rate-{}", platform.to_ascii_lowercase().replace(' ', "-")),
                *platform,
                Unit::Percent,
                totals.recovery_rate(),
            )
            .with_caption(format!("{} recovered", ctx.money(totals.recovered))),
        ));
    }
    widgets
}

fn band_label(ctx: &RenderContext<'_>, band: usize) -> String {
    let (lower, upper) = order_value_bounds(band);
    let lower = ctx.formatter.axis(Unit::Currency, lower);
    match upper {
        Some(upper) => format!("{}-{}", lower, ctx.formatter.axis(Unit::Currency, upper)),
        None => format!("{}+", lower),
    }
}

pub fn order_value_win_rate(ctx: &RenderContext<'_>, rows: &[OrderValueBand]) -> Vec<Widget> {
    if rows.is_empty() {
        return vec![no_data_notice()];
    }
    let mut bands: Vec<&OrderValueBand> = rows.iter().collect();
    bands.sort_by_key(|b| b.band);

    let recovered = bands
        .iter()
        .map(|b| ChartPoint::new(band_label(ctx, b.band), Some(round_to(b.recovered, 2))))
        .collect();
    let rate = bands
        .iter()
        .map(|b| ChartPoint::new(band_label(ctx, b.band), b.recovery_rate()))
        .collect();
    let chart = ChartData::new(
        "order-value-win-rate",
        "Recovery by Order Value",
        ChartKind::Combo,
        Unit::Currency,
        vec![
            SeriesData::new("recovered", "Recovered", SeriesStyle::Bar, recovered).with_color("#16a34a"),
            SeriesData::new("recovery-rate", "Recovery Rate %", SeriesStyle::Line, rate)
                .with_color("#f97316")
                .on_secondary_axis(),
        ],
    )
    .with_secondary_unit(Unit::Percent)
    .with_x_label("Order Subtotal");

    let mut widgets = vec![Widget::Chart(chart)];
    let best = bands
        .iter()
        .filter_map(|b| b.recovery_rate().map(|rate| (b, rate)))
        .max_by(|a, b| a.1.total_cmp(&b.1));
    if let Some((band, rate)) = best {
        let average = band
            .avg_order_value
            .map(|v| format!(", average order {}", ctx.money(v)))
            .unwrap_or_default();
        widgets.push(Widget::Notice(Notice::new(
            Tone::Info,
            format!("Highest recovery rate: {} orders ({:.1}%{})", band_label(ctx, band.band), rate, average),
        )));
    }
    widgets
}
