// Executive Summary panels
use super::{RenderContext, month_label, no_data_notice};
use crate::domain::recovery::{
    ChainPerformance, LocationRecovery, LocationSummary, MonthlyPerformance, Totals, monthly_equivalent,
    ratio_pct, round_to,
};
use crate::domain::widget::{
    ChartData, ChartKind, ChartPoint, KpiTile, Notice, SeriesData, SeriesStyle, TableCell, TableData, Tone,
    Unit, Widget,
};
use std::collections::BTreeMap;

/// Recovery rate above which the headline rate reads as healthy
const HEALTHY_RECOVERY_RATE: f64 = 30.0;

/// Share of profitable locations below which the model is flagged critical
const CRITICAL_PROFITABLE_PCT: f64 = 10.0;

/// Below this share the profitability line is a warning
const MINORITY_PROFITABLE_PCT: f64 = 50.0;

pub fn recovery_kpis(rows: &[MonthlyPerformance]) -> Vec<Widget> {
    let totals = Totals::of_monthly(rows);
    let recovery_rate = totals.recovery_rate();

    let mut rate_tile = KpiTile::new("recovery-rate", "Recovery Rate", Unit::Percent, recovery_rate);
    if let Some(rate) = recovery_rate {
        rate_tile = rate_tile.with_tone(if rate > HEALTHY_RECOVERY_RATE {
            Tone::Success
        } else {
            Tone::Error
        });
    }

    vec![
        Widget::Kpi(KpiTile::new(
            "total-recovered",
            "Total Recovered",
            Unit::Currency,
            Some(round_to(totals.recovered, 2)),
        )),
        Widget::Kpi(rate_tile),
        Widget::Kpi(KpiTile::new("win-rate", "Win Rate", Unit::Percent, totals.win_rate())),
    ]
}

pub fn location_health(ctx: &RenderContext<'_>, rows: &[LocationRecovery]) -> Vec<Widget> {
    let rules = ctx.rules;
    let summary = LocationSummary::from_rows(rows, &ctx.filter.range, rules);

    let mut profitable = KpiTile::new(
        "profitable-locations",
        "Profitable Locations",
        Unit::Percent,
        summary.profitable_pct,
    )
    .with_caption(format!("at {}/month", ctx.money(rules.fee_per_location)));
    if let Some(pct) = summary.profitable_pct {
        profitable = profitable.with_tone(if pct < CRITICAL_PROFITABLE_PCT {
            Tone::Error
        } else {
            Tone::Warning
        });
    }

    let mut average = KpiTile::new(
        "avg-per-location",
        "Avg per Location",
        Unit::Currency,
        summary.avg_monthly_recovery.map(|v| round_to(v, 2)),
    )
    .with_caption("monthly");
    if let Some(avg) = summary.avg_monthly_recovery {
        average = average.with_tone(if avg < rules.fee_per_location {
            Tone::Error
        } else {
            Tone::Success
        });
    }

    let points = rules
        .distribution(&summary.monthly_recoveries)
        .into_iter()
        .map(|(label, count)| ChartPoint::new(label, Some(count as f64)))
        .collect();
    let distribution = ChartData::new(
        "profitability-distribution",
        "Location Profitability Distribution",
        ChartKind::HorizontalBar,
        Unit::Count,
        vec![SeriesData::new("locations", "Locations", SeriesStyle::Bar, points).with_color("#10b981")],
    );

    let mut widgets = vec![
        Widget::Kpi(KpiTile::new(
            "active-locations",
            "Active Locations",
            Unit::Count,
            Some(summary.total_locations as f64),
        )),
        Widget::Kpi(profitable),
        Widget::Kpi(average),
        Widget::Chart(distribution),
    ];

    match (summary.profitable_pct, summary.avg_monthly_recovery) {
        (Some(pct), Some(avg)) => {
            let fee = ctx.money(rules.fee_per_location);
            let profitability = if pct < MINORITY_PROFITABLE_PCT {
                Notice::new(
                    Tone::Warning,
                    format!("Only {:.1}% of locations are profitable at {}/month pricing", pct, fee),
                )
            } else {
                Notice::new(
                    Tone::Success,
                    format!("{:.1}% of locations are profitable at {}/month pricing", pct, fee),
                )
            };
            widgets.push(Widget::Notice(profitability));
            widgets.push(Widget::Notice(Notice::new(
                Tone::Info,
                format!("Average recovery: {}/location per month", ctx.money(avg)),
            )));
            if pct < CRITICAL_PROFITABLE_PCT {
                widgets.push(Widget::Notice(Notice::new(
                    Tone::Error,
                    "Critical: business model needs urgent review",
                )));
            }
        }
        _ => widgets.push(no_data_notice()),
    }

    widgets
}

pub fn monthly_trend(rows: &[MonthlyPerformance]) -> Vec<Widget> {
    let mut by_month: BTreeMap<chrono::NaiveDate, Totals> = BTreeMap::new();
    for row in rows {
        by_month.entry(row.month).or_default().add(
            row.total_orders,
            row.disputes_won,
            row.potential,
            row.recovered,
        );
    }

    let recovered = by_month
        .iter()
        .map(|(month, t)| ChartPoint::new(month_label(*month), Some(round_to(t.recovered, 2))))
        .collect();
    let rate = by_month
        .iter()
        .map(|(month, t)| ChartPoint::new(month_label(*month), t.recovery_rate()))
        .collect();

    let chart = ChartData::new(
        "monthly-recovery",
        "Monthly Recovery Trend",
        ChartKind::Combo,
        Unit::Currency,
        vec![
            SeriesData::new("total-recovered", "Total Recovered", SeriesStyle::Bar, recovered).with_color("#93c5fd"),
            SeriesData::new("recovery-rate", "Recovery Rate %", SeriesStyle::Line, rate)
                .with_color("#ef4444")
                .on_secondary_axis(),
        ],
    )
    .with_secondary_unit(Unit::Percent)
    .with_x_label("Month");

    vec![Widget::Chart(chart)]
}

pub fn platform_performance(rows: &[MonthlyPerformance]) -> Vec<Widget> {
    let mut by_platform: BTreeMap<&str, Totals> = BTreeMap::new();
    for row in rows {
        by_platform.entry(row.platform.as_str()).or_default().add(
            row.total_orders,
            row.disputes_won,
            row.potential,
            row.recovered,
        );
    }
    let mut platforms: Vec<(&str, Totals)> = by_platform.into_iter().collect();
    platforms.sort_by(|a, b| b.1.recovered.total_cmp(&a.1.recovered).then(a.0.cmp(b.0)));

    let recovered = platforms
        .iter()
        .map(|(platform, t)| ChartPoint::new(*platform, Some(round_to(t.recovered, 2))))
        .collect();
    let rate = platforms
        .iter()
        .map(|(platform, t)| ChartPoint::new(*platform, t.recovery_rate()))
        .collect();

    let chart = ChartData::new(
        "platform-recovered",
        "Platform Performance",
        ChartKind::Combo,
        Unit::Currency,
        vec![
            SeriesData::new("total-recovered", "Total Recovered", SeriesStyle::Bar, recovered).with_color("#0d9488"),
            SeriesData::new("recovery-rate", "Recovery Rate %", SeriesStyle::Line, rate)
                .with_color("#eab308")
                .on_secondary_axis(),
        ],
    )
    .with_secondary_unit(Unit::Percent)
    .with_x_label("Platform");

    vec![Widget::Chart(chart)]
}

pub fn top_chains(ctx: &RenderContext<'_>, rows: &[ChainPerformance]) -> Vec<Widget> {
    let rules = ctx.rules;
    let mut table = TableData::new(
        "top-chains",
        "Top Performing Chains",
        &["Chain", "Locations", "Avg per Location (monthly)", "Recovery %", "Win %", "Status"],
    );

    let mut selected: Vec<&ChainPerformance> = rows
        .iter()
        .filter(|c| c.total_orders > rules.top_chain_min_orders)
        .collect();
    selected.sort_by(|a, b| b.recovered.total_cmp(&a.recovered).then(a.chain.cmp(&b.chain)));

    for chain in selected.into_iter().take(rules.top_chain_limit) {
        let monthly_per_location = chain
            .recovered_per_location()
            .map(|v| monthly_equivalent(v, &ctx.filter.range));
        let tier = monthly_per_location
            .map(|v| rules.tier(v).label())
            .unwrap_or("n/a");
        table.push_row(vec![
            TableCell::Text(chain.chain.clone()),
            TableCell::Count(chain.locations),
            TableCell::Currency(round_to(monthly_per_location.unwrap_or(0.0), 2)),
            TableCell::Percent(chain.recovery_rate()),
            TableCell::Percent(ratio_pct(chain.disputes_won as f64, chain.total_orders as f64)),
            TableCell::Text(tier.to_string()),
        ]);
    }

    vec![Widget::Table(table)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filter::{DateRange, FilterSet};
    use crate::domain::format::Formatter;
    use crate::domain::recovery::BusinessRules;

    fn chain(name: &str, locations: i64, orders: i64, recovered: f64) -> ChainPerformance {
        ChainPerformance {
            chain: name.to_string(),
            locations,
            total_orders: orders,
            disputes_won: orders / 2,
            potential: recovered * 2.0,
            recovered,
        }
    }

    #[test]
    fn test_recovery_kpis_on_empty_rows() {
        let widgets = recovery_kpis(&[]);
        match &widgets[..] {
            [Widget::Kpi(total), Widget::Kpi(rate), Widget::Kpi(win)] => {
                assert_eq!(total.value, Some(0.0));
                assert_eq!(rate.value, None);
                assert_eq!(rate.tone, None);
                assert_eq!(win.value, None);
            }
            other => panic!("unexpected widgets: {:?}", other),
        }
    }

    #[test]
    fn test_top_chains_applies_order_floor_and_limit() {
        let filter = FilterSet::new(DateRange::parse("2024-01-01", "2024-01-30").unwrap());
        let rules = BusinessRules {
            top_chain_limit: 2,
            ..BusinessRules::default()
        };
        let ctx = RenderContext {
            filter: &filter,
            rules: &rules,
            formatter: &Formatter::default(),
        };
        let rows = vec![
            chain("Small", 1, 50, 9000.0),
            chain("Gamma", 2, 500, 400.0),
            chain("Alpha", 4, 800, 1600.0),
            chain("Beta", 1, 300, 90.0),
        ];

        let widgets = top_chains(&ctx, &rows);
        let Widget::Table(table) = &widgets[0] else {
            panic!("expected a table");
        };
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][0], TableCell::Text("Alpha".into()));
        assert_eq!(table.rows[0][2], TableCell::Currency(400.0));
        assert_eq!(table.rows[0][5], TableCell::Text("Star".into()));
        assert_eq!(table.rows[1][0], TableCell::Text("Gamma".into()));
        assert_eq!(table.rows[1][5], TableCell::Text("Profitable".into()));
    }

    #[test]
    fn test_location_health_flags_critical_share() {
        let filter = FilterSet::new(DateRange::parse("2024-01-01", "2024-01-30").unwrap());
        let rules = BusinessRules::default();
        let ctx = RenderContext {
            filter: &filter,
            rules: &rules,
            formatter: &Formatter::default(),
        };
        let mut rows: Vec<LocationRecovery> = (0..10)
            .map(|i| LocationRecovery {
                slug: format!("loc-{i}"),
                chain: "Chain".into(),
                recovered: 20.0,
            })
            .collect();
        rows[0].recovered = 600.0;

        let widgets = location_health(&ctx, &rows);
        let critical = widgets.iter().any(|w| {
            matches!(w, Widget::Notice(n) if n.tone == Tone::Error && n.message.contains("Critical"))
        });
        assert!(!critical, "10% profitable is not below the critical share");

        rows[1].recovered = 10.0;
        rows.push(LocationRecovery {
            slug: "loc-extra".into(),
            chain: "Chain".into(),
            recovered: 0.0,
        });
        let widgets = location_health(&ctx, &rows);
        assert!(widgets.iter().any(|w| {
            matches!(w, Widget::Notice(n) if n.tone == Tone::Error && n.message.contains("Critical"))
        }));
    }

    #[test]
    fn test_fee_caption_uses_configured_currency() {
        let filter = FilterSet::new(DateRange::parse("2024-01-01", "2024-01-30").unwrap());
        let rules = BusinessRules::default();
        let formatter = Formatter::new("€", 0, 1);
        let ctx = RenderContext {
            filter: &filter,
            rules: &rules,
            formatter: &formatter,
        };
        let rows = vec![LocationRecovery {
            slug: "a".into(),
            chain: "Chain".into(),
            recovered: 1234.0,
        }];

        let widgets = location_health(&ctx, &rows);
        let caption = widgets.iter().find_map(|w| match w {
            Widget::Kpi(tile) if tile.id == "profitable-locations" => tile.caption.clone(),
            _ => None,
        });
        assert_eq!(caption.as_deref(), Some("at €150/month"));
        assert!(widgets.iter().any(|w| {
            matches!(w, Widget::Notice(n) if n.message == "Average recovery: €1,234/location per month")
        }));
    }

    #[test]
    fn test_location_health_only_warns_for_a_minority() {
        let filter = FilterSet::new(DateRange::parse("2024-01-01", "2024-01-30").unwrap());
        let rules = BusinessRules::default();
        let ctx = RenderContext {
            filter: &filter,
            rules: &rules,
            formatter: &Formatter::default(),
        };
        let location = |slug: &str, recovered: f64| LocationRecovery {
            slug: slug.to_string(),
            chain: "Chain".into(),
            recovered,
        };
        let notices = |rows: &[LocationRecovery]| -> Vec<Notice> {
            location_health(&ctx, rows)
                .into_iter()
                .filter_map(|w| match w {
                    Widget::Notice(n) => Some(n),
                    _ => None,
                })
                .collect()
        };

        let healthy = notices(&[location("a", 400.0), location("b", 200.0), location("c", 20.0)]);
        assert!(healthy.iter().all(|n| !n.message.starts_with("Only")));
        assert_eq!(healthy[0].tone, Tone::Success);
        assert_eq!(healthy[0].message, "66.7% of locations are profitable at $150.00/month pricing");

        let struggling = notices(&[location("a", 400.0), location("b", 20.0), location("c", 20.0)]);
        assert_eq!(struggling[0].tone, Tone::Warning);
        assert_eq!(struggling[0].message, "Only 33.3% of locations are profitable at $150.00/month pricing");
    }
}
