//! HTML page rendering
//!
//! Every page is a self-contained document with inline CSS and
//! server-rendered SVG charts. Navigation links carry the current query
//! string so the filter selection survives page changes.

use crate::application::catalog_service::FilterOption;
use crate::domain::dashboard::{Page, PageView, Panel};
use crate::domain::filter::Period;
use crate::domain::recovery::IssueCategory;
use crate::domain::widget::{KpiTile, Notice, TableCell, TableData, Tone, Widget};
use crate::domain::format::Formatter;
use crate::presentation::charts::{empty_state, render_chart, render_heatmap};

const CREDENTIALS_HELP: &str = "Add a [credentials] section with client_id, client_secret and refresh_token to \
config/secrets.toml, or point GOOGLE_APPLICATION_CREDENTIALS at an authorized_user or service_account key \
file, then restart the server.";

/// Filter sidebar state, echoed back exactly as the viewer submitted it
#[derive(Debug, Clone, Default)]
pub struct FilterForm {
    pub period: String,
    pub start: String,
    pub end: String,
    pub platform: String,
    pub chain: String,
    pub issue: String,
    pub platform_options: Vec<FilterOption>,
    pub chain_options: Vec<FilterOption>,
}

/// Render a page with its widget tree
pub fn render_page(view: &PageView, form: &FilterForm, query: &str, fmt: &Formatter) -> String {
    let panels: String = view.panels.iter().map(|p| render_panel(p, fmt)).collect();
    let content = format!(
        r#"<header class="page-header"><h1>{title}</h1><p class="range">{range}</p></header>{panels}"#,
        title = escape(&view.title),
        range = escape(&view.filter.range.to_string()),
        panels = panels,
    );
    document(view.page, query, form, &content)
}

/// Render a page whose filters were rejected
pub fn render_filter_error(page: Page, form: &FilterForm, query: &str, message: &str) -> String {
    let content = format!(
        r#"<header class="page-header"><h1>{title}</h1></header>{banner}"#,
        title = escape(page.title()),
        banner = banner(Tone::Error, "Invalid filters", message),
    );
    document(page, query, form, &content)
}

/// Render the setup banner shown while warehouse credentials are unusable
pub fn render_config_error(page: Page, form: &FilterForm, query: &str, reason: &str) -> String {
    let content = format!(
        r#"<header class="page-header"><h1>{title}</h1></header>{banner}<p class="help">{help}</p>"#,
        title = escape(page.title()),
        banner = banner(Tone::Error, "Warehouse connection is not configured", reason),
        help = escape(CREDENTIALS_HELP),
    );
    document(page, query, form, &content)
}

pub fn render_not_found(slug: &str) -> String {
    let content = format!(
        r#"<header class="page-header"><h1>Page not found</h1></header>{banner}"#,
        banner = banner(Tone::Warning, "Unknown page", &format!("There is no dashboard page named '{}'.", slug)),
    );
    document_shell("Page not found", &render_nav(None, ""), "", &content)
}

fn document(page: Page, query: &str, form: &FilterForm, content: &str) -> String {
    document_shell(
        page.title(),
        &render_nav(Some(page), query),
        &render_filter_form(page, form),
        content,
    )
}

fn document_shell(title: &str, nav: &str, sidebar: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} - Recovery Dashboard</title>
    <style>{css}</style>
</head>
<body>
    {nav}
    <div class="layout">
        <aside class="sidebar">{sidebar}</aside>
        <main class="content">{content}</main>
    </div>
</body>
</html>"#,
        title = escape(title),
        css = inline_css(),
        nav = nav,
        sidebar = sidebar,
        content = content,
    )
}

fn render_nav(active: Option<Page>, query: &str) -> String {
    let suffix = if query.is_empty() {
        String::new()
    } else {
        format!("?{}", query)
    };
    let links: String = Page::ALL
        .iter()
        .map(|page| {
            let class = if Some(*page) == active { "nav-link active" } else { "nav-link" };
            format!(
                r#"<a class="{class}" href="/pages/{slug}{suffix}">{title}</a>"#,
                class = class,
                slug = page.slug(),
                suffix = escape(&suffix),
                title = escape(page.title()),
            )
        })
        .collect();
    format!(
        r#"<nav class="topnav"><span class="brand">Recovery Dashboard</span>{links}</nav>"#,
        links = links
    )
}

fn option(value: &str, label: &str, selected: bool) -> String {
    format!(
        r#"<option value="{value}"{selected}>{label}</option>"#,
        value = escape(value),
        selected = if selected { " selected" } else { "" },
        label = escape(label),
    )
}

fn render_filter_form(page: Page, form: &FilterForm) -> String {
    let mut periods = option("", "Custom range", form.period.is_empty());
    for period in Period::ALL {
        periods.push_str(&option(period.slug(), period.label(), form.period == period.slug()));
    }

    let platforms = named_options("All platforms", &form.platform, &form.platform_options);
    let chains = named_options("All chains", &form.chain, &form.chain_options);

    let mut issues = option("all", "All issue types", form.issue.is_empty() || form.issue == "all");
    for category in IssueCategory::ALL {
        issues.push_str(&option(category.slug(), category.label(), form.issue == category.slug()));
    }

    format!(
        r#"<form class="filters" method="get" action="/pages/{slug}">
            <h3>Filters</h3>
            <label>Period<select name="period">{periods}</select></label>
            <label>Start date<input type="date" name="start" value="{start}"></label>
            <label>End date<input type="date" name="end" value="{end}"></label>
            <label>Platform<select name="platforms">{platforms}</select></label>
            <label>Chain<select name="chains">{chains}</select></label>
            <label>Issue type<select name="issues">{issues}</select></label>
            <button type="submit">Apply</button>
        </form>"#,
        slug = page.slug(),
        periods = periods,
        start = escape(&form.start),
        end = escape(&form.end),
        platforms = platforms,
        chains = chains,
        issues = issues,
    )
}

/// Options for a warehouse-backed list; a selection missing from the list
/// is still shown so it can be cleared
fn named_options(all_label: &str, current: &str, options: &[FilterOption]) -> String {
    let unfiltered = current.is_empty() || current == "all";
    let mut html = option("all", all_label, unfiltered);
    let mut listed = false;
    for entry in options {
        let selected = entry.value == current;
        listed |= selected;
        html.push_str(&option(&entry.value, &entry.label, selected));
    }
    if !listed && !unfiltered {
        html.push_str(&option(current, current, true));
    }
    html
}

fn render_panel(panel: &Panel, fmt: &Formatter) -> String {
    let mut body = String::new();
    let mut kpis = String::new();
    for widget in &panel.widgets {
        if let Widget::Kpi(tile) = widget {
            kpis.push_str(&render_kpi(tile, fmt));
            continue;
        }
        if !kpis.is_empty() {
            body.push_str(&format!(r#"<div class="kpi-grid">{}</div>"#, std::mem::take(&mut kpis)));
        }
        body.push_str(&render_widget(widget, fmt));
    }
    if !kpis.is_empty() {
        body.push_str(&format!(r#"<div class="kpi-grid">{}</div>"#, kpis));
    }
    format!(
        r#"<section class="panel" id="{id}"><h2>{title}</h2>{body}</section>"#,
        id = escape(&panel.id),
        title = escape(&panel.title),
        body = body,
    )
}

fn render_widget(widget: &Widget, fmt: &Formatter) -> String {
    match widget {
        Widget::Kpi(tile) => render_kpi(tile, fmt),
        Widget::Chart(chart) => format!(
            r#"<figure class="chart" id="{id}"><figcaption>{title}</figcaption>{svg}</figure>"#,
            id = escape(&chart.id),
            title = escape(&chart.title),
            svg = render_chart(chart, fmt),
        ),
        Widget::Heatmap(heatmap) => format!(
            r#"<figure class="heatmap" id="{id}"><figcaption>{title}</figcaption>{svg}</figure>"#,
            id = escape(&heatmap.id),
            title = escape(&heatmap.title),
            svg = render_heatmap(heatmap, fmt),
        ),
        Widget::Table(table) => render_table(table, fmt),
        Widget::Notice(notice) => render_notice(notice),
        Widget::Unavailable(unavailable) => format!(
            r#"<div class="unavailable"><strong>Data unavailable</strong><p>{reason}</p></div>"#,
            reason = escape(&unavailable.reason),
        ),
    }
}

fn tone_class(tone: Tone) -> &'static str {
    match tone {
        Tone::Success => "success",
        Tone::Info => "info",
        Tone::Warning => "warning",
        Tone::Error => "error",
    }
}

fn render_kpi(tile: &KpiTile, fmt: &Formatter) -> String {
    let tone = tile.tone.map(tone_class).unwrap_or("neutral");
    let caption = tile
        .caption
        .as_deref()
        .map(|c| format!(r#"<div class="kpi-caption">{}</div>"#, escape(c)))
        .unwrap_or_default();
    format!(
        r#"<div class="kpi tone-{tone}" id="{id}"><div class="kpi-title">{title}</div><div class="kpi-value">{value}</div>{caption}</div>"#,
        tone = tone,
        id = escape(&tile.id),
        title = escape(&tile.title),
        value = escape(&fmt.value(tile.unit, tile.value)),
        caption = caption,
    )
}

fn render_notice(notice: &Notice) -> String {
    format!(
        r#"<div class="notice notice-{tone}">{message}</div>"#,
        tone = tone_class(notice.tone),
        message = escape(&notice.message),
    )
}

fn render_table(table: &TableData, fmt: &Formatter) -> String {
    if table.rows.is_empty() {
        return format!(
            r#"<figure class="table" id="{id}"><figcaption>{title}</figcaption>{empty}</figure>"#,
            id = escape(&table.id),
            title = escape(&table.title),
            empty = empty_state(),
        );
    }
    let head: String = table
        .columns
        .iter()
        .map(|c| format!("<th>{}</th>", escape(c)))
        .collect();
    let rows: String = table
        .rows
        .iter()
        .map(|row| {
            let cells: String = row
                .iter()
                .map(|cell| match cell {
                    TableCell::Text(text) => format!("<td>{}</td>", escape(text)),
                    TableCell::Count(n) => format!(r#"<td class="num">{}</td>"#, fmt.count(*n)),
                    TableCell::Currency(v) => format!(r#"<td class="num">{}</td>"#, escape(&fmt.currency(*v))),
                    TableCell::Percent(v) => format!(r#"<td class="num">{}</td>"#, fmt.percent(*v)),
                })
                .collect();
            format!("<tr>{}</tr>", cells)
        })
        .collect();
    format!(
        r#"<figure class="table" id="{id}"><figcaption>{title}</figcaption><table class="data-table"><thead><tr>{head}</tr></thead><tbody>{rows}</tbody></table></figure>"#,
        id = escape(&table.id),
        title = escape(&table.title),
        head = head,
        rows = rows,
    )
}

fn banner(tone: Tone, heading: &str, message: &str) -> String {
    format!(
        r#"<div class="banner banner-{tone}" role="alert"><strong>{heading}</strong><p>{message}</p></div>"#,
        tone = tone_class(tone),
        heading = escape(heading),
        message = escape(message),
    )
}

fn inline_css() -> &'static str {
    r#"
* { box-sizing: border-box; }
body { margin: 0; font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; background: #f8fafc; color: #0f172a; }
.topnav { display: flex; gap: 4px; align-items: center; padding: 10px 20px; background: #0f172a; }
.brand { color: #f8fafc; font-weight: 700; margin-right: 24px; }
.nav-link { color: #cbd5e1; text-decoration: none; padding: 6px 12px; border-radius: 6px; }
.nav-link.active, .nav-link:hover { background: #1e293b; color: #ffffff; }
.layout { display: flex; align-items: flex-start; }
.sidebar { width: 240px; padding: 20px; }
.filters { display: flex; flex-direction: column; gap: 12px; background: #ffffff; border: 1px solid #e2e8f0; border-radius: 8px; padding: 16px; }
.filters h3 { margin: 0; font-size: 15px; }
.filters label { display: flex; flex-direction: column; gap: 4px; font-size: 13px; color: #475569; }
.filters select, .filters input, .filters button { font: inherit; padding: 6px 8px; border: 1px solid #cbd5e1; border-radius: 6px; }
.filters button { background: #2563eb; color: #ffffff; border: none; cursor: pointer; }
.content { flex: 1; padding: 20px 24px; min-width: 0; }
.page-header h1 { margin: 0 0 4px; font-size: 24px; }
.range { margin: 0 0 16px; color: #64748b; }
.panel { background: #ffffff; border: 1px solid #e2e8f0; border-radius: 8px; padding: 16px 20px; margin-bottom: 16px; }
.panel h2 { margin: 0 0 12px; font-size: 17px; }
.kpi-grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(170px, 1fr)); gap: 12px; margin-bottom: 12px; }
.kpi { border: 1px solid #e2e8f0; border-left: 4px solid #94a3b8; border-radius: 6px; padding: 10px 12px; }
.kpi.tone-success { border-left-color: #16a34a; }
.kpi.tone-info { border-left-color: #2563eb; }
.kpi.tone-warning { border-left-color: #f59e0b; }
.kpi.tone-error { border-left-color: #dc2626; }
.kpi-title { font-size: 12px; color: #64748b; text-transform: uppercase; letter-spacing: 0.04em; }
.kpi-value { font-size: 22px; font-weight: 700; margin-top: 4px; }
.kpi-caption { font-size: 12px; color: #64748b; margin-top: 2px; }
figure { margin: 0 0 12px; }
figcaption { font-weight: 600; font-size: 14px; margin-bottom: 6px; }
.chart-svg { width: 100%; height: auto; display: block; }
.legend { display: flex; flex-wrap: wrap; gap: 12px; font-size: 12px; color: #475569; }
.legend-item { display: inline-flex; align-items: center; gap: 6px; }
.swatch { display: inline-block; width: 12px; height: 12px; border-radius: 2px; }
.swatch.dashed { height: 3px; }
table { border-collapse: collapse; width: 100%; font-size: 13px; }
th, td { padding: 6px 10px; border-bottom: 1px solid #e2e8f0; text-align: left; }
th { background: #f1f5f9; font-weight: 600; }
td.num { text-align: right; font-variant-numeric: tabular-nums; }
.notice { padding: 10px 14px; border-radius: 6px; margin-bottom: 8px; font-size: 14px; }
.notice-success { background: #dcfce7; color: #14532d; }
.notice-info { background: #dbeafe; color: #1e3a8a; }
.notice-warning { background: #fef3c7; color: #78350f; }
.notice-error { background: #fee2e2; color: #7f1d1d; }
.unavailable { border: 1px dashed #cbd5e1; border-radius: 6px; padding: 12px; color: #64748b; margin-bottom: 8px; }
.unavailable p { margin: 4px 0 0; font-size: 13px; }
.empty { color: #94a3b8; font-style: italic; }
.banner { padding: 14px 18px; border-radius: 8px; margin-bottom: 16px; }
.banner p { margin: 6px 0 0; }
.banner-error { background: #fee2e2; border: 1px solid #fca5a5; color: #7f1d1d; }
.banner-warning { background: #fef3c7; border: 1px solid #fcd34d; color: #78350f; }
.help { color: #475569; font-size: 14px; }
"#
}

/// Escape HTML special characters
pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
