// HTTP request handlers
use crate::application::catalog_service::FilterOption;
use crate::domain::dashboard::Page;
use crate::domain::filter::{is_all_marker, DateRange, FilterError, FilterSet, Period};
use crate::domain::recovery::IssueCategory;
use crate::infrastructure::chunked_json::stream_from_receiver;
use crate::infrastructure::http_response::{accepts_brotli, html_response, json_response};
use crate::presentation::app_state::{AppState, Backend};
use crate::presentation::html::{self, FilterForm};
use axum::{
    extract::{Path, Query, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Filter selection as it arrives in the query string.
/// `platforms`, `chains` and `issues` take comma-separated lists; "all"
/// clears any of them.
#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    pub start: Option<String>,
    pub end: Option<String>,
    pub period: Option<String>,
    pub platforms: Option<String>,
    pub chains: Option<String>,
    pub issues: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl FilterParams {
    /// Explicit dates win over the period; a missing end of the range is
    /// taken from the period (or the default period) ending today.
    pub fn resolve(&self, today: NaiveDate, default_period: Period) -> Result<FilterSet, FilterError> {
        let period = match non_blank(&self.period) {
            Some(raw) => raw.parse()?,
            None => default_period,
        };
        let preset = period.range(today);
        let start = non_blank(&self.start)
            .map(str::to_string)
            .unwrap_or_else(|| preset.start().to_string());
        let end = non_blank(&self.end)
            .map(str::to_string)
            .unwrap_or_else(|| preset.end().to_string());
        let range = DateRange::parse(&start, &end)?;

        let issues: Vec<&str> = non_blank(&self.issues)
            .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let categories = if issues.iter().any(|s| is_all_marker(s)) {
            Vec::new()
        } else {
            issues
                .into_iter()
                .map(str::parse)
                .collect::<Result<Vec<IssueCategory>, _>>()?
        };

        let platforms = non_blank(&self.platforms).unwrap_or_default();
        let chains = non_blank(&self.chains).unwrap_or_default();
        Ok(FilterSet::new(range)
            .with_platforms(platforms.split(','))
            .with_chains(chains.split(','))
            .with_issue_categories(categories))
    }

    fn form(&self, default_period: Period) -> FilterForm {
        let untouched = [&self.period, &self.start, &self.end].iter().all(|v| non_blank(v).is_none());
        let period = if untouched {
            default_period.slug().to_string()
        } else {
            non_blank(&self.period).unwrap_or_default().to_string()
        };
        FilterForm {
            period,
            start: non_blank(&self.start).unwrap_or_default().to_string(),
            end: non_blank(&self.end).unwrap_or_default().to_string(),
            platform: non_blank(&self.platforms).unwrap_or_default().to_string(),
            chain: non_blank(&self.chains).unwrap_or_default().to_string(),
            issue: non_blank(&self.issues).unwrap_or_default().to_string(),
            platform_options: Vec::new(),
            chain_options: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

async fn html_reply(status: StatusCode, body: String, compress: bool) -> Response {
    html_response(status, body, compress)
        .await
        .unwrap_or_else(IntoResponse::into_response)
}

async fn json_reply<T: Serialize>(status: StatusCode, value: &T, compress: bool) -> Response {
    json_response(status, value, compress)
        .await
        .unwrap_or_else(IntoResponse::into_response)
}

async fn json_error(status: StatusCode, message: String, compress: bool) -> Response {
    json_reply(status, &ErrorBody { error: message }, compress).await
}

fn not_configured(reason: &str) -> String {
    format!("warehouse connection is not configured: {}", reason)
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// The landing page is the executive summary
pub async fn index(RawQuery(query): RawQuery) -> Redirect {
    let slug = Page::ExecutiveSummary.slug();
    match query.filter(|q| !q.is_empty()) {
        Some(query) => Redirect::to(&format!("/pages/{}?{}", slug, query)),
        None => Redirect::to(&format!("/pages/{}", slug)),
    }
}

/// Render a dashboard page as a complete HTML document
pub async fn page_html(
    Path(slug): Path<String>,
    Query(params): Query<FilterParams>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let compress = accepts_brotli(&headers);
    let query = query.unwrap_or_default();

    let Some(page) = Page::from_slug(&slug) else {
        return html_reply(StatusCode::NOT_FOUND, html::render_not_found(&slug), compress).await;
    };
    let mut form = params.form(state.default_period);

    let (pages, catalog) = match &state.backend {
        Backend::Ready { pages, catalog, .. } => (pages, catalog),
        Backend::Misconfigured(reason) => {
            let body = html::render_config_error(page, &form, &query, reason);
            return html_reply(StatusCode::SERVICE_UNAVAILABLE, body, compress).await;
        }
    };

    let filter = match params.resolve(today(), state.default_period) {
        Ok(filter) => filter,
        Err(e) => {
            tracing::warn!(page = page.slug(), error = %e, "rejected filters");
            let body = html::render_filter_error(page, &form, &query, &e.to_string());
            return html_reply(StatusCode::BAD_REQUEST, body, compress).await;
        }
    };

    let (platforms, chains, view) = tokio::join!(
        catalog.list_platforms(),
        catalog.list_chains(),
        pages.render_page(page, &filter)
    );
    form.platform_options = options_or_empty("platform", platforms);
    form.chain_options = options_or_empty("chain", chains);

    let body = html::render_page(&view, &form, &query, &state.formatter);
    html_reply(StatusCode::OK, body, compress).await
}

fn options_or_empty(kind: &str, options: anyhow::Result<Vec<FilterOption>>) -> Vec<FilterOption> {
    options.unwrap_or_else(|e| {
        tracing::warn!(kind, error = ?e, "option list unavailable, showing the current selection only");
        Vec::new()
    })
}

/// Render a dashboard page as its JSON widget tree
pub async fn page_json(
    Path(slug): Path<String>,
    Query(params): Query<FilterParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let compress = accepts_brotli(&headers);

    let Some(page) = Page::from_slug(&slug) else {
        return json_error(StatusCode::NOT_FOUND, format!("unknown page '{}'", slug), compress).await;
    };
    let pages = match &state.backend {
        Backend::Ready { pages, .. } => pages,
        Backend::Misconfigured(reason) => {
            return json_error(StatusCode::SERVICE_UNAVAILABLE, not_configured(reason), compress).await;
        }
    };
    let filter = match params.resolve(today(), state.default_period) {
        Ok(filter) => filter,
        Err(e) => {
            tracing::warn!(page = page.slug(), error = %e, "rejected filters");
            return json_error(StatusCode::BAD_REQUEST, e.to_string(), compress).await;
        }
    };

    let view = pages.render_page(page, &filter).await;
    json_reply(StatusCode::OK, &view, compress).await
}

/// Stream a dashboard page panel by panel (progressive loading)
pub async fn page_stream(
    Path(slug): Path<String>,
    Query(params): Query<FilterParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(page) = Page::from_slug(&slug) else {
        return json_error(StatusCode::NOT_FOUND, format!("unknown page '{}'", slug), false).await;
    };
    let streaming = match &state.backend {
        Backend::Ready { streaming, .. } => streaming,
        Backend::Misconfigured(reason) => {
            return json_error(StatusCode::SERVICE_UNAVAILABLE, not_configured(reason), false).await;
        }
    };
    let filter = match params.resolve(today(), state.default_period) {
        Ok(filter) => filter,
        Err(e) => {
            tracing::warn!(page = page.slug(), error = %e, "rejected filters");
            return json_error(StatusCode::BAD_REQUEST, e.to_string(), false).await;
        }
    };

    let rx = streaming.stream_page(page, filter);
    stream_from_receiver(rx).into_response()
}

/// List the platforms present in the warehouse
pub async fn list_platforms(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let compress = accepts_brotli(&headers);
    let catalog = match &state.backend {
        Backend::Ready { catalog, .. } => catalog,
        Backend::Misconfigured(reason) => {
            return json_error(StatusCode::SERVICE_UNAVAILABLE, not_configured(reason), compress).await;
        }
    };

    match catalog.list_platforms().await {
        Ok(platforms) => json_reply(StatusCode::OK, &platforms, compress).await,
        Err(e) => {
            tracing::error!(error = ?e, "failed to list platforms");
            json_error(StatusCode::BAD_GATEWAY, format!("{:#}", e), compress).await
        }
    }
}

/// List the chains known to the location mapping
pub async fn list_chains(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let compress = accepts_brotli(&headers);
    let catalog = match &state.backend {
        Backend::Ready { catalog, .. } => catalog,
        Backend::Misconfigured(reason) => {
            return json_error(StatusCode::SERVICE_UNAVAILABLE, not_configured(reason), compress).await;
        }
    };

    match catalog.list_chains().await {
        Ok(chains) => json_reply(StatusCode::OK, &chains, compress).await,
        Err(e) => {
            tracing::error!(error = ?e, "failed to list chains");
            json_error(StatusCode::BAD_GATEWAY, format!("{:#}", e), compress).await
        }
    }
}

/// List the issue categories accepted by the `issues` filter
pub async fn list_issue_types(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let compress = accepts_brotli(&headers);
    match &state.backend {
        Backend::Ready { catalog, .. } => json_reply(StatusCode::OK, &catalog.list_issue_types(), compress).await,
        Backend::Misconfigured(reason) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, not_configured(reason), compress).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> FilterParams {
        let mut params = FilterParams::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "start" => params.start = value,
                "end" => params.end = value,
                "period" => params.period = value,
                "platforms" => params.platforms = value,
                "chains" => params.chains = value,
                "issues" => params.issues = value,
                other => panic!("unexpected key {}", other),
            }
        }
        params
    }

    #[test]
    fn test_default_period_applies_without_params() {
        let filter = FilterParams::default()
            .resolve(date(2024, 3, 15), Period::Last30Days)
            .unwrap();
        assert_eq!(filter.range.start(), date(2024, 2, 14));
        assert_eq!(filter.range.end(), date(2024, 3, 15));
        assert!(filter.all_platforms());
        assert!(filter.all_issue_categories());
    }

    #[test]
    fn test_explicit_dates_override_period() {
        let filter = params(&[("period", "year_to_date"), ("start", "2024-01-01"), ("end", "2024-01-31")])
            .resolve(date(2024, 3, 15), Period::Last30Days)
            .unwrap();
        assert_eq!(filter.range.days(), 31);

        let filter = params(&[("period", "year_to_date"), ("end", "2024-02-29")])
            .resolve(date(2024, 3, 15), Period::Last30Days)
            .unwrap();
        assert_eq!(filter.range.start(), date(2024, 1, 1));
        assert_eq!(filter.range.end(), date(2024, 2, 29));
    }

    #[test]
    fn test_lists_are_split_and_validated() {
        let filter = params(&[("platforms", "UberEats,DoorDash"), ("issues", "cancelled, Inaccurate Order")])
            .resolve(date(2024, 3, 15), Period::Last30Days)
            .unwrap();
        assert_eq!(filter.platforms, vec!["DoorDash", "UberEats"]);
        assert_eq!(
            filter.issue_categories,
            vec![IssueCategory::InaccurateOrder, IssueCategory::CancelledOrder]
        );

        let filter = params(&[("issues", "cancelled,all")])
            .resolve(date(2024, 3, 15), Period::Last30Days)
            .unwrap();
        assert!(filter.all_issue_categories());

        let err = params(&[("issues", "refund")])
            .resolve(date(2024, 3, 15), Period::Last30Days)
            .unwrap_err();
        assert_eq!(err, FilterError::UnknownIssueType("refund".to_string()));

        let filter = params(&[("chains", "Taco Hut, Burger Barn")])
            .resolve(date(2024, 3, 15), Period::Last30Days)
            .unwrap();
        assert_eq!(filter.chains, vec!["Burger Barn", "Taco Hut"]);
        let filter = params(&[("chains", "all")])
            .resolve(date(2024, 3, 15), Period::Last30Days)
            .unwrap();
        assert!(filter.all_chains());
    }

    #[test]
    fn test_invalid_input_is_rejected() {
        let today = date(2024, 3, 15);
        assert!(matches!(
            params(&[("start", "2024-02-01"), ("end", "2024-01-01")]).resolve(today, Period::Last30Days),
            Err(FilterError::InvertedRange { .. })
        ));
        assert!(matches!(
            params(&[("period", "fortnight")]).resolve(today, Period::Last30Days),
            Err(FilterError::UnknownPeriod(_))
        ));
        assert!(matches!(
            params(&[("start", "01/02/2024")]).resolve(today, Period::Last30Days),
            Err(FilterError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_form_shows_default_period_on_first_visit() {
        assert_eq!(FilterParams::default().form(Period::Last90Days).period, "last_90_days");
        let form = params(&[("start", "2024-01-01")]).form(Period::Last90Days);
        assert_eq!(form.period, "");
        assert_eq!(form.start, "2024-01-01");
    }
}
