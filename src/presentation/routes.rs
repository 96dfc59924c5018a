// Router assembly
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    health_check, index, list_chains, list_issue_types, list_platforms, page_html, page_json, page_stream,
};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Compression is handled in the response builders, so there is no
/// CompressionLayer here.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(health_check))
        .route("/pages/:page", get(page_html))
        .route("/api/pages/:page", get(page_json))
        .route("/api/pages/:page/stream", get(page_stream))
        .route("/api/platforms", get(list_platforms))
        .route("/api/chains", get(list_chains))
        .route("/api/issue-types", get(list_issue_types))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
