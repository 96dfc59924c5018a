// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::application::recovery_repository::RecoveryRepository;
use crate::infrastructure::bigquery::{BigQueryClient, ClientSettings};
use crate::infrastructure::bigquery_repository::BigQueryRepository;
use crate::infrastructure::config::{load_dashboard_config, load_secrets_config, DashboardConfig};
use crate::infrastructure::credentials::{resolve_credentials, TokenProvider, CREDENTIALS_ENV};
use crate::infrastructure::sql::QueryBuilder;
use crate::presentation::app_state::AppState;
use crate::presentation::routes::build_router;

const DEFAULT_LOG_FILTER: &str = "recovery_dashboard=info,tower_http=info";

/// Resolve credentials, prove them with one token exchange, and wire the
/// BigQuery repository.
async fn connect(config: &DashboardConfig) -> anyhow::Result<Arc<dyn RecoveryRepository>> {
    let secrets = load_secrets_config()?;
    let env_path = std::env::var_os(CREDENTIALS_ENV).map(Into::into);
    let credentials = resolve_credentials(secrets.credentials, env_path)?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.warehouse.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let tokens = Arc::new(TokenProvider::new(credentials, http.clone()));
    tokens
        .access_token()
        .await
        .context("initial token exchange failed")?;

    let client = BigQueryClient::new(http, tokens, ClientSettings::from(&config.warehouse));
    let queries = QueryBuilder::new(
        config.warehouse.records_table.clone(),
        config.warehouse.chain_mapping_table.clone(),
    );
    Ok(Arc::new(BigQueryRepository::new(client, queries, &config.business)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .init();

    // Load configuration
    let config = load_dashboard_config()?;
    let default_period = config.default_period()?;

    // Create repository (infrastructure layer) and services (application layer).
    // Credential problems keep the server up with a setup banner on every page.
    let state = match connect(&config).await {
        Ok(repository) => {
            tracing::info!(
                project = %config.warehouse.project_id,
                table = %config.warehouse.records_table,
                "warehouse connection ready"
            );
            AppState::ready(repository, config.business.clone(), &config.display, default_period)
        }
        Err(e) => {
            tracing::error!(error = ?e, "warehouse connection is not configured");
            AppState::misconfigured(format!("{:#}", e), &config.display, default_period)
        }
    };

    // Build router (presentation layer)
    let router = build_router(Arc::new(state));

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("server.bind = {:?} is not a socket address", config.server.bind))?;
    tracing::info!(%addr, "starting recovery-dashboard service");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
