// BigQuery REST client - jobs.query with polling, paging and bounded retries
use crate::infrastructure::config::WarehouseSettings;
use crate::infrastructure::credentials::{CredentialsError, TokenProvider};
use crate::infrastructure::result_table::{DecodeError, RawRow, ResultTable, TableSchema};
use crate::infrastructure::sql::{QueryParameter, SqlQuery};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("warehouse authentication failed: {0}")]
    Authentication(String),
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error("warehouse request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("warehouse request timed out")]
    Timeout,
    #[error("warehouse returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("cannot decode warehouse rows: {0}")]
    Decode(#[from] DecodeError),
    #[error("unexpected warehouse response: {0}")]
    Protocol(String),
    #[error("query job {job_id} still running after {polls} polls")]
    JobIncomplete { job_id: String, polls: u32 },
}

impl WarehouseError {
    fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            WarehouseError::Timeout
        } else {
            WarehouseError::Transport(error)
        }
    }

    /// Worth another attempt with the same request
    pub fn is_transient(&self) -> bool {
        match self {
            WarehouseError::Timeout | WarehouseError::Transport(_) => true,
            WarehouseError::Api { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            WarehouseError::Credentials(CredentialsError::Request(e)) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub endpoint: String,
    pub project_id: String,
    pub location: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub max_results: u32,
    pub max_polls: u32,
}

impl From<&WarehouseSettings> for ClientSettings {
    fn from(settings: &WarehouseSettings) -> Self {
        Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            project_id: settings.project_id.clone(),
            location: settings.location.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries,
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
            max_results: settings.max_results,
            max_polls: settings.max_polls,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequestBody<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    parameter_mode: &'static str,
    query_parameters: &'a [QueryParameter],
    timeout_ms: u64,
    max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<RawRow>,
    #[serde(default)]
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct BigQueryClient {
    http: reqwest::Client,
    tokens: Arc<TokenProvider>,
    settings: ClientSettings,
}

impl BigQueryClient {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenProvider>, settings: ClientSettings) -> Self {
        Self { http, tokens, settings }
    }

    /// Run one query to completion and return every row
    pub async fn query(&self, query: &SqlQuery) -> Result<ResultTable, WarehouseError> {
        let started = Instant::now();
        let mut response: QueryResponse = self.with_retry("jobs.query", || self.start_query(query)).await?;

        let mut polls = 0;
        while !response.job_complete {
            let job = job_reference(&response)?;
            if polls >= self.settings.max_polls {
                return Err(WarehouseError::JobIncomplete {
                    job_id: job.job_id,
                    polls,
                });
            }
            polls += 1;
            tracing::debug!(job_id = %job.job_id, polls, "query job still running");
            response = self
                .with_retry("jobs.getQueryResults", || self.query_results(&job, None))
                .await?;
        }

        let schema = response.schema.take().unwrap_or_default();
        let mut table = ResultTable::decode(&schema, &response.rows)?;
        let mut pages = 1;
        let mut page_token = response.page_token.take();
        while let Some(token) = page_token {
            let job = job_reference(&response)?;
            let page = self
                .with_retry("jobs.getQueryResults", || self.query_results(&job, Some(token.as_str())))
                .await?;
            table.extend(&schema, &page.rows)?;
            page_token = page.page_token;
            pages += 1;
        }

        tracing::debug!(
            rows = table.len(),
            pages,
            polls,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "warehouse query finished"
        );
        Ok(table)
    }

    fn server_wait(&self) -> u64 {
        // Leave headroom for the round trip within the client timeout
        (self.settings.timeout.as_millis() as u64).saturating_mul(3) / 4
    }

    async fn start_query(&self, query: &SqlQuery) -> Result<QueryResponse, WarehouseError> {
        let url = format!(
            "{}/projects/{}/queries",
            self.settings.endpoint,
            urlencoding::encode(&self.settings.project_id)
        );
        let body = QueryRequestBody {
            query: &query.sql,
            use_legacy_sql: false,
            parameter_mode: "NAMED",
            query_parameters: &query.parameters,
            timeout_ms: self.server_wait(),
            max_results: self.settings.max_results,
            location: self.settings.location.as_deref(),
        };
        self.send(self.http.post(url).json(&body)).await
    }

    async fn query_results(&self, job: &JobReference, page_token: Option<&str>) -> Result<QueryResponse, WarehouseError> {
        let url = format!(
            "{}/projects/{}/queries/{}",
            self.settings.endpoint,
            urlencoding::encode(&job.project_id),
            urlencoding::encode(&job.job_id)
        );
        let mut params = vec![
            ("timeoutMs", self.server_wait().to_string()),
            ("maxResults", self.settings.max_results.to_string()),
        ];
        if let Some(location) = job.location.as_ref().or(self.settings.location.as_ref()) {
            params.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        self.send(self.http.get(url).query(&params)).await
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, WarehouseError> {
        let token = self.tokens.access_token().await?;
        let response = request
            .bearer_auth(token)
            .timeout(self.settings.timeout)
            .send()
            .await
            .map_err(WarehouseError::from_transport)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| WarehouseError::Protocol(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|envelope| envelope.error.message)
            .unwrap_or(body);
        match status {
            StatusCode::UNAUTHORIZED => {
                self.tokens.invalidate().await;
                Err(WarehouseError::Authentication(message))
            }
            StatusCode::FORBIDDEN => Err(WarehouseError::Authentication(message)),
            _ => Err(WarehouseError::Api {
                status: status.as_u16(),
                message,
            }),
        }
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, WarehouseError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, WarehouseError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.settings.max_retries => {
                    let delay = self.settings.retry_backoff.saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying warehouse call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn job_reference(response: &QueryResponse) -> Result<JobReference, WarehouseError> {
    response
        .job_reference
        .clone()
        .ok_or_else(|| WarehouseError::Protocol("incomplete result without a job reference".to_string()))
}
