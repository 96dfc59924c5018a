// Infrastructure layer - External dependencies and adapters
pub mod bigquery;
pub mod bigquery_repository;
pub mod chunked_json;
pub mod config;
pub mod credentials;
pub mod http_response;
pub mod result_table;
pub mod sql;
