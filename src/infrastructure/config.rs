use crate::domain::filter::Period;
use crate::domain::recovery::BusinessRules;
use crate::infrastructure::credentials::AuthorizedUser;
use crate::infrastructure::sql::is_valid_table_name;
use anyhow::Context;
use serde::Deserialize;

const ENV_PREFIX: &str = "DASHBOARD";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default)]
    pub server: ServerSettings,
    pub warehouse: WarehouseSettings,
    #[serde(default)]
    pub display: DisplaySettings,
    #[serde(default)]
    pub business: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WarehouseSettings {
    pub project_id: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_records_table")]
    pub records_table: String,
    #[serde(default = "default_chain_mapping_table")]
    pub chain_mapping_table: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DisplaySettings {
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    #[serde(default = "default_currency_decimals")]
    pub currency_decimals: usize,
    #[serde(default = "default_percent_decimals")]
    pub percent_decimals: usize,
    #[serde(default = "default_period")]
    pub default_period: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            currency_symbol: default_currency_symbol(),
            currency_decimals: default_currency_decimals(),
            percent_decimals: default_percent_decimals(),
            default_period: default_period(),
        }
    }
}

/// Contents of the optional `config/secrets` file
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SecretsConfig {
    #[serde(default)]
    pub credentials: Option<AuthorizedUser>,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_endpoint() -> String {
    "https://bigquery.googleapis.com/bigquery/v2".to_string()
}

fn default_records_table() -> String {
    "merchant_portal_export.chargeback_split_summary".to_string()
}

fn default_chain_mapping_table() -> String {
    "restaurant_aggregate_metrics.slug_am_mapping".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_max_results() -> u32 {
    10_000
}

fn default_max_polls() -> u32 {
    20
}

fn default_currency_symbol() -> String {
    "$".to_string()
}

fn default_currency_decimals() -> usize {
    2
}

fn default_percent_decimals() -> usize {
    1
}

fn default_period() -> String {
    Period::Last30Days.slug().to_string()
}

impl DashboardConfig {
    pub fn default_period(&self) -> anyhow::Result<Period> {
        self.display
            .default_period
            .parse()
            .with_context(|| format!("display.default_period = {:?}", self.display.default_period))
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.warehouse.project_id.trim().is_empty(),
            "warehouse.project_id must be set"
        );
        for (key, table) in [
            ("warehouse.records_table", &self.warehouse.records_table),
            ("warehouse.chain_mapping_table", &self.warehouse.chain_mapping_table),
        ] {
            anyhow::ensure!(is_valid_table_name(table), "{} = {:?} is not a valid table name", key, table);
        }
        anyhow::ensure!(self.warehouse.max_results > 0, "warehouse.max_results must be positive");
        self.default_period()?;
        Ok(())
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

fn build_dashboard_config(
    file: config::File<config::FileSourceFile, config::FileFormat>,
    env: config::Environment,
) -> anyhow::Result<DashboardConfig> {
    let settings = config::Config::builder().add_source(file).add_source(env).build()?;
    let parsed: DashboardConfig = settings.try_deserialize()?;
    parsed.validate()?;
    Ok(parsed)
}

pub fn load_dashboard_config() -> anyhow::Result<DashboardConfig> {
    build_dashboard_config(config::File::with_name("config/dashboard"), environment())
        .context("failed to load config/dashboard")
}

/// Inline credentials are optional, a missing secrets file is not an error
pub fn load_secrets_config() -> anyhow::Result<SecretsConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/secrets").required(false))
        .build()?;

    settings
        .try_deserialize()
        .context("failed to parse config/secrets")
}
