// BigQuery-backed recovery repository
use crate::application::recovery_repository::RecoveryRepository;
use crate::domain::filter::FilterSet;
use crate::domain::recovery::{
    BusinessRules, ChainAttention, ChainPerformance, DailyRecovery, IssueCategory, LocationRecovery,
    MonthlyPerformance, ORDER_VALUE_EDGES, OrderValueBand, PlatformIssuePerformance, StatusBreakdown,
    SubcategoryRecovery,
};
use crate::infrastructure::bigquery::BigQueryClient;
use crate::infrastructure::result_table::{DecodeError, Row};
use crate::infrastructure::sql::{QueryBuilder, SqlQuery};
use anyhow::Context;
use async_trait::async_trait;

const UNKNOWN: &str = "Unknown";

pub struct BigQueryRepository {
    client: BigQueryClient,
    queries: QueryBuilder,
    rules: BusinessRules,
}

impl BigQueryRepository {
    pub fn new(client: BigQueryClient, queries: QueryBuilder, rules: &BusinessRules) -> Self {
        Self {
            client,
            queries,
            rules: rules.clone(),
        }
    }

    async fn fetch<T>(
        &self,
        name: &'static str,
        query: SqlQuery,
        map: impl Fn(Row<'_>) -> Result<T, DecodeError>,
    ) -> anyhow::Result<Vec<T>> {
        let table = self
            .client
            .query(&query)
            .await
            .with_context(|| format!("{} query failed", name))?;
        tracing::debug!(dataset = name, rows = table.len(), "warehouse rows received");
        table
            .rows()
            .map(map)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("{} rows have an unexpected shape", name))
    }
}

fn platform(row: &Row<'_>) -> Result<String, DecodeError> {
    Ok(row.opt_text("platform")?.unwrap_or_else(|| UNKNOWN.to_string()))
}

fn monthly_row(row: Row<'_>) -> Result<MonthlyPerformance, DecodeError> {
    Ok(MonthlyPerformance {
        month: row.date("month")?,
        chain: row.text("chain")?,
        platform: platform(&row)?,
        active_locations: row.int("active_locations")?,
        total_orders: row.int("total_orders")?,
        disputes_won: row.int("disputes_won")?,
        potential: row.float("potential")?,
        recovered: row.float("recovered")?,
    })
}

fn platform_issue_row(row: Row<'_>) -> Result<PlatformIssuePerformance, DecodeError> {
    Ok(PlatformIssuePerformance {
        platform: platform(&row)?,
        issue_category: row.text("issue_category")?.parse().unwrap_or(IssueCategory::Other),
        total_orders: row.int("total_orders")?,
        disputes_won: row.int("disputes_won")?,
        potential: row.float("potential")?,
        recovered: row.float("recovered")?,
    })
}

fn daily_row(row: Row<'_>) -> Result<DailyRecovery, DecodeError> {
    Ok(DailyRecovery {
        date: row.date("day")?,
        orders: row.int("orders")?,
        disputes_won: row.int("disputes_won")?,
        recovered: row.float("recovered")?,
    })
}

fn location_row(row: Row<'_>) -> Result<LocationRecovery, DecodeError> {
    Ok(LocationRecovery {
        slug: row.opt_text("slug")?.unwrap_or_else(|| UNKNOWN.to_string()),
        chain: row.text("chain")?,
        recovered: row.float("recovered")?,
    })
}

fn chain_row(row: Row<'_>) -> Result<ChainPerformance, DecodeError> {
    Ok(ChainPerformance {
        chain: row.text("chain")?,
        locations: row.int("locations")?,
        total_orders: row.int("total_orders")?,
        disputes_won: row.int("disputes_won")?,
        potential: row.float("potential")?,
        recovered: row.float("recovered")?,
    })
}

fn status_row(row: Row<'_>) -> Result<StatusBreakdown, DecodeError> {
    Ok(StatusBreakdown {
        status: row.text("status")?,
        amount: row.float("amount")?,
        count: row.int("disputes")?,
    })
}

fn subcategory_row(row: Row<'_>) -> Result<SubcategoryRecovery, DecodeError> {
    Ok(SubcategoryRecovery {
        subcategory: row.text("subcategory")?,
        locations: row.int("locations")?,
        disputes: row.int("disputes")?,
        potential: row.float("potential")?,
        recovered: row.float("recovered")?,
    })
}

fn attention_row(row: Row<'_>) -> Result<ChainAttention, DecodeError> {
    Ok(ChainAttention {
        chain: row.text("chain")?,
        platform: platform(&row)?,
        baseline_rate: row.float("baseline_rate")?,
        recent_rate: row.float("recent_rate")?,
        months: row.int("months")?,
        potential: row.float("potential")?,
    })
}

fn order_value_row(row: Row<'_>) -> Result<OrderValueBand, DecodeError> {
    let raw = row.int("band")?;
    let band = usize::try_from(raw)
        .ok()
        .filter(|band| *band <= ORDER_VALUE_EDGES.len())
        .ok_or_else(|| DecodeError::Value {
            column: "band".to_string(),
            kind: "order value band".to_string(),
            value: raw.to_string(),
        })?;
    Ok(OrderValueBand {
        band,
        disputes: row.int("disputes")?,
        potential: row.float("potential")?,
        recovered: row.float("recovered")?,
        avg_order_value: row.opt_float("avg_order_value")?,
    })
}

#[async_trait]
impl RecoveryRepository for BigQueryRepository {
    async fn list_platforms(&self) -> anyhow::Result<Vec<String>> {
        self.fetch("platforms", self.queries.platforms(), |row| row.text("platform"))
            .await
    }

    async fn list_chains(&self) -> anyhow::Result<Vec<String>> {
        self.fetch("chains", self.queries.chains(), |row| row.text("chain"))
            .await
    }

    async fn monthly_performance(&self, filter: &FilterSet) -> anyhow::Result<Vec<MonthlyPerformance>> {
        self.fetch("monthly performance", self.queries.monthly_performance(filter), monthly_row)
            .await
    }

    async fn platform_issue_performance(&self, filter: &FilterSet) -> anyhow::Result<Vec<PlatformIssuePerformance>> {
        self.fetch(
            "platform issue performance",
            self.queries.platform_issue_performance(filter),
            platform_issue_row,
        )
        .await
    }

    async fn daily_recovery(&self, filter: &FilterSet) -> anyhow::Result<Vec<DailyRecovery>> {
        self.fetch("daily recovery", self.queries.daily_recovery(filter), daily_row)
            .await
    }

    async fn location_recovery(&self, filter: &FilterSet) -> anyhow::Result<Vec<LocationRecovery>> {
        self.fetch("location recovery", self.queries.location_recovery(filter), location_row)
            .await
    }

    async fn chain_performance(&self, filter: &FilterSet) -> anyhow::Result<Vec<ChainPerformance>> {
        let query = self
            .queries
            .chain_performance(filter, self.rules.top_chain_min_orders, self.rules.top_chain_limit);
        self.fetch("chain performance", query, chain_row).await
    }

    async fn status_breakdown(&self, filter: &FilterSet) -> anyhow::Result<Vec<StatusBreakdown>> {
        self.fetch("status breakdown", self.queries.status_breakdown(filter), status_row)
            .await
    }

    async fn subcategory_recovery(&self, filter: &FilterSet) -> anyhow::Result<Vec<SubcategoryRecovery>> {
        self.fetch(
            "subcategory recovery",
            self.queries.subcategory_recovery(filter),
            subcategory_row,
        )
        .await
    }

    async fn chain_attention(&self, filter: &FilterSet) -> anyhow::Result<Vec<ChainAttention>> {
        self.fetch(
            "chain attention",
            self.queries.chain_attention(filter, &self.rules),
            attention_row,
        )
        .await
    }

    async fn order_value_bands(&self, filter: &FilterSet) -> anyhow::Result<Vec<OrderValueBand>> {
        self.fetch("order value bands", self.queries.order_value_bands(filter), order_value_row)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filter::DateRange;
    use crate::infrastructure::bigquery::tests::client;
    use chrono::NaiveDate;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn repository(server: &MockServer) -> BigQueryRepository {
        BigQueryRepository::new(
            client(server, 0, 0).await,
            QueryBuilder::new("ds.records", "ds.mapping"),
            &BusinessRules::default(),
        )
    }

    #[tokio::test]
    async fn test_monthly_rows_are_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/test-project/queries"))
            .and(body_string_contains("DATE_TRUNC(record_date, MONTH)"))
            .and(body_partial_json(json!({
                "queryParameters": [
                    {"name": "start_date", "parameterValue": {"value": "2024-01-01"}},
                    {"name": "end_date", "parameterValue": {"value": "2024-01-31"}}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobComplete": true,
                "schema": {"fields": [
                    {"name": "month", "type": "DATE"},
                    {"name": "chain", "type": "STRING"},
                    {"name": "platform", "type": "STRING"},
                    {"name": "active_locations", "type": "INTEGER"},
                    {"name": "total_orders", "type": "INTEGER"},
                    {"name": "disputes_won", "type": "INTEGER"},
                    {"name": "potential", "type": "FLOAT"},
                    {"name": "recovered", "type": "FLOAT"}
                ]},
                "rows": [
                    {"f": [{"v": "2024-01-01"}, {"v": "Chain A"}, {"v": "DoorDash"}, {"v": "3"},
                           {"v": "120"}, {"v": "40"}, {"v": "900.5"}, {"v": "300.25"}]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let filter = FilterSet::new(DateRange::parse("2024-01-01", "2024-01-31").unwrap());
        let rows = repository(&server).await.monthly_performance(&filter).await.unwrap();

        assert_eq!(
            rows,
            vec![MonthlyPerformance {
                month: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                chain: "Chain A".to_string(),
                platform: "DoorDash".to_string(),
                active_locations: 3,
                total_orders: 120,
                disputes_won: 40,
                potential: 900.5,
                recovered: 300.25,
            }]
        );
    }

    fn rows_response(fields: serde_json::Value, rows: Vec<Vec<&str>>) -> ResponseTemplate {
        let rows: Vec<serde_json::Value> = rows
            .into_iter()
            .map(|cells| json!({"f": cells.into_iter().map(|v| json!({"v": v})).collect::<Vec<_>>()}))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({
            "jobComplete": true,
            "schema": {"fields": fields},
            "rows": rows
        }))
    }

    fn bound_filter(platforms: serde_json::Value) -> serde_json::Value {
        json!({
            "queryParameters": [
                {"name": "start_date", "parameterType": {"type": "DATE"}, "parameterValue": {"value": "2024-01-01"}},
                {"name": "end_date", "parameterType": {"type": "DATE"}, "parameterValue": {"value": "2024-01-31"}},
                {"name": "platforms", "parameterValue": {"arrayValues": platforms}}
            ]
        })
    }

    fn daily_fields() -> serde_json::Value {
        json!([
            {"name": "day", "type": "DATE"},
            {"name": "orders", "type": "INTEGER"},
            {"name": "disputes_won", "type": "INTEGER"},
            {"name": "recovered", "type": "FLOAT"}
        ])
    }

    fn platform_issue_fields() -> serde_json::Value {
        json!([
            {"name": "platform", "type": "STRING"},
            {"name": "issue_category", "type": "STRING"},
            {"name": "total_orders", "type": "INTEGER"},
            {"name": "disputes_won", "type": "INTEGER"},
            {"name": "potential", "type": "FLOAT"},
            {"name": "recovered", "type": "FLOAT"}
        ])
    }

    #[tokio::test]
    async fn test_daily_recovery_binds_filter_and_stays_in_range() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/test-project/queries"))
            .and(body_string_contains("record_date AS day"))
            .and(body_partial_json(bound_filter(json!([{"value": "DoorDash"}]))))
            .respond_with(rows_response(
                daily_fields(),
                vec![vec!["2024-01-03", "10", "4", "120.5"], vec!["2024-01-20", "6", "2", "40"]],
            ))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/projects/test-project/queries"))
            .and(body_string_contains("record_date AS day"))
            .and(body_partial_json(bound_filter(json!([]))))
            .respond_with(rows_response(
                daily_fields(),
                vec![
                    vec!["2024-01-03", "14", "5", "160.5"],
                    vec!["2024-01-11", "3", "1", "15"],
                    vec!["2024-01-20", "6", "2", "40"],
                ],
            ))
            .expect(1)
            .mount(&server)
            .await;

        let repository = repository(&server).await;
        let all = FilterSet::new(DateRange::parse("2024-01-01", "2024-01-31").unwrap());
        let doordash = all.clone().with_platforms(["DoorDash"]);
        let unfiltered = repository.daily_recovery(&all).await.unwrap();
        let filtered = repository.daily_recovery(&doordash).await.unwrap();

        assert!(filtered.iter().chain(&unfiltered).all(|d| all.range.contains(d.date)));
        assert!(filtered.windows(2).all(|w| w[0].date < w[1].date));
        assert!(filtered.len() <= unfiltered.len());
        assert!(filtered.iter().all(|d| unfiltered.iter().any(|u| u.date == d.date)));
        assert_eq!(filtered[0].recovered, 120.5);
    }

    #[tokio::test]
    async fn test_platform_issue_rows_follow_platform_filter() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/test-project/queries"))
            .and(body_string_contains("GROUP BY platform, issue_category"))
            .and(body_partial_json(bound_filter(json!([{"value": "DoorDash"}]))))
            .respond_with(rows_response(
                platform_issue_fields(),
                vec![
                    vec!["DoorDash", "Inaccurate Order", "20", "8", "400", "150"],
                    vec!["DoorDash", "Cancelled Order", "5", "1", "100", "2"],
                ],
            ))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/projects/test-project/queries"))
            .and(body_string_contains("GROUP BY platform, issue_category"))
            .and(body_partial_json(bound_filter(json!([]))))
            .respond_with(rows_response(
                platform_issue_fields(),
                vec![
                    vec!["DoorDash", "Inaccurate Order", "20", "8", "400", "150"],
                    vec!["UberEats", "Inaccurate Order", "12", "6", "300", "90"],
                    vec!["DoorDash", "Cancelled Order", "5", "1", "100", "2"],
                ],
            ))
            .expect(1)
            .mount(&server)
            .await;

        let repository = repository(&server).await;
        let all = FilterSet::new(DateRange::parse("2024-01-01", "2024-01-31").unwrap());
        let doordash = all.clone().with_platforms(["DoorDash"]);
        let unfiltered = repository.platform_issue_performance(&all).await.unwrap();
        let filtered = repository.platform_issue_performance(&doordash).await.unwrap();

        assert!(filtered.iter().all(|r| r.platform == "DoorDash"));
        assert!(filtered.len() <= unfiltered.len());
        assert!(filtered.iter().all(|r| unfiltered.contains(r)));
        assert_eq!(filtered[1].issue_category, IssueCategory::CancelledOrder);
    }

    #[tokio::test]
    async fn test_attention_binds_thresholds_and_maps_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/test-project/queries"))
            .and(body_string_contains("INTERVAL 365 DAY"))
            .and(body_partial_json(json!({
                "queryParameters": [
                    {"name": "end_date", "parameterValue": {"value": "2024-06-30"}},
                    {"name": "platforms"},
                    {"name": "chains", "parameterValue": {"arrayValues": [{"value": "Taco Hut"}]}},
                    {"name": "issue_categories"},
                    {"name": "min_potential", "parameterType": {"type": "FLOAT64"}, "parameterValue": {"value": "1000"}},
                    {"name": "min_decline", "parameterValue": {"value": "20"}}
                ]
            })))
            .respond_with(rows_response(
                json!([
                    {"name": "chain", "type": "STRING"},
                    {"name": "platform", "type": "STRING"},
                    {"name": "baseline_rate", "type": "FLOAT"},
                    {"name": "recent_rate", "type": "FLOAT"},
                    {"name": "months", "type": "INTEGER"},
                    {"name": "potential", "type": "FLOAT"}
                ]),
                vec![vec!["Taco Hut", "UberEats", "40", "28", "7", "5200"]],
            ))
            .expect(1)
            .mount(&server)
            .await;

        let filter = FilterSet::new(DateRange::parse("2024-06-01", "2024-06-30").unwrap()).with_chains(["Taco Hut"]);
        let rows = repository(&server).await.chain_attention(&filter).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].chain, "Taco Hut");
        assert_eq!(rows[0].months, 7);
        assert_eq!(rows[0].decline_pct(), Some(30.0));
    }

    #[tokio::test]
    async fn test_order_value_bands_keep_null_average() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/test-project/queries"))
            .and(body_string_contains("GROUP BY band"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobComplete": true,
                "schema": {"fields": [
                    {"name": "band", "type": "INTEGER"},
                    {"name": "disputes", "type": "INTEGER"},
                    {"name": "potential", "type": "FLOAT"},
                    {"name": "recovered", "type": "FLOAT"},
                    {"name": "avg_order_value", "type": "FLOAT"}
                ]},
                "rows": [
                    {"f": [{"v": "0"}, {"v": "4"}, {"v": "80"}, {"v": "20"}, {"v": "14.5"}]},
                    {"f": [{"v": "7"}, {"v": "1"}, {"v": "250"}, {"v": "0"}, {"v": null}]}
                ]
            })))
            .mount(&server)
            .await;

        let filter = FilterSet::new(DateRange::parse("2024-01-01", "2024-01-31").unwrap());
        let rows = repository(&server).await.order_value_bands(&filter).await.unwrap();

        assert_eq!(rows[0].avg_order_value, Some(14.5));
        assert_eq!(rows[0].recovery_rate(), Some(25.0));
        assert_eq!(rows[1].band, 7);
        assert_eq!(rows[1].avg_order_value, None);
    }

    #[tokio::test]
    async fn test_out_of_range_band_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/test-project/queries"))
            .respond_with(rows_response(
                json!([
                    {"name": "band", "type": "INTEGER"},
                    {"name": "disputes", "type": "INTEGER"},
                    {"name": "potential", "type": "FLOAT"},
                    {"name": "recovered", "type": "FLOAT"},
                    {"name": "avg_order_value", "type": "FLOAT"}
                ]),
                vec![vec!["12", "1", "10", "1", "5"]],
            ))
            .mount(&server)
            .await;

        let filter = FilterSet::new(DateRange::parse("2024-01-01", "2024-01-31").unwrap());
        let err = repository(&server).await.order_value_bands(&filter).await.unwrap_err();
        assert!(format!("{:#}", err).contains("order value bands rows have an unexpected shape"));
    }

    #[tokio::test]
    async fn test_unexpected_shape_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/test-project/queries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobComplete": true,
                "schema": {"fields": [{"name": "status", "type": "STRING"}]},
                "rows": [{"f": [{"v": "ACCEPTED"}]}]
            })))
            .mount(&server)
            .await;

        let filter = FilterSet::new(DateRange::parse("2024-01-01", "2024-01-31").unwrap());
        let err = repository(&server).await.status_breakdown(&filter).await.unwrap_err();
        assert!(format!("{:#}", err).contains("status breakdown rows have an unexpected shape"));
    }
}
