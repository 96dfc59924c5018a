// Parameterized aggregate queries against the recovery records table
use crate::domain::filter::FilterSet;
use crate::domain::recovery::{BusinessRules, ORDER_VALUE_EDGES};
use chrono::NaiveDate;
use serde::Serialize;

/// Table references are interpolated into SQL text, so only plain
/// `project.dataset.table` style names are accepted.
pub fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        && name.split('.').all(|part| !part.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterType {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_type: Option<Box<ParameterType>>,
}

impl ParameterType {
    fn scalar(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            array_type: None,
        }
    }

    fn array_of(kind: &str) -> Self {
        Self {
            kind: "ARRAY".to_string(),
            array_type: Some(Box::new(Self::scalar(kind))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_values: Option<Vec<ParameterValue>>,
}

/// A BigQuery named query parameter, in its REST wire shape
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameter {
    pub name: String,
    pub parameter_type: ParameterType,
    pub parameter_value: ParameterValue,
}

impl QueryParameter {
    fn scalar(name: &str, kind: &str, value: String) -> Self {
        Self {
            name: name.to_string(),
            parameter_type: ParameterType::scalar(kind),
            parameter_value: ParameterValue {
                value: Some(value),
                array_values: None,
            },
        }
    }

    pub fn date(name: &str, value: NaiveDate) -> Self {
        Self::scalar(name, "DATE", value.format("%Y-%m-%d").to_string())
    }

    pub fn int64(name: &str, value: i64) -> Self {
        Self::scalar(name, "INT64", value.to_string())
    }

    pub fn float64(name: &str, value: f64) -> Self {
        Self::scalar(name, "FLOAT64", value.to_string())
    }

    pub fn string_array<I, S>(name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            parameter_type: ParameterType::array_of("STRING"),
            parameter_value: ParameterValue {
                value: None,
                array_values: Some(
                    values
                        .into_iter()
                        .map(|v| ParameterValue {
                            value: Some(v.into()),
                            array_values: None,
                        })
                        .collect(),
                ),
            },
        }
    }
}

/// Records inside the viewer's date range
const RANGE_WINDOW: &str = "cs.chargeback_date BETWEEN @start_date AND @end_date";

/// Twelve months of history ending on the viewer's end date
const TRAILING_YEAR_WINDOW: &str = "cs.chargeback_date BETWEEN DATE_SUB(@end_date, INTERVAL 365 DAY) AND @end_date";

/// SQL text plus the parameters it references
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub parameters: Vec<QueryParameter>,
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    records_table: String,
    chain_mapping_table: String,
}

impl QueryBuilder {
    pub fn new(records_table: impl Into<String>, chain_mapping_table: impl Into<String>) -> Self {
        Self {
            records_table: records_table.into(),
            chain_mapping_table: chain_mapping_table.into(),
        }
    }

    /// Normalized records inside `window` with the platform, chain and issue
    /// filters applied. An empty or NULL array disables its filter.
    fn filtered_records(&self, window: &str) -> String {
        format!(
            r#"WITH records AS (
  SELECT
    cs.chargeback_date AS record_date,
    cs.platform,
    cs.slug,
    COALESCE(m.chain, 'Unknown') AS chain,
    CASE
      WHEN LOWER(COALESCE(cs.error_category, '')) LIKE '%inaccurate%'
        OR LOWER(COALESCE(cs.error_subcategory, '')) LIKE '%wrong%'
        OR LOWER(COALESCE(cs.error_subcategory, '')) LIKE '%missing%'
      THEN 'Inaccurate Order'
      WHEN LOWER(COALESCE(cs.error_category, '')) LIKE '%cancel%'
        OR LOWER(COALESCE(cs.error_subcategory, '')) LIKE '%cancel%'
      THEN 'Cancelled Order'
      ELSE 'Other'
    END AS issue_category,
    COALESCE(NULLIF(TRIM(cs.error_subcategory), ''), 'Unspecified') AS subcategory,
    COALESCE(cs.external_status, 'UNKNOWN') AS status,
    COALESCE(cs.subtotal, 0) AS order_value,
    COALESCE(cs.orders_count, 0) AS orders,
    COALESCE(cs.won_disputes_count, 0) AS disputes_won,
    COALESCE(cs.customer_refunds, 0) + COALESCE(cs.unfulfilled_refunds, 0)
      + COALESCE(cs.unfulfilled_sales, 0) AS potential,
    COALESCE(cs.customer_refunds_won_disputes, 0) + COALESCE(cs.unfulfilled_refunds_won_disputes, 0)
      + COALESCE(cs.unfulfilled_sales_won_disputes, 0) AS recovered
  FROM `{records}` cs
  LEFT JOIN `{mapping}` m
    ON cs.slug = m.slug
  WHERE {window}
),
filtered AS (
  SELECT *
  FROM records
  WHERE (IFNULL(ARRAY_LENGTH(@platforms), 0) = 0 OR platform IN UNNEST(@platforms))
    AND (IFNULL(ARRAY_LENGTH(@chains), 0) = 0 OR chain IN UNNEST(@chains))
    AND (IFNULL(ARRAY_LENGTH(@issue_categories), 0) = 0 OR issue_category IN UNNEST(@issue_categories))
)
"#,
            records = self.records_table,
            mapping = self.chain_mapping_table,
            window = window,
        )
    }

    fn filtered(&self, select: &str, filter: &FilterSet) -> SqlQuery {
        SqlQuery {
            sql: format!("{}{}", self.filtered_records(RANGE_WINDOW), select),
            parameters: filter_parameters(filter),
        }
    }

    pub fn platforms(&self) -> SqlQuery {
        SqlQuery {
            sql: format!(
                "SELECT DISTINCT platform\nFROM `{}`\nWHERE platform IS NOT NULL\nORDER BY platform",
                self.records_table
            ),
            parameters: Vec::new(),
        }
    }

    pub fn chains(&self) -> SqlQuery {
        SqlQuery {
            sql: format!(
                "SELECT DISTINCT chain\nFROM `{}`\nWHERE chain IS NOT NULL\nORDER BY chain",
                self.chain_mapping_table
            ),
            parameters: Vec::new(),
        }
    }

    pub fn monthly_performance(&self, filter: &FilterSet) -> SqlQuery {
        self.filtered(
            r#"SELECT
  DATE_TRUNC(record_date, MONTH) AS month,
  chain,
  platform,
  COUNT(DISTINCT slug) AS active_locations,
  SUM(orders) AS total_orders,
  SUM(disputes_won) AS disputes_won,
  SUM(potential) AS potential,
  SUM(recovered) AS recovered
FROM filtered
GROUP BY month, chain, platform
ORDER BY month, recovered DESC, chain, platform"#,
            filter,
        )
    }

    pub fn platform_issue_performance(&self, filter: &FilterSet) -> SqlQuery {
        self.filtered(
            r#"SELECT
  platform,
  issue_category,
  SUM(orders) AS total_orders,
  SUM(disputes_won) AS disputes_won,
  SUM(potential) AS potential,
  SUM(recovered) AS recovered
FROM filtered
GROUP BY platform, issue_category
HAVING total_orders > 0
ORDER BY recovered DESC, platform, issue_category"#,
            filter,
        )
    }

    pub fn daily_recovery(&self, filter: &FilterSet) -> SqlQuery {
        self.filtered(
            r#"SELECT
  record_date AS day,
  SUM(orders) AS orders,
  SUM(disputes_won) AS disputes_won,
  SUM(recovered) AS recovered
FROM filtered
GROUP BY day
ORDER BY day"#,
            filter,
        )
    }

    pub fn location_recovery(&self, filter: &FilterSet) -> SqlQuery {
        self.filtered(
            r#"SELECT
  slug,
  chain,
  SUM(recovered) AS recovered
FROM filtered
GROUP BY slug, chain
ORDER BY recovered DESC, slug"#,
            filter,
        )
    }

    pub fn chain_performance(&self, filter: &FilterSet, min_orders: i64, limit: usize) -> SqlQuery {
        let mut query = self.filtered(
            r#"SELECT
  chain,
  COUNT(DISTINCT slug) AS locations,
  SUM(orders) AS total_orders,
  SUM(disputes_won) AS disputes_won,
  SUM(potential) AS potential,
  SUM(recovered) AS recovered
FROM filtered
GROUP BY chain
HAVING total_orders > @min_orders
ORDER BY recovered DESC, chain
LIMIT @chain_limit"#,
            filter,
        );
        query.parameters.push(QueryParameter::int64("min_orders", min_orders));
        query
            .parameters
            .push(QueryParameter::int64("chain_limit", i64::try_from(limit).unwrap_or(i64::MAX)));
        query
    }

    pub fn status_breakdown(&self, filter: &FilterSet) -> SqlQuery {
        self.filtered(
            r#"SELECT
  status,
  SUM(potential) AS amount,
  COUNT(*) AS disputes
FROM filtered
GROUP BY status
ORDER BY amount DESC, status"#,
            filter,
        )
    }

    pub fn subcategory_recovery(&self, filter: &FilterSet) -> SqlQuery {
        self.filtered(
            r#"SELECT
  subcategory,
  COUNT(DISTINCT slug) AS locations,
  COUNT(*) AS disputes,
  SUM(potential) AS potential,
  SUM(recovered) AS recovered
FROM filtered
GROUP BY subcategory
HAVING potential > 0
ORDER BY potential DESC, subcategory"#,
            filter,
        )
    }

    /// Chain and platform pairs whose recovery rate over the last 90 days
    /// dropped against the trailing year ending on the filter's end date.
    /// The start date is not used.
    pub fn chain_attention(&self, filter: &FilterSet, rules: &BusinessRules) -> SqlQuery {
        let select = r#",
monthly AS (
  SELECT
    chain,
    platform,
    DATE_TRUNC(record_date, MONTH) AS month,
    SUM(potential) AS potential,
    SUM(recovered) AS recovered
  FROM filtered
  GROUP BY chain, platform, month
  HAVING potential > 0
),
rated AS (
  SELECT
    chain,
    platform,
    AVG(100.0 * recovered / potential) AS baseline_rate,
    AVG(IF(month >= DATE_SUB(@end_date, INTERVAL 90 DAY), 100.0 * recovered / potential, NULL)) AS recent_rate,
    COUNT(*) AS months,
    SUM(potential) AS potential
  FROM monthly
  GROUP BY chain, platform
  HAVING months >= 3
)
SELECT
  chain,
  platform,
  baseline_rate,
  recent_rate,
  months,
  potential
FROM rated
WHERE baseline_rate > 0
  AND recent_rate > 0
  AND potential > @min_potential
  AND 100.0 * (baseline_rate - recent_rate) / baseline_rate >= @min_decline
ORDER BY (baseline_rate - recent_rate) / baseline_rate DESC, chain, platform"#;

        let mut parameters: Vec<QueryParameter> = filter_parameters(filter)
            .into_iter()
            .filter(|p| p.name != "start_date")
            .collect();
        parameters.push(QueryParameter::float64("min_potential", rules.attention_min_potential));
        parameters.push(QueryParameter::float64("min_decline", rules.attention_decline_pct));
        SqlQuery {
            sql: format!("{}{}", self.filtered_records(TRAILING_YEAR_WINDOW), select),
            parameters,
        }
    }

    pub fn order_value_bands(&self, filter: &FilterSet) -> SqlQuery {
        let mut band = String::from("CASE");
        for (idx, edge) in ORDER_VALUE_EDGES.iter().enumerate() {
            band.push_str(&format!("\n    WHEN order_value <= {} THEN {}", edge, idx));
        }
        band.push_str(&format!("\n    ELSE {}\n  END", ORDER_VALUE_EDGES.len()));

        self.filtered(
            &format!(
                r#"SELECT
  {band} AS band,
  COUNT(*) AS disputes,
  SUM(potential) AS potential,
  SUM(recovered) AS recovered,
  AVG(order_value) AS avg_order_value
FROM filtered
GROUP BY band
HAVING potential > 0
ORDER BY band"#
            ),
            filter,
        )
    }
}

fn filter_parameters(filter: &FilterSet) -> Vec<QueryParameter> {
    vec![
        QueryParameter::date("start_date", filter.range.start()),
        QueryParameter::date("end_date", filter.range.end()),
        QueryParameter::string_array("platforms", filter.platforms.iter().cloned()),
        QueryParameter::string_array("chains", filter.chains.iter().cloned()),
        QueryParameter::string_array("issue_categories", filter.issue_categories.iter().map(|c| c.label())),
    ]
}
