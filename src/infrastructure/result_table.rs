// Typed view over BigQuery's `schema` + `rows[].f[].v` result encoding
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("row has {found} cells, schema has {expected} fields")]
    Width { expected: usize, found: usize },
    #[error("column '{column}': cannot read {value:?} as {kind}")]
    Value { column: String, kind: String, value: String },
    #[error("column '{0}' is not in the result")]
    MissingColumn(String),
    #[error("column '{0}' is null")]
    Null(String),
    #[error("column '{column}' holds {found}, expected {expected}")]
    Type {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawRow {
    #[serde(default)]
    pub f: Vec<RawCell>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawCell {
    #[serde(default)]
    pub v: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Bool(bool),
}

impl Cell {
    fn kind(&self) -> &'static str {
        match self {
            Cell::Null => "null",
            Cell::Int(_) => "integer",
            Cell::Float(_) => "float",
            Cell::Text(_) => "string",
            Cell::Date(_) => "date",
            Cell::Timestamp(_) => "timestamp",
            Cell::Bool(_) => "boolean",
        }
    }
}

fn decode_cell(field: &FieldSchema, raw: &serde_json::Value) -> Result<Cell, DecodeError> {
    let text = match raw {
        serde_json::Value::Null => return Ok(Cell::Null),
        serde_json::Value::String(s) => s.as_str(),
        other => {
            return Err(DecodeError::Value {
                column: field.name.clone(),
                kind: field.kind.clone(),
                value: other.to_string(),
            });
        }
    };
    let invalid = || DecodeError::Value {
        column: field.name.clone(),
        kind: field.kind.clone(),
        value: text.to_string(),
    };

    let cell = match field.kind.as_str() {
        "INTEGER" | "INT64" => Cell::Int(text.parse().map_err(|_| invalid())?),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => Cell::Float(text.parse().map_err(|_| invalid())?),
        "BOOLEAN" | "BOOL" => Cell::Bool(text.parse().map_err(|_| invalid())?),
        "DATE" => Cell::Date(NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| invalid())?),
        "TIMESTAMP" => {
            // Seconds since the epoch, possibly in exponent notation
            let seconds: f64 = text.parse().map_err(|_| invalid())?;
            let whole = seconds.floor();
            let nanos = ((seconds - whole) * 1e9).round() as u32;
            Cell::Timestamp(DateTime::from_timestamp(whole as i64, nanos.min(999_999_999)).ok_or_else(invalid)?)
        }
        _ => Cell::Text(text.to_string()),
    };
    Ok(cell)
}

/// A fully decoded query result
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl ResultTable {
    pub fn decode(schema: &TableSchema, rows: &[RawRow]) -> Result<Self, DecodeError> {
        let mut table = Self {
            columns: schema.fields.iter().map(|f| f.name.clone()).collect(),
            rows: Vec::with_capacity(rows.len()),
        };
        table.extend(schema, rows)?;
        Ok(table)
    }

    /// Append another page of rows decoded against the same schema
    pub fn extend(&mut self, schema: &TableSchema, rows: &[RawRow]) -> Result<(), DecodeError> {
        for row in rows {
            if row.f.len() != schema.fields.len() {
                return Err(DecodeError::Width {
                    expected: schema.fields.len(),
                    found: row.f.len(),
                });
            }
            let cells = schema
                .fields
                .iter()
                .zip(&row.f)
                .map(|(field, raw)| decode_cell(field, &raw.v))
                .collect::<Result<Vec<_>, _>>()?;
            self.rows.push(cells);
        }
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |cells| Row {
            columns: &self.columns,
            cells,
        })
    }
}

/// Named access to one decoded row
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    cells: &'a [Cell],
}

impl<'a> Row<'a> {
    pub fn get(&self, column: &str) -> Result<&'a Cell, DecodeError> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.cells[i])
            .ok_or_else(|| DecodeError::MissingColumn(column.to_string()))
    }

    fn mismatch(column: &str, expected: &'static str, found: &Cell) -> DecodeError {
        DecodeError::Type {
            column: column.to_string(),
            expected,
            found: found.kind(),
        }
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>, DecodeError> {
        match self.get(column)? {
            Cell::Null => Ok(None),
            Cell::Text(s) => Ok(Some(s.clone())),
            other => Err(Self::mismatch(column, "string", other)),
        }
    }

    pub fn text(&self, column: &str) -> Result<String, DecodeError> {
        self.opt_text(column)?
            .ok_or_else(|| DecodeError::Null(column.to_string()))
    }

    /// Aggregates over no rows come back as NULL, read those as zero
    pub fn int(&self, column: &str) -> Result<i64, DecodeError> {
        match self.get(column)? {
            Cell::Null => Ok(0),
            Cell::Int(v) => Ok(*v),
            other => Err(Self::mismatch(column, "integer", other)),
        }
    }

    pub fn float(&self, column: &str) -> Result<f64, DecodeError> {
        Ok(self.opt_float(column)?.unwrap_or(0.0))
    }

    /// For averages, where NULL means undefined rather than zero
    pub fn opt_float(&self, column: &str) -> Result<Option<f64>, DecodeError> {
        match self.get(column)? {
            Cell::Null => Ok(None),
            Cell::Float(v) => Ok(Some(*v)),
            Cell::Int(v) => Ok(Some(*v as f64)),
            other => Err(Self::mismatch(column, "float", other)),
        }
    }

    pub fn date(&self, column: &str) -> Result<NaiveDate, DecodeError> {
        match self.get(column)? {
            Cell::Date(d) => Ok(*d),
            Cell::Timestamp(ts) => Ok(ts.date_naive()),
            Cell::Null => Err(DecodeError::Null(column.to_string())),
            other => Err(Self::mismatch(column, "date", other)),
        }
    }
}
