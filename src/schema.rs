//! Typed Observation Schema and Batch Ingestion
//!
//! Raw rows arrive as loosely typed key/value objects. They are validated
//! once, at ingestion, against an ordered set of named typed columns:
//! - Number columns accept JSON numbers (or null / absent)
//! - Timestamp columns accept RFC 3339, common date/datetime layouts, or
//!   integer Unix seconds
//! - Text columns accept any scalar and keep its string form
//!
//! After ingestion every row is immutable and keeps its input position.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;

use crate::error::{PipelineError, Result};

/// Datetime layouts accepted for timestamp columns (after RFC 3339)
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Number,
    Timestamp,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
}

/// A single validated cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Timestamp(NaiveDateTime),
    Text(String),
    Missing,
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    fn fits(&self, kind: ColumnType) -> bool {
        matches!(
            (self, kind),
            (Self::Missing, _)
                | (Self::Number(_), ColumnType::Number)
                | (Self::Timestamp(_), ColumnType::Timestamp)
                | (Self::Text(_), ColumnType::Text)
        )
    }
}

/// Ordered set of uniquely named, typed columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column, or retype it if the name already exists
    pub fn with_column(mut self, name: impl Into<String>, kind: ColumnType) -> Self {
        let name = name.into();
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(col) => col.kind = kind,
            None => self.columns.push(Column { name, kind }),
        }
        self
    }

    /// Infer a schema from raw JSON rows.
    ///
    /// Columns appear in first-seen order across rows. Hinted columns keep
    /// the hinted type. Every other column is `Number` when all its non-null
    /// values are JSON numbers, `Text` otherwise. A hint for a key that no
    /// row carries declares nothing.
    pub fn infer(rows: &[Json], hints: &[(&str, ColumnType)]) -> Result<Self> {
        let mut order: Vec<String> = Vec::new();
        let mut numeric: BTreeMap<String, bool> = BTreeMap::new();

        for (i, row) in rows.iter().enumerate() {
            let obj = row.as_object().ok_or_else(|| {
                PipelineError::invalid_input(format!("row {} is not a JSON object", i))
            })?;
            for (key, value) in obj {
                let all_numeric = numeric.entry(key.clone()).or_insert_with(|| {
                    order.push(key.clone());
                    true
                });
                if !value.is_null() && !value.is_number() {
                    *all_numeric = false;
                }
            }
        }

        let mut schema = Schema::new();
        for name in order {
            let kind = match hints.iter().find(|(h, _)| *h == name) {
                Some((_, kind)) => *kind,
                None if numeric.get(&name).copied().unwrap_or(false) => ColumnType::Number,
                None => ColumnType::Text,
            };
            schema = schema.with_column(name, kind);
        }
        Ok(schema)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// One ingested row
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Position in the input batch
    pub index: usize,
    values: Vec<Value>,
}

impl Observation {
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, column: usize) -> &Value {
        self.values.get(column).unwrap_or(&Value::Missing)
    }
}

/// The unit of analysis: a validated, immutable batch of observations
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationBatch {
    schema: Schema,
    rows: Vec<Observation>,
}

impl ObservationBatch {
    /// Build a batch from already-typed rows, checking arity and cell types
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut observations = Vec::with_capacity(rows.len());
        for (index, values) in rows.into_iter().enumerate() {
            if values.len() != schema.len() {
                return Err(PipelineError::invalid_input(format!(
                    "row {} has {} values, schema declares {} columns",
                    index,
                    values.len(),
                    schema.len()
                )));
            }
            for (value, col) in values.iter().zip(schema.columns()) {
                if !value.fits(col.kind) {
                    return Err(PipelineError::invalid_input(format!(
                        "row {}: column '{}' expects {:?}",
                        index, col.name, col.kind
                    )));
                }
            }
            observations.push(Observation { index, values });
        }
        Ok(Self {
            schema,
            rows: observations,
        })
    }

    /// Validate raw JSON rows against `schema`. Keys not in the schema are ignored.
    pub fn from_json_rows(rows: &[Json], schema: Schema) -> Result<Self> {
        let mut observations = Vec::with_capacity(rows.len());

        for (index, row) in rows.iter().enumerate() {
            let obj = row.as_object().ok_or_else(|| {
                PipelineError::invalid_input(format!("row {} is not a JSON object", index))
            })?;

            let values = schema
                .columns()
                .iter()
                .map(|col| match obj.get(&col.name) {
                    None | Some(Json::Null) => Ok(Value::Missing),
                    Some(raw) => convert(raw, col).map_err(|expected| {
                        PipelineError::invalid_input(format!(
                            "row {}: column '{}' expects {}, got {}",
                            index, col.name, expected, raw
                        ))
                    }),
                })
                .collect::<Result<Vec<_>>>()?;

            observations.push(Observation { index, values });
        }

        Ok(Self {
            schema,
            rows: observations,
        })
    }

    /// Infer the schema (with hints) and ingest in one step
    pub fn from_json_rows_inferred(rows: &[Json], hints: &[(&str, ColumnType)]) -> Result<Self> {
        let schema = Schema::infer(rows, hints)?;
        Self::from_json_rows(rows, schema)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn numbers(&self, column: usize) -> Vec<Option<f64>> {
        self.rows
            .iter()
            .map(|r| r.value(column).as_number())
            .collect()
    }

    pub fn timestamps(&self, column: usize) -> Vec<Option<NaiveDateTime>> {
        self.rows
            .iter()
            .map(|r| r.value(column).as_timestamp())
            .collect()
    }

    /// Earliest and latest timestamp in `column`, ignoring missing cells
    pub fn time_range(&self, column: usize) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let mut it = self.rows.iter().filter_map(|r| r.value(column).as_timestamp());
        let first = it.next()?;
        Some(it.fold((first, first), |(lo, hi), ts| (lo.min(ts), hi.max(ts))))
    }

    /// Named view of one row's fields
    pub fn fields(&self, row: &Observation) -> BTreeMap<String, Value> {
        self.schema
            .columns()
            .iter()
            .zip(row.values())
            .map(|(col, v)| (col.name.clone(), v.clone()))
            .collect()
    }
}

/// Convert one non-null JSON cell; the error is the expected type label
fn convert(raw: &Json, col: &Column) -> std::result::Result<Value, &'static str> {
    match col.kind {
        ColumnType::Number => raw.as_f64().map(Value::Number).ok_or("a number"),
        ColumnType::Timestamp => {
            let parsed = match raw {
                Json::String(s) => parse_timestamp(s),
                Json::Number(n) => n
                    .as_i64()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
                    .map(|dt| dt.naive_utc()),
                _ => None,
            };
            parsed.map(Value::Timestamp).ok_or("a timestamp")
        }
        ColumnType::Text => match raw {
            Json::String(s) => Ok(Value::Text(s.clone())),
            Json::Number(_) | Json::Bool(_) => Ok(Value::Text(raw.to_string())),
            _ => Err("a scalar"),
        },
    }
}

/// Parse a timestamp string in any of the accepted layouts
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    fn cashflow_schema() -> Schema {
        Schema::new()
            .with_column("date", ColumnType::Timestamp)
            .with_column("cashflow", ColumnType::Number)
    }

    #[test]
    fn test_parse_timestamp_layouts() {
        let d = parse_timestamp("2024-01-03").unwrap();
        assert_eq!((d.year(), d.month(), d.day(), d.hour()), (2024, 1, 3, 0));

        let dt = parse_timestamp("2024-01-03 14:30:00").unwrap();
        assert_eq!(dt.hour(), 14);

        let rfc = parse_timestamp("2024-01-03T14:30:00+02:00").unwrap();
        assert_eq!(rfc.hour(), 12);

        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_ingest_valid_rows() {
        let rows = vec![
            json!({"date": "2024-01-01", "cashflow": 105000}),
            json!({"date": "2024-01-02", "cashflow": null}),
            json!({"date": "2024-01-03"}),
        ];
        let batch = ObservationBatch::from_json_rows(&rows, cashflow_schema()).unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.numbers(1), vec![Some(105000.0), None, None]);
        assert_eq!(batch.rows()[2].index, 2);
    }

    #[test]
    fn test_type_mismatch_fails_fast() {
        let rows = vec![
            json!({"date": "2024-01-01", "cashflow": 1.0}),
            json!({"date": "2024-01-02", "cashflow": "lots"}),
        ];
        let err = ObservationBatch::from_json_rows(&rows, cashflow_schema()).unwrap_err();
        match err {
            PipelineError::InvalidInput(msg) => {
                assert!(msg.contains("row 1"));
                assert!(msg.contains("cashflow"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_timestamp_rejected() {
        let rows = vec![json!({"date": "not a date", "cashflow": 1.0})];
        assert!(matches!(
            ObservationBatch::from_json_rows(&rows, cashflow_schema()),
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_non_object_row_rejected() {
        let rows = vec![json!([1, 2, 3])];
        assert!(Schema::infer(&rows, &[]).is_err());
        assert!(ObservationBatch::from_json_rows(&rows, cashflow_schema()).is_err());
    }

    #[test]
    fn test_infer_schema_with_hints() {
        let rows = vec![
            json!({"date": "2024-01-01", "cashflow": 10, "memo": "rent"}),
            json!({"date": "2024-01-02", "cashflow": 12.5, "memo": null, "units": 3}),
        ];
        let schema = Schema::infer(&rows, &[("date", ColumnType::Timestamp)]).unwrap();

        let names: Vec<_> = schema.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["date", "cashflow", "memo", "units"]);
        assert_eq!(schema.column("date").unwrap().kind, ColumnType::Timestamp);
        assert_eq!(schema.column("cashflow").unwrap().kind, ColumnType::Number);
        assert_eq!(schema.column("memo").unwrap().kind, ColumnType::Text);
        assert_eq!(schema.column("units").unwrap().kind, ColumnType::Number);
    }

    #[test]
    fn test_hint_for_absent_key_declares_nothing() {
        let rows = vec![
            json!({"cashflow": 1.0}),
            json!({"cashflow": 2.0, "date": null}),
        ];
        let schema = Schema::infer(
            &rows,
            &[("date", ColumnType::Timestamp), ("posted_at", ColumnType::Timestamp)],
        )
        .unwrap();

        assert_eq!(schema.column("date").unwrap().kind, ColumnType::Timestamp);
        assert!(schema.index_of("posted_at").is_none());
        assert_eq!(schema.len(), 2);
    }

    #[test]
    fn test_typed_rows_checked() {
        let ok = ObservationBatch::new(
            cashflow_schema(),
            vec![vec![Value::Missing, Value::Number(1.0)]],
        );
        assert!(ok.is_ok());

        let bad = ObservationBatch::new(
            cashflow_schema(),
            vec![vec![Value::Number(1.0), Value::Number(1.0)]],
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_time_range() {
        let rows = vec![
            json!({"date": "2024-01-05", "cashflow": 1}),
            json!({"date": "2024-01-02", "cashflow": 1}),
            json!({"date": null, "cashflow": 1}),
        ];
        let batch = ObservationBatch::from_json_rows(&rows, cashflow_schema()).unwrap();
        let (lo, hi) = batch.time_range(0).unwrap();
        assert_eq!(lo.day(), 2);
        assert_eq!(hi.day(), 5);
    }
}
