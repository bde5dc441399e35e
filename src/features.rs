//! Feature preparation: observation batch -> dense numeric matrix.
//!
//! Column order is fixed: requested feature columns in the order given,
//! then `day_of_week` (Monday = 0) and `hour` when a timestamp is used.
//! Missing cells are filled with the column median over the whole batch.

use chrono::{Datelike, Timelike};
use tracing::debug;

use crate::algo::stats::median;
use crate::error::{PipelineError, Result};
use crate::schema::{ColumnType, ObservationBatch};

pub const DAY_OF_WEEK: &str = "day_of_week";
pub const HOUR: &str = "hour";

/// Row-major matrix with one row per observation, identical width throughout
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn uses_timestamp(&self) -> bool {
        self.columns.iter().any(|c| c == DAY_OF_WEEK)
    }
}

#[derive(Debug, Clone)]
pub struct FeaturePreparer<'a> {
    feature_columns: &'a [String],
    timestamp_column: Option<&'a str>,
}

impl<'a> FeaturePreparer<'a> {
    pub fn new(feature_columns: &'a [String], timestamp_column: Option<&'a str>) -> Self {
        Self {
            feature_columns,
            timestamp_column,
        }
    }

    pub fn prepare(&self, batch: &ObservationBatch) -> Result<FeatureMatrix> {
        if self.feature_columns.is_empty() {
            return Err(PipelineError::invalid_input("feature column list is empty"));
        }

        let schema = batch.schema();
        let mut names: Vec<String> = Vec::with_capacity(self.feature_columns.len() + 2);
        let mut columns: Vec<Vec<Option<f64>>> = Vec::with_capacity(self.feature_columns.len() + 2);

        for name in self.feature_columns {
            let idx = schema.index_of(name).ok_or_else(|| {
                PipelineError::invalid_input(format!("feature column '{}' not found", name))
            })?;
            if schema.columns()[idx].kind != ColumnType::Number {
                return Err(PipelineError::invalid_input(format!(
                    "feature column '{}' is not numeric",
                    name
                )));
            }
            names.push(name.clone());
            columns.push(batch.numbers(idx));
        }

        if let Some((dow, hour)) = self.temporal_columns(batch)? {
            names.push(DAY_OF_WEEK.to_string());
            columns.push(dow);
            names.push(HOUR.to_string());
            columns.push(hour);
        }

        let filled = columns
            .into_iter()
            .zip(&names)
            .map(|(col, name)| impute_median(col, name))
            .collect::<Result<Vec<_>>>()?;

        let rows = (0..batch.len())
            .map(|r| filled.iter().map(|col| col[r]).collect())
            .collect();

        debug!(rows = batch.len(), columns = ?names, "Prepared feature matrix.");
        Ok(FeatureMatrix {
            columns: names,
            rows,
        })
    }

    /// Derived day-of-week and hour columns, or `None` when the batch has no
    /// timestamp column. A declared column without a single value is an error.
    fn temporal_columns(
        &self,
        batch: &ObservationBatch,
    ) -> Result<Option<(Vec<Option<f64>>, Vec<Option<f64>>)>> {
        let Some(name) = self.timestamp_column else {
            return Ok(None);
        };
        let Some(idx) = batch.schema().index_of(name) else {
            debug!(column = name, "Timestamp column absent, skipping temporal features.");
            return Ok(None);
        };
        if batch.schema().columns()[idx].kind != ColumnType::Timestamp {
            return Err(PipelineError::invalid_input(format!(
                "timestamp column '{}' is not a timestamp",
                name
            )));
        }

        let stamps = batch.timestamps(idx);
        if stamps.iter().all(Option::is_none) {
            return Err(PipelineError::invalid_input(format!(
                "timestamp column '{}' has no values",
                name
            )));
        }

        let dow = stamps
            .iter()
            .map(|ts| ts.map(|t| f64::from(t.weekday().num_days_from_monday())))
            .collect();
        let hour = stamps
            .iter()
            .map(|ts| ts.map(|t| f64::from(t.hour())))
            .collect();
        Ok(Some((dow, hour)))
    }
}

fn impute_median(column: Vec<Option<f64>>, name: &str) -> Result<Vec<f64>> {
    if column.iter().all(Option::is_some) {
        return Ok(column.into_iter().flatten().collect());
    }
    let present: Vec<f64> = column.iter().flatten().copied().collect();
    let fill = median(&present).ok_or_else(|| {
        PipelineError::invalid_input(format!(
            "column '{}' has no values to impute from",
            name
        ))
    })?;
    Ok(column.into_iter().map(|v| v.unwrap_or(fill)).collect())
}
