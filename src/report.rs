//! Detection result handed to callers and to the renderer.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::render::format;
use crate::schema::{ObservationBatch, Value};
use crate::severity::Severity;
use crate::visualization::Visualization;

/// One flagged observation with its score and tier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRecord {
    /// Position in the input batch
    pub row: usize,
    pub timestamp: Option<NaiveDateTime>,
    /// Value of the first requested feature column
    pub primary_value: Option<f64>,
    /// Every field of the original observation, by column name
    pub fields: BTreeMap<String, Value>,
    pub anomaly_score: f64,
    pub severity: Severity,
}

/// Output of one detection run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyReport {
    /// Flagged observations in input order
    pub records: Vec<AnomalyRecord>,
    /// `records.len() / total_observations`
    pub anomaly_rate: f64,
    pub total_observations: usize,
    pub primary_feature: String,
    pub timestamp_column: Option<String>,
    pub visualization: Visualization,
}

impl AnomalyReport {
    pub fn new(
        records: Vec<AnomalyRecord>,
        total_observations: usize,
        primary_feature: impl Into<String>,
        timestamp_column: Option<String>,
        visualization: Visualization,
    ) -> Self {
        let anomaly_rate = if total_observations == 0 {
            0.0
        } else {
            records.len() as f64 / total_observations as f64
        };
        Self {
            records,
            anomaly_rate,
            total_observations,
            primary_feature: primary_feature.into(),
            timestamp_column,
            visualization,
        }
    }

    pub fn anomaly_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.records.iter().filter(|r| r.severity == severity).count()
    }
}

/// Caller-supplied report metadata, passed through verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub name: String,
    pub analysis_period: String,
}

impl CompanyInfo {
    pub fn new(name: impl Into<String>, analysis_period: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            analysis_period: analysis_period.into(),
        }
    }
}

/// "first – last" over the batch's timestamp column, `N/A` without one
pub fn analysis_period(batch: &ObservationBatch, timestamp_column: Option<&str>) -> String {
    timestamp_column
        .and_then(|name| batch.schema().index_of(name))
        .and_then(|idx| batch.time_range(idx))
        .map_or_else(
            || "N/A".to_string(),
            |(lo, hi)| {
                format!(
                    "{} – {}",
                    format::timestamp(Some(lo)),
                    format::timestamp(Some(hi))
                )
            },
        )
}
