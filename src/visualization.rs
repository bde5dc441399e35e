//! Chart payload for the detection result.
//!
//! The chart is a serializable description, not an image: the full series
//! of the first feature as a line, with the flagged observations overlaid
//! as red `x` markers. Building it is best-effort. Any failure degrades to
//! [`Visualization::Empty`] carrying the reason, never to an error.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::schema::{ColumnType, ObservationBatch};

pub const CHART_TITLE: &str = "Anomalies over time";
pub const NORMAL_SERIES: &str = "Normal Data";
pub const ANOMALY_SERIES: &str = "Anomalies";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesMode {
    Lines,
    Markers,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerStyle {
    pub color: String,
    pub size: u32,
    pub symbol: String,
}

impl MarkerStyle {
    fn anomaly() -> Self {
        Self {
            color: "red".to_string(),
            size: 8,
            symbol: "x".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub x: NaiveDateTime,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub mode: SeriesMode,
    pub points: Vec<ChartPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<MarkerStyle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub title: String,
    pub x_axis: String,
    pub y_axis: String,
    pub series: Vec<Series>,
}

impl Chart {
    pub fn series(&self, name: &str) -> Option<&Series> {
        self.series.iter().find(|s| s.name == name)
    }
}

/// Outcome of chart construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Visualization {
    Chart(Chart),
    Empty { reason: String },
}

impl Visualization {
    pub fn chart(&self) -> Option<&Chart> {
        match self {
            Self::Chart(chart) => Some(chart),
            Self::Empty { .. } => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty { .. })
    }
}

/// Why a chart could not be built
#[derive(Debug, Clone, PartialEq)]
pub enum VisualizationError {
    NoTimestamp,
    NoFeature,
    MissingColumn(String),
    FlagMismatch { rows: usize, flags: usize },
    NoPoints,
}

impl VisualizationError {
    /// Preconditions not met, as opposed to a construction failure
    fn is_unavailable(&self) -> bool {
        matches!(self, Self::NoTimestamp | Self::NoFeature)
    }
}

impl fmt::Display for VisualizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTimestamp => write!(f, "no timestamp column available"),
            Self::NoFeature => write!(f, "no feature column available"),
            Self::MissingColumn(c) => write!(f, "column '{}' is missing or has the wrong type", c),
            Self::FlagMismatch { rows, flags } => {
                write!(f, "{} anomaly flags for {} observations", flags, rows)
            }
            Self::NoPoints => write!(f, "no observation has both a timestamp and a value"),
        }
    }
}

pub struct VisualizationBuilder<'a> {
    feature_columns: &'a [String],
    timestamp_column: Option<&'a str>,
}

impl<'a> VisualizationBuilder<'a> {
    pub fn new(feature_columns: &'a [String], timestamp_column: Option<&'a str>) -> Self {
        Self {
            feature_columns,
            timestamp_column,
        }
    }

    /// Build the chart for `batch` with per-row anomaly `flags`
    pub fn build(&self, batch: &ObservationBatch, flags: &[bool]) -> Visualization {
        match self.try_build(batch, flags) {
            Ok(chart) => Visualization::Chart(chart),
            Err(e) => {
                if e.is_unavailable() {
                    debug!(reason = %e, "Visualization skipped.");
                } else {
                    warn!(reason = %e, "Visualization failed, returning empty payload.");
                }
                Visualization::Empty {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn try_build(
        &self,
        batch: &ObservationBatch,
        flags: &[bool],
    ) -> Result<Chart, VisualizationError> {
        let ts_name = self.timestamp_column.ok_or(VisualizationError::NoTimestamp)?;
        let schema = batch.schema();
        if schema.index_of(ts_name).is_none() {
            return Err(VisualizationError::NoTimestamp);
        }
        let feature = self.feature_columns.first().ok_or(VisualizationError::NoFeature)?;

        let ts_idx = column_of(batch, ts_name, ColumnType::Timestamp)?;
        let y_idx = column_of(batch, feature, ColumnType::Number)?;
        if flags.len() != batch.len() {
            return Err(VisualizationError::FlagMismatch {
                rows: batch.len(),
                flags: flags.len(),
            });
        }

        let mut line = Vec::with_capacity(batch.len());
        let mut markers = Vec::new();
        for (row, flagged) in batch.rows().iter().zip(flags) {
            let (Some(x), Some(y)) = (
                row.value(ts_idx).as_timestamp(),
                row.value(y_idx).as_number(),
            ) else {
                continue;
            };
            let point = ChartPoint { x, y };
            if *flagged {
                markers.push(point.clone());
            }
            line.push(point);
        }
        if line.is_empty() {
            return Err(VisualizationError::NoPoints);
        }

        Ok(Chart {
            title: CHART_TITLE.to_string(),
            x_axis: ts_name.to_string(),
            y_axis: feature.clone(),
            series: vec![
                Series {
                    name: NORMAL_SERIES.to_string(),
                    mode: SeriesMode::Lines,
                    points: line,
                    marker: None,
                },
                Series {
                    name: ANOMALY_SERIES.to_string(),
                    mode: SeriesMode::Markers,
                    points: markers,
                    marker: Some(MarkerStyle::anomaly()),
                },
            ],
        })
    }
}

fn column_of(
    batch: &ObservationBatch,
    name: &str,
    kind: ColumnType,
) -> Result<usize, VisualizationError> {
    batch
        .schema()
        .index_of(name)
        .filter(|&i| batch.schema().columns()[i].kind == kind)
        .ok_or_else(|| VisualizationError::MissingColumn(name.to_string()))
}
