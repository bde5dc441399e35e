//! Detection pipeline: features -> scores -> severities -> report.
//!
//! `AnomalyDetector` is stateless between calls. It holds only read-only
//! configuration; every `detect` prepares features and fits a fresh model,
//! so identical input and configuration always produce identical output.

use serde_json::Value as Json;
use tracing::info;

use crate::config::DetectorConfig;
use crate::error::{PipelineError, Result};
use crate::features::FeaturePreparer;
use crate::report::{AnomalyRecord, AnomalyReport};
use crate::schema::{ColumnType, ObservationBatch};
use crate::scorer::OutlierScorer;
use crate::severity::SeverityClassifier;
use crate::visualization::VisualizationBuilder;

/// Ingest raw JSON rows, typing the requested columns explicitly.
///
/// Feature columns are declared `Number` and the timestamp column
/// `Timestamp`; every other column is inferred.
pub fn ingest(
    rows: &[Json],
    feature_columns: &[String],
    timestamp_column: Option<&str>,
) -> Result<ObservationBatch> {
    let mut hints: Vec<(&str, ColumnType)> = feature_columns
        .iter()
        .map(|c| (c.as_str(), ColumnType::Number))
        .collect();
    if let Some(ts) = timestamp_column {
        hints.push((ts, ColumnType::Timestamp));
    }
    ObservationBatch::from_json_rows_inferred(rows, &hints)
}

#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    config: DetectorConfig,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run the full detection pipeline over one batch
    pub fn detect(
        &self,
        batch: &ObservationBatch,
        feature_columns: &[String],
        timestamp_column: Option<&str>,
    ) -> Result<AnomalyReport> {
        self.config.validate()?;
        let primary = feature_columns
            .first()
            .ok_or_else(|| PipelineError::invalid_input("feature column list is empty"))?;

        let features = FeaturePreparer::new(feature_columns, timestamp_column).prepare(batch)?;
        let scored = OutlierScorer::new(&self.config).score(&features)?;

        let anomalous = scored.anomalous_indices();
        let subset: Vec<f64> = anomalous.iter().map(|&i| scored.scores[i]).collect();
        let severities = SeverityClassifier::new(self.config.severity).classify(&subset);

        let ts_idx = timestamp_column
            .and_then(|name| batch.schema().index_of(name))
            .filter(|&i| batch.schema().columns()[i].kind == ColumnType::Timestamp);
        let primary_idx = batch.schema().index_of(primary);

        let records: Vec<AnomalyRecord> = anomalous
            .iter()
            .zip(severities)
            .map(|(&i, severity)| {
                let row = &batch.rows()[i];
                AnomalyRecord {
                    row: row.index,
                    timestamp: ts_idx.and_then(|c| row.value(c).as_timestamp()),
                    primary_value: primary_idx.and_then(|c| row.value(c).as_number()),
                    fields: batch.fields(row),
                    anomaly_score: scored.scores[i],
                    severity,
                }
            })
            .collect();

        let visualization =
            VisualizationBuilder::new(feature_columns, timestamp_column).build(batch, &scored.flags);

        let report = AnomalyReport::new(
            records,
            batch.len(),
            primary.clone(),
            ts_idx.and(timestamp_column).map(str::to_string),
            visualization,
        );
        info!(
            rows = batch.len(),
            anomalies = report.anomaly_count(),
            rate = report.anomaly_rate,
            contamination = self.config.contamination,
            "Detection complete."
        );
        Ok(report)
    }

    /// Ingest raw rows and detect in one step
    pub fn detect_rows(
        &self,
        rows: &[Json],
        feature_columns: &[String],
        timestamp_column: Option<&str>,
    ) -> Result<AnomalyReport> {
        let batch = ingest(rows, feature_columns, timestamp_column)?;
        self.detect(&batch, feature_columns, timestamp_column)
    }
}
