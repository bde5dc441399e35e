//! Outlier scoring over a prepared feature matrix.
//!
//! Every call standardizes the matrix and fits a fresh isolation forest;
//! nothing survives between calls. The decision offset is the
//! `contamination` percentile of the batch's own scores.

use tracing::debug;

use crate::algo::stats::percentile;
use crate::algo::{IsolationForest, StandardScaler};
use crate::config::DetectorConfig;
use crate::error::{PipelineError, Result};
use crate::features::FeatureMatrix;

/// Smallest batch the scorer accepts
pub const MIN_OBSERVATIONS: usize = 2;

/// Per-row scores and flags, aligned with the input rows
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredBatch {
    /// Higher is more normal, lower (more negative) is more anomalous
    pub scores: Vec<f64>,
    pub flags: Vec<bool>,
    /// Decision threshold: flagged iff score < offset
    pub offset: f64,
}

impl ScoredBatch {
    pub fn anomaly_count(&self) -> usize {
        self.flags.iter().filter(|f| **f).count()
    }

    pub fn anomalous_indices(&self) -> Vec<usize> {
        self.flags
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.then_some(i))
            .collect()
    }
}

pub struct OutlierScorer<'a> {
    config: &'a DetectorConfig,
}

impl<'a> OutlierScorer<'a> {
    pub fn new(config: &'a DetectorConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, features: &FeatureMatrix) -> Result<ScoredBatch> {
        self.config.validate()?;
        let n = features.len();
        if n < MIN_OBSERVATIONS {
            return Err(PipelineError::InsufficientData {
                required: MIN_OBSERVATIONS,
                found: n,
            });
        }

        let standardized = StandardScaler::fit_transform(features.rows());
        let sample_size = self.config.max_samples.resolve(n);
        let mut forest =
            IsolationForest::new(self.config.n_estimators, sample_size, self.config.random_seed);
        forest.fit(&standardized);

        let scores = forest.score_samples(&standardized);
        let offset = percentile(&scores, 100.0 * self.config.contamination)
            .ok_or(PipelineError::InsufficientData {
                required: MIN_OBSERVATIONS,
                found: 0,
            })?;
        let flags: Vec<bool> = scores.iter().map(|s| *s < offset).collect();

        let batch = ScoredBatch {
            scores,
            flags,
            offset,
        };
        debug!(
            rows = n,
            sample_size,
            estimators = forest.n_estimators(),
            offset,
            anomalies = batch.anomaly_count(),
            "Scored batch."
        );
        Ok(batch)
    }
}
