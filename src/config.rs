//! Runtime configuration.
//!
//! Every struct deserializes from JSON with per-field defaults, so a
//! config file only needs to name what it overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PipelineError, Result};

/// Subsample size per isolation tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaxSamples {
    /// min(256, batch size)
    #[default]
    Auto,
    /// Fixed count, clamped to the batch size
    Count(usize),
    /// Fraction of the batch in (0, 1]
    Fraction(f64),
}

impl MaxSamples {
    pub fn resolve(&self, n: usize) -> usize {
        let k = match *self {
            Self::Auto => 256,
            Self::Count(k) => k,
            Self::Fraction(f) => (f * n as f64).ceil() as usize,
        };
        k.clamp(1, n.max(1))
    }
}

/// Boundaries between severity tiers on the normalized [0, 1] scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityThresholds {
    /// normalized < medium -> low
    pub medium: f64,
    /// normalized >= high -> high
    pub high: f64,
    /// Added to the min-max denominator
    pub epsilon: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            medium: 0.33,
            high: 0.66,
            epsilon: 1e-8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Expected share of anomalies, calibrates the decision threshold
    pub contamination: f64,
    pub n_estimators: usize,
    pub max_samples: MaxSamples,
    pub random_seed: u64,
    pub severity: SeverityThresholds,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            contamination: 0.10,
            n_estimators: 100,
            max_samples: MaxSamples::Auto,
            random_seed: 42,
            severity: SeverityThresholds::default(),
        }
    }
}

impl DetectorConfig {
    pub fn with_contamination(mut self, contamination: f64) -> Self {
        self.contamination = contamination;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(PipelineError::invalid_input(format!(
                "contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }
        if self.n_estimators == 0 {
            return Err(PipelineError::invalid_input("n_estimators must be at least 1"));
        }
        match self.max_samples {
            MaxSamples::Count(0) => {
                return Err(PipelineError::invalid_input("max_samples count must be at least 1"));
            }
            MaxSamples::Fraction(f) if !(f > 0.0 && f <= 1.0) => {
                return Err(PipelineError::invalid_input(format!(
                    "max_samples fraction must be in (0, 1], got {}",
                    f
                )));
            }
            _ => {}
        }
        let s = &self.severity;
        if !(0.0 <= s.medium && s.medium <= s.high && s.high <= 1.0) || !(s.epsilon > 0.0) {
            return Err(PipelineError::invalid_input(format!(
                "severity thresholds must satisfy 0 <= medium <= high <= 1 and epsilon > 0, got {:?}",
                s
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub title: String,
    pub no_anomalies_text: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            title: "Anomaly Analysis Report".to_string(),
            no_anomalies_text: "No anomalies detected.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub feature_columns: Vec<String>,
    pub timestamp_column: Option<String>,
    pub company_name: String,
    pub attachment_filename: String,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            feature_columns: vec!["cashflow".to_string()],
            timestamp_column: Some("date".to_string()),
            company_name: "Demo Corp".to_string(),
            attachment_filename: "anomaly_report.pdf".to_string(),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub detector: DetectorConfig,
    pub render: RenderConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)
            .map_err(|e| PipelineError::invalid_input(format!("config: {}", e)))?;
        config.detector.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::invalid_input(format!("config {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }
}
