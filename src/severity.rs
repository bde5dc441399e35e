//! Severity tiers for flagged observations.
//!
//! Scores of the anomalous subset are min-max normalized over that subset
//! (epsilon in the denominator) and binned against configurable thresholds.
//! A subset of one normalizes to 0 and is therefore always `Low`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::SeverityThresholds;

/// Ordinal severity label
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl Severity {
    pub fn from_normalized(normalized: f64, thresholds: &SeverityThresholds) -> Self {
        if normalized >= thresholds.high {
            Self::High
        } else if normalized >= thresholds.medium {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeverityClassifier {
    thresholds: SeverityThresholds,
}

impl SeverityClassifier {
    pub fn new(thresholds: SeverityThresholds) -> Self {
        Self { thresholds }
    }

    /// Min-max normalization of `scores` into [0, 1)
    pub fn normalize(&self, scores: &[f64]) -> Vec<f64> {
        let (min, max) = scores
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
                (lo.min(*s), hi.max(*s))
            });
        let denom = max - min + self.thresholds.epsilon;
        scores.iter().map(|s| (s - min) / denom).collect()
    }

    /// Severity per score, aligned with `scores` (the anomalous subset only)
    pub fn classify(&self, scores: &[f64]) -> Vec<Severity> {
        self.normalize(scores)
            .into_iter()
            .map(|n| Severity::from_normalized(n, &self.thresholds))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bins() {
        let t = SeverityThresholds::default();
        assert_eq!(Severity::from_normalized(0.0, &t), Severity::Low);
        assert_eq!(Severity::from_normalized(0.3299, &t), Severity::Low);
        assert_eq!(Severity::from_normalized(0.33, &t), Severity::Medium);
        assert_eq!(Severity::from_normalized(0.6599, &t), Severity::Medium);
        assert_eq!(Severity::from_normalized(0.66, &t), Severity::High);
        assert_eq!(Severity::from_normalized(1.0, &t), Severity::High);
    }

    #[test]
    fn test_single_member_is_low() {
        let c = SeverityClassifier::default();
        assert_eq!(c.normalize(&[-0.71]), vec![0.0]);
        assert_eq!(c.classify(&[-0.71]), vec![Severity::Low]);
    }

    #[test]
    fn test_equal_scores_are_low() {
        let c = SeverityClassifier::default();
        assert!(c.classify(&[-0.6; 4]).iter().all(|s| *s == Severity::Low));
    }

    #[test]
    fn test_monotonic_in_score() {
        let c = SeverityClassifier::default();
        let scores: Vec<f64> = (0..50).map(|i| -0.8 + (i as f64 * 0.37) % 0.3).collect();
        let severities = c.classify(&scores);

        let mut pairs: Vec<(f64, Severity)> = scores.into_iter().zip(severities).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        assert!(pairs.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn test_spread_covers_all_tiers() {
        let c = SeverityClassifier::default();
        assert_eq!(
            c.classify(&[-0.9, -0.75, -0.6]),
            vec![Severity::Low, Severity::Medium, Severity::High]
        );
    }

    #[test]
    fn test_custom_thresholds() {
        let c = SeverityClassifier::new(SeverityThresholds {
            medium: 0.1,
            high: 0.2,
            epsilon: 1e-8,
        });
        assert_eq!(c.classify(&[0.0, 0.15, 1.0])[1], Severity::Medium);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"high\"");
        assert_eq!(Severity::Medium.to_string(), "medium");
    }
}
