//! Byzantine contributor detection.
//!
//! Flags nodes whose mean pairwise Euclidean distance to every other node
//! lies more than `outlier_sigma` population standard deviations above the
//! mean of those distances.
//!
//! With population statistics a lone outlier among `n` updates can reach a
//! z-score of at most `sqrt(n - 1)`, so the default 2-sigma rule only starts
//! flagging single outliers from six updates onward.

use crate::core::{common_dimension, euclidean_distance, Result};
use crate::federated::config::{DetectorConfig, MIN_DETECTION_UPDATES};

/// Mean distance of one node to all others.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeDistance {
    pub node_id: String,
    pub mean_distance: f64,
}

/// Result of one detection pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionReport {
    /// Flagged node ids, in input order
    pub flagged: Vec<String>,
    /// Per-node mean distances, in input order
    pub distances: Vec<NodeDistance>,
    /// Cut-off used, absent when too few updates were given
    pub threshold: Option<f64>,
}

/// Z-score outlier detector over pairwise distances.
#[derive(Clone, Debug, Default)]
pub struct ByzantineDetector {
    config: DetectorConfig,
}

impl ByzantineDetector {
    /// Create a detector.
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Detector settings.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Return the ids of outlying contributors.
    pub fn detect(&self, updates: &[(String, Vec<f64>)]) -> Result<Vec<String>> {
        Ok(self.analyze(updates)?.flagged)
    }

    /// Full detection pass with intermediate statistics.
    pub fn analyze(&self, updates: &[(String, Vec<f64>)]) -> Result<DetectionReport> {
        if updates.len() < self.config.min_updates.max(MIN_DETECTION_UPDATES) {
            return Ok(DetectionReport::default());
        }

        let vectors: Vec<&[f64]> = updates.iter().map(|(_, v)| v.as_slice()).collect();
        common_dimension(&vectors)?;

        let n = vectors.len();
        let mut sums = vec![0.0; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = euclidean_distance(vectors[i], vectors[j]);
                sums[i] += d;
                sums[j] += d;
            }
        }

        let means: Vec<f64> = sums.iter().map(|s| s / (n - 1) as f64).collect();
        let mu = means.iter().sum::<f64>() / n as f64;
        let variance = means.iter().map(|m| (m - mu) * (m - mu)).sum::<f64>() / n as f64;
        let threshold = mu + self.config.outlier_sigma * variance.sqrt();

        let mut report = DetectionReport {
            threshold: Some(threshold),
            ..Default::default()
        };
        for ((node_id, _), mean_distance) in updates.iter().zip(means) {
            if mean_distance > threshold {
                report.flagged.push(node_id.clone());
            }
            report.distances.push(NodeDistance {
                node_id: node_id.clone(),
                mean_distance,
            });
        }

        Ok(report)
    }
}
