//! Federation configuration.
//!
//! Round-scoped settings loaded from JSON or built in code.

use crate::core::{Error, Result};
use crate::privacy::DEFAULT_DELTA;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How accepted updates are combined into the global update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Plain elementwise mean of every contribution
    #[serde(rename = "fedavg")]
    FedAvg,
    /// Exclude flagged outliers, then average the rest
    ByzantineTolerantAveraging,
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        Self::FedAvg
    }
}

impl std::fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregationPolicy::FedAvg => write!(f, "fedavg"),
            AggregationPolicy::ByzantineTolerantAveraging => {
                write!(f, "byzantine_tolerant_averaging")
            }
        }
    }
}

impl std::str::FromStr for AggregationPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fedavg" => Ok(Self::FedAvg),
            "byzantine_tolerant_averaging" => Ok(Self::ByzantineTolerantAveraging),
            other => Err(Error::InvalidConfig(format!(
                "unknown aggregation policy '{}'",
                other
            ))),
        }
    }
}

/// Outlier detector settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Flag nodes whose mean distance exceeds mean + k * stddev
    pub outlier_sigma: f64,
    /// Below this many updates nothing is flagged
    pub min_updates: usize,
}

/// Smallest population the detector draws statistics from.
pub const MIN_DETECTION_UPDATES: usize = 3;

/// Smallest registry a round may run with.
pub const MIN_ROUND_NODES: usize = 2;

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            outlier_sigma: 2.0,
            min_updates: MIN_DETECTION_UPDATES,
        }
    }
}

/// Coordinator configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Aggregation policy applied by `start_round`
    pub aggregation: AggregationPolicy,
    /// Minimum registered nodes before a round may start
    pub min_nodes: usize,
    /// Round records retained for queries
    pub history_window: usize,
    /// Sensitivity passed to the noise injector
    pub sensitivity: f64,
    /// Delta assigned to every node's noise injector
    pub delta: f64,
    /// Byzantine detector settings
    pub detector: DetectorConfig,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            aggregation: AggregationPolicy::FedAvg,
            min_nodes: 2,
            history_window: 10,
            sensitivity: 1.0,
            delta: DEFAULT_DELTA,
            detector: DetectorConfig::default(),
        }
    }
}

impl FederationConfig {
    /// Config using byzantine-tolerant averaging.
    pub fn byzantine_tolerant() -> Self {
        Self {
            aggregation: AggregationPolicy::ByzantineTolerantAveraging,
            ..Default::default()
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Reject values the coordinator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.min_nodes < MIN_ROUND_NODES {
            return Err(Error::InvalidConfig(format!(
                "min_nodes must be at least {}, got {}",
                MIN_ROUND_NODES, self.min_nodes
            )));
        }
        if self.history_window == 0 {
            return Err(Error::InvalidConfig("history_window must be positive".into()));
        }
        if !self.sensitivity.is_finite() || self.sensitivity <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "sensitivity must be positive, got {}",
                self.sensitivity
            )));
        }
        if !(0.0..1.0).contains(&self.delta) {
            return Err(Error::InvalidConfig(format!(
                "delta must be in [0, 1), got {}",
                self.delta
            )));
        }
        if !self.detector.outlier_sigma.is_finite() || self.detector.outlier_sigma < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "outlier_sigma must be non-negative, got {}",
                self.detector.outlier_sigma
            )));
        }
        if self.detector.min_updates < MIN_DETECTION_UPDATES {
            return Err(Error::InvalidConfig(format!(
                "detector.min_updates must be at least {}, got {}",
                MIN_DETECTION_UPDATES, self.detector.min_updates
            )));
        }
        Ok(())
    }
}
