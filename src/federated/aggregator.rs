//! Update aggregation for federated learning.
//!
//! Implements FedAvg and byzantine-tolerant averaging.

use crate::core::{elementwise_mean, Result};
use crate::federated::byzantine::ByzantineDetector;
use crate::federated::config::AggregationPolicy;
use serde::{Deserialize, Serialize};

/// Outcome of aggregating one round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Aggregation {
    /// Global update vector
    pub global_update: Vec<f64>,
    /// Nodes excluded as byzantine
    pub excluded: Vec<String>,
    /// Every node was flagged and the unfiltered mean was used instead
    pub fell_back: bool,
    /// Policy that produced this result
    pub policy: AggregationPolicy,
}

/// Plain elementwise mean of every contribution.
pub fn fedavg(updates: &[(String, Vec<f64>)]) -> Result<Vec<f64>> {
    let vectors: Vec<&[f64]> = updates.iter().map(|(_, v)| v.as_slice()).collect();
    elementwise_mean(&vectors)
}

/// Combines accepted updates into one global update.
#[derive(Clone, Debug, Default)]
pub struct Aggregator {
    detector: ByzantineDetector,
}

impl Aggregator {
    /// Create an aggregator backed by the given detector.
    pub fn new(detector: ByzantineDetector) -> Self {
        Self { detector }
    }

    /// The detector used by byzantine-tolerant averaging.
    pub fn detector(&self) -> &ByzantineDetector {
        &self.detector
    }

    /// Aggregate updates under the given policy.
    ///
    /// All vectors must share one length. Byzantine-tolerant averaging never
    /// returns an empty result: if every node is flagged it averages the
    /// unfiltered set.
    pub fn aggregate(
        &self,
        updates: &[(String, Vec<f64>)],
        policy: AggregationPolicy,
    ) -> Result<Aggregation> {
        match policy {
            AggregationPolicy::FedAvg => Ok(Aggregation {
                global_update: fedavg(updates)?,
                excluded: Vec::new(),
                fell_back: false,
                policy,
            }),
            AggregationPolicy::ByzantineTolerantAveraging => {
                let flagged = self.detector.detect(updates)?;
                self.robust_mean(updates, flagged, policy)
            }
        }
    }

    /// Average after removing `flagged`, falling back to the full set when
    /// nothing would remain.
    pub fn robust_mean(
        &self,
        updates: &[(String, Vec<f64>)],
        flagged: Vec<String>,
        policy: AggregationPolicy,
    ) -> Result<Aggregation> {
        if updates.is_empty() {
            return Err(crate::core::Error::EmptyAggregation);
        }

        let clean: Vec<&[f64]> = updates
            .iter()
            .filter(|(id, _)| !flagged.contains(id))
            .map(|(_, v)| v.as_slice())
            .collect();

        if clean.is_empty() {
            tracing::warn!(
                flagged = flagged.len(),
                "All contributors flagged, averaging unfiltered updates"
            );
            return Ok(Aggregation {
                global_update: fedavg(updates)?,
                excluded: flagged,
                fell_back: true,
                policy,
            });
        }

        // still reject mismatched lengths among excluded vectors
        crate::core::common_dimension(
            &updates.iter().map(|(_, v)| v.as_slice()).collect::<Vec<_>>(),
        )?;

        Ok(Aggregation {
            global_update: elementwise_mean(&clean)?,
            excluded: flagged,
            fell_back: false,
            policy,
        })
    }
}
