//! Local trainer contract.
//!
//! The coordinator never trains anything itself: it asks a [`LocalTrainer`]
//! for each node's update and treats the result as opaque numbers.

use crate::core::{Error, Result};
use crate::federated::registry::NodeDescriptor;
use async_trait::async_trait;
use rand::Rng;
use rand_distr::{Distribution, Exp, Normal};
use serde::{Deserialize, Serialize};

/// What a trainer returns for one node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingUpdate {
    /// Gradient-like vector
    pub gradients: Vec<f64>,
    /// Accuracy in [0, 1]
    pub accuracy: f64,
    /// Non-negative loss
    pub loss: f64,
    /// Samples trained on
    pub data_size: usize,
}

impl TrainingUpdate {
    /// Reject updates the aggregator cannot use.
    pub fn validate(&self, node_id: &str) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidUpdate {
            node_id: node_id.to_string(),
            reason: reason.to_string(),
        };

        if self.gradients.is_empty() {
            return Err(invalid("empty gradient vector"));
        }
        if self.gradients.iter().any(|g| !g.is_finite()) {
            return Err(invalid("non-finite gradient entry"));
        }
        if self.data_size == 0 {
            return Err(invalid("data size must be positive"));
        }
        Ok(())
    }
}

/// Produces local updates for nodes.
#[async_trait]
pub trait LocalTrainer: Send + Sync {
    /// Train on the node's bound data and return its update.
    async fn train(&self, node: &NodeDescriptor) -> Result<TrainingUpdate>;
}

/// Gradient spread used for a model kind.
pub fn gradient_spread(model_kind: &str) -> f64 {
    match model_kind {
        "neural_network" => 0.1,
        "random_forest" => 0.05,
        _ => 0.08,
    }
}

/// Trainer that fabricates plausible updates without a real model.
///
/// Gradients are Normal(0, spread) with the spread chosen by model kind,
/// accuracy is uniform in [0.80, 0.95] and loss is exponential with mean 0.2.
#[derive(Clone, Debug)]
pub struct SimulatedTrainer {
    dimension: usize,
}

impl SimulatedTrainer {
    /// Create a trainer emitting vectors of the given length.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Length of emitted vectors.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Produce one update with a caller-supplied RNG.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        node: &NodeDescriptor,
        rng: &mut R,
    ) -> Result<TrainingUpdate> {
        let data = node
            .data
            .as_ref()
            .ok_or_else(|| Error::NoTrainingData(node.id.clone()))?;

        let normal = Normal::new(0.0, gradient_spread(&node.model_kind))
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let exp = Exp::new(5.0).map_err(|e| Error::InvalidConfig(e.to_string()))?;

        let gradients = (0..self.dimension).map(|_| normal.sample(rng)).collect();

        Ok(TrainingUpdate {
            gradients,
            accuracy: rng.gen_range(0.80..0.95),
            loss: exp.sample(rng),
            data_size: data.sample_count,
        })
    }
}

impl Default for SimulatedTrainer {
    fn default() -> Self {
        Self::new(38)
    }
}

#[async_trait]
impl LocalTrainer for SimulatedTrainer {
    async fn train(&self, node: &NodeDescriptor) -> Result<TrainingUpdate> {
        self.sample(node, &mut rand::thread_rng())
    }
}
