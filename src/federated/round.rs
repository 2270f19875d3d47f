//! Round records and published training metrics.

use crate::core::{now, Timestamp};
use crate::federated::config::AggregationPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-node telemetry captured for one round, as reported by the trainer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub accuracy: f64,
    pub loss: f64,
    pub data_size: usize,
}

/// Immutable record of one successful round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Round number, starting at 1
    pub round: u64,
    /// Commit time
    pub timestamp: Timestamp,
    /// Nodes whose updates were collected
    pub participating_nodes: usize,
    /// Mean accuracy across participants
    pub global_accuracy: f64,
    /// Mean loss across participants
    pub average_loss: f64,
    /// Sum of participant data sizes
    pub total_data_samples: usize,
    /// Participant telemetry by node id
    pub node_metrics: BTreeMap<String, NodeMetrics>,
    /// Participants excluded from the aggregate
    pub excluded_nodes: Vec<String>,
    /// Policy used for this round
    pub policy: AggregationPolicy,
}

impl RoundRecord {
    /// Build a record from participant telemetry.
    pub fn new(
        round: u64,
        node_metrics: BTreeMap<String, NodeMetrics>,
        excluded_nodes: Vec<String>,
        policy: AggregationPolicy,
    ) -> Self {
        let count = node_metrics.len().max(1) as f64;
        let global_accuracy = node_metrics.values().map(|m| m.accuracy).sum::<f64>() / count;
        let average_loss = node_metrics.values().map(|m| m.loss).sum::<f64>() / count;
        let total_data_samples = node_metrics.values().map(|m| m.data_size).sum();

        Self {
            round,
            timestamp: now(),
            participating_nodes: node_metrics.len(),
            global_accuracy,
            average_loss,
            total_data_samples,
            node_metrics,
            excluded_nodes,
            policy,
        }
    }
}

/// Participation status of a node in the latest round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// No round has included this node yet
    Pending,
    /// Contributed to the latest aggregate
    Active,
    /// Contributed but was flagged and left out
    Excluded,
    /// Training failed or no data was bound
    Failed,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "pending"),
            NodeStatus::Active => write!(f, "active"),
            NodeStatus::Excluded => write!(f, "excluded"),
            NodeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What happened to one node during a round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeOutcome {
    pub node_id: String,
    pub status: NodeStatus,
    /// Failure reason for [`NodeStatus::Failed`]
    pub error: Option<String>,
}

/// Result of a committed round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundSummary {
    /// Committed record
    pub record: RoundRecord,
    /// Outcome per registered node, in registration order
    pub outcomes: Vec<NodeOutcome>,
    /// Length of the new global model
    pub model_dimension: usize,
    /// Every contributor was flagged and the unfiltered mean was used
    pub fell_back: bool,
}

impl RoundSummary {
    /// Ids of nodes that failed this round.
    pub fn failed_nodes(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.status == NodeStatus::Failed)
            .map(|o| o.node_id.as_str())
            .collect()
    }
}

/// Snapshot published to metrics subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Rounds committed so far
    pub total_rounds: u64,
    /// Registered nodes
    pub active_nodes: usize,
    /// Mean accuracy of the latest round
    pub latest_accuracy: f64,
    /// Mean loss of the latest round
    pub latest_loss: f64,
    /// Samples behind the latest round
    pub total_samples: usize,
    /// Most recent round records, oldest first
    pub training_history: Vec<RoundRecord>,
    /// Latest-round status per registered node
    pub node_status: BTreeMap<String, NodeStatus>,
    /// Snapshot time
    pub generated_at: Timestamp,
}
