//! Federated Learning Module
//!
//! Coordinates privacy-preserving training rounds across registered nodes:
//! - Node registry with per-node privacy budgets
//! - Pluggable local trainers
//! - FedAvg and byzantine-tolerant aggregation
//! - Round orchestration with bounded history

pub mod aggregator;
pub mod byzantine;
pub mod config;
pub mod orchestrator;
pub mod registry;
pub mod round;
pub mod trainer;

pub use aggregator::{fedavg, Aggregation, Aggregator};
pub use byzantine::{ByzantineDetector, DetectionReport, NodeDistance};
pub use config::{
    AggregationPolicy, DetectorConfig, FederationConfig, MIN_DETECTION_UPDATES, MIN_ROUND_NODES,
};
pub use orchestrator::RoundOrchestrator;
pub use registry::{DataHandle, Node, NodeDescriptor, NodeRegistry, NodeSpec, Update};
pub use round::{
    NodeMetrics, NodeOutcome, NodeStatus, RoundRecord, RoundSummary, TrainingMetrics,
};
pub use trainer::{gradient_spread, LocalTrainer, SimulatedTrainer, TrainingUpdate};
