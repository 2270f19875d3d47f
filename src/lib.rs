//! # AgisFL - Byzantine-tolerant federated learning coordinator
//!
//! Coordinates training rounds across registered nodes:
//! - **Privacy**: per-node Laplace noise on every contribution
//! - **Aggregation**: FedAvg or byzantine-tolerant averaging
//! - **Scheduling**: a background driver that polls telemetry and runs rounds
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agisfl::federated::{DataHandle, FederationConfig, RoundOrchestrator, SimulatedTrainer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> agisfl::Result<()> {
//!     let trainer = Arc::new(SimulatedTrainer::default());
//!     let orchestrator = RoundOrchestrator::new(FederationConfig::default(), trainer)?;
//!
//!     for (id, epsilon) in [("bank", 1.0), ("hospital", 0.8)] {
//!         let data = DataHandle::new("kdd_cup_99", 2000);
//!         orchestrator.register_node(id, "neural_network", epsilon, Some(data)).await?;
//!     }
//!
//!     let summary = orchestrator.run_round().await?;
//!     println!("Round {} accuracy {:.3}", summary.record.round, summary.record.global_accuracy);
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod federated;
pub mod monitoring;
pub mod privacy;
pub mod scheduler;
pub mod secure;

pub use core::error::{Error, Result};
