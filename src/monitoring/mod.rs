//! Monitoring Module
//!
//! Provides observability for the coordinator:
//! - Structured logging via tracing
//! - Lock-free counters with Prometheus export
//! - Telemetry sources polled by the scheduler

pub mod logging;
pub mod metrics;
pub mod telemetry;

pub use logging::{init_tracing, LogConfig, LogLevel};
pub use metrics::{CoordinatorStats, Counter, Gauge};
pub use telemetry::{ProcessTelemetry, StaticTelemetry, TelemetrySnapshot, TelemetrySource};
