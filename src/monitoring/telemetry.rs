//! Telemetry collaborators polled by the scheduler.

use crate::core::{now, Result, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// One reading handed to subscribers as-is.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub timestamp: Timestamp,
    /// Name of the producing source
    pub source: String,
    /// Opaque payload
    pub data: serde_json::Value,
}

/// Supplies the current telemetry reading.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Read the current values.
    async fn snapshot(&self) -> Result<TelemetrySnapshot>;
}

/// Returns the same payload on every call.
#[derive(Clone, Debug)]
pub struct StaticTelemetry {
    source: String,
    data: serde_json::Value,
}

impl StaticTelemetry {
    pub fn new(source: &str, data: serde_json::Value) -> Self {
        Self {
            source: source.to_string(),
            data,
        }
    }
}

#[async_trait]
impl TelemetrySource for StaticTelemetry {
    async fn snapshot(&self) -> Result<TelemetrySnapshot> {
        Ok(TelemetrySnapshot {
            timestamp: now(),
            source: self.source.clone(),
            data: self.data.clone(),
        })
    }
}

/// Coordinator process facts: pid, uptime and available parallelism.
#[derive(Debug)]
pub struct ProcessTelemetry {
    started: Instant,
}

impl ProcessTelemetry {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for ProcessTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetrySource for ProcessTelemetry {
    async fn snapshot(&self) -> Result<TelemetrySnapshot> {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Ok(TelemetrySnapshot {
            timestamp: now(),
            source: "process".to_string(),
            data: serde_json::json!({
                "pid": std::process::id(),
                "uptime_ms": self.started.elapsed().as_millis() as u64,
                "parallelism": parallelism,
            }),
        })
    }
}
