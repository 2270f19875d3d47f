//! Coordinator counters.
//!
//! Lock-free counters and gauges with Prometheus text export.

use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric (monotonically increasing).
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by amount.
    pub fn add(&self, amount: u64) {
        self.value.fetch_add(amount, Ordering::Relaxed);
    }

    /// Get current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64, // f64 bits
}

impl Gauge {
    /// Create a new gauge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gauge value.
    pub fn set(&self, value: f64) {
        self.value.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Get current value.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed))
    }
}

/// Operational counters for one coordinator.
#[derive(Debug, Default)]
pub struct CoordinatorStats {
    /// Rounds committed
    pub rounds_completed: Counter,
    /// Round attempts that failed as a whole
    pub rounds_failed: Counter,
    /// Per-node trainer or data failures
    pub node_failures: Counter,
    /// Contributions excluded as byzantine
    pub byzantine_exclusions: Counter,
    /// Currently registered nodes
    pub registered_nodes: Gauge,
    /// Accuracy of the latest committed round
    pub latest_accuracy: Gauge,
}

impl CoordinatorStats {
    /// Create zeroed stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Export in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        let counters = [
            ("agisfl_rounds_completed_total", "Committed training rounds", &self.rounds_completed),
            ("agisfl_rounds_failed_total", "Failed round attempts", &self.rounds_failed),
            ("agisfl_node_failures_total", "Per-node training failures", &self.node_failures),
            (
                "agisfl_byzantine_exclusions_total",
                "Contributions excluded as byzantine",
                &self.byzantine_exclusions,
            ),
        ];
        let gauges = [
            ("agisfl_registered_nodes", "Registered nodes", &self.registered_nodes),
            ("agisfl_latest_accuracy", "Mean accuracy of the latest round", &self.latest_accuracy),
        ];

        let mut output = String::new();
        for (name, help, counter) in counters {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n", name, counter.get()));
        }
        for (name, help, gauge) in gauges {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} gauge\n", name));
            output.push_str(&format!("{} {}\n", name, gauge.get()));
        }
        output
    }
}
