//! Scheduler configuration.

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which counter decides that a tick runs a round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundTrigger {
    /// Every `round_every`-th tick, counting from tick 0
    #[default]
    EveryNthTick,
    /// Whenever the committed round counter is a multiple of `round_every`.
    /// Stalls once a round succeeds off a multiple.
    RoundCounterModulo,
}

/// Periodic driver settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Wall-clock tick period
    pub tick_interval_ms: u64,
    /// Round cadence
    pub round_every: u64,
    pub trigger: RoundTrigger,
    /// Bounded wait for the current tick on stop
    pub stop_timeout_ms: u64,
    /// Broadcast buffer per subscriber
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10_000,
            round_every: 5,
            trigger: RoundTrigger::EveryNthTick,
            stop_timeout_ms: 5_000,
            event_capacity: 64,
        }
    }
}

impl SchedulerConfig {
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

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(Error::InvalidConfig("tick_interval_ms must be positive".into()));
        }
        if self.round_every == 0 {
            return Err(Error::InvalidConfig("round_every must be positive".into()));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidConfig("event_capacity must be positive".into()));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_secs(10));
        assert_eq!(config.round_every, 5);
        assert_eq!(config.trigger, RoundTrigger::EveryNthTick);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json() {
        let config =
            SchedulerConfig::from_json(r#"{"round_every": 3, "trigger": "round_counter_modulo"}"#)
                .unwrap();
        assert_eq!(config.round_every, 3);
        assert_eq!(config.trigger, RoundTrigger::RoundCounterModulo);
        assert_eq!(config.stop_timeout_ms, 5_000);
    }

    #[test]
    fn test_invalid_values() {
        assert!(SchedulerConfig::from_json(r#"{"round_every": 0}"#)
            .unwrap_err()
            .is_configuration());
        assert!(SchedulerConfig::from_json(r#"{"tick_interval_ms": 0}"#).is_err());
        assert!(SchedulerConfig::from_json("not json").is_err());
    }
}
