//! Scheduler Module
//!
//! Background driver that polls telemetry and triggers rounds on a fixed
//! wall-clock interval.

pub mod config;
pub mod driver;

pub use config::{RoundTrigger, SchedulerConfig};
pub use driver::{Scheduler, SchedulerEvent};
