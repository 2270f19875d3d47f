//! Differential Privacy Module
//!
//! Perturbs node contributions before they leave the node:
//! - Laplace mechanism with scale sensitivity / epsilon
//! - Private scalar means
//! - Noise profiling across budgets

pub mod noise;

pub use noise::{noise_profile, sample_laplace, NoiseInjector, NoiseLevel, DEFAULT_DELTA};
