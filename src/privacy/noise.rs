//! Laplace noise injection for differential privacy.
//!
//! Each coordinate is perturbed independently with noise drawn from
//! Laplace(0, sensitivity / epsilon).

use crate::core::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default delta carried alongside epsilon.
pub const DEFAULT_DELTA: f64 = 1e-5;

/// Laplace-mechanism noise injector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseInjector {
    epsilon: f64,
    /// Not consumed by the Laplace mechanism; kept for budget composition.
    delta: f64,
}

impl NoiseInjector {
    /// Create an injector with the given privacy budget.
    ///
    /// Epsilon must be finite and strictly positive.
    pub fn new(epsilon: f64, delta: f64) -> Result<Self> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(Error::InvalidPrivacyBudget(epsilon));
        }
        if !(0.0..1.0).contains(&delta) {
            return Err(Error::InvalidConfig(format!(
                "delta must be in [0, 1), got {}",
                delta
            )));
        }

        Ok(Self { epsilon, delta })
    }

    /// Create an injector with [`DEFAULT_DELTA`].
    pub fn with_epsilon(epsilon: f64) -> Result<Self> {
        Self::new(epsilon, DEFAULT_DELTA)
    }

    /// Privacy budget.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Failure probability.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Laplace scale for the given sensitivity.
    pub fn scale(&self, sensitivity: f64) -> f64 {
        sensitivity / self.epsilon
    }

    /// Return `vector + noise` using the thread-local RNG.
    pub fn add_noise(&self, vector: &[f64], sensitivity: f64) -> Vec<f64> {
        self.add_noise_with_rng(vector, sensitivity, &mut rand::thread_rng())
    }

    /// Return `vector + noise` drawing from a caller-supplied RNG.
    pub fn add_noise_with_rng<R: Rng + ?Sized>(
        &self,
        vector: &[f64],
        sensitivity: f64,
        rng: &mut R,
    ) -> Vec<f64> {
        let scale = self.scale(sensitivity);
        vector
            .iter()
            .map(|x| x + sample_laplace(scale, rng))
            .collect()
    }

    /// Differentially private scalar mean of a vector.
    pub fn private_mean(&self, vector: &[f64]) -> f64 {
        self.private_mean_with_rng(vector, &mut rand::thread_rng())
    }

    /// [`NoiseInjector::private_mean`] with a caller-supplied RNG.
    pub fn private_mean_with_rng<R: Rng + ?Sized>(&self, vector: &[f64], rng: &mut R) -> f64 {
        let mean = if vector.is_empty() {
            0.0
        } else {
            vector.iter().sum::<f64>() / vector.len() as f64
        };
        self.add_noise_with_rng(&[mean], 1.0, rng)[0]
    }
}

/// Sample Laplace(0, scale) by inverting the CDF.
pub fn sample_laplace<R: Rng + ?Sized>(scale: f64, rng: &mut R) -> f64 {
    let u: f64 = rng.gen::<f64>() - 0.5;
    // u == -0.5 would hit ln(0)
    let tail = (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE);
    -scale * u.signum() * tail.ln()
}

/// Mean absolute perturbation observed for one epsilon.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoiseLevel {
    /// Privacy budget tested
    pub epsilon: f64,
    /// Mean |noisy - original| over all trials
    pub mean_abs_noise: f64,
}

/// Measure how strongly each epsilon perturbs a fixed probe vector.
///
/// Useful as a self-check that smaller budgets add more noise.
pub fn noise_profile(epsilons: &[f64], trials: usize) -> Result<Vec<NoiseLevel>> {
    let probe = [1.0, 2.0, 3.0, 4.0, 5.0];
    let trials = trials.max(1);

    epsilons
        .iter()
        .map(|&epsilon| {
            let injector = NoiseInjector::with_epsilon(epsilon)?;
            let mut total = 0.0;
            for _ in 0..trials {
                let noisy = injector.add_noise(&probe, 1.0);
                total += noisy
                    .iter()
                    .zip(probe.iter())
                    .map(|(n, p)| (n - p).abs())
                    .sum::<f64>();
            }
            Ok(NoiseLevel {
                epsilon,
                mean_abs_noise: total / (trials * probe.len()) as f64,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn mean_abs_perturbation(epsilon: f64, rng: &mut StdRng) -> f64 {
        let injector = NoiseInjector::with_epsilon(epsilon).unwrap();
        let zeros = vec![0.0; 5000];
        let noisy = injector.add_noise_with_rng(&zeros, 1.0, rng);
        noisy.iter().map(|x| x.abs()).sum::<f64>() / noisy.len() as f64
    }

    #[test]
    fn test_rejects_non_positive_epsilon() {
        assert!(matches!(
            NoiseInjector::with_epsilon(0.0),
            Err(Error::InvalidPrivacyBudget(_))
        ));
        assert!(NoiseInjector::with_epsilon(-1.0).is_err());
        assert!(NoiseInjector::with_epsilon(f64::NAN).is_err());
    }

    #[test]
    fn test_rejects_bad_delta() {
        assert!(NoiseInjector::new(1.0, 1.5).is_err());
        assert!(NoiseInjector::new(1.0, 0.0).is_ok());
    }

    #[test]
    fn test_noise_preserves_length() {
        let injector = NoiseInjector::with_epsilon(1.0).unwrap();
        let noisy = injector.add_noise(&[1.0, 2.0, 3.0], 1.0);
        assert_eq!(noisy.len(), 3);
    }

    #[test]
    fn test_noise_decreases_with_epsilon() {
        let mut rng = StdRng::seed_from_u64(7);
        let high = mean_abs_perturbation(0.1, &mut rng);
        let medium = mean_abs_perturbation(1.0, &mut rng);
        let low = mean_abs_perturbation(10.0, &mut rng);

        assert!(high > medium, "{} <= {}", high, medium);
        assert!(medium > low, "{} <= {}", medium, low);
        // E|Laplace(0, b)| = b
        assert!((medium - 1.0).abs() < 0.1);
    }

    #[test]
    fn test_noise_is_zero_centered() {
        let mut rng = StdRng::seed_from_u64(11);
        let injector = NoiseInjector::with_epsilon(1.0).unwrap();
        let noisy = injector.add_noise_with_rng(&vec![0.0; 20_000], 1.0, &mut rng);
        let mean = noisy.iter().sum::<f64>() / noisy.len() as f64;
        assert!(mean.abs() < 0.05);
    }

    #[test]
    fn test_private_mean() {
        let mut rng = StdRng::seed_from_u64(3);
        let injector = NoiseInjector::with_epsilon(1000.0).unwrap();
        let mean = injector.private_mean_with_rng(&[1.0, 2.0, 3.0], &mut rng);
        assert!((mean - 2.0).abs() < 0.1);
    }

    #[test]
    fn test_noise_profile_is_monotonic() {
        let profile = noise_profile(&[0.1, 1.0, 10.0], 400).unwrap();
        assert_eq!(profile.len(), 3);
        assert!(profile[0].mean_abs_noise > profile[1].mean_abs_noise);
        assert!(profile[1].mean_abs_noise > profile[2].mean_abs_noise);
    }
}
