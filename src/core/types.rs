//! Common types used across AgisFL modules.

use crate::core::{Error, Result};

/// Timestamp wrapper for consistent serialization.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Get current UTC timestamp.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}

/// Check that every vector has the same length and return that length.
///
/// An empty slice is reported as [`Error::EmptyAggregation`].
pub fn common_dimension<V: AsRef<[f64]>>(vectors: &[V]) -> Result<usize> {
    let first = vectors.first().ok_or(Error::EmptyAggregation)?;
    let expected = first.as_ref().len();

    for v in vectors.iter().skip(1) {
        let actual = v.as_ref().len();
        if actual != expected {
            return Err(Error::DimensionMismatch { expected, actual });
        }
    }

    Ok(expected)
}

/// Elementwise arithmetic mean of equally sized vectors.
pub fn elementwise_mean<V: AsRef<[f64]>>(vectors: &[V]) -> Result<Vec<f64>> {
    let dim = common_dimension(vectors)?;
    let mut mean = vec![0.0; dim];

    for v in vectors {
        for (acc, x) in mean.iter_mut().zip(v.as_ref()) {
            *acc += x;
        }
    }

    let count = vectors.len() as f64;
    for m in &mut mean {
        *m /= count;
    }

    Ok(mean)
}

/// Euclidean distance between two vectors of equal length.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elementwise_mean() {
        let vectors = vec![vec![1.0, 2.0, 3.0], vec![3.0, 4.0, 5.0]];
        let mean = elementwise_mean(&vectors).unwrap();
        assert_eq!(mean, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_mean_rejects_mismatched_lengths() {
        let vectors = vec![vec![1.0, 2.0], vec![1.0, 2.0, 3.0]];
        let err = elementwise_mean(&vectors).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }));
    }

    #[test]
    fn test_mean_of_nothing() {
        let vectors: Vec<Vec<f64>> = Vec::new();
        assert!(matches!(elementwise_mean(&vectors), Err(Error::EmptyAggregation)));
    }

    #[test]
    fn test_euclidean_distance() {
        assert!((euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-12);
        assert_eq!(euclidean_distance(&[1.0], &[1.0]), 0.0);
    }
}
