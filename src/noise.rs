//! Poisson noise margins for per-sample fitting.
//!
//! An observed count `c` is treated as one draw from `Poisson(c)`. The noise
//! margin is how far above `c` the count could plausibly have been:
//!
//! ```text
//! margin(c, p) = min { x ≥ c : P(X ≤ x) ≥ 1 - p } - c,   X ~ Poisson(c)
//! ```
//!
//! The optimiser adds the margin to each bucket's ceiling so a signature is not
//! rejected because one bucket came in slightly low.

use ndarray::Array2;
use statrs::distribution::{DiscreteCDF, Poisson};

use crate::error::{Error, Result};
use crate::matrix::CountMatrix;

/// Upper Poisson margin for one count. Zero counts have zero margin.
pub fn poisson_margin(count: f64, probability: f64) -> Result<f64> {
    if !(probability > 0.0 && probability < 1.0) {
        return Err(Error::InvalidParameter {
            name: "probability",
            message: "must be in (0, 1)",
        });
    }
    if count <= 0.0 {
        return Ok(0.0);
    }

    let dist = Poisson::new(count).map_err(|e| Error::Other(e.to_string()))?;
    let target = 1.0 - probability;

    let mut x = count.floor() as u64;
    while dist.cdf(x) < target {
        x += 1;
    }

    Ok((x as f64 - count).max(0.0))
}

/// Margins for every bucket of every sample, same shape as the counts.
///
/// Each distinct count is evaluated once.
pub fn noise_margins(counts: &CountMatrix, probability: f64) -> Result<Array2<f64>> {
    let data = counts.data();
    let mut margins = Array2::zeros(data.raw_dim());
    let mut cache: std::collections::HashMap<u64, f64> = std::collections::HashMap::new();

    for ((b, n), &count) in data.indexed_iter() {
        let key = count.to_bits();
        let margin = match cache.get(&key) {
            Some(&m) => m,
            None => {
                let m = poisson_margin(count, probability)?;
                cache.insert(key, m);
                m
            }
        };
        margins[[b, n]] = margin;
    }

    Ok(margins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_zero_count_has_no_margin() {
        assert_eq!(poisson_margin(0.0, 0.01).unwrap(), 0.0);
    }

    #[test]
    fn test_margin_grows_with_count() {
        let small = poisson_margin(10.0, 0.01).unwrap();
        let large = poisson_margin(1000.0, 0.01).unwrap();
        assert!(small > 0.0);
        assert!(large > small);
        // roughly 2.33 standard deviations for large counts
        assert!(large > 60.0 && large < 90.0, "margin {large}");
    }

    #[test]
    fn test_stricter_probability_widens_margin() {
        let loose = poisson_margin(100.0, 0.1).unwrap();
        let strict = poisson_margin(100.0, 0.001).unwrap();
        assert!(strict > loose);
    }

    #[test]
    fn test_invalid_probability() {
        assert!(poisson_margin(10.0, 0.0).is_err());
        assert!(poisson_margin(10.0, 1.5).is_err());
    }

    #[test]
    fn test_noise_margins_shape() {
        let counts = CountMatrix::new(array![[0.0, 50.0], [50.0, 200.0]]).unwrap();
        let margins = noise_margins(&counts, 0.05).unwrap();
        assert_eq!(margins.dim(), (2, 2));
        assert_eq!(margins[[0, 0]], 0.0);
        assert_eq!(margins[[0, 1]], margins[[1, 0]]);
        assert!(margins[[1, 1]] > margins[[0, 1]]);
    }
}
