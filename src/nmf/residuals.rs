//! Residual outliers: samples and buckets the factorization explains badly.
//!
//! The overall residual fraction is `Σ|V − WH| / ΣV`. An entity (sample or
//! bucket) is flagged when its own residual fraction exceeds
//! `factor × overall` and its total count is at least `min_count_factor`
//! times the average total for that kind of entity. The count floor keeps
//! sparse, low-volume samples off the list.

use ndarray::{Array1, Array2, Axis};

use crate::matrix::CountMatrix;

/// One flagged sample or bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Outlier {
    /// Sample or bucket index.
    pub index: usize,
    /// `Σ |V − WH|` over the entity.
    pub residual: f64,
    /// Total observed count of the entity.
    pub total: f64,
    /// `residual / total`.
    pub fraction: f64,
}

/// Outliers for one factorization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResidualOutliers {
    /// Overall residual fraction.
    pub average_fraction: f64,
    /// Flagged samples, worst first.
    pub samples: Vec<Outlier>,
    /// Flagged buckets, worst first.
    pub buckets: Vec<Outlier>,
}

/// Flag samples and buckets with outsized residuals against `fitted = W·H`.
pub fn find_outliers(
    counts: &CountMatrix,
    fitted: &Array2<f64>,
    factor: f64,
    min_count_factor: f64,
) -> ResidualOutliers {
    let abs_diff: Array2<f64> = (counts.data() - fitted).mapv(f64::abs);
    let total = counts.total();
    if total <= 0.0 {
        return ResidualOutliers::default();
    }
    let average_fraction = abs_diff.sum() / total;

    let samples = flag(
        &abs_diff.sum_axis(Axis(0)),
        counts.sample_totals(),
        average_fraction * factor,
        min_count_factor,
    );
    let buckets = flag(
        &abs_diff.sum_axis(Axis(1)),
        counts.bucket_totals(),
        average_fraction * factor,
        min_count_factor,
    );

    if !samples.is_empty() || !buckets.is_empty() {
        log::info!(
            "residual outliers: {} samples, {} buckets (average fraction {:.3})",
            samples.len(),
            buckets.len(),
            average_fraction
        );
    }

    ResidualOutliers {
        average_fraction,
        samples,
        buckets,
    }
}

fn flag(
    residuals: &Array1<f64>,
    totals: &Array1<f64>,
    fraction_limit: f64,
    min_count_factor: f64,
) -> Vec<Outlier> {
    let avg_total = totals.mean().unwrap_or(0.0);
    let min_total = avg_total * min_count_factor;

    let mut out: Vec<Outlier> = residuals
        .iter()
        .zip(totals.iter())
        .enumerate()
        .filter(|&(_, (_, &t))| t > 0.0 && t >= min_total)
        .map(|(index, (&residual, &total))| Outlier {
            index,
            residual,
            total,
            fraction: residual / total,
        })
        .filter(|o| o.fraction > fraction_limit)
        .collect();

    out.sort_by(|a, b| {
        b.fraction
            .partial_cmp(&a.fraction)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_fit_has_no_outliers() {
        let counts = CountMatrix::new(array![[10.0, 20.0], [30.0, 40.0]]).unwrap();
        let out = find_outliers(&counts, counts.data(), 5.0, 0.25);
        assert_eq!(out.average_fraction, 0.0);
        assert!(out.samples.is_empty());
        assert!(out.buckets.is_empty());
    }

    #[test]
    fn test_flags_badly_fitted_sample() {
        // ten well-fitted samples, one fitted at zero
        let mut v = Array2::from_elem((2, 11), 100.0);
        v[[0, 10]] = 150.0;
        let counts = CountMatrix::new(v.clone()).unwrap();
        let mut fitted = v;
        fitted[[0, 10]] = 0.0;
        fitted[[1, 10]] = 0.0;

        let out = find_outliers(&counts, &fitted, 5.0, 0.25);
        assert_eq!(out.samples.len(), 1);
        assert_eq!(out.samples[0].index, 10);
        assert!((out.samples[0].fraction - 1.0).abs() < 1e-12);
        // the error is spread over both buckets, so neither stands out
        assert!(out.buckets.is_empty());
    }

    #[test]
    fn test_low_volume_sample_not_flagged() {
        let mut v = Array2::from_elem((2, 10), 1000.0);
        v[[0, 9]] = 10.0;
        v[[1, 9]] = 10.0;
        let counts = CountMatrix::new(v.clone()).unwrap();
        let mut fitted = v;
        fitted[[0, 9]] = 0.0;
        fitted[[1, 9]] = 0.0;

        let out = find_outliers(&counts, &fitted, 5.0, 0.25);
        assert!(out.average_fraction > 0.0);
        assert!(out.samples.is_empty());
    }
}
