//! Dense matrix primitives shared by every engine.
//!
//! Layout conventions used throughout the crate:
//!
//! | Matrix | Shape | Notes |
//! |--------|-------|-------|
//! | counts `V` | buckets × samples | finite, non-negative |
//! | signatures `W` | buckets × signatures | every column sums to 1 |
//! | contributions `H` | signatures × samples | non-negative |
//!
//! Signatures are always **columns**. Per-sample work (fitting, residuals)
//! reads columns of `V`, which is strided in ndarray's default row-major
//! layout, so [`CountMatrix::sample_major`] keeps a contiguous transposed copy
//! that is computed once on first use.

use std::sync::OnceLock;

use ndarray::{Array1, Array2, ArrayView1, Axis, Zip};

use crate::error::{Error, Result};

/// Tolerance used when checking that a signature sums to 1.
pub const SIG_SUM_TOLERANCE: f64 = 1e-6;

/// Observed counts, buckets × samples. Read-only once constructed.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    data: Array2<f64>,
    sample_totals: Array1<f64>,
    bucket_totals: Array1<f64>,
    total: f64,
    sample_major: OnceLock<Array2<f64>>,
}

impl CountMatrix {
    /// Wrap a buckets × samples matrix, rejecting empty shapes and negative
    /// or non-finite entries.
    pub fn new(data: Array2<f64>) -> Result<Self> {
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(Error::EmptyInput);
        }

        for ((row, col), &value) in data.indexed_iter() {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidValue { row, col, value });
            }
        }

        let sample_totals = data.sum_axis(Axis(0));
        let bucket_totals = data.sum_axis(Axis(1));
        let total = sample_totals.sum();

        Ok(Self {
            data,
            sample_totals,
            bucket_totals,
            total,
            sample_major: OnceLock::new(),
        })
    }

    /// Build from row vectors, one per bucket.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::EmptyInput);
        }
        let n_samples = rows[0].len();
        let mut flat = Vec::with_capacity(rows.len() * n_samples);
        for row in rows {
            if row.len() != n_samples {
                return Err(Error::DimensionMismatch {
                    expected: n_samples,
                    found: row.len(),
                });
            }
            flat.extend_from_slice(row);
        }
        let data = Array2::from_shape_vec((rows.len(), n_samples), flat)
            .map_err(|e| Error::Other(e.to_string()))?;
        Self::new(data)
    }

    /// Number of buckets (rows).
    pub fn bucket_count(&self) -> usize {
        self.data.nrows()
    }

    /// Number of samples (columns).
    pub fn sample_count(&self) -> usize {
        self.data.ncols()
    }

    /// The underlying buckets × samples matrix.
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Counts of one sample across all buckets.
    pub fn sample(&self, sample: usize) -> ArrayView1<'_, f64> {
        self.sample_major().row(sample)
    }

    /// Counts of one bucket across all samples.
    pub fn bucket(&self, bucket: usize) -> ArrayView1<'_, f64> {
        self.data.row(bucket)
    }

    /// Total count per sample.
    pub fn sample_totals(&self) -> &Array1<f64> {
        &self.sample_totals
    }

    /// Total count per bucket.
    pub fn bucket_totals(&self) -> &Array1<f64> {
        &self.bucket_totals
    }

    /// Grand total of all counts.
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Samples × buckets copy in standard layout, built on first access.
    pub fn sample_major(&self) -> &Array2<f64> {
        self.sample_major
            .get_or_init(|| self.data.t().as_standard_layout().into_owned())
    }
}

/// Column/row reductions and in-place element-wise ops used by the engines.
pub trait MatrixExt {
    /// Sum of each row.
    fn row_sums(&self) -> Array1<f64>;

    /// Sum of each column.
    fn col_sums(&self) -> Array1<f64>;

    /// `self[i,j] *= other[i,j]`.
    fn mul_assign_elementwise(&mut self, other: &Array2<f64>);

    /// `self[i,j] /= other[i,j]`, writing 0 where the denominator is 0.
    fn div_assign_elementwise_safe(&mut self, other: &Array2<f64>);

    /// Scale every column to sum to 1 and return the original sums.
    /// Zero-sum columns are left untouched.
    fn normalize_columns(&mut self) -> Array1<f64>;

    /// `Σ |self - other|`.
    fn sum_abs_diff(&self, other: &Array2<f64>) -> f64;

    /// `Σ (self - other)²`.
    fn sum_sq_diff(&self, other: &Array2<f64>) -> f64;

    /// True when every entry is finite and ≥ 0.
    fn all_finite_non_negative(&self) -> bool;
}

impl MatrixExt for Array2<f64> {
    fn row_sums(&self) -> Array1<f64> {
        self.sum_axis(Axis(1))
    }

    fn col_sums(&self) -> Array1<f64> {
        self.sum_axis(Axis(0))
    }

    fn mul_assign_elementwise(&mut self, other: &Array2<f64>) {
        Zip::from(self).and(other).for_each(|a, &b| *a *= b);
    }

    fn div_assign_elementwise_safe(&mut self, other: &Array2<f64>) {
        Zip::from(self)
            .and(other)
            .for_each(|a, &b| *a = if b == 0.0 { 0.0 } else { *a / b });
    }

    fn normalize_columns(&mut self) -> Array1<f64> {
        let sums = self.col_sums();
        for (mut col, &sum) in self.columns_mut().into_iter().zip(sums.iter()) {
            if sum > 0.0 {
                col.mapv_inplace(|v| v / sum);
            }
        }
        sums
    }

    fn sum_abs_diff(&self, other: &Array2<f64>) -> f64 {
        Zip::from(self)
            .and(other)
            .fold(0.0, |acc, &a, &b| acc + (a - b).abs())
    }

    fn sum_sq_diff(&self, other: &Array2<f64>) -> f64 {
        Zip::from(self)
            .and(other)
            .fold(0.0, |acc, &a, &b| acc + (a - b) * (a - b))
    }

    fn all_finite_non_negative(&self) -> bool {
        self.iter().all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// Check a buckets × signatures matrix: row count, non-negative entries and
/// unit column sums.
pub fn validate_signatures(sigs: &Array2<f64>, bucket_count: usize) -> Result<()> {
    if sigs.nrows() != bucket_count {
        return Err(Error::DimensionMismatch {
            expected: bucket_count,
            found: sigs.nrows(),
        });
    }

    for ((row, col), &value) in sigs.indexed_iter() {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::InvalidValue { row, col, value });
        }
    }

    for (index, sum) in sigs.col_sums().iter().enumerate() {
        if (sum - 1.0).abs() > SIG_SUM_TOLERANCE {
            return Err(Error::InvalidSignature { index, sum: *sum });
        }
    }

    Ok(())
}

/// Normalise a count vector into a ratio vector summing to 1.
/// An all-zero vector stays all zeros.
pub fn ratio_vector(counts: &[f64]) -> Vec<f64> {
    let total: f64 = counts.iter().sum();
    if total <= 0.0 {
        return vec![0.0; counts.len()];
    }
    counts.iter().map(|c| c / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_count_matrix_totals() {
        let m = CountMatrix::new(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(m.bucket_count(), 2);
        assert_eq!(m.sample_count(), 3);
        assert_eq!(m.sample_totals().to_vec(), vec![5.0, 7.0, 9.0]);
        assert_eq!(m.bucket_totals().to_vec(), vec![6.0, 15.0]);
        assert_eq!(m.total(), 21.0);
        assert_eq!(m.sample(1).to_vec(), vec![2.0, 5.0]);
        assert_eq!(m.bucket(0).to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_count_matrix_rejects_negative() {
        let err = CountMatrix::new(array![[1.0, -2.0]]).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { row: 0, col: 1, .. }));
    }

    #[test]
    fn test_count_matrix_rejects_nan_and_empty() {
        assert!(CountMatrix::new(array![[f64::NAN]]).is_err());
        assert_eq!(
            CountMatrix::new(Array2::zeros((0, 3))).unwrap_err(),
            Error::EmptyInput
        );
    }

    #[test]
    fn test_from_rows_ragged() {
        let err = CountMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert_eq!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn test_safe_division_zero_denominator() {
        let mut a = array![[4.0, 3.0], [2.0, 1.0]];
        let b = array![[2.0, 0.0], [0.5, 0.0]];
        a.div_assign_elementwise_safe(&b);
        assert_eq!(a, array![[2.0, 0.0], [4.0, 0.0]]);
    }

    #[test]
    fn test_normalize_columns() {
        let mut w = array![[1.0, 0.0], [3.0, 0.0]];
        let sums = w.normalize_columns();
        assert_eq!(sums.to_vec(), vec![4.0, 0.0]);
        assert!((w[[0, 0]] - 0.25).abs() < 1e-12);
        assert!((w[[1, 0]] - 0.75).abs() < 1e-12);
        assert_eq!(w[[0, 1]], 0.0);
    }

    #[test]
    fn test_diff_reductions() {
        let a = array![[1.0, 2.0]];
        let b = array![[2.0, 4.0]];
        assert_eq!(a.sum_abs_diff(&b), 3.0);
        assert_eq!(a.sum_sq_diff(&b), 5.0);
    }

    #[test]
    fn test_validate_signatures() {
        let good = array![[0.5, 1.0], [0.5, 0.0]];
        assert!(validate_signatures(&good, 2).is_ok());

        let bad_sum = array![[0.5, 1.0], [0.4, 0.0]];
        assert!(matches!(
            validate_signatures(&bad_sum, 2),
            Err(Error::InvalidSignature { index: 0, .. })
        ));

        assert!(matches!(
            validate_signatures(&good, 3),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_ratio_vector() {
        assert_eq!(ratio_vector(&[1.0, 3.0]), vec![0.25, 0.75]);
        assert_eq!(ratio_vector(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
