//! Bucket-pair clustering: unsupervised signature proposals.
//!
//! If a single process dominates a set of samples, the ratio between any two
//! buckets that process touches is roughly the same in every one of those
//! samples. The analyser looks for exactly that.
//!
//! ## Procedure
//!
//! 1. **Ratios**: for each bucket pair `(a, b)` with `a < b` and each sample,
//!    `countA / countB` clamped to `[ratio_min, ratio_max]`. Pairs where
//!    either count is at or below `min_bucket_count` are excluded.
//! 2. **Bucket pairs**: per bucket pair, samples with similar ratios are
//!    collected into a [`BucketPair`] with a low/high ratio range.
//! 3. **Merge**: overlapping ranges for the same bucket pair are merged.
//! 4. **Groups**: bucket pairs that share samples (and, when seeding a new
//!    group, exactly one bucket) are agglomerated into [`BucketGroup`]s.
//!
//! ## Order dependence
//!
//! Step 4 is greedy. A bucket pair joins the *first* group that accepts it and
//! otherwise pairs with the *first* compatible ungrouped bucket pair, so group
//! membership depends on processing order. That order is fixed: bucket pairs
//! are numbered in row-major `(a, b)` order and, within one row, in the order
//! their first sample was seen. The same input always gives the same groups.
//!
//! ```rust
//! use mutsig::bucket::{BucketAnalyser, BucketConfig};
//! use mutsig::CountMatrix;
//!
//! // two buckets with a fixed 2:1 ratio across 25 samples
//! let rows = vec![vec![100.0; 25], vec![50.0; 25]];
//! let counts = CountMatrix::from_rows(&rows).unwrap();
//!
//! let analyser = BucketAnalyser::new(BucketConfig::default());
//! let pairs = analyser.find_pairs(&counts);
//! assert_eq!(pairs.len(), 1);
//! assert!((pairs[0].low - 2.0).abs() < 1e-9);
//! ```

mod analyser;
mod group;
mod pair;

pub use analyser::{BucketAnalyser, BucketDiscovery};
pub use group::BucketGroup;
pub use pair::BucketPair;

use crate::error::{Error, Result};

/// Thresholds for bucket-pair clustering.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BucketConfig {
    /// Counts at or below this are too noisy to form a ratio.
    pub min_bucket_count: f64,
    /// Minimum samples for a bucket pair or group to be kept.
    pub min_sample_count: usize,
    /// Lower clamp for bucket ratios.
    pub ratio_min: f64,
    /// Upper clamp for bucket ratios.
    pub ratio_max: f64,
    /// Relative widening of a bucket pair's range when testing a new ratio.
    pub ratio_tolerance: f64,
    /// Minimum distinct buckets for a group to be kept.
    pub min_group_buckets: usize,
    /// Cosine similarity above which two proposed signatures are duplicates.
    pub proposal_dedup_cutoff: f64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            min_bucket_count: 20.0,
            min_sample_count: 20,
            ratio_min: 0.01,
            ratio_max: 100.0,
            ratio_tolerance: 0.1,
            min_group_buckets: 3,
            proposal_dedup_cutoff: 0.98,
        }
    }
}

impl BucketConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum bucket count.
    pub fn with_min_bucket_count(mut self, count: f64) -> Self {
        self.min_bucket_count = count;
        self
    }

    /// Set the minimum sample count.
    pub fn with_min_sample_count(mut self, count: usize) -> Self {
        self.min_sample_count = count;
        self
    }

    /// Set the ratio tolerance.
    pub fn with_ratio_tolerance(mut self, tolerance: f64) -> Self {
        self.ratio_tolerance = tolerance;
        self
    }

    /// Set the minimum number of buckets per group.
    pub fn with_min_group_buckets(mut self, buckets: usize) -> Self {
        self.min_group_buckets = buckets;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.min_sample_count == 0 {
            return Err(Error::InvalidParameter {
                name: "min_sample_count",
                message: "must be > 0",
            });
        }
        if !(self.ratio_min > 0.0 && self.ratio_min < self.ratio_max) {
            return Err(Error::InvalidParameter {
                name: "ratio_min",
                message: "must satisfy 0 < ratio_min < ratio_max",
            });
        }
        if !(0.0..1.0).contains(&self.ratio_tolerance) {
            return Err(Error::InvalidParameter {
                name: "ratio_tolerance",
                message: "must be in [0, 1)",
            });
        }
        if !(0.0..=1.0).contains(&self.proposal_dedup_cutoff) {
            return Err(Error::InvalidParameter {
                name: "proposal_dedup_cutoff",
                message: "must be in [0, 1]",
            });
        }
        Ok(())
    }
}

/// Intersection of two ascending sample lists.
pub(crate) fn intersect_sorted(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Union of two ascending sample lists.
pub(crate) fn union_sorted(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        if j >= b.len() || (i < a.len() && a[i] < b[j]) {
            out.push(a[i]);
            i += 1;
        } else if i >= a.len() || b[j] < a[i] {
            out.push(b[j]);
            j += 1;
        } else {
            out.push(a[i]);
            i += 1;
            j += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_set_ops() {
        assert_eq!(intersect_sorted(&[1, 3, 5, 7], &[3, 4, 5]), vec![3, 5]);
        assert_eq!(union_sorted(&[1, 3, 5], &[2, 3, 6]), vec![1, 2, 3, 5, 6]);
        assert!(intersect_sorted(&[], &[1]).is_empty());
    }

    #[test]
    fn test_config_validation() {
        assert!(BucketConfig::default().validate().is_ok());
        assert!(BucketConfig::default()
            .with_min_sample_count(0)
            .validate()
            .is_err());
        assert!(BucketConfig::default()
            .with_ratio_tolerance(1.5)
            .validate()
            .is_err());
    }
}
