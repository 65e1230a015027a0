//! A set of samples sharing consistent ratios across several buckets.

use ndarray::Array1;

use super::{intersect_sorted, union_sorted, BucketPair};
use crate::matrix::{ratio_vector, CountMatrix};

/// Samples plus the buckets (and justifying bucket pairs) they agree on.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketGroup {
    /// Position in formation order.
    pub id: usize,
    samples: Vec<usize>,
    buckets: Vec<usize>,
    pair_ids: Vec<usize>,
}

impl BucketGroup {
    /// Seed a group from two bucket pairs and their shared samples.
    pub fn from_pairs(
        id: usize,
        first: &BucketPair,
        second: &BucketPair,
        samples: Vec<usize>,
    ) -> Self {
        let mut a = first.buckets().to_vec();
        a.sort_unstable();
        let mut b = second.buckets().to_vec();
        b.sort_unstable();

        Self {
            id,
            samples,
            buckets: union_sorted(&a, &b),
            pair_ids: vec![first.id, second.id],
        }
    }

    /// Samples in ascending order.
    pub fn samples(&self) -> &[usize] {
        &self.samples
    }

    /// Buckets in ascending order.
    pub fn buckets(&self) -> &[usize] {
        &self.buckets
    }

    /// Ids of the bucket pairs that built this group.
    pub fn pair_ids(&self) -> &[usize] {
        &self.pair_ids
    }

    /// Samples this group shares with `samples`.
    pub fn shared_samples(&self, samples: &[usize]) -> Vec<usize> {
        intersect_sorted(&self.samples, samples)
    }

    /// Fold a bucket pair in: samples narrow to `shared`, buckets widen.
    pub fn fold(&mut self, pair: &BucketPair, shared: Vec<usize>) {
        let mut pb = pair.buckets().to_vec();
        pb.sort_unstable();
        self.buckets = union_sorted(&self.buckets, &pb);
        self.samples = shared;
        self.pair_ids.push(pair.id);
    }

    /// Proposed signature: the group's buckets summed over its samples,
    /// normalised to 1. Buckets outside the group are 0.
    pub fn signature(&self, counts: &CountMatrix) -> Array1<f64> {
        let mut sums = vec![0.0; counts.bucket_count()];
        for &b in &self.buckets {
            let row = counts.bucket(b);
            sums[b] = self.samples.iter().map(|&n| row[n]).sum::<f64>();
        }
        Array1::from(ratio_vector(&sums))
    }
}
