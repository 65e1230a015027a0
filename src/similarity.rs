//! Cosine-similarity matching between signature sets.
//!
//! Every engine compares signatures the same way: as columns of a
//! buckets × k matrix, scored by cosine similarity.
//!
//! ```text
//! cos(a, b) = a·b / (‖a‖ ‖b‖)
//! ```
//!
//! For non-negative vectors the score lies in [0, 1]. A zero vector scores 0
//! against anything; that is a normal outcome on sparse data, not an error.
//!
//! ## Exclusive matching
//!
//! [`top_pairs`] with `exclusive = true` turns the sorted pair list into a
//! greedy one-to-one alignment: walking from the best pair down, each kept
//! pair removes every later pair that shares either of its indices.

use ndarray::{Array2, ArrayView1};

/// One scored pair: column `i` of the first set against column `j` of the second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimPair {
    /// Column index in the first set.
    pub i: usize,
    /// Column index in the second set.
    pub j: usize,
    /// Cosine similarity.
    pub sim: f64,
}

/// Cosine similarity of two equal-length vectors.
///
/// Returns 0 when either squared norm is ≤ 0 or the lengths differ.
pub fn cosine_sim(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    if a.len() != b.len() {
        log::warn!("cosine_sim on vectors of length {} and {}", a.len(), b.len());
        return 0.0;
    }

    let mut dot = 0.0;
    let mut aa = 0.0;
    let mut bb = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x * y;
        aa += x * x;
        bb += y * y;
    }

    if aa <= 0.0 || bb <= 0.0 {
        return 0.0;
    }

    (dot / (aa.sqrt() * bb.sqrt())).min(1.0)
}

/// Slice convenience wrapper around [`cosine_sim`].
pub fn cosine_sim_slices(a: &[f64], b: &[f64]) -> f64 {
    cosine_sim(ArrayView1::from(a), ArrayView1::from(b))
}

/// All column pairs of `a` × `b` scoring at least `cutoff`, best first.
///
/// Ties keep the order in which they were found (row-major over `i`, `j`).
/// `skip_self` drops `i == j`, for comparing a set against itself.
pub fn top_pairs(
    a: &Array2<f64>,
    b: &Array2<f64>,
    cutoff: f64,
    exclusive: bool,
    skip_self: bool,
) -> Vec<SimPair> {
    let mut pairs: Vec<SimPair> = Vec::new();

    for (i, col_a) in a.columns().into_iter().enumerate() {
        for (j, col_b) in b.columns().into_iter().enumerate() {
            if skip_self && i == j {
                continue;
            }

            let sim = cosine_sim(col_a, col_b);
            if sim < cutoff {
                continue;
            }

            // insert before the first strictly lower score
            let pos = pairs
                .iter()
                .position(|p| p.sim < sim)
                .unwrap_or(pairs.len());
            pairs.insert(pos, SimPair { i, j, sim });
        }
    }

    if exclusive {
        let mut cursor = 0;
        while cursor < pairs.len() {
            let kept = pairs[cursor];
            let mut k = cursor + 1;
            while k < pairs.len() {
                if pairs[k].i == kept.i || pairs[k].j == kept.j {
                    pairs.remove(k);
                } else {
                    k += 1;
                }
            }
            cursor += 1;
        }
    }

    pairs
}

/// Indices of the columns to keep after dropping later near-duplicates.
///
/// Column `j` is dropped when some earlier kept column scores ≥ `cutoff`
/// against it.
pub fn dedup_indices(sigs: &Array2<f64>, cutoff: f64) -> Vec<usize> {
    let mut keep: Vec<usize> = Vec::with_capacity(sigs.ncols());
    for j in 0..sigs.ncols() {
        let dup = keep
            .iter()
            .any(|&i| cosine_sim(sigs.column(i), sigs.column(j)) >= cutoff);
        if !dup {
            keep.push(j);
        }
    }
    keep
}

/// One-to-one alignment of discovered signatures to reference signatures.
///
/// `i` indexes `found`, `j` indexes `reference`.
pub fn match_references(found: &Array2<f64>, reference: &Array2<f64>, cutoff: f64) -> Vec<SimPair> {
    if found.nrows() != reference.nrows() {
        log::warn!(
            "reference signatures have {} buckets, expected {}",
            reference.nrows(),
            found.nrows()
        );
        return Vec::new();
    }
    top_pairs(found, reference, cutoff, true, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        assert!((cosine_sim_slices(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-12);
        assert_eq!(cosine_sim_slices(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_zero_vector_is_zero() {
        assert_eq!(cosine_sim_slices(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_sim_slices(&[1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_top_pairs_sorted_desc() {
        let a = array![[1.0, 0.0], [0.0, 1.0], [0.0, 0.0]];
        let b = array![[1.0, 0.9, 0.0], [0.1, 0.1, 1.0], [0.0, 0.0, 0.0]];
        let pairs = top_pairs(&a, &b, 0.5, false, false);

        assert!(!pairs.is_empty());
        for w in pairs.windows(2) {
            assert!(w[0].sim >= w[1].sim);
        }
        assert!(pairs.iter().all(|p| p.sim >= 0.5));
    }

    #[test]
    fn test_top_pairs_ties_keep_first_seen() {
        let a = array![[1.0, 1.0], [0.0, 0.0]];
        let pairs = top_pairs(&a, &a, 0.9, false, false);
        let order: Vec<(usize, usize)> = pairs.iter().map(|p| (p.i, p.j)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn test_top_pairs_exclusive() {
        let a = array![[1.0, 0.9, 0.0], [0.0, 0.1, 1.0]];
        let b = array![[0.95, 0.0], [0.05, 1.0]];
        let pairs = top_pairs(&a, &b, 0.0, true, false);

        let is: HashSet<usize> = pairs.iter().map(|p| p.i).collect();
        let js: HashSet<usize> = pairs.iter().map(|p| p.j).collect();
        assert_eq!(is.len(), pairs.len());
        assert_eq!(js.len(), pairs.len());
        assert_eq!(pairs.len(), 2);
        assert_eq!((pairs[0].i, pairs[0].j), (2, 1));
    }

    #[test]
    fn test_dedup_keeps_first_of_near_duplicates() {
        let sigs = array![[0.5, 0.0, 0.51], [0.5, 1.0, 0.49]];
        assert_eq!(dedup_indices(&sigs, 0.99), vec![0, 1]);
        assert_eq!(dedup_indices(&sigs, 1.0), vec![0, 1, 2]);
    }

    #[test]
    fn test_match_references_bucket_mismatch() {
        let found = array![[1.0], [0.0]];
        let reference = array![[1.0], [0.0], [0.0]];
        assert!(match_references(&found, &reference, 0.5).is_empty());
    }

    fn non_negative_vec(len: usize) -> impl Strategy<Value = Vec<f64>> {
        proptest::collection::vec(0.0f64..1000.0, len)
    }

    proptest! {
        #[test]
        fn cosine_is_symmetric_and_bounded(
            (a, b) in (1usize..32).prop_flat_map(|n| (non_negative_vec(n), non_negative_vec(n)))
        ) {
            let ab = cosine_sim_slices(&a, &b);
            let ba = cosine_sim_slices(&b, &a);
            prop_assert_eq!(ab, ba);
            prop_assert!((0.0..=1.0).contains(&ab));
        }

        #[test]
        fn exclusive_pairs_never_share_an_index(
            data in proptest::collection::vec(0.0f64..10.0, 4 * 5 + 4 * 3)
        ) {
            let a = Array1::from(data[..20].to_vec()).into_shape_with_order((4, 5)).unwrap();
            let b = Array1::from(data[20..].to_vec()).into_shape_with_order((4, 3)).unwrap();
            let pairs = top_pairs(&a, &b, 0.0, true, false);

            let is: HashSet<usize> = pairs.iter().map(|p| p.i).collect();
            let js: HashSet<usize> = pairs.iter().map(|p| p.j).collect();
            prop_assert_eq!(is.len(), pairs.len());
            prop_assert_eq!(js.len(), pairs.len());
        }
    }
}
