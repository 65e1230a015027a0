use ndarray::Array2;

use super::{intersect_sorted, BucketConfig, BucketGroup, BucketPair};
use crate::error::Result;
use crate::matrix::CountMatrix;
use crate::similarity::dedup_indices;

/// Output of [`BucketAnalyser::discover_groups`].
#[derive(Debug, Clone, Default)]
pub struct BucketDiscovery {
    /// Surviving bucket pairs in discovery order.
    pub pairs: Vec<BucketPair>,
    /// Groups in formation order.
    pub groups: Vec<BucketGroup>,
}

/// Finds correlated bucket pairs and agglomerates them into groups.
#[derive(Debug, Clone, Default)]
pub struct BucketAnalyser {
    config: BucketConfig,
}

impl BucketAnalyser {
    /// Create an analyser with the given thresholds.
    pub fn new(config: BucketConfig) -> Self {
        Self { config }
    }

    /// Thresholds in use.
    pub fn config(&self) -> &BucketConfig {
        &self.config
    }

    /// Bucket pairs `(a, b)`, `a < b`, in row order of the ratio matrix.
    pub fn pair_index(bucket_count: usize) -> Vec<(usize, usize)> {
        let mut index = Vec::with_capacity(bucket_count * bucket_count.saturating_sub(1) / 2);
        for a in 0..bucket_count {
            for b in (a + 1)..bucket_count {
                index.push((a, b));
            }
        }
        index
    }

    /// Ratio of every bucket pair in every sample, 0 where unreliable.
    ///
    /// Rows follow [`Self::pair_index`], columns are samples.
    pub fn ratio_matrix(&self, counts: &CountMatrix) -> Array2<f64> {
        let index = Self::pair_index(counts.bucket_count());
        let data = counts.data();
        let min_count = self.config.min_bucket_count;
        let mut ratios = Array2::zeros((index.len(), counts.sample_count()));

        for (row, &(a, b)) in index.iter().enumerate() {
            for n in 0..counts.sample_count() {
                let ca = data[[a, n]];
                let cb = data[[b, n]];
                if ca <= min_count || cb <= min_count {
                    continue;
                }
                ratios[[row, n]] = (ca / cb).clamp(self.config.ratio_min, self.config.ratio_max);
            }
        }

        ratios
    }

    /// Steps 1–3: collect, merge and filter bucket pairs.
    pub fn find_pairs(&self, counts: &CountMatrix) -> Vec<BucketPair> {
        let index = Self::pair_index(counts.bucket_count());
        let ratios = self.ratio_matrix(counts);
        let tolerance = self.config.ratio_tolerance;

        let mut pairs: Vec<BucketPair> = Vec::new();

        for (row, &(a, b)) in index.iter().enumerate() {
            let mut row_pairs: Vec<BucketPair> = Vec::new();

            for (n, &ratio) in ratios.row(row).iter().enumerate() {
                if ratio == 0.0 {
                    continue;
                }
                match row_pairs.iter_mut().find(|p| p.accepts(ratio, tolerance)) {
                    Some(p) => p.add(n, ratio),
                    None => row_pairs.push(BucketPair::new(row, a, b, n, ratio)),
                }
            }

            merge_overlapping(&mut row_pairs);

            pairs.extend(
                row_pairs
                    .into_iter()
                    .filter(|p| p.sample_count() >= self.config.min_sample_count),
            );
        }

        for (id, p) in pairs.iter_mut().enumerate() {
            p.id = id;
        }

        log::debug!("found {} bucket pairs", pairs.len());
        pairs
    }

    /// Step 4: greedy agglomeration of bucket pairs into groups.
    ///
    /// Pairs are visited in slice order; see the module docs on order dependence.
    pub fn form_groups(&self, pairs: &[BucketPair]) -> Vec<BucketGroup> {
        let min_samples = self.config.min_sample_count;
        let mut groups: Vec<BucketGroup> = Vec::new();
        let mut grouped = vec![false; pairs.len()];

        for idx in 0..pairs.len() {
            if grouped[idx] {
                continue;
            }
            let pair = &pairs[idx];
            let samples = pair.samples();

            let fold_target = groups.iter().enumerate().find_map(|(gi, g)| {
                let shared = g.shared_samples(&samples);
                (shared.len() >= min_samples).then_some((gi, shared))
            });
            if let Some((gi, shared)) = fold_target {
                groups[gi].fold(pair, shared);
                grouped[idx] = true;
                continue;
            }

            for other in 0..pairs.len() {
                if other == idx || grouped[other] || !pair.shares_one_bucket(&pairs[other]) {
                    continue;
                }
                let shared = intersect_sorted(&samples, &pairs[other].samples());
                if shared.len() >= min_samples {
                    groups.push(BucketGroup::from_pairs(groups.len(), pair, &pairs[other], shared));
                    grouped[idx] = true;
                    grouped[other] = true;
                    break;
                }
            }
        }

        let mut kept: Vec<BucketGroup> = groups
            .into_iter()
            .filter(|g| {
                g.samples().len() >= min_samples
                    && g.buckets().len() >= self.config.min_group_buckets
            })
            .collect();
        for (id, g) in kept.iter_mut().enumerate() {
            g.id = id;
        }
        kept
    }

    /// Run the full procedure.
    pub fn discover_groups(&self, counts: &CountMatrix) -> Result<BucketDiscovery> {
        self.config.validate()?;

        let pairs = self.find_pairs(counts);
        let groups = self.form_groups(&pairs);

        log::info!(
            "bucket analysis: {} pairs, {} groups over {} samples",
            pairs.len(),
            groups.len(),
            counts.sample_count()
        );

        Ok(BucketDiscovery { pairs, groups })
    }

    /// One signature per group, near-duplicates removed; buckets × k.
    pub fn propose_signatures(&self, counts: &CountMatrix, groups: &[BucketGroup]) -> Array2<f64> {
        let mut all = Array2::zeros((counts.bucket_count(), groups.len()));
        for (k, g) in groups.iter().enumerate() {
            all.column_mut(k).assign(&g.signature(counts));
        }

        let keep = dedup_indices(&all, self.config.proposal_dedup_cutoff);
        let mut out = Array2::zeros((counts.bucket_count(), keep.len()));
        for (k, &src) in keep.iter().enumerate() {
            out.column_mut(k).assign(&all.column(src));
        }
        out
    }
}

/// Merge same-row pairs with overlapping ranges until none overlap.
fn merge_overlapping(row_pairs: &mut Vec<BucketPair>) {
    loop {
        let mut found = None;
        'scan: for i in 0..row_pairs.len() {
            for j in (i + 1)..row_pairs.len() {
                if row_pairs[i].overlaps(&row_pairs[j]) {
                    found = Some((i, j));
                    break 'scan;
                }
            }
        }

        match found {
            Some((i, j)) => {
                let other = row_pairs.remove(j);
                row_pairs[i].absorb(other);
            }
            None => break,
        }
    }
}
