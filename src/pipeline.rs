//! End-to-end signature analysis.
//!
//! ```text
//! counts ──► bucket groups (optional) ──► seed signatures
//!    │                                        │
//!    └──────────────► NMF runner ◄────────────┘
//!                         │
//!                 dedupe best signatures
//!                         │
//!      noise margins ──► per-sample fit ──► reference alignment
//! ```

use ndarray::{concatenate, Array2, Axis};

use crate::bucket::{BucketAnalyser, BucketConfig, BucketDiscovery};
use crate::error::{Error, Result};
use crate::fit::{fit_samples, BatchFit, OptimiserConfig};
use crate::matrix::{CountMatrix, MatrixExt};
use crate::nmf::{NmfConfig, NmfRunner, References, RunSummary};
use crate::noise::noise_margins;
use crate::similarity::{dedup_indices, match_references, SimPair};

/// Settings for every stage.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AnalysisConfig {
    /// Factorization and trials.
    pub nmf: NmfConfig,
    /// Bucket-pair clustering.
    pub bucket: BucketConfig,
    /// Per-sample re-fit.
    pub optimiser: OptimiserConfig,
    /// Tail probability for the Poisson noise margins.
    pub noise_probability: f64,
    /// Seed the factorization with bucket-group proposals.
    pub use_bucket_proposals: bool,
    /// Discovered signatures at least this similar are merged.
    pub dedup_cutoff: f64,
    /// Minimum similarity for a discovered signature to match a reference.
    pub reference_match_cutoff: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            nmf: NmfConfig::default(),
            bucket: BucketConfig::default(),
            optimiser: OptimiserConfig::default(),
            noise_probability: 1e-4,
            use_bucket_proposals: false,
            dedup_cutoff: 0.98,
            reference_match_cutoff: 0.9,
        }
    }
}

impl AnalysisConfig {
    /// Defaults around the given factorization settings.
    pub fn new(nmf: NmfConfig) -> Self {
        Self {
            nmf,
            ..Self::default()
        }
    }

    /// Set the bucket clustering settings and enable proposals.
    pub fn with_bucket_proposals(mut self, bucket: BucketConfig) -> Self {
        self.bucket = bucket;
        self.use_bucket_proposals = true;
        self
    }

    /// Set the optimiser thresholds.
    pub fn with_optimiser(mut self, optimiser: OptimiserConfig) -> Self {
        self.optimiser = optimiser;
        self
    }

    /// Set the noise tail probability.
    pub fn with_noise_probability(mut self, probability: f64) -> Self {
        self.noise_probability = probability;
        self
    }

    /// Check every stage.
    pub fn validate(&self) -> Result<()> {
        self.nmf.validate()?;
        self.optimiser.validate()?;
        if self.use_bucket_proposals {
            self.bucket.validate()?;
        }
        if !(self.noise_probability > 0.0 && self.noise_probability < 1.0) {
            return Err(Error::InvalidParameter {
                name: "noise_probability",
                message: "must be in (0, 1)",
            });
        }
        for (name, cutoff) in [
            ("dedup_cutoff", self.dedup_cutoff),
            ("reference_match_cutoff", self.reference_match_cutoff),
        ] {
            if !(0.0..=1.0).contains(&cutoff) {
                return Err(Error::InvalidParameter {
                    name,
                    message: "must be in [0, 1]",
                });
            }
        }
        Ok(())
    }
}

/// Everything one analysis produced.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Final buckets × k signatures, deduplicated.
    pub signatures: Array2<f64>,
    /// Per-sample re-fit against `signatures`.
    pub fit: BatchFit,
    /// Every factorization run.
    pub runs: RunSummary,
    /// Bucket clustering output, when proposals were enabled.
    pub discovery: Option<BucketDiscovery>,
    /// Noise margins used by the re-fit.
    pub noise: Array2<f64>,
    /// Discovered (`i`) to reference (`j`) signature matches.
    pub reference_matches: Vec<SimPair>,
}

impl Analysis {
    /// Signatures × samples contributions from the re-fit.
    pub fn contributions(&self) -> &Array2<f64> {
        &self.fit.contributions
    }

    /// Whether every sample fitted within its contracts.
    pub fn all_samples_valid(&self) -> bool {
        self.fit.invalid_samples.is_empty()
    }
}

/// Discover signatures in `counts` and re-fit every sample against them.
pub fn analyse(
    counts: &CountMatrix,
    config: &AnalysisConfig,
    references: Option<&References>,
) -> Result<Analysis> {
    config.validate()?;

    let discovery = if config.use_bucket_proposals {
        let analyser = BucketAnalyser::new(config.bucket.clone());
        let discovery = analyser.discover_groups(counts)?;
        let proposals = analyser.propose_signatures(counts, &discovery.groups);
        Some((discovery, proposals))
    } else {
        None
    };

    let seeds = seed_references(
        references,
        discovery.as_ref().map(|(_, p)| p),
        config.nmf.sig_count,
    )?;
    let discovery = discovery.map(|(d, _)| d);

    let runs = NmfRunner::new(config.nmf.clone()).run(counts, seeds.as_ref())?;
    let best = runs
        .best()
        .ok_or_else(|| Error::Other("no signature count could be factorized".into()))?;
    log::info!(
        "best factorization: {} signatures, residual {:.2}",
        best.sig_count,
        best.best.residual
    );

    let signatures = distinct_signatures(&best.best.signatures, config.dedup_cutoff);
    if signatures.ncols() < best.sig_count {
        log::info!(
            "kept {} of {} signatures after removing empty and duplicate columns",
            signatures.ncols(),
            best.sig_count
        );
    }

    let noise = noise_margins(counts, config.noise_probability)?;
    let fit = fit_samples(counts, &noise, &signatures, &config.optimiser)?;

    let reference_matches = references
        .and_then(|r| r.signatures.as_ref())
        .map(|r| match_references(&signatures, r, config.reference_match_cutoff))
        .unwrap_or_default();

    Ok(Analysis {
        signatures,
        fit,
        runs,
        discovery,
        noise,
        reference_matches,
    })
}

/// Caller references first, then bucket proposals up to `sig_count` seeds.
fn seed_references(
    references: Option<&References>,
    proposals: Option<&Array2<f64>>,
    sig_count: usize,
) -> Result<Option<References>> {
    let Some(proposals) = proposals.filter(|p| p.ncols() > 0) else {
        return Ok(references.cloned());
    };

    let existing = references.and_then(|r| r.signatures.as_ref());
    let room = sig_count.saturating_sub(existing.map_or(0, |s| s.ncols()));
    if room == 0 {
        log::debug!("no room for bucket proposals beyond the reference signatures");
        return Ok(references.cloned());
    }
    let take = room.min(proposals.ncols());
    let proposals = proposals.slice(ndarray::s![.., ..take]);

    let signatures = match existing {
        Some(existing) => concatenate(Axis(1), &[existing.view(), proposals]).map_err(|_| {
            Error::ShapeMismatch {
                expected: format!("{} buckets", existing.nrows()),
                actual: format!("{} buckets", proposals.nrows()),
            }
        })?,
        None => proposals.to_owned(),
    };
    log::info!("seeding factorization with {take} bucket-group signatures");

    // seeded contributions no longer line up with the widened signature set
    Ok(Some(References::with_signatures(signatures)))
}

/// Non-empty columns with later near-duplicates dropped.
fn distinct_signatures(signatures: &Array2<f64>, cutoff: f64) -> Array2<f64> {
    let sums = signatures.col_sums();
    let non_empty: Vec<usize> = (0..signatures.ncols()).filter(|&k| sums[k] > 0.0).collect();
    let candidates = signatures.select(Axis(1), &non_empty);
    let keep = dedup_indices(&candidates, cutoff);
    candidates.select(Axis(1), &keep)
}
