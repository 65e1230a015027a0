//! Per-sample constrained fitting against a fixed signature set.
//!
//! Given one sample's bucket counts `c`, noise margins `m` and candidate
//! signatures `S` (buckets × k), find contributions `x ≥ 0` maximising
//! `Σ x` subject to
//!
//! ```text
//! S · x ≤ c + m      (per bucket)
//! Σ x   ≤ Σ c
//! ```
//!
//! [`SigContribOptimiser`] does this greedily:
//!
//! 1. **Initial allocation**: give each signature the most it can take
//!    without overflowing any bucket ceiling, trying six allocation orders
//!    (see the ordering table below) and keeping the best.
//! 2. **Improvement**: while some buckets are nearly full, find the signature
//!    whose small reduction frees the most room for the others, and apply
//!    the largest multiple of that move that still pays off.
//! 3. **Pruning**: signatures left with a negligible share are zeroed for the
//!    sample and their room handed back to the rest.
//!
//! The allocation orders and the net-gain search are heuristics; results
//! depend on them and they are kept stable.
//!
//! | # | Allocation order |
//! |---|------------------|
//! | 0 | index |
//! | 1 | reverse index |
//! | 2 | descending gain |
//! | 3 | ascending gain |
//! | 4 | required first, then descending |
//! | 5 | required first, then ascending |

mod optimiser;
mod ordering;

pub use optimiser::{FitResult, SigContribOptimiser, Termination};

use ndarray::{Array1, Array2, ArrayView1};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::matrix::{validate_signatures, CountMatrix};

/// Optimiser thresholds. Percentages are fractions of the sample total.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OptimiserConfig {
    /// Contributions below this share (and below `min_contrib_count`) are pruned.
    pub min_contrib_percent: f64,
    /// Contributions below this count (and below `min_contrib_percent`) are pruned.
    pub min_contrib_count: f64,
    /// Stop once this share of the sample is allocated.
    pub target_alloc_percent: f64,
    /// A bucket is exhausted once allocated to this share of its ceiling.
    pub exhausted_percent: f64,
    /// Number of recent allocation percentages checked for stagnation.
    pub stagnation_window: usize,
    /// Stagnant when the recent percentages span less than this.
    pub stagnation_range: f64,
    /// Improvement iteration cap.
    pub max_iterations: usize,
    /// Reduction unit as a share of the sample total (at least one count).
    pub min_change_fraction: f64,
}

impl Default for OptimiserConfig {
    fn default() -> Self {
        Self {
            min_contrib_percent: 0.01,
            min_contrib_count: 10.0,
            target_alloc_percent: 1.0,
            exhausted_percent: 0.9,
            stagnation_window: 10,
            stagnation_range: 0.01,
            max_iterations: 100,
            min_change_fraction: 0.001,
        }
    }
}

impl OptimiserConfig {
    /// Default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set both pruning thresholds.
    pub fn with_min_contrib(mut self, percent: f64, count: f64) -> Self {
        self.min_contrib_percent = percent;
        self.min_contrib_count = count;
        self
    }

    /// Set the target allocation share.
    pub fn with_target_alloc_percent(mut self, percent: f64) -> Self {
        self.target_alloc_percent = percent;
        self
    }

    /// Set the improvement iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        let fraction = |v: f64| (0.0..=1.0).contains(&v);
        if !fraction(self.min_contrib_percent) {
            return Err(Error::InvalidParameter {
                name: "min_contrib_percent",
                message: "must be in [0, 1]",
            });
        }
        if !(self.min_contrib_count >= 0.0) {
            return Err(Error::InvalidParameter {
                name: "min_contrib_count",
                message: "must be non-negative",
            });
        }
        if !fraction(self.target_alloc_percent) || self.target_alloc_percent == 0.0 {
            return Err(Error::InvalidParameter {
                name: "target_alloc_percent",
                message: "must be in (0, 1]",
            });
        }
        if !fraction(self.exhausted_percent) || self.exhausted_percent == 0.0 {
            return Err(Error::InvalidParameter {
                name: "exhausted_percent",
                message: "must be in (0, 1]",
            });
        }
        if self.stagnation_window < 2 {
            return Err(Error::InvalidParameter {
                name: "stagnation_window",
                message: "must be >= 2",
            });
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidParameter {
                name: "max_iterations",
                message: "must be > 0",
            });
        }
        if !(self.min_change_fraction > 0.0) {
            return Err(Error::InvalidParameter {
                name: "min_change_fraction",
                message: "must be > 0",
            });
        }
        Ok(())
    }
}

/// One sample to fit.
#[derive(Debug, Clone)]
pub struct SampleFit<'a> {
    /// Observed bucket counts.
    pub counts: ArrayView1<'a, f64>,
    /// Allowed slack above each bucket count.
    pub noise: ArrayView1<'a, f64>,
    /// Buckets × signatures candidate set.
    pub signatures: &'a Array2<f64>,
    /// Signature never pruned and allocated first in the required orders.
    pub required: Option<usize>,
    /// Warm-start contributions, one per signature.
    pub initial: Option<&'a [f64]>,
}

impl<'a> SampleFit<'a> {
    /// Fit `counts` (with `noise` slack) against `signatures`.
    pub fn new(
        counts: ArrayView1<'a, f64>,
        noise: ArrayView1<'a, f64>,
        signatures: &'a Array2<f64>,
    ) -> Self {
        Self {
            counts,
            noise,
            signatures,
            required: None,
            initial: None,
        }
    }

    /// Mark one signature as required.
    pub fn with_required(mut self, sig: usize) -> Self {
        self.required = Some(sig);
        self
    }

    /// Start from existing contributions.
    pub fn with_initial(mut self, contributions: &'a [f64]) -> Self {
        self.initial = Some(contributions);
        self
    }

    fn validate(&self) -> Result<()> {
        let buckets = self.counts.len();
        if self.noise.len() != buckets {
            return Err(Error::DimensionMismatch {
                expected: buckets,
                found: self.noise.len(),
            });
        }
        validate_signatures(self.signatures, buckets)?;

        // row 0 is the counts, row 1 the noise margins
        for (i, &value) in self.counts.iter().chain(self.noise.iter()).enumerate() {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidValue {
                    row: i / buckets,
                    col: i % buckets,
                    value,
                });
            }
        }

        let sig_count = self.signatures.ncols();
        if self.required.is_some_and(|r| r >= sig_count) {
            return Err(Error::InvalidParameter {
                name: "required",
                message: "signature index out of range",
            });
        }
        if let Some(initial) = self.initial {
            if initial.len() != sig_count {
                return Err(Error::DimensionMismatch {
                    expected: sig_count,
                    found: initial.len(),
                });
            }
            if let Some((col, &value)) = initial.iter().enumerate().find(|(_, v)| !v.is_finite()) {
                return Err(Error::InvalidValue { row: 0, col, value });
            }
        }
        Ok(())
    }
}

/// Every sample fitted against one signature set.
#[derive(Debug, Clone)]
pub struct BatchFit {
    /// Signatures × samples contributions. Invalid samples are all zero.
    pub contributions: Array2<f64>,
    /// Allocated share per sample.
    pub alloc_percents: Array1<f64>,
    /// Samples whose fit broke a contract.
    pub invalid_samples: Vec<usize>,
    /// Samples that stopped at the iteration cap.
    pub capped_samples: Vec<usize>,
}

/// Fit every sample of `counts` against `signatures` (buckets × k), with
/// `noise` margins shaped like the counts.
pub fn fit_samples(
    counts: &CountMatrix,
    noise: &Array2<f64>,
    signatures: &Array2<f64>,
    config: &OptimiserConfig,
) -> Result<BatchFit> {
    if noise.dim() != counts.data().dim() {
        return Err(Error::ShapeMismatch {
            expected: format!("{:?}", counts.data().dim()),
            actual: format!("{:?}", noise.dim()),
        });
    }
    validate_signatures(signatures, counts.bucket_count())?;
    config.validate()?;

    let optimiser = SigContribOptimiser::new(config.clone());
    let fit_one = |n: usize| -> Result<FitResult> {
        optimiser.fit(&SampleFit::new(counts.sample(n), noise.column(n), signatures))
    };

    #[cfg(feature = "parallel")]
    let fits: Vec<FitResult> = (0..counts.sample_count())
        .into_par_iter()
        .map(fit_one)
        .collect::<Result<_>>()?;
    #[cfg(not(feature = "parallel"))]
    let fits: Vec<FitResult> = (0..counts.sample_count())
        .map(fit_one)
        .collect::<Result<_>>()?;

    let mut contributions = Array2::zeros((signatures.ncols(), counts.sample_count()));
    let mut alloc_percents = Array1::zeros(counts.sample_count());
    let mut invalid_samples = Vec::new();
    let mut capped_samples = Vec::new();

    for (n, fit) in fits.into_iter().enumerate() {
        if !fit.valid {
            if let Some(issue) = fit.report.first_critical() {
                log::debug!("sample {n}: {issue}");
            }
            invalid_samples.push(n);
            continue;
        }
        if fit.termination == Termination::IterationCap {
            capped_samples.push(n);
        }
        contributions.column_mut(n).assign(&fit.contributions);
        alloc_percents[n] = fit.alloc_percent;
    }

    log::info!(
        "fitted {} samples against {} signatures: mean allocation {:.1}%, {} invalid",
        counts.sample_count(),
        signatures.ncols(),
        100.0 * alloc_percents.mean().unwrap_or(0.0),
        invalid_samples.len()
    );
    if !invalid_samples.is_empty() {
        log::warn!("samples with invalid fits: {invalid_samples:?}");
    }

    Ok(BatchFit {
        contributions,
        alloc_percents,
        invalid_samples,
        capped_samples,
    })
}
