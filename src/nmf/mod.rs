//! Non-negative matrix factorization of count matrices.
//!
//! Decomposes the buckets × samples count matrix `V` into signatures `W`
//! (buckets × k, columns summing to 1) and contributions `H` (k × samples):
//!
//! ```text
//! V ≈ W · H
//! ```
//!
//! # Update rules
//!
//! **Standard** (Lee & Seung, squared error):
//!
//! ```text
//! H ← H ⊙ (WᵗV) ⊘ (WᵗWH)
//! W ← W ⊙ (VHᵗ) ⊘ (WHHᵗ)
//! ```
//!
//! **Brunet** (KL divergence):
//!
//! ```text
//! H ← H ⊙ Wᵗ(V ⊘ WH) ⊘ colsum(W)
//! W ← W ⊙ (V ⊘ WH)Hᵗ ⊘ rowsum(H)
//! ```
//!
//! # Reference signatures
//!
//! Known signatures can seed the first columns of `W`. The signature float
//! rate `r` controls how far those columns may drift: each W update becomes
//! `r · W_new + (1 − r) · W_ref` for them, so `r = 0` pins them and `r = 1`
//! lets them move freely. Columns not seeded from references always float.
//!
//! # Trials
//!
//! Multiplicative updates find a local optimum that depends on the random
//! start. [`NmfRunner`] repeats the factorization from different seeds (and
//! optionally different signature counts) and keeps the lowest-residual run.

mod calculator;
mod residuals;
mod runner;

pub use calculator::{NmfCalculator, NmfResult};
pub use residuals::{find_outliers, Outlier, ResidualOutliers};
pub use runner::{NmfRunner, RunSummary, SigCountRun};

use ndarray::Array2;

use crate::error::{Error, Result};

/// Update rule family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum NmfModel {
    /// Squared-error multiplicative updates.
    #[default]
    Standard,
    /// KL-divergence multiplicative updates.
    Brunet,
}

/// Externally supplied starting points.
#[derive(Debug, Clone, Default)]
pub struct References {
    /// Buckets × r signatures (r ≤ signature count), each column summing to 1.
    pub signatures: Option<Array2<f64>>,
    /// Signatures × samples contributions.
    pub contributions: Option<Array2<f64>>,
}

impl References {
    /// Reference signatures only.
    pub fn with_signatures(signatures: Array2<f64>) -> Self {
        Self {
            signatures: Some(signatures),
            contributions: None,
        }
    }

    /// Number of reference signatures.
    pub fn signature_count(&self) -> usize {
        self.signatures.as_ref().map_or(0, |s| s.ncols())
    }
}

/// Factorization and trial settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NmfConfig {
    /// Signatures to discover.
    pub sig_count: usize,
    /// Additional signature counts to try above `sig_count`.
    pub sig_expansion: usize,
    /// Random trials per signature count.
    pub run_count: usize,
    /// Iteration cap per trial.
    pub max_iterations: usize,
    /// Stop once the squared-error cost falls below this.
    pub exit_level: f64,
    /// Stop once the relative cost change falls below this.
    pub min_cost_change: f64,
    /// A cost above this multiple of the starting cost is treated as divergence.
    pub cost_ceiling_factor: f64,
    /// Update rule family.
    pub model: NmfModel,
    /// How freely reference-seeded signatures may move, in [0, 1].
    pub sig_float_rate: f64,
    /// Base random seed; trial `t` uses `seed + t`.
    pub seed: Option<u64>,
    /// Residual fraction multiple flagging an outlier sample or bucket.
    pub outlier_residual_factor: f64,
    /// Minimum share of the average total for an entity to be flagged.
    pub outlier_min_count_factor: f64,
}

impl Default for NmfConfig {
    fn default() -> Self {
        Self {
            sig_count: 5,
            sig_expansion: 0,
            run_count: 10,
            max_iterations: 1000,
            exit_level: 0.0,
            min_cost_change: 1e-4,
            cost_ceiling_factor: 1e6,
            model: NmfModel::Standard,
            sig_float_rate: 1.0,
            seed: None,
            outlier_residual_factor: 5.0,
            outlier_min_count_factor: 0.25,
        }
    }
}

impl NmfConfig {
    /// Default settings for `sig_count` signatures.
    pub fn new(sig_count: usize) -> Self {
        Self {
            sig_count,
            ..Self::default()
        }
    }

    /// Also try up to `expansion` more signatures.
    pub fn with_sig_expansion(mut self, expansion: usize) -> Self {
        self.sig_expansion = expansion;
        self
    }

    /// Set the number of random trials.
    pub fn with_run_count(mut self, runs: usize) -> Self {
        self.run_count = runs;
        self
    }

    /// Set the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the absolute cost exit level.
    pub fn with_exit_level(mut self, level: f64) -> Self {
        self.exit_level = level;
        self
    }

    /// Set the relative cost-change threshold.
    pub fn with_min_cost_change(mut self, change: f64) -> Self {
        self.min_cost_change = change;
        self
    }

    /// Select the update rules.
    pub fn with_model(mut self, model: NmfModel) -> Self {
        self.model = model;
        self
    }

    /// Set the reference signature float rate.
    pub fn with_sig_float_rate(mut self, rate: f64) -> Self {
        self.sig_float_rate = rate;
        self
    }

    /// Set the base random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Signature counts the runner will try, ascending.
    pub fn sig_counts(&self) -> std::ops::RangeInclusive<usize> {
        self.sig_count..=self.sig_count + self.sig_expansion
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.sig_count == 0 {
            return Err(Error::InvalidParameter {
                name: "sig_count",
                message: "must be > 0",
            });
        }
        if self.run_count == 0 {
            return Err(Error::InvalidParameter {
                name: "run_count",
                message: "must be > 0",
            });
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidParameter {
                name: "max_iterations",
                message: "must be > 0",
            });
        }
        if !(0.0..=1.0).contains(&self.sig_float_rate) {
            return Err(Error::InvalidParameter {
                name: "sig_float_rate",
                message: "must be in [0, 1]",
            });
        }
        if self.min_cost_change < 0.0 || self.exit_level < 0.0 {
            return Err(Error::InvalidParameter {
                name: "min_cost_change",
                message: "thresholds must be non-negative",
            });
        }
        if self.cost_ceiling_factor <= 1.0 {
            return Err(Error::InvalidParameter {
                name: "cost_ceiling_factor",
                message: "must be > 1",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sig_count_range() {
        let cfg = NmfConfig::new(3).with_sig_expansion(2);
        assert_eq!(cfg.sig_counts().collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[test]
    fn test_validate_rejects_bad_float_rate() {
        assert!(NmfConfig::new(2).validate().is_ok());
        assert!(NmfConfig::new(2).with_sig_float_rate(1.5).validate().is_err());
        assert!(NmfConfig::new(0).validate().is_err());
        assert!(NmfConfig::new(2).with_run_count(0).validate().is_err());
    }
}
