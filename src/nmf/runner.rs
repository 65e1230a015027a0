//! Repeated trials across seeds and signature counts.

use rand::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{find_outliers, NmfCalculator, NmfConfig, NmfResult, References, ResidualOutliers};
use crate::error::{Error, Result};
use crate::matrix::CountMatrix;

/// Best trial for one signature count.
#[derive(Debug, Clone)]
pub struct SigCountRun {
    /// Signature count factorized.
    pub sig_count: usize,
    /// Lowest-residual trial.
    pub best: NmfResult,
    /// Index of that trial.
    pub best_trial: usize,
    /// Residual of every trial, in trial order.
    pub trial_residuals: Vec<f64>,
    /// Samples and buckets the best trial fits badly.
    pub outliers: ResidualOutliers,
}

/// All signature counts tried by one [`NmfRunner::run`].
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// One entry per signature count, ascending.
    pub runs: Vec<SigCountRun>,
}

impl RunSummary {
    /// The lowest-residual run across signature counts.
    pub fn best(&self) -> Option<&SigCountRun> {
        self.runs.iter().min_by(|a, b| {
            a.best
                .residual
                .partial_cmp(&b.best.residual)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    /// Run for a given signature count.
    pub fn for_sig_count(&self, sig_count: usize) -> Option<&SigCountRun> {
        self.runs.iter().find(|r| r.sig_count == sig_count)
    }
}

/// Drives [`NmfCalculator`] over seeds and signature counts.
#[derive(Debug, Clone, Default)]
pub struct NmfRunner {
    calculator: NmfCalculator,
}

impl NmfRunner {
    /// Create a runner.
    pub fn new(config: NmfConfig) -> Self {
        Self {
            calculator: NmfCalculator::new(config),
        }
    }

    /// Settings in use.
    pub fn config(&self) -> &NmfConfig {
        self.calculator.config()
    }

    /// Factorize at every configured signature count and keep the best trial
    /// of each. Any numerically invalid trial aborts the whole run.
    pub fn run(&self, counts: &CountMatrix, references: Option<&References>) -> Result<RunSummary> {
        let config = self.config();
        config.validate()?;

        let base_seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let mut summary = RunSummary::default();

        for sig_count in config.sig_counts() {
            if sig_count < references.map_or(0, References::signature_count) {
                log::debug!("skipping sig count {sig_count}: fewer than the reference signatures");
                continue;
            }

            let trials = self.run_trials(counts, sig_count, references, base_seed)?;

            let mut best: Option<(usize, NmfResult)> = None;
            let mut trial_residuals = Vec::with_capacity(trials.len());
            for (trial, result) in trials.into_iter().enumerate() {
                trial_residuals.push(result.residual);
                let better = best
                    .as_ref()
                    .map_or(true, |(_, b)| result.residual < b.residual);
                if better {
                    best = Some((trial, result));
                }
            }

            let Some((best_trial, best)) = best else {
                continue;
            };

            log::info!(
                "sig count {sig_count}: best trial {best_trial} of {} with residual {:.2} ({:.2}%)",
                trial_residuals.len(),
                best.residual,
                100.0 * best.residual / counts.total().max(f64::MIN_POSITIVE)
            );

            let outliers = find_outliers(
                counts,
                &best.fitted(),
                config.outlier_residual_factor,
                config.outlier_min_count_factor,
            );

            summary.runs.push(SigCountRun {
                sig_count,
                best,
                best_trial,
                trial_residuals,
                outliers,
            });
        }

        Ok(summary)
    }

    /// All trials for one signature count, in trial order. Stops at the
    /// first invalid trial.
    #[cfg(not(feature = "parallel"))]
    fn run_trials(
        &self,
        counts: &CountMatrix,
        sig_count: usize,
        references: Option<&References>,
        base_seed: u64,
    ) -> Result<Vec<NmfResult>> {
        let mut out = Vec::with_capacity(self.config().run_count);
        for trial in 0..self.config().run_count {
            let seed = base_seed.wrapping_add(trial as u64);
            let result = self.calculator.factorize(counts, sig_count, references, seed)?;
            check_trial(&result, sig_count, trial)?;
            out.push(result);
        }
        Ok(out)
    }

    /// All trials for one signature count on the rayon pool, checked in
    /// trial order.
    #[cfg(feature = "parallel")]
    fn run_trials(
        &self,
        counts: &CountMatrix,
        sig_count: usize,
        references: Option<&References>,
        base_seed: u64,
    ) -> Result<Vec<NmfResult>> {
        let results: Vec<Result<NmfResult>> = (0..self.config().run_count)
            .into_par_iter()
            .map(|trial| {
                let seed = base_seed.wrapping_add(trial as u64);
                self.calculator.factorize(counts, sig_count, references, seed)
            })
            .collect();

        let mut out = Vec::with_capacity(results.len());
        for (trial, result) in results.into_iter().enumerate() {
            let result = result?;
            check_trial(&result, sig_count, trial)?;
            out.push(result);
        }
        Ok(out)
    }
}

fn check_trial(result: &NmfResult, sig_count: usize, trial: usize) -> Result<()> {
    if result.valid {
        return Ok(());
    }
    log::error!(
        "trial {trial} (sig count {sig_count}) invalid: {}",
        result.report
    );
    Err(Error::NumericInstability {
        sig_count,
        trial,
        iteration: result.iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Report;
    use crate::similarity::{match_references, top_pairs};
    use ndarray::{array, Array2};

    fn block_counts() -> (Array2<f64>, CountMatrix) {
        let w = array![
            [0.5, 0.0],
            [0.5, 0.0],
            [0.0, 0.2],
            [0.0, 0.8],
        ];
        let h = array![
            [400.0, 100.0, 0.0, 250.0, 320.0, 60.0],
            [50.0, 300.0, 500.0, 250.0, 80.0, 600.0],
        ];
        let v = w.dot(&h);
        (w, CountMatrix::new(v).unwrap())
    }

    #[test]
    fn test_best_trial_has_lowest_residual() {
        let (_, counts) = block_counts();
        let runner = NmfRunner::new(
            NmfConfig::new(2)
                .with_run_count(4)
                .with_max_iterations(2000)
                .with_min_cost_change(1e-10)
                .with_seed(100),
        );
        let summary = runner.run(&counts, None).unwrap();

        assert_eq!(summary.runs.len(), 1);
        let run = &summary.runs[0];
        assert_eq!(run.trial_residuals.len(), 4);
        let min = run
            .trial_residuals
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);
        assert_eq!(run.best.residual, min);
        assert_eq!(run.trial_residuals[run.best_trial], min);
        assert_eq!(run.best.seed, 100 + run.best_trial as u64);
    }

    #[test]
    fn test_recovered_signatures_match_truth() {
        let (w, counts) = block_counts();
        let runner = NmfRunner::new(
            NmfConfig::new(2)
                .with_run_count(3)
                .with_max_iterations(3000)
                .with_min_cost_change(1e-12)
                .with_seed(1),
        );
        let summary = runner.run(&counts, None).unwrap();
        let best = summary.best().unwrap();

        assert!(best.best.residual / counts.total() < 0.01);
        let matched = match_references(&best.best.signatures, &w, 0.99);
        assert_eq!(matched.len(), 2);
        assert!(best.outliers.samples.is_empty());
    }

    #[test]
    fn test_sig_count_expansion() {
        let (_, counts) = block_counts();
        let runner = NmfRunner::new(
            NmfConfig::new(1)
                .with_sig_expansion(2)
                .with_run_count(2)
                .with_max_iterations(500)
                .with_seed(5),
        );
        let summary = runner.run(&counts, None).unwrap();

        let counts_tried: Vec<usize> = summary.runs.iter().map(|r| r.sig_count).collect();
        assert_eq!(counts_tried, vec![1, 2, 3]);
        assert!(summary.for_sig_count(2).is_some());
        // one signature cannot fit two disjoint processes
        let one = summary.for_sig_count(1).unwrap().best.residual;
        let two = summary.for_sig_count(2).unwrap().best.residual;
        assert!(two < one);
    }

    #[test]
    fn test_reference_signatures_kept_in_first_columns() {
        let (w, counts) = block_counts();
        let refs = References::with_signatures(w.clone());
        let runner = NmfRunner::new(
            NmfConfig::new(2)
                .with_run_count(2)
                .with_sig_float_rate(0.0)
                .with_seed(3),
        );
        let summary = runner.run(&counts, Some(&refs)).unwrap();
        let sigs = &summary.runs[0].best.signatures;

        let pairs = top_pairs(sigs, &w, 0.999, true, false);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|p| p.i == p.j));
    }

    #[test]
    fn test_invalid_trial_is_an_error() {
        let mut report = Report::new();
        report.critical_at(3, "cost is NaN");
        let (_, counts) = block_counts();
        let result = NmfCalculator::new(NmfConfig::new(2).with_max_iterations(1))
            .factorize(&counts, 2, None, 0)
            .unwrap();
        let broken = NmfResult {
            valid: false,
            report,
            iterations: 3,
            ..result
        };

        assert_eq!(
            check_trial(&broken, 2, 1),
            Err(Error::NumericInstability {
                sig_count: 2,
                trial: 1,
                iteration: 3
            })
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (_, counts) = block_counts();
        let runner = NmfRunner::new(NmfConfig::new(2).with_run_count(0));
        assert!(runner.run(&counts, None).is_err());
    }
}
