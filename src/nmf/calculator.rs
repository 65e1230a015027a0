//! A single factorization trial.

use ndarray::linalg::general_mat_mul;
use ndarray::{s, Array1, Array2, Axis};
use rand::prelude::*;

use super::{NmfConfig, NmfModel, References};
use crate::diagnostics::Report;
use crate::error::{Error, Result};
use crate::matrix::{validate_signatures, CountMatrix, MatrixExt, SIG_SUM_TOLERANCE};

/// Lower bound for random initial entries; exact zeros never recover under
/// multiplicative updates.
const INIT_FLOOR: f64 = 1e-3;

/// Output of one factorization trial.
#[derive(Debug, Clone)]
pub struct NmfResult {
    /// Buckets × k signatures, columns summing to 1.
    pub signatures: Array2<f64>,
    /// k × samples contributions.
    pub contributions: Array2<f64>,
    /// Final squared-error cost.
    pub cost: f64,
    /// `Σ |V − WH|`.
    pub residual: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// Stopped on an exit level or cost-change criterion.
    pub converged: bool,
    /// Numeric state was valid throughout and the output passed validation.
    pub valid: bool,
    /// Warnings and failures recorded during the trial.
    pub report: Report,
    /// Seed the trial was started from.
    pub seed: u64,
}

impl NmfResult {
    /// Reconstructed counts `W · H`.
    pub fn fitted(&self) -> Array2<f64> {
        self.signatures.dot(&self.contributions)
    }

    /// Number of signatures.
    pub fn sig_count(&self) -> usize {
        self.signatures.ncols()
    }
}

/// Working buffers for one trial, allocated once and overwritten each
/// iteration. `W` and `H` themselves are owned by the trial loop.
#[derive(Debug)]
struct Workspace {
    /// B × N: `W·H`.
    wh: Array2<f64>,
    /// B × N: `V ⊘ WH` (Brunet only).
    ratio: Array2<f64>,
    /// K × N: H-update numerator.
    h_num: Array2<f64>,
    /// K × N: H-update denominator.
    h_den: Array2<f64>,
    /// K × K: `WᵗW`.
    wtw: Array2<f64>,
    /// B × K: W-update numerator, then the raw updated W.
    w_num: Array2<f64>,
    /// B × K: W-update denominator.
    w_den: Array2<f64>,
    /// K × K: `HHᵗ`.
    hht: Array2<f64>,
}

impl Workspace {
    fn new(buckets: usize, sigs: usize, samples: usize) -> Self {
        Self {
            wh: Array2::zeros((buckets, samples)),
            ratio: Array2::zeros((buckets, samples)),
            h_num: Array2::zeros((sigs, samples)),
            h_den: Array2::zeros((sigs, samples)),
            wtw: Array2::zeros((sigs, sigs)),
            w_num: Array2::zeros((buckets, sigs)),
            w_den: Array2::zeros((buckets, sigs)),
            hht: Array2::zeros((sigs, sigs)),
        }
    }

    fn refresh_wh(&mut self, w: &Array2<f64>, h: &Array2<f64>) {
        general_mat_mul(1.0, w, h, 0.0, &mut self.wh);
    }

    fn refresh_ratio(&mut self, v: &Array2<f64>) {
        self.ratio.assign(v);
        self.ratio.div_assign_elementwise_safe(&self.wh);
    }
}

/// Runs one multiplicative-update factorization.
#[derive(Debug, Clone, Default)]
pub struct NmfCalculator {
    config: NmfConfig,
}

impl NmfCalculator {
    /// Create a calculator.
    pub fn new(config: NmfConfig) -> Self {
        Self { config }
    }

    /// Settings in use.
    pub fn config(&self) -> &NmfConfig {
        &self.config
    }

    /// Factorize `counts` into `sig_count` signatures from the given seed.
    ///
    /// Shape problems with the references are errors. Numeric failure during
    /// the iterations is not: it comes back as `valid == false`.
    pub fn factorize(
        &self,
        counts: &CountMatrix,
        sig_count: usize,
        references: Option<&References>,
        seed: u64,
    ) -> Result<NmfResult> {
        self.config.validate()?;
        if sig_count == 0 {
            return Err(Error::InvalidParameter {
                name: "sig_count",
                message: "must be > 0",
            });
        }

        let v = counts.data();
        let (buckets, samples) = v.dim();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut report = Report::new();

        let (mut w, w_ref) = init_signatures(counts, sig_count, references, &mut rng)?;
        let mut h = init_contributions(counts, sig_count, references, &mut rng)?;
        let ref_cols = w_ref.ncols();
        if ref_cols > 0 {
            report.info(format!("{ref_cols} signatures seeded from references"));
        }

        let rate = self.config.sig_float_rate;
        let w_frozen = ref_cols == sig_count && rate == 0.0;

        let mut ws = Workspace::new(buckets, sig_count, samples);
        ws.refresh_wh(&w, &h);

        let initial_cost = v.sum_sq_diff(&ws.wh);
        let mut prev_cost = initial_cost;
        let mut cost = initial_cost;
        let mut iterations = 0;
        let mut converged = initial_cost < self.config.exit_level;
        let mut valid = true;

        while !converged && iterations < self.config.max_iterations {
            iterations += 1;

            let w_update = (!w_frozen).then_some((&w_ref, rate));
            match self.config.model {
                NmfModel::Standard => standard_step(v, &mut w, &mut h, &mut ws, w_update),
                NmfModel::Brunet => brunet_step(v, &mut w, &mut h, &mut ws, w_update),
            }

            ws.refresh_wh(&w, &h);
            cost = v.sum_sq_diff(&ws.wh);

            if let Some(reason) = check_cost(cost, initial_cost, self.config.cost_ceiling_factor) {
                report.critical_at(iterations, reason);
                valid = false;
                break;
            }

            if cost < self.config.exit_level {
                converged = true;
                break;
            }

            let change = if prev_cost > 0.0 {
                (prev_cost - cost).abs() / prev_cost
            } else {
                0.0
            };
            if change < self.config.min_cost_change {
                converged = true;
                break;
            }
            prev_cost = cost;
        }

        if valid && !converged {
            report.warn_at(
                iterations,
                format!("iteration cap reached with cost {cost:.4}"),
            );
        }

        // unit-sum signatures; WH is unchanged
        let sums = w.normalize_columns();
        for (k, &sum) in sums.iter().enumerate() {
            if sum > 0.0 {
                h.row_mut(k).mapv_inplace(|x| x * sum);
            } else {
                report.warn(format!("signature {k} collapsed to zero"));
            }
        }

        ws.refresh_wh(&w, &h);
        let residual = v.sum_abs_diff(&ws.wh);

        if valid {
            if let Some(reason) = validate_output(&w, &h) {
                report.critical_at(iterations, reason);
                valid = false;
            }
        }

        log::debug!(
            "nmf k={} seed={}: {} iterations, cost {:.4}, residual {:.2}, valid={}",
            sig_count,
            seed,
            iterations,
            cost,
            residual,
            valid
        );

        Ok(NmfResult {
            signatures: w,
            contributions: h,
            cost,
            residual,
            iterations,
            converged,
            valid,
            report,
            seed,
        })
    }
}

/// Reason the cost marks the trial invalid, if any.
fn check_cost(cost: f64, initial_cost: f64, ceiling_factor: f64) -> Option<String> {
    if cost.is_nan() {
        return Some("cost is NaN".to_string());
    }
    if cost.is_infinite() {
        return Some("cost is infinite".to_string());
    }
    let ceiling = ceiling_factor * initial_cost.max(1.0);
    if cost > ceiling {
        return Some(format!("cost {cost:.4e} exceeds ceiling {ceiling:.4e}"));
    }
    None
}

fn validate_output(w: &Array2<f64>, h: &Array2<f64>) -> Option<String> {
    if !w.all_finite_non_negative() {
        return Some("signatures contain negative or non-finite entries".to_string());
    }
    if !h.all_finite_non_negative() {
        return Some("contributions contain negative or non-finite entries".to_string());
    }
    for (k, sum) in w.col_sums().iter().enumerate() {
        if *sum > 0.0 && (sum - 1.0).abs() > SIG_SUM_TOLERANCE {
            return Some(format!("signature {k} sums to {sum}"));
        }
    }
    None
}

/// W from references (first columns) and uniform random values, columns
/// normalised. Also returns the reference block for float-rate blending.
fn init_signatures(
    counts: &CountMatrix,
    sig_count: usize,
    references: Option<&References>,
    rng: &mut StdRng,
) -> Result<(Array2<f64>, Array2<f64>)> {
    let buckets = counts.bucket_count();
    let mut w = Array2::zeros((buckets, sig_count));
    let mut ref_cols = 0;

    if let Some(refs) = references.and_then(|r| r.signatures.as_ref()) {
        validate_signatures(refs, buckets)?;
        if refs.ncols() > sig_count {
            return Err(Error::ShapeMismatch {
                expected: format!("at most {sig_count} reference signatures"),
                actual: format!("{}", refs.ncols()),
            });
        }
        ref_cols = refs.ncols();
        w.slice_mut(s![.., ..ref_cols]).assign(refs);
    }

    for k in ref_cols..sig_count {
        for b in 0..buckets {
            w[[b, k]] = rng.random_range(INIT_FLOOR..1.0);
        }
    }
    w.normalize_columns();

    let w_ref = w.slice(s![.., ..ref_cols]).to_owned();
    Ok((w, w_ref))
}

/// H from reference contributions, or random splits of each sample's total.
fn init_contributions(
    counts: &CountMatrix,
    sig_count: usize,
    references: Option<&References>,
    rng: &mut StdRng,
) -> Result<Array2<f64>> {
    let samples = counts.sample_count();

    if let Some(contribs) = references.and_then(|r| r.contributions.as_ref()) {
        if contribs.dim() != (sig_count, samples) {
            return Err(Error::ShapeMismatch {
                expected: format!("{sig_count} x {samples}"),
                actual: format!("{} x {}", contribs.nrows(), contribs.ncols()),
            });
        }
        if !contribs.all_finite_non_negative() {
            return Err(Error::Other(
                "reference contributions contain negative or non-finite entries".to_string(),
            ));
        }
        return Ok(contribs.clone());
    }

    let mut h = Array2::zeros((sig_count, samples));
    for (n, &total) in counts.sample_totals().iter().enumerate() {
        let weights: Array1<f64> = (0..sig_count)
            .map(|_| rng.random_range(INIT_FLOOR..1.0))
            .collect();
        let wsum = weights.sum();
        h.column_mut(n).assign(&(weights * (total / wsum)));
    }
    Ok(h)
}

fn standard_step(
    v: &Array2<f64>,
    w: &mut Array2<f64>,
    h: &mut Array2<f64>,
    ws: &mut Workspace,
    w_update: Option<(&Array2<f64>, f64)>,
) {
    general_mat_mul(1.0, &w.t(), v, 0.0, &mut ws.h_num);
    general_mat_mul(1.0, &w.t(), &*w, 0.0, &mut ws.wtw);
    general_mat_mul(1.0, &ws.wtw, &*h, 0.0, &mut ws.h_den);
    ws.h_num.div_assign_elementwise_safe(&ws.h_den);
    h.mul_assign_elementwise(&ws.h_num);

    let Some((w_ref, rate)) = w_update else {
        return;
    };

    general_mat_mul(1.0, v, &h.t(), 0.0, &mut ws.w_num);
    general_mat_mul(1.0, &*h, &h.t(), 0.0, &mut ws.hht);
    general_mat_mul(1.0, &*w, &ws.hht, 0.0, &mut ws.w_den);
    ws.w_num.div_assign_elementwise_safe(&ws.w_den);
    ws.w_num.mul_assign_elementwise(w);
    adopt_w_update(w, h, ws, w_ref, rate);
}

/// Expects `ws.wh` to hold the current `W·H`.
fn brunet_step(
    v: &Array2<f64>,
    w: &mut Array2<f64>,
    h: &mut Array2<f64>,
    ws: &mut Workspace,
    w_update: Option<(&Array2<f64>, f64)>,
) {
    ws.refresh_ratio(v);
    general_mat_mul(1.0, &w.t(), &ws.ratio, 0.0, &mut ws.h_num);
    let w_sums = w.col_sums();
    for (k, mut row) in ws.h_num.axis_iter_mut(Axis(0)).enumerate() {
        let denom = w_sums[k];
        row.mapv_inplace(|x| if denom > 0.0 { x / denom } else { 0.0 });
    }
    h.mul_assign_elementwise(&ws.h_num);

    let Some((w_ref, rate)) = w_update else {
        return;
    };

    ws.refresh_wh(w, h);
    ws.refresh_ratio(v);
    general_mat_mul(1.0, &ws.ratio, &h.t(), 0.0, &mut ws.w_num);
    let h_sums = h.row_sums();
    for (k, mut col) in ws.w_num.axis_iter_mut(Axis(1)).enumerate() {
        let denom = h_sums[k];
        col.mapv_inplace(|x| if denom > 0.0 { x / denom } else { 0.0 });
    }
    ws.w_num.mul_assign_elementwise(w);
    adopt_w_update(w, h, ws, w_ref, rate);
}

/// Move the raw W update from `ws.w_num` into `w` with unit column sums.
///
/// Reference-seeded columns (the first `w_ref.ncols()`) are blended with
/// their reference at `rate`. H rows absorb the matching scale so `W·H` is
/// preserved for free columns and untouched for pinned ones.
fn adopt_w_update(
    w: &mut Array2<f64>,
    h: &mut Array2<f64>,
    ws: &mut Workspace,
    w_ref: &Array2<f64>,
    rate: f64,
) {
    let sums = ws.w_num.normalize_columns();
    for (k, &sum) in sums.iter().enumerate() {
        let scale = if k < w_ref.ncols() {
            ws.w_num
                .column_mut(k)
                .zip_mut_with(&w_ref.column(k), |x, &r| *x = rate * *x + (1.0 - rate) * r);
            rate * sum + (1.0 - rate)
        } else {
            sum
        };
        if sum > 0.0 {
            h.row_mut(k).mapv_inplace(|x| x * scale);
        }
    }
    w.assign(&ws.w_num);
}
