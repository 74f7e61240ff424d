//! Negative binomial GLM fitting by iteratively reweighted least squares

use std::f64::consts::LN_2;

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::negative_binomial::{linear_predictor, nb_log_likelihood, nb_mean, nb_weight, MAX_LFC_BETA, MIN_MU};
use crate::data::DmsDataSet;
use crate::error::{DmsError, Result};

/// Configurable parameters for GLM fitting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlmFitParams {
    /// Maximum IRLS iterations
    pub maxit: usize,
    /// Relative deviance change that counts as converged
    pub beta_tol: f64,
    /// Maximum sweeps of the coordinate-wise fallback
    pub fallback_maxit: usize,
}

impl Default for GlmFitParams {
    fn default() -> Self {
        Self {
            maxit: 100,
            beta_tol: 1e-8,
            fallback_maxit: 5000,
        }
    }
}

/// Ridge penalty on the natural-log scale (1e-6 on the log2 scale)
pub(crate) fn ridge_lambda() -> f64 {
    1e-6 / (LN_2 * LN_2)
}

/// Fit of one variant, coefficients on the natural-log scale
#[derive(Debug, Clone)]
pub struct GlmFitResult {
    pub coefficients: Vec<f64>,
    pub standard_errors: Vec<f64>,
    pub converged: bool,
    pub mu: Vec<f64>,
    pub log_likelihood: f64,
}

/// Fit the GLM for every variant and store log2-scale coefficients.
///
/// Rows that neither IRLS nor the fallback can fit get NaN coefficients and
/// standard errors; the rest of the batch is unaffected.
pub fn fit_glm(ds: &mut DmsDataSet, params: &GlmFitParams) -> Result<()> {
    let size_factors = ds.size_factors().ok_or_else(|| DmsError::InvalidInput {
        reason: "Size factors must be estimated before fitting".to_string(),
    })?;
    let dispersions = ds.dispersions().ok_or_else(|| DmsError::InvalidInput {
        reason: "Dispersions must be estimated before fitting".to_string(),
    })?;
    let counts = ds.counts().counts();
    let design = ds.design_matrix();
    let n_variants = ds.n_variants();
    let n_coefs = design.ncols();

    let results: Vec<GlmFitResult> = (0..n_variants)
        .into_par_iter()
        .map(|i| fit_single_variant(counts.row(i), design, size_factors.view(), dispersions[i], params))
        .collect();

    let mut coefficients = Array2::from_elem((n_variants, n_coefs), f64::NAN);
    let mut standard_errors = Array2::from_elem((n_variants, n_coefs), f64::NAN);
    let mut converged = Vec::with_capacity(n_variants);
    for (i, fit) in results.iter().enumerate() {
        let usable = fit.converged && fit.coefficients.iter().all(|b| b.is_finite());
        if usable {
            for j in 0..n_coefs {
                coefficients[[i, j]] = fit.coefficients[j] / LN_2;
                standard_errors[[i, j]] = fit.standard_errors[j] / LN_2;
            }
        }
        converged.push(usable);
    }

    let n_failed = converged.iter().filter(|c| !**c).count();
    if n_failed > 0 {
        log::warn!("{} rows did not converge; their results are NaN", n_failed);
    }
    ds.set_fit(coefficients, standard_errors, converged)
}

/// IRLS for one variant, with a coordinate-wise Newton fallback on failure
pub fn fit_single_variant(
    counts: ArrayView1<f64>,
    design: &Array2<f64>,
    size_factors: ArrayView1<f64>,
    alpha: f64,
    params: &GlmFitParams,
) -> GlmFitResult {
    let n_samples = counts.len();
    let n_coefs = design.ncols();

    // start from least squares on log(normalized counts + 0.1)
    let log_counts: Vec<f64> = counts
        .iter()
        .zip(size_factors.iter())
        .map(|(&c, &s)| (c / s + 0.1).ln())
        .collect();
    let mut beta = weighted_least_squares(design, &vec![1.0; n_samples], &log_counts, 0.0);
    if beta.iter().any(|b| !b.is_finite()) {
        beta = intercept_start(counts, size_factors, n_coefs);
    }
    let start = beta.clone();

    let mut converged = false;
    let mut dev_old = 0.0f64;
    let mut working = vec![0.0; n_samples];
    let mut weights = vec![0.0; n_samples];

    for iter in 0..params.maxit {
        let eta = linear_predictor(design, &beta);
        for i in 0..n_samples {
            let mu = nb_mean(eta[i], size_factors[i]).max(MIN_MU);
            weights[i] = nb_weight(mu, alpha);
            working[i] = (mu / size_factors[i]).ln() + (counts[i] - mu) / mu;
        }
        beta = weighted_least_squares(design, &weights, &working, ridge_lambda());
        if beta.iter().any(|b| b.abs() > MAX_LFC_BETA || !b.is_finite()) {
            break;
        }

        let dev = -2.0 * log_likelihood(counts, design, size_factors, alpha, &beta);
        let conv_test = (dev - dev_old).abs() / (dev.abs() + 0.1);
        if conv_test.is_nan() {
            break;
        }
        if iter > 0 && conv_test < params.beta_tol {
            converged = true;
            break;
        }
        dev_old = dev;
    }

    let stable = beta.iter().all(|b| b.is_finite() && b.abs() <= MAX_LFC_BETA);
    if !converged || !stable {
        let init = if stable { beta.clone() } else { start };
        beta = coordinate_newton(counts, design, size_factors, alpha, init, params.fallback_maxit)
            .unwrap_or_else(|| vec![f64::NAN; n_coefs]);
        converged = beta.iter().all(|b| b.is_finite());
    }

    let eta = linear_predictor(design, &beta);
    let mu: Vec<f64> = (0..n_samples)
        .map(|i| nb_mean(eta[i], size_factors[i]).max(MIN_MU))
        .collect();
    let w: Vec<f64> = mu.iter().map(|&m| nb_weight(m, alpha)).collect();
    let standard_errors = sandwich_standard_errors(design, &w);
    let log_likelihood = log_likelihood(counts, design, size_factors, alpha, &beta);

    GlmFitResult {
        coefficients: beta,
        standard_errors,
        converged,
        mu,
        log_likelihood,
    }
}

fn intercept_start(counts: ArrayView1<f64>, size_factors: ArrayView1<f64>, n_coefs: usize) -> Vec<f64> {
    let n = counts.len() as f64;
    let mean: f64 = counts.iter().zip(size_factors.iter()).map(|(c, s)| c / s).sum::<f64>() / n;
    let mut beta = vec![0.0; n_coefs];
    beta[0] = mean.max(0.1).ln();
    beta
}

fn log_likelihood(
    counts: ArrayView1<f64>,
    design: &Array2<f64>,
    size_factors: ArrayView1<f64>,
    alpha: f64,
    beta: &[f64],
) -> f64 {
    linear_predictor(design, beta)
        .iter()
        .enumerate()
        .map(|(i, &eta)| nb_log_likelihood(counts[i], nb_mean(eta, size_factors[i]).max(MIN_MU), alpha))
        .sum()
}

/// Coordinate-wise Newton ascent on the NB log-likelihood with Armijo backtracking.
/// Returns `None` when the sweep limit is hit before the likelihood settles.
fn coordinate_newton(
    counts: ArrayView1<f64>,
    design: &Array2<f64>,
    size_factors: ArrayView1<f64>,
    alpha: f64,
    mut beta: Vec<f64>,
    max_sweeps: usize,
) -> Option<Vec<f64>> {
    let n_samples = counts.len();
    let n_coefs = design.ncols();
    let mut ll_old = log_likelihood(counts, design, size_factors, alpha, &beta);

    for _ in 0..max_sweeps {
        let ll_start = ll_old;
        for j in 0..n_coefs {
            let eta = linear_predictor(design, &beta);
            let mut grad = 0.0;
            let mut hess = 0.0;
            for i in 0..n_samples {
                let mu = nb_mean(eta[i], size_factors[i]).max(MIN_MU);
                grad += (counts[i] - mu) / (1.0 + alpha * mu) * design[[i, j]];
                hess -= nb_weight(mu, alpha) * design[[i, j]] * design[[i, j]];
            }
            if hess.abs() < 1e-20 {
                continue;
            }
            let delta = -grad / hess;
            if delta.abs() < 1e-14 {
                continue;
            }

            let old = beta[j];
            let mut step = 1.0;
            let mut improved = false;
            for _ in 0..30 {
                beta[j] = (old + step * delta).clamp(-MAX_LFC_BETA, MAX_LFC_BETA);
                let ll_new = log_likelihood(counts, design, size_factors, alpha, &beta);
                if ll_new >= ll_old + 1e-4 * step * grad * delta {
                    ll_old = ll_new;
                    improved = true;
                    break;
                }
                step *= 0.5;
            }
            if !improved {
                beta[j] = old;
            }
        }

        if (ll_old - ll_start).abs() / (ll_old.abs() + 0.1) < 1e-8 {
            return Some(beta);
        }
    }
    None
}

/// (X'WX + lambda I)^-1 X'Wz
pub(crate) fn weighted_least_squares(
    design: &Array2<f64>,
    weights: &[f64],
    response: &[f64],
    lambda: f64,
) -> Vec<f64> {
    let n_coefs = design.ncols();
    let mut xtwx = crossprod_weighted(design, weights);
    for j in 0..n_coefs {
        xtwx[j * n_coefs + j] += lambda;
    }
    let mut xtwz = vec![0.0; n_coefs];
    for (i, row) in design.rows().into_iter().enumerate() {
        for j in 0..n_coefs {
            xtwz[j] += weights[i] * row[j] * response[i];
        }
    }
    solve_symmetric_system(&xtwx, &xtwz, n_coefs)
}

/// X'WX as a flat row-major matrix
pub(crate) fn crossprod_weighted(design: &Array2<f64>, weights: &[f64]) -> Vec<f64> {
    let n_coefs = design.ncols();
    let mut out = vec![0.0; n_coefs * n_coefs];
    for (i, row) in design.rows().into_iter().enumerate() {
        for j in 0..n_coefs {
            for k in 0..n_coefs {
                out[j * n_coefs + k] += weights[i] * row[j] * row[k];
            }
        }
    }
    out
}

/// Cholesky solve of a symmetric positive (semi)definite system
pub(crate) fn solve_symmetric_system(a: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let mut l = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                l[i * n + j] = sum.max(1e-12).sqrt();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }

    let mut y = vec![0.0; n];
    for i in 0..n {
        let s: f64 = (0..i).map(|j| l[i * n + j] * y[j]).sum();
        y[i] = (b[i] - s) / l[i * n + i];
    }
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let s: f64 = ((i + 1)..n).map(|j| l[j * n + i] * x[j]).sum();
        x[i] = (y[i] - s) / l[i * n + i];
    }
    x
}

pub(crate) fn invert_symmetric_matrix(a: &[f64], n: usize) -> Vec<f64> {
    let mut inv = vec![0.0; n * n];
    for i in 0..n {
        let mut e = vec![0.0; n];
        e[i] = 1.0;
        let col = solve_symmetric_system(a, &e, n);
        for j in 0..n {
            inv[j * n + i] = col[j];
        }
    }
    inv
}

/// Standard errors from (X'WX + lambda)^-1 X'WX (X'WX + lambda)^-1
fn sandwich_standard_errors(design: &Array2<f64>, weights: &[f64]) -> Vec<f64> {
    let n = design.ncols();
    let xtwx = crossprod_weighted(design, weights);
    let mut ridged = xtwx.clone();
    for j in 0..n {
        ridged[j * n + j] += ridge_lambda();
    }
    let inv = invert_symmetric_matrix(&ridged, n);

    (0..n)
        .map(|i| {
            let mut v = 0.0;
            for k in 0..n {
                for l in 0..n {
                    v += inv[i * n + k] * xtwx[k * n + l] * inv[l * n + i];
                }
            }
            if v > 0.0 {
                v.sqrt()
            } else {
                f64::NAN
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_recovers_fold_change() {
        let design = array![[1.0, 0.0], [1.0, 0.0], [1.0, 1.0], [1.0, 1.0]];
        let counts = array![100.0, 100.0, 400.0, 400.0];
        let sf = array![1.0, 1.0, 1.0, 1.0];
        let fit = fit_single_variant(counts.view(), &design, sf.view(), 0.01, &GlmFitParams::default());
        assert!(fit.converged);
        assert!((fit.coefficients[0] - 100.0_f64.ln()).abs() < 1e-3);
        assert!((fit.coefficients[1] / LN_2 - 2.0).abs() < 1e-3);
        assert!(fit.standard_errors.iter().all(|s| s.is_finite() && *s > 0.0));
    }

    #[test]
    fn test_size_factors_enter_as_offsets() {
        let design = array![[1.0, 0.0], [1.0, 1.0]];
        let counts = array![50.0, 100.0];
        let sf = array![0.5, 1.0];
        let fit = fit_single_variant(counts.view(), &design, sf.view(), 0.05, &GlmFitParams::default());
        assert!(fit.coefficients[1].abs() < 1e-3);
    }

    #[test]
    fn test_zero_group_stays_finite() {
        let design = array![[1.0, 0.0], [1.0, 0.0], [1.0, 1.0], [1.0, 1.0]];
        let counts = array![20.0, 25.0, 0.0, 0.0];
        let sf = array![1.0, 1.0, 1.0, 1.0];
        let fit = fit_single_variant(counts.view(), &design, sf.view(), 0.1, &GlmFitParams::default());
        assert!(fit.coefficients[1] < -1.0);
        assert!(fit.coefficients.iter().all(|b| b.is_finite()));
        // the cap applies to the natural-log coefficients IRLS returns
        assert!(fit.coefficients.iter().all(|b| b.abs() <= MAX_LFC_BETA));
    }

    #[test]
    fn test_solve_symmetric_system() {
        let a = vec![4.0, 2.0, 2.0, 3.0];
        let x = solve_symmetric_system(&a, &[2.0, 1.0], 2);
        assert!((4.0 * x[0] + 2.0 * x[1] - 2.0).abs() < 1e-12);
        assert!((2.0 * x[0] + 3.0 * x[1] - 1.0).abs() < 1e-12);
    }
}
