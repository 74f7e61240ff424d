//! apeglm shrinkage of the tested log fold change
//!
//! Zhu, Ibrahim and Love (2018): the posterior mode of the NB GLM with a
//! Cauchy prior on the tested coefficient and a wide normal prior on the
//! others, found with L-BFGS. The posterior SD comes from a Laplace
//! approximation at the mode.
//!
//! Flow:
//! 1. Prior scale from the MLEs by method of moments
//! 2. L-BFGS from the MLE and from zero, keeping the lower objective
//! 3. Finite-difference Hessian at the mode, inverted for the posterior SD

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::f64::consts::LN_2;

use crate::data::DmsDataSet;
use crate::error::{DmsError, Result};
use crate::io::WaldResults;

/// Parameters for apeglm shrinkage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApeglmParams {
    /// Factor applied to sqrt(prior variance) before capping
    pub multiplier: f64,
    /// Upper bound of the Cauchy prior scale
    pub max_prior_scale: f64,
    /// SD of the normal prior on coefficients that are not shrunk
    pub no_shrink_scale: f64,
    pub lbfgs_max_iter: usize,
    pub lbfgs_epsilon: f64,
    /// L-BFGS history length
    pub lbfgs_m: usize,
    /// Step of the central differences used for the Hessian
    pub hessian_step: f64,
}

impl Default for ApeglmParams {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            max_prior_scale: 1.0,
            no_shrink_scale: 15.0,
            lbfgs_max_iter: 300,
            lbfgs_epsilon: 1e-8,
            lbfgs_m: 6,
            hessian_step: 1e-3,
        }
    }
}

/// Prior on the coefficients of one fit
#[derive(Debug, Clone, Copy)]
struct Prior {
    /// Index of the Cauchy-shrunk coefficient
    shrink: usize,
    /// Squared Cauchy scale
    scale_sq: f64,
    /// Variance of the normal prior on every other coefficient
    no_shrink_var: f64,
}

/// Data of one variant for the objective
struct VariantData<'a> {
    y: ArrayView1<'a, f64>,
    design: &'a Array2<f64>,
    /// NB size, the inverse dispersion
    size: f64,
    /// log size factors
    offsets: &'a [f64],
    prior: Prior,
}

/// Shrink the log fold change named `coefficient` and store the posterior
/// mode and SD (log2 scale) in `results`.
///
/// The name must be the Wald-tested coefficient and the last design column.
/// Returns the Cauchy prior scale (natural-log scale).
pub fn shrink_lfc_apeglm(
    ds: &DmsDataSet,
    results: &mut WaldResults,
    coefficient: &str,
    params: &ApeglmParams,
) -> Result<f64> {
    let info = ds.design_info();
    let last = info.n_coefs() - 1;
    if coefficient != results.coefficient || info.coefficient_index(coefficient) != Some(last) {
        return Err(DmsError::CoefficientMismatch {
            tested: results.coefficient.clone(),
            requested: coefficient.to_string(),
        });
    }

    let size_factors = ds.size_factors().ok_or_else(|| DmsError::InvalidInput {
        reason: "Size factors required for shrinkage".to_string(),
    })?;
    let dispersions = ds.dispersions().ok_or_else(|| DmsError::InvalidInput {
        reason: "Dispersions required for shrinkage".to_string(),
    })?;
    let coefficients = ds.coefficients().ok_or_else(|| DmsError::InvalidInput {
        reason: "GLM must be fitted before shrinkage".to_string(),
    })?;
    if results.n_variants() != ds.n_variants() {
        return Err(DmsError::DimensionMismatch {
            expected: format!("{} result rows", ds.n_variants()),
            got: results.n_variants().to_string(),
        });
    }

    let counts = ds.counts().counts();
    let design = ds.design_matrix();
    let n_coefs = design.ncols();
    let offsets: Vec<f64> = size_factors.iter().map(|sf| sf.ln()).collect();

    let mle_lfc: Vec<f64> = results.log2_fold_changes.iter().map(|b| b * LN_2).collect();
    let mle_se: Vec<f64> = results.lfc_se.iter().map(|se| se * LN_2).collect();
    let prior_var = prior_variance(&mle_lfc, &mle_se);
    let prior_scale = (params.multiplier * prior_var.sqrt()).min(params.max_prior_scale);
    log::info!(
        "apeglm shrinkage of {}: prior variance {:.6}, scale {:.6}",
        coefficient,
        prior_var,
        prior_scale
    );

    let prior = Prior {
        shrink: last,
        scale_sq: prior_scale * prior_scale,
        no_shrink_var: params.no_shrink_scale * params.no_shrink_scale,
    };

    let fits: Vec<Option<(f64, f64)>> = (0..ds.n_variants())
        .into_par_iter()
        .map(|i| {
            let mle: Vec<f64> = coefficients.row(i).iter().map(|b| b * LN_2).collect();
            let alpha = dispersions[i];
            if mle.iter().any(|b| !b.is_finite()) || !alpha.is_finite() || alpha <= 0.0 {
                return None;
            }
            let data = VariantData {
                y: counts.row(i),
                design,
                size: 1.0 / alpha,
                offsets: &offsets,
                prior,
            };
            shrink_variant(&data, &mle, n_coefs, params)
        })
        .collect();

    let mut failed = 0;
    for (i, fit) in fits.into_iter().enumerate() {
        match fit {
            Some((mode, sd)) => {
                results.shrunken_lfc[i] = mode / LN_2;
                results.shrunken_sd[i] = sd / LN_2;
            }
            None => {
                results.shrunken_lfc[i] = f64::NAN;
                results.shrunken_sd[i] = f64::NAN;
                failed += 1;
            }
        }
    }
    if failed > 0 {
        log::warn!("{} variants have no shrunken estimate", failed);
    }

    Ok(prior_scale)
}

/// Posterior mode and SD of the shrunk coefficient, natural-log scale
fn shrink_variant(data: &VariantData, mle: &[f64], n_coefs: usize, params: &ApeglmParams) -> Option<(f64, f64)> {
    // Scale the objective so the line search sees values near one
    let cnst = neg_log_posterior(&vec![0.0; n_coefs], data).max(1.0);
    if !cnst.is_finite() {
        return None;
    }
    let objective = |x: &[f64], g: &mut [f64]| neg_log_posterior_and_grad(x, g, data, cnst);

    let mut from_mle = mle.to_vec();
    let run_mle = lbfgs_minimize(objective, &mut from_mle, params.lbfgs_max_iter, params.lbfgs_epsilon, params.lbfgs_m);
    let mut from_zero = vec![0.0; n_coefs];
    let run_zero = lbfgs_minimize(objective, &mut from_zero, params.lbfgs_max_iter, params.lbfgs_epsilon, params.lbfgs_m);

    let candidates = [(run_mle, from_mle), (run_zero, from_zero)];
    let (_, mode) = candidates
        .into_iter()
        .filter(|(run, x)| run.converged && run.value.is_finite() && x.iter().all(|v| v.is_finite()))
        .min_by(|(a, _), (b, _)| a.value.total_cmp(&b.value))?;

    let hessian = finite_difference_hessian(&mode, data, params.hessian_step);
    let sd = laplace_sd(&hessian, n_coefs).map_or(f64::NAN, |sd| sd[data.prior.shrink]);
    Some((mode[data.prior.shrink], sd))
}

/// Variance A of the normal approximation to the effect distribution.
///
/// Root on [1e-6, 400] of the weighted moment equation
/// `A = sum((S - D) I(A)) / sum(I(A))` with `S = b^2`, `D = se^2` and the
/// information weight `I(A) = 1 / (2 (A + D)^2)`, so precise estimates
/// dominate.
fn prior_variance(mle_lfc: &[f64], mle_se: &[f64]) -> f64 {
    const MIN_VAR: f64 = 1e-6;
    const MAX_VAR: f64 = 400.0;

    let valid: Vec<(f64, f64)> = mle_lfc
        .iter()
        .zip(mle_se)
        .filter(|(b, se)| b.is_finite() && se.is_finite() && **se > 0.0)
        .map(|(&b, &se)| (b * b, se * se))
        .collect();
    if valid.is_empty() {
        return MIN_VAR;
    }

    let objective = |a: f64| weighted_moment(&valid, a) - a;

    if objective(MIN_VAR) < 0.0 {
        return MIN_VAR;
    }
    if objective(MAX_VAR) >= 0.0 {
        return MAX_VAR;
    }

    let (mut lo, mut hi) = (MIN_VAR, MAX_VAR);
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if objective(mid) > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1e-12 {
            break;
        }
    }
    0.5 * (lo + hi)
}

/// `sum((S - D) I(A)) / sum(I(A))` over `(S, D)` pairs
fn weighted_moment(terms: &[(f64, f64)], a: f64) -> f64 {
    let (num, den) = terms.iter().fold((0.0, 0.0), |(num, den), &(s, d)| {
        let info = 1.0 / (2.0 * (a + d).powi(2));
        (num + (s - d) * info, den + info)
    });
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// `c` term of the NB score for sample `j`: y - (y + size) mu / (mu + size)
#[inline]
fn sample_terms(beta: &[f64], data: &VariantData, j: usize) -> (f64, f64) {
    let eta: f64 = data.design.row(j).iter().zip(beta).map(|(x, b)| x * b).sum::<f64>() + data.offsets[j];
    let mu = eta.exp();
    let y = data.y[j];
    let a = y + data.size;
    let b = mu + data.size;
    let neg_ll = -(y * eta - a * b.ln());
    (neg_ll, y - a * mu / b)
}

/// Negative log posterior up to a constant
fn neg_log_posterior(beta: &[f64], data: &VariantData) -> f64 {
    let neg_ll: f64 = (0..data.y.len()).map(|j| sample_terms(beta, data, j).0).sum();
    neg_ll + neg_log_prior(beta, &data.prior)
}

fn neg_log_prior(beta: &[f64], prior: &Prior) -> f64 {
    beta.iter()
        .enumerate()
        .map(|(k, &b)| {
            if k == prior.shrink {
                (1.0 + b * b / prior.scale_sq).ln()
            } else {
                b * b / (2.0 * prior.no_shrink_var)
            }
        })
        .sum()
}

fn gradient(beta: &[f64], grad: &mut [f64], data: &VariantData) {
    grad.iter_mut().for_each(|g| *g = 0.0);
    for j in 0..data.y.len() {
        let (_, c) = sample_terms(beta, data, j);
        for (g, x) in grad.iter_mut().zip(data.design.row(j)) {
            *g -= x * c;
        }
    }
    let prior = &data.prior;
    for (k, g) in grad.iter_mut().enumerate() {
        let b = beta[k];
        *g += if k == prior.shrink {
            2.0 * b / (prior.scale_sq + b * b)
        } else {
            b / prior.no_shrink_var
        };
    }
}

/// Objective and gradient divided by `cnst`
fn neg_log_posterior_and_grad(beta: &[f64], grad: &mut [f64], data: &VariantData, cnst: f64) -> f64 {
    gradient(beta, grad, data);
    grad.iter_mut().for_each(|g| *g /= cnst);
    neg_log_posterior(beta, data) / cnst + 10.0
}

/// Outcome of one L-BFGS run
struct LbfgsResult {
    value: f64,
    converged: bool,
}

/// Limited-memory BFGS with a backtracking strong-Wolfe line search.
///
/// Stops on a small gradient norm (absolute or relative to |x|) or on a
/// relative change in the objective below `epsilon`.
fn lbfgs_minimize<F>(f_grad: F, x: &mut [f64], max_iter: usize, epsilon: f64, m: usize) -> LbfgsResult
where
    F: Fn(&[f64], &mut [f64]) -> f64,
{
    const FTOL: f64 = 1e-4;
    const WOLFE: f64 = 0.9;
    const DEC: f64 = 0.5;
    const INC: f64 = 2.1;
    const MAX_LINESEARCH: usize = 100;

    let n = x.len();
    let mut s_hist: VecDeque<Vec<f64>> = VecDeque::with_capacity(m);
    let mut y_hist: VecDeque<Vec<f64>> = VecDeque::with_capacity(m);
    let mut rho_hist: VecDeque<f64> = VecDeque::with_capacity(m);

    let mut grad = vec![0.0; n];
    let mut fx = f_grad(x, &mut grad);
    if !fx.is_finite() {
        return LbfgsResult { value: fx, converged: false };
    }
    if norm(&grad) <= epsilon * norm(x).max(1.0) {
        return LbfgsResult { value: fx, converged: true };
    }

    let mut drt: Vec<f64> = grad.iter().map(|g| -g).collect();
    let mut step = 1.0 / norm(&drt);
    let mut xp = vec![0.0; n];
    let mut gradp = vec![0.0; n];

    for _ in 0..max_iter {
        xp.copy_from_slice(x);
        gradp.copy_from_slice(&grad);
        let fx_init = fx;
        let dg_init = dot(&grad, &drt);
        if dg_init >= 0.0 {
            // not a descent direction, restart from steepest descent
            drt = grad.iter().map(|g| -g).collect();
            s_hist.clear();
            y_hist.clear();
            rho_hist.clear();
            continue;
        }

        let mut accepted = false;
        for _ in 0..MAX_LINESEARCH {
            for i in 0..n {
                x[i] = xp[i] + step * drt[i];
            }
            fx = f_grad(x, &mut grad);
            let width = if !fx.is_finite() || fx > fx_init + step * FTOL * dg_init {
                DEC
            } else {
                let dg = dot(&grad, &drt);
                if dg < WOLFE * dg_init {
                    INC
                } else if dg > -WOLFE * dg_init {
                    DEC
                } else {
                    accepted = true;
                    break;
                }
            };
            step *= width;
        }
        if !accepted {
            return LbfgsResult { value: fx, converged: false };
        }

        if norm(&grad) <= epsilon * norm(x).max(1.0) {
            return LbfgsResult { value: fx, converged: true };
        }
        if (fx_init - fx).abs() <= epsilon * fx.abs().max(fx_init.abs()).max(1.0) {
            return LbfgsResult { value: fx, converged: true };
        }

        let s: Vec<f64> = x.iter().zip(&xp).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = grad.iter().zip(&gradp).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        if sy > f64::EPSILON * dot(&y, &y) {
            if s_hist.len() >= m {
                s_hist.pop_front();
                y_hist.pop_front();
                rho_hist.pop_front();
            }
            rho_hist.push_back(1.0 / sy);
            s_hist.push_back(s);
            y_hist.push_back(y);
        }

        drt = grad.iter().map(|g| -g).collect();
        two_loop_recursion(&mut drt, &s_hist, &y_hist, &rho_hist);
        step = 1.0;
    }

    LbfgsResult { value: fx, converged: false }
}

/// Turn `d = -g` into `d = -H g` with the L-BFGS inverse Hessian
fn two_loop_recursion(d: &mut [f64], s_hist: &VecDeque<Vec<f64>>, y_hist: &VecDeque<Vec<f64>>, rho_hist: &VecDeque<f64>) {
    let m = s_hist.len();
    if m == 0 {
        return;
    }
    let mut alpha = vec![0.0; m];
    for i in (0..m).rev() {
        alpha[i] = rho_hist[i] * dot(&s_hist[i], d);
        for (dj, yj) in d.iter_mut().zip(&y_hist[i]) {
            *dj -= alpha[i] * yj;
        }
    }

    let yy = dot(&y_hist[m - 1], &y_hist[m - 1]);
    let gamma = if yy > 0.0 { dot(&s_hist[m - 1], &y_hist[m - 1]) / yy } else { 1.0 };
    d.iter_mut().for_each(|dj| *dj *= gamma);

    for i in 0..m {
        let beta = rho_hist[i] * dot(&y_hist[i], d);
        for (dj, sj) in d.iter_mut().zip(&s_hist[i]) {
            *dj += sj * (alpha[i] - beta);
        }
    }
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Hessian of the negative log posterior by central differences of the
/// gradient, symmetrized. Row-major n x n.
fn finite_difference_hessian(x: &[f64], data: &VariantData, step: f64) -> Vec<f64> {
    let n = x.len();
    let mut hess = vec![0.0; n * n];
    let mut xp = x.to_vec();
    let mut g_plus = vec![0.0; n];
    let mut g_minus = vec![0.0; n];

    for i in 0..n {
        xp[i] = x[i] + step;
        gradient(&xp, &mut g_plus, data);
        xp[i] = x[i] - step;
        gradient(&xp, &mut g_minus, data);
        xp[i] = x[i];
        for j in 0..n {
            hess[i * n + j] = (g_plus[j] - g_minus[j]) / (2.0 * step);
        }
    }
    for i in 0..n {
        for j in 0..i {
            let avg = 0.5 * (hess[i * n + j] + hess[j * n + i]);
            hess[i * n + j] = avg;
            hess[j * n + i] = avg;
        }
    }
    hess
}

/// Square roots of the diagonal of the inverse Hessian, `None` unless the
/// Hessian is positive definite
fn laplace_sd(hess: &[f64], n: usize) -> Option<Vec<f64>> {
    // Cholesky factor H = L L'
    let mut l = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..=i {
            let sum = hess[i * n + j] - (0..j).map(|k| l[i * n + k] * l[j * n + k]).sum::<f64>();
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i * n + i] = sum.sqrt();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }

    // diag(H^-1)_k = ||L^-1 e_k||^2
    let mut variances = vec![0.0; n];
    for k in 0..n {
        let mut z = vec![0.0; n];
        for i in k..n {
            let rhs = if i == k { 1.0 } else { 0.0 };
            let s: f64 = (k..i).map(|j| l[i * n + j] * z[j]).sum();
            z[i] = (rhs - s) / l[i * n + i];
        }
        variances[k] = dot(&z, &z);
    }
    Some(variances.into_iter().map(f64::sqrt).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CountMatrix, VariantLibrary};
    use crate::testing::AltHypothesis;
    use ndarray::array;

    #[test]
    fn test_prior_variance_weighted_fixed_point() {
        let b = [1.0, -1.5, 0.5, 2.0, -0.2];
        let se = [0.1, 0.2, 0.1, 0.3, 0.1];
        let a = prior_variance(&b, &se);
        let terms: Vec<(f64, f64)> = b.iter().zip(&se).map(|(b, s)| (b * b, s * s)).collect();
        assert!((weighted_moment(&terms, a) - a).abs() < 1e-8);
    }

    #[test]
    fn test_prior_variance_weights_precise_estimates() {
        // S = [4, 0.01], D = [0.25, 4]
        let b = [2.0, 0.1];
        let se = [0.5, 2.0];
        let a = prior_variance(&b, &se);

        let (mut num, mut den) = (0.0, 0.0);
        for (s, d) in [(4.0, 0.25), (0.01, 4.0)] {
            let info = 1.0 / (2.0 * (a + d) * (a + d));
            num += (s - d) * info;
            den += info;
        }
        assert!((num / den - a).abs() < 1e-8);

        // the unweighted root mean(S / (D + A)) = 1 sits near 1.75
        assert!(a > 2.4 && a < 2.7, "a = {}", a);
    }

    #[test]
    fn test_prior_variance_bounds() {
        // effects no larger than their noise
        assert_eq!(prior_variance(&[0.01, -0.01], &[1.0, 1.0]), 1e-6);
        assert_eq!(prior_variance(&[f64::NAN], &[1.0]), 1e-6);
        assert_eq!(prior_variance(&[1e4], &[0.1]), 400.0);
    }

    #[test]
    fn test_lbfgs_rosenbrock() {
        let f = |x: &[f64], g: &mut [f64]| {
            let (a, b) = (x[0], x[1]);
            g[0] = -2.0 * (1.0 - a) - 400.0 * a * (b - a * a);
            g[1] = 200.0 * (b - a * a);
            (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2)
        };
        let mut x = vec![-1.2, 1.0];
        let res = lbfgs_minimize(f, &mut x, 1000, 1e-10, 6);
        assert!(res.converged);
        assert!((x[0] - 1.0).abs() < 1e-4);
        assert!((x[1] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_laplace_sd_diagonal_and_indefinite() {
        let sd = laplace_sd(&[4.0, 0.0, 0.0, 25.0], 2).unwrap();
        assert!((sd[0] - 0.5).abs() < 1e-12);
        assert!((sd[1] - 0.2).abs() < 1e-12);

        let h = [2.0, 1.0, 1.0, 2.0];
        let sd = laplace_sd(&h, 2).unwrap();
        // inverse diagonal is 2/3
        assert!((sd[0] - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!(laplace_sd(&[1.0, 2.0, 2.0, 1.0], 2).is_none());
    }

    fn fitted() -> (DmsDataSet, WaldResults) {
        let counts = CountMatrix::new(
            array![
                [200.0, 210.0, 20.0, 25.0],
                [100.0, 95.0, 105.0, 98.0],
                [30.0, 35.0, 300.0, 320.0],
                [0.0, 0.0, 0.0, 3.0]
            ],
            vec!["down".into(), "flat".into(), "up".into(), "bad".into()],
            vec!["0A".into(), "0B".into(), "24A".into(), "24B".into()],
        )
        .unwrap();
        let seqs = vec!["MA".into(), "MC".into(), "MD".into(), "ME".into()];
        let mut ds = DmsDataSet::new(VariantLibrary::new(counts, seqs).unwrap()).unwrap();
        ds.set_size_factors(array![1.0, 1.0, 1.0, 1.0]).unwrap();
        ds.set_dispersions(array![0.01, 0.01, 0.01, 0.01]).unwrap();
        let l2 = |x: f64| x.log2();
        let coefs = array![
            [l2(205.0), 0.0, l2(22.5 / 205.0)],
            [l2(97.5), 0.0, l2(101.5 / 97.5)],
            [l2(32.5), 0.0, l2(310.0 / 32.5)],
            [f64::NAN, f64::NAN, f64::NAN]
        ];
        let se = array![[0.1, 0.1, 0.15], [0.1, 0.1, 0.1], [0.1, 0.1, 0.15], [f64::NAN, f64::NAN, f64::NAN]];
        ds.set_fit(coefs, se, vec![true, true, true, false]).unwrap();
        let res = crate::testing::wald_test(&ds, AltHypothesis::Less).unwrap();
        (ds, res)
    }

    #[test]
    fn test_shrinks_toward_zero_and_keeps_sign() {
        let (ds, mut res) = fitted();
        let name = res.coefficient.clone();
        let scale = shrink_lfc_apeglm(&ds, &mut res, &name, &ApeglmParams::default()).unwrap();
        assert!(scale > 0.0 && scale <= 1.0);

        for i in 0..3 {
            let (mle, post) = (res.log2_fold_changes[i], res.shrunken_lfc[i]);
            assert!(post.is_finite());
            assert!(post.abs() <= mle.abs() + 0.05);
            assert!(res.shrunken_sd[i] > 0.0);
        }
        assert!(res.shrunken_lfc[0] < -2.0);
        assert!(res.shrunken_lfc[2] > 2.0);
        assert!(res.shrunken_lfc[1].abs() < 0.2);
        assert!(res.shrunken_lfc[3].is_nan() && res.shrunken_sd[3].is_nan());
    }

    #[test]
    fn test_coefficient_mismatch() {
        let (ds, mut res) = fitted();
        let err = shrink_lfc_apeglm(&ds, &mut res, "Intercept", &ApeglmParams::default()).unwrap_err();
        assert!(matches!(err, DmsError::CoefficientMismatch { .. }));

        res.coefficient = "batch_B_vs_A".into();
        let err = shrink_lfc_apeglm(&ds, &mut res, "batch_B_vs_A", &ApeglmParams::default()).unwrap_err();
        assert!(matches!(err, DmsError::CoefficientMismatch { .. }));
    }
}
