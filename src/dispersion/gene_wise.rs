//! Gene-wise dispersion estimation using the Cox-Reid adjusted profile likelihood
//!
//! Each variant gets a dispersion that maximizes
//! `ll(alpha) - 0.5 * log|X'WX|` in `log(alpha)`, found by an Armijo line
//! search with a grid search fallback. The same objective, with a log-normal
//! prior added, drives the MAP step in [`super::map`].

use ndarray::{Array1, Array2};
use rayon::prelude::*;
use statrs::function::gamma::{digamma, ln_gamma};

use crate::dispersion::DispersionParams;
use crate::glm::{crossprod_weighted, fit_single_variant, invert_symmetric_matrix, GlmFitParams, MIN_MU};

/// Log-normal prior on the dispersion: (mean of log alpha, variance of log alpha)
pub(crate) type LogPrior = Option<(f64, f64)>;

/// One design row pattern per coefficient, i.e. a pure group-means model
pub(crate) fn is_linear_mu(design: &Array2<f64>) -> bool {
    let mut unique: Vec<Vec<i64>> = Vec::new();
    for row in design.rows() {
        let key: Vec<i64> = row.iter().map(|&v| (v * 1000.0).round() as i64).collect();
        if !unique.contains(&key) {
            unique.push(key);
        }
    }
    unique.len() == design.ncols()
}

/// Gene-wise estimates for every row; also returns the fitted means used
pub(crate) fn estimate_gene_dispersions(
    counts: &Array2<f64>,
    size_factors: &Array1<f64>,
    design: &Array2<f64>,
    params: &DispersionParams,
) -> (Array1<f64>, Array2<f64>) {
    let (n_variants, n_samples) = counts.dim();
    let sf = size_factors.to_vec();
    let xim = sf.iter().map(|s| 1.0 / s).sum::<f64>() / n_samples as f64;
    let linear_mu = is_linear_mu(design);

    let results: Vec<(f64, Vec<f64>)> = (0..n_variants)
        .into_par_iter()
        .map(|i| {
            let y = counts.row(i).to_vec();
            estimate_dispersion_variant(&y, &sf, design, xim, linear_mu, params)
        })
        .collect();

    let mut dispersions = Array1::zeros(n_variants);
    let mut mu = Array2::zeros((n_variants, n_samples));
    for (i, (d, m)) in results.into_iter().enumerate() {
        dispersions[i] = d;
        for (j, v) in m.into_iter().enumerate() {
            mu[[i, j]] = v;
        }
    }
    (dispersions, mu)
}

/// Dispersion and fitted means for one variant.
///
/// Starts from the smaller of the rough and moments estimates, then runs the
/// line search with mu held fixed. If the line search does not improve on the
/// start the start is kept; if it fails to converge a grid search takes over.
pub(crate) fn estimate_dispersion_variant(
    counts: &[f64],
    size_factors: &[f64],
    design: &Array2<f64>,
    xim: f64,
    linear_mu: bool,
    params: &DispersionParams,
) -> (f64, Vec<f64>) {
    let n = counts.len();
    if counts.iter().all(|&c| c == 0.0) {
        return (f64::NAN, vec![0.0; n]);
    }
    let max_disp = params.max_disp(n);

    let normalized: Vec<f64> = counts.iter().zip(size_factors).map(|(c, s)| c / s).collect();
    let rough = rough_disp_estimate(&normalized, design);
    let moments = moments_disp_estimate(&normalized, xim);
    let alpha_init = rough.min(moments).clamp(params.min_disp, max_disp);

    let mu = if linear_mu {
        linear_model_mu(&normalized, size_factors, design)
    } else {
        let fit_params = GlmFitParams {
            beta_tol: 1e-6,
            ..GlmFitParams::default()
        };
        let c = Array1::from(counts.to_vec());
        let s = Array1::from(size_factors.to_vec());
        fit_single_variant(c.view(), design, s.view(), alpha_init, &fit_params).mu
    };

    let search = line_search(counts, design, &mu, alpha_init, None, max_disp, params);
    let no_increase = search.last_lp < search.initial_lp + search.initial_lp.abs() / 1e6;
    let mut alpha = if no_increase { alpha_init } else { search.alpha };

    let converged = search.iterations < params.maxit && search.iterations != 1;
    if !converged && alpha > params.min_disp * 10.0 {
        alpha = grid_search(counts, design, &mu, None, params.min_disp, max_disp);
    }

    (alpha.clamp(params.min_disp, max_disp), mu)
}

/// Moments estimate against a linear-model fit: sum(((y - mu)^2 - mu) / mu^2) / (m - p)
fn rough_disp_estimate(normalized: &[f64], design: &Array2<f64>) -> f64 {
    let n = normalized.len();
    let p = design.ncols();
    if n <= p {
        return f64::INFINITY;
    }
    let ones = vec![1.0; n];
    let mu = linear_model_mu(normalized, &ones, design);
    let est: f64 = normalized
        .iter()
        .zip(&mu)
        .map(|(&y, &m)| {
            let m = m.max(1.0);
            ((y - m).powi(2) - m) / (m * m)
        })
        .sum::<f64>()
        / (n - p) as f64;
    est.max(0.0)
}

/// (variance - xim * mean) / mean^2 of the normalized counts
fn moments_disp_estimate(normalized: &[f64], xim: f64) -> f64 {
    let n = normalized.len() as f64;
    let mean = normalized.iter().sum::<f64>() / n;
    if mean <= 1e-10 {
        return f64::INFINITY;
    }
    let var = if n > 1.0 {
        normalized.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)
    } else {
        0.0
    };
    (var - xim * mean) / (mean * mean)
}

/// Least squares group means of normalized counts, scaled back by size factors
fn linear_model_mu(normalized: &[f64], size_factors: &[f64], design: &Array2<f64>) -> Vec<f64> {
    let p = design.ncols();
    let mut xtx = vec![0.0; p * p];
    let mut xty = vec![0.0; p];
    for (i, row) in design.rows().into_iter().enumerate() {
        for j in 0..p {
            xty[j] += row[j] * normalized[i];
            for k in 0..p {
                xtx[j * p + k] += row[j] * row[k];
            }
        }
    }
    let inv = invert_symmetric_matrix(&xtx, p);
    let beta: Vec<f64> = (0..p).map(|j| (0..p).map(|k| inv[j * p + k] * xty[k]).sum()).collect();
    design
        .rows()
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            let fitted: f64 = row.iter().zip(&beta).map(|(x, b)| x * b).sum();
            (fitted * size_factors[i]).max(MIN_MU)
        })
        .collect()
}

/// Log determinant of a symmetric positive definite matrix via Cholesky
fn log_det(a: &[f64], n: usize) -> Option<f64> {
    let mut l = vec![0.0; n * n];
    let mut acc = 0.0;
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[i * n + i] = sum.sqrt();
                acc += sum.ln();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }
    Some(acc)
}

/// Cox-Reid adjusted log posterior of log(alpha) with mu held fixed
pub(crate) fn log_posterior(
    counts: &[f64],
    design: &Array2<f64>,
    mu: &[f64],
    log_alpha: f64,
    prior: LogPrior,
) -> f64 {
    let alpha = log_alpha.exp();
    let alpha_inv = 1.0 / alpha;
    let mut ll = 0.0;
    let mut w = Vec::with_capacity(counts.len());
    for (&y, &m) in counts.iter().zip(mu) {
        let m = m.max(1e-10);
        ll += ln_gamma(y + alpha_inv) - ln_gamma(alpha_inv) - y * (m + alpha_inv).ln()
            - alpha_inv * (1.0 + m * alpha).ln();
        w.push(1.0 / (1.0 / m + alpha));
    }

    let cr = log_det(&crossprod_weighted(design, &w), design.ncols())
        .map(|ld| -0.5 * ld)
        .unwrap_or(0.0);
    let prior_part = match prior {
        Some((mean, var)) => -0.5 * (log_alpha - mean).powi(2) / var,
        None => 0.0,
    };
    ll + cr + prior_part
}

/// Derivative of [`log_posterior`] with respect to log(alpha)
pub(crate) fn d_log_posterior(
    counts: &[f64],
    design: &Array2<f64>,
    mu: &[f64],
    log_alpha: f64,
    prior: LogPrior,
) -> f64 {
    let alpha = log_alpha.exp();
    let alpha_inv = 1.0 / alpha;
    let p = design.ncols();

    let mut ll_sum = 0.0;
    let mut w = Vec::with_capacity(counts.len());
    let mut dw = Vec::with_capacity(counts.len());
    for (&y, &m) in counts.iter().zip(mu) {
        let m = m.max(1e-10);
        ll_sum += digamma(alpha_inv) + (1.0 + m * alpha).ln() - m * alpha / (1.0 + m * alpha)
            - digamma(y + alpha_inv)
            + y / (m + alpha_inv);
        let denom = 1.0 / m + alpha;
        w.push(1.0 / denom);
        dw.push(-1.0 / (denom * denom));
    }
    let ll_part = alpha_inv * alpha_inv * ll_sum;

    // d/dalpha of -0.5 log|B| = -0.5 tr(B^-1 dB)
    let b = crossprod_weighted(design, &w);
    let db = crossprod_weighted(design, &dw);
    let cr_part = if log_det(&b, p).is_some() {
        let b_inv = invert_symmetric_matrix(&b, p);
        let mut trace = 0.0;
        for i in 0..p {
            for j in 0..p {
                trace += b_inv[i * p + j] * db[j * p + i];
            }
        }
        -0.5 * trace
    } else {
        0.0
    };

    let prior_part = match prior {
        Some((mean, var)) => -(log_alpha - mean) / var,
        None => 0.0,
    };
    (ll_part + cr_part) * alpha + prior_part
}

pub(crate) struct LineSearchResult {
    pub alpha: f64,
    pub initial_lp: f64,
    pub last_lp: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Armijo backtracking ascent on log(alpha).
///
/// Proposals are kept within [-30, 10] on the log scale; the step size grows
/// by 10% after every accepted step up to `kappa_0` and halves every fifth.
pub(crate) fn line_search(
    counts: &[f64],
    design: &Array2<f64>,
    mu: &[f64],
    alpha_init: f64,
    prior: LogPrior,
    max_disp: f64,
    params: &DispersionParams,
) -> LineSearchResult {
    const MIN_LOG_ALPHA_HARD: f64 = -30.0;
    const MAX_LOG_ALPHA_HARD: f64 = 10.0;
    const EPSILON: f64 = 1e-4;
    let min_log_alpha = (params.min_disp / 10.0).ln();

    let mut log_alpha = alpha_init.max(1e-10).ln().clamp(MIN_LOG_ALPHA_HARD, max_disp.ln());
    let initial_lp = log_posterior(counts, design, mu, log_alpha, prior);
    let mut lp = initial_lp;
    let mut dlp = d_log_posterior(counts, design, mu, log_alpha, prior);
    let mut kappa = params.kappa_0;
    let mut accepted = 0;
    let mut iterations = params.maxit;
    let mut converged = false;

    for iter in 0..params.maxit {
        let raw = log_alpha + kappa * dlp;
        if raw < MIN_LOG_ALPHA_HARD && dlp != 0.0 {
            kappa = (MIN_LOG_ALPHA_HARD - log_alpha) / dlp;
        }
        if raw > MAX_LOG_ALPHA_HARD && dlp != 0.0 {
            kappa = (MAX_LOG_ALPHA_HARD - log_alpha) / dlp;
        }
        let proposal = log_alpha + kappa * dlp;
        let lp_proposal = log_posterior(counts, design, mu, proposal, prior);

        if -lp_proposal <= -lp - kappa * EPSILON * dlp * dlp {
            accepted += 1;
            log_alpha = proposal;
            let change = lp_proposal - lp;
            lp = lp_proposal;
            if change < params.disp_tol || log_alpha < min_log_alpha {
                iterations = iter + 1;
                converged = true;
                break;
            }
            dlp = d_log_posterior(counts, design, mu, log_alpha, prior);
            kappa = (kappa * 1.1).min(params.kappa_0);
            if accepted % 5 == 0 {
                kappa /= 2.0;
            }
        } else {
            kappa /= 2.0;
        }
    }

    LineSearchResult {
        alpha: log_alpha.exp().max(params.min_disp),
        initial_lp,
        last_lp: lp,
        iterations,
        converged,
    }
}

/// Coarse 20-point grid over [min_disp, max_disp] in log space, then a fine grid
/// around the best coarse point
pub(crate) fn grid_search(
    counts: &[f64],
    design: &Array2<f64>,
    mu: &[f64],
    prior: LogPrior,
    min_disp: f64,
    max_disp: f64,
) -> f64 {
    const N_GRID: usize = 20;
    let argmax = |grid: &[f64]| -> f64 {
        grid.iter()
            .map(|&la| (la, log_posterior(counts, design, mu, la, prior)))
            .fold((grid[0], f64::NEG_INFINITY), |best, (la, lp)| {
                if lp > best.1 {
                    (la, lp)
                } else {
                    best
                }
            })
            .0
    };
    let spaced = |lo: f64, hi: f64| -> Vec<f64> {
        let step = (hi - lo) / (N_GRID - 1) as f64;
        (0..N_GRID).map(|i| lo + i as f64 * step).collect()
    };

    let (lo, hi) = (min_disp.ln(), max_disp.ln());
    let delta = (hi - lo) / (N_GRID - 1) as f64;
    let coarse = argmax(&spaced(lo, hi));
    argmax(&spaced(coarse - delta, coarse + delta)).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_group_design() -> Array2<f64> {
        array![
            [1.0, 0.0],
            [1.0, 0.0],
            [1.0, 0.0],
            [1.0, 1.0],
            [1.0, 1.0],
            [1.0, 1.0]
        ]
    }

    #[test]
    fn test_linear_mu_detection() {
        assert!(is_linear_mu(&two_group_design()));
        let continuous = array![[1.0, 0.1], [1.0, 0.2], [1.0, 0.3]];
        assert!(!is_linear_mu(&continuous));
    }

    #[test]
    fn test_overdispersed_row_gets_larger_estimate() {
        let design = two_group_design();
        let sf = vec![1.0; 6];
        let params = DispersionParams::default();
        let (tight, _) =
            estimate_dispersion_variant(&[100.0, 102.0, 98.0, 200.0, 199.0, 201.0], &sf, &design, 1.0, true, &params);
        let (wide, _) =
            estimate_dispersion_variant(&[40.0, 180.0, 90.0, 400.0, 90.0, 220.0], &sf, &design, 1.0, true, &params);
        assert!(wide > tight);
        assert!(tight >= params.min_disp);
        assert!(wide <= params.max_disp(6));
    }

    #[test]
    fn test_all_zero_row_is_nan() {
        let (d, mu) = estimate_dispersion_variant(
            &[0.0; 6],
            &[1.0; 6],
            &two_group_design(),
            1.0,
            true,
            &DispersionParams::default(),
        );
        assert!(d.is_nan());
        assert_eq!(mu, vec![0.0; 6]);
    }

    #[test]
    fn test_derivative_matches_finite_difference() {
        let design = two_group_design();
        let y = [12.0, 30.0, 18.0, 60.0, 41.0, 75.0];
        let mu = [20.0, 20.0, 20.0, 58.0, 58.0, 58.0];
        let prior = Some((-2.0, 0.5));
        let la = -1.3;
        let h = 1e-5;
        let numeric = (log_posterior(&y, &design, &mu, la + h, prior)
            - log_posterior(&y, &design, &mu, la - h, prior))
            / (2.0 * h);
        let analytic = d_log_posterior(&y, &design, &mu, la, prior);
        assert!((numeric - analytic).abs() < 1e-4 * analytic.abs().max(1.0));
    }
}
