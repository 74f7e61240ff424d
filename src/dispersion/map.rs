//! Empirical Bayes shrinkage of dispersions toward the trend

use ndarray::{Array1, Array2};
use rayon::prelude::*;

use super::gene_wise::{grid_search, line_search};
use crate::dispersion::DispersionParams;

/// Prior on log dispersion residuals
#[derive(Debug, Clone, Copy)]
pub struct DispersionPrior {
    /// Variance of the log-normal prior
    pub prior_var: f64,
    /// Observed variance of log(gene / trend), scaled MAD squared
    pub var_log_disp_ests: f64,
}

/// Estimate the prior variance from the log residuals of gene-wise estimates.
///
/// Residuals are taken where the gene-wise estimate is at least 1e-6. The
/// expected sampling variance trigamma(df / 2) is subtracted and the result
/// floored at 0.25, which is also used outright when df <= 0 or fewer than
/// three residuals exist.
pub fn estimate_prior_variance(
    gene_dispersions: &Array1<f64>,
    trended_dispersions: &Array1<f64>,
    n_samples: usize,
    n_coefs: usize,
) -> DispersionPrior {
    const MIN_PRIOR_VAR: f64 = 0.25;
    let mut residuals: Vec<f64> = gene_dispersions
        .iter()
        .zip(trended_dispersions.iter())
        .filter(|(&g, &t)| g.is_finite() && g >= 1e-6 && t > 0.0)
        .map(|(&g, &t)| g.ln() - t.ln())
        .collect();
    let var_log_disp_ests = mad_squared(&mut residuals);

    if n_samples <= n_coefs || residuals.len() < 3 {
        return DispersionPrior {
            prior_var: MIN_PRIOR_VAR,
            var_log_disp_ests,
        };
    }
    let df = (n_samples - n_coefs) as f64;
    DispersionPrior {
        prior_var: (var_log_disp_ests - trigamma(df / 2.0)).max(MIN_PRIOR_VAR),
        var_log_disp_ests,
    }
}

/// MAP dispersions for every row plus the upper-outlier flags.
///
/// Rows whose gene-wise estimate lies more than `outlier_sd` prior standard
/// deviations above the trend keep the gene-wise estimate.
pub(crate) fn estimate_map_dispersions(
    counts: &Array2<f64>,
    design: &Array2<f64>,
    mu: &Array2<f64>,
    gene_dispersions: &Array1<f64>,
    trended_dispersions: &Array1<f64>,
    prior: DispersionPrior,
    params: &DispersionParams,
) -> (Array1<f64>, Vec<bool>) {
    let n_variants = counts.nrows();
    let max_disp = params.max_disp(counts.ncols());

    let results: Vec<(f64, bool)> = (0..n_variants)
        .into_par_iter()
        .map(|i| {
            let gene = gene_dispersions[i];
            let trend = trended_dispersions[i];
            if !gene.is_finite() {
                return (f64::NAN, false);
            }
            let outlier = gene.ln() - trend.ln() > params.outlier_sd * prior.var_log_disp_ests.sqrt();
            if outlier {
                return (gene, true);
            }
            let y = counts.row(i).to_vec();
            let m = mu.row(i).to_vec();
            let map = fit_map_dispersion(&y, design, &m, gene, trend, prior.prior_var, max_disp, params);
            (map, false)
        })
        .collect();

    let outliers: Vec<bool> = results.iter().map(|r| r.1).collect();
    (results.into_iter().map(|r| r.0).collect(), outliers)
}

/// Posterior mode of one row's log dispersion under N(log trend, prior_var)
#[allow(clippy::too_many_arguments)]
pub(crate) fn fit_map_dispersion(
    counts: &[f64],
    design: &Array2<f64>,
    mu: &[f64],
    gene_disp: f64,
    trend_disp: f64,
    prior_var: f64,
    max_disp: f64,
    params: &DispersionParams,
) -> f64 {
    let prior = Some((trend_disp.ln(), prior_var));
    let init = if gene_disp > 0.1 * trend_disp { gene_disp } else { trend_disp };
    let search = line_search(counts, design, mu, init, prior, max_disp, params);
    let alpha = if search.converged {
        search.alpha
    } else {
        grid_search(counts, design, mu, prior, params.min_disp, max_disp)
    };
    alpha.clamp(params.min_disp, max_disp)
}

/// Squared scaled median absolute deviation (constant 1.4826)
fn mad_squared(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let median = |v: &mut [f64]| -> f64 {
        v.sort_by(|a, b| a.total_cmp(b));
        let n = v.len();
        if n % 2 == 0 {
            (v[n / 2 - 1] + v[n / 2]) / 2.0
        } else {
            v[n / 2]
        }
    };
    let center = median(values);
    let mut deviations: Vec<f64> = values.iter().map(|x| (x - center).abs()).collect();
    let mad = median(&mut deviations) * 1.4826;
    mad * mad
}

/// Derivative of digamma
pub(crate) fn trigamma(x: f64) -> f64 {
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).powi(2) - trigamma(1.0 - x);
    }
    let mut acc = 0.0;
    let mut z = x;
    while z < 8.0 {
        acc += 1.0 / (z * z);
        z += 1.0;
    }
    let z2 = z * z;
    acc + 1.0 / z + 0.5 / z2 + 1.0 / (6.0 * z2 * z) - 1.0 / (30.0 * z2 * z2 * z) + 1.0 / (42.0 * z2 * z2 * z2 * z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_trigamma() {
        let pi2_6 = std::f64::consts::PI.powi(2) / 6.0;
        assert!((trigamma(1.0) - pi2_6).abs() < 1e-8);
        assert!((trigamma(2.0) - (pi2_6 - 1.0)).abs() < 1e-8);
        assert!((trigamma(0.25) - 17.197_329_876_376_7).abs() < 1e-6);
    }

    #[test]
    fn test_mad_squared() {
        let mut v = vec![1.0, 2.0, 3.0, 4.0, 100.0];
        let expected = (1.0 * 1.4826_f64).powi(2);
        assert!((mad_squared(&mut v) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_prior_variance_floor() {
        let g = Array1::from(vec![0.1, 0.1, 0.1, 0.1]);
        let t = Array1::from(vec![0.1, 0.1, 0.1, 0.1]);
        let prior = estimate_prior_variance(&g, &t, 6, 3);
        assert_eq!(prior.prior_var, 0.25);
        let no_df = estimate_prior_variance(&g, &t, 3, 3);
        assert_eq!(no_df.prior_var, 0.25);
    }

    #[test]
    fn test_map_moves_toward_trend() {
        let design = array![[1.0, 0.0], [1.0, 0.0], [1.0, 0.0], [1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        let y = [95.0, 110.0, 102.0, 190.0, 205.0, 210.0];
        let mu = [102.3, 102.3, 102.3, 201.7, 201.7, 201.7];
        let params = DispersionParams::default();
        let trend = 0.05;
        let loose = fit_map_dispersion(&y, &design, &mu, 0.002, trend, 4.0, 10.0, &params);
        let tight = fit_map_dispersion(&y, &design, &mu, 0.002, trend, 0.01, 10.0, &params);
        assert!(loose <= tight);
        assert!(tight <= trend * 1.001);
        assert!((tight.ln() - trend.ln()).abs() < 1.0);
    }
}
