//! Dispersion-mean trend

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{DmsError, Result};

/// How the dispersion trend is fitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendFitMethod {
    /// dispersion = a0 + a1 / mean, falling back to `Mean` if the fit fails
    #[default]
    Parametric,
    /// Trimmed mean of the gene-wise estimates
    Mean,
}

/// Trend fitted to the gene-wise dispersions
#[derive(Debug, Clone)]
pub struct DispersionTrend {
    pub trended: Array1<f64>,
    /// (a0, a1) when the parametric fit succeeded
    pub coefficients: Option<(f64, f64)>,
}

/// Fit the trend of gene-wise dispersions against base means.
///
/// A failed parametric fit is not an error: it is logged and the mean trend is
/// used instead.
pub fn fit_dispersion_trend(
    base_means: &Array1<f64>,
    gene_dispersions: &Array1<f64>,
    method: TrendFitMethod,
    min_disp: f64,
) -> DispersionTrend {
    if method == TrendFitMethod::Parametric {
        match fit_parametric_trend(base_means, gene_dispersions) {
            Ok((a0, a1)) => {
                log::debug!("parametric dispersion trend: a0 = {:.6}, a1 = {:.6}", a0, a1);
                let trended = base_means.mapv(|m| if m > 0.0 { a0 + a1 / m } else { a0 });
                return DispersionTrend {
                    trended,
                    coefficients: Some((a0, a1)),
                };
            }
            Err(e) => log::warn!("{}; using the mean dispersion as the trend", e),
        }
    }

    let mean_disp = trimmed_mean_dispersion(gene_dispersions, min_disp);
    DispersionTrend {
        trended: Array1::from_elem(gene_dispersions.len(), mean_disp),
        coefficients: None,
    }
}

/// Mean of estimates above 10 * min_disp with 0.1% trimmed from each end
fn trimmed_mean_dispersion(gene_dispersions: &Array1<f64>, min_disp: f64) -> f64 {
    let mut kept: Vec<f64> = gene_dispersions
        .iter()
        .copied()
        .filter(|d| d.is_finite() && *d > 10.0 * min_disp)
        .collect();
    if kept.is_empty() {
        let finite: Vec<f64> = gene_dispersions.iter().copied().filter(|d| d.is_finite()).collect();
        if finite.is_empty() {
            return min_disp;
        }
        return (finite.iter().sum::<f64>() / finite.len() as f64).max(min_disp);
    }
    kept.sort_by(|a, b| a.total_cmp(b));
    let n = kept.len();
    let trim = (n as f64 * 0.001).floor() as usize;
    let trimmed = &kept[trim..n - trim];
    trimmed.iter().sum::<f64>() / trimmed.len() as f64
}

/// Iterated Gamma GLM fit of d ~ a0 + a1 / mean with residual filtering
fn fit_parametric_trend(means: &Array1<f64>, dispersions: &Array1<f64>) -> Result<(f64, f64)> {
    const MAX_ITER: usize = 11;
    let data: Vec<(f64, f64)> = means
        .iter()
        .zip(dispersions.iter())
        .filter(|(&m, &d)| m > 0.0 && d.is_finite() && d > 1e-6)
        .map(|(&m, &d)| (m, d))
        .collect();
    if data.len() < 3 {
        return Err(DmsError::NumericalInstability {
            operation: "dispersion trend".to_string(),
            details: format!("only {} usable gene-wise estimates", data.len()),
        });
    }

    let mut coefs = (0.1_f64, 1.0_f64);
    for _ in 0..MAX_ITER {
        let old = coefs;
        let good: Vec<(f64, f64)> = data
            .iter()
            .copied()
            .filter(|&(m, d)| {
                let fitted = coefs.0 + coefs.1 / m;
                fitted > 0.0 && d / fitted > 1e-4 && d / fitted < 15.0
            })
            .collect();
        if good.len() < 3 {
            return Err(DmsError::NumericalInstability {
                operation: "dispersion trend".to_string(),
                details: "too few residuals inside (1e-4, 15)".to_string(),
            });
        }

        let (fit, glm_converged) = gamma_identity_glm(&good, coefs);
        coefs = fit;
        if coefs.0 <= 0.0 || coefs.1 <= 0.0 {
            return Err(DmsError::NumericalInstability {
                operation: "dispersion trend".to_string(),
                details: format!("non-positive coefficients a0 = {:.4}, a1 = {:.4}", coefs.0, coefs.1),
            });
        }

        let change = (coefs.0 / old.0).ln().powi(2) + (coefs.1 / old.1).ln().powi(2);
        if change < 1e-6 && glm_converged {
            return Ok(coefs);
        }
    }

    Err(DmsError::NumericalInstability {
        operation: "dispersion trend".to_string(),
        details: "parametric fit did not converge".to_string(),
    })
}

fn gamma_deviance(data: &[(f64, f64)], a0: f64, a1: f64) -> f64 {
    data.iter()
        .map(|&(m, d)| {
            let mu = (a0 + a1 / m).max(1e-8);
            2.0 * (-(d / mu).ln() + (d - mu) / mu)
        })
        .sum()
}

/// IRLS for a Gamma GLM with identity link on x = 1/mean, weights 1/mu^2
fn gamma_identity_glm(data: &[(f64, f64)], start: (f64, f64)) -> ((f64, f64), bool) {
    let (mut a0, mut a1) = start;
    let mut dev_old = gamma_deviance(data, a0, a1);

    for _ in 0..25 {
        let (mut sw, mut swx, mut swz, mut swxx, mut swxz) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for &(m, d) in data {
            let x = 1.0 / m;
            let mu = (a0 + a1 * x).max(1e-8);
            let w = 1.0 / (mu * mu);
            sw += w;
            swx += w * x;
            swz += w * d;
            swxx += w * x * x;
            swxz += w * x * d;
        }
        let det = sw * swxx - swx * swx;
        if det.abs() < 1e-10 {
            return ((a0, a1), false);
        }
        a0 = (swxx * swz - swx * swxz) / det;
        a1 = (sw * swxz - swx * swz) / det;

        let dev = gamma_deviance(data, a0, a1);
        if (dev_old - dev).abs() / (0.1 + dev.abs()) < 1e-8 {
            return ((a0, a1), true);
        }
        dev_old = dev;
    }
    ((a0, a1), false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parametric_trend_recovers_coefficients() {
        let means = Array1::from_iter((1..=200).map(|i| i as f64 * 5.0));
        let disps = means.mapv(|m| 0.05 + 2.0 / m);
        let trend = fit_dispersion_trend(&means, &disps, TrendFitMethod::Parametric, 1e-8);
        let (a0, a1) = trend.coefficients.unwrap();
        assert!((a0 - 0.05).abs() < 1e-4);
        assert!((a1 - 2.0).abs() < 1e-3);
        assert!((trend.trended[0] - (0.05 + 2.0 / 5.0)).abs() < 1e-3);
    }

    #[test]
    fn test_falls_back_to_mean_trend() {
        let means = Array1::from(vec![10.0, 20.0]);
        let disps = Array1::from(vec![0.2, 0.4]);
        let trend = fit_dispersion_trend(&means, &disps, TrendFitMethod::Parametric, 1e-8);
        assert!(trend.coefficients.is_none());
        assert!((trend.trended[0] - 0.3).abs() < 1e-12);
        assert_eq!(trend.trended[0], trend.trended[1]);
    }

    #[test]
    fn test_mean_trend_ignores_tiny_and_nan_estimates() {
        let disps = Array1::from(vec![1e-9, 0.1, 0.3, f64::NAN]);
        let means = Array1::from(vec![1.0, 2.0, 3.0, 0.0]);
        let trend = fit_dispersion_trend(&means, &disps, TrendFitMethod::Mean, 1e-8);
        assert!((trend.trended[3] - 0.2).abs() < 1e-12);
    }
}
