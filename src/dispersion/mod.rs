//! Dispersion estimation for the negative binomial model
//!
//! Three passes: a Cox-Reid gene-wise estimate per variant, a trend of those
//! estimates against mean abundance, and empirical Bayes shrinkage of each
//! estimate toward the trend.

mod gene_wise;
mod map;
mod trend;

pub use map::{estimate_prior_variance, DispersionPrior};
pub use trend::{fit_dispersion_trend, DispersionTrend, TrendFitMethod};

use serde::{Deserialize, Serialize};

use crate::data::DmsDataSet;
use crate::error::{DmsError, Result};
use crate::glm::intercept_design;

/// Tunables of the dispersion fit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispersionParams {
    /// Lower bound on any dispersion
    pub min_disp: f64,
    /// Log posterior change that ends the line search
    pub disp_tol: f64,
    /// Initial and maximal line search step
    pub kappa_0: f64,
    pub maxit: usize,
    /// Gene-wise estimates this many prior SDs above the trend are kept unshrunk
    pub outlier_sd: f64,
}

impl Default for DispersionParams {
    fn default() -> Self {
        Self {
            min_disp: 1e-8,
            disp_tol: 1e-6,
            kappa_0: 1.0,
            maxit: 100,
            outlier_sd: 2.0,
        }
    }
}

impl DispersionParams {
    /// Upper bound on any dispersion: max(10, number of samples)
    pub fn max_disp(&self, n_samples: usize) -> f64 {
        (n_samples as f64).max(10.0)
    }
}

/// Estimate gene-wise, trended and final dispersions and store them on the dataset.
///
/// When the design leaves no residual degrees of freedom the intercept-only
/// design is used for this step.
pub fn estimate_dispersions(ds: &mut DmsDataSet, method: TrendFitMethod, params: &DispersionParams) -> Result<()> {
    let size_factors = ds
        .size_factors()
        .ok_or_else(|| DmsError::InvalidInput {
            reason: "Size factors must be estimated before dispersions".to_string(),
        })?
        .clone();
    let base_means = ds.base_means().ok_or_else(|| DmsError::InvalidInput {
        reason: "Normalized counts are required for dispersion estimation".to_string(),
    })?;

    let n_samples = ds.n_samples();
    let design = if n_samples <= ds.design_matrix().ncols() {
        log::warn!(
            "{} samples for {} coefficients leaves no replicates; estimating dispersions without the design",
            n_samples,
            ds.design_matrix().ncols()
        );
        intercept_design(n_samples)
    } else {
        ds.design_matrix().clone()
    };
    let counts = ds.counts().counts().to_owned();

    log::info!("estimating gene-wise dispersions for {} variants", ds.n_variants());
    let (gene_dispersions, mu) = gene_wise::estimate_gene_dispersions(&counts, &size_factors, &design, params);
    if gene_dispersions.iter().all(|d| !d.is_finite()) {
        return Err(DmsError::NumericalInstability {
            operation: "dispersion estimation".to_string(),
            details: "no variant produced a finite gene-wise estimate".to_string(),
        });
    }

    let trend = fit_dispersion_trend(&base_means, &gene_dispersions, method, params.min_disp);
    let prior = estimate_prior_variance(&gene_dispersions, &trend.trended, n_samples, design.ncols());
    log::debug!(
        "dispersion prior variance {:.4} (observed {:.4})",
        prior.prior_var,
        prior.var_log_disp_ests
    );

    log::info!("shrinking dispersions toward the trend");
    let (dispersions, outliers) =
        map::estimate_map_dispersions(&counts, &design, &mu, &gene_dispersions, &trend.trended, prior, params);
    let n_outliers = outliers.iter().filter(|o| **o).count();
    if n_outliers > 0 {
        log::debug!("{} variants keep their gene-wise dispersion", n_outliers);
    }

    if let Some((a0, a1)) = trend.coefficients {
        ds.set_dispersion_function(a0, a1);
    }
    ds.set_dispersion_prior_var(prior.prior_var);
    ds.set_gene_dispersions(gene_dispersions)?;
    ds.set_trended_dispersions(trend.trended)?;
    ds.set_dispersions(dispersions)?;
    ds.set_dispersion_outliers(outliers)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CountMatrix, VariantLibrary};
    use crate::normalization::{estimate_size_factors, SizeFactorMethod};
    use ndarray::Array2;

    fn dataset(samples: &[&str], rows: &[[f64; 4]]) -> DmsDataSet {
        let n = rows.len();
        let counts = Array2::from_shape_fn((n, 4), |(i, j)| rows[i][j]);
        let ids = (0..n).map(|i| format!("v{}", i)).collect();
        let seqs = (0..n).map(|_| "MK".to_string()).collect();
        let matrix = CountMatrix::new(counts, ids, samples.iter().map(|s| s.to_string()).collect()).unwrap();
        DmsDataSet::new(VariantLibrary::new(matrix, seqs).unwrap()).unwrap()
    }

    fn rows() -> Vec<[f64; 4]> {
        (0..30)
            .map(|i| {
                let base = 20.0 + 15.0 * i as f64;
                let jitter = (i % 5) as f64 * 3.0;
                [base + jitter, base - jitter, base * 0.8 + jitter, base * 0.6 - jitter * 0.5]
            })
            .collect()
    }

    #[test]
    fn test_dispersions_are_bounded_and_stored() {
        let mut ds = dataset(&["0A", "0B", "24A", "24B"], &rows());
        estimate_size_factors(&mut ds, SizeFactorMethod::Ratio).unwrap();
        let params = DispersionParams::default();
        estimate_dispersions(&mut ds, TrendFitMethod::Parametric, &params).unwrap();
        let d = ds.dispersions().unwrap();
        assert_eq!(d.len(), 30);
        assert!(d.iter().all(|x| x.is_finite() && *x >= params.min_disp && *x <= 10.0));
        assert!(ds.dispersion_prior_var().unwrap() >= 0.25);
        assert_eq!(ds.dispersion_outliers().unwrap().len(), 30);
    }

    #[test]
    fn test_saturated_design_uses_intercept_only() {
        // intercept, two batch and one timepoint coefficient from four samples
        let rows: Vec<[f64; 4]> = rows();
        let mut ds = dataset(&["0A", "24A", "24B", "0X"], &rows);
        assert_eq!(ds.design_matrix().ncols(), 4);
        estimate_size_factors(&mut ds, SizeFactorMethod::Ratio).unwrap();
        estimate_dispersions(&mut ds, TrendFitMethod::Mean, &DispersionParams::default()).unwrap();
        assert!(ds.dispersions().unwrap().iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_requires_size_factors() {
        let mut ds = dataset(&["0A", "0B", "24A", "24B"], &rows());
        let err = estimate_dispersions(&mut ds, TrendFitMethod::Mean, &DispersionParams::default());
        assert!(err.is_err());
    }
}
