//! Size factor estimation by the median of ratios

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::data::DmsDataSet;
use crate::error::{DmsError, Result};

/// Method for size factor estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeFactorMethod {
    /// Median of ratios against geometric means of rows with no zeros
    Ratio,
    /// Geometric means over positive counts only, for sparse libraries
    PosCounts,
}

/// Estimate size factors and store them on the dataset.
///
/// `Ratio` falls back to `PosCounts` when every row has at least one zero,
/// which is common for deep-mutational-scanning libraries.
pub fn estimate_size_factors(ds: &mut DmsDataSet, method: SizeFactorMethod) -> Result<()> {
    let counts = ds.counts().counts();
    let size_factors = match method {
        SizeFactorMethod::Ratio => match size_factors_ratio(counts) {
            Ok(sf) => sf,
            Err(DmsError::SizeFactorFailed { reason }) => {
                log::warn!("{}; falling back to poscounts size factors", reason);
                size_factors_poscounts(counts)?
            }
            Err(e) => return Err(e),
        },
        SizeFactorMethod::PosCounts => size_factors_poscounts(counts)?,
    };
    log::debug!("Size factors: {:?}", size_factors.to_vec());
    ds.set_size_factors(size_factors)
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    }
}

/// Median over rows of count / geometric mean, per sample
fn median_ratios(counts: ArrayView2<f64>, log_geo_means: &[Option<f64>]) -> Vec<Option<f64>> {
    counts
        .axis_iter(Axis(1))
        .map(|col| {
            let mut ratios: Vec<f64> = col
                .iter()
                .zip(log_geo_means)
                .filter_map(|(&c, lgm)| match lgm {
                    Some(lgm) if c > 0.0 => Some((c.ln() - lgm).exp()),
                    _ => None,
                })
                .collect();
            if ratios.is_empty() {
                None
            } else {
                Some(median(&mut ratios))
            }
        })
        .collect()
}

fn check_empty(counts: ArrayView2<f64>) -> Result<()> {
    if counts.nrows() == 0 || counts.ncols() == 0 {
        return Err(DmsError::EmptyData {
            reason: "Count matrix is empty".to_string(),
        });
    }
    Ok(())
}

pub fn size_factors_ratio(counts: ArrayView2<f64>) -> Result<Array1<f64>> {
    check_empty(counts)?;
    let n_samples = counts.ncols() as f64;

    let log_geo_means: Vec<Option<f64>> = counts
        .axis_iter(Axis(0))
        .map(|row| {
            if row.iter().all(|&x| x > 0.0) {
                Some(row.iter().map(|&x| x.ln()).sum::<f64>() / n_samples)
            } else {
                None
            }
        })
        .collect();

    if log_geo_means.iter().all(Option::is_none) {
        return Err(DmsError::SizeFactorFailed {
            reason: "every variant contains at least one zero".to_string(),
        });
    }

    let sf: Vec<f64> = median_ratios(counts, &log_geo_means)
        .into_iter()
        .enumerate()
        .map(|(j, m)| {
            m.ok_or_else(|| DmsError::SizeFactorFailed {
                reason: format!("no usable ratios for sample {}", j),
            })
        })
        .collect::<Result<_>>()?;
    validate(Array1::from(sf))
}

pub fn size_factors_poscounts(counts: ArrayView2<f64>) -> Result<Array1<f64>> {
    check_empty(counts)?;
    let n_samples = counts.ncols() as f64;

    // zeros count in the denominator of the geometric mean
    let log_geo_means: Vec<Option<f64>> = counts
        .axis_iter(Axis(0))
        .map(|row| {
            let s: f64 = row.iter().filter(|&&x| x > 0.0).map(|&x| x.ln()).sum();
            if row.iter().any(|&x| x > 0.0) {
                Some(s / n_samples)
            } else {
                None
            }
        })
        .collect();

    let raw: Vec<f64> = median_ratios(counts, &log_geo_means)
        .into_iter()
        .map(|m| m.unwrap_or(f64::NAN))
        .collect();

    // rescale to geometric mean 1 over the finite, positive factors
    let logs: Vec<f64> = raw
        .iter()
        .filter(|x| x.is_finite() && **x > 0.0)
        .map(|x| x.ln())
        .collect();
    if logs.is_empty() {
        return Err(DmsError::SizeFactorFailed {
            reason: "no sample has positive counts".to_string(),
        });
    }
    let center = (logs.iter().sum::<f64>() / logs.len() as f64).exp();
    let sf = raw
        .into_iter()
        .map(|x| if x.is_finite() && x > 0.0 { x / center } else { 1.0 })
        .collect::<Vec<_>>();
    validate(Array1::from(sf))
}

fn validate(sf: Array1<f64>) -> Result<Array1<f64>> {
    if sf.iter().any(|&x| x <= 0.0 || !x.is_finite()) {
        return Err(DmsError::SizeFactorFailed {
            reason: format!("invalid size factors {:?}", sf.to_vec()),
        });
    }
    Ok(sf)
}

/// Counts divided by the sample size factors
pub fn normalized_counts(counts: ArrayView2<f64>, size_factors: &Array1<f64>) -> Array2<f64> {
    let mut out = counts.to_owned();
    for (mut col, &sf) in out.axis_iter_mut(Axis(1)).zip(size_factors.iter()) {
        col.mapv_inplace(|x| x / sf);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_ratio_doubled_library() {
        let counts = array![[10.0, 20.0], [30.0, 60.0], [5.0, 10.0]];
        let sf = size_factors_ratio(counts.view()).unwrap();
        assert!((sf[1] / sf[0] - 2.0).abs() < 1e-12);
        assert!((sf[0] * sf[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ratio_fails_when_all_rows_have_zero() {
        let counts = array![[0.0, 20.0], [30.0, 0.0]];
        assert!(matches!(
            size_factors_ratio(counts.view()),
            Err(DmsError::SizeFactorFailed { .. })
        ));
    }

    #[test]
    fn test_poscounts_handles_zeros() {
        let counts = array![[0.0, 20.0, 10.0], [30.0, 0.0, 15.0], [4.0, 8.0, 0.0]];
        let sf = size_factors_poscounts(counts.view()).unwrap();
        let log_mean: f64 = sf.iter().map(|x| x.ln()).sum::<f64>() / 3.0;
        assert!(log_mean.abs() < 1e-12);
        assert!(sf.iter().all(|&x| x > 0.0));
    }

    #[test]
    fn test_normalized_counts() {
        let counts = array![[10.0, 20.0]];
        let n = normalized_counts(counts.view(), &array![0.5, 2.0]);
        assert_eq!(n, array![[20.0, 10.0]]);
    }
}
