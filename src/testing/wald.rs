//! Wald test of the latest-vs-baseline timepoint coefficient

use super::fdr::benjamini_hochberg;
use super::pvalue::{calculate_pvalue, AltHypothesis};
use crate::data::DmsDataSet;
use crate::error::{DmsError, Result};
use crate::io::WaldResults;

/// Wald statistics for the last design coefficient.
///
/// The statistic is the log2 coefficient over its standard error. Rows that
/// did not converge carry NaN through every field. `padj` holds plain BH
/// values; independent filtering may later replace them.
pub fn wald_test(ds: &DmsDataSet, alternative: AltHypothesis) -> Result<WaldResults> {
    let coefficients = ds.coefficients().ok_or_else(|| DmsError::InvalidInput {
        reason: "GLM must be fitted before testing".to_string(),
    })?;
    let standard_errors = ds.standard_errors().ok_or_else(|| DmsError::InvalidInput {
        reason: "Standard errors not available".to_string(),
    })?;
    let base_means = ds.base_means().ok_or_else(|| DmsError::InvalidInput {
        reason: "Normalized counts not available".to_string(),
    })?;

    let info = ds.design_info();
    let coefficient = info.tested_coefficient();
    let idx = info
        .coefficient_index(&coefficient)
        .ok_or_else(|| DmsError::CoefficientMismatch {
            tested: coefficient.clone(),
            requested: info.coef_names.join(", "),
        })?;

    let n = ds.n_variants();
    let log2_fold_changes: Vec<f64> = (0..n).map(|i| coefficients[[i, idx]]).collect();
    let lfc_se: Vec<f64> = (0..n).map(|i| standard_errors[[i, idx]]).collect();
    let stat: Vec<f64> = log2_fold_changes
        .iter()
        .zip(&lfc_se)
        .map(|(&b, &se)| if se > 0.0 && se.is_finite() { b / se } else { f64::NAN })
        .collect();
    let pvalues: Vec<f64> = stat.iter().map(|&z| calculate_pvalue(z, alternative)).collect();
    let padj = benjamini_hochberg(&pvalues);

    let dispersions = ds
        .dispersions()
        .map(|d| d.to_vec())
        .unwrap_or_else(|| vec![f64::NAN; n]);

    log::info!("Wald test on {} ({:?})", coefficient, alternative);
    Ok(WaldResults {
        variant_ids: ds.counts().variant_ids().to_vec(),
        base_means: base_means.to_vec(),
        log2_fold_changes,
        lfc_se,
        stat,
        pvalues,
        padj,
        dispersions,
        shrunken_lfc: vec![f64::NAN; n],
        shrunken_sd: vec![f64::NAN; n],
        coefficient,
        alternative,
    })
}
