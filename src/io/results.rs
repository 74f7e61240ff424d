//! Per-variant test results and the run report

use serde::{Deserialize, Serialize};

use crate::testing::AltHypothesis;

/// Wald test results for the tested coefficient, one entry per variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaldResults {
    pub variant_ids: Vec<String>,
    /// Mean of normalized counts
    pub base_means: Vec<f64>,
    /// Maximum likelihood log2 fold change
    pub log2_fold_changes: Vec<f64>,
    pub lfc_se: Vec<f64>,
    pub stat: Vec<f64>,
    pub pvalues: Vec<f64>,
    /// BH-adjusted p-values; NaN where independent filtering removed the row
    pub padj: Vec<f64>,
    pub dispersions: Vec<f64>,
    /// Posterior mode from the shrinkage step, NaN until it has run
    pub shrunken_lfc: Vec<f64>,
    pub shrunken_sd: Vec<f64>,
    /// Name of the tested coefficient, e.g. `timepoint_24_vs_0`
    pub coefficient: String,
    pub alternative: AltHypothesis,
}

impl WaldResults {
    pub fn n_variants(&self) -> usize {
        self.variant_ids.len()
    }

    /// Variants with padj below `alpha`
    pub fn significant(&self, alpha: f64) -> Vec<&str> {
        self.variant_ids
            .iter()
            .zip(&self.padj)
            .filter(|(_, &p)| p.is_finite() && p < alpha)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn summary(&self, alpha: f64) -> ResultsSummary {
        ResultsSummary {
            total: self.n_variants(),
            tested: self.pvalues.iter().filter(|p| p.is_finite()).count(),
            significant: self.significant(alpha).len(),
            not_converged: self.log2_fold_changes.iter().filter(|l| l.is_nan()).count(),
            alpha,
        }
    }
}

/// Counts reported after testing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub total: usize,
    pub tested: usize,
    pub significant: usize,
    pub not_converged: usize,
    pub alpha: f64,
}

impl std::fmt::Display for ResultsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Variants: {}", self.total)?;
        writeln!(f, "Tested: {}", self.tested)?;
        writeln!(f, "Significant (padj < {}): {}", self.alpha, self.significant)?;
        write!(f, "Not converged: {}", self.not_converged)
    }
}

/// JSON report of one ranking run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub input: String,
    pub output: String,
    pub n_input_variants: usize,
    pub n_filtered: usize,
    pub samples: Vec<String>,
    pub timepoints: Vec<u32>,
    pub batches: Vec<String>,
    pub coefficients: Vec<String>,
    pub tested_coefficient: String,
    pub size_factors: Vec<f64>,
    /// (a0, a1) of the parametric trend, absent when the mean trend was used
    pub dispersion_trend: Option<(f64, f64)>,
    pub dispersion_prior_var: Option<f64>,
    pub shrinkage_prior_scale: f64,
    pub summary: ResultsSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results() -> WaldResults {
        WaldResults {
            variant_ids: vec!["a".into(), "b".into(), "c".into()],
            base_means: vec![10.0, 20.0, 30.0],
            log2_fold_changes: vec![-2.0, f64::NAN, 0.5],
            lfc_se: vec![0.3, f64::NAN, 0.4],
            stat: vec![-6.6, f64::NAN, 1.25],
            pvalues: vec![1e-10, f64::NAN, 0.9],
            padj: vec![2e-10, f64::NAN, 0.9],
            dispersions: vec![0.1; 3],
            shrunken_lfc: vec![f64::NAN; 3],
            shrunken_sd: vec![f64::NAN; 3],
            coefficient: "timepoint_24_vs_0".into(),
            alternative: AltHypothesis::Less,
        }
    }

    #[test]
    fn test_summary_counts() {
        let s = results().summary(0.05);
        assert_eq!(s.total, 3);
        assert_eq!(s.tested, 2);
        assert_eq!(s.significant, 1);
        assert_eq!(s.not_converged, 1);
        assert!(s.to_string().contains("Significant (padj < 0.05): 1"));
    }
}
