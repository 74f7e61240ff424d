//! Dataset state carried through the model fit

use ndarray::{Array1, Array2};

use crate::data::{CountMatrix, SampleMetadata, VariantLibrary};
use crate::error::{DmsError, Result};
use crate::glm::{create_design_matrix, DesignInfo};
use crate::normalization::normalized_counts;

/// Counts, design and every intermediate estimate of one dataset
#[derive(Debug, Clone)]
pub struct DmsDataSet {
    library: VariantLibrary,
    sample_metadata: SampleMetadata,
    design_matrix: Array2<f64>,
    design_info: DesignInfo,

    size_factors: Option<Array1<f64>>,
    normalized_counts: Option<Array2<f64>>,

    gene_dispersions: Option<Array1<f64>>,
    trended_dispersions: Option<Array1<f64>>,
    /// Final dispersions used by the GLM (MAP estimates, or gene-wise outliers)
    dispersions: Option<Array1<f64>>,
    /// (asymptotic dispersion, extra Poisson) of the parametric trend
    dispersion_function: Option<(f64, f64)>,
    dispersion_prior_var: Option<f64>,
    dispersion_outliers: Option<Vec<bool>>,

    /// Coefficients on the log2 scale (variants x coefficients)
    coefficients: Option<Array2<f64>>,
    /// Standard errors on the log2 scale
    standard_errors: Option<Array2<f64>>,
    converged: Option<Vec<bool>>,
}

impl DmsDataSet {
    /// Derive sample metadata from column names and build the design
    pub fn new(library: VariantLibrary) -> Result<Self> {
        let sample_metadata = SampleMetadata::from_sample_names(library.counts().sample_ids())?;
        let (design_matrix, design_info) = create_design_matrix(&sample_metadata)?;
        Ok(Self {
            library,
            sample_metadata,
            design_matrix,
            design_info,
            size_factors: None,
            normalized_counts: None,
            gene_dispersions: None,
            trended_dispersions: None,
            dispersions: None,
            dispersion_function: None,
            dispersion_prior_var: None,
            dispersion_outliers: None,
            coefficients: None,
            standard_errors: None,
            converged: None,
        })
    }

    pub fn library(&self) -> &VariantLibrary {
        &self.library
    }

    pub fn counts(&self) -> &CountMatrix {
        self.library.counts()
    }

    pub fn sample_metadata(&self) -> &SampleMetadata {
        &self.sample_metadata
    }

    pub fn design_matrix(&self) -> &Array2<f64> {
        &self.design_matrix
    }

    pub fn design_info(&self) -> &DesignInfo {
        &self.design_info
    }

    pub fn n_variants(&self) -> usize {
        self.library.n_variants()
    }

    pub fn n_samples(&self) -> usize {
        self.sample_metadata.n_samples()
    }

    pub fn size_factors(&self) -> Option<&Array1<f64>> {
        self.size_factors.as_ref()
    }

    pub fn normalized_counts(&self) -> Option<&Array2<f64>> {
        self.normalized_counts.as_ref()
    }

    /// Mean of normalized counts per variant
    pub fn base_means(&self) -> Option<Array1<f64>> {
        self.normalized_counts
            .as_ref()
            .map(|nc| nc.rows().into_iter().map(|r| r.mean().unwrap_or(0.0)).collect())
    }

    pub fn gene_dispersions(&self) -> Option<&Array1<f64>> {
        self.gene_dispersions.as_ref()
    }

    pub fn trended_dispersions(&self) -> Option<&Array1<f64>> {
        self.trended_dispersions.as_ref()
    }

    pub fn dispersions(&self) -> Option<&Array1<f64>> {
        self.dispersions.as_ref()
    }

    pub fn dispersion_function(&self) -> Option<(f64, f64)> {
        self.dispersion_function
    }

    pub fn dispersion_prior_var(&self) -> Option<f64> {
        self.dispersion_prior_var
    }

    pub fn dispersion_outliers(&self) -> Option<&[bool]> {
        self.dispersion_outliers.as_deref()
    }

    pub fn coefficients(&self) -> Option<&Array2<f64>> {
        self.coefficients.as_ref()
    }

    pub fn standard_errors(&self) -> Option<&Array2<f64>> {
        self.standard_errors.as_ref()
    }

    pub fn converged(&self) -> Option<&[bool]> {
        self.converged.as_deref()
    }

    fn check_rows(&self, what: &str, got: usize) -> Result<()> {
        if got != self.n_variants() {
            return Err(DmsError::DimensionMismatch {
                expected: format!("{} {}", self.n_variants(), what),
                got: got.to_string(),
            });
        }
        Ok(())
    }

    pub fn set_size_factors(&mut self, size_factors: Array1<f64>) -> Result<()> {
        if size_factors.len() != self.n_samples() {
            return Err(DmsError::DimensionMismatch {
                expected: format!("{} size factors", self.n_samples()),
                got: size_factors.len().to_string(),
            });
        }
        if size_factors.iter().any(|&x| !x.is_finite() || x <= 0.0) {
            return Err(DmsError::InvalidInput {
                reason: "size factors must be positive finite values".to_string(),
            });
        }
        self.normalized_counts = Some(normalized_counts(self.counts().counts(), &size_factors));
        self.size_factors = Some(size_factors);
        Ok(())
    }

    pub fn set_gene_dispersions(&mut self, d: Array1<f64>) -> Result<()> {
        self.check_rows("gene-wise dispersions", d.len())?;
        self.gene_dispersions = Some(d);
        Ok(())
    }

    pub fn set_trended_dispersions(&mut self, d: Array1<f64>) -> Result<()> {
        self.check_rows("trended dispersions", d.len())?;
        self.trended_dispersions = Some(d);
        Ok(())
    }

    pub fn set_dispersions(&mut self, d: Array1<f64>) -> Result<()> {
        self.check_rows("dispersions", d.len())?;
        self.dispersions = Some(d);
        Ok(())
    }

    pub fn set_dispersion_function(&mut self, asympt_disp: f64, extra_pois: f64) {
        self.dispersion_function = Some((asympt_disp, extra_pois));
    }

    pub fn set_dispersion_prior_var(&mut self, var: f64) {
        self.dispersion_prior_var = Some(var);
    }

    pub fn set_dispersion_outliers(&mut self, outliers: Vec<bool>) -> Result<()> {
        self.check_rows("outlier flags", outliers.len())?;
        self.dispersion_outliers = Some(outliers);
        Ok(())
    }

    pub fn set_fit(
        &mut self,
        coefficients: Array2<f64>,
        standard_errors: Array2<f64>,
        converged: Vec<bool>,
    ) -> Result<()> {
        self.check_rows("coefficient rows", coefficients.nrows())?;
        self.check_rows("standard error rows", standard_errors.nrows())?;
        self.check_rows("convergence flags", converged.len())?;
        let p = self.design_info.n_coefs();
        if coefficients.ncols() != p || standard_errors.ncols() != p {
            return Err(DmsError::DimensionMismatch {
                expected: format!("{} coefficient columns", p),
                got: coefficients.ncols().to_string(),
            });
        }
        self.coefficients = Some(coefficients);
        self.standard_errors = Some(standard_errors);
        self.converged = Some(converged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn library() -> VariantLibrary {
        let counts = CountMatrix::new(
            array![[10.0, 20.0, 30.0, 40.0], [5.0, 15.0, 25.0, 35.0]],
            vec!["a".to_string(), "b".to_string()],
            vec!["24A".to_string(), "0A".to_string(), "24B".to_string(), "0B".to_string()],
        )
        .unwrap();
        VariantLibrary::new(counts, vec!["MK".to_string(), "MR".to_string()]).unwrap()
    }

    #[test]
    fn test_design_built_from_column_names() {
        let ds = DmsDataSet::new(library()).unwrap();
        assert_eq!(ds.design_info().tested_coefficient(), "timepoint_24_vs_0");
        assert_eq!(ds.design_matrix().dim(), (4, 3));
    }

    #[test]
    fn test_size_factors_normalize_counts() {
        let mut ds = DmsDataSet::new(library()).unwrap();
        ds.set_size_factors(array![1.0, 2.0, 1.0, 0.5]).unwrap();
        let nc = ds.normalized_counts().unwrap();
        assert_eq!(nc[[0, 1]], 10.0);
        assert_eq!(nc[[1, 3]], 70.0);
        assert!(ds.set_size_factors(array![1.0, 0.0, 1.0, 1.0]).is_err());
    }
}
