//! Count matrix of peptide variants by sample

use std::collections::HashSet;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{DmsError, Result};

/// Read counts, rows are variants and columns are samples
#[derive(Debug, Clone)]
pub struct CountMatrix {
    /// Raw count data (variants x samples)
    counts: Array2<f64>,
    /// Variant identifiers, unique
    variant_ids: Vec<String>,
    /// Sample (column) names
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a count matrix, validating shape, values and identifier uniqueness
    pub fn new(
        counts: Array2<f64>,
        variant_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (n_variants, n_samples) = counts.dim();

        if variant_ids.len() != n_variants {
            return Err(DmsError::DimensionMismatch {
                expected: format!("{} variant IDs", n_variants),
                got: format!("{} variant IDs", variant_ids.len()),
            });
        }

        if sample_ids.len() != n_samples {
            return Err(DmsError::DimensionMismatch {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }

        if counts.iter().any(|&x| x < 0.0 || !x.is_finite()) {
            return Err(DmsError::InvalidCountMatrix {
                reason: "Counts must be non-negative finite values".to_string(),
            });
        }

        if counts.iter().any(|&x| x != x.round()) {
            return Err(DmsError::InvalidCountMatrix {
                reason: "Counts must be integers".to_string(),
            });
        }

        let mut seen = HashSet::with_capacity(variant_ids.len());
        for id in &variant_ids {
            if !seen.insert(id.as_str()) {
                return Err(DmsError::DuplicateIdentifier { id: id.clone() });
            }
        }

        let mut seen_samples = HashSet::with_capacity(sample_ids.len());
        for id in &sample_ids {
            if !seen_samples.insert(id.as_str()) {
                return Err(DmsError::InvalidMetadata {
                    reason: format!("Duplicate sample column '{}'", id),
                });
            }
        }

        Ok(Self {
            counts,
            variant_ids,
            sample_ids,
        })
    }

    pub fn n_variants(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    /// Raw counts as a view
    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    pub fn variant_ids(&self) -> &[String] {
        &self.variant_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Counts for one variant across samples
    pub fn variant_counts(&self, idx: usize) -> ArrayView1<'_, f64> {
        self.counts.row(idx)
    }

    /// Total count per variant across all samples
    pub fn row_totals(&self) -> Vec<f64> {
        self.counts.axis_iter(Axis(0)).map(|row| row.sum()).collect()
    }

    /// Total count per sample (library size)
    pub fn library_sizes(&self) -> Vec<f64> {
        self.counts.axis_iter(Axis(1)).map(|col| col.sum()).collect()
    }

    /// Keep only the given variant rows, in the given order
    pub fn subset_variants(&self, indices: &[usize]) -> Result<Self> {
        let counts = self.counts.select(Axis(0), indices);
        let variant_ids = indices.iter().map(|&i| self.variant_ids[i].clone()).collect();
        Self::new(counts, variant_ids, self.sample_ids.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_count_matrix_creation() {
        let m = CountMatrix::new(
            array![[10.0, 20.0, 30.0], [5.0, 15.0, 25.0]],
            ids(&["v1", "v2"]),
            ids(&["0A", "24A", "24B"]),
        )
        .unwrap();
        assert_eq!(m.n_variants(), 2);
        assert_eq!(m.n_samples(), 3);
        assert_eq!(m.row_totals(), vec![60.0, 45.0]);
        assert_eq!(m.library_sizes(), vec![15.0, 35.0, 55.0]);
    }

    #[test]
    fn test_negative_counts_rejected() {
        let result = CountMatrix::new(array![[10.0, -5.0]], ids(&["v1"]), ids(&["0A", "24A"]));
        assert!(matches!(result, Err(DmsError::InvalidCountMatrix { .. })));
    }

    #[test]
    fn test_fractional_counts_rejected() {
        let result = CountMatrix::new(array![[10.0, 2.5]], ids(&["v1"]), ids(&["0A", "24A"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = CountMatrix::new(
            array![[1.0, 2.0], [3.0, 4.0]],
            ids(&["v1", "v1"]),
            ids(&["0A", "24A"]),
        );
        match result {
            Err(DmsError::DuplicateIdentifier { id }) => assert_eq!(id, "v1"),
            other => panic!("expected duplicate identifier error, got {:?}", other),
        }
    }

    #[test]
    fn test_subset_keeps_order() {
        let m = CountMatrix::new(
            array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
            ids(&["a", "b", "c"]),
            ids(&["0A", "24A"]),
        )
        .unwrap();
        let sub = m.subset_variants(&[2, 0]).unwrap();
        assert_eq!(sub.variant_ids(), &["c".to_string(), "a".to_string()]);
        assert_eq!(sub.variant_counts(0).to_vec(), vec![5.0, 6.0]);
    }
}
