//! Variant library: counts together with the peptide sequence of each variant

use std::collections::HashMap;

use crate::data::CountMatrix;
use crate::error::{DmsError, Result};

/// A count matrix plus the sequence for every row, aligned by index
#[derive(Debug, Clone)]
pub struct VariantLibrary {
    counts: CountMatrix,
    sequences: Vec<String>,
}

impl VariantLibrary {
    pub fn new(counts: CountMatrix, sequences: Vec<String>) -> Result<Self> {
        if sequences.len() != counts.n_variants() {
            return Err(DmsError::DimensionMismatch {
                expected: format!("{} sequences", counts.n_variants()),
                got: format!("{} sequences", sequences.len()),
            });
        }
        Ok(Self { counts, sequences })
    }

    pub fn counts(&self) -> &CountMatrix {
        &self.counts
    }

    pub fn sequences(&self) -> &[String] {
        &self.sequences
    }

    pub fn n_variants(&self) -> usize {
        self.counts.n_variants()
    }

    /// ID -> sequence lookup
    pub fn sequence_map(&self) -> HashMap<&str, &str> {
        self.counts
            .variant_ids()
            .iter()
            .zip(&self.sequences)
            .map(|(id, seq)| (id.as_str(), seq.as_str()))
            .collect()
    }

    /// Keep only the given rows; sequences follow their variants
    pub fn subset_variants(&self, indices: &[usize]) -> Result<Self> {
        let counts = self.counts.subset_variants(indices)?;
        let sequences = indices.iter().map(|&i| self.sequences[i].clone()).collect();
        Self::new(counts, sequences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_sequences_follow_subset() {
        let counts = CountMatrix::new(
            array![[1.0, 2.0], [3.0, 4.0]],
            vec!["a".to_string(), "b".to_string()],
            vec!["0A".to_string(), "24A".to_string()],
        )
        .unwrap();
        let lib = VariantLibrary::new(counts, vec!["MKV".to_string(), "MRV".to_string()]).unwrap();
        let sub = lib.subset_variants(&[1]).unwrap();
        assert_eq!(sub.sequences(), &["MRV".to_string()]);
        assert_eq!(sub.sequence_map().get("b"), Some(&"MRV"));
    }

    #[test]
    fn test_sequence_count_mismatch() {
        let counts = CountMatrix::new(
            array![[1.0, 2.0]],
            vec!["a".to_string()],
            vec!["0A".to_string(), "24A".to_string()],
        )
        .unwrap();
        assert!(VariantLibrary::new(counts, vec![]).is_err());
    }
}
