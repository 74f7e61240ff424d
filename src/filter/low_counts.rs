//! Removal of variants with almost no reads

use crate::data::VariantLibrary;
use crate::error::{DmsError, Result};

/// Keep variants whose total count over all samples exceeds `min_total`.
///
/// Returns the reduced library and the number of removed rows. Removing every
/// row is an error.
pub fn filter_low_counts(library: &VariantLibrary, min_total: f64) -> Result<(VariantLibrary, usize)> {
    let keep: Vec<usize> = library
        .counts()
        .row_totals()
        .iter()
        .enumerate()
        .filter(|(_, &total)| total > min_total)
        .map(|(i, _)| i)
        .collect();

    if keep.is_empty() {
        return Err(DmsError::EmptyData {
            reason: format!(
                "all {} variants have a total count of at most {}",
                library.n_variants(),
                min_total
            ),
        });
    }

    let removed = library.n_variants() - keep.len();
    log::info!("removed {} of {} variants with total count <= {}", removed, library.n_variants(), min_total);
    Ok((library.subset_variants(&keep)?, removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CountMatrix;
    use ndarray::array;

    fn library(counts: ndarray::Array2<f64>) -> VariantLibrary {
        let n = counts.nrows();
        let ids = (0..n).map(|i| format!("v{}", i)).collect();
        let m = CountMatrix::new(counts, ids, vec!["0A".into(), "24A".into(), "24B".into()]).unwrap();
        VariantLibrary::new(m, (0..n).map(|i| format!("SEQ{}", i)).collect()).unwrap()
    }

    #[test]
    fn test_total_one_removed_two_kept() {
        let lib = library(array![[0.0, 1.0, 0.0], [1.0, 0.0, 1.0], [0.0, 0.0, 0.0], [5.0, 6.0, 7.0]]);
        let (kept, removed) = filter_low_counts(&lib, 1.0).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(kept.counts().variant_ids(), &["v1".to_string(), "v3".to_string()]);
        assert_eq!(kept.sequences(), &["SEQ1".to_string(), "SEQ3".to_string()]);
    }

    #[test]
    fn test_everything_removed_is_error() {
        let lib = library(array![[0.0, 1.0, 0.0], [0.0, 0.0, 0.0]]);
        assert!(matches!(filter_low_counts(&lib, 1.0), Err(DmsError::EmptyData { .. })));
    }
}
