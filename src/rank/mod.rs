//! Final ranking of variants by shrunken log fold change

use serde::{Deserialize, Serialize};

use crate::data::VariantLibrary;
use crate::error::{DmsError, Result};
use crate::io::WaldResults;

/// One row of the ranking table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedVariant {
    pub id: String,
    pub sequence: String,
    /// Posterior mode of the log2 fold change, NaN when shrinkage failed
    pub shrunken_lfc: f64,
    /// 1 is the most depleted variant
    pub rank: usize,
}

/// Join shrunken fold changes to sequences by ID and rank them.
///
/// Ascending stable sort: ties keep input order, NaN goes last and is still
/// ranked. Ranks run 1..=K without gaps.
pub fn rank_variants(results: &WaldResults, library: &VariantLibrary) -> Result<Vec<RankedVariant>> {
    let sequences = library.sequence_map();
    let mut rows = results
        .variant_ids
        .iter()
        .zip(&results.shrunken_lfc)
        .map(|(id, &lfc)| {
            let sequence = sequences.get(id.as_str()).ok_or_else(|| DmsError::InvalidInput {
                reason: format!("No sequence for variant '{}'", id),
            })?;
            Ok(RankedVariant {
                id: id.clone(),
                sequence: sequence.to_string(),
                shrunken_lfc: lfc,
                rank: 0,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    rows.sort_by(|a, b| match (a.shrunken_lfc.is_nan(), b.shrunken_lfc.is_nan()) {
        (false, false) => a.shrunken_lfc.total_cmp(&b.shrunken_lfc),
        (a_nan, b_nan) => a_nan.cmp(&b_nan),
    });
    for (i, row) in rows.iter_mut().enumerate() {
        row.rank = i + 1;
    }

    let n_nan = rows.iter().filter(|r| r.shrunken_lfc.is_nan()).count();
    if n_nan > 0 {
        log::warn!("{} of {} ranked variants have no shrunken fold change", n_nan, rows.len());
    }
    Ok(rows)
}
