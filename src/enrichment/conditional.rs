//! Change in AUC when one residue is held fixed

use rayon::prelude::*;
use serde::Serialize;

use super::curve::{enrichment_auc, enrichment_curve};
use super::positions::{position_label, PositionTable};

/// AUC of (`acid`, `position`) among peptides carrying `fixed_acid` at
/// `fixed_position`, against its AUC over all peptides
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionalAuc {
    #[serde(rename = "AA1")]
    pub acid: char,
    #[serde(rename = "Position 1")]
    pub position: String,
    #[serde(rename = "AUC_AA1")]
    pub auc: f64,
    #[serde(rename = "AA2")]
    pub fixed_acid: char,
    #[serde(rename = "Position 2")]
    pub fixed_position: String,
    #[serde(rename = "AUC_AA1 | AA2")]
    pub conditional_auc: f64,
    #[serde(rename = "Delta AUC")]
    pub delta: f64,
}

/// AUC for every (column, acid) of `alphabet`, `[column][acid]`
fn auc_table(table: &PositionTable, alphabet: &[char]) -> Vec<Vec<f64>> {
    (0..table.n_positions())
        .map(|col| {
            let column = table.column(col);
            alphabet.iter().map(|&a| enrichment_auc(&enrichment_curve(&column, a))).collect()
        })
        .collect()
}

/// Conditional AUC of every pair of positions and residues, sorted by delta
/// descending with NaN last.
///
/// Each (fixed position, fixed acid) restricts the table to the peptides
/// carrying it, drops that position and rescores the rest over the residues
/// still present.
pub fn conditional_auc(table: &PositionTable) -> Vec<ConditionalAuc> {
    let alphabet = table.alphabet();
    let unconditional = auc_table(table, &alphabet);
    let labels = table.labels();
    let acid_index = |a: char| alphabet.binary_search(&a).ok();

    let pairs: Vec<(usize, char)> = (0..table.n_positions())
        .flat_map(|col| alphabet.iter().map(move |&a| (col, a)))
        .collect();

    let mut rows: Vec<ConditionalAuc> = pairs
        .par_iter()
        .flat_map_iter(|&(fixed_col, fixed_acid)| {
            let filtered = table.fix_residue(fixed_col, fixed_acid);
            let sub_alphabet = filtered.alphabet();
            let scores = auc_table(&filtered, &sub_alphabet);
            let mut out = Vec::new();
            for (sub_col, &position) in filtered.positions().iter().enumerate() {
                let col = table.positions().iter().position(|&p| p == position);
                for (k, &acid) in sub_alphabet.iter().enumerate() {
                    let auc = match (col, acid_index(acid)) {
                        (Some(c), Some(a)) => unconditional[c][a],
                        _ => f64::NAN,
                    };
                    let conditional = scores[sub_col][k];
                    out.push(ConditionalAuc {
                        acid,
                        position: position_label(position),
                        auc,
                        fixed_acid,
                        fixed_position: labels[fixed_col].clone(),
                        conditional_auc: conditional,
                        delta: conditional - auc,
                    });
                }
            }
            out
        })
        .collect();

    rows.sort_by(|a, b| match (a.delta.is_nan(), b.delta.is_nan()) {
        (false, false) => b.delta.total_cmp(&a.delta),
        (a_nan, b_nan) => a_nan.cmp(&b_nan),
    });
    log::info!("computed {} conditional AUC values", rows.len());
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(s: &[&str]) -> PositionTable {
        let seqs: Vec<String> = s.iter().map(|x| x.to_string()).collect();
        PositionTable::from_sequences(&seqs, None).unwrap()
    }

    #[test]
    fn test_linked_residues_gain_auc() {
        // among peptides with A at position 1, W at position 2 ranks on top
        let t = table(&["CK", "AW", "CK", "AW", "CW", "AK"]);
        let rows = conditional_auc(&t);

        let linked = rows
            .iter()
            .find(|r| r.fixed_acid == 'A' && r.fixed_position == "Pos01" && r.acid == 'W')
            .unwrap();
        assert_eq!(linked.position, "Pos02");
        assert!(linked.delta > 0.0);
        assert!((linked.delta - (linked.conditional_auc - linked.auc)).abs() < 1e-12);

        // the fixed position is never rescored against itself
        assert!(rows.iter().all(|r| r.position != r.fixed_position));
    }

    #[test]
    fn test_sorted_by_delta_descending() {
        let t = table(&["AW", "AW", "CW", "AK", "CK", "CK", "AW"]);
        let rows = conditional_auc(&t);
        assert!(!rows.is_empty());
        let finite: Vec<f64> = rows.iter().map(|r| r.delta).take_while(|d| !d.is_nan()).collect();
        assert!(finite.windows(2).all(|w| w[0] >= w[1]));
        assert!(rows[finite.len()..].iter().all(|r| r.delta.is_nan()));
    }
}
