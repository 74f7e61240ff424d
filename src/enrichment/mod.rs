//! Positional residue enrichment along a ranking
//!
//! For every (position, residue) a running-sum curve is walked down the
//! ranked peptides, scored by its mean (AUC) or its extreme value, and
//! compared against a permutation null. Peptides truncated by an earlier stop
//! codon are left out of later positions.

mod conditional;
mod curve;
mod positions;

use std::path::Path;

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{DmsError, Result};
use crate::io::{write_labeled_matrix, write_records};
use crate::rank::RankedVariant;
use crate::rng::RMersenneTwister;
use crate::testing::bh_significant;

pub use conditional::{conditional_auc, ConditionalAuc};
pub use curve::{
    enrichment_auc, enrichment_curve, enrichment_score, permutation_null, score_curve, step_vector, twosided_pvalue,
    zscore, ScoreMode,
};
pub use positions::{position_label, PositionTable, STOP};

/// Settings of an enrichment run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// 1-based positions to score; all positions when `None`
    pub positions: Option<Vec<usize>>,
    pub n_perm: usize,
    pub seed: u32,
    pub mode: ScoreMode,
    /// FDR level of the BH significance call
    pub fdr_alpha: f64,
    /// Also compute conditional AUCs
    pub conditional: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            positions: None,
            n_perm: 1000,
            seed: 42,
            mode: ScoreMode::Auc,
            fdr_alpha: 0.1,
            conditional: false,
        }
    }
}

/// Residue x position matrices. Cells with no hit hold NaN except `counts`.
#[derive(Debug, Clone)]
pub struct EnrichmentResult {
    pub acids: Vec<char>,
    pub positions: Vec<String>,
    pub mode: ScoreMode,
    /// Observed AUC or enrichment score
    pub score: Array2<f64>,
    pub zscore: Array2<f64>,
    pub pval_raw: Array2<f64>,
    /// 1 where significant at the FDR level, 0 where not, NaN if untested
    pub significant: Array2<f64>,
    /// Hits per cell after stop-codon removal
    pub counts: Array2<f64>,
    /// `{acid}_{position}` of every tested cell, in residue-major order
    pub null_labels: Vec<String>,
    /// Permutation scores of the tested cells, one row per `null_labels` entry
    pub null: Array2<f64>,
    pub conditional: Option<Vec<ConditionalAuc>>,
}

impl EnrichmentResult {
    pub fn n_significant(&self) -> usize {
        self.significant.iter().filter(|&&s| s == 1.0).count()
    }
}

struct Cell {
    count: usize,
    score: f64,
    zscore: f64,
    pvalue: f64,
    null: Vec<f64>,
}

/// Score one (position, residue) cell with its own generator
fn score_cell(column: &[char], acid: char, config: &EnrichmentConfig, seed: u32) -> Cell {
    let steps = step_vector(column, acid);
    let count = column.iter().filter(|&&c| c == acid).count();
    if steps.is_empty() {
        return Cell {
            count,
            score: f64::NAN,
            zscore: f64::NAN,
            pvalue: f64::NAN,
            null: Vec::new(),
        };
    }
    let observed = score_curve(&curve::cumulative_sum(&steps), config.mode);
    let mut rng = RMersenneTwister::new(seed);
    let null = permutation_null(&steps, config.n_perm, config.mode, &mut rng);
    Cell {
        count,
        score: observed,
        zscore: zscore(observed, &null),
        pvalue: twosided_pvalue(observed, &null),
        null,
    }
}

/// Enrichment of every residue at every selected position of a ranking.
///
/// Rows must be in rank order. Cell `(a, p)` draws its permutations from a
/// generator seeded with `seed + a * n_positions + p`, so results do not
/// depend on the thread count.
pub fn analyze_enrichment(ranking: &[RankedVariant], config: &EnrichmentConfig) -> Result<EnrichmentResult> {
    let sequences: Vec<String> = ranking.iter().map(|r| r.sequence.clone()).collect();
    let table = PositionTable::from_sequences(&sequences, config.positions.as_deref())?;
    let acids = table.alphabet();
    let n_pos = table.n_positions();
    log::info!(
        "enrichment over {} peptides, {} positions, {} residues, {} permutations ({})",
        table.n_peptides(),
        n_pos,
        acids.len(),
        config.n_perm,
        config.mode.name()
    );

    let columns: Vec<Vec<char>> = (0..n_pos).map(|p| table.column_without_stops(p)).collect();
    let cells: Vec<Cell> = (0..acids.len() * n_pos)
        .into_par_iter()
        .map(|idx| {
            let (a, p) = (idx / n_pos, idx % n_pos);
            score_cell(&columns[p], acids[a], config, config.seed.wrapping_add(idx as u32))
        })
        .collect();

    let shape = (acids.len(), n_pos);
    let pick = |f: fn(&Cell) -> f64| -> Result<Array2<f64>> {
        Array2::from_shape_vec(shape, cells.iter().map(f).collect())
            .map_err(|e| DmsError::InvalidInput { reason: e.to_string() })
    };
    let score = pick(|c| c.score)?;
    let zscores = pick(|c| c.zscore)?;
    let pval_raw = pick(|c| c.pvalue)?;
    let counts = pick(|c| c.count as f64)?;

    let labels = table.labels();
    let tested: Vec<usize> = (0..cells.len()).filter(|&i| !cells[i].pvalue.is_nan()).collect();
    let null_labels: Vec<String> = tested
        .iter()
        .map(|&i| format!("{}_{}", acids[i / n_pos], labels[i % n_pos]))
        .collect();
    let null = Array2::from_shape_vec(
        (tested.len(), config.n_perm),
        tested.iter().flat_map(|&i| cells[i].null.iter().copied()).collect(),
    )
    .map_err(|e| DmsError::InvalidInput { reason: e.to_string() })?;

    let flat: Vec<f64> = pval_raw.iter().copied().collect();
    let flags = bh_significant(&flat, config.fdr_alpha);
    let significant = Array2::from_shape_fn(shape, |(a, p)| {
        let i = a * n_pos + p;
        if flat[i].is_nan() {
            f64::NAN
        } else if flags[i] {
            1.0
        } else {
            0.0
        }
    });

    let conditional = config.conditional.then(|| conditional_auc(&table));

    let result = EnrichmentResult {
        acids,
        positions: labels,
        mode: config.mode,
        score,
        zscore: zscores,
        pval_raw,
        significant,
        counts,
        null_labels,
        null,
        conditional,
    };
    log::info!(
        "{} of {} tested cells significant at FDR {}",
        result.n_significant(),
        flat.iter().filter(|p| !p.is_nan()).count(),
        config.fdr_alpha
    );
    Ok(result)
}

/// Write one CSV per metric into `dir`, the permutation scores of every
/// tested cell as `permutations.csv`, plus `conditional_auc.csv` when
/// conditional values were computed
pub fn write_enrichment<P: AsRef<Path>>(dir: P, result: &EnrichmentResult) -> Result<()> {
    let dir = dir.as_ref();
    let rows: Vec<String> = result.acids.iter().map(|a| a.to_string()).collect();
    let metrics = [
        (result.mode.name(), &result.score),
        ("zscore", &result.zscore),
        ("pval_raw", &result.pval_raw),
        ("pval_fdr", &result.significant),
        ("counts", &result.counts),
    ];
    for (name, values) in metrics {
        write_labeled_matrix(dir.join(format!("{}.csv", name)), &rows, &result.positions, values)?;
    }
    let perm_labels: Vec<String> = (1..=result.null.ncols()).map(|k| format!("perm{}", k)).collect();
    write_labeled_matrix(dir.join("permutations.csv"), &result.null_labels, &perm_labels, &result.null)?;
    if let Some(conditional) = &result.conditional {
        write_records(dir.join("conditional_auc.csv"), conditional)?;
    }
    log::info!("enrichment tables written to {}", dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranking(seqs: &[&str]) -> Vec<RankedVariant> {
        seqs.iter()
            .enumerate()
            .map(|(i, s)| RankedVariant {
                id: format!("p{}", i),
                sequence: s.to_string(),
                shrunken_lfc: i as f64,
                rank: i + 1,
            })
            .collect()
    }

    /// 40 peptides: `A` at position 2 on the top ten, `K` elsewhere
    fn enriched() -> Vec<RankedVariant> {
        let seqs: Vec<String> = (0..40)
            .map(|i| {
                let second = if i < 10 { 'A' } else { 'K' };
                let third = ['C', 'D', 'E', 'F'][i % 4];
                format!("M{}{}", second, third)
            })
            .collect();
        let refs: Vec<&str> = seqs.iter().map(|s| s.as_str()).collect();
        ranking(&refs)
    }

    #[test]
    fn test_enriched_residue_is_significant() {
        let config = EnrichmentConfig { n_perm: 200, ..Default::default() };
        let res = analyze_enrichment(&enriched(), &config).unwrap();
        assert_eq!(res.positions, ["Pos01", "Pos02", "Pos03"]);

        let a = res.acids.iter().position(|&c| c == 'A').unwrap();
        assert_eq!(res.counts[[a, 1]], 10.0);
        assert!(res.score[[a, 1]] > 0.0);
        assert!(res.zscore[[a, 1]] > 3.0);
        assert_eq!(res.pval_raw[[a, 1]], 0.0);
        assert_eq!(res.significant[[a, 1]], 1.0);

        // absent residue is untested
        assert_eq!(res.counts[[a, 0]], 0.0);
        assert!(res.pval_raw[[a, 0]].is_nan() && res.significant[[a, 0]].is_nan());

        // M everywhere at position 1: every permutation equals the observation
        let m = res.acids.iter().position(|&c| c == 'M').unwrap();
        assert_eq!(res.pval_raw[[m, 0]], 1.0);
        assert_eq!(res.significant[[m, 0]], 0.0);
        assert!(res.pval_raw.iter().filter(|p| !p.is_nan()).all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_same_seed_same_result() {
        let config = EnrichmentConfig { n_perm: 50, seed: 3, ..Default::default() };
        let a = analyze_enrichment(&enriched(), &config).unwrap();
        let b = analyze_enrichment(&enriched(), &config).unwrap();
        assert_eq!(a.pval_raw.iter().filter(|p| !p.is_nan()).count(), b.pval_raw.iter().filter(|p| !p.is_nan()).count());
        for (x, y) in a.zscore.iter().zip(b.zscore.iter()) {
            assert!((x.is_nan() && y.is_nan()) || x == y);
        }
    }

    #[test]
    fn test_stop_codon_excludes_later_positions() {
        let res = analyze_enrichment(
            &ranking(&["M*A", "MKA", "MKC", "MKC"]),
            &EnrichmentConfig { n_perm: 10, ..Default::default() },
        )
        .unwrap();
        let a = res.acids.iter().position(|&c| c == 'A').unwrap();
        let stop = res.acids.iter().position(|&c| c == STOP).unwrap();
        assert_eq!(res.counts[[stop, 1]], 1.0);
        assert_eq!(res.counts[[a, 2]], 1.0);
    }

    #[test]
    fn test_selected_positions_and_files() {
        let config = EnrichmentConfig {
            positions: Some(vec![2]),
            n_perm: 20,
            mode: ScoreMode::Max,
            conditional: true,
            ..Default::default()
        };
        let res = analyze_enrichment(&enriched(), &config).unwrap();
        assert_eq!(res.positions, ["Pos02"]);
        assert_eq!(res.acids, ['A', 'K']);
        // one position leaves nothing to condition on
        assert_eq!(res.conditional.as_ref().map(Vec::len), Some(0));

        let dir = tempfile::tempdir().unwrap();
        write_enrichment(dir.path(), &res).unwrap();
        for name in ["max", "zscore", "pval_raw", "pval_fdr", "counts", "permutations", "conditional_auc"] {
            assert!(dir.path().join(format!("{}.csv", name)).exists(), "{}", name);
        }
    }

    #[test]
    fn test_permutation_scores_written_per_tested_cell() {
        let config = EnrichmentConfig { n_perm: 15, ..Default::default() };
        let res = analyze_enrichment(&enriched(), &config).unwrap();
        let n_tested = res.pval_raw.iter().filter(|p| !p.is_nan()).count();
        assert_eq!(res.null.dim(), (n_tested, 15));
        assert_eq!(res.null_labels.len(), n_tested);
        assert!(res.null_labels.contains(&"A_Pos02".to_string()));

        let dir = tempfile::tempdir().unwrap();
        write_enrichment(dir.path(), &res).unwrap();
        let text = std::fs::read_to_string(dir.path().join("permutations.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), n_tested + 1);
        assert!(lines[0].starts_with(",perm1,"));
        assert!(lines.iter().all(|l| l.split(',').count() == 16));
    }
}
