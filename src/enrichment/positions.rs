//! Residue-by-position view of a ranked peptide table

use crate::error::{DmsError, Result};

/// Stop codon symbol in translated sequences
pub const STOP: char = '*';

/// Label of a 1-based position, `Pos01`, `Pos02`, ...
pub fn position_label(position: usize) -> String {
    format!("Pos{:02}", position)
}

/// Residues of every peptide at the selected positions, rows in rank order
#[derive(Debug, Clone)]
pub struct PositionTable {
    /// 1-based positions, one per column
    positions: Vec<usize>,
    /// `residues[peptide][column]`
    residues: Vec<Vec<char>>,
}

impl PositionTable {
    /// Split sequences into positions.
    ///
    /// `positions` are 1-based. Without a selection every position up to the
    /// shortest sequence is used.
    pub fn from_sequences(sequences: &[String], positions: Option<&[usize]>) -> Result<Self> {
        let chars: Vec<Vec<char>> = sequences.iter().map(|s| s.chars().collect()).collect();
        let positions: Vec<usize> = match positions {
            Some(p) => p.to_vec(),
            None => {
                let shortest = chars.iter().map(Vec::len).min().unwrap_or(0);
                if chars.iter().any(|c| c.len() != shortest) {
                    log::warn!("sequences differ in length, using the first {} positions", shortest);
                }
                (1..=shortest).collect()
            }
        };
        if positions.is_empty() {
            return Err(DmsError::InvalidInput {
                reason: "no positions to analyse".to_string(),
            });
        }
        if let Some(&zero) = positions.iter().find(|&&p| p == 0) {
            return Err(DmsError::InvalidInput {
                reason: format!("positions are 1-based, got {}", zero),
            });
        }

        let mut residues = Vec::with_capacity(chars.len());
        for (row, seq) in chars.iter().enumerate() {
            let picked = positions
                .iter()
                .map(|&p| {
                    seq.get(p - 1).copied().ok_or_else(|| DmsError::InvalidInput {
                        reason: format!(
                            "sequence {} has length {}, position {} requested",
                            row + 1,
                            seq.len(),
                            p
                        ),
                    })
                })
                .collect::<Result<Vec<char>>>()?;
            residues.push(picked);
        }
        Ok(Self { positions, residues })
    }

    pub fn n_peptides(&self) -> usize {
        self.residues.len()
    }

    pub fn n_positions(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn labels(&self) -> Vec<String> {
        self.positions.iter().map(|&p| position_label(p)).collect()
    }

    /// Sorted set of every symbol in the table, stop codon included
    pub fn alphabet(&self) -> Vec<char> {
        let mut acids: Vec<char> = self.residues.iter().flatten().copied().collect();
        acids.sort_unstable();
        acids.dedup();
        acids
    }

    /// Residues in column `col`, every peptide
    pub fn column(&self, col: usize) -> Vec<char> {
        self.residues.iter().map(|r| r[col]).collect()
    }

    /// Residues in column `col` of peptides with no stop codon at an earlier
    /// position of the table
    pub fn column_without_stops(&self, col: usize) -> Vec<char> {
        let position = self.positions[col];
        self.residues
            .iter()
            .filter(|r| {
                !r.iter()
                    .zip(&self.positions)
                    .any(|(&c, &q)| c == STOP && q < position)
            })
            .map(|r| r[col])
            .collect()
    }

    /// Peptides carrying `acid` in column `col`, with that column removed
    pub fn fix_residue(&self, col: usize, acid: char) -> Self {
        let positions = self
            .positions
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != col)
            .map(|(_, &p)| p)
            .collect();
        let residues = self
            .residues
            .iter()
            .filter(|r| r[col] == acid)
            .map(|r| {
                r.iter()
                    .enumerate()
                    .filter(|(j, _)| *j != col)
                    .map(|(_, &c)| c)
                    .collect()
            })
            .collect();
        Self { positions, residues }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seqs(s: &[&str]) -> Vec<String> {
        s.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_labels_and_alphabet() {
        let t = PositionTable::from_sequences(&seqs(&["MKA", "M*C", "MKC"]), None).unwrap();
        assert_eq!(t.labels(), ["Pos01", "Pos02", "Pos03"]);
        assert_eq!(t.alphabet(), ['*', 'A', 'C', 'K', 'M']);
        assert_eq!(t.column(1), ['K', '*', 'K']);
    }

    #[test]
    fn test_selected_positions_and_short_sequence() {
        let t = PositionTable::from_sequences(&seqs(&["MKAW", "MKCW"]), Some(&[2, 4])).unwrap();
        assert_eq!(t.labels(), ["Pos02", "Pos04"]);
        assert_eq!(t.column(1), ['W', 'W']);
        assert!(PositionTable::from_sequences(&seqs(&["MKAW", "MK"]), Some(&[3])).is_err());
        assert!(PositionTable::from_sequences(&seqs(&["MK"]), Some(&[0])).is_err());
    }

    #[test]
    fn test_stop_codon_removes_later_positions_only() {
        let t = PositionTable::from_sequences(&seqs(&["M*AW", "MKCW", "*KCW"]), None).unwrap();
        // the stop itself is still scored at its own position
        assert_eq!(t.column_without_stops(0), ['M', 'M', '*']);
        assert_eq!(t.column_without_stops(1), ['*', 'K']);
        assert_eq!(t.column_without_stops(2), ['C']);
    }

    #[test]
    fn test_fix_residue() {
        let t = PositionTable::from_sequences(&seqs(&["MKA", "MRC", "MKC"]), None).unwrap();
        let fixed = t.fix_residue(1, 'K');
        assert_eq!(fixed.n_peptides(), 2);
        assert_eq!(fixed.positions(), &[1, 3]);
        assert_eq!(fixed.column(1), ['A', 'C']);
    }
}
