//! CSV reading and writing for count tables, rankings and enrichment matrices

use std::fs::{self, File};
use std::path::Path;

use ndarray::Array2;
use serde::Serialize;

use crate::data::{CountMatrix, VariantLibrary};
use crate::error::{DmsError, Result};
use crate::io::WaldResults;
use crate::rank::RankedVariant;

const ID_COLUMN: &str = "ID";
const SEQUENCE_COLUMN: &str = "Sequence";
const SHRUNKEN_COLUMN: &str = "shrunken.log2.fold.change";
const RANK_COLUMN: &str = "Rank";

/// Missing values are written the way R writes them
fn format_value(x: f64) -> String {
    if x.is_nan() {
        "NA".to_string()
    } else {
        x.to_string()
    }
}

fn parse_value(s: &str) -> Option<f64> {
    match s.trim() {
        "" | "NA" | "NaN" | "nan" => Some(f64::NAN),
        v => v.parse().ok(),
    }
}

fn create_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn writer(path: &Path) -> Result<csv::Writer<File>> {
    create_parent_dirs(path)?;
    Ok(csv::WriterBuilder::new().from_writer(File::create(path)?))
}

fn reader(path: &Path) -> Result<csv::Reader<File>> {
    let file = File::open(path)?;
    Ok(csv::ReaderBuilder::new().has_headers(true).from_reader(file))
}

/// Read a variant count table.
///
/// The header must name an `ID` and a `Sequence` column, anywhere. An
/// unnamed first column (R row names) is skipped; every other column is a
/// sample. Counts must be non-negative integers.
pub fn read_library<P: AsRef<Path>>(path: P) -> Result<VariantLibrary> {
    let path = path.as_ref();
    let mut rdr = reader(path)?;
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let id_idx = headers
        .iter()
        .position(|h| h == ID_COLUMN)
        .ok_or_else(|| DmsError::InvalidCountMatrix {
            reason: format!("{}: missing '{}' column", path.display(), ID_COLUMN),
        })?;
    let seq_idx = headers
        .iter()
        .position(|h| h == SEQUENCE_COLUMN)
        .ok_or_else(|| DmsError::InvalidCountMatrix {
            reason: format!("{}: missing '{}' column", path.display(), SEQUENCE_COLUMN),
        })?;

    let sample_cols: Vec<usize> = (0..headers.len())
        .filter(|&j| j != id_idx && j != seq_idx && !(j == 0 && headers[j].is_empty()))
        .collect();
    if sample_cols.is_empty() {
        return Err(DmsError::InvalidCountMatrix {
            reason: format!("{}: no sample columns", path.display()),
        });
    }
    let sample_ids: Vec<String> = sample_cols.iter().map(|&j| headers[j].clone()).collect();

    let mut ids = Vec::new();
    let mut sequences = Vec::new();
    let mut values = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        ids.push(record.get(id_idx).unwrap_or("").trim().to_string());
        sequences.push(record.get(seq_idx).unwrap_or("").trim().to_string());
        for (&j, column) in sample_cols.iter().zip(&sample_ids) {
            let raw = record.get(j).unwrap_or("").trim();
            let value: f64 = raw.parse().map_err(|_| DmsError::NonNumericCount {
                column: column.clone(),
                row: row + 1,
                value: raw.to_string(),
            })?;
            values.push(value);
        }
    }

    if ids.is_empty() {
        return Err(DmsError::EmptyData {
            reason: format!("{}: no variants", path.display()),
        });
    }

    let counts = Array2::from_shape_vec((ids.len(), sample_ids.len()), values).map_err(|e| {
        DmsError::InvalidCountMatrix {
            reason: e.to_string(),
        }
    })?;
    log::info!(
        "read {} variants x {} samples from {}",
        ids.len(),
        sample_ids.len(),
        path.display()
    );
    VariantLibrary::new(CountMatrix::new(counts, ids, sample_ids)?, sequences)
}

/// Write the ranking table `ID,Sequence,shrunken.log2.fold.change,Rank`
pub fn write_ranking<P: AsRef<Path>>(path: P, ranking: &[RankedVariant]) -> Result<()> {
    let mut wtr = writer(path.as_ref())?;
    wtr.write_record([ID_COLUMN, SEQUENCE_COLUMN, SHRUNKEN_COLUMN, RANK_COLUMN])?;
    for row in ranking {
        wtr.write_record([
            row.id.as_str(),
            row.sequence.as_str(),
            format_value(row.shrunken_lfc).as_str(),
            row.rank.to_string().as_str(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read a ranking table and return its rows in rank order.
///
/// Only `ID`, `Sequence` and `Rank` are required. Leading R row names are
/// ignored.
pub fn read_ranking<P: AsRef<Path>>(path: P) -> Result<Vec<RankedVariant>> {
    let path = path.as_ref();
    let mut rdr = reader(path)?;
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let column = |name: &str| -> Result<usize> {
        headers.iter().position(|h| h == name).ok_or_else(|| DmsError::InvalidInput {
            reason: format!("{}: missing '{}' column", path.display(), name),
        })
    };
    let id_idx = column(ID_COLUMN)?;
    let seq_idx = column(SEQUENCE_COLUMN)?;
    let rank_idx = column(RANK_COLUMN)?;
    let lfc_idx = headers.iter().position(|h| h == SHRUNKEN_COLUMN);

    let mut rows = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        let raw_rank = record.get(rank_idx).unwrap_or("").trim();
        let rank = raw_rank.parse::<usize>().map_err(|_| DmsError::InvalidInput {
            reason: format!("{}: invalid rank '{}' in row {}", path.display(), raw_rank, row + 1),
        })?;
        let shrunken_lfc = lfc_idx
            .and_then(|j| record.get(j))
            .and_then(parse_value)
            .unwrap_or(f64::NAN);
        rows.push(RankedVariant {
            id: record.get(id_idx).unwrap_or("").trim().to_string(),
            sequence: record.get(seq_idx).unwrap_or("").trim().to_string(),
            shrunken_lfc,
            rank,
        });
    }
    if rows.is_empty() {
        return Err(DmsError::EmptyData {
            reason: format!("{}: no ranked variants", path.display()),
        });
    }
    rows.sort_by_key(|r| r.rank);
    Ok(rows)
}

/// Write every per-variant statistic of the test and the shrinkage
pub fn write_results_table<P: AsRef<Path>>(path: P, results: &WaldResults) -> Result<()> {
    let mut wtr = writer(path.as_ref())?;
    wtr.write_record([
        "ID",
        "baseMean",
        "log2FoldChange",
        "lfcSE",
        "stat",
        "pvalue",
        "padj",
        "shrunkenLFC",
        "shrunkenSD",
    ])?;
    for i in 0..results.n_variants() {
        let mut record = vec![results.variant_ids[i].clone()];
        record.extend(
            [
                results.base_means[i],
                results.log2_fold_changes[i],
                results.lfc_se[i],
                results.stat[i],
                results.pvalues[i],
                results.padj[i],
                results.shrunken_lfc[i],
                results.shrunken_sd[i],
            ]
            .iter()
            .map(|&v| format_value(v)),
        );
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write a matrix with row labels in the first (unnamed) column
pub fn write_labeled_matrix<P: AsRef<Path>>(
    path: P,
    row_labels: &[String],
    col_labels: &[String],
    values: &Array2<f64>,
) -> Result<()> {
    if values.dim() != (row_labels.len(), col_labels.len()) {
        return Err(DmsError::DimensionMismatch {
            expected: format!("{} x {}", row_labels.len(), col_labels.len()),
            got: format!("{} x {}", values.nrows(), values.ncols()),
        });
    }
    let mut wtr = writer(path.as_ref())?;
    let mut header = vec![String::new()];
    header.extend(col_labels.iter().cloned());
    wtr.write_record(&header)?;
    for (label, row) in row_labels.iter().zip(values.rows()) {
        let mut record = vec![label.clone()];
        record.extend(row.iter().map(|&v| format_value(v)));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Serialize records with their serde field names as the header
pub fn write_records<P: AsRef<Path>, T: Serialize>(path: P, records: &[T]) -> Result<()> {
    let mut wtr = writer(path.as_ref())?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Pretty-printed JSON, parent directories created
pub fn write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    create_parent_dirs(path)?;
    serde_json::to_writer_pretty(File::create(path)?, value)?;
    Ok(())
}
