//! Sample metadata derived from sample column names

use serde::{Deserialize, Serialize};

use crate::error::{DmsError, Result};

/// Per-sample timepoint and batch, aligned with the count matrix columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleMetadata {
    sample_ids: Vec<String>,
    timepoints: Vec<u32>,
    /// Batch tag per sample, empty when the name carries none
    batches: Vec<String>,
}

/// Split a sample name into its timepoint and batch tag.
///
/// The timepoint is the first run of ASCII digits. The batch is whatever
/// remains once that run is cut out, trimmed of separators. `"24B"` gives
/// `(24, "B")`, `"t0_rep1"` gives `(0, "t_rep1")`.
pub fn parse_sample_name(name: &str) -> Result<(u32, String)> {
    let start = name
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| DmsError::InvalidMetadata {
            reason: format!("Sample name '{}' carries no timepoint number", name),
        })?;
    let len = name[start..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(name.len() - start);
    let digits = &name[start..start + len];
    let timepoint = digits.parse::<u32>().map_err(|e| DmsError::InvalidMetadata {
        reason: format!("Sample name '{}': bad timepoint '{}': {}", name, digits, e),
    })?;

    let separators = |c: char| c == '_' || c == '-' || c.is_whitespace();
    let head = name[..start].trim_matches(separators);
    let tail = name[start + len..].trim_matches(separators);
    let batch = match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (false, true) => head.to_string(),
        (false, false) => format!("{}_{}", head, tail),
    };

    Ok((timepoint, batch))
}

impl SampleMetadata {
    /// Build metadata from the sample column names, in column order
    pub fn from_sample_names(sample_ids: &[String]) -> Result<Self> {
        if sample_ids.is_empty() {
            return Err(DmsError::InvalidMetadata {
                reason: "No sample columns".to_string(),
            });
        }
        let mut timepoints = Vec::with_capacity(sample_ids.len());
        let mut batches = Vec::with_capacity(sample_ids.len());
        for name in sample_ids {
            let (tp, batch) = parse_sample_name(name)?;
            timepoints.push(tp);
            batches.push(batch);
        }
        Ok(Self {
            sample_ids: sample_ids.to_vec(),
            timepoints,
            batches,
        })
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn timepoints(&self) -> &[u32] {
        &self.timepoints
    }

    pub fn batches(&self) -> &[String] {
        &self.batches
    }

    /// Distinct timepoints in ascending numeric order; the first is the baseline
    pub fn timepoint_levels(&self) -> Vec<u32> {
        let mut levels = self.timepoints.clone();
        levels.sort_unstable();
        levels.dedup();
        levels
    }

    /// Distinct batch tags in lexical order; the first is the reference
    pub fn batch_levels(&self) -> Vec<String> {
        let mut levels = self.batches.clone();
        levels.sort();
        levels.dedup();
        levels
    }
}
