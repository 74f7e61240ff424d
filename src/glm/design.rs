//! Design matrix for the `~ batch + timepoint` model

use ndarray::Array2;

use crate::data::SampleMetadata;
use crate::error::{DmsError, Result};

/// Column layout of the design matrix
#[derive(Debug, Clone)]
pub struct DesignInfo {
    /// Names of the coefficients, intercept first, timepoint terms last
    pub coef_names: Vec<String>,
    /// Timepoint levels in ascending order; `timepoint_levels[0]` is the baseline
    pub timepoint_levels: Vec<u32>,
    /// Batch levels; empty when the batch term was dropped
    pub batch_levels: Vec<String>,
    /// Column indices of the batch indicators
    pub batch_columns: Vec<usize>,
    /// Column indices of the timepoint indicators
    pub timepoint_columns: Vec<usize>,
}

impl DesignInfo {
    pub fn n_coefs(&self) -> usize {
        self.coef_names.len()
    }

    pub fn baseline(&self) -> u32 {
        self.timepoint_levels[0]
    }

    pub fn latest(&self) -> u32 {
        self.timepoint_levels[self.timepoint_levels.len() - 1]
    }

    /// Name of the latest-vs-baseline coefficient, the one tested and shrunk
    pub fn tested_coefficient(&self) -> String {
        timepoint_coef_name(self.latest(), self.baseline())
    }

    pub fn coefficient_index(&self, name: &str) -> Option<usize> {
        self.coef_names.iter().position(|c| c == name)
    }
}

pub fn timepoint_coef_name(level: u32, reference: u32) -> String {
    format!("timepoint_{}_vs_{}", level, reference)
}

fn batch_coef_name(level: &str, reference: &str) -> String {
    format!("batch_{}_vs_{}", level, reference)
}

/// Build the treatment-coded design matrix for `~ batch + timepoint`.
///
/// The reference timepoint is the smallest numeric value whatever the column
/// order. A batch with a single level contributes no columns.
pub fn create_design_matrix(metadata: &SampleMetadata) -> Result<(Array2<f64>, DesignInfo)> {
    let n_samples = metadata.n_samples();
    let timepoint_levels = metadata.timepoint_levels();
    if timepoint_levels.len() < 2 {
        return Err(DmsError::InvalidDesignMatrix {
            reason: format!(
                "At least two timepoints are required, found {:?}",
                timepoint_levels
            ),
        });
    }

    let mut batch_levels = metadata.batch_levels();
    if batch_levels.len() < 2 {
        log::debug!("Single batch level, dropping batch term from design");
        batch_levels.clear();
    }

    let mut coef_names = vec!["Intercept".to_string()];
    let mut batch_columns = Vec::new();
    let mut timepoint_columns = Vec::new();

    if let Some((reference, rest)) = batch_levels.split_first() {
        for level in rest {
            batch_columns.push(coef_names.len());
            coef_names.push(batch_coef_name(level, reference));
        }
    }
    let baseline = timepoint_levels[0];
    for &level in &timepoint_levels[1..] {
        timepoint_columns.push(coef_names.len());
        coef_names.push(timepoint_coef_name(level, baseline));
    }

    let mut design = Array2::zeros((n_samples, coef_names.len()));
    for i in 0..n_samples {
        design[[i, 0]] = 1.0;
        let batch = &metadata.batches()[i];
        for (k, level) in batch_levels.iter().skip(1).enumerate() {
            if batch == level {
                design[[i, batch_columns[k]]] = 1.0;
            }
        }
        let tp = metadata.timepoints()[i];
        for (k, &level) in timepoint_levels.iter().skip(1).enumerate() {
            if tp == level {
                design[[i, timepoint_columns[k]]] = 1.0;
            }
        }
    }

    check_full_rank(&design)?;

    let info = DesignInfo {
        coef_names,
        timepoint_levels,
        batch_levels,
        batch_columns,
        timepoint_columns,
    };
    log::debug!("Design columns: {:?}", info.coef_names);
    Ok((design, info))
}

/// Intercept-only design for `n` samples
pub fn intercept_design(n: usize) -> Array2<f64> {
    Array2::ones((n, 1))
}

/// Check that a design matrix has full column rank.
///
/// Rank comes from Householder QR with column pivoting; diagonal entries of R
/// below `max(nrow, ncol) * eps * max|diag(R)|` count as zero.
pub fn check_full_rank(matrix: &Array2<f64>) -> Result<()> {
    let (nrow, ncol) = matrix.dim();
    if nrow == 0 || ncol == 0 {
        return Err(DmsError::InvalidDesignMatrix {
            reason: "Design matrix has zero rows or columns".to_string(),
        });
    }

    if qr_rank(matrix) < ncol {
        let zero_column = (0..ncol).any(|j| matrix.column(j).iter().all(|&v| v == 0.0));
        let reason = if zero_column {
            "the model matrix is not full rank: a level has no samples"
        } else {
            "the model matrix is not full rank: batch and timepoint are confounded"
        };
        return Err(DmsError::InvalidDesignMatrix {
            reason: reason.to_string(),
        });
    }
    Ok(())
}

fn qr_rank(matrix: &Array2<f64>) -> usize {
    let (nrow, ncol) = matrix.dim();
    let k = nrow.min(ncol);
    let mut r = matrix.to_owned();
    let mut norms: Vec<f64> = (0..ncol).map(|j| r.column(j).dot(&r.column(j))).collect();
    let mut diag = Vec::with_capacity(k);

    for step in 0..k {
        let best = (step..ncol)
            .max_by(|&a, &b| norms[a].total_cmp(&norms[b]))
            .unwrap_or(step);
        if best != step {
            for i in 0..nrow {
                r.swap([i, step], [i, best]);
            }
            norms.swap(step, best);
        }

        let mut alpha = (step..nrow).map(|i| r[[i, step]].powi(2)).sum::<f64>().sqrt();
        if alpha < f64::EPSILON * 1e3 {
            break;
        }
        if r[[step, step]] > 0.0 {
            alpha = -alpha;
        }
        let v0 = r[[step, step]] - alpha;
        r[[step, step]] = alpha;
        diag.push(alpha.abs());

        let v_norm_sq = v0 * v0 + ((step + 1)..nrow).map(|i| r[[i, step]].powi(2)).sum::<f64>();
        if v_norm_sq < f64::MIN_POSITIVE {
            continue;
        }
        let tau = 2.0 / v_norm_sq;
        for j in (step + 1)..ncol {
            let dot = v0 * r[[step, j]]
                + ((step + 1)..nrow).map(|i| r[[i, step]] * r[[i, j]]).sum::<f64>();
            let scale = tau * dot;
            r[[step, j]] -= scale * v0;
            for i in (step + 1)..nrow {
                r[[i, j]] -= scale * r[[i, step]];
            }
            norms[j] = (norms[j] - r[[step, j]].powi(2)).max(0.0);
        }
    }

    let max_diag = diag.iter().cloned().fold(0.0f64, f64::max);
    let tol = nrow.max(ncol) as f64 * f64::EPSILON * max_diag;
    diag.iter().filter(|&&d| d > tol).count()
}
