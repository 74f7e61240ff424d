//! Multiple testing correction

use std::cmp::Ordering;

fn nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}

/// Benjamini-Hochberg adjusted p-values. NaN inputs stay NaN and do not count
/// toward the number of tests.
pub fn benjamini_hochberg(pvalues: &[f64]) -> Vec<f64> {
    let n = pvalues.len();
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| nan_last(pvalues[a], pvalues[b]));

    let m = pvalues.iter().filter(|p| p.is_finite()).count();
    let mut padj = vec![f64::NAN; n];
    let mut cummin = f64::INFINITY;
    let mut rank = m;
    for &i in indices.iter().rev() {
        let p = pvalues[i];
        if p.is_finite() {
            cummin = cummin.min((p * m as f64 / rank as f64).min(1.0));
            padj[i] = cummin;
            rank -= 1;
        }
    }
    padj
}

/// BH significance flags: each p-value is compared with `alpha * k / N`,
/// where `k` is its 1-based rank by ascending p (ties keep input order) and
/// `N` counts the finite p-values. NaN is never significant.
pub fn bh_significant(pvalues: &[f64], alpha: f64) -> Vec<bool> {
    let mut order: Vec<usize> = (0..pvalues.len()).filter(|&i| pvalues[i].is_finite()).collect();
    order.sort_by(|&a, &b| nan_last(pvalues[a], pvalues[b]));
    let n_tests = order.len() as f64;

    let mut significant = vec![false; pvalues.len()];
    for (k, &i) in order.iter().enumerate() {
        significant[i] = pvalues[i] <= alpha * (k + 1) as f64 / n_tests;
    }
    significant
}
