//! Running-sum enrichment curves and their permutation statistics

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::rng::RMersenneTwister;

/// Statistic summarising one curve
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScoreMode {
    /// Mean of the curve
    #[default]
    Auc,
    /// Most extreme value of the curve
    Max,
}

impl ScoreMode {
    pub fn name(&self) -> &'static str {
        match self {
            ScoreMode::Auc => "auc",
            ScoreMode::Max => "max",
        }
    }
}

/// Per-peptide steps for `acid`: `+1/m` at each of the `m` hits and
/// `-1/(n-m)` elsewhere. Empty when there is no hit.
pub fn step_vector(column: &[char], acid: char) -> Vec<f64> {
    let n = column.len();
    let m = column.iter().filter(|&&c| c == acid).count();
    if m == 0 {
        return Vec::new();
    }
    let hit = 1.0 / m as f64;
    let miss = if n > m { -1.0 / (n - m) as f64 } else { 0.0 };
    column.iter().map(|&c| if c == acid { hit } else { miss }).collect()
}

pub fn cumulative_sum(steps: &[f64]) -> Vec<f64> {
    steps
        .iter()
        .scan(0.0, |acc, &s| {
            *acc += s;
            Some(*acc)
        })
        .collect()
}

/// Running sum of the steps down the ranking
pub fn enrichment_curve(column: &[char], acid: char) -> Vec<f64> {
    cumulative_sum(&step_vector(column, acid))
}

/// Curve value of largest magnitude, the first one on ties
pub fn enrichment_score(curve: &[f64]) -> f64 {
    let mut best = f64::NAN;
    for &v in curve {
        if best.is_nan() || v.abs() > best.abs() {
            best = v;
        }
    }
    best
}

pub fn enrichment_auc(curve: &[f64]) -> f64 {
    if curve.is_empty() {
        return f64::NAN;
    }
    curve.iter().sum::<f64>() / curve.len() as f64
}

pub fn score_curve(curve: &[f64], mode: ScoreMode) -> f64 {
    match mode {
        ScoreMode::Auc => enrichment_auc(curve),
        ScoreMode::Max => enrichment_score(curve),
    }
}

/// Scores of `n_perm` successive shuffles of the step vector
pub fn permutation_null(steps: &[f64], n_perm: usize, mode: ScoreMode, rng: &mut RMersenneTwister) -> Vec<f64> {
    if steps.is_empty() {
        return Vec::new();
    }
    let mut current = steps.to_vec();
    (0..n_perm)
        .map(|_| {
            current = rng.shuffle(&current);
            score_curve(&cumulative_sum(&current), mode)
        })
        .collect()
}

/// (obs - mean) / sd with the population SD of the null
pub fn zscore(observed: f64, null: &[f64]) -> f64 {
    if null.is_empty() {
        return f64::NAN;
    }
    let n = null.len() as f64;
    let mean = null.iter().sum::<f64>() / n;
    let sd = (null.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
    (observed - mean) / sd
}

/// Fraction of null values at least as extreme as the observation in
/// absolute value; 1 when the null is empty
pub fn twosided_pvalue(observed: f64, null: &[f64]) -> f64 {
    if null.is_empty() {
        return 1.0;
    }
    let extreme = null.iter().filter(|x| x.abs() >= observed.abs()).count();
    extreme as f64 / null.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_returns_to_zero() {
        let column: Vec<char> = "AKKAKKKA".chars().collect();
        let curve = enrichment_curve(&column, 'A');
        assert_eq!(curve.len(), 8);
        assert!((curve[0] - 1.0 / 3.0).abs() < 1e-12);
        assert!((curve[1] - (1.0 / 3.0 - 0.2)).abs() < 1e-12);
        assert!(curve[7].abs() < 1e-12);
    }

    #[test]
    fn test_no_hits_and_all_hits() {
        let column: Vec<char> = "KKK".chars().collect();
        let empty = enrichment_curve(&column, 'A');
        assert!(empty.is_empty());
        assert!(enrichment_auc(&empty).is_nan());
        assert!(enrichment_score(&empty).is_nan());

        let all = enrichment_curve(&column, 'K');
        assert_eq!(all.len(), 3);
        assert!((all[2] - 1.0).abs() < 1e-12);
        assert!((enrichment_auc(&all) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_score_picks_first_extreme() {
        assert_eq!(enrichment_score(&[0.2, -0.5, 0.5, 0.1]), -0.5);
        assert_eq!(score_curve(&[0.2, 0.4], ScoreMode::Max), 0.4);
        assert!((score_curve(&[0.2, 0.4], ScoreMode::Auc) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_top_ranked_hits_give_positive_auc() {
        let column: Vec<char> = "AAAKKKKKKK".chars().collect();
        assert!(enrichment_auc(&enrichment_curve(&column, 'A')) > 0.0);
        assert!(enrichment_auc(&enrichment_curve(&column, 'K')) < 0.0);
    }

    #[test]
    fn test_null_reproducible_for_seed() {
        let steps = step_vector(&"AKKAKKKAKK".chars().collect::<Vec<_>>(), 'A');
        let a = permutation_null(&steps, 50, ScoreMode::Auc, &mut RMersenneTwister::new(7));
        let b = permutation_null(&steps, 50, ScoreMode::Auc, &mut RMersenneTwister::new(7));
        let c = permutation_null(&steps, 50, ScoreMode::Auc, &mut RMersenneTwister::new(8));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(permutation_null(&[], 50, ScoreMode::Auc, &mut RMersenneTwister::new(7)).is_empty());
    }

    #[test]
    fn test_pvalue_bounds_and_zscore() {
        let null = [0.1, -0.2, 0.3, -0.4];
        assert_eq!(twosided_pvalue(0.0, &null), 1.0);
        assert_eq!(twosided_pvalue(0.25, &null), 0.5);
        assert_eq!(twosided_pvalue(1.0, &null), 0.0);
        assert_eq!(twosided_pvalue(1.0, &[]), 1.0);

        let z = zscore(2.0, &[1.0, 3.0]);
        assert!((z - 0.0).abs() < 1e-12);
        assert!((zscore(4.0, &[1.0, 3.0]) - 2.0).abs() < 1e-12);
        assert!(zscore(1.0, &[]).is_nan());
    }
}
