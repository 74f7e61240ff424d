//! P-values from Wald statistics

use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

/// Direction of the alternative hypothesis for the tested coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AltHypothesis {
    /// Coefficient below zero: depletion over time
    #[default]
    Less,
    Greater,
    #[value(name = "two-sided")]
    #[serde(rename = "two-sided")]
    TwoSided,
}

/// Standard normal CDF
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / std::f64::consts::SQRT_2)
}

/// P-value of a standard normal statistic under the given alternative
pub fn calculate_pvalue(z: f64, alternative: AltHypothesis) -> f64 {
    if !z.is_finite() {
        return f64::NAN;
    }
    match alternative {
        AltHypothesis::Less => normal_cdf(z),
        AltHypothesis::Greater => normal_cdf(-z),
        AltHypothesis::TwoSided => (2.0 * normal_cdf(-z.abs())).min(1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_less_is_lower_tail() {
        assert!((calculate_pvalue(0.0, AltHypothesis::Less) - 0.5).abs() < 1e-12);
        assert!((calculate_pvalue(-1.959_963_985, AltHypothesis::Less) - 0.025).abs() < 1e-8);
        assert!(calculate_pvalue(3.0, AltHypothesis::Less) > 0.99);
    }

    #[test]
    fn test_one_sided_tails_sum_to_one() {
        for z in [-2.5, -0.3, 0.0, 1.7] {
            let total = calculate_pvalue(z, AltHypothesis::Less) + calculate_pvalue(z, AltHypothesis::Greater);
            assert!((total - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_two_sided_symmetric() {
        let p1 = calculate_pvalue(2.0, AltHypothesis::TwoSided);
        let p2 = calculate_pvalue(-2.0, AltHypothesis::TwoSided);
        assert!((p1 - p2).abs() < 1e-12);
        assert!((calculate_pvalue(0.0, AltHypothesis::TwoSided) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_nan_statistic() {
        assert!(calculate_pvalue(f64::NAN, AltHypothesis::Less).is_nan());
    }
}
