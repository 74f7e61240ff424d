//! Hypothesis testing and multiple testing correction

mod fdr;
mod pvalue;
mod wald;

pub use fdr::{benjamini_hochberg, bh_significant};
pub use pvalue::{calculate_pvalue, normal_cdf, AltHypothesis};
pub use wald::wald_test;
