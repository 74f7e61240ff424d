//! Log fold change shrinkage
//!
//! Only the apeglm estimator is provided: a Cauchy prior on the tested
//! coefficient, posterior mode by L-BFGS and a Laplace posterior SD.

mod apeglm;

pub use apeglm::{shrink_lfc_apeglm, ApeglmParams};
