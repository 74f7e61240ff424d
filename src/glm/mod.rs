//! Negative binomial generalized linear model

mod design;
mod fitting;
mod negative_binomial;

pub use design::{check_full_rank, create_design_matrix, intercept_design, timepoint_coef_name, DesignInfo};
pub use fitting::{fit_glm, fit_single_variant, GlmFitParams, GlmFitResult};
pub(crate) use fitting::{crossprod_weighted, invert_symmetric_matrix, ridge_lambda, solve_symmetric_system};
pub use negative_binomial::{linear_predictor, nb_log_likelihood, nb_mean, nb_weight, MAX_ETA, MAX_LFC_BETA, MIN_MU};
