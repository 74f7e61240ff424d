//! Negative binomial helpers shared by the GLM, dispersion and shrinkage code

use statrs::function::gamma::ln_gamma;

/// Lower bound on fitted means during IRLS
pub const MIN_MU: f64 = 0.5;

/// Any |beta| beyond this (natural-log scale, as IRLS works) stops IRLS and
/// sends the row to the fallback, whose steps are clamped to it
pub const MAX_LFC_BETA: f64 = 30.0;

/// Linear predictor clamp, exp(700) is near f64::MAX
pub const MAX_ETA: f64 = 700.0;

/// mu = size_factor * exp(eta)
pub fn nb_mean(eta: f64, size_factor: f64) -> f64 {
    size_factor * eta.clamp(-MAX_ETA, MAX_ETA).exp()
}

/// IRLS weight mu / (1 + alpha * mu)
pub fn nb_weight(mu: f64, alpha: f64) -> f64 {
    mu / (1.0 + alpha * mu)
}

/// Log density of NB(mean = mu, size = 1/alpha) at y
pub fn nb_log_likelihood(y: f64, mu: f64, alpha: f64) -> f64 {
    if mu <= 0.0 || alpha <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let size = 1.0 / alpha;
    let prob = size / (size + mu);
    ln_gamma(y + size) - ln_gamma(size) - ln_gamma(y + 1.0) + size * prob.ln() + y * (1.0 - prob).ln()
}

/// Linear predictor x_i . beta for every sample
pub fn linear_predictor(design: &ndarray::Array2<f64>, beta: &[f64]) -> Vec<f64> {
    design
        .rows()
        .into_iter()
        .map(|row| row.iter().zip(beta).map(|(x, b)| x * b).sum())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nb_mean() {
        assert!((nb_mean(2.0, 1.5) - 1.5 * 2.0_f64.exp()).abs() < 1e-10);
        assert!(nb_mean(1e6, 1.0).is_finite());
    }

    #[test]
    fn test_nb_log_likelihood_approaches_poisson() {
        // Poisson(5) at 5: 5 ln 5 - 5 - ln 120
        let poisson = 5.0 * 5.0_f64.ln() - 5.0 - 120.0_f64.ln();
        let ll = nb_log_likelihood(5.0, 5.0, 1e-8);
        assert!((ll - poisson).abs() < 1e-5);
    }

    #[test]
    fn test_nb_weight() {
        assert!((nb_weight(10.0, 0.1) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_linear_predictor() {
        let x = ndarray::array![[1.0, 0.0], [1.0, 1.0]];
        assert_eq!(linear_predictor(&x, &[2.0, -1.0]), vec![2.0, 1.0]);
    }
}
