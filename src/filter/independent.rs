//! Independent filtering on mean abundance before BH adjustment
//!
//! A grid of 50 base-mean quantile cutoffs is scanned; for each the BH
//! rejections at `alpha` are counted. The rejection curve is smoothed with
//! lowess and the first cutoff whose count exceeds the smoothed maximum
//! minus the residual RMSE is chosen. Rows below the cutoff get NaN padj.

use crate::io::WaldResults;
use crate::testing::benjamini_hochberg;

const N_THETA: usize = 50;

/// Replace `results.padj` with BH values after filtering on base mean.
/// Returns the chosen base-mean cutoff.
pub fn independent_filtering(results: &mut WaldResults, alpha: f64) -> f64 {
    let n = results.n_variants();
    if n == 0 {
        return 0.0;
    }

    let mut sorted_means: Vec<f64> = results.base_means.iter().copied().filter(|m| m.is_finite()).collect();
    if sorted_means.is_empty() {
        return 0.0;
    }
    sorted_means.sort_by(|a, b| a.total_cmp(b));

    let n_zero = results.base_means.iter().filter(|&&m| m == 0.0 || !m.is_finite()).count();
    let lower = n_zero as f64 / n as f64;
    let upper = if lower < 0.95 { 0.95 } else { 1.0 };
    let thetas: Vec<f64> = (0..N_THETA)
        .map(|i| lower + (upper - lower) * i as f64 / (N_THETA - 1) as f64)
        .collect();
    let cutoffs: Vec<f64> = thetas.iter().map(|&t| quantile_type7(&sorted_means, t)).collect();

    let mut candidates: Vec<Vec<f64>> = Vec::with_capacity(N_THETA);
    let mut num_rej: Vec<usize> = Vec::with_capacity(N_THETA);
    for &cutoff in &cutoffs {
        let kept: Vec<f64> = results
            .pvalues
            .iter()
            .zip(&results.base_means)
            .map(|(&p, &m)| if m >= cutoff && p.is_finite() { p } else { f64::NAN })
            .collect();
        let padj = benjamini_hochberg(&kept);
        num_rej.push(padj.iter().filter(|&&p| p < alpha).count());
        candidates.push(padj);
    }

    let max_rej = num_rej.iter().copied().max().unwrap_or(0);
    let chosen = if max_rej <= 10 {
        0
    } else {
        select_theta(&thetas, &num_rej)
    };

    log::debug!(
        "independent filtering: theta {:.3}, base mean cutoff {:.3}, {} rejections",
        thetas[chosen],
        cutoffs[chosen],
        num_rej[chosen]
    );
    results.padj = candidates.swap_remove(chosen);
    cutoffs[chosen]
}

/// First theta whose rejections exceed the lowess maximum minus the RMSE,
/// relaxing to 90% and then 80% of the maximum when nothing qualifies
fn select_theta(thetas: &[f64], num_rej: &[usize]) -> usize {
    let rej: Vec<f64> = num_rej.iter().map(|&r| r as f64).collect();
    let fit = lowess(thetas, &rej, 0.2, 3);
    let max_fit = fit.iter().copied().fold(f64::MIN, f64::max);

    let residuals: Vec<f64> = rej
        .iter()
        .zip(&fit)
        .filter(|(&r, _)| r > 0.0)
        .map(|(&r, &f)| r - f)
        .collect();
    let rmse = if residuals.is_empty() {
        0.0
    } else {
        (residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64).sqrt()
    };

    [max_fit - rmse, 0.9 * max_fit, 0.8 * max_fit]
        .iter()
        .find_map(|&threshold| rej.iter().position(|&r| r > threshold))
        .unwrap_or(0)
}

/// Sample quantile with linear interpolation (R type 7) of sorted data
fn quantile_type7(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    let h = (n - 1) as f64 * p;
    let lo = (h.floor() as usize).min(n - 1);
    let hi = (h.ceil() as usize).min(n - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Locally weighted linear regression with tricube weights and bisquare
/// robustness iterations over x-sorted data. Points closer than 1% of the
/// x range to the last fitted point are linearly interpolated.
fn lowess(x: &[f64], y: &[f64], f: f64, robustness_iters: usize) -> Vec<f64> {
    let n = x.len();
    if n < 2 {
        return y.to_vec();
    }
    let delta = 0.01 * (x[n - 1] - x[0]);
    let span = ((f * n as f64 + 1e-7) as usize).clamp(2, n);

    let mut fitted = vec![0.0; n];
    let mut robustness = vec![1.0; n];
    let mut weights = vec![0.0; n];

    for iter in 0..=robustness_iters {
        let use_robustness = iter > 0;
        let mut left = 0;
        let mut right = span - 1;
        let mut last: Option<usize> = None;
        let mut i = 0;

        loop {
            while right < n - 1 && x[i] - x[left] > x[right + 1] - x[i] {
                left += 1;
                right += 1;
            }

            fitted[i] = local_fit(x, y, x[i], left, right, &mut weights, use_robustness, &robustness)
                .unwrap_or(y[i]);

            if let Some(prev) = last {
                if prev + 1 < i {
                    let span_x = x[i] - x[prev];
                    for j in (prev + 1)..i {
                        let t = (x[j] - x[prev]) / span_x;
                        fitted[j] = t * fitted[i] + (1.0 - t) * fitted[prev];
                    }
                }
            }
            last = Some(i);

            let cut = x[i] + delta;
            let anchor = i;
            let mut next = i + 1;
            while next < n && x[next] <= cut {
                if x[next] == x[anchor] {
                    fitted[next] = fitted[anchor];
                    last = Some(next);
                }
                next += 1;
            }
            let last_idx = last.unwrap_or(anchor);
            i = (last_idx + 1).max(next - 1);
            if last_idx >= n - 1 {
                break;
            }
        }

        let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(a, b)| a - b).collect();
        if iter == robustness_iters {
            break;
        }

        let mean_abs = residuals.iter().map(|r| r.abs()).sum::<f64>() / n as f64;
        let mut abs_res: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
        abs_res.sort_by(|a, b| a.total_cmp(b));
        let cmad = if n % 2 == 0 {
            3.0 * (abs_res[n / 2] + abs_res[n / 2 - 1])
        } else {
            6.0 * abs_res[n / 2]
        };
        if cmad < 1e-7 * mean_abs {
            break;
        }
        for (w, r) in robustness.iter_mut().zip(&residuals) {
            let r = r.abs();
            *w = if r <= 0.001 * cmad {
                1.0
            } else if r <= 0.999 * cmad {
                let u = r / cmad;
                (1.0 - u * u).powi(2)
            } else {
                0.0
            };
        }
    }
    fitted
}

/// Weighted local linear fit at `xs` over the window `left..=right`
#[allow(clippy::too_many_arguments)]
fn local_fit(
    x: &[f64],
    y: &[f64],
    xs: f64,
    left: usize,
    right: usize,
    w: &mut [f64],
    use_robustness: bool,
    robustness: &[f64],
) -> Option<f64> {
    let n = x.len();
    let range = x[n - 1] - x[0];
    let h = (xs - x[left]).max(x[right] - xs);
    let (h_hi, h_lo) = (0.999 * h, 0.001 * h);

    let mut total = 0.0;
    let mut j = left;
    while j < n {
        w[j] = 0.0;
        let r = (x[j] - xs).abs();
        if r <= h_hi {
            w[j] = if r <= h_lo {
                1.0
            } else {
                let u = r / h;
                (1.0 - u * u * u).powi(3)
            };
            if use_robustness {
                w[j] *= robustness[j];
            }
            total += w[j];
        } else if x[j] > xs {
            break;
        }
        j += 1;
    }
    let end = j - 1;
    if total <= 0.0 {
        return None;
    }
    for wj in &mut w[left..=end] {
        *wj /= total;
    }

    if h > 0.0 {
        let center: f64 = (left..=end).map(|k| w[k] * x[k]).sum();
        let spread: f64 = (left..=end).map(|k| w[k] * (x[k] - center).powi(2)).sum();
        if spread.sqrt() > 0.001 * range {
            let slope = (xs - center) / spread;
            for k in left..=end {
                w[k] *= slope * (x[k] - center) + 1.0;
            }
        }
    }
    Some((left..=end).map(|k| w[k] * y[k]).sum())
}
