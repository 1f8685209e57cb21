//! Diagonal-covariance Gaussian emission density.

use serde::{Deserialize, Serialize};

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Gaussian with independent components: one mean and one variance per feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagGaussian {
    pub mean: Vec<f64>,
    pub var: Vec<f64>,
}

impl DiagGaussian {
    pub fn new(mean: Vec<f64>, var: Vec<f64>) -> Self {
        debug_assert_eq!(mean.len(), var.len());
        Self { mean, var }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Log density at `x`.
    pub fn log_pdf(&self, x: &[f64]) -> f64 {
        self.mean
            .iter()
            .zip(&self.var)
            .zip(x)
            .map(|((m, v), xi)| -0.5 * (LN_2PI + v.ln() + (xi - m).powi(2) / v))
            .sum()
    }

    /// Re-estimate from posterior weights over the observation rows.
    ///
    /// Returns `None` when the total weight is too small to say anything; the
    /// caller keeps the previous parameters in that case.
    pub fn weighted(
        observations: &[Vec<f64>],
        weights: impl Iterator<Item = f64> + Clone,
        covars_prior: f64,
        min_covar: f64,
    ) -> Option<Self> {
        let total: f64 = weights.clone().sum();
        if total < 1e-10 {
            return None;
        }
        let d = observations.first()?.len();

        let mut mean = vec![0.0; d];
        for (row, w) in observations.iter().zip(weights.clone()) {
            for (m, x) in mean.iter_mut().zip(row) {
                *m += w * x;
            }
        }
        for m in &mut mean {
            *m /= total;
        }

        let mut sq = vec![0.0; d];
        for (row, w) in observations.iter().zip(weights) {
            for ((s, x), m) in sq.iter_mut().zip(row).zip(&mean) {
                *s += w * (x - m).powi(2);
            }
        }
        let denom = total.max(1e-5);
        let var = sq
            .into_iter()
            .map(|s| ((covars_prior + s) / denom).max(min_covar))
            .collect();

        Some(Self { mean, var })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_normal_log_pdf_at_zero() {
        let g = DiagGaussian::new(vec![0.0], vec![1.0]);
        assert!((g.log_pdf(&[0.0]) + 0.5 * LN_2PI).abs() < 1e-12);
    }

    #[test]
    fn log_pdf_sums_over_dimensions() {
        let one = DiagGaussian::new(vec![1.0], vec![2.0]);
        let two = DiagGaussian::new(vec![1.0, 1.0], vec![2.0, 2.0]);
        let lp1 = one.log_pdf(&[0.5]);
        assert!((two.log_pdf(&[0.5, 0.5]) - 2.0 * lp1).abs() < 1e-12);
    }

    #[test]
    fn weighted_estimate_matches_selected_rows() {
        let obs = vec![vec![1.0], vec![3.0], vec![100.0]];
        let g = DiagGaussian::weighted(&obs, [1.0, 1.0, 0.0].into_iter(), 0.0, 1e-6).unwrap();
        assert!((g.mean[0] - 2.0).abs() < 1e-12);
        assert!((g.var[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn weighted_applies_floor() {
        let obs = vec![vec![5.0], vec![5.0]];
        let g = DiagGaussian::weighted(&obs, [1.0, 1.0].into_iter(), 0.0, 1e-3).unwrap();
        assert_eq!(g.var[0], 1e-3);
    }

    #[test]
    fn zero_weight_returns_none() {
        let obs = vec![vec![5.0]];
        assert!(DiagGaussian::weighted(&obs, [0.0].into_iter(), 0.0, 1e-3).is_none());
    }
}
