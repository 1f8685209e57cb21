//! PerformanceAnalyzer: summary statistics of an equity curve.
//!
//! Every metric is a pure function of the equity multipliers (starting near
//! 1.0). [`analyze`] refuses series on which any metric would be NaN or
//! infinite instead of reporting them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MetricsError {
    #[error("degenerate equity series: {reason}")]
    DegenerateSeries { reason: String },
}

fn degenerate(reason: impl Into<String>) -> MetricsError {
    MetricsError::DegenerateSeries {
        reason: reason.into(),
    }
}

/// Headline strategy statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_return: f64,
    pub cagr: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
}

/// Compute all summary statistics.
///
/// `years = T / days_per_year` with `T` the number of periods; the Sharpe
/// ratio is annualized by `sqrt(annualization)`.
pub fn analyze(equity: &[f64], config: &EngineConfig) -> Result<PerformanceSummary, MetricsError> {
    let final_equity = match equity.last() {
        Some(&e) => e,
        None => return Err(degenerate("empty equity curve")),
    };
    if !final_equity.is_finite() || final_equity <= 0.0 {
        return Err(degenerate(format!("final equity {final_equity} is not positive")));
    }
    if equity.iter().any(|e| !e.is_finite() || *e <= 0.0) {
        return Err(degenerate("equity curve contains non-positive values"));
    }

    let years = equity.len() as f64 / config.days_per_year;
    Ok(PerformanceSummary {
        total_return: total_return(equity),
        cagr: cagr(final_equity, years),
        sharpe: sharpe_ratio(equity, config.annualization)?,
        max_drawdown: max_drawdown(equity),
    })
}

// ─── Individual metric functions ────────────────────────────────────

/// Final multiplier minus one. 0.0 for an empty curve.
pub fn total_return(equity: &[f64]) -> f64 {
    equity.last().map_or(0.0, |e| e - 1.0)
}

/// Compound annual growth rate of a final multiplier over `years`.
pub fn cagr(final_equity: f64, years: f64) -> f64 {
    final_equity.powf(1.0 / years) - 1.0
}

/// `e_t / e_{t-1} - 1` for t >= 1.
pub fn period_returns(equity: &[f64]) -> Vec<f64> {
    equity.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

/// Annualized Sharpe ratio of the curve's period returns (zero risk-free rate).
///
/// Fails with `DegenerateSeries` when fewer than two returns exist or their
/// standard deviation is below 1e-15.
pub fn sharpe_ratio(equity: &[f64], annualization: f64) -> Result<f64, MetricsError> {
    let returns = period_returns(equity);
    if returns.len() < 2 {
        return Err(degenerate(format!(
            "{} period returns, need at least 2",
            returns.len()
        )));
    }
    let sd = std_dev(&returns);
    if !(sd >= 1e-15) {
        return Err(degenerate("period returns have zero variance"));
    }
    Ok(mean_f64(&returns) / sd * annualization.sqrt())
}

/// Largest peak-to-trough decline as a negative fraction (0.0 if none).
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &e in equity {
        peak = peak.max(e);
        if peak > 0.0 {
            worst = worst.min(e / peak - 1.0);
        }
    }
    worst
}

// ─── Helpers ────────────────────────────────────────────────────────

fn mean_f64(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (ddof = 1).
fn std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() < tol,
            "actual={actual}, expected={expected}"
        );
    }

    #[test]
    fn total_return_and_cagr_use_calendar_years() {
        // 365 periods ending at 1.21 -> one year
        let mut equity = vec![1.0; 365];
        for (i, e) in equity.iter_mut().enumerate() {
            *e = 1.0 + 0.21 * i as f64 / 364.0;
        }
        let s = analyze(&equity, &EngineConfig::default()).unwrap();
        assert_approx(s.total_return, 0.21, 1e-12);
        assert_approx(s.cagr, 0.21, 1e-12);
        assert_eq!(s.max_drawdown, 0.0);
        assert!(s.sharpe > 0.0);
    }

    #[test]
    fn sharpe_matches_hand_computation() {
        let equity = [1.0, 1.1, 0.99, 1.089];
        // returns 0.1, -0.1, 0.1
        let mean = 0.1_f64 / 3.0;
        let var = (2.0 * (0.1 - mean).powi(2) + (-0.1 - mean).powi(2)) / 2.0;
        let expected = mean / var.sqrt() * 252.0_f64.sqrt();
        assert_approx(sharpe_ratio(&equity, 252.0).unwrap(), expected, 1e-9);
        let s = analyze(&equity, &EngineConfig::default()).unwrap();
        assert_approx(s.sharpe, expected, 1e-9);
    }

    #[test]
    fn max_drawdown_peak_to_trough() {
        let equity = [1.0, 1.2, 0.9, 1.3, 1.04];
        assert_approx(max_drawdown(&equity), 0.9 / 1.2 - 1.0, 1e-12);
    }

    #[test]
    fn constant_equity_is_degenerate() {
        let equity = vec![1.0; 50];
        assert_eq!(max_drawdown(&equity), 0.0);
        assert!(matches!(
            sharpe_ratio(&equity, 252.0),
            Err(MetricsError::DegenerateSeries { .. })
        ));
        assert!(matches!(
            analyze(&equity, &EngineConfig::default()),
            Err(MetricsError::DegenerateSeries { .. })
        ));
    }

    #[test]
    fn short_or_empty_curves_are_degenerate() {
        let cfg = EngineConfig::default();
        assert!(analyze(&[], &cfg).is_err());
        assert!(analyze(&[1.0], &cfg).is_err());
        assert!(analyze(&[1.0, 1.1], &cfg).is_err());
    }

    #[test]
    fn sharpe_of_too_few_returns_is_an_error() {
        assert!(sharpe_ratio(&[], 252.0).is_err());
        assert!(sharpe_ratio(&[1.0, 1.1], 252.0).is_err());
        assert!(sharpe_ratio(&[1.0, 1.1, 1.0], 252.0).is_ok());
    }

    #[test]
    fn wiped_out_equity_is_degenerate() {
        let cfg = EngineConfig::default();
        assert!(analyze(&[1.0, 0.5, 0.0], &cfg).is_err());
        assert!(analyze(&[1.0, f64::NAN, 1.2], &cfg).is_err());
    }

    #[test]
    fn period_returns_skip_first() {
        let r = period_returns(&[1.0, 2.0, 1.0]);
        assert_eq!(r, vec![1.0, -0.5]);
    }
}
