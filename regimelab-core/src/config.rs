//! Engine configuration shared by every pipeline stage.
//!
//! Window size, state count, EM controls, fee rate and annualization constants
//! are passed explicitly into each component rather than hard-coded, so tests
//! can use small windows and two-state models.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from validating an [`EngineConfig`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("window must be >= 2, got {0}")]
    WindowTooSmall(usize),

    #[error("n_states must be 2 or 3, got {0}")]
    UnsupportedStateCount(usize),

    #[error("max_iter must be >= 1")]
    ZeroIterations,

    #[error("{name} must be finite and positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("fee_rate must be in [0, 1), got {0}")]
    FeeOutOfRange(f64),
}

/// Parameters for one regime-detection run over a single asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Trailing window (periods) for rolling volatility and mean return.
    pub window: usize,
    /// Number of hidden states in the HMM.
    pub n_states: usize,
    /// EM iteration cap.
    pub max_iter: usize,
    /// Stop EM when the log-likelihood gain drops below this.
    pub tol: f64,
    /// Floor applied to every emission variance.
    pub min_covar: f64,
    /// Additive prior on the emission variance numerator.
    pub covars_prior: f64,
    /// Master seed for parameter initialization.
    pub seed: u64,
    /// Proportional fee charged on position changes.
    pub fee_rate: f64,
    /// Periods per year used to annualize the Sharpe ratio.
    pub annualization: f64,
    /// Calendar days per year used for CAGR.
    pub days_per_year: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window: 30,
            n_states: 3,
            max_iter: 1000,
            tol: 1e-2,
            min_covar: 1e-3,
            covars_prior: 1e-2,
            seed: 42,
            fee_rate: 0.001,
            annualization: 252.0,
            days_per_year: 365.0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window < 2 {
            return Err(ConfigError::WindowTooSmall(self.window));
        }
        if !(2..=3).contains(&self.n_states) {
            return Err(ConfigError::UnsupportedStateCount(self.n_states));
        }
        if self.max_iter == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        for (name, value) in [
            ("tol", self.tol),
            ("min_covar", self.min_covar),
            ("annualization", self.annualization),
            ("days_per_year", self.days_per_year),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        if !self.covars_prior.is_finite() || self.covars_prior < 0.0 {
            return Err(ConfigError::NonPositive {
                name: "covars_prior",
                value: self.covars_prior,
            });
        }
        if !(0.0..1.0).contains(&self.fee_rate) {
            return Err(ConfigError::FeeOutOfRange(self.fee_rate));
        }
        Ok(())
    }

    /// Canonical label of the high-volatility regime.
    pub fn high_regime(&self) -> usize {
        self.n_states - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_four_states() {
        let config = EngineConfig {
            n_states: 4,
            ..EngineConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnsupportedStateCount(4))
        );
    }

    #[test]
    fn rejects_fee_of_one() {
        let config = EngineConfig {
            fee_rate: 1.0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FeeOutOfRange(_))
        ));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"window": 10}"#).unwrap();
        assert_eq!(config.window, 10);
        assert_eq!(config.n_states, 3);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn high_regime_is_last_rank() {
        assert_eq!(EngineConfig::default().high_regime(), 2);
    }
}
