//! Per-asset pipeline: features → fit → decode → relabel → signals.
//!
//! Pure with respect to its inputs: no I/O, no shared state. The runner
//! executes one pipeline per asset in parallel.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use regimelab_core::data::DataError;
use regimelab_core::domain::{PriceSeries, RegimeLabel, SignalRecord};
use regimelab_core::features::{build_features, FeatureError, FeatureFrame};
use regimelab_core::hmm::{FitReport, ModelFitError, RegimeModel};
use regimelab_core::labeler::LabelMap;
use regimelab_core::signal::{SignalEngine, SignalError};
use regimelab_core::EngineConfig;

/// A failure confined to one asset. Recorded in the report; siblings continue.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AssetError {
    #[error("data: {0}")]
    Data(#[from] DataError),

    #[error("features: {0}")]
    Features(#[from] FeatureError),

    #[error("model: {0}")]
    Model(#[from] ModelFitError),

    #[error("signals: {0}")]
    Signal(#[from] SignalError),
}

impl AssetError {
    /// Pipeline stage that failed, for reports.
    pub fn stage(&self) -> &'static str {
        match self {
            AssetError::Data(_) => "data",
            AssetError::Features(_) => "features",
            AssetError::Model(_) => "model",
            AssetError::Signal(_) => "signals",
        }
    }
}

/// Occupancy and average features of one canonical regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeStats {
    pub regime: RegimeLabel,
    pub periods: usize,
    pub mean_return: f64,
    pub mean_volatility: f64,
}

/// Everything one asset contributes to a run.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetOutcome {
    pub symbol: String,
    pub seed: u64,
    pub fit: FitReport,
    pub label_map: LabelMap,
    pub regimes: Vec<RegimeStats>,
    pub records: Vec<SignalRecord>,
}

/// Run the full per-asset pipeline on one price series.
pub fn run_asset(
    series: &PriceSeries,
    config: &EngineConfig,
    seed: u64,
) -> Result<AssetOutcome, AssetError> {
    let symbol = series.symbol();
    let frame = build_features(series, config.window)?;
    tracing::debug!(symbol, rows = frame.len(), "features built");

    let model = RegimeModel::fit(&frame, config, seed)?;
    let states = model.decode(&frame)?;
    let label_map = LabelMap::from_params(model.params());
    let labels = label_map.apply(&states);
    let records = SignalEngine::from_config(config).generate(&frame, &labels)?;

    let fit = *model.report();
    tracing::info!(
        symbol,
        converged = fit.converged,
        iterations = fit.iterations,
        log_likelihood = fit.log_likelihood,
        "regime model fitted"
    );

    Ok(AssetOutcome {
        symbol: symbol.to_string(),
        seed,
        fit,
        regimes: regime_stats(&frame, &labels, config.n_states),
        label_map,
        records,
    })
}

/// Per-regime occupancy and mean (unstandardized) return and volatility.
pub fn regime_stats(frame: &FeatureFrame, labels: &[RegimeLabel], n_states: usize) -> Vec<RegimeStats> {
    let mut counts = vec![0usize; n_states];
    let mut ret = vec![0.0; n_states];
    let mut vol = vec![0.0; n_states];
    for (record, label) in frame.records.iter().zip(labels) {
        let k = label.rank();
        if k < n_states {
            counts[k] += 1;
            ret[k] += record.ret;
            vol[k] += record.volatility;
        }
    }

    (0..n_states)
        .map(|k| {
            let n = counts[k].max(1) as f64;
            RegimeStats {
                regime: RegimeLabel(k),
                periods: counts[k],
                mean_return: ret[k] / n,
                mean_volatility: vol[k] / n,
            }
        })
        .collect()
}
