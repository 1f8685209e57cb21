//! Run orchestration: wires loading, per-asset pipelines, backtest and metrics.
//!
//! Two entry points:
//! - `run_pipeline()`: loads prices from a provider (with retry), then runs. Used by CLI.
//! - `run_with_prices()`: takes pre-loaded per-symbol results. No I/O.
//!
//! Per-asset failures (data, features, model) are recorded in the report and
//! the remaining assets carry on. Backtest and metrics failures abort the run.

use std::collections::BTreeMap;

use rayon::prelude::*;
use thiserror::Error;

use regimelab_core::backtest::{align_assets, simulate, AssetTrack, BacktestError};
use regimelab_core::data::{DataError, DataSource, Interval, PriceProvider};
use regimelab_core::domain::PriceSeries;
use regimelab_core::features::min_prices;
use regimelab_core::metrics::{analyze, MetricsError};
use regimelab_core::rng::RngHierarchy;

use crate::config::{ConfigError, RunConfig};
use crate::data_loader::{dataset_hash, fetch_prices, PriceRequest, RetryPolicy};
use crate::pipeline::{run_asset, AssetError, AssetOutcome};
use crate::report::{
    build_benchmarks, build_diagnostics, build_records, AssetFailure, RunReport, SCHEMA_VERSION,
};

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("no asset produced signals ({} failed)", failures.len())]
    NoSuccessfulAssets { failures: Vec<AssetFailure> },

    #[error("backtest error: {0}")]
    Backtest(#[from] BacktestError),

    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),
}

/// Load prices through `provider`, then run.
pub fn run_pipeline(config: &RunConfig, provider: &dyn PriceProvider) -> Result<RunReport, RunError> {
    config.validate()?;

    let request = PriceRequest {
        start: config.start,
        end: config.end,
        interval: config.interval,
        min_points: min_prices(config.engine.window),
    };
    let policy = RetryPolicy::from(&config.retry);
    tracing::info!(
        provider = provider.name(),
        symbols = ?config.symbols,
        start = %config.start,
        end = %config.end,
        interval = %config.interval,
        "loading prices"
    );
    let loaded = fetch_prices(provider, &config.symbols, &request, &policy);

    run_with_prices(config, loaded, provider.source())
}

/// Run on pre-loaded prices. Symbols are processed in configuration order.
pub fn run_with_prices(
    config: &RunConfig,
    mut loaded: BTreeMap<String, Result<PriceSeries, DataError>>,
    source: DataSource,
) -> Result<RunReport, RunError> {
    config.validate()?;
    if config.interval == Interval::Hourly {
        tracing::warn!(
            annualization = config.engine.annualization,
            "hourly data: Sharpe ratio is still annualized with the daily factor"
        );
    }

    let mut inputs: Vec<(String, Result<PriceSeries, DataError>)> = config
        .symbols
        .iter()
        .map(|symbol| {
            let entry = loaded.remove(symbol).unwrap_or_else(|| {
                Err(DataError::unavailable(symbol, "not loaded"))
            });
            (symbol.clone(), entry)
        })
        .collect();

    let hash = dataset_hash(inputs.iter().filter_map(|(_, r)| r.as_ref().ok()));

    let seeds = RngHierarchy::new(config.engine.seed);
    let results: Vec<(String, Result<AssetOutcome, AssetError>)> = inputs
        .par_drain(..)
        .map(|(symbol, loaded)| {
            let seed = seeds.sub_seed(&symbol, 0);
            let result = loaded
                .map_err(AssetError::from)
                .and_then(|series| run_asset(&series, &config.engine, seed));
            (symbol, result)
        })
        .collect();

    let mut outcomes = Vec::new();
    let mut failures = Vec::new();
    for (symbol, result) in results {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                tracing::warn!(symbol = %symbol, stage = e.stage(), error = %e, "asset failed");
                failures.push(AssetFailure::new(symbol, &e));
            }
        }
    }
    if outcomes.is_empty() {
        return Err(RunError::NoSuccessfulAssets { failures });
    }

    let tracks: Vec<AssetTrack> = outcomes
        .iter()
        .map(|o| AssetTrack::new(o.symbol.clone(), o.records.clone()))
        .collect();
    let book = align_assets(&tracks)?;
    let outcome = simulate(&book, config.engine.fee_rate)?;
    let summary = analyze(&outcome.equity, &config.engine)?;

    tracing::info!(
        periods = outcome.len(),
        total_return = summary.total_return,
        cagr = summary.cagr,
        sharpe = summary.sharpe,
        max_drawdown = summary.max_drawdown,
        trades = outcome.total_trades(),
        failed_assets = failures.len(),
        "run complete"
    );

    Ok(RunReport {
        schema_version: SCHEMA_VERSION,
        run_id: config.run_id(),
        dataset_hash: hash,
        data_source: source,
        interval: config.interval,
        records: build_records(&book, &outcome, &outcomes),
        summary,
        benchmarks: build_benchmarks(&outcome),
        assets: build_diagnostics(&outcome, &outcomes),
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use regimelab_core::EngineConfig;

    use crate::data_loader::SyntheticProvider;

    fn config(symbols: &[&str]) -> RunConfig {
        RunConfig {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
            engine: EngineConfig {
                window: 20,
                max_iter: 200,
                ..EngineConfig::default()
            },
            ..RunConfig::default()
        }
    }

    #[test]
    fn runs_two_synthetic_assets() {
        let report = run_pipeline(&config(&["BTC-USD", "ETH-USD"]), &SyntheticProvider).unwrap();
        assert!(report.failures.is_empty());
        assert_eq!(report.assets.len(), 2);
        assert_eq!(report.benchmarks.len(), 2);
        assert_eq!(report.records.len(), 365 - 20 - 1);
        assert_eq!(report.records[0].strategy_cumulative, 1.0);
        assert!(report.is_synthetic());
        for r in &report.records {
            assert_eq!(r.assets.len(), 2);
            assert_eq!(r.assets[0].symbol, "BTC-USD");
        }
    }

    #[test]
    fn missing_asset_is_recorded_not_fatal() {
        let cfg = config(&["BTC-USD", "ETH-USD"]);
        let mut loaded = BTreeMap::new();
        loaded.insert(
            "BTC-USD".to_string(),
            SyntheticProvider
                .fetch("BTC-USD", cfg.start, cfg.end, cfg.interval),
        );
        loaded.insert(
            "ETH-USD".to_string(),
            Err(DataError::unavailable("ETH-USD", "exchange offline")),
        );

        let report = run_with_prices(&cfg, loaded, DataSource::Synthetic).unwrap();
        assert_eq!(report.assets.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].symbol, "ETH-USD");
        assert_eq!(report.failures[0].stage, "data");
    }

    #[test]
    fn all_assets_failing_aborts() {
        let cfg = config(&["BTC-USD"]);
        let err = run_with_prices(&cfg, BTreeMap::new(), DataSource::Synthetic).unwrap_err();
        match err {
            RunError::NoSuccessfulAssets { failures } => assert_eq!(failures.len(), 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_config_is_rejected_before_loading() {
        let mut cfg = config(&["BTC-USD"]);
        cfg.engine.window = 1;
        assert!(matches!(
            run_pipeline(&cfg, &SyntheticProvider),
            Err(RunError::Config(_))
        ));
    }
}
