//! RegimeLab Runner: run orchestration, price loading, reports and artifacts.
//!
//! This crate builds on `regimelab-core` to provide:
//! - TOML run configuration with a content-addressed run id
//! - Price loading with retry/backoff, a CSV price store, and synthetic prices
//! - Per-asset regime pipelines executed in parallel
//! - Merged backtest, performance summary and buy-and-hold benchmarks
//! - JSON, CSV and Markdown artifact export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod pipeline;
pub mod report;
pub mod runner;

pub use config::{ConfigError, RetryConfig, RunConfig, RunId};
pub use data_loader::{
    dataset_hash, fetch_prices, fetch_with_retry, CsvPriceStore, PriceRequest, RetryPolicy,
    SyntheticProvider,
};
pub use export::{save_artifacts, ArtifactPaths};
pub use pipeline::{run_asset, AssetError, AssetOutcome, RegimeStats};
pub use report::{AssetFailure, OutputRecord, RunReport, SCHEMA_VERSION};
pub use runner::{run_pipeline, run_with_prices, RunError};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn run_config_is_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
    }

    #[test]
    fn asset_outcome_is_send_sync() {
        assert_send::<AssetOutcome>();
        assert_sync::<AssetOutcome>();
        assert_send::<AssetError>();
    }

    #[test]
    fn run_report_is_send_sync() {
        assert_send::<RunReport>();
        assert_sync::<RunReport>();
    }

    #[test]
    fn providers_are_send_sync() {
        assert_send::<CsvPriceStore>();
        assert_sync::<CsvPriceStore>();
        assert_send::<SyntheticProvider>();
        assert_sync::<SyntheticProvider>();
    }
}
