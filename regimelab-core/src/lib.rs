//! RegimeLab Core: regime detection, signal generation and backtesting.
//!
//! This crate contains the numerical pipeline, leaf first:
//! - Domain types (price series, regime labels, positions, signal records)
//! - Feature construction with a strict no-lookahead window
//! - Gaussian HMM fitted with log-space Baum-Welch, decoded with Viterbi
//! - Canonical relabeling of hidden states by volatility
//! - Signal state machine with a one-period execution delay
//! - Multi-asset backtest simulation and performance metrics
//! - Price provider trait with a Yahoo Finance adapter
//!
//! Nothing here touches the filesystem; the runner owns loading and export.

pub mod backtest;
pub mod config;
pub mod data;
pub mod domain;
pub mod features;
pub mod hmm;
pub mod labeler;
pub mod metrics;
pub mod rng;
pub mod signal;

pub use config::{ConfigError, EngineConfig};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything a per-asset worker hands across threads
    /// is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::PriceSeries>();
        require_sync::<domain::PriceSeries>();
        require_send::<domain::SignalRecord>();
        require_sync::<domain::SignalRecord>();

        // Pipeline stages
        require_send::<features::FeatureFrame>();
        require_sync::<features::FeatureFrame>();
        require_send::<hmm::RegimeModel>();
        require_sync::<hmm::RegimeModel>();
        require_send::<labeler::LabelMap>();
        require_sync::<labeler::LabelMap>();
        require_send::<signal::SignalEngine>();
        require_sync::<signal::SignalEngine>();
        require_send::<backtest::AssetTrack>();
        require_sync::<backtest::AssetTrack>();
        require_send::<backtest::BacktestOutcome>();
        require_sync::<backtest::BacktestOutcome>();

        // Errors cross thread boundaries inside per-asset results
        require_send::<features::FeatureError>();
        require_send::<hmm::ModelFitError>();
        require_send::<data::DataError>();
        require_sync::<data::DataError>();

        // Configuration and seeding
        require_send::<EngineConfig>();
        require_sync::<EngineConfig>();
        require_send::<rng::RngHierarchy>();
        require_sync::<rng::RngHierarchy>();
        require_send::<data::YahooProvider>();
        require_sync::<data::YahooProvider>();
    }

    /// Architecture contract: the signal engine sees labels only.
    ///
    /// `generate` takes the feature frame and canonical labels; it has no
    /// access to prices beyond the current record or to raw HMM states.
    #[test]
    fn signal_engine_consumes_canonical_labels() {
        fn _check(
            engine: &signal::SignalEngine,
            frame: &features::FeatureFrame,
            labels: &[domain::RegimeLabel],
        ) -> Result<Vec<domain::SignalRecord>, signal::SignalError> {
            engine.generate(frame, labels)
        }
    }
}
