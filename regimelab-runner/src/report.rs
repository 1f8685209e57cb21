//! Run report: the output contract of a full run.
//!
//! One [`OutputRecord`] per timestamp of the merged timeline, the strategy
//! summary, buy-and-hold benchmarks, per-asset diagnostics, and the assets
//! that failed along the way.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use regimelab_core::backtest::{AlignedBook, BacktestOutcome};
use regimelab_core::data::{DataSource, Interval};
use regimelab_core::domain::{Action, PositionState, RegimeLabel};
use regimelab_core::hmm::FitReport;
use regimelab_core::metrics::PerformanceSummary;
use regimelab_core::signal::combine_actions;

use crate::config::RunId;
use crate::pipeline::{AssetError, AssetOutcome, RegimeStats};

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

/// One asset's state at one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSnapshot {
    pub symbol: String,
    /// `None` where the asset has no observation at this timestamp.
    pub regime: Option<RegimeLabel>,
    pub position: PositionState,
    pub action: Action,
    pub buy_hold_cumulative: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub timestamp: NaiveDateTime,
    pub assets: Vec<AssetSnapshot>,
    pub combined_action: String,
    pub strategy_return: f64,
    pub strategy_cumulative: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    pub symbol: String,
    pub total_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDiagnostics {
    pub symbol: String,
    pub seed: u64,
    pub fit: FitReport,
    /// Canonical label of each raw HMM state, in raw-state order.
    pub label_map: Vec<usize>,
    pub regimes: Vec<RegimeStats>,
    pub trade_count: usize,
    pub records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetFailure {
    pub symbol: String,
    pub stage: String,
    pub message: String,
}

impl AssetFailure {
    pub fn new(symbol: impl Into<String>, error: &AssetError) -> Self {
        Self {
            symbol: symbol.into(),
            stage: error.stage().to_string(),
            message: error.to_string(),
        }
    }
}

/// Complete result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub dataset_hash: String,
    pub data_source: DataSource,
    pub interval: Interval,
    pub records: Vec<OutputRecord>,
    pub summary: PerformanceSummary,
    pub benchmarks: Vec<BenchmarkSummary>,
    pub assets: Vec<AssetDiagnostics>,
    pub failures: Vec<AssetFailure>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl RunReport {
    pub fn is_synthetic(&self) -> bool {
        self.data_source == DataSource::Synthetic
    }

    pub fn total_trades(&self) -> usize {
        self.assets.iter().map(|a| a.trade_count).sum()
    }

    /// Records where at least one asset acted.
    pub fn actions(&self) -> impl Iterator<Item = &OutputRecord> {
        self.records.iter().filter(|r| r.combined_action != "hold")
    }
}

/// Assemble per-timestamp output records from the merged book and backtest.
///
/// `outcomes` must be in the same order as the book's assets.
pub fn build_records(
    book: &AlignedBook,
    outcome: &BacktestOutcome,
    outcomes: &[AssetOutcome],
) -> Vec<OutputRecord> {
    (0..book.len())
        .map(|t| {
            let assets: Vec<AssetSnapshot> = book
                .assets
                .iter()
                .zip(outcomes)
                .zip(&outcome.benchmarks)
                .map(|((aligned, asset), bench)| {
                    let record = aligned.record_index[t].map(|i| &asset.records[i]);
                    AssetSnapshot {
                        symbol: aligned.symbol.clone(),
                        regime: record.map(|r| r.regime),
                        position: aligned.positions[t],
                        action: record.map_or(Action::Hold, |r| r.action),
                        buy_hold_cumulative: bench.equity[t],
                    }
                })
                .collect();

            let actions: Vec<(&str, Action)> = assets
                .iter()
                .map(|a| (a.symbol.as_str(), a.action))
                .collect();

            OutputRecord {
                timestamp: book.timestamps[t],
                combined_action: combine_actions(&actions),
                assets,
                strategy_return: outcome.strategy_returns[t],
                strategy_cumulative: outcome.equity[t],
            }
        })
        .collect()
}

/// Per-asset diagnostics, joining pipeline outcomes with trade counts.
pub fn build_diagnostics(outcome: &BacktestOutcome, outcomes: &[AssetOutcome]) -> Vec<AssetDiagnostics> {
    outcomes
        .iter()
        .map(|asset| AssetDiagnostics {
            symbol: asset.symbol.clone(),
            seed: asset.seed,
            fit: asset.fit,
            label_map: asset.label_map.ranks().to_vec(),
            regimes: asset.regimes.clone(),
            trade_count: outcome
                .trade_counts
                .iter()
                .find(|(s, _)| s == &asset.symbol)
                .map_or(0, |(_, n)| *n),
            records: asset.records.len(),
        })
        .collect()
}

pub fn build_benchmarks(outcome: &BacktestOutcome) -> Vec<BenchmarkSummary> {
    outcome
        .benchmarks
        .iter()
        .map(|b| BenchmarkSummary {
            symbol: b.symbol.clone(),
            total_return: b.total_return(),
        })
        .collect()
}
