//! BacktestSimulator: merges per-asset signals and computes equity curves.
//!
//! Assets are aligned on the union of their signal timestamps. Each asset's
//! held position acts on its own period return; the strategy return is the
//! sum over assets, with a proportional fee on the return of any period in
//! which that asset's position changed:
//!
//! ```text
//! R_t      = Σ_a pos_{a,t} · r_{a,t} · (1 - φ · |pos_{a,t} - pos_{a,t-1}|)
//! equity_t = Π_{s<=t} (1 + R_s)
//! ```
//!
//! Undefined returns (first observation, or no price at `t`) contribute zero.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{PositionState, SignalRecord};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BacktestError {
    #[error("no assets to backtest")]
    NoAssets,

    #[error("merged timeline is empty")]
    EmptyTimeline,

    #[error("asset {symbol}: {actual} values for a timeline of {expected}")]
    LengthMismatch {
        symbol: String,
        expected: usize,
        actual: usize,
    },

    #[error("asset {symbol}: signal timestamps are not strictly increasing")]
    UnorderedTrack { symbol: String },
}

/// Signal output of one asset, ready to merge.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetTrack {
    pub symbol: String,
    pub records: Vec<SignalRecord>,
}

impl AssetTrack {
    pub fn new(symbol: impl Into<String>, records: Vec<SignalRecord>) -> Self {
        Self {
            symbol: symbol.into(),
            records,
        }
    }
}

/// One asset projected onto the merged timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedAsset {
    pub symbol: String,
    /// Held position per timeline point.
    pub positions: Vec<PositionState>,
    /// Period return per timeline point, NaN where undefined.
    pub returns: Vec<f64>,
    /// Index into the asset's own records, `None` where it has no record.
    pub record_index: Vec<Option<usize>>,
}

/// All assets on a common timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedBook {
    pub timestamps: Vec<NaiveDateTime>,
    pub assets: Vec<AlignedAsset>,
}

impl AlignedBook {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Build the union timeline and project every asset onto it.
///
/// Positions are carried forward across gaps and are Flat before an asset's
/// first record. Returns are measured against the asset's previous known price.
pub fn align_assets(tracks: &[AssetTrack]) -> Result<AlignedBook, BacktestError> {
    if tracks.is_empty() {
        return Err(BacktestError::NoAssets);
    }
    for track in tracks {
        if track
            .records
            .windows(2)
            .any(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(BacktestError::UnorderedTrack {
                symbol: track.symbol.clone(),
            });
        }
    }

    let mut timestamps: Vec<NaiveDateTime> = tracks
        .iter()
        .flat_map(|t| t.records.iter().map(|r| r.timestamp))
        .collect();
    timestamps.sort_unstable();
    timestamps.dedup();
    if timestamps.is_empty() {
        return Err(BacktestError::EmptyTimeline);
    }

    let assets = tracks
        .iter()
        .map(|track| project(track, &timestamps))
        .collect();

    Ok(AlignedBook { timestamps, assets })
}

fn project(track: &AssetTrack, timestamps: &[NaiveDateTime]) -> AlignedAsset {
    let n = timestamps.len();
    let mut positions = Vec::with_capacity(n);
    let mut returns = Vec::with_capacity(n);
    let mut record_index = Vec::with_capacity(n);

    let mut cursor = 0;
    let mut position = PositionState::Flat;
    let mut last_price: Option<f64> = None;

    for &ts in timestamps {
        let record = track.records.get(cursor).filter(|r| r.timestamp == ts);
        match record {
            Some(r) => {
                position = r.position;
                returns.push(last_price.map_or(f64::NAN, |p| r.price / p - 1.0));
                last_price = Some(r.price);
                record_index.push(Some(cursor));
                cursor += 1;
            }
            None => {
                returns.push(f64::NAN);
                record_index.push(None);
            }
        }
        positions.push(position);
    }

    AlignedAsset {
        symbol: track.symbol.clone(),
        positions,
        returns,
        record_index,
    }
}

/// Buy-and-hold curve of one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkCurve {
    pub symbol: String,
    pub equity: Vec<f64>,
}

impl BenchmarkCurve {
    pub fn total_return(&self) -> f64 {
        self.equity.last().map_or(0.0, |e| e - 1.0)
    }
}

/// Simulation result on the merged timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestOutcome {
    pub timestamps: Vec<NaiveDateTime>,
    /// Strategy return per period.
    pub strategy_returns: Vec<f64>,
    /// Cumulative strategy multiplier per period.
    pub equity: Vec<f64>,
    pub benchmarks: Vec<BenchmarkCurve>,
    /// Σ|Δposition| per asset, in asset order.
    pub trade_counts: Vec<(String, usize)>,
}

impl BacktestOutcome {
    pub fn len(&self) -> usize {
        self.equity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.equity.is_empty()
    }

    pub fn total_trades(&self) -> usize {
        self.trade_counts.iter().map(|(_, n)| n).sum()
    }
}

/// `|pos_t - pos_{t-1}|`, zero at the first period.
pub fn trade_indicator(positions: &[PositionState]) -> Vec<f64> {
    let mut out = Vec::with_capacity(positions.len());
    let mut prev: Option<PositionState> = None;
    for &p in positions {
        out.push(prev.map_or(0.0, |q| (p.value() - q.value()).abs()));
        prev = Some(p);
    }
    out
}

/// Cumulative product of `1 + r`, NaN returns treated as zero.
pub fn compound(returns: &[f64]) -> Vec<f64> {
    let mut acc = 1.0;
    returns
        .iter()
        .map(|r| {
            if r.is_finite() {
                acc *= 1.0 + r;
            }
            acc
        })
        .collect()
}

/// Run the strategy over an aligned book with proportional fee `fee_rate`.
pub fn simulate(book: &AlignedBook, fee_rate: f64) -> Result<BacktestOutcome, BacktestError> {
    if book.assets.is_empty() {
        return Err(BacktestError::NoAssets);
    }
    let n = book.len();
    if n == 0 {
        return Err(BacktestError::EmptyTimeline);
    }
    for asset in &book.assets {
        for actual in [asset.positions.len(), asset.returns.len()] {
            if actual != n {
                return Err(BacktestError::LengthMismatch {
                    symbol: asset.symbol.clone(),
                    expected: n,
                    actual,
                });
            }
        }
    }

    let mut strategy_returns = vec![0.0; n];
    let mut trade_counts = Vec::with_capacity(book.assets.len());
    let mut benchmarks = Vec::with_capacity(book.assets.len());

    for asset in &book.assets {
        let trades = trade_indicator(&asset.positions);
        for t in 0..n {
            let r = asset.returns[t];
            if r.is_finite() {
                strategy_returns[t] += asset.positions[t].value() * r * (1.0 - fee_rate * trades[t]);
            }
        }
        let count = trades.iter().sum::<f64>().round() as usize;
        trade_counts.push((asset.symbol.clone(), count));
        benchmarks.push(BenchmarkCurve {
            symbol: asset.symbol.clone(),
            equity: compound(&asset.returns),
        });
    }

    let equity = compound(&strategy_returns);
    tracing::debug!(
        periods = n,
        final_equity = equity[n - 1],
        "backtest simulated"
    );

    Ok(BacktestOutcome {
        timestamps: book.timestamps.clone(),
        strategy_returns,
        equity,
        benchmarks,
        trade_counts,
    })
}
