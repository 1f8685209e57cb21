//! Price provider trait and structured error types.
//!
//! The PriceProvider trait abstracts over price sources (Yahoo Finance, CSV
//! store, synthetic generator) so loaders can swap implementations and tests
//! can inject failing providers.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{PriceSeries, SeriesError};

/// Sampling interval of a price series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    #[default]
    Daily,
    Hourly,
}

impl Interval {
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Daily => "daily",
            Interval::Hourly => "hourly",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" | "1d" => Ok(Interval::Daily),
            "hourly" | "1h" => Ok(Interval::Hourly),
            other => Err(format!("unknown interval '{other}' (expected daily or hourly)")),
        }
    }
}

/// Structured errors for price retrieval.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataError {
    #[error("price data unavailable for {symbol}: {reason}")]
    Unavailable { symbol: String, reason: String },

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("access refused by provider: {0}")]
    Forbidden(String),

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("no stored prices for '{symbol}', run `fetch {symbol}` first")]
    NotStored { symbol: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    InvalidSeries(#[from] SeriesError),
}

impl DataError {
    /// Whether a later attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DataError::Unavailable { .. }
                | DataError::NetworkUnreachable(_)
                | DataError::RateLimited { .. }
        )
    }

    pub fn unavailable(symbol: &str, reason: impl Into<String>) -> Self {
        DataError::Unavailable {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }
}

/// Where a series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    YahooFinance,
    CsvStore,
    Synthetic,
}

/// Source of historical close prices.
pub trait PriceProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    fn source(&self) -> DataSource;

    /// Close prices for `symbol` over `[start, end]` at `interval`.
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
    ) -> Result<PriceSeries, DataError>;
}
