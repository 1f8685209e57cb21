//! Serializable run configuration, loaded from TOML.
//!
//! ```toml
//! symbols = ["BTC-USD", "ETH-USD"]
//! start = "2022-01-01"
//! end = "2024-12-31"
//! interval = "daily"
//! output_dir = "runs"
//!
//! [engine]
//! window = 30
//! n_states = 3
//! fee_rate = 0.001
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 500
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use regimelab_core::data::Interval;
use regimelab_core::EngineConfig;

/// At most two assets share one equity curve.
pub const MAX_SYMBOLS: usize = 2;

/// Unique identifier for a run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("engine config: {0}")]
    Engine(#[from] regimelab_core::ConfigError),

    #[error("no symbols configured")]
    NoSymbols,

    #[error("at most {MAX_SYMBOLS} symbols are supported, got {0}")]
    TooManySymbols(usize),

    #[error("symbol '{0}' listed twice")]
    DuplicateSymbol(String),

    #[error("start date {start} is after end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("retry.max_attempts must be >= 1")]
    ZeroAttempts,
}

/// Retry settings for price loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Everything needed to reproduce a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub symbols: Vec<String>,
    /// First date requested (inclusive).
    pub start: NaiveDate,
    /// Last date requested (inclusive).
    pub end: NaiveDate,
    pub interval: Interval,
    /// Artifacts land in `<output_dir>/<run_id>/`.
    pub output_dir: PathBuf,
    pub engine: EngineConfig,
    pub retry: RetryConfig,
}

impl Default for RunConfig {
    /// BTC and ETH, daily, the three years up to today.
    fn default() -> Self {
        let end = chrono::Utc::now().date_naive();
        Self {
            symbols: vec!["BTC-USD".to_string(), "ETH-USD".to_string()],
            start: end - chrono::Duration::days(365 * 3),
            end,
            interval: Interval::Daily,
            output_dir: PathBuf::from("runs"),
            engine: EngineConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        if self.symbols.len() > MAX_SYMBOLS {
            return Err(ConfigError::TooManySymbols(self.symbols.len()));
        }
        for (i, s) in self.symbols.iter().enumerate() {
            if self.symbols[..i].contains(s) {
                return Err(ConfigError::DuplicateSymbol(s.clone()));
            }
        }
        if self.start > self.end {
            return Err(ConfigError::InvalidDateRange {
                start: self.start,
                end: self.end,
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }

    /// Deterministic hash of everything that affects the numbers.
    ///
    /// Output location and retry settings are excluded: two runs with the same
    /// id compute the same report from the same prices.
    pub fn run_id(&self) -> RunId {
        let identity = serde_json::json!({
            "symbols": self.symbols,
            "start": self.start,
            "end": self.end,
            "interval": self.interval,
            "engine": self.engine,
        });
        let hash = blake3::hash(identity.to_string().as_bytes());
        hash.to_hex()[..16].to_string()
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
