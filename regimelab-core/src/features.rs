//! FeatureBuilder: turns a price series into the HMM's observation rows.
//!
//! Each row carries the current single-period return plus the rolling
//! volatility and rolling mean of the *previous* `window` returns. The rolling
//! statistics are taken over the return series shifted forward by one period,
//! so row `t` never observes `r_t`:
//!
//! ```text
//! volatility_t  = stdev(r_{t-W} .. r_{t-1})
//! mean_return_t = mean(r_{t-W} .. r_{t-1})
//! ```
//!
//! Rows without a full trailing window are dropped; the first row corresponds
//! to price index `window + 1`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::PriceSeries;

/// Observation column names, in matrix order.
pub const FEATURE_NAMES: [&str; 3] = ["return", "volatility", "mean_return"];

/// Index of the volatility column in the observation matrix.
pub const VOLATILITY_COLUMN: usize = 1;

/// Errors from feature construction.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeatureError {
    #[error("insufficient data: need at least {required} prices for the rolling window, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("invalid price {price} at index {index}")]
    InvalidPrice { index: usize, price: f64 },

    #[error("rolling window {window} is too small: a sample stdev needs at least 2 returns")]
    WindowTooSmall { window: usize },
}

/// One observation row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub timestamp: NaiveDateTime,
    /// Close price at `timestamp`; not an HMM input.
    pub price: f64,
    #[serde(rename = "return")]
    pub ret: f64,
    pub volatility: f64,
    pub mean_return: f64,
}

impl FeatureRecord {
    /// Observation vector in [`FEATURE_NAMES`] order.
    pub fn as_array(&self) -> [f64; 3] {
        [self.ret, self.volatility, self.mean_return]
    }
}

/// Ordered observation rows for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    pub symbol: String,
    pub window: usize,
    pub records: Vec<FeatureRecord>,
}

impl FeatureFrame {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Observation matrix, one row per record.
    pub fn matrix(&self) -> Vec<Vec<f64>> {
        self.records.iter().map(|r| r.as_array().to_vec()).collect()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        self.records.iter().map(|r| r.timestamp)
    }
}

/// Minimum number of prices needed to produce at least one feature row.
pub fn min_prices(window: usize) -> usize {
    window + 2
}

/// Build the feature frame for a price series.
pub fn build_features(series: &PriceSeries, window: usize) -> Result<FeatureFrame, FeatureError> {
    let points = series.points();
    let n = points.len();
    if window < 2 {
        return Err(FeatureError::WindowTooSmall { window });
    }
    let required = min_prices(window);
    if n < required {
        return Err(FeatureError::InsufficientData {
            required,
            actual: n,
        });
    }

    for (index, point) in points.iter().enumerate() {
        if !point.price.is_finite() || point.price <= 0.0 {
            return Err(FeatureError::InvalidPrice {
                index,
                price: point.price,
            });
        }
    }

    // returns[i] is the return realized at price index i; index 0 is undefined.
    let mut returns = vec![f64::NAN; n];
    for i in 1..n {
        returns[i] = points[i].price / points[i - 1].price - 1.0;
    }

    let records = (window + 1..n)
        .map(|t| {
            let trailing = &returns[t - window..t];
            let (mean, stdev) = mean_and_sample_stdev(trailing);
            FeatureRecord {
                timestamp: points[t].timestamp,
                price: points[t].price,
                ret: returns[t],
                volatility: stdev,
                mean_return: mean,
            }
        })
        .collect();

    Ok(FeatureFrame {
        symbol: series.symbol().to_string(),
        window,
        records,
    })
}

/// Mean and sample standard deviation (ddof = 1). Requires `values.len() >= 2`.
fn mean_and_sample_stdev(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (mean, (ss / (n - 1.0)).sqrt())
}
