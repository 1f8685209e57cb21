//! Yahoo Finance price provider.
//!
//! Fetches close prices from Yahoo's v8 chart API at daily or hourly
//! resolution. One HTTP request per call: retry and backoff belong to the
//! loading layer, which sees transient failures as retryable [`DataError`]s.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes; the CSV store is the offline fallback.

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use super::provider::{DataError, DataSource, Interval, PriceProvider};
use crate::domain::{PricePoint, PriceSeries};

const CHART_BASE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

pub struct YahooProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new() -> Result<Self, DataError> {
        Self::with_base_url(CHART_BASE_URL)
    }

    /// Point the provider at a different chart endpoint (mirrors, test servers).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::NetworkUnreachable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate, interval: Interval) -> String {
        let start_ts = start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        // inclusive end date
        let end_ts = (end + chrono::Duration::days(1))
            .and_time(chrono::NaiveTime::MIN)
            .and_utc()
            .timestamp()
            - 1;
        let step = match interval {
            Interval::Daily => "1d",
            Interval::Hourly => "1h",
        };
        format!(
            "{}/{symbol}?period1={start_ts}&period2={end_ts}&interval={step}&includeAdjustedClose=true",
            self.base_url
        )
    }

    /// Parse a chart API response body into a price series.
    ///
    /// Adjusted close is preferred; rows without any close are skipped. Daily
    /// bars are normalized to midnight so they line up across assets.
    fn parse_response(
        symbol: &str,
        interval: Interval,
        resp: ChartResponse,
    ) -> Result<PriceSeries, DataError> {
        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            },
            Some(err) => DataError::ResponseFormatChanged(format!("{}: {}", err.code, err.description)),
            None => DataError::unavailable(symbol, "empty result with no error"),
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::unavailable(symbol, "result array is empty"))?;

        let timestamps = data
            .timestamp
            .ok_or_else(|| DataError::unavailable(symbol, "no timestamps in range"))?;

        let closes = data
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|q| q.close)
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose);

        let mut points = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let timestamp = to_timestamp(ts, interval).ok_or_else(|| {
                DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
            })?;
            let adj = adj_closes.as_ref().and_then(|v| v.get(i).copied().flatten());
            let close = closes.get(i).copied().flatten();
            if let Some(price) = adj.or(close) {
                points.push(PricePoint::new(timestamp, price));
            }
        }

        if points.is_empty() {
            return Err(DataError::unavailable(symbol, "no prices in range"));
        }

        Ok(PriceSeries::from_unsorted(symbol, points))
    }
}

fn to_timestamp(secs: i64, interval: Interval) -> Option<NaiveDateTime> {
    let dt = chrono::DateTime::from_timestamp(secs, 0)?.naive_utc();
    Some(match interval {
        Interval::Daily => dt.date().and_time(chrono::NaiveTime::MIN),
        Interval::Hourly => dt,
    })
}

impl PriceProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn source(&self) -> DataSource {
        DataSource::YahooFinance
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
    ) -> Result<PriceSeries, DataError> {
        let url = self.chart_url(symbol, start, end, interval);
        tracing::debug!(symbol, %url, "requesting chart");

        let resp = self.client.get(&url).send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                DataError::NetworkUnreachable(e.to_string())
            } else {
                DataError::unavailable(symbol, e.to_string())
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(DataError::Forbidden(format!("HTTP {status} for {symbol}")));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(DataError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        if !status.is_success() {
            return Err(DataError::unavailable(symbol, format!("HTTP {status}")));
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
        })?;
        Self::parse_response(symbol, interval, chart)
    }
}
