//! Price loading for the runner.
//!
//! Given a list of symbols, fetches a close-price series for each from a
//! [`PriceProvider`], retrying transient failures with exponential backoff.
//! A symbol that still fails is reported on its own; siblings keep loading.
//!
//! Also provides the two offline providers:
//! - [`CsvPriceStore`]: `timestamp,price` files, one per symbol and interval
//! - [`SyntheticProvider`]: a seeded regime-switching random walk, tagged as
//!   synthetic in every report

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use regimelab_core::data::{DataError, DataSource, Interval, PriceProvider};
use regimelab_core::domain::{PricePoint, PriceSeries};

use crate::config::RetryConfig;

// ─── Retry ──────────────────────────────────────────────────────────

/// Bounded retry with exponential backoff: `base_delay * 2^(attempt-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .unwrap_or(Duration::MAX)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
        }
    }
}

/// What to fetch for every symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: Interval,
    /// Fewer points than this counts as a partial (unavailable) result.
    pub min_points: usize,
}

/// Fetch one symbol, retrying retryable errors.
pub fn fetch_with_retry(
    provider: &dyn PriceProvider,
    symbol: &str,
    request: &PriceRequest,
    policy: &RetryPolicy,
) -> Result<PriceSeries, DataError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = provider
            .fetch(symbol, request.start, request.end, request.interval)
            .and_then(|series| {
                if series.len() < request.min_points {
                    Err(DataError::unavailable(
                        symbol,
                        format!(
                            "partial result: {} prices, need at least {}",
                            series.len(),
                            request.min_points
                        ),
                    ))
                } else {
                    Ok(series)
                }
            });

        match result {
            Ok(series) => {
                tracing::debug!(symbol, attempt, points = series.len(), "prices loaded");
                return Ok(series);
            }
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    symbol,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "fetch failed, retrying"
                );
                std::thread::sleep(delay);
            }
            Err(e) => {
                tracing::warn!(symbol, attempt, error = %e, "fetch failed");
                return Err(e);
            }
        }
    }
}

/// Fetch every symbol. Failures are per symbol; the map is keyed by symbol.
pub fn fetch_prices(
    provider: &dyn PriceProvider,
    symbols: &[String],
    request: &PriceRequest,
    policy: &RetryPolicy,
) -> BTreeMap<String, Result<PriceSeries, DataError>> {
    symbols
        .iter()
        .map(|symbol| {
            (
                symbol.clone(),
                fetch_with_retry(provider, symbol, request, policy),
            )
        })
        .collect()
}

/// Deterministic BLAKE3 hash over all loaded prices, in symbol order.
pub fn dataset_hash<'a>(series: impl IntoIterator<Item = &'a PriceSeries>) -> String {
    let mut all: Vec<&PriceSeries> = series.into_iter().collect();
    all.sort_by(|a, b| a.symbol().cmp(b.symbol()));

    let mut hasher = blake3::Hasher::new();
    for s in all {
        hasher.update(s.symbol().as_bytes());
        for p in s.points() {
            hasher.update(&p.timestamp.and_utc().timestamp().to_le_bytes());
            hasher.update(&p.price.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

// ─── CSV store ──────────────────────────────────────────────────────

/// Directory of `<symbol>_<interval>.csv` files with `timestamp,price` rows.
#[derive(Debug, Clone)]
pub struct CsvPriceStore {
    dir: PathBuf,
}

impl CsvPriceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, symbol: &str, interval: Interval) -> PathBuf {
        self.dir.join(format!("{symbol}_{interval}.csv"))
    }

    /// Write (or replace) the stored series for one symbol.
    pub fn write(&self, series: &PriceSeries, interval: Interval) -> Result<PathBuf, DataError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| DataError::Storage(format!("{}: {e}", self.dir.display())))?;
        let path = self.path_for(series.symbol(), interval);
        let mut wtr = csv::Writer::from_path(&path)
            .map_err(|e| DataError::Storage(format!("{}: {e}", path.display())))?;
        for point in series.points() {
            wtr.serialize(point)
                .map_err(|e| DataError::Storage(e.to_string()))?;
        }
        wtr.flush()
            .map_err(|e| DataError::Storage(format!("{}: {e}", path.display())))?;
        Ok(path)
    }

    /// Read the full stored series for one symbol.
    pub fn read(&self, symbol: &str, interval: Interval) -> Result<PriceSeries, DataError> {
        let path = self.path_for(symbol, interval);
        if !path.exists() {
            return Err(DataError::NotStored {
                symbol: symbol.to_string(),
            });
        }
        let mut rdr = csv::Reader::from_path(&path)
            .map_err(|e| DataError::Storage(format!("{}: {e}", path.display())))?;
        let points = rdr
            .deserialize::<PricePoint>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DataError::Storage(format!("{}: {e}", path.display())))?;
        Ok(PriceSeries::new(symbol, points)?)
    }
}

impl PriceProvider for CsvPriceStore {
    fn name(&self) -> &str {
        "csv_store"
    }

    fn source(&self) -> DataSource {
        DataSource::CsvStore
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
    ) -> Result<PriceSeries, DataError> {
        let stored = self.read(symbol, interval)?;
        let points: Vec<PricePoint> = stored
            .points()
            .iter()
            .filter(|p| p.timestamp.date() >= start && p.timestamp.date() <= end)
            .copied()
            .collect();
        Ok(PriceSeries::new(symbol, points)?)
    }
}

// ─── Synthetic prices ───────────────────────────────────────────────

/// Seeded random walk that alternates calm and turbulent stretches.
///
/// The seed comes from the symbol name, so every symbol gets its own but
/// reproducible path.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticProvider;

impl SyntheticProvider {
    pub fn generate(&self, symbol: &str, start: NaiveDate, end: NaiveDate, interval: Interval) -> PriceSeries {
        let seed = *blake3::hash(symbol.as_bytes()).as_bytes();
        let mut rng = StdRng::from_seed(seed);

        let step = match interval {
            Interval::Daily => chrono::Duration::days(1),
            Interval::Hourly => chrono::Duration::hours(1),
        };
        let first = start.and_time(chrono::NaiveTime::MIN);
        let last: NaiveDateTime = end.and_time(chrono::NaiveTime::MIN) + chrono::Duration::days(1);

        let mut points = Vec::new();
        let mut price = 100.0_f64;
        let mut turbulent = false;
        let mut remaining = 0usize;
        let mut ts = first;
        while ts < last {
            if remaining == 0 {
                turbulent = !turbulent;
                remaining = rng.gen_range(30..90);
            }
            remaining -= 1;

            let (drift, width) = if turbulent { (-0.001, 0.07) } else { (0.0015, 0.015) };
            let change: f64 = drift + rng.gen_range(-width..width);
            price *= 1.0 + change;
            points.push(PricePoint::new(ts, price));
            ts += step;
        }
        PriceSeries::from_unsorted(symbol, points)
    }
}

impl PriceProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn source(&self) -> DataSource {
        DataSource::Synthetic
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
    ) -> Result<PriceSeries, DataError> {
        Ok(self.generate(symbol, start, end, interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn request(min_points: usize) -> PriceRequest {
        PriceRequest {
            start: d(2024, 1, 1),
            end: d(2024, 3, 31),
            interval: Interval::Daily,
            min_points,
        }
    }

    fn no_wait(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    /// Fails with the given error for the first `failures` calls, then succeeds.
    struct FlakyProvider {
        calls: AtomicU32,
        failures: u32,
        error: DataError,
    }

    impl PriceProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn source(&self) -> DataSource {
            DataSource::Synthetic
        }

        fn fetch(
            &self,
            symbol: &str,
            start: NaiveDate,
            end: NaiveDate,
            interval: Interval,
        ) -> Result<PriceSeries, DataError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                SyntheticProvider.fetch(symbol, start, end, interval)
            }
        }
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(2000));
    }

    #[test]
    fn retries_unavailable_then_succeeds() {
        let provider = FlakyProvider {
            calls: AtomicU32::new(0),
            failures: 2,
            error: DataError::unavailable("BTC-USD", "empty"),
        };
        let series = fetch_with_retry(&provider, "BTC-USD", &request(10), &no_wait(3)).unwrap();
        assert_eq!(series.len(), 91);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let provider = FlakyProvider {
            calls: AtomicU32::new(0),
            failures: 10,
            error: DataError::unavailable("BTC-USD", "empty"),
        };
        let err = fetch_with_retry(&provider, "BTC-USD", &request(10), &no_wait(3)).unwrap_err();
        assert!(matches!(err, DataError::Unavailable { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn does_not_retry_permanent_errors() {
        let provider = FlakyProvider {
            calls: AtomicU32::new(0),
            failures: 1,
            error: DataError::SymbolNotFound {
                symbol: "NOPE".into(),
            },
        };
        let err = fetch_with_retry(&provider, "NOPE", &request(10), &no_wait(5)).unwrap_err();
        assert!(matches!(err, DataError::SymbolNotFound { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn short_series_counts_as_unavailable() {
        let err = fetch_with_retry(&SyntheticProvider, "BTC-USD", &request(1000), &no_wait(2))
            .unwrap_err();
        assert!(matches!(err, DataError::Unavailable { .. }));
    }

    #[test]
    fn fetch_prices_keeps_per_symbol_results() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvPriceStore::new(dir.path());
        let symbols = vec!["BTC-USD".to_string(), "ETH-USD".to_string()];
        let results = fetch_prices(&store, &symbols, &request(1), &no_wait(1));
        assert_eq!(results.len(), 2);
        assert!(results
            .values()
            .all(|r| matches!(r, Err(DataError::NotStored { .. }))));
    }

    #[test]
    fn synthetic_is_deterministic_per_symbol() {
        let a = SyntheticProvider.generate("BTC-USD", d(2024, 1, 1), d(2024, 12, 31), Interval::Daily);
        let b = SyntheticProvider.generate("BTC-USD", d(2024, 1, 1), d(2024, 12, 31), Interval::Daily);
        let c = SyntheticProvider.generate("ETH-USD", d(2024, 1, 1), d(2024, 12, 31), Interval::Daily);
        assert_eq!(a, b);
        assert_ne!(a.points(), c.points());
        assert_eq!(a.len(), 366);
        assert!(a.prices().all(|p| p > 0.0));
    }

    #[test]
    fn synthetic_hourly_covers_whole_days() {
        let s = SyntheticProvider.generate("ETH-USD", d(2024, 1, 1), d(2024, 1, 2), Interval::Hourly);
        assert_eq!(s.len(), 48);
    }

    #[test]
    fn csv_store_round_trip_and_range_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvPriceStore::new(dir.path());
        let series = SyntheticProvider.generate("BTC-USD", d(2024, 1, 1), d(2024, 1, 31), Interval::Daily);
        let path = store.write(&series, Interval::Daily).unwrap();
        assert!(path.ends_with("BTC-USD_daily.csv"));

        let back = store.read("BTC-USD", Interval::Daily).unwrap();
        assert_eq!(back, series);

        let window = store
            .fetch("BTC-USD", d(2024, 1, 10), d(2024, 1, 19), Interval::Daily)
            .unwrap();
        assert_eq!(window.len(), 10);
    }

    #[test]
    fn dataset_hash_ignores_input_order() {
        let a = SyntheticProvider.generate("BTC-USD", d(2024, 1, 1), d(2024, 2, 1), Interval::Daily);
        let b = SyntheticProvider.generate("ETH-USD", d(2024, 1, 1), d(2024, 2, 1), Interval::Daily);
        assert_eq!(dataset_hash([&a, &b]), dataset_hash([&b, &a]));
        assert_ne!(dataset_hash([&a]), dataset_hash([&b]));
    }
}
