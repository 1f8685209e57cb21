//! RegimeLab CLI: run and fetch commands.
//!
//! Commands:
//! - `run`: fit regime models, generate signals, backtest, write artifacts
//! - `fetch`: download prices from Yahoo Finance into the CSV store
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); results go to stdout.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use regimelab_core::data::{Interval, PriceProvider, YahooProvider};
use regimelab_core::features::min_prices;
use regimelab_runner::config::{RetryConfig, RunConfig};
use regimelab_runner::data_loader::{
    fetch_with_retry, CsvPriceStore, PriceRequest, RetryPolicy, SyntheticProvider,
};
use regimelab_runner::{run_pipeline, save_artifacts, RunReport};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "regimelab",
    about = "RegimeLab CLI: HMM volatility-regime signals for crypto assets"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit regime models, generate signals, and backtest the strategy.
    Run {
        /// Path to a TOML run config. Flags below override its values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Symbols to trade (at most two), comma separated.
        #[arg(long, value_delimiter = ',')]
        symbols: Option<Vec<String>>,

        /// Start date (YYYY-MM-DD). Defaults to three years before --end.
        #[arg(long)]
        start: Option<NaiveDate>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Bar interval: daily or hourly.
        #[arg(long)]
        interval: Option<Interval>,

        /// Read prices from this CSV store instead of Yahoo Finance.
        #[arg(long, conflicts_with = "synthetic")]
        data_dir: Option<PathBuf>,

        /// Use deterministic synthetic prices (no network).
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Master seed for model initialization.
        #[arg(long)]
        seed: Option<u64>,

        /// Directory for run artifacts.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Download prices from Yahoo Finance into the CSV store.
    Fetch {
        /// Symbols to download (e.g., BTC-USD ETH-USD).
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to three years before --end.
        #[arg(long)]
        start: Option<NaiveDate>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Bar interval: daily or hourly.
        #[arg(long, default_value = "daily")]
        interval: Interval,

        /// CSV store directory.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            symbols,
            start,
            end,
            interval,
            data_dir,
            synthetic,
            seed,
            output_dir,
        } => {
            let mut run_config = match config {
                Some(path) => RunConfig::load(&path)?,
                None => RunConfig::default(),
            };
            apply_overrides(
                &mut run_config,
                Overrides {
                    symbols,
                    start,
                    end,
                    interval,
                    seed,
                    output_dir,
                },
            );
            run_cmd(&run_config, data_dir, synthetic)
        }
        Commands::Fetch {
            symbols,
            start,
            end,
            interval,
            data_dir,
        } => fetch_cmd(&symbols, start, end, interval, &data_dir),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

struct Overrides {
    symbols: Option<Vec<String>>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    interval: Option<Interval>,
    seed: Option<u64>,
    output_dir: Option<PathBuf>,
}

fn apply_overrides(config: &mut RunConfig, o: Overrides) {
    if let Some(symbols) = o.symbols {
        config.symbols = symbols;
    }
    if let Some(end) = o.end {
        config.end = end;
        if o.start.is_none() {
            config.start = default_start(end);
        }
    }
    if let Some(start) = o.start {
        config.start = start;
    }
    if let Some(interval) = o.interval {
        config.interval = interval;
    }
    if let Some(seed) = o.seed {
        config.engine.seed = seed;
    }
    if let Some(dir) = o.output_dir {
        config.output_dir = dir;
    }
}

fn default_start(end: NaiveDate) -> NaiveDate {
    end - chrono::Duration::days(3 * 365)
}

fn run_cmd(config: &RunConfig, data_dir: Option<PathBuf>, synthetic: bool) -> Result<()> {
    let yahoo;
    let store;
    let provider: &dyn PriceProvider = if synthetic {
        &SyntheticProvider
    } else if let Some(dir) = data_dir {
        store = CsvPriceStore::new(dir);
        &store
    } else {
        yahoo = YahooProvider::new()?;
        &yahoo
    };

    tracing::info!(provider = provider.name(), run_id = %config.run_id(), "starting run");
    let report = run_pipeline(config, provider)?;
    print_summary(&report);

    let paths = save_artifacts(&report, &config.output_dir)?;
    println!("Artifacts saved to: {}", paths.dir.display());
    Ok(())
}

fn fetch_cmd(
    symbols: &[String],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    interval: Interval,
    data_dir: &std::path::Path,
) -> Result<()> {
    let end = end.unwrap_or_else(|| chrono::Local::now().date_naive());
    let start = start.unwrap_or_else(|| default_start(end));
    if start > end {
        bail!("--start {start} is after --end {end}");
    }

    let provider = YahooProvider::new()?;
    let store = CsvPriceStore::new(data_dir);
    let policy = RetryPolicy::from(&RetryConfig::default());
    let request = PriceRequest {
        start,
        end,
        interval,
        min_points: min_prices(1),
    };

    let mut failed = 0usize;
    for symbol in symbols {
        match fetch_with_retry(&provider, symbol, &request, &policy) {
            Ok(series) => {
                let path = store
                    .write(&series, interval)
                    .with_context(|| format!("failed to store prices for {symbol}"))?;
                println!("{symbol}: {} prices -> {}", series.len(), path.display());
            }
            Err(e) => {
                eprintln!("Error for {symbol}: {e}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} symbols failed to download", symbols.len());
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    let s = &report.summary;
    println!();
    println!("=== Regime Strategy Result ===");
    println!("Run:            {}", report.run_id);
    if let (Some(first), Some(last)) = (report.records.first(), report.records.last()) {
        println!("Period:         {} to {}", first.timestamp, last.timestamp);
    }
    println!("Periods:        {}", report.records.len());
    println!("Trades:         {}", report.total_trades());
    println!();
    println!("--- Performance ---");
    println!("Total Return:   {:.2}%", s.total_return * 100.0);
    println!("CAGR:           {:.2}%", s.cagr * 100.0);
    println!("Sharpe:         {:.3}", s.sharpe);
    println!("Max Drawdown:   {:.2}%", s.max_drawdown * 100.0);
    println!();
    println!("--- Buy & Hold ---");
    for b in &report.benchmarks {
        println!("{:<16}{:.2}%", format!("{}:", b.symbol), b.total_return * 100.0);
    }
    println!();
    println!("--- Assets ---");
    for a in &report.assets {
        println!(
            "{:<16}{} trades, {} after {} iterations",
            format!("{}:", a.symbol),
            a.trade_count,
            if a.fit.converged { "converged" } else { "not converged" },
            a.fit.iterations
        );
    }
    if let Some(last) = report.records.last() {
        println!();
        println!("Latest action:  {}", last.combined_action);
    }
    if report.is_synthetic() {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    for f in &report.failures {
        println!("WARNING: {} failed at {}: {}", f.symbol, f.stage, f.message);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn no_overrides() -> Overrides {
        Overrides {
            symbols: None,
            start: None,
            end: None,
            interval: None,
            seed: None,
            output_dir: None,
        }
    }

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "regimelab",
            "run",
            "--symbols",
            "BTC-USD,ETH-USD",
            "--start",
            "2022-01-01",
            "--interval",
            "hourly",
            "--synthetic",
            "--seed",
            "7",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                symbols,
                start,
                interval,
                synthetic,
                seed,
                ..
            } => {
                assert_eq!(symbols.unwrap(), vec!["BTC-USD", "ETH-USD"]);
                assert_eq!(start, Some(d(2022, 1, 1)));
                assert_eq!(interval, Some(Interval::Hourly));
                assert!(synthetic);
                assert_eq!(seed, Some(7));
            }
            Commands::Fetch { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn synthetic_conflicts_with_data_dir() {
        let parsed = Cli::try_parse_from(["regimelab", "run", "--synthetic", "--data-dir", "data"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn fetch_requires_symbols() {
        assert!(Cli::try_parse_from(["regimelab", "fetch"]).is_err());
        let cli = Cli::try_parse_from(["regimelab", "fetch", "BTC-USD"]).unwrap();
        match cli.command {
            Commands::Fetch {
                symbols, interval, ..
            } => {
                assert_eq!(symbols, vec!["BTC-USD"]);
                assert_eq!(interval, Interval::Daily);
            }
            Commands::Run { .. } => panic!("expected fetch"),
        }
    }

    #[test]
    fn end_override_moves_default_start() {
        let mut config = RunConfig::default();
        apply_overrides(
            &mut config,
            Overrides {
                end: Some(d(2023, 12, 31)),
                ..no_overrides()
            },
        );
        assert_eq!(config.end, d(2023, 12, 31));
        assert_eq!(config.start, d(2020, 12, 31));
    }

    #[test]
    fn explicit_overrides_win() {
        let mut config = RunConfig::default();
        apply_overrides(
            &mut config,
            Overrides {
                symbols: Some(vec!["ETH-USD".into()]),
                start: Some(d(2020, 1, 1)),
                end: Some(d(2020, 12, 31)),
                interval: Some(Interval::Hourly),
                seed: Some(9),
                output_dir: Some(PathBuf::from("out")),
            },
        );
        assert_eq!(config.symbols, vec!["ETH-USD"]);
        assert_eq!(config.start, d(2020, 1, 1));
        assert_eq!(config.interval, Interval::Hourly);
        assert_eq!(config.engine.seed, 9);
        assert_eq!(config.output_dir, PathBuf::from("out"));
    }
}
