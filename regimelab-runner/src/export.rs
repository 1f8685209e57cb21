//! Reporting and export: JSON, CSV, and Markdown artifact generation.
//!
//! - **JSON**: the full `RunReport`, schema-versioned and loadable again
//! - **CSV**: one row per timestamp with per-asset regime, position and action
//! - **Markdown**: human-readable run summary
//!
//! Unknown schema versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use regimelab_core::signal::short_symbol;

use crate::report::{RunReport, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize RunReport to JSON")
}

/// Deserialize a `RunReport` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<RunReport> {
    let report: RunReport =
        serde_json::from_str(json).context("failed to deserialize RunReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export the per-timestamp records.
///
/// Columns: timestamp, then `{asset}_regime`, `{asset}_position`,
/// `{asset}_action`, `{asset}_buy_hold` for each asset, then combined_action,
/// strategy_return, strategy_cumulative. A missing regime is an empty cell.
pub fn export_records_csv(report: &RunReport) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let prefixes: Vec<String> = report
        .records
        .first()
        .map(|r| {
            r.assets
                .iter()
                .map(|a| short_symbol(&a.symbol).to_lowercase())
                .collect()
        })
        .unwrap_or_default();

    let mut header = vec!["timestamp".to_string()];
    for p in &prefixes {
        header.push(format!("{p}_regime"));
        header.push(format!("{p}_position"));
        header.push(format!("{p}_action"));
        header.push(format!("{p}_buy_hold"));
    }
    header.extend(
        ["combined_action", "strategy_return", "strategy_cumulative"].map(String::from),
    );
    wtr.write_record(&header)?;

    for r in &report.records {
        let mut row = vec![r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()];
        for a in &r.assets {
            row.push(a.regime.map(|l| l.to_string()).unwrap_or_default());
            row.push(a.position.as_u8().to_string());
            row.push(a.action.to_string());
            row.push(format!("{:.6}", a.buy_hold_cumulative));
        }
        row.push(r.combined_action.clone());
        row.push(format!("{:.8}", r.strategy_return));
        row.push(format!("{:.6}", r.strategy_cumulative));
        wtr.write_record(&row)?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Paths of the files written by [`save_artifacts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    pub records_csv: PathBuf,
    pub summary_json: PathBuf,
    pub report_md: PathBuf,
}

/// Save the artifact set for a run under `output_dir/{run_id}/`:
/// - `summary.json`: the full `RunReport`
/// - `records.csv`: per-timestamp records
/// - `report.md`: Markdown summary
///
/// Re-running the same configuration overwrites the same directory.
pub fn save_artifacts(report: &RunReport, output_dir: &Path) -> Result<ArtifactPaths> {
    let dir = output_dir.join(&report.run_id);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create artifact dir: {}", dir.display()))?;

    let paths = ArtifactPaths {
        records_csv: dir.join("records.csv"),
        summary_json: dir.join("summary.json"),
        report_md: dir.join("report.md"),
        dir,
    };

    write_file(&paths.summary_json, &export_json(report)?)?;
    write_file(&paths.records_csv, &export_records_csv(report)?)?;
    write_file(&paths.report_md, &generate_report(report))?;

    tracing::info!(dir = %paths.dir.display(), "artifacts written");
    Ok(paths)
}

/// Load a `RunReport` from an artifact directory's summary.json.
pub fn load_artifacts(dir: &Path) -> Result<RunReport> {
    let path = dir.join("summary.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

// ─── Markdown report ────────────────────────────────────────────────

pub fn generate_report(report: &RunReport) -> String {
    let mut md = String::with_capacity(2048);

    md.push_str("# Regime Strategy Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Run | {} |\n", report.run_id));
    if let (Some(first), Some(last)) = (report.records.first(), report.records.last()) {
        md.push_str(&format!(
            "| Period | {} to {} |\n",
            first.timestamp, last.timestamp
        ));
    }
    md.push_str(&format!("| Interval | {} |\n", report.interval));
    md.push_str(&format!("| Periods | {} |\n", report.records.len()));
    md.push_str(&format!("| Dataset Hash | {} |\n", report.dataset_hash));
    if report.is_synthetic() {
        md.push_str("| Data | **SYNTHETIC** |\n");
    }
    md.push('\n');

    let s = &report.summary;
    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Total Return | {:.2}% |\n", s.total_return * 100.0));
    md.push_str(&format!("| CAGR | {:.2}% |\n", s.cagr * 100.0));
    md.push_str(&format!("| Sharpe | {:.3} |\n", s.sharpe));
    md.push_str(&format!("| Max Drawdown | {:.2}% |\n", s.max_drawdown * 100.0));
    md.push_str(&format!("| Trades | {} |\n", report.total_trades()));
    md.push('\n');

    md.push_str("## Buy & Hold\n\n");
    md.push_str("| Asset | Total Return |\n");
    md.push_str("| --- | --- |\n");
    for b in &report.benchmarks {
        md.push_str(&format!("| {} | {:.2}% |\n", b.symbol, b.total_return * 100.0));
    }
    md.push('\n');

    md.push_str("## Regime Models\n\n");
    for a in &report.assets {
        md.push_str(&format!("### {}\n\n", a.symbol));
        md.push_str(&format!(
            "Converged: {} after {} iterations, log-likelihood {:.3}, seed {}, {} trades.\n\n",
            if a.fit.converged { "yes" } else { "no" },
            a.fit.iterations,
            a.fit.log_likelihood,
            a.seed,
            a.trade_count
        ));
        md.push_str("| Regime | Periods | Mean Return | Mean Volatility |\n");
        md.push_str("| --- | --- | --- | --- |\n");
        for r in &a.regimes {
            md.push_str(&format!(
                "| {} | {} | {:.4}% | {:.4}% |\n",
                r.regime,
                r.periods,
                r.mean_return * 100.0,
                r.mean_volatility * 100.0
            ));
        }
        md.push('\n');
    }

    if !report.failures.is_empty() {
        md.push_str("## Failures\n\n");
        for f in &report.failures {
            md.push_str(&format!("- {} ({}): {}\n", f.symbol, f.stage, f.message));
        }
        md.push('\n');
    }

    let actions: Vec<_> = report.actions().collect();
    if !actions.is_empty() {
        md.push_str("## Actions\n\n");
        md.push_str("| Timestamp | Action |\n");
        md.push_str("| --- | --- |\n");
        for r in actions {
            md.push_str(&format!("| {} | {} |\n", r.timestamp, r.combined_action));
        }
        md.push('\n');
    }

    md
}
