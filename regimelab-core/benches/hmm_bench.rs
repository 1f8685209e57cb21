//! Criterion benchmarks for RegimeLab hot paths.
//!
//! Benchmarks:
//! 1. Feature construction over a long price series
//! 2. HMM fit (k-means init + Baum-Welch) for 2 and 3 states
//! 3. Viterbi decoding of a fitted model
//! 4. Backtest simulation over two aligned assets

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use regimelab_core::backtest::{align_assets, simulate, AssetTrack};
use regimelab_core::domain::{Action, PositionState, PricePoint, PriceSeries, RegimeLabel, SignalRecord};
use regimelab_core::features::build_features;
use regimelab_core::hmm::RegimeModel;
use regimelab_core::EngineConfig;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_series(n: usize) -> PriceSeries {
    let base = chrono::NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let mut price = 100.0;
    let points = (0..n)
        .map(|i| {
            let vol = if (i / 150) % 2 == 0 { 0.03 } else { 0.005 };
            price *= 1.0 + (i as f64 * 0.7).sin() * vol;
            PricePoint::new(base + chrono::Duration::days(i as i64), price)
        })
        .collect();
    PriceSeries::new("BENCH", points).unwrap()
}

fn make_track(symbol: &str, n: usize) -> AssetTrack {
    let series = make_series(n);
    let records = series
        .points()
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let position = if (i / 20) % 2 == 0 {
                PositionState::Long
            } else {
                PositionState::Flat
            };
            SignalRecord {
                timestamp: p.timestamp,
                price: p.price,
                regime: RegimeLabel(i % 3),
                target: position,
                position,
                action: Action::Hold,
            }
        })
        .collect();
    AssetTrack::new(symbol, records)
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_features(c: &mut Criterion) {
    let series = make_series(5_000);
    c.bench_function("build_features_5000", |b| {
        b.iter(|| build_features(black_box(&series), 30).unwrap())
    });
}

fn bench_fit(c: &mut Criterion) {
    let frame = build_features(&make_series(1_000), 30).unwrap();
    let mut group = c.benchmark_group("hmm_fit");
    group.sample_size(10);
    for n_states in [2usize, 3] {
        let config = EngineConfig {
            n_states,
            max_iter: 100,
            ..EngineConfig::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(n_states), &config, |b, cfg| {
            b.iter(|| RegimeModel::fit(black_box(&frame), cfg, 42).unwrap())
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let frame = build_features(&make_series(1_000), 30).unwrap();
    let model = RegimeModel::fit(&frame, &EngineConfig::default(), 42).unwrap();
    c.bench_function("viterbi_decode_1000", |b| {
        b.iter(|| model.decode(black_box(&frame)).unwrap())
    });
}

fn bench_backtest(c: &mut Criterion) {
    let tracks = vec![make_track("BTC-USD", 2_000), make_track("ETH-USD", 2_000)];
    c.bench_function("align_and_simulate_2x2000", |b| {
        b.iter(|| {
            let book = align_assets(black_box(&tracks)).unwrap();
            simulate(&book, 0.001).unwrap()
        })
    });
}

criterion_group!(benches, bench_features, bench_fit, bench_decode, bench_backtest);
criterion_main!(benches);
