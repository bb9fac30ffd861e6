use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use risk_engine::core::config::RiskConfig;
use risk_engine::core::currency::{CurrencyCode, FxRateTable};
use risk_engine::engine::RiskEngine;
use risk_engine::simulation::market_generator::{
    generate_market, generate_random_book, BookConfig, MarketConfig,
};
use risk_engine::var::{DeltaNormal, HistoricalSimulation, MonteCarlo, VarInputs, VarModel};
use std::sync::Arc;

fn book_inputs(position_count: usize) -> VarInputs {
    let market = generate_market(&MarketConfig::default()).unwrap();
    let positions = generate_random_book(
        &market,
        &BookConfig {
            position_count,
            ..Default::default()
        },
    );
    let engine = RiskEngine::new(
        RiskConfig::default(),
        Arc::new(market.history),
        Arc::new(FxRateTable::new(CurrencyCode::usd())),
    )
    .unwrap();
    let as_of = Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap();
    let portfolio = engine.aggregate(&positions, as_of).unwrap();
    engine.prepare_inputs(&portfolio.exposures, as_of).unwrap()
}

fn bench_delta_normal(c: &mut Criterion) {
    let inputs = book_inputs(100);
    c.bench_function("delta_normal_100_positions", |b| {
        b.iter(|| DeltaNormal.calculate(black_box(&inputs), 0.99))
    });
}

fn bench_historical(c: &mut Criterion) {
    let inputs = book_inputs(100);
    let model = HistoricalSimulation::default();
    c.bench_function("historical_100_positions", |b| {
        b.iter(|| model.calculate(black_box(&inputs), 0.99))
    });
}

fn bench_monte_carlo_10k(c: &mut Criterion) {
    let inputs = book_inputs(100);
    let model = MonteCarlo::new(10_000, 42);
    c.bench_function("monte_carlo_10k_draws", |b| {
        b.iter(|| model.calculate(black_box(&inputs), 0.99))
    });
}

fn bench_prepare_inputs(c: &mut Criterion) {
    let market = generate_market(&MarketConfig::default()).unwrap();
    let positions = generate_random_book(
        &market,
        &BookConfig {
            position_count: 1_000,
            ..Default::default()
        },
    );
    let engine = RiskEngine::new(
        RiskConfig::default(),
        Arc::new(market.history),
        Arc::new(FxRateTable::new(CurrencyCode::usd())),
    )
    .unwrap();
    let as_of = Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap();

    c.bench_function("aggregate_and_estimate_1000_positions", |b| {
        b.iter(|| {
            let portfolio = engine.aggregate(black_box(&positions), as_of).unwrap();
            engine.prepare_inputs(&portfolio.exposures, as_of)
        })
    });
}

criterion_group!(
    benches,
    bench_delta_normal,
    bench_historical,
    bench_monte_carlo_10k,
    bench_prepare_inputs
);
criterion_main!(benches);
