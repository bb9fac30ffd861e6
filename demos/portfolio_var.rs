//! Portfolio VaR example.
//!
//! Measures a small crude and products book with all three methodologies
//! against a synthetic year of prices.

use chrono::{TimeZone, Utc};
use risk_engine::prelude::*;
use risk_engine::simulation::market_generator::{generate_market, MarketConfig};
use rust_decimal_macros::dec;
use std::sync::Arc;

fn main() {
    println!("╔══════════════════════════════════════════╗");
    println!("║  risk-engine: Portfolio VaR Example      ║");
    println!("╚══════════════════════════════════════════╝\n");

    let market = generate_market(&MarketConfig::default()).expect("market generation");
    let engine = RiskEngine::new(
        RiskConfig::default(),
        Arc::new(market.history),
        Arc::new(FxRateTable::new(CurrencyCode::usd())),
    )
    .expect("valid configuration");

    let positions = vec![
        Position::new(
            InstrumentId::new("BRENT"),
            ProductCategory::crude_oil(),
            dec!(500_000),
            QuantityUnit::Barrels,
            dec!(85.20),
            CurrencyCode::usd(),
            CounterpartyId::new("SHELL-ST"),
        ),
        Position::new(
            InstrumentId::new("WTI"),
            ProductCategory::crude_oil(),
            dec!(-200_000),
            QuantityUnit::Barrels,
            dec!(80.10),
            CurrencyCode::usd(),
            CounterpartyId::new("VITOL-SA"),
        ),
        Position::new(
            InstrumentId::new("380CST"),
            ProductCategory::fuel_oil(),
            dec!(20_000),
            QuantityUnit::MetricTons,
            dec!(452.00),
            CurrencyCode::usd(),
            CounterpartyId::new("TRAFIGURA"),
        ),
    ];

    println!("Book:");
    for p in &positions {
        println!(
            "  {:<8} {:>10} @ {:>8}  ({})",
            p.instrument().as_str(),
            p.quantity(),
            p.price(),
            p.counterparty()
        );
    }
    println!();

    let as_of = Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap();
    for methodology in [
        Methodology::DeltaNormal,
        Methodology::HistoricalSimulation,
        Methodology::MonteCarlo,
    ] {
        println!("━━━ {} ━━━\n", methodology);
        let request = VarRequest::new(0.95, methodology, as_of);
        let levels = engine
            .calculate_var_levels(&positions, &[0.95, 0.99], &request)
            .expect("VaR calculation");
        for result in &levels {
            println!("{}", result);
        }
    }
}
