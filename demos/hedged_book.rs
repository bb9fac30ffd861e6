//! Hedged book example.
//!
//! A physical cargo hedged with paper, grouped in a trade group: shows the
//! gross vs net VaR, the limit report, a pre-trade check and the preset
//! stress scenarios.

use chrono::{TimeZone, Utc};
use risk_engine::core::sources::memberships_from_positions;
use risk_engine::prelude::*;
use risk_engine::simulation::market_generator::{generate_market, MarketConfig};
use risk_engine::simulation::stress_test::preset_scenarios;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn main() {
    println!("╔══════════════════════════════════════════╗");
    println!("║  risk-engine: Hedged Book Example        ║");
    println!("╚══════════════════════════════════════════╝\n");

    let market = generate_market(&MarketConfig::default()).expect("market generation");
    let engine = RiskEngine::new(
        RiskConfig::default(),
        Arc::new(market.history),
        Arc::new(FxRateTable::new(CurrencyCode::usd())),
    )
    .and_then(|e| {
        e.with_limits(vec![
            RiskLimit::new(
                "Vitol exposure",
                LimitScope::Counterparty(CounterpartyId::new("VITOL-SA")),
                dec!(60_000_000),
            )
            .with_override(),
            RiskLimit::new(
                "Crude concentration",
                LimitScope::Product(ProductCategory::crude_oil()),
                dec!(100_000_000),
            ),
            RiskLimit::new("Single deal", LimitScope::SinglePosition, dec!(50_000_000)),
        ])
    })
    .expect("valid configuration");

    let cargo = TradeGroupId::new("CARGO-0417");
    let positions = vec![
        // Physical: 600kb Brent cargo bought from Vitol.
        Position::new(
            InstrumentId::new("BRENT"),
            ProductCategory::crude_oil(),
            dec!(600_000),
            QuantityUnit::Barrels,
            dec!(85.00),
            CurrencyCode::usd(),
            CounterpartyId::new("VITOL-SA"),
        )
        .in_trade_group(cargo.clone()),
        // Paper: 600 lots of Brent futures sold against it.
        Position::new(
            InstrumentId::new("BRENT"),
            ProductCategory::crude_oil(),
            dec!(-600),
            QuantityUnit::Lots { size: dec!(1_000) },
            dec!(85.00),
            CurrencyCode::usd(),
            CounterpartyId::new("ICE-CLEAR"),
        )
        .in_trade_group(cargo),
        // Unhedged WTI length.
        Position::new(
            InstrumentId::new("WTI"),
            ProductCategory::crude_oil(),
            dec!(250_000),
            QuantityUnit::Barrels,
            dec!(80.00),
            CurrencyCode::usd(),
            CounterpartyId::new("VITOL-SA"),
        ),
    ];
    let as_of = Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap();

    // --- Gross vs net ---
    println!("━━━ Hedge Effectiveness ━━━\n");
    let request = VarRequest::new(0.95, Methodology::DeltaNormal, as_of);
    let risk = engine
        .calculate_trade_group_risk(&positions, &memberships_from_positions(&positions), &request)
        .expect("trade group risk");
    println!("{}", risk);

    // --- Limits ---
    println!("━━━ Limit Report ━━━\n");
    let breaches = engine.evaluate_limits(&positions, as_of).expect("limit evaluation");
    if breaches.is_empty() {
        println!("  All limits within bounds.");
    }
    for breach in &breaches {
        println!("  {}", breach);
    }
    println!();

    // --- Pre-trade ---
    println!("━━━ Pre-Trade Check ━━━\n");
    let candidate = Position::new(
        InstrumentId::new("WTI"),
        ProductCategory::crude_oil(),
        dec!(400_000),
        QuantityUnit::Barrels,
        dec!(80.00),
        CurrencyCode::usd(),
        CounterpartyId::new("VITOL-SA"),
    );
    for override_requested in [false, true] {
        let check = engine
            .evaluate_new_position(&positions, &candidate, override_requested, as_of)
            .expect("pre-trade check");
        println!(
            "  400kb WTI from Vitol (override requested: {}): {:?}",
            override_requested, check.decision
        );
    }
    println!();

    // --- Stress ---
    println!("━━━ Stress Scenarios ━━━\n");
    let results = engine
        .run_stress_scenarios(&positions, &preset_scenarios(), as_of, 0.95)
        .expect("stress scenarios");
    for result in &results {
        println!("{}", result);
    }
}
