//! Synthetic market data and books for demos, benchmarks and the CLI.
//!
//! Prices follow a geometric random walk with a common market factor, mild
//! mean reversion and occasional jumps. Everything is driven by a seed, so
//! the same configuration always produces the same market.

use crate::core::currency::CurrencyCode;
use crate::core::error::{Result, RiskError};
use crate::core::instrument::{InstrumentId, ProductCategory};
use crate::core::market_data::{InMemoryPriceHistory, PricePoint, PriceSeries};
use crate::core::position::{CounterpartyId, Position, QuantityUnit, TradeGroupId};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use uuid::Builder;

/// One generated product.
#[derive(Debug, Clone)]
pub struct ProductSpec {
    pub instrument: InstrumentId,
    pub category: ProductCategory,
    pub unit: QuantityUnit,
    pub base_price: Decimal,
    /// Daily return volatility.
    pub daily_volatility: f64,
    /// Daily drift.
    pub drift: f64,
}

impl ProductSpec {
    pub fn new(
        instrument: &str,
        category: ProductCategory,
        unit: QuantityUnit,
        base_price: Decimal,
        daily_volatility: f64,
        drift: f64,
    ) -> Self {
        Self {
            instrument: InstrumentId::new(instrument),
            category,
            unit,
            base_price,
            daily_volatility,
            drift,
        }
    }
}

/// Configuration for generating price histories.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub products: Vec<ProductSpec>,
    /// Last generated date.
    pub end_date: NaiveDate,
    /// Calendar days of history; weekends are skipped.
    pub days: u32,
    /// Share of variance driven by the common oil factor.
    pub market_correlation: f64,
    /// Daily probability of a jump.
    pub jump_probability: f64,
    /// Shock multiplier on jump days.
    pub jump_scale: f64,
    pub seed: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            products: default_products(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap_or_default(),
            days: 365,
            market_correlation: 0.6,
            jump_probability: 0.05,
            jump_scale: 2.5,
            seed: 42,
        }
    }
}

/// Crude, fuel oil, gasoil and jet benchmarks.
pub fn default_products() -> Vec<ProductSpec> {
    vec![
        ProductSpec::new("BRENT", ProductCategory::crude_oil(), QuantityUnit::Barrels, dec!(85.00), 0.025, 0.0001),
        ProductSpec::new("WTI", ProductCategory::crude_oil(), QuantityUnit::Barrels, dec!(80.00), 0.025, 0.0001),
        ProductSpec::new("380CST", ProductCategory::fuel_oil(), QuantityUnit::MetricTons, dec!(450.00), 0.020, 0.0002),
        ProductSpec::new("MF05", ProductCategory::fuel_oil(), QuantityUnit::MetricTons, dec!(520.00), 0.022, 0.0001),
        ProductSpec::new("GASOIL", ProductCategory::gasoil(), QuantityUnit::MetricTons, dec!(680.00), 0.023, 0.00015),
        ProductSpec::new(
            "JET",
            ProductCategory::new(ProductCategory::JET_FUEL),
            QuantityUnit::MetricTons,
            dec!(750.00),
            0.024,
            0.0002,
        ),
    ]
}

/// Generated history plus the latest mark of each product.
#[derive(Debug, Clone)]
pub struct GeneratedMarket {
    pub history: InMemoryPriceHistory,
    pub marks: BTreeMap<InstrumentId, Decimal>,
    pub products: Vec<ProductSpec>,
}

/// Generate daily closes for every product in `config`.
pub fn generate_market(config: &MarketConfig) -> Result<GeneratedMarket> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let start = config.end_date - Duration::days(i64::from(config.days));
    let rho = config.market_correlation.clamp(0.0, 1.0);

    let mut levels: Vec<f64> = config
        .products
        .iter()
        .map(|p| p.base_price.to_f64().unwrap_or(0.0))
        .collect();
    let mut points: Vec<Vec<PricePoint>> = vec![Vec::new(); config.products.len()];

    let mut date = start - Duration::days(1);
    while date < config.end_date {
        date += Duration::days(1);
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            continue;
        }
        let common: f64 = StandardNormal.sample(&mut rng);
        for (i, product) in config.products.iter().enumerate() {
            let idio: f64 = StandardNormal.sample(&mut rng);
            let mut shock =
                product.daily_volatility * (rho.sqrt() * common + (1.0 - rho).sqrt() * idio);
            if rng.gen::<f64>() < config.jump_probability {
                shock *= config.jump_scale;
            }
            if !points[i].is_empty() {
                let base = product.base_price.to_f64().unwrap_or(levels[i]);
                let reversion = 0.01 * (base - levels[i]) / base;
                levels[i] = (levels[i] * (1.0 + product.drift + reversion + shock)).max(base * 0.3);
            }
            let price = Decimal::from_f64_retain(levels[i])
                .ok_or_else(|| {
                    RiskError::InvalidMarketData(format!(
                        "{}: generated price {} is not representable",
                        product.instrument, levels[i]
                    ))
                })?
                .round_dp(2);
            points[i].push(PricePoint::new(date, price));
        }
    }

    let mut history = InMemoryPriceHistory::new();
    let mut marks = BTreeMap::new();
    for (product, series_points) in config.products.iter().zip(points) {
        let series = PriceSeries::new(product.instrument.clone(), series_points)?;
        if let Some(last) = series.last() {
            marks.insert(product.instrument.clone(), last.price);
        }
        history.insert(series);
    }

    Ok(GeneratedMarket {
        history,
        marks,
        products: config.products.clone(),
    })
}

/// Configuration for generating a random book.
#[derive(Debug, Clone)]
pub struct BookConfig {
    pub position_count: usize,
    pub counterparties: Vec<CounterpartyId>,
    /// Smallest absolute quantity in base units.
    pub min_quantity: f64,
    /// Largest absolute quantity in base units.
    pub max_quantity: f64,
    /// Probability that a position is hedged by an offsetting leg in a trade group.
    pub hedge_probability: f64,
    pub seed: u64,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            position_count: 20,
            counterparties: ["SHELL-ST", "VITOL-SA", "TRAFIGURA", "GLENCORE", "BP-OIL"]
                .iter()
                .map(|c| CounterpartyId::new(*c))
                .collect(),
            min_quantity: 1_000.0,
            max_quantity: 100_000.0,
            hedge_probability: 0.3,
            seed: 7,
        }
    }
}

/// Generate a random long/short book marked at the market's last prices.
///
/// Hedged positions get an offsetting leg in a related product of the same
/// category, sharing a fresh trade group.
pub fn generate_random_book(market: &GeneratedMarket, config: &BookConfig) -> Vec<Position> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut positions = Vec::with_capacity(config.position_count);
    if market.products.is_empty() || config.counterparties.is_empty() {
        return positions;
    }

    let mut group_seq = 0usize;
    while positions.len() < config.position_count {
        let product = &market.products[rng.gen_range(0..market.products.len())];
        let counterparty = &config.counterparties[rng.gen_range(0..config.counterparties.len())];
        let low = config.min_quantity.min(config.max_quantity);
        let high = config.max_quantity.max(low + 1.0);
        let size = rng.gen_range(low..high).round();
        let side = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let quantity = Decimal::from_f64_retain(side * size).unwrap_or(Decimal::ZERO);

        let mut leg = make_position(&mut rng, market, product, quantity, counterparty);
        if rng.gen::<f64>() < config.hedge_probability && positions.len() + 1 < config.position_count {
            group_seq += 1;
            let group = TradeGroupId::new(format!("TG-{:04}", group_seq));
            let partner = market
                .products
                .iter()
                .filter(|p| p.category == product.category)
                .nth(rng.gen_range(0..2))
                .unwrap_or(product);
            let hedge = make_position(&mut rng, market, partner, -quantity, counterparty)
                .in_trade_group(group.clone());
            leg = leg.in_trade_group(group);
            positions.push(leg);
            positions.push(hedge);
        } else {
            positions.push(leg);
        }
    }
    positions
}

fn make_position(
    rng: &mut StdRng,
    market: &GeneratedMarket,
    product: &ProductSpec,
    quantity: Decimal,
    counterparty: &CounterpartyId,
) -> Position {
    let price = market
        .marks
        .get(&product.instrument)
        .copied()
        .unwrap_or(product.base_price);
    Position::with_id(
        Builder::from_random_bytes(rng.gen()).into_uuid(),
        product.instrument.clone(),
        product.category.clone(),
        quantity,
        product.unit,
        price,
        CurrencyCode::usd(),
        counterparty.clone(),
    )
}
