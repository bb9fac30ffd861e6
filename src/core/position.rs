use crate::core::currency::CurrencyCode;
use crate::core::instrument::{InstrumentId, ProductCategory};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of an open position.
pub type PositionId = Uuid;

/// Identifier of a trading counterparty.
///
/// # Examples
///
/// ```
/// use risk_engine::core::position::CounterpartyId;
///
/// let shell = CounterpartyId::new("SHELL-ST");
/// let vitol = CounterpartyId::new("VITOL-SA");
/// assert_ne!(shell, vitol);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterpartyId(String);

impl CounterpartyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CounterpartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CounterpartyId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of a multi-leg trading strategy (calendar spread, physical/paper hedge, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeGroupId(String);

impl TradeGroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TradeGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unit a position quantity is expressed in.
///
/// Prices are quoted per base unit (barrel or metric ton); lots carry
/// their contract size in that base unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum QuantityUnit {
    Barrels,
    MetricTons,
    Lots { size: Decimal },
}

impl QuantityUnit {
    /// Base units per unit of quantity.
    pub fn conversion_factor(&self) -> Decimal {
        match self {
            QuantityUnit::Barrels | QuantityUnit::MetricTons => Decimal::ONE,
            QuantityUnit::Lots { size } => *size,
        }
    }
}

/// One open exposure: a physical contract leg or a derivative leg.
///
/// Positions are snapshots supplied by the contract and derivative
/// subsystems. The engine never mutates them. A positive quantity is long
/// (purchase), a negative quantity is short (sale).
///
/// # Examples
///
/// ```
/// use risk_engine::core::position::{CounterpartyId, Position, QuantityUnit};
/// use risk_engine::core::instrument::{InstrumentId, ProductCategory};
/// use risk_engine::core::currency::CurrencyCode;
/// use rust_decimal_macros::dec;
///
/// let position = Position::new(
///     InstrumentId::new("BRENT-2026-03"),
///     ProductCategory::crude_oil(),
///     dec!(-50_000),
///     QuantityUnit::Barrels,
///     dec!(82.40),
///     CurrencyCode::usd(),
///     CounterpartyId::new("VITOL-SA"),
/// );
///
/// assert!(position.is_short());
/// assert_eq!(position.local_notional(), dec!(-4_120_000));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default = "Uuid::new_v4")]
    id: PositionId,
    instrument: InstrumentId,
    category: ProductCategory,
    /// Signed quantity in `unit`.
    quantity: Decimal,
    unit: QuantityUnit,
    /// Reference or mark price per base unit, in `currency`.
    price: Decimal,
    currency: CurrencyCode,
    counterparty: CounterpartyId,
    #[serde(default)]
    trade_group: Option<TradeGroupId>,
}

impl Position {
    pub fn new(
        instrument: InstrumentId,
        category: ProductCategory,
        quantity: Decimal,
        unit: QuantityUnit,
        price: Decimal,
        currency: CurrencyCode,
        counterparty: CounterpartyId,
    ) -> Self {
        Self::with_id(
            Uuid::new_v4(),
            instrument,
            category,
            quantity,
            unit,
            price,
            currency,
            counterparty,
        )
    }

    /// Create a position with a specific ID (useful for testing / determinism).
    #[allow(clippy::too_many_arguments)]
    pub fn with_id(
        id: PositionId,
        instrument: InstrumentId,
        category: ProductCategory,
        quantity: Decimal,
        unit: QuantityUnit,
        price: Decimal,
        currency: CurrencyCode,
        counterparty: CounterpartyId,
    ) -> Self {
        Self {
            id,
            instrument,
            category,
            quantity,
            unit,
            price,
            currency,
            counterparty,
            trade_group: None,
        }
    }

    /// Declare membership of a trade group.
    pub fn in_trade_group(mut self, group: TradeGroupId) -> Self {
        self.trade_group = Some(group);
        self
    }

    // --- Accessors ---

    pub fn id(&self) -> PositionId {
        self.id
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    pub fn category(&self) -> &ProductCategory {
        &self.category
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit(&self) -> QuantityUnit {
        self.unit
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn counterparty(&self) -> &CounterpartyId {
        &self.counterparty
    }

    pub fn trade_group(&self) -> Option<&TradeGroupId> {
        self.trade_group.as_ref()
    }

    pub fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }

    /// Quantity in base units (barrels, metric tons).
    pub fn base_quantity(&self) -> Decimal {
        self.quantity * self.unit.conversion_factor()
    }

    /// Signed notional in the position's own currency.
    pub fn local_notional(&self) -> Decimal {
        self.base_quantity() * self.price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(quantity: Decimal, unit: QuantityUnit) -> Position {
        Position::new(
            InstrumentId::new("ICE-BRN-H26"),
            ProductCategory::crude_oil(),
            quantity,
            unit,
            dec!(80),
            CurrencyCode::usd(),
            CounterpartyId::new("ICE-CLEAR"),
        )
    }

    #[test]
    fn test_lots_use_contract_size() {
        let position = sample(dec!(10), QuantityUnit::Lots { size: dec!(1000) });
        assert_eq!(position.base_quantity(), dec!(10_000));
        assert_eq!(position.local_notional(), dec!(800_000));
    }

    #[test]
    fn test_short_position_has_negative_notional() {
        let position = sample(dec!(-2_500), QuantityUnit::MetricTons);
        assert!(position.is_short());
        assert_eq!(position.local_notional(), dec!(-200_000));
    }

    #[test]
    fn test_trade_group_membership() {
        let position =
            sample(dec!(1), QuantityUnit::Barrels).in_trade_group(TradeGroupId::new("SPREAD-1"));
        assert_eq!(position.trade_group().map(|g| g.as_str()), Some("SPREAD-1"));
    }

    #[test]
    fn test_position_json_round_trip() {
        let position = sample(dec!(5), QuantityUnit::Lots { size: dec!(1000) });
        let json = serde_json::to_string(&position).unwrap();
        let back: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(back, position);
    }
}
