//! Read-only collaborators supplying the book: positions, trade-group
//! memberships, risk limits and stress scenarios.

use crate::core::error::Result;
use crate::core::position::{Position, PositionId, TradeGroupId};
use crate::limits::monitor::RiskLimit;
use crate::simulation::stress_test::StressScenario;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Trade-group membership: each position belongs to at most one group.
pub type Memberships = HashMap<PositionId, TradeGroupId>;

pub trait PositionSource: Send + Sync {
    /// Snapshot of open positions at `as_of`.
    fn open_positions(&self, as_of: DateTime<Utc>) -> Result<Vec<Position>>;
}

pub trait TradeGroupSource: Send + Sync {
    fn trade_group_memberships(&self) -> Result<Memberships>;
}

pub trait LimitSource: Send + Sync {
    fn risk_limits(&self) -> Result<Vec<RiskLimit>>;
}

pub trait ScenarioSource: Send + Sync {
    fn stress_scenarios(&self) -> Result<Vec<StressScenario>>;
}

/// Memberships declared on the positions themselves.
pub fn memberships_from_positions(positions: &[Position]) -> Memberships {
    positions
        .iter()
        .filter_map(|p| p.trade_group().map(|g| (p.id(), g.clone())))
        .collect()
}

/// A complete book held in memory. Used by the CLI and in tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryBook {
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub limits: Vec<RiskLimit>,
    #[serde(default)]
    pub scenarios: Vec<StressScenario>,
}

impl InMemoryBook {
    pub fn new(positions: Vec<Position>) -> Self {
        Self {
            positions,
            ..Default::default()
        }
    }
}

impl PositionSource for InMemoryBook {
    fn open_positions(&self, _as_of: DateTime<Utc>) -> Result<Vec<Position>> {
        Ok(self.positions.clone())
    }
}

impl TradeGroupSource for InMemoryBook {
    fn trade_group_memberships(&self) -> Result<Memberships> {
        Ok(memberships_from_positions(&self.positions))
    }
}

impl LimitSource for InMemoryBook {
    fn risk_limits(&self) -> Result<Vec<RiskLimit>> {
        Ok(self.limits.clone())
    }
}

impl ScenarioSource for InMemoryBook {
    fn stress_scenarios(&self) -> Result<Vec<StressScenario>> {
        Ok(self.scenarios.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::CurrencyCode;
    use crate::core::instrument::{InstrumentId, ProductCategory};
    use crate::core::position::{CounterpartyId, QuantityUnit};
    use rust_decimal_macros::dec;

    #[test]
    fn test_memberships_from_positions() {
        let grouped = Position::new(
            InstrumentId::new("BRENT-2026-03"),
            ProductCategory::crude_oil(),
            dec!(1000),
            QuantityUnit::Barrels,
            dec!(80),
            CurrencyCode::usd(),
            CounterpartyId::new("BP"),
        )
        .in_trade_group(TradeGroupId::new("HEDGE-7"));
        let loose = Position::new(
            InstrumentId::new("WTI-2026-03"),
            ProductCategory::crude_oil(),
            dec!(1000),
            QuantityUnit::Barrels,
            dec!(76),
            CurrencyCode::usd(),
            CounterpartyId::new("BP"),
        );

        let book = InMemoryBook::new(vec![grouped.clone(), loose]);
        let memberships = book.trade_group_memberships().unwrap();
        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[&grouped.id()].as_str(), "HEDGE-7");
    }
}
