//! # risk-engine
//!
//! Portfolio Value-at-Risk engine for physical and derivative oil books.
//!
//! Given open positions, price history and FX rates, the engine measures
//! market risk with three interchangeable VaR methodologies, shows how much
//! risk natural hedges remove, checks concentration limits and runs
//! deterministic stress scenarios.
//!
//! ## Architecture
//!
//! - **core** — Positions, instruments, currencies, market data, configuration, errors
//! - **estimation** — Volatility and correlation estimation, matrix repair
//! - **aggregation** — Exposure vectors and trade-group (hedge) netting
//! - **var** — Delta-Normal, Historical Simulation and Monte Carlo VaR
//! - **limits** — Concentration limits and pre-trade checks
//! - **simulation** — Stress scenarios and synthetic market data
//! - **engine** — The operations exposed to callers
//! - **cache** — Fail-open result cache in front of the engine

pub mod aggregation;
pub mod cache;
pub mod core;
pub mod engine;
pub mod estimation;
pub mod limits;
pub mod simulation;
pub mod var;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::aggregation::exposure::{ExposureVector, PositionAggregator};
    pub use crate::aggregation::trade_group::TradeGroupRisk;
    pub use crate::core::config::RiskConfig;
    pub use crate::core::currency::{CurrencyCode, FxRateTable};
    pub use crate::core::error::RiskError;
    pub use crate::core::instrument::{InstrumentId, ProductCategory};
    pub use crate::core::market_data::{InMemoryPriceHistory, PricePoint, PriceSeries};
    pub use crate::core::position::{CounterpartyId, Position, QuantityUnit, TradeGroupId};
    pub use crate::engine::{RiskEngine, VarRequest};
    pub use crate::limits::monitor::{LimitBreach, LimitScope, RiskLimit, Severity};
    pub use crate::simulation::stress_test::{StressResult, StressScenario};
    pub use crate::var::{DataQualityFlag, Methodology, VarResult};
}
