use crate::aggregation::exposure::PositionExposure;
use crate::core::error::{Result, RiskError};
use crate::core::instrument::{InstrumentId, ProductCategory};
use crate::core::position::{CounterpartyId, PositionId};
use log::{info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a limit measures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum LimitScope {
    /// Gross exposure to one counterparty.
    Counterparty(CounterpartyId),
    /// Gross exposure to one product category.
    Product(ProductCategory),
    /// Gross exposure to one instrument.
    Instrument(InstrumentId),
    /// Notional of every individual position.
    SinglePosition,
    /// Gross exposure of the whole book.
    Portfolio,
}

impl LimitScope {
    fn covers(&self, exposure: &PositionExposure) -> bool {
        match self {
            LimitScope::Counterparty(c) => &exposure.counterparty == c,
            LimitScope::Product(p) => &exposure.category == p,
            LimitScope::Instrument(i) => &exposure.instrument == i,
            LimitScope::SinglePosition | LimitScope::Portfolio => true,
        }
    }
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitScope::Counterparty(c) => write!(f, "counterparty {}", c),
            LimitScope::Product(p) => write!(f, "product {}", p),
            LimitScope::Instrument(i) => write!(f, "instrument {}", i),
            LimitScope::SinglePosition => write!(f, "single position"),
            LimitScope::Portfolio => write!(f, "portfolio"),
        }
    }
}

/// A configured exposure ceiling in the reporting currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimit {
    pub name: String,
    pub scope: LimitScope,
    pub limit: Decimal,
    #[serde(default)]
    pub override_allowed: bool,
}

impl RiskLimit {
    pub fn new(name: impl Into<String>, scope: LimitScope, limit: Decimal) -> Self {
        Self {
            name: name.into(),
            scope,
            limit,
            override_allowed: false,
        }
    }

    pub fn with_override(mut self) -> Self {
        self.override_allowed = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Within the warning band below the limit.
    Warning,
    /// Strictly above the limit.
    Breach,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "WARNING"),
            Severity::Breach => write!(f, "BREACH"),
        }
    }
}

/// A limit at or near its ceiling. Derived per request, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitBreach {
    pub limit_name: String,
    pub scope: LimitScope,
    pub current_value: Decimal,
    pub limit_value: Decimal,
    pub severity: Severity,
    pub override_permitted: bool,
    /// Set for single-position limits.
    pub position_id: Option<PositionId>,
}

impl LimitBreach {
    /// Current value as a fraction of the limit.
    pub fn utilization(&self) -> Decimal {
        if self.limit_value == Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.current_value / self.limit_value
    }
}

impl fmt::Display for LimitBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {} / {}",
            self.severity,
            self.limit_name,
            self.scope,
            self.current_value.round_dp(2),
            self.limit_value
        )?;
        if let Some(id) = self.position_id {
            write!(f, " position {}", id)?;
        }
        if self.override_permitted {
            write!(f, " [override permitted]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreTradeDecision {
    /// No limit would be exceeded.
    Approved,
    /// Limits would be exceeded, all of them allow an override, and one was requested.
    ApprovedWithOverride,
    Rejected,
}

/// Outcome of checking a candidate position against the limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreTradeCheck {
    pub decision: PreTradeDecision,
    /// Breaches and warnings in the scopes the candidate touches.
    pub breaches: Vec<LimitBreach>,
    pub override_requested: bool,
}

impl PreTradeCheck {
    pub fn is_allowed(&self) -> bool {
        self.decision != PreTradeDecision::Rejected
    }
}

/// Evaluates exposures against a limit set.
///
/// A pure function of its inputs: current value is the sum of absolute
/// notionals in the limit's scope (gross, never netted). A limit is breached
/// only when that value strictly exceeds it; a value exactly at the limit is
/// a Warning.
#[derive(Debug, Clone)]
pub struct LimitMonitor {
    warning_threshold: Decimal,
}

impl LimitMonitor {
    pub fn new(warning_threshold: Decimal) -> Self {
        Self { warning_threshold }
    }

    pub fn warning_threshold(&self) -> Decimal {
        self.warning_threshold
    }

    /// Check that every limit is usable.
    pub fn validate(limits: &[RiskLimit]) -> Result<()> {
        for limit in limits {
            if limit.limit <= Decimal::ZERO {
                return Err(RiskError::configuration(format!(
                    "limit '{}' has non-positive value {}",
                    limit.name, limit.limit
                )));
            }
        }
        Ok(())
    }

    /// Every Warning and Breach across all limits. Limits never suppress
    /// one another.
    pub fn evaluate(
        &self,
        exposures: &[PositionExposure],
        limits: &[RiskLimit],
    ) -> Result<Vec<LimitBreach>> {
        Self::validate(limits)?;

        let mut breaches = Vec::new();
        for limit in limits {
            match &limit.scope {
                LimitScope::SinglePosition => {
                    for exposure in exposures {
                        if let Some(b) = self.classify(limit, exposure.notional.abs(), Some(exposure.position_id)) {
                            breaches.push(b);
                        }
                    }
                }
                scope => {
                    let value: Decimal = exposures
                        .iter()
                        .filter(|e| scope.covers(e))
                        .map(|e| e.notional.abs())
                        .sum();
                    if let Some(b) = self.classify(limit, value, None) {
                        breaches.push(b);
                    }
                }
            }
        }

        for breach in breaches.iter().filter(|b| b.severity == Severity::Breach) {
            warn!("limit breached: {}", breach);
        }
        Ok(breaches)
    }

    /// Whether `candidate` may be added to `existing`.
    ///
    /// Only limits whose scope covers the candidate are reported. The
    /// override flag is evaluated, never recorded.
    pub fn evaluate_new_position(
        &self,
        existing: &[PositionExposure],
        candidate: &PositionExposure,
        limits: &[RiskLimit],
        override_requested: bool,
    ) -> Result<PreTradeCheck> {
        let mut book = existing.to_vec();
        book.push(candidate.clone());

        let breaches: Vec<LimitBreach> = self
            .evaluate(&book, limits)?
            .into_iter()
            .filter(|b| match b.scope {
                LimitScope::SinglePosition => b.position_id == Some(candidate.position_id),
                ref scope => scope.covers(candidate),
            })
            .collect();

        let hard: Vec<&LimitBreach> = breaches
            .iter()
            .filter(|b| b.severity == Severity::Breach)
            .collect();
        let decision = if hard.is_empty() {
            PreTradeDecision::Approved
        } else if override_requested && hard.iter().all(|b| b.override_permitted) {
            PreTradeDecision::ApprovedWithOverride
        } else {
            PreTradeDecision::Rejected
        };
        info!(
            "pre-trade check for {}: {:?} ({} limit(s) breached)",
            candidate.position_id,
            decision,
            hard.len()
        );

        Ok(PreTradeCheck {
            decision,
            breaches,
            override_requested,
        })
    }

    fn classify(
        &self,
        limit: &RiskLimit,
        value: Decimal,
        position_id: Option<PositionId>,
    ) -> Option<LimitBreach> {
        let warning_floor = limit.limit * (Decimal::ONE - self.warning_threshold);
        let severity = if value > limit.limit {
            Severity::Breach
        } else if value >= warning_floor {
            Severity::Warning
        } else {
            return None;
        };
        Some(LimitBreach {
            limit_name: limit.name.clone(),
            scope: limit.scope.clone(),
            current_value: value,
            limit_value: limit.limit,
            severity,
            override_permitted: limit.override_allowed,
            position_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn exposure(counterparty: &str, category: ProductCategory, notional: Decimal) -> PositionExposure {
        PositionExposure {
            position_id: Uuid::new_v4(),
            instrument: InstrumentId::new("BRENT-2026-03"),
            category,
            counterparty: CounterpartyId::new(counterparty),
            trade_group: None,
            base_quantity: notional / dec!(80),
            notional,
        }
    }

    fn monitor() -> LimitMonitor {
        LimitMonitor::new(dec!(0.10))
    }

    #[test]
    fn test_exactly_at_limit_is_not_a_breach() {
        let book = vec![exposure("BP", ProductCategory::crude_oil(), dec!(1_000_000))];
        let limits = vec![RiskLimit::new(
            "BP exposure",
            LimitScope::Counterparty(CounterpartyId::new("BP")),
            dec!(1_000_000),
        )];
        let breaches = monitor().evaluate(&book, &limits).unwrap();
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].severity, Severity::Warning);
    }

    #[test]
    fn test_one_cent_over_is_a_breach() {
        let book = vec![exposure("BP", ProductCategory::crude_oil(), dec!(1_000_000.01))];
        let limits = vec![RiskLimit::new(
            "BP exposure",
            LimitScope::Counterparty(CounterpartyId::new("BP")),
            dec!(1_000_000),
        )];
        let breaches = monitor().evaluate(&book, &limits).unwrap();
        assert_eq!(breaches[0].severity, Severity::Breach);
    }

    #[test]
    fn test_gross_ignores_netting() {
        let book = vec![
            exposure("SHELL", ProductCategory::crude_oil(), dec!(800_000)),
            exposure("SHELL", ProductCategory::crude_oil(), dec!(-800_000)),
        ];
        let limits = vec![RiskLimit::new(
            "Shell exposure",
            LimitScope::Counterparty(CounterpartyId::new("SHELL")),
            dec!(1_500_000),
        )];
        let breaches = monitor().evaluate(&book, &limits).unwrap();
        assert_eq!(breaches[0].current_value, dec!(1_600_000));
        assert_eq!(breaches[0].severity, Severity::Breach);
    }

    #[test]
    fn test_below_warning_band_is_silent() {
        let book = vec![exposure("BP", ProductCategory::crude_oil(), dec!(899_999))];
        let limits = vec![RiskLimit::new("Book", LimitScope::Portfolio, dec!(1_000_000))];
        assert!(monitor().evaluate(&book, &limits).unwrap().is_empty());
    }

    #[test]
    fn test_all_scopes_reported() {
        let book = vec![exposure("VITOL", ProductCategory::gasoil(), dec!(2_000_000))];
        let limits = vec![
            RiskLimit::new(
                "Vitol",
                LimitScope::Counterparty(CounterpartyId::new("VITOL")),
                dec!(1_000_000),
            ),
            RiskLimit::new("Gasoil", LimitScope::Product(ProductCategory::gasoil()), dec!(1_500_000)),
            RiskLimit::new("Ticket size", LimitScope::SinglePosition, dec!(1_900_000)),
        ];
        let breaches = monitor().evaluate(&book, &limits).unwrap();
        assert_eq!(breaches.len(), 3);
        assert!(breaches.iter().all(|b| b.severity == Severity::Breach));
        assert!(breaches[2].position_id.is_some());
    }

    #[test]
    fn test_non_positive_limit_is_configuration_error() {
        let limits = vec![RiskLimit::new("broken", LimitScope::Portfolio, dec!(0))];
        let result = monitor().evaluate(&[], &limits);
        assert!(matches!(result, Err(RiskError::ConfigurationError(_))));
    }

    #[test]
    fn test_pre_trade_override() {
        let existing = vec![exposure("BP", ProductCategory::crude_oil(), dec!(900_000))];
        let candidate = exposure("BP", ProductCategory::crude_oil(), dec!(200_000));
        let soft = vec![RiskLimit::new(
            "BP",
            LimitScope::Counterparty(CounterpartyId::new("BP")),
            dec!(1_000_000),
        )
        .with_override()];

        let m = monitor();
        let refused = m.evaluate_new_position(&existing, &candidate, &soft, false).unwrap();
        assert_eq!(refused.decision, PreTradeDecision::Rejected);

        let accepted = m.evaluate_new_position(&existing, &candidate, &soft, true).unwrap();
        assert_eq!(accepted.decision, PreTradeDecision::ApprovedWithOverride);
        assert!(accepted.is_allowed());

        let hard = vec![RiskLimit::new(
            "BP",
            LimitScope::Counterparty(CounterpartyId::new("BP")),
            dec!(1_000_000),
        )];
        let blocked = m.evaluate_new_position(&existing, &candidate, &hard, true).unwrap();
        assert_eq!(blocked.decision, PreTradeDecision::Rejected);
    }

    #[test]
    fn test_pre_trade_ignores_unrelated_scopes() {
        let existing = vec![exposure("BP", ProductCategory::crude_oil(), dec!(5_000_000))];
        let candidate = exposure("TOTAL", ProductCategory::crude_oil(), dec!(100_000));
        let limits = vec![RiskLimit::new(
            "BP",
            LimitScope::Counterparty(CounterpartyId::new("BP")),
            dec!(1_000_000),
        )];
        let check = monitor()
            .evaluate_new_position(&existing, &candidate, &limits, false)
            .unwrap();
        assert_eq!(check.decision, PreTradeDecision::Approved);
        assert!(check.breaches.is_empty());
    }
}
