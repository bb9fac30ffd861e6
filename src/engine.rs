//! The risk engine: the operations exposed to the calling workflow.
//!
//! Every call is a pure function of its inputs (positions, the price and FX
//! snapshot behind the collaborators, and the immutable [`RiskConfig`]).
//! The engine holds no mutable state, so one instance can serve concurrent
//! requests.

use crate::aggregation::exposure::{AggregatedPortfolio, ExposureVector, PositionAggregator};
use crate::aggregation::trade_group::{TradeGroupRisk, TradeGroupRiskAggregator};
use crate::core::config::RiskConfig;
use crate::core::currency::FxRateSource;
use crate::core::deadline::{self, Deadline};
use crate::core::error::{Result, RiskError};
use crate::core::instrument::InstrumentId;
use crate::core::market_data::PriceHistorySource;
use crate::core::position::Position;
use crate::core::sources::{Memberships, PositionSource};
use crate::estimation::correlation::{CorrelationEstimator, ReturnSeries};
use crate::estimation::volatility::VolatilityEstimator;
use crate::limits::monitor::{LimitBreach, LimitMonitor, PreTradeCheck, RiskLimit};
use crate::simulation::stress_test::{StressResult, StressScenario, StressTestEngine};
use crate::var::{
    check_confidence, DataQualityFlag, DeltaNormal, HistoricalSimulation, Methodology, MonteCarlo,
    ScenarioHistory, VarInputs, VarModel, VarResult,
};
use chrono::{DateTime, Duration as DateDuration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Parameters of one VaR calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarRequest {
    pub confidence: f64,
    pub methodology: Methodology,
    /// Monte Carlo seed; ignored by the other methodologies. Defaults to the
    /// configured seed.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Valuation time. The price window ends on this date and the result is
    /// stamped with it.
    pub as_of: DateTime<Utc>,
    /// Budget after which the calculation fails with `CalculationTimeout`.
    #[serde(default)]
    pub time_budget: Option<Duration>,
}

impl VarRequest {
    pub fn new(confidence: f64, methodology: Methodology, as_of: DateTime<Utc>) -> Self {
        Self {
            confidence,
            methodology,
            seed: None,
            as_of,
            time_budget: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }
}

/// Portfolio risk engine for an oil book.
///
/// # Examples
///
/// ```
/// use risk_engine::prelude::*;
/// use risk_engine::simulation::market_generator::{generate_market, MarketConfig};
/// use chrono::{TimeZone, Utc};
/// use rust_decimal_macros::dec;
/// use std::sync::Arc;
///
/// let market = generate_market(&MarketConfig::default()).unwrap();
/// let engine = RiskEngine::new(
///     RiskConfig::default(),
///     Arc::new(market.history),
///     Arc::new(FxRateTable::new(CurrencyCode::usd())),
/// )
/// .unwrap();
///
/// let positions = vec![Position::new(
///     InstrumentId::new("BRENT"),
///     ProductCategory::crude_oil(),
///     dec!(100_000),
///     QuantityUnit::Barrels,
///     dec!(85),
///     CurrencyCode::usd(),
///     CounterpartyId::new("SHELL-ST"),
/// )];
///
/// let as_of = Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap();
/// let request = VarRequest::new(0.95, Methodology::DeltaNormal, as_of);
/// let result = engine.calculate_portfolio_var(&positions, &request).unwrap();
/// assert!(result.var > 0.0);
/// assert!(!result.fallback_used());
/// ```
#[derive(Clone)]
pub struct RiskEngine {
    config: RiskConfig,
    prices: Arc<dyn PriceHistorySource>,
    fx: Arc<dyn FxRateSource>,
    limits: Vec<RiskLimit>,
}

impl RiskEngine {
    /// Build an engine; the configuration is validated up front.
    pub fn new(
        config: RiskConfig,
        prices: Arc<dyn PriceHistorySource>,
        fx: Arc<dyn FxRateSource>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            prices,
            fx,
            limits: Vec::new(),
        })
    }

    /// Attach the configured limit set.
    pub fn with_limits(mut self, limits: Vec<RiskLimit>) -> Result<Self> {
        LimitMonitor::validate(&limits)?;
        self.limits = limits;
        Ok(self)
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn limits(&self) -> &[RiskLimit] {
        &self.limits
    }

    /// Convert positions to reporting-currency exposures as of `as_of`.
    pub fn aggregate(&self, positions: &[Position], as_of: DateTime<Utc>) -> Result<AggregatedPortfolio> {
        PositionAggregator::aggregate(
            positions,
            self.fx.as_ref(),
            &self.config.reporting_currency,
            as_of.date_naive(),
        )
    }

    /// Portfolio VaR with the requested methodology.
    pub fn calculate_portfolio_var(
        &self,
        positions: &[Position],
        request: &VarRequest,
    ) -> Result<VarResult> {
        let mut results = self.calculate_var_levels(positions, &[request.confidence], request)?;
        results
            .pop()
            .ok_or_else(|| RiskError::invalid_request("no confidence level requested"))
    }

    /// Portfolio VaR at several confidence levels from one market snapshot.
    /// `request.confidence` is ignored in favour of `confidences`.
    pub fn calculate_var_levels(
        &self,
        positions: &[Position],
        confidences: &[f64],
        request: &VarRequest,
    ) -> Result<Vec<VarResult>> {
        for c in confidences {
            check_confidence(*c)?;
        }
        let deadline = request.time_budget.map(Deadline::after);

        let portfolio = self.aggregate(positions, request.as_of)?;
        deadline::check(deadline.as_ref())?;
        let inputs = self.prepare_inputs(&portfolio.exposures, request.as_of)?;
        deadline::check(deadline.as_ref())?;

        let model = self.model_for(request, deadline);
        let results = confidences
            .iter()
            .map(|c| model.calculate(&inputs, *c))
            .collect::<Result<Vec<_>>>()?;

        for result in &results {
            info!(
                "{} VaR at {:.1}%: {:.2} {} over {} instrument(s){}",
                result.methodology,
                result.confidence * 100.0,
                result.var,
                result.currency,
                inputs.len(),
                if result.is_degraded() { " (degraded data)" } else { "" }
            );
        }
        Ok(results)
    }

    /// Open positions from `source`, then [`Self::calculate_portfolio_var`].
    pub fn calculate_book_var(
        &self,
        source: &dyn PositionSource,
        request: &VarRequest,
    ) -> Result<VarResult> {
        let positions = source.open_positions(request.as_of)?;
        self.calculate_portfolio_var(&positions, request)
    }

    /// Gross and net VaR across trade groups, with hedge effectiveness.
    pub fn calculate_trade_group_risk(
        &self,
        positions: &[Position],
        memberships: &Memberships,
        request: &VarRequest,
    ) -> Result<TradeGroupRisk> {
        check_confidence(request.confidence)?;
        let deadline = request.time_budget.map(Deadline::after);

        let portfolio = self.aggregate(positions, request.as_of)?;
        let inputs = self.prepare_inputs(&portfolio.exposures, request.as_of)?;
        let model = self.model_for(request, deadline);

        let risk = TradeGroupRiskAggregator::aggregate(&portfolio, memberships, |vector| {
            deadline::check(deadline.as_ref())?;
            let sub = Self::restrict(&inputs, vector)?;
            model.calculate(&sub, request.confidence)
        })?;
        info!(
            "trade group risk: gross {:.2}, net {:.2}, effectiveness {:.1}%",
            risk.gross_var,
            risk.net_var,
            risk.hedge_effectiveness * 100.0
        );
        Ok(risk)
    }

    /// Warnings and breaches of the configured limits.
    pub fn evaluate_limits(
        &self,
        positions: &[Position],
        as_of: DateTime<Utc>,
    ) -> Result<Vec<LimitBreach>> {
        if self.limits.is_empty() {
            return Err(RiskError::configuration("no risk limits configured"));
        }
        let portfolio = self.aggregate(positions, as_of)?;
        self.monitor().evaluate(&portfolio.positions, &self.limits)
    }

    /// Whether `candidate` may join `existing` under the configured limits.
    pub fn evaluate_new_position(
        &self,
        existing: &[Position],
        candidate: &Position,
        override_requested: bool,
        as_of: DateTime<Utc>,
    ) -> Result<PreTradeCheck> {
        if self.limits.is_empty() {
            return Err(RiskError::configuration("no risk limits configured"));
        }
        let portfolio = self.aggregate(existing, as_of)?;
        let candidate_exposure = self
            .aggregate(std::slice::from_ref(candidate), as_of)?
            .positions
            .pop()
            .ok_or_else(|| RiskError::invalid_request("candidate position has zero quantity"))?;
        self.monitor().evaluate_new_position(
            &portfolio.positions,
            &candidate_exposure,
            &self.limits,
            override_requested,
        )
    }

    /// Deterministic P&L of one scenario. Scenarios that stress volatility
    /// or correlation also report base and stressed Delta-Normal VaR at
    /// `confidence`.
    pub fn run_stress_scenario(
        &self,
        positions: &[Position],
        scenario: &StressScenario,
        as_of: DateTime<Utc>,
        confidence: f64,
    ) -> Result<StressResult> {
        let mut results =
            self.run_stress_scenarios(positions, std::slice::from_ref(scenario), as_of, confidence)?;
        results
            .pop()
            .ok_or_else(|| RiskError::invalid_request("no scenario supplied"))
    }

    /// Run a scenario set in parallel.
    pub fn run_stress_scenarios(
        &self,
        positions: &[Position],
        scenarios: &[StressScenario],
        as_of: DateTime<Utc>,
        confidence: f64,
    ) -> Result<Vec<StressResult>> {
        check_confidence(confidence)?;
        let portfolio = self.aggregate(positions, as_of)?;
        let inputs = if scenarios.iter().any(StressScenario::stresses_model) {
            Some(self.prepare_inputs(&portfolio.exposures, as_of)?)
        } else {
            None
        };
        StressTestEngine::run_all(
            scenarios,
            &portfolio.exposures,
            inputs.as_ref().map(|i| (i, confidence)),
        )
    }

    /// Estimate volatilities, correlations and the aligned history for the
    /// instruments in `exposures`.
    pub fn prepare_inputs(&self, exposures: &ExposureVector, as_of: DateTime<Utc>) -> Result<VarInputs> {
        let to = as_of.date_naive();
        let from = to - DateDuration::days(i64::from(self.config.lookback_days));
        let estimator = VolatilityEstimator::new(&self.config);

        let instruments = exposures.instruments();
        let mut volatilities = Vec::with_capacity(instruments.len());
        let mut measured = Vec::with_capacity(instruments.len());
        let mut returns: HashMap<InstrumentId, ReturnSeries> = HashMap::new();
        let mut flags = Vec::new();

        for (instrument, exposure) in exposures.iter() {
            let series = self.prices.price_history(instrument, from, to)?;
            let estimate = estimator.estimate(&series, &exposure.category)?;
            let periods = series
                .frequency()
                .periods_per_year(self.config.annualization_factor);
            volatilities.push(estimate.per_period(periods));
            measured.push(!estimate.is_fallback());

            if estimate.is_fallback() {
                flags.push(DataQualityFlag::FallbackVolatility {
                    instrument: instrument.clone(),
                    observations: estimate.observations,
                    volatility: estimate.annualized,
                });
            } else {
                returns.insert(instrument.clone(), series.log_returns(self.config.lookback_days));
            }
        }

        let correlation = CorrelationEstimator::estimate(&instruments, &returns)?;
        flags.extend(correlation.assumed_pairs().iter().map(|(a, b)| {
            DataQualityFlag::AssumedZeroCorrelation {
                first: a.clone(),
                second: b.clone(),
            }
        }));
        if let Some(min_eigenvalue) = correlation.corrected_from() {
            flags.push(DataQualityFlag::CorrelationCorrected { min_eigenvalue });
        }

        let measured_instruments: Vec<InstrumentId> = instruments
            .iter()
            .zip(&measured)
            .filter(|(_, m)| **m)
            .map(|(i, _)| i.clone())
            .collect();
        let history = ScenarioHistory::align(&measured_instruments, &returns);
        debug!(
            "prepared {} instruments ({} measured, {} aligned dates, {} flag(s))",
            instruments.len(),
            measured_instruments.len(),
            history.len(),
            flags.len()
        );

        let mut inputs = VarInputs::new(instruments, exposures.notionals_f64(), volatilities, correlation)?
            .with_measured(measured)?
            .with_history(history)
            .with_horizon(self.config.holding_period_days);
        inputs.currency = exposures.currency().clone();
        inputs.as_of = as_of;
        inputs.flags = flags;
        Ok(inputs)
    }

    fn model_for(&self, request: &VarRequest, deadline: Option<Deadline>) -> Box<dyn VarModel> {
        match request.methodology {
            Methodology::DeltaNormal => Box::new(DeltaNormal),
            Methodology::HistoricalSimulation => {
                Box::new(HistoricalSimulation::new(self.config.min_data_points))
            }
            Methodology::MonteCarlo => Box::new(MonteCarlo {
                simulations: self.config.monte_carlo.simulations,
                seed: request.seed.unwrap_or(self.config.monte_carlo.default_seed),
                deadline,
            }),
        }
    }

    fn monitor(&self) -> LimitMonitor {
        LimitMonitor::new(self.config.warning_threshold)
    }

    /// Inputs for a sub-book, reusing the full book's market model.
    fn restrict(inputs: &VarInputs, vector: &ExposureVector) -> Result<VarInputs> {
        let indices = vector
            .instruments()
            .iter()
            .map(|id| {
                inputs
                    .instruments
                    .iter()
                    .position(|i| i == id)
                    .ok_or_else(|| RiskError::invalid_request(format!("{} is not in the book", id)))
            })
            .collect::<Result<Vec<usize>>>()?;
        let mut sub = inputs.subset(&indices);
        sub.exposures = vector.notionals_f64();
        Ok(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::{CurrencyCode, FxRateTable};
    use crate::core::instrument::ProductCategory;
    use crate::core::market_data::{InMemoryPriceHistory, PricePoint, PriceSeries};
    use crate::core::position::{CounterpartyId, QuantityUnit, TradeGroupId};
    use crate::limits::monitor::{LimitScope, Severity};
    use crate::simulation::stress_test::preset_scenarios;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap()
    }

    /// Daily prices ending on the valuation date, alternating around `base`.
    fn series(instrument: &str, days: i64, base: f64, swing: f64) -> PriceSeries {
        let end = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let points = (0..days)
            .map(|k| {
                let date = end - DateDuration::days(days - 1 - k);
                let price = if k % 2 == 0 { base } else { base * (1.0 + swing) };
                PricePoint::new(date, Decimal::from_f64_retain(price).unwrap().round_dp(4))
            })
            .collect();
        PriceSeries::new(InstrumentId::new(instrument), points).unwrap()
    }

    fn engine() -> RiskEngine {
        let history: InMemoryPriceHistory = vec![
            series("BRENT", 120, 80.0, 0.02),
            series("WTI", 120, 76.0, 0.018),
            series("GASOIL", 5, 700.0, 0.01),
        ]
        .into_iter()
        .collect();
        RiskEngine::new(
            RiskConfig::default(),
            Arc::new(history),
            Arc::new(FxRateTable::new(CurrencyCode::usd())),
        )
        .unwrap()
    }

    fn position(instrument: &str, category: ProductCategory, qty: Decimal, price: Decimal) -> Position {
        Position::new(
            InstrumentId::new(instrument),
            category,
            qty,
            QuantityUnit::Barrels,
            price,
            CurrencyCode::usd(),
            CounterpartyId::new("SHELL-ST"),
        )
    }

    #[test]
    fn test_thin_history_uses_fallback_and_flags_it() {
        let positions = vec![position("GASOIL", ProductCategory::gasoil(), dec!(1_000), dec!(700))];
        let request = VarRequest::new(0.95, Methodology::DeltaNormal, as_of());
        let result = engine().calculate_portfolio_var(&positions, &request).unwrap();

        assert!(result.fallback_used());
        let expected = 1.6448536269514722 * 700_000.0 * 0.30 / 252f64.sqrt();
        assert!((result.var - expected).abs() < 1e-6);
        assert_eq!(result.calculated_at, as_of());
    }

    #[test]
    fn test_unknown_instrument_is_missing_market_data() {
        let positions = vec![position("DUBAI", ProductCategory::crude_oil(), dec!(1_000), dec!(78))];
        let request = VarRequest::new(0.95, Methodology::DeltaNormal, as_of());
        let result = engine().calculate_portfolio_var(&positions, &request);
        assert!(matches!(result, Err(RiskError::MissingMarketData(_))));
    }

    #[test]
    fn test_var_levels_are_ordered() {
        let positions = vec![
            position("BRENT", ProductCategory::crude_oil(), dec!(10_000), dec!(80)),
            position("WTI", ProductCategory::crude_oil(), dec!(-5_000), dec!(76)),
        ];
        let request = VarRequest::new(0.95, Methodology::HistoricalSimulation, as_of());
        let levels = engine()
            .calculate_var_levels(&positions, &[0.95, 0.99], &request)
            .unwrap();
        assert_eq!(levels.len(), 2);
        assert!(levels[1].var >= levels[0].var);
        assert!(levels.iter().all(|r| r.scenarios > 0));
    }

    #[test]
    fn test_monte_carlo_uses_configured_seed() {
        let positions = vec![position("BRENT", ProductCategory::crude_oil(), dec!(10_000), dec!(80))];
        let request = VarRequest::new(0.99, Methodology::MonteCarlo, as_of());
        let result = engine().calculate_portfolio_var(&positions, &request).unwrap();
        assert_eq!(result.seed, Some(42));
        assert_eq!(result.scenarios, 10_000);
    }

    #[test]
    fn test_trade_group_hedge() {
        let group = TradeGroupId::new("PHYS-PAPER");
        let positions = vec![
            position("BRENT", ProductCategory::crude_oil(), dec!(10_000), dec!(80))
                .in_trade_group(group.clone()),
            position("BRENT", ProductCategory::crude_oil(), dec!(-10_000), dec!(80))
                .in_trade_group(group),
        ];
        let memberships = crate::core::sources::memberships_from_positions(&positions);
        let request = VarRequest::new(0.95, Methodology::DeltaNormal, as_of());
        let risk = engine()
            .calculate_trade_group_risk(&positions, &memberships, &request)
            .unwrap();
        assert!(risk.gross_var > 0.0);
        assert_eq!(risk.net_var, 0.0);
        assert_eq!(risk.hedge_effectiveness, 1.0);
    }

    fn gasoil_fallback_flagged(flags: &[DataQualityFlag]) -> bool {
        flags.iter().any(|f| {
            matches!(
                f,
                DataQualityFlag::FallbackVolatility { instrument, observations: 5, .. }
                    if instrument.as_str() == "GASOIL"
            )
        })
    }

    #[test]
    fn test_trade_group_risk_keeps_fallback_flags() {
        let group = TradeGroupId::new("CARGO");
        let positions = vec![
            position("GASOIL", ProductCategory::gasoil(), dec!(1_000), dec!(700))
                .in_trade_group(group.clone()),
            position("BRENT", ProductCategory::crude_oil(), dec!(-8_000), dec!(80))
                .in_trade_group(group),
        ];
        let memberships = crate::core::sources::memberships_from_positions(&positions);
        let request = VarRequest::new(0.95, Methodology::DeltaNormal, as_of());
        let risk = engine()
            .calculate_trade_group_risk(&positions, &memberships, &request)
            .unwrap();

        assert!(risk.is_degraded());
        assert!(gasoil_fallback_flagged(&risk.flags));
    }

    #[test]
    fn test_stress_results_keep_fallback_flags() {
        let positions = vec![
            position("GASOIL", ProductCategory::gasoil(), dec!(1_000), dec!(700)),
            position("BRENT", ProductCategory::crude_oil(), dec!(10_000), dec!(80)),
        ];
        let results = engine()
            .run_stress_scenarios(&positions, &preset_scenarios(), as_of(), 0.95)
            .unwrap();

        // Price-only shocks report no VaR and so no flags.
        assert!(results[0].flags.is_empty());
        let breakdown = &results[3];
        assert!(breakdown.stressed_var.is_some());
        assert!(breakdown.is_degraded());
        assert!(gasoil_fallback_flagged(&breakdown.flags));
    }

    #[test]
    fn test_limits_require_configuration() {
        let positions = vec![position("BRENT", ProductCategory::crude_oil(), dec!(10_000), dec!(80))];
        let result = engine().evaluate_limits(&positions, as_of());
        assert!(matches!(result, Err(RiskError::ConfigurationError(_))));

        let limited = engine()
            .with_limits(vec![RiskLimit::new(
                "Shell",
                LimitScope::Counterparty(CounterpartyId::new("SHELL-ST")),
                dec!(700_000),
            )])
            .unwrap();
        let breaches = limited.evaluate_limits(&positions, as_of()).unwrap();
        assert_eq!(breaches[0].severity, Severity::Breach);
        assert_eq!(breaches[0].current_value, dec!(800_000));
    }

    #[test]
    fn test_stress_presets() {
        let positions = vec![
            position("BRENT", ProductCategory::crude_oil(), dec!(10_000), dec!(80)),
            position("WTI", ProductCategory::crude_oil(), dec!(10_000), dec!(76)),
        ];
        let results = engine()
            .run_stress_scenarios(&positions, &preset_scenarios(), as_of(), 0.95)
            .unwrap();
        assert_eq!(results[0].pnl, dec!(-156_000));
        let breakdown = &results[3];
        assert!(breakdown.stressed_var.unwrap() > breakdown.base_var.unwrap());
    }

    #[test]
    fn test_timeout_surfaces_as_error() {
        let positions = vec![position("BRENT", ProductCategory::crude_oil(), dec!(10_000), dec!(80))];
        let request = VarRequest::new(0.95, Methodology::MonteCarlo, as_of())
            .with_time_budget(Duration::ZERO);
        let result = engine().calculate_portfolio_var(&positions, &request);
        assert!(matches!(result, Err(RiskError::CalculationTimeout { .. })));
    }
}
