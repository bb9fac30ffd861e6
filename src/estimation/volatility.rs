use crate::core::config::{RiskConfig, VolatilityModel};
use crate::core::error::{Result, RiskError};
use crate::core::instrument::{InstrumentId, ProductCategory};
use crate::core::market_data::PriceSeries;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Fewest returns a GARCH forecast is run on.
pub const GARCH_MIN_RETURNS: usize = 100;

/// EWMA decay used in place of GARCH on shorter series.
const RISKMETRICS_LAMBDA: f64 = 0.94;

/// Where a volatility figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilitySource {
    /// Estimated from the price history.
    Measured,
    /// History too thin; the configured category constant was used.
    Fallback,
}

/// Annualised volatility of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityEstimate {
    pub instrument: InstrumentId,
    /// Annualised standard deviation of log returns.
    pub annualized: f64,
    /// Price observations inside the lookback window.
    pub observations: usize,
    pub source: VolatilitySource,
}

impl VolatilityEstimate {
    pub fn is_fallback(&self) -> bool {
        self.source == VolatilitySource::Fallback
    }

    /// Volatility over one sampling period (one trading day for daily series).
    pub fn per_period(&self, periods_per_year: f64) -> f64 {
        self.annualized / periods_per_year.sqrt()
    }
}

/// Per-instrument volatility from a price history window.
///
/// Thin histories (fewer than `min_data_points` prices in the window) get
/// the category's configured fallback volatility and are marked
/// [`VolatilitySource::Fallback`]. An empty series is missing market data.
#[derive(Debug, Clone, Copy)]
pub struct VolatilityEstimator<'a> {
    config: &'a RiskConfig,
}

impl<'a> VolatilityEstimator<'a> {
    pub fn new(config: &'a RiskConfig) -> Self {
        Self { config }
    }

    pub fn estimate(
        &self,
        series: &PriceSeries,
        category: &ProductCategory,
    ) -> Result<VolatilityEstimate> {
        if series.is_empty() {
            return Err(RiskError::missing_market_data(format!(
                "no price observations for {}",
                series.instrument()
            )));
        }

        let window = series.trailing_window(self.config.lookback_days);
        let observations = window.len();

        if observations < self.config.min_data_points {
            let annualized = self.config.fallback_volatility_for(category)?;
            warn!(
                "{}: {} observations (< {}), using {} fallback volatility {:.4}",
                series.instrument(),
                observations,
                self.config.min_data_points,
                category,
                annualized
            );
            return Ok(VolatilityEstimate {
                instrument: series.instrument().clone(),
                annualized,
                observations,
                source: VolatilitySource::Fallback,
            });
        }

        let returns: Vec<f64> = series
            .log_returns(self.config.lookback_days)
            .into_iter()
            .map(|(_, r)| r)
            .collect();

        let per_period = match self.config.volatility_model {
            VolatilityModel::Historical => population_std_dev(&returns),
            VolatilityModel::Ewma { lambda } => ewma_std_dev(&returns, lambda),
            VolatilityModel::Garch { omega, alpha, beta } if returns.len() >= GARCH_MIN_RETURNS => {
                garch_std_dev(&returns, omega, alpha, beta)
            }
            VolatilityModel::Garch { .. } => {
                debug!(
                    "{}: {} returns (< {}), EWMA in place of GARCH",
                    series.instrument(),
                    returns.len(),
                    GARCH_MIN_RETURNS
                );
                ewma_std_dev(&returns, RISKMETRICS_LAMBDA)
            }
        };
        let periods = series
            .frequency()
            .periods_per_year(self.config.annualization_factor);
        let annualized = per_period * periods.sqrt();

        debug!(
            "{}: measured volatility {:.4} from {} returns",
            series.instrument(),
            annualized,
            returns.len()
        );

        Ok(VolatilityEstimate {
            instrument: series.instrument().clone(),
            annualized,
            observations,
            source: VolatilitySource::Measured,
        })
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population (divide by n) standard deviation.
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// RiskMetrics EWMA standard deviation around a zero mean. The most
/// recent return carries weight `1 - lambda`; weights are renormalised
/// over the finite window.
pub fn ewma_std_dev(returns: &[f64], lambda: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mut weight = 1.0 - lambda;
    let mut weight_sum = 0.0;
    let mut variance = 0.0;
    for r in returns.iter().rev() {
        variance += weight * r * r;
        weight_sum += weight;
        weight *= lambda;
    }
    (variance / weight_sum).sqrt()
}

/// GARCH(1,1) one-step-ahead standard deviation around a zero mean.
///
/// The recursion starts from the sample second moment and runs over the
/// returns oldest first, so the result forecasts the period after the last.
pub fn garch_std_dev(returns: &[f64], omega: f64, alpha: f64, beta: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let initial = returns.iter().map(|r| r * r).sum::<f64>() / returns.len() as f64;
    returns
        .iter()
        .fold(initial, |variance, r| omega + alpha * r * r + beta * variance)
        .sqrt()
}
