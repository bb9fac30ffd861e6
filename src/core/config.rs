use crate::core::currency::CurrencyCode;
use crate::core::error::{Result, RiskError};
use crate::core::instrument::ProductCategory;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// How per-instrument volatility is estimated from log returns.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "model")]
pub enum VolatilityModel {
    /// Equally weighted population standard deviation over the window.
    #[default]
    Historical,
    /// Exponentially weighted moving average (RiskMetrics).
    Ewma { lambda: f64 },
    /// GARCH(1,1) one-step-ahead forecast with fixed daily parameters:
    /// `σ²ₜ₊₁ = omega + alpha·rₜ² + beta·σ²ₜ`. Series with fewer than
    /// 100 returns use EWMA with λ = 0.94 instead.
    Garch { omega: f64, alpha: f64, beta: f64 },
}

/// Monte Carlo simulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    /// Number of simulated return vectors.
    pub simulations: usize,
    /// Seed used by operations that take no explicit seed.
    pub default_seed: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            simulations: 10_000,
            default_seed: 42,
        }
    }
}

/// Immutable configuration passed into every component.
///
/// Nothing in the engine reads ambient state; two engines with different
/// configurations can run side by side.
///
/// # Examples
///
/// ```
/// use risk_engine::core::config::RiskConfig;
///
/// let config = RiskConfig::from_json_str(r#"{ "lookback_days": 120 }"#).unwrap();
/// assert_eq!(config.lookback_days, 120);
/// assert_eq!(config.min_data_points, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Currency of every notional and VaR figure.
    pub reporting_currency: CurrencyCode,
    /// Calendar-day window for volatility, correlation and historical simulation.
    pub lookback_days: u32,
    /// Minimum price observations in the window before the fallback volatility applies.
    pub min_data_points: usize,
    /// Periods per year for daily series.
    pub annualization_factor: f64,
    /// VaR horizon in days.
    pub holding_period_days: u32,
    pub volatility_model: VolatilityModel,
    /// Annualised fallback volatility per product category.
    pub fallback_volatility: HashMap<ProductCategory, f64>,
    pub monte_carlo: MonteCarloConfig,
    /// Fraction below a limit at which a Warning is raised.
    pub warning_threshold: Decimal,
    /// Time-to-live of cached VaR results.
    pub cache_ttl_secs: u64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        let fallback_volatility = [
            (ProductCategory::CRUDE_OIL, 0.30),
            (ProductCategory::FUEL_OIL, 0.35),
            (ProductCategory::GASOIL, 0.30),
            (ProductCategory::JET_FUEL, 0.32),
            (ProductCategory::GASOLINE, 0.33),
        ]
        .into_iter()
        .map(|(category, vol)| (ProductCategory::new(category), vol))
        .collect();

        Self {
            reporting_currency: CurrencyCode::usd(),
            lookback_days: 250,
            min_data_points: 20,
            annualization_factor: 252.0,
            holding_period_days: 1,
            volatility_model: VolatilityModel::Historical,
            fallback_volatility,
            monte_carlo: MonteCarloConfig::default(),
            warning_threshold: dec!(0.10),
            cache_ttl_secs: 300,
        }
    }
}

impl RiskConfig {
    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: RiskConfig = serde_json::from_str(json)
            .map_err(|e| RiskError::configuration(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RiskError::configuration(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lookback_days == 0 {
            return Err(RiskError::configuration("lookback_days must be positive"));
        }
        if self.min_data_points < 2 {
            return Err(RiskError::configuration(
                "min_data_points must be at least 2 to form a return",
            ));
        }
        if !(self.annualization_factor > 0.0) {
            return Err(RiskError::configuration("annualization_factor must be positive"));
        }
        if self.holding_period_days == 0 {
            return Err(RiskError::configuration("holding_period_days must be positive"));
        }
        if let VolatilityModel::Ewma { lambda } = self.volatility_model {
            if !(lambda > 0.0 && lambda < 1.0) {
                return Err(RiskError::configuration(format!(
                    "EWMA lambda must be in (0, 1), got {}",
                    lambda
                )));
            }
        }
        if let VolatilityModel::Garch { omega, alpha, beta } = self.volatility_model {
            if !(omega > 0.0 && alpha >= 0.0 && beta >= 0.0 && alpha + beta < 1.0) {
                return Err(RiskError::configuration(format!(
                    "GARCH needs omega > 0, alpha and beta >= 0, alpha + beta < 1; got {}, {}, {}",
                    omega, alpha, beta
                )));
            }
        }
        if self.fallback_volatility.is_empty() {
            return Err(RiskError::configuration("fallback_volatility table is empty"));
        }
        if let Some((category, vol)) = self
            .fallback_volatility
            .iter()
            .find(|(_, vol)| !(**vol > 0.0 && vol.is_finite()))
        {
            return Err(RiskError::configuration(format!(
                "fallback volatility for {} must be positive, got {}",
                category, vol
            )));
        }
        if self.monte_carlo.simulations == 0 {
            return Err(RiskError::configuration("monte_carlo.simulations must be positive"));
        }
        if self.warning_threshold < Decimal::ZERO || self.warning_threshold >= Decimal::ONE {
            return Err(RiskError::configuration(format!(
                "warning_threshold must be in [0, 1), got {}",
                self.warning_threshold
            )));
        }
        Ok(())
    }

    /// Fallback volatility for a category; absence is a configuration error.
    pub fn fallback_volatility_for(&self, category: &ProductCategory) -> Result<f64> {
        self.fallback_volatility.get(category).copied().ok_or_else(|| {
            RiskError::configuration(format!("no fallback volatility configured for {}", category))
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
