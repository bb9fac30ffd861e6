use crate::core::error::{Result, RiskError};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// ISO 4217 currency code.
///
/// # Examples
///
/// ```
/// use risk_engine::core::currency::CurrencyCode;
///
/// let usd = CurrencyCode::new("USD");
/// let eur = CurrencyCode::new("EUR");
/// assert_ne!(usd, eur);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CurrencyCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Source of FX rates used to bring every position into the reporting currency.
///
/// Implementations must fail with [`RiskError::MissingMarketData`] when no rate
/// is available. Assuming 1:1 would silently misstate risk.
pub trait FxRateSource: Send + Sync {
    /// Units of `to` per one unit of `from` as of `as_of`.
    fn fx_rate(&self, from: &CurrencyCode, to: &CurrencyCode, as_of: NaiveDate) -> Result<Decimal>;
}

/// Snapshot FX table quoting every currency against one reporting currency.
///
/// Cross rates are derived through the reporting currency. The table
/// ignores `as_of`: it represents a single fixing.
///
/// # Examples
///
/// ```
/// use risk_engine::core::currency::{CurrencyCode, FxRateSource, FxRateTable};
/// use chrono::NaiveDate;
/// use rust_decimal_macros::dec;
///
/// let mut rates = FxRateTable::new(CurrencyCode::usd());
/// rates.set_rate(CurrencyCode::new("EUR"), dec!(1.10)).unwrap();
///
/// let as_of = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
/// let rate = rates
///     .fx_rate(&CurrencyCode::new("EUR"), &CurrencyCode::usd(), as_of)
///     .unwrap();
/// assert_eq!(rate, dec!(1.10));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxRateTable {
    /// Currency every rate is quoted against.
    pub reporting_currency: CurrencyCode,
    /// currency -> units of reporting currency per one unit.
    rates: HashMap<CurrencyCode, Decimal>,
}

impl FxRateTable {
    pub fn new(reporting_currency: CurrencyCode) -> Self {
        Self {
            reporting_currency,
            rates: HashMap::new(),
        }
    }

    /// Set the value of one unit of `currency` in the reporting currency.
    pub fn set_rate(&mut self, currency: CurrencyCode, rate: Decimal) -> Result<()> {
        if rate <= Decimal::ZERO {
            return Err(RiskError::invalid_request(format!(
                "FX rate must be positive, got {} for {}/{}",
                rate, currency, self.reporting_currency
            )));
        }
        self.rates.insert(currency, rate);
        Ok(())
    }

    /// Builder-style variant of [`set_rate`](Self::set_rate).
    pub fn with_rate(mut self, currency: CurrencyCode, rate: Decimal) -> Result<Self> {
        self.set_rate(currency, rate)?;
        Ok(self)
    }

    fn to_reporting(&self, currency: &CurrencyCode) -> Option<Decimal> {
        if *currency == self.reporting_currency {
            return Some(Decimal::ONE);
        }
        self.rates.get(currency).copied()
    }
}

impl FxRateSource for FxRateTable {
    fn fx_rate(&self, from: &CurrencyCode, to: &CurrencyCode, _as_of: NaiveDate) -> Result<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }
        let missing = || {
            RiskError::missing_market_data(format!("no FX rate available for {}/{}", from, to))
        };
        let from_rate = self.to_reporting(from).ok_or_else(missing)?;
        let to_rate = self.to_reporting(to).ok_or_else(missing)?;
        Ok(from_rate / to_rate)
    }
}
