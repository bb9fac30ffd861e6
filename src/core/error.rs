use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the risk engine.
///
/// Thin market data and missing cross-history are not errors: they are
/// handled by the fallback-volatility and zero-correlation policies and
/// reported as [`DataQualityFlag`](crate::var::DataQualityFlag)s on the result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    /// Required price or FX data is entirely absent.
    #[error("missing market data: {0}")]
    MissingMarketData(String),

    /// Market data is present but unusable (non-positive or unordered prices).
    #[error("invalid market data: {0}")]
    InvalidMarketData(String),

    /// The correlation matrix is still invalid after the nearest-valid correction.
    #[error("invalid correlation matrix: {0}")]
    InvalidCorrelationMatrix(String),

    /// A calculation exceeded its caller-supplied time budget.
    #[error("calculation exceeded its time budget of {budget:?} (elapsed {elapsed:?})")]
    CalculationTimeout { budget: Duration, elapsed: Duration },

    /// Configuration is missing or inconsistent.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// The request itself is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RiskError {
    pub fn missing_market_data(what: impl Into<String>) -> Self {
        Self::MissingMarketData(what.into())
    }

    pub fn configuration(what: impl Into<String>) -> Self {
        Self::ConfigurationError(what.into())
    }

    pub fn invalid_request(what: impl Into<String>) -> Self {
        Self::InvalidRequest(what.into())
    }
}

pub type Result<T> = std::result::Result<T, RiskError>;
