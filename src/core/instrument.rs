use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a priced instrument.
///
/// Either a product plus delivery window for physical legs
/// (e.g. "BRENT-2026-03") or a futures code for paper legs (e.g. "ICE-BRN-H26").
///
/// # Examples
///
/// ```
/// use risk_engine::core::instrument::InstrumentId;
///
/// let brent = InstrumentId::new("BRENT-2026-03");
/// assert_eq!(brent.as_str(), "BRENT-2026-03");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Product category an instrument belongs to.
///
/// Categories drive the fallback volatility table, product concentration
/// limits and category-wide stress multipliers. They are free-form so that
/// new categories only need configuration, not code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductCategory(String);

impl ProductCategory {
    pub const CRUDE_OIL: &'static str = "CRUDE_OIL";
    pub const FUEL_OIL: &'static str = "FUEL_OIL";
    pub const GASOIL: &'static str = "GASOIL";
    pub const JET_FUEL: &'static str = "JET_FUEL";
    pub const GASOLINE: &'static str = "GASOLINE";

    pub fn new(category: impl Into<String>) -> Self {
        Self(category.into())
    }

    pub fn crude_oil() -> Self {
        Self::new(Self::CRUDE_OIL)
    }

    pub fn fuel_oil() -> Self {
        Self::new(Self::FUEL_OIL)
    }

    pub fn gasoil() -> Self {
        Self::new(Self::GASOIL)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProductCategory {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_ordering() {
        let a = InstrumentId::new("BRENT-2026-01");
        let b = InstrumentId::new("BRENT-2026-02");
        assert!(a < b);
    }

    #[test]
    fn test_category_serializes_transparently() {
        let json = serde_json::to_string(&ProductCategory::crude_oil()).unwrap();
        assert_eq!(json, "\"CRUDE_OIL\"");
    }
}
