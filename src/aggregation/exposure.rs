use crate::core::currency::{CurrencyCode, FxRateSource};
use crate::core::error::Result;
use crate::core::instrument::{InstrumentId, ProductCategory};
use crate::core::position::{CounterpartyId, Position, PositionId, TradeGroupId};
use chrono::NaiveDate;
use log::debug;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One position converted into the reporting currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionExposure {
    pub position_id: PositionId,
    pub instrument: InstrumentId,
    pub category: ProductCategory,
    pub counterparty: CounterpartyId,
    pub trade_group: Option<TradeGroupId>,
    /// Signed quantity in base units.
    pub base_quantity: Decimal,
    /// Signed notional in the reporting currency.
    pub notional: Decimal,
}

/// Net exposure to a single instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentExposure {
    pub category: ProductCategory,
    /// Signed notional in the reporting currency.
    pub notional: Decimal,
    /// Signed quantity in base units.
    pub base_quantity: Decimal,
}

/// Signed notional per instrument, in one reporting currency.
///
/// Instruments are kept in a `BTreeMap`, so iteration order (and therefore
/// the instrument index used by every matrix in a calculation) is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureVector {
    currency: CurrencyCode,
    entries: BTreeMap<InstrumentId, InstrumentExposure>,
}

impl ExposureVector {
    pub fn new(currency: CurrencyCode) -> Self {
        Self {
            currency,
            entries: BTreeMap::new(),
        }
    }

    /// Sum position exposures per instrument.
    pub fn from_position_exposures<'a>(
        currency: CurrencyCode,
        exposures: impl IntoIterator<Item = &'a PositionExposure>,
    ) -> Self {
        let mut vector = Self::new(currency);
        for exposure in exposures {
            vector.add(
                &exposure.instrument,
                &exposure.category,
                exposure.notional,
                exposure.base_quantity,
            );
        }
        vector
    }

    /// Add signed notional to an instrument.
    pub fn add(
        &mut self,
        instrument: &InstrumentId,
        category: &ProductCategory,
        notional: Decimal,
        base_quantity: Decimal,
    ) {
        let entry = self
            .entries
            .entry(instrument.clone())
            .or_insert_with(|| InstrumentExposure {
                category: category.clone(),
                notional: Decimal::ZERO,
                base_quantity: Decimal::ZERO,
            });
        entry.notional += notional;
        entry.base_quantity += base_quantity;
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct instruments, in index order.
    pub fn instruments(&self) -> Vec<InstrumentId> {
        self.entries.keys().cloned().collect()
    }

    pub fn get(&self, instrument: &InstrumentId) -> Option<&InstrumentExposure> {
        self.entries.get(instrument)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InstrumentId, &InstrumentExposure)> {
        self.entries.iter()
    }

    pub fn notional(&self, instrument: &InstrumentId) -> Decimal {
        self.entries
            .get(instrument)
            .map(|e| e.notional)
            .unwrap_or(Decimal::ZERO)
    }

    /// Notionals as `f64`, in index order.
    pub fn notionals_f64(&self) -> Vec<f64> {
        self.entries
            .values()
            .map(|e| e.notional.to_f64().unwrap_or(0.0))
            .collect()
    }

    /// Sum of absolute instrument notionals.
    pub fn gross_notional(&self) -> Decimal {
        self.entries.values().map(|e| e.notional.abs()).sum()
    }

    /// Sum of signed instrument notionals.
    pub fn net_notional(&self) -> Decimal {
        self.entries.values().map(|e| e.notional).sum()
    }
}

/// Exposure vector plus the per-position detail it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPortfolio {
    pub exposures: ExposureVector,
    pub positions: Vec<PositionExposure>,
}

/// Converts raw positions into an [`ExposureVector`].
pub struct PositionAggregator;

impl PositionAggregator {
    /// Aggregate `positions` into reporting-currency notionals.
    ///
    /// Zero-quantity positions are dropped. A position whose currency has no
    /// FX rate fails the whole aggregation with `MissingMarketData`.
    pub fn aggregate(
        positions: &[Position],
        fx: &dyn FxRateSource,
        reporting_currency: &CurrencyCode,
        as_of: NaiveDate,
    ) -> Result<AggregatedPortfolio> {
        let mut exposures = Vec::with_capacity(positions.len());
        for position in positions {
            if position.quantity() == Decimal::ZERO {
                continue;
            }
            let rate = fx.fx_rate(position.currency(), reporting_currency, as_of)?;
            exposures.push(PositionExposure {
                position_id: position.id(),
                instrument: position.instrument().clone(),
                category: position.category().clone(),
                counterparty: position.counterparty().clone(),
                trade_group: position.trade_group().cloned(),
                base_quantity: position.base_quantity(),
                notional: position.local_notional() * rate,
            });
        }

        let vector = ExposureVector::from_position_exposures(reporting_currency.clone(), &exposures);
        debug!(
            "aggregated {} positions into {} instruments (gross {} {})",
            exposures.len(),
            vector.len(),
            vector.gross_notional(),
            reporting_currency
        );

        Ok(AggregatedPortfolio {
            exposures: vector,
            positions: exposures,
        })
    }
}
