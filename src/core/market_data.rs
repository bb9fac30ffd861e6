use crate::core::error::{Result, RiskError};
use crate::core::instrument::InstrumentId;
use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One settlement or mark price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: Decimal,
}

impl PricePoint {
    pub fn new(date: NaiveDate, price: Decimal) -> Self {
        Self { date, price }
    }
}

/// How often a price series is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl SamplingFrequency {
    /// Periods per year used for annualisation. Daily series use the
    /// configured trading-day count.
    pub fn periods_per_year(&self, daily_factor: f64) -> f64 {
        match self {
            SamplingFrequency::Daily => daily_factor,
            SamplingFrequency::Weekly => 52.0,
            SamplingFrequency::Monthly => 12.0,
        }
    }
}

/// Ordered price history for one instrument.
///
/// Prices are strictly positive and dates strictly increasing; the
/// constructor enforces both. The engine never mutates a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    instrument: InstrumentId,
    #[serde(default)]
    frequency: SamplingFrequency,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(instrument: InstrumentId, points: Vec<PricePoint>) -> Result<Self> {
        Self::with_frequency(instrument, SamplingFrequency::Daily, points)
    }

    pub fn with_frequency(
        instrument: InstrumentId,
        frequency: SamplingFrequency,
        points: Vec<PricePoint>,
    ) -> Result<Self> {
        if let Some(bad) = points.iter().find(|p| p.price <= Decimal::ZERO) {
            return Err(RiskError::InvalidMarketData(format!(
                "{}: non-positive price {} on {}",
                instrument, bad.price, bad.date
            )));
        }
        if points.windows(2).any(|w| w[0].date >= w[1].date) {
            return Err(RiskError::InvalidMarketData(format!(
                "{}: price dates must be strictly increasing",
                instrument
            )));
        }
        Ok(Self {
            instrument,
            frequency,
            points,
        })
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    pub fn frequency(&self) -> SamplingFrequency {
        self.frequency
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Points inside the trailing `lookback_days` calendar days ending at the
    /// last observation (inclusive of both ends).
    pub fn trailing_window(&self, lookback_days: u32) -> &[PricePoint] {
        let Some(last) = self.points.last() else {
            return &[];
        };
        let start = last.date - Duration::days(i64::from(lookback_days));
        let first = self.points.partition_point(|p| p.date < start);
        &self.points[first..]
    }

    /// Log returns over the trailing window, dated by the later observation.
    pub fn log_returns(&self, lookback_days: u32) -> Vec<(NaiveDate, f64)> {
        self.trailing_window(lookback_days)
            .windows(2)
            .filter_map(|w| {
                let prev = w[0].price.to_f64()?;
                let curr = w[1].price.to_f64()?;
                Some((w[1].date, (curr / prev).ln()))
            })
            .collect()
    }
}

/// Supplier of historical prices.
///
/// Must fail with [`RiskError::MissingMarketData`] when the instrument is
/// entirely unknown; a known instrument with a short history is returned as is.
pub trait PriceHistorySource: Send + Sync {
    fn price_history(
        &self,
        instrument: &InstrumentId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<PriceSeries>;
}

/// Price history held in memory, keyed by instrument.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryPriceHistory {
    series: HashMap<InstrumentId, PriceSeries>,
}

impl InMemoryPriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, series: PriceSeries) {
        self.series.insert(series.instrument().clone(), series);
    }

    pub fn instruments(&self) -> impl Iterator<Item = &InstrumentId> {
        self.series.keys()
    }
}

impl FromIterator<PriceSeries> for InMemoryPriceHistory {
    fn from_iter<T: IntoIterator<Item = PriceSeries>>(iter: T) -> Self {
        let mut history = Self::new();
        for series in iter {
            history.insert(series);
        }
        history
    }
}

impl PriceHistorySource for InMemoryPriceHistory {
    fn price_history(
        &self,
        instrument: &InstrumentId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<PriceSeries> {
        let series = self.series.get(instrument).ok_or_else(|| {
            RiskError::missing_market_data(format!("no price history for {}", instrument))
        })?;
        let points = series
            .points()
            .iter()
            .filter(|p| p.date >= from && p.date <= to)
            .copied()
            .collect();
        PriceSeries::with_frequency(instrument.clone(), series.frequency(), points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn series(prices: &[Decimal]) -> PriceSeries {
        let points = prices
            .iter()
            .enumerate()
            .map(|(i, p)| PricePoint::new(day(i as u32 + 1), *p))
            .collect();
        PriceSeries::new(InstrumentId::new("BRENT"), points).unwrap()
    }

    #[test]
    fn test_rejects_non_positive_price() {
        let points = vec![PricePoint::new(day(1), dec!(80)), PricePoint::new(day(2), dec!(0))];
        let result = PriceSeries::new(InstrumentId::new("BRENT"), points);
        assert!(matches!(result, Err(RiskError::InvalidMarketData(_))));
    }

    #[test]
    fn test_rejects_unordered_dates() {
        let points = vec![PricePoint::new(day(2), dec!(80)), PricePoint::new(day(1), dec!(81))];
        assert!(PriceSeries::new(InstrumentId::new("BRENT"), points).is_err());
    }

    #[test]
    fn test_log_returns() {
        let s = series(&[dec!(100), dec!(110), dec!(99)]);
        let returns = s.log_returns(365);
        assert_eq!(returns.len(), 2);
        assert_eq!(returns[0].0, day(2));
        assert_relative_eq!(returns[0].1, (1.1f64).ln(), epsilon = 1e-12);
        assert_relative_eq!(returns[1].1, (0.9f64).ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_trailing_window_is_relative_to_last_point() {
        let s = series(&[dec!(100), dec!(101), dec!(102), dec!(103), dec!(104)]);
        // Last point is Jan 5; a 2-day window starts Jan 3.
        let window = s.trailing_window(2);
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].date, day(3));
    }

    #[test]
    fn test_in_memory_source_unknown_instrument() {
        let history = InMemoryPriceHistory::new();
        let result = history.price_history(&InstrumentId::new("WTI"), day(1), day(31));
        assert!(matches!(result, Err(RiskError::MissingMarketData(_))));
    }

    #[test]
    fn test_in_memory_source_filters_dates() {
        let history: InMemoryPriceHistory =
            std::iter::once(series(&[dec!(1), dec!(2), dec!(3), dec!(4)])).collect();
        let s = history
            .price_history(&InstrumentId::new("BRENT"), day(2), day(3))
            .unwrap();
        assert_eq!(s.len(), 2);
    }
}
