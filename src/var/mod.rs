//! Value-at-Risk methodologies.
//!
//! Each methodology implements [`VarModel`] over the same [`VarInputs`]:
//!
//! - [`DeltaNormal`] — parametric, `z · √(xᵀΣx) · √h`, Euler contributions
//! - [`HistoricalSimulation`] — replays aligned historical return vectors
//! - [`MonteCarlo`] — seeded multivariate-normal draws
//!
//! Simulation methods report tail-average contributions, which do not sum
//! exactly to the portfolio VaR; [`VarResult::contributions_additive`] says so.

pub mod delta_normal;
pub mod historical;
pub mod monte_carlo;

pub use delta_normal::DeltaNormal;
pub use historical::HistoricalSimulation;
pub use monte_carlo::MonteCarlo;

use crate::core::currency::CurrencyCode;
use crate::core::error::{Result, RiskError};
use crate::core::instrument::InstrumentId;
use crate::estimation::correlation::{CorrelationMatrix, ReturnSeries};
use chrono::{DateTime, NaiveDate, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// VaR methodology selected per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Methodology {
    DeltaNormal,
    HistoricalSimulation,
    MonteCarlo,
}

impl fmt::Display for Methodology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Methodology::DeltaNormal => "delta-normal",
            Methodology::HistoricalSimulation => "historical",
            Methodology::MonteCarlo => "monte-carlo",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Methodology {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "delta-normal" | "parametric" => Ok(Methodology::DeltaNormal),
            "historical" | "historical-simulation" => Ok(Methodology::HistoricalSimulation),
            "monte-carlo" | "montecarlo" => Ok(Methodology::MonteCarlo),
            other => Err(RiskError::invalid_request(format!(
                "unknown methodology '{}'",
                other
            ))),
        }
    }
}

/// Marks a figure as assumed rather than measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DataQualityFlag {
    /// Thin history: the configured category volatility was used.
    FallbackVolatility {
        instrument: InstrumentId,
        observations: usize,
        volatility: f64,
    },
    /// No overlapping history: correlation assumed to be zero.
    AssumedZeroCorrelation {
        first: InstrumentId,
        second: InstrumentId,
    },
    /// The correlation estimate was indefinite and has been corrected.
    CorrelationCorrected { min_eigenvalue: f64 },
    /// A simulation methodology priced this instrument with Delta-Normal.
    DegradedToDeltaNormal {
        instrument: InstrumentId,
        reason: String,
    },
}

/// Historical return vectors aligned on the dates every instrument shares.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioHistory {
    instruments: Vec<InstrumentId>,
    dates: Vec<NaiveDate>,
    /// One row per date, one column per instrument.
    rows: Vec<Vec<f64>>,
}

impl ScenarioHistory {
    /// Align return series on their common dates. A date missing for any
    /// instrument is dropped, never imputed.
    pub fn align(
        instruments: &[InstrumentId],
        returns: &HashMap<InstrumentId, ReturnSeries>,
    ) -> Self {
        let maps: Vec<BTreeMap<NaiveDate, f64>> = instruments
            .iter()
            .map(|id| {
                returns
                    .get(id)
                    .map(|s| s.iter().copied().collect())
                    .unwrap_or_default()
            })
            .collect();

        let mut common: Option<BTreeSet<NaiveDate>> = None;
        for map in &maps {
            let dates: BTreeSet<NaiveDate> = map.keys().copied().collect();
            common = Some(match common {
                None => dates,
                Some(acc) => acc.intersection(&dates).copied().collect(),
            });
        }
        let dates: Vec<NaiveDate> = common.unwrap_or_default().into_iter().collect();
        let rows = dates
            .iter()
            .map(|d| maps.iter().map(|m| m[d]).collect())
            .collect();

        Self {
            instruments: instruments.to_vec(),
            dates,
            rows,
        }
    }

    pub fn instruments(&self) -> &[InstrumentId] {
        &self.instruments
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column_of(&self, instrument: &InstrumentId) -> Option<usize> {
        self.instruments.iter().position(|i| i == instrument)
    }
}

/// Everything a methodology needs, indexed by instrument position.
#[derive(Debug, Clone)]
pub struct VarInputs {
    pub instruments: Vec<InstrumentId>,
    /// Signed notional per instrument in `currency`.
    pub exposures: Vec<f64>,
    /// One-period (daily) volatility per instrument.
    pub volatilities: Vec<f64>,
    pub correlation: CorrelationMatrix,
    /// `false` where the volatility is a fallback constant rather than measured.
    pub measured: Vec<bool>,
    /// Aligned history of the measured instruments, for historical simulation.
    pub history: Option<ScenarioHistory>,
    /// Holding period in periods; results scale by its square root.
    pub horizon_days: u32,
    pub currency: CurrencyCode,
    pub as_of: DateTime<Utc>,
    /// Flags raised while preparing the inputs.
    pub flags: Vec<DataQualityFlag>,
}

impl VarInputs {
    /// Inputs with every volatility measured and no history attached.
    pub fn new(
        instruments: Vec<InstrumentId>,
        exposures: Vec<f64>,
        volatilities: Vec<f64>,
        correlation: CorrelationMatrix,
    ) -> Result<Self> {
        let n = instruments.len();
        let inputs = Self {
            instruments,
            exposures,
            volatilities,
            correlation,
            measured: vec![true; n],
            history: None,
            horizon_days: 1,
            currency: CurrencyCode::usd(),
            as_of: DateTime::<Utc>::default(),
            flags: Vec::new(),
        };
        inputs.validate()?;
        Ok(inputs)
    }

    /// Check that every per-instrument vector matches the instrument list.
    /// The fields are public, so every methodology re-checks before indexing.
    pub fn validate(&self) -> Result<()> {
        let n = self.instruments.len();
        if self.exposures.len() != n
            || self.volatilities.len() != n
            || self.measured.len() != n
            || self.correlation.len() != n
        {
            return Err(RiskError::invalid_request(format!(
                "inconsistent input sizes: {} instruments, {} exposures, {} volatilities, {} measured flags, {}x{} correlation",
                n,
                self.exposures.len(),
                self.volatilities.len(),
                self.measured.len(),
                self.correlation.len(),
                self.correlation.len()
            )));
        }
        if self.correlation.instruments() != self.instruments.as_slice() {
            return Err(RiskError::invalid_request(
                "correlation matrix instrument order differs from exposures",
            ));
        }
        if let Some(v) = self.volatilities.iter().find(|v| !(**v >= 0.0 && v.is_finite())) {
            return Err(RiskError::invalid_request(format!("invalid volatility {}", v)));
        }
        Ok(())
    }

    pub fn with_history(mut self, history: ScenarioHistory) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_horizon(mut self, horizon_days: u32) -> Self {
        self.horizon_days = horizon_days;
        self
    }

    pub fn with_measured(mut self, measured: Vec<bool>) -> Result<Self> {
        if measured.len() != self.instruments.len() {
            return Err(RiskError::invalid_request(format!(
                "{} measured flags for {} instruments",
                measured.len(),
                self.instruments.len()
            )));
        }
        self.measured = measured;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn horizon_scale(&self) -> f64 {
        f64::from(self.horizon_days).sqrt()
    }

    /// Restrict to the given instrument indices. Flags about instruments
    /// outside the subset are dropped.
    pub fn subset(&self, indices: &[usize]) -> Self {
        let kept = |id: &InstrumentId| indices.iter().any(|&i| &self.instruments[i] == id);
        let flags = self
            .flags
            .iter()
            .filter(|flag| match flag {
                DataQualityFlag::FallbackVolatility { instrument, .. }
                | DataQualityFlag::DegradedToDeltaNormal { instrument, .. } => kept(instrument),
                DataQualityFlag::AssumedZeroCorrelation { first, second } => {
                    kept(first) && kept(second)
                }
                DataQualityFlag::CorrelationCorrected { .. } => indices.len() > 1,
            })
            .cloned()
            .collect();
        Self {
            instruments: indices.iter().map(|&i| self.instruments[i].clone()).collect(),
            exposures: indices.iter().map(|&i| self.exposures[i]).collect(),
            volatilities: indices.iter().map(|&i| self.volatilities[i]).collect(),
            correlation: self.correlation.submatrix(indices),
            measured: indices.iter().map(|&i| self.measured[i]).collect(),
            history: self.history.clone(),
            horizon_days: self.horizon_days,
            currency: self.currency.clone(),
            as_of: self.as_of,
            flags,
        }
    }
}

/// Output of one VaR calculation. Immutable value object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarResult {
    /// Loss at the confidence level over the holding period (positive = loss).
    pub var: f64,
    /// Mean loss beyond the VaR.
    pub expected_shortfall: f64,
    pub confidence: f64,
    pub methodology: Methodology,
    pub horizon_days: u32,
    pub currency: CurrencyCode,
    /// Per-instrument contribution to `var`.
    pub contributions: BTreeMap<InstrumentId, f64>,
    /// `true` only when contributions sum exactly to `var` (Euler allocation).
    /// Tail-average contributions from simulations are approximate.
    pub contributions_additive: bool,
    /// Simulated or replayed scenarios behind the figure.
    pub scenarios: usize,
    /// Seed of a Monte Carlo run.
    pub seed: Option<u64>,
    pub flags: Vec<DataQualityFlag>,
    pub calculated_at: DateTime<Utc>,
}

impl VarResult {
    /// Zero-risk result for an empty or fully netted portfolio.
    pub fn zero(inputs: &VarInputs, confidence: f64, methodology: Methodology) -> Self {
        Self {
            var: 0.0,
            expected_shortfall: 0.0,
            confidence,
            methodology,
            horizon_days: inputs.horizon_days,
            currency: inputs.currency.clone(),
            contributions: inputs.instruments.iter().map(|i| (i.clone(), 0.0)).collect(),
            contributions_additive: true,
            scenarios: 0,
            seed: None,
            flags: inputs.flags.clone(),
            calculated_at: inputs.as_of,
        }
    }

    /// Whether any figure rests on assumed rather than measured data.
    pub fn is_degraded(&self) -> bool {
        !self.flags.is_empty()
    }

    pub fn fallback_used(&self) -> bool {
        self.flags
            .iter()
            .any(|f| matches!(f, DataQualityFlag::FallbackVolatility { .. }))
    }

    pub fn contribution_total(&self) -> f64 {
        self.contributions.values().sum()
    }
}

impl fmt::Display for VarResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Value at Risk ({}) ===", self.methodology)?;
        writeln!(
            f,
            "Confidence:         {:.2}% over {} day(s)",
            self.confidence * 100.0,
            self.horizon_days
        )?;
        writeln!(f, "VaR:                {:.2} {}", self.var, self.currency)?;
        writeln!(f, "Expected Shortfall: {:.2} {}", self.expected_shortfall, self.currency)?;
        if self.scenarios > 0 {
            writeln!(f, "Scenarios:          {}", self.scenarios)?;
        }
        writeln!(f, "\nContributions:")?;
        for (instrument, contribution) in &self.contributions {
            writeln!(f, "  {:<20} {:>16.2}", instrument, contribution)?;
        }
        if !self.contributions_additive {
            writeln!(
                f,
                "  (tail-average contributions; total {:.2} differs from VaR)",
                self.contribution_total()
            )?;
        }
        if !self.flags.is_empty() {
            writeln!(f, "\nDegraded data:")?;
            for flag in &self.flags {
                writeln!(f, "  {:?}", flag)?;
            }
        }
        Ok(())
    }
}

/// A VaR methodology.
pub trait VarModel: Send + Sync {
    fn methodology(&self) -> Methodology;

    fn calculate(&self, inputs: &VarInputs, confidence: f64) -> Result<VarResult>;
}

/// Validate a confidence level.
pub fn check_confidence(confidence: f64) -> Result<()> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(RiskError::invalid_request(format!(
            "confidence must be in (0, 1), got {}",
            confidence
        )));
    }
    Ok(())
}

/// Standard-normal quantile at `confidence` (z(0.95) = 1.6448536…).
pub fn z_score(confidence: f64) -> Result<f64> {
    check_confidence(confidence)?;
    let normal = Normal::new(0.0, 1.0).map_err(|e| RiskError::configuration(e.to_string()))?;
    Ok(normal.inverse_cdf(confidence))
}

/// Empirical quantile of sorted data with linear interpolation between
/// order statistics (position `p · (n − 1)`).
pub fn empirical_quantile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let h = p.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

/// VaR, Expected Shortfall and tail-average contributions from per-scenario,
/// per-instrument P&L (`pnl[s][i]`).
pub(crate) struct SimulatedTail {
    pub var: f64,
    pub expected_shortfall: f64,
    pub contributions: Vec<f64>,
}

pub(crate) fn simulated_tail(pnl: &[Vec<f64>], n_instruments: usize, confidence: f64) -> SimulatedTail {
    if pnl.is_empty() {
        return SimulatedTail {
            var: 0.0,
            expected_shortfall: 0.0,
            contributions: vec![0.0; n_instruments],
        };
    }

    let totals: Vec<f64> = pnl.iter().map(|row| row.iter().sum()).collect();
    let mut sorted = totals.clone();
    sorted.sort_by(f64::total_cmp);
    let quantile = empirical_quantile(&sorted, 1.0 - confidence);

    let mut contributions = vec![0.0; n_instruments];
    let mut tail_total = 0.0;
    let mut tail_count = 0usize;
    for (row, total) in pnl.iter().zip(&totals) {
        if *total <= quantile {
            tail_total += total;
            tail_count += 1;
            for (c, v) in contributions.iter_mut().zip(row) {
                *c += v;
            }
        }
    }
    // The smallest outcome is always <= the quantile, so the tail is never empty.
    let count = tail_count.max(1) as f64;
    for c in contributions.iter_mut() {
        *c = -*c / count;
    }

    SimulatedTail {
        var: -quantile,
        expected_shortfall: -tail_total / count,
        contributions,
    }
}

/// Run a simulation on the measured instruments and Delta-Normal on the
/// rest, then combine.
///
/// Instruments priced on fallback volatility carry zero correlation with
/// everything else, so the two subset VaRs combine in quadrature.
pub(crate) fn with_delta_normal_remainder(
    inputs: &VarInputs,
    confidence: f64,
    methodology: Methodology,
    simulated: &[usize],
    remainder: Vec<(usize, String)>,
    simulate: impl FnOnce(&VarInputs) -> Result<VarResult>,
) -> Result<VarResult> {
    if remainder.is_empty() {
        let result = simulate(inputs)?;
        return Ok(VarResult {
            flags: inputs.flags.clone(),
            ..result
        });
    }

    let mut flags = inputs.flags.clone();
    for (i, reason) in &remainder {
        warn!("{}: priced with delta-normal ({})", inputs.instruments[*i], reason);
        flags.push(DataQualityFlag::DegradedToDeltaNormal {
            instrument: inputs.instruments[*i].clone(),
            reason: reason.clone(),
        });
    }

    let remainder_idx: Vec<usize> = remainder.iter().map(|(i, _)| *i).collect();
    let parametric = DeltaNormal.calculate(&inputs.subset(&remainder_idx), confidence)?;

    if simulated.is_empty() {
        return Ok(VarResult {
            methodology,
            flags,
            calculated_at: inputs.as_of,
            ..parametric
        });
    }

    let sim = simulate(&inputs.subset(simulated))?;
    let combine = |a: f64, b: f64| (a.max(0.0).powi(2) + b.powi(2)).sqrt();

    let mut contributions = sim.contributions;
    contributions.extend(parametric.contributions);

    Ok(VarResult {
        var: combine(sim.var, parametric.var),
        expected_shortfall: combine(sim.expected_shortfall, parametric.expected_shortfall),
        confidence,
        methodology,
        horizon_days: inputs.horizon_days,
        currency: inputs.currency.clone(),
        contributions,
        contributions_additive: false,
        scenarios: sim.scenarios,
        seed: sim.seed,
        flags,
        calculated_at: inputs.as_of,
    })
}
