use crate::core::error::Result;
use crate::var::{
    check_confidence, simulated_tail, with_delta_normal_remainder, Methodology, VarInputs,
    VarModel, VarResult,
};
use log::debug;

/// Full-revaluation historical simulation.
///
/// Every aligned historical date is one scenario: scenario P&L is
/// `Σ xᵢ · rᵢ · √h`, and VaR is the loss at the `1 − c` quantile of the
/// resulting distribution. Instruments without a measured history column are
/// priced with Delta-Normal and flagged. When the aligned history is shorter
/// than `min_observations`, the whole calculation is Delta-Normal.
#[derive(Debug, Clone, Copy)]
pub struct HistoricalSimulation {
    pub min_observations: usize,
}

impl HistoricalSimulation {
    pub fn new(min_observations: usize) -> Self {
        Self { min_observations }
    }

    fn replay(inputs: &VarInputs, confidence: f64) -> Result<VarResult> {
        let Some(history) = inputs.history.as_ref() else {
            return Ok(VarResult::zero(inputs, confidence, Methodology::HistoricalSimulation));
        };
        let columns: Vec<usize> = inputs
            .instruments
            .iter()
            .filter_map(|i| history.column_of(i))
            .collect();
        let scale = inputs.horizon_scale();

        let pnl: Vec<Vec<f64>> = history
            .rows()
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .zip(&inputs.exposures)
                    .map(|(&c, x)| x * row[c] * scale)
                    .collect()
            })
            .collect();
        debug!(
            "historical simulation: {} scenarios over {} instruments",
            pnl.len(),
            inputs.len()
        );

        let tail = simulated_tail(&pnl, inputs.len(), confidence);
        Ok(VarResult {
            var: tail.var,
            expected_shortfall: tail.expected_shortfall,
            confidence,
            methodology: Methodology::HistoricalSimulation,
            horizon_days: inputs.horizon_days,
            currency: inputs.currency.clone(),
            contributions: inputs.instruments.iter().cloned().zip(tail.contributions).collect(),
            contributions_additive: false,
            scenarios: pnl.len(),
            seed: None,
            flags: inputs.flags.clone(),
            calculated_at: inputs.as_of,
        })
    }
}

impl Default for HistoricalSimulation {
    fn default() -> Self {
        Self::new(20)
    }
}

impl VarModel for HistoricalSimulation {
    fn methodology(&self) -> Methodology {
        Methodology::HistoricalSimulation
    }

    fn calculate(&self, inputs: &VarInputs, confidence: f64) -> Result<VarResult> {
        check_confidence(confidence)?;
        inputs.validate()?;
        if inputs.is_empty() {
            return Ok(VarResult::zero(inputs, confidence, Methodology::HistoricalSimulation));
        }

        let observations = inputs.history.as_ref().map_or(0, |h| h.len());
        let mut simulated = Vec::new();
        let mut remainder = Vec::new();
        for (i, instrument) in inputs.instruments.iter().enumerate() {
            let has_column = inputs
                .history
                .as_ref()
                .and_then(|h| h.column_of(instrument))
                .is_some();
            if observations < self.min_observations {
                remainder.push((
                    i,
                    format!(
                        "{} aligned observations, {} required",
                        observations, self.min_observations
                    ),
                ));
            } else if !inputs.measured[i] {
                remainder.push((i, "fallback volatility".to_string()));
            } else if !has_column {
                remainder.push((i, "no aligned history".to_string()));
            } else {
                simulated.push(i);
            }
        }

        with_delta_normal_remainder(
            inputs,
            confidence,
            Methodology::HistoricalSimulation,
            &simulated,
            remainder,
            |subset| Self::replay(subset, confidence),
        )
    }
}
