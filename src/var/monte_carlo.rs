use crate::core::deadline::{self, Deadline};
use crate::core::error::{Result, RiskError};
use crate::estimation::matrix::correlation_factor;
use crate::var::{
    check_confidence, simulated_tail, with_delta_normal_remainder, Methodology, VarInputs,
    VarModel, VarResult,
};
use log::debug;
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

/// Draws between deadline checks.
const DEADLINE_STRIDE: usize = 1024;

/// Monte Carlo VaR from correlated normal return draws.
///
/// Each scenario draws `z ~ N(0, I)`, correlates it with a factor `L` of the
/// correlation matrix (`L Lᵀ = ρ`), and revalues `xᵢ · σᵢ · (Lz)ᵢ · √h`.
/// The same seed always reproduces the same result. Fallback-volatility
/// instruments are priced with Delta-Normal and flagged.
#[derive(Debug, Clone)]
pub struct MonteCarlo {
    pub simulations: usize,
    pub seed: u64,
    pub deadline: Option<Deadline>,
}

impl MonteCarlo {
    pub fn new(simulations: usize, seed: u64) -> Self {
        Self {
            simulations,
            seed,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn simulate(&self, inputs: &VarInputs, confidence: f64) -> Result<VarResult> {
        let n = inputs.len();
        let factor = correlation_factor(inputs.correlation.matrix())?;
        let scale = inputs.horizon_scale();
        let loadings: Vec<f64> = inputs
            .exposures
            .iter()
            .zip(&inputs.volatilities)
            .map(|(x, v)| x * v * scale)
            .collect();

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut pnl = Vec::with_capacity(self.simulations);
        for s in 0..self.simulations {
            if s % DEADLINE_STRIDE == 0 {
                deadline::check(self.deadline.as_ref())?;
            }
            let z = DVector::from_fn(n, |_, _| StandardNormal.sample(&mut rng));
            let correlated = &factor * z;
            pnl.push(
                loadings
                    .iter()
                    .zip(correlated.iter())
                    .map(|(l, y)| l * y)
                    .collect::<Vec<f64>>(),
            );
        }
        debug!(
            "monte carlo: {} draws over {} instruments (seed {})",
            self.simulations, n, self.seed
        );

        let tail = simulated_tail(&pnl, n, confidence);
        Ok(VarResult {
            var: tail.var,
            expected_shortfall: tail.expected_shortfall,
            confidence,
            methodology: Methodology::MonteCarlo,
            horizon_days: inputs.horizon_days,
            currency: inputs.currency.clone(),
            contributions: inputs.instruments.iter().cloned().zip(tail.contributions).collect(),
            contributions_additive: false,
            scenarios: self.simulations,
            seed: Some(self.seed),
            flags: inputs.flags.clone(),
            calculated_at: inputs.as_of,
        })
    }
}

impl VarModel for MonteCarlo {
    fn methodology(&self) -> Methodology {
        Methodology::MonteCarlo
    }

    fn calculate(&self, inputs: &VarInputs, confidence: f64) -> Result<VarResult> {
        check_confidence(confidence)?;
        inputs.validate()?;
        if self.simulations == 0 {
            return Err(RiskError::invalid_request(
                "monte carlo needs at least one simulation",
            ));
        }
        if inputs.is_empty() {
            return Ok(VarResult {
                seed: Some(self.seed),
                ..VarResult::zero(inputs, confidence, Methodology::MonteCarlo)
            });
        }

        let (simulated, remainder): (Vec<usize>, Vec<usize>) =
            (0..inputs.len()).partition(|&i| inputs.measured[i]);
        let remainder = remainder
            .into_iter()
            .map(|i| (i, "fallback volatility".to_string()))
            .collect();

        with_delta_normal_remainder(
            inputs,
            confidence,
            Methodology::MonteCarlo,
            &simulated,
            remainder,
            |subset| self.simulate(subset, confidence),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RiskError;
    use crate::core::instrument::InstrumentId;
    use crate::estimation::correlation::CorrelationMatrix;
    use crate::var::DeltaNormal;
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn two_asset_inputs() -> VarInputs {
        let instruments = vec![InstrumentId::new("A"), InstrumentId::new("B")];
        let correlation = CorrelationMatrix::uniform(instruments.clone(), 0.3).unwrap();
        VarInputs::new(instruments, vec![1_000_000.0, -500_000.0], vec![0.20, 0.15], correlation)
            .unwrap()
    }

    #[test]
    fn test_same_seed_reproduces_result() {
        let model = MonteCarlo::new(2_000, 7);
        let first = model.calculate(&two_asset_inputs(), 0.95).unwrap();
        let second = model.calculate(&two_asset_inputs(), 0.95).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.seed, Some(7));
        assert_eq!(first.scenarios, 2_000);
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = MonteCarlo::new(2_000, 1).calculate(&two_asset_inputs(), 0.95).unwrap();
        let b = MonteCarlo::new(2_000, 2).calculate(&two_asset_inputs(), 0.95).unwrap();
        assert_ne!(a.var, b.var);
    }

    #[test]
    fn test_converges_to_delta_normal() {
        let inputs = two_asset_inputs();
        let mc = MonteCarlo::new(50_000, 42).calculate(&inputs, 0.95).unwrap();
        let dn = DeltaNormal.calculate(&inputs, 0.95).unwrap();
        assert_relative_eq!(mc.var, dn.var, max_relative = 0.03);
        assert_relative_eq!(mc.expected_shortfall, dn.expected_shortfall, max_relative = 0.04);
    }

    #[test]
    fn test_perfect_correlation_uses_eigen_factor() {
        let instruments = vec![InstrumentId::new("A"), InstrumentId::new("B")];
        let correlation = CorrelationMatrix::uniform(instruments.clone(), 1.0).unwrap();
        let inputs =
            VarInputs::new(instruments, vec![100.0, 100.0], vec![0.01, 0.01], correlation).unwrap();
        let result = MonteCarlo::new(20_000, 3).calculate(&inputs, 0.95).unwrap();
        assert_relative_eq!(result.var, 1.6448536269514722 * 2.0, max_relative = 0.05);
    }

    #[test]
    fn test_expired_deadline_times_out() {
        let deadline = Deadline::after(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        let model = MonteCarlo::new(100_000, 42).with_deadline(deadline);
        let result = model.calculate(&two_asset_inputs(), 0.95);
        assert!(matches!(result, Err(RiskError::CalculationTimeout { .. })));
    }

    #[test]
    fn test_zero_simulations_rejected() {
        let result = MonteCarlo::new(0, 42).calculate(&two_asset_inputs(), 0.95);
        assert!(matches!(result, Err(RiskError::InvalidRequest(_))));
    }

    #[test]
    fn test_fallback_instruments_are_flagged() {
        let inputs = two_asset_inputs().with_measured(vec![true, false]).unwrap();
        let result = MonteCarlo::new(5_000, 42).calculate(&inputs, 0.95).unwrap();
        assert_eq!(result.methodology, Methodology::MonteCarlo);
        assert!(result.is_degraded());
        assert_eq!(result.contributions.len(), 2);
    }
}
