use crate::core::error::{Result, RiskError};
use crate::estimation::matrix::covariance;
use crate::var::{z_score, Methodology, VarInputs, VarModel, VarResult};
use nalgebra::DVector;
use statrs::distribution::{Continuous, Normal};

/// Parametric VaR under normally distributed returns.
///
/// `VaR = z(c) · √(xᵀΣx) · √h` with Σ built from the volatilities and the
/// correlation matrix. Contributions use Euler allocation,
/// `cᵢ = xᵢ (Σx)ᵢ / (xᵀΣx) · VaR`, and sum exactly to the VaR.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaNormal;

impl DeltaNormal {
    /// Portfolio standard deviation `√(xᵀΣx)` for one period.
    pub fn portfolio_std_dev(inputs: &VarInputs) -> f64 {
        let (variance, _) = Self::variance_terms(inputs);
        variance.max(0.0).sqrt()
    }

    fn variance_terms(inputs: &VarInputs) -> (f64, DVector<f64>) {
        let x = DVector::from_column_slice(&inputs.exposures);
        let sigma = covariance(&inputs.volatilities, inputs.correlation.matrix());
        let sigma_x = &sigma * &x;
        (x.dot(&sigma_x), sigma_x)
    }
}

impl VarModel for DeltaNormal {
    fn methodology(&self) -> Methodology {
        Methodology::DeltaNormal
    }

    fn calculate(&self, inputs: &VarInputs, confidence: f64) -> Result<VarResult> {
        let z = z_score(confidence)?;
        inputs.validate()?;
        if inputs.is_empty() {
            return Ok(VarResult::zero(inputs, confidence, Methodology::DeltaNormal));
        }

        let (variance, sigma_x) = Self::variance_terms(inputs);
        if !variance.is_finite() {
            return Err(RiskError::InvalidCorrelationMatrix(
                "portfolio variance is not finite".to_string(),
            ));
        }
        if variance <= 0.0 {
            return Ok(VarResult::zero(inputs, confidence, Methodology::DeltaNormal));
        }

        let std_dev = variance.sqrt() * inputs.horizon_scale();
        let var = z * std_dev;

        let normal = Normal::new(0.0, 1.0).map_err(|e| RiskError::configuration(e.to_string()))?;
        let expected_shortfall = std_dev * normal.pdf(z) / (1.0 - confidence);

        let contributions = inputs
            .instruments
            .iter()
            .zip(inputs.exposures.iter().zip(sigma_x.iter()))
            .map(|(instrument, (x, sx))| (instrument.clone(), x * sx / variance * var))
            .collect();

        Ok(VarResult {
            var,
            expected_shortfall,
            confidence,
            methodology: Methodology::DeltaNormal,
            horizon_days: inputs.horizon_days,
            currency: inputs.currency.clone(),
            contributions,
            contributions_additive: true,
            scenarios: 0,
            seed: None,
            flags: inputs.flags.clone(),
            calculated_at: inputs.as_of,
        })
    }
}
