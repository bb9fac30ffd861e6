//! Dense symmetric-matrix helpers shared by the estimators and the VaR models.
//!
//! Matrices are `nalgebra::DMatrix<f64>` (flat column-major storage) indexed
//! by the per-calculation instrument index.

use crate::core::error::{Result, RiskError};
use log::warn;
use nalgebra::{DMatrix, DVector};

/// Eigenvalues below this are treated as numerical noise around zero.
const EIGEN_TOLERANCE: f64 = 1e-10;

/// Outcome of [`nearest_valid_correlation`].
#[derive(Debug, Clone)]
pub struct CorrectedMatrix {
    pub matrix: DMatrix<f64>,
    /// Smallest eigenvalue of the input when a correction was applied.
    pub corrected_from: Option<f64>,
}

/// Make a symmetric correlation estimate positive semi-definite.
///
/// Negative eigenvalues are clipped to zero, the matrix is rebuilt from the
/// eigen-decomposition and rescaled so the diagonal is exactly one. A
/// matrix that is already PSD is returned untouched.
pub fn nearest_valid_correlation(matrix: &DMatrix<f64>) -> Result<CorrectedMatrix> {
    check_finite_square(matrix)?;

    let eigen = matrix.clone().symmetric_eigen();
    let min_eigenvalue = eigen.eigenvalues.min();
    if min_eigenvalue >= -EIGEN_TOLERANCE {
        return Ok(CorrectedMatrix {
            matrix: matrix.clone(),
            corrected_from: None,
        });
    }

    warn!(
        "correlation estimate is not positive semi-definite (min eigenvalue {:.3e}), clipping",
        min_eigenvalue
    );

    let clipped = eigen.eigenvalues.map(|l| l.max(0.0));
    let rebuilt =
        &eigen.eigenvectors * DMatrix::from_diagonal(&clipped) * eigen.eigenvectors.transpose();

    let n = rebuilt.nrows();
    let scale: Vec<f64> = (0..n).map(|i| rebuilt[(i, i)]).collect();
    if let Some(i) = scale.iter().position(|d| !(*d > 0.0)) {
        return Err(RiskError::InvalidCorrelationMatrix(format!(
            "diagonal element {} vanished after eigenvalue clipping",
            i
        )));
    }

    let mut corrected = DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            1.0
        } else {
            rebuilt[(i, j)] / (scale[i] * scale[j]).sqrt()
        }
    });
    symmetrize(&mut corrected);

    let check = corrected.clone().symmetric_eigen().eigenvalues.min();
    if !check.is_finite() || check < -1e-8 {
        return Err(RiskError::InvalidCorrelationMatrix(format!(
            "matrix still indefinite after correction (min eigenvalue {:.3e})",
            check
        )));
    }

    Ok(CorrectedMatrix {
        matrix: corrected,
        corrected_from: Some(min_eigenvalue),
    })
}

/// A matrix `L` with `L Lᵀ = matrix`, used to correlate independent normals.
///
/// Uses the Cholesky factor when the matrix is positive definite and falls
/// back to `V √Λ` from the eigen-decomposition for semi-definite matrices
/// (perfect correlation, duplicated instruments).
pub fn correlation_factor(matrix: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    check_finite_square(matrix)?;
    if let Some(cholesky) = matrix.clone().cholesky() {
        return Ok(cholesky.l());
    }
    let eigen = matrix.clone().symmetric_eigen();
    let roots: DVector<f64> = eigen.eigenvalues.map(|l| l.max(0.0).sqrt());
    Ok(&eigen.eigenvectors * DMatrix::from_diagonal(&roots))
}

/// Σ = D ρ D where D holds the volatilities on its diagonal.
pub fn covariance(volatilities: &[f64], correlation: &DMatrix<f64>) -> DMatrix<f64> {
    let n = volatilities.len();
    DMatrix::from_fn(n, n, |i, j| {
        volatilities[i] * correlation[(i, j)] * volatilities[j]
    })
}

fn symmetrize(matrix: &mut DMatrix<f64>) {
    let n = matrix.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (matrix[(i, j)] + matrix[(j, i)]);
            matrix[(i, j)] = avg;
            matrix[(j, i)] = avg;
        }
    }
}

fn check_finite_square(matrix: &DMatrix<f64>) -> Result<()> {
    if matrix.nrows() != matrix.ncols() {
        return Err(RiskError::InvalidCorrelationMatrix(format!(
            "matrix is {}x{}, expected square",
            matrix.nrows(),
            matrix.ncols()
        )));
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(RiskError::InvalidCorrelationMatrix(
            "matrix contains NaN or infinite entries".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_valid_matrix_untouched() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 0.3, 0.3, 1.0]);
        let corrected = nearest_valid_correlation(&m).unwrap();
        assert!(corrected.corrected_from.is_none());
        assert_eq!(corrected.matrix, m);
    }

    #[test]
    fn test_indefinite_matrix_is_corrected() {
        // Pairwise plausible, jointly impossible.
        let m = DMatrix::from_row_slice(
            3,
            3,
            &[1.0, 0.9, -0.9, 0.9, 1.0, 0.9, -0.9, 0.9, 1.0],
        );
        let corrected = nearest_valid_correlation(&m).unwrap();
        assert!(corrected.corrected_from.unwrap() < 0.0);

        let out = &corrected.matrix;
        for i in 0..3 {
            assert_relative_eq!(out[(i, i)], 1.0);
            for j in 0..3 {
                assert_relative_eq!(out[(i, j)], out[(j, i)]);
                assert!(out[(i, j)].abs() <= 1.0 + 1e-12);
            }
        }
        assert!(out.clone().symmetric_eigen().eigenvalues.min() > -1e-8);
    }

    #[test]
    fn test_nan_is_invalid() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, f64::NAN, f64::NAN, 1.0]);
        assert!(matches!(
            nearest_valid_correlation(&m),
            Err(RiskError::InvalidCorrelationMatrix(_))
        ));
    }

    #[test]
    fn test_factor_of_perfect_correlation() {
        let m = DMatrix::from_element(3, 3, 1.0);
        let l = correlation_factor(&m).unwrap();
        let rebuilt = &l * l.transpose();
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(rebuilt[(i, j)], 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_factor_reproduces_matrix() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 0.3, 0.3, 1.0]);
        let l = correlation_factor(&m).unwrap();
        let rebuilt = &l * l.transpose();
        assert_relative_eq!(rebuilt[(0, 1)], 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_covariance() {
        let rho = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.5, 1.0]);
        let cov = covariance(&[0.2, 0.1], &rho);
        assert_relative_eq!(cov[(0, 0)], 0.04);
        assert_relative_eq!(cov[(0, 1)], 0.01);
        assert_relative_eq!(cov[(1, 1)], 0.01);
    }
}
