use crate::core::error::{Result, RiskError};
use crate::core::instrument::InstrumentId;
use crate::estimation::matrix::nearest_valid_correlation;
use chrono::NaiveDate;
use log::{debug, warn};
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};

/// Dated log returns of one instrument.
pub type ReturnSeries = Vec<(NaiveDate, f64)>;

/// Symmetric correlation matrix over the instruments of one calculation.
///
/// Row/column `i` belongs to `instruments()[i]`. The diagonal is one and
/// every entry lies in [-1, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    instruments: Vec<InstrumentId>,
    matrix: DMatrix<f64>,
    /// Pairs whose correlation was assumed to be zero for lack of overlap.
    assumed_pairs: Vec<(InstrumentId, InstrumentId)>,
    /// Smallest eigenvalue of the raw estimate when it had to be corrected.
    corrected_from: Option<f64>,
}

impl CorrelationMatrix {
    /// Zero correlation between every pair.
    pub fn identity(instruments: Vec<InstrumentId>) -> Self {
        let n = instruments.len();
        Self {
            instruments,
            matrix: DMatrix::identity(n, n),
            assumed_pairs: Vec::new(),
            corrected_from: None,
        }
    }

    /// The same correlation `rho` between every pair.
    pub fn uniform(instruments: Vec<InstrumentId>, rho: f64) -> Result<Self> {
        let n = instruments.len();
        let matrix = DMatrix::from_fn(n, n, |i, j| if i == j { 1.0 } else { rho });
        Self::from_matrix(instruments, matrix)
    }

    /// Wrap an explicit matrix after checking shape, symmetry, unit diagonal
    /// and range. Indefinite matrices are corrected.
    pub fn from_matrix(instruments: Vec<InstrumentId>, matrix: DMatrix<f64>) -> Result<Self> {
        let n = instruments.len();
        if matrix.nrows() != n || matrix.ncols() != n {
            return Err(RiskError::InvalidCorrelationMatrix(format!(
                "expected {}x{} matrix, got {}x{}",
                n,
                n,
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        for i in 0..n {
            if (matrix[(i, i)] - 1.0).abs() > 1e-12 {
                return Err(RiskError::InvalidCorrelationMatrix(format!(
                    "diagonal entry for {} is {}",
                    instruments[i],
                    matrix[(i, i)]
                )));
            }
            for j in 0..n {
                let v = matrix[(i, j)];
                if !(-1.0..=1.0).contains(&v) || (v - matrix[(j, i)]).abs() > 1e-12 {
                    return Err(RiskError::InvalidCorrelationMatrix(format!(
                        "entry ({}, {}) = {} is out of range or asymmetric",
                        instruments[i], instruments[j], v
                    )));
                }
            }
        }
        let corrected = nearest_valid_correlation(&matrix)?;
        Ok(Self {
            instruments,
            matrix: corrected.matrix,
            assumed_pairs: Vec::new(),
            corrected_from: corrected.corrected_from,
        })
    }

    pub fn instruments(&self) -> &[InstrumentId] {
        &self.instruments
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn assumed_pairs(&self) -> &[(InstrumentId, InstrumentId)] {
        &self.assumed_pairs
    }

    pub fn corrected_from(&self) -> Option<f64> {
        self.corrected_from
    }

    pub fn index_of(&self, instrument: &InstrumentId) -> Option<usize> {
        self.instruments.iter().position(|i| i == instrument)
    }

    /// Correlation between two instruments, if both are present.
    pub fn get(&self, a: &InstrumentId, b: &InstrumentId) -> Option<f64> {
        Some(self.matrix[(self.index_of(a)?, self.index_of(b)?)])
    }

    /// Restrict to a subset of rows/columns, in the given index order.
    pub fn submatrix(&self, indices: &[usize]) -> Self {
        let instruments: Vec<InstrumentId> =
            indices.iter().map(|&i| self.instruments[i].clone()).collect();
        let matrix = DMatrix::from_fn(indices.len(), indices.len(), |r, c| {
            self.matrix[(indices[r], indices[c])]
        });
        let assumed_pairs = self
            .assumed_pairs
            .iter()
            .filter(|(a, b)| instruments.contains(a) && instruments.contains(b))
            .cloned()
            .collect();
        Self {
            instruments,
            matrix,
            assumed_pairs,
            corrected_from: self.corrected_from,
        }
    }
}

/// Pairwise Pearson correlation over overlapping return dates.
pub struct CorrelationEstimator;

impl CorrelationEstimator {
    /// Estimate the correlation matrix for `instruments`.
    ///
    /// Instruments absent from `returns`, and pairs with fewer than two
    /// overlapping dates or a constant return series, get zero correlation
    /// and are listed in [`CorrelationMatrix::assumed_pairs`]. The result is
    /// corrected to the nearest valid correlation matrix when the pairwise
    /// estimate is indefinite.
    pub fn estimate(
        instruments: &[InstrumentId],
        returns: &HashMap<InstrumentId, ReturnSeries>,
    ) -> Result<CorrelationMatrix> {
        let n = instruments.len();
        let indexed: Vec<Option<BTreeMap<NaiveDate, f64>>> = instruments
            .iter()
            .map(|id| returns.get(id).map(|s| s.iter().copied().collect()))
            .collect();

        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .collect();

        let estimates: Vec<(usize, usize, Option<f64>)> = pairs
            .par_iter()
            .map(|&(i, j)| {
                let rho = match (&indexed[i], &indexed[j]) {
                    (Some(a), Some(b)) => pearson_overlap(a, b),
                    _ => None,
                };
                (i, j, rho)
            })
            .collect();

        let mut matrix = DMatrix::identity(n, n);
        let mut assumed_pairs = Vec::new();
        for (i, j, rho) in estimates {
            let value = match rho {
                Some(rho) => rho,
                None => {
                    assumed_pairs.push((instruments[i].clone(), instruments[j].clone()));
                    0.0
                }
            };
            matrix[(i, j)] = value;
            matrix[(j, i)] = value;
        }

        if !assumed_pairs.is_empty() {
            warn!(
                "{} instrument pair(s) lack overlapping history, correlation assumed zero",
                assumed_pairs.len()
            );
        }

        let corrected = nearest_valid_correlation(&matrix)?;
        debug!("estimated {}x{} correlation matrix", n, n);

        Ok(CorrelationMatrix {
            instruments: instruments.to_vec(),
            matrix: corrected.matrix,
            assumed_pairs,
            corrected_from: corrected.corrected_from,
        })
    }
}

/// Pearson correlation over the dates present in both series.
fn pearson_overlap(a: &BTreeMap<NaiveDate, f64>, b: &BTreeMap<NaiveDate, f64>) -> Option<f64> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = a
        .iter()
        .filter_map(|(date, x)| b.get(date).map(|y| (*x, *y)))
        .unzip();
    pearson(&xs, &ys)
}

/// Pearson correlation of two equally long samples, clamped to [-1, 1].
/// `None` when fewer than two points or either sample is constant.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len();
    if n < 2 || ys.len() != n {
        return None;
    }
    let mx = xs.iter().sum::<f64>() / n as f64;
    let my = ys.iter().sum::<f64>() / n as f64;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    let rho = sxy / (sxx * syy).sqrt();
    rho.is_finite().then(|| rho.clamp(-1.0, 1.0))
}
