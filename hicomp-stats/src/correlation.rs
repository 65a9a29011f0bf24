//! Correlation analysis.
//!
//! Provides Pearson and Spearman correlation coefficients, and a
//! [`CorrelationMatrix`] for the row-by-row correlation of a dense square
//! matrix (the `corrcoef` step of compartment calling).

use hicomp_core::{HicompError, Result, Summarizable};

use crate::rank::rank;

/// Pearson product-moment correlation coefficient between `x` and `y`.
///
/// Returns 0.0 if either series is constant (zero variance).
pub fn pearson(x: &[f64], y: &[f64]) -> Result<f64> {
    validate_paired(x, y)?;

    let n = x.len() as f64;
    let mean_x: f64 = x.iter().sum::<f64>() / n;
    let mean_y: f64 = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        return Ok(0.0);
    }
    Ok(cov / denom)
}

/// Spearman rank correlation coefficient between `x` and `y`.
///
/// Ranks both series (ties averaged), then computes Pearson correlation on
/// the ranks.
pub fn spearman(x: &[f64], y: &[f64]) -> Result<f64> {
    validate_paired(x, y)?;
    pearson(&rank(x), &rank(y))
}

fn validate_paired(x: &[f64], y: &[f64]) -> Result<()> {
    if x.len() != y.len() {
        return Err(HicompError::InvalidInput(format!(
            "correlation: x and y must have the same length ({} vs {})",
            x.len(),
            y.len(),
        )));
    }
    if x.len() < 2 {
        return Err(HicompError::InvalidInput(
            "correlation: need at least 2 observations".into(),
        ));
    }
    Ok(())
}

// ── Correlation matrix ─────────────────────────────────────────────────────

/// Pairwise Pearson correlation between the rows of a matrix.
///
/// Rows with zero variance correlate 0.0 with everything, themselves
/// included, so that undefined coefficients never reach the eigensolver.
#[derive(Debug, Clone)]
pub struct CorrelationMatrix {
    /// Flat storage (row-major, n×n).
    data: Vec<f64>,
    /// Number of rows correlated.
    size: usize,
}

impl CorrelationMatrix {
    /// Correlate the rows of a row-major `n × m` matrix.
    pub fn from_flat(values: &[f64], n: usize, m: usize) -> Result<Self> {
        if values.len() != n * m {
            return Err(HicompError::InvalidInput(format!(
                "CorrelationMatrix: expected {} values for {}x{}, got {}",
                n * m,
                n,
                m,
                values.len(),
            )));
        }
        let rows: Vec<&[f64]> = (0..n).map(|i| &values[i * m..(i + 1) * m]).collect();
        Self::from_rows(&rows)
    }

    /// Build a correlation matrix from rows of observations.
    ///
    /// Each inner slice is one variable's observations; all must have the
    /// same length and at least 2 elements.
    pub fn from_rows(rows: &[&[f64]]) -> Result<Self> {
        if rows.is_empty() {
            return Err(HicompError::InvalidInput(
                "CorrelationMatrix: need at least one row".into(),
            ));
        }
        let obs_len = rows[0].len();
        if obs_len < 2 {
            return Err(HicompError::InvalidInput(
                "CorrelationMatrix: need at least 2 observations per row".into(),
            ));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != obs_len {
                return Err(HicompError::InvalidInput(format!(
                    "CorrelationMatrix: row {} has {} observations, expected {}",
                    i,
                    row.len(),
                    obs_len,
                )));
            }
        }

        // Center each row and keep its norm; a zero norm marks a constant row.
        let centered: Vec<(Vec<f64>, f64)> = rows
            .iter()
            .map(|row| {
                let m = row.iter().sum::<f64>() / obs_len as f64;
                let c: Vec<f64> = row.iter().map(|v| v - m).collect();
                let norm = c.iter().map(|v| v * v).sum::<f64>().sqrt();
                (c, norm)
            })
            .collect();

        let n = rows.len();
        let coef = |i: usize, j: usize| -> f64 {
            let (ci, ni) = &centered[i];
            let (cj, nj) = &centered[j];
            let denom = ni * nj;
            if denom == 0.0 || !denom.is_finite() {
                return 0.0;
            }
            let r = ci.iter().zip(cj).map(|(a, b)| a * b).sum::<f64>() / denom;
            if r.is_nan() {
                0.0
            } else {
                r.clamp(-1.0, 1.0)
            }
        };

        #[cfg(feature = "parallel")]
        let upper: Vec<Vec<f64>> = {
            use rayon::prelude::*;
            (0..n)
                .into_par_iter()
                .map(|i| (i..n).map(|j| coef(i, j)).collect())
                .collect()
        };
        #[cfg(not(feature = "parallel"))]
        let upper: Vec<Vec<f64>> = (0..n).map(|i| (i..n).map(|j| coef(i, j)).collect()).collect();

        let mut data = vec![0.0; n * n];
        for (i, row) in upper.iter().enumerate() {
            for (offset, &r) in row.iter().enumerate() {
                let j = i + offset;
                data[i * n + j] = r;
                data[j * n + i] = r;
            }
        }
        // self-correlation of a non-constant row is exactly 1
        for i in 0..n {
            if centered[i].1 > 0.0 {
                data[i * n + i] = 1.0;
            }
        }

        Ok(Self { data, size: n })
    }

    /// Get the correlation between row `i` and row `j`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.size + j]
    }

    /// Number of rows correlated.
    pub fn n(&self) -> usize {
        self.size
    }

    /// Row-major view of the coefficients.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Consume into the row-major coefficient vector.
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }
}

impl Summarizable for CorrelationMatrix {
    fn summary(&self) -> String {
        format!("CorrelationMatrix: {}x{}", self.size, self.size)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
