//! Condensed pairwise distance matrices.
//!
//! Distances between `n` items are kept as the `n*(n-1)/2` cells above the
//! diagonal, row after row.

use hicomp_core::{HicompError, Result};

/// Symmetric pairwise distances with a zero diagonal.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DistanceMatrix {
    upper: Vec<f64>,
    n: usize,
}

fn l2(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
}

impl DistanceMatrix {
    /// Euclidean distances between the rows of a score table, one row per
    /// item. Rows must share a non-zero width.
    pub fn from_points(rows: &[&[f64]]) -> Result<Self> {
        let n = rows.len();
        let width = rows.first().map_or(0, |r| r.len());
        if n < 2 || width == 0 {
            return Err(HicompError::InvalidInput(format!(
                "cannot measure distances between {} rows of width {}",
                n, width
            )));
        }
        if let Some(k) = rows.iter().position(|r| r.len() != width) {
            return Err(HicompError::InvalidInput(format!(
                "row {} has {} values, expected {}",
                k,
                rows[k].len(),
                width
            )));
        }

        let row_distances = |i: usize| -> Vec<f64> { rows[i + 1..].iter().map(|r| l2(rows[i], r)).collect() };
        #[cfg(feature = "parallel")]
        let upper: Vec<f64> = {
            use rayon::prelude::*;
            (0..n).into_par_iter().flat_map_iter(row_distances).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let upper: Vec<f64> = (0..n).flat_map(row_distances).collect();
        Ok(Self { upper, n })
    }

    /// Wrap precomputed upper-triangle distances of `n` items.
    pub fn from_condensed(upper: Vec<f64>, n: usize) -> Result<Self> {
        let cells = n * n.saturating_sub(1) / 2;
        if upper.len() != cells {
            return Err(HicompError::InvalidInput(format!(
                "{} distances given for {} items, expected {}",
                upper.len(),
                n,
                cells
            )));
        }
        if upper.iter().any(|d| !d.is_finite()) {
            return Err(HicompError::InvalidInput("distances must be finite".into()));
        }
        Ok(Self { upper, n })
    }

    /// Distance between items `i` and `j`, in either order.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let (a, b) = (i.min(j), i.max(j));
        if a == b {
            return 0.0;
        }
        // rows before `a` hold n-1, n-2, ... cells
        self.upper[a * (2 * self.n - a - 1) / 2 + (b - a - 1)]
    }

    pub fn n(&self) -> usize {
        self.n
    }
}
