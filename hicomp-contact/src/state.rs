//! Saving and restoring normalization results.
//!
//! Bad bins, bias and expected counts are costly to estimate and only
//! valid for the resolution they were computed at. A
//! [`NormalizationState`] captures them so that a later run over the same
//! contacts can skip [`prepare_normalization`](crate::prepare_normalization).

use std::collections::BTreeSet;
#[cfg(feature = "serde")]
use std::path::Path;

use hicomp_core::{HicompError, Result};

use crate::matrix::{ContactMatrix, Expected};

/// Normalization results of one matrix.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NormalizationState {
    pub resolution: usize,
    pub bads: BTreeSet<usize>,
    pub bias: Option<Vec<f64>>,
    pub expected: Option<Expected>,
}

impl ContactMatrix {
    /// Snapshot of the current bad bins, bias and expected counts.
    pub fn normalization_state(&self) -> NormalizationState {
        NormalizationState {
            resolution: self.resolution(),
            bads: self.bads().clone(),
            bias: self.bias().map(|b| b.to_vec()),
            expected: self.expected().cloned(),
        }
    }

    /// Install a saved state.
    ///
    /// The resolutions must match. Bad bins and bias are validated against
    /// the matrix size; on error the matrix is left unchanged.
    pub fn restore_normalization(&mut self, state: NormalizationState) -> Result<()> {
        if state.resolution != self.resolution() {
            return Err(HicompError::Configuration(format!(
                "saved normalization is at {} bp, matrix is at {} bp",
                state.resolution,
                self.resolution()
            )));
        }
        let mut staged = self.clone();
        staged.set_bads(state.bads)?;
        if let Some(bias) = state.bias {
            staged.set_bias(bias)?;
        }
        if let Some(expected) = state.expected {
            staged.set_expected(expected);
        }
        *self = staged;
        Ok(())
    }
}

/// Write the normalization state of `matrix` to `path` as JSON.
#[cfg(feature = "serde")]
pub fn save_normalization(path: impl AsRef<Path>, matrix: &ContactMatrix) -> Result<()> {
    let json = serde_json::to_string(&matrix.normalization_state())
        .map_err(|e| HicompError::Parse(e.to_string()))?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Read a state written by [`save_normalization`] and install it on `matrix`.
#[cfg(feature = "serde")]
pub fn load_normalization(path: impl AsRef<Path>, matrix: &mut ContactMatrix) -> Result<()> {
    let text = std::fs::read_to_string(path)?;
    let state: NormalizationState =
        serde_json::from_str(&text).map_err(|e| HicompError::Parse(e.to_string()))?;
    log::info!(
        "restoring normalization: {} bad bins, bias {}, expected {}",
        state.bads.len(),
        if state.bias.is_some() { "present" } else { "absent" },
        if state.expected.is_some() { "present" } else { "absent" }
    );
    matrix.restore_normalization(state)
}
