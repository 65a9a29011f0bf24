//! Typed compartment intervals and eigenvector tracks.

use std::fmt;
use std::str::FromStr;

use hicomp_core::{HicompError, Result, Summarizable};

/// Compartment category of an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompartmentType {
    A,
    B,
    /// Intermediate A-like state (`a`).
    SubA,
    /// Intermediate B-like state (`b`).
    SubB,
    /// Middle state of an odd-sized model (`I`).
    Indeterminate,
    /// Run of bad bins (`NA`).
    Masked,
    /// No typing information.
    #[default]
    Unlabeled,
}

impl CompartmentType {
    /// Letter used in compartment tables.
    pub fn letter(&self) -> &'static str {
        match self {
            CompartmentType::A => "A",
            CompartmentType::B => "B",
            CompartmentType::SubA => "a",
            CompartmentType::SubB => "b",
            CompartmentType::Indeterminate => "I",
            CompartmentType::Masked => "NA",
            CompartmentType::Unlabeled => "",
        }
    }

    pub fn is_masked(&self) -> bool {
        matches!(self, CompartmentType::Masked)
    }
}

impl fmt::Display for CompartmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letter())
    }
}

impl FromStr for CompartmentType {
    type Err = HicompError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "A" => Ok(CompartmentType::A),
            "B" => Ok(CompartmentType::B),
            "a" => Ok(CompartmentType::SubA),
            "b" => Ok(CompartmentType::SubB),
            "I" => Ok(CompartmentType::Indeterminate),
            "NA" => Ok(CompartmentType::Masked),
            "" => Ok(CompartmentType::Unlabeled),
            other => Err(HicompError::Parse(format!(
                "unknown compartment type '{}'",
                other
            ))),
        }
    }
}

/// A run of bins `start..=end` in chromosome-local coordinates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompartmentInterval {
    pub start: usize,
    /// Inclusive.
    pub end: usize,
    /// Normalized density, 1.0 being the chromosome mean.
    pub density: f64,
    pub kind: CompartmentType,
}

impl CompartmentInterval {
    pub fn new(start: usize, end: usize, kind: CompartmentType) -> Self {
        Self {
            start,
            end,
            density: 1.0,
            kind,
        }
    }

    /// Number of bins covered.
    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Leading eigenvectors of one chromosome's correlation matrix.
///
/// Vectors span the whole chromosome with NaN at bad bins and are oriented
/// so that positive values denote the A-like compartment when a reference
/// track was available.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EigenTrack {
    pub chromosome: String,
    /// Descending.
    pub eigenvalues: Vec<f64>,
    pub eigenvectors: Vec<Vec<f64>>,
    /// 1-based index of the eigenvector used for segmentation.
    pub selected: usize,
    /// Spearman rho of the selected eigenvector against the reference track.
    pub reference_rho: Option<f64>,
}

impl EigenTrack {
    /// The eigenvector used for segmentation.
    pub fn selected_vector(&self) -> &[f64] {
        &self.eigenvectors[self.selected - 1]
    }
}

impl Summarizable for EigenTrack {
    fn summary(&self) -> String {
        format!(
            "EigenTrack {}: {} eigenvectors over {} bins, EV{} selected",
            self.chromosome,
            self.eigenvectors.len(),
            self.eigenvectors.first().map_or(0, |v| v.len()),
            self.selected
        )
    }
}
