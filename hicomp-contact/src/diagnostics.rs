//! Recoverable problems reported alongside results.
//!
//! Per-chromosome failures never abort a genome-wide run. They are collected
//! as [`Diagnostic`] values and mirrored to the `log` facade at warn level.

use std::fmt;

/// A non-fatal event raised while preparing or segmenting a matrix.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Diagnostic {
    /// Too few usable bins, singular correlation or solver failure; the
    /// chromosome gets an empty compartment list.
    DegenerateChromosome { chromosome: String, reason: String },
    /// Chromosome lengths imply a different number of bins than the matrix had.
    SectionSizeMismatch { previous: usize, current: usize },
    /// Zero-count filtering would have removed every bin, so it was undone.
    AllColumnsFiltered,
    /// No eigenvector met the mean compartment size limit; the first one is used.
    EigenvectorFallback { chromosome: String },
    /// Two clusters intermingle too little; three clusters were tried instead.
    LowIntermingling { chromosome: String },
    /// Clustering produced no valid cut; provisional labels are kept.
    ClusteringSkipped { chromosome: String },
}

impl Diagnostic {
    /// Chromosome the diagnostic refers to, if any.
    pub fn chromosome(&self) -> Option<&str> {
        match self {
            Diagnostic::DegenerateChromosome { chromosome, .. }
            | Diagnostic::EigenvectorFallback { chromosome }
            | Diagnostic::LowIntermingling { chromosome }
            | Diagnostic::ClusteringSkipped { chromosome } => Some(chromosome),
            Diagnostic::SectionSizeMismatch { .. } | Diagnostic::AllColumnsFiltered => None,
        }
    }

    /// Log at warn level and hand the value back.
    pub(crate) fn emit(self) -> Self {
        log::warn!("{}", self);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DegenerateChromosome { chromosome, reason } => {
                write!(f, "chromosome {}: no compartments ({})", chromosome, reason)
            }
            Diagnostic::SectionSizeMismatch { previous, current } => write!(
                f,
                "different sizes ({}, now: {}), should adjust the resolution",
                previous, current
            ),
            Diagnostic::AllColumnsFiltered => write!(
                f,
                "all columns would have been filtered out, filtering disabled"
            ),
            Diagnostic::EigenvectorFallback { chromosome } => {
                write!(f, "chromosome {}: keeping first eigenvector", chromosome)
            }
            Diagnostic::LowIntermingling { chromosome } => write!(
                f,
                "chromosome {}: very low intermingling of A/B compartments, trying 3 clusters",
                chromosome
            ),
            Diagnostic::ClusteringSkipped { chromosome } => write!(
                f,
                "chromosome {}: compartment clustering is not clear, skipping",
                chromosome
            ),
        }
    }
}
