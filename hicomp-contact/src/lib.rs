//! Hi-C contact matrices and A/B compartment detection.
//!
//! This crate provides the compartment-calling engine of hicomp:
//!
//! - **Contact matrices**: sparse symmetric [`ContactMatrix`] with chromosome
//!   [`Sections`], bad bins, bias and expected counts
//! - **Normalization**: the [`NormalizationPort`] contract and a
//!   [`BasicNormalizer`] implementing it
//! - **Segmentation**: eigenvectors of the observed/expected correlation
//!   matrix and their sign changes ([`CorrelationSegmenter`])
//! - **Labeling**: Gaussian HMMs ([`HmmCompartmentClassifier`]) or Ward
//!   clustering ([`ClusterCompartmentClassifier`])
//! - **Output**: compartment, eigenvector, matrix and coordinate tables
//! - **State**: bad bins, bias and expected counts saved for later runs
//!
//! # Quick start
//!
//! ```
//! use hicomp_contact::ContactMatrix;
//! use hicomp_core::Summarizable;
//!
//! let mut matrix = ContactMatrix::from_triplets(
//!     vec![(0, 0, 5.0), (0, 1, 2.0), (1, 1, 4.0)],
//!     2,
//!     10_000,
//! ).unwrap();
//! matrix.add_binned_sections(&[2], Some(&["chr1"])).unwrap();
//!
//! assert_eq!(matrix.get(1, 0).unwrap(), 2.0);
//! assert_eq!(matrix.sum(None, None), 13.0);
//! assert!(matrix.summary().starts_with("ContactMatrix: 2 bins"));
//! ```

pub mod cluster_label;
pub mod compartment;
pub mod density;
pub mod diagnostics;
pub mod focus;
pub mod hmm_label;
pub mod io;
pub mod matrix;
pub mod normalization;
pub mod pipeline;
pub mod sections;
pub mod segment;
pub mod state;

pub use cluster_label::{ClusterCompartmentClassifier, ClusterConfig, ClusterOutcome, ClusterScore};
pub use compartment::{CompartmentInterval, CompartmentType, EigenTrack};
pub use density::{DensityMetric, DensitySource, InteractionDensity, ReferenceTrack};
pub use diagnostics::Diagnostic;
pub use focus::{Focus, Region};
pub use hmm_label::{HmmCompartmentClassifier, HmmConfig, HmmDecoding};
pub use io::{
    compartments_to_string, coord_table_to_string, eigenvectors_to_string, matrix_to_string,
    write_compartments, CoordFormat,
};
pub use matrix::{CisTransOptions, ContactMatrix, DenseView, Expected, SymmetryRepair};
pub use normalization::{prepare_normalization, BasicNormalizer, NormalizationPort, PrepareConfig};
pub use pipeline::{find_compartments, CompartmentConfig, CompartmentReport, Labeling};
pub use sections::{Section, Sections, ANONYMOUS_SECTION};
pub use segment::{ChromosomeSegmentation, CorrelationSegmenter, SegmentOutcome, SegmenterConfig};
pub use state::NormalizationState;
#[cfg(feature = "serde")]
pub use state::{load_normalization, save_normalization};
