//! Statistical methods for the hicomp Hi-C compartment toolkit.
//!
//! - **Descriptive statistics**: mean, median, variance, NaN-aware sums, z-scores
//! - **Ranking and correlation**: Pearson, Spearman, pairwise correlation matrices
//! - **Hypothesis testing**: two-sample t-test
//! - **Special functions**: log-gamma, incomplete beta and gamma
//! - **Linear algebra**: symmetric eigendecomposition
//! - **Smoothing**: 2-D median filter

pub mod correlation;
pub mod descriptive;
pub mod distribution;
pub mod eigen;
pub mod rank;
pub mod smoothing;
pub mod testing;

pub use correlation::{pearson, spearman, CorrelationMatrix};
pub use descriptive::{mean, median, nan_mean, nan_sum, std_dev, variance, zscore};
pub use distribution::{betai, gammainc, gammaincc, ln_gamma};
pub use eigen::{symmetric_eigen, EigenPair, SymmetricEigen};
pub use rank::rank;
pub use smoothing::median_filter;
pub use testing::{t_test_two_sample, TestResult};
