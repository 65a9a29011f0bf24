//! Structured error types for the hicomp workspace.

use thiserror::Error;

/// Unified error type for all hicomp operations.
#[derive(Debug, Error)]
pub enum HicompError {
    /// I/O error (file not found, permission denied, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error (malformed track, region string or table)
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid input (bad arguments, unknown chromosome names)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Cell access outside the matrix bounds.
    #[error("index ({row}, {col}) out of range for matrix of size {size}")]
    OutOfRange { row: usize, col: usize, size: usize },

    /// The call cannot proceed with the current matrix state or options,
    /// e.g. normalization requested before bias is estimated.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A numerical routine failed (non-convergence, singular input).
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Catch-all for other errors
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the hicomp workspace.
pub type Result<T> = std::result::Result<T, HicompError>;
