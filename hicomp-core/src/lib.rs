//! Shared primitives and traits for the hicomp Hi-C compartment toolkit.
//!
//! `hicomp-core` provides the foundation the other hicomp crates build on:
//!
//! - **Error types**: [`HicompError`] and [`Result`] for structured error handling
//! - **Traits**: [`Summarizable`] and [`Scored`]

pub mod error;
pub mod traits;

pub use error::{HicompError, Result};
pub use traits::*;
