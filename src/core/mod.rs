//! Core traits and their implementations for faer matrices and vectors.

pub mod traits;
pub mod wrappers;

pub use traits::*;
