//! Solver configuration.

pub mod options;
pub use options::{NewtonOptions, OutputFlags, PcParams};
