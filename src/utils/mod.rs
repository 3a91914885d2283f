//! Convergence bookkeeping shared by the linear and nonlinear solvers.

pub mod convergence;
pub use convergence::{Convergence, IterationStats, SolveStats};
