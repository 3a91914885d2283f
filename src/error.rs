use std::fmt;

use thiserror::Error;

use crate::utils::convergence::IterationStats;

// Unified error type for kryst-newton

#[derive(Error, Debug)]
pub enum KError {
    #[error("factorization error: {0}")]
    FactorError(String),
    #[error("solve error: {0}")]
    SolveError(String),
    #[error("indefinite matrix detected (p^T A p <= 0)")]
    IndefiniteMatrix,
    #[error("zero pivot at row {0}")]
    ZeroPivot(usize),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Residual, Jacobian or preconditioner could not be computed at the trial point.
    #[error("evaluation failed: {0}")]
    EvaluationError(String),
    /// Inner Krylov solve did not reach its tolerance. `iterations` is `None`
    /// when the backend stopped with an error before reporting a count.
    #[error("linear solve did not converge after {} (achieved tol {achieved_tol:e})", iteration_count(.iterations))]
    LinearSolveError { iterations: Option<usize>, achieved_tol: f64 },
    #[error("nonlinear solve failed after {} outer iterations: {reason}", stats.outer_iterations)]
    SolveFailed { reason: FailureReason, stats: IterationStats },
}

fn iteration_count(iterations: &Option<usize>) -> String {
    match iterations {
        Some(n) => format!("{n} iterations"),
        None => "an unknown number of iterations".to_string(),
    }
}

/// Why a nonlinear solve ended in the `Failed` state.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    MaxIterationsExceeded,
    Diverged,
    /// Linear solve failed again after the preconditioner-rebuild retry.
    LinearSolve(String),
    Evaluation(String),
    /// The step could not be set up with the current configuration, e.g. a
    /// direct solve requested for a matrix-free Jacobian.
    Configuration(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::MaxIterationsExceeded => write!(f, "maximum number of iterations exceeded"),
            FailureReason::Diverged => write!(f, "residual diverged"),
            FailureReason::LinearSolve(msg) => write!(f, "linear solve failed: {msg}"),
            FailureReason::Evaluation(msg) => write!(f, "evaluation failed: {msg}"),
            FailureReason::Configuration(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}
