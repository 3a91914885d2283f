//! kryst-newton: inexact Newton-Krylov solver over Faer
//!
//! This crate drives a Newton iteration for a discretized nonlinear system F(x) = 0.
//! The problem supplies residuals and, optionally, assembled Jacobians or
//! preconditioner matrices; the inner linear solves run on a small Krylov backend
//! (GMRES, CG, CGS, TFQMR, BiCGStab, direct LU) with Jacobi or ILU(0)
//! preconditioning and a configurable preconditioner reuse policy.

pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod matrix;
pub mod nonlinear;
pub mod preconditioner;
pub mod solver;
pub mod utils;

// Re-exports for convenience
pub use config::*;
pub use context::*;
pub use core::*;
pub use error::*;
pub use matrix::*;
pub use nonlinear::*;
pub use preconditioner::*;
pub use solver::*;
pub use utils::*;
