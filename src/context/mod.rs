//! Context module: solver and preconditioner selection.
//!
//! Modules:
//! - [`ksp_context`]: `SolverKind` and the `KspContext` that dispatches one linear solve.
//! - [`pc_context`]: the `PC` preconditioner kinds and their factory.
//!
//! # References
//! - PETSc documentation: https://petsc.org/release/docs/manualpages/KSP/

pub mod ksp_context;
pub use ksp_context::{KspContext, SolverKind};
pub mod pc_context;
