//! Newton-Krylov nonlinear solver.
//!
//! - [`problem`]: capability traits a discretized problem implements, and the adapter over them.
//! - [`status`]: convergence criteria and their evaluator.
//! - [`linear`]: inner linear-solve configuration and preconditioner reuse.
//! - [`matrix_free`]: finite-difference Jacobian-vector products.
//! - [`newton`]: the outer iteration.

pub mod linear;
pub mod matrix_free;
pub mod newton;
pub mod problem;
pub mod status;

pub use linear::{LinearSolveConfig, LinearSolveHandle, PcAction, PcReuseState, ReusePolicy};
pub use matrix_free::{FdJacobian, JacobianOperator};
pub use newton::{Damped, FullStep, NewtonSolver, NewtonState, StepPolicy};
pub use problem::{FnProblem, JacobianProvider, PreconditionerProvider, ProblemAdapter, ResidualProvider};
pub use status::{ConvergenceCriteria, ConvergenceEvaluator, ConvergenceStatus, CriteriaReport, NormType, ScaleType, Wrms};
