//! Inner linear solve of a Newton step.
//!
//! [`LinearSolveConfig`] holds the Krylov method, its limits and the
//! preconditioner reuse policy. [`PcReuseState`] decides, before each linear
//! solve, whether the preconditioner is built from scratch, recomputed on its
//! existing structure, or used as is.

use std::fmt;
use std::str::FromStr;

use crate::config::options::OutputFlags;
use crate::context::{KspContext, SolverKind};
use crate::core::traits::{MatVec, ToDense};
use crate::error::KError;
use crate::nonlinear::matrix_free::FD_LAMBDA;
use crate::preconditioner::{PC, PcHandle};
use crate::utils::convergence::IterationStats;

/// What happens to the preconditioner between linear solves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReusePolicy {
    /// New preconditioner object for every linear solve.
    Rebuild,
    /// Keep the preconditioner untouched until it reaches `max_age` uses.
    Reuse,
    /// Refill the numeric values on the existing structure every linear solve.
    #[default]
    Recompute,
}

impl FromStr for ReusePolicy {
    type Err = KError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rebuild" => Ok(ReusePolicy::Rebuild),
            "reuse" => Ok(ReusePolicy::Reuse),
            "recompute" => Ok(ReusePolicy::Recompute),
            other => Err(KError::InvalidConfig(format!("unknown preconditioner reuse policy '{other}'"))),
        }
    }
}

impl fmt::Display for ReusePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReusePolicy::Rebuild => "Rebuild",
            ReusePolicy::Reuse => "Reuse",
            ReusePolicy::Recompute => "Recompute",
        };
        f.write_str(name)
    }
}

/// Preconditioner refresh requested for the next linear solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcAction {
    /// Create a new preconditioner object and set it up.
    Build,
    /// Set up the existing object again with the current matrix.
    Recompute,
    /// Use the existing object as is.
    Reuse,
}

/// Age of the current preconditioner, counted in linear solves since its last refresh.
///
/// Owned by one controller; nothing here is shared between solvers.
#[derive(Debug, Clone, Default)]
pub struct PcReuseState {
    age: usize,
    valid: bool,
    force_rebuild: bool,
}

impl PcReuseState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Action for the next linear solve. A missing or invalidated preconditioner
    /// is rebuilt whatever the policy; under `Reuse`, so is one that has been
    /// used `max_age` times.
    pub fn next_action(&self, policy: ReusePolicy, max_age: usize) -> PcAction {
        if !self.valid || self.force_rebuild {
            return PcAction::Build;
        }
        match policy {
            ReusePolicy::Rebuild => PcAction::Build,
            ReusePolicy::Recompute => PcAction::Recompute,
            ReusePolicy::Reuse if self.age >= max_age => PcAction::Build,
            ReusePolicy::Reuse => PcAction::Reuse,
        }
    }

    /// The preconditioner was just built or recomputed.
    pub fn refreshed(&mut self) {
        self.age = 0;
        self.valid = true;
        self.force_rebuild = false;
    }

    /// One linear solve used the preconditioner.
    pub fn record_use(&mut self) {
        self.age += 1;
    }

    /// Force a rebuild on the next linear solve.
    pub fn invalidate(&mut self) {
        self.force_rebuild = true;
    }

    pub fn age(&self) -> usize {
        self.age
    }
}

/// Configuration of the inner linear solve.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSolveConfig {
    pub method: SolverKind,
    pub max_iters: usize,
    /// Relative residual reduction requested from the Krylov method.
    pub tolerance: f64,
    /// Restart length of GMRES.
    pub krylov_subspace_size: usize,
    pub reuse_policy: ReusePolicy,
    pub max_age: usize,
    /// Built-in preconditioner created when the controller needs a new one.
    pub preconditioner: PC,
    /// Relative perturbation λ of matrix-free Jacobian-vector products.
    pub fd_perturbation: f64,
}

impl Default for LinearSolveConfig {
    fn default() -> Self {
        Self {
            method: SolverKind::Gmres,
            max_iters: 800,
            tolerance: 1e-8,
            krylov_subspace_size: 50,
            reuse_policy: ReusePolicy::Recompute,
            max_age: 999,
            preconditioner: PC::None,
            fd_perturbation: FD_LAMBDA,
        }
    }
}

impl LinearSolveConfig {
    pub fn validate(&self) -> Result<(), KError> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(KError::InvalidConfig(format!("ls_tolerance must be positive, got {}", self.tolerance)));
        }
        if self.method.is_iterative() && self.max_iters == 0 {
            return Err(KError::InvalidConfig("ls_max_iters must be at least 1".into()));
        }
        if self.method == SolverKind::Gmres && self.krylov_subspace_size == 0 {
            return Err(KError::InvalidConfig("krylov_subspace_size must be at least 1".into()));
        }
        if !(self.fd_perturbation.is_finite() && self.fd_perturbation > 0.0) {
            return Err(KError::InvalidConfig(format!(
                "fd_perturbation must be positive, got {}",
                self.fd_perturbation
            )));
        }
        if self.max_age == 0 {
            return Err(KError::InvalidConfig("precond_max_age must be at least 1".into()));
        }
        Ok(())
    }

    /// Bind the configuration to the Jacobian operator and preconditioner of one Newton step.
    pub fn configure<'a, M>(&self, jacobian: &'a M, pc: Option<&'a PcHandle>) -> LinearSolveHandle<'a, M>
    where
        M: MatVec<Vec<f64>> + ToDense<f64>,
    {
        LinearSolveHandle {
            ctx: KspContext {
                kind: self.method,
                a: jacobian,
                pc,
                tol: self.tolerance,
                max_it: self.max_iters,
                restart: self.krylov_subspace_size,
            },
            output: OutputFlags::empty(),
        }
    }
}

/// A configured linear solve, ready to produce Newton steps.
pub struct LinearSolveHandle<'a, M> {
    ctx: KspContext<'a, M>,
    output: OutputFlags,
}

impl<'a, M> LinearSolveHandle<'a, M>
where
    M: MatVec<Vec<f64>> + ToDense<f64>,
{
    pub fn with_output(mut self, output: OutputFlags) -> Self {
        self.output = output;
        self
    }

    /// Solve `J·Δx = −r` from a zero initial guess.
    ///
    /// Adds the inner iterations to `stats` and records the achieved relative
    /// residual `‖J·Δx + r‖ / ‖r‖`. A solve that stops short of the tolerance, or
    /// breaks down, is a `LinearSolveError`. When the backend itself returns an
    /// error the iteration count is unknown: the error carries `iterations: None`
    /// and nothing is added to `linear_iterations`.
    pub fn solve_step(&mut self, r: &[f64], stats: &mut IterationStats) -> Result<Vec<f64>, KError> {
        let b: Vec<f64> = r.iter().map(|v| -v).collect();
        let mut dx = vec![0.0; r.len()];
        let r_norm = r.iter().map(|v| v * v).sum::<f64>().sqrt();
        let outcome = match self.ctx.solve_context(&b, &mut dx) {
            Ok(s) => s,
            Err(e @ (KError::Unsupported(_) | KError::InvalidConfig(_) | KError::EvaluationError(_))) => return Err(e),
            Err(e) => {
                // the backend gives no iteration count with an error; linear_iterations stays as is
                stats.linear_solve_failures += 1;
                if self.output.contains(OutputFlags::WARNING) {
                    log::warn!("{} stopped with an error: {e}", self.ctx.kind);
                }
                stats.achieved_tol = f64::INFINITY;
                return Err(KError::LinearSolveError { iterations: None, achieved_tol: f64::INFINITY });
            }
        };
        let achieved_tol = if r_norm > 0.0 { outcome.final_residual / r_norm } else { 0.0 };
        stats.linear_iterations += outcome.iterations;
        stats.achieved_tol = achieved_tol;
        if self.output.contains(OutputFlags::LINEAR_SOLVER_DETAILS) {
            log::debug!(
                "{}: {} iterations, relative residual {:.3e} (tolerance {:.1e})",
                self.ctx.kind,
                outcome.iterations,
                achieved_tol,
                self.ctx.tol
            );
        }
        if !outcome.converged || !achieved_tol.is_finite() {
            stats.linear_solve_failures += 1;
            return Err(KError::LinearSolveError { iterations: Some(outcome.iterations), achieved_tol });
        }
        Ok(dx)
    }
}
