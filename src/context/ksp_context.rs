//! Factory for Krylov Subspace Methods (KSP).
//!
//! `KspContext` selects one of the linear backends by [`SolverKind`] and runs it
//! on an operator with an optional shared preconditioner. Iterative kinds only
//! need the action of the operator; `Lu` requires a dense copy of it.
//!
//! # References
//! - Saad, Y. (2003). Iterative Methods for Sparse Linear Systems. SIAM.
//! - Templates for the Solution of Linear Systems: Building Blocks for Iterative Methods, 2nd Edition (Barrett et al.)

use std::fmt;
use std::str::FromStr;

use crate::core::traits::{MatVec, ToDense};
use crate::error::KError;
use crate::preconditioner::{PcHandle, Preconditioner};
use crate::solver::{BiCgStabSolver, CgSolver, CgsSolver, GmresSolver, LinearSolver, LuSolver, TfqmrSolver};
use crate::utils::convergence::SolveStats;

/// Enum representing the available linear solver types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SolverKind {
    /// Restarted GMRES, right-preconditioned
    #[default]
    Gmres,
    /// (Preconditioned) Conjugate Gradient, for SPD matrices
    Cg,
    /// Conjugate Gradient Squared (CGS)
    Cgs,
    /// Transpose-Free QMR (TFQMR)
    Tfqmr,
    /// BiConjugate Gradient Stabilized (BiCGStab)
    Bicgstab,
    /// Dense LU with full pivoting
    Lu,
}

impl SolverKind {
    pub fn is_iterative(&self) -> bool {
        !matches!(self, SolverKind::Lu)
    }
}

impl FromStr for SolverKind {
    type Err = KError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gmres" => Ok(SolverKind::Gmres),
            "cg" | "pcg" => Ok(SolverKind::Cg),
            "cgs" => Ok(SolverKind::Cgs),
            "tfqmr" => Ok(SolverKind::Tfqmr),
            "bicgstab" => Ok(SolverKind::Bicgstab),
            "lu" | "direct" => Ok(SolverKind::Lu),
            other => Err(KError::InvalidConfig(format!("unknown linear solver '{other}'"))),
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolverKind::Gmres => "GMRES",
            SolverKind::Cg => "CG",
            SolverKind::Cgs => "CGS",
            SolverKind::Tfqmr => "TFQMR",
            SolverKind::Bicgstab => "BiCGStab",
            SolverKind::Lu => "LU",
        };
        f.write_str(name)
    }
}

/// Context and configuration for one linear solve.
///
/// Holds the operator, preconditioner, solver kind, tolerance, and other parameters.
/// Use `solve_context` to solve a linear system with the configured solver.
pub struct KspContext<'a, M> {
    /// The type of linear solver to use
    pub kind: SolverKind,
    /// The system operator
    pub a: &'a M,
    /// Optional preconditioner, ignored by `Lu`
    pub pc: Option<&'a PcHandle>,
    /// Relative residual tolerance
    pub tol: f64,
    /// Maximum number of iterations
    pub max_it: usize,
    /// Restart parameter (for GMRES)
    pub restart: usize,
}

impl<'a, M> KspContext<'a, M>
where
    M: MatVec<Vec<f64>> + ToDense<f64>,
{
    /// Solve the linear system `Ax = b` using the configured solver and preconditioner.
    ///
    /// `x` holds the initial guess on entry.
    ///
    /// # Returns
    /// * `Ok(SolveStats)` when the backend ran; check `converged`
    /// * `Err(KError)` on breakdown, preconditioner failure or an operator `Lu` cannot densify
    pub fn solve_context(&self, b: &Vec<f64>, x: &mut Vec<f64>) -> Result<SolveStats<f64>, KError> {
        let guard = match self.pc {
            Some(handle) => Some(handle.read()?),
            None => None,
        };
        let pc: Option<&dyn Preconditioner<Vec<f64>>> = match guard.as_deref() {
            Some(p) => Some(p),
            None => None,
        };
        match self.kind {
            SolverKind::Gmres => GmresSolver::new(self.restart, self.tol, self.max_it).solve(self.a, pc, b, x),
            SolverKind::Cg => CgSolver::new(self.tol, self.max_it).solve(self.a, pc, b, x),
            SolverKind::Cgs => CgsSolver::new(self.tol, self.max_it).solve(self.a, pc, b, x),
            SolverKind::Tfqmr => TfqmrSolver::new(self.tol, self.max_it).solve(self.a, pc, b, x),
            SolverKind::Bicgstab => BiCgStabSolver::new(self.tol, self.max_it).solve(self.a, pc, b, x),
            SolverKind::Lu => {
                let dense = self
                    .a
                    .to_dense()
                    .ok_or(KError::Unsupported("LU needs an assembled operator"))?;
                LuSolver::new().solve(&dense, None, b, x)
            }
        }
    }
}
