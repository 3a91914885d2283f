//! API options for the Newton solver.
//!
//! `NewtonOptions` gathers the linear-solve configuration, the convergence
//! criteria, the output flags and the preconditioner parameters. Builder methods
//! are named after the recognised options (`ls_max_iters`, `rel_resid_tol`, ...).
//! String-valued options parse through `FromStr` on the corresponding enum.

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::context::SolverKind;
use crate::error::KError;
use crate::nonlinear::linear::{LinearSolveConfig, ReusePolicy};
use crate::nonlinear::status::{ConvergenceCriteria, NormType, ScaleType, Wrms};
use crate::preconditioner::PC;

/// Preconditioner parameters, forwarded untouched to `Preconditioner::setup`.
///
/// Keys understood by the built-in preconditioners: `omega` (Jacobi),
/// `drop_tol` (ILU(0)).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PcParams {
    entries: BTreeMap<String, f64>,
}

impl PcParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: f64) {
        self.entries.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries.get(key).copied()
    }
}

bitflags! {
    /// Message classes emitted by the solver.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct OutputFlags: u32 {
        const ERROR                       = 0b00_0000_0001;
        const WARNING                     = 0b00_0000_0010;
        const OUTER_ITERATION             = 0b00_0000_0100;
        const INNER_ITERATION             = 0b00_0000_1000;
        const PARAMETERS                  = 0b00_0001_0000;
        const DETAILS                     = 0b00_0010_0000;
        const OUTER_ITERATION_STATUS_TEST = 0b00_0100_0000;
        const LINEAR_SOLVER_DETAILS       = 0b00_1000_0000;
        const TEST_DETAILS                = 0b01_0000_0000;
        const DEBUG                       = 0b10_0000_0000;
    }
}

impl Default for OutputFlags {
    fn default() -> Self {
        OutputFlags::ERROR | OutputFlags::WARNING
    }
}

/// Complete configuration of a [`NewtonSolver`](crate::nonlinear::NewtonSolver).
#[derive(Debug, Clone, Default)]
pub struct NewtonOptions {
    pub linear: LinearSolveConfig,
    pub convergence: ConvergenceCriteria,
    pub output: OutputFlags,
    pub pc_params: PcParams,
}

impl NewtonOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn linear_method(mut self, kind: SolverKind) -> Self {
        self.linear.method = kind;
        self
    }

    pub fn ls_max_iters(mut self, n: usize) -> Self {
        self.linear.max_iters = n;
        self
    }

    pub fn ls_tolerance(mut self, tol: f64) -> Self {
        self.linear.tolerance = tol;
        self
    }

    pub fn krylov_subspace_size(mut self, m: usize) -> Self {
        self.linear.krylov_subspace_size = m;
        self
    }

    pub fn preconditioner(mut self, pc: PC) -> Self {
        self.linear.preconditioner = pc;
        self
    }

    pub fn precond_reuse_policy(mut self, policy: ReusePolicy) -> Self {
        self.linear.reuse_policy = policy;
        self
    }

    pub fn precond_max_age(mut self, age: usize) -> Self {
        self.linear.max_age = age;
        self
    }

    /// Relative perturbation λ of the finite-difference Jacobian-vector product.
    pub fn fd_perturbation(mut self, lambda: f64) -> Self {
        self.linear.fd_perturbation = lambda;
        self
    }

    pub fn pc_param(mut self, key: &str, value: f64) -> Self {
        self.pc_params.insert(key, value);
        self
    }

    pub fn norm_type(mut self, norm: NormType) -> Self {
        self.convergence.norm_type = norm;
        self
    }

    pub fn scale_type(mut self, scale: ScaleType) -> Self {
        self.convergence.scale_type = scale;
        self
    }

    pub fn max_iters(mut self, n: usize) -> Self {
        self.convergence.max_iters = n;
        self
    }

    /// `None` disables the criterion.
    pub fn abs_resid_tol(mut self, tol: Option<f64>) -> Self {
        self.convergence.abs_resid = tol;
        self
    }

    /// `None` disables the criterion.
    pub fn rel_resid_tol(mut self, tol: Option<f64>) -> Self {
        self.convergence.rel_resid = tol;
        self
    }

    pub fn update_tol(mut self, tol: Option<f64>) -> Self {
        self.convergence.update = tol;
        self
    }

    pub fn wrms(mut self, wrms: Option<Wrms>) -> Self {
        self.convergence.wrms = wrms;
        self
    }

    pub fn divergence_threshold(mut self, threshold: Option<f64>) -> Self {
        self.convergence.divergence_threshold = threshold;
        self
    }

    pub fn verbosity(mut self, flags: OutputFlags) -> Self {
        self.output = flags;
        self
    }

    pub fn validate(&self) -> Result<(), KError> {
        self.linear.validate()?;
        self.convergence.validate()
    }
}
