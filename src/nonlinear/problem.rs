//! Boundary between the Newton solver and a discretized problem.
//!
//! A problem implements [`ResidualProvider`] and advertises the optional
//! capabilities it has ([`JacobianProvider`], [`PreconditionerProvider`])
//! through discovery methods. [`ProblemAdapter`] turns those capabilities into
//! the evaluations the Newton loop asks for.

use std::borrow::Cow;
use std::fmt;

use crate::config::options::PcParams;
use crate::core::traits::MatShape;
use crate::error::KError;
use crate::matrix::SystemMatrix;
use crate::nonlinear::linear::PcAction;
use crate::preconditioner::{PC, PcHandle};

/// Residual F(x) of a discretized nonlinear system.
pub trait ResidualProvider {
    /// Number of unknowns.
    fn ndofs(&self) -> usize;

    /// Write F(x) into `r`. Must not depend on earlier calls.
    fn residual(&self, x: &[f64], r: &mut [f64]) -> Result<(), KError>;

    fn jacobian_provider(&self) -> Option<&dyn JacobianProvider> {
        None
    }

    fn preconditioner_provider(&self) -> Option<&dyn PreconditionerProvider> {
        None
    }

    /// Current time for time-dependent residuals.
    fn set_time(&mut self, _time: f64) {}

    fn set_time_step(&mut self, _dt: f64) {}
}

/// Assembled Jacobian dF/dx.
pub trait JacobianProvider {
    fn jacobian(&self, x: &[f64]) -> Result<SystemMatrix, KError>;
}

/// Matrix a preconditioner is built from, when it differs from the Jacobian.
pub trait PreconditionerProvider {
    fn preconditioner_matrix(&self, x: &[f64]) -> Result<SystemMatrix, KError>;
}

type ResidualFn = Box<dyn Fn(&[f64], &mut [f64]) -> Result<(), KError> + Send + Sync>;
type MatrixFn = Box<dyn Fn(&[f64]) -> Result<SystemMatrix, KError> + Send + Sync>;

/// Problem defined by closures.
pub struct FnProblem {
    ndofs: usize,
    residual: ResidualFn,
    jacobian: Option<MatrixFn>,
    preconditioner: Option<MatrixFn>,
}

impl FnProblem {
    pub fn new<F>(ndofs: usize, residual: F) -> Self
    where
        F: Fn(&[f64], &mut [f64]) -> Result<(), KError> + Send + Sync + 'static,
    {
        Self { ndofs, residual: Box::new(residual), jacobian: None, preconditioner: None }
    }

    pub fn with_jacobian<F>(mut self, jacobian: F) -> Self
    where
        F: Fn(&[f64]) -> Result<SystemMatrix, KError> + Send + Sync + 'static,
    {
        self.jacobian = Some(Box::new(jacobian));
        self
    }

    pub fn with_preconditioner_matrix<F>(mut self, matrix: F) -> Self
    where
        F: Fn(&[f64]) -> Result<SystemMatrix, KError> + Send + Sync + 'static,
    {
        self.preconditioner = Some(Box::new(matrix));
        self
    }
}

impl fmt::Debug for FnProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProblem")
            .field("ndofs", &self.ndofs)
            .field("jacobian", &self.jacobian.is_some())
            .field("preconditioner", &self.preconditioner.is_some())
            .finish()
    }
}

impl ResidualProvider for FnProblem {
    fn ndofs(&self) -> usize {
        self.ndofs
    }

    fn residual(&self, x: &[f64], r: &mut [f64]) -> Result<(), KError> {
        (self.residual)(x, r)
    }

    fn jacobian_provider(&self) -> Option<&dyn JacobianProvider> {
        self.jacobian.as_ref().map(|_| self as &dyn JacobianProvider)
    }

    fn preconditioner_provider(&self) -> Option<&dyn PreconditionerProvider> {
        self.preconditioner.as_ref().map(|_| self as &dyn PreconditionerProvider)
    }
}

impl JacobianProvider for FnProblem {
    fn jacobian(&self, x: &[f64]) -> Result<SystemMatrix, KError> {
        match &self.jacobian {
            Some(f) => f(x),
            None => Err(KError::EvaluationError("problem has no Jacobian".into())),
        }
    }
}

impl PreconditionerProvider for FnProblem {
    fn preconditioner_matrix(&self, x: &[f64]) -> Result<SystemMatrix, KError> {
        match &self.preconditioner {
            Some(f) => f(x),
            None => Err(KError::EvaluationError("problem has no preconditioner matrix".into())),
        }
    }
}

fn evaluation(what: &str, e: KError) -> KError {
    match e {
        KError::EvaluationError(_) => e,
        other => KError::EvaluationError(format!("{what}: {other}")),
    }
}

/// Evaluations requested by the Newton loop, plus the preconditioner it shares
/// with the linear solve.
pub struct ProblemAdapter<P> {
    problem: P,
    pc_kind: PC,
    pc: Option<PcHandle>,
    /// `pc` was installed by the caller and takes precedence over `pc_kind`.
    user_pc: bool,
}

impl<P: ResidualProvider> ProblemAdapter<P> {
    pub fn new(problem: P) -> Self {
        Self { problem, pc_kind: PC::None, pc: None, user_pc: false }
    }

    /// Built-in preconditioner created whenever a rebuild is requested.
    pub fn with_preconditioner_kind(mut self, kind: PC) -> Self {
        self.pc_kind = kind;
        self
    }

    pub fn set_preconditioner_kind(&mut self, kind: PC) {
        self.pc_kind = kind;
    }

    pub fn ndofs(&self) -> usize {
        self.problem.ndofs()
    }

    pub fn problem(&self) -> &P {
        &self.problem
    }

    pub fn problem_mut(&mut self) -> &mut P {
        &mut self.problem
    }

    /// F(x). `x` is left untouched.
    pub fn evaluate_residual(&self, x: &[f64]) -> Result<Vec<f64>, KError> {
        let n = self.problem.ndofs();
        if x.len() != n {
            return Err(KError::EvaluationError(format!("trial solution has {} entries, problem has {n}", x.len())));
        }
        let mut r = vec![0.0; n];
        self.problem.residual(x, &mut r).map_err(|e| evaluation("residual", e))?;
        Ok(r)
    }

    /// Assembled Jacobian at `x`, or `None` if the problem does not provide one.
    pub fn evaluate_jacobian(&self, x: &[f64]) -> Result<Option<SystemMatrix>, KError> {
        let Some(provider) = self.problem.jacobian_provider() else {
            return Ok(None);
        };
        let j = provider.jacobian(x).map_err(|e| evaluation("jacobian", e))?;
        let n = self.problem.ndofs();
        if j.nrows() != n || j.ncols() != n {
            return Err(KError::EvaluationError(format!(
                "jacobian is {}x{}, problem has {n} unknowns",
                j.nrows(),
                j.ncols()
            )));
        }
        Ok(Some(j))
    }

    /// Build a fresh preconditioner at `x`.
    pub fn evaluate_preconditioner(&mut self, x: &[f64], params: &PcParams) -> Result<PcHandle, KError> {
        self.refresh_preconditioner(x, None, params, PcAction::Build)
    }

    /// Refresh the preconditioner according to `action`.
    ///
    /// The matrix comes from the preconditioner provider, else from `jacobian`
    /// when one was already assembled for this step, else from the Jacobian
    /// provider. `Build` creates a new object of the built-in kind, except after
    /// [`set_preconditioner`](Self::set_preconditioner): the installed object is
    /// then set up again in place and never replaced.
    pub fn refresh_preconditioner(
        &mut self,
        x: &[f64],
        jacobian: Option<&SystemMatrix>,
        params: &PcParams,
        action: PcAction,
    ) -> Result<PcHandle, KError> {
        if action == PcAction::Reuse {
            if let Some(pc) = &self.pc {
                return Ok(pc.clone());
            }
        }
        let handle = match (action, &self.pc) {
            (_, Some(pc)) if self.user_pc => pc.clone(),
            (PcAction::Recompute | PcAction::Reuse, Some(pc)) => pc.clone(),
            _ => match self.pc_kind.create() {
                Some(fresh) => fresh,
                None => self
                    .pc
                    .clone()
                    .ok_or_else(|| KError::EvaluationError("no preconditioner configured".into()))?,
            },
        };
        let matrix: Cow<'_, SystemMatrix> = if let Some(provider) = self.problem.preconditioner_provider() {
            Cow::Owned(provider.preconditioner_matrix(x).map_err(|e| evaluation("preconditioner matrix", e))?)
        } else if let Some(j) = jacobian {
            Cow::Borrowed(j)
        } else if let Some(provider) = self.problem.jacobian_provider() {
            Cow::Owned(provider.jacobian(x).map_err(|e| evaluation("jacobian", e))?)
        } else {
            return Err(KError::EvaluationError(
                "a preconditioner needs an assembled Jacobian or preconditioner matrix".into(),
            ));
        };
        handle
            .setup(&matrix, params)
            .map_err(|e| evaluation("preconditioner setup", e))?;
        self.pc = Some(handle.clone());
        Ok(handle)
    }

    /// Install a caller-owned preconditioner; the adapter keeps a shared reference
    /// and uses it for every later linear solve, whatever built-in kind is configured.
    pub fn set_preconditioner(&mut self, pc: PcHandle) {
        self.pc = Some(pc);
        self.user_pc = true;
    }

    pub fn preconditioner(&self) -> Option<PcHandle> {
        self.pc.clone()
    }

    /// Whether the linear solve of a Newton step is preconditioned.
    pub fn has_preconditioner(&self) -> bool {
        self.pc_kind != PC::None || self.pc.is_some()
    }
}
