//! Inexact Newton iteration.
//!
//! Each outer iteration evaluates the residual, checks convergence, assembles
//! (or wraps matrix-free) the Jacobian, refreshes the preconditioner under the
//! reuse policy, solves `J·Δx = −F(x)` and applies the step. A failed linear
//! solve is retried once with a rebuilt preconditioner.

use crate::config::options::{NewtonOptions, OutputFlags};
use crate::error::{FailureReason, KError};
use crate::nonlinear::linear::{PcAction, PcReuseState};
use crate::nonlinear::matrix_free::{FdJacobian, JacobianOperator};
use crate::nonlinear::problem::{ProblemAdapter, ResidualProvider};
use crate::nonlinear::status::{ConvergenceEvaluator, ConvergenceStatus};
use crate::preconditioner::PcHandle;
use crate::utils::convergence::IterationStats;

/// Lifecycle of a [`NewtonSolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewtonState {
    Initialized,
    Iterating,
    Converged,
    Failed,
}

/// How a Newton direction is applied to the trial solution.
pub trait StepPolicy {
    fn apply(&mut self, x: &mut [f64], dx: &[f64]);
}

/// x ← x + Δx
#[derive(Debug, Clone, Copy, Default)]
pub struct FullStep;

impl StepPolicy for FullStep {
    fn apply(&mut self, x: &mut [f64], dx: &[f64]) {
        for (xi, di) in x.iter_mut().zip(dx) {
            *xi += di;
        }
    }
}

/// x ← x + θ·Δx with a fixed θ in (0, 1].
#[derive(Debug, Clone, Copy)]
pub struct Damped(pub f64);

impl StepPolicy for Damped {
    fn apply(&mut self, x: &mut [f64], dx: &[f64]) {
        for (xi, di) in x.iter_mut().zip(dx) {
            *xi += self.0 * di;
        }
    }
}

pub struct NewtonSolver<P> {
    adapter: ProblemAdapter<P>,
    options: NewtonOptions,
    step: Box<dyn StepPolicy + Send>,
    reuse: PcReuseState,
    state: NewtonState,
    stats: IterationStats,
    solution: Vec<f64>,
    residual: Vec<f64>,
}

impl<P: ResidualProvider> NewtonSolver<P> {
    /// Fails with `InvalidConfig` when the options cannot drive a solve.
    pub fn new(problem: P, options: NewtonOptions) -> Result<Self, KError> {
        options.validate()?;
        let adapter = ProblemAdapter::new(problem).with_preconditioner_kind(options.linear.preconditioner);
        Ok(Self {
            adapter,
            options,
            step: Box::new(FullStep),
            reuse: PcReuseState::new(),
            state: NewtonState::Initialized,
            stats: IterationStats::default(),
            solution: Vec::new(),
            residual: Vec::new(),
        })
    }

    pub fn with_step_policy<S: StepPolicy + Send + 'static>(mut self, step: S) -> Self {
        self.step = Box::new(step);
        self
    }

    pub fn options(&self) -> &NewtonOptions {
        &self.options
    }

    /// Changes take effect at the next [`solve`](Self::solve).
    pub fn options_mut(&mut self) -> &mut NewtonOptions {
        &mut self.options
    }

    /// Install a caller-owned preconditioner, shared with the linear solve.
    ///
    /// It replaces any built-in preconditioner for the rest of the solver's
    /// life; rebuilds requested by the reuse policy run `setup` on it in place.
    pub fn set_preconditioner(&mut self, pc: PcHandle) {
        self.adapter.set_preconditioner(pc);
        self.reuse.invalidate();
    }

    pub fn preconditioner(&self) -> Option<PcHandle> {
        self.adapter.preconditioner()
    }

    pub fn set_time(&mut self, time: f64) {
        self.adapter.problem_mut().set_time(time);
    }

    pub fn set_time_step(&mut self, dt: f64) {
        self.adapter.problem_mut().set_time_step(dt);
    }

    pub fn problem(&self) -> &P {
        self.adapter.problem()
    }

    /// Last trial solution, also after a failure.
    pub fn solution(&self) -> &[f64] {
        &self.solution
    }

    /// Residual at the last evaluated trial solution.
    pub fn residual(&self) -> &[f64] {
        &self.residual
    }

    pub fn num_iters(&self) -> usize {
        self.stats.outer_iterations
    }

    pub fn num_lin_iters(&self) -> usize {
        self.stats.linear_iterations
    }

    pub fn achieved_tol(&self) -> f64 {
        self.stats.achieved_tol
    }

    pub fn stats(&self) -> &IterationStats {
        &self.stats
    }

    pub fn state(&self) -> NewtonState {
        self.state
    }

    fn logs(&self, flag: OutputFlags) -> bool {
        self.options.output.contains(flag)
    }

    /// Solve F(x) = 0 starting from `x0`.
    ///
    /// Returns the iteration statistics on convergence. Any other outcome of the
    /// iteration is a `SolveFailed` carrying the reason and the statistics
    /// gathered so far; [`solution`](Self::solution) then holds the last trial
    /// solution. Options or an initial guess rejected before the first residual
    /// evaluation come back as a bare `InvalidConfig`.
    pub fn solve(&mut self, x0: &[f64]) -> Result<IterationStats, KError> {
        self.options.validate()?;
        let n = self.adapter.ndofs();
        if x0.len() != n {
            return Err(KError::InvalidConfig(format!("initial guess has {} entries, problem has {n}", x0.len())));
        }
        self.adapter.set_preconditioner_kind(self.options.linear.preconditioner);
        let mut evaluator = ConvergenceEvaluator::new(self.options.convergence.clone())?;
        self.stats = IterationStats::default();
        self.solution = x0.to_vec();
        self.residual.clear();
        self.state = NewtonState::Iterating;
        if self.logs(OutputFlags::PARAMETERS) {
            log::info!("Newton solve: {n} unknowns, {:?}", self.options);
        }

        let mut update: Option<Vec<f64>> = None;
        let mut outer = 0;
        loop {
            let r = match self.adapter.evaluate_residual(&self.solution) {
                Ok(r) => r,
                Err(e) => return Err(self.fail(FailureReason::Evaluation(e.to_string()))),
            };
            let status = evaluator.check(outer, &r, &self.solution, update.as_deref());
            let norm = evaluator.last_norm();
            if outer == 0 {
                self.stats.initial_residual_norm = norm;
            }
            self.stats.final_residual_norm = norm;
            self.residual = r;
            if self.logs(OutputFlags::OUTER_ITERATION) {
                log::info!("Newton iteration {outer}: ‖F‖ = {norm:.6e}");
            }
            if self.logs(OutputFlags::OUTER_ITERATION_STATUS_TEST) {
                log::info!("status {status:?}, tests {:?}", evaluator.last_report());
            }
            if self.logs(OutputFlags::TEST_DETAILS) {
                for line in evaluator.test_details() {
                    log::info!("  {line}");
                }
            }
            match status {
                ConvergenceStatus::Continue => {}
                ConvergenceStatus::Converged => {
                    self.state = NewtonState::Converged;
                    if self.logs(OutputFlags::OUTER_ITERATION) {
                        log::info!(
                            "Newton converged in {outer} iterations ({} linear iterations)",
                            self.stats.linear_iterations
                        );
                    }
                    return Ok(self.stats.clone());
                }
                ConvergenceStatus::MaxIterationsExceeded => {
                    return Err(self.fail(FailureReason::MaxIterationsExceeded));
                }
                ConvergenceStatus::Diverged => return Err(self.fail(FailureReason::Diverged)),
            }

            let dx = match self.newton_step() {
                Ok(dx) => dx,
                Err(KError::EvaluationError(msg)) => return Err(self.fail(FailureReason::Evaluation(msg))),
                Err(e @ (KError::InvalidConfig(_) | KError::Unsupported(_))) => {
                    return Err(self.fail(FailureReason::Configuration(e.to_string())));
                }
                Err(e) => return Err(self.fail(FailureReason::LinearSolve(e.to_string()))),
            };
            if self.logs(OutputFlags::DEBUG) {
                let dx_norm = dx.iter().map(|v| v * v).sum::<f64>().sqrt();
                log::trace!("iteration {outer}: ‖Δx‖₂ = {dx_norm:.6e}");
            }
            self.step.apply(&mut self.solution, &dx);
            update = Some(dx);
            outer += 1;
            self.stats.outer_iterations = outer;
        }
    }

    /// Jacobian, preconditioner and linear solve for the current trial solution.
    fn newton_step(&mut self) -> Result<Vec<f64>, KError> {
        let x = &self.solution;
        let r = &self.residual;
        let jacobian = self.adapter.evaluate_jacobian(x)?;
        let uses_pc = self.adapter.has_preconditioner();
        let linear = &self.options.linear;
        let output = self.options.output;
        let mut retried = false;
        loop {
            let pc = if uses_pc {
                let action = self.reuse.next_action(linear.reuse_policy, linear.max_age);
                let handle =
                    self.adapter
                        .refresh_preconditioner(x, jacobian.as_ref(), &self.options.pc_params, action)?;
                match action {
                    PcAction::Build => self.stats.preconditioner_builds += 1,
                    PcAction::Recompute => self.stats.preconditioner_recomputes += 1,
                    PcAction::Reuse => {}
                }
                if action != PcAction::Reuse {
                    self.reuse.refreshed();
                }
                self.reuse.record_use();
                if output.contains(OutputFlags::DETAILS) {
                    log::debug!("preconditioner {action:?}, age {}", self.reuse.age());
                }
                Some(handle)
            } else {
                None
            };

            let op = match &jacobian {
                Some(j) => JacobianOperator::Assembled(j),
                None => JacobianOperator::MatrixFree(
                    FdJacobian::new(self.adapter.problem(), x, r).with_lambda(linear.fd_perturbation),
                ),
            };
            if output.contains(OutputFlags::DEBUG) {
                if op.is_matrix_free() {
                    log::trace!("matrix-free Jacobian, λ = {:.1e}", linear.fd_perturbation);
                } else {
                    log::trace!("assembled Jacobian");
                }
            }
            let result = linear
                .configure(&op, pc.as_ref())
                .with_output(output)
                .solve_step(r, &mut self.stats);
            if let Some(e) = op.take_error() {
                return Err(e);
            }
            match result {
                Err(e @ KError::LinearSolveError { .. }) if uses_pc && !retried => {
                    if output.contains(OutputFlags::WARNING) {
                        log::warn!("{e}, rebuilding preconditioner");
                    }
                    self.reuse.invalidate();
                    retried = true;
                }
                other => {
                    if output.contains(OutputFlags::INNER_ITERATION) {
                        log::info!("  linear iterations so far: {}", self.stats.linear_iterations);
                    }
                    return other;
                }
            }
        }
    }

    fn fail(&mut self, reason: FailureReason) -> KError {
        self.state = NewtonState::Failed;
        if self.logs(OutputFlags::ERROR) {
            log::error!("Newton solve failed after {} iterations: {reason}", self.stats.outer_iterations);
        }
        KError::SolveFailed { reason, stats: self.stats.clone() }
    }
}
