//! Jacobian operators for the linear solve of a Newton step.
//!
//! Problems without an assembled Jacobian get a finite-difference directional
//! derivative: J·v ≈ (F(x + ηv) − F(x)) / η with η = λ(λ + ‖x‖/‖v‖).

use std::cell::RefCell;

use crate::core::traits::{MatVec, ToDense};
use crate::error::KError;
use crate::matrix::SystemMatrix;
use crate::nonlinear::problem::ResidualProvider;

/// Default relative perturbation λ.
pub const FD_LAMBDA: f64 = 1.0e-6;

fn norm2(v: &[f64]) -> f64 {
    v.iter().map(|a| a * a).sum::<f64>().sqrt()
}

/// Matrix-free Jacobian of `problem` at the point `x` with residual `r = F(x)`.
///
/// A failing residual evaluation inside `matvec` fills the result with NaN, which
/// stops the Krylov iteration; the error is kept for [`take_error`](Self::take_error).
pub struct FdJacobian<'a> {
    problem: &'a dyn ResidualProvider,
    x: &'a [f64],
    r: &'a [f64],
    x_norm: f64,
    lambda: f64,
    error: RefCell<Option<KError>>,
}

impl<'a> FdJacobian<'a> {
    pub fn new(problem: &'a dyn ResidualProvider, x: &'a [f64], r: &'a [f64]) -> Self {
        Self { problem, x, r, x_norm: norm2(x), lambda: FD_LAMBDA, error: RefCell::new(None) }
    }

    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    /// First evaluation error raised by a product, if any.
    pub fn take_error(&self) -> Option<KError> {
        self.error.borrow_mut().take()
    }
}

impl MatVec<Vec<f64>> for FdJacobian<'_> {
    fn matvec(&self, v: &Vec<f64>, y: &mut Vec<f64>) {
        let v_norm = norm2(v);
        if v_norm == 0.0 {
            y.iter_mut().for_each(|yi| *yi = 0.0);
            return;
        }
        let eta = self.lambda * (self.lambda + self.x_norm / v_norm);
        let xp: Vec<f64> = self.x.iter().zip(v).map(|(xi, vi)| xi + eta * vi).collect();
        let mut rp = vec![0.0; self.r.len()];
        match self.problem.residual(&xp, &mut rp) {
            Ok(()) => {
                for ((yi, rpi), ri) in y.iter_mut().zip(&rp).zip(self.r) {
                    *yi = (rpi - ri) / eta;
                }
            }
            Err(e) => {
                y.iter_mut().for_each(|yi| *yi = f64::NAN);
                let mut slot = self.error.borrow_mut();
                if slot.is_none() {
                    *slot = Some(match e {
                        KError::EvaluationError(_) => e,
                        other => KError::EvaluationError(format!("residual in Jacobian-vector product: {other}")),
                    });
                }
            }
        }
    }
}

impl ToDense<f64> for FdJacobian<'_> {
    fn to_dense(&self) -> Option<faer::Mat<f64>> {
        None
    }
}

/// Jacobian of one Newton step: assembled, or finite-difference matrix-free.
pub enum JacobianOperator<'a> {
    Assembled(&'a SystemMatrix),
    MatrixFree(FdJacobian<'a>),
}

impl JacobianOperator<'_> {
    pub fn is_matrix_free(&self) -> bool {
        matches!(self, JacobianOperator::MatrixFree(_))
    }

    pub fn take_error(&self) -> Option<KError> {
        match self {
            JacobianOperator::Assembled(_) => None,
            JacobianOperator::MatrixFree(fd) => fd.take_error(),
        }
    }
}

impl MatVec<Vec<f64>> for JacobianOperator<'_> {
    fn matvec(&self, x: &Vec<f64>, y: &mut Vec<f64>) {
        match self {
            JacobianOperator::Assembled(a) => a.matvec(x, y),
            JacobianOperator::MatrixFree(fd) => fd.matvec(x, y),
        }
    }
}

impl ToDense<f64> for JacobianOperator<'_> {
    fn to_dense(&self) -> Option<faer::Mat<f64>> {
        match self {
            JacobianOperator::Assembled(a) => a.to_dense(),
            JacobianOperator::MatrixFree(_) => None,
        }
    }
}
