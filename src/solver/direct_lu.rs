//! Direct dense solve using Faer's LU with full pivoting.
//!
//! Used as the `LU` linear-solver method of a Newton step and as the reference
//! solution in tests. Sparse or matrix-free operators are densified first.
//!
//! # References
//! - Faer documentation: https://github.com/sarah-ek/faer-rs
//! - Golub & Van Loan, Matrix Computations

use crate::core::traits::MatVec;
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use crate::solver::LinearSolver;
use crate::utils::convergence::SolveStats;
use faer::linalg::solvers::{FullPivLu, SolveCore};
use faer::{Conj, Mat, MatMut};

/// LU solver using full pivoting from Faer.
///
/// Stores the last factorization so further right-hand sides can reuse it.
#[derive(Default)]
pub struct LuSolver {
    factor: Option<FullPivLu<f64>>,
    n: usize,
}

impl LuSolver {
    /// Create a new LU solver (no factorization yet).
    pub fn new() -> Self {
        Self::default()
    }

    /// Factor `a`, replacing any cached factorization.
    pub fn factor(&mut self, a: &Mat<f64>) -> Result<(), KError> {
        if a.nrows() != a.ncols() {
            return Err(KError::FactorError(format!("LU needs a square matrix, got {}x{}", a.nrows(), a.ncols())));
        }
        self.factor = Some(FullPivLu::new(a.as_ref()));
        self.n = a.nrows();
        Ok(())
    }

    /// Solve with the cached factorization.
    pub fn solve_cached(&self, b: &[f64], x: &mut [f64]) -> Result<(), KError> {
        let factor = self
            .factor
            .as_ref()
            .ok_or_else(|| KError::SolveError("LU solve requested before factorization".into()))?;
        if b.len() != self.n || x.len() != self.n {
            return Err(KError::SolveError(format!("LU factor is {}x{}, rhs has {} entries", self.n, self.n, b.len())));
        }
        x.copy_from_slice(b);
        factor.solve_in_place_with_conj(Conj::No, MatMut::from_column_major_slice_mut(x, self.n, 1));
        if x.iter().any(|v| !v.is_finite()) {
            return Err(KError::FactorError("LU solve produced non-finite values (singular matrix)".into()));
        }
        Ok(())
    }
}

impl LinearSolver<Mat<f64>, Vec<f64>> for LuSolver {
    type Error = KError;
    type Scalar = f64;

    /// Solve Ax = b by factoring `a`. The preconditioner is ignored.
    ///
    /// Reports one iteration; `final_residual` is the true residual ‖b − Ax‖₂.
    fn solve(
        &mut self,
        a: &Mat<f64>,
        _pc: Option<&dyn Preconditioner<Vec<f64>>>,
        b: &Vec<f64>,
        x: &mut Vec<f64>,
    ) -> Result<SolveStats<f64>, KError> {
        self.factor(a)?;
        self.solve_cached(b, x)?;
        let mut ax = vec![0.0; b.len()];
        a.matvec(x, &mut ax);
        let final_residual = ax.iter().zip(b).map(|(ai, bi)| (bi - ai).powi(2)).sum::<f64>().sqrt();
        Ok(SolveStats { iterations: 1, final_residual, converged: true })
    }
}
