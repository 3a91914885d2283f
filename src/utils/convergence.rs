//! Convergence tracking & tolerance checks for iterative solvers.

/// Stopping criteria for an inner (linear) solve.
pub struct Convergence<T> {
    pub tol: T,
    pub max_iters: usize,
}

#[derive(Clone, Debug)]
pub struct SolveStats<T> {
    pub iterations: usize,
    pub final_residual: T,
    pub converged: bool,
}

impl<T: Copy + num_traits::Float> Convergence<T> {
    /// Returns (should_stop, stats) given current `res_norm` and iteration `i`.
    ///
    /// Convergence is relative to `res0_norm`; hitting `max_iters` stops the
    /// iteration without marking it converged.
    pub fn check(
        &self,
        res_norm: T,
        res0_norm: T,
        i: usize,
    ) -> (bool, SolveStats<T>) {
        let converged = res_norm <= self.tol * res0_norm;
        let stop = converged || i >= self.max_iters || !res_norm.is_finite();
        (
            stop,
            SolveStats {
                iterations: i,
                final_residual: res_norm,
                converged,
            },
        )
    }
}

/// Counters accumulated over one nonlinear solve.
///
/// Reset at the start of every `NewtonSolver::solve`; read-only afterwards and
/// attached to `KError::SolveFailed` so partial progress stays inspectable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IterationStats {
    /// Completed Newton updates.
    pub outer_iterations: usize,
    /// Krylov iterations summed over every linear solve, failed ones included.
    pub linear_iterations: usize,
    /// Relative residual reached by the most recent linear solve.
    pub achieved_tol: f64,
    pub initial_residual_norm: f64,
    pub final_residual_norm: f64,
    pub preconditioner_builds: usize,
    pub preconditioner_recomputes: usize,
    pub linear_solve_failures: usize,
}
