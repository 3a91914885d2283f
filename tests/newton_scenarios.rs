//! End-to-end Newton solves: convergence, failure reporting, matrix-free
//! Jacobians and the direct backend.

use approx::assert_abs_diff_eq;
use faer::Mat;
use kryst_newton::config::NewtonOptions;
use kryst_newton::context::SolverKind;
use kryst_newton::error::{FailureReason, KError};
use kryst_newton::matrix::{CsrMatrix, SystemMatrix};
use kryst_newton::nonlinear::{FnProblem, NewtonSolver, NewtonState, ResidualProvider, ScaleType};
use kryst_newton::preconditioner::PC;

fn sqrt2() -> FnProblem {
    FnProblem::new(1, |x, r| {
        r[0] = x[0] * x[0] - 2.0;
        Ok(())
    })
    .with_jacobian(|x| Ok(SystemMatrix::from(Mat::from_fn(1, 1, |_, _| 2.0 * x[0]))))
}

/// 1D Bratu problem −u'' = λ eᵘ on (0, 1) with homogeneous Dirichlet ends.
fn bratu(n: usize, lambda: f64) -> FnProblem {
    let h2 = 1.0 / ((n + 1) as f64).powi(2);
    FnProblem::new(n, move |u, r| {
        for i in 0..n {
            let left = if i > 0 { u[i - 1] } else { 0.0 };
            let right = if i + 1 < n { u[i + 1] } else { 0.0 };
            r[i] = (2.0 * u[i] - left - right) / h2 - lambda * u[i].exp();
        }
        Ok(())
    })
    .with_jacobian(move |u| {
        let mut triplets = Vec::with_capacity(3 * n);
        for i in 0..n {
            triplets.push((i, i, 2.0 / h2 - lambda * u[i].exp()));
            if i > 0 {
                triplets.push((i, i - 1, -1.0 / h2));
            }
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0 / h2));
            }
        }
        Ok(SystemMatrix::from(CsrMatrix::from_triplets(n, n, &triplets)?))
    })
}

fn residual_norm(p: &impl ResidualProvider, x: &[f64]) -> f64 {
    let mut r = vec![0.0; x.len()];
    p.residual(x, &mut r).unwrap();
    r.iter().map(|v| v * v).sum::<f64>().sqrt()
}

#[test]
fn sqrt2_converges_on_relative_residual() {
    let opts = NewtonOptions::new().rel_resid_tol(Some(1e-8)).abs_resid_tol(None).max_iters(20);
    let mut solver = NewtonSolver::new(sqrt2(), opts).unwrap();
    let stats = solver.solve(&[1.0]).unwrap();
    assert!(stats.outer_iterations <= 10, "took {} iterations", stats.outer_iterations);
    assert_abs_diff_eq!(solver.solution()[0], 2f64.sqrt(), epsilon = 1e-8);
    assert!(stats.final_residual_norm <= 1e-8 * stats.initial_residual_norm);
    assert_eq!(solver.num_iters(), stats.outer_iterations);
    assert_eq!(solver.num_lin_iters(), stats.linear_iterations);
}

#[test]
fn iteration_cap_reports_max_iterations() {
    let opts = NewtonOptions::new().abs_resid_tol(Some(1e-12)).rel_resid_tol(None).max_iters(1);
    let mut solver = NewtonSolver::new(sqrt2(), opts).unwrap();
    match solver.solve(&[1.0]) {
        Err(KError::SolveFailed { reason, stats }) => {
            assert_eq!(reason, FailureReason::MaxIterationsExceeded);
            assert_eq!(stats.outer_iterations, 1);
        }
        other => panic!("expected max-iterations failure, got {other:?}"),
    }
    // the single Newton step from 1.0 lands on 1.5
    assert_abs_diff_eq!(solver.solution()[0], 1.5, epsilon = 1e-10);
    assert_eq!(solver.state(), NewtonState::Failed);
}

#[test]
fn residual_failure_leaves_initial_guess() {
    let problem = FnProblem::new(2, |_, _| Err(KError::EvaluationError("mesh inverted".into())));
    let mut solver = NewtonSolver::new(problem, NewtonOptions::default()).unwrap();
    let x0 = [0.25, -0.5];
    match solver.solve(&x0) {
        Err(KError::SolveFailed { reason: FailureReason::Evaluation(msg), stats }) => {
            assert!(msg.contains("mesh inverted"));
            assert_eq!(stats.outer_iterations, 0);
            assert_eq!(stats.linear_iterations, 0);
        }
        other => panic!("expected evaluation failure, got {other:?}"),
    }
    assert_eq!(solver.solution(), &x0);
}

#[test]
fn failing_linear_solve_is_retried_once_with_new_preconditioner() {
    let a = Mat::from_fn(3, 3, |i, j| match (i as i64 - j as i64).abs() {
        0 => 4.0,
        1 => 1.0,
        _ => 0.0,
    });
    let a_jac = a.clone();
    let problem = FnProblem::new(3, move |x, r| {
        for i in 0..3 {
            r[i] = (0..3).map(|j| a[(i, j)] * x[j]).sum::<f64>() - (i + 1) as f64;
        }
        Ok(())
    })
    .with_jacobian(move |_| Ok(SystemMatrix::from(a_jac.clone())));
    let opts = NewtonOptions::new().preconditioner(PC::Jacobi).ls_max_iters(1).ls_tolerance(1e-12);
    let mut solver = NewtonSolver::new(problem, opts).unwrap();
    match solver.solve(&[0.0; 3]) {
        Err(KError::SolveFailed { reason: FailureReason::LinearSolve(_), stats }) => {
            assert_eq!(stats.preconditioner_builds, 2);
            assert_eq!(stats.linear_solve_failures, 2);
            assert_eq!(stats.outer_iterations, 0);
        }
        other => panic!("expected linear solve failure, got {other:?}"),
    }
}

#[test]
fn matrix_free_agrees_with_assembled_jacobian() {
    let residual = |x: &[f64], r: &mut [f64]| -> Result<(), KError> {
        r[0] = x[0] * x[0] + x[1] * x[1] - 4.0;
        r[1] = x[0] - x[1];
        Ok(())
    };
    let assembled = FnProblem::new(2, residual).with_jacobian(|x| {
        Ok(SystemMatrix::from(Mat::from_fn(2, 2, |i, j| match (i, j) {
            (0, 0) => 2.0 * x[0],
            (0, 1) => 2.0 * x[1],
            (1, 0) => 1.0,
            _ => -1.0,
        })))
    });
    let matrix_free = FnProblem::new(2, residual);
    let opts = NewtonOptions::new()
        .abs_resid_tol(Some(1e-10))
        .rel_resid_tol(None)
        .scale_type(ScaleType::Unscaled)
        .max_iters(30);

    let mut exact = NewtonSolver::new(assembled, opts.clone()).unwrap();
    let mut fd = NewtonSolver::new(matrix_free, opts).unwrap();
    exact.solve(&[1.0, 2.0]).unwrap();
    let fd_stats = fd.solve(&[1.0, 2.0]).unwrap();
    assert!(fd_stats.linear_iterations > 0);
    for i in 0..2 {
        assert_abs_diff_eq!(exact.solution()[i], 2f64.sqrt(), epsilon = 1e-9);
        assert_abs_diff_eq!(fd.solution()[i], exact.solution()[i], epsilon = 1e-8);
    }
}

#[test]
fn direct_backend_solves_bratu_and_is_repeatable() {
    let n = 20;
    let opts = NewtonOptions::new()
        .linear_method(SolverKind::Lu)
        .abs_resid_tol(Some(1e-9))
        .rel_resid_tol(None)
        .max_iters(20);
    let mut solver = NewtonSolver::new(bratu(n, 1.0), opts).unwrap();
    let first = solver.solve(&vec![0.0; n]).unwrap();
    let x_first = solver.solution().to_vec();
    let second = solver.solve(&vec![0.0; n]).unwrap();
    assert_eq!(first.outer_iterations, second.outer_iterations);
    assert_eq!(first.linear_iterations, first.outer_iterations);
    for (a, b) in x_first.iter().zip(solver.solution()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-14);
    }
    // lower branch of Bratu is positive and symmetric
    assert!(x_first.iter().all(|&u| u > 0.0));
    assert_abs_diff_eq!(x_first[0], x_first[n - 1], epsilon = 1e-10);
    assert!(residual_norm(solver.problem(), solver.solution()) <= 1e-9 * (n as f64).sqrt());
}

#[test]
fn gmres_with_ilu_matches_direct_backend() {
    let n = 30;
    let base = NewtonOptions::new().abs_resid_tol(Some(1e-10)).rel_resid_tol(None).max_iters(20);
    let mut direct = NewtonSolver::new(bratu(n, 2.0), base.clone().linear_method(SolverKind::Lu)).unwrap();
    let mut krylov = NewtonSolver::new(
        bratu(n, 2.0),
        base.linear_method(SolverKind::Gmres).preconditioner(PC::Ilu0).ls_tolerance(1e-12),
    )
    .unwrap();
    direct.solve(&vec![0.0; n]).unwrap();
    let stats = krylov.solve(&vec![0.0; n]).unwrap();
    assert!(stats.preconditioner_builds >= 1);
    for (a, b) in direct.solution().iter().zip(krylov.solution()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-8);
    }
}

#[test]
fn direct_backend_needs_an_assembled_jacobian() {
    let problem = FnProblem::new(1, |x, r| {
        r[0] = x[0] * x[0] - 2.0;
        Ok(())
    });
    let mut solver = NewtonSolver::new(problem, NewtonOptions::new().linear_method(SolverKind::Lu)).unwrap();
    match solver.solve(&[1.0]) {
        Err(KError::SolveFailed { reason: FailureReason::Configuration(msg), stats }) => {
            assert!(msg.contains("LU"));
            assert_eq!(stats.outer_iterations, 0);
            assert!(stats.initial_residual_norm > 0.0);
        }
        other => panic!("expected configuration failure, got {other:?}"),
    }
    assert_eq!(solver.state(), NewtonState::Failed);
    assert_eq!(solver.solution(), &[1.0]);
}

#[test]
fn all_criteria_disabled_is_rejected() {
    let opts = NewtonOptions::new().abs_resid_tol(None).rel_resid_tol(None);
    assert!(matches!(NewtonSolver::new(sqrt2(), opts), Err(KError::InvalidConfig(_))));
}

/// u' = −k u integrated by one backward-Euler step per solve.
struct Decay {
    k: f64,
    u_old: f64,
    dt: f64,
    time: f64,
}

impl ResidualProvider for Decay {
    fn ndofs(&self) -> usize {
        1
    }

    fn residual(&self, x: &[f64], r: &mut [f64]) -> Result<(), KError> {
        r[0] = (x[0] - self.u_old) / self.dt + self.k * x[0] * x[0];
        Ok(())
    }

    fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    fn set_time_step(&mut self, dt: f64) {
        self.dt = dt;
    }
}

#[test]
fn time_dependent_problem_sees_new_step() {
    let opts = NewtonOptions::new()
        .abs_resid_tol(Some(1e-10))
        .rel_resid_tol(None)
        .max_iters(30);
    let mut solver = NewtonSolver::new(Decay { k: 1.0, u_old: 1.0, dt: 1.0, time: 0.0 }, opts).unwrap();
    solver.set_time(0.5);
    solver.set_time_step(0.5);
    solver.solve(&[1.0]).unwrap();
    assert_eq!(solver.problem().time, 0.5);
    // (u - 1)/0.5 + u² = 0  →  u² + 2u − 2 = 0
    assert_abs_diff_eq!(solver.solution()[0], -1.0 + 3f64.sqrt(), epsilon = 1e-8);
}
