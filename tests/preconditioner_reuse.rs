//! Preconditioner lifetime across Newton solves under each reuse policy.
//!
//! Every solve below is on a linear problem, so one Newton step (and one
//! linear solve) is enough; the handle left in the solver after each solve
//! tells which build was used.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use faer::Mat;
use kryst_newton::config::{NewtonOptions, PcParams};
use kryst_newton::error::KError;
use kryst_newton::matrix::SystemMatrix;
use kryst_newton::nonlinear::{FnProblem, NewtonSolver, ResidualProvider, ReusePolicy};
use kryst_newton::preconditioner::{Jacobi, PC, PcHandle, Preconditioner};

fn tridiagonal(n: usize) -> Mat<f64> {
    Mat::from_fn(n, n, |i, j| match (i as i64 - j as i64).abs() {
        0 => 4.0 + i as f64 * 0.1,
        1 => -1.0,
        _ => 0.0,
    })
}

/// F(x) = A x − 1
fn linear_problem(n: usize) -> FnProblem {
    let a = tridiagonal(n);
    let a_jac = a.clone();
    FnProblem::new(n, move |x, r| {
        for i in 0..n {
            r[i] = (0..n).map(|j| a[(i, j)] * x[j]).sum::<f64>() - 1.0;
        }
        Ok(())
    })
    .with_jacobian(move |_| Ok(SystemMatrix::from(a_jac.clone())))
}

fn options(policy: ReusePolicy) -> NewtonOptions {
    NewtonOptions::new()
        .preconditioner(PC::Jacobi)
        .precond_reuse_policy(policy)
        .precond_max_age(3)
        .abs_resid_tol(Some(1e-6))
        .rel_resid_tol(None)
}

/// Run `count` solves and collect the preconditioner handle after each.
fn handles_after_solves(solver: &mut NewtonSolver<FnProblem>, count: usize) -> Vec<PcHandle> {
    let n = solver.problem().ndofs();
    (0..count)
        .map(|_| {
            let stats = solver.solve(&vec![0.0; n]).unwrap();
            assert_eq!(stats.outer_iterations, 1);
            solver.preconditioner().unwrap()
        })
        .collect()
}

#[test]
fn reuse_keeps_preconditioner_until_max_age() {
    let mut solver = NewtonSolver::new(linear_problem(10), options(ReusePolicy::Reuse)).unwrap();
    let h = handles_after_solves(&mut solver, 4);
    assert!(h[0].ptr_eq(&h[1]));
    assert!(h[1].ptr_eq(&h[2]));
    assert!(!h[2].ptr_eq(&h[3]), "fourth solve should see a rebuilt preconditioner");
    assert_eq!(solver.stats().preconditioner_builds, 1);
}

#[test]
fn recompute_keeps_object_and_refreshes_values() {
    let mut solver = NewtonSolver::new(linear_problem(10), options(ReusePolicy::Recompute)).unwrap();
    let first = solver.solve(&vec![0.0; 10]).unwrap();
    assert_eq!(first.preconditioner_builds, 1);
    assert_eq!(first.preconditioner_recomputes, 0);
    let h0 = solver.preconditioner().unwrap();
    let h = handles_after_solves(&mut solver, 2);
    assert!(h.iter().all(|hi| hi.ptr_eq(&h0)));
    assert_eq!(solver.stats().preconditioner_builds, 0);
    assert_eq!(solver.stats().preconditioner_recomputes, 1);
}

#[test]
fn rebuild_creates_a_new_object_every_solve() {
    let mut solver = NewtonSolver::new(linear_problem(10), options(ReusePolicy::Rebuild)).unwrap();
    let h = handles_after_solves(&mut solver, 3);
    assert!(!h[0].ptr_eq(&h[1]));
    assert!(!h[1].ptr_eq(&h[2]));
    assert_eq!(solver.stats().preconditioner_builds, 1);
}

#[test]
fn caller_preconditioner_is_set_up_in_place() {
    let opts = options(ReusePolicy::Rebuild).preconditioner(PC::None);
    let mut solver = NewtonSolver::new(linear_problem(8), opts).unwrap();
    let mine = PcHandle::new(Jacobi::new());
    solver.set_preconditioner(mine.clone());
    let h = handles_after_solves(&mut solver, 2);
    assert!(h.iter().all(|hi| hi.ptr_eq(&mine)));
    assert_eq!(solver.stats().preconditioner_builds, 1);

    // the installed preconditioner holds the Jacobian diagonal
    let diag = tridiagonal(8);
    let r: Vec<f64> = (0..8).map(|i| diag[(i, i)]).collect();
    let mut z = vec![0.0; 8];
    mine.apply(&r, &mut z).unwrap();
    for zi in z {
        approx::assert_abs_diff_eq!(zi, 1.0, epsilon = 1e-14);
    }
}

/// Jacobi that counts how often the linear solve applies it.
struct CountingJacobi {
    inner: Jacobi,
    applies: Arc<AtomicUsize>,
}

impl Preconditioner<Vec<f64>> for CountingJacobi {
    fn apply(&self, r: &Vec<f64>, z: &mut Vec<f64>) -> Result<(), KError> {
        self.applies.fetch_add(1, Ordering::Relaxed);
        self.inner.apply(r, z)
    }

    fn setup(&mut self, a: &SystemMatrix, params: &PcParams) -> Result<(), KError> {
        self.inner.setup(a, params)
    }
}

#[test]
fn installed_preconditioner_replaces_builtin_kind() {
    let mut solver = NewtonSolver::new(linear_problem(6), options(ReusePolicy::Reuse)).unwrap();
    solver.solve(&vec![0.0; 6]).unwrap();
    let builtin = solver.preconditioner().unwrap();

    let applies = Arc::new(AtomicUsize::new(0));
    let mine = PcHandle::new(CountingJacobi { inner: Jacobi::new(), applies: applies.clone() });
    solver.set_preconditioner(mine.clone());

    let first = solver.solve(&vec![0.0; 6]).unwrap();
    // installing forces one setup, done in place on the caller's object
    assert_eq!(first.preconditioner_builds, 1);
    assert!(solver.preconditioner().unwrap().ptr_eq(&mine));
    let after_first = applies.load(Ordering::Relaxed);
    assert!(after_first > 0, "installed preconditioner was never applied");

    let second = solver.solve(&vec![0.0; 6]).unwrap();
    assert_eq!(second.preconditioner_builds, 0);
    assert!(solver.preconditioner().unwrap().ptr_eq(&mine));
    assert!(!solver.preconditioner().unwrap().ptr_eq(&builtin));
    assert!(applies.load(Ordering::Relaxed) > after_first);
}

#[test]
fn installed_preconditioner_survives_max_age_rebuild() {
    let mut solver = NewtonSolver::new(linear_problem(6), options(ReusePolicy::Reuse)).unwrap();
    let applies = Arc::new(AtomicUsize::new(0));
    let mine = PcHandle::new(CountingJacobi { inner: Jacobi::new(), applies: applies.clone() });
    solver.set_preconditioner(mine.clone());
    // max_age 3: the fourth solve asks for a rebuild
    let h = handles_after_solves(&mut solver, 4);
    assert!(h.iter().all(|hi| hi.ptr_eq(&mine)));
    assert_eq!(solver.stats().preconditioner_builds, 1);
    assert!(applies.load(Ordering::Relaxed) >= 4);
}

#[test]
fn recompute_ignores_max_age() {
    let opts = options(ReusePolicy::Recompute).preconditioner(PC::Ilu0).precond_max_age(1);
    let mut solver = NewtonSolver::new(linear_problem(10), opts).unwrap();
    let h = handles_after_solves(&mut solver, 3);
    assert!(h[0].ptr_eq(&h[1]));
    assert!(h[1].ptr_eq(&h[2]));
    assert_eq!(solver.stats().preconditioner_builds, 0);
    assert_eq!(solver.stats().preconditioner_recomputes, 1);
}
