//! `OutputFlags` decide which diagnostics reach the `log` facade.
//!
//! A capturing logger records messages per thread, so tests running in
//! parallel only see their own output.

use std::sync::{Mutex, Once};
use std::thread::{self, ThreadId};

use faer::Mat;
use kryst_newton::config::{NewtonOptions, OutputFlags};
use kryst_newton::matrix::SystemMatrix;
use kryst_newton::nonlinear::{FnProblem, NewtonSolver};

struct CaptureLogger {
    records: Mutex<Vec<(ThreadId, String)>>,
}

impl log::Log for CaptureLogger {
    fn enabled(&self, _: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        if let Ok(mut records) = self.records.lock() {
            records.push((thread::current().id(), record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger { records: Mutex::new(Vec::new()) };
static INIT: Once = Once::new();

/// Messages logged by the current thread while running `f`.
fn captured<F: FnOnce()>(f: F) -> Vec<String> {
    INIT.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(log::LevelFilter::Trace);
    });
    let me = thread::current().id();
    LOGGER.records.lock().unwrap().retain(|(id, _)| *id != me);
    f();
    LOGGER
        .records
        .lock()
        .unwrap()
        .iter()
        .filter(|(id, _)| *id == me)
        .map(|(_, msg)| msg.clone())
        .collect()
}

fn sqrt2(with_jacobian: bool) -> FnProblem {
    let p = FnProblem::new(1, |x, r| {
        r[0] = x[0] * x[0] - 2.0;
        Ok(())
    });
    if with_jacobian {
        p.with_jacobian(|x| Ok(SystemMatrix::from(Mat::from_fn(1, 1, |_, _| 2.0 * x[0]))))
    } else {
        p
    }
}

fn solve_with(flags: OutputFlags, with_jacobian: bool) -> Vec<String> {
    let opts = NewtonOptions::new().abs_resid_tol(Some(1e-10)).max_iters(20).verbosity(flags);
    let mut solver = NewtonSolver::new(sqrt2(with_jacobian), opts).unwrap();
    captured(|| {
        solver.solve(&[1.0]).unwrap();
    })
}

#[test]
fn default_flags_are_quiet_on_success() {
    assert!(solve_with(OutputFlags::default(), true).is_empty());
}

#[test]
fn test_details_report_each_criterion() {
    let lines = solve_with(OutputFlags::TEST_DETAILS, true);
    assert!(lines.iter().any(|l| l.contains("abs_resid") && l.contains("fail")));
    assert!(lines.iter().any(|l| l.contains("rel_resid")));
    assert!(lines.iter().any(|l| l.contains("abs_resid") && l.contains("pass")));
    assert!(!lines.iter().any(|l| l.contains("Jacobian")));
}

#[test]
fn debug_traces_steps_and_jacobian_kind() {
    let assembled = solve_with(OutputFlags::DEBUG, true);
    assert!(assembled.iter().any(|l| l.contains("assembled Jacobian")));
    assert!(assembled.iter().any(|l| l.contains("‖Δx‖")));
    assert!(!assembled.iter().any(|l| l.contains("abs_resid")));

    let matrix_free = solve_with(OutputFlags::DEBUG, false);
    assert!(matrix_free.iter().any(|l| l.contains("matrix-free Jacobian")));
}
