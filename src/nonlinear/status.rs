//! Outer-loop status tests.
//!
//! A [`ConvergenceEvaluator`] combines the enabled criteria of a
//! [`ConvergenceCriteria`] set into one [`ConvergenceStatus`] per Newton
//! iteration. Enabled criteria are AND-ed: the solve converges only when every
//! one of them passes on the same iteration.

use std::str::FromStr;

use crate::error::KError;

/// Vector norm used for residual and update tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormType {
    /// ‖x‖ = Σ |xᵢ|
    One,
    /// ‖x‖ = sqrt(Σ xᵢ²)
    #[default]
    Two,
    /// ‖x‖ = max |xᵢ|
    Max,
}

impl NormType {
    pub fn norm(self, x: &[f64]) -> f64 {
        match self {
            NormType::One => x.iter().map(|v| v.abs()).sum(),
            NormType::Two => x.iter().map(|v| v * v).sum::<f64>().sqrt(),
            NormType::Max => x.iter().fold(0.0, |m: f64, v| m.max(v.abs())),
        }
    }
}

/// Whether norms are divided by the problem size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleType {
    /// One-norm / n, two-norm / sqrt(n); the max-norm is left alone.
    #[default]
    Scaled,
    Unscaled,
}

impl ScaleType {
    pub fn apply(self, norm: f64, norm_type: NormType, n: usize) -> f64 {
        if self == ScaleType::Unscaled || n == 0 {
            return norm;
        }
        match norm_type {
            NormType::One => norm / n as f64,
            NormType::Two => norm / (n as f64).sqrt(),
            NormType::Max => norm,
        }
    }
}

impl FromStr for NormType {
    type Err = KError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "one" | "onenorm" => Ok(NormType::One),
            "two" | "twonorm" => Ok(NormType::Two),
            "max" | "maxnorm" => Ok(NormType::Max),
            _ => Err(KError::InvalidConfig(format!("unknown norm type '{s}'"))),
        }
    }
}

impl FromStr for ScaleType {
    type Err = KError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scaled" => Ok(ScaleType::Scaled),
            "unscaled" => Ok(ScaleType::Unscaled),
            _ => Err(KError::InvalidConfig(format!("unknown scale type '{s}'"))),
        }
    }
}

/// Weighted root-mean-square update test: passes when
/// `sqrt(mean((Δxᵢ / (atol + rtol·|xᵢ|))²)) ≤ 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wrms {
    pub rtol: f64,
    pub atol: f64,
}

impl Wrms {
    pub fn norm(&self, dx: &[f64], x: &[f64]) -> f64 {
        if dx.is_empty() {
            return 0.0;
        }
        let sum: f64 = dx
            .iter()
            .zip(x)
            .map(|(d, xi)| {
                let w = d / (self.atol + self.rtol * xi.abs());
                w * w
            })
            .sum();
        (sum / dx.len() as f64).sqrt()
    }
}

/// Stopping tests of the outer Newton loop. `None` disables a test.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceCriteria {
    pub max_iters: usize,
    pub norm_type: NormType,
    pub scale_type: ScaleType,
    /// ‖r‖ ≤ abs_resid
    pub abs_resid: Option<f64>,
    /// ‖r‖ ≤ rel_resid·‖r₀‖
    pub rel_resid: Option<f64>,
    /// ‖Δx‖ ≤ update
    pub update: Option<f64>,
    pub wrms: Option<Wrms>,
    /// Report divergence once ‖r‖ exceeds this bound. Non-finite norms always diverge.
    pub divergence_threshold: Option<f64>,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            max_iters: 10,
            norm_type: NormType::Two,
            scale_type: ScaleType::Scaled,
            abs_resid: Some(1e-6),
            rel_resid: Some(1e-2),
            update: None,
            wrms: None,
            divergence_threshold: None,
        }
    }
}

impl ConvergenceCriteria {
    pub fn disable_abs_resid(&mut self) {
        self.abs_resid = None;
    }

    pub fn disable_rel_resid(&mut self) {
        self.rel_resid = None;
    }

    pub fn disable_update(&mut self) {
        self.update = None;
    }

    pub fn disable_wrms(&mut self) {
        self.wrms = None;
    }

    pub fn enabled_count(&self) -> usize {
        [self.abs_resid.is_some(), self.rel_resid.is_some(), self.update.is_some(), self.wrms.is_some()]
            .iter()
            .filter(|&&on| on)
            .count()
    }

    /// Rejects a set with no enabled test; such a loop could only stop on `max_iters`.
    pub fn validate(&self) -> Result<(), KError> {
        if self.enabled_count() == 0 {
            return Err(KError::InvalidConfig(
                "at least one convergence test (abs, rel, update, wrms) must be enabled".into(),
            ));
        }
        let tolerances = [
            ("abs_resid", self.abs_resid),
            ("rel_resid", self.rel_resid),
            ("update", self.update),
            ("divergence_threshold", self.divergence_threshold),
        ];
        for (name, tol) in tolerances {
            if let Some(t) = tol {
                if !t.is_finite() || t < 0.0 {
                    return Err(KError::InvalidConfig(format!("{name} must be finite and non-negative, got {t}")));
                }
            }
        }
        if let Some(w) = self.wrms {
            if !(w.rtol >= 0.0 && w.atol >= 0.0 && w.rtol + w.atol > 0.0) || !(w.rtol + w.atol).is_finite() {
                return Err(KError::InvalidConfig(format!(
                    "wrms tolerances must be non-negative with a positive sum, got rtol={} atol={}",
                    w.rtol, w.atol
                )));
            }
        }
        Ok(())
    }
}

/// Verdict of one status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    Continue,
    Converged,
    MaxIterationsExceeded,
    Diverged,
}

/// Pass/fail of each test on the last check; `None` for disabled tests.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CriteriaReport {
    pub abs_resid: Option<bool>,
    pub rel_resid: Option<bool>,
    pub update: Option<bool>,
    pub wrms: Option<bool>,
}

impl CriteriaReport {
    pub fn all_enabled_pass(&self) -> bool {
        [self.abs_resid, self.rel_resid, self.update, self.wrms]
            .iter()
            .flatten()
            .all(|&pass| pass)
    }
}

pub struct ConvergenceEvaluator {
    criteria: ConvergenceCriteria,
    initial_norm: Option<f64>,
    last_norm: f64,
    last_report: CriteriaReport,
    last_update_norm: Option<f64>,
    last_wrms: Option<f64>,
}

impl ConvergenceEvaluator {
    pub fn new(criteria: ConvergenceCriteria) -> Result<Self, KError> {
        criteria.validate()?;
        Ok(Self {
            criteria,
            initial_norm: None,
            last_norm: f64::NAN,
            last_report: CriteriaReport::default(),
            last_update_norm: None,
            last_wrms: None,
        })
    }

    pub fn criteria(&self) -> &ConvergenceCriteria {
        &self.criteria
    }

    /// Forget ‖r₀‖ so the next check starts a new solve.
    pub fn reset(&mut self) {
        self.initial_norm = None;
        self.last_norm = f64::NAN;
        self.last_report = CriteriaReport::default();
        self.last_update_norm = None;
        self.last_wrms = None;
    }

    /// Norm of `v` with the configured norm and scaling.
    pub fn norm(&self, v: &[f64]) -> f64 {
        let c = &self.criteria;
        c.scale_type.apply(c.norm_type.norm(v), c.norm_type, v.len())
    }

    pub fn initial_norm(&self) -> Option<f64> {
        self.initial_norm
    }

    pub fn last_norm(&self) -> f64 {
        self.last_norm
    }

    pub fn last_report(&self) -> CriteriaReport {
        self.last_report
    }

    /// One line per enabled test of the last check: measured value, threshold, verdict.
    pub fn test_details(&self) -> Vec<String> {
        let c = &self.criteria;
        let r0 = self.initial_norm.unwrap_or(f64::NAN);
        let verdict = |pass: Option<bool>| if pass == Some(true) { "pass" } else { "fail" };
        let mut lines = Vec::new();
        if let Some(tol) = c.abs_resid {
            lines.push(format!(
                "abs_resid: ‖F‖ = {:.6e} <= {tol:.1e}: {}",
                self.last_norm,
                verdict(self.last_report.abs_resid)
            ));
        }
        if let Some(tol) = c.rel_resid {
            lines.push(format!(
                "rel_resid: ‖F‖/‖F₀‖ = {:.6e} <= {tol:.1e}: {}",
                self.last_norm / r0,
                verdict(self.last_report.rel_resid)
            ));
        }
        if let Some(tol) = c.update {
            let shown = self.last_update_norm.map_or("n/a".to_string(), |n| format!("{n:.6e}"));
            lines.push(format!("update: ‖Δx‖ = {shown} <= {tol:.1e}: {}", verdict(self.last_report.update)));
        }
        if c.wrms.is_some() {
            let shown = self.last_wrms.map_or("n/a".to_string(), |n| format!("{n:.6e}"));
            lines.push(format!("wrms: {shown} <= 1: {}", verdict(self.last_report.wrms)));
        }
        lines
    }

    /// Evaluate all tests for the state reached after `iteration` Newton updates.
    ///
    /// `x` is the current trial solution and `update` the step that produced it
    /// (`None` before the first step; update-based tests fail then). The first
    /// call after construction or [`reset`](Self::reset) records ‖r₀‖.
    pub fn check(&mut self, iteration: usize, residual: &[f64], x: &[f64], update: Option<&[f64]>) -> ConvergenceStatus {
        let norm = self.norm(residual);
        self.last_norm = norm;
        if !norm.is_finite() {
            self.last_report = CriteriaReport::default();
            return ConvergenceStatus::Diverged;
        }
        let r0 = *self.initial_norm.get_or_insert(norm);
        self.last_update_norm = update.map(|dx| self.norm(dx));
        self.last_wrms = match (self.criteria.wrms, update) {
            (Some(w), Some(dx)) => Some(w.norm(dx, x)),
            _ => None,
        };
        let c = &self.criteria;
        let report = CriteriaReport {
            abs_resid: c.abs_resid.map(|tol| norm <= tol),
            rel_resid: c.rel_resid.map(|tol| norm <= tol * r0),
            update: c.update.map(|tol| self.last_update_norm.is_some_and(|n| n <= tol)),
            wrms: c.wrms.map(|_| self.last_wrms.is_some_and(|n| n <= 1.0)),
        };
        self.last_report = report;
        if report.all_enabled_pass() {
            ConvergenceStatus::Converged
        } else if iteration >= c.max_iters {
            ConvergenceStatus::MaxIterationsExceeded
        } else if c.divergence_threshold.is_some_and(|bound| norm > bound) {
            ConvergenceStatus::Diverged
        } else {
            ConvergenceStatus::Continue
        }
    }
}
