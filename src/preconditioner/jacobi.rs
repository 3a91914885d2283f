// Jacobi preconditioner implementation

use crate::config::options::PcParams;
use crate::error::KError;
use crate::matrix::SystemMatrix;
use crate::preconditioner::Preconditioner;

/// Jacobi preconditioner: M⁻¹ = ω D⁻¹
///
/// Zero diagonal entries are left unscaled. Reads `omega` from the parameters
/// (default 1).
pub struct Jacobi {
    pub(crate) inv_diag: Vec<f64>,
    pub(crate) omega: f64,
}

impl Jacobi {
    /// new with empty state; user must call `setup`.
    pub fn new() -> Self {
        Self { inv_diag: Vec::new(), omega: 1.0 }
    }
}

impl Default for Jacobi {
    fn default() -> Self {
        Self::new()
    }
}

impl Preconditioner<Vec<f64>> for Jacobi {
    fn setup(&mut self, a: &SystemMatrix, params: &PcParams) -> Result<(), KError> {
        self.omega = params.get("omega").unwrap_or(1.0);
        self.inv_diag = a
            .diagonal()
            .into_iter()
            .map(|d| if d != 0.0 { 1.0 / d } else { 1.0 })
            .collect();
        Ok(())
    }

    fn apply(&self, x: &Vec<f64>, y: &mut Vec<f64>) -> Result<(), KError> {
        if x.len() != self.inv_diag.len() || y.len() != x.len() {
            return Err(KError::SolveError(format!(
                "Jacobi set up for {} rows, applied to {}",
                self.inv_diag.len(),
                x.len()
            )));
        }
        for ((yi, xi), di) in y.iter_mut().zip(x).zip(&self.inv_diag) {
            *yi = self.omega * di * xi;
        }
        Ok(())
    }
}
