//! ILU(0) factorization with zero fill (Saad §10.3).
//!
//! The factorization works on the CSR pattern of the input matrix. The symbolic part
//! (diagonal positions) is cached and reused by later `setup` calls as long as the
//! sparsity pattern does not change, which is what a `Recompute` reuse policy relies on.

use crate::config::options::PcParams;
use crate::error::KError;
use crate::matrix::{CsrMatrix, SystemMatrix};
use crate::preconditioner::Preconditioner;

struct IluPattern {
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    diag: Vec<usize>,
}

impl IluPattern {
    fn analyse(a: &CsrMatrix<f64>) -> Result<Self, KError> {
        let n = a.row_ptr().len() - 1;
        let mut diag = Vec::with_capacity(n);
        for i in 0..n {
            diag.push(a.find(i, i).ok_or(KError::ZeroPivot(i))?);
        }
        Ok(Self { row_ptr: a.row_ptr().to_vec(), col_idx: a.col_idx().to_vec(), diag })
    }

    fn matches(&self, a: &CsrMatrix<f64>) -> bool {
        self.row_ptr == a.row_ptr() && self.col_idx == a.col_idx()
    }
}

/// Incomplete LU with the sparsity of A. Reads `drop_tol` from the parameters:
/// off-diagonal entries smaller in magnitude are treated as zero before factoring.
pub struct Ilu0 {
    pattern: Option<IluPattern>,
    values: Vec<f64>,
    symbolic_builds: usize,
}

impl Ilu0 {
    pub fn new() -> Self {
        Self { pattern: None, values: Vec::new(), symbolic_builds: 0 }
    }

    /// Number of times the symbolic pattern was (re)analysed.
    pub fn symbolic_builds(&self) -> usize {
        self.symbolic_builds
    }

    fn factor(&mut self, p: &IluPattern) -> Result<(), KError> {
        let n = p.diag.len();
        let vals = &mut self.values;
        for i in 0..n {
            let end_i = p.row_ptr[i + 1];
            for kk in p.row_ptr[i]..p.diag[i] {
                let k = p.col_idx[kk];
                let pivot = vals[p.diag[k]];
                if pivot == 0.0 {
                    return Err(KError::ZeroPivot(k));
                }
                vals[kk] /= pivot;
                let lik = vals[kk];
                // row i -= l_ik * (upper part of row k), restricted to the pattern of row i
                let end_k = p.row_ptr[k + 1];
                let mut q = p.diag[k] + 1;
                for jj in (kk + 1)..end_i {
                    let j = p.col_idx[jj];
                    while q < end_k && p.col_idx[q] < j {
                        q += 1;
                    }
                    if q < end_k && p.col_idx[q] == j {
                        let ukj = vals[q];
                        vals[jj] -= lik * ukj;
                    }
                }
            }
            if vals[p.diag[i]] == 0.0 {
                return Err(KError::ZeroPivot(i));
            }
        }
        Ok(())
    }
}

impl Default for Ilu0 {
    fn default() -> Self {
        Self::new()
    }
}

impl Preconditioner<Vec<f64>> for Ilu0 {
    fn setup(&mut self, a: &SystemMatrix, params: &PcParams) -> Result<(), KError> {
        let csr = a.to_csr();
        let n = csr.row_ptr().len() - 1;
        if csr.col_idx().iter().any(|&j| j >= n) {
            return Err(KError::InvalidConfig("ILU(0) needs a square matrix".into()));
        }
        let pattern = match self.pattern.take() {
            Some(p) if p.matches(&csr) => p,
            _ => {
                self.symbolic_builds += 1;
                IluPattern::analyse(&csr)?
            }
        };
        let drop_tol = params.get("drop_tol").unwrap_or(0.0);
        self.values = csr.values().to_vec();
        for i in 0..n {
            for kk in pattern.row_ptr[i]..pattern.row_ptr[i + 1] {
                if pattern.col_idx[kk] != i && self.values[kk].abs() < drop_tol {
                    self.values[kk] = 0.0;
                }
            }
        }
        let result = self.factor(&pattern);
        self.pattern = Some(pattern);
        result
    }

    fn apply(&self, x: &Vec<f64>, y: &mut Vec<f64>) -> Result<(), KError> {
        let p = self
            .pattern
            .as_ref()
            .ok_or_else(|| KError::SolveError("ILU(0) applied before setup".into()))?;
        let n = p.diag.len();
        if x.len() != n || y.len() != n {
            return Err(KError::SolveError(format!("ILU(0) set up for {n} rows, applied to {}", x.len())));
        }
        // solve L y1 = x
        y.copy_from_slice(x);
        for i in 0..n {
            let mut acc = y[i];
            for kk in p.row_ptr[i]..p.diag[i] {
                acc -= self.values[kk] * y[p.col_idx[kk]];
            }
            y[i] = acc;
        }
        // solve U y = y1
        for i in (0..n).rev() {
            let mut acc = y[i];
            for kk in (p.diag[i] + 1)..p.row_ptr[i + 1] {
                acc -= self.values[kk] * y[p.col_idx[kk]];
            }
            y[i] = acc / self.values[p.diag[i]];
        }
        Ok(())
    }
}
