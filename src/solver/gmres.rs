//! Generalized Minimal Residual (GMRES) solver with fixed restart (Saad §6.4, §9.3.2)
//!
//! Restarted GMRES for large, sparse, possibly nonsymmetric systems Ax = b. The
//! preconditioner, when present, is applied on the right: Arnoldi runs on A M⁻¹
//! and the solution is updated through the stored vectors z_j = M⁻¹ v_j, so the
//! least-squares residual is the residual of the unpreconditioned system.
//!
//! # Features
//! - Double (iterative) modified Gram-Schmidt orthogonalization
//! - Happy breakdown detection for early termination
//! - Givens rotations for least-squares update
//! - Robust back-substitution with zero-pivot protection
//!
//! # References
//! - Saad, Y. (2003). Iterative Methods for Sparse Linear Systems, 2nd Edition. SIAM. §6.4
//! - https://en.wikipedia.org/wiki/Generalized_minimal_residual_method

use crate::core::traits::{InnerProduct, MatVec};
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use crate::solver::{LinearSolver, apply_pc, axpy, residual};
use crate::utils::convergence::{Convergence, SolveStats};
use num_traits::Float;

/// GMRES solver struct with restart length.
///
/// # Type Parameters
/// * `T` - Scalar type (e.g., f32, f64)
pub struct GmresSolver<T> {
    /// Number of Arnoldi vectors before restart
    pub restart: usize,
    /// Convergence criteria (tolerance and max iterations)
    pub conv: Convergence<T>,
}

impl<T: Copy + Float> GmresSolver<T> {
    /// Create a new GMRES solver with restart, tolerance, and max iterations.
    pub fn new(restart: usize, tol: T, max_iters: usize) -> Self {
        Self { restart: restart.max(1), conv: Convergence { tol, max_iters } }
    }

    /// Apply previous Givens rotations to column `j`, build the new rotation and update g.
    fn apply_givens_and_update_g(h: &mut [Vec<T>], g: &mut [T], cs: &mut [T], sn: &mut [T], j: usize, epsilon: T) {
        for i in 0..j {
            let temp = cs[i] * h[i][j] + sn[i] * h[i + 1][j];
            h[i + 1][j] = -sn[i] * h[i][j] + cs[i] * h[i + 1][j];
            h[i][j] = temp;
        }
        let h_kk = h[j][j];
        let h_k1k = h[j + 1][j];
        let r = (h_kk * h_kk + h_k1k * h_k1k).sqrt();
        if r.abs() < epsilon {
            cs[j] = T::one();
            sn[j] = T::zero();
        } else {
            cs[j] = h_kk / r;
            sn[j] = h_k1k / r;
        }
        h[j][j] = cs[j] * h_kk + sn[j] * h_k1k;
        h[j + 1][j] = T::zero();
        let temp = cs[j] * g[j] + sn[j] * g[j + 1];
        g[j + 1] = -sn[j] * g[j] + cs[j] * g[j + 1];
        g[j] = temp;
    }

    /// Solve upper-triangular system Hy = g for y, with zero-pivot protection.
    fn back_substitution(h: &[Vec<T>], g: &[T], y: &mut [T], m: usize, epsilon: T) {
        for i in (0..m).rev() {
            y[i] = g[i];
            for j in (i + 1)..m {
                y[i] = y[i] - h[i][j] * y[j];
            }
            if h[i][i].abs() > epsilon {
                y[i] = y[i] / h[i][i];
            } else {
                y[i] = T::zero();
            }
        }
    }
}

impl<M, V, T> LinearSolver<M, V> for GmresSolver<T>
where
    M: MatVec<V>,
    (): InnerProduct<V, Scalar = T>,
    V: AsMut<[T]> + AsRef<[T]> + From<Vec<T>> + Clone,
    T: Float + From<f64>,
{
    type Error = KError;
    type Scalar = T;

    /// Solve the linear system Ax = b using restarted, right-preconditioned GMRES.
    ///
    /// The iteration count is the total number of Arnoldi steps over all restart cycles.
    fn solve(&mut self, a: &M, pc: Option<&dyn Preconditioner<V>>, b: &V, x: &mut V) -> Result<SolveStats<T>, KError> {
        let n = b.as_ref().len();
        let ip = ();
        let epsilon = <T as From<f64>>::from(1e-14);
        let mut r0 = residual::<M, V, T>(a, b, x);
        let res0 = ip.norm(&r0);
        let mut beta = res0;
        let mut stats = SolveStats { iterations: 0, final_residual: beta, converged: beta == T::zero() };
        if stats.converged || self.conv.max_iters == 0 {
            return Ok(stats);
        }

        let m_max = self.restart;
        let mut iteration = 0;
        while iteration < self.conv.max_iters {
            let mut v_basis: Vec<V> = Vec::with_capacity(m_max + 1);
            let mut z_basis: Vec<V> = Vec::with_capacity(m_max);
            v_basis.push(V::from(r0.as_ref().iter().map(|&ri| ri / beta).collect::<Vec<_>>()));

            let mut h = vec![vec![T::zero(); m_max]; m_max + 1];
            let mut g = vec![T::zero(); m_max + 1];
            g[0] = beta;
            let mut cs = vec![T::zero(); m_max];
            let mut sn = vec![T::zero(); m_max];
            let mut m = 0;

            for j in 0..m_max {
                iteration += 1;
                let mut zj = V::from(vec![T::zero(); n]);
                apply_pc::<V, T>(pc, &v_basis[j], &mut zj)?;
                let mut w = V::from(vec![T::zero(); n]);
                a.matvec(&zj, &mut w);
                z_basis.push(zj);
                let w_norm = ip.norm(&w);
                // Modified Gram-Schmidt, then one refinement sweep
                for i in 0..=j {
                    h[i][j] = ip.dot(&w, &v_basis[i]);
                    axpy(-h[i][j], v_basis[i].as_ref(), w.as_mut());
                }
                for i in 0..=j {
                    let tmp = ip.dot(&w, &v_basis[i]);
                    h[i][j] = h[i][j] + tmp;
                    axpy(-tmp, v_basis[i].as_ref(), w.as_mut());
                }
                h[j + 1][j] = ip.norm(&w);
                let happy_breakdown = h[j + 1][j] <= epsilon * w_norm || h[j + 1][j] == T::zero();
                if !happy_breakdown {
                    let inv = T::one() / h[j + 1][j];
                    v_basis.push(V::from(w.as_ref().iter().map(|&wi| wi * inv).collect::<Vec<_>>()));
                }
                Self::apply_givens_and_update_g(&mut h, &mut g, &mut cs, &mut sn, j, epsilon);
                m = j + 1;
                let (stop, s) = self.conv.check(g[j + 1].abs(), res0, iteration);
                stats = s;
                if stop || happy_breakdown {
                    break;
                }
            }

            let mut y = vec![T::zero(); m];
            Self::back_substitution(&h, &g, &mut y, m, epsilon);
            for (yj, zj) in y.iter().zip(&z_basis) {
                axpy(*yj, zj.as_ref(), x.as_mut());
            }

            // Restart from the true residual
            r0 = residual::<M, V, T>(a, b, x);
            beta = ip.norm(&r0);
            stats.iterations = iteration;
            stats.final_residual = beta;
            stats.converged = beta <= self.conv.tol * res0;
            if stats.converged || !beta.is_finite() || beta == T::zero() {
                break;
            }
        }
        Ok(stats)
    }
}
