//! Conjugate Gradient Squared (CGS) Solver
//!
//! CGS squares the BiCG residual polynomial, which avoids products with Aᵀ and often
//! converges faster, at the price of erratic residual histories on ill-conditioned
//! problems. The preconditioner is applied on the right (Templates, Fig. 2.9).
//!
//! # References
//! - Saad, Y. (2003). Iterative Methods for Sparse Linear Systems, 2nd Edition. SIAM. §7.4.1
//! - https://en.wikipedia.org/wiki/Conjugate_gradient_squared_method

use crate::core::traits::{InnerProduct, MatVec};
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use crate::solver::{LinearSolver, apply_pc, axpy, residual};
use crate::utils::convergence::{Convergence, SolveStats};

/// CGS solver struct, holding convergence parameters.
///
/// # Type Parameters
/// * `T` - Scalar type (e.g., f32, f64)
pub struct CgsSolver<T> {
    /// Convergence criteria (tolerance and max iterations)
    pub conv: Convergence<T>,
}

impl<T: num_traits::Float> CgsSolver<T> {
    /// Create a new CGS solver with given tolerance and maximum iterations.
    ///
    /// # Arguments
    /// * `tol` - Relative residual tolerance for convergence
    /// * `max_iters` - Maximum number of iterations
    pub fn new(tol: T, max_iters: usize) -> Self {
        Self { conv: Convergence { tol, max_iters } }
    }
}

impl<M, V, T> LinearSolver<M, V> for CgsSolver<T>
where
    M: MatVec<V>,
    (): InnerProduct<V, Scalar = T>,
    V: AsMut<[T]> + AsRef<[T]> + From<Vec<T>> + Clone,
    T: num_traits::Float + From<f64>,
{
    type Error = KError;
    type Scalar = T;

    fn solve(&mut self, a: &M, pc: Option<&dyn Preconditioner<V>>, b: &V, x: &mut V) -> Result<SolveStats<T>, KError> {
        let n = b.as_ref().len();
        let ip = ();
        let mut r = residual::<M, V, T>(a, b, x);
        let r_tld = r.clone();
        let res0 = ip.norm(&r);
        let mut stats = SolveStats { iterations: 0, final_residual: res0, converged: res0 == T::zero() };
        if stats.converged {
            return Ok(stats);
        }
        let tiny = T::epsilon() * T::epsilon();
        let zeros = || V::from(vec![T::zero(); n]);
        let (mut u, mut p, mut q) = (zeros(), zeros(), zeros());
        let (mut p_hat, mut v_hat, mut u_hat, mut q_hat) = (zeros(), zeros(), zeros(), zeros());
        let mut rho_prev = T::one();

        for i in 1..=self.conv.max_iters {
            let rho = ip.dot(&r_tld, &r);
            if rho.abs() <= tiny * res0 * res0 {
                break; // breakdown
            }
            if i == 1 {
                u.as_mut().copy_from_slice(r.as_ref());
                p.as_mut().copy_from_slice(u.as_ref());
            } else {
                let beta = rho / rho_prev;
                for ((uj, &rj), &qj) in u.as_mut().iter_mut().zip(r.as_ref()).zip(q.as_ref()) {
                    *uj = rj + beta * qj;
                }
                for ((pj, &uj), &qj) in p.as_mut().iter_mut().zip(u.as_ref()).zip(q.as_ref()) {
                    *pj = uj + beta * (qj + beta * *pj);
                }
            }
            apply_pc::<V, T>(pc, &p, &mut p_hat)?;
            a.matvec(&p_hat, &mut v_hat);
            let sigma = ip.dot(&r_tld, &v_hat);
            if sigma == T::zero() {
                break;
            }
            let alpha = rho / sigma;
            // q = u - alpha v̂
            for ((qj, &uj), &vj) in q.as_mut().iter_mut().zip(u.as_ref()).zip(v_hat.as_ref()) {
                *qj = uj - alpha * vj;
            }
            // û = M⁻¹ (u + q)
            for (uj, &qj) in u.as_mut().iter_mut().zip(q.as_ref()) {
                *uj = *uj + qj;
            }
            apply_pc::<V, T>(pc, &u, &mut u_hat)?;
            axpy(alpha, u_hat.as_ref(), x.as_mut());
            a.matvec(&u_hat, &mut q_hat);
            axpy(-alpha, q_hat.as_ref(), r.as_mut());
            let (stop, s) = self.conv.check(ip.norm(&r), res0, i);
            stats = s;
            if stop {
                break;
            }
            rho_prev = rho;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Simple dense matrix for testing
    #[derive(Clone)]
    struct DenseMat {
        data: Vec<Vec<f64>>,
    }
    impl MatVec<Vec<f64>> for DenseMat {
        fn matvec(&self, x: &Vec<f64>, y: &mut Vec<f64>) {
            for (i, row) in self.data.iter().enumerate() {
                y[i] = row.iter().zip(x.iter()).map(|(a, b)| a * b).sum();
            }
        }
    }

    #[test]
    fn cgs_solves_nonsymmetric() {
        let a = DenseMat {
            data: vec![vec![4.0, 1.0, 0.0], vec![2.0, 5.0, 1.0], vec![0.0, -1.0, 3.0]],
        };
        let x_true = vec![1.0, 2.0, -1.0];
        let mut b = vec![0.0; 3];
        a.matvec(&x_true, &mut b);
        let mut x = vec![0.0; 3];
        let stats = CgsSolver::new(1e-12, 50).solve(&a, None, &b, &mut x).unwrap();
        assert!(stats.converged, "CGS did not converge");
        for (xi, ti) in x.iter().zip(&x_true) {
            assert!((xi - ti).abs() < 1e-8, "xi = {}, expected = {}", xi, ti);
        }
    }

    #[test]
    fn cgs_stops_at_iteration_cap() {
        let a = DenseMat {
            data: vec![vec![4.0, 1.0, 0.0], vec![2.0, 5.0, 1.0], vec![0.0, -1.0, 3.0]],
        };
        let mut x = vec![0.0; 3];
        let stats = CgsSolver::new(1e-14, 1).solve(&a, None, &vec![1.0, 0.0, 0.0], &mut x).unwrap();
        assert_eq!(stats.iterations, 1);
        assert!(!stats.converged);
    }
}
