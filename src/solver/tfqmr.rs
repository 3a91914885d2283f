//! TFQMR solver (Saad §7.4.3), right-preconditioned.
//!
//! Each iteration is one half-step of the underlying CGS recurrence. The quasi-residual
//! bound `τ √(m+1)` drives the stopping test, which is then confirmed against the
//! true residual `b - A x`.

use crate::core::traits::{InnerProduct, MatVec};
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use crate::solver::{LinearSolver, apply_pc, axpy, residual};
use crate::utils::convergence::{Convergence, SolveStats};

pub struct TfqmrSolver<T> {
    pub conv: Convergence<T>,
}

impl<T: num_traits::Float> TfqmrSolver<T> {
    pub fn new(tol: T, max_iters: usize) -> Self {
        Self { conv: Convergence { tol, max_iters } }
    }
}

impl<M, V, T> LinearSolver<M, V> for TfqmrSolver<T>
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
        let r = residual::<M, V, T>(a, b, x);
        let res0 = ip.norm(&r);
        let mut stats = SolveStats { iterations: 0, final_residual: res0, converged: res0 == T::zero() };
        if stats.converged {
            return Ok(stats);
        }
        let r_star = r.clone();
        let mut u = r.clone();
        let mut w = r.clone();
        let mut tmp = V::from(vec![T::zero(); n]);
        let mut v = V::from(vec![T::zero(); n]);
        apply_pc::<V, T>(pc, &r, &mut tmp)?;
        a.matvec(&tmp, &mut v);
        let mut u_hat = v.clone();
        let mut u_next = V::from(vec![T::zero(); n]);
        let mut d = V::from(vec![T::zero(); n]);
        let mut z = V::from(vec![T::zero(); n]);
        let (mut theta, mut eta, mut alpha) = (T::zero(), T::zero(), T::zero());
        let mut rho = ip.dot(&r_star, &r);
        let mut rho_last = rho;
        let mut tau = res0;

        for iter in 0..self.conv.max_iters {
            let even = iter % 2 == 0;
            if even {
                let v_r_star = ip.dot(&r_star, &v);
                if v_r_star == T::zero() {
                    break; // breakdown
                }
                alpha = rho / v_r_star;
                for ((nj, &uj), &vj) in u_next.as_mut().iter_mut().zip(u.as_ref()).zip(v.as_ref()) {
                    *nj = uj - alpha * vj;
                }
            }
            axpy(-alpha, u_hat.as_ref(), w.as_mut());
            let coef = theta * theta / alpha * eta;
            for (dj, &uj) in d.as_mut().iter_mut().zip(u.as_ref()) {
                *dj = uj + coef * *dj;
            }
            theta = ip.norm(&w) / tau;
            let c = T::one() / (T::one() + theta * theta).sqrt();
            tau = tau * theta * c;
            eta = c * c * alpha;
            apply_pc::<V, T>(pc, &d, &mut z)?;
            axpy(eta, z.as_ref(), x.as_mut());

            let estimate = tau * <T as From<f64>>::from(((iter + 1) as f64).sqrt());
            let (stop, s) = self.conv.check(estimate, res0, iter + 1);
            stats = s;
            if stop {
                let true_res = ip.norm(&residual::<M, V, T>(a, b, x));
                stats.final_residual = true_res;
                stats.converged = true_res <= self.conv.tol * res0;
                if stats.converged || iter + 1 >= self.conv.max_iters || !true_res.is_finite() {
                    return Ok(stats);
                }
            }

            if even {
                apply_pc::<V, T>(pc, &u_next, &mut tmp)?;
                a.matvec(&tmp, &mut u_hat);
                std::mem::swap(&mut u, &mut u_next);
                rho_last = rho;
            } else {
                rho = ip.dot(&r_star, &w);
                let beta = rho / rho_last;
                for (uj, &wj) in u.as_mut().iter_mut().zip(w.as_ref()) {
                    *uj = wj + beta * *uj;
                }
                for (vj, &hj) in v.as_mut().iter_mut().zip(u_hat.as_ref()) {
                    *vj = beta * hj + beta * beta * *vj;
                }
                apply_pc::<V, T>(pc, &u, &mut tmp)?;
                a.matvec(&tmp, &mut u_hat);
                axpy(T::one(), u_hat.as_ref(), v.as_mut());
            }
        }
        stats.final_residual = ip.norm(&residual::<M, V, T>(a, b, x));
        stats.converged = stats.final_residual <= self.conv.tol * res0;
        Ok(stats)
    }
}
