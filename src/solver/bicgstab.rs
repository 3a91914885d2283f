//! BiCGStab solver (Saad §7.4.2), right-preconditioned.
//!
//! A breakdown (vanishing `(r̂, r)` or `(r̂, v)`) stops the iteration and is
//! reported as a non-converged solve.

use crate::core::traits::{InnerProduct, MatVec};
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use crate::solver::{LinearSolver, apply_pc, axpy, residual};
use crate::utils::convergence::{Convergence, SolveStats};

pub struct BiCgStabSolver<T> {
    pub conv: Convergence<T>,
}

impl<T: num_traits::Float> BiCgStabSolver<T> {
    pub fn new(tol: T, max_iters: usize) -> Self {
        Self { conv: Convergence { tol, max_iters } }
    }
}

impl<M, V, T> LinearSolver<M, V> for BiCgStabSolver<T>
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
        let r_hat = r.clone(); // shadow residual
        let res0 = ip.norm(&r);
        let mut stats = SolveStats { iterations: 0, final_residual: res0, converged: res0 == T::zero() };
        if stats.converged {
            return Ok(stats);
        }
        let tiny = T::epsilon() * T::epsilon();
        let mut rho_prev = T::one();
        let mut alpha = T::one();
        let mut omega = T::one();
        let mut v = V::from(vec![T::zero(); n]);
        let mut p = V::from(vec![T::zero(); n]);
        let mut p_hat = V::from(vec![T::zero(); n]);
        let mut s_hat = V::from(vec![T::zero(); n]);
        let mut t = V::from(vec![T::zero(); n]);

        for i in 1..=self.conv.max_iters {
            let rho = ip.dot(&r_hat, &r);
            if rho.abs() <= tiny * res0 * res0 {
                break; // breakdown
            }
            let beta = (rho / rho_prev) * (alpha / omega);
            // p = r + beta * (p - omega * v)
            for ((pj, &rj), &vj) in p.as_mut().iter_mut().zip(r.as_ref()).zip(v.as_ref()) {
                *pj = rj + beta * (*pj - omega * vj);
            }
            apply_pc::<V, T>(pc, &p, &mut p_hat)?;
            a.matvec(&p_hat, &mut v);
            let r_hat_v = ip.dot(&r_hat, &v);
            if r_hat_v == T::zero() {
                break;
            }
            alpha = rho / r_hat_v;
            // s = r - alpha v, stored in r
            axpy(-alpha, v.as_ref(), r.as_mut());
            axpy(alpha, p_hat.as_ref(), x.as_mut());
            let s_norm = ip.norm(&r);
            let (stop, s) = self.conv.check(s_norm, res0, i);
            stats = s;
            if stats.converged || !s_norm.is_finite() {
                break;
            }
            apply_pc::<V, T>(pc, &r, &mut s_hat)?;
            a.matvec(&s_hat, &mut t);
            let tt = ip.dot(&t, &t);
            if tt == T::zero() {
                break;
            }
            omega = ip.dot(&t, &r) / tt;
            axpy(omega, s_hat.as_ref(), x.as_mut());
            axpy(-omega, t.as_ref(), r.as_mut());
            let (stop2, s) = self.conv.check(ip.norm(&r), res0, i);
            stats = s;
            if stop || stop2 || omega == T::zero() {
                break;
            }
            rho_prev = rho;
        }
        Ok(stats)
    }
}
