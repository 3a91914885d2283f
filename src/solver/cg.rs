//! Preconditioned Conjugate Gradient per Saad §9.2 (plain CG without a preconditioner, §6.1).
//!
//! Intended for symmetric positive definite Jacobians. A non-positive curvature
//! `pᵀAp ≤ 0` aborts with `KError::IndefiniteMatrix`.

use crate::core::traits::{InnerProduct, MatVec};
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use crate::solver::{LinearSolver, apply_pc, axpy, residual};
use crate::utils::convergence::{Convergence, SolveStats};

pub struct CgSolver<T> {
    pub conv: Convergence<T>,
}

impl<T: Copy + num_traits::Float> CgSolver<T> {
    pub fn new(tol: T, max_iters: usize) -> Self {
        Self { conv: Convergence { tol, max_iters } }
    }
}

impl<M, V, T> LinearSolver<M, V> for CgSolver<T>
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
        let res0 = ip.norm(&r);
        let mut stats = SolveStats { iterations: 0, final_residual: res0, converged: res0 == T::zero() };
        if stats.converged {
            return Ok(stats);
        }
        let mut z = V::from(vec![T::zero(); n]);
        apply_pc::<V, T>(pc, &r, &mut z)?;
        let mut p = z.clone();
        let mut rz = ip.dot(&r, &z);
        let mut ap = V::from(vec![T::zero(); n]);

        for i in 1..=self.conv.max_iters {
            a.matvec(&p, &mut ap);
            let pap = ip.dot(&p, &ap);
            if pap <= T::zero() {
                return Err(KError::IndefiniteMatrix);
            }
            let alpha = rz / pap;
            axpy(alpha, p.as_ref(), x.as_mut());
            axpy(-alpha, ap.as_ref(), r.as_mut());
            let res_norm = ip.norm(&r);
            let (stop, s) = self.conv.check(res_norm, res0, i);
            stats = s;
            if stop {
                break;
            }
            apply_pc::<V, T>(pc, &r, &mut z)?;
            let rz_new = ip.dot(&r, &z);
            let beta = rz_new / rz;
            for (pj, &zj) in p.as_mut().iter_mut().zip(z.as_ref()) {
                *pj = zj + beta * *pj;
            }
            rz = rz_new;
        }
        Ok(stats)
    }
}
