//! Krylov & direct solver interfaces.

use crate::error::KError;
use crate::preconditioner::Preconditioner;
use crate::utils::convergence::SolveStats;

/// Common interface for any direct or iterative solver.
pub trait LinearSolver<M, V> {
    type Error;
    type Scalar: Copy + PartialOrd + From<f64>;
    /// Solve A·x = b, writing result into `x`.
    /// `x` holds the initial guess on entry. Returns iteration stats (including convergence info);
    /// non-convergence is reported through `SolveStats::converged`, not as an error.
    fn solve(
        &mut self,
        a: &M,
        pc: Option<&dyn Preconditioner<V>>,
        b: &V,
        x: &mut V,
    ) -> Result<SolveStats<Self::Scalar>, Self::Error>;
}

/// z = M⁻¹ r, or a plain copy without a preconditioner.
pub(crate) fn apply_pc<V, T>(pc: Option<&dyn Preconditioner<V>>, r: &V, z: &mut V) -> Result<(), KError>
where
    V: AsRef<[T]> + AsMut<[T]>,
    T: Copy,
{
    match pc {
        Some(pc) => pc.apply(r, z),
        None => {
            z.as_mut().copy_from_slice(r.as_ref());
            Ok(())
        }
    }
}

/// r = b − A x
pub(crate) fn residual<M, V, T>(a: &M, b: &V, x: &V) -> V
where
    M: crate::core::traits::MatVec<V>,
    V: AsRef<[T]> + From<Vec<T>>,
    T: num_traits::Float,
{
    let n = b.as_ref().len();
    let mut ax = V::from(vec![T::zero(); n]);
    a.matvec(x, &mut ax);
    V::from(b.as_ref().iter().zip(ax.as_ref()).map(|(&bi, &axi)| bi - axi).collect::<Vec<_>>())
}

/// y ← y + α x
pub(crate) fn axpy<T: num_traits::Float>(alpha: T, x: &[T], y: &mut [T]) {
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi = *yi + alpha * xi;
    }
}

pub mod direct_lu;
pub use direct_lu::LuSolver;

pub mod cg;
pub use cg::CgSolver;

pub mod gmres;
pub use gmres::GmresSolver;

pub mod bicgstab;
pub use bicgstab::BiCgStabSolver;

pub mod cgs;
pub use cgs::CgsSolver;

pub mod tfqmr;
pub use tfqmr::TfqmrSolver;
