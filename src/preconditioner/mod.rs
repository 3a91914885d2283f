//! Preconditioners for linear solvers.
//!
//! This module defines the Preconditioner trait, the shared `PcHandle` used to pass a
//! preconditioner between a problem adapter and the Krylov backend, and the built-in
//! Jacobi and ILU(0) implementations.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use crate::config::options::PcParams;
use crate::error::KError;
use crate::matrix::SystemMatrix;

/// A preconditioner M ≈ A⁻¹.
pub trait Preconditioner<V> {
    /// Apply M⁻¹ to r, writing z = M⁻¹ r
    fn apply(&self, r: &V, z: &mut V) -> Result<(), KError>;
    /// Setup/factorize from an assembled matrix. `params` is forwarded untouched
    /// from the configuration; implementations read the keys they understand.
    fn setup(&mut self, a: &SystemMatrix, params: &PcParams) -> Result<(), KError>;
}

/// Object type stored behind a [`PcHandle`].
pub type SharedPreconditioner = dyn Preconditioner<Vec<f64>> + Send + Sync;

/// Shared ownership of a preconditioner.
///
/// Clones point at the same object; [`PcHandle::ptr_eq`] tells whether two
/// handles refer to the same build.
#[derive(Clone)]
pub struct PcHandle {
    inner: Arc<RwLock<SharedPreconditioner>>,
}

impl PcHandle {
    pub fn new<P>(pc: P) -> Self
    where
        P: Preconditioner<Vec<f64>> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(RwLock::new(pc)) }
    }

    pub fn ptr_eq(&self, other: &PcHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, SharedPreconditioner>, KError> {
        self.inner
            .read()
            .map_err(|_| KError::SolveError("preconditioner lock poisoned".into()))
    }

    pub fn setup(&self, a: &SystemMatrix, params: &PcParams) -> Result<(), KError> {
        let mut pc = self
            .inner
            .write()
            .map_err(|_| KError::SolveError("preconditioner lock poisoned".into()))?;
        pc.setup(a, params)
    }

    pub fn apply(&self, r: &Vec<f64>, z: &mut Vec<f64>) -> Result<(), KError> {
        self.read()?.apply(r, z)
    }
}

impl fmt::Debug for PcHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PcHandle({:p})", Arc::as_ptr(&self.inner))
    }
}

// Submodules for various preconditioners
pub mod ilu;
pub mod jacobi;

// Re-exports for convenience
pub use ilu::Ilu0;
pub use jacobi::Jacobi;

/// Unified preconditioner enum for all supported types.
pub use crate::context::pc_context::PC;
