//! Preconditioner selection for the inner linear solve.
//!
//! The `PC` enum names the algebraic preconditioners that can be built from a
//! problem's preconditioner matrix. Parameters for them (relaxation factor,
//! drop tolerance) travel separately in `PcParams` so the same selection can be
//! rebuilt or recomputed under a reuse policy.
//!
//! # Example
//!
//! ```rust
//! use kryst_newton::preconditioner::PC;
//! let pc: PC = "ILU".parse().unwrap();
//! assert!(pc.create().is_some());
//! ```

use crate::error::KError;
use crate::preconditioner::{Ilu0, Jacobi, PcHandle};
use std::str::FromStr;

/// Preconditioner kind used when none is supplied by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PC {
    /// No preconditioning.
    #[default]
    None,
    /// Jacobi (diagonal scaling) preconditioner.
    Jacobi,
    /// Incomplete LU factorization with zero fill-in (ILU(0)).
    Ilu0,
}

impl PC {
    /// Fresh, not yet set up instance of the selected preconditioner.
    pub fn create(&self) -> Option<PcHandle> {
        match self {
            PC::None => None,
            PC::Jacobi => Some(PcHandle::new(Jacobi::new())),
            PC::Ilu0 => Some(PcHandle::new(Ilu0::new())),
        }
    }
}

impl FromStr for PC {
    type Err = KError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(PC::None),
            "jacobi" => Ok(PC::Jacobi),
            "ilu" | "ilu0" | "ilu(0)" => Ok(PC::Ilu0),
            other => Err(KError::InvalidConfig(format!("unknown preconditioner '{other}'"))),
        }
    }
}
