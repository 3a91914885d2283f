//! Wrappers for faer dense matrix types and vector operations.
//!
//! This module provides implementations of core linear algebra traits for `faer::Mat` and `Vec<T>`,
//! enabling their use in generic iterative solvers and preconditioners. Inner products use Rayon
//! when the `rayon` feature is enabled.
//!
//! # References
//! - [faer crate documentation](https://docs.rs/faer)
//! - [num-traits crate documentation](https://docs.rs/num-traits)

use crate::core::traits::{InnerProduct, MatShape, MatVec, MatrixGet, ToDense};
use faer::Mat;
use num_traits::Float;

/// Implements matrix-vector multiplication for `faer::Mat`.
///
/// Computes `y = A * x` where `A` is a dense matrix, `x` and `y` are vectors.
impl<T: Float> MatVec<Vec<T>> for Mat<T> {
    fn matvec(&self, x: &Vec<T>, y: &mut Vec<T>) {
        assert_eq!(self.nrows(), y.len(), "Output vector y has incorrect length");
        assert_eq!(self.ncols(), x.len(), "Input vector x has incorrect length");
        for i in 0..self.nrows() {
            let mut acc = T::zero();
            for j in 0..self.ncols() {
                acc = acc + self[(i, j)] * x[j];
            }
            y[i] = acc;
        }
    }
}

impl<T: Float> MatShape for Mat<T> {
    fn nrows(&self) -> usize {
        Mat::nrows(self)
    }
    fn ncols(&self) -> usize {
        Mat::ncols(self)
    }
}

impl<T: Float> MatrixGet<T> for Mat<T> {
    fn get(&self, i: usize, j: usize) -> T {
        self[(i, j)]
    }
}

impl<T: Float> ToDense<T> for Mat<T> {
    fn to_dense(&self) -> Option<Mat<T>> {
        Some(self.clone())
    }
}

/// Implements inner product and norm for vectors, with optional Rayon parallelism.
///
/// If the `rayon` feature is enabled, uses parallel iterators for performance.
impl<T: Float + From<f64> + Send + Sync> InnerProduct<Vec<T>> for () {
    type Scalar = T;
    /// Computes the dot product of two vectors: `x^T y`.
    fn dot(&self, x: &Vec<T>, y: &Vec<T>) -> T {
        assert_eq!(x.len(), y.len(), "Vectors must have the same length");
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            x.as_slice()
                .par_iter()
                .zip(y.as_slice().par_iter())
                .map(|(xi, yi)| *xi * *yi)
                .reduce(|| T::zero(), |acc, v| acc + v)
        }
        #[cfg(not(feature = "rayon"))]
        {
            x.iter()
                .zip(y.iter())
                .map(|(xi, yi)| *xi * *yi)
                .fold(T::zero(), |acc, v| acc + v)
        }
    }
    /// Computes the Euclidean norm of a vector: `||x||_2`.
    fn norm(&self, x: &Vec<T>) -> T {
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            x.as_slice()
                .par_iter()
                .map(|xi| *xi * *xi)
                .reduce(|| T::zero(), |acc, v| acc + v)
                .sqrt()
        }
        #[cfg(not(feature = "rayon"))]
        {
            x.iter()
                .map(|xi| *xi * *xi)
                .fold(T::zero(), |acc, v| acc + v)
                .sqrt()
        }
    }
}
