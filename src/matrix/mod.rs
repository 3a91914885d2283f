//! Matrix module: dense and sparse assembled operators.

pub mod sparse;
pub use sparse::CsrMatrix;

use std::borrow::Cow;

use crate::core::traits::{MatShape, MatVec, MatrixGet, ToDense};
use faer::Mat;

/// An explicitly assembled matrix handed over by a discretized problem,
/// either as a Jacobian or as the matrix a preconditioner is built from.
#[derive(Clone, Debug)]
pub enum SystemMatrix {
    Dense(Mat<f64>),
    Csr(CsrMatrix<f64>),
}

impl SystemMatrix {
    /// Sparse view of the matrix; dense storage is compressed on the fly.
    pub fn to_csr(&self) -> Cow<'_, CsrMatrix<f64>> {
        match self {
            SystemMatrix::Dense(a) => Cow::Owned(CsrMatrix::from_dense(a)),
            SystemMatrix::Csr(a) => Cow::Borrowed(a),
        }
    }

    pub fn diagonal(&self) -> Vec<f64> {
        let n = self.nrows().min(self.ncols());
        (0..n).map(|i| self.get(i, i)).collect()
    }
}

impl From<Mat<f64>> for SystemMatrix {
    fn from(a: Mat<f64>) -> Self {
        SystemMatrix::Dense(a)
    }
}

impl From<CsrMatrix<f64>> for SystemMatrix {
    fn from(a: CsrMatrix<f64>) -> Self {
        SystemMatrix::Csr(a)
    }
}

impl MatVec<Vec<f64>> for SystemMatrix {
    fn matvec(&self, x: &Vec<f64>, y: &mut Vec<f64>) {
        match self {
            SystemMatrix::Dense(a) => a.matvec(x, y),
            SystemMatrix::Csr(a) => a.matvec(x, y),
        }
    }
}

impl MatShape for SystemMatrix {
    fn nrows(&self) -> usize {
        match self {
            SystemMatrix::Dense(a) => a.nrows(),
            SystemMatrix::Csr(a) => MatShape::nrows(a),
        }
    }
    fn ncols(&self) -> usize {
        match self {
            SystemMatrix::Dense(a) => a.ncols(),
            SystemMatrix::Csr(a) => MatShape::ncols(a),
        }
    }
}

impl MatrixGet<f64> for SystemMatrix {
    fn get(&self, i: usize, j: usize) -> f64 {
        match self {
            SystemMatrix::Dense(a) => a[(i, j)],
            SystemMatrix::Csr(a) => a.get(i, j),
        }
    }
}

impl ToDense<f64> for SystemMatrix {
    fn to_dense(&self) -> Option<Mat<f64>> {
        match self {
            SystemMatrix::Dense(a) => Some(a.clone()),
            SystemMatrix::Csr(a) => a.to_dense(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_and_csr_agree() {
        let a = Mat::from_fn(3, 3, |i, j| (i + 2 * j) as f64 + if i == j { 4.0 } else { 0.0 });
        let dense = SystemMatrix::from(a.clone());
        let sparse = SystemMatrix::from(CsrMatrix::from_dense(&a));
        let x = vec![1.0, -2.0, 0.5];
        let (mut y1, mut y2) = (vec![0.0; 3], vec![0.0; 3]);
        dense.matvec(&x, &mut y1);
        sparse.matvec(&x, &mut y2);
        assert_eq!(y1, y2);
        assert_eq!(dense.diagonal(), sparse.diagonal());
    }
}
