// Compressed sparse row storage for assembled Jacobians and preconditioner matrices.

use crate::core::traits::{MatShape, MatVec, MatrixGet, ToDense};
use crate::error::KError;
use faer::Mat;
use num_traits::Float;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// CSR matrix with sorted, duplicate-free column indices in every row.
#[derive(Clone, Debug, PartialEq)]
pub struct CsrMatrix<T> {
    nrows: usize,
    ncols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<T>,
}

impl<T: Float> CsrMatrix<T> {
    /// Build a CSR from raw row‐ptr, col‐idx, and values.
    ///
    /// Column indices must be strictly increasing within each row.
    pub fn from_csr(
        nrows: usize,
        ncols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<T>,
    ) -> Result<Self, KError> {
        if row_ptr.len() != nrows + 1 || row_ptr[0] != 0 {
            return Err(KError::InvalidConfig(format!(
                "row_ptr must have {} entries starting at 0",
                nrows + 1
            )));
        }
        let nnz = row_ptr[nrows];
        if col_idx.len() != nnz || values.len() != nnz {
            return Err(KError::InvalidConfig(format!(
                "expected {nnz} column indices and values, got {} and {}",
                col_idx.len(),
                values.len()
            )));
        }
        for i in 0..nrows {
            let (start, end) = (row_ptr[i], row_ptr[i + 1]);
            if start > end || end > nnz {
                return Err(KError::InvalidConfig(format!("row_ptr is not monotone at row {i}")));
            }
            let row = &col_idx[start..end];
            if row.iter().any(|&j| j >= ncols) {
                return Err(KError::InvalidConfig(format!("column index out of range in row {i}")));
            }
            if row.windows(2).any(|w| w[0] >= w[1]) {
                return Err(KError::InvalidConfig(format!(
                    "column indices of row {i} are not strictly increasing"
                )));
            }
        }
        Ok(Self { nrows, ncols, row_ptr, col_idx, values })
    }

    /// Build from `(row, col, value)` triplets; duplicate entries are summed.
    pub fn from_triplets(nrows: usize, ncols: usize, triplets: &[(usize, usize, T)]) -> Result<Self, KError> {
        let mut sorted = triplets.to_vec();
        sorted.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        let mut row_ptr = vec![0; nrows + 1];
        let mut col_idx = Vec::with_capacity(sorted.len());
        let mut values: Vec<T> = Vec::with_capacity(sorted.len());
        let mut last: Option<(usize, usize)> = None;
        for &(i, j, v) in &sorted {
            if i >= nrows || j >= ncols {
                return Err(KError::InvalidConfig(format!(
                    "triplet ({i}, {j}) outside a {nrows}x{ncols} matrix"
                )));
            }
            if last == Some((i, j)) {
                if let Some(acc) = values.last_mut() {
                    *acc = *acc + v;
                }
                continue;
            }
            col_idx.push(j);
            values.push(v);
            row_ptr[i + 1] += 1;
            last = Some((i, j));
        }
        for i in 0..nrows {
            row_ptr[i + 1] += row_ptr[i];
        }
        Self::from_csr(nrows, ncols, row_ptr, col_idx, values)
    }

    /// Keep the nonzero entries of a dense matrix.
    pub fn from_dense(a: &Mat<T>) -> Self {
        let (nrows, ncols) = (a.nrows(), a.ncols());
        let mut row_ptr = vec![0; nrows + 1];
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        for i in 0..nrows {
            for j in 0..ncols {
                let v = a[(i, j)];
                if v != T::zero() {
                    col_idx.push(j);
                    values.push(v);
                }
            }
            row_ptr[i + 1] = col_idx.len();
        }
        Self { nrows, ncols, row_ptr, col_idx, values }
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    pub fn col_idx(&self) -> &[usize] {
        &self.col_idx
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// True when both matrices share row pointers and column indices.
    pub fn same_pattern(&self, other: &Self) -> bool {
        self.nrows == other.nrows
            && self.ncols == other.ncols
            && self.row_ptr == other.row_ptr
            && self.col_idx == other.col_idx
    }

    /// Position of entry (i, j) in `values`, if stored.
    pub fn find(&self, i: usize, j: usize) -> Option<usize> {
        let start = self.row_ptr[i];
        let row = &self.col_idx[start..self.row_ptr[i + 1]];
        row.binary_search(&j).ok().map(|k| start + k)
    }

    /// Compute y = A * x.  `x.len() == ncols()`, `y.len() == nrows()`.
    pub fn spmv(&self, x: &[T], y: &mut [T]) {
        assert_eq!(x.len(), self.ncols);
        assert_eq!(y.len(), self.nrows);
        for (i, yi) in y.iter_mut().enumerate() {
            *yi = self.row_dot(i, x);
        }
    }

    fn row_dot(&self, i: usize, x: &[T]) -> T {
        let (start, end) = (self.row_ptr[i], self.row_ptr[i + 1]);
        self.col_idx[start..end]
            .iter()
            .zip(&self.values[start..end])
            .fold(T::zero(), |acc, (&j, &v)| acc + v * x[j])
    }
}

#[cfg(feature = "rayon")]
impl<T: Float + Send + Sync> CsrMatrix<T> {
    /// Parallel SpMV using Rayon
    pub fn spmv_parallel(&self, x: &[T], y: &mut [T]) {
        assert_eq!(x.len(), self.ncols);
        assert_eq!(y.len(), self.nrows);
        y.par_iter_mut().enumerate().for_each(|(i, yi)| {
            *yi = self.row_dot(i, x);
        });
    }
}

impl<T: Float + Send + Sync> MatVec<Vec<T>> for CsrMatrix<T> {
    fn matvec(&self, x: &Vec<T>, y: &mut Vec<T>) {
        #[cfg(feature = "rayon")]
        {
            self.spmv_parallel(x, y);
        }
        #[cfg(not(feature = "rayon"))]
        {
            self.spmv(x, y);
        }
    }
}

impl<T: Float> MatShape for CsrMatrix<T> {
    fn nrows(&self) -> usize {
        self.nrows
    }
    fn ncols(&self) -> usize {
        self.ncols
    }
}

impl<T: Float> MatrixGet<T> for CsrMatrix<T> {
    fn get(&self, i: usize, j: usize) -> T {
        self.find(i, j).map_or(T::zero(), |k| self.values[k])
    }
}

impl<T: Float> ToDense<T> for CsrMatrix<T> {
    fn to_dense(&self) -> Option<Mat<T>> {
        Some(Mat::from_fn(self.nrows, self.ncols, |i, j| self.get(i, j)))
    }
}
