//! Core linear-algebra traits for kryst-newton.

/// Matrix–vector product: y ← A x.
pub trait MatVec<V> {
    /// Compute y = A · x.
    fn matvec(&self, x: &V, y: &mut V);
}

/// Inner products & norms.
pub trait InnerProduct<V> {
    /// Associated scalar type.
    type Scalar: Copy + PartialOrd + From<f64>;
    /// Compute dot(x, y).
    fn dot(&self, x: &V, y: &V) -> Self::Scalar;
    /// Compute ‖x‖₂.
    fn norm(&self, x: &V) -> Self::Scalar;
}

/// Shape of a two-dimensional operator.
pub trait MatShape {
    fn nrows(&self) -> usize;
    fn ncols(&self) -> usize;
}

/// Random access to matrix entries; structural zeros read as zero.
pub trait MatrixGet<T> {
    fn get(&self, i: usize, j: usize) -> T;
}

/// Dense copy of an operator, for direct factorization.
///
/// Operators that only support their action (matrix-free) return `None`.
pub trait ToDense<T> {
    fn to_dense(&self) -> Option<faer::Mat<T>>;
}
