//! Matrix-vector products and inner products shared by every Krylov method.
//!
//! Dense, CSR and `SystemMatrix` operators must agree, since a Newton step may
//! hand either storage to the linear solve.

use approx::assert_abs_diff_eq;
use faer::Mat;
use kryst_newton::core::traits::{InnerProduct, MatVec};
use kryst_newton::matrix::{CsrMatrix, SystemMatrix};
use rand::Rng;

#[test]
fn dense_matvec_matches_manual_product() {
    let n = 5;
    let mut rng = rand::thread_rng();
    let vals: Vec<f64> = (0..n * n).map(|_| rng.r#gen()).collect();
    let a = Mat::from_fn(n, n, |i, j| vals[j * n + i]);
    let x: Vec<f64> = (0..n).map(|_| rng.r#gen()).collect();
    let mut y = vec![0.0; n];
    a.matvec(&x, &mut y);

    for i in 0..n {
        let expected = (0..n).map(|j| vals[j * n + i] * x[j]).sum::<f64>();
        assert_abs_diff_eq!(y[i], expected, epsilon = 1e-12);
    }
}

#[test]
fn storage_formats_agree() {
    let n = 8;
    let mut rng = rand::thread_rng();
    // sparse-ish random matrix: roughly a third of the entries are nonzero
    let vals: Vec<f64> = (0..n * n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let dense = Mat::from_fn(n, n, |i, j| if i == j || (i + 2 * j) % 3 == 0 { vals[j * n + i] } else { 0.0 });
    let csr = CsrMatrix::from_dense(&dense);
    assert!(csr.nnz() < n * n);
    let x: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let mut y_dense = vec![0.0; n];
    let mut y_csr = vec![0.0; n];
    let mut y_sys = vec![0.0; n];
    dense.matvec(&x, &mut y_dense);
    csr.matvec(&x, &mut y_csr);
    SystemMatrix::from(csr.clone()).matvec(&x, &mut y_sys);
    for i in 0..n {
        assert_abs_diff_eq!(y_csr[i], y_dense[i], epsilon = 1e-12);
        assert_abs_diff_eq!(y_sys[i], y_dense[i], epsilon = 1e-12);
    }
}

#[test]
fn dot_and_norm() {
    let x = vec![1.0, 2.0, 3.0];
    let y = vec![4.0, -5.0, 6.0];
    let ip = ();
    assert_abs_diff_eq!(ip.dot(&x, &y), 12.0, epsilon = 1e-12);
    assert_abs_diff_eq!(ip.norm(&x), 14f64.sqrt(), epsilon = 1e-12);
    assert_eq!(ip.norm(&vec![0.0; 4]), 0.0);
}
