//! Linear algebra utilities in functional style
//!
//! Pure functional wrappers for the matrix manipulations needed by the SCF
//! engine. Everything is generic over [`Real`] so the same code runs on
//! `f64` and on dual numbers, and is implemented in pure Rust without
//! external BLAS/LAPACK dependencies.

use ndarray::{Array1, Array2};

use crate::dual::Real;
use crate::error::{Error, Result};

/// Type alias for matrix (2D array)
pub type Matrix<T = f64> = Array2<T>;

/// Type alias for vector (1D array)
pub type Vector<T = f64> = Array1<T>;

/// Creates an identity matrix of given size
///
/// # Examples
/// ```
/// use qhf::linalg::identity;
/// let i = identity::<f64>(3);
/// assert_eq!(i.shape(), &[3, 3]);
/// ```
pub fn identity<T: Real>(n: usize) -> Matrix<T> {
    Array2::from_shape_fn((n, n), |(i, j)| if i == j { T::one() } else { T::zero() })
}

/// Creates a zero matrix of given dimensions
pub fn zeros<T: Real>(rows: usize, cols: usize) -> Matrix<T> {
    Array2::from_elem((rows, cols), T::zero())
}

/// Matrix multiplication (functional style)
pub fn matmul<T: Real>(a: &Matrix<T>, b: &Matrix<T>) -> Matrix<T> {
    let (n, k) = a.dim();
    let m = b.ncols();
    debug_assert_eq!(k, b.nrows());

    let mut c = zeros(n, m);
    for i in 0..n {
        for l in 0..k {
            let ail = a[[i, l]];
            for j in 0..m {
                c[[i, j]] += ail * b[[l, j]];
            }
        }
    }
    c
}

/// Matrix transpose (returns new matrix)
pub fn transpose<T: Real>(m: &Matrix<T>) -> Matrix<T> {
    m.t().to_owned()
}

/// Elementwise sum of two matrices.
pub fn add<T: Real>(a: &Matrix<T>, b: &Matrix<T>) -> Matrix<T> {
    Array2::from_shape_fn(a.dim(), |idx| a[idx] + b[idx])
}

/// Computes the trace of a matrix
pub fn trace<T: Real>(m: &Matrix<T>) -> T {
    m.diag().iter().fold(T::zero(), |acc, &x| acc + x)
}

/// Frobenius norm of a matrix, measured with [`Real::magnitude`].
pub fn frobenius_norm<T: Real>(m: &Matrix<T>) -> f64 {
    m.iter().map(|&x| x.magnitude().powi(2)).sum::<f64>().sqrt()
}

/// Computes eigenvalues and eigenvectors of a symmetric matrix.
///
/// Returns `(eigenvalues, eigenvectors)` with the eigenvalues in ascending
/// order and the eigenvectors stored as columns in the same order.
pub fn eigh<T: Real>(m: &Matrix<T>) -> Result<(Vector<T>, Matrix<T>)> {
    let (rows, cols) = m.dim();
    if rows != cols {
        return Err(Error::Linalg(format!(
            "eigh requires a square matrix, got {rows}x{cols}"
        )));
    }

    let (values, vectors) = jacobi_eigenvalue(m);

    let mut indices: Vec<usize> = (0..values.len()).collect();
    indices.sort_by(|&i, &j| values[i].re().total_cmp(&values[j].re()));

    let sorted_values = Vector::from_iter(indices.iter().map(|&i| values[i]));
    let sorted_vectors = Array2::from_shape_fn((rows, rows), |(i, j)| vectors[[i, indices[j]]]);

    Ok((sorted_values, sorted_vectors))
}

/// Cyclic Jacobi eigenvalue algorithm for symmetric matrices
///
/// Sweeps over every off-diagonal pair until the off-diagonal mass
/// (primal and, for duals, tangent) vanishes.
fn jacobi_eigenvalue<T: Real>(a: &Matrix<T>) -> (Vector<T>, Matrix<T>) {
    let n = a.nrows();
    let mut a_work = a.clone();
    let mut v = identity(n);

    let max_sweeps = 100;
    let scale = frobenius_norm(a).max(f64::MIN_POSITIVE);

    for _ in 0..max_sweeps {
        if off_diagonal_norm(&a_work) <= 1e-14 * scale {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                if a_work[[p, q]].magnitude() == 0.0 {
                    continue;
                }
                if let Some((c, s)) = rotation(&a_work, p, q) {
                    apply_jacobi_rotation(&mut a_work, &mut v, p, q, c, s);
                }
            }
        }
    }

    let eigenvalues = Vector::from_iter((0..n).map(|i| a_work[[i, i]]));
    (eigenvalues, v)
}

fn off_diagonal_norm<T: Real>(a: &Matrix<T>) -> f64 {
    let n = a.nrows();
    let mut sum = 0.0;
    for i in 0..n {
        for j in 0..n {
            if i != j {
                sum += a[[i, j]].magnitude().powi(2);
            }
        }
    }
    sum.sqrt()
}

/// Rotation `(cos, sin)` that zeroes `a[p][q]`.
///
/// Returns `None` for a degenerate pair coupled only through its tangent,
/// where no rotation angle is defined.
fn rotation<T: Real>(a: &Matrix<T>, p: usize, q: usize) -> Option<(T, T)> {
    let apq = a[[p, q]];
    let h = a[[q, q]] - a[[p, p]];
    if apq.re() == 0.0 && h.re() == 0.0 {
        return None;
    }

    // tan(θ) for tan(2θ) = 2 apq / h
    let t = if apq.re().abs() < 1e-12 * h.re().abs() {
        apq / h
    } else {
        let theta = h / (T::from_f64(2.0) * apq);
        let t = T::one() / (theta.abs() + (theta * theta + T::one()).sqrt());
        if theta.re() < 0.0 {
            -t
        } else {
            t
        }
    };

    let c = T::one() / (t * t + T::one()).sqrt();
    Some((c, t * c))
}

/// Applies Jacobi rotation to matrix and eigenvector matrix
fn apply_jacobi_rotation<T: Real>(
    a: &mut Matrix<T>,
    v: &mut Matrix<T>,
    p: usize,
    q: usize,
    c: T,
    s: T,
) {
    let n = a.nrows();

    // A <- A J
    for k in 0..n {
        let akp = a[[k, p]];
        let akq = a[[k, q]];
        a[[k, p]] = c * akp - s * akq;
        a[[k, q]] = s * akp + c * akq;
    }

    // A <- J^T A
    for k in 0..n {
        let apk = a[[p, k]];
        let aqk = a[[q, k]];
        a[[p, k]] = c * apk - s * aqk;
        a[[q, k]] = s * apk + c * aqk;
    }

    // The rotated pair vanishes identically, tangent included
    a[[p, q]] = T::zero();
    a[[q, p]] = T::zero();

    // Update eigenvectors
    for k in 0..n {
        let vkp = v[[k, p]];
        let vkq = v[[k, q]];
        v[[k, p]] = c * vkp - s * vkq;
        v[[k, q]] = s * vkp + c * vkq;
    }
}

/// Symmetric (Löwdin) orthogonalization matrix `S^{-1/2} = V diag(w^{-1/2}) V^T`.
pub fn inverse_sqrt<T: Real>(s: &Matrix<T>) -> Result<Matrix<T>> {
    let (w, v) = eigh(s)?;
    if let Some(bad) = w.iter().find(|x| x.re() <= 0.0) {
        return Err(Error::Linalg(format!(
            "matrix is not positive definite (eigenvalue {})",
            bad.re()
        )));
    }

    let n = s.nrows();
    let mut x = zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            let mut acc = T::zero();
            for k in 0..n {
                acc += v[[i, k]] * v[[j, k]] / w[k].sqrt();
            }
            x[[i, j]] = acc;
        }
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dual::Dual;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_identity() {
        let i = identity::<f64>(3);
        assert_eq!(i[[0, 0]], 1.0);
        assert_eq!(i[[1, 1]], 1.0);
        assert_eq!(i[[0, 1]], 0.0);
    }

    #[test]
    fn test_matmul() {
        let a = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Array2::from_shape_vec((2, 2), vec![5.0, 6.0, 7.0, 8.0]).unwrap();
        let c = matmul(&a, &b);
        assert_abs_diff_eq!(c[[0, 0]], 19.0, epsilon = 1e-10);
        assert_abs_diff_eq!(c[[1, 1]], 50.0, epsilon = 1e-10);
    }

    #[test]
    fn test_trace() {
        let m = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_abs_diff_eq!(trace(&m), 5.0, epsilon = 1e-10);
    }

    #[test]
    fn test_eigh_reconstructs_matrix() {
        let m = Array2::from_shape_vec(
            (3, 3),
            vec![4.0, 1.0, -2.0, 1.0, 2.0, 0.5, -2.0, 0.5, 3.0],
        )
        .unwrap();
        let (w, v) = eigh(&m).unwrap();

        assert!(w[0] <= w[1] && w[1] <= w[2]);

        let vtv = matmul(&transpose(&v), &v);
        let av = matmul(&m, &v);
        for j in 0..3 {
            for i in 0..3 {
                assert_abs_diff_eq!(vtv[[i, j]], if i == j { 1.0 } else { 0.0 }, epsilon = 1e-12);
                assert_abs_diff_eq!(av[[i, j]], w[j] * v[[i, j]], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_eigh_rejects_rectangular() {
        let m = zeros::<f64>(2, 3);
        assert!(matches!(eigh(&m), Err(Error::Linalg(_))));
    }

    #[test]
    fn test_inverse_sqrt() {
        let s = Array2::from_shape_vec((2, 2), vec![1.0, 0.4, 0.4, 1.0]).unwrap();
        let x = inverse_sqrt(&s).unwrap();
        let xsx = matmul(&x, &matmul(&s, &x));
        assert_abs_diff_eq!(xsx[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(xsx[[0, 1]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_eigenvalue_derivative() {
        // d/dx of the smallest eigenvalue of [[1, x], [x, 1]] is -1
        let x = Dual::variable(0.3);
        let m = Array2::from_shape_vec(
            (2, 2),
            vec![Dual::constant(1.0), x, x, Dual::constant(1.0)],
        )
        .unwrap();
        let (w, _) = eigh(&m).unwrap();
        assert_abs_diff_eq!(w[0].re, 0.7, epsilon = 1e-12);
        assert_abs_diff_eq!(w[0].eps, -1.0, epsilon = 1e-10);
    }
}
