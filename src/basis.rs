//! Basis set functions for quantum chemistry
//!
//! Contracted Cartesian Gaussians `Σ_k c_k x^lx y^ly z^lz exp(-α_k r²)` and
//! the one- and two-electron matrices built from them.

use std::f64::consts::PI;

use ndarray::{Array2, Array4};

use crate::basis_data::AngularMomentum;
use crate::dual::Real;
use crate::integrals;
use crate::linalg::{zeros, Matrix};

/// A contracted Gaussian basis function as given by the basis data
/// (coefficients are not normalized).
#[derive(Debug, Clone, PartialEq)]
pub struct BasisFunction {
    pub l: AngularMomentum,
    pub alpha: Vec<f64>,
    pub coeff: Vec<f64>,
    pub r: [f64; 3],
}

impl BasisFunction {
    pub fn new(l: AngularMomentum, alpha: Vec<f64>, coeff: Vec<f64>, r: [f64; 3]) -> Self {
        Self { l, alpha, coeff, r }
    }

    /// Number of primitive Gaussians
    pub fn n_primitives(&self) -> usize {
        self.alpha.len()
    }

    /// Evaluates the normalized basis function at a given point
    pub fn evaluate(&self, point: [f64; 3]) -> f64 {
        Shell::new(self.l, &self.alpha, &self.coeff, self.r).evaluate(point)
    }
}

fn double_factorial(n: i64) -> f64 {
    let mut r = 1.0;
    let mut k = n;
    while k > 1 {
        r *= k as f64;
        k -= 2;
    }
    r
}

fn angular_factor(l: AngularMomentum) -> f64 {
    double_factorial(2 * l.0 as i64 - 1)
        * double_factorial(2 * l.1 as i64 - 1)
        * double_factorial(2 * l.2 as i64 - 1)
}

/// Folds primitive and contraction normalization into the coefficients.
pub fn normalize<T: Real>(l: AngularMomentum, alpha: &[T], coeff: &[T]) -> Vec<T> {
    let la = (l.0 + l.1 + l.2) as i32;
    let fact = angular_factor(l);

    let scaled: Vec<T> = alpha
        .iter()
        .zip(coeff)
        .map(|(&a, &c)| {
            let x = T::from_f64(2.0 / PI) * a;
            // (2a/π)^{3/4} (4a)^{l/2}
            let n = x.sqrt() * x.sqrt().sqrt() * (T::from_f64(4.0) * a).sqrt().powi(la);
            c * n / T::from_f64(fact.sqrt())
        })
        .collect();

    let prefactor = PI.powf(1.5) / 2f64.powi(la) * fact;
    let mut s = T::zero();
    for (i, &di) in scaled.iter().enumerate() {
        for (j, &dj) in scaled.iter().enumerate() {
            let p = alpha[i] + alpha[j];
            s += di * dj / (p.powi(la + 1) * p.sqrt());
        }
    }
    let norm = T::one() / (T::from_f64(prefactor) * s).sqrt();

    scaled.into_iter().map(|d| d * norm).collect()
}

/// A normalized contracted Gaussian over a generic scalar.
#[derive(Debug, Clone)]
pub struct Shell<T> {
    pub l: AngularMomentum,
    pub alpha: Vec<T>,
    /// Normalized contraction coefficients
    pub coeff: Vec<T>,
    pub center: [T; 3],
}

impl<T: Real> Shell<T> {
    pub fn new(l: AngularMomentum, alpha: &[T], coeff: &[T], center: [T; 3]) -> Self {
        Self {
            l,
            alpha: alpha.to_vec(),
            coeff: normalize(l, alpha, coeff),
            center,
        }
    }

    pub fn evaluate(&self, point: [T; 3]) -> T {
        let dx = point[0] - self.center[0];
        let dy = point[1] - self.center[1];
        let dz = point[2] - self.center[2];
        let r2 = dx * dx + dy * dy + dz * dz;
        let angular =
            dx.powi(self.l.0 as i32) * dy.powi(self.l.1 as i32) * dz.powi(self.l.2 as i32);

        self.alpha
            .iter()
            .zip(&self.coeff)
            .fold(T::zero(), |acc, (&a, &c)| acc + c * (-a * r2).exp())
            * angular
    }
}

/// A set of normalized shells together with the nuclei they interact with.
pub struct BasisSet<T> {
    pub shells: Vec<Shell<T>>,
}

impl<T: Real> BasisSet<T> {
    pub fn new(shells: Vec<Shell<T>>) -> Self {
        Self { shells }
    }

    /// Number of basis functions
    pub fn size(&self) -> usize {
        self.shells.len()
    }

    fn symmetric(&self, f: impl Fn(&Shell<T>, &Shell<T>) -> T) -> Matrix<T> {
        let n = self.size();
        let mut m = zeros(n, n);
        for i in 0..n {
            for j in 0..=i {
                let v = f(&self.shells[i], &self.shells[j]);
                m[[i, j]] = v;
                m[[j, i]] = v;
            }
        }
        m
    }

    /// Computes overlap matrix S
    pub fn overlap_matrix(&self) -> Matrix<T> {
        self.symmetric(integrals::overlap_integral)
    }

    pub fn kinetic_matrix(&self) -> Matrix<T> {
        self.symmetric(integrals::kinetic_integral)
    }

    /// Nuclear attraction `-Σ_C Z_C <a| 1/r_C |b>`.
    pub fn attraction_matrix(&self, charges: &[u32], nuclei: &[[T; 3]]) -> Matrix<T> {
        self.symmetric(|a, b| {
            charges
                .iter()
                .zip(nuclei)
                .fold(T::zero(), |acc, (&z, rc)| {
                    acc - T::from_f64(z as f64) * integrals::attraction_integral(a, b, *rc)
                })
        })
    }

    /// Computes one-electron (kinetic + nuclear attraction) matrix
    pub fn core_hamiltonian(&self, charges: &[u32], nuclei: &[[T; 3]]) -> Matrix<T> {
        let t = self.kinetic_matrix();
        let v = self.attraction_matrix(charges, nuclei);
        Array2::from_shape_fn(t.dim(), |idx| t[idx] + v[idx])
    }

    /// Two-electron repulsion integrals `(pq|rs)` in chemists' notation,
    /// evaluated once per symmetry-unique quartet.
    pub fn repulsion_tensor(&self) -> Array4<T> {
        let n = self.size();
        let mut e = Array4::from_elem((n, n, n, n), T::zero());
        let pair = |i: usize, j: usize| i * (i + 1) / 2 + j;

        for i in 0..n {
            for j in 0..=i {
                for k in 0..n {
                    for l in 0..=k {
                        if pair(i, j) < pair(k, l) {
                            continue;
                        }
                        let v = integrals::repulsion_integral(
                            &self.shells[i],
                            &self.shells[j],
                            &self.shells[k],
                            &self.shells[l],
                        );
                        for (p, q, r, s) in [
                            (i, j, k, l),
                            (j, i, k, l),
                            (i, j, l, k),
                            (j, i, l, k),
                            (k, l, i, j),
                            (l, k, i, j),
                            (k, l, j, i),
                            (l, k, j, i),
                        ] {
                            e[[p, q, r, s]] = v;
                        }
                    }
                }
            }
        }
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const H_ALPHA: [f64; 3] = [3.425250914, 0.6239137298, 0.1688554040];
    const H_COEFF: [f64; 3] = [0.1543289673, 0.5353281423, 0.4446345422];

    #[test]
    fn test_normalized_self_overlap() {
        let s = Shell::new((0, 0, 0), &H_ALPHA, &H_COEFF, [0.0; 3]);
        let p = Shell::new((0, 1, 0), &[5.0, 1.2], &[0.3, 0.7], [0.0; 3]);
        let basis = BasisSet::new(vec![s, p]);
        let overlap = basis.overlap_matrix();
        assert_abs_diff_eq!(overlap[[0, 0]], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(overlap[[1, 1]], 1.0, epsilon = 1e-10);
        // s and p on the same center are orthogonal
        assert_abs_diff_eq!(overlap[[0, 1]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_hydrogen_orbital_value() {
        let f = BasisFunction::new((0, 0, 0), H_ALPHA.to_vec(), H_COEFF.to_vec(), [0.0; 3]);
        assert_abs_diff_eq!(f.evaluate([0.0, 0.0, 0.0]), 0.62824688, epsilon = 1e-7);
        assert_eq!(f.n_primitives(), 3);
    }

    #[test]
    fn test_repulsion_symmetry() {
        let a = Shell::new((0, 0, 0), &H_ALPHA, &H_COEFF, [0.0, 0.0, 0.0]);
        let b = Shell::new((0, 0, 1), &[2.0, 0.5], &[0.4, 0.6], [0.0, 0.3, 1.0]);
        let e = BasisSet::new(vec![a, b]).repulsion_tensor();
        assert_abs_diff_eq!(e[[0, 1, 0, 0]], e[[0, 0, 1, 0]], epsilon = 1e-14);
        assert_abs_diff_eq!(e[[1, 0, 1, 1]], e[[1, 1, 0, 1]], epsilon = 1e-14);
        assert!(e[[0, 0, 1, 1]] > 0.0);
    }
}
