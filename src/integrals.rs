//! Gaussian integrals by the McMurchie-Davidson scheme.
//!
//! Products of Cartesian Gaussians are expanded in Hermite Gaussians
//! ([`hermite_expansion`]); Coulomb-type integrals over Hermite Gaussians
//! reduce to the auxiliary integrals [`hermite_coulomb`], which are built
//! from the Boys function. All routines are generic over [`Real`].

use std::f64::consts::PI;

use crate::basis::Shell;
use crate::basis_data::AngularMomentum;
use crate::dual::Real;

fn components(l: AngularMomentum) -> [i32; 3] {
    [l.0 as i32, l.1 as i32, l.2 as i32]
}

/// Hermite expansion coefficient `E_t^{ij}` for one Cartesian direction.
///
/// `q` is the separation `A_x - B_x` of the two centers, `a` and `b` the
/// exponents.
pub fn hermite_expansion<T: Real>(i: i32, j: i32, t: i32, q: T, a: T, b: T) -> T {
    if i < 0 || j < 0 || t < 0 || t > i + j {
        return T::zero();
    }

    let p = a + b;
    let mu = a * b / p;
    if i == 0 && j == 0 {
        return (-mu * q * q).exp();
    }

    let half_p = T::one() / (T::from_f64(2.0) * p);
    let next = T::from_f64((t + 1) as f64);
    if j == 0 {
        half_p * hermite_expansion(i - 1, j, t - 1, q, a, b)
            - mu * q / a * hermite_expansion(i - 1, j, t, q, a, b)
            + next * hermite_expansion(i - 1, j, t + 1, q, a, b)
    } else {
        half_p * hermite_expansion(i, j - 1, t - 1, q, a, b)
            + mu * q / b * hermite_expansion(i, j - 1, t, q, a, b)
            + next * hermite_expansion(i, j - 1, t + 1, q, a, b)
    }
}

/// Hermite Coulomb integral `R_{tuv}^n`.
///
/// `d` is the separation between the Gaussian product center and the
/// Coulomb center, `f[n] = (-2p)^n F_n(p |d|²)`.
pub fn hermite_coulomb<T: Real>(t: i32, u: i32, v: i32, n: usize, d: &[T; 3], f: &[T]) -> T {
    if t < 0 || u < 0 || v < 0 {
        return T::zero();
    }
    if t == 0 && u == 0 && v == 0 {
        return f[n];
    }

    if t == 0 && u == 0 {
        let mut r = d[2] * hermite_coulomb(t, u, v - 1, n + 1, d, f);
        if v > 1 {
            r += T::from_f64((v - 1) as f64) * hermite_coulomb(t, u, v - 2, n + 1, d, f);
        }
        r
    } else if t == 0 {
        let mut r = d[1] * hermite_coulomb(t, u - 1, v, n + 1, d, f);
        if u > 1 {
            r += T::from_f64((u - 1) as f64) * hermite_coulomb(t, u - 2, v, n + 1, d, f);
        }
        r
    } else {
        let mut r = d[0] * hermite_coulomb(t - 1, u, v, n + 1, d, f);
        if t > 1 {
            r += T::from_f64((t - 1) as f64) * hermite_coulomb(t - 2, u, v, n + 1, d, f);
        }
        r
    }
}

fn boys_table<T: Real>(order: usize, p: T, x: T) -> Vec<T> {
    let m = -T::from_f64(2.0) * p;
    (0..=order).map(|n| m.powi(n as i32) * x.boys(n)).collect()
}

fn product_center<T: Real>(a: T, ra: &[T; 3], b: T, rb: &[T; 3]) -> [T; 3] {
    let p = a + b;
    [
        (a * ra[0] + b * rb[0]) / p,
        (a * ra[1] + b * rb[1]) / p,
        (a * ra[2] + b * rb[2]) / p,
    ]
}

fn norm2<T: Real>(d: &[T; 3]) -> T {
    d[0] * d[0] + d[1] * d[1] + d[2] * d[2]
}

/// Overlap of two primitive Cartesian Gaussians.
pub fn primitive_overlap<T: Real>(
    la: [i32; 3],
    lb: [i32; 3],
    a: T,
    b: T,
    ra: &[T; 3],
    rb: &[T; 3],
) -> T {
    let p = a + b;
    let mut s = T::one();
    for k in 0..3 {
        s *= hermite_expansion(la[k], lb[k], 0, ra[k] - rb[k], a, b);
    }
    let x = T::from_f64(PI) / p;
    s * x * x.sqrt()
}

/// Kinetic energy `<a| -∇²/2 |b>` of two primitives.
pub fn primitive_kinetic<T: Real>(
    la: [i32; 3],
    lb: [i32; 3],
    a: T,
    b: T,
    ra: &[T; 3],
    rb: &[T; 3],
) -> T {
    let l2 = lb[0] + lb[1] + lb[2];
    let mut value = b * T::from_f64((2 * l2 + 3) as f64) * primitive_overlap(la, lb, a, b, ra, rb);

    for k in 0..3 {
        let mut up = lb;
        up[k] += 2;
        value -= T::from_f64(2.0) * b * b * primitive_overlap(la, up, a, b, ra, rb);

        if lb[k] >= 2 {
            let mut down = lb;
            down[k] -= 2;
            let f = T::from_f64(0.5 * (lb[k] * (lb[k] - 1)) as f64);
            value -= f * primitive_overlap(la, down, a, b, ra, rb);
        }
    }
    value
}

/// Nuclear attraction `<a| 1/|r - C| |b>` of two primitives (unit charge).
pub fn primitive_attraction<T: Real>(
    la: [i32; 3],
    lb: [i32; 3],
    a: T,
    b: T,
    ra: &[T; 3],
    rb: &[T; 3],
    rc: &[T; 3],
) -> T {
    let p = a + b;
    let center = product_center(a, ra, b, rb);
    let d = [center[0] - rc[0], center[1] - rc[1], center[2] - rc[2]];
    let order = (la.iter().sum::<i32>() + lb.iter().sum::<i32>()) as usize;
    let f = boys_table(order, p, p * norm2(&d));

    let mut value = T::zero();
    for t in 0..=(la[0] + lb[0]) {
        let ex = hermite_expansion(la[0], lb[0], t, ra[0] - rb[0], a, b);
        for u in 0..=(la[1] + lb[1]) {
            let ey = hermite_expansion(la[1], lb[1], u, ra[1] - rb[1], a, b);
            for v in 0..=(la[2] + lb[2]) {
                let ez = hermite_expansion(la[2], lb[2], v, ra[2] - rb[2], a, b);
                value += ex * ey * ez * hermite_coulomb(t, u, v, 0, &d, &f);
            }
        }
    }
    T::from_f64(2.0 * PI) / p * value
}

fn expansion_table<T: Real>(
    la: [i32; 3],
    lb: [i32; 3],
    a: T,
    b: T,
    ra: &[T; 3],
    rb: &[T; 3],
) -> [Vec<T>; 3] {
    std::array::from_fn(|k| {
        (0..=(la[k] + lb[k]))
            .map(|t| hermite_expansion(la[k], lb[k], t, ra[k] - rb[k], a, b))
            .collect()
    })
}

/// Electron repulsion `(ab|cd)` of four primitives.
#[allow(clippy::too_many_arguments)]
pub fn primitive_repulsion<T: Real>(
    l: [[i32; 3]; 4],
    a: T,
    b: T,
    c: T,
    d: T,
    ra: &[T; 3],
    rb: &[T; 3],
    rc: &[T; 3],
    rd: &[T; 3],
) -> T {
    let p = a + b;
    let q = c + d;
    let alpha = p * q / (p + q);
    let pc = product_center(a, ra, b, rb);
    let qc = product_center(c, rc, d, rd);
    let sep = [pc[0] - qc[0], pc[1] - qc[1], pc[2] - qc[2]];

    let order = l.iter().flatten().sum::<i32>() as usize;
    let f = boys_table(order, alpha, alpha * norm2(&sep));

    let eab = expansion_table(l[0], l[1], a, b, ra, rb);
    let ecd = expansion_table(l[2], l[3], c, d, rc, rd);

    let mut value = T::zero();
    for (t, &ex) in eab[0].iter().enumerate() {
        for (u, &ey) in eab[1].iter().enumerate() {
            for (v, &ez) in eab[2].iter().enumerate() {
                let e1 = ex * ey * ez;
                for (tau, &fx) in ecd[0].iter().enumerate() {
                    for (nu, &fy) in ecd[1].iter().enumerate() {
                        for (phi, &fz) in ecd[2].iter().enumerate() {
                            let mut term = e1 * fx * fy * fz
                                * hermite_coulomb(
                                    (t + tau) as i32,
                                    (u + nu) as i32,
                                    (v + phi) as i32,
                                    0,
                                    &sep,
                                    &f,
                                );
                            if (tau + nu + phi) % 2 == 1 {
                                term = -term;
                            }
                            value += term;
                        }
                    }
                }
            }
        }
    }

    let pi = T::from_f64(PI);
    T::from_f64(2.0) * pi * pi * pi.sqrt() / (p * q * (p + q).sqrt()) * value
}

fn contract<T: Real>(a: &Shell<T>, b: &Shell<T>, prim: impl Fn(T, T) -> T) -> T {
    let mut value = T::zero();
    for (&ea, &ca) in a.alpha.iter().zip(&a.coeff) {
        for (&eb, &cb) in b.alpha.iter().zip(&b.coeff) {
            value += ca * cb * prim(ea, eb);
        }
    }
    value
}

pub fn overlap_integral<T: Real>(a: &Shell<T>, b: &Shell<T>) -> T {
    let (la, lb) = (components(a.l), components(b.l));
    contract(a, b, |ea, eb| primitive_overlap(la, lb, ea, eb, &a.center, &b.center))
}

pub fn kinetic_integral<T: Real>(a: &Shell<T>, b: &Shell<T>) -> T {
    let (la, lb) = (components(a.l), components(b.l));
    contract(a, b, |ea, eb| primitive_kinetic(la, lb, ea, eb, &a.center, &b.center))
}

/// Attraction of the pair `(a, b)` to a unit point charge at `rc`.
pub fn attraction_integral<T: Real>(a: &Shell<T>, b: &Shell<T>, rc: [T; 3]) -> T {
    let (la, lb) = (components(a.l), components(b.l));
    contract(a, b, |ea, eb| {
        primitive_attraction(la, lb, ea, eb, &a.center, &b.center, &rc)
    })
}

pub fn repulsion_integral<T: Real>(a: &Shell<T>, b: &Shell<T>, c: &Shell<T>, d: &Shell<T>) -> T {
    let l = [
        components(a.l),
        components(b.l),
        components(c.l),
        components(d.l),
    ];
    let mut value = T::zero();
    for (&ea, &ca) in a.alpha.iter().zip(&a.coeff) {
        for (&eb, &cb) in b.alpha.iter().zip(&b.coeff) {
            let cab = ca * cb;
            for (&ec, &cc) in c.alpha.iter().zip(&c.coeff) {
                for (&ed, &cd) in d.alpha.iter().zip(&d.coeff) {
                    value += cab * cc * cd
                        * primitive_repulsion(
                            l, ea, eb, ec, ed, &a.center, &b.center, &c.center, &d.center,
                        );
                }
            }
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const S: [i32; 3] = [0, 0, 0];

    #[test]
    fn test_s_overlap_closed_form() {
        let (a, b) = (0.8, 1.3);
        let ra = [0.0, 0.0, 0.0];
        let rb = [0.0, 0.5, 1.0];
        let p: f64 = a + b;
        let expected = (PI / p).powf(1.5) * (-a * b / p * 1.25).exp();
        assert_abs_diff_eq!(primitive_overlap(S, S, a, b, &ra, &rb), expected, epsilon = 1e-14);
    }

    #[test]
    fn test_s_kinetic_closed_form() {
        let (a, b) = (0.8, 1.3);
        let ra = [0.0, 0.0, 0.0];
        let rb = [0.2, 0.0, 0.7];
        let p: f64 = a + b;
        let mu = a * b / p;
        let r2 = 0.04 + 0.49;
        let s = primitive_overlap(S, S, a, b, &ra, &rb);
        let expected = mu * (3.0 - 2.0 * mu * r2) * s;
        assert_abs_diff_eq!(primitive_kinetic(S, S, a, b, &ra, &rb), expected, epsilon = 1e-13);
    }

    #[test]
    fn test_s_attraction_closed_form() {
        // 2π/p exp(-μ R²) F_0(p |P - C|²)
        let (a, b) = (0.9, 0.4);
        let ra = [0.0, 0.0, 0.0];
        let rb = [0.0, 0.0, 1.0];
        let rc = [0.5, 0.0, 0.0];
        let p: f64 = a + b;
        let pz = b / p;
        let t = p * (0.25 + pz * pz);
        let expected = 2.0 * PI / p * (-a * b / p).exp() * crate::dual::boys(0, t);
        assert_abs_diff_eq!(
            primitive_attraction(S, S, a, b, &ra, &rb, &rc),
            expected,
            epsilon = 1e-13
        );
    }

    #[test]
    fn test_s_repulsion_closed_form() {
        // Four s primitives on one center: 2π^{5/2} / (pq sqrt(p+q))
        let r = [0.0, 0.0, 0.0];
        let (a, b, c, d) = (0.5, 0.7, 1.1, 0.3);
        let p: f64 = a + b;
        let q: f64 = c + d;
        let expected = 2.0 * PI.powf(2.5) / (p * q * (p + q).sqrt());
        assert_abs_diff_eq!(
            primitive_repulsion([S; 4], a, b, c, d, &r, &r, &r, &r),
            expected,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_hermite_expansion_vanishes_outside_range() {
        assert_eq!(hermite_expansion(1, 0, 2, 0.3, 1.0, 2.0), 0.0);
        assert_eq!(hermite_expansion(0, 0, -1, 0.3, 1.0, 2.0), 0.0);
    }

    #[test]
    fn test_p_overlap_derivative_identity() {
        // <p_z(A)|s(B)> = (1/2a) d/dA_z <s(A)|s(B)>
        let (a, b) = (0.6, 1.1);
        let rb = [0.0, 0.0, 0.8];
        let h = 1e-6;
        let up = primitive_overlap(S, S, a, b, &[0.0, 0.0, h], &rb);
        let down = primitive_overlap(S, S, a, b, &[0.0, 0.0, -h], &rb);
        let fd = (up - down) / (2.0 * h) / (2.0 * a);
        let pz = primitive_overlap([0, 0, 1], S, a, b, &[0.0; 3], &rb);
        assert_abs_diff_eq!(pz, fd, epsilon = 1e-8);
    }
}
