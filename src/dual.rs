//! Scalar abstraction for the integral and SCF code.
//!
//! The Hartree-Fock routines are written once over [`Real`] and evaluated
//! either with `f64` or with a forward-mode [`Dual`] number, which carries a
//! single tangent alongside the primal value. Running the SCF with duals
//! yields the directional derivative of every intermediate (integrals,
//! orbitals, energy) with respect to the seeded input.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

/// Scalar type usable by the integral and SCF routines.
pub trait Real:
    Copy
    + Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
{
    /// Lifts a constant.
    fn from_f64(x: f64) -> Self;

    /// Primal value.
    fn re(self) -> f64;

    /// Size used for convergence tests. For duals this includes the tangent,
    /// so iterations only stop once derivatives have settled too.
    fn magnitude(self) -> f64;

    fn sqrt(self) -> Self;

    fn exp(self) -> Self;

    fn abs(self) -> Self;

    fn powi(self, n: i32) -> Self;

    /// Boys function `F_n(self)`.
    fn boys(self, n: usize) -> Self;

    fn zero() -> Self {
        Self::from_f64(0.0)
    }

    fn one() -> Self {
        Self::from_f64(1.0)
    }
}

impl Real for f64 {
    fn from_f64(x: f64) -> Self {
        x
    }

    fn re(self) -> f64 {
        self
    }

    fn magnitude(self) -> f64 {
        f64::abs(self)
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    fn exp(self) -> Self {
        f64::exp(self)
    }

    fn abs(self) -> Self {
        f64::abs(self)
    }

    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }

    fn boys(self, n: usize) -> Self {
        boys(n, self)
    }
}

/// Forward-mode dual number `re + eps·ε` with `ε² = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Dual {
    pub re: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(re: f64, eps: f64) -> Self {
        Self { re, eps }
    }

    /// A constant (zero tangent).
    pub fn constant(re: f64) -> Self {
        Self { re, eps: 0.0 }
    }

    /// An input seeded with unit tangent.
    pub fn variable(re: f64) -> Self {
        Self { re, eps: 1.0 }
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.re - rhs.re, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.re * rhs.re, self.re * rhs.eps + self.eps * rhs.re)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let re = self.re / rhs.re;
        Self::new(re, (self.eps - re * rhs.eps) / rhs.re)
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.re, -self.eps)
    }
}

impl AddAssign for Dual {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Dual {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for Dual {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl Real for Dual {
    fn from_f64(x: f64) -> Self {
        Self::constant(x)
    }

    fn re(self) -> f64 {
        self.re
    }

    fn magnitude(self) -> f64 {
        self.re.abs() + self.eps.abs()
    }

    fn sqrt(self) -> Self {
        let s = self.re.sqrt();
        Self::new(s, self.eps / (2.0 * s))
    }

    fn exp(self) -> Self {
        let e = self.re.exp();
        Self::new(e, e * self.eps)
    }

    fn abs(self) -> Self {
        if self.re < 0.0 {
            -self
        } else {
            self
        }
    }

    fn powi(self, n: i32) -> Self {
        if n == 0 {
            return Self::constant(1.0);
        }
        let p = self.re.powi(n - 1);
        Self::new(p * self.re, n as f64 * p * self.eps)
    }

    fn boys(self, n: usize) -> Self {
        // dF_n/dt = -F_{n+1}(t)
        Self::new(boys(n, self.re), -boys(n + 1, self.re) * self.eps)
    }
}

/// Boys function `F_n(t) = ∫₀¹ u^{2n} exp(-t u²) du`.
///
/// Uses the convergent series `e^{-t} Σ_k (2t)^k / ((2n+1)(2n+3)…(2n+2k+1))`
/// for moderate `t` and the asymptotic form above `t = 50`, where the
/// neglected terms are below `e^{-50}`.
pub fn boys(n: usize, t: f64) -> f64 {
    if t > 50.0 {
        let double_factorial: f64 = (1..2 * n).step_by(2).map(|k| k as f64).product();
        return double_factorial / 2f64.powi(n as i32 + 1)
            * (std::f64::consts::PI / t.powi(2 * n as i32 + 1)).sqrt();
    }

    let mut denominator = 2.0 * n as f64 + 1.0;
    let mut term = 1.0 / denominator;
    let mut sum = term;
    for _ in 0..2000 {
        denominator += 2.0;
        term *= 2.0 * t / denominator;
        sum += term;
        if term < 1e-17 * sum {
            break;
        }
    }
    (-t).exp() * sum
}
