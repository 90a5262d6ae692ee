//! Elementary functions on [`Var`].
//!
//! Method names follow `f64`. Functions with two arguments also come as
//! free functions accepting any mix of variables and constants.

use std::f64::consts::LN_10;

use crate::var::{Operand, Var, make_node};

impl Var {
    pub fn exp(self) -> Var {
        let v = self.value().exp();
        Var::derived(v, &[(self, v)])
    }

    /// Natural logarithm. Negative arguments give NaN.
    pub fn ln(self) -> Var {
        let a = self.value();
        Var::derived(a.ln(), &[(self, 1.0 / a)])
    }

    pub fn log10(self) -> Var {
        let a = self.value();
        Var::derived(a.log10(), &[(self, 1.0 / (LN_10 * a))])
    }

    pub fn sqrt(self) -> Var {
        let v = self.value().sqrt();
        Var::derived(v, &[(self, 0.5 / v)])
    }

    /// Raise to a constant power.
    ///
    /// The partial is zero where the base is zero.
    pub fn powf(self, exponent: f64) -> Var {
        if exponent == 0.5 {
            return self.sqrt();
        }
        if exponent == 1.0 {
            return self;
        }
        if exponent == 2.0 {
            return self.square();
        }
        let a = self.value();
        let v = a.powf(exponent);
        let da = if a == 0.0 { 0.0 } else { exponent * v / a };
        Var::derived(v, &[(self, da)])
    }

    pub fn sin(self) -> Var {
        let a = self.value();
        Var::derived(a.sin(), &[(self, a.cos())])
    }

    pub fn cos(self) -> Var {
        let a = self.value();
        Var::derived(a.cos(), &[(self, -a.sin())])
    }

    pub fn tan(self) -> Var {
        let v = self.value().tan();
        Var::derived(v, &[(self, 1.0 + v * v)])
    }

    pub fn asin(self) -> Var {
        let a = self.value();
        Var::derived(a.asin(), &[(self, 1.0 / (1.0 - a * a).sqrt())])
    }

    pub fn acos(self) -> Var {
        let a = self.value();
        Var::derived(a.acos(), &[(self, -1.0 / (1.0 - a * a).sqrt())])
    }

    pub fn atan(self) -> Var {
        let a = self.value();
        Var::derived(a.atan(), &[(self, 1.0 / (1.0 + a * a))])
    }

    /// Four-quadrant arctangent of `self / x`.
    pub fn atan2(self, x: Var) -> Var {
        atan2(self, x)
    }

    pub fn sinh(self) -> Var {
        let a = self.value();
        Var::derived(a.sinh(), &[(self, a.cosh())])
    }

    pub fn cosh(self) -> Var {
        let a = self.value();
        Var::derived(a.cosh(), &[(self, a.sinh())])
    }

    pub fn tanh(self) -> Var {
        let t = self.value().tanh();
        Var::derived(t, &[(self, 1.0 - t * t)])
    }

    /// Absolute value.
    ///
    /// At zero the result is a fresh constant, so no derivative flows back.
    pub fn abs(self) -> Var {
        let a = self.value();
        if a > 0.0 {
            self
        } else if a < 0.0 {
            -self
        } else if a == 0.0 {
            Var::constant(0.0)
        } else {
            Var::derived(f64::NAN, &[(self, f64::NAN)])
        }
    }

    /// Round down. The result is a constant with zero derivative.
    pub fn floor(self) -> Var {
        Var::constant(self.value().floor())
    }

    /// Round up. The result is a constant with zero derivative.
    pub fn ceil(self) -> Var {
        Var::constant(self.value().ceil())
    }

    pub fn square(self) -> Var {
        let a = self.value();
        Var::derived(a * a, &[(self, 2.0 * a)])
    }

    /// `ln(1 + self)`, accurate near zero.
    pub fn ln_1p(self) -> Var {
        let a = self.value();
        Var::derived(a.ln_1p(), &[(self, 1.0 / (1.0 + a))])
    }

    /// `exp(self) - 1`, accurate near zero.
    pub fn exp_m1(self) -> Var {
        let v = self.value().exp_m1();
        Var::derived(v, &[(self, v + 1.0)])
    }

    /// Fused `self * a + b`.
    pub fn mul_add(self, a: Var, b: Var) -> Var {
        fma(self, a, b)
    }

    pub fn hypot(self, other: Var) -> Var {
        hypot(self, other)
    }
}

/// `base` raised to `exponent`.
///
/// Partials are zero where the base is zero.
///
/// # Example
///
/// ```
/// use revtape::{Var, ops::pow};
///
/// let y = Var::new(3.0);
/// let z = pow(2.0, y);
/// assert_eq!(z.value(), 8.0);
/// assert!((z.gradient(&[y])[0] - 8.0 * 2f64.ln()).abs() < 1e-12);
/// ```
pub fn pow(base: impl Into<Operand>, exponent: impl Into<Operand>) -> Var {
    let (base, exponent) = (base.into(), exponent.into());
    if let (Operand::Var(b), Operand::Const(e)) = (base, exponent) {
        return b.powf(e);
    }
    let (a, b) = (base.value(), exponent.value());
    let v = a.powf(b);
    let (da, db) = if a == 0.0 {
        (0.0, 0.0)
    } else {
        (b * v / a, a.ln() * v)
    };
    make_node(v, &[(base, da), (exponent, db)])
}

/// Four-quadrant arctangent of `y / x`.
pub fn atan2(y: impl Into<Operand>, x: impl Into<Operand>) -> Var {
    let (y, x) = (y.into(), x.into());
    let (yv, xv) = (y.value(), x.value());
    let r2 = xv * xv + yv * yv;
    make_node(yv.atan2(xv), &[(y, xv / r2), (x, -yv / r2)])
}

/// Floating-point remainder of `a / b`, with the sign of `a`.
pub fn fmod(a: impl Into<Operand>, b: impl Into<Operand>) -> Var {
    let (a, b) = (a.into(), b.into());
    let (av, bv) = (a.value(), b.value());
    make_node(av % bv, &[(a, 1.0), (b, -(av / bv).trunc())])
}

/// `a * b + c` as one ternary node.
pub fn fma(a: impl Into<Operand>, b: impl Into<Operand>, c: impl Into<Operand>) -> Var {
    let (a, b, c) = (a.into(), b.into(), c.into());
    let (av, bv, cv) = (a.value(), b.value(), c.value());
    make_node(av.mul_add(bv, cv), &[(a, bv), (b, av), (c, 1.0)])
}

/// `sqrt(a^2 + b^2)` without undue overflow.
pub fn hypot(a: impl Into<Operand>, b: impl Into<Operand>) -> Var {
    let (a, b) = (a.into(), b.into());
    let (av, bv) = (a.value(), b.value());
    let h = av.hypot(bv);
    make_node(h, &[(a, av / h), (b, bv / h)])
}
