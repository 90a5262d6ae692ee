//! Arithmetic and comparison operators for [`Var`].
//!
//! Adding or subtracting `0.0`, and multiplying or dividing by `1.0`,
//! returns the operand itself without recording a node.

use std::cmp::Ordering;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, Sub, SubAssign};

use crate::ops::vector;
use crate::var::Var;

// a + b, d/da = 1, d/db = 1
impl Add for Var {
    type Output = Var;

    fn add(self, rhs: Var) -> Var {
        Var::derived(self.value() + rhs.value(), &[(self, 1.0), (rhs, 1.0)])
    }
}

impl Add<f64> for Var {
    type Output = Var;

    fn add(self, rhs: f64) -> Var {
        if rhs == 0.0 {
            return self;
        }
        Var::derived(self.value() + rhs, &[(self, 1.0)])
    }
}

impl Add<Var> for f64 {
    type Output = Var;

    fn add(self, rhs: Var) -> Var {
        rhs + self
    }
}

// a - b, d/da = 1, d/db = -1
impl Sub for Var {
    type Output = Var;

    fn sub(self, rhs: Var) -> Var {
        Var::derived(self.value() - rhs.value(), &[(self, 1.0), (rhs, -1.0)])
    }
}

impl Sub<f64> for Var {
    type Output = Var;

    fn sub(self, rhs: f64) -> Var {
        if rhs == 0.0 {
            return self;
        }
        Var::derived(self.value() - rhs, &[(self, 1.0)])
    }
}

impl Sub<Var> for f64 {
    type Output = Var;

    fn sub(self, rhs: Var) -> Var {
        Var::derived(self - rhs.value(), &[(rhs, -1.0)])
    }
}

// a * b, d/da = b, d/db = a
impl Mul for Var {
    type Output = Var;

    fn mul(self, rhs: Var) -> Var {
        let (a, b) = (self.value(), rhs.value());
        Var::derived(a * b, &[(self, b), (rhs, a)])
    }
}

impl Mul<f64> for Var {
    type Output = Var;

    fn mul(self, rhs: f64) -> Var {
        if rhs == 1.0 {
            return self;
        }
        Var::derived(self.value() * rhs, &[(self, rhs)])
    }
}

impl Mul<Var> for f64 {
    type Output = Var;

    fn mul(self, rhs: Var) -> Var {
        rhs * self
    }
}

// a / b, d/da = 1/b, d/db = -(a/b)/b
impl Div for Var {
    type Output = Var;

    fn div(self, rhs: Var) -> Var {
        let b = rhs.value();
        let value = self.value() / b;
        Var::derived(value, &[(self, 1.0 / b), (rhs, -value / b)])
    }
}

impl Div<f64> for Var {
    type Output = Var;

    fn div(self, rhs: f64) -> Var {
        if rhs == 1.0 {
            return self;
        }
        Var::derived(self.value() / rhs, &[(self, 1.0 / rhs)])
    }
}

impl Div<Var> for f64 {
    type Output = Var;

    fn div(self, rhs: Var) -> Var {
        let b = rhs.value();
        let value = self / b;
        Var::derived(value, &[(rhs, -value / b)])
    }
}

// fmod(a, b), d/da = 1, d/db = -trunc(a/b)
impl Rem for Var {
    type Output = Var;

    fn rem(self, rhs: Var) -> Var {
        let (a, b) = (self.value(), rhs.value());
        Var::derived(a % b, &[(self, 1.0), (rhs, -(a / b).trunc())])
    }
}

impl Rem<f64> for Var {
    type Output = Var;

    fn rem(self, rhs: f64) -> Var {
        Var::derived(self.value() % rhs, &[(self, 1.0)])
    }
}

impl Rem<Var> for f64 {
    type Output = Var;

    fn rem(self, rhs: Var) -> Var {
        let b = rhs.value();
        Var::derived(self % b, &[(rhs, -(self / b).trunc())])
    }
}

impl Neg for Var {
    type Output = Var;

    fn neg(self) -> Var {
        Var::derived(-self.value(), &[(self, -1.0)])
    }
}

// Compound assignment rebinds the handle to a new node.
impl AddAssign for Var {
    fn add_assign(&mut self, rhs: Var) {
        *self = *self + rhs;
    }
}

impl AddAssign<f64> for Var {
    fn add_assign(&mut self, rhs: f64) {
        *self = *self + rhs;
    }
}

impl SubAssign for Var {
    fn sub_assign(&mut self, rhs: Var) {
        *self = *self - rhs;
    }
}

impl SubAssign<f64> for Var {
    fn sub_assign(&mut self, rhs: f64) {
        *self = *self - rhs;
    }
}

impl MulAssign for Var {
    fn mul_assign(&mut self, rhs: Var) {
        *self = *self * rhs;
    }
}

impl MulAssign<f64> for Var {
    fn mul_assign(&mut self, rhs: f64) {
        *self = *self * rhs;
    }
}

impl DivAssign for Var {
    fn div_assign(&mut self, rhs: Var) {
        *self = *self / rhs;
    }
}

impl DivAssign<f64> for Var {
    fn div_assign(&mut self, rhs: f64) {
        *self = *self / rhs;
    }
}

// Comparisons look at values only.
impl PartialEq for Var {
    fn eq(&self, other: &Var) -> bool {
        self.value() == other.value()
    }
}

impl PartialEq<f64> for Var {
    fn eq(&self, other: &f64) -> bool {
        self.value() == *other
    }
}

impl PartialEq<Var> for f64 {
    fn eq(&self, other: &Var) -> bool {
        *self == other.value()
    }
}

impl PartialOrd for Var {
    fn partial_cmp(&self, other: &Var) -> Option<Ordering> {
        self.value().partial_cmp(&other.value())
    }
}

impl PartialOrd<f64> for Var {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.value().partial_cmp(other)
    }
}

impl PartialOrd<Var> for f64 {
    fn partial_cmp(&self, other: &Var) -> Option<Ordering> {
        self.partial_cmp(&other.value())
    }
}

/// Sums through a single vector-shaped node.
impl Sum for Var {
    fn sum<I: Iterator<Item = Var>>(iter: I) -> Var {
        let terms: Vec<Var> = iter.collect();
        vector::sum(&terms)
    }
}

impl<'a> Sum<&'a Var> for Var {
    fn sum<I: Iterator<Item = &'a Var>>(iter: I) -> Var {
        iter.copied().sum()
    }
}
