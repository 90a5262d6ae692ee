//! Argument validation helpers.
//!
//! Each check names the calling function and the argument so the error
//! message points at the offending call. They accept plain numbers and
//! [`Var`]s alike.

use crate::error::AdError;
use crate::var::Var;

/// A quantity with a forward value.
pub trait Value {
    fn value(&self) -> f64;
}

impl Value for f64 {
    fn value(&self) -> f64 {
        *self
    }
}

impl Value for Var {
    fn value(&self) -> f64 {
        Var::value(self)
    }
}

fn require<T: Value>(
    function: &'static str,
    name: &'static str,
    x: &T,
    requirement: &'static str,
    ok: impl FnOnce(f64) -> bool,
) -> Result<(), AdError> {
    let value = x.value();
    if ok(value) {
        Ok(())
    } else {
        Err(AdError::Domain {
            function,
            name,
            value,
            requirement,
        })
    }
}

/// Fail unless `x` is neither infinite nor NaN.
pub fn check_finite<T: Value>(
    function: &'static str,
    name: &'static str,
    x: &T,
) -> Result<(), AdError> {
    require(function, name, x, "finite", f64::is_finite)
}

pub fn check_not_nan<T: Value>(
    function: &'static str,
    name: &'static str,
    x: &T,
) -> Result<(), AdError> {
    require(function, name, x, "not nan", |v| !v.is_nan())
}

/// Fail unless `x > 0`. NaN fails.
pub fn check_positive<T: Value>(
    function: &'static str,
    name: &'static str,
    x: &T,
) -> Result<(), AdError> {
    require(function, name, x, "positive", |v| v > 0.0)
}

/// Fail unless `x >= 0`. NaN fails.
pub fn check_nonnegative<T: Value>(
    function: &'static str,
    name: &'static str,
    x: &T,
) -> Result<(), AdError> {
    require(function, name, x, "nonnegative", |v| v >= 0.0)
}

pub fn check_size_match(expected: usize, actual: usize) -> Result<(), AdError> {
    if expected == actual {
        Ok(())
    } else {
        Err(AdError::SizeMismatch { expected, actual })
    }
}
