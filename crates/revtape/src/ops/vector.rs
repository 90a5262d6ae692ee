//! Reductions recorded as one node with many operands.
//!
//! A length-n reduction adds a single vector-shaped node rather than a
//! chain of n - 1 binary nodes.

use crate::error::AdError;
use crate::var::Var;

/// Sum of `xs`. The empty sum is a constant zero.
pub fn sum(xs: &[Var]) -> Var {
    match xs {
        [] => Var::constant(0.0),
        [x] => *x,
        _ => {
            let operands: Vec<(Var, f64)> = xs.iter().map(|&x| (x, 1.0)).collect();
            let value = xs.iter().map(Var::value).sum();
            Var::derived(value, &operands)
        }
    }
}

/// Inner product of variables with constant weights.
///
/// # Errors
/// Returns [`AdError::SizeMismatch`] if the slices differ in length.
pub fn dot_product(xs: &[Var], weights: &[f64]) -> Result<Var, AdError> {
    if xs.len() != weights.len() {
        return Err(AdError::SizeMismatch {
            expected: xs.len(),
            actual: weights.len(),
        });
    }
    let value = xs.iter().zip(weights).map(|(x, w)| x.value() * w).sum();
    let operands: Vec<(Var, f64)> = xs.iter().copied().zip(weights.iter().copied()).collect();
    Ok(Var::derived(value, &operands))
}

/// Sum of squares of `xs`.
pub fn dot_self(xs: &[Var]) -> Var {
    let values: Vec<f64> = xs.iter().map(Var::value).collect();
    let value = values.iter().map(|v| v * v).sum();
    let operands: Vec<(Var, f64)> = xs.iter().zip(&values).map(|(&x, v)| (x, 2.0 * v)).collect();
    Var::derived(value, &operands)
}

/// `ln(sum(exp(xs)))`, evaluated without overflow.
///
/// The partial with respect to each element is its softmax weight.
/// An empty slice gives negative infinity. With a positive infinite
/// element the result is infinite and the weight is split evenly among
/// the infinite elements.
pub fn log_sum_exp(xs: &[Var]) -> Var {
    let values: Vec<f64> = xs.iter().map(Var::value).collect();
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return Var::constant(f64::NEG_INFINITY);
    }
    if max == f64::INFINITY && !values.iter().any(|v| v.is_nan()) {
        let weight = 1.0 / values.iter().filter(|&&v| v == f64::INFINITY).count() as f64;
        let operands: Vec<(Var, f64)> = xs
            .iter()
            .zip(&values)
            .map(|(&x, &v)| (x, if v == f64::INFINITY { weight } else { 0.0 }))
            .collect();
        return Var::derived(f64::INFINITY, &operands);
    }
    let value = max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln();
    let operands: Vec<(Var, f64)> = xs
        .iter()
        .zip(&values)
        .map(|(&x, v)| (x, (v - value).exp()))
        .collect();
    Var::derived(value, &operands)
}
