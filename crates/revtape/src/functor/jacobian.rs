//! Jacobian of a vector function.

use faer::Mat;

use crate::context::with_nested_scope;
use crate::error::AdError;
use crate::grad::jacobian;
use crate::var::Var;

/// Evaluate `f` at `x` and its Jacobian there.
///
/// Row `i` of the matrix is the gradient of output `i`.
///
/// # Errors
/// Returns [`AdError::EmptyInput`] if `x` is empty.
pub fn jacobian_of<F>(f: F, x: &[f64]) -> Result<(Vec<f64>, Mat<f64>), AdError>
where
    F: FnOnce(&[Var]) -> Vec<Var>,
{
    if x.is_empty() {
        return Err(AdError::EmptyInput {
            function: "jacobian_of",
        });
    }
    Ok(with_nested_scope(|| {
        let inputs: Vec<Var> = x.iter().map(|&v| Var::new(v)).collect();
        let outputs = f(&inputs);
        let values = outputs.iter().map(Var::value).collect();
        (values, jacobian(&outputs, &inputs))
    }))
}
