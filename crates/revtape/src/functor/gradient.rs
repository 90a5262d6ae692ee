//! Value and gradient of a scalar function.

use crate::context::with_nested_scope;
use crate::error::AdError;
use crate::grad::gradient_lenient;
use crate::var::Var;

/// Evaluate `f` at `x` and its gradient there.
///
/// Arguments `f` ignores get a zero partial.
///
/// # Errors
/// Returns [`AdError::EmptyInput`] if `x` is empty.
///
/// # Example
///
/// ```
/// use revtape::functor::value_and_gradient;
///
/// let (fx, grad) = value_and_gradient(|v| v[0] * v[1] + v[0], &[2.0, 3.0]).unwrap();
/// assert_eq!(fx, 8.0);
/// assert_eq!(grad, vec![4.0, 2.0]);
/// ```
pub fn value_and_gradient<F>(f: F, x: &[f64]) -> Result<(f64, Vec<f64>), AdError>
where
    F: FnOnce(&[Var]) -> Var,
{
    if x.is_empty() {
        return Err(AdError::EmptyInput {
            function: "value_and_gradient",
        });
    }
    Ok(with_nested_scope(|| {
        let inputs: Vec<Var> = x.iter().map(|&v| Var::new(v)).collect();
        let fx = f(&inputs);
        let grad = gradient_lenient(fx, &inputs);
        (fx.value(), grad)
    }))
}
