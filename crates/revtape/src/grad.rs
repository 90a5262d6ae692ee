//! Backward pass driver.
//!
//! A sweep zeroes every adjoint, seeds the output with 1, and runs the
//! backward step of each chain-registry node from newest to oldest. Since
//! operands always precede the nodes that use them, a node's adjoint is
//! complete before its own step runs.

use crate::context::with_tape;
use crate::var::Var;

/// Run a backward sweep from `output`.
///
/// Afterwards [`Var::adjoint`] reads the partial derivative of `output`
/// with respect to any variable created before it.
pub fn grad(output: Var) {
    with_tape(|tape| {
        let id = output.resolve(tape);
        tape.grad(id);
    });
}

/// Partial derivatives of `output` with respect to each of `inputs`.
///
/// Repeated calls give identical results.
///
/// # Panics
/// In debug builds, panics if an input is stale or `output` does not
/// depend on it.
///
/// # Example
///
/// ```
/// use revtape::{Var, gradient};
///
/// let a = Var::new(0.8);
/// let b = Var::new(0.2);
/// let f = a.sin() + a * b;
/// let g = gradient(f, &[a, b]);
/// assert!((g[0] - (0.8f64.cos() + 0.2)).abs() < 1e-12);
/// assert_eq!(g[1], 0.8);
/// ```
pub fn gradient(output: Var, inputs: &[Var]) -> Vec<f64> {
    with_tape(|tape| {
        let out = output.resolve(tape);
        let ids: Vec<_> = inputs.iter().map(|x| x.resolve(tape)).collect();
        if cfg!(debug_assertions) {
            let reachable = tape.reachable_from(out);
            for id in &ids {
                assert!(
                    reachable[id.index()],
                    "gradient input {} is not reachable from output {}",
                    id.index(),
                    out.index()
                );
            }
        }
        tape.grad(out);
        ids.iter().map(|&id| tape.adjoint(id)).collect()
    })
}

/// Like [`gradient`], but inputs the output does not depend on simply get
/// a zero partial.
pub(crate) fn gradient_lenient(output: Var, inputs: &[Var]) -> Vec<f64> {
    with_tape(|tape| {
        let out = output.resolve(tape);
        tape.grad(out);
        inputs
            .iter()
            .map(|x| tape.adjoint(x.resolve(tape)))
            .collect()
    })
}

/// Reset every adjoint on this thread's tape to zero.
pub fn set_zero_all_adjoints() {
    with_tape(|tape| tape.set_zero_all_adjoints());
}

/// Jacobian of `dependents` with respect to `independents`.
///
/// Row `i` holds the gradient of `dependents[i]`, computed with one sweep
/// per row. Independents a dependent does not use get zero entries.
#[cfg(feature = "functor")]
pub fn jacobian(dependents: &[Var], independents: &[Var]) -> faer::Mat<f64> {
    let rows: Vec<Vec<f64>> = dependents
        .iter()
        .map(|&dep| gradient_lenient(dep, independents))
        .collect();
    faer::Mat::from_fn(dependents.len(), independents.len(), |i, j| rows[i][j])
}
