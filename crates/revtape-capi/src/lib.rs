//! C API for revtape
//!
//! This crate exposes the calling thread's tape to C and other languages
//! with a C FFI. Variables cross the boundary as [`rt_var`] handles, a
//! plain (index, stamp) pair; every call checks that the handles it gets
//! still name live nodes and reports [`RT_STALE_HANDLE`] otherwise.
//!
//! All extern "C" functions are inherently unsafe as they work with raw pointers
//! from foreign code. The `#[unsafe(no_mangle)]` attribute marks the entire
//! function signature as unsafe at the FFI boundary.

#![allow(clippy::not_unsafe_ptr_arg_deref)]

use libc::{c_double, c_int, size_t};
use revtape::{AdError, NodeId, Operand, Var, try_make_node, with_tape};
use std::panic::{AssertUnwindSafe, catch_unwind};

// Status codes
pub type StatusCode = c_int;

pub const RT_SUCCESS: StatusCode = 0;
pub const RT_INVALID_ARGUMENT: StatusCode = -1;
pub const RT_STALE_HANDLE: StatusCode = -2;
pub const RT_INTERNAL_ERROR: StatusCode = -3;
pub const RT_NESTED_SCOPE_ERROR: StatusCode = -4;

/// Handle to a variable on the calling thread's tape.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct rt_var {
    pub index: u32,
    pub stamp: u64,
}

impl rt_var {
    fn from_var(var: Var) -> Self {
        let (id, stamp) = var.raw_parts();
        Self {
            index: id.raw(),
            stamp,
        }
    }

    /// Resolve to a live [`Var`].
    fn checked(self) -> Result<Var, AdError> {
        let var = Var::from_raw(NodeId::from_raw(self.index), self.stamp);
        var.try_value()?;
        Ok(var)
    }
}

fn status_of(err: &AdError) -> StatusCode {
    match err {
        AdError::StaleHandle { .. } => RT_STALE_HANDLE,
        AdError::NestedScope { .. } => RT_NESTED_SCOPE_ERROR,
        _ => RT_INVALID_ARGUMENT,
    }
}

/// Run `f`, write its result to `out` and translate errors and panics
/// into status codes.
fn run_with_output<T>(out: *mut T, f: impl FnOnce() -> Result<T, AdError>) -> StatusCode {
    if out.is_null() {
        return RT_INVALID_ARGUMENT;
    }
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => {
            unsafe {
                *out = value;
            }
            RT_SUCCESS
        }
        Ok(Err(err)) => status_of(&err),
        Err(_) => RT_INTERNAL_ERROR,
    }
}

fn run(f: impl FnOnce() -> Result<(), AdError>) -> StatusCode {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => RT_SUCCESS,
        Ok(Err(err)) => status_of(&err),
        Err(_) => RT_INTERNAL_ERROR,
    }
}

fn no_open_scopes() -> Result<(), AdError> {
    let depth = with_tape(|tape| tape.nested_depth());
    if depth == 0 {
        Ok(())
    } else {
        Err(AdError::NestedScope {
            message: format!("{} nested scopes are still open", depth),
        })
    }
}

// ============================================================================
// Variable creation and access
// ============================================================================

/// Create an independent variable.
///
/// # Arguments
/// * `value` - Initial value
/// * `out` - Receives the new handle
///
/// # Returns
/// Status code
#[unsafe(no_mangle)]
pub extern "C" fn rt_var_new(value: c_double, out: *mut rt_var) -> StatusCode {
    run_with_output(out, || Ok(rt_var::from_var(Var::new(value))))
}

/// Get the value of a variable.
#[unsafe(no_mangle)]
pub extern "C" fn rt_value(var: rt_var, out: *mut c_double) -> StatusCode {
    run_with_output(out, || var.checked()?.try_value())
}

/// Get the adjoint left by the last call to [`rt_gradient`].
#[unsafe(no_mangle)]
pub extern "C" fn rt_adjoint(var: rt_var, out: *mut c_double) -> StatusCode {
    run_with_output(out, || var.checked()?.try_adjoint())
}

// ============================================================================
// Arithmetic
// ============================================================================

fn binary(a: rt_var, b: rt_var, out: *mut rt_var, op: fn(Var, Var) -> Var) -> StatusCode {
    run_with_output(out, || {
        let (a, b) = (a.checked()?, b.checked()?);
        Ok(rt_var::from_var(op(a, b)))
    })
}

/// `out = a + b`
#[unsafe(no_mangle)]
pub extern "C" fn rt_add(a: rt_var, b: rt_var, out: *mut rt_var) -> StatusCode {
    binary(a, b, out, |a, b| a + b)
}

/// `out = a - b`
#[unsafe(no_mangle)]
pub extern "C" fn rt_sub(a: rt_var, b: rt_var, out: *mut rt_var) -> StatusCode {
    binary(a, b, out, |a, b| a - b)
}

/// `out = a * b`
#[unsafe(no_mangle)]
pub extern "C" fn rt_mul(a: rt_var, b: rt_var, out: *mut rt_var) -> StatusCode {
    binary(a, b, out, |a, b| a * b)
}

/// `out = a / b`
#[unsafe(no_mangle)]
pub extern "C" fn rt_div(a: rt_var, b: rt_var, out: *mut rt_var) -> StatusCode {
    binary(a, b, out, |a, b| a / b)
}

/// Record a node from a value and the partials with respect to `n`
/// operands.
///
/// # Arguments
/// * `value` - Forward value of the new node
/// * `operands` - Array of `n` operand handles
/// * `partials` - Array of `n` partial derivatives
/// * `n` - Number of operands (may be 0)
/// * `out` - Receives the new handle
#[unsafe(no_mangle)]
pub extern "C" fn rt_make_node(
    value: c_double,
    operands: *const rt_var,
    partials: *const c_double,
    n: size_t,
    out: *mut rt_var,
) -> StatusCode {
    if n > 0 && (operands.is_null() || partials.is_null()) {
        return RT_INVALID_ARGUMENT;
    }
    run_with_output(out, || {
        let pairs: Vec<(Operand, f64)> = if n == 0 {
            Vec::new()
        } else {
            let handles = unsafe { std::slice::from_raw_parts(operands, n) };
            let partials = unsafe { std::slice::from_raw_parts(partials, n) };
            handles
                .iter()
                .zip(partials)
                .map(|(h, &d)| Ok((Operand::Var(h.checked()?), d)))
                .collect::<Result<_, AdError>>()?
        };
        Ok(rt_var::from_var(try_make_node(value, &pairs)?))
    })
}

// ============================================================================
// Gradients
// ============================================================================

/// Compute the partial derivatives of `output` with respect to `inputs`.
///
/// Inputs `output` does not depend on get zero. Adjoints of every earlier
/// variable can be read with [`rt_adjoint`] afterwards.
///
/// # Arguments
/// * `output` - Variable to differentiate
/// * `inputs` - Array of `n` input handles
/// * `n` - Number of inputs
/// * `out` - Array receiving `n` partial derivatives
#[unsafe(no_mangle)]
pub extern "C" fn rt_gradient(
    output: rt_var,
    inputs: *const rt_var,
    n: size_t,
    out: *mut c_double,
) -> StatusCode {
    if n > 0 && (inputs.is_null() || out.is_null()) {
        return RT_INVALID_ARGUMENT;
    }
    run(|| {
        let output = output.checked()?;
        let inputs: Vec<Var> = if n == 0 {
            Vec::new()
        } else {
            let handles = unsafe { std::slice::from_raw_parts(inputs, n) };
            handles
                .iter()
                .map(|h| h.checked())
                .collect::<Result<_, AdError>>()?
        };
        output.grad();
        for (i, input) in inputs.iter().enumerate() {
            let adjoint = input.try_adjoint()?;
            unsafe {
                *out.add(i) = adjoint;
            }
        }
        Ok(())
    })
}

// ============================================================================
// Tape lifecycle
// ============================================================================

/// Open a nested scope. Pair with [`rt_recover_nested`].
#[unsafe(no_mangle)]
pub extern "C" fn rt_start_nested() -> StatusCode {
    run(|| {
        revtape::start_nested();
        Ok(())
    })
}

/// Close the innermost nested scope, invalidating every handle created
/// inside it.
#[unsafe(no_mangle)]
pub extern "C" fn rt_recover_nested() -> StatusCode {
    run(|| with_tape(|tape| tape.recover_innermost()))
}

/// Discard every variable, keeping the tape's memory for reuse.
///
/// Fails with [`RT_NESTED_SCOPE_ERROR`] while a nested scope is open.
#[unsafe(no_mangle)]
pub extern "C" fn rt_reset_tape() -> StatusCode {
    run(|| {
        no_open_scopes()?;
        revtape::reset_tape();
        Ok(())
    })
}

/// Discard every variable and release the tape's memory.
///
/// Fails with [`RT_NESTED_SCOPE_ERROR`] while a nested scope is open.
#[unsafe(no_mangle)]
pub extern "C" fn rt_free_tape() -> StatusCode {
    run(|| {
        no_open_scopes()?;
        revtape::free_tape();
        Ok(())
    })
}

/// Number of nodes on the calling thread's tape.
#[unsafe(no_mangle)]
pub extern "C" fn rt_tape_len() -> size_t {
    catch_unwind(|| with_tape(|tape| tape.len())).unwrap_or(0)
}
