//! Derivative functionals over plain `f64` points.
//!
//! Each functional lifts its point to fresh [`Var`](crate::Var)s inside a
//! nested scope, evaluates the user function, extracts the numbers it
//! needs and recovers the scope, so the caller's tape is left exactly as
//! it was, even when the user function panics.
//!
//! # Architecture
//!
//! ```text
//! value_and_gradient ── one reverse sweep
//! jacobian_of        ── one reverse sweep per output
//! hessian            ── central differences of value_and_gradient
//! hessian_vector_product, grad_tr_mat_times_hessian ── built on the above
//! ```
//!
//! Second- and third-order quantities use central finite differences of
//! exact reverse-mode gradients with a caller-chosen step, so their error
//! is O(step^2) plus rounding of order eps / step.
//!
//! # Example
//!
//! ```
//! use revtape::functor::hessian;
//!
//! // f(x, y) = x^2 y
//! let (fx, grad, h) = hessian(|v| v[0] * v[0] * v[1], &[2.0, 3.0], 1e-4).unwrap();
//! assert_eq!(fx, 12.0);
//! assert_eq!(grad, vec![12.0, 4.0]);
//! assert!((h[(0, 1)] - 4.0).abs() < 1e-6);
//! ```

mod gradient;
mod hessian;
mod jacobian;

pub use gradient::value_and_gradient;
pub use hessian::{DEFAULT_STEP, grad_tr_mat_times_hessian, hessian, hessian_vector_product};
pub use jacobian::jacobian_of;
