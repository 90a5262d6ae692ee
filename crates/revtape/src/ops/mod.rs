//! Differentiable operations on [`Var`](crate::Var).
//!
//! Every operation follows the same recipe: compute the forward value and
//! the local partials from the operand values, then record one node
//! through [`make_node`](crate::make_node).
//!
//! ```text
//! arithmetic: + - * / % and negation, compound assignment, comparisons
//! functions:  exp, ln, sqrt, pow, trig, hyperbolic, rounding, fma, hypot
//! vector:     sum, dot_product, dot_self, log_sum_exp
//! ```

mod arithmetic;
mod functions;
mod vector;

pub use functions::{atan2, fma, fmod, hypot, pow};
pub use vector::{dot_product, dot_self, log_sum_exp, sum};
