//! revtape - tape-based reverse-mode automatic differentiation
//!
//! Arithmetic on [`Var`] handles records a computation graph on a
//! thread-local tape as it executes. A single backward sweep then yields
//! the exact partial derivatives of a scalar output with respect to any
//! set of inputs.
//!
//! # Architecture
//!
//! ```text
//! Var arithmetic ──make_node──►  Tape (thread_local)
//!                                  │  chain / no-chain registries
//!                                  ▼
//!                                Node records ──live in──► Arena slabs
//!                                  │
//!                       grad: reverse walk of the chain registry
//! ```
//!
//! Node records are plain data in a bump-allocated arena, so discarding an
//! expression is a pointer reset: [`reset_tape`] keeps the arena's memory
//! for the next expression, and [`with_nested_scope`] rewinds to a
//! checkpoint.
//!
//! # Example
//!
//! ```
//! use revtape::{Var, gradient, reset_tape};
//!
//! let a = Var::new(0.8);
//! let b = Var::new(0.2);
//! let f = a.sin() + a * b;
//!
//! let g = gradient(f, &[a, b]);
//! assert!((g[0] - (0.8f64.cos() + 0.2)).abs() < 1e-12);
//! assert!((g[1] - 0.8).abs() < 1e-12);
//!
//! // a, b and f are invalid from here on
//! reset_tape();
//! ```
//!
//! # Features
//!
//! - `functor` (default): Jacobians and the derivative functionals in
//!   [`functor`], returning [`faer`] matrices.

pub mod check;
pub mod config;
mod context;
pub mod error;
#[cfg(feature = "functor")]
pub mod functor;
mod grad;
pub mod memory;
pub mod node;
pub mod ops;
pub mod tape;
mod var;

pub use config::TapeConfig;
pub use context::{
    free_tape, init_tape, recover_nested, reset_tape, start_nested, with_nested_scope, with_tape,
};
pub use error::AdError;
#[cfg(feature = "functor")]
pub use grad::jacobian;
pub use grad::{grad, gradient, set_zero_all_adjoints};
pub use node::NodeId;
pub use tape::{Checkpoint, Tape};
pub use var::{Operand, Var, make_node, try_make_node};
