//! Memory management for tape nodes.
//!
//! Nodes are bump-allocated from an [`Arena`] and never freed
//! individually. The whole arena is recovered at once between
//! expressions, or rewound to an [`ArenaMark`] when a nested scope ends.

mod arena;

pub use arena::{Arena, ArenaMark};
