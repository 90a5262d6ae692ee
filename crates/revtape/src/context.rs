//! Thread-local tape context.
//!
//! Each thread owns one [`Tape`]. [`Var`](crate::Var) handles and the
//! free functions in this crate read and write it implicitly, so
//! expressions can be written with ordinary operators.

use std::cell::RefCell;

use log::debug;

use crate::config::TapeConfig;
use crate::tape::{Checkpoint, Tape};

thread_local! {
    static TAPE: RefCell<Tape> = RefCell::new(Tape::new());
}

/// Run `f` with mutable access to the current thread's tape.
///
/// # Panics
/// Panics if called re-entrantly from inside another `with_tape` closure.
pub fn with_tape<R>(f: impl FnOnce(&mut Tape) -> R) -> R {
    TAPE.with(|tape| f(&mut tape.borrow_mut()))
}

/// Replace this thread's tape with a fresh one built from `config`.
///
/// Handles into the old tape stay detectably stale.
///
/// # Panics
/// Panics if a nested scope is open.
pub fn init_tape(config: &TapeConfig) {
    with_tape(|tape| {
        assert!(
            tape.nested_depth() == 0,
            "init_tape called with {} nested scopes open",
            tape.nested_depth()
        );
        let mut fresh = Tape::with_config(config);
        fresh.continue_stamps_from(tape);
        debug!("tape: reinitialised with {:?}", config);
        *tape = fresh;
    });
}

/// Discard every node on this thread's tape, keeping its memory for reuse.
///
/// Every existing [`Var`](crate::Var) becomes invalid.
///
/// # Panics
/// Panics if a nested scope is open.
pub fn reset_tape() {
    with_tape(Tape::reset);
}

/// Discard every node and return all tape memory to the system.
///
/// # Panics
/// Panics if a nested scope is open.
pub fn free_tape() {
    with_tape(Tape::free);
}

/// Open a nested scope on this thread's tape.
///
/// Prefer [`with_nested_scope`], which closes the scope even on panic.
pub fn start_nested() -> Checkpoint {
    with_tape(Tape::start_nested)
}

/// Close the nested scope opened by `checkpoint`.
///
/// # Panics
/// Panics if `checkpoint` is not the innermost open scope.
pub fn recover_nested(checkpoint: Checkpoint) {
    with_tape(|tape| tape.recover_nested(checkpoint));
}

struct NestedGuard {
    checkpoint: Checkpoint,
}

impl Drop for NestedGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            with_tape(|tape| tape.recover_nested_through(self.checkpoint));
        } else {
            with_tape(|tape| tape.recover_nested(self.checkpoint));
        }
    }
}

/// Run `f` inside a nested scope.
///
/// Nodes created by `f` are reclaimed when it returns, so `f` must not
/// return [`Var`](crate::Var)s created inside it; extract their values
/// and adjoints instead.
///
/// # Example
///
/// ```
/// use revtape::{Var, with_nested_scope, with_tape};
///
/// let before = with_tape(|t| t.len());
/// let dy = with_nested_scope(|| {
///     let x = Var::new(3.0);
///     let y = x * x;
///     y.gradient(&[x])[0]
/// });
/// assert_eq!(dy, 6.0);
/// assert_eq!(with_tape(|t| t.len()), before);
/// ```
pub fn with_nested_scope<R>(f: impl FnOnce() -> R) -> R {
    let _guard = NestedGuard {
        checkpoint: start_nested(),
    };
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_scope_restores_length() {
        let before = with_tape(|t| {
            t.new_leaf(1.0);
            t.len()
        });
        with_nested_scope(|| {
            with_tape(|t| {
                let x = t.new_leaf(2.0);
                t.new_node(4.0, &[(x, 2.0)]);
            });
        });
        assert_eq!(with_tape(|t| t.len()), before);
    }

    #[test]
    fn test_panicking_scope_is_recovered() {
        let before = with_tape(|t| t.len());
        let result = std::panic::catch_unwind(|| {
            with_nested_scope(|| {
                with_tape(|t| t.new_leaf(1.0));
                // leave an inner scope open
                start_nested();
                panic!("boom");
            })
        });
        assert!(result.is_err());
        with_tape(|t| {
            assert_eq!(t.len(), before);
            assert_eq!(t.nested_depth(), 0);
        });
    }

    #[test]
    fn test_init_tape_keeps_handles_stale() {
        let (id, stamp) = with_tape(|t| {
            let id = t.new_leaf(1.0);
            (id, t.node(id).stamp())
        });
        init_tape(&TapeConfig::default().initial_capacity(16));
        with_tape(|t| {
            assert!(t.is_empty());
            t.new_leaf(1.0);
            assert!(!t.is_live(id, stamp));
        });
    }
}
