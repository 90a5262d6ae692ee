//! Handles to tape nodes.

use std::fmt;
use std::marker::PhantomData;

use smallvec::SmallVec;

use crate::context::with_tape;
use crate::error::AdError;
use crate::node::NodeId;
use crate::tape::Tape;

/// A differentiable scalar: a `Copy` handle to a node on this thread's tape.
///
/// Arithmetic on `Var`s records new nodes and returns new handles; existing
/// nodes are never modified, so compound assignment rebinds the handle.
/// A handle carries the node's liveness stamp, which debug builds check on
/// every access to catch use after [`reset_tape`](crate::reset_tape) or
/// after leaving a nested scope.
///
/// `Var` is neither `Send` nor `Sync`: it names a node on the tape of the
/// thread that created it.
///
/// # Example
///
/// ```
/// use revtape::Var;
///
/// let x = Var::new(2.0);
/// let f = x * x;
/// assert_eq!(f.value(), 4.0);
/// assert_eq!(f.gradient(&[x]), vec![4.0]);
/// ```
#[derive(Clone, Copy)]
pub struct Var {
    id: NodeId,
    stamp: u64,
    _not_send: PhantomData<*const ()>,
}

impl Var {
    /// Create an independent variable on this thread's tape.
    pub fn new(value: f64) -> Self {
        with_tape(|tape| {
            let id = tape.new_leaf(value);
            Self::wrap(tape, id)
        })
    }

    pub(crate) fn wrap(tape: &Tape, id: NodeId) -> Self {
        Self {
            id,
            stamp: tape.node(id).stamp(),
            _not_send: PhantomData,
        }
    }

    /// Rebuild a handle from the parts returned by [`raw_parts`](Var::raw_parts).
    ///
    /// The handle is not validated; use [`is_live`](Var::is_live) or the
    /// `try_*` accessors before trusting it.
    pub fn from_raw(id: NodeId, stamp: u64) -> Self {
        Self {
            id,
            stamp,
            _not_send: PhantomData,
        }
    }

    /// The node index and liveness stamp.
    pub fn raw_parts(&self) -> (NodeId, u64) {
        (self.id, self.stamp)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn resolve(&self, tape: &Tape) -> NodeId {
        debug_assert!(
            tape.is_live(self.id, self.stamp),
            "stale Var: node {} was reclaimed by a reset or a nested-scope recovery",
            self.id.index()
        );
        self.id
    }

    /// Forward value.
    pub fn value(&self) -> f64 {
        with_tape(|tape| tape.value(self.resolve(tape)))
    }

    /// Adjoint left by the last backward sweep.
    pub fn adjoint(&self) -> f64 {
        with_tape(|tape| tape.adjoint(self.resolve(tape)))
    }

    /// Check whether the node this handle names is still on the tape.
    pub fn is_live(&self) -> bool {
        with_tape(|tape| tape.is_live(self.id, self.stamp))
    }

    /// Checked [`value`](Var::value).
    ///
    /// # Errors
    /// Returns [`AdError::StaleHandle`] if the node was reclaimed.
    pub fn try_value(&self) -> Result<f64, AdError> {
        with_tape(|tape| {
            tape.check_live(self.id, self.stamp)?;
            Ok(tape.value(self.id))
        })
    }

    /// Checked [`adjoint`](Var::adjoint).
    ///
    /// # Errors
    /// Returns [`AdError::StaleHandle`] if the node was reclaimed.
    pub fn try_adjoint(&self) -> Result<f64, AdError> {
        with_tape(|tape| {
            tape.check_live(self.id, self.stamp)?;
            Ok(tape.adjoint(self.id))
        })
    }

    /// Run a backward sweep from this variable.
    ///
    /// Afterwards [`adjoint`](Var::adjoint) on any earlier variable reads
    /// the partial derivative of `self` with respect to it.
    pub fn grad(&self) {
        crate::grad::grad(*self);
    }

    /// Partial derivatives of `self` with respect to each of `inputs`.
    pub fn gradient(&self, inputs: &[Var]) -> Vec<f64> {
        crate::grad::gradient(*self, inputs)
    }

    pub fn is_nan(&self) -> bool {
        self.value().is_nan()
    }

    pub fn is_infinite(&self) -> bool {
        self.value().is_infinite()
    }

    pub fn is_finite(&self) -> bool {
        self.value().is_finite()
    }

    /// Record a node from tracked operands only.
    pub(crate) fn derived(value: f64, operands: &[(Var, f64)]) -> Self {
        with_tape(|tape| {
            let tracked: SmallVec<[(NodeId, f64); 3]> = operands
                .iter()
                .map(|&(v, d)| (v.resolve(tape), d))
                .collect();
            let id = tape.new_node(value, &tracked);
            Self::wrap(tape, id)
        })
    }

    /// Record a node with no operands.
    pub(crate) fn constant(value: f64) -> Self {
        Self::derived(value, &[])
    }
}

impl From<f64> for Var {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Var")
            .field("id", &self.id.index())
            .field("stamp", &self.stamp)
            .finish()
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// An argument of [`make_node`]: either a tracked variable or a constant.
#[derive(Debug, Clone, Copy)]
pub enum Operand {
    Var(Var),
    Const(f64),
}

impl Operand {
    pub fn value(&self) -> f64 {
        match self {
            Operand::Var(v) => v.value(),
            Operand::Const(c) => *c,
        }
    }
}

impl From<Var> for Operand {
    fn from(v: Var) -> Self {
        Operand::Var(v)
    }
}

impl From<f64> for Operand {
    fn from(c: f64) -> Self {
        Operand::Const(c)
    }
}

/// Record a node from its forward value and (operand, partial) pairs.
///
/// This is how new differentiable functions are defined: compute the value
/// and the local partial derivative with respect to each operand, then hand
/// them over. Constant operands are dropped. With no tracked operand the
/// result is a constant node that the backward sweep never visits.
///
/// # Example
///
/// ```
/// use revtape::{Operand, Var, make_node};
///
/// // cube(x) = x^3, d/dx = 3x^2
/// fn cube(x: Var) -> Var {
///     let v = x.value();
///     make_node(v * v * v, &[(Operand::Var(x), 3.0 * v * v)])
/// }
///
/// let x = Var::new(2.0);
/// let y = cube(x);
/// assert_eq!(y.value(), 8.0);
/// assert_eq!(y.gradient(&[x]), vec![12.0]);
/// ```
pub fn make_node(value: f64, operands: &[(Operand, f64)]) -> Var {
    with_tape(|tape| {
        let tracked: SmallVec<[(NodeId, f64); 3]> = operands
            .iter()
            .filter_map(|&(op, d)| match op {
                Operand::Var(v) => Some((v.resolve(tape), d)),
                Operand::Const(_) => None,
            })
            .collect();
        let id = tape.new_node(value, &tracked);
        Var::wrap(tape, id)
    })
}

/// Checked [`make_node`].
///
/// # Errors
/// Returns [`AdError::StaleHandle`] if any variable operand was reclaimed.
pub fn try_make_node(value: f64, operands: &[(Operand, f64)]) -> Result<Var, AdError> {
    with_tape(|tape| {
        let mut tracked: SmallVec<[(NodeId, f64); 3]> = SmallVec::new();
        for &(op, d) in operands {
            if let Operand::Var(v) = op {
                tape.check_live(v.id, v.stamp)?;
                tracked.push((v.id, d));
            }
        }
        let id = tape.new_node(value, &tracked);
        Ok(Var::wrap(tape, id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{reset_tape, with_nested_scope};

    #[test]
    fn test_new_var() {
        let x = Var::new(1.5);
        assert_eq!(x.value(), 1.5);
        assert_eq!(x.adjoint(), 0.0);
        assert!(x.is_live());
        assert!(x.is_finite());
    }

    #[test]
    fn test_make_node_drops_constants() {
        let x = Var::new(2.0);
        let y = make_node(6.0, &[(Operand::Var(x), 3.0), (Operand::Const(5.0), 99.0)]);
        with_tape(|tape| {
            assert_eq!(tape.node(y.id()).chain().operand_count(), 1);
        });
        assert_eq!(y.gradient(&[x]), vec![3.0]);
    }

    #[test]
    fn test_constant_only_node_goes_to_nochain() {
        let before = with_tape(|t| t.chain_stack().len());
        let c = make_node(4.0, &[(Operand::Const(2.0), 2.0)]);
        assert_eq!(c.value(), 4.0);
        assert_eq!(with_tape(|t| t.chain_stack().len()), before);
    }

    #[test]
    fn test_checked_access_after_reset() {
        let x = Var::new(1.0);
        reset_tape();
        assert!(!x.is_live());
        assert_eq!(x.try_value(), Err(AdError::StaleHandle { index: x.id().index() }));
        assert!(try_make_node(1.0, &[(Operand::Var(x), 1.0)]).is_err());
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "stale Var")]
    fn test_value_after_reset_panics() {
        let x = Var::new(1.0);
        reset_tape();
        // same slot, new stamp
        Var::new(2.0);
        x.value();
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "stale Var")]
    fn test_operator_on_recovered_var_panics() {
        let outer = Var::new(1.0);
        let inner = with_nested_scope(|| Var::new(2.0));
        Var::new(3.0);
        let _ = inner * outer;
    }

    #[test]
    fn test_raw_parts_round_trip() {
        let x = Var::new(3.0);
        let (id, stamp) = x.raw_parts();
        let y = Var::from_raw(id, stamp);
        assert_eq!(y.value(), 3.0);
        assert_eq!(format!("{}", y), "3");
    }
}
