//! Computation-graph nodes.
//!
//! A node is a forward value, an adjoint, and a [`Chain`] describing how
//! to push its adjoint back to its operands. The set of operand shapes is
//! closed, so the backward step is a `match` rather than a virtual call.

/// Index of a node in its tape's node table.
///
/// Indices follow creation order, so an operand always has a smaller
/// index than every node that consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> Self {
        let index = u32::try_from(index).expect("tape holds more than u32::MAX nodes");
        Self(index)
    }

    /// Rebuild an id from a raw index, e.g. one read back from a foreign
    /// handle. The id is checked against the tape when it is used.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the internal index.
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Get the raw index as stored in foreign handles.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Operand references and precomputed partial derivatives of a node.
///
/// Only tracked operands appear here; constant operands are dropped when
/// the node is built because they have no adjoint to update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Chain {
    /// No operands. Leaves and constant-only results.
    Leaf,
    /// One tracked operand.
    Unary { a: NodeId, da: f64 },
    /// Two tracked operands.
    Binary {
        a: NodeId,
        da: f64,
        b: NodeId,
        db: f64,
    },
    /// Three tracked operands.
    Ternary {
        a: NodeId,
        da: f64,
        b: NodeId,
        db: f64,
        c: NodeId,
        dc: f64,
    },
    /// Any number of operands, stored in the tape's operand pool.
    Vector { start: u32, len: u32 },
}

impl Chain {
    /// Number of tracked operands.
    pub fn operand_count(&self) -> usize {
        match self {
            Chain::Leaf => 0,
            Chain::Unary { .. } => 1,
            Chain::Binary { .. } => 2,
            Chain::Ternary { .. } => 3,
            Chain::Vector { len, .. } => *len as usize,
        }
    }

    /// Call `f` with each (operand, partial) pair.
    ///
    /// `pool` is the owning tape's operand pool, consulted only by the
    /// vector shape.
    pub fn for_each_operand(&self, pool: &[(NodeId, f64)], mut f: impl FnMut(NodeId, f64)) {
        match *self {
            Chain::Leaf => {}
            Chain::Unary { a, da } => f(a, da),
            Chain::Binary { a, da, b, db } => {
                f(a, da);
                f(b, db);
            }
            Chain::Ternary {
                a,
                da,
                b,
                db,
                c,
                dc,
            } => {
                f(a, da);
                f(b, db);
                f(c, dc);
            }
            Chain::Vector { start, len } => {
                let start = start as usize;
                for &(op, d) in &pool[start..start + len as usize] {
                    f(op, d);
                }
            }
        }
    }
}

/// A node record as stored in the arena.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    value: f64,
    adjoint: f64,
    stamp: u64,
    chain: Chain,
}

// Arena reclaim skips destructors, which is only sound for plain data.
const _: () = assert!(!std::mem::needs_drop::<Node>());

impl Node {
    pub(crate) fn new(value: f64, stamp: u64, chain: Chain) -> Self {
        Self {
            value,
            adjoint: 0.0,
            stamp,
            chain,
        }
    }

    /// Forward value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Accumulated partial derivative of the seeded output.
    pub fn adjoint(&self) -> f64 {
        self.adjoint
    }

    /// Liveness stamp; handles carry a copy to detect reuse of a slot.
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub(crate) fn set_adjoint(&mut self, adjoint: f64) {
        self.adjoint = adjoint;
    }

    pub(crate) fn add_adjoint(&mut self, delta: f64) {
        self.adjoint += delta;
    }
}
