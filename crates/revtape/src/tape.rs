//! The tape: creation-ordered registries of computation-graph nodes.

use std::fmt;
use std::ptr::NonNull;

use log::trace;

use crate::config::TapeConfig;
use crate::error::AdError;
use crate::memory::{Arena, ArenaMark};
use crate::node::{Chain, Node, NodeId};

/// Saved tape position for a nested scope.
///
/// Returned by [`Tape::start_nested`] and consumed by
/// [`Tape::recover_nested`], which must be called in LIFO order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    depth: usize,
    nodes: usize,
    chain: usize,
    nochain: usize,
    operands: usize,
    arena: ArenaMark,
}

impl Checkpoint {
    /// Number of scopes that were open when this one started.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of nodes on the tape when this scope started.
    pub fn tape_len(&self) -> usize {
        self.nodes
    }

    /// Arena position when this scope started.
    pub fn arena_mark(&self) -> ArenaMark {
        self.arena
    }
}

/// Append-only record of every node created since the last reset.
///
/// Node records live in the tape's [`Arena`] and are addressed by
/// [`NodeId`], their position in creation order. Two registries partition
/// them: the chain registry holds nodes whose backward step does work, and
/// the no-chain registry holds leaves and constant-only results, which
/// only need their adjoint cleared between sweeps.
///
/// Every operand of a node has a smaller [`NodeId`] than the node itself,
/// so walking the chain registry from newest to oldest visits each node
/// after all of its consumers. [`grad`](Tape::grad) relies on this.
///
/// # Example
///
/// ```
/// use revtape::Tape;
///
/// let mut tape = Tape::new();
/// let x = tape.new_leaf(3.0);
/// let y = tape.new_leaf(5.0);
/// // z = x * y, dz/dx = y, dz/dy = x
/// let z = tape.new_node(15.0, &[(x, 5.0), (y, 3.0)]);
/// tape.grad(z);
/// assert_eq!(tape.adjoint(x), 5.0);
/// assert_eq!(tape.adjoint(y), 3.0);
/// ```
pub struct Tape {
    arena: Arena,
    nodes: Vec<NonNull<Node>>,
    chain_stack: Vec<NodeId>,
    nochain_stack: Vec<NodeId>,
    operand_pool: Vec<(NodeId, f64)>,
    nested: Vec<Checkpoint>,
    next_stamp: u64,
}

impl Tape {
    /// Create an empty tape with default settings.
    pub fn new() -> Self {
        Self::with_config(&TapeConfig::default())
    }

    /// Create an empty tape using `config`.
    pub fn with_config(config: &TapeConfig) -> Self {
        Self {
            arena: Arena::with_config(config),
            nodes: Vec::with_capacity(config.capacity()),
            chain_stack: Vec::with_capacity(config.capacity()),
            nochain_stack: Vec::new(),
            operand_pool: Vec::new(),
            nested: Vec::new(),
            next_stamp: 0,
        }
    }

    /// Continue the stamp sequence of a tape this one replaces, so handles
    /// into the old tape are never mistaken for live ones.
    pub(crate) fn continue_stamps_from(&mut self, previous: &Tape) {
        self.next_stamp = previous.next_stamp;
    }

    /// Number of nodes on the tape.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the tape is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes with a backward step, in creation order.
    pub fn chain_stack(&self) -> &[NodeId] {
        &self.chain_stack
    }

    /// Nodes without a backward step, in creation order.
    pub fn nochain_stack(&self) -> &[NodeId] {
        &self.nochain_stack
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Number of nested scopes currently open.
    pub fn nested_depth(&self) -> usize {
        self.nested.len()
    }

    fn alloc_node(&mut self, value: f64, chain: Chain) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        let ptr = self.arena.alloc_value(Node::new(value, stamp, chain));
        self.nodes.push(ptr);
        id
    }

    /// Append a node with a backward step to the chain registry.
    ///
    /// # Panics
    /// Panics if an operand is not already on the tape, which would break
    /// the creation-order invariant.
    pub fn push(&mut self, value: f64, chain: Chain) -> NodeId {
        let len = self.nodes.len();
        if let Chain::Vector { start, len: n } = chain {
            assert!(
                start as usize + n as usize <= self.operand_pool.len(),
                "vector operands {}..{} are not in the operand pool",
                start,
                start + n
            );
        }
        chain.for_each_operand(&self.operand_pool, |op, _| {
            assert!(
                op.index() < len,
                "operand {} does not precede the new node {}",
                op.index(),
                len
            );
        });
        let id = self.alloc_node(value, chain);
        self.chain_stack.push(id);
        id
    }

    /// Append a node that never needs its backward step run.
    pub fn push_nochain(&mut self, value: f64) -> NodeId {
        let id = self.alloc_node(value, Chain::Leaf);
        self.nochain_stack.push(id);
        id
    }

    /// Create an independent variable.
    pub fn new_leaf(&mut self, value: f64) -> NodeId {
        self.push_nochain(value)
    }

    /// Create a node from its value and (operand, partial) pairs.
    ///
    /// The node shape follows the operand count. Without operands the node
    /// goes to the no-chain registry. A NaN value turns every partial into
    /// NaN so that out-of-domain results also poison the gradient.
    pub fn new_node(&mut self, value: f64, operands: &[(NodeId, f64)]) -> NodeId {
        let poison = |d: f64| if value.is_nan() { f64::NAN } else { d };
        let chain = match *operands {
            [] => return self.push_nochain(value),
            [(a, da)] => Chain::Unary { a, da: poison(da) },
            [(a, da), (b, db)] => Chain::Binary {
                a,
                da: poison(da),
                b,
                db: poison(db),
            },
            [(a, da), (b, db), (c, dc)] => Chain::Ternary {
                a,
                da: poison(da),
                b,
                db: poison(db),
                c,
                dc: poison(dc),
            },
            _ => {
                let start = self.operand_pool.len();
                self.operand_pool
                    .extend(operands.iter().map(|&(id, d)| (id, poison(d))));
                Chain::Vector {
                    start: u32::try_from(start).expect("operand pool exceeds u32::MAX"),
                    len: u32::try_from(operands.len()).expect("too many operands"),
                }
            }
        };
        self.push(value, chain)
    }

    /// Get a node record.
    ///
    /// # Panics
    /// Panics if `id` is not on the tape.
    pub fn node(&self, id: NodeId) -> &Node {
        let ptr = self.nodes[id.index()];
        // SAFETY: `nodes` is truncated whenever the arena is rewound or
        // recovered, so every pointer it holds refers to an initialised
        // node in live arena memory owned by `self`.
        unsafe { ptr.as_ref() }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        let mut ptr = self.nodes[id.index()];
        // SAFETY: as in `node`; `&mut self` guarantees exclusive access and
        // every node occupies its own allocation.
        unsafe { ptr.as_mut() }
    }

    pub fn value(&self, id: NodeId) -> f64 {
        self.node(id).value()
    }

    pub fn adjoint(&self, id: NodeId) -> f64 {
        self.node(id).adjoint()
    }

    /// Add `delta` to a node's adjoint.
    pub fn add_adjoint(&mut self, id: NodeId, delta: f64) {
        self.node_mut(id).add_adjoint(delta);
    }

    /// Check whether a handle's (id, stamp) pair still names a live node.
    pub fn is_live(&self, id: NodeId, stamp: u64) -> bool {
        id.index() < self.nodes.len() && self.node(id).stamp() == stamp
    }

    /// Like [`is_live`](Tape::is_live) but reports an error.
    ///
    /// # Errors
    /// Returns [`AdError::StaleHandle`] if the node was reclaimed.
    pub fn check_live(&self, id: NodeId, stamp: u64) -> Result<(), AdError> {
        if self.is_live(id, stamp) {
            Ok(())
        } else {
            Err(AdError::StaleHandle { index: id.index() })
        }
    }

    /// Run one node's backward step: push its adjoint, scaled by each
    /// precomputed partial, into its operands.
    pub fn backward_step(&mut self, id: NodeId) {
        let node = *self.node(id);
        let adj = node.adjoint();
        match *node.chain() {
            Chain::Leaf => {}
            Chain::Unary { a, da } => self.add_adjoint(a, adj * da),
            Chain::Binary { a, da, b, db } => {
                self.add_adjoint(a, adj * da);
                self.add_adjoint(b, adj * db);
            }
            Chain::Ternary {
                a,
                da,
                b,
                db,
                c,
                dc,
            } => {
                self.add_adjoint(a, adj * da);
                self.add_adjoint(b, adj * db);
                self.add_adjoint(c, adj * dc);
            }
            Chain::Vector { start, len } => {
                let start = start as usize;
                for k in start..start + len as usize {
                    let (op, d) = self.operand_pool[k];
                    self.add_adjoint(op, adj * d);
                }
            }
        }
    }

    /// Reset every adjoint in both registries to zero.
    pub fn set_zero_all_adjoints(&mut self) {
        for i in 0..self.chain_stack.len() {
            let id = self.chain_stack[i];
            self.node_mut(id).set_adjoint(0.0);
        }
        for i in 0..self.nochain_stack.len() {
            let id = self.nochain_stack[i];
            self.node_mut(id).set_adjoint(0.0);
        }
    }

    /// Set a node's adjoint to one, making it the differentiated output.
    pub fn seed(&mut self, output: NodeId) {
        self.node_mut(output).set_adjoint(1.0);
    }

    /// Number of chain-registry entries that could contribute to `output`.
    fn chain_end(&self, output: NodeId) -> usize {
        self.chain_stack.partition_point(|&id| id <= output)
    }

    /// Propagate derivatives of `output` to every node on the tape.
    ///
    /// Zeroes all adjoints, seeds `output`, then runs backward steps in
    /// reverse creation order. Nodes newer than `output` cannot contribute
    /// to it and are skipped. Calling this twice gives identical adjoints.
    pub fn grad(&mut self, output: NodeId) {
        self.set_zero_all_adjoints();
        self.seed(output);
        for i in (0..self.chain_end(output)).rev() {
            let id = self.chain_stack[i];
            self.backward_step(id);
        }
    }

    /// Mark every node `output` depends on, `output` included.
    pub fn reachable_from(&self, output: NodeId) -> Vec<bool> {
        let mut reachable = vec![false; self.nodes.len()];
        reachable[output.index()] = true;
        for &id in self.chain_stack[..self.chain_end(output)].iter().rev() {
            if reachable[id.index()] {
                self.node(id)
                    .chain()
                    .for_each_operand(&self.operand_pool, |op, _| reachable[op.index()] = true);
            }
        }
        reachable
    }

    /// Open a nested scope.
    pub fn start_nested(&mut self) -> Checkpoint {
        let checkpoint = Checkpoint {
            depth: self.nested.len(),
            nodes: self.nodes.len(),
            chain: self.chain_stack.len(),
            nochain: self.nochain_stack.len(),
            operands: self.operand_pool.len(),
            arena: self.arena.mark(),
        };
        trace!(
            "tape: entering nested scope {} at {} nodes",
            checkpoint.depth, checkpoint.nodes
        );
        self.nested.push(checkpoint);
        checkpoint
    }

    /// Close the innermost nested scope, reclaiming everything it created.
    ///
    /// # Panics
    /// Panics if `checkpoint` is not the innermost open scope.
    pub fn recover_nested(&mut self, checkpoint: Checkpoint) {
        let innermost = self.nested.last().copied();
        assert!(
            innermost == Some(checkpoint),
            "recover_nested out of LIFO order: expected scope {:?}, got depth {}",
            innermost.map(|c| c.depth),
            checkpoint.depth
        );
        self.nested.pop();
        self.truncate_to(&checkpoint);
    }

    /// Close the innermost nested scope, whatever it is.
    ///
    /// # Errors
    /// Returns [`AdError::NestedScope`] if no scope is open.
    pub fn recover_innermost(&mut self) -> Result<(), AdError> {
        let checkpoint = self.nested.pop().ok_or_else(|| AdError::NestedScope {
            message: "no nested scope is open".to_string(),
        })?;
        self.truncate_to(&checkpoint);
        Ok(())
    }

    /// Close `checkpoint` and every scope opened inside it.
    ///
    /// Used while unwinding, when inner scopes may have been abandoned.
    pub(crate) fn recover_nested_through(&mut self, checkpoint: Checkpoint) {
        if checkpoint.depth >= self.nested.len() || self.nested[checkpoint.depth] != checkpoint {
            return;
        }
        self.nested.truncate(checkpoint.depth);
        self.truncate_to(&checkpoint);
    }

    fn truncate_to(&mut self, checkpoint: &Checkpoint) {
        trace!(
            "tape: leaving nested scope {}, dropping {} nodes",
            checkpoint.depth,
            self.nodes.len() - checkpoint.nodes
        );
        self.nodes.truncate(checkpoint.nodes);
        self.chain_stack.truncate(checkpoint.chain);
        self.nochain_stack.truncate(checkpoint.nochain);
        self.operand_pool.truncate(checkpoint.operands);
        self.arena.rewind(checkpoint.arena);
    }

    /// Discard every node and rewind the arena, keeping its slabs.
    ///
    /// # Panics
    /// Panics if a nested scope is still open.
    pub fn reset(&mut self) {
        assert!(
            self.nested.is_empty(),
            "reset called with {} nested scopes open",
            self.nested.len()
        );
        trace!("tape: reset after {} nodes", self.nodes.len());
        self.nodes.clear();
        self.chain_stack.clear();
        self.nochain_stack.clear();
        self.operand_pool.clear();
        self.arena.recover_all();
    }

    /// Like [`reset`](Tape::reset), and also return all memory to the system.
    pub fn free(&mut self) {
        self.reset();
        self.arena.free_all();
        self.nodes = Vec::new();
        self.chain_stack = Vec::new();
        self.nochain_stack = Vec::new();
        self.operand_pool = Vec::new();
    }
}

impl Default for Tape {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Tape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tape")
            .field("num_nodes", &self.nodes.len())
            .field("chain", &self.chain_stack.len())
            .field("nochain", &self.nochain_stack.len())
            .field("nested_depth", &self.nested.len())
            .field("arena_bytes", &self.arena.bytes_in_use())
            .finish()
    }
}

/// Dump of every node: index, value, adjoint and operand count.
impl fmt::Display for Tape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "STACK, size={}", self.nodes.len())?;
        for i in 0..self.nodes.len() {
            let node = self.node(NodeId::from_index(i));
            writeln!(
                f,
                "{}  {} : {}  ({} operands)",
                i,
                node.value(),
                node.adjoint(),
                node.chain().operand_count()
            )?;
        }
        Ok(())
    }
}
