//! Differentiation traces and computation-graph nodes.
//!
//! Every `grad`/`jacobian` call opens a new trace. Values produced while a
//! trace is open are boxed with that trace's id, so nested differentiation
//! stacks one box layer per order. Trace ids increase monotonically, which
//! makes the newest (innermost) trace the one with the largest id.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::Result;

use super::value::Value;

/// Identifies one differentiation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TraceId(u64);

impl TraceId {
    pub fn index(&self) -> u64 {
        self.0
    }
}

thread_local! {
    static NEXT_TRACE: Cell<u64> = const { Cell::new(0) };
    static NEXT_NODE: Cell<u64> = const { Cell::new(0) };
    static ACTIVE: RefCell<Vec<TraceId>> = const { RefCell::new(Vec::new()) };
}

/// Whether the trace is still being recorded (its backward pass has not
/// started yet).
pub fn is_active(trace: TraceId) -> bool {
    ACTIVE.with(|active| active.borrow().contains(&trace))
}

/// Open trace; closes itself when dropped.
pub struct TraceGuard {
    id: TraceId,
}

impl TraceGuard {
    pub fn open() -> Self {
        let id = NEXT_TRACE.with(|next| {
            let id = next.get();
            next.set(id + 1);
            TraceId(id)
        });
        ACTIVE.with(|active| active.borrow_mut().push(id));
        Self { id }
    }

    pub fn id(&self) -> TraceId {
        self.id
    }
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.borrow_mut().retain(|&t| t != self.id));
    }
}

/// Maps the cotangent of a node's output to the cotangent of one input.
pub type Vjp = Rc<dyn Fn(&Value) -> Result<Value>>;

/// A recorded operation. Parents are the boxed inputs of the same trace
/// together with the VJP that carries cotangents back to them.
pub struct Node {
    id: u64,
    pub(crate) parents: Vec<(Rc<Node>, Vjp)>,
}

impl Node {
    pub(crate) fn new(parents: Vec<(Rc<Node>, Vjp)>) -> Rc<Self> {
        let id = NEXT_NODE.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        Rc::new(Self { id, parents })
    }

    pub(crate) fn leaf() -> Rc<Self> {
        Self::new(Vec::new())
    }

    /// Creation order; a node is always newer than its parents.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("parents", &self.parents.len())
            .finish()
    }
}
