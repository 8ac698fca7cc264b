//! The input contract: a tree of IR nodes produced by the parser.
//!
//! Rather than the back-pointer-laden tree the front end builds (every child
//! holding an `Rc` back to its parent), nodes here are addressed by
//! [`NodeId`] into an [`Arena`]. There is no parent link at all — lowering
//! only ever walks a node's children, so the arena just needs forward edges.
//! This sidesteps the ownership cycle the design notes call out without
//! losing anything lowering needs.

use cranelift_entity::{entity_impl, PrimaryMap, SecondaryMap};

use crate::ir::symbol::Symbol;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);
entity_impl!(NodeId, "node");

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Plus,
    Minus,
    Times,
    Slash,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Odd,
}

/// One node of the parser's output tree: a statement or expression within a
/// single procedure body. The nesting of procedures themselves is tracked
/// separately by [`crate::ir::program::Procedure`], matching how the front
/// end keeps declarations apart from executable statements.
#[derive(Clone)]
pub enum Node {
    /// An immediate literal, or a reference to a named compile-time constant
    /// when `symbol` is set.
    Const { value: Option<i64>, symbol: Option<Symbol> },
    Var { symbol: Symbol },
    ArrayElement { symbol: Symbol, offset: NodeId },
    BinExpr { op: BinOp, lhs: NodeId, rhs: NodeId },
    UnExpr { op: UnOp, operand: NodeId },
    /// `__pl0_read`'s return value, to be lowered and then assigned.
    ReadExpr,
    Assign { target: Symbol, offset: Option<NodeId>, expr: NodeId },
    Call { target: Symbol },
    If { cond: NodeId, then_branch: NodeId, else_branch: Option<NodeId> },
    While { cond: NodeId, body: NodeId },
    Print { expr: NodeId },
    StatList { children: Vec<NodeId> },
    /// Placeholder for a parse position that produced no node.
    Empty,
}

/// Owns every [`Node`] in a compilation unit, and the slot each lowers into.
///
/// `lowered` mirrors the spec's "pointer to lowered form" field on each IR
/// node, but as an index into [`crate::lower::stmt::StmtPool`] rather than a
/// shared pointer — invariant 1 in [8] becomes "every populated `NodeId` has
/// a `Some` entry here after lowering".
pub struct Arena {
    nodes: PrimaryMap<NodeId, Node>,
    lowered: SecondaryMap<NodeId, Option<crate::lower::stmt::StmtId>>,
}

impl Arena {
    pub fn new() -> Self {
        Arena { nodes: PrimaryMap::new(), lowered: SecondaryMap::new() }
    }

    pub fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node)
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn set_lowered(&mut self, id: NodeId, stmt: crate::lower::stmt::StmtId) {
        self.lowered[id] = Some(stmt);
    }

    pub fn lowered_of(&self, id: NodeId) -> Option<crate::lower::stmt::StmtId> {
        self.lowered[id]
    }

    /// Every node id that has been pushed, in creation order. Used by the
    /// lowering-preservation check in [8].
    pub fn all_ids(&self) -> impl Iterator<Item = NodeId> {
        self.nodes.keys()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}
