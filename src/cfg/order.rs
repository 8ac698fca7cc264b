//! Pluggable block visitation order.
//!
//! Liveness wants a reverse-postorder walk for fast fixpoint convergence,
//! but any caller that only cares about *determinism* (snapshot tests,
//! emission order within a block list) can swap in a different
//! [`BlockOrder`] without touching the dataflow solver itself.

use cranelift_entity::EntityRef;
use rustc_hash::FxHashSet;

use crate::cfg::block::BlockId;
use crate::cfg::graph::ControlFlowGraph;

pub trait BlockOrder {
    /// Every block reachable from some procedure's fake entry, in this
    /// order's preferred visitation sequence.
    fn order(&self, cfg: &ControlFlowGraph) -> Vec<BlockId>;
}

/// Depth-first postorder, reversed — successors are visited before their
/// predecessors are reported, which is what a backward dataflow pass wants.
pub struct ReversePostorder;

impl BlockOrder for ReversePostorder {
    fn order(&self, cfg: &ControlFlowGraph) -> Vec<BlockId> {
        let mut entries: Vec<BlockId> = cfg.boundaries.values().map(|&(entry, _)| entry).collect();
        entries.sort_by_key(|b| b.index());

        let mut visited = FxHashSet::default();
        let mut postorder = Vec::new();
        for entry in entries {
            visit(cfg, entry, &mut visited, &mut postorder);
        }
        postorder.reverse();
        postorder
    }
}

fn visit(cfg: &ControlFlowGraph, id: BlockId, visited: &mut FxHashSet<BlockId>, out: &mut Vec<BlockId>) {
    if !visited.insert(id) {
        return;
    }
    for succ in cfg.get(id).successors() {
        visit(cfg, succ, visited, out);
    }
    out.push(id);
}
