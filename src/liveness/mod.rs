//! Backward fixpoint liveness over the whole-program control-flow graph.
//!
//! `live_out(B) = ⋃ live_in(S) for S ∈ succ(B)`, `live_in(B) = gen(B) ∪
//! (live_out(B) − kill(B))`. Only `class=reg` symbols ever enter `gen`/`kill`
//! (folded once, in [`crate::cfg::block`]), so a global symbol seeded into a
//! function's exit `live_out` simply rides unchanged back through every
//! predecessor — it is never a candidate for `kill` — which is exactly how
//! [4.3] wants a write to a global in the last block to "remain live".

use log::debug;
use rustc_hash::FxHashSet;

use crate::cfg::{BlockOrder, ControlFlowGraph, ReversePostorder};
use crate::ir::Symbol;
use crate::lower::stmt::StmtPool;
use crate::result::{CodegenError, CodegenResult};

/// Seeds every procedure's fake exit block and iterates the dataflow
/// equations to a fixpoint, writing `live_in`/`live_out` back onto each
/// [`crate::cfg::BasicBlock`].
pub fn analyze(cfg: &mut ControlFlowGraph, global_symbols: &[Symbol]) -> CodegenResult<()> {
    analyze_with_order(cfg, global_symbols, &ReversePostorder)
}

pub fn analyze_with_order(cfg: &mut ControlFlowGraph, global_symbols: &[Symbol], order: &dyn BlockOrder) -> CodegenResult<()> {
    for (&function, &(_entry, exit)) in cfg.boundaries.clone().iter() {
        let seed: FxHashSet<Symbol> = if function.is_none() { FxHashSet::default() } else { global_symbols.iter().copied().collect() };
        cfg.get_mut(exit).live_out = seed;
    }

    let visit_order = order.order(cfg);
    let is_exit: FxHashSet<_> = cfg.boundaries.values().map(|&(_, exit)| exit).collect();

    let mut changed = true;
    let mut rounds = 0u32;
    while changed {
        changed = false;
        rounds += 1;
        for &id in &visit_order {
            let successors: Vec<_> = cfg.get(id).successors().collect();
            let mut new_live_out = FxHashSet::default();
            for s in successors {
                new_live_out.extend(cfg.get(s).live_in.iter().copied());
            }
            if is_exit.contains(&id) {
                // Exit blocks have no successors; their `live_out` is the
                // fixed seed planted above, not derived.
                new_live_out = cfg.get(id).live_out.clone();
            }

            let block = cfg.get(id);
            let mut new_live_in = block.gen.clone();
            for s in new_live_out.difference(&block.kill) {
                new_live_in.insert(*s);
            }

            if new_live_in != block.live_in || new_live_out != block.live_out {
                changed = true;
                let block = cfg.get_mut(id);
                block.live_in = new_live_in;
                block.live_out = new_live_out;
            }
        }
    }

    debug!("liveness fixpoint converged after {rounds} round(s) over {} blocks", visit_order.len());
    Ok(())
}

/// Invariant 4 in [8]: replaying each block's statements backward from its
/// `live_out`, threading use/def through in reverse, must land exactly on
/// `live_in`.
pub fn verify_instruction_level(cfg: &ControlFlowGraph, stmts: &StmtPool, symbols: &crate::ir::SymbolPool) -> CodegenResult<()> {
    for (id, block) in cfg.iter() {
        if block.is_fake {
            continue;
        }
        let mut live = block.live_out.clone();
        for &stmt_id in block.statements.iter().rev() {
            let stat = stmts.get(stmt_id);
            for d in stat.defined_with(symbols) {
                if symbols.is_register(d) {
                    live.remove(&d);
                }
            }
            for u in stat.used_with(symbols) {
                if symbols.is_register(u) {
                    live.insert(u);
                }
            }
        }
        if live != block.live_in {
            return Err(CodegenError::cfg(format!("instruction-level liveness mismatch in block {:?}", id)));
        }
    }
    Ok(())
}

/// Invariant 3: `live_in(S) ⊆ live_out(B)` for every edge `B -> S`.
pub fn verify_soundness(cfg: &ControlFlowGraph) -> CodegenResult<()> {
    for (id, block) in cfg.iter() {
        for succ in block.successors() {
            let s = cfg.get(succ);
            if !s.live_in.is_subset(&block.live_out) {
                return Err(CodegenError::cfg(format!("live_in(successor) not contained in live_out({:?})", id)));
            }
        }
    }
    Ok(())
}
