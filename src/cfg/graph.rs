//! Wires the basic blocks of every procedure into a single control-flow
//! graph, with a synthetic entry/exit pair bracketing each procedure so
//! liveness has one join point at its boundary.

use cranelift_entity::{EntityRef, PrimaryMap};
use rustc_hash::FxHashMap;

use crate::cfg::block::{split_into_blocks, BasicBlock, BlockId};
use crate::ir::{Symbol, SymbolPool};
use crate::lower::LoweredProgram;
use crate::lower::stmt::StmtPool;
use crate::result::{CodegenError, CodegenResult};

pub struct ControlFlowGraph {
    blocks: PrimaryMap<BlockId, BasicBlock>,
    label_to_block: FxHashMap<Symbol, BlockId>,
    /// `(entry, exit)` fake blocks bracketing each procedure, keyed the same
    /// way [`LoweredProgram::runs`] is.
    pub boundaries: FxHashMap<Option<Symbol>, (BlockId, BlockId)>,
}

impl ControlFlowGraph {
    pub fn get(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    pub fn get_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id]
    }

    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks.keys().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.blocks.iter()
    }

    pub fn block_of(&self, label: Symbol) -> Option<BlockId> {
        self.label_to_block.get(&label).copied()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Predecessors of `id`, computed on demand by scanning successors —
    /// the graph is built once per compilation and never mutated after, so
    /// there is no back-pointer bookkeeping to keep consistent.
    pub fn predecessors(&self, id: BlockId) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|(_, b)| b.successors().any(|s| s == id))
            .map(|(pred, _)| pred)
            .collect()
    }
}

/// Builds the whole-program CFG from a lowered program, one procedure at a
/// time: split into blocks, resolve labels to block ids, then bracket with a
/// fake entry that points at every unreferenced ("head") block and a fake
/// exit that every block with no successor points into.
pub fn build(program: &LoweredProgram, symbols: &mut SymbolPool, stmts: &StmtPool) -> CodegenResult<ControlFlowGraph> {
    let mut blocks: PrimaryMap<BlockId, BasicBlock> = PrimaryMap::new();
    let mut label_to_block = FxHashMap::default();
    let mut boundaries = FxHashMap::default();

    // Stable order: HashMap iteration would make block numbering
    // nondeterministic across runs of the same program.
    let mut procs: Vec<_> = program.runs.iter().collect();
    procs.sort_by_key(|(sym, _)| sym.map(|s| s.index()));

    for (&function, run) in procs {
        let raw = split_into_blocks(function, run, stmts, symbols)?;
        let mut ids = Vec::with_capacity(raw.len());
        for block in raw {
            let label = block.label_in;
            let id = blocks.push(block);
            if label_to_block.insert(label, id).is_some() {
                return Err(CodegenError::cfg("two blocks claim the same incoming label"));
            }
            ids.push(id);
        }

        let mut referenced = std::collections::HashSet::new();
        for &id in &ids {
            if let Some(target_label) = blocks[id].target_label {
                let target = *label_to_block
                    .get(&target_label)
                    .ok_or_else(|| CodegenError::cfg("branch target label resolves to no block"))?;
                blocks[id].target = Some(target);
                referenced.insert(target);
            }
            if let Some(next_label) = blocks[id].next_label {
                let next = *label_to_block
                    .get(&next_label)
                    .ok_or_else(|| CodegenError::cfg("fall-through label resolves to no block"))?;
                blocks[id].next = Some(next);
                referenced.insert(next);
            }
        }

        let entry_label = symbols.new_label();
        let exit_label = symbols.new_label();
        let mut entry = BasicBlock::fake(function, entry_label);
        let exit = BasicBlock::fake(function, exit_label);

        let heads: Vec<BlockId> = ids.iter().copied().filter(|id| !referenced.contains(id)).collect();
        let mut heads = if heads.is_empty() { ids.first().copied().into_iter().collect() } else { heads };
        heads.sort_by_key(|b| b.index());
        // Per [4.2]: the fake entry points at every head block, not just
        // the first — unreachable code still gets a defined liveness entry.
        let mut heads = heads.into_iter();
        entry.next = heads.next();
        entry.more_successors = heads.collect();

        let entry_id = blocks.push(entry);
        label_to_block.insert(entry_label, entry_id);

        let exit_id = blocks.push(exit);
        label_to_block.insert(exit_label, exit_id);
        for &id in &ids {
            if blocks[id].successors().next().is_none() {
                blocks[id].next = Some(exit_id);
            }
        }

        boundaries.insert(function, (entry_id, exit_id));
    }

    Ok(ControlFlowGraph { blocks, label_to_block, boundaries })
}
