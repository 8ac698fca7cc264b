//! Basic blocks: maximal straight-line runs with one entry label and at
//! most two exits.

use cranelift_entity::entity_impl;
use log::debug;
use rustc_hash::FxHashSet;

use crate::ir::{Symbol, SymbolPool};
use crate::lower::stmt::{StmtId, StmtPool};
use crate::result::{CodegenError, CodegenResult};

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);
entity_impl!(BlockId, "block");

pub struct BasicBlock {
    /// `None` for the top-level program block.
    pub function: Option<Symbol>,
    pub statements: Vec<StmtId>,
    pub label_in: Symbol,
    pub next: Option<BlockId>,
    pub next_label: Option<Symbol>,
    pub target: Option<BlockId>,
    pub target_label: Option<Symbol>,
    /// Extra successors beyond `next`/`target`. Only ever populated on the
    /// fake entry block, which fans out to every unreferenced head block in
    /// its procedure; ordinary blocks keep this empty to preserve invariant
    /// 2's "≤ 2 successors" (it only binds real blocks).
    pub more_successors: Vec<BlockId>,
    pub gen: FxHashSet<Symbol>,
    pub kill: FxHashSet<Symbol>,
    pub live_in: FxHashSet<Symbol>,
    pub live_out: FxHashSet<Symbol>,
    /// Synthetic entry/exit marker with no instructions, used to give every
    /// procedure a single join point for liveness at its boundary.
    pub is_fake: bool,
}

impl BasicBlock {
    fn building(function: Option<Symbol>) -> PartialBlock {
        PartialBlock { function, statements: Vec::new(), label_in: None, target_label: None }
    }

    pub fn fake(function: Option<Symbol>, label: Symbol) -> Self {
        BasicBlock {
            function,
            statements: Vec::new(),
            label_in: label,
            next: None,
            next_label: None,
            target: None,
            target_label: None,
            more_successors: Vec::new(),
            gen: FxHashSet::default(),
            kill: FxHashSet::default(),
            live_in: FxHashSet::default(),
            live_out: FxHashSet::default(),
            is_fake: true,
        }
    }

    pub fn successors(&self) -> impl Iterator<Item = BlockId> + '_ {
        [self.next, self.target].into_iter().flatten().chain(self.more_successors.iter().copied())
    }

    /// Invariant 2 in [8]: an unconditional terminal branch implies
    /// `next == None`.
    pub fn check_well_formed(&self, stmts: &StmtPool) -> CodegenResult<()> {
        if let Some(&last) = self.statements.last() {
            if stmts.get(last).is_unconditional_branch() && self.next.is_some() {
                return Err(CodegenError::cfg("unconditional branch retained a fall-through successor"));
            }
        }
        Ok(())
    }
}

struct PartialBlock {
    function: Option<Symbol>,
    statements: Vec<StmtId>,
    label_in: Option<Symbol>,
    target_label: Option<Symbol>,
}

impl PartialBlock {
    fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Folds gen/kill over the statements collected so far and emits the
    /// finished block, synthesizing an incoming label if none was attached.
    fn finalize(self, stmts: &StmtPool, symbols: &mut SymbolPool) -> BasicBlock {
        let label_in = self.label_in.unwrap_or_else(|| symbols.new_label());

        let mut gen = FxHashSet::default();
        let mut kill = FxHashSet::default();
        for &id in &self.statements {
            let stat = stmts.get(id);
            let used = stat.used_with(symbols);
            let defined = stat.defined_with(symbols);
            for s in used {
                if symbols.is_register(s) && !kill.contains(&s) {
                    gen.insert(s);
                    #[cfg(feature = "trace-log")]
                    log::trace!("stmt {id:?} folds use of {s:?} into gen");
                }
            }
            for s in defined {
                if symbols.is_register(s) {
                    kill.insert(s);
                    #[cfg(feature = "trace-log")]
                    log::trace!("stmt {id:?} folds def of {s:?} into kill");
                }
            }
        }

        BasicBlock {
            function: self.function,
            statements: self.statements,
            label_in,
            next: None,
            // Filled in by `split_into_blocks` once the run order is known.
            next_label: None,
            target: None,
            target_label: self.target_label,
            more_successors: Vec::new(),
            gen,
            kill,
            live_in: FxHashSet::default(),
            live_out: FxHashSet::default(),
            is_fake: false,
        }
    }
}

/// Splits a flat statement run into basic blocks, per [4.2]: a block
/// completes when the next statement carries an incoming label, or when an
/// unconditional/conditional non-returning branch was just appended.
pub fn split_into_blocks(
    function: Option<Symbol>,
    run: &[StmtId],
    stmts: &StmtPool,
    symbols: &mut SymbolPool,
) -> CodegenResult<Vec<BasicBlock>> {
    let mut blocks = Vec::new();
    let mut current = BasicBlock::building(function);

    for &id in run {
        let stat = stmts.get(id);
        if let Some(label) = stat.label {
            if !current.is_empty() {
                debug!("block split before stmt {id:?}: incoming label {label:?}");
                blocks.push(current.finalize(stmts, symbols));
                current = BasicBlock::building(function);
            }
            if current.label_in.is_some() {
                return Err(CodegenError::cfg("duplicate label assignment to one block"));
            }
            current.label_in = Some(label);
        }

        current.statements.push(id);

        if stat.is_unconditional_branch() || (stat.is_conditional_branch()) {
            if let Some(target) = stat.branch_target() {
                debug!("block split after stmt {id:?}: branch to {target:?}");
                current.target_label = Some(target);
                blocks.push(current.finalize(stmts, symbols));
                current = BasicBlock::building(function);
                continue;
            }
        }
    }

    if !current.is_empty() {
        blocks.push(current.finalize(stmts, symbols));
    }

    debug!("split {function:?} into {} block(s)", blocks.len());

    // Thread `next` by control-adjacency: a block whose terminator wasn't an
    // unconditional branch falls through into the block that follows it in
    // program order.
    for i in 0..blocks.len().saturating_sub(1) {
        let falls_through = blocks[i]
            .statements
            .last()
            .map(|&id| !stmts.get(id).is_unconditional_branch())
            .unwrap_or(true);
        if falls_through {
            blocks[i].next_label = Some(blocks[i + 1].label_in);
        }
    }

    Ok(blocks)
}
