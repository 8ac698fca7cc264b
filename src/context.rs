//! Top-level orchestration: wires lowering, CFG construction, liveness,
//! register allocation, frame layout and emission into the single pipeline
//! described by the design notes. Everything else in this crate is a pure
//! function over explicit arguments; this module is the one place that owns
//! the monotonic counters ([`SymbolPool`], [`StmtPool`]) and threads them
//! through each stage in order.

use log::debug;
use rustc_hash::FxHashMap;

use crate::cfg::{self, BlockId, BlockOrder, ReversePostorder};
use crate::emit::{self, AsmSink, EmitConfig, ProcedureEmitter};
use crate::frame::{self, FrozenLayout, StackLayout};
use crate::ir::tree::Arena;
use crate::ir::{Procedure, Symbol, SymbolPool, SymbolTable};
use crate::liveness;
use crate::lower;
use crate::lower::stmt::StmtPool;
use crate::regalloc;
use crate::result::{CodegenError, CodegenResult};

/// Owns the pools every stage allocates out of. A front end builds an
/// [`Arena`]/[`Procedure`] tree plus one [`SymbolTable`] per procedure level
/// (including a `None`-keyed table for the global block) and hands them to
/// [`Context::compile`]; everything downstream of that point is this crate's
/// responsibility.
#[derive(Default)]
pub struct Context {
    pub symbols: SymbolPool,
    pub stmts: StmtPool,
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    /// Runs the full pipeline and returns the generated assembly text.
    pub fn compile(
        &mut self,
        arena: &mut Arena,
        root: &Procedure,
        tables: &FxHashMap<Option<Symbol>, SymbolTable>,
        config: &EmitConfig,
    ) -> CodegenResult<String> {
        let lowered = lower::lower_program(arena, &mut self.symbols, &mut self.stmts, root)?;
        let mut graph = cfg::build(&lowered, &mut self.symbols, &self.stmts)?;

        let global_table = tables.get(&None).ok_or_else(|| CodegenError::codegen("no symbol table for the global block"))?;
        let global_symbols = global_table.global_data_symbols(&self.symbols);

        liveness::analyze(&mut graph, &global_symbols)?;
        liveness::verify_soundness(&graph)?;
        liveness::verify_instruction_level(&graph, &self.stmts, &self.symbols)?;

        let proc_levels = collect_proc_levels(root);
        let mut layouts = FxHashMap::default();
        build_layouts(root, tables, None, &mut self.symbols, &mut layouts)?;

        let order = ReversePostorder;
        let full_order = order.order(&graph);

        let mut sink = AsmSink::default();
        emit::emit_globals(&mut sink, &self.symbols, &global_symbols)?;

        // [4.6]: nested procedures are emitted before the function that
        // encloses them, so a forward `bl` to a sibling never needs a
        // second assembly pass to resolve.
        for proc in root.postorder() {
            let function = proc.symbol;
            let block_ids: Vec<BlockId> = full_order
                .iter()
                .copied()
                .filter(|&id| graph.get(id).function == function && !graph.get(id).is_fake)
                .collect();

            let mut alloc = regalloc::allocate(&graph, &self.stmts, &self.symbols, &block_ids, config.nregs)?;

            let layout = layouts.get_mut(&function).ok_or_else(|| CodegenError::codegen("procedure has no frame layout"))?;
            let spill_words = alloc.spill_room() / 4;
            layout.spill.grow_words(spill_words);

            let label = match function {
                Some(sym) => self.symbols.get(sym).name.clone(),
                None => "main".to_string(),
            };
            debug!("{label}: register allocation chose {} spilled value(s) of {} usable registers", alloc.num_spilled, config.nregs - 2);

            let mut emitter = ProcedureEmitter {
                stmts: &self.stmts,
                symbols: &mut self.symbols,
                layout,
                alloc: &mut alloc,
                config,
                proc_levels: &proc_levels,
                current_level: proc.level,
            };
            emit::emit_procedure(&mut sink, &label, &graph, function, &order, &mut emitter)?;
        }

        Ok(format!("{}{}\n", emit::format_header(env!("CARGO_PKG_VERSION")), sink.into_text()))
    }
}

/// Maps every procedure symbol to its own body's lexical level, for
/// [`ProcedureEmitter`]'s static-link marshalling.
fn collect_proc_levels(root: &Procedure) -> FxHashMap<Symbol, u32> {
    let mut out = FxHashMap::default();
    for proc in root.postorder() {
        if let Some(sym) = proc.symbol {
            out.insert(sym, proc.level);
        }
    }
    out
}

/// Builds one [`StackLayout`] per procedure (including the global block,
/// whose own frame still needs `spill`/`args_out`/`regsave_out` even though
/// it has no `local_vars`), walking the procedure tree parent-before-child
/// so each child can freeze its parent's layout for its own `parent` link.
fn build_layouts(
    proc: &Procedure,
    tables: &FxHashMap<Option<Symbol>, SymbolTable>,
    parent: Option<FrozenLayout>,
    symbols: &mut SymbolPool,
    layouts: &mut FxHashMap<Option<Symbol>, StackLayout>,
) -> CodegenResult<()> {
    let table = tables
        .get(&proc.symbol)
        .ok_or_else(|| CodegenError::codegen("procedure has no symbol table"))?;

    let mut layout = StackLayout::new(proc.level, parent);
    if proc.level == 0 {
        frame::layout_data(table, symbols, None)?;
    } else {
        frame::layout_data(table, symbols, Some(&mut layout))?;
    }
    let frozen = layout.freeze();
    layouts.insert(proc.symbol, layout);

    for child in &proc.children {
        build_layouts(child, tables, Some(frozen.clone()), symbols, layouts)?;
    }
    Ok(())
}
