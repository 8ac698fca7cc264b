//! Assembly text emission, per [4.6].
//!
//! The target ISA is an ARM-like load/store machine (the prologue/epilogue
//! shapes in [4.5]/[4.6] — `mov fp, sp`, `bx lr` — are ARM mnemonics), so
//! mnemonics below follow that family. Calling convention, caller/callee-save
//! split and static-link marshalling are Open Questions in [9]; the choices
//! made here are recorded in DESIGN.md rather than left undocumented.

use std::fmt::Write as _;

use rustc_hash::FxHashMap;

use crate::cfg::{BlockOrder, ControlFlowGraph};
use crate::frame::StackLayout;
use crate::ir::{AllocationInfo, BinOp, Symbol, SymbolPool, UnOp};
use crate::lower::stmt::{StmtKind, StmtPool};
use crate::regalloc::{AllocInfo, Location};
use crate::result::{CodegenError, CodegenResult};

pub struct EmitConfig {
    pub nregs: u32,
    pub callee_saved_regs: Vec<u32>,
}

impl Default for EmitConfig {
    fn default() -> Self {
        EmitConfig { nregs: 16, callee_saved_regs: (4..=10).collect() }
    }
}

/// Append-only assembly text buffer. Matches [5]'s "line buffer appended
/// from prologue through emission and flushed once at the end".
#[derive(Default)]
pub struct AsmSink {
    lines: Vec<String>,
}

impl AsmSink {
    fn label(&mut self, name: &str) {
        self.lines.push(format!("{name}:"));
    }

    fn instr(&mut self, text: impl Into<String>) {
        self.lines.push(format!("\t{}", text.into()));
    }

    fn comment(&mut self, text: impl AsRef<str>) {
        self.lines.push(format!("\t@ {}", text.as_ref()));
    }

    fn comm(&mut self, name: &str, size: u32) {
        self.lines.push(format!(".comm {name}, {size}"));
    }

    pub fn into_text(self) -> String {
        self.lines.join("\n")
    }
}

fn reg_name(r: u32) -> String {
    format!("r{r}")
}

/// Materializes `sym` into a usable register name, emitting a spill reload
/// through a scratch register when necessary.
fn gen_load(sink: &mut AsmSink, alloc: &mut AllocInfo, layout: &StackLayout, sym: Symbol) -> CodegenResult<String> {
    match alloc.location(sym).ok_or_else(|| CodegenError::codegen("operand has no allocation"))? {
        Location::Register(r) => Ok(reg_name(r)),
        Location::Spilled => {
            let (scratch, offset) = alloc.scratch_for(sym);
            let name = reg_name(scratch);
            let slot = layout.spill_offset() * 4 + offset as i32;
            #[cfg(feature = "trace-log")]
            log::trace!("materializing spilled {sym:?} into {name} from [fp, #{slot}]");
            sink.instr(format!("ldr {name}, [fp, #{slot}]"));
            Ok(name)
        }
    }
}

/// Writes a just-computed value back to its spill slot if `sym` is spilled;
/// a no-op for register-resident symbols.
fn gen_store(sink: &mut AsmSink, alloc: &mut AllocInfo, layout: &StackLayout, sym: Symbol, holding_reg: &str) -> CodegenResult<()> {
    if alloc.is_spilled(sym) {
        let (_, offset) = alloc.scratch_for(sym);
        let slot = layout.spill_offset() * 4 + offset as i32;
        sink.instr(format!("str {holding_reg}, [fp, #{slot}]"));
    }
    Ok(())
}

fn binop_mnemonic(op: BinOp) -> &'static str {
    match op {
        BinOp::Plus => "add",
        BinOp::Minus => "sub",
        BinOp::Times => "mul",
        BinOp::Slash => "sdiv",
        BinOp::Eq => "cmpeq",
        BinOp::NotEq => "cmpne",
        BinOp::Lt => "cmplt",
        BinOp::LtEq => "cmple",
        BinOp::Gt => "cmpgt",
        BinOp::GtEq => "cmpge",
    }
}

fn unop_mnemonic(op: UnOp) -> &'static str {
    match op {
        UnOp::Neg => "neg",
        UnOp::Odd => "andeq",
    }
}

/// Per-procedure emission context: the frame, the allocation, and the
/// statement/symbol pools everything else was built from.
///
/// `layout` is mutable because marshalling a call's static link can grow
/// this frame's own `args_out` section ([`StackSection::set_max_words`]).
/// `proc_levels` maps every procedure symbol to its own body's lexical
/// level, which is what a `Branch{returns: true}` needs to know how many
/// static-link words the callee expects — distinct from a *data* symbol's
/// `level`, which names the scope it was declared in.
pub struct ProcedureEmitter<'a> {
    pub stmts: &'a StmtPool,
    pub symbols: &'a mut SymbolPool,
    pub layout: &'a mut StackLayout,
    pub alloc: &'a mut AllocInfo,
    pub config: &'a EmitConfig,
    pub proc_levels: &'a FxHashMap<Symbol, u32>,
    pub current_level: u32,
}

impl<'a> ProcedureEmitter<'a> {
    fn name_of(&self, sym: Symbol) -> String {
        self.symbols.get(sym).name.clone()
    }

    fn emit_statement(&mut self, sink: &mut AsmSink, id: crate::lower::stmt::StmtId) -> CodegenResult<()> {
        let stat = self.stmts.get(id).clone();
        if matches!(stat.kind, StmtKind::Empty) {
            // A label-carrying no-op always starts the block it's in (block
            // construction splits on every incoming label), so the block's
            // own label line already covers it; nothing left to emit.
            return Ok(());
        }
        sink.comment(format!("{}", stat.display(self.symbols)));

        match &stat.kind {
            StmtKind::LoadImm { dest, value } => {
                let d = gen_load_dest_only(self.alloc, *dest)?;
                sink.instr(format!("mov {d}, #{value}"));
                gen_store(sink, self.alloc, self.layout, *dest, &d)?;
            }
            StmtKind::Load { dest, symbol } => {
                let d = gen_load_dest_only(self.alloc, *dest)?;
                if self.symbols.is_register(*symbol) {
                    let addr = gen_load(sink, self.alloc, self.layout, *symbol)?;
                    sink.instr(format!("ldr {d}, [{addr}]"));
                } else {
                    self.emit_named_load(sink, &d, *symbol)?;
                }
                gen_store(sink, self.alloc, self.layout, *dest, &d)?;
            }
            StmtKind::Store { dest, symbol } => {
                let v = gen_load(sink, self.alloc, self.layout, *symbol)?;
                if self.symbols.is_register(*dest) {
                    let addr = gen_load(sink, self.alloc, self.layout, *dest)?;
                    sink.instr(format!("str {v}, [{addr}]"));
                } else {
                    self.emit_named_store(sink, &v, *dest)?;
                }
            }
            StmtKind::LoadAddr { dest, symbol } => {
                let d = gen_load_dest_only(self.alloc, *dest)?;
                self.emit_named_addr(sink, &d, *symbol)?;
                gen_store(sink, self.alloc, self.layout, *dest, &d)?;
            }
            StmtKind::BinOp { dest, op, lhs, rhs } => {
                let a = gen_load(sink, self.alloc, self.layout, *lhs)?;
                let b = gen_load(sink, self.alloc, self.layout, *rhs)?;
                let d = gen_load_dest_only(self.alloc, *dest)?;
                sink.instr(format!("{} {d}, {a}, {b}", binop_mnemonic(*op)));
                gen_store(sink, self.alloc, self.layout, *dest, &d)?;
            }
            StmtKind::UnaryOp { dest, op, src } => {
                let s = gen_load(sink, self.alloc, self.layout, *src)?;
                let d = gen_load_dest_only(self.alloc, *dest)?;
                sink.instr(format!("{} {d}, {s}", unop_mnemonic(*op)));
                gen_store(sink, self.alloc, self.layout, *dest, &d)?;
            }
            StmtKind::Branch { target, condition, negated, returns } => {
                self.emit_branch(sink, *target, *condition, *negated, *returns)?;
            }
            StmtKind::Print { src } => {
                let s = gen_load(sink, self.alloc, self.layout, *src)?;
                if s != "r0" {
                    sink.instr(format!("mov r0, {s}"));
                }
                sink.instr("bl __pl0_print");
            }
            StmtKind::Read { dest } => {
                sink.instr("bl __pl0_read");
                let d = gen_load_dest_only(self.alloc, *dest)?;
                if d != "r0" {
                    sink.instr(format!("mov {d}, r0"));
                }
                gen_store(sink, self.alloc, self.layout, *dest, &d)?;
            }
            StmtKind::Empty => unreachable!(),
        }
        Ok(())
    }

    /// Loads the ancestor frame pointer `ancestor_level` hops up the static
    /// chain into a scratch register, reading this frame's own `level_ref`
    /// slot. Never touches spill-slot bookkeeping — the "symbol" here is a
    /// frame pointer, not an allocatable value.
    fn chase_static_link(&mut self, sink: &mut AsmSink, ancestor_level: u32) -> CodegenResult<String> {
        let slot = self.layout.level_ref_slot_offset(ancestor_level)?;
        let reg = reg_name(self.alloc.scratch_register());
        sink.instr(format!("ldr {reg}, [fp, #{slot}]"));
        Ok(reg)
    }

    /// Emits `ldr {d}, <memory of symbol>` for a named (non-register)
    /// operand: a global is addressed by its linker name, a same-level local
    /// directly off `fp`, an outer local through a static-link chase.
    fn emit_named_load(&mut self, sink: &mut AsmSink, d: &str, symbol: Symbol) -> CodegenResult<()> {
        match self.symbols.get(symbol).alloc_info.clone() {
            Some(AllocationInfo::Global { prefixed_name, .. }) => {
                sink.instr(format!("ldr {d}, ={prefixed_name}"));
            }
            Some(AllocationInfo::Local { offset, level, .. }) => {
                if level == self.current_level {
                    sink.instr(format!("ldr {d}, [fp, #{offset}]"));
                } else {
                    let base = self.chase_static_link(sink, level)?;
                    sink.instr(format!("ldr {d}, [{base}, #{offset}]"));
                }
            }
            None => return Err(CodegenError::codegen("symbol not placed by frame layout")),
        }
        Ok(())
    }

    fn emit_named_store(&mut self, sink: &mut AsmSink, v: &str, symbol: Symbol) -> CodegenResult<()> {
        match self.symbols.get(symbol).alloc_info.clone() {
            Some(AllocationInfo::Global { prefixed_name, .. }) => {
                sink.instr(format!("str {v}, ={prefixed_name}"));
            }
            Some(AllocationInfo::Local { offset, level, .. }) => {
                if level == self.current_level {
                    sink.instr(format!("str {v}, [fp, #{offset}]"));
                } else {
                    let base = self.chase_static_link(sink, level)?;
                    sink.instr(format!("str {v}, [{base}, #{offset}]"));
                }
            }
            None => return Err(CodegenError::codegen("symbol not placed by frame layout")),
        }
        Ok(())
    }

    /// Emits `{d} <- &symbol`, for `LoadAddr` (array base pointers). Globals
    /// use the `adr` pseudo-op; locals compute `fp + offset`, chasing the
    /// static link first when the symbol lives in an outer frame.
    fn emit_named_addr(&mut self, sink: &mut AsmSink, d: &str, symbol: Symbol) -> CodegenResult<()> {
        match self.symbols.get(symbol).alloc_info.clone() {
            Some(AllocationInfo::Global { prefixed_name, .. }) => {
                sink.instr(format!("adr {d}, ={prefixed_name}"));
            }
            Some(AllocationInfo::Local { offset, level, .. }) => {
                if level == self.current_level {
                    sink.instr(format!("add {d}, fp, #{offset}"));
                } else {
                    let base = self.chase_static_link(sink, level)?;
                    sink.instr(format!("add {d}, {base}, #{offset}"));
                }
            }
            None => return Err(CodegenError::codegen("symbol not placed by frame layout")),
        }
        Ok(())
    }

    /// Marshals the static link a call to `target` needs, then emits the
    /// call itself. Per [9]: the callee's own `level_ref` section occupies
    /// the same physical words as this frame's `args_out` reservation for
    /// the call, because the callee's first prologue instruction (`mov fp,
    /// sp`) sets its `fp` to this frame's current `sp` — exactly where
    /// `args_out` ends — before it ever subtracts its own frame size. So
    /// "marshalling" is just writing ancestor frame pointers into this
    /// frame's `args_out` slots at the matching offsets; the callee reads
    /// them back as its own `level_ref` with no copy in between.
    fn emit_call(&mut self, sink: &mut AsmSink, target: Symbol) -> CodegenResult<()> {
        let target_name = self.name_of(target);
        let callee_level = *self.proc_levels.get(&target).ok_or_else(|| CodegenError::codegen("call target is not a known procedure"))?;
        let link_words = callee_level.saturating_sub(1);
        self.layout.args_out.set_max_words(link_words);

        for ancestor_level in 1..callee_level {
            let slot = self.layout.args_out_slot_offset(ancestor_level - 1);
            if ancestor_level == self.current_level {
                sink.instr(format!("str fp, [fp, #{slot}]"));
            } else {
                let base = self.chase_static_link(sink, ancestor_level)?;
                sink.instr(format!("str {base}, [fp, #{slot}]"));
            }
        }

        let saved: Vec<u32> = (0..self.config.nregs - 2).collect();
        for r in &saved {
            sink.instr(format!("push {{{}}}", reg_name(*r)));
        }
        sink.instr(format!("bl {target_name}"));
        for r in saved.iter().rev() {
            sink.instr(format!("pop {{{}}}", reg_name(*r)));
        }
        Ok(())
    }

    fn emit_branch(&mut self, sink: &mut AsmSink, target: Symbol, condition: Option<Symbol>, negated: bool, returns: bool) -> CodegenResult<()> {
        if returns {
            return self.emit_call(sink, target);
        }

        let target_name = self.name_of(target);
        match condition {
            None => {
                sink.instr(format!("b {target_name}"));
            }
            Some(cond) => {
                let c = gen_load(sink, self.alloc, self.layout, cond)?;
                sink.instr(format!("cmp {c}, #0"));
                let mnemonic = if negated { "beq" } else { "bne" };
                sink.instr(format!("{mnemonic} {target_name}"));
            }
        }
        Ok(())
    }
}

/// `gen_store`/`gen_load` need a live register for a fresh destination even
/// before anything has been written to it; spilled destinations still route
/// through a scratch register chosen the same way as any other spilled
/// operand.
fn gen_load_dest_only(alloc: &mut AllocInfo, sym: Symbol) -> CodegenResult<String> {
    match alloc.location(sym).ok_or_else(|| CodegenError::codegen("destination has no allocation"))? {
        Location::Register(r) => Ok(reg_name(r)),
        Location::Spilled => {
            let (scratch, _) = alloc.scratch_for(sym);
            Ok(reg_name(scratch))
        }
    }
}

/// Emits one procedure's prologue, body and epilogue into `sink`.
pub fn emit_procedure(
    sink: &mut AsmSink,
    label: &str,
    cfg: &ControlFlowGraph,
    function: Option<Symbol>,
    order: &dyn BlockOrder,
    emitter: &mut ProcedureEmitter,
) -> CodegenResult<()> {
    // `args_out` must reflect every call this procedure makes before the
    // prologue reserves the frame; `emit_call` itself runs too late, since by
    // then the `sub sp` line has already been written.
    let mut prescan_ids = order.order(cfg);
    prescan_ids.retain(|&id| cfg.get(id).function == function && !cfg.get(id).is_fake);
    for &id in &prescan_ids {
        for &stmt_id in &cfg.get(id).statements {
            if let StmtKind::Branch { target, returns: true, .. } = &emitter.stmts.get(stmt_id).kind {
                let callee_level = *emitter
                    .proc_levels
                    .get(target)
                    .ok_or_else(|| CodegenError::codegen("call target is not a known procedure"))?;
                emitter.layout.args_out.set_max_words(callee_level.saturating_sub(1));
            }
        }
    }

    sink.label(label);
    sink.instr("mov fp, sp");
    let frame_words = emitter.layout.frame_size();
    if frame_words > 0 {
        sink.instr(format!("sub sp, sp, #{}", frame_words * 4));
    }
    for r in &emitter.config.callee_saved_regs {
        sink.instr(format!("push {{{}}}", reg_name(*r)));
    }

    let mut block_ids = order.order(cfg);
    block_ids.retain(|&id| cfg.get(id).function == function && !cfg.get(id).is_fake);

    for id in block_ids {
        let block = cfg.get(id);
        let block_label = emitter.name_of(block.label_in);
        let statements = block.statements.clone();
        sink.label(&block_label);
        for stmt_id in statements {
            emitter.emit_statement(sink, stmt_id)?;
        }
    }

    sink.instr("mov sp, fp");
    for r in emitter.config.callee_saved_regs.iter().rev() {
        sink.instr(format!("pop {{{}}}", reg_name(*r)));
    }
    sink.instr("bx lr");
    Ok(())
}

/// Emits the `.comm` declarations for every global variable. Called once,
/// before any procedure body.
pub fn emit_globals(sink: &mut AsmSink, symbols: &SymbolPool, globals: &[Symbol]) -> CodegenResult<()> {
    let mut entries: Vec<(String, u32)> = Vec::new();
    for &sym in globals {
        if let Some(AllocationInfo::Global { prefixed_name, byte_size }) = &symbols.get(sym).alloc_info {
            entries.push((prefixed_name.clone(), *byte_size));
        }
    }
    entries.sort();
    for (name, size) in entries {
        sink.comm(&name, size);
    }
    Ok(())
}

pub fn format_header(version: &str) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "@ generated by pl0c-backend {version}");
    s
}
