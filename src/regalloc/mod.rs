//! Linear-scan register allocation, per [4.4].
//!
//! The allocator never reads a block's `live_in`/`live_out` — those exist
//! for liveness soundness checking only. It recomputes def/kill indices
//! directly from a flat instruction walk in `iteration_order`, the way
//! `LinearScanRegAlloc.compute_liveness_intervarls` does.

use rustc_hash::FxHashMap;

use crate::cfg::{BlockId, ControlFlowGraph};
use crate::ir::{Symbol, SymbolPool};
use crate::lower::stmt::StmtPool;
use crate::result::{CodegenError, CodegenResult};

/// One register's worth of storage, or the spill sentinel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Location {
    Register(u32),
    Spilled,
}

/// The two top register ids, reserved for rematerializing spilled operands.
/// Rotated on each materialization by [`AllocInfo::scratch_for`].
pub struct AllocInfo {
    var_to_reg: FxHashMap<Symbol, Location>,
    pub num_spilled: u32,
    pub nregs: u32,
    spill_slot: FxHashMap<Symbol, u32>,
    next_spill_offset: u32,
    scratch_cursor: u32,
}

impl AllocInfo {
    fn new(nregs: u32) -> Self {
        AllocInfo {
            var_to_reg: FxHashMap::default(),
            num_spilled: 0,
            nregs,
            spill_slot: FxHashMap::default(),
            next_spill_offset: 0,
            scratch_cursor: 0,
        }
    }

    pub fn location(&self, sym: Symbol) -> Option<Location> {
        self.var_to_reg.get(&sym).copied()
    }

    pub fn is_spilled(&self, sym: Symbol) -> bool {
        matches!(self.location(sym), Some(Location::Spilled))
    }

    /// Rotates between the two registers reserved at the top of the file.
    /// Used both for spilled-operand reloads and for address materialization
    /// of named (non-register) memory operands.
    pub fn scratch_register(&mut self) -> u32 {
        let reg = self.nregs - 2 + self.scratch_cursor;
        self.scratch_cursor = (self.scratch_cursor + 1) % 2;
        reg
    }

    /// Reserves a spill slot for `sym`, if it doesn't already have one.
    /// Called from `allocate`'s own loop, in interval order, so frame
    /// layout can size `spill` right after allocation finishes rather than
    /// waiting on emission to visit every spilled operand.
    fn reserve_spill_slot(&mut self, sym: Symbol) -> u32 {
        *self.spill_slot.entry(sym).or_insert_with(|| {
            let o = self.next_spill_offset;
            self.next_spill_offset += 4;
            o
        })
    }

    /// Assigns the next scratch register and looks up `sym`'s spill slot,
    /// reserved by `allocate` when `sym` was marked spilled.
    pub fn scratch_for(&mut self, sym: Symbol) -> (u32, u32) {
        let reg = self.scratch_register();
        let offset = self.reserve_spill_slot(sym);
        (reg, offset)
    }

    pub fn spill_room(&self) -> u32 {
        self.next_spill_offset
    }
}

struct Interval {
    symbol: Symbol,
    def: u32,
    kill: u32,
}

/// Flattens one procedure's blocks (in `block_ids`' iteration order) into a
/// single instruction stream and records, per register-class symbol, its
/// first def index and last use-or-def index. Allocation runs one procedure
/// at a time — distinct procedures never coexist in the register file, so
/// there is nothing to gain (and a lazily-growing spill counter to lose) by
/// flattening the whole program into one interval set.
fn compute_intervals(cfg: &ControlFlowGraph, stmts: &StmtPool, symbols: &SymbolPool, block_ids: &[BlockId]) -> Vec<Interval> {
    let mut min_def: FxHashMap<Symbol, u32> = FxHashMap::default();
    let mut max_use: FxHashMap<Symbol, u32> = FxHashMap::default();
    let mut seen_order: Vec<Symbol> = Vec::new();

    let mut index = 0u32;
    for &block_id in block_ids {
        let block = cfg.get(block_id);
        for &stmt_id in &block.statements {
            let stat = stmts.get(stmt_id);
            let defined = stat.defined_with(symbols);
            let used = stat.used_with(symbols);

            for &d in defined.iter().filter(|s| symbols.is_register(**s)) {
                if !min_def.contains_key(&d) {
                    min_def.insert(d, index);
                    max_use.insert(d, index);
                    seen_order.push(d);
                }
            }
            for &u in used.iter().filter(|s| symbols.is_register(**s)) {
                max_use.insert(u, index);
                if !min_def.contains_key(&u) {
                    // Used before any def we recorded (e.g. cross-block):
                    // treat the first sighting as its definition point too.
                    min_def.insert(u, index);
                    seen_order.push(u);
                }
            }
            index += 1;
        }
    }

    let mut intervals: Vec<Interval> = seen_order
        .into_iter()
        .map(|s| Interval { symbol: s, def: min_def[&s], kill: max_use[&s] })
        .collect();
    intervals.sort_by_key(|iv| iv.def);
    intervals
}

/// Runs linear-scan allocation over one procedure's instructions, visited in
/// `block_ids` order, per [4.4]. `nregs` must be at least 3 (one usable
/// register plus the two scratch registers). Callers allocate one procedure
/// (or the global block) at a time, each with its own [`AllocInfo`].
pub fn allocate(cfg: &ControlFlowGraph, stmts: &StmtPool, symbols: &SymbolPool, block_ids: &[BlockId], nregs: u32) -> CodegenResult<AllocInfo> {
    if nregs < 3 {
        return Err(CodegenError::allocator("nregs must leave at least one non-scratch register"));
    }

    let intervals = compute_intervals(cfg, stmts, symbols, block_ids);
    let mut info = AllocInfo::new(nregs);

    let mut active: Vec<usize> = Vec::new(); // indices into `intervals`, sorted by kill ascending
    let mut free_regs: Vec<u32> = (0..nregs - 2).collect();
    free_regs.reverse(); // pop() takes the lowest id first

    for (i, v) in intervals.iter().enumerate() {
        active.retain(|&j| {
            let w = &intervals[j];
            if w.kill < v.def {
                if let Some(Location::Register(r)) = info.location(w.symbol) {
                    free_regs.push(r);
                }
                false
            } else {
                true
            }
        });
        free_regs.sort_unstable_by(|a, b| b.cmp(a));

        if free_regs.is_empty() {
            let &last = active.last().ok_or_else(|| CodegenError::allocator("spill requested with no active interval to steal from"))?;
            let w = &intervals[last];
            if w.kill > v.kill {
                let stolen = match info.location(w.symbol) {
                    Some(Location::Register(r)) => r,
                    _ => return Err(CodegenError::allocator("active interval has no register to steal")),
                };
                info.var_to_reg.insert(v.symbol, Location::Register(stolen));
                info.var_to_reg.insert(w.symbol, Location::Spilled);
                info.reserve_spill_slot(w.symbol);
                active.pop();
                active.push(i);
                #[cfg(feature = "trace-log")]
                log::trace!("{:?} steals r{stolen} from {:?}, which spills", v.symbol, w.symbol);
            } else {
                info.var_to_reg.insert(v.symbol, Location::Spilled);
                info.reserve_spill_slot(v.symbol);
                #[cfg(feature = "trace-log")]
                log::trace!("{:?} spills directly, its interval outlives every active candidate", v.symbol);
            }
            info.num_spilled += 1;
        } else {
            let r = free_regs.pop().unwrap();
            info.var_to_reg.insert(v.symbol, Location::Register(r));
            active.push(i);
            #[cfg(feature = "trace-log")]
            log::trace!("{:?} materializes into r{r}", v.symbol);
        }
        active.sort_by_key(|&j| intervals[j].kill);
    }

    Ok(info)
}
