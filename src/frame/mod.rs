//! Stack frame layout, per [4.5].
//!
//! Section order is fixed by the spec, not data-driven like the original's
//! name-keyed section list — there is exactly one layout shape in this
//! language, so the seven sections are fields rather than entries in a map.

use rustc_hash::FxHashMap;

use crate::ir::{Symbol, SymbolPool, SymbolTable, Type};
use crate::result::{CodegenError, CodegenResult};

/// A contiguous, monotonically-growing region of one frame. `max_size` is
/// the section's high-water mark (invariant 7): it only ever increases.
#[derive(Default, Clone)]
pub struct StackSection {
    size: u32,
    max_size: u32,
    symbols: FxHashMap<Symbol, u32>,
}

impl StackSection {
    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    fn bump(&mut self, words: u32) {
        self.size += words;
        self.max_size = self.max_size.max(self.size);
    }

    pub fn grow_words(&mut self, words: u32) {
        self.bump(words);
    }

    /// Raises the high-water mark to `words` without touching the running
    /// `size` total — for sections sized by "maximum across call sites"
    /// rather than by a running sum (`regsave_out`, `args_out`).
    pub fn set_max_words(&mut self, words: u32) {
        self.max_size = self.max_size.max(words);
    }

    /// Reserves space for `sym` if it isn't already present. Idempotent per
    /// symbol, as [4.5] requires for lazy spill-slot growth.
    pub fn grow_symbol(&mut self, sym: Symbol, pool: &SymbolPool) -> bool {
        if self.symbols.contains_key(&sym) {
            return false;
        }
        let words = words_for(&pool.get(sym).ty);
        self.symbols.insert(sym, self.size);
        self.bump(words);
        true
    }

    pub fn offset_of(&self, sym: Symbol) -> Option<u32> {
        self.symbols.get(&sym).copied()
    }
}

fn words_for(ty: &Type) -> u32 {
    let bits = ty.byte_size() * 8;
    bits.div_ceil(32).max(1)
}

/// A procedure's (or the global block's) frame, under construction.
pub struct StackLayout {
    pub level: u32,
    parent: Option<FrozenLayout>,
    pub level_ref: StackSection,
    pub args_in: StackSection,
    pub regsave_in: StackSection,
    pub local_vars: StackSection,
    pub spill: StackSection,
    pub regsave_out: StackSection,
    pub args_out: StackSection,
}

/// Read-only view of a finished parent frame, handed to nested procedures so
/// they can resolve static-link offsets and outer locals without being able
/// to perturb the parent's own layout. [4.5] limits this to `args_in` and
/// `local_vars` — the only sections a child ever needs to read through.
#[derive(Clone)]
pub struct FrozenLayout {
    pub level: u32,
    pub args_in: StackSection,
    pub local_vars: StackSection,
}

impl StackLayout {
    pub fn new(level: u32, parent: Option<FrozenLayout>) -> Self {
        let level_ref_words = level.saturating_sub(1);
        let mut level_ref = StackSection::default();
        if level_ref_words > 0 {
            level_ref.grow_words(level_ref_words);
        }
        StackLayout {
            level,
            parent,
            level_ref,
            args_in: StackSection::default(),
            regsave_in: StackSection::default(),
            local_vars: StackSection::default(),
            spill: StackSection::default(),
            regsave_out: StackSection::default(),
            args_out: StackSection::default(),
        }
    }

    pub fn parent(&self) -> Option<&FrozenLayout> {
        self.parent.as_ref()
    }

    /// Offset of a before-FP section's own storage, from FP, growing
    /// negative away from it (caller territory).
    fn before_offset(&self, sizes_before: u32, own_max: u32) -> i32 {
        -((sizes_before + own_max) as i32)
    }

    pub fn level_ref_offset(&self) -> i32 {
        self.before_offset(0, self.level_ref.max_size())
    }

    /// Byte offset from this frame's own FP of the static-link slot holding
    /// the FP of the ancestor at `ancestor_level` (`1 <= ancestor_level <
    /// self.level`; level 0 needs no slot, globals are addressed by name).
    pub fn level_ref_slot_offset(&self, ancestor_level: u32) -> CodegenResult<i32> {
        if ancestor_level == 0 || ancestor_level >= self.level {
            return Err(CodegenError::codegen("static-link slot requested for a non-strict ancestor level"));
        }
        let index = ancestor_level - 1;
        Ok((self.level_ref_offset() + index as i32) * 4)
    }

    pub fn args_in_offset(&self) -> i32 {
        self.before_offset(self.level_ref.max_size(), self.args_in.max_size())
    }

    /// Offset (in words) of an after-FP section's own storage, from FP: the
    /// cumulative sizes of every section between FP and this one, plus this
    /// section's own high-water mark, negated. `sub sp, sp, #frame_size*4`
    /// only ever reserves the negative side of FP, so every after-FP section
    /// — like `local_vars`, whose own per-symbol offsets in [`layout_data`]
    /// are already negative — has to live there too.
    fn after_offset(&self, sizes_before: u32, own_max: u32) -> i32 {
        -((sizes_before + own_max) as i32)
    }

    pub fn regsave_in_offset(&self) -> i32 {
        self.after_offset(0, self.regsave_in.max_size())
    }

    pub fn local_vars_offset(&self) -> i32 {
        self.after_offset(self.regsave_in.max_size(), self.local_vars.max_size())
    }

    pub fn spill_offset(&self) -> i32 {
        self.after_offset(self.regsave_in.max_size() + self.local_vars.max_size(), self.spill.max_size())
    }

    pub fn regsave_out_offset(&self) -> i32 {
        self.after_offset(self.regsave_in.max_size() + self.local_vars.max_size() + self.spill.max_size(), self.regsave_out.max_size())
    }

    pub fn args_out_offset(&self) -> i32 {
        self.after_offset(
            self.regsave_in.max_size() + self.local_vars.max_size() + self.spill.max_size() + self.regsave_out.max_size(),
            self.args_out.max_size(),
        )
    }

    /// Byte offset, from this frame's own FP, of the `index`-th outbound
    /// static-link word reserved in `args_out`.
    pub fn args_out_slot_offset(&self, index: u32) -> i32 {
        (self.args_out_offset() + index as i32) * 4
    }

    /// Sum of every after-FP section's high-water mark, in words: the
    /// magnitude `sub sp, sp, #` subtracts, regardless of how those
    /// sections' own offsets are signed.
    pub fn frame_size(&self) -> u32 {
        self.regsave_in.max_size() + self.local_vars.max_size() + self.spill.max_size() + self.regsave_out.max_size() + self.args_out.max_size()
    }

    pub fn freeze(&self) -> FrozenLayout {
        FrozenLayout { level: self.level, args_in: self.args_in.clone(), local_vars: self.local_vars.clone() }
    }
}

/// Walks a symbol table directly (never the instruction stream) to place
/// every `Auto`-class symbol it declares, per [`CodeContainers.perform_data_layout`]:
/// globals get a `.comm`-shaped [`AllocationInfo::Global`](crate::ir::AllocationInfo::Global);
/// locals get negative, decreasing offsets into `local_vars`.
pub fn layout_data(table: &SymbolTable, pool: &mut SymbolPool, layout: Option<&mut StackLayout>) -> CodegenResult<()> {
    if table.level() == 0 {
        for sym in table.iter() {
            let data = pool.get(sym);
            if data.ty.byte_size() == 0 {
                continue;
            }
            let prefixed_name = format!("_g_{}", data.name);
            let byte_size = data.ty.byte_size();
            pool.get_mut(sym).alloc_info =
                Some(crate::ir::AllocationInfo::Global { prefixed_name, byte_size });
        }
        return Ok(());
    }

    let layout = layout.ok_or_else(|| CodegenError::codegen("local data layout requires a frame"))?;
    let mut offset: i32 = 0;
    for sym in table.iter() {
        let data = pool.get(sym);
        if data.ty.byte_size() == 0 {
            continue;
        }
        let byte_size = data.ty.byte_size();
        offset -= byte_size as i32;
        layout.local_vars.grow_words(words_for(&data.ty));
        let prefixed_name = format!("_l_{}", data.name);
        pool.get_mut(sym).alloc_info = Some(crate::ir::AllocationInfo::Local {
            prefixed_name,
            offset,
            byte_size,
            level: table.level(),
        });
    }
    Ok(())
}
