//! Symbols and symbol tables.
//!
//! A [`Symbol`] is an opaque reference into a [`SymbolPool`], following the
//! same entity-reference discipline Cranelift uses for `Value`/`Block`: a
//! 32-bit index rather than a shared, mutable pointer. Two symbols compare
//! equal only when they are the same pool entry, which gives us "compare by
//! identity, not name" for free — two `x` locals in different scopes are
//! distinct `Symbol`s even though `SymbolData::name` coincides.

use cranelift_entity::{entity_impl, PrimaryMap};
use std::fmt;

use crate::ir::types::Type;

/// Opaque reference to a [`SymbolData`] in a [`SymbolPool`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);
entity_impl!(Symbol, "sym");

/// Where a symbol's storage lives.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocationClass {
    /// Ordinary named variable; placed by frame layout into a stack section
    /// or a global `.comm`.
    Auto,
    /// Register temporary produced and consumed by lowering. Never appears
    /// in a symbol table and is the only class eligible for allocation.
    Reg,
    /// Compile-time immediate; never materialized as storage.
    Imm,
}

/// A compile-time value carried by a symbol, used for immediates and for a
/// label's target statement.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SymbolValue {
    None,
    Immediate(i64),
    /// The basic block a label designates, filled in once block
    /// construction has run.
    LabelTarget(crate::cfg::block::BlockId),
}

/// Resolved storage location of an `Auto`-class symbol, computed during
/// frame layout. `None` until [`crate::frame`] has placed the symbol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllocationInfo {
    Global { prefixed_name: String, byte_size: u32 },
    Local { prefixed_name: String, offset: i32, byte_size: u32, level: u32 },
}

/// The data behind a [`Symbol`] reference.
#[derive(Clone, Debug)]
pub struct SymbolData {
    pub name: String,
    pub ty: Type,
    pub value: SymbolValue,
    pub alloc_class: AllocationClass,
    pub alloc_info: Option<AllocationInfo>,
    /// Lexical depth of the defining scope. `None` for register temporaries
    /// and for the two runtime entry points, which are addressed by name
    /// rather than by frame offset.
    pub level: Option<u32>,
}

impl SymbolData {
    fn named(name: impl Into<String>, ty: Type, alloc_class: AllocationClass) -> Self {
        SymbolData {
            name: name.into(),
            ty,
            value: SymbolValue::None,
            alloc_class,
            alloc_info: None,
            level: None,
        }
    }
}

impl fmt::Display for SymbolData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {} {}", self.alloc_class, self.ty, self.name)
    }
}

/// Owns every [`SymbolData`] created during compilation, addressed by
/// [`Symbol`]. A single pool is shared by every [`SymbolTable`] and by the
/// register-temporary and label-id counters, mirroring the spec's
/// requirement that monotonic id counters live on the compilation context
/// rather than as process-global state.
#[derive(Default)]
pub struct SymbolPool {
    data: PrimaryMap<Symbol, SymbolData>,
    next_temp: u32,
    next_label: u32,
}

impl SymbolPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sym: Symbol) -> &SymbolData {
        &self.data[sym]
    }

    pub fn get_mut(&mut self, sym: Symbol) -> &mut SymbolData {
        &mut self.data[sym]
    }

    pub fn declare(&mut self, name: impl Into<String>, ty: Type, alloc_class: AllocationClass) -> Symbol {
        self.data.push(SymbolData::named(name, ty, alloc_class))
    }

    /// Mint a fresh `class=Reg` temporary. Temporaries never carry a level
    /// and never enter a [`SymbolTable`].
    pub fn new_temporary(&mut self, ty: Type) -> Symbol {
        let id = self.next_temp;
        self.next_temp += 1;
        self.data.push(SymbolData::named(format!("t{id}"), ty, AllocationClass::Reg))
    }

    /// Mint a fresh label symbol, optionally pre-bound to a block.
    pub fn new_label(&mut self) -> Symbol {
        let id = self.next_label;
        self.next_label += 1;
        self.data.push(SymbolData::named(
            format!("label_{id}"),
            Type::Label,
            AllocationClass::Auto,
        ))
    }

    pub fn is_register(&self, sym: Symbol) -> bool {
        self.data[sym].alloc_class == AllocationClass::Reg
    }

    pub fn is_global(&self, sym: Symbol) -> bool {
        matches!(self.data[sym].level, Some(0))
    }
}

/// A lexically-scoped table of symbols, chained to its parent.
///
/// `level = 0` is the global table; each nested scope increments. Lookup
/// walks the parent chain and reports whether the found symbol lives in the
/// current scope (`direct`) or was resolved through an ancestor, which is
/// what later lets codegen decide whether a static-link indirection is
/// needed.
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    parent: Option<Box<SymbolTable>>,
    level: u32,
}

/// Outcome of a [`SymbolTable::lookup`]: the symbol, plus whether it was
/// found in the table that was asked (`Direct`) or in some ancestor
/// (`Indirect`, carrying the defining level so codegen can compute how many
/// static-link hops are required).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    Direct(Symbol),
    Indirect(Symbol, u32),
}

impl Lookup {
    pub fn symbol(self) -> Symbol {
        match self {
            Lookup::Direct(s) | Lookup::Indirect(s, _) => s,
        }
    }
}

impl SymbolTable {
    pub fn global() -> Self {
        SymbolTable { symbols: Vec::new(), parent: None, level: 0 }
    }

    pub fn child(self) -> Self {
        let level = self.level + 1;
        SymbolTable { symbols: Vec::new(), parent: Some(Box::new(self)), level }
    }

    /// Pop back to the enclosing scope, handing ownership of `self` back out
    /// so the caller can keep threading the chain.
    pub fn into_parent(self) -> Option<SymbolTable> {
        self.parent.map(|p| *p)
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn insert(&mut self, pool: &mut SymbolPool, sym: Symbol) {
        debug_assert!(pool.get(sym).alloc_class != AllocationClass::Reg, "register temporaries never join a symbol table");
        pool.get_mut(sym).level = Some(self.level);
        self.symbols.push(sym);
    }

    pub fn lookup(&self, pool: &SymbolPool, name: &str) -> Option<Lookup> {
        self.lookup_at(pool, name, self.level)
    }

    fn lookup_at(&self, pool: &SymbolPool, name: &str, origin_level: u32) -> Option<Lookup> {
        for &s in &self.symbols {
            if pool.get(s).name == name {
                return Some(if self.level == origin_level {
                    Lookup::Direct(s)
                } else {
                    Lookup::Indirect(s, self.level)
                });
            }
        }
        self.parent.as_ref().and_then(|p| p.lookup_at(pool, name, origin_level))
    }

    pub fn iter(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.symbols.iter().copied()
    }

    /// Non-function, non-label symbols of the global table — the set that
    /// must stay live across every function exit.
    pub fn global_data_symbols(&self, pool: &SymbolPool) -> Vec<Symbol> {
        let global = self.ancestor_at(0);
        global
            .symbols
            .iter()
            .copied()
            .filter(|&s| !matches!(pool.get(s).ty, Type::Function | Type::Label))
            .collect()
    }

    fn ancestor_at(&self, level: u32) -> &SymbolTable {
        if self.level == level {
            self
        } else {
            self.parent.as_ref().expect("level below root").ancestor_at(level)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_distinguishes_direct_and_indirect() {
        let mut pool = SymbolPool::new();
        let mut global = SymbolTable::global();
        let x = pool.declare("x", Type::INT, AllocationClass::Auto);
        global.insert(&mut pool, x);

        let mut inner = global.child();
        let y = pool.declare("y", Type::INT, AllocationClass::Auto);
        inner.insert(&mut pool, y);

        assert_eq!(inner.lookup(&pool, "y"), Some(Lookup::Direct(y)));
        assert_eq!(inner.lookup(&pool, "x"), Some(Lookup::Indirect(x, 0)));
        assert_eq!(inner.lookup(&pool, "nope"), None);
    }

    #[test]
    fn symbols_compare_by_identity_not_name() {
        let mut pool = SymbolPool::new();
        let a = pool.declare("x", Type::INT, AllocationClass::Auto);
        let b = pool.declare("x", Type::INT, AllocationClass::Auto);
        assert_ne!(a, b);
    }
}
