//! Lowered statements: three-address instructions one step above assembly.
//!
//! [`StmtKind`] is the tagged sum type the design notes call for; `emit`,
//! `get_used`/`get_defined` and `prepare_layout`-style operations dispatch on
//! the tag rather than through a trait object, since the full set of
//! variants is closed and known up front.

use cranelift_entity::{entity_impl, PrimaryMap};
use smallvec::SmallVec;
use std::fmt;

use crate::ir::{BinOp, Symbol, SymbolPool, UnOp};

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(u32);
entity_impl!(StmtId, "stmt");

/// Small, stack-allocated use/def sets: almost every lowered statement reads
/// or writes at most two symbols, so a `SmallVec` avoids a heap allocation
/// per instruction in the common case.
pub type SymSet = SmallVec<[Symbol; 2]>;

#[derive(Clone, Debug)]
pub enum StmtKind {
    LoadImm { dest: Symbol, value: i64 },
    /// Load into `dest`. If `symbol` is itself a register, this is an
    /// indirect load through the pointer it holds (`dest <- MEM[*symbol]`);
    /// otherwise it is a direct load of a named variable.
    Load { dest: Symbol, symbol: Symbol },
    /// Store `symbol`'s value. If `dest` is a register, it holds the target
    /// *address* (`MEM[*dest] <- symbol`, an indirect store through a
    /// pointer produced by `LoadAddr`+`BinOp`); otherwise `dest` is itself
    /// the named variable being written.
    Store { dest: Symbol, symbol: Symbol },
    /// `dest <- &symbol`.
    LoadAddr { dest: Symbol, symbol: Symbol },
    BinOp { dest: Symbol, op: BinOp, lhs: Symbol, rhs: Symbol },
    UnaryOp { dest: Symbol, op: UnOp, src: Symbol },
    /// A jump, conditional jump, or call. `returns == true` marks a call to
    /// `target` that the control flow falls back through; otherwise this is
    /// a plain (conditional) jump to `target`.
    Branch { target: Symbol, condition: Option<Symbol>, negated: bool, returns: bool },
    /// A no-op that exists only to carry an incoming label.
    Empty,
    /// Call to the runtime's `__pl0_print`, passing `src`.
    Print { src: Symbol },
    /// Call to the runtime's `__pl0_read`, returning into `dest`.
    Read { dest: Symbol },
}

/// A lowered statement: a [`StmtKind`] plus the label it may be the target
/// of. Structurally immutable once created — only the label may be attached
/// after the fact, by block construction when a statement needs a
/// synthesized one.
#[derive(Clone, Debug)]
pub struct LoweredStat {
    pub label: Option<Symbol>,
    pub kind: StmtKind,
}

impl LoweredStat {
    pub fn new(kind: StmtKind) -> Self {
        LoweredStat { label: None, kind }
    }

    pub fn set_label(&mut self, label: Symbol) {
        self.label = Some(label);
    }

    /// The symbol this statement's result is (or would be) named by, for the
    /// lowering traversal to read back from a lowered child. `Branch`,
    /// `Empty` and `Print` have no destination.
    pub fn destination(&self) -> Option<Symbol> {
        match &self.kind {
            StmtKind::LoadImm { dest, .. }
            | StmtKind::Load { dest, .. }
            | StmtKind::LoadAddr { dest, .. }
            | StmtKind::BinOp { dest, .. }
            | StmtKind::UnaryOp { dest, .. }
            | StmtKind::Read { dest } => Some(*dest),
            StmtKind::Store { .. } | StmtKind::Branch { .. } | StmtKind::Empty | StmtKind::Print { .. } => None,
        }
    }

    /// Symbols read by this statement, assuming a direct store (`dest` is a
    /// named variable, not a pointer register). Use [`Self::used_with`] when
    /// a [`SymbolPool`] is available to get `Store`'s indirect case right.
    pub fn get_used(&self) -> SymSet {
        match &self.kind {
            StmtKind::LoadImm { .. } => SymSet::new(),
            StmtKind::Load { symbol, .. } => SymSet::from_elem(*symbol, 1),
            StmtKind::Store { symbol, .. } => SymSet::from_elem(*symbol, 1),
            StmtKind::LoadAddr { symbol, .. } => SymSet::from_elem(*symbol, 1),
            StmtKind::BinOp { lhs, rhs, .. } => {
                let mut s = SymSet::new();
                s.push(*lhs);
                s.push(*rhs);
                s
            }
            StmtKind::UnaryOp { src, .. } => SymSet::from_elem(*src, 1),
            StmtKind::Branch { condition, .. } => condition.map(|c| SymSet::from_elem(c, 1)).unwrap_or_default(),
            StmtKind::Empty => SymSet::new(),
            StmtKind::Print { src } => SymSet::from_elem(*src, 1),
            StmtKind::Read { .. } => SymSet::new(),
        }
    }

    pub fn get_defined(&self) -> SymSet {
        match &self.kind {
            StmtKind::LoadImm { dest, .. }
            | StmtKind::LoadAddr { dest, .. }
            | StmtKind::BinOp { dest, .. }
            | StmtKind::UnaryOp { dest, .. }
            | StmtKind::Read { dest } => SymSet::from_elem(*dest, 1),
            StmtKind::Load { dest, .. } => SymSet::from_elem(*dest, 1),
            StmtKind::Store { dest, .. } => SymSet::from_elem(*dest, 1),
            StmtKind::Branch { .. } | StmtKind::Empty | StmtKind::Print { .. } => SymSet::new(),
        }
    }

    /// Pool-aware variants of `get_used`/`get_defined`: `Store`'s semantics
    /// hinge on whether `dest` is a register (indirect store) or a named
    /// variable (direct store), which only the pool can tell us.
    pub fn used_with(&self, pool: &SymbolPool) -> SymSet {
        if let StmtKind::Store { dest, symbol } = &self.kind {
            let mut s = SymSet::new();
            s.push(*symbol);
            if pool.is_register(*dest) {
                s.push(*dest);
            }
            return s;
        }
        self.get_used()
    }

    pub fn defined_with(&self, pool: &SymbolPool) -> SymSet {
        if let StmtKind::Store { dest, .. } = &self.kind {
            return if pool.is_register(*dest) { SymSet::new() } else { SymSet::from_elem(*dest, 1) };
        }
        self.get_defined()
    }

    pub fn is_unconditional_branch(&self) -> bool {
        matches!(self.kind, StmtKind::Branch { condition: None, returns: false, .. })
    }

    pub fn is_conditional_branch(&self) -> bool {
        matches!(self.kind, StmtKind::Branch { condition: Some(_), .. })
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, StmtKind::Branch { returns: true, .. } | StmtKind::Print { .. } | StmtKind::Read { .. })
    }

    pub fn branch_target(&self) -> Option<Symbol> {
        match &self.kind {
            StmtKind::Branch { target, .. } => Some(*target),
            StmtKind::Print { .. } | StmtKind::Read { .. } => None,
            _ => None,
        }
    }

    pub fn display<'a>(&'a self, pool: &'a SymbolPool) -> StmtDisplay<'a> {
        StmtDisplay { stmt: self, pool }
    }
}

pub struct StmtDisplay<'a> {
    stmt: &'a LoweredStat,
    pool: &'a SymbolPool,
}

impl fmt::Display for StmtDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |s: Symbol| self.pool.get(s).name.clone();
        if let Some(l) = self.stmt.label {
            write!(f, "{}: ", name(l))?;
        }
        match &self.stmt.kind {
            StmtKind::LoadImm { dest, value } => write!(f, "{} <- IMM[{}]", name(*dest), value),
            StmtKind::Load { dest, symbol } => write!(f, "{} <- MEM[{}]", name(*dest), name(*symbol)),
            StmtKind::Store { dest, symbol } => {
                if self.pool.is_register(*dest) {
                    write!(f, "MEM[*{}] <- {}", name(*dest), name(*symbol))
                } else {
                    write!(f, "MEM[{}] <- {}", name(*dest), name(*symbol))
                }
            }
            StmtKind::LoadAddr { dest, symbol } => write!(f, "{} <- ADDR[{}]", name(*dest), name(*symbol)),
            StmtKind::BinOp { dest, op, lhs, rhs } => write!(f, "{} <- {} {:?} {}", name(*dest), name(*lhs), op, name(*rhs)),
            StmtKind::UnaryOp { dest, op, src } => write!(f, "{} <- {:?} {}", name(*dest), op, name(*src)),
            StmtKind::Branch { target, condition, negated, returns } => {
                let verb = if *returns { "call" } else { "jump to" };
                write!(f, "{verb} {}", name(*target))?;
                if let Some(c) = condition {
                    write!(f, " if {}{}", if *negated { "not " } else { "" }, name(*c))?;
                }
                Ok(())
            }
            StmtKind::Empty => write!(f, "nop"),
            StmtKind::Print { src } => write!(f, "print {}", name(*src)),
            StmtKind::Read { dest } => write!(f, "{} <- read", name(*dest)),
        }
    }
}

/// Owns every lowered statement produced during the lowering pass.
#[derive(Default)]
pub struct StmtPool {
    stmts: PrimaryMap<StmtId, LoweredStat>,
}

impl StmtPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stmt: LoweredStat) -> StmtId {
        self.stmts.push(stmt)
    }

    pub fn get(&self, id: StmtId) -> &LoweredStat {
        &self.stmts[id]
    }

    pub fn get_mut(&mut self, id: StmtId) -> &mut LoweredStat {
        &mut self.stmts[id]
    }
}
