//! Back-end code generator for a PL/0-style compiler.
//!
//! A front end hands this crate a parsed [`ir::tree::Arena`], an
//! [`ir::Procedure`] declaration tree and one [`ir::SymbolTable`] per
//! lexical level; [`context::Context::compile`] lowers that into
//! three-address statements, builds the whole-program control-flow graph,
//! runs liveness and linear-scan register allocation, lays out each
//! procedure's stack frame, and emits assembly text.
//!
//! Every stage is exposed as its own module so it can be driven and tested
//! independently of the others: [`lower`] turns the IR tree into
//! [`lower::stmt::StmtKind`] statements, [`cfg`] groups them into
//! [`cfg::BasicBlock`]s, [`liveness`] computes `live_in`/`live_out` sets,
//! [`regalloc`] assigns registers, [`frame`] places data and sizes stack
//! sections, and [`emit`] renders the final text.

pub mod cfg;
pub mod context;
pub mod emit;
pub mod frame;
pub mod ir;
pub mod liveness;
pub mod lower;
pub mod regalloc;
pub mod result;

pub use context::Context;
pub use emit::EmitConfig;
pub use result::{CodegenError, CodegenResult};
