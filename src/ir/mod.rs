//! Symbols, types and the parser's input tree.

pub mod program;
pub mod symbol;
pub mod tree;
pub mod types;

pub use program::Procedure;
pub use symbol::{AllocationClass, AllocationInfo, Lookup, Symbol, SymbolData, SymbolPool, SymbolTable, SymbolValue};
pub use tree::{Arena, BinOp, Node, NodeId, UnOp};
pub use types::{IntWidth, Signedness, Type};
