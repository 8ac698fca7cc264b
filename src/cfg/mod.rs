//! Basic blocks and the control-flow graph they form.

pub mod block;
pub mod graph;
pub mod order;

pub use block::{BasicBlock, BlockId};
pub use graph::{build, ControlFlowGraph};
pub use order::{BlockOrder, ReversePostorder};
