//! Error taxonomy for the back end.
//!
//! Every error here is an internal invariant violation: malformed input from
//! the parser reaches us as [`CodegenError::Ir`], but [7] is explicit that
//! there is no local recovery anywhere in the pipeline. A diagnostic
//! identifies the stage and the offending entity; it is never meant to be
//! shown as a user-facing compile error.

use std::fmt;

#[derive(Debug, Clone)]
pub enum CodegenError {
    /// Malformed IR: a lowered child disagreed with what its parent
    /// expected (e.g. an array used without an offset).
    Ir(String),
    /// Inconsistent block labels, a duplicate label assignment, or a
    /// liveness verification mismatch.
    Cfg(String),
    /// Attempt to mutate a frozen frame, a symbol missing from its section,
    /// or a statement whose operands aren't materializable.
    Codegen(String),
    /// A live-interval inconsistency surfaced by the allocator.
    Allocator(String),
}

impl CodegenError {
    pub fn ir(msg: impl Into<String>) -> Self {
        CodegenError::Ir(msg.into())
    }

    pub fn cfg(msg: impl Into<String>) -> Self {
        CodegenError::Cfg(msg.into())
    }

    pub fn codegen(msg: impl Into<String>) -> Self {
        CodegenError::Codegen(msg.into())
    }

    pub fn allocator(msg: impl Into<String>) -> Self {
        CodegenError::Allocator(msg.into())
    }
}

// Manually implementing Error and Display instead of pulling in thiserror,
// to keep this crate's own dependency footprint as small as the stack it
// borrows from.
impl std::error::Error for CodegenError {}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodegenError::Ir(m) => write!(f, "internal IR error: {m}"),
            CodegenError::Cfg(m) => write!(f, "internal CFG error: {m}"),
            CodegenError::Codegen(m) => write!(f, "internal codegen error: {m}"),
            CodegenError::Allocator(m) => write!(f, "internal allocator error: {m}"),
        }
    }
}

pub type CodegenResult<T> = Result<T, CodegenError>;
