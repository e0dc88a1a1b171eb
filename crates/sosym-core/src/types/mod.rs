//! # Types
//!
//! Value types shared by every part of the engine: module identities used as
//! cache keys, and the sequence point / location types returned by queries.

pub mod identity;
pub mod symbols;

// Re-export all public types
pub use identity::{ImageKey, ModuleIdentity, PdbKey};
pub use symbols::{LineInfo, SequencePoint, SymbolFormat, SymbolOrigin, HIDDEN_LINE};
