//! Common module for library exports

pub use crate::config::SymbolServiceConfig;
pub use crate::error::{SymbolError, SymbolResult};
pub use crate::path::{ParsedSymbolPath, SourceKind, SymbolPathParser, SymbolSourceSpec};
pub use crate::service::{SymbolService, SymbolServiceBuilder};
pub use crate::symbols::{
    ImageLayout, LoadRequest, MetadataFill, MetadataRequest, ScopedSymbolHandle, SymbolHandle, SymbolTable,
};
pub use crate::types::{LineInfo, ModuleIdentity, SequencePoint, SymbolFormat, SymbolOrigin};
