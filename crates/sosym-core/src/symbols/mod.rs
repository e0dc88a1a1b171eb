//! # Symbols
//!
//! Symbol file acquisition, caching and queries.
//!
//! - [`image`]: managed PE image inspection (CodeView, embedded PDB, metadata)
//! - [`key`]: symbol store index keys
//! - [`transport`]: symbol server fetching and cache population
//! - [`parser`]: the symbol file parser capability
//! - [`resolver`]: walks symbol sources for one module
//! - [`cache`]: handle table keyed by module identity
//! - [`query`]: read-only queries over a handle
//! - [`expression`]: expression-to-address evaluation
//! - [`locator`]: image and metadata location for native callers

pub mod cache;
pub mod expression;
pub mod image;
pub mod key;
pub mod locator;
pub mod parser;
pub mod query;
pub mod resolver;
pub mod table;
pub mod transport;

pub use cache::{ModuleSymbolCache, ScopedSymbolHandle, SymbolHandle};
pub use expression::{ExpressionHost, GlobalSymbols};
pub use image::{CodeViewRecord, FileImageReader, ImageLayout, ManagedImage, ModuleImageReader};
pub use key::SymbolStoreKey;
pub use locator::{MetadataFill, MetadataLocatorBridge, MetadataRequest};
pub use parser::{sniff_format, HeaderOnlyParser, SymbolFileParser};
pub use query::SymbolQueryEngine;
pub use resolver::{LoadRequest, ResolveSymbols, ResolvedSymbols, SymbolFileCallback, SymbolSourceResolver};
pub use table::{LocalScope, LocalVariable, MethodSymbols, SymbolTable};
pub use transport::{FileShareTransport, SymbolTransport};
