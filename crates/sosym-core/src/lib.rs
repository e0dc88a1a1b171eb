//! # sosym-core
//!
//! Symbol loading and query engine for managed (.NET) modules.
//!
//! Given a managed module seen by a debugger, this crate locates its symbols
//! (Windows PDB or portable PDB) and answers the questions a debugger asks
//! while the target is stopped:
//!
//! - Which source line does this IL offset belong to?
//! - What is local variable slot N called?
//! - Which IL offset does a source line start at?
//! - Where is this module's metadata, when the target doesn't contain it?
//!
//! ## Components
//!
//! - [`path`]: symbol path parsing (`srv*cache*url;C:\symbols;...`)
//! - [`symbols::SymbolSourceResolver`]: walks sources for one module
//! - [`symbols::ModuleSymbolCache`]: handle table keyed by module identity
//! - [`symbols::SymbolQueryEngine`]: read-only queries over a handle
//! - [`symbols::MetadataLocatorBridge`]: image/metadata location
//! - [`service::SymbolService`]: the session object tying them together
//!
//! ## What the host supplies
//!
//! Decoding PDB files, talking HTTP to remote symbol servers and reading
//! target memory are capabilities the host plugs in through the
//! [`symbols::SymbolFileParser`], [`symbols::SymbolTransport`] and
//! [`symbols::ModuleImageReader`] traits. Built-in implementations cover
//! signature checks, file share stores and images on disk.

pub mod config;
pub mod error;
pub mod path;
pub mod prelude;
pub mod service;
pub mod symbols;
pub mod types;

// Re-export commonly used types
pub use config::SymbolServiceConfig;
pub use error::{SymbolError, SymbolResult};
pub use service::{SymbolService, SymbolServiceBuilder};
pub use symbols::SymbolHandle;
pub use types::ModuleIdentity;
