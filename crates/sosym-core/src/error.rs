//! # Error Types
//!
//! Error handling for the symbol engine.
//!
//! "No symbols" is not an error: lookups that can legitimately come up empty
//! return `Option`, and only contract violations or configuration problems
//! surface as [`SymbolError`]. Per-source failures (`SourceUnreachable`,
//! `MalformedSymbolData`) are produced inside the resolver, logged, and folded
//! into a plain "not found" before they reach the caller.

use std::fmt;

use thiserror::Error;

/// Main error type for symbol engine operations
///
/// ## Error Categories
///
/// 1. **Caller errors**: InvalidHandle, InvalidArgument
/// 2. **Configuration errors**: Configuration (symbol path syntax)
/// 3. **Per-source errors**: SourceUnreachable, MalformedSymbolData
/// 4. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum SymbolError
{
    /// The handle was disposed or never issued by this cache
    ///
    /// Queries never fall back to stale data; once a handle is disposed every
    /// operation on it reports this variant.
    #[error("Invalid symbol handle: {0}")]
    InvalidHandle(u64),

    /// Invalid argument passed to an engine function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The symbol path could not be used
    ///
    /// Only raised when no entry of a non-empty symbol path was usable;
    /// individual bad entries are reported as warnings instead.
    #[error("Symbol path configuration error: {0}")]
    Configuration(String),

    /// A symbol directory or server could not answer
    #[error("Symbol source unreachable: {location}: {reason}")]
    SourceUnreachable
    {
        /// Directory or server location that failed
        location: String,
        /// What went wrong
        reason: String,
    },

    /// A located symbol file or image could not be parsed or did not match
    #[error("Malformed symbol data in {origin}: {reason}")]
    MalformedSymbolData
    {
        /// Where the data came from
        origin: String,
        /// What went wrong
        reason: String,
    },

    /// I/O error (reading symbol files, populating caches)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SymbolError
{
    pub(crate) fn malformed(origin: impl fmt::Display, reason: impl fmt::Display) -> Self
    {
        SymbolError::MalformedSymbolData {
            origin: origin.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unreachable(location: impl fmt::Display, reason: impl fmt::Display) -> Self
    {
        SymbolError::SourceUnreachable {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error only concerns one symbol source.
    ///
    /// Source-local errors are absorbed by the resolver, which moves on to the
    /// next source.
    #[must_use]
    pub fn is_source_local(&self) -> bool
    {
        matches!(
            self,
            SymbolError::SourceUnreachable { .. } | SymbolError::MalformedSymbolData { .. } | SymbolError::Io(_)
        )
    }
}

/// Convenience type alias for `Result<T, SymbolError>`
///
/// ```rust
/// use sosym_core::error::SymbolResult;
/// fn foo() -> SymbolResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type SymbolResult<T> = std::result::Result<T, SymbolError>;
