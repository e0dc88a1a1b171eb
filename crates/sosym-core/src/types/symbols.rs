//! Sequence point and source location types.

use std::fmt;
use std::path::{Path, PathBuf};

/// Line number compilers use to mark a hidden sequence point.
pub const HIDDEN_LINE: u32 = 0x00FE_EFEE;

/// Mapping from an IL offset to a span of source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePoint
{
    /// IL offset the point starts at.
    pub il_offset: u32,
    /// Index into the owning table's document list.
    pub document: u32,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl SequencePoint
{
    /// Point covering a single line, the common case for statement-level
    /// mappings.
    pub const fn new(il_offset: u32, document: u32, line: u32, start_column: u32, end_column: u32) -> Self
    {
        Self {
            il_offset,
            document,
            start_line: line,
            start_column,
            end_line: line,
            end_column,
        }
    }

    /// Hidden point emitted for compiler-generated code.
    pub const fn hidden(il_offset: u32, document: u32) -> Self
    {
        Self {
            il_offset,
            document,
            start_line: HIDDEN_LINE,
            start_column: 0,
            end_line: HIDDEN_LINE,
            end_column: 0,
        }
    }

    /// Hidden points and points without a line never resolve a location.
    pub const fn is_hidden(&self) -> bool
    {
        self.start_line == HIDDEN_LINE || self.start_line == 0
    }
}

/// Source line reported for an IL offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineInfo
{
    pub line: u32,
    pub column: u32,
    /// Document name as recorded in the symbol file.
    pub file: String,
}

/// Symbol file format of a loaded table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolFormat
{
    /// ECMA-335 metadata based portable PDB.
    PortablePdb,
    /// MSF based Windows PDB.
    WindowsPdb,
}

impl fmt::Display for SymbolFormat
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            SymbolFormat::PortablePdb => "portable-pdb",
            SymbolFormat::WindowsPdb => "windows-pdb",
        };
        write!(f, "{label}")
    }
}

/// Where a loaded symbol table came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolOrigin
{
    /// Portable PDB embedded in the module image.
    Embedded
    {
        image: PathBuf,
    },
    /// Symbol file found in a local directory or next to the module.
    LocalFile(PathBuf),
    /// Symbol file already present in a symbol server's cache directory.
    ServerCache(PathBuf),
    /// Symbol file downloaded from a symbol server into its cache directory.
    ServerDownload
    {
        server: String,
        path: PathBuf,
    },
    /// PDB bytes handed over by the host, as for dynamic modules.
    InMemory
    {
        module: PathBuf,
    },
}

impl SymbolOrigin
{
    /// Path of the symbol file on disk, if there is one.
    pub fn file_path(&self) -> Option<&Path>
    {
        match self {
            SymbolOrigin::Embedded { .. } | SymbolOrigin::InMemory { .. } => None,
            SymbolOrigin::LocalFile(path) | SymbolOrigin::ServerCache(path) => Some(path),
            SymbolOrigin::ServerDownload { path, .. } => Some(path),
        }
    }
}

impl fmt::Display for SymbolOrigin
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            SymbolOrigin::Embedded { image } => write!(f, "embedded in {}", image.display()),
            SymbolOrigin::InMemory { module } => write!(f, "in-memory PDB for {}", module.display()),
            SymbolOrigin::LocalFile(path) => write!(f, "{}", path.display()),
            SymbolOrigin::ServerCache(path) => write!(f, "{} (cached)", path.display()),
            SymbolOrigin::ServerDownload { server, path } => write!(f, "{} (from {server})", path.display()),
        }
    }
}
