//! # Symbol Path Parsing
//!
//! Parses debugger-style symbol paths into an ordered list of sources.
//!
//! ## Grammar
//!
//! Entries are separated by `;`. Each entry is one of:
//!
//! - `C:\symbols` or `/srv/symbols`: a local directory
//! - `srv*https://host/symbols`: a symbol server using the default cache
//! - `srv*C:\cache*https://host/symbols`: a symbol server with its own cache
//! - `symsrv*symsrv.dll*[cache*]url`: the long form of `srv*`
//! - `cache*C:\cache`: default cache for the server entries that follow
//! - `https://host/symbols`: a symbol server using the default cache
//!
//! Prefixes are case-insensitive. An entry that fits none of these forms is
//! skipped and recorded as a [`SymbolPathWarning`]; the remaining entries stay
//! usable.
//!
//! ```rust
//! use sosym_core::path::{SourceKind, SymbolPathParser};
//!
//! let parser = SymbolPathParser::new();
//! let parsed = parser.parse(r"C:\sym1;srv*C:\cache*https://example/symbols")?;
//! assert_eq!(parsed.sources().len(), 2);
//! assert_eq!(parsed.sources()[0].kind(), SourceKind::LocalDirectory);
//! assert_eq!(parsed.sources()[1].kind(), SourceKind::SymbolServer);
//! # Ok::<(), sosym_core::SymbolError>(())
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

use crate::error::{SymbolError, SymbolResult};

/// Entry separator in symbol path strings.
pub const PATH_LIST_SEPARATOR: char = ';';

/// Kind of a symbol source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind
{
    /// Plain directory holding symbol files.
    LocalDirectory,
    /// Symbol store addressed by index keys, with a local cache.
    SymbolServer,
}

/// One parsed entry of a symbol path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolSourceSpec
{
    kind: SourceKind,
    location: String,
    cache_dir: Option<PathBuf>,
}

impl SymbolSourceSpec
{
    pub fn local(dir: impl Into<String>) -> Self
    {
        Self {
            kind: SourceKind::LocalDirectory,
            location: dir.into(),
            cache_dir: None,
        }
    }

    pub fn server(url: impl Into<String>, cache_dir: Option<PathBuf>) -> Self
    {
        Self {
            kind: SourceKind::SymbolServer,
            location: url.into(),
            cache_dir,
        }
    }

    pub fn kind(&self) -> SourceKind
    {
        self.kind
    }

    /// Directory path or server URL.
    pub fn location(&self) -> &str
    {
        &self.location
    }

    /// Explicit cache directory; `None` means the session default.
    pub fn cache_dir(&self) -> Option<&Path>
    {
        self.cache_dir.as_deref()
    }
}

impl fmt::Display for SymbolSourceSpec
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match (self.kind, &self.cache_dir) {
            (SourceKind::LocalDirectory, _) => write!(f, "{}", self.location),
            (SourceKind::SymbolServer, Some(cache)) => write!(f, "srv*{}*{}", cache.display(), self.location),
            (SourceKind::SymbolServer, None) => write!(f, "srv*{}", self.location),
        }
    }
}

/// A symbol path entry that was skipped or only partly understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolPathWarning
{
    pub entry: String,
    pub reason: String,
}

impl fmt::Display for SymbolPathWarning
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "'{}': {}", self.entry, self.reason)
    }
}

/// Result of parsing a symbol path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSymbolPath
{
    sources: Vec<SymbolSourceSpec>,
    warnings: Vec<SymbolPathWarning>,
}

impl ParsedSymbolPath
{
    /// Sources in search priority order.
    pub fn sources(&self) -> &[SymbolSourceSpec]
    {
        &self.sources
    }

    pub fn warnings(&self) -> &[SymbolPathWarning]
    {
        &self.warnings
    }

    pub fn into_parts(self) -> (Vec<SymbolSourceSpec>, Vec<SymbolPathWarning>)
    {
        (self.sources, self.warnings)
    }
}

/// Parser for symbol path strings.
///
/// Server entries without an explicit cache keep [`SymbolSourceSpec::cache_dir`]
/// unset; the resolver fills in the session's default cache at lookup time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolPathParser;

impl SymbolPathParser
{
    pub const fn new() -> Self
    {
        Self
    }

    /// Parse a symbol path.
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::Configuration`] when the path has entries but
    /// none of them is usable. An empty path parses to an empty list.
    pub fn parse(&self, text: &str) -> SymbolResult<ParsedSymbolPath>
    {
        let mut state = ParseState::default();
        let mut entries = 0usize;

        for entry in text.split(PATH_LIST_SEPARATOR).map(str::trim) {
            if entry.is_empty() {
                continue;
            }
            entries += 1;
            if let Err(reason) = state.entry(entry) {
                state.warn(entry, reason);
            }
        }

        if entries > 0 && state.parsed.sources.is_empty() && !state.parsed.warnings.is_empty() {
            let details: Vec<String> = state.parsed.warnings.iter().map(ToString::to_string).collect();
            return Err(SymbolError::Configuration(format!(
                "no usable entries in symbol path: {}",
                details.join("; ")
            )));
        }

        Ok(state.parsed)
    }
}

#[derive(Default)]
struct ParseState
{
    parsed: ParsedSymbolPath,
    cache_override: Option<PathBuf>,
}

impl ParseState
{
    fn entry(&mut self, entry: &str) -> Result<(), String>
    {
        if !entry.contains('*') {
            let source = if is_url(entry) {
                SymbolSourceSpec::server(entry, self.cache_override.clone())
            } else {
                SymbolSourceSpec::local(entry)
            };
            self.parsed.sources.push(source);
            return Ok(());
        }

        let parts: Vec<&str> = entry.split('*').map(str::trim).collect();
        match parts[0].to_ascii_lowercase().as_str() {
            "srv" => self.server(entry, &parts[1..]),
            "symsrv" => {
                if parts.len() < 3 {
                    return Err("symsrv entry needs a server library and a location".to_string());
                }
                self.server(entry, &parts[2..])
            }
            "cache" => {
                self.cache_override = parts.get(1).filter(|dir| !dir.is_empty()).map(PathBuf::from);
                if parts.len() > 2 {
                    self.warn(entry, "only the first cache directory is used".to_string());
                }
                Ok(())
            }
            other => Err(format!("unrecognized symbol path element '{other}'")),
        }
    }

    fn server(&mut self, entry: &str, rest: &[&str]) -> Result<(), String>
    {
        let Some((location, caches)) = rest.split_last() else {
            return Err("missing symbol server location".to_string());
        };
        if location.is_empty() {
            return Err("missing symbol server location".to_string());
        }

        let caches: Vec<&str> = caches.iter().copied().filter(|cache| !cache.is_empty()).collect();
        if caches.len() > 1 {
            self.warn(entry, "only the nearest cache directory is used".to_string());
        }
        let cache = caches
            .first()
            .map(PathBuf::from)
            .or_else(|| self.cache_override.clone());

        self.parsed.sources.push(SymbolSourceSpec::server(*location, cache));
        Ok(())
    }

    fn warn(&mut self, entry: &str, reason: String)
    {
        warn!(entry, %reason, "symbol path entry");
        self.parsed.warnings.push(SymbolPathWarning {
            entry: entry.to_string(),
            reason,
        });
    }
}

fn is_url(entry: &str) -> bool
{
    let lower = entry.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Active source list of a session.
///
/// Replacing the list swaps a single `Arc`, so a resolution that took a
/// [`snapshot`](SymbolSearchPath::snapshot) keeps walking the list it started
/// with and never sees a half-updated one.
#[derive(Debug)]
pub struct SymbolSearchPath
{
    active: RwLock<Arc<[SymbolSourceSpec]>>,
}

impl Default for SymbolSearchPath
{
    fn default() -> Self
    {
        Self::new(Vec::new())
    }
}

impl SymbolSearchPath
{
    pub fn new(sources: Vec<SymbolSourceSpec>) -> Self
    {
        Self {
            active: RwLock::new(Arc::from(sources)),
        }
    }

    pub fn replace(&self, sources: Vec<SymbolSourceSpec>)
    {
        let sources: Arc<[SymbolSourceSpec]> = Arc::from(sources);
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = sources;
    }

    pub fn snapshot(&self) -> Arc<[SymbolSourceSpec]>
    {
        self.active.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
