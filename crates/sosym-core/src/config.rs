//! # Configuration
//!
//! Explicit configuration for a [`SymbolService`](crate::service::SymbolService).
//!
//! Nothing in the engine reads process-wide state after construction: every
//! service owns its configuration, so independent sessions (and tests) never
//! see each other's symbol paths or caches.
//!
//! ## Environment Variables
//!
//! [`SymbolServiceConfig::from_env`] reads:
//!
//! - `SOSYM_SYMBOL_PATH`: initial symbol path (falls back to `_NT_SYMBOL_PATH`)
//! - `SOSYM_SYMBOL_CACHE`: default cache directory for symbol servers

use std::env;
use std::path::PathBuf;

/// Environment variable holding the initial symbol path.
pub const SYMBOL_PATH_ENV: &str = "SOSYM_SYMBOL_PATH";
/// Conventional Windows debugger symbol path variable, used as a fallback.
pub const NT_SYMBOL_PATH_ENV: &str = "_NT_SYMBOL_PATH";
/// Environment variable overriding the default symbol cache directory.
pub const SYMBOL_CACHE_ENV: &str = "SOSYM_SYMBOL_CACHE";

/// Settings for one symbol service session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolServiceConfig
{
    /// Cache directory used by `srv*url` entries that do not name one.
    pub default_cache_dir: PathBuf,
    /// Symbol path parsed when the service is built.
    pub symbol_path: Option<String>,
    /// Default for [`LoadRequest::prefer_embedded`](crate::symbols::LoadRequest).
    pub prefer_embedded: bool,
    /// Whether the module's own directory and its CodeView path are searched
    /// after the configured sources.
    pub search_module_directory: bool,
}

impl Default for SymbolServiceConfig
{
    fn default() -> Self
    {
        Self {
            default_cache_dir: default_cache_dir(),
            symbol_path: None,
            prefer_embedded: false,
            search_module_directory: true,
        }
    }
}

impl SymbolServiceConfig
{
    /// Build a configuration from environment variables.
    ///
    /// Unset variables keep their [`Default`] values.
    #[must_use]
    pub fn from_env() -> Self
    {
        let mut config = Self::default();
        if let Some(cache) = env::var_os(SYMBOL_CACHE_ENV).filter(|value| !value.is_empty()) {
            config.default_cache_dir = PathBuf::from(cache);
        }
        config.symbol_path = env::var(SYMBOL_PATH_ENV)
            .or_else(|_| env::var(NT_SYMBOL_PATH_ENV))
            .ok()
            .filter(|value| !value.trim().is_empty());
        config
    }

    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self
    {
        self.default_cache_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_symbol_path(mut self, path: impl Into<String>) -> Self
    {
        self.symbol_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_prefer_embedded(mut self, prefer: bool) -> Self
    {
        self.prefer_embedded = prefer;
        self
    }

    #[must_use]
    pub fn with_module_directory_search(mut self, enabled: bool) -> Self
    {
        self.search_module_directory = enabled;
        self
    }
}

/// Default symbol cache location.
///
/// `~/.dotnet/symbolcache` when a home directory is known, otherwise
/// `SymbolCache` under the temp directory.
#[must_use]
pub fn default_cache_dir() -> PathBuf
{
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .filter(|home| !home.is_empty())
        .map_or_else(
            || env::temp_dir().join("SymbolCache"),
            |home| PathBuf::from(home).join(".dotnet").join("symbolcache"),
        )
}
