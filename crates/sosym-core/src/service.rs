//! # Symbol Service
//!
//! The session object a debugger host talks to. It owns the configuration,
//! the active symbol path, the handle cache, and the query and locator front
//! ends built on them.
//!
//! ## Lifecycle
//!
//! 1. Build a service: `SymbolService::builder(config).build()?`
//! 2. Set the symbol path: `parse_symbol_path("srv*https://...")`
//! 3. On module load: `load_symbols_for_module(&request)` for a handle
//! 4. Query: `line_by_il_offset(handle, token, offset)` and friends
//! 5. On module unload: `dispose(handle)`; dropping the service disposes
//!    everything still loaded
//!
//! Services share nothing with each other, so several can coexist in one
//! process.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::SymbolServiceConfig;
use crate::error::SymbolResult;
use crate::path::{ParsedSymbolPath, SymbolPathParser, SymbolSearchPath, SymbolSourceSpec};
use crate::symbols::{
    ExpressionHost, FileImageReader, FileShareTransport, GlobalSymbols, HeaderOnlyParser, LoadRequest,
    MetadataFill, MetadataLocatorBridge, MetadataRequest, ModuleImageReader, ModuleSymbolCache, ScopedSymbolHandle,
    SymbolFileCallback, SymbolFileParser, SymbolHandle, SymbolQueryEngine, SymbolSourceResolver, SymbolTransport,
};
use crate::types::{LineInfo, ModuleIdentity, SequencePoint, SymbolOrigin};

/// Builder for [`SymbolService`].
///
/// Every capability defaults to the built-in implementation: the header-only
/// parser, the file share transport, the disk image reader and the
/// [`GlobalSymbols`] expression registry.
pub struct SymbolServiceBuilder
{
    config: SymbolServiceConfig,
    file_parser: Option<Arc<dyn SymbolFileParser>>,
    transport: Option<Arc<dyn SymbolTransport>>,
    image_reader: Option<Arc<dyn ModuleImageReader>>,
    expression_host: Option<Arc<dyn ExpressionHost>>,
    on_symbol_file_loaded: Option<SymbolFileCallback>,
}

impl SymbolServiceBuilder
{
    #[must_use]
    pub fn file_parser(mut self, parser: Arc<dyn SymbolFileParser>) -> Self
    {
        self.file_parser = Some(parser);
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn SymbolTransport>) -> Self
    {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn image_reader(mut self, reader: Arc<dyn ModuleImageReader>) -> Self
    {
        self.image_reader = Some(reader);
        self
    }

    /// Replace the built-in [`GlobalSymbols`] registry for expression
    /// evaluation.
    #[must_use]
    pub fn expression_host(mut self, host: Arc<dyn ExpressionHost>) -> Self
    {
        self.expression_host = Some(host);
        self
    }

    /// Called with the module path and symbol file location on every load.
    #[must_use]
    pub fn on_symbol_file_loaded(mut self, callback: impl Fn(&Path, &str) + Send + Sync + 'static) -> Self
    {
        self.on_symbol_file_loaded = Some(Arc::new(callback));
        self
    }

    /// Build the service, parsing the configured symbol path if there is one.
    ///
    /// ## Errors
    ///
    /// [`SymbolError::Configuration`](crate::SymbolError::Configuration) when
    /// the configured symbol path has entries but none of them is usable.
    pub fn build(self) -> SymbolResult<SymbolService>
    {
        let parser = SymbolPathParser::new();
        let search_path = Arc::new(SymbolSearchPath::default());
        if let Some(text) = &self.config.symbol_path {
            let parsed = parser.parse(text)?;
            search_path.replace(parsed.sources().to_vec());
        }

        let transport = self.transport.unwrap_or_else(|| Arc::new(FileShareTransport));
        let image_reader = self.image_reader.unwrap_or_else(|| Arc::new(FileImageReader));
        let file_parser = self.file_parser.unwrap_or_else(|| Arc::new(HeaderOnlyParser));

        let mut resolver = SymbolSourceResolver::new(
            search_path.clone(),
            self.config.default_cache_dir.clone(),
            file_parser,
            transport.clone(),
            image_reader.clone(),
        )
        .with_module_directory_search(self.config.search_module_directory);
        if let Some(callback) = self.on_symbol_file_loaded {
            resolver = resolver.with_callback(callback);
        }

        let cache = Arc::new(ModuleSymbolCache::new(Arc::new(resolver)));
        let globals = Arc::new(GlobalSymbols::new());
        let expressions = self.expression_host.unwrap_or_else(|| globals.clone());
        let queries = SymbolQueryEngine::new(cache.clone(), expressions);
        let locator = MetadataLocatorBridge::new(
            search_path.clone(),
            self.config.default_cache_dir.clone(),
            transport,
            image_reader,
        );

        debug!(cache_dir = %self.config.default_cache_dir.display(), "symbol service ready");
        Ok(SymbolService {
            config: self.config,
            parser,
            search_path,
            cache,
            queries,
            locator,
            globals,
        })
    }
}

/// One symbol session.
pub struct SymbolService
{
    config: SymbolServiceConfig,
    parser: SymbolPathParser,
    search_path: Arc<SymbolSearchPath>,
    cache: Arc<ModuleSymbolCache>,
    queries: SymbolQueryEngine,
    locator: MetadataLocatorBridge,
    globals: Arc<GlobalSymbols>,
}

impl SymbolService
{
    pub fn builder(config: SymbolServiceConfig) -> SymbolServiceBuilder
    {
        SymbolServiceBuilder {
            config,
            file_parser: None,
            transport: None,
            image_reader: None,
            expression_host: None,
            on_symbol_file_loaded: None,
        }
    }

    /// Service with the built-in capabilities and `config`.
    ///
    /// ## Errors
    ///
    /// See [`SymbolServiceBuilder::build`].
    pub fn new(config: SymbolServiceConfig) -> SymbolResult<Self>
    {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &SymbolServiceConfig
    {
        &self.config
    }

    /// Parse `text` and make it the active symbol path.
    ///
    /// The active list is only replaced when parsing succeeds, and in-flight
    /// resolutions finish on the list they started with. Cached "not found"
    /// results are dropped so modules are retried against the new path.
    ///
    /// ## Errors
    ///
    /// [`SymbolError::Configuration`](crate::SymbolError::Configuration) when
    /// `text` has entries but none of them is usable.
    pub fn parse_symbol_path(&self, text: &str) -> SymbolResult<ParsedSymbolPath>
    {
        let parsed = self.parser.parse(text)?;
        self.search_path.replace(parsed.sources().to_vec());
        self.cache.forget_missing();
        info!(
            sources = parsed.sources().len(),
            warnings = parsed.warnings().len(),
            "symbol path updated"
        );
        Ok(parsed)
    }

    /// Sources of the active symbol path, in search order.
    pub fn sources(&self) -> Vec<SymbolSourceSpec>
    {
        self.search_path.snapshot().to_vec()
    }

    /// Load request for `identity` with this session's defaults applied.
    pub fn request(&self, identity: ModuleIdentity) -> LoadRequest
    {
        LoadRequest::new(identity).prefer_embedded(self.config.prefer_embedded)
    }

    /// Handle for a module's symbols, or `None` if none are available.
    pub fn load_symbols_for_module(&self, request: &LoadRequest) -> Option<SymbolHandle>
    {
        self.cache.load_or_get(request)
    }

    pub fn load_scoped(&self, request: &LoadRequest) -> Option<ScopedSymbolHandle<'_>>
    {
        self.cache.load_scoped(request)
    }

    /// Release a handle. Disposing twice is harmless.
    pub fn dispose(&self, handle: SymbolHandle)
    {
        self.cache.dispose(handle);
    }

    pub fn dispose_all(&self)
    {
        self.cache.dispose_all();
    }

    pub fn cache(&self) -> &ModuleSymbolCache
    {
        &self.cache
    }

    pub fn origin(&self, handle: SymbolHandle) -> SymbolResult<SymbolOrigin>
    {
        self.cache.origin(handle)
    }

    pub fn resolve_sequence_point(
        &self,
        handle: SymbolHandle,
        method_token: u32,
        il_offset: u32,
    ) -> SymbolResult<Option<SequencePoint>>
    {
        self.queries.resolve_sequence_point(handle, method_token, il_offset)
    }

    pub fn local_variable_name(&self, handle: SymbolHandle, scope: u32, slot: u32) -> SymbolResult<Option<String>>
    {
        self.queries.local_variable_name(handle, scope, slot)
    }

    pub fn line_by_il_offset(
        &self,
        handle: SymbolHandle,
        method_token: u32,
        il_offset: u32,
    ) -> SymbolResult<Option<LineInfo>>
    {
        self.queries.line_by_il_offset(handle, method_token, il_offset)
    }

    pub fn resolve_source_line(&self, handle: SymbolHandle, file: &str, line: u32) -> SymbolResult<Option<(u32, u32)>>
    {
        self.queries.resolve_source_line(handle, file, line)
    }

    pub fn evaluate_expression(&self, text: &str) -> u64
    {
        self.queries.evaluate_expression(text)
    }

    /// Built-in registry backing expression evaluation (unless the builder
    /// installed another [`ExpressionHost`]).
    pub fn globals(&self) -> &GlobalSymbols
    {
        &self.globals
    }

    pub fn queries(&self) -> &SymbolQueryEngine
    {
        &self.queries
    }

    pub fn locate_metadata(&self, request: &MetadataRequest, buffer: &mut [u8]) -> Option<MetadataFill>
    {
        self.locator.locate_metadata(request, buffer)
    }

    pub fn metadata_bytes(&self, request: &MetadataRequest) -> Option<Vec<u8>>
    {
        self.locator.metadata_bytes(request)
    }

    pub fn locate_debug_data(&self, image_path: &Path, timestamp: u32, size: u32) -> Option<PathBuf>
    {
        self.locator.locate_debug_data(image_path, timestamp, size)
    }
}

impl fmt::Debug for SymbolService
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("SymbolService")
            .field("config", &self.config)
            .field("sources", &self.search_path.snapshot().len())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Drop for SymbolService
{
    fn drop(&mut self)
    {
        self.cache.dispose_all();
    }
}
