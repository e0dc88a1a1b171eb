//! # Symbol Source Resolution
//!
//! Finds and loads the symbol table for one module by walking the session's
//! symbol sources in priority order.
//!
//! ## Resolution order
//!
//! 1. PDB bytes supplied with the request (dynamic modules)
//! 2. The embedded portable PDB, when the request prefers it
//! 3. Each configured source, in symbol path order:
//!    - local directory: `dir/<pdb>` then `dir/<key>` (symstore layout)
//!    - symbol server: `cache/<key>`, then download into `cache/<key>`
//! 4. The module's own directory and the PDB path recorded in the image
//! 5. The embedded portable PDB, if not already tried
//!
//! The first source that yields a parseable, matching symbol file wins.
//! Failures of individual sources are logged and skipped; the caller only
//! ever sees a table or "not found".

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, trace};

use super::image::{CodeViewRecord, ImageLayout, ManagedImage, ModuleImageReader};
use super::key::SymbolStoreKey;
use super::parser::SymbolFileParser;
use super::table::SymbolTable;
use super::transport::{cached_file, download, SymbolTransport};
use crate::error::{SymbolError, SymbolResult};
use crate::path::{SourceKind, SymbolSearchPath, SymbolSourceSpec};
use crate::types::{ModuleIdentity, PdbKey, SymbolFormat, SymbolOrigin};

/// Callback invoked with the module path and the symbol file path (or origin
/// description) whenever symbols are loaded.
pub type SymbolFileCallback = Arc<dyn Fn(&Path, &str) + Send + Sync>;

/// Request to load the symbols of one module.
#[derive(Clone)]
pub struct LoadRequest
{
    identity: ModuleIdentity,
    hint: PathBuf,
    prefer_embedded: bool,
    image: Option<Arc<[u8]>>,
    layout: ImageLayout,
    in_memory_pdb: Option<Arc<[u8]>>,
}

impl LoadRequest
{
    /// Request for `identity`, reading the image from the identity's path.
    pub fn new(identity: ModuleIdentity) -> Self
    {
        let hint = identity.path().to_path_buf();
        Self {
            identity,
            hint,
            prefer_embedded: false,
            image: None,
            layout: ImageLayout::File,
            in_memory_pdb: None,
        }
    }

    /// Local path of the module file when it differs from the identity path
    /// (for example a copy of a module loaded from a dump).
    #[must_use]
    pub fn with_hint(mut self, path: impl Into<PathBuf>) -> Self
    {
        self.hint = path.into();
        self
    }

    #[must_use]
    pub fn prefer_embedded(mut self, prefer: bool) -> Self
    {
        self.prefer_embedded = prefer;
        self
    }

    /// Image bytes supplied by the host, typically read from process memory.
    #[must_use]
    pub fn with_image(mut self, image: Arc<[u8]>, layout: ImageLayout) -> Self
    {
        self.image = Some(image);
        self.layout = layout;
        self
    }

    /// Symbol file bytes supplied by the host, tried before any other
    /// source. Reflection.Emit and other dynamic modules have no PDB on disk.
    #[must_use]
    pub fn with_in_memory_pdb(mut self, pdb: Arc<[u8]>) -> Self
    {
        self.in_memory_pdb = Some(pdb);
        self
    }

    pub fn identity(&self) -> &ModuleIdentity
    {
        &self.identity
    }

    pub fn hint(&self) -> &Path
    {
        &self.hint
    }

    pub fn prefers_embedded(&self) -> bool
    {
        self.prefer_embedded
    }
}

impl fmt::Debug for LoadRequest
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("LoadRequest")
            .field("identity", &self.identity)
            .field("hint", &self.hint)
            .field("prefer_embedded", &self.prefer_embedded)
            .field("image_bytes", &self.image.as_ref().map(|image| image.len()))
            .field("layout", &self.layout)
            .field("in_memory_pdb_bytes", &self.in_memory_pdb.as_ref().map(|pdb| pdb.len()))
            .finish()
    }
}

/// A successfully loaded symbol table and where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedSymbols
{
    pub table: SymbolTable,
    pub origin: SymbolOrigin,
}

/// Resolution step used by [`ModuleSymbolCache`](super::ModuleSymbolCache).
pub trait ResolveSymbols: Send + Sync
{
    /// Resolve symbols for a module. `None` means no symbols are available.
    fn resolve(&self, request: &LoadRequest) -> Option<ResolvedSymbols>;
}

/// What the resolver is looking for, combined from the identity and the
/// image's CodeView record.
struct SymbolTarget
{
    pdb_name: String,
    expected: Option<PdbKey>,
    store_keys: Vec<SymbolStoreKey>,
    codeview_path: Option<PathBuf>,
}

impl SymbolTarget
{
    fn new(identity: &ModuleIdentity, codeview: Option<&CodeViewRecord>) -> Self
    {
        let pdb_name = codeview.map_or_else(
            || {
                let stem = identity
                    .file_name()
                    .map_or("module", |name| name.rsplit_once('.').map_or(name, |(stem, _)| stem));
                format!("{stem}.pdb")
            },
            |record| record.pdb_file_name().to_string(),
        );

        let expected = identity.pdb_key().or_else(|| codeview.map(|record| record.pdb_key));
        let store_keys = match (identity.pdb_key(), codeview) {
            (Some(key), Some(record)) if record.portable => vec![SymbolStoreKey::portable_pdb(&pdb_name, key.guid)],
            (Some(key), Some(_)) => vec![SymbolStoreKey::windows_pdb(&pdb_name, key)],
            (Some(key), None) => vec![
                SymbolStoreKey::windows_pdb(&pdb_name, key),
                SymbolStoreKey::portable_pdb(&pdb_name, key.guid),
            ],
            (None, Some(record)) => vec![record.store_key()],
            (None, None) => Vec::new(),
        };

        let codeview_path = codeview
            .map(|record| PathBuf::from(&record.pdb_path))
            .filter(|path| path.is_absolute());

        Self {
            pdb_name,
            expected,
            store_keys,
            codeview_path,
        }
    }

    fn verify(&self, table: &SymbolTable, origin: &SymbolOrigin) -> SymbolResult<()>
    {
        let (Some(expected), Some(actual)) = (self.expected, table.pdb_key()) else {
            return Ok(());
        };
        let matches = match table.format() {
            SymbolFormat::PortablePdb => expected.guid == actual.guid,
            SymbolFormat::WindowsPdb => expected == actual,
        };
        if matches {
            Ok(())
        } else {
            Err(SymbolError::malformed(
                origin,
                format!("PDB id {actual} does not match {expected}"),
            ))
        }
    }
}

/// Walks symbol sources to load a module's symbol table.
pub struct SymbolSourceResolver
{
    search_path: Arc<SymbolSearchPath>,
    default_cache: PathBuf,
    parser: Arc<dyn SymbolFileParser>,
    transport: Arc<dyn SymbolTransport>,
    image_reader: Arc<dyn ModuleImageReader>,
    search_module_directory: bool,
    on_loaded: Option<SymbolFileCallback>,
}

impl SymbolSourceResolver
{
    pub fn new(
        search_path: Arc<SymbolSearchPath>,
        default_cache: impl Into<PathBuf>,
        parser: Arc<dyn SymbolFileParser>,
        transport: Arc<dyn SymbolTransport>,
        image_reader: Arc<dyn ModuleImageReader>,
    ) -> Self
    {
        Self {
            search_path,
            default_cache: default_cache.into(),
            parser,
            transport,
            image_reader,
            search_module_directory: true,
            on_loaded: None,
        }
    }

    #[must_use]
    pub fn with_module_directory_search(mut self, enabled: bool) -> Self
    {
        self.search_module_directory = enabled;
        self
    }

    #[must_use]
    pub fn with_callback(mut self, callback: SymbolFileCallback) -> Self
    {
        self.on_loaded = Some(callback);
        self
    }

    fn load_image(&self, request: &LoadRequest) -> Option<Arc<[u8]>>
    {
        if let Some(image) = &request.image {
            return Some(image.clone());
        }
        match self.image_reader.read_image(&request.hint) {
            Ok(image) => image,
            Err(err) => {
                debug!(path = %request.hint.display(), error = %err, "could not read module image");
                None
            }
        }
    }

    fn parse(&self, target: &SymbolTarget, data: &[u8], origin: SymbolOrigin) -> SymbolResult<ResolvedSymbols>
    {
        let table = self.parser.parse(data, &origin)?;
        target.verify(&table, &origin)?;
        Ok(ResolvedSymbols { table, origin })
    }

    fn try_embedded(&self, request: &LoadRequest, image: Option<&ManagedImage<'_>>, target: &SymbolTarget)
        -> SymbolResult<Option<ResolvedSymbols>>
    {
        let Some(image) = image else {
            return Ok(None);
        };
        let Some(pdb) = image.embedded_portable_pdb()? else {
            return Ok(None);
        };
        let origin = SymbolOrigin::Embedded {
            image: request.hint.clone(),
        };
        self.parse(target, &pdb, origin).map(Some)
    }

    fn try_file(&self, target: &SymbolTarget, path: &Path) -> SymbolResult<Option<ResolvedSymbols>>
    {
        if !path.is_file() {
            trace!(path = %path.display(), "no symbol file");
            return Ok(None);
        }
        let data = fs::read(path)?;
        self.parse(target, &data, SymbolOrigin::LocalFile(path.to_path_buf())).map(Some)
    }

    fn try_local_directory(&self, target: &SymbolTarget, dir: &Path) -> Option<ResolvedSymbols>
    {
        let candidates = std::iter::once(dir.join(&target.pdb_name))
            .chain(target.store_keys.iter().map(|key| dir.join(key.relative_path())));
        for candidate in candidates {
            match self.try_file(target, &candidate) {
                Ok(Some(found)) => return Some(found),
                Ok(None) => {}
                Err(err) => debug!(path = %candidate.display(), error = %err, "skipping symbol file"),
            }
        }
        None
    }

    fn try_symbol_server(&self, target: &SymbolTarget, source: &SymbolSourceSpec) -> Option<ResolvedSymbols>
    {
        let server = source.location();
        let cache_dir = source.cache_dir().unwrap_or(&self.default_cache);

        for key in &target.store_keys {
            match cached_file(cache_dir, key) {
                Ok(Some((path, data))) => match self.parse(target, &data, SymbolOrigin::ServerCache(path)) {
                    Ok(found) => return Some(found),
                    Err(err) => debug!(key = %key, error = %err, "cached symbol file unusable, refetching"),
                },
                Ok(None) => {}
                Err(err) => debug!(key = %key, error = %err, "could not read symbol cache"),
            }

            match download(self.transport.as_ref(), server, cache_dir, key) {
                Ok(Some((path, data))) => {
                    let origin = SymbolOrigin::ServerDownload {
                        server: server.to_string(),
                        path: path.unwrap_or_else(|| cache_dir.join(key.relative_path())),
                    };
                    match self.parse(target, &data, origin) {
                        Ok(found) => return Some(found),
                        Err(err) => debug!(key = %key, error = %err, "downloaded symbol file unusable"),
                    }
                }
                Ok(None) => {}
                Err(err) => debug!(server, key = %key, error = %err, "symbol server failed"),
            }
        }
        None
    }

    fn try_module_directory(&self, request: &LoadRequest, target: &SymbolTarget) -> Option<ResolvedSymbols>
    {
        let beside_module = request.hint.parent().map(|dir| dir.join(&target.pdb_name));
        for candidate in beside_module.into_iter().chain(target.codeview_path.clone()) {
            match self.try_file(target, &candidate) {
                Ok(Some(found)) => return Some(found),
                Ok(None) => {}
                Err(err) => debug!(path = %candidate.display(), error = %err, "skipping symbol file"),
            }
        }
        None
    }

    fn embedded_or_log(&self, request: &LoadRequest, image: Option<&ManagedImage<'_>>, target: &SymbolTarget)
        -> Option<ResolvedSymbols>
    {
        self.try_embedded(request, image, target).unwrap_or_else(|err| {
            debug!(module = %request.identity, error = %err, "embedded PDB unusable");
            None
        })
    }

    fn resolve_inner(&self, request: &LoadRequest) -> Option<ResolvedSymbols>
    {
        // Snapshot once so a concurrent symbol path change can't reorder this walk.
        let sources = self.search_path.snapshot();
        let image_bytes = self.load_image(request);
        let image = image_bytes
            .as_deref()
            .and_then(|data| match ManagedImage::parse(data, request.layout) {
                Ok(image) => Some(image),
                Err(err) => {
                    debug!(module = %request.identity, error = %err, "module image unreadable");
                    None
                }
            });
        let codeview = image.as_ref().and_then(ManagedImage::codeview);
        let target = SymbolTarget::new(&request.identity, codeview.as_ref());

        if let Some(pdb) = &request.in_memory_pdb {
            let origin = SymbolOrigin::InMemory {
                module: request.identity.path().to_path_buf(),
            };
            match self.parse(&target, pdb, origin) {
                Ok(found) => return Some(found),
                Err(err) => debug!(module = %request.identity, error = %err, "in-memory PDB unusable"),
            }
        }

        if request.prefer_embedded {
            if let Some(found) = self.embedded_or_log(request, image.as_ref(), &target) {
                return Some(found);
            }
        }

        for source in sources.iter() {
            let found = match source.kind() {
                SourceKind::LocalDirectory => self.try_local_directory(&target, Path::new(source.location())),
                SourceKind::SymbolServer => self.try_symbol_server(&target, source),
            };
            if found.is_some() {
                return found;
            }
        }

        if self.search_module_directory {
            if let Some(found) = self.try_module_directory(request, &target) {
                return Some(found);
            }
        }

        if !request.prefer_embedded {
            return self.embedded_or_log(request, image.as_ref(), &target);
        }
        None
    }
}

impl ResolveSymbols for SymbolSourceResolver
{
    fn resolve(&self, request: &LoadRequest) -> Option<ResolvedSymbols>
    {
        let resolved = self.resolve_inner(request);
        match &resolved {
            Some(found) => {
                info!(module = %request.identity, origin = %found.origin, format = %found.table.format(), "loaded symbols");
                if let Some(callback) = &self.on_loaded {
                    let location = found
                        .origin
                        .file_path()
                        .map_or_else(|| found.origin.to_string(), |path| path.display().to_string());
                    callback(request.identity.path(), &location);
                }
            }
            None => debug!(module = %request.identity, "no symbols available"),
        }
        resolved
    }
}
