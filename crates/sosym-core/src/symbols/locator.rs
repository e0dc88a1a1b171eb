//! # Metadata Locator
//!
//! Locates module images by path, timestamp and size for native callers that
//! need an image's CLI metadata (or the image file itself) when the target
//! process or dump does not contain it.
//!
//! ## Search order
//!
//! 1. The image path as given
//! 2. Each configured source, in symbol path order:
//!    - local directory: `dir/<file>` then `dir/<key>`
//!    - symbol server: `cache/<key>`, then download into `cache/<key>`
//!
//! A candidate only counts when its PE header timestamp and image size match
//! the request. Nothing is cached in memory; repeated lookups repeat the walk
//! (downloads land in the server cache, so they are only fetched once).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace};
use uuid::Uuid;

use super::image::{ImageLayout, ManagedImage, ModuleImageReader};
use super::key::SymbolStoreKey;
use super::transport::{cached_file, download, SymbolTransport};
use crate::path::{SourceKind, SymbolSearchPath};
use crate::types::identity::file_name_of;
use crate::types::ImageKey;

/// Metadata lookup request from a native caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRequest
{
    pub image_path: PathBuf,
    pub timestamp: u32,
    pub size: u32,
    /// Module version id, when the caller knows it. Informational only.
    pub mvid: Option<Uuid>,
    /// Overrides the CLI header's metadata directory when non-zero.
    pub metadata_rva: u32,
    /// Caller flags, passed through for diagnostics.
    pub flags: u32,
}

impl MetadataRequest
{
    pub fn new(image_path: impl Into<PathBuf>, timestamp: u32, size: u32) -> Self
    {
        Self {
            image_path: image_path.into(),
            timestamp,
            size,
            mvid: None,
            metadata_rva: 0,
            flags: 0,
        }
    }

    #[must_use]
    pub fn with_mvid(mut self, mvid: Uuid) -> Self
    {
        self.mvid = Some(mvid);
        self
    }

    #[must_use]
    pub fn with_metadata_rva(mut self, rva: u32) -> Self
    {
        self.metadata_rva = rva;
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: u32) -> Self
    {
        self.flags = flags;
        self
    }
}

/// Outcome of copying metadata into a caller buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataFill
{
    /// Size of the whole metadata blob.
    pub required: usize,
    /// Bytes copied into the buffer.
    pub written: usize,
}

impl MetadataFill
{
    /// Whether the buffer held the whole blob.
    pub fn is_complete(&self) -> bool
    {
        self.written == self.required
    }
}

/// Image location for native metadata and debug data requests.
pub struct MetadataLocatorBridge
{
    search_path: Arc<SymbolSearchPath>,
    default_cache: PathBuf,
    transport: Arc<dyn SymbolTransport>,
    image_reader: Arc<dyn ModuleImageReader>,
}

impl MetadataLocatorBridge
{
    pub fn new(
        search_path: Arc<SymbolSearchPath>,
        default_cache: impl Into<PathBuf>,
        transport: Arc<dyn SymbolTransport>,
        image_reader: Arc<dyn ModuleImageReader>,
    ) -> Self
    {
        Self {
            search_path,
            default_cache: default_cache.into(),
            transport,
            image_reader,
        }
    }

    /// Copy the image's metadata into `buffer`.
    ///
    /// The full size is reported even when the buffer is too small, so a
    /// caller can retry with a buffer of [`MetadataFill::required`] bytes.
    pub fn locate_metadata(&self, request: &MetadataRequest, buffer: &mut [u8]) -> Option<MetadataFill>
    {
        let metadata = self.metadata_bytes(request)?;
        let written = metadata.len().min(buffer.len());
        buffer[..written].copy_from_slice(&metadata[..written]);
        Some(MetadataFill {
            required: metadata.len(),
            written,
        })
    }

    /// The image's metadata as an owned blob.
    pub fn metadata_bytes(&self, request: &MetadataRequest) -> Option<Vec<u8>>
    {
        let expected = ImageKey::new(request.timestamp, request.size);
        let (path, data) = self.locate_image(&request.image_path, expected)?;
        let metadata = ManagedImage::parse(&data, ImageLayout::File)
            .ok()?
            .metadata(request.metadata_rva)
            .map(<[u8]>::to_vec);
        if metadata.is_none() {
            debug!(
                path = %path.display(),
                mvid = ?request.mvid,
                flags = request.flags,
                "image has no readable metadata"
            );
        }
        metadata
    }

    /// Path of an image file matching `timestamp` and `size`.
    pub fn locate_debug_data(&self, image_path: &Path, timestamp: u32, size: u32) -> Option<PathBuf>
    {
        self.locate_image(image_path, ImageKey::new(timestamp, size))
            .map(|(path, _)| path)
    }

    fn locate_image(&self, image_path: &Path, expected: ImageKey) -> Option<(PathBuf, Arc<[u8]>)>
    {
        if let Some(found) = self.check_candidate(image_path, expected) {
            return Some(found);
        }

        let file_name = image_path.to_str().map(file_name_of).filter(|name| !name.is_empty())?;
        let key = SymbolStoreKey::pe_image(file_name, expected);

        for source in self.search_path.snapshot().iter() {
            let found = match source.kind() {
                SourceKind::LocalDirectory => {
                    let dir = Path::new(source.location());
                    self.check_candidate(&dir.join(file_name), expected)
                        .or_else(|| self.check_candidate(&dir.join(key.relative_path()), expected))
                }
                SourceKind::SymbolServer => {
                    let cache_dir = source.cache_dir().unwrap_or(&self.default_cache);
                    self.from_server(source.location(), cache_dir, &key, expected)
                }
            };
            if found.is_some() {
                return found;
            }
        }
        debug!(image = %image_path.display(), key = %key, "no matching image found");
        None
    }

    fn from_server(&self, server: &str, cache_dir: &Path, key: &SymbolStoreKey, expected: ImageKey)
        -> Option<(PathBuf, Arc<[u8]>)>
    {
        match cached_file(cache_dir, key) {
            Ok(Some((path, data))) if image_matches(&data, expected) => return Some((path, Arc::from(data))),
            Ok(_) => {}
            Err(err) => debug!(key = %key, error = %err, "could not read image cache"),
        }

        match download(self.transport.as_ref(), server, cache_dir, key) {
            Ok(Some((path, data))) if image_matches(&data, expected) => {
                let path = path.unwrap_or_else(|| cache_dir.join(key.relative_path()));
                Some((path, Arc::from(data)))
            }
            Ok(_) => None,
            Err(err) => {
                debug!(server, key = %key, error = %err, "image download failed");
                None
            }
        }
    }

    fn check_candidate(&self, path: &Path, expected: ImageKey) -> Option<(PathBuf, Arc<[u8]>)>
    {
        let data = match self.image_reader.read_image(path) {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "could not read image candidate");
                return None;
            }
        };
        if image_matches(&data, expected) {
            Some((path.to_path_buf(), data))
        } else {
            trace!(path = %path.display(), "image candidate has a different timestamp or size");
            None
        }
    }
}

fn image_matches(data: &[u8], expected: ImageKey) -> bool
{
    ManagedImage::parse(data, ImageLayout::File).is_ok_and(|image| image.image_key() == expected)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_fill_completeness()
    {
        let partial = MetadataFill { required: 10, written: 4 };
        assert!(!partial.is_complete());
        assert!(MetadataFill { required: 10, written: 10 }.is_complete());
    }

    #[test]
    fn test_request_builder()
    {
        let request = MetadataRequest::new("/app/Foo.dll", 1, 2).with_metadata_rva(0x2048).with_flags(4);
        assert_eq!(request.metadata_rva, 0x2048);
        assert_eq!(request.flags, 4);
        assert!(request.mvid.is_none());
    }
}
