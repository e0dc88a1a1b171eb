//! Symbol server transports and cache population.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::key::SymbolStoreKey;
use crate::error::{SymbolError, SymbolResult};

/// Fetches files from a symbol server.
///
/// The engine ships [`FileShareTransport`] for stores reachable through the
/// file system (local directories, mounted or UNC shares). Hosts plug in an
/// HTTP client by implementing this trait.
pub trait SymbolTransport: Send + Sync
{
    /// Fetch the file stored under `key` on `server`.
    ///
    /// `Ok(None)` means the server answered but does not have the file.
    ///
    /// ## Errors
    ///
    /// [`SymbolError::SourceUnreachable`] when the server could not be asked.
    fn fetch(&self, server: &str, key: &SymbolStoreKey) -> SymbolResult<Option<Vec<u8>>>;
}

/// Transport for symbol stores laid out on a file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileShareTransport;

impl SymbolTransport for FileShareTransport
{
    fn fetch(&self, server: &str, key: &SymbolStoreKey) -> SymbolResult<Option<Vec<u8>>>
    {
        let root = match server.strip_prefix("file://") {
            Some(path) => path,
            None if server.contains("://") => {
                return Err(SymbolError::unreachable(server, "no transport configured for remote servers"));
            }
            None => server,
        };

        let path = Path::new(root).join(key.relative_path());
        if !path.is_file() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .map_err(|err| SymbolError::unreachable(server, err))
    }
}

/// Look for `key` in a symbol cache directory.
pub(crate) fn cached_file(cache_dir: &Path, key: &SymbolStoreKey) -> SymbolResult<Option<(PathBuf, Vec<u8>)>>
{
    let path = cache_dir.join(key.relative_path());
    if !path.is_file() {
        return Ok(None);
    }
    let data = fs::read(&path)?;
    Ok(Some((path, data)))
}

/// Fetch `key` from a server and store it in the cache directory.
///
/// Returns the cache path the file was written to. A failed cache write is
/// logged and the fetched bytes are still returned, with `None` for the path.
pub(crate) fn download(
    transport: &dyn SymbolTransport,
    server: &str,
    cache_dir: &Path,
    key: &SymbolStoreKey,
) -> SymbolResult<Option<(Option<PathBuf>, Vec<u8>)>>
{
    let Some(data) = transport.fetch(server, key)? else {
        debug!(server, key = %key, "not on symbol server");
        return Ok(None);
    };

    let path = cache_dir.join(key.relative_path());
    let written = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| fs::write(&path, &data));
    match written {
        Ok(()) => {
            debug!(server, path = %path.display(), bytes = data.len(), "downloaded into symbol cache");
            Ok(Some((Some(path), data)))
        }
        Err(err) => {
            warn!(server, path = %path.display(), error = %err, "could not populate symbol cache");
            Ok(Some((None, data)))
        }
    }
}
