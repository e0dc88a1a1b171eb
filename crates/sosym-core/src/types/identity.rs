//! Module identity types.

use std::fmt;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Timestamp and image size taken from a PE image's headers.
///
/// Together with the file name this is how symbol stores index images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageKey
{
    /// `TimeDateStamp` from the COFF file header
    pub timestamp: u32,
    /// `SizeOfImage` from the optional header
    pub size: u32,
}

impl ImageKey
{
    pub const fn new(timestamp: u32, size: u32) -> Self
    {
        Self { timestamp, size }
    }
}

/// GUID and age correlating an image with its PDB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PdbKey
{
    pub guid: Uuid,
    pub age: u32,
}

impl PdbKey
{
    pub const fn new(guid: Uuid, age: u32) -> Self
    {
        Self { guid, age }
    }

    /// Build a key from the raw GUID bytes stored in a CodeView record.
    ///
    /// CodeView stores the GUID in its in-memory (mixed-endian) layout.
    #[must_use]
    pub fn from_codeview(guid: [u8; 16], age: u32) -> Self
    {
        Self {
            guid: Uuid::from_bytes_le(guid),
            age,
        }
    }
}

impl fmt::Display for PdbKey
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}-{}", self.guid.hyphenated(), self.age)
    }
}

/// Identity of a managed module, used as the symbol cache key.
///
/// Two identities are equal only when every field matches, so the same path
/// loaded with a different timestamp/size (a rebuilt assembly) gets its own
/// cache entry.
///
/// ```rust
/// use sosym_core::types::ModuleIdentity;
///
/// let a = ModuleIdentity::new("/app/Foo.dll").with_image_key(0x5f00_0000, 0x8000);
/// let b = ModuleIdentity::new("/app/Foo.dll").with_image_key(0x5f00_0001, 0x8000);
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleIdentity
{
    path: PathBuf,
    image: Option<ImageKey>,
    pdb: Option<PdbKey>,
}

impl ModuleIdentity
{
    pub fn new(path: impl Into<PathBuf>) -> Self
    {
        Self {
            path: path.into(),
            image: None,
            pdb: None,
        }
    }

    #[must_use]
    pub fn with_image_key(mut self, timestamp: u32, size: u32) -> Self
    {
        self.image = Some(ImageKey::new(timestamp, size));
        self
    }

    #[must_use]
    pub fn with_pdb_key(mut self, guid: Uuid, age: u32) -> Self
    {
        self.pdb = Some(PdbKey::new(guid, age));
        self
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }

    pub fn image_key(&self) -> Option<ImageKey>
    {
        self.image
    }

    pub fn pdb_key(&self) -> Option<PdbKey>
    {
        self.pdb
    }

    /// File name of the module, accepting both `/` and `\` separators.
    ///
    /// Module paths reported by a Windows target are still handled when the
    /// engine runs elsewhere (dump analysis on Linux, for example).
    pub fn file_name(&self) -> Option<&str>
    {
        self.path.to_str().map(file_name_of).filter(|name| !name.is_empty())
    }
}

impl fmt::Display for ModuleIdentity
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.path.display())?;
        if let Some(image) = self.image {
            write!(f, " [{:08x}:{:x}]", image.timestamp, image.size)?;
        }
        if let Some(pdb) = self.pdb {
            write!(f, " {{{pdb}}}")?;
        }
        Ok(())
    }
}

/// Last path component of a Windows or Unix style path string.
pub(crate) fn file_name_of(path: &str) -> &str
{
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
