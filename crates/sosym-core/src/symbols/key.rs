//! Symbol store index keys.
//!
//! Symbol stores (symstore directories and SSQP servers) lay files out as
//! `<file>/<id>/<file>`, where `<id>` depends on the kind of file:
//!
//! | File          | Id                                  |
//! |---------------|-------------------------------------|
//! | Windows PDB   | GUID (32 hex digits) + age in hex   |
//! | Portable PDB  | GUID (32 hex digits) + `ffffffff`   |
//! | PE image      | timestamp (8 hex digits) + size hex |
//!
//! Keys are lowercase, as SSQP requires.

use std::fmt;
use std::path::PathBuf;

use uuid::Uuid;

use crate::types::identity::file_name_of;
use crate::types::{ImageKey, PdbKey};

/// Index key of one file in a symbol store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolStoreKey
{
    file: String,
    id: String,
}

impl SymbolStoreKey
{
    pub fn windows_pdb(pdb_name: &str, key: PdbKey) -> Self
    {
        Self::build(pdb_name, format!("{}{:x}", key.guid.simple(), key.age))
    }

    pub fn portable_pdb(pdb_name: &str, guid: Uuid) -> Self
    {
        Self::build(pdb_name, format!("{}ffffffff", guid.simple()))
    }

    pub fn pe_image(image_name: &str, key: ImageKey) -> Self
    {
        Self::build(image_name, format!("{:08x}{:x}", key.timestamp, key.size))
    }

    fn build(file: &str, id: String) -> Self
    {
        Self {
            file: file_name_of(file).to_ascii_lowercase(),
            id: id.to_ascii_lowercase(),
        }
    }

    pub fn file_name(&self) -> &str
    {
        &self.file
    }

    pub fn id(&self) -> &str
    {
        &self.id
    }

    /// Key as used in a server URL: `file/id/file`.
    pub fn index(&self) -> String
    {
        format!("{}/{}/{}", self.file, self.id, self.file)
    }

    /// Key as a relative path inside a store or cache directory.
    pub fn relative_path(&self) -> PathBuf
    {
        [self.file.as_str(), self.id.as_str(), self.file.as_str()].iter().collect()
    }
}

impl fmt::Display for SymbolStoreKey
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.index())
    }
}
