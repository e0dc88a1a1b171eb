//! Symbol file parser capability.
//!
//! Decoding PDB and portable PDB files is delegated to a
//! [`SymbolFileParser`] supplied by the host. The engine only needs the
//! decoded [`SymbolTable`]; it never looks inside the binary formats itself
//! beyond the signature checks done by [`HeaderOnlyParser`].

use super::image::read_u32;
use super::table::SymbolTable;
use crate::error::{SymbolError, SymbolResult};
use crate::types::{PdbKey, SymbolFormat, SymbolOrigin};

/// Metadata root signature ("BSJB") of a portable PDB.
const PORTABLE_PDB_SIGNATURE: &[u8; 4] = b"BSJB";
/// MSF 7.00 superblock magic of a Windows PDB.
const MSF_SIGNATURE: &[u8] = b"Microsoft C/C++ MSF 7.00\r\n\x1aDS\0\0\0";
/// Age portable PDBs report in their CodeView record.
const PORTABLE_PDB_AGE: u32 = 1;

/// Turns symbol file bytes into a [`SymbolTable`].
pub trait SymbolFileParser: Send + Sync
{
    /// Parse `data`, which was read from `origin`.
    ///
    /// ## Errors
    ///
    /// Implementations return [`SymbolError::MalformedSymbolData`] for bytes
    /// they cannot decode; the resolver then moves on to the next source.
    fn parse(&self, data: &[u8], origin: &SymbolOrigin) -> SymbolResult<SymbolTable>;
}

impl<F> SymbolFileParser for F
where
    F: Fn(&[u8], &SymbolOrigin) -> SymbolResult<SymbolTable> + Send + Sync,
{
    fn parse(&self, data: &[u8], origin: &SymbolOrigin) -> SymbolResult<SymbolTable>
    {
        self(data, origin)
    }
}

/// Detect the format of a symbol file from its leading bytes.
pub fn sniff_format(data: &[u8]) -> Option<SymbolFormat>
{
    if data.starts_with(PORTABLE_PDB_SIGNATURE) {
        Some(SymbolFormat::PortablePdb)
    } else if data.starts_with(MSF_SIGNATURE) {
        Some(SymbolFormat::WindowsPdb)
    } else {
        None
    }
}

/// Parser that validates file signatures without decoding any tables.
///
/// Produces empty tables, which is enough to locate and correlate symbol
/// files (the CLI's `locate` command uses it). For portable PDBs the PDB id
/// is read from the `#Pdb` stream so mismatched files are still rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderOnlyParser;

impl SymbolFileParser for HeaderOnlyParser
{
    fn parse(&self, data: &[u8], origin: &SymbolOrigin) -> SymbolResult<SymbolTable>
    {
        match sniff_format(data) {
            Some(SymbolFormat::PortablePdb) => {
                let table = SymbolTable::new(SymbolFormat::PortablePdb);
                Ok(match portable_pdb_id(data) {
                    Some(key) => table.with_pdb_key(key),
                    None => table,
                })
            }
            Some(SymbolFormat::WindowsPdb) => Ok(SymbolTable::new(SymbolFormat::WindowsPdb)),
            None => Err(SymbolError::malformed(origin, "unrecognized symbol file signature")),
        }
    }
}

/// PDB id from the `#Pdb` stream of a portable PDB metadata root.
fn portable_pdb_id(data: &[u8]) -> Option<PdbKey>
{
    let version_length = read_u32(data, 12)? as usize;
    let mut offset = 16usize.checked_add(version_length)?;
    let stream_count = u16::from_le_bytes(data.get(offset + 2..offset + 4)?.try_into().ok()?);
    offset += 4;

    for _ in 0..stream_count {
        let stream_offset = read_u32(data, offset)? as usize;
        let name_start = offset + 8;
        let name_len = data.get(name_start..)?.iter().position(|byte| *byte == 0)?;
        let name = data.get(name_start..name_start + name_len)?;
        if name == b"#Pdb" {
            let guid: [u8; 16] = data.get(stream_offset..stream_offset + 16)?.try_into().ok()?;
            return Some(PdbKey::from_codeview(guid, PORTABLE_PDB_AGE));
        }
        // Stream names are NUL-terminated and padded to four bytes.
        offset = name_start + (name_len + 4) / 4 * 4;
    }
    None
}
