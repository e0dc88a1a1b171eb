//! Managed PE image inspection.
//!
//! Reads just enough of a PE image to drive symbol lookup: the image key
//! (timestamp/size), the CodeView record naming the PDB, an embedded portable
//! PDB, and the CLI metadata blob. Images may be in file layout (as on disk)
//! or mapped layout (as copied out of a process, where RVA == offset).

use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use flate2::read::DeflateDecoder;
use object::pe::{self, ImageNtHeaders32, ImageNtHeaders64};
use object::read::pe::{ImageNtHeaders, ImageOptionalHeader, PeFile, SectionTable};
use object::{FileKind, LittleEndian};

use super::key::SymbolStoreKey;
use crate::error::{SymbolError, SymbolResult};
use crate::types::identity::file_name_of;
use crate::types::{ImageKey, PdbKey};

const DEBUG_TYPE_CODEVIEW: u32 = 2;
const DEBUG_TYPE_EMBEDDED_PORTABLE_PDB: u32 = 17;
const DEBUG_DIRECTORY_ENTRY_SIZE: usize = 28;
/// CodeView minor version marking a portable PDB ("PM").
const PORTABLE_CODEVIEW_MINOR: u16 = 0x504d;
const CODEVIEW_SIGNATURE: &[u8; 4] = b"RSDS";
const EMBEDDED_PDB_SIGNATURE: &[u8; 4] = b"MPDB";
const COR20_HEADER_SIZE: u32 = 72;

/// How the image bytes are laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageLayout
{
    /// Bytes as stored on disk; sections live at their raw file offsets.
    #[default]
    File,
    /// Bytes as mapped by the loader; sections live at their RVAs.
    Mapped,
}

/// PDB reference from an image's CodeView debug directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeViewRecord
{
    /// PDB path as recorded by the compiler (often a build machine path).
    pub pdb_path: String,
    pub pdb_key: PdbKey,
    /// Whether the referenced PDB is a portable PDB.
    pub portable: bool,
}

impl CodeViewRecord
{
    pub fn pdb_file_name(&self) -> &str
    {
        file_name_of(&self.pdb_path)
    }

    /// Key of the referenced PDB in a symbol store.
    pub fn store_key(&self) -> SymbolStoreKey
    {
        if self.portable {
            SymbolStoreKey::portable_pdb(self.pdb_file_name(), self.pdb_key.guid)
        } else {
            SymbolStoreKey::windows_pdb(self.pdb_file_name(), self.pdb_key)
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DebugDirectoryEntry
{
    minor_version: u16,
    kind: u32,
    size: u32,
    rva: u32,
    file_offset: u32,
}

/// Parsed view over the bytes of a managed PE image.
#[derive(Debug)]
pub struct ManagedImage<'data>
{
    data: &'data [u8],
    layout: ImageLayout,
    image_key: ImageKey,
    sections: SectionTable<'data>,
    debug_directory: Option<(u32, u32)>,
    clr_header: Option<(u32, u32)>,
}

impl<'data> ManagedImage<'data>
{
    /// Parse the PE headers of an image.
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::MalformedSymbolData`] if the bytes are not a
    /// PE32 or PE32+ image.
    pub fn parse(data: &'data [u8], layout: ImageLayout) -> SymbolResult<Self>
    {
        match FileKind::parse(data) {
            Ok(FileKind::Pe32) => Self::parse_headers::<ImageNtHeaders32>(data, layout),
            Ok(FileKind::Pe64) => Self::parse_headers::<ImageNtHeaders64>(data, layout),
            Ok(kind) => Err(SymbolError::malformed("image", format!("not a PE image ({kind:?})"))),
            Err(err) => Err(SymbolError::malformed("image", err)),
        }
    }

    fn parse_headers<Pe: ImageNtHeaders>(data: &'data [u8], layout: ImageLayout) -> SymbolResult<Self>
    {
        let file: PeFile<'data, Pe, &'data [u8]> =
            PeFile::parse(data).map_err(|err| SymbolError::malformed("PE headers", err))?;

        let headers = file.nt_headers();
        let image_key = ImageKey::new(
            headers.file_header().time_date_stamp.get(LittleEndian),
            headers.optional_header().size_of_image(),
        );

        let directories = file.data_directories();
        let debug_directory = directories
            .get(pe::IMAGE_DIRECTORY_ENTRY_DEBUG)
            .map(pe::ImageDataDirectory::address_range);
        let clr_header = directories
            .get(pe::IMAGE_DIRECTORY_ENTRY_COM_DESCRIPTOR)
            .map(pe::ImageDataDirectory::address_range);

        Ok(Self {
            data,
            layout,
            image_key,
            sections: file.section_table(),
            debug_directory,
            clr_header,
        })
    }

    pub fn image_key(&self) -> ImageKey
    {
        self.image_key
    }

    pub fn layout(&self) -> ImageLayout
    {
        self.layout
    }

    /// Whether the image carries a CLI header (is a managed module).
    pub fn is_managed(&self) -> bool
    {
        self.clr_header.is_some()
    }

    /// Bytes at an RVA, honouring the image layout.
    pub fn bytes_at_rva(&self, rva: u32, size: u32) -> Option<&'data [u8]>
    {
        let size = size as usize;
        match self.layout {
            ImageLayout::File => self.sections.pe_data_at(self.data, rva)?.get(..size),
            ImageLayout::Mapped => {
                let start = rva as usize;
                self.data.get(start..start.checked_add(size)?)
            }
        }
    }

    fn debug_entries(&self) -> Vec<DebugDirectoryEntry>
    {
        let Some((rva, size)) = self.debug_directory else {
            return Vec::new();
        };
        let Some(bytes) = self.bytes_at_rva(rva, size) else {
            return Vec::new();
        };

        bytes
            .chunks_exact(DEBUG_DIRECTORY_ENTRY_SIZE)
            .filter_map(|raw| {
                Some(DebugDirectoryEntry {
                    minor_version: read_u16(raw, 10)?,
                    kind: read_u32(raw, 12)?,
                    size: read_u32(raw, 16)?,
                    rva: read_u32(raw, 20)?,
                    file_offset: read_u32(raw, 24)?,
                })
            })
            .collect()
    }

    fn entry_data(&self, entry: &DebugDirectoryEntry) -> Option<&'data [u8]>
    {
        let start = match self.layout {
            ImageLayout::File => entry.file_offset,
            ImageLayout::Mapped => entry.rva,
        };
        let start = start as usize;
        self.data.get(start..start.checked_add(entry.size as usize)?)
    }

    /// First well-formed CodeView (RSDS) record of the image.
    pub fn codeview(&self) -> Option<CodeViewRecord>
    {
        self.debug_entries()
            .iter()
            .filter(|entry| entry.kind == DEBUG_TYPE_CODEVIEW)
            .find_map(|entry| {
                let data = self.entry_data(entry)?;
                if data.get(..4)? != CODEVIEW_SIGNATURE {
                    return None;
                }
                let guid: [u8; 16] = data.get(4..20)?.try_into().ok()?;
                let age = read_u32(data, 20)?;
                let path = data.get(24..)?;
                let end = path.iter().position(|byte| *byte == 0).unwrap_or(path.len());
                Some(CodeViewRecord {
                    pdb_path: String::from_utf8_lossy(&path[..end]).into_owned(),
                    pdb_key: PdbKey::from_codeview(guid, age),
                    portable: entry.minor_version == PORTABLE_CODEVIEW_MINOR,
                })
            })
    }

    /// Decompressed embedded portable PDB, if the image carries one.
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::MalformedSymbolData`] when the entry exists but
    /// its blob is truncated, has a bad signature, or fails to inflate.
    pub fn embedded_portable_pdb(&self) -> SymbolResult<Option<Vec<u8>>>
    {
        let entries = self.debug_entries();
        let Some(entry) = entries.iter().find(|entry| entry.kind == DEBUG_TYPE_EMBEDDED_PORTABLE_PDB) else {
            return Ok(None);
        };

        let data = self
            .entry_data(entry)
            .ok_or_else(|| SymbolError::malformed("embedded PDB", "entry points outside the image"))?;
        if data.len() < 8 || &data[..4] != EMBEDDED_PDB_SIGNATURE {
            return Err(SymbolError::malformed("embedded PDB", "missing MPDB signature"));
        }
        let expected = read_u32(data, 4).unwrap_or_default() as usize;

        let mut pdb = Vec::with_capacity(expected);
        DeflateDecoder::new(&data[8..])
            .read_to_end(&mut pdb)
            .map_err(|err| SymbolError::malformed("embedded PDB", err))?;
        if pdb.len() != expected {
            return Err(SymbolError::malformed(
                "embedded PDB",
                format!("inflated to {} bytes, header says {expected}", pdb.len()),
            ));
        }
        Ok(Some(pdb))
    }

    /// CLI metadata blob.
    ///
    /// A non-zero `metadata_rva` overrides the metadata directory recorded in
    /// the CLI header; the size always comes from the header.
    pub fn metadata(&self, metadata_rva: u32) -> Option<&'data [u8]>
    {
        let (rva, size) = self.clr_header?;
        let header = self.bytes_at_rva(rva, size.min(COR20_HEADER_SIZE))?;
        let recorded_rva = read_u32(header, 8)?;
        let metadata_size = read_u32(header, 12)?;
        let rva = if metadata_rva == 0 { recorded_rva } else { metadata_rva };
        self.bytes_at_rva(rva, metadata_size)
    }
}

/// Source of module image bytes.
///
/// The built-in [`FileImageReader`] reads images from disk; hosts inspecting
/// a live process or a dump supply one backed by their memory reader, or pass
/// mapped bytes directly in a [`LoadRequest`](super::LoadRequest).
pub trait ModuleImageReader: Send + Sync
{
    /// Read the image at `path`. `Ok(None)` means there is no such image.
    fn read_image(&self, path: &Path) -> SymbolResult<Option<Arc<[u8]>>>;
}

/// Reads module images from the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileImageReader;

impl ModuleImageReader for FileImageReader
{
    fn read_image(&self, path: &Path) -> SymbolResult<Option<Arc<[u8]>>>
    {
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(Arc::from(fs::read(path)?)))
    }
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16>
{
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> Option<u32>
{
    let bytes: [u8; 4] = data.get(offset..offset + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}
