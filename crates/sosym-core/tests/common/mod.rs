//! Shared helpers for integration tests: a synthetic managed PE builder, a
//! line-based fixture symbol format, and instrumented capabilities.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use flate2::write::DeflateEncoder;
use flate2::Compression;
use sosym_core::error::{SymbolError, SymbolResult};
use sosym_core::symbols::{
    FileShareTransport, LocalScope, MethodSymbols, SymbolStoreKey, SymbolTable, SymbolTransport,
};
use sosym_core::types::{PdbKey, SequencePoint, SymbolFormat, SymbolOrigin};
use uuid::Uuid;

pub const FIXTURE_MAGIC: &str = "SOSYM-FIXTURE";
pub const METHOD_MAIN: u32 = 0x0600_0001;
pub const METHOD_HELPER: u32 = 0x0600_0002;
/// First sequence point at IL offset 4.
pub const METHOD_LATE_START: u32 = 0x0600_0003;
/// Compiler-generated body with hidden points only.
pub const METHOD_HIDDEN: u32 = 0x0600_0004;

const E_LFANEW: usize = 0x80;
const OPTIONAL_HEADER: usize = E_LFANEW + 4 + 20;
const OPTIONAL_HEADER_SIZE: usize = 224;
const SECTION_TABLE: usize = OPTIONAL_HEADER + OPTIONAL_HEADER_SIZE;
const HEADERS_SIZE: usize = 0x200;
const SECTION_RVA: u32 = 0x2000;
const FILE_ALIGNMENT: usize = 0x200;
const SECTION_ALIGNMENT: u32 = 0x1000;
const CLI_HEADER_SIZE: usize = 72;

pub fn guid(seed: u8) -> Uuid
{
    Uuid::from_bytes([seed; 16])
}

/// Builder for a minimal PE32 image with one section holding a CLI header,
/// metadata and debug directory data.
#[derive(Debug, Clone)]
pub struct PeBuilder
{
    timestamp: u32,
    metadata: Vec<u8>,
    codeview: Option<(PdbKey, String, bool)>,
    embedded_pdb: Option<Vec<u8>>,
}

/// A built image in both layouts.
#[derive(Debug, Clone)]
pub struct BuiltImage
{
    pub file: Vec<u8>,
    pub mapped: Vec<u8>,
    pub timestamp: u32,
    pub size: u32,
    /// RVA of the metadata blob.
    pub metadata_rva: u32,
}

impl PeBuilder
{
    pub fn new(timestamp: u32) -> Self
    {
        Self {
            timestamp,
            metadata: b"BSJB\x01\x00\x01\x00fixture-metadata".to_vec(),
            codeview: None,
            embedded_pdb: None,
        }
    }

    pub fn metadata(mut self, metadata: &[u8]) -> Self
    {
        self.metadata = metadata.to_vec();
        self
    }

    pub fn codeview(mut self, key: PdbKey, pdb_path: &str, portable: bool) -> Self
    {
        self.codeview = Some((key, pdb_path.to_string(), portable));
        self
    }

    pub fn embedded_pdb(mut self, pdb: &[u8]) -> Self
    {
        self.embedded_pdb = Some(pdb.to_vec());
        self
    }

    pub fn build(&self) -> BuiltImage
    {
        let mut section = vec![0u8; CLI_HEADER_SIZE];
        let metadata_offset = section.len();
        section.extend_from_slice(&self.metadata);
        pad_to(&mut section, 4);

        // Debug data blobs first, so their offsets are known when the
        // directory entries are written.
        let mut blobs: Vec<(u32, u16, usize, usize)> = Vec::new();
        if let Some((key, path, portable)) = &self.codeview {
            let start = section.len();
            section.extend_from_slice(b"RSDS");
            section.extend_from_slice(&key.guid.to_bytes_le());
            section.extend_from_slice(&key.age.to_le_bytes());
            section.extend_from_slice(path.as_bytes());
            section.push(0);
            let minor = if *portable { 0x504d } else { 0 };
            blobs.push((2, minor, start, section.len() - start));
            pad_to(&mut section, 4);
        }
        if let Some(pdb) = &self.embedded_pdb {
            let start = section.len();
            section.extend_from_slice(b"MPDB");
            section.extend_from_slice(&(pdb.len() as u32).to_le_bytes());
            section.extend_from_slice(&deflate(pdb));
            blobs.push((17, 0x0100, start, section.len() - start));
            pad_to(&mut section, 4);
        }

        let debug_offset = section.len();
        for (kind, minor, start, size) in &blobs {
            let mut entry = [0u8; 28];
            entry[8..10].copy_from_slice(&0x0100u16.to_le_bytes());
            entry[10..12].copy_from_slice(&minor.to_le_bytes());
            entry[12..16].copy_from_slice(&kind.to_le_bytes());
            entry[16..20].copy_from_slice(&(*size as u32).to_le_bytes());
            entry[20..24].copy_from_slice(&(SECTION_RVA + *start as u32).to_le_bytes());
            entry[24..28].copy_from_slice(&((HEADERS_SIZE + start) as u32).to_le_bytes());
            section.extend_from_slice(&entry);
        }
        let debug_size = blobs.len() * 28;

        let metadata_rva = SECTION_RVA + metadata_offset as u32;
        section[0..4].copy_from_slice(&(CLI_HEADER_SIZE as u32).to_le_bytes());
        section[4..6].copy_from_slice(&2u16.to_le_bytes());
        section[6..8].copy_from_slice(&5u16.to_le_bytes());
        section[8..12].copy_from_slice(&metadata_rva.to_le_bytes());
        section[12..16].copy_from_slice(&(self.metadata.len() as u32).to_le_bytes());
        section[16..20].copy_from_slice(&1u32.to_le_bytes());

        let virtual_size = section.len() as u32;
        let raw_size = align(section.len(), FILE_ALIGNMENT);
        let size_of_image = SECTION_RVA + align(virtual_size as usize, SECTION_ALIGNMENT as usize) as u32;

        let mut headers = vec![0u8; HEADERS_SIZE];
        headers[0..2].copy_from_slice(b"MZ");
        put_u32(&mut headers, 0x3c, E_LFANEW as u32);
        headers[E_LFANEW..E_LFANEW + 4].copy_from_slice(b"PE\0\0");

        let file_header = E_LFANEW + 4;
        put_u16(&mut headers, file_header, 0x014c);
        put_u16(&mut headers, file_header + 2, 1);
        put_u32(&mut headers, file_header + 4, self.timestamp);
        put_u16(&mut headers, file_header + 16, OPTIONAL_HEADER_SIZE as u16);
        put_u16(&mut headers, file_header + 18, 0x2102);

        let opt = OPTIONAL_HEADER;
        put_u16(&mut headers, opt, 0x010b);
        put_u32(&mut headers, opt + 4, raw_size as u32);
        put_u32(&mut headers, opt + 20, SECTION_RVA);
        put_u32(&mut headers, opt + 28, 0x1000_0000);
        put_u32(&mut headers, opt + 32, SECTION_ALIGNMENT);
        put_u32(&mut headers, opt + 36, FILE_ALIGNMENT as u32);
        put_u16(&mut headers, opt + 40, 4);
        put_u16(&mut headers, opt + 48, 4);
        put_u32(&mut headers, opt + 56, size_of_image);
        put_u32(&mut headers, opt + 60, HEADERS_SIZE as u32);
        put_u16(&mut headers, opt + 68, 3);
        put_u32(&mut headers, opt + 92, 16);
        if !blobs.is_empty() {
            put_u32(&mut headers, opt + 144, SECTION_RVA + debug_offset as u32);
            put_u32(&mut headers, opt + 148, debug_size as u32);
        }
        put_u32(&mut headers, opt + 208, SECTION_RVA);
        put_u32(&mut headers, opt + 212, CLI_HEADER_SIZE as u32);

        let sh = SECTION_TABLE;
        headers[sh..sh + 5].copy_from_slice(b".text");
        put_u32(&mut headers, sh + 8, virtual_size);
        put_u32(&mut headers, sh + 12, SECTION_RVA);
        put_u32(&mut headers, sh + 16, raw_size as u32);
        put_u32(&mut headers, sh + 20, HEADERS_SIZE as u32);
        put_u32(&mut headers, sh + 36, 0x6000_0020);

        let mut file = headers.clone();
        file.extend_from_slice(&section);
        file.resize(HEADERS_SIZE + raw_size, 0);

        let mut mapped = headers;
        mapped.resize(SECTION_RVA as usize, 0);
        mapped.extend_from_slice(&section);
        mapped.resize(size_of_image as usize, 0);

        BuiltImage {
            file,
            mapped,
            timestamp: self.timestamp,
            size: size_of_image,
            metadata_rva,
        }
    }
}

fn deflate(data: &[u8]) -> Vec<u8>
{
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn align(value: usize, alignment: usize) -> usize
{
    value.div_ceil(alignment) * alignment
}

fn pad_to(data: &mut Vec<u8>, alignment: usize)
{
    let len = align(data.len(), alignment);
    data.resize(len, 0);
}

fn put_u16(data: &mut [u8], offset: usize, value: u16)
{
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(data: &mut [u8], offset: usize, value: u32)
{
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Fixture symbol file with four methods in `Program.cs`.
///
/// `Main` maps IL 0 to line 10, 1 to line 11, a hidden point at 8 and 12 to
/// line 12; its scopes name slot 0 `args` and slot 1 `count`/`item`.
/// `Helper` maps 0 and 6 to lines 20 and 21. [`METHOD_LATE_START`] begins at
/// IL 4 (line 30) and [`METHOD_HIDDEN`] has no visible points.
pub fn fixture_pdb(format: SymbolFormat, key: PdbKey) -> Vec<u8>
{
    let format = match format {
        SymbolFormat::PortablePdb => "portable",
        SymbolFormat::WindowsPdb => "windows",
    };
    format!(
        "{FIXTURE_MAGIC}\n\
         format {format}\n\
         id {} {}\n\
         doc /src/App/Program.cs\n\
         method {METHOD_MAIN:x}\n\
         sp 0 0 10 5 6\n\
         sp 1 0 11 9 30\n\
         hidden 8 0\n\
         sp 12 0 12 9 40\n\
         scope 0 20 0=args 1=count\n\
         scope 8 4 1=item\n\
         method {METHOD_HELPER:x}\n\
         sp 0 0 20 5 6\n\
         sp 6 0 21 9 22\n\
         method {METHOD_LATE_START:x}\n\
         sp 4 0 30 9 18\n\
         sp 10 0 31 9 18\n\
         method {METHOD_HIDDEN:x}\n\
         hidden 0 0\n\
         hidden 5 0\n",
        key.guid.hyphenated(),
        key.age,
    )
    .into_bytes()
}

/// Parser for the fixture format written by [`fixture_pdb`].
pub fn parse_fixture(data: &[u8], origin: &SymbolOrigin) -> SymbolResult<SymbolTable>
{
    let malformed = |reason: &str| SymbolError::MalformedSymbolData {
        origin: origin.to_string(),
        reason: reason.to_string(),
    };
    let text = std::str::from_utf8(data).map_err(|_| malformed("not utf-8"))?;
    let mut lines = text.lines();
    if lines.next() != Some(FIXTURE_MAGIC) {
        return Err(malformed("missing fixture magic"));
    }

    let mut table: Option<SymbolTable> = None;
    let mut methods: Vec<(u32, Vec<SequencePoint>, Vec<LocalScope>)> = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let number = |index: usize| -> SymbolResult<u32> {
            fields
                .get(index)
                .and_then(|field| field.parse().ok())
                .ok_or_else(|| malformed(line))
        };
        match fields.first().copied() {
            Some("format") => {
                let format = match fields.get(1).copied() {
                    Some("portable") => SymbolFormat::PortablePdb,
                    Some("windows") => SymbolFormat::WindowsPdb,
                    _ => return Err(malformed(line)),
                };
                table = Some(SymbolTable::new(format));
            }
            Some("id") => {
                let guid = fields.get(1).and_then(|field| Uuid::parse_str(field).ok()).ok_or_else(|| malformed(line))?;
                let key = PdbKey::new(guid, number(2)?);
                table = table.map(|table| table.with_pdb_key(key));
            }
            Some("doc") => {
                let table = table.as_mut().ok_or_else(|| malformed(line))?;
                table.add_document(fields[1..].join(" "));
            }
            Some("method") => {
                let token = fields
                    .get(1)
                    .and_then(|field| u32::from_str_radix(field, 16).ok())
                    .ok_or_else(|| malformed(line))?;
                methods.push((token, Vec::new(), Vec::new()));
            }
            Some("sp") => {
                let point = SequencePoint::new(number(1)?, number(2)?, number(3)?, number(4)?, number(5)?);
                methods.last_mut().ok_or_else(|| malformed(line))?.1.push(point);
            }
            Some("hidden") => {
                let point = SequencePoint::hidden(number(1)?, number(2)?);
                methods.last_mut().ok_or_else(|| malformed(line))?.1.push(point);
            }
            Some("scope") => {
                let mut scope = LocalScope::new(number(1)?, number(2)?);
                for variable in &fields[3..] {
                    let (slot, name) = variable.split_once('=').ok_or_else(|| malformed(line))?;
                    scope = scope.with_variable(slot.parse().map_err(|_| malformed(line))?, name);
                }
                methods.last_mut().ok_or_else(|| malformed(line))?.2.push(scope);
            }
            None => {}
            Some(_) => return Err(malformed(line)),
        }
    }

    let mut table = table.ok_or_else(|| malformed("missing format line"))?;
    for (token, points, scopes) in methods {
        table.insert_method(token, MethodSymbols::new(points, scopes));
    }
    Ok(table)
}

/// Write `data` at `root/<key>`, the symbol store layout.
pub fn write_store_file(root: &Path, key: &SymbolStoreKey, data: &[u8]) -> PathBuf
{
    let path = root.join(key.relative_path());
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, data).unwrap();
    path
}

/// File share transport that counts fetches.
#[derive(Debug, Default)]
pub struct CountingTransport
{
    pub fetches: AtomicUsize,
}

impl CountingTransport
{
    pub fn count(&self) -> usize
    {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl SymbolTransport for CountingTransport
{
    fn fetch(&self, server: &str, key: &SymbolStoreKey) -> SymbolResult<Option<Vec<u8>>>
    {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        FileShareTransport.fetch(server, key)
    }
}
