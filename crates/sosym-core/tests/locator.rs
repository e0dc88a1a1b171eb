//! Tests for metadata and debug data location

mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use common::{guid, write_store_file, CountingTransport, PeBuilder};
use sosym_core::symbols::{MetadataRequest, SymbolStoreKey};
use sosym_core::types::{ImageKey, PdbKey};
use sosym_core::{SymbolService, SymbolServiceConfig};
use tempfile::TempDir;

const METADATA: &[u8] = b"BSJB\x01\x00\x01\x00v4.0.30319\x00\x00tables-and-heaps";

fn service(root: &TempDir, symbol_path: &str, transport: Arc<CountingTransport>) -> SymbolService
{
    let config = SymbolServiceConfig::default()
        .with_cache_dir(root.path().join("cache"))
        .with_symbol_path(symbol_path);
    SymbolService::builder(config).transport(transport).build().unwrap()
}

#[test]
fn test_metadata_from_image_path()
{
    let root = tempfile::tempdir().unwrap();
    let image = PeBuilder::new(0x1234_5678).metadata(METADATA).build();
    let path = root.path().join("System.Private.CoreLib.dll");
    fs::write(&path, &image.file).unwrap();

    let service = service(&root, "", Arc::default());
    let request = MetadataRequest::new(&path, image.timestamp, image.size);
    assert_eq!(service.metadata_bytes(&request).as_deref(), Some(METADATA));
}

#[test]
fn test_two_phase_buffer_fill()
{
    let root = tempfile::tempdir().unwrap();
    let image = PeBuilder::new(0x1234_5678).metadata(METADATA).build();
    let path = root.path().join("App.dll");
    fs::write(&path, &image.file).unwrap();
    let service = service(&root, "", Arc::default());
    let request = MetadataRequest::new(&path, image.timestamp, image.size);

    let mut small = [0u8; 8];
    let fill = service.locate_metadata(&request, &mut small).unwrap();
    assert!(!fill.is_complete());
    assert_eq!(fill.required, METADATA.len());
    assert_eq!(fill.written, 8);
    assert_eq!(&small, &METADATA[..8]);

    let mut buffer = vec![0u8; fill.required];
    let fill = service.locate_metadata(&request, &mut buffer).unwrap();
    assert!(fill.is_complete());
    assert_eq!(buffer, METADATA);
}

#[test]
fn test_timestamp_and_size_must_match()
{
    let root = tempfile::tempdir().unwrap();
    let image = PeBuilder::new(0x1234_5678).build();
    let path = root.path().join("App.dll");
    fs::write(&path, &image.file).unwrap();
    let service = service(&root, "", Arc::default());

    let wrong_time = MetadataRequest::new(&path, image.timestamp + 1, image.size);
    assert!(service.metadata_bytes(&wrong_time).is_none());
    let wrong_size = MetadataRequest::new(&path, image.timestamp, image.size + 0x1000);
    assert!(service.metadata_bytes(&wrong_size).is_none());
}

#[test]
fn test_image_found_in_local_directory()
{
    let root = tempfile::tempdir().unwrap();
    let image = PeBuilder::new(0x0bad_f00d).metadata(METADATA).build();
    let images = root.path().join("images");
    fs::create_dir_all(&images).unwrap();
    fs::write(images.join("App.dll"), &image.file).unwrap();

    let service = service(&root, images.to_str().unwrap(), Arc::default());
    let target_path = PathBuf::from("/nonexistent/target/app/App.dll");
    assert_eq!(
        service.locate_debug_data(&target_path, image.timestamp, image.size),
        Some(images.join("App.dll"))
    );
}

#[test]
fn test_image_downloaded_into_server_cache()
{
    let root = tempfile::tempdir().unwrap();
    let image = PeBuilder::new(0x0bad_f00d).metadata(METADATA).build();
    let store = root.path().join("store");
    let key = SymbolStoreKey::pe_image("App.dll", ImageKey::new(image.timestamp, image.size));
    write_store_file(&store, &key, &image.file);

    let transport = Arc::new(CountingTransport::default());
    let service = service(&root, &format!("srv*{}", store.display()), transport.clone());
    let target_path = PathBuf::from(r"C:\app\App.dll");

    let cached = root.path().join("cache").join(key.relative_path());
    assert_eq!(service.locate_debug_data(&target_path, image.timestamp, image.size), Some(cached.clone()));
    assert!(cached.is_file());

    // Second request is served from the cache without asking the server.
    let request = MetadataRequest::new(&target_path, image.timestamp, image.size);
    assert_eq!(service.metadata_bytes(&request).as_deref(), Some(METADATA));
    assert_eq!(transport.count(), 1);
}

#[test]
fn test_metadata_rva_override()
{
    let root = tempfile::tempdir().unwrap();
    // The CodeView record after the metadata keeps the shifted range inside
    // the section.
    let image = PeBuilder::new(0x1234_5678)
        .metadata(METADATA)
        .codeview(PdbKey::new(guid(1), 1), "App.pdb", false)
        .build();
    let path = root.path().join("App.dll");
    fs::write(&path, &image.file).unwrap();
    let service = service(&root, "", Arc::default());

    let request = MetadataRequest::new(&path, image.timestamp, image.size).with_metadata_rva(image.metadata_rva + 4);
    let shifted = service.metadata_bytes(&request).unwrap();
    assert_eq!(shifted.len(), METADATA.len());
    assert_eq!(&shifted[..METADATA.len() - 4], &METADATA[4..]);
}

#[test]
fn test_missing_everywhere_is_none()
{
    let root = tempfile::tempdir().unwrap();
    let service = service(&root, "", Arc::default());
    assert!(service
        .locate_debug_data(&root.path().join("Missing.dll"), 1, 0x2000)
        .is_none());
}
