//! Tests for symbol path parsing and the active search path

use sosym_core::path::{SourceKind, SymbolPathParser};
use sosym_core::{SymbolError, SymbolService, SymbolServiceConfig};

#[test]
fn test_mixed_path_keeps_order()
{
    let parsed = SymbolPathParser::new()
        .parse(r" C:\sym1 ; srv*C:\cache*https://msdl.example/download/symbols ;; /opt/symbols ")
        .unwrap();
    let kinds: Vec<SourceKind> = parsed.sources().iter().map(|source| source.kind()).collect();
    assert_eq!(
        kinds,
        vec![SourceKind::LocalDirectory, SourceKind::SymbolServer, SourceKind::LocalDirectory]
    );
    assert_eq!(parsed.sources()[0].location(), r"C:\sym1");
    assert_eq!(parsed.sources()[1].location(), "https://msdl.example/download/symbols");
    assert_eq!(
        parsed.sources()[1].cache_dir().and_then(|dir| dir.to_str()),
        Some(r"C:\cache")
    );
    assert!(parsed.warnings().is_empty());
}

#[test]
fn test_empty_path_is_empty_list()
{
    let parsed = SymbolPathParser::new().parse("   ").unwrap();
    assert!(parsed.sources().is_empty());
    assert!(parsed.warnings().is_empty());
}

#[test]
fn test_bad_entries_become_warnings()
{
    let parsed = SymbolPathParser::new()
        .parse("bogus*thing;SRV*https://example/symbols;srv*")
        .unwrap();
    assert_eq!(parsed.sources().len(), 1);
    assert_eq!(parsed.sources()[0].kind(), SourceKind::SymbolServer);
    assert!(parsed.sources()[0].cache_dir().is_none());
    assert_eq!(parsed.warnings().len(), 2);
}

#[test]
fn test_all_entries_rejected_is_configuration_error()
{
    let err = SymbolPathParser::new().parse("bogus*thing;srv*").unwrap_err();
    assert!(matches!(err, SymbolError::Configuration(_)));
    assert!(err.to_string().contains("bogus*thing"));
}

#[test]
fn test_bare_url_is_server()
{
    let parsed = SymbolPathParser::new().parse("https://symbols.example/store").unwrap();
    assert_eq!(parsed.sources()[0].kind(), SourceKind::SymbolServer);
}

#[test]
fn test_service_replaces_active_path()
{
    let config = SymbolServiceConfig::default().with_symbol_path("/first");
    let service = SymbolService::new(config).unwrap();
    assert_eq!(service.sources()[0].location(), "/first");

    let parsed = service.parse_symbol_path("/second;srv*https://example/symbols").unwrap();
    assert_eq!(parsed.sources().len(), 2);
    let locations: Vec<String> = service.sources().iter().map(|s| s.location().to_string()).collect();
    assert_eq!(locations, vec!["/second", "https://example/symbols"]);
}

#[test]
fn test_unusable_configured_path_fails_build()
{
    let config = SymbolServiceConfig::default().with_symbol_path("nope*nope");
    assert!(matches!(SymbolService::new(config), Err(SymbolError::Configuration(_))));
}
