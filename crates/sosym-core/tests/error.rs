//! Tests for error handling

use sosym_core::error::{SymbolError, SymbolResult};

#[test]
fn test_invalid_handle_display()
{
    let error = SymbolError::InvalidHandle(42);
    let message = format!("{error}");
    assert!(message.contains("42"));
    assert!(message.contains("Invalid symbol handle"));
}

#[test]
fn test_configuration_display()
{
    let error = SymbolError::Configuration("no usable entries".to_string());
    assert!(error.to_string().contains("no usable entries"));
}

#[test]
fn test_source_errors_are_source_local()
{
    let unreachable = SymbolError::SourceUnreachable {
        location: "https://symbols.example".to_string(),
        reason: "timed out".to_string(),
    };
    assert!(unreachable.is_source_local());
    assert!(unreachable.to_string().contains("https://symbols.example"));

    let malformed = SymbolError::MalformedSymbolData {
        origin: "/symbols/App.pdb".to_string(),
        reason: "bad signature".to_string(),
    };
    assert!(malformed.is_source_local());

    assert!(!SymbolError::InvalidHandle(1).is_source_local());
    assert!(!SymbolError::InvalidArgument("slot".to_string()).is_source_local());
}

#[test]
fn test_io_error_conversion()
{
    fn read() -> SymbolResult<Vec<u8>>
    {
        Ok(std::fs::read("/definitely/not/a/real/path.pdb")?)
    }
    let error = read().unwrap_err();
    assert!(matches!(error, SymbolError::Io(_)));
    assert!(error.to_string().contains("IO error"));
}
