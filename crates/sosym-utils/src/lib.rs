//! # sosym utilities
//!
//! Shared helpers for the sosym workspace. Today that is the logging setup
//! used by the CLI and by hosts embedding the engine.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
