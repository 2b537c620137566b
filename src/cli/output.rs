//! CLI output: error mapping from engine errors to the CLI surface.

use crate::error::EngineError;

/// Map engine errors to a string for CLI output.
pub fn map_error(e: &EngineError) -> String {
    match e {
        EngineError::ConfigError(msg) => format!("Configuration error: {}", msg),
        EngineError::InvalidInput(msg) => format!("Invalid input: {}", msg),
        other => other.to_string(),
    }
}
