// crates/sqlite-worker-config/src/load.rs
// ============================================================================
// Module: Worker Config Loading
// Description: File guards, TOML parsing, and validation for `WorkerConfig`.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, sqlite-worker, thiserror, toml
// ============================================================================

//! ## Overview
//! The config file is read only after its path passes length limits, and
//! parsed only after its size and encoding pass. The `[worker]` table maps
//! one-to-one onto [`WorkerConfig`]; any key outside it is an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use serde::Deserialize;
use sqlite_worker::WorkerConfig;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: File Model
// ============================================================================

/// Top-level TOML document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    /// Engine settings.
    worker: WorkerConfig,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads and validates a worker configuration file.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] for path, size, encoding, or value
/// violations, [`ConfigError::Parse`] for malformed TOML or unknown keys, and
/// [`ConfigError::Io`] when the file cannot be read.
pub fn load(path: &Path) -> Result<WorkerConfig, ConfigError> {
    validate_path(path)?;
    let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
    if bytes.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
    }
    let content = std::str::from_utf8(&bytes)
        .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
    parse(content)
}

/// Parses and validates worker configuration text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
/// [`ConfigError::Invalid`] when the values fail validation.
pub fn parse(content: &str) -> Result<WorkerConfig, ConfigError> {
    if content.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
    }
    let file: ConfigFile =
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
    file.worker.validate().map_err(|err| ConfigError::Invalid(err.to_string()))?;
    Ok(file.worker)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates the config path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}
