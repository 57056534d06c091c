//! Error types shared across the configuration and persistence boundary.

use thiserror::Error;

/// Errors raised while loading or validating a module's on-disk
/// configuration (`schema.yaml` / `values.yaml`).
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("config validation failed: {0}")]
    ValidationError(String),

    #[error("unknown config field: {0}")]
    UnknownField(String),
}

/// Errors raised while persisting or restoring a module's resumable
/// state (`*_state.yaml`).
#[derive(Debug, Clone, Error)]
pub enum PersistError {
    #[error("failed to read state file: {0}")]
    Read(String),

    #[error("failed to write state file: {0}")]
    Write(String),

    #[error("state file is malformed: {0}")]
    Malformed(String),
}
