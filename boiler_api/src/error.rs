//! Error type shared by every handler. Each variant carries enough
//! shape to pick an HTTP status at the (not-yet-written) transport
//! layer without this crate depending on one.

use boiler_core::ModuleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown mode: {0}")]
    UnknownMode(String),

    #[error("unknown module: {0}")]
    UnknownModule(String),

    #[error("manual outputs can only be set while mode == MANUAL")]
    NotInManualMode,

    #[error("mixer open and close requested at once")]
    MixerConflict,

    #[error("invalid config patch for '{module}': {source}")]
    InvalidConfig {
        module: String,
        #[source]
        source: ModuleError,
    },

    #[error("malformed query: {0}")]
    BadQuery(String),

    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    /// The status code a router would map this to. Kept here so a future
    /// transport layer has one place to read it from instead of
    /// re-deriving the mapping.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::UnknownMode(_) => 422,
            ApiError::UnknownModule(_) => 404,
            ApiError::NotInManualMode => 422,
            ApiError::MixerConflict => 422,
            // A field that fails to parse into the module's config type is
            // a malformed request (400); a field that parses fine but
            // falls outside its schema's min/max/options is semantically
            // invalid, not malformed (422).
            ApiError::InvalidConfig { source: ModuleError::OutOfRange { .. }, .. } => 422,
            ApiError::InvalidConfig { .. } => 400,
            ApiError::BadQuery(_) => 400,
            ApiError::Io { .. } => 500,
        }
    }
}
