//! Errors raised while assembling the module list from `modules.yaml`.

use boiler_common::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("failed to load module manifest: {0}")]
    Manifest(#[from] ConfigError),

    #[error("modules.yaml references unknown module id: {0}")]
    UnknownModule(String),
}
