//! # Boiler Kernel
//!
//! Assembles the module list from `modules.yaml`, then runs the two
//! independent loops that share the store: the critical loop
//! (`Kernel`, ≈500ms) and the auxiliary loop (`AuxRunner`, ≈2s). Cycle
//! pacing lives in `cycle`; the manifest loader and module registry
//! (id → concrete type) live in `manifest` and `registry`.

pub mod aux_runner;
pub mod cycle;
pub mod error;
pub mod eventlog;
pub mod history;
pub mod kernel;
pub mod manifest;
pub mod registry;

pub use aux_runner::AuxRunner;
pub use error::KernelError;
pub use eventlog::EventLogModule;
pub use history::HistoryModule;
pub use kernel::{merge_partial_outputs, Kernel};
pub use manifest::{Manifest, ManifestEntry};
