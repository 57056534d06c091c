//! # Boiler Common
//!
//! Shared leaves of the boiler control workspace: the clock abstraction,
//! system-wide constants, YAML-backed configuration loading, and the
//! error types surfaced at module/config boundaries.
//!
//! Everything above the control loop (`boiler_core`, `boiler_modules`,
//! `boiler_kernel`) depends on this crate; it depends on nothing else in
//! the workspace.

pub mod clock;
pub mod config;
pub mod consts;
pub mod error;
pub mod prelude;

pub use clock::{Clock, FakeClock, RealClock};
pub use error::{ConfigError, PersistError};
