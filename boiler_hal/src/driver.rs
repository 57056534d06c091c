//! `HardwareInterface` trait and its error type.
//!
//! Implementations are required not to throw: `read_sensors` and
//! `apply_outputs` are specified as non-failing at this boundary. An
//! implementation whose internal plumbing (bus I/O, GPIO) can fail
//! catches its own errors and degrades to a best-effort result —
//! `HardwareError` exists for that internal bookkeeping and diagnostics,
//! not as a signal the Kernel is expected to act on beyond logging.

use boiler_core::{Outputs, Sensors};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum HardwareError {
    #[error("hardware communication error: {0}")]
    Communication(String),

    #[error("hardware initialization failed: {0}")]
    InitFailed(String),
}

/// Reads sensors and drives actuators. Implementations must be
/// idempotent: calling `apply_outputs` twice with the same value has
/// the same effect as calling it once.
///
/// # Timing
///
/// Both operations are called once per Kernel tick and must complete
/// well within the tick period (nominally 500 ms); they must not block
/// on anything but the underlying I/O transaction itself.
pub trait HardwareInterface: Send {
    /// Returns a fresh sensor snapshot. A sensor that cannot currently
    /// be read is represented as `None`, never a sentinel value.
    fn read_sensors(&mut self) -> Sensors;

    /// Drives every actuator to the given vector. Must not throw —
    /// log-and-degrade on internal failure.
    fn apply_outputs(&mut self, outputs: &Outputs);

    /// Human-readable name, surfaced in diagnostics and logs.
    fn name(&self) -> &'static str;
}
