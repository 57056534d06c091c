//! # Boiler HAL
//!
//! The abstract `HardwareInterface` contract between the Kernel and the
//! physical board, plus a mock simulator used as a test collaborator.
//! The real board driver is explicitly out of scope — only this
//! contract and the mock matter here.

pub mod driver;
pub mod mock;

pub use driver::{HardwareError, HardwareInterface};
pub use mock::MockHardware;
