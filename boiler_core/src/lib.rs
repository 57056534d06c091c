//! # Boiler Core
//!
//! The shared data model (`SystemState` and friends), the `ModuleInterface`
//! contract every controller module implements, and `StateStore`, the
//! mutex-guarded owner of state and the event bus.

pub mod module_interface;
pub mod state_store;
pub mod types;

pub use module_interface::{ModuleError, ModuleInterface, ModuleTickResult};
pub use state_store::StateStore;
pub use types::{
    apply_partial, BoilerMode, Event, EventLevel, ManualOverrideState, ModuleHealth, ModuleStatus,
    Outputs, PartialOutputs, Sensors, SystemState,
};
