//! The uniform contract every controller module implements.
//!
//! Critical vs. auxiliary is a property of where the Kernel/AuxRunner
//! registers a module, not of the trait — see `boiler_kernel::manifest`.

use crate::types::{BoilerMode, Event, PartialOutputs, Sensors, SystemState};
use serde_json::Value;
use thiserror::Error;

/// Raised when a module's `tick` cannot produce a result. The Kernel
/// never propagates this — it is caught, logged as `MODULE_ERROR` /
/// `AUX_MODULE_ERROR`, and the module is retried on the next tick.
#[derive(Debug, Clone, Error)]
pub enum ModuleError {
    #[error("{0}")]
    Tick(String),

    #[error("config error: {0}")]
    Config(#[from] boiler_common::ConfigError),

    #[error("persist error: {0}")]
    Persist(#[from] boiler_common::PersistError),

    /// A patched config value fails its schema's `min`/`max`/`options`
    /// bound. Distinct from `Tick`'s type-mismatch case so callers can
    /// map it to a different HTTP status.
    #[error("{field} out of range: {detail}")]
    OutOfRange { field: String, detail: String },
}

/// What a module contributes on one tick: a delta over `Outputs` and
/// zero or more events. Modules never publish events directly — the
/// Kernel is the sole publisher, which keeps sequence numbering simple.
#[derive(Debug, Clone, Default)]
pub struct ModuleTickResult {
    pub partial_outputs: PartialOutputs,
    pub events: Vec<Event>,
    /// Requests the Kernel set `SystemState.mode` after this tick's
    /// merge completes. Only the `mode` module and the manual-override
    /// HTTP handler are expected to ever set this; any other module
    /// doing so is a bug, not a supported escalation path.
    pub mode_override: Option<BoilerMode>,
}

impl ModuleTickResult {
    pub fn new(partial_outputs: PartialOutputs) -> Self {
        Self {
            partial_outputs,
            events: Vec::new(),
            mode_override: None,
        }
    }

    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.events = events;
        self
    }

    pub fn with_mode_override(mut self, mode: BoilerMode) -> Self {
        self.mode_override = Some(mode);
        self
    }
}

/// A controller module: owns its private state, an optional on-disk
/// config, an optional on-disk resumable state file, and ticks once
/// per loop iteration against a read-only snapshot.
pub trait ModuleInterface: Send {
    /// Stable identifier, also the manifest key and the directory name
    /// used for this module's config/state files.
    fn id(&self) -> &str;

    /// One step of this module's logic. `sensors` and `system_state`
    /// are a consistent snapshot taken at the start of the owning
    /// loop's tick; `system_state.sensors` and `sensors` are identical
    /// — the latter is passed separately only for call-site brevity.
    fn tick(
        &mut self,
        now_wall: f64,
        sensors: &Sensors,
        system_state: &SystemState,
    ) -> Result<ModuleTickResult, ModuleError>;

    /// Field-level schema for this module's configuration, as loaded
    /// from `schema.yaml`. Returns `Value::Null` for modules with no
    /// configurable fields.
    fn get_config_schema(&self) -> Value {
        Value::Null
    }

    /// Current configuration values, as would round-trip through
    /// `set_config_values`.
    fn get_config_values(&self) -> Value {
        Value::Null
    }

    /// Apply new configuration values. Unknown keys are ignored;
    /// missing keys keep their current value. `persist` controls
    /// whether the result is also written to `values.yaml`.
    fn set_config_values(&mut self, _values: &Value, _persist: bool) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Re-read `values.yaml` from disk and apply it, discarding any
    /// in-memory overrides not reflected on disk.
    fn reload_config_from_file(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }
}
