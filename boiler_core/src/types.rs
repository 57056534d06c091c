//! The shared data model: sensors, outputs, events, and the single
//! `SystemState` struct that flows through the control loop.
//!
//! Every optional field here is a real `Option`, never a sentinel value
//! like `-1.0` or `0`. Absence means "no reading" (`Sensors`) or "no
//! opinion" (`PartialOutputs`), and the two must never be confused with
//! a present zero.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};

/// Maximum number of events kept in `SystemState.recent_events` for
/// convenience of HTTP readers. The authoritative history lives in the
/// store's event ring buffer, not here.
pub const RECENT_EVENTS_TAIL: usize = 200;

/// One sampled sensor snapshot. Every field may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sensors {
    pub boiler_temp: Option<f64>,
    pub return_temp: Option<f64>,
    pub radiator_temp: Option<f64>,
    pub dhw_temp: Option<f64>,
    pub flue_gas_temp: Option<f64>,
    pub hopper_temp: Option<f64>,
    pub outside_temp: Option<f64>,
    pub mixer_temp: Option<f64>,
    pub stb_triggered: Option<bool>,
    pub door_open: Option<bool>,
}

/// The fully specified actuator vector applied to hardware each tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outputs {
    pub fan_power: u8,
    pub feeder_on: bool,
    pub pump_co_on: bool,
    pub pump_cwu_on: bool,
    pub pump_circ_on: bool,
    pub mixer_open_on: bool,
    pub mixer_close_on: bool,
    pub alarm_buzzer_on: bool,
    pub alarm_relay_on: bool,
    /// Computed burner power setpoint [%], internal — consumed by the
    /// feeder and blower modules, not an actuator by itself.
    pub power_percent: f64,
}

impl Default for Outputs {
    fn default() -> Self {
        Self {
            fan_power: 0,
            feeder_on: false,
            pump_co_on: false,
            pump_cwu_on: false,
            pump_circ_on: false,
            mixer_open_on: false,
            mixer_close_on: false,
            alarm_buzzer_on: false,
            alarm_relay_on: false,
            power_percent: 0.0,
        }
    }
}

/// A per-field optional delta returned by a module's `tick`. `None`
/// means "this module has no opinion" — never "set to the default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialOutputs {
    pub fan_power: Option<u8>,
    pub feeder_on: Option<bool>,
    pub pump_co_on: Option<bool>,
    pub pump_cwu_on: Option<bool>,
    pub pump_circ_on: Option<bool>,
    pub mixer_open_on: Option<bool>,
    pub mixer_close_on: Option<bool>,
    pub alarm_buzzer_on: Option<bool>,
    pub alarm_relay_on: Option<bool>,
    pub power_percent: Option<f64>,
}

/// Apply `delta` onto `base`, last-writer-wins on every present field.
/// Absent fields in `delta` never change `base`. This is the single
/// merge primitive the Kernel folds over the manifest-ordered module
/// list — see `boiler_kernel::kernel::merge_partial_outputs`.
pub fn apply_partial(base: &mut Outputs, delta: &PartialOutputs) {
    if let Some(v) = delta.fan_power {
        base.fan_power = v;
    }
    if let Some(v) = delta.feeder_on {
        base.feeder_on = v;
    }
    if let Some(v) = delta.pump_co_on {
        base.pump_co_on = v;
    }
    if let Some(v) = delta.pump_cwu_on {
        base.pump_cwu_on = v;
    }
    if let Some(v) = delta.pump_circ_on {
        base.pump_circ_on = v;
    }
    if let Some(v) = delta.mixer_open_on {
        base.mixer_open_on = v;
    }
    if let Some(v) = delta.mixer_close_on {
        base.mixer_close_on = v;
    }
    if let Some(v) = delta.alarm_buzzer_on {
        base.alarm_buzzer_on = v;
    }
    if let Some(v) = delta.alarm_relay_on {
        base.alarm_relay_on = v;
    }
    if let Some(v) = delta.power_percent {
        base.power_percent = v;
    }
}

/// The subset of `Outputs` the operator can drive directly while in
/// `BoilerMode::Manual`. Mutated only by the HTTP command handler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManualOverrideState {
    pub fan_power: u8,
    pub feeder_on: bool,
    pub pump_co_on: bool,
    pub pump_cwu_on: bool,
    pub mixer_open_on: bool,
    pub mixer_close_on: bool,
    pub last_update_wall: f64,
}

impl Default for ManualOverrideState {
    fn default() -> Self {
        Self {
            fan_power: 0,
            feeder_on: false,
            pump_co_on: false,
            pump_cwu_on: false,
            mixer_open_on: false,
            mixer_close_on: false,
            last_update_wall: 0.0,
        }
    }
}

/// Severity of an `Event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
    Alarm,
}

/// An immutable record published through the store. `seq` is assigned
/// by the store on publish and is `None` until then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub ts_wall: f64,
    pub source: String,
    pub level: EventLevel,
    #[serde(rename = "type")]
    pub event_type: String,
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub seq: Option<u64>,
}

impl Event {
    pub fn new(
        ts_wall: f64,
        source: impl Into<String>,
        level: EventLevel,
        event_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            ts_wall,
            source: source.into(),
            level,
            event_type: event_type.into(),
            message: message.into(),
            data: Map::new(),
            seq: None,
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }
}

/// Health of a single registered module, as last observed by the
/// Kernel or `AuxRunner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModuleHealth {
    Ok,
    Warning,
    Error,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleStatus {
    pub id: String,
    pub health: ModuleHealth,
    pub last_error: Option<String>,
    pub last_tick_duration: f64,
    pub last_updated_wall: f64,
}

impl ModuleStatus {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            health: ModuleHealth::Ok,
            last_error: None,
            last_tick_duration: 0.0,
            last_updated_wall: 0.0,
        }
    }
}

/// The boiler's top-level operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BoilerMode {
    Off,
    Ignition,
    Work,
    Manual,
}

/// The single shared piece of mutable state. Owned by `StateStore`;
/// modules only ever see a deep-copied snapshot or a short-lived
/// `&mut` borrow under the store's lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemState {
    pub ts_wall: f64,
    pub ts_mono: f64,
    pub sensors: Sensors,
    pub outputs: Outputs,
    pub mode: BoilerMode,
    pub alarm_active: bool,
    pub alarm_message: Option<String>,
    pub modules: HashMap<String, ModuleStatus>,
    pub recent_events: VecDeque<Event>,
    pub runtime: Map<String, Value>,
    pub manual: ManualOverrideState,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            ts_wall: 0.0,
            ts_mono: 0.0,
            sensors: Sensors::default(),
            outputs: Outputs::default(),
            mode: BoilerMode::Off,
            alarm_active: false,
            alarm_message: None,
            modules: HashMap::new(),
            recent_events: VecDeque::new(),
            runtime: Map::new(),
            manual: ManualOverrideState::default(),
        }
    }
}

impl SystemState {
    /// Append `event` to the rolling HTTP-convenience tail, evicting
    /// the oldest entry once `RECENT_EVENTS_TAIL` is exceeded.
    pub fn push_recent_event(&mut self, event: Event) {
        self.recent_events.push_back(event);
        while self.recent_events.len() > RECENT_EVENTS_TAIL {
            self.recent_events.pop_front();
        }
    }
}
