//! Last-resort sensor-missing fallbacks. Runs unconditionally, last in
//! the manifest, and may overwrite any field set by an earlier module.

use crate::config_support::{load_or_default, merge_and_reparse, persist, reload};
use boiler_core::{
    BoilerMode, Event, EventLevel, ModuleError, ModuleInterface, ModuleTickResult, PartialOutputs,
    Sensors, SystemState,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SafetyConfig {
    pub force_fan_off_on_boiler_missing: bool,
    pub force_pumps_on_boiler_missing: bool,
    pub repeat_warning_s: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            force_fan_off_on_boiler_missing: true,
            force_pumps_on_boiler_missing: true,
            repeat_warning_s: 30.0,
        }
    }
}

#[derive(Debug, Default)]
struct SensorWatch {
    missing: bool,
    last_warn_mono: Option<f64>,
}

impl SensorWatch {
    /// Evaluate one sensor's presence. Returns events for an ON/OFF edge
    /// plus a periodic repeat while the sensor stays missing.
    fn check(
        &mut self,
        present: bool,
        now_wall: f64,
        now_mono: f64,
        repeat_s: f64,
        event_type: &str,
    ) -> Vec<Event> {
        let mut events = Vec::new();
        let missing = !present;
        if missing != self.missing {
            let edge_type = format!("{event_type}_{}", if missing { "ON" } else { "OFF" });
            events.push(Event::new(
                now_wall,
                SafetyModule::ID,
                EventLevel::Warning,
                edge_type,
                format!("{event_type} missing={missing}"),
            ));
            self.missing = missing;
            self.last_warn_mono = if missing { Some(now_mono) } else { None };
        } else if missing {
            let due = self
                .last_warn_mono
                .is_none_or(|t| now_mono - t >= repeat_s);
            if due {
                events.push(Event::new(
                    now_wall,
                    SafetyModule::ID,
                    EventLevel::Warning,
                    event_type,
                    format!("{event_type} still missing"),
                ));
                self.last_warn_mono = Some(now_mono);
            }
        }
        events
    }
}

pub struct SafetyModule {
    config_dir: PathBuf,
    config: SafetyConfig,
    boiler: SensorWatch,
    rad: SensorWatch,
    hopper: SensorWatch,
    flue: SensorWatch,
}

impl SafetyModule {
    pub const ID: &'static str = "safety";

    pub fn new(config_dir: PathBuf) -> Self {
        let config = load_or_default(&config_dir, Self::ID);
        Self {
            config_dir,
            config,
            boiler: SensorWatch::default(),
            rad: SensorWatch::default(),
            hopper: SensorWatch::default(),
            flue: SensorWatch::default(),
        }
    }
}

impl ModuleInterface for SafetyModule {
    fn id(&self) -> &str {
        Self::ID
    }

    fn tick(
        &mut self,
        now_wall: f64,
        sensors: &Sensors,
        system_state: &SystemState,
    ) -> Result<ModuleTickResult, ModuleError> {
        let now_mono = system_state.ts_mono;
        let repeat_s = self.config.repeat_warning_s.max(5.0);
        let mut partial = PartialOutputs::default();
        let mut events = Vec::new();

        events.extend(self.boiler.check(
            sensors.boiler_temp.is_some(),
            now_wall,
            now_mono,
            repeat_s,
            "SENSOR_BOILER_MISSING",
        ));
        if sensors.boiler_temp.is_none() {
            partial.feeder_on = Some(false);
            if self.config.force_fan_off_on_boiler_missing {
                partial.fan_power = Some(0);
            }
            if self.config.force_pumps_on_boiler_missing {
                partial.pump_co_on = Some(true);
                partial.pump_cwu_on = Some(true);
            }
            if system_state.mode == BoilerMode::Manual {
                events.push(Event::new(
                    now_wall,
                    Self::ID,
                    EventLevel::Warning,
                    "SAFETY_OVERRIDES_MANUAL",
                    "boiler sensor missing, overriding manual outputs",
                ));
            }
        }

        events.extend(self.rad.check(
            sensors.radiator_temp.is_some(),
            now_wall,
            now_mono,
            repeat_s,
            "SENSOR_RAD_MISSING",
        ));
        if sensors.radiator_temp.is_none() {
            partial.mixer_open_on = Some(false);
            partial.mixer_close_on = Some(false);
        }

        events.extend(self.hopper.check(
            sensors.hopper_temp.is_some(),
            now_wall,
            now_mono,
            repeat_s,
            "SENSOR_HOPPER_MISSING",
        ));
        events.extend(self.flue.check(
            sensors.flue_gas_temp.is_some(),
            now_wall,
            now_mono,
            repeat_s,
            "SENSOR_FLUE_MISSING",
        ));

        Ok(ModuleTickResult::new(partial).with_events(events))
    }

    fn get_config_schema(&self) -> Value {
        json!({
            "force_fan_off_on_boiler_missing": { "type": "bool", "default": true },
            "force_pumps_on_boiler_missing": { "type": "bool", "default": true },
            "repeat_warning_s": { "type": "float", "unit": "s", "default": 30.0 },
        })
    }

    fn get_config_values(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or(Value::Null)
    }

    fn set_config_values(&mut self, values: &Value, persist_to_disk: bool) -> Result<(), ModuleError> {
        self.config = merge_and_reparse(&self.config, values)?;
        if persist_to_disk {
            persist(&self.config_dir, Self::ID, &self.config)?;
        }
        Ok(())
    }

    fn reload_config_from_file(&mut self) -> Result<(), ModuleError> {
        if let Some(loaded) = reload(&self.config_dir, Self::ID)? {
            self.config = loaded;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_boiler_sensor_disables_feeder_and_fan() {
        let dir = tempdir().unwrap();
        let mut m = SafetyModule::new(dir.path().to_path_buf());
        let state = SystemState::default();
        let r = m.tick(0.0, &Sensors::default(), &state).unwrap();
        assert_eq!(r.partial_outputs.feeder_on, Some(false));
        assert_eq!(r.partial_outputs.fan_power, Some(0));
        assert_eq!(r.events[0].event_type, "SENSOR_BOILER_MISSING_ON");
    }

    #[test]
    fn missing_rad_sensor_clears_both_mixer_directions() {
        let dir = tempdir().unwrap();
        let mut m = SafetyModule::new(dir.path().to_path_buf());
        let mut sensors = Sensors::default();
        sensors.boiler_temp = Some(60.0);
        let state = SystemState::default();
        let r = m.tick(0.0, &sensors, &state).unwrap();
        assert_eq!(r.partial_outputs.mixer_open_on, Some(false));
        assert_eq!(r.partial_outputs.mixer_close_on, Some(false));
    }

    #[test]
    fn recovering_sensor_emits_off_edge_and_stops_forcing() {
        let dir = tempdir().unwrap();
        let mut m = SafetyModule::new(dir.path().to_path_buf());
        let state = SystemState::default();
        let _ = m.tick(0.0, &Sensors::default(), &state).unwrap();
        let mut sensors = Sensors::default();
        sensors.boiler_temp = Some(60.0);
        sensors.radiator_temp = Some(45.0);
        let r = m.tick(1.0, &sensors, &state).unwrap();
        assert_eq!(r.partial_outputs.feeder_on, None);
        assert!(r.events.iter().any(|e| e.event_type == "SENSOR_BOILER_MISSING_OFF"));
    }

    #[test]
    fn repeat_warning_never_fires_below_five_second_floor() {
        let dir = tempdir().unwrap();
        let mut m = SafetyModule::new(dir.path().to_path_buf());
        m.config.repeat_warning_s = 1.0;
        let state = SystemState::default();
        let _ = m.tick(0.0, &Sensors::default(), &state).unwrap();
        let r = m.tick(2.0, &Sensors::default(), &state).unwrap();
        assert!(r.events.is_empty(), "floor is 5s even though config said 1s");
    }
}
