//! Highest-priority forcing module: boiler and hopper overtemperature
//! trips. Runs before `safety` and overrides MANUAL.

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
pub struct OverheatConfig {
    pub boiler_trip_temp: f64,
    pub boiler_hysteresis: f64,
    pub hopper_trip_temp: f64,
    pub hopper_hysteresis: f64,
    pub hopper_purge_minutes: f64,
}

impl Default for OverheatConfig {
    fn default() -> Self {
        Self {
            boiler_trip_temp: 90.0,
            boiler_hysteresis: 5.0,
            hopper_trip_temp: 80.0,
            hopper_hysteresis: 5.0,
            hopper_purge_minutes: 10.0,
        }
    }
}

pub struct OverheatModule {
    config_dir: PathBuf,
    config: OverheatConfig,
    boiler_tripped: bool,
    hopper_tripped: bool,
    hopper_purge_until: Option<f64>,
    last_missing_warn_mono: Option<f64>,
    overriding_manual: bool,
}

impl OverheatModule {
    pub const ID: &'static str = "overheat";
    const MISSING_SENSOR_WARN_PERIOD_S: f64 = 60.0;

    pub fn new(config_dir: PathBuf) -> Self {
        let config = load_or_default(&config_dir, Self::ID);
        Self {
            config_dir,
            config,
            boiler_tripped: false,
            hopper_tripped: false,
            hopper_purge_until: None,
            last_missing_warn_mono: None,
            overriding_manual: false,
        }
    }
}

impl ModuleInterface for OverheatModule {
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
        let mut partial = PartialOutputs::default();
        let mut events = Vec::new();

        let (Some(boiler_temp), Some(hopper_temp)) = (sensors.boiler_temp, sensors.hopper_temp)
        else {
            let due = self
                .last_missing_warn_mono
                .is_none_or(|t| now_mono - t >= Self::MISSING_SENSOR_WARN_PERIOD_S);
            if due {
                events.push(Event::new(
                    now_wall,
                    Self::ID,
                    EventLevel::Warning,
                    "OVERHEAT_SENSOR_MISSING",
                    "boiler or hopper temperature unavailable, overheat protection disabled",
                ));
                self.last_missing_warn_mono = Some(now_mono);
            }
            return Ok(ModuleTickResult::new(partial).with_events(events));
        };

        if self.boiler_tripped {
            if boiler_temp <= self.config.boiler_trip_temp - self.config.boiler_hysteresis {
                self.boiler_tripped = false;
            }
        } else if boiler_temp >= self.config.boiler_trip_temp {
            self.boiler_tripped = true;
            events.push(Event::new(
                now_wall,
                Self::ID,
                EventLevel::Alarm,
                "OVERHEAT_BOILER_TRIP",
                format!("boiler_temp={boiler_temp:.1}"),
            ));
        }
        if self.boiler_tripped {
            partial.pump_co_on = Some(true);
            partial.pump_cwu_on = Some(true);
            partial.fan_power = Some(0);
            partial.feeder_on = Some(false);
            partial.mixer_open_on = Some(true);
        }

        if self.hopper_tripped {
            if hopper_temp <= self.config.hopper_trip_temp - self.config.hopper_hysteresis {
                self.hopper_tripped = false;
                self.hopper_purge_until = None;
            }
        } else if hopper_temp >= self.config.hopper_trip_temp {
            self.hopper_tripped = true;
            self.hopper_purge_until = Some(now_mono + self.config.hopper_purge_minutes * 60.0);
            events.push(Event::new(
                now_wall,
                Self::ID,
                EventLevel::Alarm,
                "OVERHEAT_HOPPER_TRIP",
                format!("hopper_temp={hopper_temp:.1}"),
            ));
        }
        if self.hopper_tripped {
            partial.pump_co_on = Some(true);
            partial.pump_cwu_on = Some(true);
            partial.fan_power = Some(0);
            let purging = self.hopper_purge_until.is_some_and(|until| now_mono < until);
            partial.feeder_on = Some(purging);
        }

        let forcing_outputs = self.boiler_tripped || self.hopper_tripped;
        let overriding_now = forcing_outputs && system_state.mode == BoilerMode::Manual;
        if overriding_now && !self.overriding_manual {
            events.push(Event::new(
                now_wall,
                Self::ID,
                EventLevel::Warning,
                "OVERHEAT_OVERRIDE_MANUAL",
                "overheat protection overriding manual outputs",
            ));
        }
        self.overriding_manual = overriding_now;

        Ok(ModuleTickResult::new(partial).with_events(events))
    }

    fn get_config_schema(&self) -> Value {
        json!({
            "boiler_trip_temp": { "type": "float", "unit": "C", "default": 90.0 },
            "boiler_hysteresis": { "type": "float", "unit": "C", "default": 5.0 },
            "hopper_trip_temp": { "type": "float", "unit": "C", "default": 80.0 },
            "hopper_hysteresis": { "type": "float", "unit": "C", "default": 5.0 },
            "hopper_purge_minutes": { "type": "float", "unit": "min", "default": 10.0 },
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

    fn sensors(boiler: f64, hopper: f64) -> Sensors {
        Sensors {
            boiler_temp: Some(boiler),
            hopper_temp: Some(hopper),
            ..Sensors::default()
        }
    }

    #[test]
    fn boiler_trip_forces_safe_outputs() {
        let dir = tempdir().unwrap();
        let mut m = OverheatModule::new(dir.path().to_path_buf());
        let state = SystemState::default();
        let r = m.tick(0.0, &sensors(95.0, 20.0), &state).unwrap();
        assert_eq!(r.partial_outputs.fan_power, Some(0));
        assert_eq!(r.partial_outputs.feeder_on, Some(false));
        assert_eq!(r.partial_outputs.pump_co_on, Some(true));
        assert_eq!(r.events[0].event_type, "OVERHEAT_BOILER_TRIP");
    }

    #[test]
    fn boiler_trip_releases_only_past_hysteresis_band() {
        let dir = tempdir().unwrap();
        let mut m = OverheatModule::new(dir.path().to_path_buf());
        let state = SystemState::default();
        let _ = m.tick(0.0, &sensors(95.0, 20.0), &state).unwrap();
        let r1 = m.tick(1.0, &sensors(87.0, 20.0), &state).unwrap();
        assert_eq!(r1.partial_outputs.fan_power, Some(0), "still tripped within band");
        let r2 = m.tick(2.0, &sensors(84.0, 20.0), &state).unwrap();
        assert_eq!(r2.partial_outputs.fan_power, None);
    }

    #[test]
    fn hopper_trip_runs_one_shot_purge_then_stops() {
        let dir = tempdir().unwrap();
        let mut m = OverheatModule::new(dir.path().to_path_buf());
        let mut state = SystemState::default();
        state.ts_mono = 0.0;
        let r0 = m.tick(0.0, &sensors(20.0, 85.0), &state).unwrap();
        assert_eq!(r0.partial_outputs.feeder_on, Some(true));

        state.ts_mono = 700.0;
        let r1 = m.tick(700.0, &sensors(20.0, 85.0), &state).unwrap();
        assert_eq!(r1.partial_outputs.feeder_on, Some(false));
    }

    #[test]
    fn boiler_trip_in_manual_mode_warns_once_on_the_overriding_edge() {
        let dir = tempdir().unwrap();
        let mut m = OverheatModule::new(dir.path().to_path_buf());
        let mut state = SystemState::default();
        state.mode = BoilerMode::Manual;
        let r0 = m.tick(0.0, &sensors(95.0, 20.0), &state).unwrap();
        assert!(r0.events.iter().any(|e| e.event_type == "OVERHEAT_OVERRIDE_MANUAL"));
        let r1 = m.tick(1.0, &sensors(95.0, 20.0), &state).unwrap();
        assert!(!r1.events.iter().any(|e| e.event_type == "OVERHEAT_OVERRIDE_MANUAL"));
    }

    #[test]
    fn missing_sensor_forces_nothing_but_warns() {
        let dir = tempdir().unwrap();
        let mut m = OverheatModule::new(dir.path().to_path_buf());
        let state = SystemState::default();
        let r = m.tick(0.0, &Sensors::default(), &state).unwrap();
        assert_eq!(r.partial_outputs, PartialOutputs::default());
        assert_eq!(r.events[0].event_type, "OVERHEAT_SENSOR_MISSING");
    }
}
