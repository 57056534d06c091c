//! Tracks the IGNITION -> WORK automatic transition.
//!
//! The only module (besides the manual-override HTTP handler) allowed
//! to request a `SystemState.mode` change. It never touches `Outputs`.

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
pub struct ModeConfig {
    pub auto_switch_ignition_to_work: bool,
    pub switch_temp: f64,
    pub min_ignition_time_s: f64,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            auto_switch_ignition_to_work: true,
            switch_temp: 65.0,
            min_ignition_time_s: 300.0,
        }
    }
}

pub struct ModeModule {
    config_dir: PathBuf,
    config: ModeConfig,
    last_mode: Option<BoilerMode>,
    ignition_started_at: Option<f64>,
}

impl ModeModule {
    pub const ID: &'static str = "mode";

    pub fn new(config_dir: PathBuf) -> Self {
        let config = load_or_default(&config_dir, Self::ID);
        Self {
            config_dir,
            config,
            last_mode: None,
            ignition_started_at: None,
        }
    }

    fn mode_changed_event(&self, now_wall: f64, from: BoilerMode, to: BoilerMode) -> Event {
        Event::new(
            now_wall,
            Self::ID,
            EventLevel::Info,
            "MODE_CHANGED",
            format!("{from:?} -> {to:?}"),
        )
        .with_data(
            json!({ "prev_mode": format!("{from:?}").to_uppercase(), "mode": format!("{to:?}").to_uppercase() })
                .as_object()
                .cloned()
                .unwrap_or_default(),
        )
    }
}

impl ModuleInterface for ModeModule {
    fn id(&self) -> &str {
        Self::ID
    }

    fn tick(
        &mut self,
        now_wall: f64,
        sensors: &Sensors,
        system_state: &SystemState,
    ) -> Result<ModuleTickResult, ModuleError> {
        let current = system_state.mode;
        let mut events = Vec::new();
        let mut mode_override = None;

        if self.last_mode != Some(current) {
            if let Some(prev) = self.last_mode {
                events.push(self.mode_changed_event(now_wall, prev, current));
            }
            self.ignition_started_at = if current == BoilerMode::Ignition {
                Some(system_state.ts_mono)
            } else {
                None
            };
            self.last_mode = Some(current);
        }

        if current == BoilerMode::Ignition && self.config.auto_switch_ignition_to_work {
            if let (Some(started), Some(boiler_temp)) =
                (self.ignition_started_at, sensors.boiler_temp)
            {
                let duration = system_state.ts_mono - started;
                if duration >= self.config.min_ignition_time_s
                    && boiler_temp >= self.config.switch_temp
                {
                    events.push(self.mode_changed_event(now_wall, current, BoilerMode::Work));
                    self.last_mode = Some(BoilerMode::Work);
                    self.ignition_started_at = None;
                    mode_override = Some(BoilerMode::Work);
                }
            }
        }

        let mut result = ModuleTickResult::new(PartialOutputs::default()).with_events(events);
        if let Some(mode) = mode_override {
            result = result.with_mode_override(mode);
        }
        Ok(result)
    }

    fn get_config_schema(&self) -> Value {
        json!({
            "auto_switch_ignition_to_work": { "type": "bool", "default": true },
            "switch_temp": { "type": "float", "unit": "C", "default": 65.0 },
            "min_ignition_time_s": { "type": "float", "unit": "s", "default": 300.0 },
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

    fn sensors_with_temp(t: f64) -> Sensors {
        Sensors {
            boiler_temp: Some(t),
            ..Sensors::default()
        }
    }

    #[test]
    fn stays_in_ignition_before_min_time_elapsed() {
        let dir = tempdir().unwrap();
        let mut module = ModeModule::new(dir.path().to_path_buf());
        let mut state = SystemState::default();
        state.mode = BoilerMode::Ignition;
        state.ts_mono = 0.0;
        let _ = module.tick(0.0, &sensors_with_temp(70.0), &state).unwrap();

        state.ts_mono = 100.0;
        let result = module.tick(100.0, &sensors_with_temp(70.0), &state).unwrap();
        assert!(result.mode_override.is_none());
    }

    #[test]
    fn switches_to_work_once_temp_and_time_conditions_met() {
        let dir = tempdir().unwrap();
        let mut module = ModeModule::new(dir.path().to_path_buf());
        let mut state = SystemState::default();
        state.mode = BoilerMode::Ignition;
        state.ts_mono = 0.0;
        let _ = module.tick(0.0, &sensors_with_temp(50.0), &state).unwrap();

        state.ts_mono = 301.0;
        let result = module
            .tick(301.0, &sensors_with_temp(66.0), &state)
            .unwrap();
        assert_eq!(result.mode_override, Some(BoilerMode::Work));
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].event_type, "MODE_CHANGED");
    }

    #[test]
    fn missing_boiler_sensor_never_switches() {
        let dir = tempdir().unwrap();
        let mut module = ModeModule::new(dir.path().to_path_buf());
        let mut state = SystemState::default();
        state.mode = BoilerMode::Ignition;
        let _ = module.tick(0.0, &Sensors::default(), &state).unwrap();
        state.ts_mono = 1000.0;
        let result = module.tick(1000.0, &Sensors::default(), &state).unwrap();
        assert!(result.mode_override.is_none());
    }

    #[test]
    fn transition_out_of_ignition_emits_mode_changed_event() {
        let dir = tempdir().unwrap();
        let mut module = ModeModule::new(dir.path().to_path_buf());
        let mut state = SystemState::default();
        state.mode = BoilerMode::Ignition;
        let _ = module.tick(0.0, &Sensors::default(), &state).unwrap();
        state.mode = BoilerMode::Off;
        let result = module.tick(1.0, &Sensors::default(), &state).unwrap();
        assert_eq!(result.events.len(), 1);
    }
}
