//! Fan duty-cycle with flue-temperature proportional correction.

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
pub struct BlowerConfig {
    pub base_fan_percent: f64,
    pub min_power_to_blow: f64,
    pub cycle_time_s: f64,
    pub flue_control_enabled: bool,
    pub flue_ignition_max_temp: f64,
    pub flue_opt_temp: f64,
    pub flue_kp: f64,
    pub flue_correction_max: f64,
}

impl Default for BlowerConfig {
    fn default() -> Self {
        Self {
            base_fan_percent: 45.0,
            min_power_to_blow: 3.0,
            cycle_time_s: 30.0,
            flue_control_enabled: true,
            flue_ignition_max_temp: 200.0,
            flue_opt_temp: 150.0,
            flue_kp: 0.1,
            flue_correction_max: 20.0,
        }
    }
}

pub struct BlowerModule {
    config_dir: PathBuf,
    config: BlowerConfig,
    cycle_start: Option<f64>,
    last_fan_output: u8,
    last_blowing: Option<bool>,
}

impl BlowerModule {
    pub const ID: &'static str = "blower";

    pub fn new(config_dir: PathBuf) -> Self {
        let config = load_or_default(&config_dir, Self::ID);
        Self {
            config_dir,
            config,
            cycle_start: None,
            last_fan_output: 0,
            last_blowing: None,
        }
    }

    fn flue_correction(&self, mode: BoilerMode, flue_temp: Option<f64>) -> f64 {
        if !self.config.flue_control_enabled {
            return 0.0;
        }
        let Some(flue) = flue_temp else {
            return 0.0;
        };
        let raw = match mode {
            BoilerMode::Ignition => {
                if flue > self.config.flue_ignition_max_temp {
                    -self.config.flue_kp * (flue - self.config.flue_ignition_max_temp)
                } else {
                    0.0
                }
            }
            BoilerMode::Work => -self.config.flue_kp * (flue - self.config.flue_opt_temp),
            _ => 0.0,
        };
        raw.clamp(-self.config.flue_correction_max, self.config.flue_correction_max)
    }
}

impl ModuleInterface for BlowerModule {
    fn id(&self) -> &str {
        Self::ID
    }

    fn tick(
        &mut self,
        now_wall: f64,
        sensors: &Sensors,
        system_state: &SystemState,
    ) -> Result<ModuleTickResult, ModuleError> {
        let mode = system_state.mode;
        let power = system_state.outputs.power_percent;
        let now_mono = system_state.ts_mono;

        let blowing = matches!(mode, BoilerMode::Ignition | BoilerMode::Work)
            && power > self.config.min_power_to_blow;

        if !blowing {
            self.cycle_start = None;
            let mut events = Vec::new();
            if self.last_blowing != Some(false) {
                events.push(blower_mode_event(now_wall, false));
            }
            self.last_blowing = Some(false);
            self.last_fan_output = 0;
            return Ok(ModuleTickResult::new(PartialOutputs {
                fan_power: Some(0),
                ..Default::default()
            })
            .with_events(events));
        }

        let mut events = Vec::new();
        if self.last_blowing != Some(true) {
            events.push(blower_mode_event(now_wall, true));
        }
        self.last_blowing = Some(true);

        let cycle_start = *self.cycle_start.get_or_insert(now_mono);
        let correction = self.flue_correction(mode, sensors.flue_gas_temp);
        let duty = (power / 100.0 + correction / 100.0).clamp(0.0, 1.0);

        let phase = (now_mono - cycle_start).rem_euclid(self.config.cycle_time_s.max(0.001));
        let on_time = duty * self.config.cycle_time_s;
        let fan_output = if phase < on_time {
            self.config.base_fan_percent.round() as u8
        } else {
            0
        };

        if (fan_output as f64 - self.last_fan_output as f64).abs() >= 5.0 {
            events.push(blower_power_event(now_wall, fan_output));
        }
        self.last_fan_output = fan_output;

        Ok(ModuleTickResult::new(PartialOutputs {
            fan_power: Some(fan_output),
            ..Default::default()
        })
        .with_events(events))
    }

    fn get_config_schema(&self) -> Value {
        json!({
            "base_fan_percent": { "type": "float", "unit": "%", "default": 45.0 },
            "min_power_to_blow": { "type": "float", "unit": "%", "default": 3.0 },
            "cycle_time_s": { "type": "float", "unit": "s", "default": 30.0 },
            "flue_control_enabled": { "type": "bool", "default": true },
            "flue_ignition_max_temp": { "type": "float", "unit": "C", "default": 200.0 },
            "flue_opt_temp": { "type": "float", "unit": "C", "default": 150.0 },
            "flue_kp": { "type": "float", "default": 0.1 },
            "flue_correction_max": { "type": "float", "unit": "%", "default": 20.0 },
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

fn blower_mode_event(now_wall: f64, blowing: bool) -> Event {
    Event::new(
        now_wall,
        BlowerModule::ID,
        EventLevel::Info,
        "BLOWER_MODE_CHANGED",
        format!("blowing={blowing}"),
    )
}

fn blower_power_event(now_wall: f64, fan_output: u8) -> Event {
    Event::new(
        now_wall,
        BlowerModule::ID,
        EventLevel::Info,
        "BLOWER_POWER_CHANGED",
        format!("fan_output={fan_output}"),
    )
    .with_data(
        json!({ "fan_output": fan_output })
            .as_object()
            .cloned()
            .unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn work_state(ts_mono: f64, power: f64) -> SystemState {
        let mut s = SystemState::default();
        s.mode = BoilerMode::Work;
        s.ts_mono = ts_mono;
        s.outputs.power_percent = power;
        s
    }

    #[test]
    fn idle_outside_active_modes_yields_zero_fan() {
        let dir = tempdir().unwrap();
        let mut m = BlowerModule::new(dir.path().to_path_buf());
        let mut s = SystemState::default();
        s.mode = BoilerMode::Off;
        let r = m.tick(0.0, &Sensors::default(), &s).unwrap();
        assert_eq!(r.partial_outputs.fan_power, Some(0));
    }

    #[test]
    fn early_in_cycle_fan_is_on_at_full_power() {
        let dir = tempdir().unwrap();
        let mut m = BlowerModule::new(dir.path().to_path_buf());
        let r = m.tick(0.0, &Sensors::default(), &work_state(0.0, 100.0)).unwrap();
        assert_eq!(r.partial_outputs.fan_power, Some(45));
    }

    #[test]
    fn fan_turns_off_after_duty_window_within_cycle() {
        let dir = tempdir().unwrap();
        let mut m = BlowerModule::new(dir.path().to_path_buf());
        let _ = m.tick(0.0, &Sensors::default(), &work_state(0.0, 50.0)).unwrap();
        let r = m.tick(29.0, &Sensors::default(), &work_state(29.0, 50.0)).unwrap();
        assert_eq!(r.partial_outputs.fan_power, Some(0));
    }

    #[test]
    fn ignition_only_reduces_duty_when_flue_above_max() {
        let dir = tempdir().unwrap();
        let m = BlowerModule::new(dir.path().to_path_buf());
        let low = m.flue_correction(BoilerMode::Ignition, Some(100.0));
        let high = m.flue_correction(BoilerMode::Ignition, Some(250.0));
        assert_eq!(low, 0.0);
        assert!(high < 0.0);
    }
}
