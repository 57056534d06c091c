//! Three-state (OPEN/CLOSE/idle) pulse regulator for the radiator-loop
//! mixing valve, with a boiler-protection interlock on OPEN pulses.

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
pub struct MixerConfig {
    pub target_temp: f64,
    pub ok_band: f64,
    pub ramp_error_factor: f64,
    pub min_pulse_s: f64,
    pub max_pulse_s: f64,
    pub pulse_gain_s_per_degree: f64,
    pub adjust_interval_s: f64,
    pub boiler_min_temp_for_open: f64,
    pub boiler_max_drop_deg_c: f64,
    pub boiler_recover_factor: f64,
    pub preclose_on_ignition_enabled: bool,
    pub preclose_full_close_time_s: f64,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            target_temp: 40.0,
            ok_band: 2.0,
            ramp_error_factor: 2.0,
            min_pulse_s: 1.0,
            max_pulse_s: 10.0,
            pulse_gain_s_per_degree: 1.0,
            adjust_interval_s: 5.0,
            boiler_min_temp_for_open: 45.0,
            boiler_max_drop_deg_c: 5.0,
            boiler_recover_factor: 0.5,
            preclose_on_ignition_enabled: true,
            preclose_full_close_time_s: 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    None,
    Open,
    Close,
}

pub struct MixerModule {
    config_dir: PathBuf,
    config: MixerConfig,
    direction: Direction,
    pulse_ends_at: Option<f64>,
    pulse_started_at: Option<f64>,
    next_decision_at: Option<f64>,
    last_mode: Option<BoilerMode>,
    preclose_pending: bool,
    pre_open_boiler_temp: Option<f64>,
    boiler_block_until_recovered_to: Option<f64>,
}

impl MixerModule {
    pub const ID: &'static str = "mixer";

    pub fn new(config_dir: PathBuf) -> Self {
        let config = load_or_default(&config_dir, Self::ID);
        Self {
            config_dir,
            config,
            direction: Direction::None,
            pulse_ends_at: None,
            pulse_started_at: None,
            next_decision_at: None,
            last_mode: None,
            preclose_pending: true,
            pre_open_boiler_temp: None,
            boiler_block_until_recovered_to: None,
        }
    }

    fn idle() -> PartialOutputs {
        PartialOutputs {
            mixer_open_on: Some(false),
            mixer_close_on: Some(false),
            ..Default::default()
        }
    }

    fn outputs_for(direction: Direction) -> PartialOutputs {
        PartialOutputs {
            mixer_open_on: Some(direction == Direction::Open),
            mixer_close_on: Some(direction == Direction::Close),
            ..Default::default()
        }
    }

    fn start_event(now_wall: f64, direction: Direction, planned_s: f64) -> Event {
        let event_type = match direction {
            Direction::Open => "MIXER_OPEN_START",
            Direction::Close => "MIXER_CLOSE_START",
            Direction::None => "MIXER_IDLE",
        };
        Event::new(now_wall, MixerModule::ID, EventLevel::Info, event_type, format!("planned={planned_s:.1}s"))
            .with_data(json!({ "planned_s": planned_s }).as_object().cloned().unwrap_or_default())
    }

    fn stop_event(now_wall: f64, direction: Direction, planned_s: f64, actual_s: f64) -> Event {
        let event_type = match direction {
            Direction::Open => "MIXER_OPEN_STOP",
            Direction::Close => "MIXER_CLOSE_STOP",
            Direction::None => "MIXER_IDLE",
        };
        Event::new(now_wall, MixerModule::ID, EventLevel::Info, event_type, format!("actual={actual_s:.1}s"))
            .with_data(
                json!({ "planned_s": planned_s, "actual_s": actual_s })
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            )
    }
}

impl ModuleInterface for MixerModule {
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
        let mode = system_state.mode;

        if matches!(mode, BoilerMode::Off | BoilerMode::Manual) {
            let mut events = Vec::new();
            if self.direction != Direction::None {
                let planned = self.pulse_ends_at.unwrap_or(now_mono) - self.pulse_started_at.unwrap_or(now_mono);
                events.push(Self::stop_event(now_wall, self.direction, planned, now_mono - self.pulse_started_at.unwrap_or(now_mono)));
            }
            self.direction = Direction::None;
            self.pulse_ends_at = None;
            self.next_decision_at = None;
            self.last_mode = Some(mode);
            self.preclose_pending = true;
            return Ok(ModuleTickResult::new(Self::idle()).with_events(events));
        }

        let entering_ignition = mode == BoilerMode::Ignition
            && !matches!(self.last_mode, Some(BoilerMode::Ignition) | Some(BoilerMode::Work));
        self.last_mode = Some(mode);

        let mut events = Vec::new();

        if entering_ignition && self.preclose_pending && self.config.preclose_on_ignition_enabled {
            self.preclose_pending = false;
            if let Some(rad) = sensors.radiator_temp {
                if (rad - self.config.target_temp).abs() > self.config.ok_band {
                    self.direction = Direction::Close;
                    self.pulse_started_at = Some(now_mono);
                    self.pulse_ends_at = Some(now_mono + self.config.preclose_full_close_time_s);
                    events.push(Self::start_event(now_wall, Direction::Close, self.config.preclose_full_close_time_s));
                    return Ok(ModuleTickResult::new(Self::outputs_for(Direction::Close)).with_events(events));
                }
            }
        }

        if let Some(ends_at) = self.pulse_ends_at {
            if now_mono < ends_at {
                return Ok(ModuleTickResult::new(Self::outputs_for(self.direction)));
            }
            let planned = ends_at - self.pulse_started_at.unwrap_or(ends_at);
            let actual = now_mono - self.pulse_started_at.unwrap_or(now_mono);
            events.push(Self::stop_event(now_wall, self.direction, planned, actual));

            if self.direction == Direction::Open {
                if let (Some(pre), Some(now_boiler)) = (self.pre_open_boiler_temp, sensors.boiler_temp) {
                    let drop = pre - now_boiler;
                    if drop > self.config.boiler_max_drop_deg_c {
                        self.boiler_block_until_recovered_to =
                            Some(pre - self.config.boiler_max_drop_deg_c * (1.0 - self.config.boiler_recover_factor));
                    }
                }
            }
            self.direction = Direction::None;
            self.pulse_ends_at = None;
            self.pulse_started_at = None;
            self.next_decision_at = Some(now_mono + self.config.adjust_interval_s);
            return Ok(ModuleTickResult::new(Self::idle()).with_events(events));
        }

        if let Some(next) = self.next_decision_at {
            if now_mono < next {
                return Ok(ModuleTickResult::new(Self::idle()));
            }
            self.next_decision_at = None;
        }

        let Some(rad) = sensors.radiator_temp else {
            return Ok(ModuleTickResult::new(PartialOutputs::default()));
        };

        let err = self.config.target_temp - rad;
        if err.abs() <= self.config.ok_band {
            return Ok(ModuleTickResult::new(Self::idle()));
        }

        let ramp_mode = err.abs() > self.config.ramp_error_factor * self.config.ok_band;
        let excess = err.abs() - self.config.ok_band;
        let pulse_s = (excess * self.config.pulse_gain_s_per_degree)
            .clamp(self.config.min_pulse_s, self.config.max_pulse_s);
        let want_open = err > 0.0;

        if want_open && ramp_mode {
            if let Some(boiler_temp) = sensors.boiler_temp {
                if boiler_temp < self.config.boiler_min_temp_for_open {
                    return Ok(ModuleTickResult::new(PartialOutputs::default()));
                }
                if let Some(recover_to) = self.boiler_block_until_recovered_to {
                    if boiler_temp < recover_to {
                        return Ok(ModuleTickResult::new(PartialOutputs::default()));
                    }
                    self.boiler_block_until_recovered_to = None;
                }
                self.pre_open_boiler_temp = Some(boiler_temp);
            }
        }

        self.direction = if want_open { Direction::Open } else { Direction::Close };
        self.pulse_started_at = Some(now_mono);
        self.pulse_ends_at = Some(now_mono + pulse_s);
        events.push(Self::start_event(now_wall, self.direction, pulse_s));

        Ok(ModuleTickResult::new(Self::outputs_for(self.direction)).with_events(events))
    }

    fn get_config_schema(&self) -> Value {
        json!({
            "target_temp": { "type": "float", "unit": "C", "default": 40.0 },
            "ok_band": { "type": "float", "unit": "C", "default": 2.0 },
            "ramp_error_factor": { "type": "float", "default": 2.0 },
            "min_pulse_s": { "type": "float", "unit": "s", "default": 1.0 },
            "max_pulse_s": { "type": "float", "unit": "s", "default": 10.0 },
            "pulse_gain_s_per_degree": { "type": "float", "default": 1.0 },
            "adjust_interval_s": { "type": "float", "unit": "s", "default": 5.0 },
            "boiler_min_temp_for_open": { "type": "float", "unit": "C", "default": 45.0 },
            "boiler_max_drop_deg_c": { "type": "float", "unit": "C", "default": 5.0 },
            "boiler_recover_factor": { "type": "float", "default": 0.5 },
            "preclose_on_ignition_enabled": { "type": "bool", "default": true },
            "preclose_full_close_time_s": { "type": "float", "unit": "s", "default": 60.0 },
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

    fn work_state(ts_mono: f64) -> SystemState {
        let mut s = SystemState::default();
        s.mode = BoilerMode::Work;
        s.ts_mono = ts_mono;
        s
    }

    fn sensors(rad: f64, boiler: f64) -> Sensors {
        Sensors {
            radiator_temp: Some(rad),
            boiler_temp: Some(boiler),
            ..Sensors::default()
        }
    }

    #[test]
    fn within_ok_band_stays_idle() {
        let dir = tempdir().unwrap();
        let mut m = MixerModule::new(dir.path().to_path_buf());
        m.last_mode = Some(BoilerMode::Work);
        let r = m.tick(0.0, &sensors(40.5, 60.0), &work_state(0.0)).unwrap();
        assert_eq!(r.partial_outputs.mixer_open_on, Some(false));
        assert_eq!(r.partial_outputs.mixer_close_on, Some(false));
    }

    #[test]
    fn cold_radiator_opens_valve_when_boiler_hot_enough() {
        let dir = tempdir().unwrap();
        let mut m = MixerModule::new(dir.path().to_path_buf());
        m.last_mode = Some(BoilerMode::Work);
        let r = m.tick(0.0, &sensors(30.0, 60.0), &work_state(0.0)).unwrap();
        assert_eq!(r.partial_outputs.mixer_open_on, Some(true));
        assert_eq!(r.events[0].event_type, "MIXER_OPEN_START");
    }

    #[test]
    fn open_blocked_when_boiler_too_cold() {
        let dir = tempdir().unwrap();
        let mut m = MixerModule::new(dir.path().to_path_buf());
        m.last_mode = Some(BoilerMode::Work);
        let r = m.tick(0.0, &sensors(20.0, 30.0), &work_state(0.0)).unwrap();
        assert_eq!(r.partial_outputs, PartialOutputs::default());
    }

    #[test]
    fn off_mode_clears_both_directions() {
        let dir = tempdir().unwrap();
        let mut m = MixerModule::new(dir.path().to_path_buf());
        let mut s = SystemState::default();
        s.mode = BoilerMode::Off;
        let r = m.tick(0.0, &sensors(20.0, 60.0), &s).unwrap();
        assert_eq!(r.partial_outputs.mixer_open_on, Some(false));
        assert_eq!(r.partial_outputs.mixer_close_on, Some(false));
    }
}
