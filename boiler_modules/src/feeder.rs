//! Auger feed duty-cycle, timed on the monotonic clock.
//!
//! The original reference timed this off the wall clock; that is unsafe
//! under this system's clock-discipline invariant (an NTP step must
//! never perturb a control timer), so this port uses `ts_mono`.

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
pub struct FeederConfig {
    pub feed_on_base_s: f64,
    pub feed_off_base_s: f64,
    pub min_pause_s: f64,
    pub max_pause_s: f64,
    pub min_power_to_feed: f64,
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            feed_on_base_s: 8.0,
            feed_off_base_s: 30.0,
            min_pause_s: 5.0,
            max_pause_s: 120.0,
            min_power_to_feed: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Off,
    On,
}

pub struct FeederModule {
    config_dir: PathBuf,
    config: FeederConfig,
    phase: Phase,
    phase_started_at: Option<f64>,
}

impl FeederModule {
    pub const ID: &'static str = "feeder";

    pub fn new(config_dir: PathBuf) -> Self {
        let config = load_or_default(&config_dir, Self::ID);
        Self {
            config_dir,
            config,
            phase: Phase::Off,
            phase_started_at: None,
        }
    }

    fn off_time(&self, power_percent: f64) -> f64 {
        let p = power_percent.max(1.0);
        (self.config.feed_off_base_s * (100.0 / p))
            .clamp(self.config.min_pause_s, self.config.max_pause_s)
    }
}

impl ModuleInterface for FeederModule {
    fn id(&self) -> &str {
        Self::ID
    }

    fn tick(
        &mut self,
        now_wall: f64,
        _sensors: &Sensors,
        system_state: &SystemState,
    ) -> Result<ModuleTickResult, ModuleError> {
        let now_mono = system_state.ts_mono;
        let power = system_state.outputs.power_percent;
        let eligible = matches!(system_state.mode, BoilerMode::Ignition | BoilerMode::Work)
            && power > self.config.min_power_to_feed;

        let mut events = Vec::new();

        if !eligible {
            if self.phase != Phase::Off || self.phase_started_at.is_some() {
                self.phase = Phase::Off;
                self.phase_started_at = None;
            }
            return Ok(ModuleTickResult::new(PartialOutputs {
                feeder_on: Some(false),
                ..Default::default()
            }));
        }

        if self.phase_started_at.is_none() {
            self.phase = Phase::On;
            self.phase_started_at = Some(now_mono);
            events.push(feeder_event(now_wall, true, self.config.feed_on_base_s));
        } else {
            let elapsed = now_mono - self.phase_started_at.unwrap();
            match self.phase {
                Phase::On => {
                    if elapsed >= self.config.feed_on_base_s {
                        self.phase = Phase::Off;
                        self.phase_started_at = Some(now_mono);
                        events.push(feeder_event(now_wall, false, self.off_time(power)));
                    }
                }
                Phase::Off => {
                    if elapsed >= self.off_time(power) {
                        self.phase = Phase::On;
                        self.phase_started_at = Some(now_mono);
                        events.push(feeder_event(now_wall, true, self.config.feed_on_base_s));
                    }
                }
            }
        }

        Ok(ModuleTickResult::new(PartialOutputs {
            feeder_on: Some(self.phase == Phase::On),
            ..Default::default()
        })
        .with_events(events))
    }

    fn get_config_schema(&self) -> Value {
        json!({
            "feed_on_base_s": { "type": "float", "unit": "s", "default": 8.0 },
            "feed_off_base_s": { "type": "float", "unit": "s", "default": 30.0 },
            "min_pause_s": { "type": "float", "unit": "s", "default": 5.0 },
            "max_pause_s": { "type": "float", "unit": "s", "default": 120.0 },
            "min_power_to_feed": { "type": "float", "unit": "%", "default": 5.0 },
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

fn feeder_event(now_wall: f64, turning_on: bool, duration: f64) -> Event {
    let event_type = if turning_on { "FEEDER_ON" } else { "FEEDER_OFF" };
    Event::new(
        now_wall,
        FeederModule::ID,
        EventLevel::Info,
        event_type,
        format!("duration={duration:.1}s"),
    )
    .with_data(
        json!({ "duration_s": duration })
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
    fn starts_on_immediately_when_eligible() {
        let dir = tempdir().unwrap();
        let mut m = FeederModule::new(dir.path().to_path_buf());
        let r = m.tick(0.0, &Sensors::default(), &work_state(0.0, 50.0)).unwrap();
        assert_eq!(r.partial_outputs.feeder_on, Some(true));
        assert_eq!(r.events[0].event_type, "FEEDER_ON");
    }

    #[test]
    fn switches_off_after_on_time_then_back_on() {
        let dir = tempdir().unwrap();
        let mut m = FeederModule::new(dir.path().to_path_buf());
        let _ = m.tick(0.0, &Sensors::default(), &work_state(0.0, 50.0)).unwrap();
        let r = m.tick(9.0, &Sensors::default(), &work_state(9.0, 50.0)).unwrap();
        assert_eq!(r.partial_outputs.feeder_on, Some(false));
        assert_eq!(r.events[0].event_type, "FEEDER_OFF");
    }

    #[test]
    fn ineligible_when_power_too_low_resets_to_off() {
        let dir = tempdir().unwrap();
        let mut m = FeederModule::new(dir.path().to_path_buf());
        let _ = m.tick(0.0, &Sensors::default(), &work_state(0.0, 50.0)).unwrap();
        let r = m.tick(1.0, &Sensors::default(), &work_state(1.0, 1.0)).unwrap();
        assert_eq!(r.partial_outputs.feeder_on, Some(false));
    }

    #[test]
    fn off_pause_is_clamped_to_max() {
        let dir = tempdir().unwrap();
        let mut m = FeederModule::new(dir.path().to_path_buf());
        assert!(m.off_time(1.0) <= m.config.max_pause_s);
        assert!(m.off_time(1000.0) >= m.config.min_pause_s);
    }
}
