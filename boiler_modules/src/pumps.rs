//! Hysteresis-controlled circulation pump.
//!
//! `pump_co` and `pump_cwu` differ only in which boiler reading they
//! hysteresis on, which `Outputs` field they drive, and their event
//! prefix — so both run through one implementation, `HysteresisPump`,
//! parameterized by `PumpKind`.

use crate::config_support::{load_or_default, merge_and_reparse, persist, reload};
use boiler_core::{
    Event, EventLevel, ModuleError, ModuleInterface, ModuleTickResult, PartialOutputs, Sensors,
    SystemState,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpKind {
    Co,
    Cwu,
}

impl PumpKind {
    fn id(self) -> &'static str {
        match self {
            PumpKind::Co => "pump_co",
            PumpKind::Cwu => "pump_cwu",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PumpConfig {
    pub boiler_on_temp: f64,
    pub hysteresis: f64,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            boiler_on_temp: 60.0,
            hysteresis: 5.0,
        }
    }
}

pub struct HysteresisPump {
    kind: PumpKind,
    config_dir: PathBuf,
    config: PumpConfig,
    on: bool,
}

impl HysteresisPump {
    pub fn new(kind: PumpKind, config_dir: PathBuf) -> Self {
        let config = load_or_default(&config_dir, kind.id());
        Self {
            kind,
            config_dir,
            config,
            on: false,
        }
    }

    fn set_output(&self, on: bool) -> PartialOutputs {
        match self.kind {
            PumpKind::Co => PartialOutputs {
                pump_co_on: Some(on),
                ..Default::default()
            },
            PumpKind::Cwu => PartialOutputs {
                pump_cwu_on: Some(on),
                ..Default::default()
            },
        }
    }
}

impl ModuleInterface for HysteresisPump {
    fn id(&self) -> &str {
        self.kind.id()
    }

    fn tick(
        &mut self,
        now_wall: f64,
        sensors: &Sensors,
        _system_state: &SystemState,
    ) -> Result<ModuleTickResult, ModuleError> {
        let Some(boiler_temp) = sensors.boiler_temp else {
            // No reading: hold the previous state rather than guess.
            return Ok(ModuleTickResult::new(self.set_output(self.on)));
        };

        let new_on = if self.on {
            boiler_temp > self.config.boiler_on_temp - self.config.hysteresis
        } else {
            boiler_temp >= self.config.boiler_on_temp
        };

        let mut events = Vec::new();
        if new_on != self.on {
            let event_type = match (self.kind, new_on) {
                (PumpKind::Co, true) => "PUMP_CO_ON",
                (PumpKind::Co, false) => "PUMP_CO_OFF",
                (PumpKind::Cwu, true) => "PUMP_CWU_ON",
                (PumpKind::Cwu, false) => "PUMP_CWU_OFF",
            };
            events.push(
                Event::new(
                    now_wall,
                    self.kind.id(),
                    EventLevel::Info,
                    event_type,
                    format!("boiler_temp={boiler_temp:.1}"),
                )
                .with_data(
                    json!({
                        "boiler_temp": boiler_temp,
                        "boiler_on_temp": self.config.boiler_on_temp,
                        "hysteresis": self.config.hysteresis,
                    })
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
                ),
            );
        }
        self.on = new_on;

        Ok(ModuleTickResult::new(self.set_output(self.on)).with_events(events))
    }

    fn get_config_schema(&self) -> Value {
        json!({
            "boiler_on_temp": { "type": "float", "unit": "C", "default": 60.0 },
            "hysteresis": { "type": "float", "unit": "C", "default": 5.0 },
        })
    }

    fn get_config_values(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or(Value::Null)
    }

    fn set_config_values(&mut self, values: &Value, persist_to_disk: bool) -> Result<(), ModuleError> {
        self.config = merge_and_reparse(&self.config, values)?;
        if persist_to_disk {
            persist(&self.config_dir, self.kind.id(), &self.config)?;
        }
        Ok(())
    }

    fn reload_config_from_file(&mut self) -> Result<(), ModuleError> {
        if let Some(loaded) = reload(&self.config_dir, self.kind.id())? {
            self.config = loaded;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sensors(temp: f64) -> Sensors {
        Sensors {
            boiler_temp: Some(temp),
            ..Sensors::default()
        }
    }

    #[test]
    fn turns_on_at_threshold_and_off_below_hysteresis_band() {
        let dir = tempdir().unwrap();
        let mut pump = HysteresisPump::new(PumpKind::Co, dir.path().to_path_buf());
        let state = SystemState::default();

        let r1 = pump.tick(0.0, &sensors(59.0), &state).unwrap();
        assert_eq!(r1.partial_outputs.pump_co_on, Some(false));

        let r2 = pump.tick(1.0, &sensors(60.0), &state).unwrap();
        assert_eq!(r2.partial_outputs.pump_co_on, Some(true));
        assert_eq!(r2.events[0].event_type, "PUMP_CO_ON");

        let r3 = pump.tick(2.0, &sensors(57.0), &state).unwrap();
        assert_eq!(r3.partial_outputs.pump_co_on, Some(true), "still within hysteresis band");

        let r4 = pump.tick(3.0, &sensors(54.0), &state).unwrap();
        assert_eq!(r4.partial_outputs.pump_co_on, Some(false));
        assert_eq!(r4.events[0].event_type, "PUMP_CO_OFF");
    }

    #[test]
    fn missing_sensor_holds_previous_state() {
        let dir = tempdir().unwrap();
        let mut pump = HysteresisPump::new(PumpKind::Cwu, dir.path().to_path_buf());
        let state = SystemState::default();
        let r1 = pump.tick(0.0, &sensors(65.0), &state).unwrap();
        assert_eq!(r1.partial_outputs.pump_cwu_on, Some(true));

        let r2 = pump.tick(1.0, &Sensors::default(), &state).unwrap();
        assert_eq!(r2.partial_outputs.pump_cwu_on, Some(true));
        assert!(r2.events.is_empty());
    }

    #[test]
    fn cwu_and_co_use_distinct_event_prefixes() {
        assert_eq!(PumpKind::Co.id(), "pump_co");
        assert_eq!(PumpKind::Cwu.id(), "pump_cwu");
    }
}
