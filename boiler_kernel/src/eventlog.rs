//! Daily CSV event log writer.
//!
//! Registered as an auxiliary module. `AuxRunner` overwrites the
//! snapshot's `recent_events` with exactly the events published since
//! the previous auxiliary tick (see `aux_runner::AuxRunner::tick`), so
//! this module only ever has to append what it's handed — no cursor of
//! its own to track.

use boiler_core::{ModuleError, ModuleInterface, ModuleTickResult, PartialOutputs, Sensors, SystemState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventLogConfig {
    pub log_dir: PathBuf,
    pub file_prefix: String,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("data"),
            file_prefix: "events".to_string(),
        }
    }
}

pub struct EventLogModule {
    config_dir: PathBuf,
    config: EventLogConfig,
}

impl EventLogModule {
    pub const ID: &'static str = "eventlog";

    pub fn new(config_dir: PathBuf) -> Self {
        let config = boiler_modules::config_support::load_or_default(&config_dir, Self::ID);
        Self { config_dir, config }
    }
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(0, 0).expect("unix epoch is always a representable timestamp")
}

fn file_path(config: &EventLogConfig, now_wall: f64) -> PathBuf {
    let dt = DateTime::<Utc>::from_timestamp(now_wall as i64, 0).unwrap_or_else(unix_epoch);
    config
        .log_dir
        .join(format!("{}_{}.csv", config.file_prefix, dt.format("%Y%m%d")))
}

const HEADER: [&str; 7] = [
    "data_czas",
    "ts_epoch",
    "level",
    "source",
    "type",
    "message",
    "data_json",
];

fn append_events(path: &Path, events: &[boiler_core::Event]) -> Result<(), csv::Error> {
    if events.is_empty() {
        return Ok(());
    }
    let is_new = !path.exists();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .from_writer(file);

    if is_new {
        writer.write_record(HEADER)?;
    }

    for event in events {
        let ts = DateTime::<Utc>::from_timestamp(event.ts_wall as i64, 0).unwrap_or_else(unix_epoch);
        let level = match event.level {
            boiler_core::EventLevel::Info => "INFO",
            boiler_core::EventLevel::Warning => "WARNING",
            boiler_core::EventLevel::Error => "ERROR",
            boiler_core::EventLevel::Alarm => "ALARM",
        };
        writer.write_record([
            ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            format!("{:.3}", event.ts_wall),
            level.to_string(),
            event.source.clone(),
            event.event_type.clone(),
            event.message.clone(),
            serde_json::to_string(&event.data).unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

impl ModuleInterface for EventLogModule {
    fn id(&self) -> &str {
        Self::ID
    }

    fn tick(
        &mut self,
        now_wall: f64,
        _sensors: &Sensors,
        system_state: &SystemState,
    ) -> Result<ModuleTickResult, ModuleError> {
        let events: Vec<_> = system_state.recent_events.iter().cloned().collect();
        append_events(&file_path(&self.config, now_wall), &events)
            .map_err(|e| ModuleError::Tick(format!("eventlog write failed: {e}")))?;
        Ok(ModuleTickResult::new(PartialOutputs::default()))
    }

    fn get_config_schema(&self) -> Value {
        json!({
            "file_prefix": { "type": "string", "default": "events" },
        })
    }

    fn get_config_values(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or(Value::Null)
    }

    fn set_config_values(&mut self, values: &Value, persist_to_disk: bool) -> Result<(), ModuleError> {
        self.config = boiler_modules::config_support::merge_and_reparse(&self.config, values)?;
        if persist_to_disk {
            boiler_modules::config_support::persist(&self.config_dir, Self::ID, &self.config)?;
        }
        Ok(())
    }

    fn reload_config_from_file(&mut self) -> Result<(), ModuleError> {
        if let Some(loaded) = boiler_modules::config_support::reload(&self.config_dir, Self::ID)? {
            self.config = loaded;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boiler_core::{Event, EventLevel};
    use tempfile::tempdir;

    #[test]
    fn writes_header_then_one_row_per_event() {
        let dir = tempdir().unwrap();
        let mut m = EventLogModule::new(dir.path().to_path_buf());
        m.config.log_dir = dir.path().to_path_buf();
        let mut state = SystemState::default();
        state.push_recent_event(Event::new(100.0, "feeder", EventLevel::Info, "FEEDER_ON", "on"));
        state.push_recent_event(Event::new(100.0, "blower", EventLevel::Warning, "FLUE_HIGH", "hot"));

        let _ = m.tick(100.0, &Sensors::default(), &state).unwrap();
        let contents = std::fs::read_to_string(file_path(&m.config, 100.0)).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.lines().next().unwrap().starts_with("data_czas;ts_epoch;level"));
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let dir = tempdir().unwrap();
        let mut m = EventLogModule::new(dir.path().to_path_buf());
        m.config.log_dir = dir.path().to_path_buf();
        let state = SystemState::default();
        let _ = m.tick(0.0, &Sensors::default(), &state).unwrap();
        assert!(!file_path(&m.config, 0.0).exists());
    }
}
