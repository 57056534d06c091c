//! Hourly CSV history sampler.
//!
//! Registered as an auxiliary module. Defines only the trigger point
//! (sample every `sample_interval_s` of monotonic time) and the row
//! shape; rotation is "one file per wall-clock hour", matching the
//! statistics engine's own hourly bucket files.

use boiler_core::{ModuleError, ModuleInterface, ModuleTickResult, PartialOutputs, Sensors, SystemState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    pub log_dir: PathBuf,
    pub sample_interval_s: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("data"),
            sample_interval_s: 10.0,
        }
    }
}

pub struct HistoryModule {
    config_dir: PathBuf,
    config: HistoryConfig,
    last_sample_mono: Option<f64>,
}

impl HistoryModule {
    pub const ID: &'static str = "history";

    pub fn new(config_dir: PathBuf) -> Self {
        let config = boiler_modules::config_support::load_or_default(&config_dir, Self::ID);
        Self {
            config_dir,
            config,
            last_sample_mono: None,
        }
    }
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(0, 0).expect("unix epoch is always a representable timestamp")
}

fn file_path(config: &HistoryConfig, now_wall: f64) -> PathBuf {
    let dt = DateTime::<Utc>::from_timestamp(now_wall as i64, 0).unwrap_or_else(unix_epoch);
    config.log_dir.join(format!("boiler_{}.csv", dt.format("%Y%m%d_%H")))
}

const HEADER: [&str; 6] = [
    "data_czas",
    "temp_pieca",
    "power",
    "temp_grzejnikow",
    "temp_spalin",
    "tryb_pracy",
];

fn mode_label(state: &SystemState) -> &'static str {
    match state.mode {
        boiler_core::BoilerMode::Off => "OFF",
        boiler_core::BoilerMode::Ignition => "IGNITION",
        boiler_core::BoilerMode::Work => "WORK",
        boiler_core::BoilerMode::Manual => "MANUAL",
    }
}

fn append_row(path: &Path, now_wall: f64, state: &SystemState) -> Result<(), csv::Error> {
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

    let ts = DateTime::<Utc>::from_timestamp(now_wall as i64, 0).unwrap_or_else(unix_epoch);
    writer.write_record([
        ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        state.sensors.boiler_temp.map(|v| format!("{v:.1}")).unwrap_or_default(),
        format!("{:.1}", state.outputs.power_percent),
        state.sensors.radiator_temp.map(|v| format!("{v:.1}")).unwrap_or_default(),
        state.sensors.flue_gas_temp.map(|v| format!("{v:.1}")).unwrap_or_default(),
        mode_label(state).to_string(),
    ])?;
    writer.flush()?;
    Ok(())
}

impl ModuleInterface for HistoryModule {
    fn id(&self) -> &str {
        Self::ID
    }

    fn tick(
        &mut self,
        now_wall: f64,
        _sensors: &Sensors,
        system_state: &SystemState,
    ) -> Result<ModuleTickResult, ModuleError> {
        let due = self
            .last_sample_mono
            .is_none_or(|t| system_state.ts_mono - t >= self.config.sample_interval_s);
        if due {
            append_row(&file_path(&self.config, now_wall), now_wall, system_state)
                .map_err(|e| ModuleError::Tick(format!("history write failed: {e}")))?;
            self.last_sample_mono = Some(system_state.ts_mono);
        }
        Ok(ModuleTickResult::new(PartialOutputs::default()))
    }

    fn get_config_schema(&self) -> Value {
        json!({
            "sample_interval_s": { "type": "float", "unit": "s", "default": 10.0 },
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
    use tempfile::tempdir;

    #[test]
    fn first_tick_always_samples_and_writes_header() {
        let dir = tempdir().unwrap();
        let mut m = HistoryModule::new(dir.path().to_path_buf());
        m.config.log_dir = dir.path().to_path_buf();
        let mut state = SystemState::default();
        state.sensors.boiler_temp = Some(55.5);
        let _ = m.tick(0.0, &Sensors::default(), &state).unwrap();
        let path = file_path(&m.config, 0.0);
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.starts_with("data_czas;temp_pieca;power;temp_grzejnikow;temp_spalin;tryb_pracy"));
    }

    #[test]
    fn does_not_resample_before_interval_elapses() {
        let dir = tempdir().unwrap();
        let mut m = HistoryModule::new(dir.path().to_path_buf());
        m.config.log_dir = dir.path().to_path_buf();
        let mut state = SystemState::default();
        state.ts_mono = 0.0;
        let _ = m.tick(0.0, &Sensors::default(), &state).unwrap();
        let path = file_path(&m.config, 0.0);
        let first_len = std::fs::metadata(&path).unwrap().len();

        state.ts_mono = 1.0;
        let _ = m.tick(1.0, &Sensors::default(), &state).unwrap();
        let second_len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(first_len, second_len);
    }
}
