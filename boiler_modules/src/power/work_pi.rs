//! WORK power law: classical leaky-integrator PI with bumpless transfer
//! from IGNITION and a resumable on-disk state file.

use super::PowerLaw;
use boiler_common::config::{load_yaml_opt, save_yaml_atomic, state_is_fresh, state_temp_matches};
use boiler_core::{ModuleError, Sensors, SystemState};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkPiConfig {
    pub setpoint: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub overtemp_start: f64,
    pub overtemp_kp: f64,
    pub integral_window_s: f64,
    pub min_power: f64,
    pub max_power: f64,
    pub max_slew_rate_percent_per_min: f64,
    pub state_dir: PathBuf,
    pub state_file: String,
    pub state_save_interval_s: f64,
    pub state_max_age_s: f64,
    pub state_max_temp_delta_c: f64,
}

impl Default for WorkPiConfig {
    fn default() -> Self {
        Self {
            setpoint: 56.0,
            kp: 6.0,
            ki: 0.02,
            kd: 0.0,
            overtemp_start: 3.0,
            overtemp_kp: 10.0,
            integral_window_s: 900.0,
            min_power: 15.0,
            max_power: 100.0,
            max_slew_rate_percent_per_min: 10.0,
            state_dir: PathBuf::from("data"),
            state_file: "power_work_pi_state.yaml".to_string(),
            state_save_interval_s: 30.0,
            state_max_age_s: 900.0,
            state_max_temp_delta_c: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PiState {
    integral: f64,
    last_error: f64,
    power_percent: f64,
    ts_wall: f64,
    boiler_temp: f64,
}

fn state_path(config: &WorkPiConfig) -> PathBuf {
    config.state_dir.join(&config.state_file)
}

pub struct WorkPiLaw {
    config: WorkPiConfig,
    integral: f64,
    last_error: Option<f64>,
    last_output: f64,
    last_save_wall: Option<f64>,
    pending_restore: Option<PiState>,
}

impl WorkPiLaw {
    pub fn new(config: WorkPiConfig) -> Self {
        let pending = load_yaml_opt::<PiState>(&state_path(&config)).ok().flatten();
        Self {
            config,
            integral: 0.0,
            last_error: None,
            last_output: 0.0,
            last_save_wall: None,
            pending_restore: pending,
        }
    }

    fn maybe_restore(&mut self, now_wall: f64, boiler_temp: f64) {
        if let Some(pending) = self.pending_restore.take() {
            let fresh = state_is_fresh(pending.ts_wall, now_wall, self.config.state_max_age_s);
            let temp_ok = state_temp_matches(pending.boiler_temp, boiler_temp, self.config.state_max_temp_delta_c);
            if fresh && temp_ok {
                self.integral = pending.integral;
                self.last_error = Some(pending.last_error);
                self.last_output = pending.power_percent;
            }
        }
    }

    fn persist_if_due(&mut self, now_wall: f64, error: f64, boiler_temp: f64) {
        let due = self.last_save_wall.is_none_or(|t| now_wall - t >= self.config.state_save_interval_s);
        if !due {
            return;
        }
        let state = PiState {
            integral: self.integral,
            last_error: error,
            power_percent: self.last_output,
            ts_wall: now_wall,
            boiler_temp,
        };
        if save_yaml_atomic(&state_path(&self.config), &state).is_ok() {
            self.last_save_wall = Some(now_wall);
        }
    }
}

impl PowerLaw for WorkPiLaw {
    fn raw_power(&mut self, now_wall: f64, dt: f64, sensors: &Sensors, _system_state: &SystemState) -> f64 {
        let Some(boiler_temp) = sensors.boiler_temp else {
            return self.last_output;
        };
        self.maybe_restore(now_wall, boiler_temp);

        let error = self.config.setpoint - boiler_temp;
        let decay = (1.0 - dt / self.config.integral_window_s.max(1e-6)).clamp(0.0, 1.0);
        self.integral = decay * self.integral + error * dt;
        let derivative = if dt > 0.0 {
            (error - self.last_error.unwrap_or(error)) / dt
        } else {
            0.0
        };

        let mut u = self.config.kp * error + self.config.ki * self.integral + self.config.kd * derivative;
        let overtemp_threshold = self.config.setpoint + self.config.overtemp_start;
        if boiler_temp > overtemp_threshold {
            u -= self.config.overtemp_kp * (boiler_temp - overtemp_threshold);
        }

        self.last_error = Some(error);
        self.last_output = u;
        self.persist_if_due(now_wall, error, boiler_temp);
        u
    }

    fn min_power(&self) -> f64 {
        self.config.min_power
    }

    fn max_power(&self) -> f64 {
        self.config.max_power
    }

    fn max_slew_rate_percent_per_min(&self) -> f64 {
        self.config.max_slew_rate_percent_per_min
    }

    fn on_mode_entered(&mut self, prior_power: f64, sensors: &Sensors) {
        let boiler_temp = sensors.boiler_temp.unwrap_or(self.config.setpoint);
        let error = self.config.setpoint - boiler_temp;
        self.integral = if self.config.ki.abs() > f64::EPSILON {
            (prior_power - self.config.kp * error) / self.config.ki
        } else {
            0.0
        };
        self.last_error = Some(error);
        self.last_output = prior_power;
    }

    fn get_config_schema(&self) -> Value {
        json!({
            "setpoint": { "type": "float", "unit": "C", "default": 56.0 },
            "kp": { "type": "float", "default": 6.0 },
            "ki": { "type": "float", "default": 0.02 },
            "kd": { "type": "float", "default": 0.0 },
            "overtemp_start": { "type": "float", "unit": "C", "default": 3.0 },
            "overtemp_kp": { "type": "float", "default": 10.0 },
            "integral_window_s": { "type": "float", "unit": "s", "default": 900.0 },
            "min_power": { "type": "float", "unit": "%", "default": 15.0 },
            "max_power": { "type": "float", "unit": "%", "default": 100.0 },
            "max_slew_rate_percent_per_min": { "type": "float", "default": 10.0 },
        })
    }

    fn get_config_values(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or(Value::Null)
    }

    fn set_config_values(&mut self, values: &Value) -> Result<(), ModuleError> {
        let old_ki = self.config.ki;
        self.config = crate::config_support::merge_and_reparse(&self.config, values)?;
        if self.config.ki != old_ki && self.config.ki.abs() > f64::EPSILON {
            self.integral *= old_ki / self.config.ki;
        }
        Ok(())
    }

    fn reload_config_from_file(&mut self) -> Result<(), ModuleError> {
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
    fn proportional_response_pushes_power_up_when_cold() {
        let dir = tempdir().unwrap();
        let mut cfg = WorkPiConfig::default();
        cfg.state_dir = dir.path().to_path_buf();
        let mut law = WorkPiLaw::new(cfg);
        let state = SystemState::default();
        let p = law.raw_power(0.0, 1.0, &sensors(40.0), &state);
        assert!(p > 0.0);
    }

    #[test]
    fn overtemp_penalty_reduces_power() {
        let dir = tempdir().unwrap();
        let mut cfg = WorkPiConfig::default();
        cfg.state_dir = dir.path().to_path_buf();
        cfg.ki = 0.0;
        let mut law = WorkPiLaw::new(cfg.clone());
        let state = SystemState::default();
        let normal = law.raw_power(0.0, 1.0, &sensors(cfg.setpoint), &state);
        let mut law2 = WorkPiLaw::new(cfg.clone());
        let hot = law2.raw_power(0.0, 1.0, &sensors(cfg.setpoint + 10.0), &state);
        assert!(hot < normal);
    }

    #[test]
    fn bumpless_transfer_reconstructs_integral_to_match_prior_power() {
        let dir = tempdir().unwrap();
        let mut cfg = WorkPiConfig::default();
        cfg.state_dir = dir.path().to_path_buf();
        let mut law = WorkPiLaw::new(cfg.clone());
        law.on_mode_entered(80.0, &sensors(cfg.setpoint));
        let expected_u = cfg.kp * 0.0 + cfg.ki * law.integral;
        assert!((expected_u - 80.0).abs() < 1e-6);
    }

    #[test]
    fn state_persists_and_restores_across_instances() {
        let dir = tempdir().unwrap();
        let mut cfg = WorkPiConfig::default();
        cfg.state_dir = dir.path().to_path_buf();
        cfg.state_save_interval_s = 0.0;
        let mut law = WorkPiLaw::new(cfg.clone());
        let state = SystemState::default();
        let _ = law.raw_power(1_000.0, 1.0, &sensors(40.0), &state);
        assert!(state_path(&cfg).exists());

        let law2 = WorkPiLaw::new(cfg);
        assert!(law2.pending_restore.is_some());
    }
}
