//! IGNITION power law: hybrid of a ΔT proportional law and a
//! heating-rate booster, whichever calls for more power wins.

use super::PowerLaw;
use boiler_core::{ModuleError, Sensors, SystemState};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IgnitionConfig {
    pub setpoint: f64,
    pub full_delta: f64,
    pub min_delta: f64,
    pub min_power: f64,
    pub max_power: f64,
    pub rate_tau_s: f64,
    pub rate_target_per_s: f64,
    pub rate_band_per_s: f64,
    pub max_slew_rate_percent_per_min: f64,
}

impl Default for IgnitionConfig {
    fn default() -> Self {
        Self {
            setpoint: 70.0,
            full_delta: 20.0,
            min_delta: 2.0,
            min_power: 60.0,
            max_power: 100.0,
            rate_tau_s: 30.0,
            rate_target_per_s: 0.5 / 60.0,
            rate_band_per_s: 0.2 / 60.0,
            max_slew_rate_percent_per_min: 5.0,
        }
    }
}

pub struct IgnitionLaw {
    config: IgnitionConfig,
    last_boiler_temp: Option<f64>,
    rate_ema_per_s: f64,
}

impl IgnitionLaw {
    pub fn new(config: IgnitionConfig) -> Self {
        Self {
            config,
            last_boiler_temp: None,
            rate_ema_per_s: 0.0,
        }
    }

    fn delta_law(&self, boiler_temp: Option<f64>) -> f64 {
        let Some(t) = boiler_temp else {
            return self.config.max_power;
        };
        let delta = self.config.setpoint - t;
        if delta >= self.config.full_delta {
            self.config.max_power
        } else if delta <= self.config.min_delta {
            self.config.min_power
        } else {
            let frac = (delta - self.config.min_delta) / (self.config.full_delta - self.config.min_delta);
            self.config.min_power + frac * (self.config.max_power - self.config.min_power)
        }
    }

    fn rate_law(&self) -> f64 {
        let rate = self.rate_ema_per_s;
        let lo = self.config.rate_target_per_s - self.config.rate_band_per_s;
        let hi = self.config.rate_target_per_s + self.config.rate_band_per_s;
        if rate <= lo {
            self.config.max_power
        } else if rate >= hi {
            self.config.min_power
        } else {
            let frac = (rate - lo) / (hi - lo);
            self.config.max_power - frac * (self.config.max_power - self.config.min_power)
        }
    }
}

impl PowerLaw for IgnitionLaw {
    fn raw_power(&mut self, _now_wall: f64, dt: f64, sensors: &Sensors, _system_state: &SystemState) -> f64 {
        if let (Some(t), Some(prev)) = (sensors.boiler_temp, self.last_boiler_temp) {
            if dt > 0.0 {
                let alpha = dt / (self.config.rate_tau_s + dt);
                let instant_rate = (t - prev) / dt;
                self.rate_ema_per_s += alpha * (instant_rate - self.rate_ema_per_s);
            }
        }
        self.last_boiler_temp = sensors.boiler_temp;

        self.delta_law(sensors.boiler_temp).max(self.rate_law())
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

    fn skip_slew_on_entry(&self) -> bool {
        true
    }

    fn get_config_schema(&self) -> Value {
        json!({
            "setpoint": { "type": "float", "unit": "C", "default": 70.0 },
            "full_delta": { "type": "float", "unit": "C", "default": 20.0 },
            "min_delta": { "type": "float", "unit": "C", "default": 2.0 },
            "min_power": { "type": "float", "unit": "%", "default": 60.0 },
            "max_power": { "type": "float", "unit": "%", "default": 100.0 },
            "rate_tau_s": { "type": "float", "unit": "s", "default": 30.0 },
            "max_slew_rate_percent_per_min": { "type": "float", "default": 5.0 },
        })
    }

    fn get_config_values(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or(Value::Null)
    }

    fn set_config_values(&mut self, values: &Value) -> Result<(), ModuleError> {
        self.config = crate::config_support::merge_and_reparse(&self.config, values)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensors(temp: f64) -> Sensors {
        Sensors {
            boiler_temp: Some(temp),
            ..Sensors::default()
        }
    }

    #[test]
    fn far_below_setpoint_demands_max_power() {
        let mut law = IgnitionLaw::new(IgnitionConfig::default());
        let state = SystemState::default();
        let p = law.raw_power(0.0, 0.0, &sensors(30.0), &state);
        assert_eq!(p, 100.0);
    }

    #[test]
    fn near_setpoint_demands_min_power() {
        let mut law = IgnitionLaw::new(IgnitionConfig::default());
        let state = SystemState::default();
        let p = law.raw_power(0.0, 0.0, &sensors(69.0), &state);
        assert_eq!(p, 60.0);
    }

    #[test]
    fn missing_sensor_returns_max_power() {
        let mut law = IgnitionLaw::new(IgnitionConfig::default());
        let state = SystemState::default();
        let p = law.raw_power(0.0, 0.0, &Sensors::default(), &state);
        assert_eq!(p, 100.0);
    }
}
