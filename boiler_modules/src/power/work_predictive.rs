//! WORK power law: a PI baseline blended with a correction term from an
//! online RLS-identified ARX model of the boiler's thermal response.
//! The blend weight ramps up only while the model's recent prediction
//! error stays low, and ramps back down the moment it doesn't.

use super::PowerLaw;
use boiler_core::{ModuleError, Sensors, SystemState};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkPredictiveConfig {
    pub setpoint: f64,
    pub pi_kp: f64,
    pub pi_ki: f64,
    pub pi_integral_window_s: f64,
    pub min_power: f64,
    pub max_power: f64,
    pub max_slew_rate_percent_per_min: f64,

    pub model_delay_ticks: usize,
    pub forgetting_factor: f64,
    pub initial_covariance: f64,
    pub param_a_min: f64,
    pub param_a_max: f64,
    pub param_b_min: f64,
    pub param_b_max: f64,

    pub horizon_steps: usize,
    pub rmse_tau_s: f64,
    pub rmse_trust_threshold: f64,
    pub rmse_distrust_threshold: f64,
    pub max_alpha: f64,
    pub alpha_ramp_rate_per_s: f64,
    pub min_samples_before_trust: usize,
}

impl Default for WorkPredictiveConfig {
    fn default() -> Self {
        Self {
            setpoint: 56.0,
            pi_kp: 6.0,
            pi_ki: 0.02,
            pi_integral_window_s: 900.0,
            min_power: 15.0,
            max_power: 100.0,
            max_slew_rate_percent_per_min: 10.0,
            model_delay_ticks: 3,
            forgetting_factor: 0.98,
            initial_covariance: 1_000.0,
            param_a_min: -2.0,
            param_a_max: 2.0,
            param_b_min: -5.0,
            param_b_max: 5.0,
            horizon_steps: 5,
            rmse_tau_s: 600.0,
            rmse_trust_threshold: 1.5,
            rmse_distrust_threshold: 4.0,
            max_alpha: 0.6,
            alpha_ramp_rate_per_s: 0.02,
            min_samples_before_trust: 30,
        }
    }
}

/// theta = [a, b, c] for y[k] = a*y[k-1] + b*u[k-delay] + c
#[derive(Debug, Clone, Copy)]
struct ArxModel {
    theta: [f64; 3],
    cov: [[f64; 3]; 3],
}

impl ArxModel {
    fn new(initial_covariance: f64) -> Self {
        let mut cov = [[0.0; 3]; 3];
        for i in 0..3 {
            cov[i][i] = initial_covariance;
        }
        Self {
            theta: [1.0, 0.0, 0.0],
            cov,
        }
    }

    fn predict(&self, y_prev: f64, u_delayed: f64) -> f64 {
        self.theta[0] * y_prev + self.theta[1] * u_delayed + self.theta[2]
    }

    fn update(&mut self, cfg: &WorkPredictiveConfig, y: f64, y_prev: f64, u_delayed: f64) -> f64 {
        let phi = [y_prev, u_delayed, 1.0];
        let y_pred = self.predict(y_prev, u_delayed);
        let error = y - y_pred;

        let mut p_phi = [0.0; 3];
        for i in 0..3 {
            p_phi[i] = (0..3).map(|j| self.cov[i][j] * phi[j]).sum();
        }
        let denom = cfg.forgetting_factor + (0..3).map(|i| phi[i] * p_phi[i]).sum::<f64>();
        if denom.abs() < 1e-12 || !denom.is_finite() {
            *self = ArxModel::new(cfg.initial_covariance);
            return error;
        }
        let gain: [f64; 3] = std::array::from_fn(|i| p_phi[i] / denom);

        for i in 0..3 {
            self.theta[i] += gain[i] * error;
        }
        self.theta[0] = self.theta[0].clamp(cfg.param_a_min, cfg.param_a_max);
        self.theta[1] = self.theta[1].clamp(cfg.param_b_min, cfg.param_b_max);

        let mut new_cov = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                new_cov[i][j] = (self.cov[i][j] - gain[i] * p_phi[j]) / cfg.forgetting_factor;
            }
        }
        self.cov = new_cov;

        if self.theta.iter().any(|v| !v.is_finite()) || self.cov.iter().flatten().any(|v| !v.is_finite()) {
            *self = ArxModel::new(cfg.initial_covariance);
        }

        error
    }

    fn simulate(&self, y0: f64, u_constant: f64, steps: usize) -> f64 {
        let mut y = y0;
        for _ in 0..steps {
            y = self.predict(y, u_constant);
        }
        y
    }
}

pub struct WorkPredictiveLaw {
    config: WorkPredictiveConfig,
    model: ArxModel,
    u_history: VecDeque<f64>,
    last_boiler_temp: Option<f64>,
    integral: f64,
    rmse_ewma: f64,
    alpha: f64,
    samples_seen: usize,
}

impl WorkPredictiveLaw {
    pub fn new(config: WorkPredictiveConfig) -> Self {
        let model = ArxModel::new(config.initial_covariance);
        Self {
            config,
            model,
            u_history: VecDeque::new(),
            last_boiler_temp: None,
            integral: 0.0,
            rmse_ewma: 0.0,
            alpha: 0.0,
            samples_seen: 0,
        }
    }

    fn pi_power(&mut self, dt: f64, boiler_temp: f64) -> f64 {
        let error = self.config.setpoint - boiler_temp;
        let decay = (1.0 - dt / self.config.pi_integral_window_s.max(1e-6)).clamp(0.0, 1.0);
        self.integral = decay * self.integral + error * dt;
        self.config.pi_kp * error + self.config.pi_ki * self.integral
    }

    fn delayed_u(&self) -> f64 {
        let delay = self.config.model_delay_ticks;
        if self.u_history.len() > delay {
            self.u_history[self.u_history.len() - 1 - delay]
        } else {
            *self.u_history.front().unwrap_or(&0.0)
        }
    }

    fn model_correction(&self, u_pi: f64, y0: f64) -> f64 {
        let predicted = self.model.simulate(y0, u_pi, self.config.horizon_steps);
        let predicted_error = self.config.setpoint - predicted;
        let gain = self.model.theta[1];
        if gain.abs() < 0.05 {
            return 0.0;
        }
        predicted_error / gain
    }

    fn update_alpha(&mut self, dt: f64) {
        let trusted = self.samples_seen >= self.config.min_samples_before_trust;
        let target = if !trusted {
            0.0
        } else if self.rmse_ewma <= self.config.rmse_trust_threshold {
            self.config.max_alpha
        } else if self.rmse_ewma >= self.config.rmse_distrust_threshold {
            0.0
        } else {
            let span = self.config.rmse_distrust_threshold - self.config.rmse_trust_threshold;
            let frac = (self.rmse_ewma - self.config.rmse_trust_threshold) / span.max(1e-9);
            self.config.max_alpha * (1.0 - frac)
        };
        let max_step = self.config.alpha_ramp_rate_per_s * dt.max(0.0);
        self.alpha += (target - self.alpha).clamp(-max_step, max_step);
    }
}

impl PowerLaw for WorkPredictiveLaw {
    fn raw_power(&mut self, _now_wall: f64, dt: f64, sensors: &Sensors, system_state: &SystemState) -> f64 {
        let Some(boiler_temp) = sensors.boiler_temp else {
            return system_state.outputs.power_percent;
        };

        let u_pi = self.pi_power(dt, boiler_temp);

        if let Some(y_prev) = self.last_boiler_temp {
            if dt > 0.0 {
                let u_delayed = self.delayed_u();
                let error = self.model.update(&self.config, boiler_temp, y_prev, u_delayed);
                self.samples_seen += 1;
                let alpha_tau = self.config.rmse_tau_s / dt.max(1e-6);
                let decay = (alpha_tau / (alpha_tau + 1.0)).clamp(0.0, 1.0);
                self.rmse_ewma = (decay * self.rmse_ewma.powi(2) + (1.0 - decay) * error.powi(2)).sqrt();
            }
        }
        self.last_boiler_temp = Some(boiler_temp);
        self.update_alpha(dt);

        let correction = self.model_correction(u_pi, boiler_temp);
        let power = u_pi + self.alpha * correction;

        self.u_history.push_back(power.clamp(self.config.min_power, self.config.max_power));
        let keep = self.config.model_delay_ticks + 2;
        while self.u_history.len() > keep {
            self.u_history.pop_front();
        }

        power
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
        self.integral = if self.config.pi_ki.abs() > f64::EPSILON {
            (prior_power - self.config.pi_kp * error) / self.config.pi_ki
        } else {
            0.0
        };
        self.alpha = 0.0;
    }

    fn get_config_schema(&self) -> Value {
        json!({
            "setpoint": { "type": "float", "unit": "C", "default": 56.0 },
            "pi_kp": { "type": "float", "default": 6.0 },
            "pi_ki": { "type": "float", "default": 0.02 },
            "horizon_steps": { "type": "int", "default": 5 },
            "max_alpha": { "type": "float", "default": 0.6 },
            "rmse_trust_threshold": { "type": "float", "unit": "C", "default": 1.5 },
            "rmse_distrust_threshold": { "type": "float", "unit": "C", "default": 4.0 },
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
    fn cold_boiler_gets_positive_power_from_pi_term_alone() {
        let mut law = WorkPredictiveLaw::new(WorkPredictiveConfig::default());
        let state = SystemState::default();
        let p = law.raw_power(0.0, 1.0, &sensors(40.0), &state);
        assert!(p > 0.0);
    }

    #[test]
    fn alpha_stays_zero_until_enough_samples_seen() {
        let mut law = WorkPredictiveLaw::new(WorkPredictiveConfig::default());
        let mut state = SystemState::default();
        for i in 0..5 {
            state.ts_mono = i as f64;
            let _ = law.raw_power(0.0, 1.0, &sensors(40.0 + i as f64 * 0.1), &state);
        }
        assert_eq!(law.alpha, 0.0);
    }

    #[test]
    fn missing_sensor_holds_prior_power() {
        let mut law = WorkPredictiveLaw::new(WorkPredictiveConfig::default());
        let mut state = SystemState::default();
        state.outputs.power_percent = 42.0;
        let p = law.raw_power(0.0, 1.0, &Sensors::default(), &state);
        assert_eq!(p, 42.0);
    }

    #[test]
    fn model_reinitializes_cleanly_after_many_updates() {
        let mut law = WorkPredictiveLaw::new(WorkPredictiveConfig::default());
        let mut state = SystemState::default();
        for i in 0..50 {
            state.ts_mono = i as f64;
            let t = 40.0 + (i as f64 * 0.2).sin() * 5.0;
            let _ = law.raw_power(0.0, 1.0, &sensors(t), &state);
        }
        assert!(law.model.theta.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn bumpless_entry_resets_alpha_and_integral() {
        let mut law = WorkPredictiveLaw::new(WorkPredictiveConfig::default());
        law.alpha = 0.4;
        law.on_mode_entered(70.0, &sensors(56.0));
        assert_eq!(law.alpha, 0.0);
    }
}
