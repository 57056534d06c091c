//! WORK power law: the fuzzy controller plus three online adaptations —
//! rule-weight learning, flue-threshold auto-tune, and a conservative
//! stability governor that backs off aggressiveness when it detects
//! jitter.

use super::work_fuzzy::{centroid, fire_rules, FuzzyConfig};
use super::PowerLaw;
use boiler_core::{ModuleError, Sensors, SystemState};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NeuroFuzzyConfig {
    pub base: FuzzyConfig,

    pub eta: f64,
    pub lambda: f64,
    pub reward_clip: f64,
    pub w_t: f64,
    pub k_dp: f64,
    pub k_ddp: f64,
    pub k_tf: f64,
    pub k_dtf: f64,
    pub learning_delay_s: f64,
    pub w_min: f64,
    pub w_max: f64,

    pub steady_err_tol: f64,
    pub steady_rate_tol: f64,
    pub auto_flue_update_interval_s: f64,
    pub auto_flue_ema_alpha: f64,
    pub auto_flue_window_s: f64,
    pub auto_flue_min_span_c: f64,

    pub stability_window_s: f64,
    pub stability_power_std_threshold: f64,
    pub delta_scale_step: f64,
    pub flue_weight_near_step: f64,
    pub flue_weight_band_step: f64,
    pub delta_scale_min: f64,
    pub flue_weight_near_min: f64,
    pub flue_weight_band_max: f64,
}

impl Default for NeuroFuzzyConfig {
    fn default() -> Self {
        Self {
            base: FuzzyConfig::default(),
            eta: 0.05,
            lambda: 0.01,
            reward_clip: 1.0,
            w_t: 1.0,
            k_dp: 0.02,
            k_ddp: 0.02,
            k_tf: 0.01,
            k_dtf: 0.01,
            learning_delay_s: 120.0,
            w_min: 0.2,
            w_max: 3.0,
            steady_err_tol: 1.0,
            steady_rate_tol: 0.5,
            auto_flue_update_interval_s: 1_800.0,
            auto_flue_ema_alpha: 0.2,
            auto_flue_window_s: 21_600.0,
            auto_flue_min_span_c: 20.0,
            stability_window_s: 1_800.0,
            stability_power_std_threshold: 12.0,
            delta_scale_step: 0.2,
            flue_weight_near_step: 0.1,
            flue_weight_band_step: 0.5,
            delta_scale_min: 1.0,
            flue_weight_near_min: 0.4,
            flue_weight_band_max: 12.0,
        }
    }
}

const RULE_COUNT: usize = 15;

struct PendingSample {
    ts_mono: f64,
    abs_err: f64,
    phi: [f64; RULE_COUNT],
    power_before: f64,
    delta_power_before: f64,
    flue_before: f64,
}

pub struct WorkNeuroFuzzyLaw {
    config: NeuroFuzzyConfig,
    rule_weights: [f64; RULE_COUNT],
    last_boiler_temp: Option<f64>,
    rate_ema_per_min: f64,
    flue_fast: Option<f64>,
    flue_base: Option<f64>,
    pending: VecDeque<PendingSample>,
    last_power: f64,
    last_delta_power: f64,
    flue_samples: VecDeque<(f64, f64)>,
    last_auto_flue_update_mono: Option<f64>,
    power_samples: VecDeque<(f64, f64)>,
}

impl WorkNeuroFuzzyLaw {
    pub fn new(config: NeuroFuzzyConfig) -> Self {
        Self {
            config,
            rule_weights: [1.0; RULE_COUNT],
            last_boiler_temp: None,
            rate_ema_per_min: 0.0,
            flue_fast: None,
            flue_base: None,
            pending: VecDeque::new(),
            last_power: 0.0,
            last_delta_power: 0.0,
            flue_samples: VecDeque::new(),
            last_auto_flue_update_mono: None,
            power_samples: VecDeque::new(),
        }
    }

    fn update_filters(&mut self, dt: f64, boiler_temp: f64, flue_temp: Option<f64>) {
        if let Some(prev) = self.last_boiler_temp {
            if dt > 0.0 {
                let alpha = dt / (self.config.base.rate_ema_tau_s + dt);
                let instant = (boiler_temp - prev) / dt * 60.0;
                self.rate_ema_per_min += alpha * (instant - self.rate_ema_per_min);
            }
        }
        self.last_boiler_temp = Some(boiler_temp);

        if let Some(flue) = flue_temp {
            let tau_fast = (60.0_f64 / 4.0).max(1.0);
            self.flue_fast = Some(match self.flue_fast {
                Some(prev) if dt > 0.0 => prev + (dt / (tau_fast + dt)) * (flue - prev),
                _ => flue,
            });
            self.flue_base = Some(match self.flue_base {
                Some(prev) if dt > 0.0 => prev + (dt / (60.0 + dt)) * (flue - prev),
                _ => flue,
            });
        }
    }

    fn weighted_rules(&self, err: f64, rate: f64, flue: Option<f64>) -> Vec<(super::work_fuzzy::OutputTerm, f64)> {
        let mut rules = fire_rules(&self.config.base, err, rate, flue);
        for (i, (_, strength)) in rules.iter_mut().enumerate() {
            *strength *= self.rule_weights[i];
        }
        rules
    }

    fn normalized_phi(&self, err: f64, rate: f64, flue: Option<f64>) -> [f64; RULE_COUNT] {
        let raw = fire_rules(&self.config.base, err, rate, flue);
        let sum: f64 = raw.iter().map(|(_, s)| s).sum();
        let mut phi = [0.0; RULE_COUNT];
        for (i, (_, s)) in raw.iter().enumerate() {
            phi[i] = if sum > 1e-9 { s / sum } else { 0.0 };
        }
        phi
    }

    fn resolve_due_samples(&mut self, now_mono: f64, abs_err_now: f64, flue_base_now: f64) {
        while let Some(front) = self.pending.front() {
            if now_mono - front.ts_mono < self.config.learning_delay_s {
                break;
            }
            let sample = self.pending.pop_front().unwrap();
            let d_power = self.last_power - sample.power_before;
            let d_dpower = d_power - sample.delta_power_before;
            let flue_excess = (flue_base_now - self.config.base.flue_mid_c).max(0.0);
            let flue_rate = (flue_base_now - sample.flue_before).max(0.0)
                / self.config.learning_delay_s.max(1.0);

            let improvement = (sample.abs_err - abs_err_now) / sample.abs_err.max(0.5);
            let reward = (self.config.w_t * improvement
                - self.config.k_dp * d_power.abs()
                - self.config.k_ddp * d_dpower.abs()
                - self.config.k_tf * flue_excess
                - self.config.k_dtf * flue_rate)
                .clamp(-self.config.reward_clip, self.config.reward_clip);

            for i in 0..RULE_COUNT {
                let update =
                    self.config.eta * (reward * sample.phi[i] - self.config.lambda * (self.rule_weights[i] - 1.0));
                self.rule_weights[i] = (self.rule_weights[i] + update).clamp(self.config.w_min, self.config.w_max);
            }
        }
    }

    fn maybe_auto_tune_flue(&mut self, now_mono: f64, err: f64, rate: f64) {
        if err.abs() <= self.config.steady_err_tol && rate.abs() <= self.config.steady_rate_tol {
            if let Some(flue) = self.flue_base {
                self.flue_samples.push_back((now_mono, flue));
            }
        }
        let cutoff = now_mono - self.config.auto_flue_window_s;
        while self.flue_samples.front().is_some_and(|(t, _)| *t < cutoff) {
            self.flue_samples.pop_front();
        }

        let due = self
            .last_auto_flue_update_mono
            .is_none_or(|t| now_mono - t >= self.config.auto_flue_update_interval_s);
        if !due || self.flue_samples.len() < 10 {
            return;
        }
        self.last_auto_flue_update_mono = Some(now_mono);

        let mut values: Vec<f64> = self.flue_samples.iter().map(|(_, v)| *v).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let q = |p: f64| -> f64 {
            let idx = ((values.len() - 1) as f64 * p).round() as usize;
            values[idx]
        };
        let (q_low, q_mid, q_high) = (q(0.1), q(0.5), q(0.9));
        if q_high - q_low < self.config.auto_flue_min_span_c {
            return;
        }
        let alpha = self.config.auto_flue_ema_alpha;
        self.config.base.flue_min_c += alpha * (q_low - self.config.base.flue_min_c);
        self.config.base.flue_mid_c += alpha * (q_mid - self.config.base.flue_mid_c);
        self.config.base.flue_max_c += alpha * (q_high - self.config.base.flue_max_c);
    }

    fn maybe_adapt_stability(&mut self, now_mono: f64, err: f64) {
        self.power_samples.push_back((now_mono, self.last_power));
        let cutoff = now_mono - self.config.stability_window_s;
        while self.power_samples.front().is_some_and(|(t, _)| *t < cutoff) {
            self.power_samples.pop_front();
        }
        if self.power_samples.len() < 10 {
            return;
        }
        let mean: f64 = self.power_samples.iter().map(|(_, p)| *p).sum::<f64>() / self.power_samples.len() as f64;
        let variance = self.power_samples.iter().map(|(_, p)| (*p - mean).powi(2)).sum::<f64>()
            / self.power_samples.len() as f64;
        let std = variance.sqrt();

        let held_well = err.abs() <= self.config.steady_err_tol;
        if held_well && std > self.config.stability_power_std_threshold {
            self.config.base.delta_scale =
                (self.config.base.delta_scale - self.config.delta_scale_step).max(self.config.delta_scale_min);
            self.config.base.flue_weight_near =
                (self.config.base.flue_weight_near - self.config.flue_weight_near_step)
                    .max(self.config.flue_weight_near_min);
            self.config.base.flue_weight_band_c =
                (self.config.base.flue_weight_band_c + self.config.flue_weight_band_step)
                    .min(self.config.flue_weight_band_max);
        } else if !held_well {
            self.config.base.delta_scale += self.config.delta_scale_step * 0.25;
        }
    }
}

impl PowerLaw for WorkNeuroFuzzyLaw {
    fn raw_power(&mut self, _now_wall: f64, dt: f64, sensors: &Sensors, system_state: &SystemState) -> f64 {
        let Some(boiler_temp) = sensors.boiler_temp else {
            return system_state.outputs.power_percent;
        };
        let now_mono = system_state.ts_mono;
        self.update_filters(dt, boiler_temp, sensors.flue_gas_temp);

        let err = self.config.base.setpoint - boiler_temp;
        let rate = self.rate_ema_per_min;
        let flue_base = self.flue_base;

        self.resolve_due_samples(now_mono, err.abs(), flue_base.unwrap_or(self.config.base.flue_mid_c));
        self.maybe_auto_tune_flue(now_mono, err, rate);

        let phi = self.normalized_phi(err, rate, flue_base);
        let rules = self.weighted_rules(err, rate, flue_base);
        let delta = centroid(&rules);

        self.pending.push_back(PendingSample {
            ts_mono: now_mono,
            abs_err: err.abs(),
            phi,
            power_before: self.last_power,
            delta_power_before: self.last_delta_power,
            flue_before: flue_base.unwrap_or(self.config.base.flue_mid_c),
        });

        let power = system_state.outputs.power_percent + self.config.base.delta_scale * delta;
        self.last_delta_power = power - self.last_power;
        self.last_power = power;

        self.maybe_adapt_stability(now_mono, err);

        power
    }

    fn min_power(&self) -> f64 {
        self.config.base.min_power
    }

    fn max_power(&self) -> f64 {
        self.config.base.max_power
    }

    fn max_slew_rate_percent_per_min(&self) -> f64 {
        self.config.base.max_slew_rate_percent_per_min
    }

    fn get_config_schema(&self) -> Value {
        json!({
            "setpoint": { "type": "float", "unit": "C", "default": 56.0 },
            "eta": { "type": "float", "default": 0.05 },
            "lambda": { "type": "float", "default": 0.01 },
            "learning_delay_s": { "type": "float", "unit": "s", "default": 120.0 },
            "auto_flue_update_interval_s": { "type": "float", "unit": "s", "default": 1800.0 },
            "stability_window_s": { "type": "float", "unit": "s", "default": 1800.0 },
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
