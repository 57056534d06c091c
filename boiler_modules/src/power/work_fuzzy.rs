//! WORK power law: Mamdani fuzzy controller over error, boiler-temp
//! rate, and flue temperature, with centroid defuzzification.

use super::PowerLaw;
use boiler_core::{ModuleError, Sensors, SystemState};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A trapezoidal membership function: rises `a`->`b`, flat `b`->`c`,
/// falls `c`->`d`. A triangle is the degenerate case `b == c`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Trapezoid {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl Trapezoid {
    fn membership(&self, x: f64) -> f64 {
        if x <= self.a || x >= self.d {
            0.0
        } else if x < self.b {
            (x - self.a) / (self.b - self.a).max(1e-9)
        } else if x <= self.c {
            1.0
        } else {
            (self.d - x) / (self.d - self.c).max(1e-9)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FuzzyConfig {
    pub setpoint: f64,
    pub min_power: f64,
    pub max_power: f64,
    pub max_slew_rate_percent_per_min: f64,
    pub rate_ema_tau_s: f64,

    pub e_nb: Trapezoid,
    pub e_ns: Trapezoid,
    pub e_ze: Trapezoid,
    pub e_ps: Trapezoid,
    pub e_pb: Trapezoid,

    pub r_fall: Trapezoid,
    pub r_stable: Trapezoid,
    pub r_rise: Trapezoid,

    pub flue_min_c: f64,
    pub flue_mid_c: f64,
    pub flue_max_c: f64,
    pub flue_overlap_ratio: f64,

    pub flue_weight_near: f64,
    pub flue_weight_far: f64,
    pub flue_weight_band_c: f64,

    pub delta_scale: f64,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            setpoint: 56.0,
            min_power: 15.0,
            max_power: 100.0,
            max_slew_rate_percent_per_min: 10.0,
            rate_ema_tau_s: 30.0,
            e_nb: Trapezoid { a: -12.0, b: -8.0, c: -6.0, d: -3.0 },
            e_ns: Trapezoid { a: -6.0, b: -3.0, c: -1.5, d: 0.0 },
            e_ze: Trapezoid { a: -1.5, b: -0.5, c: 0.5, d: 1.5 },
            e_ps: Trapezoid { a: 0.0, b: 1.5, c: 3.0, d: 6.0 },
            e_pb: Trapezoid { a: 3.0, b: 6.0, c: 8.0, d: 12.0 },
            r_fall: Trapezoid { a: -10.0, b: -4.0, c: -1.0, d: 0.0 },
            r_stable: Trapezoid { a: -1.0, b: -0.3, c: 0.3, d: 1.0 },
            r_rise: Trapezoid { a: 0.0, b: 1.0, c: 4.0, d: 10.0 },
            flue_min_c: 120.0,
            flue_mid_c: 160.0,
            flue_max_c: 200.0,
            flue_overlap_ratio: 0.20,
            flue_weight_near: 1.2,
            flue_weight_far: 0.1,
            flue_weight_band_c: 6.0,
            delta_scale: 3.0,
        }
    }
}

const OUTPUT_UNIVERSE_MIN: f64 = -6.0;
const OUTPUT_UNIVERSE_MAX: f64 = 6.0;
const OUTPUT_STEPS: usize = 121;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum OutputTerm {
    Db,
    Dm,
    Ds,
    Z,
    Us,
    Um,
    Ub,
}

fn output_term(term: OutputTerm) -> Trapezoid {
    match term {
        OutputTerm::Db => Trapezoid { a: -9.0, b: -6.0, c: -5.0, d: -3.0 },
        OutputTerm::Dm => Trapezoid { a: -5.0, b: -3.5, c: -2.5, d: -1.0 },
        OutputTerm::Ds => Trapezoid { a: -3.0, b: -1.5, c: -0.7, d: 0.0 },
        OutputTerm::Z => Trapezoid { a: -1.2, b: -0.4, c: 0.4, d: 1.2 },
        OutputTerm::Us => Trapezoid { a: 0.0, b: 0.7, c: 1.5, d: 3.0 },
        OutputTerm::Um => Trapezoid { a: 1.0, b: 2.5, c: 3.5, d: 5.0 },
        OutputTerm::Ub => Trapezoid { a: 3.0, b: 5.0, c: 6.0, d: 9.0 },
    }
}

/// `w(|err|)` smoothsteps from `flue_weight_near` at `err=0` down to
/// `flue_weight_far` at `|err| >= flue_weight_band_c`.
fn flue_weight(cfg: &FuzzyConfig, abs_err: f64) -> f64 {
    let t = (abs_err / cfg.flue_weight_band_c.max(1e-9)).clamp(0.0, 1.0);
    let smooth = t * t * (3.0 - 2.0 * t);
    cfg.flue_weight_near + smooth * (cfg.flue_weight_far - cfg.flue_weight_near)
}

fn flue_trapezoids(cfg: &FuzzyConfig) -> (Trapezoid, Trapezoid, Trapezoid, Trapezoid) {
    let span_low = (cfg.flue_mid_c - cfg.flue_min_c).max(1.0);
    let span_high = (cfg.flue_max_c - cfg.flue_mid_c).max(1.0);
    let overlap_low = span_low * cfg.flue_overlap_ratio;
    let overlap_high = span_high * cfg.flue_overlap_ratio;

    let low = Trapezoid {
        a: cfg.flue_min_c - span_low,
        b: cfg.flue_min_c - span_low,
        c: cfg.flue_min_c - overlap_low,
        d: cfg.flue_min_c + overlap_low,
    };
    let mid = Trapezoid {
        a: cfg.flue_min_c - overlap_low,
        b: cfg.flue_min_c + overlap_low,
        c: cfg.flue_mid_c + overlap_low.min(overlap_high),
        d: cfg.flue_max_c + overlap_high,
    };
    let high = Trapezoid {
        a: cfg.flue_mid_c - overlap_low,
        b: cfg.flue_max_c - overlap_high,
        c: cfg.flue_max_c - overlap_high,
        d: cfg.flue_max_c + overlap_high,
    };
    let vhigh = Trapezoid {
        a: cfg.flue_max_c - overlap_high,
        b: cfg.flue_max_c + overlap_high,
        c: cfg.flue_max_c + span_high,
        d: cfg.flue_max_c + span_high,
    };
    (low, mid, high, vhigh)
}

/// Fires the full rule base for one tick, returning `(output_term,
/// firing_strength)` pairs. Shared by the plain fuzzy law and the
/// neuro-fuzzy law's weighted variant.
pub(super) fn fire_rules(cfg: &FuzzyConfig, err: f64, rate: f64, flue: Option<f64>) -> Vec<(OutputTerm, f64)> {
    let nb = cfg.e_nb.membership(err);
    let ns = cfg.e_ns.membership(err);
    let ze = cfg.e_ze.membership(err);
    let ps = cfg.e_ps.membership(err);
    let pb = cfg.e_pb.membership(err);

    let fall = cfg.r_fall.membership(rate);
    let stable = cfg.r_stable.membership(rate);
    let rise = cfg.r_rise.membership(rate);

    let mut rules = vec![
        (OutputTerm::Db, nb),
        (OutputTerm::Ds, ns),
        (OutputTerm::Z, ze),
        (OutputTerm::Us, ps),
        (OutputTerm::Ub, pb),
        (OutputTerm::Um, pb.min(rise)),
        (OutputTerm::Z, ps.min(rise)),
        (OutputTerm::Dm, nb.min(fall)),
        (OutputTerm::Z, ns.min(fall)),
        (OutputTerm::Z, ze.min(stable)),
    ];

    let (low_m, mid_m, high_m, vhigh_m) = match flue {
        Some(flue_temp) => {
            let (low, mid, high, vhigh) = flue_trapezoids(cfg);
            (
                low.membership(flue_temp),
                mid.membership(flue_temp),
                high.membership(flue_temp),
                vhigh.membership(flue_temp),
            )
        }
        None => (0.0, 0.0, 0.0, 0.0),
    };
    let w = flue_weight(cfg, err.abs());
    rules.push((OutputTerm::Us, w * low_m * 0.5));
    rules.push((OutputTerm::Z, w * mid_m * 0.5));
    rules.push((OutputTerm::Ds, w * high_m));
    rules.push((OutputTerm::Dm, w * vhigh_m));
    rules.push((OutputTerm::Db, w * vhigh_m * pb.max(0.3)));

    rules
}

pub(super) fn centroid(rules: &[(OutputTerm, f64)]) -> f64 {
    let step = (OUTPUT_UNIVERSE_MAX - OUTPUT_UNIVERSE_MIN) / (OUTPUT_STEPS - 1) as f64;
    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..OUTPUT_STEPS {
        let x = OUTPUT_UNIVERSE_MIN + i as f64 * step;
        let mut agg = 0.0_f64;
        for (term, strength) in rules {
            if *strength <= 0.0 {
                continue;
            }
            let clipped = output_term(*term).membership(x).min(*strength);
            agg = agg.max(clipped);
        }
        num += x * agg;
        den += agg;
    }
    if den <= 1e-9 {
        0.0
    } else {
        num / den
    }
}

pub struct WorkFuzzyLaw {
    config: FuzzyConfig,
    last_boiler_temp: Option<f64>,
    rate_ema_per_min: f64,
    flue_base: Option<f64>,
}

impl WorkFuzzyLaw {
    pub fn new(config: FuzzyConfig) -> Self {
        Self {
            config,
            last_boiler_temp: None,
            rate_ema_per_min: 0.0,
            flue_base: None,
        }
    }

    fn update_rate(&mut self, dt: f64, boiler_temp: f64) {
        if let Some(prev) = self.last_boiler_temp {
            if dt > 0.0 {
                let alpha = dt / (self.config.rate_ema_tau_s + dt);
                let instant = (boiler_temp - prev) / dt * 60.0;
                self.rate_ema_per_min += alpha * (instant - self.rate_ema_per_min);
            }
        }
        self.last_boiler_temp = Some(boiler_temp);
    }

    fn update_flue_base(&mut self, dt: f64, flue_temp: Option<f64>) {
        let Some(flue) = flue_temp else { return };
        let tau = 60.0;
        match self.flue_base {
            Some(prev) if dt > 0.0 => {
                let alpha = dt / (tau + dt);
                self.flue_base = Some(prev + alpha * (flue - prev));
            }
            _ => self.flue_base = Some(flue),
        }
    }
}

impl PowerLaw for WorkFuzzyLaw {
    fn raw_power(&mut self, _now_wall: f64, dt: f64, sensors: &Sensors, system_state: &SystemState) -> f64 {
        let Some(boiler_temp) = sensors.boiler_temp else {
            return system_state.outputs.power_percent;
        };
        self.update_rate(dt, boiler_temp);
        self.update_flue_base(dt, sensors.flue_gas_temp);

        let err = self.config.setpoint - boiler_temp;
        let rules = fire_rules(&self.config, err, self.rate_ema_per_min, self.flue_base);
        let delta = centroid(&rules);

        system_state.outputs.power_percent + self.config.delta_scale * delta
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

    fn get_config_schema(&self) -> Value {
        json!({
            "setpoint": { "type": "float", "unit": "C", "default": 56.0 },
            "delta_scale": { "type": "float", "default": 3.0 },
            "flue_min_c": { "type": "float", "unit": "C", "default": 120.0 },
            "flue_mid_c": { "type": "float", "unit": "C", "default": 160.0 },
            "flue_max_c": { "type": "float", "unit": "C", "default": 200.0 },
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

    fn sensors(boiler: f64, flue: f64) -> Sensors {
        Sensors {
            boiler_temp: Some(boiler),
            flue_gas_temp: Some(flue),
            ..Sensors::default()
        }
    }

    #[test]
    fn trapezoid_flat_region_is_fully_satisfied() {
        let t = Trapezoid { a: 0.0, b: 1.0, c: 2.0, d: 3.0 };
        assert_eq!(t.membership(1.5), 1.0);
        assert_eq!(t.membership(-1.0), 0.0);
    }

    #[test]
    fn large_positive_error_biases_centroid_upward() {
        let cfg = FuzzyConfig::default();
        let rules = fire_rules(&cfg, 10.0, 0.0, None);
        let d = centroid(&rules);
        assert!(d > 0.0);
    }

    #[test]
    fn large_negative_error_biases_centroid_downward() {
        let cfg = FuzzyConfig::default();
        let rules = fire_rules(&cfg, -10.0, 0.0, None);
        let d = centroid(&rules);
        assert!(d < 0.0);
    }

    #[test]
    fn zero_error_and_stable_rate_centers_near_zero() {
        let cfg = FuzzyConfig::default();
        let rules = fire_rules(&cfg, 0.0, 0.0, None);
        let d = centroid(&rules);
        assert!(d.abs() < 0.5);
    }

    #[test]
    fn raw_power_moves_output_from_prior_power_baseline() {
        let mut law = WorkFuzzyLaw::new(FuzzyConfig::default());
        let mut state = SystemState::default();
        state.outputs.power_percent = 50.0;
        let p = law.raw_power(0.0, 1.0, &sensors(40.0, 140.0), &state);
        assert!(p > 50.0, "cold boiler should call for more power");
    }
}
