//! Mock hardware: a crude first-order thermal simulator. Exists purely
//! as a test collaborator for the Kernel and controller modules, never
//! as a production driver.

use boiler_core::{Outputs, Sensors};
use boiler_common::Clock;
use std::sync::Arc;

/// Simple first-order thermal plant, advanced by wall/monotonic time
/// supplied externally (so it can be driven by a `FakeClock` in tests).
#[derive(Debug, Clone)]
pub struct MockHardware {
    clock: Arc<dyn Clock>,
    last_mono: Option<f64>,

    pub boiler_temp: f64,
    pub return_temp: f64,
    pub radiator_temp: f64,
    pub dhw_temp: f64,
    pub flue_gas_temp: f64,
    pub hopper_temp: f64,
    pub outside_temp: f64,
    pub mixer_temp: f64,
    pub stb_triggered: bool,
    pub door_open: bool,

    /// Degrees gained per second at `power_percent = 100` and
    /// `feeder_on = true`, before losses.
    heat_gain_coeff: f64,
    /// Fractional loss per second toward `outside_temp`.
    loss_coeff: f64,

    last_outputs: Outputs,
}

impl MockHardware {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last_mono: None,
            boiler_temp: 20.0,
            return_temp: 18.0,
            radiator_temp: 20.0,
            dhw_temp: 20.0,
            flue_gas_temp: 20.0,
            hopper_temp: 18.0,
            outside_temp: 10.0,
            mixer_temp: 20.0,
            stb_triggered: false,
            door_open: false,
            heat_gain_coeff: 0.03,
            loss_coeff: 0.002,
            last_outputs: Outputs::default(),
        }
    }

    fn step_physics(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let fuel_factor = if self.last_outputs.feeder_on { 1.0 } else { 0.3 };
        let gain = self.heat_gain_coeff
            * (self.last_outputs.power_percent / 100.0)
            * fuel_factor
            * dt;
        let loss = self.loss_coeff * (self.boiler_temp - self.outside_temp) * dt;
        self.boiler_temp += gain - loss;
        self.return_temp += (self.boiler_temp - self.return_temp) * 0.01 * dt;
        self.radiator_temp += (self.return_temp - self.radiator_temp) * 0.02 * dt
            - (self.radiator_temp - self.outside_temp) * 0.001 * dt;
        self.flue_gas_temp +=
            ((60.0 + 1.3 * self.last_outputs.power_percent) - self.flue_gas_temp) * 0.05 * dt;
        if self.last_outputs.feeder_on {
            self.hopper_temp -= 0.001 * dt;
        }
        if self.last_outputs.pump_cwu_on {
            self.dhw_temp += (self.boiler_temp - self.dhw_temp) * 0.01 * dt;
        }
    }
}

impl crate::driver::HardwareInterface for MockHardware {
    fn read_sensors(&mut self) -> Sensors {
        let now_mono = self.clock.monotonic();
        let dt = self.last_mono.map(|last| now_mono - last).unwrap_or(0.0);
        self.step_physics(dt);
        self.last_mono = Some(now_mono);

        Sensors {
            boiler_temp: Some(self.boiler_temp),
            return_temp: Some(self.return_temp),
            radiator_temp: Some(self.radiator_temp),
            dhw_temp: Some(self.dhw_temp),
            flue_gas_temp: Some(self.flue_gas_temp),
            hopper_temp: Some(self.hopper_temp),
            outside_temp: Some(self.outside_temp),
            mixer_temp: Some(self.mixer_temp),
            stb_triggered: Some(self.stb_triggered),
            door_open: Some(self.door_open),
        }
    }

    fn apply_outputs(&mut self, outputs: &Outputs) {
        self.last_outputs = *outputs;
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boiler_common::FakeClock;
    use crate::driver::HardwareInterface;

    #[test]
    fn boiler_heats_up_under_full_power_and_active_feeder() {
        let clock = Arc::new(FakeClock::new(0.0));
        let mut hw = MockHardware::new(clock.clone());
        let _ = hw.read_sensors();
        hw.apply_outputs(&Outputs {
            power_percent: 100.0,
            feeder_on: true,
            ..Outputs::default()
        });
        clock.advance(60.0);
        let s1 = hw.read_sensors();
        let start = 20.0;
        assert!(s1.boiler_temp.unwrap() > start);
    }

    #[test]
    fn missing_dt_does_not_change_temperature() {
        let clock = Arc::new(FakeClock::new(0.0));
        let mut hw = MockHardware::new(clock.clone());
        let s0 = hw.read_sensors();
        let s1 = hw.read_sensors();
        assert_eq!(s0.boiler_temp, s1.boiler_temp);
    }
}
