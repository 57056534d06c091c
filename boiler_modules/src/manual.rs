//! Applies the operator's direct manual overrides while in MANUAL mode.
//!
//! Outside MANUAL mode this module has no opinion at all — it returns
//! an entirely empty `PartialOutputs`.

use boiler_core::{
    BoilerMode, Event, EventLevel, ModuleError, ModuleInterface, ModuleTickResult, PartialOutputs,
    Sensors, SystemState,
};

pub struct ManualModule;

impl ManualModule {
    pub const ID: &'static str = "manual";

    pub fn new() -> Self {
        Self
    }
}

impl Default for ManualModule {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleInterface for ManualModule {
    fn id(&self) -> &str {
        Self::ID
    }

    fn tick(
        &mut self,
        now_wall: f64,
        _sensors: &Sensors,
        system_state: &SystemState,
    ) -> Result<ModuleTickResult, ModuleError> {
        if system_state.mode != BoilerMode::Manual {
            return Ok(ModuleTickResult::new(PartialOutputs::default()));
        }

        let m = system_state.manual;
        let mut partial = PartialOutputs {
            fan_power: Some(m.fan_power),
            feeder_on: Some(m.feeder_on),
            pump_co_on: Some(m.pump_co_on),
            pump_cwu_on: Some(m.pump_cwu_on),
            mixer_open_on: Some(m.mixer_open_on),
            mixer_close_on: Some(m.mixer_close_on),
            ..Default::default()
        };

        let mut events = Vec::new();
        if m.mixer_open_on && m.mixer_close_on {
            partial.mixer_open_on = Some(false);
            partial.mixer_close_on = Some(false);
            events.push(Event::new(
                now_wall,
                Self::ID,
                EventLevel::Warning,
                "MANUAL_MIXER_CONFLICT",
                "both mixer directions requested simultaneously",
            ));
        }

        Ok(ModuleTickResult::new(partial).with_events(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boiler_core::ManualOverrideState;

    #[test]
    fn has_no_opinion_outside_manual_mode() {
        let mut m = ManualModule::new();
        let mut s = SystemState::default();
        s.mode = BoilerMode::Work;
        let r = m.tick(0.0, &Sensors::default(), &s).unwrap();
        assert_eq!(r.partial_outputs, PartialOutputs::default());
    }

    #[test]
    fn asserts_manual_fields_in_manual_mode() {
        let mut m = ManualModule::new();
        let mut s = SystemState::default();
        s.mode = BoilerMode::Manual;
        s.manual = ManualOverrideState {
            fan_power: 70,
            feeder_on: true,
            pump_co_on: true,
            ..ManualOverrideState::default()
        };
        let r = m.tick(0.0, &Sensors::default(), &s).unwrap();
        assert_eq!(r.partial_outputs.fan_power, Some(70));
        assert_eq!(r.partial_outputs.feeder_on, Some(true));
        assert_eq!(r.partial_outputs.pump_co_on, Some(true));
    }

    #[test]
    fn conflicting_mixer_request_clears_both_and_warns() {
        let mut m = ManualModule::new();
        let mut s = SystemState::default();
        s.mode = BoilerMode::Manual;
        s.manual = ManualOverrideState {
            mixer_open_on: true,
            mixer_close_on: true,
            ..ManualOverrideState::default()
        };
        let r = m.tick(0.0, &Sensors::default(), &s).unwrap();
        assert_eq!(r.partial_outputs.mixer_open_on, Some(false));
        assert_eq!(r.partial_outputs.mixer_close_on, Some(false));
        assert_eq!(r.events[0].event_type, "MANUAL_MIXER_CONFLICT");
    }
}
