//! `GET /api/manual/current`, `POST /api/manual/outputs` (§6).

use crate::error::ApiError;
use boiler_common::Clock;
use boiler_core::{BoilerMode, ManualOverrideState, StateStore};
use serde::Deserialize;
use std::sync::Arc;

/// A partial patch over `ManualOverrideState` — mirrors `PartialOutputs`'
/// "absent means no opinion" shape so a caller can flip one field
/// without re-sending the rest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManualOutputsPatch {
    pub fan_power: Option<u8>,
    pub feeder_on: Option<bool>,
    pub pump_co_on: Option<bool>,
    pub pump_cwu_on: Option<bool>,
    pub mixer_open_on: Option<bool>,
    pub mixer_close_on: Option<bool>,
}

pub fn get_manual(store: &StateStore) -> ManualOverrideState {
    store.snapshot().manual
}

/// Apply `patch` to the manual override state. Rejected outside MANUAL
/// mode and when the patch would assert both mixer directions at once —
/// both per §6's `422` rules.
pub fn set_manual(
    store: &StateStore,
    clock: &Arc<dyn Clock>,
    patch: &ManualOutputsPatch,
) -> Result<ManualOverrideState, ApiError> {
    store.locked(|state| {
        if state.mode != BoilerMode::Manual {
            return Err(ApiError::NotInManualMode);
        }

        let mut next = state.manual.clone();
        if let Some(v) = patch.fan_power {
            next.fan_power = v;
        }
        if let Some(v) = patch.feeder_on {
            next.feeder_on = v;
        }
        if let Some(v) = patch.pump_co_on {
            next.pump_co_on = v;
        }
        if let Some(v) = patch.pump_cwu_on {
            next.pump_cwu_on = v;
        }
        if let Some(v) = patch.mixer_open_on {
            next.mixer_open_on = v;
        }
        if let Some(v) = patch.mixer_close_on {
            next.mixer_close_on = v;
        }
        if next.mixer_open_on && next.mixer_close_on {
            return Err(ApiError::MixerConflict);
        }

        next.last_update_wall = clock.wall();
        state.manual = next.clone();
        Ok(next)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use boiler_common::clock::FakeClock;
    use boiler_core::SystemState;

    fn manual_mode_store() -> StateStore {
        let mut initial = SystemState::default();
        initial.mode = BoilerMode::Manual;
        StateStore::new(initial, 10)
    }

    #[test]
    fn patch_is_rejected_outside_manual_mode() {
        let store = StateStore::new(SystemState::default(), 10);
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(0.0));
        let patch = ManualOutputsPatch { fan_power: Some(50), ..Default::default() };
        assert!(matches!(set_manual(&store, &clock, &patch), Err(ApiError::NotInManualMode)));
    }

    #[test]
    fn mixer_conflict_is_rejected() {
        let store = manual_mode_store();
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(0.0));
        let patch = ManualOutputsPatch {
            mixer_open_on: Some(true),
            mixer_close_on: Some(true),
            ..Default::default()
        };
        assert!(matches!(set_manual(&store, &clock, &patch), Err(ApiError::MixerConflict)));
    }

    #[test]
    fn partial_patch_only_touches_named_fields() {
        let store = manual_mode_store();
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(42.0));
        store
            .locked(|state| state.manual.pump_co_on = true);
        let patch = ManualOutputsPatch { fan_power: Some(70), ..Default::default() };
        let result = set_manual(&store, &clock, &patch).unwrap();
        assert_eq!(result.fan_power, 70);
        assert!(result.pump_co_on, "untouched field must survive the patch");
        assert_eq!(result.last_update_wall, 42.0);
    }
}
