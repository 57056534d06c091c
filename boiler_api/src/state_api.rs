//! `GET /api/state/current`, `POST /api/state/mode/{name}` (§6).

use crate::error::ApiError;
use boiler_core::{BoilerMode, StateStore, SystemState};

fn parse_mode(s: &str) -> Result<BoilerMode, ApiError> {
    match s.to_ascii_uppercase().as_str() {
        "OFF" => Ok(BoilerMode::Off),
        "IGNITION" => Ok(BoilerMode::Ignition),
        "WORK" => Ok(BoilerMode::Work),
        "MANUAL" => Ok(BoilerMode::Manual),
        other => Err(ApiError::UnknownMode(other.to_string())),
    }
}

/// A full, read-only view of the current system state.
pub fn get_current(store: &StateStore) -> SystemState {
    store.snapshot()
}

/// Atomically set `mode`. `name` must be one of `OFF`/`IGNITION`/`WORK`/`MANUAL`.
pub fn set_mode(store: &StateStore, name: &str) -> Result<SystemState, ApiError> {
    let mode: BoilerMode = parse_mode(name)?;
    Ok(store.locked(|state| {
        state.mode = mode;
        state.clone()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_mode_accepts_each_known_name() {
        let store = StateStore::new(SystemState::default(), 10);
        for name in ["OFF", "IGNITION", "WORK", "MANUAL", "work", "Manual"] {
            assert!(set_mode(&store, name).is_ok());
        }
    }

    #[test]
    fn set_mode_rejects_unknown_name() {
        let store = StateStore::new(SystemState::default(), 10);
        let err = set_mode(&store, "TURBO").unwrap_err();
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn get_current_reflects_prior_mode_change() {
        let store = StateStore::new(SystemState::default(), 10);
        set_mode(&store, "WORK").unwrap();
        assert_eq!(get_current(&store).mode, BoilerMode::Work);
    }
}
