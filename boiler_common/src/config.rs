//! YAML-backed configuration and state-file loading.
//!
//! Module config (`schema.yaml` / `values.yaml`) and persisted module
//! state (`*_state.yaml`) are both plain YAML documents. This module
//! supplies the generic load/atomic-save machinery; each module defines
//! its own `serde`-derived struct and calls through these helpers.

use crate::error::{ConfigError, PersistError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Load a YAML document into `T`, returning `Ok(None)` if the file does
/// not exist (callers then fall back to `Default`/schema defaults).
pub fn load_yaml_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
    let value: T = serde_yaml::from_str(&text)
        .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
    Ok(Some(value))
}

/// Load a YAML document into `T`, failing if the file is missing.
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    load_yaml_opt(path)?.ok_or_else(|| ConfigError::FileNotFound(path.display().to_string()))
}

/// Serialize `value` to YAML and write it atomically: write to a
/// sibling `.tmp` file, then rename over the destination. Survives a
/// crash mid-write — readers either see the old file or the new one,
/// never a partial one.
pub fn save_yaml_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let text =
        serde_yaml::to_string(value).map_err(|e| PersistError::Write(format!("encode: {}", e)))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PersistError::Write(format!("mkdir: {}", e)))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, text).map_err(|e| PersistError::Write(format!("write tmp: {}", e)))?;
    fs::rename(&tmp_path, path).map_err(|e| PersistError::Write(format!("rename: {}", e)))?;
    Ok(())
}

/// Whether a persisted state's wall-clock age is within `max_age_s`.
pub fn state_is_fresh(saved_wall_ts: f64, now_wall: f64, max_age_s: f64) -> bool {
    (now_wall - saved_wall_ts) <= max_age_s && (now_wall - saved_wall_ts) >= 0.0
}

/// Whether a saved reference temperature is close enough to the current
/// reading to trust the restored state.
pub fn state_temp_matches(saved: f64, current: f64, max_delta_c: f64) -> bool {
    (saved - current).abs() <= max_delta_c
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        a: f64,
        b: String,
    }

    #[test]
    fn missing_file_returns_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("values.yaml");
        let loaded: Option<Sample> = load_yaml_opt(&path).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn atomic_save_then_load_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("values.yaml");
        let sample = Sample {
            a: 1.5,
            b: "hi".to_string(),
        };
        save_yaml_atomic(&path, &sample).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
        let loaded: Sample = load_yaml(&path).unwrap();
        assert_eq!(loaded, sample);
    }

    #[test]
    fn state_freshness_rejects_stale_and_future() {
        assert!(state_is_fresh(100.0, 500.0, 900.0));
        assert!(!state_is_fresh(100.0, 1_100.0, 900.0));
        assert!(!state_is_fresh(500.0, 100.0, 900.0));
    }

    #[test]
    fn state_temp_delta_check() {
        assert!(state_temp_matches(55.0, 57.0, 5.0));
        assert!(!state_temp_matches(55.0, 65.0, 5.0));
    }
}
