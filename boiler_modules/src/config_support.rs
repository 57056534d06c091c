//! Shared config/persistence plumbing used by every controller module.
//!
//! Each module owns a small `serde`-derived config struct under
//! `<config_dir>/<module id>/values.yaml`; this file supplies the
//! load/merge/save machinery so modules don't each reimplement it.

use boiler_common::config::{load_yaml_opt, save_yaml_atomic};
use boiler_core::ModuleError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub fn values_path(config_dir: &Path, module_id: &str) -> PathBuf {
    config_dir.join(module_id).join("values.yaml")
}

pub fn load_or_default<T>(config_dir: &Path, module_id: &str) -> T
where
    T: DeserializeOwned + Default,
{
    load_yaml_opt(&values_path(config_dir, module_id))
        .ok()
        .flatten()
        .unwrap_or_default()
}

/// Merge a JSON object patch onto `current`'s serialized form, ignoring
/// keys the config struct doesn't declare and leaving missing keys at
/// their current value, then re-deserialize into `T`.
pub fn merge_and_reparse<T>(current: &T, patch: &Value) -> Result<T, ModuleError>
where
    T: Serialize + DeserializeOwned,
{
    let mut merged = match serde_json::to_value(current) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    if let Value::Object(patch_map) = patch {
        for (k, v) in patch_map {
            if merged.contains_key(k) {
                merged.insert(k.clone(), v.clone());
            }
        }
    }
    serde_json::from_value(Value::Object(merged))
        .map_err(|e| ModuleError::Tick(format!("invalid config patch: {e}")))
}

/// Check every field named in `patch` against the `min`/`max`/`options`
/// bounds declared in `schema` (the `Value` a module's
/// `get_config_schema` returns). Fields the patch doesn't touch, or
/// that the schema doesn't bound, are not checked.
pub fn validate_against_schema(schema: &Value, patch: &Value) -> Result<(), ModuleError> {
    let (Value::Object(schema_map), Value::Object(patch_map)) = (schema, patch) else {
        return Ok(());
    };
    for (field, value) in patch_map {
        let Some(entry) = schema_map.get(field) else {
            continue;
        };
        if let Some(n) = value.as_f64() {
            if let Some(min) = entry.get("min").and_then(Value::as_f64) {
                if n < min {
                    return Err(ModuleError::OutOfRange {
                        field: field.clone(),
                        detail: format!("{n} is below minimum {min}"),
                    });
                }
            }
            if let Some(max) = entry.get("max").and_then(Value::as_f64) {
                if n > max {
                    return Err(ModuleError::OutOfRange {
                        field: field.clone(),
                        detail: format!("{n} is above maximum {max}"),
                    });
                }
            }
        }
        if let Some(options) = entry.get("options").and_then(Value::as_array) {
            if !options.contains(value) {
                return Err(ModuleError::OutOfRange {
                    field: field.clone(),
                    detail: format!("{value} is not one of {options:?}"),
                });
            }
        }
    }
    Ok(())
}

pub fn persist<T: Serialize>(
    config_dir: &Path,
    module_id: &str,
    value: &T,
) -> Result<(), ModuleError> {
    save_yaml_atomic(&values_path(config_dir, module_id), value)?;
    Ok(())
}

pub fn reload<T>(config_dir: &Path, module_id: &str) -> Result<Option<T>, ModuleError>
where
    T: DeserializeOwned,
{
    Ok(load_yaml_opt(&values_path(config_dir, module_id))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
    struct Sample {
        a: f64,
        b: bool,
    }

    #[test]
    fn unknown_patch_keys_are_ignored() {
        let current = Sample { a: 1.0, b: false };
        let patch = serde_json::json!({ "a": 2.0, "nonsense": 9 });
        let merged = merge_and_reparse(&current, &patch).unwrap();
        assert_eq!(merged, Sample { a: 2.0, b: false });
    }

    #[test]
    fn missing_patch_keys_keep_current_value() {
        let current = Sample { a: 1.0, b: true };
        let patch = serde_json::json!({});
        let merged = merge_and_reparse(&current, &patch).unwrap();
        assert_eq!(merged, current);
    }

    #[test]
    fn out_of_range_field_is_rejected() {
        let schema = serde_json::json!({ "a": { "type": "float", "min": 1.0, "max": 12.0 } });
        let patch = serde_json::json!({ "a": 99.0 });
        assert!(matches!(
            validate_against_schema(&schema, &patch),
            Err(ModuleError::OutOfRange { .. })
        ));
    }

    #[test]
    fn in_range_field_passes() {
        let schema = serde_json::json!({ "a": { "type": "float", "min": 1.0, "max": 12.0 } });
        let patch = serde_json::json!({ "a": 6.0 });
        assert!(validate_against_schema(&schema, &patch).is_ok());
    }
}
