//! `GET /api/config/modules`, `GET /api/config/schema/{id}`,
//! `GET /api/config/values/{id}`, `PUT /api/config/values/{id}` (§6).
//!
//! Each handler builds a throwaway instance of the target module via
//! `boiler_kernel::registry::build_module` rather than reaching into the
//! running `Kernel`/`AuxRunner` — schema and persisted values are a
//! property of the module type plus its on-disk config, not of a live
//! tick loop. Handing the *running* instance a fresh reload after a PUT
//! is the supervisor binary's job (it owns the loops); this layer's
//! contract ends at "the file on disk is now valid and persisted".

use crate::error::ApiError;
use boiler_kernel::manifest::Manifest;
use boiler_kernel::registry::build_module;
use boiler_modules::config_support::validate_against_schema;
use serde_json::Value;
use std::path::Path;

pub fn list_modules(manifest: &Manifest) -> Vec<String> {
    manifest.modules.iter().map(|m| m.id.clone()).collect()
}

fn build_or_unknown(id: &str, config_dir: &Path) -> Result<Box<dyn boiler_core::ModuleInterface>, ApiError> {
    build_module(id, config_dir).ok_or_else(|| ApiError::UnknownModule(id.to_string()))
}

pub fn get_schema(config_dir: &Path, id: &str) -> Result<Value, ApiError> {
    Ok(build_or_unknown(id, config_dir)?.get_config_schema())
}

pub fn get_values(config_dir: &Path, id: &str) -> Result<Value, ApiError> {
    Ok(build_or_unknown(id, config_dir)?.get_config_values())
}

/// Validate `patch` against the module's schema, persist it atomically,
/// and return the resulting values. A patch field that fails to parse
/// into the module's config type maps to `400`; a field that parses
/// fine but falls outside its schema's `min`/`max`/`options` maps to
/// `422` and leaves the on-disk file untouched.
pub fn put_values(config_dir: &Path, id: &str, patch: &Value) -> Result<Value, ApiError> {
    let mut module = build_or_unknown(id, config_dir)?;
    validate_against_schema(&module.get_config_schema(), patch)
        .map_err(|source| ApiError::InvalidConfig { module: id.to_string(), source })?;
    module
        .set_config_values(patch, true)
        .map_err(|source| ApiError::InvalidConfig { module: id.to_string(), source })?;
    Ok(module.get_config_values())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn schema_and_values_round_trip_for_a_known_module() {
        let dir = tempdir().unwrap();
        let schema = get_schema(dir.path(), "feeder").unwrap();
        assert!(schema.is_object());
        let values = get_values(dir.path(), "feeder").unwrap();
        assert!(values.is_object());
    }

    #[test]
    fn unknown_module_is_rejected() {
        let dir = tempdir().unwrap();
        let err = get_schema(dir.path(), "not_a_module").unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn put_values_persists_across_a_fresh_build() {
        let dir = tempdir().unwrap();
        let patch = serde_json::json!({ "feed_on_base_s": 12.0 });
        put_values(dir.path(), "feeder", &patch).unwrap();
        let reloaded = get_values(dir.path(), "feeder").unwrap();
        assert_eq!(reloaded["feed_on_base_s"], 12.0);
    }

    #[test]
    fn put_values_rejects_an_out_of_range_number_with_422_and_leaves_the_file_untouched() {
        let dir = tempdir().unwrap();
        let before = get_values(dir.path(), "stats").unwrap();
        let patch = serde_json::json!({ "season_start_month": 99 });
        let err = put_values(dir.path(), "stats", &patch).unwrap_err();
        assert_eq!(err.status_code(), 422);
        let after = get_values(dir.path(), "stats").unwrap();
        assert_eq!(before, after);
    }
}
