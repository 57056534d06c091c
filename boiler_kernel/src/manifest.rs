//! `modules.yaml`: the ordered list of controller modules the Kernel and
//! `AuxRunner` are built from.
//!
//! Entries are loaded in file order. `critical = true` routes a module
//! into the control loop; `critical = false` routes it into the
//! auxiliary loop. Disabled entries (`enabled = false`) are skipped
//! entirely — they are neither ticked nor instantiated.

use crate::error::KernelError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    pub id: String,
    /// Reserved for an out-of-tree module implementation path; unused by
    /// the built-in registry, which resolves every id directly.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub critical: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Manifest {
    pub modules: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, KernelError> {
        Ok(boiler_common::config::load_yaml(path)?)
    }

    pub fn critical(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.modules.iter().filter(|m| m.enabled && m.critical)
    }

    pub fn auxiliary(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.modules.iter().filter(|m| m.enabled && !m.critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn splits_entries_by_critical_flag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("modules.yaml");
        fs::write(
            &path,
            r#"
modules:
  - id: mode
    critical: false
  - id: work_pi
    critical: true
  - id: stats
    critical: false
    enabled: true
  - id: disabled_one
    critical: true
    enabled: false
"#,
        )
        .unwrap();

        let manifest = Manifest::load(&path).unwrap();
        let critical: Vec<_> = manifest.critical().map(|m| m.id.as_str()).collect();
        let aux: Vec<_> = manifest.auxiliary().map(|m| m.id.as_str()).collect();
        assert_eq!(critical, vec!["work_pi"]);
        assert_eq!(aux, vec!["mode", "stats"]);
    }

    #[test]
    fn enabled_defaults_to_true() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("modules.yaml");
        fs::write(&path, "modules:\n  - id: safety\n    critical: true\n").unwrap();
        let manifest = Manifest::load(&path).unwrap();
        assert!(manifest.modules[0].enabled);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.yaml");
        assert!(Manifest::load(&path).is_err());
    }
}
