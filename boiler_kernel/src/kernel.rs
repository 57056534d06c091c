//! The critical loop: reads sensors, ticks every critical module in
//! manifest order, merges their `PartialOutputs`, and drives hardware.
//!
//! One module's failure never aborts a tick (§4.2 point 3) — the
//! failing module is marked `ERROR` and the tick proceeds with whatever
//! outputs the remaining modules produce.

use crate::error::KernelError;
use crate::manifest::Manifest;
use crate::registry::build_module;
use boiler_common::Clock;
use boiler_core::{
    Event, EventLevel, ModuleHealth, ModuleInterface, ModuleStatus, Outputs, PartialOutputs,
    StateStore,
};
use boiler_hal::HardwareInterface;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Fold `delta` onto `base`, last-writer-wins on every present field.
/// The single merge primitive the Kernel folds over the manifest-ordered
/// module list.
pub fn merge_partial_outputs(base: &mut Outputs, delta: &PartialOutputs) {
    boiler_core::apply_partial(base, delta);
}

struct CriticalModule {
    id: String,
    module: Box<dyn ModuleInterface>,
}

pub struct Kernel {
    modules: Vec<CriticalModule>,
    hardware: Box<dyn HardwareInterface>,
    clock: Arc<dyn Clock>,
    store: Arc<StateStore>,
    config_dir: PathBuf,
}

impl Kernel {
    pub fn new(
        manifest: &Manifest,
        config_dir: &Path,
        hardware: Box<dyn HardwareInterface>,
        clock: Arc<dyn Clock>,
        store: Arc<StateStore>,
    ) -> Result<Self, KernelError> {
        let mut modules = Vec::new();
        for entry in manifest.critical() {
            let module = build_module(&entry.id, config_dir)
                .ok_or_else(|| KernelError::UnknownModule(entry.id.clone()))?;
            modules.push(CriticalModule { id: entry.id.clone(), module });
        }
        Ok(Self {
            modules,
            hardware,
            clock,
            store,
            config_dir: config_dir.to_path_buf(),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Run one critical-loop tick (§4.2). Returns the merged outputs
    /// actually applied to hardware, for the cycle runner's diagnostics.
    pub fn tick(&mut self) -> Outputs {
        let now_wall = self.clock.wall();
        let now_mono = self.clock.monotonic();
        let sensors = self.hardware.read_sensors();

        // 2. publish sensors + timestamps, take a snapshot for modules to tick against.
        let snapshot = self.store.locked(|state| {
            state.ts_wall = now_wall;
            state.ts_mono = now_mono;
            state.sensors = sensors;
            state.clone()
        });

        let mut merged = snapshot.outputs;
        let mut mode_override = None;
        let mut collected_events = Vec::new();
        let mut statuses = Vec::new();

        // 3-4. tick each critical module in manifest order, merging as we go.
        // A module's `mode_override` (only `mode` is expected to set one) is
        // applied after the merge, same last-writer-wins ordering.
        for entry in &mut self.modules {
            let start = Instant::now();
            let mut status = ModuleStatus::new(entry.id.clone());
            match entry.module.tick(now_wall, &sensors, &snapshot) {
                Ok(result) => {
                    merge_partial_outputs(&mut merged, &result.partial_outputs);
                    collected_events.extend(result.events);
                    if let Some(mode) = result.mode_override {
                        mode_override = Some(mode);
                    }
                    status.health = ModuleHealth::Ok;
                }
                Err(err) => {
                    status.health = ModuleHealth::Error;
                    status.last_error = Some(err.to_string());
                    collected_events.push(Event::new(
                        now_wall,
                        "kernel",
                        EventLevel::Error,
                        "MODULE_ERROR",
                        format!("module '{}' failed: {}", entry.id, err),
                    ).with_data(json!({ "module": entry.id }).as_object().cloned().unwrap_or_default()));
                }
            }
            status.last_tick_duration = start.elapsed().as_secs_f64();
            status.last_updated_wall = now_wall;
            statuses.push(status);
        }

        // 5. hard invariant: never assert both mixer directions at once.
        if merged.mixer_open_on && merged.mixer_close_on {
            merged.mixer_open_on = false;
            merged.mixer_close_on = false;
            collected_events.push(Event::new(
                now_wall,
                "kernel",
                EventLevel::Warning,
                "MIXER_CONFLICT",
                "both mixer directions asserted after merge; cleared",
            ));
        }

        // 6. drive hardware, publish merged outputs.
        self.hardware.apply_outputs(&merged);

        let alarm_events: Vec<&Event> = collected_events
            .iter()
            .filter(|e| e.level == EventLevel::Alarm)
            .collect();
        let alarm_active = !alarm_events.is_empty();
        let alarm_message = alarm_events.last().map(|e| e.message.clone());

        self.store.locked(|state| {
            state.outputs = merged;
            if let Some(mode) = mode_override {
                state.mode = mode;
            }
            for status in statuses {
                state.modules.insert(status.id.clone(), status);
            }
            state.alarm_active = alarm_active;
            state.alarm_message = alarm_message.clone();
        });

        // 7-8. publish events collected this tick and mirror them into the
        // HTTP-convenience tail.
        self.store.locked(|state| {
            for event in &collected_events {
                state.push_recent_event(event.clone());
            }
        });
        self.store.publish_events(collected_events);

        merged
    }
}

/// `true` while the given manifest resolves to a coherent set of
/// modules — used before spinning up the loop so a bad `modules.yaml`
/// fails fast instead of mid-run.
pub fn validate_manifest(manifest: &Manifest) -> Result<(), KernelError> {
    for entry in manifest.critical().chain(manifest.auxiliary()) {
        if build_module(&entry.id, Path::new(".")).is_none() {
            return Err(KernelError::UnknownModule(entry.id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use boiler_common::clock::FakeClock;
    use boiler_core::Sensors;
    use std::fs;
    use tempfile::tempdir;

    struct StubHardware {
        sensors: Sensors,
    }

    impl HardwareInterface for StubHardware {
        fn read_sensors(&mut self) -> Sensors {
            self.sensors
        }
        fn apply_outputs(&mut self, _outputs: &Outputs) {}
        fn name(&self) -> &'static str {
            "stub"
        }
    }

    fn manifest_with(ids: &[(&str, bool)]) -> Manifest {
        let modules = ids
            .iter()
            .map(|(id, critical)| crate::manifest::ManifestEntry {
                id: id.to_string(),
                path: None,
                enabled: true,
                critical: *critical,
            })
            .collect();
        Manifest { modules }
    }

    #[test]
    fn tick_merges_outputs_and_advances_module_status() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("safety")).unwrap();
        let manifest = manifest_with(&[("mode", true), ("work_pi", true), ("feeder", true), ("safety", true)]);
        let clock = Arc::new(FakeClock::new(1_000.0));
        let store = Arc::new(StateStore::new(Default::default(), 100));
        let hardware = Box::new(StubHardware {
            sensors: Sensors { boiler_temp: Some(40.0), ..Sensors::default() },
        });
        let mut kernel = Kernel::new(&manifest, dir.path(), hardware, clock.clone(), store.clone()).unwrap();
        kernel.tick();
        let snap = store.snapshot();
        assert!(snap.modules.contains_key("work_pi"));
        assert!(snap.modules.contains_key("safety"));
    }

    #[test]
    fn unknown_module_id_fails_construction() {
        let dir = tempdir().unwrap();
        let manifest = manifest_with(&[("not_a_module", true)]);
        let clock = Arc::new(FakeClock::new(0.0));
        let store = Arc::new(StateStore::new(Default::default(), 100));
        let hardware = Box::new(StubHardware { sensors: Sensors::default() });
        assert!(Kernel::new(&manifest, dir.path(), hardware, clock, store).is_err());
    }

    #[test]
    fn mixer_conflict_is_cleared_and_reported() {
        let dir = tempdir().unwrap();
        let manifest = manifest_with(&[("safety", true)]);
        let clock = Arc::new(FakeClock::new(0.0));
        let store = Arc::new(StateStore::new(Default::default(), 100));
        let hardware = Box::new(StubHardware { sensors: Sensors::default() });
        let mut kernel = Kernel::new(&manifest, dir.path(), hardware, clock, store.clone()).unwrap();
        store.locked(|state| {
            state.outputs.mixer_open_on = true;
            state.outputs.mixer_close_on = true;
        });
        let merged = kernel.tick();
        assert!(!merged.mixer_open_on || !merged.mixer_close_on);
    }
}
