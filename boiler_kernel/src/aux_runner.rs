//! The auxiliary loop (§4.3): statistics and the history/eventlog CSV
//! sinks. `mode` runs in the critical loop instead (§2.1 — it must
//! settle before the power regulators read it in the same tick).
//! Failures here are logged and never affect the control path.

use crate::error::KernelError;
use crate::manifest::Manifest;
use crate::registry::build_module;
use boiler_common::Clock;
use boiler_core::{Event, EventLevel, ModuleHealth, ModuleInterface, ModuleStatus, StateStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

struct AuxModule {
    id: String,
    module: Box<dyn ModuleInterface>,
}

pub struct AuxRunner {
    modules: Vec<AuxModule>,
    clock: Arc<dyn Clock>,
    store: Arc<StateStore>,
    own_cursor: u64,
}

impl AuxRunner {
    pub fn new(
        manifest: &Manifest,
        config_dir: &Path,
        clock: Arc<dyn Clock>,
        store: Arc<StateStore>,
    ) -> Result<Self, KernelError> {
        let mut modules = Vec::new();
        for entry in manifest.auxiliary() {
            let module = build_module(&entry.id, config_dir)
                .ok_or_else(|| KernelError::UnknownModule(entry.id.clone()))?;
            modules.push(AuxModule { id: entry.id.clone(), module });
        }
        Ok(Self {
            modules,
            clock,
            store,
            own_cursor: 0,
        })
    }

    /// Run one auxiliary-loop tick.
    pub fn tick(&mut self) {
        let now_wall = self.clock.wall();

        // 1-2. snapshot, then overlay the events published since our own
        // last look, so every aux module this cycle sees exactly the
        // fresh batch — not the full HTTP-convenience tail.
        let mut snapshot = self.store.snapshot();
        let (fresh_events, newest_seq, overflow) = self.store.events_since(self.own_cursor);
        self.own_cursor = newest_seq;
        if overflow {
            tracing::warn!("aux runner event cursor overflowed; some events were never seen");
        }
        snapshot.recent_events = fresh_events.into();

        let mut collected_events = Vec::new();
        let mut statuses = Vec::new();

        // 3. tick each aux module; failures are contained to that module.
        for entry in &mut self.modules {
            let start = Instant::now();
            let mut status = ModuleStatus::new(entry.id.clone());
            match entry.module.tick(now_wall, &snapshot.sensors, &snapshot) {
                Ok(result) => {
                    collected_events.extend(result.events);
                    status.health = ModuleHealth::Ok;
                }
                Err(err) => {
                    status.health = ModuleHealth::Error;
                    status.last_error = Some(err.to_string());
                    collected_events.push(Event::new(
                        now_wall,
                        "aux_runner",
                        EventLevel::Error,
                        "AUX_MODULE_ERROR",
                        format!("aux module '{}' failed: {}", entry.id, err),
                    ));
                }
            }
            status.last_tick_duration = start.elapsed().as_secs_f64();
            status.last_updated_wall = now_wall;
            statuses.push(status);
        }

        // 4. write module status back, publish any events aux modules raised,
        // and mirror them into the HTTP-convenience tail immediately.
        self.store.locked(|state| {
            for status in statuses {
                state.modules.insert(status.id.clone(), status);
            }
            for event in &collected_events {
                state.push_recent_event(event.clone());
            }
        });
        self.store.publish_events(collected_events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boiler_common::clock::FakeClock;
    use boiler_core::{EventLevel as Lvl, SystemState};
    use tempfile::tempdir;

    fn manifest_with(ids: &[&str]) -> Manifest {
        let modules = ids
            .iter()
            .map(|id| crate::manifest::ManifestEntry {
                id: id.to_string(),
                path: None,
                enabled: true,
                critical: false,
            })
            .collect();
        Manifest { modules }
    }

    #[test]
    fn aux_modules_get_status_entries_after_a_tick() {
        let dir = tempdir().unwrap();
        let manifest = manifest_with(&["stats", "history", "eventlog"]);
        let clock = Arc::new(FakeClock::new(1_000.0));
        let store = Arc::new(StateStore::new(SystemState::default(), 100));
        let mut runner = AuxRunner::new(&manifest, dir.path(), clock, store.clone()).unwrap();
        runner.tick();
        let snap = store.snapshot();
        assert!(snap.modules.contains_key("stats"));
        assert!(snap.modules.contains_key("history"));
    }

    #[test]
    fn only_events_since_last_aux_cursor_are_surfaced_to_modules() {
        let dir = tempdir().unwrap();
        let manifest = manifest_with(&["eventlog"]);
        let clock = Arc::new(FakeClock::new(0.0));
        let store = Arc::new(StateStore::new(SystemState::default(), 100));
        store.publish_events(vec![Event::new(0.0, "kernel", Lvl::Info, "FEEDER_ON", "x")]);
        let mut runner = AuxRunner::new(&manifest, dir.path(), clock, store.clone()).unwrap();
        runner.tick();
        assert_eq!(runner.own_cursor, 1);

        // A second tick with no new events should not re-surface the first.
        runner.tick();
        assert_eq!(runner.own_cursor, 1);
    }
}
