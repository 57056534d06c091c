//! Maps a manifest entry's `id` to the concrete module it names.
//!
//! The mapping is a flat `match`, not a trait-object plugin system — the
//! full set of ids is fixed and known at compile time, the same way the
//! teacher's driver registry resolves a handful of named hardware
//! drivers by string.

use crate::eventlog::EventLogModule;
use crate::history::HistoryModule;
use boiler_core::{BoilerMode, ModuleInterface};
use boiler_modules::power::ignition::{IgnitionConfig, IgnitionLaw};
use boiler_modules::power::work_fuzzy::{FuzzyConfig, WorkFuzzyLaw};
use boiler_modules::power::work_neuro_fuzzy::{NeuroFuzzyConfig, WorkNeuroFuzzyLaw};
use boiler_modules::power::work_pi::{WorkPiConfig, WorkPiLaw};
use boiler_modules::power::work_predictive::{WorkPredictiveConfig, WorkPredictiveLaw};
use boiler_modules::power::PowerRegulatorModule;
use boiler_modules::{
    BlowerModule, FeederModule, HysteresisPump, ManualModule, MixerModule, ModeModule,
    OverheatModule, PumpKind, SafetyModule,
};
use boiler_stats::StatsModule;
use std::path::Path;

/// Instantiate the module named by `id`, loading its on-disk config from
/// `<config_dir>/<id>/values.yaml` (or defaults, if absent).
pub fn build_module(id: &str, config_dir: &Path) -> Option<Box<dyn ModuleInterface>> {
    let dir = config_dir.to_path_buf();
    Some(match id {
        ModeModule::ID => Box::new(ModeModule::new(dir)),
        OverheatModule::ID => Box::new(OverheatModule::new(dir)),
        ManualModule::ID => Box::new(ManualModule::new()),
        SafetyModule::ID => Box::new(SafetyModule::new(dir)),
        FeederModule::ID => Box::new(FeederModule::new(dir)),
        BlowerModule::ID => Box::new(BlowerModule::new(dir)),
        MixerModule::ID => Box::new(MixerModule::new(dir)),
        "pump_co" => Box::new(HysteresisPump::new(PumpKind::Co, dir)),
        "pump_cwu" => Box::new(HysteresisPump::new(PumpKind::Cwu, dir)),
        "ignition" => {
            let cfg: IgnitionConfig = boiler_modules::config_support::load_or_default(&dir, "ignition");
            Box::new(PowerRegulatorModule::new("ignition", BoilerMode::Ignition, IgnitionLaw::new(cfg)))
        }
        "work_pi" => {
            let cfg: WorkPiConfig = boiler_modules::config_support::load_or_default(&dir, "work_pi");
            Box::new(PowerRegulatorModule::new("work_pi", BoilerMode::Work, WorkPiLaw::new(cfg)))
        }
        "work_fuzzy" => {
            let cfg: FuzzyConfig = boiler_modules::config_support::load_or_default(&dir, "work_fuzzy");
            Box::new(PowerRegulatorModule::new("work_fuzzy", BoilerMode::Work, WorkFuzzyLaw::new(cfg)))
        }
        "work_neuro_fuzzy" => {
            let cfg: NeuroFuzzyConfig =
                boiler_modules::config_support::load_or_default(&dir, "work_neuro_fuzzy");
            Box::new(PowerRegulatorModule::new(
                "work_neuro_fuzzy",
                BoilerMode::Work,
                WorkNeuroFuzzyLaw::new(cfg),
            ))
        }
        "work_predictive" => {
            let cfg: WorkPredictiveConfig =
                boiler_modules::config_support::load_or_default(&dir, "work_predictive");
            Box::new(PowerRegulatorModule::new(
                "work_predictive",
                BoilerMode::Work,
                WorkPredictiveLaw::new(cfg),
            ))
        }
        "stats" => {
            let cfg = boiler_modules::config_support::load_or_default(&dir, "stats");
            Box::new(StatsModule::new(cfg))
        }
        HistoryModule::ID => Box::new(HistoryModule::new(dir)),
        EventLogModule::ID => Box::new(EventLogModule::new(dir)),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn every_documented_id_resolves() {
        let dir = tempdir().unwrap();
        for id in [
            "mode",
            "overheat",
            "manual",
            "safety",
            "feeder",
            "blower",
            "mixer",
            "pump_co",
            "pump_cwu",
            "ignition",
            "work_pi",
            "work_fuzzy",
            "work_neuro_fuzzy",
            "work_predictive",
            "stats",
            "history",
            "eventlog",
        ] {
            let module = build_module(id, dir.path());
            assert!(module.is_some(), "expected {id} to resolve");
            assert_eq!(module.unwrap().id(), id);
        }
    }

    #[test]
    fn unknown_id_resolves_to_none() {
        let dir = tempdir().unwrap();
        assert!(build_module("not_a_real_module", dir.path()).is_none());
    }
}
