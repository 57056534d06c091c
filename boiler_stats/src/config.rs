//! Calibration and file-layout configuration for the statistics engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatsConfig {
    /// Nominal feeder throughput, used to convert `feeder_on` time into
    /// a coal mass estimate. Zero until an operator calibrates it for
    /// their hopper/auger.
    pub feeder_kg_per_hour: f64,
    /// Lower heating value of the fuel, MJ/kg. Zero disables the energy
    /// (kWh) columns without disabling the mass (kg) ones.
    pub calorific_mj_per_kg: f64,

    pub log_dir: PathBuf,
    pub daily_file: String,
    pub state_file: String,

    /// IANA zone name, carried for display/reporting purposes. Day
    /// rollover itself is computed against UTC calendar days — this
    /// workspace does not depend on a tz-database crate.
    pub timezone: String,

    pub season_start_month: u32,
    pub season_start_day: u32,
    pub bars_days: u32,
    pub publish_compare_bars: bool,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            feeder_kg_per_hour: 10.0,
            calorific_mj_per_kg: 0.0,
            log_dir: PathBuf::from("data"),
            daily_file: "stats_daily.csv".to_string(),
            state_file: "stats_state.yaml".to_string(),
            timezone: "Europe/Warsaw".to_string(),
            season_start_month: 9,
            season_start_day: 1,
            bars_days: 30,
            publish_compare_bars: true,
        }
    }
}
