//! # Boiler Stats
//!
//! The fuel/energy statistics engine: closes 5-minute integration
//! buckets off the `feeder_on` signal, keeps a 7-day ring of them for
//! rolling and compare-bar queries, and maintains a daily accumulator
//! upserted to CSV at rollover. Registered as an auxiliary-loop module.

pub mod bucket;
pub mod config;
pub mod engine;

pub use bucket::{Bucket5m, DayAccumulator, WindowAgg};
pub use config::StatsConfig;
pub use engine::StatsModule;
