//! The statistics module: integrates `feeder_on` into 5-minute buckets,
//! rolls them into a 7-day ring and a daily accumulator, and answers
//! rolling/compare-bar/season queries over what's accumulated so far.
//!
//! Registered as a non-critical (auxiliary-loop) module. It never sets
//! any `PartialOutputs` field — its only job is bookkeeping and CSV/YAML
//! persistence — but it does emit events at bucket close and day
//! rollover.

use crate::bucket::{Bucket5m, DayAccumulator, WindowAgg, BUCKET_SECONDS};
use crate::config::StatsConfig;
use boiler_common::config::{load_yaml_opt, save_yaml_atomic};
use boiler_common::consts::STATS_RING_CAPACITY;
use boiler_core::module_interface::{ModuleError, ModuleInterface, ModuleTickResult};
use boiler_core::types::{Event, EventLevel, PartialOutputs, Sensors, SystemState};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialBucket {
    start_mono: Option<f64>,
    accum_seconds: f64,
    accum_coal_kg: f64,
    accum_energy_kwh: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedState {
    partial: PartialBucket,
    day: Option<DayAccumulator>,
    ring: Vec<Bucket5m>,
}

pub struct StatsModule {
    config: StatsConfig,
    partial: PartialBucket,
    day: Option<DayAccumulator>,
    ring: VecDeque<Bucket5m>,
}

fn day_key(ts_wall: f64) -> String {
    DateTime::<Utc>::from_timestamp(ts_wall as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "1970-01-01".to_string())
}

fn state_path(config: &StatsConfig) -> PathBuf {
    config.log_dir.join(&config.state_file)
}

fn daily_csv_path(config: &StatsConfig) -> PathBuf {
    config.log_dir.join(&config.daily_file)
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(0, 0).expect("unix epoch is always a representable timestamp")
}

fn bucket_csv_path(config: &StatsConfig, ts_wall: f64) -> PathBuf {
    let dt = DateTime::<Utc>::from_timestamp(ts_wall as i64, 0).unwrap_or_else(unix_epoch);
    config
        .log_dir
        .join(format!("stats5m_{}.csv", dt.format("%Y%m%d_%H")))
}

fn append_bucket_row(path: &Path, bucket: &Bucket5m) -> Result<(), csv::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let needs_header = !path.exists();
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .from_writer(file);
    if needs_header {
        writer.write_record([
            "ts_end_iso",
            "ts_end_unix",
            "seconds",
            "coal_kg",
            "energy_kwh",
            "burn_kgph",
            "power_kw",
        ])?;
    }
    let iso = DateTime::<Utc>::from_timestamp(bucket.ts_end_wall as i64, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default();
    writer.write_record([
        iso,
        (bucket.ts_end_wall as i64).to_string(),
        format!("{:.1}", bucket.seconds),
        format!("{:.4}", bucket.coal_kg),
        format!("{:.4}", bucket.energy_kwh),
        format!("{:.3}", bucket.burn_kgph()),
        format!("{:.3}", bucket.power_kw()),
    ])?;
    writer.flush()?;
    Ok(())
}

const DAILY_HEADER: [&str; 7] = [
    "date",
    "seconds_active",
    "coal_kg",
    "energy_kwh",
    "buckets_closed",
    "max_5m_energy_kwh",
    "min_5m_energy_kwh_active",
];

fn read_daily_rows(path: &Path) -> Vec<DayAccumulator> {
    let Ok(file) = std::fs::File::open(path) else {
        return Vec::new();
    };
    let mut reader = csv::ReaderBuilder::new().delimiter(b';').has_headers(true).from_reader(file);
    reader
        .records()
        .filter_map(|r| r.ok())
        .filter_map(|record| parse_daily_record(&record))
        .collect()
}

fn parse_daily_record(record: &csv::StringRecord) -> Option<DayAccumulator> {
    if record.len() != 7 {
        return None;
    }
    Some(DayAccumulator {
        date: record[0].to_string(),
        seconds_active: record[1].parse().ok()?,
        coal_kg: record[2].parse().ok()?,
        energy_kwh: record[3].parse().ok()?,
        buckets_closed: record[4].parse().ok()?,
        max_5m_energy_kwh: record[5].parse().ok(),
        min_5m_energy_kwh_active: record[6].parse().ok(),
    })
}

/// Upsert `day`'s row into the daily CSV, keyed by date. Rewrites the
/// whole file through a temp path + rename for atomicity, same pattern
/// as the YAML state helpers.
fn upsert_daily_row(path: &Path, day: &DayAccumulator) -> Result<(), csv::Error> {
    let mut rows = read_daily_rows(path);
    if let Some(existing) = rows.iter_mut().find(|r| r.date == day.date) {
        *existing = day.clone();
    } else {
        rows.push(day.clone());
    }
    rows.sort_by(|a, b| a.date.cmp(&b.date));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .from_path(&tmp_path)?;
        writer.write_record(DAILY_HEADER)?;
        for row in &rows {
            writer.write_record([
                row.date.clone(),
                format!("{:.1}", row.seconds_active),
                format!("{:.4}", row.coal_kg),
                format!("{:.4}", row.energy_kwh),
                row.buckets_closed.to_string(),
                row.max_5m_energy_kwh.map(|v| format!("{:.4}", v)).unwrap_or_default(),
                row.min_5m_energy_kwh_active.map(|v| format!("{:.4}", v)).unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

impl StatsModule {
    pub fn new(config: StatsConfig) -> Self {
        let restored = load_yaml_opt::<PersistedState>(&state_path(&config)).ok().flatten();
        let (partial, day, ring) = match restored {
            Some(s) => (s.partial, s.day, VecDeque::from(s.ring)),
            None => (PartialBucket::default(), None, VecDeque::new()),
        };
        Self { config, partial, day, ring }
    }

    fn persist(&self) {
        let snapshot = PersistedState {
            partial: self.partial.clone(),
            day: self.day.clone(),
            ring: self.ring.iter().copied().collect(),
        };
        let _ = save_yaml_atomic(&state_path(&self.config), &snapshot);
    }

    fn kg_per_s(&self) -> f64 {
        self.config.feeder_kg_per_hour / 3_600.0
    }

    fn kwh_per_kg(&self) -> f64 {
        // 1 MJ = 1/3.6 kWh.
        self.config.calorific_mj_per_kg / 3.6
    }

    fn close_bucket(&mut self, ts_wall: f64, ts_mono: f64) -> Vec<Event> {
        let mut events = Vec::new();
        let bucket = Bucket5m {
            ts_end_wall: ts_wall,
            ts_end_mono: ts_mono,
            seconds: self.partial.accum_seconds,
            coal_kg: self.partial.accum_coal_kg,
            energy_kwh: self.partial.accum_energy_kwh,
        };
        self.partial = PartialBucket::default();

        let _ = append_bucket_row(&bucket_csv_path(&self.config, ts_wall), &bucket);

        self.ring.push_back(bucket);
        while self.ring.len() > STATS_RING_CAPACITY {
            self.ring.pop_front();
        }

        events.push(Event::new(
            ts_wall,
            "stats",
            EventLevel::Info,
            "STATS_BUCKET_CLOSED",
            format!("closed 5m bucket: {:.3} kg, {:.3} kWh", bucket.coal_kg, bucket.energy_kwh),
        ));

        let key = day_key(ts_wall);
        let rolled_over = match &self.day {
            Some(day) if day.date != key => true,
            None => false,
            _ => false,
        };
        if rolled_over {
            let finished = self.day.take().unwrap();
            let _ = upsert_daily_row(&daily_csv_path(&self.config), &finished);
            events.push(Event::new(
                ts_wall,
                "stats",
                EventLevel::Info,
                "STATS_DAY_ROLLOVER",
                format!("day {} closed: {:.3} kg, {:.3} kWh", finished.date, finished.coal_kg, finished.energy_kwh),
            ));
        }
        let day = self.day.get_or_insert_with(|| DayAccumulator::new(key));
        day.absorb(&bucket);
        let _ = upsert_daily_row(&daily_csv_path(&self.config), day);

        self.persist();
        events
    }

    /// Aggregate the last `n` closed buckets. `None` if fewer than `n`
    /// have closed yet.
    pub fn rolling(&self, n: usize) -> Option<WindowAgg> {
        if self.ring.len() < n || n == 0 {
            return None;
        }
        let slice: Vec<Bucket5m> = self.ring.iter().rev().take(n).copied().collect();
        Some(WindowAgg::from_buckets(&slice))
    }

    /// A compare bar: the aggregate over `[floor_to_5min(now - offset_s -
    /// duration_s), floor_to_5min(now - offset_s)]`, read by actual
    /// bucket end-timestamp rather than ring position, so it answers
    /// "what was happening `offset_s` ago" regardless of how full the
    /// ring is.
    pub fn compare_bar(&self, now_wall: f64, offset_s: f64, duration_s: f64) -> Option<WindowAgg> {
        if duration_s <= 0.0 {
            return None;
        }
        let floor_5m = |ts: f64| (ts / BUCKET_SECONDS).floor() * BUCKET_SECONDS;
        let upper = floor_5m(now_wall - offset_s);
        let lower = floor_5m(now_wall - offset_s - duration_s);
        if upper <= lower {
            return None;
        }
        let slice: Vec<Bucket5m> = self
            .ring
            .iter()
            .filter(|b| b.ts_end_wall > lower && b.ts_end_wall <= upper)
            .copied()
            .collect();
        if slice.is_empty() {
            return None;
        }
        Some(WindowAgg::from_buckets(&slice))
    }

    /// Total accumulated since the configured season start, scanning the
    /// daily CSV plus the in-progress day.
    pub fn season_aggregate(&self, now_wall: f64) -> WindowAgg {
        let now = DateTime::<Utc>::from_timestamp(now_wall as i64, 0).unwrap_or_else(unix_epoch);
        let mut season_start = now
            .date_naive()
            .with_month(self.config.season_start_month)
            .and_then(|d| d.with_day(self.config.season_start_day))
            .unwrap_or(now.date_naive());
        if season_start > now.date_naive() {
            season_start = season_start
                .with_year(season_start.year() - 1)
                .unwrap_or(season_start);
        }

        let mut agg = WindowAgg { seconds: 0.0, coal_kg: 0.0, energy_kwh: 0.0, bucket_count: 0 };
        for row in read_daily_rows(&daily_csv_path(&self.config)) {
            if let Ok(date) = chrono::NaiveDate::parse_from_str(&row.date, "%Y-%m-%d") {
                if date >= season_start {
                    agg.seconds += row.seconds_active;
                    agg.coal_kg += row.coal_kg;
                    agg.energy_kwh += row.energy_kwh;
                    agg.bucket_count += row.buckets_closed as usize;
                }
            }
        }
        if let Some(day) = &self.day {
            agg.seconds += day.seconds_active;
            agg.coal_kg += day.coal_kg;
            agg.energy_kwh += day.energy_kwh;
            agg.bucket_count += day.buckets_closed as usize;
        }
        agg
    }

    pub fn ring_len(&self) -> usize {
        self.ring.len()
    }
}

impl ModuleInterface for StatsModule {
    fn id(&self) -> &str {
        "stats"
    }

    fn tick(
        &mut self,
        now_wall: f64,
        _sensors: &Sensors,
        system_state: &SystemState,
    ) -> Result<ModuleTickResult, ModuleError> {
        let now_mono = system_state.ts_mono;
        if self.partial.start_mono.is_none() {
            self.partial.start_mono = Some(now_mono);
        }
        let start = self.partial.start_mono.unwrap();
        let elapsed_in_bucket = now_mono - start;

        // dt since the previous tick is implicit: we integrate the gap
        // between the last recorded `accum_seconds` and now directly,
        // which is robust to the aux loop's own jitter.
        let dt = (elapsed_in_bucket - self.partial.accum_seconds).max(0.0);
        if system_state.outputs.feeder_on {
            self.partial.accum_seconds += dt;
            self.partial.accum_coal_kg += dt * self.kg_per_s();
            self.partial.accum_energy_kwh += dt * self.kg_per_s() * self.kwh_per_kg();
        } else {
            self.partial.accum_seconds += dt;
        }

        let mut events = Vec::new();
        if elapsed_in_bucket >= BUCKET_SECONDS {
            self.partial.start_mono = Some(now_mono);
            events = self.close_bucket(now_wall, now_mono);
        }

        Ok(ModuleTickResult::new(PartialOutputs::default()).with_events(events))
    }

    fn get_config_schema(&self) -> Value {
        json!({
            "feeder_kg_per_hour": { "type": "float", "unit": "kg/h", "default": 10.0 },
            "calorific_mj_per_kg": { "type": "float", "unit": "MJ/kg", "default": 0.0 },
            "bars_days": { "type": "int", "default": 30 },
            "season_start_month": { "type": "int", "min": 1, "max": 12, "default": 9 },
            "season_start_day": { "type": "int", "min": 1, "max": 31, "default": 1 },
        })
    }

    fn get_config_values(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or(Value::Null)
    }

    fn set_config_values(&mut self, values: &Value, persist: bool) -> Result<(), ModuleError> {
        let current = serde_json::to_value(&self.config).map_err(|e| ModuleError::Config(
            boiler_common::ConfigError::ParseError(e.to_string()),
        ))?;
        let mut map = match current {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        if let Value::Object(patch) = values {
            for (k, v) in patch {
                if map.contains_key(k) {
                    map.insert(k.clone(), v.clone());
                }
            }
        }
        self.config = serde_json::from_value(Value::Object(map))
            .map_err(|e| ModuleError::Config(boiler_common::ConfigError::ParseError(e.to_string())))?;
        if persist {
            // Config values for this module are a calibration file, not
            // resumable state; left to the config-API layer to persist
            // via the generic values.yaml path.
        }
        Ok(())
    }
}
