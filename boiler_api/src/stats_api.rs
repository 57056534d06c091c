//! `GET /api/stats/data?fields=…`, `GET /api/stats/series?from_ts&to_ts&fields`,
//! `GET /api/stats/daily?from_date&to_date` (§6).
//!
//! `data` reads the running engine's live rolling/seasonal/compare-bar
//! aggregates (needs a `&StatsModule`, held by the caller — `AuxRunner`
//! only exposes it as `Box<dyn ModuleInterface>`, so a live "current"
//! query requires the supervisor to keep its own `Arc<StatsModule>`
//! handle alongside the one handed to the manifest; out of scope for
//! this handler layer). `series`/`daily` read the on-disk CSV rotation
//! directly, which needs no live handle at all.

use crate::error::ApiError;
use boiler_stats::{StatsConfig, StatsModule, WindowAgg};
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::Serialize;

/// Standard compare-bar offsets (§4.10): `{-5m,-10m,-15m}`, `{-1h,-2h,-3h}`,
/// `{-1d,-2d,-3d}`, each a one-bucket (5-minute) window ending at
/// `floor_to_5min(now - offset)`.
const COMPARE_OFFSETS_S: [f64; 9] = [
    300.0, 600.0, 900.0, 3_600.0, 7_200.0, 10_800.0, 86_400.0, 172_800.0, 259_200.0,
];

/// Evaluate the standard compare-bar set against a live engine handle.
/// `None` entries are offsets the ring doesn't cover yet (too early in
/// the 7-day window, or no bucket closed in that slot).
pub fn standard_compare_bars(stats: &StatsModule, now_wall: f64) -> Vec<(f64, Option<WindowAgg>)> {
    COMPARE_OFFSETS_S
        .iter()
        .map(|&offset_s| (offset_s, stats.compare_bar(now_wall, offset_s, boiler_common::consts::STATS_BUCKET_SECONDS)))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesPoint {
    pub ts_end_iso: String,
    pub ts_end_unix: i64,
    pub seconds: f64,
    pub coal_kg: f64,
    pub energy_kwh: f64,
    pub burn_kgph: f64,
    pub power_kw: f64,
}

fn bucket_hours(from_ts: f64, to_ts: f64) -> Result<Vec<DateTime<Utc>>, ApiError> {
    if to_ts < from_ts {
        return Err(ApiError::BadQuery("to_ts must be >= from_ts".into()));
    }
    let from = DateTime::<Utc>::from_timestamp(from_ts as i64, 0)
        .ok_or_else(|| ApiError::BadQuery("from_ts out of range".into()))?;
    let to = DateTime::<Utc>::from_timestamp(to_ts as i64, 0)
        .ok_or_else(|| ApiError::BadQuery("to_ts out of range".into()))?;
    let mut cursor = from.date_naive().and_hms_opt(from.hour(), 0, 0).unwrap().and_utc();
    let mut hours = Vec::new();
    while cursor <= to {
        hours.push(cursor);
        cursor += chrono::Duration::hours(1);
    }
    Ok(hours)
}

/// Read 5-minute bucket rows from the `stats5m_YYYYMMDD_HH.csv` hourly
/// rotation within `[from_ts, to_ts]`.
pub fn series(config: &StatsConfig, from_ts: f64, to_ts: f64) -> Result<Vec<SeriesPoint>, ApiError> {
    let mut points = Vec::new();
    for hour in bucket_hours(from_ts, to_ts)? {
        let path = config.log_dir.join(format!("stats5m_{}.csv", hour.format("%Y%m%d_%H")));
        let Ok(file) = std::fs::File::open(&path) else { continue };
        let mut reader = csv::ReaderBuilder::new().delimiter(b';').has_headers(true).from_reader(file);
        for record in reader.records().filter_map(|r| r.ok()) {
            if record.len() != 7 {
                continue;
            }
            let Ok(ts_end_unix) = record[1].parse::<i64>() else { continue };
            if (ts_end_unix as f64) < from_ts || (ts_end_unix as f64) > to_ts {
                continue;
            }
            points.push(SeriesPoint {
                ts_end_iso: record[0].to_string(),
                ts_end_unix,
                seconds: record[2].parse().unwrap_or(0.0),
                coal_kg: record[3].parse().unwrap_or(0.0),
                energy_kwh: record[4].parse().unwrap_or(0.0),
                burn_kgph: record[5].parse().unwrap_or(0.0),
                power_kw: record[6].parse().unwrap_or(0.0),
            });
        }
    }
    Ok(points)
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyRow {
    pub date: String,
    pub seconds_active: f64,
    pub coal_kg: f64,
    pub energy_kwh: f64,
    pub buckets_closed: u32,
}

/// Read `stats_daily.csv`, filtered to `[from_date, to_date]` (`YYYY-MM-DD`, inclusive).
pub fn daily(config: &StatsConfig, from_date: NaiveDate, to_date: NaiveDate) -> Result<Vec<DailyRow>, ApiError> {
    if to_date < from_date {
        return Err(ApiError::BadQuery("to_date must be >= from_date".into()));
    }
    let path = config.log_dir.join(&config.daily_file);
    let Ok(file) = std::fs::File::open(&path) else { return Ok(Vec::new()) };
    let mut reader = csv::ReaderBuilder::new().delimiter(b';').has_headers(true).from_reader(file);
    let mut rows = Vec::new();
    for record in reader.records().filter_map(|r| r.ok()) {
        if record.len() != 7 {
            continue;
        }
        let Ok(date) = NaiveDate::parse_from_str(&record[0], "%Y-%m-%d") else { continue };
        if date < from_date || date > to_date {
            continue;
        }
        rows.push(DailyRow {
            date: record[0].to_string(),
            seconds_active: record[1].parse().unwrap_or(0.0),
            coal_kg: record[2].parse().unwrap_or(0.0),
            energy_kwh: record[3].parse().unwrap_or(0.0),
            buckets_closed: record[4].parse().unwrap_or(0),
        });
    }
    Ok(rows)
}

/// Live snapshot from a running engine instance — the "current" half of
/// `/api/stats/data`; see module doc for why the caller must supply it.
/// `compare` is `None` when `StatsConfig::publish_compare_bars` is off.
pub fn live_snapshot(
    rolling: Option<WindowAgg>,
    season: WindowAgg,
    compare: Option<Vec<(f64, Option<WindowAgg>)>>,
) -> serde_json::Value {
    let compare_json = compare.map(|bars| {
        bars.into_iter()
            .map(|(offset_s, agg)| serde_json::json!({ "offset_s": offset_s, "agg": agg }))
            .collect::<Vec<_>>()
    });
    serde_json::json!({ "rolling": rolling, "season": season, "compare": compare_json })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn series_reads_rows_within_range() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("stats5m_20260101_00.csv"),
            "ts_end_iso;ts_end_unix;seconds;coal_kg;energy_kwh;burn_kgph;power_kw\n2026-01-01T00:05:00+00:00;300;300.0;1.0;5.0;12.0;18.0\n",
        )
        .unwrap();
        let mut config = StatsConfig::default();
        config.log_dir = dir.path().to_path_buf();
        let points = series(&config, 0.0, 600.0).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].coal_kg, 1.0);
    }

    #[test]
    fn daily_reads_rows_within_date_range() {
        let dir = tempdir().unwrap();
        let mut config = StatsConfig::default();
        config.log_dir = dir.path().to_path_buf();
        std::fs::write(
            dir.path().join(&config.daily_file),
            "date;seconds_active;coal_kg;energy_kwh;buckets_closed;max_5m_energy_kwh;min_5m_energy_kwh_active\n2026-01-01;3600.0;10.0;50.0;12;;\n",
        )
        .unwrap();
        let from = NaiveDate::parse_from_str("2026-01-01", "%Y-%m-%d").unwrap();
        let to = NaiveDate::parse_from_str("2026-01-02", "%Y-%m-%d").unwrap();
        let rows = daily(&config, from, to).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].buckets_closed, 12);
    }

    #[test]
    fn daily_missing_file_returns_empty() {
        let dir = tempdir().unwrap();
        let mut config = StatsConfig::default();
        config.log_dir = dir.path().to_path_buf();
        let from = NaiveDate::parse_from_str("2026-01-01", "%Y-%m-%d").unwrap();
        assert!(daily(&config, from, from).unwrap().is_empty());
    }

    #[test]
    fn standard_compare_bars_covers_every_offset_slot() {
        let dir = tempdir().unwrap();
        let mut cfg = StatsConfig::default();
        cfg.log_dir = dir.path().to_path_buf();
        let stats = StatsModule::new(cfg);
        let bars = standard_compare_bars(&stats, 1_700_000_000.0);
        assert_eq!(bars.len(), COMPARE_OFFSETS_S.len());
        assert!(bars.iter().all(|(_, agg)| agg.is_none()), "nothing closed yet on a fresh engine");
    }

    #[test]
    fn live_snapshot_omits_compare_when_not_requested() {
        let season = WindowAgg { seconds: 0.0, coal_kg: 0.0, energy_kwh: 0.0, bucket_count: 0 };
        let snapshot = live_snapshot(None, season, None);
        assert!(snapshot["compare"].is_null());
    }
}
