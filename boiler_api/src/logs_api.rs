//! `GET /api/logs/data?…`, `GET /api/logs/recent?limit&level&source&type`,
//! `GET /api/logs/fields` (§6).
//!
//! `recent` serves straight out of `SystemState.recent_events` (already
//! bounded, already in memory); `data` scans the daily
//! `events_YYYYMMDD.csv` rotation for ranges outside that tail.

use crate::error::ApiError;
use boiler_core::{Event, EventLevel, StateStore};
use boiler_kernel::eventlog::EventLogConfig;
use chrono::{DateTime, Utc};

pub const FIELDS: [&str; 6] = ["ts_epoch", "level", "source", "type", "message", "data_json"];

pub fn list_fields() -> Vec<&'static str> {
    FIELDS.to_vec()
}

fn parse_level(s: &str) -> Result<EventLevel, ApiError> {
    match s.to_ascii_uppercase().as_str() {
        "INFO" => Ok(EventLevel::Info),
        "WARNING" => Ok(EventLevel::Warning),
        "ERROR" => Ok(EventLevel::Error),
        "ALARM" => Ok(EventLevel::Alarm),
        other => Err(ApiError::BadQuery(format!("unknown level: {other}"))),
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecentFilter {
    pub limit: Option<usize>,
    pub level: Option<String>,
    pub source: Option<String>,
    pub event_type: Option<String>,
}

/// `SystemState.recent_events`, newest first, filtered and capped at `limit`.
pub fn recent(store: &StateStore, filter: &RecentFilter) -> Result<Vec<Event>, ApiError> {
    let level = filter.level.as_deref().map(parse_level).transpose()?;
    let snapshot = store.snapshot();
    let mut events: Vec<Event> = snapshot
        .recent_events
        .iter()
        .rev()
        .filter(|e| level.map(|lvl| e.level == lvl).unwrap_or(true))
        .filter(|e| filter.source.as_deref().map(|s| e.source == s).unwrap_or(true))
        .filter(|e| filter.event_type.as_deref().map(|t| e.event_type == t).unwrap_or(true))
        .cloned()
        .collect();
    if let Some(limit) = filter.limit {
        events.truncate(limit);
    }
    Ok(events)
}

fn daily_file(log_dir: &std::path::Path, prefix: &str, day: DateTime<Utc>) -> std::path::PathBuf {
    log_dir.join(format!("{prefix}_{}.csv", day.format("%Y%m%d")))
}

#[derive(Debug, Clone)]
pub struct LogRow {
    pub ts_epoch: i64,
    pub level: String,
    pub source: String,
    pub event_type: String,
    pub message: String,
    pub data_json: String,
}

/// Scan the daily event-log CSV rotation for rows in `[from_ts, to_ts]`.
pub fn query_data(config: &EventLogConfig, from_ts: f64, to_ts: f64) -> Result<Vec<LogRow>, ApiError> {
    if to_ts < from_ts {
        return Err(ApiError::BadQuery("to_ts must be >= from_ts".into()));
    }
    let from = DateTime::<Utc>::from_timestamp(from_ts as i64, 0)
        .ok_or_else(|| ApiError::BadQuery("from_ts out of range".into()))?;
    let to = DateTime::<Utc>::from_timestamp(to_ts as i64, 0)
        .ok_or_else(|| ApiError::BadQuery("to_ts out of range".into()))?;

    let mut rows = Vec::new();
    let mut day = from.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
    while day <= to {
        let path = daily_file(&config.log_dir, &config.file_prefix, day);
        if let Ok(file) = std::fs::File::open(&path) {
            let mut reader = csv::ReaderBuilder::new().delimiter(b';').has_headers(true).from_reader(file);
            for record in reader.records().filter_map(|r| r.ok()) {
                if record.len() != 7 {
                    continue;
                }
                let Ok(ts_epoch) = record[1].parse::<i64>() else { continue };
                if (ts_epoch as f64) < from_ts || (ts_epoch as f64) > to_ts {
                    continue;
                }
                rows.push(LogRow {
                    ts_epoch,
                    level: record[2].to_string(),
                    source: record[3].to_string(),
                    event_type: record[4].to_string(),
                    message: record[5].to_string(),
                    data_json: record[6].to_string(),
                });
            }
        }
        day += chrono::Duration::days(1);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use boiler_core::SystemState;

    #[test]
    fn recent_filters_by_level_and_respects_limit() {
        let mut state = SystemState::default();
        state.push_recent_event(Event::new(1.0, "kernel", EventLevel::Info, "A", "a"));
        state.push_recent_event(Event::new(2.0, "kernel", EventLevel::Error, "B", "b"));
        state.push_recent_event(Event::new(3.0, "safety", EventLevel::Alarm, "C", "c"));
        let store = StateStore::new(state, 10);

        let errors_only = recent(&store, &RecentFilter { level: Some("ERROR".into()), ..Default::default() }).unwrap();
        assert_eq!(errors_only.len(), 1);
        assert_eq!(errors_only[0].event_type, "B");

        let capped = recent(&store, &RecentFilter { limit: Some(1), ..Default::default() }).unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].event_type, "C", "newest event must come first");
    }

    #[test]
    fn recent_rejects_unknown_level() {
        let store = StateStore::new(SystemState::default(), 10);
        let err = recent(&store, &RecentFilter { level: Some("CRITICAL".into()), ..Default::default() }).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn query_data_reads_rows_within_range_from_daily_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = EventLogConfig { log_dir: dir.path().to_path_buf(), file_prefix: "events".into() };
        let path = dir.path().join("events_20260101.csv");
        std::fs::write(
            &path,
            "data_czas;ts_epoch;level;source;type;message;data_json\n2026-01-01T00:00:10+00:00;10;INFO;kernel;FEEDER_ON;x;{}\n",
        )
        .unwrap();
        let rows = query_data(&config, 0.0, 3600.0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type, "FEEDER_ON");
    }
}
