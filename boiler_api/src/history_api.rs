//! `GET /api/history/data?from_ts&to_ts&fields=…`, `GET /api/history/fields` (§6).
//!
//! Reads the hourly `boiler_YYYYMMDD_HH.csv` rotation directly (§6's
//! on-disk format) rather than through `boiler_kernel::history`'s
//! private helpers — the CSV layout is the stable contract here, not
//! the writer's internals.

use crate::error::ApiError;
use boiler_kernel::history::HistoryConfig;
use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use std::path::PathBuf;

pub const FIELDS: [&str; 5] = ["temp_pieca", "power", "temp_grzejnikow", "temp_spalin", "tryb_pracy"];

#[derive(Debug, Clone, Serialize)]
pub struct HistoryRow {
    pub data_czas: String,
    pub values: Vec<Option<String>>,
}

pub fn list_fields() -> Vec<&'static str> {
    FIELDS.to_vec()
}

fn hourly_file(log_dir: &std::path::Path, hour_start: DateTime<Utc>) -> PathBuf {
    log_dir.join(format!("boiler_{}.csv", hour_start.format("%Y%m%d_%H")))
}

/// Every hour boundary in `[from_ts, to_ts]`, inclusive of the hour `from_ts` falls in.
fn hour_range(from_ts: f64, to_ts: f64) -> Result<Vec<DateTime<Utc>>, ApiError> {
    if to_ts < from_ts {
        return Err(ApiError::BadQuery("to_ts must be >= from_ts".into()));
    }
    let from = DateTime::<Utc>::from_timestamp(from_ts as i64, 0)
        .ok_or_else(|| ApiError::BadQuery("from_ts out of range".into()))?;
    let to = DateTime::<Utc>::from_timestamp(to_ts as i64, 0)
        .ok_or_else(|| ApiError::BadQuery("to_ts out of range".into()))?;

    let mut hours = Vec::new();
    let mut cursor = from.date_naive().and_hms_opt(from.hour(), 0, 0).unwrap().and_utc();
    while cursor <= to {
        hours.push(cursor);
        cursor += chrono::Duration::hours(1);
    }
    Ok(hours)
}

/// Rows within `[from_ts, to_ts]`, each projected down to `fields` (in
/// `FIELDS` order; unknown field names are silently ignored, matching
/// the PUT-config "unrecognized keys ignored" convention elsewhere).
pub fn query_data(
    config: &HistoryConfig,
    from_ts: f64,
    to_ts: f64,
    fields: &[&str],
) -> Result<Vec<HistoryRow>, ApiError> {
    let wanted: Vec<usize> = fields
        .iter()
        .filter_map(|f| FIELDS.iter().position(|c| c == f))
        .collect();

    let mut rows = Vec::new();
    for hour in hour_range(from_ts, to_ts)? {
        let path = hourly_file(&config.log_dir, hour);
        let Ok(file) = std::fs::File::open(&path) else { continue };
        let mut reader = csv::ReaderBuilder::new().delimiter(b';').has_headers(true).from_reader(file);
        for record in reader.records().filter_map(|r| r.ok()) {
            if record.len() != 6 {
                continue;
            }
            let data_czas = record[0].to_string();
            let ts: f64 = DateTime::parse_from_rfc3339(&data_czas)
                .map(|dt| dt.timestamp() as f64)
                .unwrap_or(f64::NAN);
            if ts.is_nan() || ts < from_ts || ts > to_ts {
                continue;
            }
            let values = wanted
                .iter()
                .map(|&i| {
                    let cell = record[i + 1].to_string();
                    if cell.is_empty() { None } else { Some(cell) }
                })
                .collect();
            rows.push(HistoryRow { data_czas, values });
        }
    }
    Ok(rows)
}
