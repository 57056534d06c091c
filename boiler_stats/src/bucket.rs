//! A closed 5-minute bucket and the daily accumulator it feeds.

use boiler_common::consts::STATS_BUCKET_SECONDS;
use serde::{Deserialize, Serialize};

/// One closed 5-minute integration window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bucket5m {
    pub ts_end_wall: f64,
    pub ts_end_mono: f64,
    pub seconds: f64,
    pub coal_kg: f64,
    pub energy_kwh: f64,
}

impl Bucket5m {
    /// Mean burn rate over the bucket, kg/h.
    pub fn burn_kgph(&self) -> f64 {
        if self.seconds <= 0.0 {
            0.0
        } else {
            self.coal_kg / (self.seconds / 3_600.0)
        }
    }

    /// Mean thermal power over the bucket, kW.
    pub fn power_kw(&self) -> f64 {
        if self.seconds <= 0.0 {
            0.0
        } else {
            self.energy_kwh / (self.seconds / 3_600.0)
        }
    }

    /// `true` if the feeder ran for any part of this bucket.
    pub fn was_active(&self) -> bool {
        self.coal_kg > 0.0
    }
}

/// Sums and extremes accumulated over one calendar day (UTC), flushed
/// to `stats_daily.csv` at rollover.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayAccumulator {
    pub date: String,
    pub seconds_active: f64,
    pub coal_kg: f64,
    pub energy_kwh: f64,
    pub buckets_closed: u32,
    pub max_5m_energy_kwh: Option<f64>,
    pub min_5m_energy_kwh_active: Option<f64>,
}

impl DayAccumulator {
    pub fn new(date: String) -> Self {
        Self {
            date,
            seconds_active: 0.0,
            coal_kg: 0.0,
            energy_kwh: 0.0,
            buckets_closed: 0,
            max_5m_energy_kwh: None,
            min_5m_energy_kwh_active: None,
        }
    }

    pub fn absorb(&mut self, bucket: &Bucket5m) {
        if bucket.was_active() {
            self.seconds_active += bucket.seconds;
        }
        self.coal_kg += bucket.coal_kg;
        self.energy_kwh += bucket.energy_kwh;
        self.buckets_closed += 1;
        self.max_5m_energy_kwh = Some(self.max_5m_energy_kwh.map_or(bucket.energy_kwh, |m| m.max(bucket.energy_kwh)));
        if bucket.was_active() {
            self.min_5m_energy_kwh_active =
                Some(self.min_5m_energy_kwh_active.map_or(bucket.energy_kwh, |m| m.min(bucket.energy_kwh)));
        }
    }
}

/// An aggregate over a contiguous run of closed buckets — the basis for
/// both "rolling N" statistics and compare bars.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WindowAgg {
    pub seconds: f64,
    pub coal_kg: f64,
    pub energy_kwh: f64,
    pub bucket_count: usize,
}

impl WindowAgg {
    pub fn from_buckets(buckets: &[Bucket5m]) -> Self {
        let mut agg = Self {
            seconds: 0.0,
            coal_kg: 0.0,
            energy_kwh: 0.0,
            bucket_count: buckets.len(),
        };
        for b in buckets {
            agg.seconds += b.seconds;
            agg.coal_kg += b.coal_kg;
            agg.energy_kwh += b.energy_kwh;
        }
        agg
    }

    pub fn burn_kgph(&self) -> f64 {
        if self.seconds <= 0.0 {
            0.0
        } else {
            self.coal_kg / (self.seconds / 3_600.0)
        }
    }

    pub fn power_kw(&self) -> f64 {
        if self.seconds <= 0.0 {
            0.0
        } else {
            self.energy_kwh / (self.seconds / 3_600.0)
        }
    }
}

pub const BUCKET_SECONDS: f64 = STATS_BUCKET_SECONDS;
