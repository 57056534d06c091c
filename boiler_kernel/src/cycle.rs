//! Cycle pacing for the critical and auxiliary loops.
//!
//! The default path (`run_sim_loop`) paces with `std::thread::sleep` and
//! logs overruns without aborting — a ~500ms/2s cadence tolerates the
//! jitter of a normal scheduler. The `rt` feature layers on the same
//! `mlockall`/`SCHED_FIFO`/CPU-pinning/`clock_nanosleep(TIMER_ABSTIME)`
//! ceremony used for hard-real-time motion control, for deployments that
//! actually need it; see DESIGN.md for why it's off by default here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("real-time setup failed: {0}")]
    RtSetup(String),
    #[error("cycle overrun: {actual_ns}ns exceeded budget of {budget_ns}ns")]
    CycleOverrun { actual_ns: i64, budget_ns: i64 },
}

/// Running min/max/mean/overrun-count over a cycle's wall-clock duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleStats {
    pub count: u64,
    pub last_ns: i64,
    pub min_ns: i64,
    pub max_ns: i64,
    pub sum_ns: i128,
    pub overruns: u64,
}

impl CycleStats {
    pub fn record(&mut self, duration: Duration, budget: Duration) {
        let ns = duration.as_nanos() as i64;
        self.count += 1;
        self.last_ns = ns;
        self.sum_ns += ns as i128;
        self.min_ns = if self.count == 1 { ns } else { self.min_ns.min(ns) };
        self.max_ns = self.max_ns.max(ns);
        if duration > budget {
            self.overruns += 1;
        }
    }

    pub fn mean_ns(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_ns as f64 / self.count as f64
        }
    }
}

/// Run `body` on a fixed cadence until `running` is cleared. Approximate
/// pacing via `Instant`/`std::thread::sleep`; an overrun is logged (rate
/// limited) but never aborts the loop.
pub fn run_sim_loop(period: Duration, running: Arc<AtomicBool>, mut body: impl FnMut()) -> CycleStats {
    let mut stats = CycleStats::default();
    while running.load(Ordering::SeqCst) {
        let cycle_start = Instant::now();
        body();
        let elapsed = cycle_start.elapsed();
        stats.record(elapsed, period);

        if elapsed > period {
            if stats.overruns <= 10 || stats.overruns % 1_000 == 0 {
                warn!(
                    "cycle overrun #{}: took {:?}, budget {:?}",
                    stats.overruns, elapsed, period
                );
            }
        } else {
            std::thread::sleep(period - elapsed);
        }

        if stats.count % 1_000 == 0 {
            debug!(
                "cycle stats: {} cycles, mean={:.0}ns, max={}ns, overruns={}",
                stats.count,
                stats.mean_ns(),
                stats.max_ns,
                stats.overruns
            );
        }
    }
    stats
}

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{mlockall, MlockallFlags};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;
    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param { sched_priority: priority };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

#[cfg(feature = "rt")]
pub fn rt_setup(cpu: Option<usize>, priority: i32) -> Result<(), CycleError> {
    rt_mlockall()?;
    if let Some(cpu) = cpu {
        rt_set_affinity(cpu)?;
    }
    rt_set_scheduler(priority)
}

#[cfg(not(feature = "rt"))]
pub fn rt_setup(_cpu: Option<usize>, _priority: i32) -> Result<(), CycleError> {
    Ok(())
}

/// RT cycle loop using `clock_nanosleep(TIMER_ABSTIME)` for drift-free
/// pacing. Any overrun is a hard failure — a critical loop that has
/// already committed to `SCHED_FIFO` treats a missed deadline as fatal
/// rather than let jitter compound silently.
#[cfg(feature = "rt")]
pub fn run_rt_loop(
    period: Duration,
    running: Arc<AtomicBool>,
    mut body: impl FnMut(),
) -> Result<CycleStats, CycleError> {
    use nix::time::{clock_gettime, clock_nanosleep, ClockId, ClockNanosleepFlags};

    let clock = ClockId::CLOCK_MONOTONIC;
    let period_ns = period.as_nanos() as i64;
    let mut next_wake =
        clock_gettime(clock).map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")))?;
    let mut stats = CycleStats::default();

    while running.load(Ordering::SeqCst) {
        let cycle_start =
            clock_gettime(clock).map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")))?;
        body();
        let cycle_end =
            clock_gettime(clock).map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")))?;

        let actual_ns =
            (cycle_end.tv_sec() - cycle_start.tv_sec()) * 1_000_000_000 + (cycle_end.tv_nsec() - cycle_start.tv_nsec());
        stats.record(Duration::from_nanos(actual_ns.max(0) as u64), period);
        if actual_ns > period_ns {
            return Err(CycleError::CycleOverrun { actual_ns, budget_ns: period_ns });
        }

        next_wake = timespec_add_ns(next_wake, period_ns);
        let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
    }
    Ok(stats)
}

#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    TimeSpec::new(ts.tv_sec() + (ts.tv_nsec() + ns) / 1_000_000_000, (ts.tv_nsec() + ns) % 1_000_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_track_min_max_mean() {
        let mut stats = CycleStats::default();
        let budget = Duration::from_millis(500);
        stats.record(Duration::from_millis(100), budget);
        stats.record(Duration::from_millis(300), budget);
        stats.record(Duration::from_millis(200), budget);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min_ns, 100_000_000);
        assert_eq!(stats.max_ns, 300_000_000);
        assert!((stats.mean_ns() - 200_000_000.0).abs() < 1.0);
        assert_eq!(stats.overruns, 0);
    }

    #[test]
    fn overrun_is_counted_but_not_fatal_in_sim_stats() {
        let mut stats = CycleStats::default();
        let budget = Duration::from_millis(500);
        stats.record(Duration::from_millis(600), budget);
        assert_eq!(stats.overruns, 1);
    }

    #[test]
    fn sim_loop_runs_requested_number_of_cycles_then_stops() {
        let running = Arc::new(AtomicBool::new(true));
        let count = Arc::new(std::sync::Mutex::new(0));
        let running_clone = running.clone();
        let count_clone = count.clone();
        let stats = run_sim_loop(Duration::from_millis(1), running_clone.clone(), move || {
            let mut c = count_clone.lock().unwrap();
            *c += 1;
            if *c >= 5 {
                running_clone.store(false, Ordering::SeqCst);
            }
        });
        assert_eq!(stats.count, 5);
    }
}
