//! Wires the module manifest, hardware, and the two loops together and
//! runs them until `SIGINT`/`SIGTERM`.
//!
//! Exit codes (§6): `0` on graceful shutdown, non-zero on failed
//! startup (bad manifest, unresolvable module id).

mod cli;

use boiler_common::clock::RealClock;
use boiler_core::{StateStore, SystemState};
use boiler_hal::MockHardware;
use boiler_kernel::kernel::validate_manifest;
use boiler_kernel::{AuxRunner, Kernel, Manifest};
use clap::Parser;
use cli::Cli;
use nix::sys::signal::{self, SigHandler, Signal};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

static SHOULD_RUN: AtomicBool = AtomicBool::new(true);

extern "C" fn request_shutdown(_signum: i32) {
    SHOULD_RUN.store(false, Ordering::SeqCst);
}

fn install_signal_handlers() {
    unsafe {
        let handler = SigHandler::Handler(request_shutdown);
        let _ = signal::signal(Signal::SIGINT, handler);
        let _ = signal::signal(Signal::SIGTERM, handler);
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let cli = Cli::parse();
    let manifest_path = cli.config_dir.join(&cli.manifest);

    let manifest = match Manifest::load(&manifest_path) {
        Ok(m) => m,
        Err(err) => {
            error!("failed to load manifest {}: {err}", manifest_path.display());
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = validate_manifest(&manifest) {
        error!("manifest validation failed: {err}");
        return ExitCode::FAILURE;
    }

    if cli.check_only {
        info!("manifest OK: {} critical, {} auxiliary", manifest.critical().count(), manifest.auxiliary().count());
        return ExitCode::SUCCESS;
    }

    let clock: Arc<dyn boiler_common::Clock> = Arc::new(RealClock::new());
    let store = Arc::new(StateStore::new(
        SystemState::default(),
        boiler_common::consts::DEFAULT_EVENT_BUFFER_SIZE,
    ));
    let hardware = Box::new(MockHardware::new(clock.clone()));

    let mut kernel = match Kernel::new(&manifest, &cli.config_dir, hardware, clock.clone(), store.clone()) {
        Ok(k) => k,
        Err(err) => {
            error!("failed to assemble critical-loop modules: {err}");
            return ExitCode::FAILURE;
        }
    };
    let mut aux_runner = match AuxRunner::new(&manifest, &cli.config_dir, clock.clone(), store.clone()) {
        Ok(a) => a,
        Err(err) => {
            error!("failed to assemble auxiliary-loop modules: {err}");
            return ExitCode::FAILURE;
        }
    };

    install_signal_handlers();
    info!("boiler_supervisor starting: {} critical modules, {} auxiliary modules",
        manifest.critical().count(), manifest.auxiliary().count());

    let critical_running = Arc::new(AtomicBool::new(true));
    let aux_running = Arc::new(AtomicBool::new(true));

    let critical_handle = {
        let running = critical_running.clone();
        std::thread::spawn(move || {
            boiler_kernel::cycle::run_sim_loop(Duration::from_millis(boiler_common::consts::KERNEL_TICK_MS), running, || {
                kernel.tick();
            })
        })
    };

    let aux_handle = {
        let running = aux_running.clone();
        std::thread::spawn(move || {
            boiler_kernel::cycle::run_sim_loop(Duration::from_millis(boiler_common::consts::AUX_TICK_MS), running, || {
                aux_runner.tick();
            })
        })
    };

    while SHOULD_RUN.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    info!("shutdown requested, stopping loops");
    critical_running.store(false, Ordering::SeqCst);
    aux_running.store(false, Ordering::SeqCst);

    let critical_stats = critical_handle.join().unwrap_or_default();
    let aux_stats = aux_handle.join().unwrap_or_default();
    info!(
        "critical loop: {} cycles, {} overruns; aux loop: {} cycles, {} overruns",
        critical_stats.count, critical_stats.overruns, aux_stats.count, aux_stats.overruns
    );

    ExitCode::SUCCESS
}
