use clap::Parser;
use std::path::PathBuf;

/// Boiler controller supervisor: wires the critical loop, the
/// auxiliary loop, and hardware together and runs them until signalled.
#[derive(Debug, Parser)]
#[command(name = "boiler_supervisor", version, about)]
pub struct Cli {
    /// Directory holding `modules.yaml` and each module's `<id>/values.yaml`.
    #[arg(long, default_value = "config")]
    pub config_dir: PathBuf,

    /// Module manifest filename, resolved relative to `config_dir`.
    #[arg(long, default_value = "modules.yaml")]
    pub manifest: String,

    /// Only validate the manifest and exit — used before a restart to
    /// fail fast on a bad `modules.yaml` instead of mid-run.
    #[arg(long)]
    pub check_only: bool,
}
