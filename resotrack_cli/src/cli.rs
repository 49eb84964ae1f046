//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "resotrack", version, about = "Resonance tracking reader")]
pub struct Cli {
    /// Path to config TOML; built-in defaults are used when the file is absent
    #[arg(long, value_name = "FILE", default_value = "etc/resotrack.toml")]
    pub config: PathBuf,

    /// Override serial.port from the config
    #[arg(long, value_name = "DEVICE")]
    pub port: Option<String>,

    /// Override calibration.file from the config
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Acquire continuously until Ctrl-C (or for a fixed number of cycles)
    Run {
        /// Stop after this many cycles
        #[arg(long, value_name = "N")]
        cycles: Option<u64>,
        /// Override runner.cycle_interval_s
        #[arg(long, value_name = "SECS")]
        interval_s: Option<u64>,
        /// Reference frequency for the growth index (default: first fitted reading)
        #[arg(long, value_name = "MHZ")]
        zero_mhz: Option<f64>,
    },
    /// Take a single reading and print it
    Scan,
    /// Record a baseline with no sample present and store it
    Calibrate,
    /// Connect, identify the interface board and disconnect
    SelfCheck,
}
