#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and calibration file handling for the resonance reader.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//!   Every section defaults to the instrument's tuned constants, so an empty
//!   file is a valid config.
//! - The calibration CSV loader enforces the exact header and ordering, and
//!   reports problems as a typed `CalibrationFileError` so callers can fall
//!   back to "no calibration" instead of aborting.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Exact header of the calibration table.
pub const CALIBRATION_HEADERS: [&str; 2] = ["Frequency (MHz)", "Signal Strength (V)"];

/// One row of the calibration CSV.
///
/// Example:
/// Frequency (MHz),Signal Strength (V)
/// 70.0,1.02
/// 70.1,1.03
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct CalibrationRow {
    #[serde(rename = "Frequency (MHz)")]
    pub frequency_mhz: f64,
    #[serde(rename = "Signal Strength (V)")]
    pub volts: f64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SerialCfg {
    /// Device path, e.g. /dev/ttyUSB0 or COM3
    pub port: String,
    pub baud_rate: u32,
    /// Per-exchange deadline for writes and acknowledgment reads (ms)
    pub timeout_ms: u64,
}

impl Default for SerialCfg {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SweepCfg {
    pub start_mhz: f64,
    pub stop_mhz: f64,
    pub step_mhz: f64,
    pub amplitude_ma: f64,
    /// Output current corresponding to full-scale ASF
    pub max_amplitude_ma: f64,
    /// Largest point count the DDS sequencer can address
    pub max_points: u32,
}

impl Default for SweepCfg {
    fn default() -> Self {
        Self {
            start_mhz: 70.0,
            stop_mhz: 170.0,
            step_mhz: 0.01,
            amplitude_ma: 10.0,
            max_amplitude_ma: 20.0,
            max_points: 65_535,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CalibrationCfg {
    /// CSV to load at connect and to write after a calibration scan
    pub file: Option<PathBuf>,
    pub start_mhz: f64,
    pub stop_mhz: f64,
    pub step_mhz: f64,
    /// Width of the start-of-sweep band dropped from a calibration scan
    pub spike_band_mhz: f64,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            file: None,
            start_mhz: 50.0,
            stop_mhz: 170.0,
            step_mhz: 0.1,
            spike_band_mhz: 1.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OptimizerCfg {
    /// Locate the peak with wide+focused sweeps instead of one configured sweep
    pub enabled: bool,
    pub wide_points: u32,
    pub wide_max_attempts: u32,
    /// Attempts that must elapse before a wide-sweep peak may be accepted
    pub wide_min_attempts: u32,
    pub focused_points: u32,
    pub focused_half_width_mhz: f64,
    pub focused_max_iterations: u32,
    /// Acceptance threshold used before any peak has been seen
    pub default_min_peak: f64,
    pub smoothing_window: usize,
    pub smoothing_order: usize,
    /// Outer-loop bound: wide-phase restarts after a failed focused phase (0 = unbounded)
    pub max_restarts: u32,
    /// Outer-loop bound: wall-clock budget for one search in seconds (0 = unbounded)
    pub budget_s: u64,
}

impl Default for OptimizerCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            wide_points: 50,
            wide_max_attempts: 1000,
            wide_min_attempts: 10,
            focused_points: 200,
            focused_half_width_mhz: 10.0,
            focused_max_iterations: 6,
            default_min_peak: 1.2,
            smoothing_window: 101,
            smoothing_order: 2,
            max_restarts: 20,
            budget_s: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FitMethod {
    #[default]
    Quadratic,
    Spline,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FitterCfg {
    pub method: FitMethod,
    pub denoise_radius: f64,
    pub denoise_min_samples: usize,
    /// Tighter pass used before spline fitting
    pub spline_denoise_radius: f64,
    pub spline_half_span_mhz: f64,
    pub spline_step_mhz: f64,
}

impl Default for FitterCfg {
    fn default() -> Self {
        Self {
            method: FitMethod::Quadratic,
            denoise_radius: 0.2,
            denoise_min_samples: 3,
            spline_denoise_radius: 0.1,
            spline_half_span_mhz: 5.0,
            spline_step_mhz: 0.001,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HarvestCfg {
    pub enabled: bool,
    /// Run time (h) at which the culture was inoculated
    pub inoculation_hours: f64,
    /// Hours after inoculation before the detector starts looking
    pub hours_after_inoculation: f64,
    pub smoothing_window: usize,
    pub regression_window: usize,
    pub tail_exclude: usize,
    pub pattern_len: usize,
    pub slope_threshold: f64,
}

impl Default for HarvestCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            inoculation_hours: 0.0,
            hours_after_inoculation: 10.0,
            smoothing_window: 51,
            regression_window: 51,
            tail_exclude: 25,
            pattern_len: 8,
            slope_threshold: 0.005,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ContaminationCfg {
    pub enabled: bool,
    pub window: usize,
    pub slope_ratio: f64,
    pub min_previous_slope: f64,
    /// Consecutive anomalous cycles that must be exceeded to confirm
    pub streak: u32,
}

impl Default for ContaminationCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 100,
            slope_ratio: 10.0,
            min_previous_slope: 0.03,
            streak: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FoamCfg {
    pub enabled: bool,
    /// Resonance with an empty vessel; first reading is used when absent
    pub air_frequency_mhz: Option<f64>,
    /// Frequency shift between an empty and a water-filled vessel
    pub water_shift_mhz: f64,
    /// Percent of the water shift that counts as foam
    pub threshold_percent: f64,
    pub heartbeat_ma: f64,
    pub alarm_ma: f64,
    /// Emit the heartbeat every N normal cycles
    pub heartbeat_every: u32,
}

impl Default for FoamCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            air_frequency_mhz: None,
            water_shift_mhz: 10.0,
            threshold_percent: 50.0,
            heartbeat_ma: 4.0,
            alarm_ma: 20.0,
            heartbeat_every: 1,
        }
    }
}

/// Longest cycle interval at which a long run's series stays dense enough
/// for the time-series denoiser: past 1000 points it needs 20 samples
/// within +/-0.2 h, i.e. at least 10 cycles every 0.2 h.
pub const MAX_CYCLE_INTERVAL_S: u64 = 72;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunnerCfg {
    /// Start-to-start cycle period; at most `MAX_CYCLE_INTERVAL_S`
    pub cycle_interval_s: u64,
    /// Pause between a hard reset and the reconnect
    pub hard_reset_wait_ms: u64,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            cycle_interval_s: 60,
            hard_reset_wait_ms: 5_000,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub serial: SerialCfg,
    pub sweep: SweepCfg,
    pub calibration: CalibrationCfg,
    pub optimizer: OptimizerCfg,
    pub fitter: FitterCfg,
    pub harvest: HarvestCfg,
    pub contamination: ContaminationCfg,
    pub foam: FoamCfg,
    pub runner: RunnerCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn check_range(section: &str, start: f64, stop: f64, step: f64, max_points: u32) -> eyre::Result<()> {
    if !(start.is_finite() && stop.is_finite() && start > 0.0) {
        eyre::bail!("{section}.start_mhz must be a positive number");
    }
    if start >= stop {
        eyre::bail!("{section}.start_mhz must be < {section}.stop_mhz");
    }
    if !(step.is_finite() && step > 0.0) {
        eyre::bail!("{section}.step_mhz must be > 0");
    }
    if (stop - start) / step > f64::from(max_points) {
        eyre::bail!("{section} range needs more than {max_points} points at this step_mhz");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Serial
        if self.serial.baud_rate == 0 {
            eyre::bail!("serial.baud_rate must be > 0");
        }
        if self.serial.timeout_ms == 0 {
            eyre::bail!("serial.timeout_ms must be >= 1");
        }

        // Sweep
        if self.sweep.max_points == 0 {
            eyre::bail!("sweep.max_points must be >= 1");
        }
        check_range(
            "sweep",
            self.sweep.start_mhz,
            self.sweep.stop_mhz,
            self.sweep.step_mhz,
            self.sweep.max_points,
        )?;
        if !(self.sweep.max_amplitude_ma > 0.0) {
            eyre::bail!("sweep.max_amplitude_ma must be > 0");
        }
        if self.sweep.amplitude_ma < 0.0 || self.sweep.amplitude_ma > self.sweep.max_amplitude_ma {
            eyre::bail!("sweep.amplitude_ma must be in [0, sweep.max_amplitude_ma]");
        }

        // Calibration
        check_range(
            "calibration",
            self.calibration.start_mhz,
            self.calibration.stop_mhz,
            self.calibration.step_mhz,
            self.sweep.max_points,
        )?;
        if self.calibration.spike_band_mhz < 0.0 {
            eyre::bail!("calibration.spike_band_mhz must be >= 0");
        }
        if self.calibration.spike_band_mhz >= self.calibration.stop_mhz - self.calibration.start_mhz {
            eyre::bail!("calibration.spike_band_mhz must be narrower than the calibration range");
        }

        // Optimizer
        let o = &self.optimizer;
        if o.wide_points < 3 || o.focused_points < 3 {
            eyre::bail!("optimizer.wide_points and optimizer.focused_points must be >= 3");
        }
        if o.wide_points > self.sweep.max_points || o.focused_points > self.sweep.max_points {
            eyre::bail!("optimizer point counts must not exceed sweep.max_points");
        }
        if o.wide_max_attempts == 0 {
            eyre::bail!("optimizer.wide_max_attempts must be >= 1");
        }
        if o.wide_min_attempts >= o.wide_max_attempts {
            eyre::bail!("optimizer.wide_min_attempts must be < optimizer.wide_max_attempts");
        }
        if o.focused_max_iterations == 0 {
            eyre::bail!("optimizer.focused_max_iterations must be >= 1");
        }
        if !(o.focused_half_width_mhz > 0.0) {
            eyre::bail!("optimizer.focused_half_width_mhz must be > 0");
        }
        if o.smoothing_window % 2 == 0 || o.smoothing_window <= o.smoothing_order {
            eyre::bail!("optimizer.smoothing_window must be odd and > optimizer.smoothing_order");
        }

        // Fitter
        if !(self.fitter.denoise_radius > 0.0) || !(self.fitter.spline_denoise_radius > 0.0) {
            eyre::bail!("fitter denoise radii must be > 0");
        }
        if self.fitter.denoise_min_samples == 0 {
            eyre::bail!("fitter.denoise_min_samples must be >= 1");
        }
        if !(self.fitter.spline_step_mhz > 0.0) || !(self.fitter.spline_half_span_mhz > 0.0) {
            eyre::bail!("fitter spline grid must have positive span and step");
        }

        // Harvest
        let h = &self.harvest;
        if h.smoothing_window < 3 || h.smoothing_window % 2 == 0 {
            eyre::bail!("harvest.smoothing_window must be odd and >= 3");
        }
        if h.regression_window < 2 {
            eyre::bail!("harvest.regression_window must be >= 2");
        }
        if h.pattern_len < 2 {
            eyre::bail!("harvest.pattern_len must be >= 2");
        }
        if h.slope_threshold < 0.0 {
            eyre::bail!("harvest.slope_threshold must be >= 0");
        }

        // Contamination
        if self.contamination.window < 2 {
            eyre::bail!("contamination.window must be >= 2");
        }
        if !(self.contamination.slope_ratio > 1.0) {
            eyre::bail!("contamination.slope_ratio must be > 1");
        }

        // Foam
        let f = &self.foam;
        if !(f.water_shift_mhz > 0.0) {
            eyre::bail!("foam.water_shift_mhz must be > 0");
        }
        if !(f.threshold_percent > 0.0 && f.threshold_percent < 90.0) {
            eyre::bail!("foam.threshold_percent must be in (0, 90)");
        }
        if f.heartbeat_every == 0 {
            eyre::bail!("foam.heartbeat_every must be >= 1");
        }

        // Runner
        if self.runner.cycle_interval_s > MAX_CYCLE_INTERVAL_S {
            eyre::bail!("runner.cycle_interval_s must be <= {MAX_CYCLE_INTERVAL_S}");
        }
        if self.runner.hard_reset_wait_ms > 60_000 {
            eyre::bail!("runner.hard_reset_wait_ms is unreasonably large (>60s)");
        }

        Ok(())
    }
}

/// Why a calibration table could not be used.
#[derive(Debug, Error)]
pub enum CalibrationFileError {
    #[error("calibration file not found: {0}")]
    Missing(PathBuf),
    #[error("calibration CSV must have headers 'Frequency (MHz),Signal Strength (V)', got: {0}")]
    BadHeader(String),
    #[error("invalid calibration row {line}: {reason}")]
    BadRow { line: usize, reason: String },
    #[error("invalid calibration table: {0}")]
    Invalid(String),
    #[error("calibration io: {0}")]
    Io(String),
}

/// Parse and check a calibration table: non-empty, finite, frequency strictly increasing.
pub fn load_calibration_csv(path: &Path) -> Result<Vec<CalibrationRow>, CalibrationFileError> {
    if !path.exists() {
        return Err(CalibrationFileError::Missing(path.to_path_buf()));
    }
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| CalibrationFileError::Io(format!("open {}: {e}", path.display())))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| CalibrationFileError::Io(format!("read headers {}: {e}", path.display())))?
        .clone();
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != CALIBRATION_HEADERS {
        return Err(CalibrationFileError::BadHeader(actual.join(",")));
    }

    let mut rows: Vec<CalibrationRow> = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        let line = idx + 2;
        let row = rec.map_err(|e| CalibrationFileError::BadRow {
            line,
            reason: e.to_string(),
        })?;
        if !(row.frequency_mhz.is_finite() && row.volts.is_finite()) {
            return Err(CalibrationFileError::BadRow {
                line,
                reason: "non-finite value".into(),
            });
        }
        if let Some(prev) = rows.last()
            && row.frequency_mhz <= prev.frequency_mhz
        {
            return Err(CalibrationFileError::BadRow {
                line,
                reason: "frequencies must be strictly increasing".into(),
            });
        }
        rows.push(row);
    }
    if rows.is_empty() {
        return Err(CalibrationFileError::Invalid("no rows".into()));
    }
    Ok(rows)
}

/// Serialize a calibration table with the canonical header.
pub fn calibration_csv_bytes(rows: &[CalibrationRow]) -> eyre::Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(Vec::new());
    for row in rows {
        wtr.serialize(row)?;
    }
    if rows.is_empty() {
        wtr.write_record(CALIBRATION_HEADERS)?;
    }
    wtr.into_inner()
        .map_err(|e| eyre::eyre!("flush calibration CSV: {e}"))
}
