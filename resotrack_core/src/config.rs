//! Runtime configuration types for the acquisition stack.
//!
//! These are the structs the controller, optimizer, fitter and detectors
//! consume. They are separate from the TOML-deserialized config in
//! `resotrack_config`; see `conversions` for the bridge.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::SensorError;

/// Hard limits of the sensor interface board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceLimits {
    /// Largest point count the firmware accepts in one sweep.
    pub max_points: u32,
    /// Full-scale drive amplitude in mA.
    pub max_amplitude_ma: f64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_points: 65_535,
            max_amplitude_ma: 20.0,
        }
    }
}

/// One sweep request: `points` samples starting at `start_mhz`, spaced
/// `(stop_mhz - start_mhz) / points` apart. The stop frequency itself is
/// not sampled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepConfig {
    pub start_mhz: f64,
    pub stop_mhz: f64,
    pub points: u32,
    pub amplitude_ma: f64,
}

impl SweepConfig {
    /// Build from a step size, rounding the point count to the nearest integer.
    pub fn from_step(start_mhz: f64, stop_mhz: f64, step_mhz: f64, amplitude_ma: f64) -> Self {
        let points = if step_mhz > 0.0 && stop_mhz > start_mhz {
            ((stop_mhz - start_mhz) / step_mhz).round().min(f64::from(u32::MAX)) as u32
        } else {
            0
        };
        Self {
            start_mhz,
            stop_mhz,
            points,
            amplitude_ma,
        }
    }

    pub fn step_mhz(&self) -> f64 {
        if self.points == 0 {
            0.0
        } else {
            (self.stop_mhz - self.start_mhz) / f64::from(self.points)
        }
    }

    /// Frequency of sample `i`.
    pub fn frequency_at(&self, i: usize) -> f64 {
        self.start_mhz + self.step_mhz() * i as f64
    }

    /// Frequency axis for `n` received samples.
    pub fn frequencies(&self, n: usize) -> Vec<f64> {
        (0..n).map(|i| self.frequency_at(i)).collect()
    }

    pub fn validate(&self, limits: &DeviceLimits) -> Result<(), SensorError> {
        if !(self.start_mhz.is_finite() && self.stop_mhz.is_finite()) {
            return Err(SensorError::InvalidConfig(
                "sweep bounds must be finite".into(),
            ));
        }
        if self.start_mhz <= 0.0 {
            return Err(SensorError::InvalidConfig(format!(
                "start frequency {} MHz must be > 0",
                self.start_mhz
            )));
        }
        if self.start_mhz >= self.stop_mhz {
            return Err(SensorError::InvalidConfig(format!(
                "start frequency {} MHz must be below stop frequency {} MHz",
                self.start_mhz, self.stop_mhz
            )));
        }
        if self.points == 0 || self.points > limits.max_points {
            return Err(SensorError::InvalidConfig(format!(
                "point count {} must be in 1..={}",
                self.points, limits.max_points
            )));
        }
        if !(self.amplitude_ma.is_finite()
            && self.amplitude_ma >= 0.0
            && self.amplitude_ma <= limits.max_amplitude_ma)
        {
            return Err(SensorError::InvalidConfig(format!(
                "amplitude {} mA must be in 0..={} mA",
                self.amplitude_ma, limits.max_amplitude_ma
            )));
        }
        Ok(())
    }
}

/// Baseline (reference) scan parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationScanCfg {
    pub start_mhz: f64,
    pub stop_mhz: f64,
    pub step_mhz: f64,
    /// Low-frequency span dropped from the front of the scan.
    pub spike_band_mhz: f64,
}

impl Default for CalibrationScanCfg {
    fn default() -> Self {
        Self {
            start_mhz: 50.0,
            stop_mhz: 170.0,
            step_mhz: 0.1,
            spike_band_mhz: 1.0,
        }
    }
}

impl CalibrationScanCfg {
    /// Number of leading points inside the spike band.
    pub fn spike_points(&self) -> usize {
        if self.step_mhz <= 0.0 || self.spike_band_mhz <= 0.0 {
            0
        } else {
            (self.spike_band_mhz / self.step_mhz - 1e-9).ceil() as usize
        }
    }
}

/// Two-phase peak search parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerCfg {
    pub enabled: bool,
    pub wide_points: u32,
    pub wide_max_attempts: u32,
    /// Wide sweeps that must complete before a peak may be accepted.
    pub wide_min_attempts: u32,
    pub focused_points: u32,
    pub focused_half_width_mhz: f64,
    pub focused_max_iterations: u32,
    /// Acceptance threshold before any peak has been accepted.
    pub default_min_peak: f64,
    pub smoothing_window: usize,
    pub smoothing_order: usize,
    /// 0 = unbounded.
    pub max_restarts: u32,
    /// Zero = unbounded.
    pub budget: Duration,
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
            budget: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMethod {
    #[default]
    Quadratic,
    Spline,
}

/// Resonance-minimum estimation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FitterCfg {
    pub method: FitMethod,
    pub denoise_radius: f64,
    pub denoise_min_samples: usize,
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

#[derive(Debug, Clone, PartialEq)]
pub struct HarvestCfg {
    pub enabled: bool,
    pub inoculation_hours: f64,
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

#[derive(Debug, Clone, PartialEq)]
pub struct ContaminationCfg {
    pub enabled: bool,
    pub window: usize,
    pub slope_ratio: f64,
    pub min_previous_slope: f64,
    /// Anomalous cycles tolerated; one more confirms.
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

#[derive(Debug, Clone, PartialEq)]
pub struct FoamCfg {
    pub enabled: bool,
    /// Reference frequency in air; the first reading is used when unset.
    pub air_frequency_mhz: Option<f64>,
    /// Shift from air to water in MHz.
    pub water_shift_mhz: f64,
    pub threshold_percent: f64,
    pub heartbeat_ma: f64,
    pub alarm_ma: f64,
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

/// Everything a `ReaderSession` needs besides its link.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCfg {
    pub link_timeout: Duration,
    pub limits: DeviceLimits,
    pub acquisition: SweepConfig,
    pub calibration_scan: CalibrationScanCfg,
    pub calibration_file: Option<PathBuf>,
    pub hard_reset_wait: Duration,
    pub optimizer: OptimizerCfg,
    pub fitter: FitterCfg,
    pub harvest: HarvestCfg,
    pub contamination: ContaminationCfg,
    pub foam: FoamCfg,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            link_timeout: Duration::from_secs(10),
            limits: DeviceLimits::default(),
            acquisition: SweepConfig::from_step(70.0, 170.0, 0.01, 10.0),
            calibration_scan: CalibrationScanCfg::default(),
            calibration_file: None,
            hard_reset_wait: Duration::from_millis(5000),
            optimizer: OptimizerCfg::default(),
            fitter: FitterCfg::default(),
            harvest: HarvestCfg::default(),
            contamination: ContaminationCfg::default(),
            foam: FoamCfg::default(),
        }
    }
}
