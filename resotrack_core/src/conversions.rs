//! `From` implementations bridging `resotrack_config` types to `resotrack_core` types.

use std::time::Duration;

use crate::config::{
    CalibrationScanCfg, ContaminationCfg, DeviceLimits, FitMethod, FitterCfg, FoamCfg,
    HarvestCfg, OptimizerCfg, SessionCfg, SweepConfig,
};

// ── Sweep ────────────────────────────────────────────────────────────────────

impl From<&resotrack_config::SweepCfg> for DeviceLimits {
    fn from(c: &resotrack_config::SweepCfg) -> Self {
        Self {
            max_points: c.max_points,
            max_amplitude_ma: c.max_amplitude_ma,
        }
    }
}

impl From<&resotrack_config::SweepCfg> for SweepConfig {
    fn from(c: &resotrack_config::SweepCfg) -> Self {
        Self::from_step(c.start_mhz, c.stop_mhz, c.step_mhz, c.amplitude_ma)
    }
}

// ── Calibration ──────────────────────────────────────────────────────────────

impl From<&resotrack_config::CalibrationCfg> for CalibrationScanCfg {
    fn from(c: &resotrack_config::CalibrationCfg) -> Self {
        Self {
            start_mhz: c.start_mhz,
            stop_mhz: c.stop_mhz,
            step_mhz: c.step_mhz,
            spike_band_mhz: c.spike_band_mhz,
        }
    }
}

// ── Optimizer / fitter ───────────────────────────────────────────────────────

impl From<&resotrack_config::OptimizerCfg> for OptimizerCfg {
    fn from(c: &resotrack_config::OptimizerCfg) -> Self {
        Self {
            enabled: c.enabled,
            wide_points: c.wide_points,
            wide_max_attempts: c.wide_max_attempts,
            wide_min_attempts: c.wide_min_attempts,
            focused_points: c.focused_points,
            focused_half_width_mhz: c.focused_half_width_mhz,
            focused_max_iterations: c.focused_max_iterations,
            default_min_peak: c.default_min_peak,
            smoothing_window: c.smoothing_window,
            smoothing_order: c.smoothing_order,
            max_restarts: c.max_restarts,
            budget: Duration::from_secs(c.budget_s),
        }
    }
}

impl From<resotrack_config::FitMethod> for FitMethod {
    fn from(m: resotrack_config::FitMethod) -> Self {
        match m {
            resotrack_config::FitMethod::Quadratic => Self::Quadratic,
            resotrack_config::FitMethod::Spline => Self::Spline,
        }
    }
}

impl From<&resotrack_config::FitterCfg> for FitterCfg {
    fn from(c: &resotrack_config::FitterCfg) -> Self {
        Self {
            method: c.method.into(),
            denoise_radius: c.denoise_radius,
            denoise_min_samples: c.denoise_min_samples,
            spline_denoise_radius: c.spline_denoise_radius,
            spline_half_span_mhz: c.spline_half_span_mhz,
            spline_step_mhz: c.spline_step_mhz,
        }
    }
}

// ── Detectors ────────────────────────────────────────────────────────────────

impl From<&resotrack_config::HarvestCfg> for HarvestCfg {
    fn from(c: &resotrack_config::HarvestCfg) -> Self {
        Self {
            enabled: c.enabled,
            inoculation_hours: c.inoculation_hours,
            hours_after_inoculation: c.hours_after_inoculation,
            smoothing_window: c.smoothing_window,
            regression_window: c.regression_window,
            tail_exclude: c.tail_exclude,
            pattern_len: c.pattern_len,
            slope_threshold: c.slope_threshold,
        }
    }
}

impl From<&resotrack_config::ContaminationCfg> for ContaminationCfg {
    fn from(c: &resotrack_config::ContaminationCfg) -> Self {
        Self {
            enabled: c.enabled,
            window: c.window,
            slope_ratio: c.slope_ratio,
            min_previous_slope: c.min_previous_slope,
            streak: c.streak,
        }
    }
}

impl From<&resotrack_config::FoamCfg> for FoamCfg {
    fn from(c: &resotrack_config::FoamCfg) -> Self {
        Self {
            enabled: c.enabled,
            air_frequency_mhz: c.air_frequency_mhz,
            water_shift_mhz: c.water_shift_mhz,
            threshold_percent: c.threshold_percent,
            heartbeat_ma: c.heartbeat_ma,
            alarm_ma: c.alarm_ma,
            heartbeat_every: c.heartbeat_every,
        }
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

impl From<&resotrack_config::Config> for SessionCfg {
    fn from(c: &resotrack_config::Config) -> Self {
        Self {
            link_timeout: Duration::from_millis(c.serial.timeout_ms),
            limits: (&c.sweep).into(),
            acquisition: (&c.sweep).into(),
            calibration_scan: (&c.calibration).into(),
            calibration_file: c.calibration.file.clone(),
            hard_reset_wait: Duration::from_millis(c.runner.hard_reset_wait_ms),
            optimizer: (&c.optimizer).into(),
            fitter: (&c.fitter).into(),
            harvest: (&c.harvest).into(),
            contamination: (&c.contamination).into(),
            foam: (&c.foam).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_maps_to_default_session() {
        let cfg = resotrack_config::Config::default();
        let session = SessionCfg::from(&cfg);
        assert_eq!(session, SessionCfg::default());
    }

    #[test]
    fn spline_method_is_carried() {
        let cfg = resotrack_config::load_toml("[fitter]\nmethod = \"spline\"\n").unwrap();
        let session = SessionCfg::from(&cfg);
        assert_eq!(session.fitter.method, FitMethod::Spline);
    }
}
