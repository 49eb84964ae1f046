//! Two-phase resonance peak search over calibrated sweeps.
//!
//! Wide phase: coarse sweeps across the whole range until a Gaussian fit
//! clears the amplitude threshold (never before `wide_min_attempts` sweeps).
//! Focused phase: narrow sweeps re-centered on the fitted peak; the best of
//! them wins. An outer loop restarts the search on a miss, bounded by a
//! restart count and a wall-clock budget.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use resotrack_traits::{Clock, Link};
use tracing::{debug, info, warn};

use crate::config::{OptimizerCfg, SweepConfig};
use crate::controller::SweepController;
use crate::error::{Result, SensorError};
use crate::numeric::{fit_gaussian, savgol};
use crate::sweep::Sweep;

/// Source of calibrated sweeps (ratio to baseline, peak above ~1).
pub trait Sweeper {
    fn calibrated_sweep(&mut self, cfg: &SweepConfig) -> Result<Sweep>;
}

impl<L: Link> Sweeper for SweepController<L> {
    fn calibrated_sweep(&mut self, cfg: &SweepConfig) -> Result<Sweep> {
        SweepController::calibrated_sweep(self, cfg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakEstimate {
    pub frequency_mhz: f64,
    /// Peak height in calibrated units, baseline included.
    pub amplitude: f64,
    pub std_mhz: f64,
}

/// Outcome of a successful search: the winning focused sweep and its fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusedResult {
    pub peak: PeakEstimate,
    pub window: SweepConfig,
    pub sweep: Sweep,
}

/// Full search range and drive amplitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchRange {
    pub start_mhz: f64,
    pub stop_mhz: f64,
    pub amplitude_ma: f64,
}

impl From<&SweepConfig> for SearchRange {
    fn from(c: &SweepConfig) -> Self {
        Self {
            start_mhz: c.start_mhz,
            stop_mhz: c.stop_mhz,
            amplitude_ma: c.amplitude_ma,
        }
    }
}

pub struct AdaptiveSweepOptimizer {
    cfg: OptimizerCfg,
    range: SearchRange,
    previous_peak: Option<f64>,
}

impl AdaptiveSweepOptimizer {
    pub fn new(cfg: OptimizerCfg, range: SearchRange) -> Self {
        Self {
            cfg,
            range,
            previous_peak: None,
        }
    }

    pub fn range(&self) -> SearchRange {
        self.range
    }

    pub fn set_range(&mut self, range: SearchRange) {
        self.range = range;
    }

    pub fn previous_peak(&self) -> Option<f64> {
        self.previous_peak
    }

    /// Halfway between the last accepted peak and the baseline of 1.
    pub fn min_peak_threshold(&self) -> f64 {
        match self.previous_peak {
            Some(p) => p - (p - 1.0) / 2.0,
            None => self.cfg.default_min_peak,
        }
    }

    fn wide_config(&self) -> SweepConfig {
        SweepConfig {
            start_mhz: self.range.start_mhz,
            stop_mhz: self.range.stop_mhz,
            points: self.cfg.wide_points,
            amplitude_ma: self.range.amplitude_ma,
        }
    }

    fn focused_config(&self, center: f64) -> SweepConfig {
        let half = self.cfg.focused_half_width_mhz;
        let start = (center - half).max(self.range.start_mhz);
        let stop = (center + half).min(self.range.stop_mhz);
        SweepConfig {
            start_mhz: start,
            stop_mhz: stop,
            points: self.cfg.focused_points,
            amplitude_ma: self.range.amplitude_ma,
        }
    }

    /// Fit a Gaussian to a calibrated sweep, smoothing first when the sweep
    /// is longer than the smoothing window.
    ///
    /// The model `a·exp(-(x-c)²/(2σ²))` has no offset term, so rather than
    /// fitting the raw ratio with amplitude bounds `[min(y), max(y)]` the fit
    /// runs on the excess over the sweep's median, keeping a flat baseline of
    /// ~1 from pulling the model wide. The reported amplitude adds the median
    /// back. When the peak fills most of the window the median sits above the
    /// true baseline; the excess then dips below zero in the tails, which the
    /// fit ignores, and the sum still lands on the peak height.
    pub fn fit_peak(&self, sweep: &Sweep) -> Option<PeakEstimate> {
        let values = if sweep.len() > self.cfg.smoothing_window {
            savgol(&sweep.values, self.cfg.smoothing_window, self.cfg.smoothing_order)
        } else {
            sweep.values.clone()
        };
        let baseline = median(&values)?;
        let excess: Vec<f64> = values.iter().map(|v| v - baseline).collect();
        match fit_gaussian(&sweep.frequencies, &excess) {
            Ok(g) => Some(PeakEstimate {
                frequency_mhz: g.centroid,
                amplitude: baseline + g.amplitude,
                std_mhz: g.std,
            }),
            Err(e) => {
                debug!(error = %e, "peak fit failed");
                None
            }
        }
    }

    fn check_stop(stop: &AtomicBool) -> Result<()> {
        if stop.load(Ordering::Relaxed) {
            Err(SensorError::Stopped)
        } else {
            Ok(())
        }
    }

    /// Coarse sweeps across the full range until a peak is accepted.
    pub fn wide_phase<S: Sweeper + ?Sized>(
        &mut self,
        sweeper: &mut S,
        stop: &AtomicBool,
    ) -> Result<PeakEstimate> {
        let cfg = self.wide_config();
        let threshold = self.min_peak_threshold();
        let mut best = f64::NEG_INFINITY;
        for attempt in 1..=self.cfg.wide_max_attempts {
            Self::check_stop(stop)?;
            let sweep = sweeper.calibrated_sweep(&cfg)?;
            let Some(peak) = self.fit_peak(&sweep) else {
                continue;
            };
            best = best.max(peak.amplitude);
            if attempt > self.cfg.wide_min_attempts && peak.amplitude >= threshold {
                info!(
                    attempt,
                    frequency_mhz = peak.frequency_mhz,
                    amplitude = peak.amplitude,
                    threshold,
                    "wide sweep accepted peak"
                );
                return Ok(peak);
            }
        }
        Err(SensorError::SensorNotFound {
            best_amplitude: if best.is_finite() { best } else { 0.0 },
        })
    }

    /// Narrow sweeps around `peak`, re-centering while the fit stays valid.
    pub fn focused_phase<S: Sweeper + ?Sized>(
        &mut self,
        sweeper: &mut S,
        peak: PeakEstimate,
        stop: &AtomicBool,
    ) -> Result<FocusedResult> {
        let threshold = self.min_peak_threshold();
        let mut center = peak.frequency_mhz;
        let mut best: Option<FocusedResult> = None;

        for iteration in 0..self.cfg.focused_max_iterations {
            Self::check_stop(stop)?;
            let window = self.focused_config(center);
            let sweep = sweeper.calibrated_sweep(&window)?;
            let fit = self.fit_peak(&sweep);
            debug!(iteration, center, ?fit, "focused sweep");
            let Some(fit) = fit else {
                break;
            };
            if best.as_ref().is_none_or(|b| fit.amplitude > b.peak.amplitude) {
                best = Some(FocusedResult {
                    peak: fit,
                    window,
                    sweep,
                });
            }
            if fit.amplitude < threshold {
                break;
            }
            center = fit.frequency_mhz;
        }

        match best {
            Some(result) if result.peak.amplitude >= threshold => {
                self.previous_peak = Some(result.peak.amplitude);
                Ok(result)
            }
            other => Err(SensorError::FocusedSweepFailed {
                best_amplitude: other.map_or(0.0, |r| r.peak.amplitude),
            }),
        }
    }

    /// Wide then focused search, restarting on a miss until the restart
    /// count or time budget runs out.
    pub fn locate<S: Sweeper + ?Sized>(
        &mut self,
        sweeper: &mut S,
        stop: &AtomicBool,
        clock: &dyn Clock,
    ) -> Result<FocusedResult> {
        let started: Instant = clock.now();
        let mut restarts = 0u32;
        loop {
            Self::check_stop(stop)?;
            let attempt = self
                .wide_phase(&mut *sweeper, stop)
                .and_then(|peak| self.focused_phase(&mut *sweeper, peak, stop));
            match attempt {
                Ok(found) => return Ok(found),
                Err(e) if e.is_search_miss() => {
                    restarts += 1;
                    warn!(error = %e, restarts, "peak search missed; restarting");
                }
                Err(e) => return Err(e),
            }
            let over_restarts = self.cfg.max_restarts > 0 && restarts >= self.cfg.max_restarts;
            let over_budget = !self.cfg.budget.is_zero()
                && clock.now().saturating_duration_since(started) >= self.cfg.budget;
            if over_restarts || over_budget {
                return Err(SensorError::SearchBudgetExhausted { restarts });
            }
        }
    }
}

fn median(values: &[f64]) -> Option<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    Some(if v.len() % 2 == 0 {
        (v[mid - 1] + v[mid]) / 2.0
    } else {
        v[mid]
    })
}
