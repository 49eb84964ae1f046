use tracing::info;

use crate::config::HarvestCfg;
use crate::numeric::{rolling_slopes, savgol};

const SMOOTHING_ORDER: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HarvestState {
    #[default]
    Normal,
    CloseToHarvest,
    ReadyToHarvest,
}

/// One-way harvest readiness state machine.
///
/// The fitted frequency is smoothed and differenced; a sliding regression
/// slope of that difference is then searched for a local minimum
/// (`Normal → CloseToHarvest`) followed by a local maximum
/// (`CloseToHarvest → ReadyToHarvest`).
#[derive(Debug, Clone)]
pub struct HarvestDetector {
    cfg: HarvestCfg,
    state: HarvestState,
}

impl HarvestDetector {
    pub fn new(cfg: HarvestCfg) -> Self {
        Self {
            cfg,
            state: HarvestState::Normal,
        }
    }

    pub fn state(&self) -> HarvestState {
        self.state
    }

    pub fn is_close(&self) -> bool {
        self.state != HarvestState::Normal
    }

    pub fn is_ready(&self) -> bool {
        self.state == HarvestState::ReadyToHarvest
    }

    /// Slope-of-slope series for `frequencies`, empty until there is enough data.
    pub fn slope_series(&self, frequencies: &[f64]) -> Vec<f64> {
        if frequencies.len() <= self.cfg.smoothing_window {
            return Vec::new();
        }
        let smoothed = savgol(frequencies, self.cfg.smoothing_window, SMOOTHING_ORDER);
        let diff: Vec<f64> = smoothed.windows(2).map(|w| w[1] - w[0]).collect();
        rolling_slopes(&diff, self.cfg.regression_window, self.cfg.tail_exclude)
    }

    /// Feed the current denoised `(hours, MHz)` series. Returns the new state
    /// when a transition fires.
    pub fn update(&mut self, series: &[(f64, f64)]) -> Option<HarvestState> {
        if !self.cfg.enabled || self.state == HarvestState::ReadyToHarvest {
            return None;
        }
        let &(now, _) = series.last()?;
        if now <= self.cfg.inoculation_hours + self.cfg.hours_after_inoculation {
            return None;
        }
        let freqs: Vec<f64> = series.iter().map(|&(_, f)| f).collect();
        let slopes = self.slope_series(&freqs);
        self.evaluate_slopes(&slopes)
    }

    /// Apply the pattern rules to an already computed slope series.
    pub fn evaluate_slopes(&mut self, slopes: &[f64]) -> Option<HarvestState> {
        let n = self.cfg.pattern_len;
        if n == 0 || slopes.len() < 2 * n {
            return None;
        }
        let last = slopes[slopes.len() - 1];
        if last.abs() <= self.cfg.slope_threshold {
            return None;
        }
        let recent = &slopes[slopes.len() - n..];
        let prior = &slopes[slopes.len() - 2 * n..slopes.len() - n];
        let next = match self.state {
            HarvestState::Normal if increasing(recent) && decreasing(prior) => {
                HarvestState::CloseToHarvest
            }
            HarvestState::CloseToHarvest if decreasing(recent) && increasing(prior) => {
                HarvestState::ReadyToHarvest
            }
            _ => return None,
        };
        info!(from = ?self.state, to = ?next, slope = last, "harvest state changed");
        self.state = next;
        Some(next)
    }
}

fn increasing(v: &[f64]) -> bool {
    v.windows(2).all(|w| w[1] > w[0])
}

fn decreasing(v: &[f64]) -> bool {
    v.windows(2).all(|w| w[1] < w[0])
}
