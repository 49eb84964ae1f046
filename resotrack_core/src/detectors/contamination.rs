use tracing::{debug, warn};

use crate::config::ContaminationCfg;
use crate::numeric::linear_slope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContaminationStatus {
    /// This cycle's slope comparison was anomalous.
    pub anomalous: bool,
    pub streak: u32,
    /// Latched once the streak exceeds the configured tolerance.
    pub confirmed: bool,
    /// True only on the cycle that confirmed.
    pub newly_confirmed: bool,
}

/// Flags a sudden acceleration of the minimum-frequency trend that persists
/// across consecutive cycles.
#[derive(Debug, Clone)]
pub struct ContaminationDetector {
    cfg: ContaminationCfg,
    streak: u32,
    confirmed: bool,
}

impl ContaminationDetector {
    pub fn new(cfg: ContaminationCfg) -> Self {
        Self {
            cfg,
            streak: 0,
            confirmed: false,
        }
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Compare the slope over the most recent window of `(hours, MHz)`
    /// points with the window before it. Too little data counts as a
    /// normal cycle.
    pub fn update(&mut self, series: &[(f64, f64)]) -> ContaminationStatus {
        let w = self.cfg.window;
        if !self.cfg.enabled || w < 2 || series.len() < 2 * w {
            return self.observe(None);
        }
        let slope = |pts: &[(f64, f64)]| {
            let (x, y): (Vec<f64>, Vec<f64>) = pts.iter().copied().unzip();
            linear_slope(&x, &y)
        };
        let n = series.len();
        let recent = slope(&series[n - w..]);
        let previous = slope(&series[n - 2 * w..n - w]);
        self.observe(recent.zip(previous))
    }

    /// Record one cycle's `(recent, previous)` slopes; `None` is a normal cycle.
    pub fn observe(&mut self, slopes: Option<(f64, f64)>) -> ContaminationStatus {
        let anomalous = slopes.is_some_and(|(recent, previous)| {
            recent.abs() > self.cfg.slope_ratio * previous.abs()
                && previous.abs() > self.cfg.min_previous_slope
        });
        if anomalous {
            self.streak += 1;
            debug!(streak = self.streak, ?slopes, "anomalous growth slope");
        } else {
            self.streak = 0;
        }
        let newly_confirmed = !self.confirmed && self.streak > self.cfg.streak;
        if newly_confirmed {
            warn!(streak = self.streak, "contamination confirmed");
            self.confirmed = true;
        }
        ContaminationStatus {
            anomalous,
            streak: self.streak,
            confirmed: self.confirmed,
            newly_confirmed,
        }
    }
}
