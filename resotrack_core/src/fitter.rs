//! Sub-sample estimation of the resonance minimum.
//!
//! Input sweeps are in attenuation dB, so the resonance is a dip. Both
//! methods first drop outliers by density classification on
//! (frequency, magnitude) pairs.

use tracing::trace;

use crate::config::{FitMethod, FitterCfg};
use crate::error::FitError;
use crate::numeric::{
    CubicSpline, Density, argmin, classify, linspace, mean, min_with_tie_center, polyfit,
};
use crate::sweep::Sweep;

const GRID_POINTS: usize = 1000;
const BAND_START: f64 = 0.1;
const BAND_STEP: f64 = 0.05;
const BAND_MAX: f64 = 4.0;
/// Dips shallower than this (relative to the sweep mean) use the narrow band.
const DEEP_DIP_DB: f64 = 1.0;
const NARROW_BAND_POINTS: usize = 51;
const WIDE_BAND_POINTS: usize = 101;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FittedPoint {
    pub frequency_mhz: f64,
    pub magnitude: f64,
}

impl FittedPoint {
    pub const NAN: FittedPoint = FittedPoint {
        frequency_mhz: f64::NAN,
        magnitude: f64::NAN,
    };
}

#[derive(Debug, Clone)]
pub struct SignalFitter {
    cfg: FitterCfg,
}

impl SignalFitter {
    pub fn new(cfg: FitterCfg) -> Self {
        Self { cfg }
    }

    pub fn cfg(&self) -> &FitterCfg {
        &self.cfg
    }

    /// Lowest sample of the sweep; ties resolve to the middle occurrence.
    pub fn raw_minimum(sweep: &Sweep) -> Option<FittedPoint> {
        let (idx, magnitude) = min_with_tie_center(&sweep.values)?;
        Some(FittedPoint {
            frequency_mhz: sweep.frequencies[idx],
            magnitude,
        })
    }

    pub fn fit(&self, sweep: &Sweep) -> Result<FittedPoint, FitError> {
        match self.cfg.method {
            FitMethod::Quadratic => self.fit_quadratic(sweep),
            FitMethod::Spline => self.fit_spline(sweep),
        }
    }

    /// Points the density classifier marks as core.
    fn core_points(sweep: &Sweep, eps: f64, min_samples: usize) -> (Vec<f64>, Vec<f64>) {
        let pts: Vec<(f64, f64)> = sweep.points().collect();
        classify(&pts, eps, min_samples)
            .into_iter()
            .zip(pts)
            .filter(|(label, _)| *label == Density::Core)
            .map(|(_, p)| p)
            .unzip()
    }

    /// Parabola through the points within a growing magnitude band above
    /// the minimum, evaluated on a fine grid.
    pub fn fit_quadratic(&self, sweep: &Sweep) -> Result<FittedPoint, FitError> {
        let (xs, ys) = Self::core_points(sweep, self.cfg.denoise_radius, self.cfg.denoise_min_samples);
        if xs.len() < 3 {
            return Err(FitError::InsufficientData {
                needed: 3,
                got: xs.len(),
            });
        }
        let (_, min) = min_with_tie_center(&ys).ok_or(FitError::NonFinite)?;
        let sweep_mean = mean(&sweep.values).ok_or(FitError::NonFinite)?;
        let target = if min.abs() - sweep_mean.abs() < DEEP_DIP_DB {
            NARROW_BAND_POINTS
        } else {
            WIDE_BAND_POINTS
        };

        let mut k = 0u32;
        let (bx, by) = loop {
            let delta = (BAND_START + BAND_STEP * f64::from(k)).min(BAND_MAX);
            let band: (Vec<f64>, Vec<f64>) = xs
                .iter()
                .zip(&ys)
                .filter(|&(_, &y)| y <= min + delta)
                .map(|(&x, &y)| (x, y))
                .unzip();
            if band.0.len() > target || delta >= BAND_MAX {
                trace!(delta, points = band.0.len(), target, "quadratic band");
                break band;
            }
            k += 1;
        };
        if bx.len() < 3 {
            return Err(FitError::InsufficientData {
                needed: 3,
                got: bx.len(),
            });
        }

        let poly = polyfit(&bx, &by, 2)?;
        let lo = bx.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = bx.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self::grid_minimum(&linspace(lo, hi, GRID_POINTS), |x| poly.eval(x))
    }

    /// Natural cubic spline through the denoised sweep, evaluated on a fine
    /// grid around the raw minimum.
    pub fn fit_spline(&self, sweep: &Sweep) -> Result<FittedPoint, FitError> {
        let (xs, ys) = Self::core_points(
            sweep,
            self.cfg.spline_denoise_radius,
            self.cfg.denoise_min_samples,
        );
        let (idx, _) = min_with_tie_center(&ys).ok_or(FitError::InsufficientData {
            needed: 3,
            got: xs.len(),
        })?;
        let center = xs[idx];

        let mut kx = Vec::with_capacity(xs.len());
        let mut ky = Vec::with_capacity(ys.len());
        for (&x, &y) in xs.iter().zip(&ys) {
            if kx.last().is_none_or(|&last: &f64| x > last) {
                kx.push(x);
                ky.push(y);
            }
        }
        let spline = CubicSpline::natural(&kx, &ky)?;

        let lo = (center - self.cfg.spline_half_span_mhz).max(spline.first_knot());
        let hi = (center + self.cfg.spline_half_span_mhz).min(spline.last_knot());
        let step = self.cfg.spline_step_mhz;
        if step.is_nan() || step <= 0.0 || hi < lo {
            return Err(FitError::BadFit("empty spline evaluation window".into()));
        }
        let n = ((hi - lo) / step).floor() as usize + 1;
        let grid: Vec<f64> = (0..n).map(|i| lo + step * i as f64).collect();
        Self::grid_minimum(&grid, |x| spline.eval(x))
    }

    fn grid_minimum(grid: &[f64], f: impl Fn(f64) -> f64) -> Result<FittedPoint, FitError> {
        let values: Vec<f64> = grid.iter().map(|&x| f(x)).collect();
        let i = argmin(&values).ok_or(FitError::NonFinite)?;
        Ok(FittedPoint {
            frequency_mhz: grid[i],
            magnitude: values[i],
        })
    }
}
