//! Outlier removal for the fitted-frequency time series.
//!
//! Density classification over (hours, MHz) with parameters that tighten
//! as the run grows. Core and border points survive; noise is dropped.
//! Applying the filter to its own output changes nothing, since a shorter
//! series only ever gets looser parameters.
//!
//! The tightest setting needs 20 samples within 0.2 h, so runs longer than
//! 1000 cycles only survive at intervals up to
//! `resotrack_config::MAX_CYCLE_INTERVAL_S`.

use crate::numeric::{Density, classify};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DenoiseParams {
    pub eps: f64,
    pub min_samples: usize,
}

impl DenoiseParams {
    pub fn for_len(len: usize) -> Self {
        let (eps, min_samples) = match len {
            1001.. => (0.2, 20),
            101..=1000 => (0.5, 10),
            21..=100 => (0.6, 2),
            _ => (1.0, 1),
        };
        Self { eps, min_samples }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimeSeriesDenoiser;

impl TimeSeriesDenoiser {
    pub fn new() -> Self {
        Self
    }

    /// Indices of the points that survive. Points with a non-finite
    /// coordinate never survive.
    pub fn retained_indices(&self, series: &[(f64, f64)]) -> Vec<usize> {
        let finite: Vec<usize> = (0..series.len())
            .filter(|&i| series[i].0.is_finite() && series[i].1.is_finite())
            .collect();
        let params = DenoiseParams::for_len(finite.len());
        let pts: Vec<(f64, f64)> = finite.iter().map(|&i| series[i]).collect();
        classify(&pts, params.eps, params.min_samples)
            .into_iter()
            .zip(finite)
            .filter(|(label, _)| *label != Density::Noise)
            .map(|(_, i)| i)
            .collect()
    }

    pub fn denoise(&self, series: &[(f64, f64)]) -> Vec<(f64, f64)> {
        self.retained_indices(series)
            .into_iter()
            .map(|i| series[i])
            .collect()
    }

    /// Filter arbitrary items by their (time, value) coordinates.
    pub fn retain<T: Clone>(&self, items: &[T], coords: impl Fn(&T) -> (f64, f64)) -> Vec<T> {
        let series: Vec<(f64, f64)> = items.iter().map(&coords).collect();
        self.retained_indices(&series)
            .into_iter()
            .map(|i| items[i].clone())
            .collect()
    }
}
