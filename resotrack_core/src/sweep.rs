//! Sweep data and the baseline calibration curve.

use crate::error::SensorError;

/// Frequencies (MHz) and per-point values from one sweep. The values are
/// volts, calibration ratios or dB depending on the pipeline stage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sweep {
    pub frequencies: Vec<f64>,
    pub values: Vec<f64>,
}

impl Sweep {
    pub fn new(frequencies: Vec<f64>, values: Vec<f64>) -> Self {
        debug_assert_eq!(frequencies.len(), values.len());
        Self {
            frequencies,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len().min(self.frequencies.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.frequencies
            .iter()
            .copied()
            .zip(self.values.iter().copied())
    }

    /// Apply `f` to every value, dropping points whose result is not finite.
    pub fn map_values(&self, f: impl Fn(f64, f64) -> f64) -> Sweep {
        let (frequencies, values) = self
            .points()
            .map(|(x, y)| (x, f(x, y)))
            .filter(|(_, y)| y.is_finite())
            .unzip();
        Sweep {
            frequencies,
            values,
        }
    }

    /// Convert calibration ratios to attenuation in dB, so a resonance
    /// reads as a dip.
    pub fn to_attenuation_db(&self) -> Sweep {
        self.map_values(|_, ratio| {
            if ratio > 0.0 {
                -20.0 * ratio.log10()
            } else {
                f64::NAN
            }
        })
    }
}

/// Baseline scan: the response with no sensor resonance in range, sorted by
/// frequency. Later sweeps are divided by it.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationCurve {
    frequencies: Vec<f64>,
    volts: Vec<f64>,
}

impl CalibrationCurve {
    /// Frequencies must be finite and strictly increasing; at least one point.
    pub fn new(frequencies: Vec<f64>, volts: Vec<f64>) -> Result<Self, SensorError> {
        if frequencies.is_empty() || frequencies.len() != volts.len() {
            return Err(SensorError::InvalidConfig(format!(
                "calibration needs matching non-empty columns (got {} frequencies, {} values)",
                frequencies.len(),
                volts.len()
            )));
        }
        if frequencies.iter().chain(volts.iter()).any(|v| !v.is_finite()) {
            return Err(SensorError::InvalidConfig(
                "calibration contains non-finite values".into(),
            ));
        }
        if frequencies.windows(2).any(|w| w[1] <= w[0]) {
            return Err(SensorError::InvalidConfig(
                "calibration frequencies must be strictly increasing".into(),
            ));
        }
        Ok(Self { frequencies, volts })
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn volts(&self) -> &[f64] {
        &self.volts
    }

    /// Index of the calibration point nearest to `mhz`, clamped to the ends.
    pub fn nearest_index(&self, mhz: f64) -> usize {
        let idx = self.frequencies.partition_point(|&f| f < mhz);
        if idx == 0 {
            return 0;
        }
        if idx >= self.frequencies.len() {
            return self.frequencies.len() - 1;
        }
        let below = mhz - self.frequencies[idx - 1];
        let above = self.frequencies[idx] - mhz;
        if below <= above { idx - 1 } else { idx }
    }

    /// Ratio of `volts` to the baseline at the nearest calibration frequency.
    pub fn compare(&self, mhz: f64, volts: f64) -> f64 {
        volts / self.volts[self.nearest_index(mhz)]
    }

    /// Divide every point of `sweep` by the baseline.
    pub fn apply(&self, sweep: &Sweep) -> Sweep {
        sweep.map_values(|f, v| self.compare(f, v))
    }
}

impl TryFrom<&[resotrack_config::CalibrationRow]> for CalibrationCurve {
    type Error = SensorError;

    fn try_from(rows: &[resotrack_config::CalibrationRow]) -> Result<Self, Self::Error> {
        let (f, v) = rows.iter().map(|r| (r.frequency_mhz, r.volts)).unzip();
        Self::new(f, v)
    }
}

impl From<&CalibrationCurve> for Vec<resotrack_config::CalibrationRow> {
    fn from(c: &CalibrationCurve) -> Self {
        c.frequencies
            .iter()
            .zip(&c.volts)
            .map(|(&frequency_mhz, &volts)| resotrack_config::CalibrationRow {
                frequency_mhz,
                volts,
            })
            .collect()
    }
}
