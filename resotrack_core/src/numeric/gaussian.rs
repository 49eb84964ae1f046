use crate::error::FitError;
use crate::numeric::{argmax, linalg::solve};

const MAX_ITERATIONS: usize = 200;
const MAX_LAMBDA: f64 = 1e12;

/// `amplitude · exp(-(x - centroid)² / (2·std²))`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianFit {
    pub amplitude: f64,
    pub centroid: f64,
    pub std: f64,
}

impl GaussianFit {
    pub fn eval(&self, x: f64) -> f64 {
        let d = x - self.centroid;
        self.amplitude * (-(d * d) / (2.0 * self.std * self.std)).exp()
    }
}

struct Bounds {
    amplitude: (f64, f64),
    centroid: (f64, f64),
    min_std: f64,
}

impl Bounds {
    fn clamp(&self, p: [f64; 3]) -> [f64; 3] {
        let std = if p[2].abs() < self.min_std {
            self.min_std.copysign(if p[2] == 0.0 { 1.0 } else { p[2] })
        } else {
            p[2]
        };
        [
            p[0].clamp(self.amplitude.0, self.amplitude.1),
            p[1].clamp(self.centroid.0, self.centroid.1),
            std,
        ]
    }
}

fn cost(x: &[f64], y: &[f64], p: [f64; 3]) -> f64 {
    let g = GaussianFit {
        amplitude: p[0],
        centroid: p[1],
        std: p[2],
    };
    x.iter().zip(y).map(|(&xi, &yi)| (g.eval(xi) - yi).powi(2)).sum()
}

/// Initial guess: peak sample for amplitude and centroid, half-maximum
/// width around it for the standard deviation.
fn initial_guess(x: &[f64], y: &[f64], min_std: f64) -> Option<[f64; 3]> {
    let peak = argmax(y)?;
    let half = y[peak] / 2.0;
    let mut lo = peak;
    while lo > 0 && y[lo - 1] >= half {
        lo -= 1;
    }
    let mut hi = peak;
    while hi + 1 < y.len() && y[hi + 1] >= half {
        hi += 1;
    }
    let fwhm = (x[hi] - x[lo]).abs();
    let spacing = (x[x.len() - 1] - x[0]).abs() / (x.len() - 1) as f64;
    let std = (fwhm / 2.354_820_045).max(spacing).max(min_std);
    Some([y[peak], x[peak], std])
}

/// Least-squares Gaussian fit by Levenberg–Marquardt.
///
/// Amplitude is bounded to `[min(y), max(y)]` and the centroid to
/// `[min(x), max(x)]`; the standard deviation is free apart from a tiny
/// floor that keeps the model defined. The returned `std` is positive.
pub fn fit_gaussian(x: &[f64], y: &[f64]) -> Result<GaussianFit, FitError> {
    let n = x.len().min(y.len());
    if n < 3 {
        return Err(FitError::InsufficientData { needed: 3, got: n });
    }
    let (x, y) = (&x[..n], &y[..n]);
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }
    let fold = |v: &[f64]| {
        v.iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &a| {
                (lo.min(a), hi.max(a))
            })
    };
    let (y_min, y_max) = fold(y);
    let (x_min, x_max) = fold(x);
    if x_max <= x_min {
        return Err(FitError::BadFit("all x are equal".into()));
    }
    let bounds = Bounds {
        amplitude: (y_min, y_max),
        centroid: (x_min, x_max),
        min_std: (x_max - x_min) * 1e-9,
    };

    let mut p = bounds.clamp(
        initial_guess(x, y, bounds.min_std).ok_or(FitError::NonFinite)?,
    );
    let mut current = cost(x, y, p);
    let mut lambda = 1e-3;

    for _ in 0..MAX_ITERATIONS {
        let mut jtj = [[0.0; 3]; 3];
        let mut jtr = [0.0; 3];
        for (&xi, &yi) in x.iter().zip(y) {
            let d = xi - p[1];
            let s2 = p[2] * p[2];
            let e = (-(d * d) / (2.0 * s2)).exp();
            let r = p[0] * e - yi;
            let j = [e, p[0] * e * d / s2, p[0] * e * d * d / (s2 * p[2])];
            for a in 0..3 {
                jtr[a] += j[a] * r;
                for b in 0..3 {
                    jtj[a][b] += j[a] * j[b];
                }
            }
        }

        let mut improved = false;
        while lambda <= MAX_LAMBDA {
            let a = (0..3)
                .map(|r| {
                    (0..3)
                        .map(|c| {
                            if r == c {
                                jtj[r][c] + lambda * jtj[r][c].max(1e-12)
                            } else {
                                jtj[r][c]
                            }
                        })
                        .collect()
                })
                .collect();
            let Some(delta) = solve(a, jtr.iter().map(|g| -g).collect()) else {
                lambda *= 10.0;
                continue;
            };
            let candidate = bounds.clamp([p[0] + delta[0], p[1] + delta[1], p[2] + delta[2]]);
            let next = cost(x, y, candidate);
            if next.is_finite() && next < current {
                let gain = current - next;
                p = candidate;
                current = next;
                lambda = (lambda / 10.0).max(1e-12);
                improved = gain > 1e-14 * current.max(1e-300);
                break;
            }
            lambda *= 10.0;
        }
        if !improved {
            break;
        }
    }

    let fit = GaussianFit {
        amplitude: p[0],
        centroid: p[1],
        std: p[2].abs(),
    };
    if [fit.amplitude, fit.centroid, fit.std]
        .iter()
        .all(|v| v.is_finite())
    {
        Ok(fit)
    } else {
        Err(FitError::NonFinite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(g: GaussianFit, x0: f64, x1: f64, step: f64) -> (Vec<f64>, Vec<f64>) {
        let n = ((x1 - x0) / step).round() as usize;
        let x: Vec<f64> = (0..n).map(|i| x0 + step * i as f64).collect();
        let y = x.iter().map(|&v| g.eval(v)).collect();
        (x, y)
    }

    #[test]
    fn recovers_a_clean_peak() {
        let truth = GaussianFit {
            amplitude: 2.0,
            centroid: 5.3,
            std: 0.7,
        };
        let (x, y) = sample(truth, 0.0, 10.0, 0.05);
        let fit = fit_gaussian(&x, &y).unwrap();
        assert!((fit.amplitude - 2.0).abs() < 1e-4, "{fit:?}");
        assert!((fit.centroid - 5.3).abs() < 1e-4, "{fit:?}");
        assert!((fit.std - 0.7).abs() < 1e-4, "{fit:?}");
    }

    #[test]
    fn amplitude_stays_within_data_range() {
        let x: Vec<f64> = (0..50).map(|i| f64::from(i) * 2.0).collect();
        let y = vec![1.0; 50];
        let fit = fit_gaussian(&x, &y).unwrap();
        assert!(fit.amplitude <= 1.0 + 1e-12);
        assert!(fit.centroid >= 0.0 && fit.centroid <= 98.0);
    }

    #[test]
    fn needs_three_points() {
        let err = fit_gaussian(&[1.0, 2.0], &[1.0, 2.0]).unwrap_err();
        assert_eq!(err, FitError::InsufficientData { needed: 3, got: 2 });
    }
}
