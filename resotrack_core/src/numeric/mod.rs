//! Small numerical toolkit used by the peak search, fitters and detectors.
//!
//! Everything works on plain `f64` slices; sizes are at most a few tens of
//! thousands of points, so dense normal equations are good enough.

pub mod density;
pub mod gaussian;
pub mod linalg;
pub mod poly;
pub mod regression;
pub mod savgol;
pub mod spline;

pub use density::{Density, classify};
pub use gaussian::{GaussianFit, fit_gaussian};
pub use poly::{Polynomial, polyfit};
pub use regression::{linear_slope, rolling_slopes};
pub use savgol::savgol;
pub use spline::CubicSpline;

/// `n` evenly spaced values from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Minimum of `values` and the index of its occurrence. When the minimum
/// occurs more than once, the index is the rounded mean of all occurrences.
pub fn min_with_tie_center(values: &[f64]) -> Option<(usize, f64)> {
    let min = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::INFINITY, f64::min);
    if !min.is_finite() {
        return None;
    }
    let (sum, count) = values
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v == min)
        .fold((0usize, 0usize), |(s, c), (i, _)| (s + i, c + 1));
    let idx = (sum as f64 / count as f64).round() as usize;
    Some((idx, min))
}

/// Index of the largest finite value.
pub fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

/// Index of the smallest finite value.
pub fn argmin(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linspace_includes_both_ends() {
        let v = linspace(1.0, 2.0, 5);
        assert_eq!(v, vec![1.0, 1.25, 1.5, 1.75, 2.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
        assert_eq!(linspace(3.0, 9.0, 1), vec![3.0]);
    }

    #[test]
    fn tied_minima_resolve_to_their_center() {
        assert_eq!(min_with_tie_center(&[3.0, 1.0, 2.0, 1.0, 5.0]), Some((2, 1.0)));
        assert_eq!(min_with_tie_center(&[0.0, 4.0]), Some((0, 0.0)));
        assert_eq!(min_with_tie_center(&[f64::NAN]), None);
        assert_eq!(min_with_tie_center(&[]), None);
    }

    #[test]
    fn argmax_skips_nan() {
        assert_eq!(argmax(&[1.0, f64::NAN, 3.0, 2.0]), Some(2));
        assert_eq!(argmin(&[1.0, f64::NAN, -3.0, 2.0]), Some(2));
    }
}
