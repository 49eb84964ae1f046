/// Ordinary least-squares slope of `y` against `x`. `None` for fewer than
/// two points or when all `x` coincide.
pub fn linear_slope(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let mx = x[..n].iter().sum::<f64>() / n as f64;
    let my = y[..n].iter().sum::<f64>() / n as f64;
    let (sxy, sxx) = x[..n]
        .iter()
        .zip(&y[..n])
        .fold((0.0, 0.0), |(sxy, sxx), (&xi, &yi)| {
            (sxy + (xi - mx) * (yi - my), sxx + (xi - mx) * (xi - mx))
        });
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    slope.is_finite().then_some(slope)
}

/// Regression slope of `y` against its sample index over a sliding `window`,
/// one value per window position whose end does not reach into the last
/// `tail_exclude` samples.
pub fn rolling_slopes(y: &[f64], window: usize, tail_exclude: usize) -> Vec<f64> {
    if window < 2 || y.len() < window + tail_exclude {
        return Vec::new();
    }
    let usable = y.len() - tail_exclude;
    let idx: Vec<f64> = (0..window).map(|i| i as f64).collect();
    y[..usable]
        .windows(window)
        .filter_map(|w| linear_slope(&idx, w))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slope_of_a_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        assert_eq!(linear_slope(&x, &y), Some(2.0));
        assert_eq!(linear_slope(&[1.0, 1.0], &[0.0, 1.0]), None);
        assert_eq!(linear_slope(&[1.0], &[0.0]), None);
    }

    #[test]
    fn rolling_slopes_skip_the_tail() {
        let y: Vec<f64> = (0..20).map(|i| f64::from(i) * 0.5).collect();
        let s = rolling_slopes(&y, 5, 3);
        assert_eq!(s.len(), 20 - 3 - 5 + 1);
        assert!(s.iter().all(|v| (v - 0.5).abs() < 1e-12));
        assert!(rolling_slopes(&y, 15, 10).is_empty());
    }
}
