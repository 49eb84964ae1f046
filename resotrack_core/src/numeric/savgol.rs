use crate::numeric::linalg::solve;
use crate::numeric::poly::polyfit;

/// Savitzky–Golay smoothing with an odd `window` and polynomial `order`.
///
/// Returns the input unchanged unless it is longer than the window. Interior
/// points use the convolution coefficients; the first and last half-windows
/// are evaluated on a polynomial fitted to the first/last full window.
pub fn savgol(y: &[f64], window: usize, order: usize) -> Vec<f64> {
    if window % 2 == 0 || window <= order || y.len() <= window {
        return y.to_vec();
    }
    let Some(coeffs) = coefficients(window, order) else {
        return y.to_vec();
    };
    let half = window / 2;
    let mut out = y.to_vec();

    for (i, slot) in out.iter_mut().enumerate().take(y.len() - half).skip(half) {
        *slot = coeffs
            .iter()
            .zip(&y[i - half..=i + half])
            .map(|(c, v)| c * v)
            .sum();
    }

    let n = y.len();
    let xs: Vec<f64> = (0..window).map(|i| i as f64).collect();
    if let Ok(head) = polyfit(&xs, &y[..window], order) {
        for (i, slot) in out.iter_mut().enumerate().take(half) {
            *slot = head.eval(i as f64);
        }
    }
    if let Ok(tail) = polyfit(&xs, &y[n - window..], order) {
        for (j, slot) in out[n - half..].iter_mut().enumerate() {
            *slot = tail.eval((window - half + j) as f64);
        }
    }
    out
}

/// Convolution weights that evaluate the local least-squares polynomial at
/// the window center.
fn coefficients(window: usize, order: usize) -> Option<Vec<f64>> {
    let half = (window / 2) as f64;
    let ts: Vec<f64> = (0..window).map(|j| j as f64 - half).collect();
    let terms = order + 1;
    let a = (0..terms)
        .map(|r| {
            (0..terms)
                .map(|c| ts.iter().map(|t| t.powi((r + c) as i32)).sum())
                .collect()
        })
        .collect();
    let mut e0 = vec![0.0; terms];
    e0[0] = 1.0;
    let z = solve(a, e0)?;
    Some(
        ts.iter()
            .map(|t| z.iter().rev().fold(0.0, |acc, zk| acc * t + zk))
            .collect(),
    )
}
