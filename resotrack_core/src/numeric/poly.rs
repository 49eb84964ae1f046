use crate::error::FitError;
use crate::numeric::linalg::solve;

/// Least-squares polynomial, stored in a centered and scaled variable
/// `t = (x - shift) / scale` to keep the normal equations well conditioned.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    /// Ascending powers of `t`.
    coeffs: Vec<f64>,
    shift: f64,
    scale: f64,
}

impl Polynomial {
    pub fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    pub fn eval(&self, x: f64) -> f64 {
        let t = (x - self.shift) / self.scale;
        self.coeffs.iter().rev().fold(0.0, |acc, c| acc * t + c)
    }

    /// Coefficients in ascending powers of `x`.
    pub fn coefficients(&self) -> Vec<f64> {
        let mut out = vec![0.0];
        for &c in self.coeffs.iter().rev() {
            // out = out * (x - shift) / scale + c
            let mut next = vec![0.0; out.len() + 1];
            for (i, &o) in out.iter().enumerate() {
                next[i + 1] += o / self.scale;
                next[i] -= o * self.shift / self.scale;
            }
            next[0] += c;
            out = next;
        }
        out.truncate(self.coeffs.len().max(1));
        out
    }
}

/// Fit a polynomial of `degree` to `(x, y)` by least squares.
///
/// Fails with `InsufficientData` when there are not more points than
/// coefficients minus one, and with `BadFit` when the design is rank
/// deficient (too few distinct `x`).
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Result<Polynomial, FitError> {
    let n = x.len().min(y.len());
    let terms = degree + 1;
    if n < terms {
        return Err(FitError::InsufficientData {
            needed: terms,
            got: n,
        });
    }
    if x[..n].iter().chain(&y[..n]).any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }

    let shift = x[..n].iter().sum::<f64>() / n as f64;
    let scale = x[..n].iter().fold(0.0_f64, |m, v| m.max((v - shift).abs()));
    if scale == 0.0 {
        return Err(FitError::BadFit("rank deficient: all x are equal".into()));
    }

    // Power sums Σ t^k for k in 0..=2·degree, and Σ t^k·y for k in 0..=degree.
    let mut t_pow = vec![0.0; 2 * degree + 1];
    let mut ty = vec![0.0; terms];
    for (&xi, &yi) in x[..n].iter().zip(&y[..n]) {
        let t = (xi - shift) / scale;
        let mut p = 1.0;
        for (k, s) in t_pow.iter_mut().enumerate() {
            *s += p;
            if k < terms {
                ty[k] += p * yi;
            }
            p *= t;
        }
    }
    let a = (0..terms)
        .map(|r| (0..terms).map(|c| t_pow[r + c]).collect())
        .collect();
    let coeffs = solve(a, ty).ok_or_else(|| FitError::BadFit("rank deficient design".into()))?;
    Ok(Polynomial {
        coeffs,
        shift,
        scale,
    })
}
