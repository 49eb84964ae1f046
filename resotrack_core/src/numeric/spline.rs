use crate::error::FitError;

/// Natural cubic spline through strictly increasing knots.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivatives at the knots; zero at both ends.
    m: Vec<f64>,
}

impl CubicSpline {
    pub fn natural(x: &[f64], y: &[f64]) -> Result<Self, FitError> {
        let n = x.len().min(y.len());
        if n < 3 {
            return Err(FitError::InsufficientData { needed: 3, got: n });
        }
        let (x, y) = (&x[..n], &y[..n]);
        if x.iter().chain(y).any(|v| !v.is_finite()) {
            return Err(FitError::NonFinite);
        }
        if x.windows(2).any(|w| w[1] <= w[0]) {
            return Err(FitError::BadFit("spline knots must be strictly increasing".into()));
        }

        // Tridiagonal system for the interior second derivatives (Thomas algorithm).
        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let inner = n - 2;
        let mut diag = vec![0.0; inner];
        let mut upper = vec![0.0; inner];
        let mut rhs = vec![0.0; inner];
        for i in 0..inner {
            diag[i] = 2.0 * (h[i] + h[i + 1]);
            upper[i] = h[i + 1];
            rhs[i] = 6.0 * ((y[i + 2] - y[i + 1]) / h[i + 1] - (y[i + 1] - y[i]) / h[i]);
        }
        for i in 1..inner {
            let w = h[i] / diag[i - 1];
            diag[i] -= w * upper[i - 1];
            rhs[i] -= w * rhs[i - 1];
        }
        let mut m = vec![0.0; n];
        for i in (0..inner).rev() {
            let next = if i + 1 < inner { m[i + 2] } else { 0.0 };
            m[i + 1] = (rhs[i] - upper[i] * next) / diag[i];
        }

        Ok(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            m,
        })
    }

    pub fn first_knot(&self) -> f64 {
        self.x[0]
    }

    pub fn last_knot(&self) -> f64 {
        self.x[self.x.len() - 1]
    }

    /// Evaluate at `t`; outside the knots the end segments are extended.
    pub fn eval(&self, t: f64) -> f64 {
        let last = self.x.len() - 2;
        let i = self.x.partition_point(|&v| v <= t).saturating_sub(1).min(last);
        let h = self.x[i + 1] - self.x[i];
        let a = (self.x[i + 1] - t) / h;
        let b = (t - self.x[i]) / h;
        a * self.y[i]
            + b * self.y[i + 1]
            + ((a * a * a - a) * self.m[i] + (b * b * b - b) * self.m[i + 1]) * h * h / 6.0
    }
}
