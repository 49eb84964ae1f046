/// Density-based point classification (DBSCAN core/border/noise) for 2-D
/// points under the Euclidean metric.
///
/// A point is `Core` when at least `min_samples` points, itself included,
/// lie within `eps`; `Border` when it is not core but lies within `eps` of a
/// core point; `Noise` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Density {
    Core,
    Border,
    Noise,
}

/// Classify every point. Non-finite points are always noise.
pub fn classify(points: &[(f64, f64)], eps: f64, min_samples: usize) -> Vec<Density> {
    let n = points.len();
    let mut order: Vec<usize> = (0..n)
        .filter(|&i| points[i].0.is_finite() && points[i].1.is_finite())
        .collect();
    order.sort_by(|&a, &b| points[a].0.total_cmp(&points[b].0));

    let eps2 = eps * eps;
    // Neighbours of the point at sorted position `k`, found by scanning the
    // x-sorted order outwards until the x gap alone exceeds eps.
    let neighbours = |k: usize| -> Vec<usize> {
        let (px, py) = points[order[k]];
        let within = |j: usize| {
            let (qx, qy) = points[order[j]];
            (qx - px).powi(2) + (qy - py).powi(2) <= eps2
        };
        let mut out = vec![order[k]];
        let mut j = k;
        while j > 0 && px - points[order[j - 1]].0 <= eps {
            j -= 1;
            if within(j) {
                out.push(order[j]);
            }
        }
        let mut j = k + 1;
        while j < order.len() && points[order[j]].0 - px <= eps {
            if within(j) {
                out.push(order[j]);
            }
            j += 1;
        }
        out
    };

    let mut labels = vec![Density::Noise; n];
    let mut hoods = Vec::with_capacity(order.len());
    for k in 0..order.len() {
        let hood = neighbours(k);
        if hood.len() >= min_samples {
            labels[order[k]] = Density::Core;
        }
        hoods.push(hood);
    }
    for (k, hood) in hoods.iter().enumerate() {
        let i = order[k];
        if labels[i] != Density::Core && hood.iter().any(|&j| labels[j] == Density::Core) {
            labels[i] = Density::Border;
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_run_with_an_outlier() {
        let mut pts: Vec<(f64, f64)> = (0..10).map(|i| (f64::from(i) * 0.1, 0.0)).collect();
        pts.push((0.5, 5.0));
        let labels = classify(&pts, 0.15, 3);
        assert_eq!(labels[10], Density::Noise);
        assert_eq!(labels[0], Density::Border);
        assert_eq!(labels[9], Density::Border);
        assert!(labels[1..9].iter().all(|l| *l == Density::Core));
    }

    #[test]
    fn isolated_points_are_noise() {
        let pts = [(0.0, 0.0), (10.0, 0.0), (20.0, f64::NAN)];
        assert_eq!(classify(&pts, 1.0, 2), vec![Density::Noise; 3]);
    }

    #[test]
    fn min_samples_counts_the_point_itself() {
        let pts = [(0.0, 0.0), (0.5, 0.0)];
        assert_eq!(classify(&pts, 1.0, 2), vec![Density::Core; 2]);
    }
}
