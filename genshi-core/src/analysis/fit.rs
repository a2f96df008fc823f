//! Fit residuals between a source path and a translated one.

use crate::geometry::{Bounds, Point};

/// Upper bound on source points measured against the fitted path.
const RESIDUAL_SAMPLE_LIMIT: usize = 256;

/// Distance from `p` to the segment `a`-`b`.
pub(crate) fn segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f64::EPSILON {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance(Point::new(a.x + t * dx, a.y + t * dy))
}

/// Distance from `p` to the nearest part of the polyline `path`.
fn path_distance(p: Point, path: &[Point]) -> f64 {
    match path {
        [] => f64::INFINITY,
        [only] => p.distance(*only),
        _ => path
            .windows(2)
            .map(|w| segment_distance(p, w[0], w[1]))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Mean distance from `points` to the polyline `path`.
///
/// Long inputs are sampled at a fixed stride. Returns `None` if either side
/// is empty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_residual(points: &[Point], path: &[Point]) -> Option<f64> {
    if points.is_empty() || path.is_empty() {
        return None;
    }
    let stride = points.len().div_ceil(RESIDUAL_SAMPLE_LIMIT).max(1);
    let (sum, n) = points
        .iter()
        .step_by(stride)
        .fold((0.0, 0_usize), |(sum, n), p| {
            (sum + path_distance(*p, path), n + 1)
        });
    Some(sum / n as f64)
}

/// Quality of a fit in `0.0..=1.0`: one for a perfect fit, falling to zero
/// once the mean residual reaches a quarter of the source's diagonal.
#[must_use]
pub fn fit_quality(residual: f64, bounds: &Bounds) -> f64 {
    let scale = bounds.diagonal() / 4.0;
    if !residual.is_finite() {
        return 0.0;
    }
    if scale <= f64::EPSILON {
        return if residual <= f64::EPSILON { 1.0 } else { 0.0 };
    }
    (1.0 - residual / scale).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: u32, y: f64) -> Vec<Point> {
        (0..n).map(|i| Point::new(f64::from(i) * 10.0, y)).collect()
    }

    #[test]
    fn test_identical_paths_fit_perfectly() {
        let path = line(10, 0.0);
        assert_eq!(mean_residual(&path, &path), Some(0.0));
        let bounds = Bounds::new(0.0, 0.0, 90.0, 0.0);
        assert!((fit_quality(0.0, &bounds) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_offset_path_residual() {
        let source = line(10, 0.0);
        let shifted = line(10, 3.0);
        let residual = mean_residual(&source, &shifted).unwrap();
        assert!((residual - 3.0).abs() < 1e-9);

        // Diagonal 100, scale 25.
        let bounds = Bounds::new(0.0, 0.0, 60.0, 80.0);
        assert!((fit_quality(residual, &bounds) - 0.88).abs() < 1e-9);
        assert!(fit_quality(40.0, &bounds).abs() < f64::EPSILON);
    }

    #[test]
    fn test_single_point_path() {
        let residual = mean_residual(&[Point::new(3.0, 4.0)], &[Point::new(0.0, 0.0)]);
        assert_eq!(residual, Some(5.0));
    }

    #[test]
    fn test_empty_sides() {
        assert!(mean_residual(&[], &line(2, 0.0)).is_none());
        assert!(mean_residual(&line(2, 0.0), &[]).is_none());
        let point = Bounds::new(1.0, 1.0, 1.0, 1.0);
        assert!(fit_quality(0.5, &point).abs() < f64::EPSILON);
        assert!(fit_quality(f64::NAN, &point).abs() < f64::EPSILON);
    }
}
