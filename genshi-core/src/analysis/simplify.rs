//! Douglas–Peucker polyline simplification.

use crate::entity::StrokePoint;
use crate::geometry::Point;

use super::fit::segment_distance;

/// Indices of the points kept by Douglas–Peucker with the given tolerance.
///
/// The first and last indices are always kept. Uses an explicit stack so
/// long strokes cannot overflow the call stack.
#[must_use]
pub fn simplify_indices(points: &[Point], tolerance: f64) -> Vec<usize> {
    let n = points.len();
    if n <= 2 {
        return (0..n).collect();
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack = vec![(0, n - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let (mut farthest, mut max_dist) = (start, 0.0);
        for i in start + 1..end {
            let d = segment_distance(points[i], points[start], points[end]);
            if d > max_dist {
                farthest = i;
                max_dist = d;
            }
        }
        if max_dist > tolerance {
            keep[farthest] = true;
            stack.push((start, farthest));
            stack.push((farthest, end));
        }
    }

    keep.iter()
        .enumerate()
        .filter_map(|(i, k)| k.then_some(i))
        .collect()
}

/// Simplify stroke samples, keeping pen data of the surviving points.
#[must_use]
pub fn simplify(points: &[StrokePoint], tolerance: f64) -> Vec<StrokePoint> {
    let positions: Vec<Point> = points.iter().map(StrokePoint::position).collect();
    simplify_indices(&positions, tolerance)
        .into_iter()
        .map(|i| points[i])
        .collect()
}
