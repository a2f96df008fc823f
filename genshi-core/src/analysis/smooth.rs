//! Pressure-weighted stroke smoothing.

use crate::entity::StrokePoint;

/// Exponentially smooth sample positions, trusting firm samples more.
///
/// Each position moves toward the previous smoothed one by
/// `strength * (1 - pressure)`, so full-pressure samples are kept as
/// drawn and light, jittery ones are pulled in line. The first and last
/// samples are never moved. Pen data is left untouched.
#[must_use]
pub fn smooth_by_pressure(points: &[StrokePoint], strength: f64) -> Vec<StrokePoint> {
    let strength = if strength.is_finite() {
        strength.clamp(0.0, 1.0)
    } else {
        0.0
    };
    if strength <= 0.0 || points.len() <= 2 {
        return points.to_vec();
    }

    let mut out = Vec::with_capacity(points.len());
    let mut prev = points[0];
    out.push(prev);
    for p in &points[1..points.len() - 1] {
        let weight = strength * (1.0 - p.pressure.clamp(0.0, 1.0));
        let mut smoothed = *p;
        smoothed.x = p.x + weight * (prev.x - p.x);
        smoothed.y = p.y + weight * (prev.y - p.y);
        out.push(smoothed);
        prev = smoothed;
    }
    out.push(points[points.len() - 1]);
    out
}
