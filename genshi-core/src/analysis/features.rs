//! Stroke feature extraction and coarse pattern classification.

use std::f64::consts::{FRAC_PI_4, PI};

use serde::{Deserialize, Serialize};

use crate::entity::{PatternType, StrokePoint};
use crate::geometry::{Bounds, Point};

/// Upper bound on points compared pairwise by the symmetry score.
const SYMMETRY_SAMPLE_LIMIT: usize = 256;

/// Turns smaller than this, in radians, count as straight.
const STRAIGHT_TURN: f64 = 1e-6;

/// Thresholds used by [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureThresholds {
    /// Minimum smoothness of a linear stroke.
    pub linear_smoothness: f64,
    /// Complexity below which a smooth stroke is linear.
    pub linear_complexity: f64,
    /// Below this complexity a stroke is a curve.
    pub curve_complexity: f64,
    /// Maximum smoothness of a complex stroke.
    pub complex_smoothness: f64,
    /// Minimum turn reversal rate of a complex stroke. Smooth oscillation
    /// reverses a handful of times per period and stays organic.
    pub complex_reversal: f64,
}

impl Default for FeatureThresholds {
    fn default() -> Self {
        Self {
            linear_smoothness: 0.85,
            linear_complexity: 0.1,
            curve_complexity: 0.3,
            complex_smoothness: 0.15,
            complex_reversal: 0.5,
        }
    }
}

/// Features of a point sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeFeatures {
    /// Bounds of the positions.
    pub bounds: Bounds,
    /// Signed turn between consecutive segments, in radians.
    pub turning_angles: Vec<f64>,
    /// Turning-angle spread in `0.0..=1.0`.
    pub complexity: f64,
    /// Inverse of total turn per unit length, in `0.0..=1.0`.
    pub smoothness: f64,
    /// Share of consecutive turns that change direction, over the full
    /// density input, in `0.0..=1.0`.
    pub reversal_rate: f64,
    /// Point-reflection symmetry about the centroid, in `0.0..=1.0`.
    pub symmetry: f64,
    /// Coarse classification.
    pub pattern_type: PatternType,
    /// Total polyline length.
    pub path_length: f64,
    /// Mean pen pressure.
    pub mean_pressure: f64,
    /// Direction from first to last point, in radians.
    pub dominant_angle: f64,
    /// Number of distinct positions analysed.
    pub point_count: usize,
}

/// Wrap an angle into `(-PI, PI]`.
fn wrap_angle(mut a: f64) -> f64 {
    while a <= -PI {
        a += 2.0 * PI;
    }
    while a > PI {
        a -= 2.0 * PI;
    }
    a
}

/// Signed turning angle at every interior vertex.
#[must_use]
pub fn turning_angles(points: &[Point]) -> Vec<f64> {
    points
        .windows(3)
        .map(|w| {
            let a = (w[1].y - w[0].y).atan2(w[1].x - w[0].x);
            let b = (w[2].y - w[1].y).atan2(w[2].x - w[1].x);
            wrap_angle(b - a)
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)] // Point counts are far below 2^52
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[allow(clippy::cast_precision_loss)]
fn symmetry(points: &[Point], bounds: &Bounds) -> f64 {
    let diag = bounds.diagonal();
    if diag <= f64::EPSILON {
        return 1.0;
    }
    let stride = points.len().div_ceil(SYMMETRY_SAMPLE_LIMIT).max(1);
    let sample: Vec<Point> = points.iter().step_by(stride).copied().collect();
    let n = sample.len() as f64;
    let cx = sample.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = sample.iter().map(|p| p.y).sum::<f64>() / n;

    let total: f64 = sample
        .iter()
        .map(|p| {
            let mirrored = Point::new(2.0 * cx - p.x, 2.0 * cy - p.y);
            sample
                .iter()
                .map(|q| q.distance(mirrored))
                .fold(f64::INFINITY, f64::min)
        })
        .sum();
    (1.0 - total / n / diag).clamp(0.0, 1.0)
}

/// Share of consecutive non-straight turns that change direction.
///
/// A sampled wave reverses about twice per period; jitter and zigzags
/// reverse at nearly every sample.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn reversal_rate(points: &[Point]) -> f64 {
    let left_turns: Vec<bool> = turning_angles(points)
        .into_iter()
        .filter(|a| a.abs() > STRAIGHT_TURN)
        .map(|a| a > 0.0)
        .collect();
    if left_turns.len() < 2 {
        return 0.0;
    }
    let flips = left_turns.windows(2).filter(|w| w[0] != w[1]).count();
    flips as f64 / (left_turns.len() - 1) as f64
}

/// Classify a stroke from its complexity, smoothness and reversal rate.
#[must_use]
pub fn classify(
    complexity: f64,
    smoothness: f64,
    reversal_rate: f64,
    thresholds: &FeatureThresholds,
) -> PatternType {
    if smoothness >= thresholds.linear_smoothness && complexity < thresholds.linear_complexity {
        PatternType::Linear
    } else if complexity < thresholds.curve_complexity {
        PatternType::Curve
    } else if smoothness < thresholds.complex_smoothness
        && reversal_rate >= thresholds.complex_reversal
    {
        PatternType::Complex
    } else {
        PatternType::Organic
    }
}

/// Distinct consecutive positions.
fn distinct_positions(samples: &[StrokePoint]) -> Vec<Point> {
    let mut points: Vec<Point> = Vec::with_capacity(samples.len());
    for p in samples.iter().map(StrokePoint::position) {
        if points
            .last()
            .map_or(true, |last: &Point| last.distance(p) > f64::EPSILON)
        {
            points.push(p);
        }
    }
    points
}

/// Extract features from stroke samples.
///
/// Consecutive duplicate positions are ignored. Returns `None` when fewer
/// than two distinct positions remain, since nothing can be fitted.
#[must_use]
pub fn extract(samples: &[StrokePoint], thresholds: &FeatureThresholds) -> Option<StrokeFeatures> {
    extract_simplified(samples, samples, thresholds)
}

/// Extract features from a simplified stroke.
///
/// Shape statistics come from `simplified`. The reversal rate and mean
/// pressure come from `dense`, the samples before simplification, since
/// simplifying a tight wave leaves a zigzag.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn extract_simplified(
    dense: &[StrokePoint],
    simplified: &[StrokePoint],
    thresholds: &FeatureThresholds,
) -> Option<StrokeFeatures> {
    let points = distinct_positions(simplified);
    if points.len() < 2 {
        return None;
    }

    let bounds = Bounds::from_points(points.iter().copied())?;
    let path_length: f64 = points.windows(2).map(|w| w[0].distance(w[1])).sum();
    let turning_angles = turning_angles(&points);
    let total_turn: f64 = turning_angles.iter().map(|a| a.abs()).sum();

    let complexity = (std_dev(&turning_angles) / FRAC_PI_4).min(1.0);
    let per_hundred = (path_length / 100.0).max(f64::EPSILON);
    let smoothness = 1.0 / (1.0 + total_turn / per_hundred);
    let reversal_rate = reversal_rate(&distinct_positions(dense));

    let first = points[0];
    let last = points[points.len() - 1];
    let dominant_angle = (last.y - first.y).atan2(last.x - first.x);
    let pressure_source = if dense.is_empty() { simplified } else { dense };
    let mean_pressure = pressure_source.iter().map(|p| p.pressure).sum::<f64>()
        / pressure_source.len().max(1) as f64;

    Some(StrokeFeatures {
        symmetry: symmetry(&points, &bounds),
        pattern_type: classify(complexity, smoothness, reversal_rate, thresholds),
        bounds,
        turning_angles,
        complexity,
        smoothness,
        reversal_rate,
        path_length,
        mean_pressure,
        dominant_angle,
        point_count: points.len(),
    })
}
