//! Synthesis of target-mode content from analysed geometry.

use std::collections::BTreeMap;
use std::f64::consts::{PI, TAU};

use crate::analysis::features::StrokeFeatures;
use crate::analysis::script::parse_path;
use crate::analysis::{
    extract_simplified, fit_quality, mean_residual, simplify, smooth_by_pressure, Script,
};
use crate::change::ChangePayload;
use crate::entity::{
    EditMode, GrowthSeed, ParamMap, ParamValue, PatternType, Stroke, StrokeId, StrokePoint,
    Style,
};
use crate::geometry::{Bounds, Point};

use super::TranslationConfig;

/// Energy given to seeds when the source carries no pressure.
pub const DEFAULT_ENERGY: f64 = 0.5;

/// Source samples after smoothing and reduction, with their features.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Reduced samples the translated path is built from.
    pub points: Vec<StrokePoint>,
    /// Features of the reduced samples.
    pub features: StrokeFeatures,
}

impl Analysis {
    /// Positions of the reduced samples.
    #[must_use]
    pub fn path(&self) -> Vec<Point> {
        self.points.iter().map(StrokePoint::position).collect()
    }
}

/// Smooth samples by pressure, reduce long ones, and extract features.
///
/// Returns `None` when fewer than two distinct positions remain.
#[must_use]
pub fn analyse(samples: &[StrokePoint], config: &TranslationConfig) -> Option<Analysis> {
    let dense = smooth_by_pressure(samples, config.smoothing);
    let points = if dense.len() > config.simplify_threshold {
        simplify(&dense, config.simplify_tolerance)
    } else {
        dense.clone()
    };
    let features = extract_simplified(&dense, &points, &config.thresholds)?;
    Some(Analysis { points, features })
}

/// Confidence ceiling of translating from `source` to `target`.
///
/// Exact reproductions (a program's path drawn as a stroke) rank highest,
/// inferred structure (seeds, fitted patterns) lowest.
#[must_use]
pub fn base_confidence(source: EditMode, target: EditMode) -> f64 {
    match (source, target) {
        (EditMode::Code, EditMode::Draw) => 0.98,
        (EditMode::Parametric, EditMode::Draw | EditMode::Code) => 0.95,
        (EditMode::Draw | EditMode::Code, EditMode::Parametric) => 0.85,
        (EditMode::Draw, EditMode::Code) => 0.80,
        (source, target) if source == target => 1.0,
        _ => 0.75,
    }
}

/// Geometry a payload puts on the canvas, for judging its fit.
#[must_use]
pub fn payload_path(payload: &ChangePayload, samples: usize) -> Vec<Point> {
    match payload {
        ChangePayload::StrokeAdded { stroke, .. } => {
            stroke.points.iter().map(StrokePoint::position).collect()
        }
        ChangePayload::PatternApplied {
            pattern_id,
            pattern_type,
            parameters,
            region,
        } => {
            let Some(region) = region else {
                return Vec::new();
            };
            let kind = pattern_type
                .clone()
                .unwrap_or_else(|| PatternType::Named(pattern_id.clone()));
            pattern_path(&kind, parameters, region, samples)
        }
        ChangePayload::CodeExecuted { source, result } => match result {
            Some(result) if !result.points.is_empty() => result.points.clone(),
            _ => parse_path(source),
        },
        ChangePayload::GrowthUpdated { seeds, .. } => seeds.iter().map(|s| s.position).collect(),
        ChangePayload::EntityRemoved => Vec::new(),
    }
}

/// Confidence that `translated` reproduces the source geometry `reference`.
///
/// The pair's ceiling scaled by how closely the translated geometry
/// follows the source. `None` if either side has no geometry.
#[must_use]
pub fn translation_confidence(
    source: EditMode,
    target: EditMode,
    reference: &[Point],
    translated: &[Point],
) -> Option<f64> {
    let bounds = Bounds::from_points(reference.iter().copied())?;
    let residual = mean_residual(reference, translated)?;
    Some(base_confidence(source, target) * fit_quality(residual, &bounds))
}

/// Parametric parameters describing a stroke.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn parameters_from_features(features: &StrokeFeatures, style: Option<&Style>) -> ParamMap {
    let bounds = &features.bounds;
    let per_hundred = (features.path_length / 100.0).max(f64::EPSILON);
    let mut params = ParamMap::new();
    let mut set = |name: &str, value: f64| {
        params.insert(name.to_string(), ParamValue::Number(value));
    };
    set("complexity", features.complexity);
    set("smoothness", features.smoothness);
    set("symmetry", features.symmetry);
    set("scale", bounds.diagonal() / 100.0);
    set("rotation", features.dominant_angle.to_degrees());
    set("density", features.point_count as f64 / per_hundred);
    set("size", bounds.width().max(bounds.height()));
    set("energy", features.mean_pressure);
    if let Some(style) = style {
        params.insert("color1".to_string(), ParamValue::Color(style.color));
    }
    params
}

/// Numeric subset of a parameter map.
#[must_use]
pub fn numeric_params(params: &ParamMap) -> BTreeMap<String, f64> {
    params
        .iter()
        .filter_map(|(k, v)| v.as_number().map(|n| (k.clone(), n)))
        .collect()
}

/// Procedural source reproducing a path.
#[must_use]
pub fn script_source(
    path: &[Point],
    style: Option<&Style>,
    params: BTreeMap<String, f64>,
    seeds: &[GrowthSeed],
) -> String {
    Script {
        style: style.copied(),
        path: path.to_vec(),
        params,
        seeds: seeds.to_vec(),
    }
    .to_source()
}

/// Indices sampled every `stride` points, always including the last.
fn stride_indices(len: usize, stride: usize) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    let mut indices: Vec<usize> = (0..len).step_by(stride.max(1)).collect();
    if indices.last() != Some(&(len - 1)) {
        indices.push(len - 1);
    }
    indices
}

/// Direction of the path at index `i`, from its neighbours.
fn tangent(points: &[Point], i: usize) -> f64 {
    let prev = points[i.saturating_sub(1)];
    let next = points[(i + 1).min(points.len() - 1)];
    (next.y - prev.y).atan2(next.x - prev.x)
}

/// Seeds sampled along stroke samples, with pressure as energy.
#[must_use]
pub fn seeds_from_samples(points: &[StrokePoint], stride: usize) -> Vec<GrowthSeed> {
    let positions: Vec<Point> = points.iter().map(StrokePoint::position).collect();
    stride_indices(points.len(), stride)
        .into_iter()
        .map(|i| GrowthSeed {
            position: positions[i],
            energy: points[i].pressure.clamp(0.0, 1.0),
            direction: tangent(&positions, i),
        })
        .collect()
}

/// Seeds sampled along a path with uniform energy.
#[must_use]
pub fn seeds_from_path(points: &[Point], stride: usize, energy: f64) -> Vec<GrowthSeed> {
    stride_indices(points.len(), stride)
        .into_iter()
        .map(|i| GrowthSeed {
            position: points[i],
            energy: energy.clamp(0.0, 1.0),
            direction: tangent(points, i),
        })
        .collect()
}

/// Stroke through `points` with uniform pressure.
#[must_use]
pub fn stroke_from_path(id: StrokeId, points: &[Point], pressure: f64) -> Stroke {
    Stroke::with_id(
        id,
        points
            .iter()
            .map(|p| StrokePoint::new(p.x, p.y).with_pressure(pressure))
            .collect(),
    )
}

/// Path of a parametric pattern, spanning its region.
///
/// Linear patterns are a diagonal of the region, chosen by `rotation`.
/// Curves, organic and complex patterns oscillate across the full width
/// with amplitude half the region height; complex ones use a triangle
/// wave. The number of periods grows with `complexity`. Named library
/// patterns trace the region outline.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn pattern_path(
    pattern_type: &PatternType,
    params: &ParamMap,
    region: &Bounds,
    samples: usize,
) -> Vec<Point> {
    if !region.is_finite() || (region.width() <= 0.0 && region.height() <= 0.0) {
        return Vec::new();
    }
    let number = |name: &str| params.get(name).and_then(ParamValue::as_number);

    match pattern_type {
        PatternType::Linear => {
            let rotation = number("rotation").unwrap_or(0.0).to_radians();
            if rotation.sin() * rotation.cos() < 0.0 {
                vec![
                    Point::new(region.min_x, region.max_y),
                    Point::new(region.max_x, region.min_y),
                ]
            } else {
                vec![
                    Point::new(region.min_x, region.min_y),
                    Point::new(region.max_x, region.max_y),
                ]
            }
        }
        PatternType::Curve | PatternType::Organic | PatternType::Complex => {
            let complexity = number("complexity").unwrap_or(0.5).clamp(0.0, 1.0);
            let periods = 1.0 + (complexity * 3.0).round();
            let samples = samples.max(2);
            let center = region.center();
            let amplitude = region.height() / 2.0;
            let triangle = matches!(pattern_type, PatternType::Complex);
            (0..samples)
                .map(|i| {
                    let t = i as f64 / (samples - 1) as f64;
                    let phase = TAU * periods * t;
                    let wave = if triangle {
                        phase.sin().asin() * 2.0 / PI
                    } else {
                        phase.sin()
                    };
                    Point::new(region.min_x + region.width() * t, center.y + amplitude * wave)
                })
                .collect()
        }
        PatternType::Named(_) => vec![
            Point::new(region.min_x, region.min_y),
            Point::new(region.max_x, region.min_y),
            Point::new(region.max_x, region.max_y),
            Point::new(region.min_x, region.max_y),
            Point::new(region.min_x, region.min_y),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wave(n: u32, amplitude: f64) -> Vec<StrokePoint> {
        (0..n)
            .map(|i| {
                let t = f64::from(i);
                StrokePoint::new(t * 3.0, amplitude * (t * 0.2).sin())
            })
            .collect()
    }

    #[test]
    fn test_analyse_reduces_long_input() {
        let config = TranslationConfig::default();
        let analysis = analyse(&wave(200, 30.0), &config).unwrap();
        assert!(analysis.points.len() < 200);
        assert_eq!(analysis.points.first(), wave(1, 30.0).first());
        assert_eq!(analysis.features.point_count, analysis.path().len());

        let short = analyse(&wave(10, 30.0), &config).unwrap();
        assert_eq!(short.points.len(), 10);
    }

    #[test]
    fn test_exact_copy_gets_pair_ceiling() {
        let path: Vec<Point> = wave(40, 20.0).iter().map(StrokePoint::position).collect();
        let confidence =
            translation_confidence(EditMode::Code, EditMode::Draw, &path, &path).unwrap();
        assert!((confidence - 0.98).abs() < 1e-12);
    }

    #[test]
    fn test_loose_fit_lowers_confidence() {
        let path: Vec<Point> = wave(40, 20.0).iter().map(StrokePoint::position).collect();
        let flat = vec![Point::new(0.0, 0.0), Point::new(117.0, 0.0)];
        let exact =
            translation_confidence(EditMode::Draw, EditMode::Parametric, &path, &path).unwrap();
        let loose =
            translation_confidence(EditMode::Draw, EditMode::Parametric, &path, &flat).unwrap();
        assert!(loose < exact);
        assert!(translation_confidence(EditMode::Draw, EditMode::Code, &path, &[]).is_none());
    }

    #[test]
    fn test_payload_path_of_program_prefers_result() {
        let payload = ChangePayload::CodeExecuted {
            source: "moveTo(0, 0)\nlineTo(10, 0)".to_string(),
            result: None,
        };
        assert_eq!(
            payload_path(&payload, 64),
            vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]
        );
        assert!(payload_path(&ChangePayload::EntityRemoved, 64).is_empty());
    }

    #[test]
    fn test_stride_includes_last() {
        assert_eq!(stride_indices(11, 5), vec![0, 5, 10]);
        assert_eq!(stride_indices(12, 5), vec![0, 5, 10, 11]);
        assert_eq!(stride_indices(1, 5), vec![0]);
        assert!(stride_indices(0, 5).is_empty());
    }

    #[test]
    fn test_seed_energy_and_direction() {
        let points = vec![
            StrokePoint::new(0.0, 0.0).with_pressure(0.2),
            StrokePoint::new(10.0, 0.0).with_pressure(1.4),
        ];
        let seeds = seeds_from_samples(&points, 5);
        assert_eq!(seeds.len(), 2);
        assert!((seeds[0].energy - 0.2).abs() < f64::EPSILON);
        assert!((seeds[1].energy - 1.0).abs() < f64::EPSILON);
        assert!(seeds[0].direction.abs() < f64::EPSILON);
    }

    #[test]
    fn test_pattern_path_spans_region() {
        let region = Bounds::new(10.0, 20.0, 110.0, 60.0);
        for kind in [
            PatternType::Linear,
            PatternType::Curve,
            PatternType::Organic,
            PatternType::Complex,
            PatternType::Named("grid".to_string()),
        ] {
            let path = pattern_path(&kind, &ParamMap::new(), &region, 64);
            let b = Bounds::from_points(path).unwrap();
            assert!((b.width() - region.width()).abs() < 1e-9, "{kind}");
            assert!(b.height() >= region.height() * 0.9, "{kind}");
            assert!(region.expand(1e-9).contains(&b), "{kind}");
        }
    }

    #[test]
    fn test_degenerate_region_yields_nothing() {
        let point = Bounds::new(5.0, 5.0, 5.0, 5.0);
        assert!(pattern_path(&PatternType::Curve, &ParamMap::new(), &point, 64).is_empty());
    }
}
