//! Synchronization Integration Tests
//!
//! Drives the coordinator end to end against an in-memory store:
//! - Stroke input translated to every other mode
//! - Debounced parameter bursts
//! - Degenerate input
//! - Long code and growth sources
//! - Entities sharing a pattern id
//! - Draw -> parametric -> draw round trip
//! - Smooth waves classify as curves

use std::sync::{Arc, Mutex};

use genshi_core::analysis::Script;
use genshi_core::{
    Bounds, Change, ChangePayload, DrawHandler, EditMode, EngineEvent, EntityId, EntityModel,
    EntityStore, GrowthSeed, ParamValue, ParametricHandler, PatternType, Point, Stroke,
    StrokePoint, SyncConfig, SyncCoordinator, TranslationConfig, TranslationHandler,
};
use proptest::prelude::*;

/// A stroke with increasing x and oscillating y.
fn wave_points(n: u32) -> Vec<StrokePoint> {
    (0..n)
        .map(|i| {
            let t = f64::from(i);
            StrokePoint::new(t * 4.0, 300.0 + 40.0 * (t * 0.25).sin())
                .with_pressure(0.6)
                .with_timestamp(u64::from(i))
        })
        .collect()
}

fn stroke_change(entity: EntityId, points: Vec<StrokePoint>, at: u64) -> Change {
    Change::new(
        entity,
        EditMode::Draw,
        ChangePayload::StrokeAdded {
            stroke: Stroke::new(points),
            style: None,
        },
    )
    .with_timestamp(at)
    .creating()
}

fn param_edit(entity: EntityId, params: &[(&str, f64)], region: Option<Bounds>, at: u64) -> Change {
    Change::new(
        entity,
        EditMode::Parametric,
        ChangePayload::PatternApplied {
            pattern_id: "kikko".to_string(),
            pattern_type: Some(PatternType::Curve),
            parameters: params
                .iter()
                .map(|(k, v)| ((*k).to_string(), ParamValue::Number(*v)))
                .collect(),
            region,
        },
    )
    .with_timestamp(at)
    .creating()
}

/// Record the mode of every applied change.
fn record_applied(sync: &mut SyncCoordinator) -> Arc<Mutex<Vec<Option<EditMode>>>> {
    let applied = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&applied);
    sync.subscribe(move |event| {
        if let EngineEvent::ChangeApplied(change) = event {
            sink.lock().unwrap().push(change.mode);
        }
    });
    applied
}

/// Record the confidence of every applied translation.
fn record_confidence(sync: &mut SyncCoordinator) -> Arc<Mutex<Vec<(EditMode, f64)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    sync.subscribe(move |event| {
        if let EngineEvent::ChangeApplied(change) = event {
            if let (Some(mode), Some(confidence)) = (change.mode, change.confidence) {
                sink.lock().unwrap().push((mode, confidence));
            }
        }
    });
    seen
}

/// A gently rising wave as a list of positions.
fn wave_path(n: u32) -> Vec<Point> {
    (0..n)
        .map(|i| {
            let t = f64::from(i);
            Point::new(t * 3.0, 200.0 + 45.0 * (t * 0.08).sin())
        })
        .collect()
}

fn tick_until(sync: &mut SyncCoordinator, store: &mut EntityStore, end: u64) {
    let mut now = 0;
    while now < end {
        now += 16;
        sync.tick(now, store).unwrap();
    }
}

// ============================================================================
// Scenario Tests
// ============================================================================

#[test]
fn test_wave_stroke_becomes_curved_pattern() {
    let mut sync = SyncCoordinator::new(SyncConfig::default());
    let mut store = EntityStore::new();
    let entity = EntityId::new();

    sync.submit(stroke_change(entity, wave_points(150), 0), 0)
        .unwrap();
    for now in [16, 32] {
        sync.tick(now, &mut store).unwrap();
    }

    let entity = store.entity(entity).unwrap();
    let pattern = entity.reprs.parametric.as_ref().unwrap();
    assert!(pattern.number("complexity").unwrap() > 0.0);
    assert!(matches!(
        pattern.pattern_type,
        PatternType::Curve | PatternType::Organic
    ));
    assert!(entity.has_content(EditMode::Code));
    assert!(entity.has_content(EditMode::Growth));
    assert!(entity.bounds.contains(&entity.reprs.vector.bounds().unwrap()));
}

#[test]
fn test_parameter_burst_translates_once() {
    let mut sync = SyncCoordinator::new(SyncConfig::default());
    let mut store = EntityStore::new();
    let applied = record_applied(&mut sync);
    let entity = EntityId::new();
    let region = Some(Bounds::new(0.0, 0.0, 120.0, 60.0));

    for (i, at) in [0_u64, 10, 20, 30, 40].into_iter().enumerate() {
        let scale = f64::from(u32::try_from(i).unwrap()) + 1.0;
        sync.submit(param_edit(entity, &[("scale", scale)], region, at), at)
            .unwrap();
        if at % 16 == 0 {
            sync.tick(at, &mut store).unwrap();
        }
    }
    let mut now = 40;
    while now < 160 {
        now += 16;
        sync.tick(now, &mut store).unwrap();
    }

    let applied = applied.lock().unwrap();
    let count = |mode| applied.iter().filter(|m| **m == Some(mode)).count();
    assert_eq!(count(EditMode::Draw), 1);
    assert_eq!(count(EditMode::Code), 1);

    let entity = store.entity(entity).unwrap();
    let source = entity.reprs.procedural.as_ref().unwrap().source();
    assert_eq!(Script::parse(source).params.get("scale"), Some(&5.0));
    assert_eq!(
        entity.reprs.parametric.as_ref().unwrap().number("scale"),
        Some(5.0)
    );
}

#[test]
fn test_single_point_stroke_translates_to_nothing() {
    let mut sync = SyncCoordinator::new(SyncConfig::default());
    let mut store = EntityStore::new();
    let applied = record_applied(&mut sync);
    let entity = EntityId::new();

    sync.submit(stroke_change(entity, vec![StrokePoint::new(10.0, 10.0)], 0), 0)
        .unwrap();
    for now in [16, 32, 48] {
        sync.tick(now, &mut store).unwrap();
    }

    assert_eq!(*applied.lock().unwrap(), vec![Some(EditMode::Draw)]);
    let entity = store.entity(entity).unwrap();
    assert!(entity.reprs.parametric.is_none());
    assert!(entity.reprs.procedural.is_none());
    assert!(entity.reprs.organic.seeds.is_empty());
}

#[test]
fn test_unrelated_entities_do_not_merge() {
    let mut sync = SyncCoordinator::new(SyncConfig::default());
    let mut store = EntityStore::new();
    let a = EntityId::new();
    let b = EntityId::new();

    sync.submit(stroke_change(a, wave_points(20), 0), 0).unwrap();
    sync.submit(stroke_change(b, wave_points(30), 0), 0).unwrap();
    let report = sync.tick(16, &mut store).unwrap();

    assert_eq!(report.conflicts, 0);
    assert_eq!(store.len(), 2);
    assert_eq!(store.entity(a).unwrap().populated_modes().count(), 4);
    assert_eq!(store.entity(b).unwrap().populated_modes().count(), 4);
}

#[test]
fn test_continued_stroke_extends_entity() {
    let mut sync = SyncCoordinator::new(SyncConfig::default());
    let mut store = EntityStore::new();
    let entity = EntityId::new();
    let points = wave_points(60);
    let first = Stroke::new(points[..30].to_vec());
    let rest = Stroke::with_id(first.id, points[30..].to_vec());

    let change = |stroke: Stroke, at: u64| {
        Change::new(
            entity,
            EditMode::Draw,
            ChangePayload::StrokeAdded { stroke, style: None },
        )
        .with_timestamp(at)
        .creating()
    };
    sync.submit(change(first, 0), 0).unwrap();
    sync.tick(16, &mut store).unwrap();
    sync.submit(change(rest, 20), 20).unwrap();
    sync.tick(32, &mut store).unwrap();

    let entity = store.entity(entity).unwrap();
    assert_eq!(entity.reprs.vector.strokes.len(), 1);
    assert_eq!(entity.reprs.vector.strokes[0].points.len(), 60);
    let seeds = &entity.reprs.organic.seeds;
    assert_eq!(seeds.len(), 13);
}

#[test]
fn test_long_program_translates_to_every_mode() {
    let mut sync = SyncCoordinator::new(SyncConfig::default());
    let mut store = EntityStore::new();
    let confidence = record_confidence(&mut sync);
    let entity = EntityId::new();
    let path = wave_path(120);
    let mut source = String::new();
    for (i, p) in path.iter().enumerate() {
        let verb = if i == 0 { "moveTo" } else { "lineTo" };
        source.push_str(&format!("{verb}({}, {})\n", p.x, p.y));
    }

    let change = Change::new(
        entity,
        EditMode::Code,
        ChangePayload::CodeExecuted {
            source,
            result: None,
        },
    )
    .with_timestamp(0)
    .creating();
    sync.submit(change, 0).unwrap();
    tick_until(&mut sync, &mut store, 160);

    let entity = store.entity(entity).unwrap();
    assert_eq!(entity.reprs.procedural.as_ref().unwrap().points().len(), 120);
    assert_eq!(entity.reprs.vector.strokes.len(), 1);
    assert_eq!(entity.reprs.vector.strokes[0].points.len(), 120);
    let pattern = entity.reprs.parametric.as_ref().unwrap();
    assert!(matches!(
        pattern.pattern_type,
        PatternType::Curve | PatternType::Organic
    ));
    assert!(entity.has_content(EditMode::Growth));

    let confidence = confidence.lock().unwrap();
    assert_eq!(confidence.len(), 3);
    assert!(confidence.iter().all(|(_, c)| *c > 0.0 && *c <= 1.0));
}

#[test]
fn test_large_growth_update_translates_to_every_mode() {
    let mut sync = SyncCoordinator::new(SyncConfig::default());
    let mut store = EntityStore::new();
    let entity = EntityId::new();
    let seeds: Vec<GrowthSeed> = wave_path(90)
        .into_iter()
        .map(|position| GrowthSeed {
            position,
            energy: 0.7,
            direction: 0.0,
        })
        .collect();

    let change = Change::new(
        entity,
        EditMode::Growth,
        ChangePayload::GrowthUpdated {
            seeds,
            generation: 4,
        },
    )
    .with_timestamp(0)
    .creating();
    sync.submit(change, 0).unwrap();
    tick_until(&mut sync, &mut store, 64);

    let entity = store.entity(entity).unwrap();
    assert_eq!(entity.reprs.organic.seeds.len(), 90);
    assert_eq!(entity.reprs.vector.strokes[0].points.len(), 90);
    let pattern = entity.reprs.parametric.as_ref().unwrap();
    assert_eq!(pattern.number("generation"), Some(4.0));
    assert!(matches!(
        pattern.pattern_type,
        PatternType::Curve | PatternType::Organic
    ));
    let source = entity.reprs.procedural.as_ref().unwrap().source();
    assert_eq!(Script::parse(source).seeds.len(), 90);
}

#[test]
fn test_entities_sharing_a_pattern_id_keep_their_translations() {
    let mut sync = SyncCoordinator::new(SyncConfig::default());
    let mut store = EntityStore::new();
    let a = EntityId::new();
    let b = EntityId::new();
    let region_a = Bounds::new(0.0, 0.0, 120.0, 60.0);
    let region_b = Bounds::new(400.0, 400.0, 520.0, 460.0);

    sync.submit(param_edit(a, &[("scale", 1.0)], Some(region_a), 0), 0)
        .unwrap();
    sync.submit(param_edit(b, &[("scale", 3.0)], Some(region_b), 5), 5)
        .unwrap();
    tick_until(&mut sync, &mut store, 200);

    for (id, region, scale) in [(a, region_a, 1.0), (b, region_b, 3.0)] {
        let entity = store.entity(id).unwrap();
        assert!(entity.has_content(EditMode::Draw));
        assert!(entity.has_content(EditMode::Code));
        let stroke = entity.reprs.vector.bounds().unwrap();
        assert!(region.expand(1e-9).contains(&stroke));
        let source = entity.reprs.procedural.as_ref().unwrap().source();
        assert_eq!(Script::parse(source).params.get("scale"), Some(&scale));
    }
}

// ============================================================================
// Round Trip Property
// ============================================================================

/// Translate a stroke to a pattern and the pattern back to a stroke.
fn round_trip(points: Vec<StrokePoint>) -> Option<Bounds> {
    let config = TranslationConfig::default();
    let mut draw = DrawHandler::new(config.clone());
    let mut parametric = ParametricHandler::new(config);
    let entity = EntityId::new();

    draw.handle(&stroke_change(entity, points, 0), 0).ok()?;
    let pattern = draw
        .poll(16)
        .into_iter()
        .filter_map(Result::ok)
        .find(|c| c.target_mode() == Some(EditMode::Parametric))?;

    let edit = Change::new(entity, EditMode::Parametric, pattern.payload).with_timestamp(20);
    parametric.handle(&edit, 20).ok()?;
    let stroke = parametric
        .poll(100)
        .into_iter()
        .filter_map(Result::ok)
        .find_map(|c| match c.payload {
            ChangePayload::StrokeAdded { stroke, .. } => Some(stroke),
            _ => None,
        })?;
    stroke.bounds()
}

proptest! {
    #[test]
    fn prop_round_trip_preserves_bounds_area(
        steps in prop::collection::vec((1.0_f64..10.0, -50.0_f64..50.0), 4..80)
    ) {
        let mut x = 0.0;
        let points: Vec<StrokePoint> = steps
            .iter()
            .map(|&(dx, y)| {
                x += dx;
                StrokePoint::new(x, y)
            })
            .collect();
        let original = Bounds::from_points(points.iter().map(StrokePoint::position)).unwrap();
        let restored = round_trip(points).unwrap();
        let tolerance = original.area() * 0.1 + 1e-6;
        prop_assert!(
            (restored.area() - original.area()).abs() <= tolerance,
            "original {:?} restored {:?}", original, restored
        );
    }
}

// ============================================================================
// Classification Property
// ============================================================================

proptest! {
    #[test]
    fn prop_smooth_waves_classify_as_curves(
        amplitude in 20.0_f64..60.0,
        frequency in 0.15_f64..0.5,
        spacing in 1.0_f64..4.0,
    ) {
        let points: Vec<StrokePoint> = (0..150)
            .map(|i| {
                let t = f64::from(i);
                StrokePoint::new(t * spacing, 300.0 + amplitude * (t * frequency).sin())
            })
            .collect();
        let mut sync = SyncCoordinator::new(SyncConfig::default());
        let mut store = EntityStore::new();
        let entity = EntityId::new();
        sync.submit(stroke_change(entity, points, 0), 0).unwrap();
        tick_until(&mut sync, &mut store, 32);

        let pattern = store
            .entity(entity)
            .and_then(|e| e.reprs.parametric.as_ref())
            .map(|p| p.pattern_type.clone());
        prop_assert!(
            matches!(pattern, Some(PatternType::Curve | PatternType::Organic)),
            "amplitude {} frequency {} spacing {}: {:?}",
            amplitude, frequency, spacing, pattern
        );
    }
}
