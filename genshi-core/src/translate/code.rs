//! Code-mode translation: program output to strokes, patterns and seeds.

use tracing::debug;

use crate::analysis::Script;
use crate::change::{Change, ChangePayload};
use crate::entity::{EditMode, EntityId, ParamValue, ProceduralRepr, StrokeId, StrokePoint};
use crate::error::{SyncError, SyncResult};
use crate::geometry::Bounds;
use crate::translate::cache::{fingerprint, CacheStats};
use crate::translate::synth::{
    analyse, parameters_from_features, seeds_from_path, stroke_from_path, DEFAULT_ENERGY,
};
use crate::translate::{
    BatchContext, BatchPolicy, HandlerCore, TranslationConfig, TranslationHandler,
};

/// Translates program executions, debounced per entity.
///
/// Only the latest source and result of an entity are kept; each execution
/// replaces the previous program.
#[derive(Debug)]
pub struct CodeHandler {
    core: HandlerCore<EntityId, ProceduralRepr>,
}

impl CodeHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(config: TranslationConfig) -> Self {
        let policy = BatchPolicy::Debounce(config.code_debounce_ms);
        Self {
            core: HandlerCore::new(EditMode::Code, config, policy),
        }
    }

    fn fire(
        &mut self,
        entity: EntityId,
        ctx: BatchContext,
        program: &ProceduralRepr,
        now: u64,
        out: &mut Vec<SyncResult<Change>>,
    ) {
        if let Some(error) = program.last_result().and_then(|r| r.error.as_ref()) {
            for target in EditMode::Code.others() {
                out.push(Err(SyncError::translation(
                    EditMode::Code,
                    target,
                    format!("program failed: {error}"),
                )));
            }
            return;
        }

        let points = program.points();
        let samples: Vec<StrokePoint> = points
            .iter()
            .map(|p| StrokePoint::new(p.x, p.y))
            .collect();
        let config = self.core.config.clone();
        let Some(analysis) = analyse(&samples, &config) else {
            debug!(entity = %entity, "Program traced no usable path");
            return;
        };
        let Some(region) = Bounds::from_points(points.iter().copied()) else {
            return;
        };
        let features = &analysis.features;
        let script = Script::parse(program.source());
        debug!(
            entity = %entity,
            points = points.len(),
            analysed = analysis.points.len(),
            seeds = script.seeds.len(),
            "Translating program"
        );

        let fp = fingerprint(&(points, program.source()));
        let mut emitter = self.core.emitter(&entity, ctx, fp, points, now, out);
        emitter.emit(EditMode::Draw, || {
            let id = StrokeId::derived(&format!("code:{entity}"));
            Ok(Some(ChangePayload::StrokeAdded {
                stroke: stroke_from_path(id, points, DEFAULT_ENERGY),
                style: script.style,
            }))
        });
        emitter.emit(EditMode::Parametric, || {
            let mut parameters = parameters_from_features(features, script.style.as_ref());
            parameters.extend(
                script
                    .params
                    .iter()
                    .map(|(k, v)| (k.clone(), ParamValue::Number(*v))),
            );
            Ok(Some(ChangePayload::PatternApplied {
                pattern_id: format!("code:{entity}"),
                pattern_type: Some(features.pattern_type.clone()),
                parameters,
                region: Some(region),
            }))
        });
        emitter.emit(EditMode::Growth, || {
            let seeds = if script.seeds.is_empty() {
                seeds_from_path(points, config.seed_stride, DEFAULT_ENERGY)
            } else {
                script.seeds.clone()
            };
            Ok(Some(ChangePayload::GrowthUpdated {
                seeds,
                generation: 0,
            }))
        });
    }
}

impl TranslationHandler for CodeHandler {
    fn source_mode(&self) -> EditMode {
        EditMode::Code
    }

    fn handle(&mut self, change: &Change, now_ms: u64) -> SyncResult<()> {
        let ChangePayload::CodeExecuted { source, result } = &change.payload else {
            return Err(SyncError::InvalidChange(format!(
                "code handler cannot buffer {}",
                change.kind()
            )));
        };
        self.core.buffer(
            change.entity,
            change,
            now_ms,
            ProceduralRepr::default,
            |program| *program = ProceduralRepr::new(source.clone(), result.clone()),
        );
        Ok(())
    }

    fn poll(&mut self, now_ms: u64) -> Vec<SyncResult<Change>> {
        let mut out = Vec::new();
        for (entity, ctx, program) in self.core.due(now_ms) {
            self.fire(entity, ctx, &program, now_ms, &mut out);
        }
        out
    }

    fn next_deadline(&self) -> Option<u64> {
        self.core.batcher.next_deadline()
    }

    fn pending_batches(&self) -> usize {
        self.core.batcher.len()
    }

    fn discard_entity(&mut self, entity: EntityId) {
        self.core.discard_entity(entity);
    }

    fn cancel(&mut self) {
        self.core.batcher.clear();
    }

    fn cache_stats(&self) -> CacheStats {
        self.core.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ExecutionResult, PatternType, Stroke};
    use crate::geometry::Point;
    use crate::translate::DrawHandler;

    fn run(entity: EntityId, source: &str, result: Option<ExecutionResult>, at: u64) -> Change {
        Change::new(
            entity,
            EditMode::Code,
            ChangePayload::CodeExecuted {
                source: source.to_string(),
                result,
            },
        )
        .with_timestamp(at)
    }

    #[test]
    fn test_source_path_is_used_without_result() {
        let mut handler = CodeHandler::new(TranslationConfig::default());
        let entity = EntityId::new();
        let source = "moveTo(0, 0)\nlineTo(50, 20)\nlineTo(100, 0)\nseed(1, 1, 0.9, 0)\n";
        handler.handle(&run(entity, source, None, 0), 0).unwrap();
        let changes: Vec<Change> = handler.poll(50).into_iter().map(Result::unwrap).collect();
        assert_eq!(changes.len(), 3);

        let Some(ChangePayload::GrowthUpdated { seeds, .. }) = changes
            .iter()
            .map(|c| &c.payload)
            .find(|p| matches!(p, ChangePayload::GrowthUpdated { .. }))
        else {
            panic!("expected seeds");
        };
        assert_eq!(seeds.len(), 1);
        assert!((seeds[0].energy - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_result_points_take_precedence() {
        let mut handler = CodeHandler::new(TranslationConfig::default());
        let entity = EntityId::new();
        let result = ExecutionResult::from(vec![Point::new(0.0, 0.0), Point::new(10.0, 40.0)]);
        handler
            .handle(&run(entity, "// generated elsewhere", Some(result), 0), 0)
            .unwrap();
        let changes: Vec<Change> = handler.poll(50).into_iter().map(Result::unwrap).collect();
        let region = changes.iter().find_map(|c| match &c.payload {
            ChangePayload::PatternApplied { region, .. } => *region,
            _ => None,
        });
        assert_eq!(region, Some(Bounds::new(0.0, 0.0, 10.0, 40.0)));
    }

    fn pattern_of(changes: &[Change]) -> (Option<PatternType>, Option<f64>) {
        changes
            .iter()
            .find_map(|c| match &c.payload {
                ChangePayload::PatternApplied {
                    pattern_type,
                    parameters,
                    ..
                } => Some((
                    pattern_type.clone(),
                    parameters.get("complexity").and_then(ParamValue::as_number),
                )),
                _ => None,
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_long_program_matches_the_same_drawn_stroke() {
        let path: Vec<Point> = (0..300)
            .map(|i| {
                let t = f64::from(i);
                Point::new(t * 3.0, 200.0 + 50.0 * (t * 0.05).sin())
            })
            .collect();
        let entity = EntityId::new();

        let mut code = CodeHandler::new(TranslationConfig::default());
        code.handle(
            &run(entity, "// generated", Some(ExecutionResult::from(path.clone())), 0),
            0,
        )
        .unwrap();
        let from_code: Vec<Change> = code.poll(50).into_iter().map(Result::unwrap).collect();

        let stroke = Stroke::new(path.iter().map(|p| StrokePoint::new(p.x, p.y)).collect());
        let mut draw = DrawHandler::new(TranslationConfig::default());
        draw.handle(
            &Change::new(
                entity,
                EditMode::Draw,
                ChangePayload::StrokeAdded {
                    stroke,
                    style: None,
                },
            ),
            0,
        )
        .unwrap();
        let from_draw: Vec<Change> = draw.poll(16).into_iter().map(Result::unwrap).collect();

        let (code_type, code_complexity) = pattern_of(&from_code);
        let (draw_type, draw_complexity) = pattern_of(&from_draw);
        assert!(code_type.is_some());
        assert_eq!(code_type, draw_type);
        assert!(code_complexity.is_some());
        assert_eq!(code_complexity, draw_complexity);
    }

    #[test]
    fn test_failed_program_reports_per_target() {
        let mut handler = CodeHandler::new(TranslationConfig::default());
        let result = ExecutionResult {
            points: Vec::new(),
            error: Some("syntax error".to_string()),
        };
        handler
            .handle(&run(EntityId::new(), "moveTo(", Some(result), 0), 0)
            .unwrap();
        let out = handler.poll(50);
        assert_eq!(out.len(), 3);
        assert!(out
            .iter()
            .all(|r| matches!(r, Err(SyncError::Translation { .. }))));
    }

    #[test]
    fn test_empty_program_translates_to_nothing() {
        let mut handler = CodeHandler::new(TranslationConfig::default());
        handler
            .handle(&run(EntityId::new(), "moveTo(3, 3)", None, 0), 0)
            .unwrap();
        assert!(handler.poll(50).is_empty());
    }
}
