//! Parametric-mode translation: pattern parameters to strokes, programs
//! and seeds.

use std::fmt;

use tracing::debug;

use crate::change::{Change, ChangePayload};
use crate::entity::{
    EditMode, EntityId, ExecutionResult, ParamMap, ParamValue, PatternType, StrokeId,
};
use crate::error::{SyncError, SyncResult};
use crate::geometry::Bounds;
use crate::translate::cache::{fingerprint, CacheStats};
use crate::translate::synth::{
    numeric_params, pattern_path, script_source, seeds_from_path, stroke_from_path,
    DEFAULT_ENERGY,
};
use crate::translate::{
    BatchContext, BatchPolicy, HandlerCore, TranslationConfig, TranslationHandler,
};

#[derive(Debug, Clone, Default)]
struct PatternState {
    pattern_type: Option<PatternType>,
    parameters: ParamMap,
    region: Option<Bounds>,
}

impl PatternState {
    /// Region from the last edit that set one, else a square of `size`.
    fn region(&self) -> Option<Bounds> {
        self.region.or_else(|| {
            let size = self.parameters.get("size").and_then(ParamValue::as_number)?;
            (size > 0.0).then(|| Bounds::from_origin_size(0.0, 0.0, size, size))
        })
    }
}

/// A pattern instance on one entity. Entities applying the same library
/// pattern are tracked and debounced independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PatternKey {
    entity: EntityId,
    pattern_id: String,
}

impl fmt::Display for PatternKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity, self.pattern_id)
    }
}

/// Translates parameter edits, debounced per entity and pattern ID.
///
/// Parameters accumulate across edits with later values overriding, so a
/// burst of slider moves produces one translation of the final values.
#[derive(Debug)]
pub struct ParametricHandler {
    core: HandlerCore<PatternKey, PatternState>,
}

impl ParametricHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(config: TranslationConfig) -> Self {
        let policy = BatchPolicy::Debounce(config.parametric_debounce_ms);
        Self {
            core: HandlerCore::new(EditMode::Parametric, config, policy),
        }
    }

    fn fire(
        &mut self,
        key: &PatternKey,
        ctx: BatchContext,
        state: &PatternState,
        now: u64,
        out: &mut Vec<SyncResult<Change>>,
    ) {
        let pattern_id = key.pattern_id.as_str();
        let Some(region) = state.region() else {
            debug!(pattern = %key, "Pattern has no region, nothing to fit");
            return;
        };
        let config = self.core.config.clone();
        let pattern_type = state
            .pattern_type
            .clone()
            .unwrap_or_else(|| PatternType::Named(pattern_id.to_string()));
        let path = pattern_path(
            &pattern_type,
            &state.parameters,
            &region,
            config.pattern_samples,
        );
        if path.len() < 2 {
            return;
        }
        let number = |name: &str| state.parameters.get(name).and_then(ParamValue::as_number);
        let pressure = number("pressure").unwrap_or(DEFAULT_ENERGY);
        let energy = number("energy").unwrap_or(DEFAULT_ENERGY);
        debug!(
            pattern = %key,
            kind = %pattern_type,
            params = state.parameters.len(),
            "Translating pattern"
        );

        let fp = fingerprint(&(&pattern_type, &state.parameters, &region));
        let mut emitter = self.core.emitter(key, ctx, fp, &path, now, out);
        emitter.emit(EditMode::Draw, || {
            let id = StrokeId::derived(&format!("pattern:{key}"));
            Ok(Some(ChangePayload::StrokeAdded {
                stroke: stroke_from_path(id, &path, pressure),
                style: None,
            }))
        });
        emitter.emit(EditMode::Code, || {
            Ok(Some(ChangePayload::CodeExecuted {
                source: script_source(&path, None, numeric_params(&state.parameters), &[]),
                result: Some(ExecutionResult {
                    points: path.clone(),
                    error: None,
                }),
            }))
        });
        emitter.emit(EditMode::Growth, || {
            Ok(Some(ChangePayload::GrowthUpdated {
                seeds: seeds_from_path(&path, config.seed_stride, energy),
                generation: 0,
            }))
        });
    }
}

impl TranslationHandler for ParametricHandler {
    fn source_mode(&self) -> EditMode {
        EditMode::Parametric
    }

    fn handle(&mut self, change: &Change, now_ms: u64) -> SyncResult<()> {
        let ChangePayload::PatternApplied {
            pattern_id,
            pattern_type,
            parameters,
            region,
        } = &change.payload
        else {
            return Err(SyncError::InvalidChange(format!(
                "parametric handler cannot buffer {}",
                change.kind()
            )));
        };
        let key = PatternKey {
            entity: change.entity,
            pattern_id: pattern_id.clone(),
        };
        self.core.buffer(
            key,
            change,
            now_ms,
            PatternState::default,
            |state| {
                if let Some(kind) = pattern_type {
                    state.pattern_type = Some(kind.clone());
                }
                state.parameters.extend(parameters.clone());
                if let Some(region) = region {
                    state.region = Some(*region);
                }
            },
        );
        Ok(())
    }

    fn poll(&mut self, now_ms: u64) -> Vec<SyncResult<Change>> {
        let mut out = Vec::new();
        for (key, ctx, state) in self.core.due(now_ms) {
            self.fire(&key, ctx, &state, now_ms, &mut out);
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
    use crate::analysis::Script;
    use crate::entity::Stroke;

    fn edit(entity: EntityId, params: &[(&str, f64)], region: Option<Bounds>, at: u64) -> Change {
        Change::new(
            entity,
            EditMode::Parametric,
            ChangePayload::PatternApplied {
                pattern_id: "waves".to_string(),
                pattern_type: Some(PatternType::Curve),
                parameters: params
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), ParamValue::Number(*v)))
                    .collect(),
                region,
            },
        )
        .with_timestamp(at)
    }

    #[test]
    fn test_debounced_burst_translates_last_values_once() {
        let mut handler = ParametricHandler::new(TranslationConfig::default());
        let entity = EntityId::new();
        let region = Bounds::new(0.0, 0.0, 200.0, 100.0);
        for (i, at) in [0_u64, 10, 20, 30, 40].into_iter().enumerate() {
            let step = f64::from(u32::try_from(i).unwrap());
            let params = [("scale", step + 1.0), ("complexity", step / 4.0)];
            let region = (i == 0).then_some(region);
            handler.handle(&edit(entity, &params, region, at), at).unwrap();
        }
        assert_eq!(handler.pending_batches(), 1);
        assert!(handler.poll(89).is_empty());

        let changes: Vec<Change> = handler.poll(95).into_iter().map(Result::unwrap).collect();
        let draws: Vec<&Change> = changes
            .iter()
            .filter(|c| c.target_mode() == Some(EditMode::Draw))
            .collect();
        let codes: Vec<&Change> = changes
            .iter()
            .filter(|c| c.target_mode() == Some(EditMode::Code))
            .collect();
        assert_eq!(draws.len(), 1);
        assert_eq!(codes.len(), 1);

        let ChangePayload::CodeExecuted { source, .. } = &codes[0].payload else {
            panic!("expected code");
        };
        let script = Script::parse(source);
        assert_eq!(script.params.get("scale"), Some(&5.0));
        assert_eq!(script.params.get("complexity"), Some(&1.0));

        let mut last = ParamMap::new();
        last.insert("complexity".to_string(), ParamValue::Number(1.0));
        let expected = pattern_path(&PatternType::Curve, &last, &region, 64);
        let ChangePayload::StrokeAdded { stroke, .. } = &draws[0].payload else {
            panic!("expected stroke");
        };
        let drawn: Vec<_> = stroke.points.iter().map(|p| p.position()).collect();
        assert_eq!(drawn, expected);
    }

    #[test]
    fn test_entities_sharing_a_pattern_translate_independently() {
        let mut handler = ParametricHandler::new(TranslationConfig::default());
        let (a, b) = (EntityId::new(), EntityId::new());
        let region_a = Bounds::new(0.0, 0.0, 100.0, 100.0);
        let region_b = Bounds::new(500.0, 500.0, 600.0, 600.0);
        handler
            .handle(&edit(a, &[("scale", 2.0)], Some(region_a), 0), 0)
            .unwrap();
        handler
            .handle(&edit(b, &[("scale", 7.0)], Some(region_b), 5), 5)
            .unwrap();
        assert_eq!(handler.pending_batches(), 2);

        let changes: Vec<Change> = handler.poll(100).into_iter().map(Result::unwrap).collect();
        assert_eq!(changes.len(), 6);
        for (entity, region) in [(a, region_a), (b, region_b)] {
            let strokes: Vec<&Stroke> = changes
                .iter()
                .filter(|c| c.entity == entity)
                .filter_map(|c| match &c.payload {
                    ChangePayload::StrokeAdded { stroke, .. } => Some(stroke),
                    _ => None,
                })
                .collect();
            assert_eq!(strokes.len(), 1);
            assert!(region.expand(1e-9).contains(&strokes[0].bounds().unwrap()));
        }
        let ids: Vec<StrokeId> = changes
            .iter()
            .filter_map(|c| match &c.payload {
                ChangePayload::StrokeAdded { stroke, .. } => Some(stroke.id),
                _ => None,
            })
            .collect();
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_translations_carry_confidence() {
        let mut handler = ParametricHandler::new(TranslationConfig::default());
        let region = Some(Bounds::new(0.0, 0.0, 200.0, 80.0));
        handler
            .handle(&edit(EntityId::new(), &[("complexity", 0.5)], region, 0), 0)
            .unwrap();
        let changes: Vec<Change> = handler.poll(50).into_iter().map(Result::unwrap).collect();
        for change in &changes {
            let confidence = change.confidence.unwrap();
            assert!(confidence > 0.5 && confidence <= 1.0, "{confidence}");
        }
        // The stroke traces the pattern exactly.
        let draw = changes
            .iter()
            .find(|c| c.target_mode() == Some(EditMode::Draw))
            .unwrap();
        assert!((draw.confidence.unwrap() - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_size_parameter_stands_in_for_region() {
        let mut handler = ParametricHandler::new(TranslationConfig::default());
        let entity = EntityId::new();
        handler
            .handle(&edit(entity, &[("size", 80.0)], None, 0), 0)
            .unwrap();
        let changes = handler.poll(50);
        assert_eq!(changes.len(), 3);
    }

    #[test]
    fn test_no_region_no_translation() {
        let mut handler = ParametricHandler::new(TranslationConfig::default());
        handler
            .handle(&edit(EntityId::new(), &[("scale", 2.0)], None, 0), 0)
            .unwrap();
        assert!(handler.poll(50).is_empty());
    }

    #[test]
    fn test_region_is_remembered_between_batches() {
        let mut handler = ParametricHandler::new(TranslationConfig::default());
        let entity = EntityId::new();
        let region = Some(Bounds::new(0.0, 0.0, 50.0, 50.0));
        handler
            .handle(&edit(entity, &[("scale", 1.0)], region, 0), 0)
            .unwrap();
        assert_eq!(handler.poll(50).len(), 3);
        handler
            .handle(&edit(entity, &[("scale", 2.0)], None, 100), 100)
            .unwrap();
        assert_eq!(handler.poll(150).len(), 3);
    }
}
