//! Draw-mode translation: strokes to patterns, programs and seeds.

use std::collections::BTreeMap;

use tracing::debug;

use crate::change::{Change, ChangePayload};
use crate::entity::{EditMode, EntityId, ExecutionResult, Stroke, StrokeId, Style};
use crate::error::{SyncError, SyncResult};
use crate::translate::cache::{fingerprint, CacheStats};
use crate::translate::synth::{analyse, parameters_from_features, script_source, seeds_from_samples};
use crate::translate::{BatchPolicy, HandlerCore, TranslationConfig, TranslationHandler};

#[derive(Debug, Clone)]
struct StrokeState {
    stroke: Stroke,
    style: Option<Style>,
}

/// Translates strokes, throttled to frame boundaries.
///
/// Points arriving for the same stroke across batches accumulate, so every
/// translation describes the whole stroke drawn so far.
#[derive(Debug)]
pub struct DrawHandler {
    core: HandlerCore<StrokeId, StrokeState>,
}

impl DrawHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(config: TranslationConfig) -> Self {
        let policy = BatchPolicy::Throttle(config.draw_throttle_ms);
        Self {
            core: HandlerCore::new(EditMode::Draw, config, policy),
        }
    }

    fn fire(
        &mut self,
        stroke_id: StrokeId,
        ctx: super::BatchContext,
        state: StrokeState,
        now: u64,
        out: &mut Vec<SyncResult<Change>>,
    ) {
        if state.stroke.is_degenerate() {
            debug!(stroke = %stroke_id, "Skipping degenerate stroke");
            return;
        }
        let config = self.core.config.clone();
        let Some(analysis) = analyse(&state.stroke.points, &config) else {
            return;
        };
        let Some(region) = state.stroke.bounds() else {
            return;
        };
        let features = &analysis.features;
        let path = analysis.path();
        debug!(
            stroke = %stroke_id,
            points = state.stroke.points.len(),
            analysed = path.len(),
            pattern = %features.pattern_type,
            complexity = features.complexity,
            reversal = features.reversal_rate,
            "Translating stroke"
        );

        let fp = fingerprint(&(&state.stroke.points, &state.style));
        let mut emitter = self.core.emitter(&stroke_id, ctx, fp, &path, now, out);
        emitter.emit(EditMode::Parametric, || {
            Ok(Some(ChangePayload::PatternApplied {
                pattern_id: format!("stroke:{stroke_id}"),
                pattern_type: Some(features.pattern_type.clone()),
                parameters: parameters_from_features(features, state.style.as_ref()),
                region: Some(region),
            }))
        });
        emitter.emit(EditMode::Code, || {
            Ok(Some(ChangePayload::CodeExecuted {
                source: script_source(&path, state.style.as_ref(), BTreeMap::new(), &[]),
                result: Some(ExecutionResult {
                    points: path.clone(),
                    error: None,
                }),
            }))
        });
        emitter.emit(EditMode::Growth, || {
            Ok(Some(ChangePayload::GrowthUpdated {
                seeds: seeds_from_samples(&state.stroke.points, config.seed_stride),
                generation: 0,
            }))
        });
    }
}

impl TranslationHandler for DrawHandler {
    fn source_mode(&self) -> EditMode {
        EditMode::Draw
    }

    fn handle(&mut self, change: &Change, now_ms: u64) -> SyncResult<()> {
        let ChangePayload::StrokeAdded { stroke, style } = &change.payload else {
            return Err(SyncError::InvalidChange(format!(
                "draw handler cannot buffer {}",
                change.kind()
            )));
        };
        let (id, style) = (stroke.id, *style);
        self.core.buffer(
            id,
            change,
            now_ms,
            || StrokeState {
                stroke: Stroke::with_id(id, Vec::new()),
                style: None,
            },
            |state| {
                state.stroke.absorb(stroke.clone());
                state.style = style.or(state.style);
            },
        );
        Ok(())
    }

    fn poll(&mut self, now_ms: u64) -> Vec<SyncResult<Change>> {
        let mut out = Vec::new();
        for (stroke_id, ctx, state) in self.core.due(now_ms) {
            self.fire(stroke_id, ctx, state, now_ms, &mut out);
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
