//! Growth-mode translation: seeds to strokes, patterns and programs.

use std::collections::BTreeMap;

use tracing::debug;

use crate::analysis::Script;
use crate::change::{Change, ChangePayload};
use crate::entity::{EditMode, EntityId, OrganicRepr, ParamValue, StrokeId, StrokePoint};
use crate::error::{SyncError, SyncResult};
use crate::geometry::{Bounds, Point};
use crate::translate::cache::{fingerprint, CacheStats};
use crate::translate::synth::{analyse, parameters_from_features, stroke_from_path};
use crate::translate::{
    BatchContext, BatchPolicy, HandlerCore, TranslationConfig, TranslationHandler,
};

/// Translates growth simulation updates, throttled per entity.
///
/// Seeds are read as a path in the order the simulation lists them. Fewer
/// than two distinct seed positions cannot be fitted and translate to
/// nothing.
#[derive(Debug)]
pub struct GrowthHandler {
    core: HandlerCore<EntityId, OrganicRepr>,
}

impl GrowthHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(config: TranslationConfig) -> Self {
        let policy = BatchPolicy::Throttle(config.growth_throttle_ms);
        Self {
            core: HandlerCore::new(EditMode::Growth, config, policy),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn fire(
        &mut self,
        entity: EntityId,
        ctx: BatchContext,
        organic: &OrganicRepr,
        now: u64,
        out: &mut Vec<SyncResult<Change>>,
    ) {
        let path: Vec<Point> = organic.seeds.iter().map(|s| s.position).collect();
        let samples: Vec<StrokePoint> = organic
            .seeds
            .iter()
            .map(|s| StrokePoint::new(s.position.x, s.position.y).with_pressure(s.energy))
            .collect();
        let config = self.core.config.clone();
        let Some(analysis) = analyse(&samples, &config) else {
            debug!(entity = %entity, seeds = organic.seeds.len(), "Too few distinct seeds");
            return;
        };
        let Some(region) = Bounds::from_points(path.iter().copied()) else {
            return;
        };
        let features = &analysis.features;
        let energy =
            organic.seeds.iter().map(|s| s.energy).sum::<f64>() / organic.seeds.len() as f64;
        debug!(
            entity = %entity,
            seeds = organic.seeds.len(),
            analysed = analysis.points.len(),
            generation = organic.generation,
            "Translating growth"
        );

        let fp = fingerprint(organic);
        let mut emitter = self.core.emitter(&entity, ctx, fp, &path, now, out);
        emitter.emit(EditMode::Draw, || {
            let id = StrokeId::derived(&format!("growth:{entity}"));
            Ok(Some(ChangePayload::StrokeAdded {
                stroke: stroke_from_path(id, &path, energy),
                style: None,
            }))
        });
        emitter.emit(EditMode::Parametric, || {
            let mut parameters = parameters_from_features(features, None);
            parameters.insert("energy".to_string(), ParamValue::Number(energy));
            parameters.insert(
                "generation".to_string(),
                ParamValue::Number(f64::from(organic.generation)),
            );
            Ok(Some(ChangePayload::PatternApplied {
                pattern_id: format!("growth:{entity}"),
                pattern_type: Some(features.pattern_type.clone()),
                parameters,
                region: Some(region),
            }))
        });
        emitter.emit(EditMode::Code, || {
            let mut params = BTreeMap::new();
            params.insert("generation".to_string(), f64::from(organic.generation));
            let source = Script {
                style: None,
                path: path.clone(),
                params,
                seeds: organic.seeds.clone(),
            }
            .to_source();
            Ok(Some(ChangePayload::CodeExecuted {
                source,
                result: Some(path.clone().into()),
            }))
        });
    }
}

impl TranslationHandler for GrowthHandler {
    fn source_mode(&self) -> EditMode {
        EditMode::Growth
    }

    fn handle(&mut self, change: &Change, now_ms: u64) -> SyncResult<()> {
        let ChangePayload::GrowthUpdated { seeds, generation } = &change.payload else {
            return Err(SyncError::InvalidChange(format!(
                "growth handler cannot buffer {}",
                change.kind()
            )));
        };
        self.core.buffer(
            change.entity,
            change,
            now_ms,
            OrganicRepr::default,
            |organic| {
                organic.seeds.clone_from(seeds);
                organic.generation = *generation;
            },
        );
        Ok(())
    }

    fn poll(&mut self, now_ms: u64) -> Vec<SyncResult<Change>> {
        let mut out = Vec::new();
        for (entity, ctx, organic) in self.core.due(now_ms) {
            self.fire(entity, ctx, &organic, now_ms, &mut out);
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
