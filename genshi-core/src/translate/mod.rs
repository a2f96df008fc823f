//! Cross-mode translation.
//!
//! One handler per source mode buffers raw edits of a logical unit (a
//! stroke, a pattern, a program, a growth simulation), batches them with a
//! debounce or frame-aligned throttle, and when the batch fires synthesizes
//! one change for each of the other three modes.
//!
//! ```text
//! handle(change) ──► units (latest state per unit)
//!                └─► batcher (deadline per unit)
//! poll(now) ──► due units ──► analysis ──► cache ──► translated changes
//! ```

pub mod batch;
pub mod cache;
mod code;
mod draw;
mod growth;
mod parametric;
pub mod synth;

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use tracing::trace;

use crate::analysis::FeatureThresholds;
use crate::change::{Change, ChangePayload, TargetIntent, TRANSLATION_PRIORITY};
use crate::entity::{EditMode, EntityId};
use crate::error::SyncResult;
use crate::geometry::Point;

pub use batch::{BatchPolicy, Batcher};
pub use cache::{CacheKey, CacheStats, TranslationCache, TranslationCacheConfig};
pub use code::CodeHandler;
pub use draw::DrawHandler;
pub use growth::GrowthHandler;
pub use parametric::ParametricHandler;

/// Tuning for the translation handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Throttle interval for stroke input, in milliseconds.
    pub draw_throttle_ms: u64,
    /// Debounce delay for parameter edits, in milliseconds.
    pub parametric_debounce_ms: u64,
    /// Debounce delay for code execution, in milliseconds.
    pub code_debounce_ms: u64,
    /// Throttle interval for growth updates, in milliseconds.
    pub growth_throttle_ms: u64,
    /// Pull of pressure-weighted smoothing in `0.0..=1.0`. Zero disables it.
    pub smoothing: f64,
    /// Douglas–Peucker tolerance in world units.
    pub simplify_tolerance: f64,
    /// Point count above which input is simplified before analysis.
    pub simplify_threshold: usize,
    /// Stride between sampled growth seeds.
    pub seed_stride: usize,
    /// Samples taken along a synthesized pattern path.
    pub pattern_samples: usize,
    /// Priority of translated changes.
    pub translated_priority: u8,
    /// Maximum logical units tracked per handler.
    pub max_tracked_units: usize,
    /// Pattern classification thresholds.
    pub thresholds: FeatureThresholds,
    /// Translation cache settings.
    pub cache: TranslationCacheConfig,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            draw_throttle_ms: 16,
            parametric_debounce_ms: 50,
            code_debounce_ms: 50,
            growth_throttle_ms: 16,
            smoothing: 0.5,
            simplify_tolerance: 2.0,
            simplify_threshold: 32,
            seed_stride: 5,
            pattern_samples: 64,
            translated_priority: TRANSLATION_PRIORITY,
            max_tracked_units: 1000,
            thresholds: FeatureThresholds::default(),
            cache: TranslationCacheConfig::default(),
        }
    }
}

/// Converts edits made in one mode into changes for the other modes.
///
/// `handle` only buffers; translated changes come out of `poll` once their
/// batch is due. Degenerate input yields no change at all.
pub trait TranslationHandler: Send {
    /// Mode this handler translates from.
    fn source_mode(&self) -> EditMode;

    /// Buffer a raw edit.
    ///
    /// # Errors
    ///
    /// Returns an error if the change does not belong to this handler's mode.
    fn handle(&mut self, change: &Change, now_ms: u64) -> SyncResult<()>;

    /// Translate every batch due at `now_ms`.
    ///
    /// Each element is one translated change, or the failure to derive one
    /// target representation.
    fn poll(&mut self, now_ms: u64) -> Vec<SyncResult<Change>>;

    /// Earliest time a pending batch becomes due.
    fn next_deadline(&self) -> Option<u64>;

    /// Number of batches waiting for their deadline.
    fn pending_batches(&self) -> usize;

    /// Forget everything buffered or tracked for an entity.
    fn discard_entity(&mut self, entity: EntityId);

    /// Drop all pending batches.
    fn cancel(&mut self);

    /// Translation cache statistics.
    fn cache_stats(&self) -> CacheStats;
}

/// One handler per mode, configured from `config`.
#[must_use]
pub fn default_handlers(config: &TranslationConfig) -> Vec<Box<dyn TranslationHandler>> {
    vec![
        Box::new(DrawHandler::new(config.clone())),
        Box::new(ParametricHandler::new(config.clone())),
        Box::new(CodeHandler::new(config.clone())),
        Box::new(GrowthHandler::new(config.clone())),
    ]
}

/// Target of a pending batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BatchContext {
    pub(crate) entity: EntityId,
    pub(crate) intent: TargetIntent,
}

impl BatchContext {
    fn of(change: &Change) -> Self {
        Self {
            entity: change.entity,
            intent: change.intent,
        }
    }

    /// Later input wins the entity; creation intent is sticky.
    fn merge(&mut self, later: Self) {
        self.entity = later.entity;
        if later.intent == TargetIntent::Create {
            self.intent = TargetIntent::Create;
        }
    }
}

#[derive(Debug)]
struct Unit<S> {
    entity: EntityId,
    state: S,
    last_used: u64,
}

/// Latest known state of each logical unit, bounded with LRU eviction.
#[derive(Debug)]
pub(crate) struct UnitStates<K, S> {
    units: HashMap<K, Unit<S>>,
    capacity: usize,
    clock: u64,
}

impl<K: Eq + Hash + Clone, S> UnitStates<K, S> {
    fn new(capacity: usize) -> Self {
        Self {
            units: HashMap::new(),
            capacity: capacity.max(1),
            clock: 0,
        }
    }

    /// State of `key`, created with `init` if unknown.
    pub(crate) fn entry<F>(&mut self, key: K, entity: EntityId, init: F) -> &mut S
    where
        F: FnOnce() -> S,
    {
        self.clock += 1;
        if !self.units.contains_key(&key) {
            while self.units.len() >= self.capacity {
                let Some(oldest) = self
                    .units
                    .iter()
                    .min_by_key(|(_, u)| u.last_used)
                    .map(|(k, _)| k.clone())
                else {
                    break;
                };
                self.units.remove(&oldest);
            }
        }
        let clock = self.clock;
        let unit = self.units.entry(key).or_insert_with(|| Unit {
            entity,
            state: init(),
            last_used: clock,
        });
        unit.entity = entity;
        unit.last_used = clock;
        &mut unit.state
    }

    pub(crate) fn get(&self, key: &K) -> Option<&S> {
        self.units.get(key).map(|u| &u.state)
    }

    /// Remove every unit of `entity`, returning their keys.
    fn remove_entity(&mut self, entity: EntityId) -> Vec<K> {
        let keys: Vec<K> = self
            .units
            .iter()
            .filter(|(_, u)| u.entity == entity)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            self.units.remove(key);
        }
        keys
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.units.len()
    }
}

/// State and scheduling shared by every handler.
#[derive(Debug)]
pub(crate) struct HandlerCore<K, S> {
    pub(crate) mode: EditMode,
    pub(crate) config: TranslationConfig,
    pub(crate) batcher: Batcher<K, BatchContext>,
    pub(crate) units: UnitStates<K, S>,
    pub(crate) cache: TranslationCache,
}

impl<K, S> HandlerCore<K, S>
where
    K: Eq + Hash + Clone + Display,
    S: Clone,
{
    pub(crate) fn new(mode: EditMode, config: TranslationConfig, policy: BatchPolicy) -> Self {
        Self {
            mode,
            batcher: Batcher::new(policy),
            units: UnitStates::new(config.max_tracked_units),
            cache: TranslationCache::with_config(config.cache),
            config,
        }
    }

    /// Fold an edit into its unit's state and (re)schedule the unit.
    pub(crate) fn buffer<I, U>(&mut self, key: K, change: &Change, now: u64, init: I, update: U)
    where
        I: FnOnce() -> S,
        U: FnOnce(&mut S),
    {
        update(self.units.entry(key.clone(), change.entity, init));
        self.batcher
            .push(key, BatchContext::of(change), now, BatchContext::merge);
    }

    /// Units due at `now`, with a snapshot of their state.
    pub(crate) fn due(&mut self, now: u64) -> Vec<(K, BatchContext, S)> {
        self.batcher
            .take_due(now)
            .into_iter()
            .filter_map(|(key, ctx)| {
                let state = self.units.get(&key)?.clone();
                Some((key, ctx, state))
            })
            .collect()
    }

    pub(crate) fn discard_entity(&mut self, entity: EntityId) {
        self.batcher.retain(|_, ctx| ctx.entity != entity);
        for key in self.units.remove_entity(entity) {
            self.cache.invalidate_source(&key.to_string());
        }
    }

    /// Collector for one fired batch.
    ///
    /// `reference` is the source geometry each emitted change is scored
    /// against.
    pub(crate) fn emitter<'a>(
        &'a mut self,
        key: &K,
        ctx: BatchContext,
        fingerprint: Option<u64>,
        reference: &'a [Point],
        now: u64,
        out: &'a mut Vec<SyncResult<Change>>,
    ) -> Emitter<'a> {
        Emitter {
            source_mode: self.mode,
            source_key: key.to_string(),
            ctx,
            fingerprint,
            reference,
            pattern_samples: self.config.pattern_samples,
            now,
            priority: self.config.translated_priority,
            cache: &mut self.cache,
            out,
        }
    }
}

/// Wraps synthesized payloads into translated changes, consulting the cache.
pub(crate) struct Emitter<'a> {
    source_mode: EditMode,
    source_key: String,
    ctx: BatchContext,
    fingerprint: Option<u64>,
    reference: &'a [Point],
    pattern_samples: usize,
    now: u64,
    priority: u8,
    cache: &'a mut TranslationCache,
    out: &'a mut Vec<SyncResult<Change>>,
}

impl Emitter<'_> {
    /// Produce the change for `target`, from cache or by running `synth`.
    ///
    /// `Ok(None)` from `synth` means the input could not be translated for
    /// this target and nothing is emitted.
    pub(crate) fn emit<F>(&mut self, target: EditMode, synth: F)
    where
        F: FnOnce() -> SyncResult<Option<ChangePayload>>,
    {
        let key = CacheKey::new(self.source_key.clone(), self.source_mode, target);
        let cached = self
            .fingerprint
            .and_then(|fp| self.cache.get(&key, fp, self.now));
        let payload = match cached {
            Some(payload) => payload,
            None => match synth() {
                Ok(Some(payload)) => {
                    if let Some(fp) = self.fingerprint {
                        self.cache.insert(key, fp, payload.clone(), self.now);
                    }
                    payload
                }
                Ok(None) => return,
                Err(e) => {
                    self.out.push(Err(e));
                    return;
                }
            },
        };
        let confidence = synth::translation_confidence(
            self.source_mode,
            target,
            self.reference,
            &synth::payload_path(&payload, self.pattern_samples),
        );
        trace!(
            source = %self.source_mode,
            %target,
            entity = %self.ctx.entity,
            ?confidence,
            "Translated"
        );
        let mut change = Change::translation(
            self.ctx.entity,
            self.ctx.intent,
            self.source_mode,
            payload,
            self.now,
        )
        .with_priority(self.priority);
        if let Some(confidence) = confidence {
            change = change.with_confidence(confidence);
        }
        self.out.push(Ok(change));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_states_evict_least_recent() {
        let mut units: UnitStates<u32, u32> = UnitStates::new(2);
        let e = EntityId::new();
        *units.entry(1, e, || 0) = 10;
        *units.entry(2, e, || 0) = 20;
        units.entry(1, e, || 0);
        *units.entry(3, e, || 0) = 30;
        assert_eq!(units.len(), 2);
        assert_eq!(units.get(&1), Some(&10));
        assert!(units.get(&2).is_none());
    }

    #[test]
    fn test_default_handlers_cover_every_mode() {
        let handlers = default_handlers(&TranslationConfig::default());
        let modes: Vec<EditMode> = handlers.iter().map(|h| h.source_mode()).collect();
        assert_eq!(modes, EditMode::ALL.to_vec());
    }
}
