//! # Synchronization Coordinator
//!
//! Owns the pending change map, the four translation handlers and the
//! conflict resolver, and applies resolved changes to an [`EntityModel`].
//!
//! ```text
//! submit(change) ──► pending[(entity, mode, kind)]
//!        └─ user edit ──► handler for its mode (buffered)
//!
//! tick(now, model)
//!   1. poll handlers ──► translated changes ──► pending
//!   2. flush: per group, resolve if > 1 change, then apply
//!      (removals last) ──► change:applied / entity:updated / error
//! ```
//!
//! The coordinator never reads a clock on its own; callers pass the time in
//! milliseconds, which keeps debounce and throttle behavior deterministic.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::apply::{apply_change, AppliedChange};
use crate::change::{Change, ChangeKind, ChangePayload, TargetIntent};
use crate::entity::{EditMode, EntityId};
use crate::error::{SyncError, SyncResult};
use crate::event::{EngineEvent, ErrorSource, EventBus, SubscriptionId};
use crate::resolver::{ConflictResolver, Resolution};
use crate::store::EntityModel;
use crate::translate::{default_handlers, CacheStats, TranslationConfig, TranslationHandler};

/// Removed entities remembered so late translations cannot resurrect them.
const TOMBSTONE_LIMIT: usize = 1024;

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval between flushes, in milliseconds.
    pub flush_interval_ms: u64,
    /// Flush duration above which a budget warning is raised.
    pub frame_budget_ms: f64,
    /// Number of conflict resolutions kept for diagnostics.
    pub conflict_history: usize,
    /// Translation handler tuning.
    pub translation: TranslationConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 16,
            frame_budget_ms: 16.0,
            conflict_history: 100,
            translation: TranslationConfig::default(),
        }
    }
}

/// Key of a pending group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct PendingKey {
    entity: EntityId,
    mode: Option<EditMode>,
    kind: ChangeKind,
}

impl PendingKey {
    fn of(change: &Change) -> Self {
        Self {
            entity: change.entity,
            mode: change.target_mode(),
            kind: change.kind(),
        }
    }
}

/// Bounded set of removed entities.
#[derive(Debug, Default)]
struct Tombstones {
    set: HashSet<EntityId>,
    order: VecDeque<EntityId>,
}

impl Tombstones {
    fn insert(&mut self, id: EntityId) {
        if !self.set.insert(id) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > TOMBSTONE_LIMIT {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, id: EntityId) {
        if self.set.remove(&id) {
            self.order.retain(|e| *e != id);
        }
    }

    fn contains(&self, id: EntityId) -> bool {
        self.set.contains(&id)
    }

    fn clear(&mut self) {
        self.set.clear();
        self.order.clear();
    }
}

/// Outcome of one flush.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlushReport {
    /// Changes applied, in application order.
    pub applied: Vec<AppliedChange>,
    /// Changes discarded by a failed resolution or apply.
    pub dropped: usize,
    /// Groups that needed conflict resolution.
    pub conflicts: usize,
    /// Translation failures collected while polling the handlers.
    pub translation_errors: usize,
    /// Wall time spent, in milliseconds.
    pub duration_ms: f64,
    /// Whether the flush exceeded the frame budget.
    pub over_budget: bool,
}

impl FlushReport {
    /// Whether the flush did nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
            && self.dropped == 0
            && self.conflicts == 0
            && self.translation_errors == 0
    }
}

/// Cumulative coordinator statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Changes accepted by `submit`.
    pub submitted: u64,
    /// Changes applied to the model.
    pub applied: u64,
    /// Changes discarded for any reason.
    pub dropped: u64,
    /// Conflict groups resolved.
    pub conflicts: u64,
    /// Translation failures reported by handlers.
    pub translation_errors: u64,
    /// Flushes performed.
    pub flushes: u64,
    /// Flushes that exceeded the frame budget.
    pub budget_overruns: u64,
    /// Duration of the last flush, in milliseconds.
    pub last_flush_ms: f64,
    /// Changes currently waiting for a flush.
    pub pending: usize,
    /// Batches buffered inside the handlers.
    pub pending_batches: usize,
    /// Translation cache statistics over every handler.
    pub cache: CacheStats,
}

/// Top-level orchestrator of the synchronization pipeline.
///
/// Constructed explicitly and owned by its caller; `destroy` releases the
/// handlers and listeners and turns every later call into
/// [`SyncError::Destroyed`].
pub struct SyncCoordinator {
    config: SyncConfig,
    handlers: Vec<Box<dyn TranslationHandler>>,
    resolver: ConflictResolver,
    pending: HashMap<PendingKey, Vec<Change>>,
    tombstones: Tombstones,
    events: EventBus,
    stats: SyncStats,
    destroyed: bool,
}

impl SyncCoordinator {
    /// Create a coordinator with one default handler per mode.
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        let handlers = default_handlers(&config.translation);
        Self::with_handlers(config, handlers)
    }

    /// Create a coordinator with custom handlers.
    ///
    /// User edits from a mode without a handler are applied but not
    /// translated.
    #[must_use]
    pub fn with_handlers(config: SyncConfig, handlers: Vec<Box<dyn TranslationHandler>>) -> Self {
        Self {
            resolver: ConflictResolver::with_history_limit(config.conflict_history),
            config,
            handlers,
            pending: HashMap::new(),
            tombstones: Tombstones::default(),
            events: EventBus::new(),
            stats: SyncStats::default(),
            destroyed: false,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Accept one change without applying it.
    ///
    /// User edits are also buffered by the handler of their mode for
    /// translation. Translated changes for a removed entity are dropped.
    /// A user removal discards everything still buffered for the entity.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Destroyed`] after `destroy`, or
    /// [`SyncError::InvalidChange`] if the change fails validation.
    pub fn submit(&mut self, change: Change, now_ms: u64) -> SyncResult<()> {
        self.ensure_alive()?;
        change.validate()?;
        self.stats.submitted += 1;

        if matches!(change.payload, ChangePayload::EntityRemoved) {
            self.discard_entity(change.entity);
            self.enqueue(change);
            return Ok(());
        }

        if change.is_user() {
            if change.intent == TargetIntent::Create {
                self.tombstones.remove(change.entity);
            }
            self.route_to_handler(&change, now_ms);
        } else if self.tombstones.contains(change.entity) {
            debug!(entity = %change.entity, kind = %change.kind(), "Dropping change for removed entity");
            self.stats.dropped += 1;
            return Ok(());
        }
        self.enqueue(change);
        Ok(())
    }

    fn ensure_alive(&self) -> SyncResult<()> {
        if self.destroyed {
            Err(SyncError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn enqueue(&mut self, change: Change) {
        trace!(entity = %change.entity, kind = %change.kind(), "Queued change");
        self.pending
            .entry(PendingKey::of(&change))
            .or_default()
            .push(change);
    }

    fn route_to_handler(&mut self, change: &Change, now_ms: u64) {
        let Some(handler) = self
            .handlers
            .iter_mut()
            .find(|h| h.source_mode() == change.source_mode)
        else {
            return;
        };
        if let Err(e) = handler.handle(change, now_ms) {
            warn!(error = %e, mode = %change.source_mode, "Handler rejected change");
            self.stats.translation_errors += 1;
            self.events
                .emit(&EngineEvent::error(ErrorSource::Translation, e.to_string()));
        }
    }

    /// Drop buffered input and pending translations of an entity.
    fn discard_entity(&mut self, entity: EntityId) {
        for handler in &mut self.handlers {
            handler.discard_entity(entity);
        }
        let before = self.pending_len();
        self.pending
            .retain(|key, group| key.entity != entity || group.iter().all(Change::is_user));
        let discarded = before - self.pending_len();
        if discarded > 0 {
            debug!(entity = %entity, discarded, "Discarded pending translations");
            self.stats.dropped += discarded as u64;
        }
        self.tombstones.insert(entity);
    }

    /// Collect due translations, then flush.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Destroyed`] after `destroy`.
    pub fn tick(&mut self, now_ms: u64, model: &mut dyn EntityModel) -> SyncResult<FlushReport> {
        self.ensure_alive()?;
        let translation_errors = self.poll_handlers(now_ms);
        let mut report = self.flush(model)?;
        report.translation_errors = translation_errors;
        Ok(report)
    }

    fn poll_handlers(&mut self, now_ms: u64) -> usize {
        let mut outputs = Vec::new();
        for handler in &mut self.handlers {
            outputs.extend(handler.poll(now_ms));
        }
        let mut errors = 0;
        for output in outputs {
            match output {
                Ok(change) => {
                    if self.tombstones.contains(change.entity) {
                        self.stats.dropped += 1;
                        continue;
                    }
                    self.enqueue(change);
                }
                Err(e) => {
                    errors += 1;
                    debug!(error = %e, "Translation produced no change");
                    self.events
                        .emit(&EngineEvent::error(ErrorSource::Translation, e.to_string()));
                }
            }
        }
        self.stats.translation_errors += errors as u64;
        errors
    }

    /// Resolve and apply everything pending.
    ///
    /// Groups with several changes go through the conflict resolver.
    /// Removals are applied after every other change of the flush. A
    /// failure is reported as an `error` event and only drops the changes
    /// involved.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Destroyed`] after `destroy`.
    pub fn flush(&mut self, model: &mut dyn EntityModel) -> SyncResult<FlushReport> {
        self.ensure_alive()?;
        let started = Instant::now();
        let mut report = FlushReport::default();

        let mut groups: Vec<(PendingKey, Vec<Change>)> = self.pending.drain().collect();
        groups.sort_by_key(|(key, _)| (key.kind == ChangeKind::EntityRemoved, *key));

        for (key, group) in groups {
            let size = group.len();
            let change = if size == 1 {
                group.into_iter().next()
            } else {
                report.conflicts += 1;
                match self.resolver.resolve(group) {
                    Ok(change) => Some(change),
                    Err(e) => {
                        warn!(
                            error = %e,
                            entity = %key.entity,
                            mode = ?key.mode,
                            "Conflict resolution failed"
                        );
                        report.dropped += size;
                        self.events
                            .emit(&EngineEvent::error(ErrorSource::Resolution, e.to_string()));
                        None
                    }
                }
            };
            let Some(change) = change else {
                continue;
            };
            match apply_change(model, &change) {
                Ok(applied) => {
                    if applied.removed {
                        self.tombstones.insert(applied.entity);
                    }
                    self.events.emit(&EngineEvent::ChangeApplied(applied));
                    self.events.emit(&EngineEvent::EntityUpdated {
                        entity_id: applied.entity,
                        removed: applied.removed,
                    });
                    report.applied.push(applied);
                }
                Err(e) => {
                    warn!(error = %e, kind = %change.kind(), "Dropping change");
                    report.dropped += 1;
                    self.events
                        .emit(&EngineEvent::error(ErrorSource::Apply, e.to_string()));
                }
            }
        }

        let elapsed = started.elapsed().as_secs_f64() * 1000.0;
        report.duration_ms = elapsed;
        report.over_budget = elapsed > self.config.frame_budget_ms;
        if report.over_budget {
            warn!(
                elapsed_ms = elapsed,
                budget_ms = self.config.frame_budget_ms,
                applied = report.applied.len(),
                "Flush exceeded frame budget"
            );
            self.stats.budget_overruns += 1;
        }

        self.stats.flushes += 1;
        self.stats.applied += report.applied.len() as u64;
        self.stats.dropped += report.dropped as u64;
        self.stats.conflicts += report.conflicts as u64;
        self.stats.last_flush_ms = elapsed;
        if !report.applied.is_empty() {
            debug!(
                applied = report.applied.len(),
                conflicts = report.conflicts,
                dropped = report.dropped,
                "Flushed changes"
            );
        }
        Ok(report)
    }

    /// Register a listener for engine events.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&EngineEvent) + Send + 'static,
    {
        self.events.subscribe(listener)
    }

    /// Remove a listener.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Number of changes waiting for a flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Earliest time a handler batch becomes due.
    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        self.handlers.iter().filter_map(|h| h.next_deadline()).min()
    }

    /// Recent conflict resolutions, oldest first.
    #[must_use]
    pub fn conflict_history(&self) -> &VecDeque<Resolution> {
        self.resolver.history()
    }

    /// Snapshot of the statistics.
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        SyncStats {
            pending: self.pending_len(),
            pending_batches: self.handlers.iter().map(|h| h.pending_batches()).sum(),
            cache: self
                .handlers
                .iter()
                .map(|h| h.cache_stats())
                .fold(CacheStats::default(), CacheStats::combined),
            ..self.stats
        }
    }

    /// Whether `destroy` has been called.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Cancel every pending batch and change and drop all listeners.
    ///
    /// Calling it again is a no-op.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        for handler in &mut self.handlers {
            handler.cancel();
        }
        let discarded = self.pending_len();
        self.pending.clear();
        self.tombstones.clear();
        self.events.clear();
        self.resolver.clear_history();
        self.destroyed = true;
        debug!(discarded, "Coordinator destroyed");
    }
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("config", &self.config)
            .field("handlers", &self.handlers.len())
            .field("pending", &self.pending_len())
            .field("events", &self.events)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::entity::{Stroke, StrokePoint};
    use crate::store::EntityStore;

    fn stroke(entity: EntityId, points: &[(f64, f64)], at: u64) -> Change {
        Change::new(
            entity,
            EditMode::Draw,
            ChangePayload::StrokeAdded {
                stroke: Stroke::new(
                    points
                        .iter()
                        .map(|&(x, y)| StrokePoint::new(x, y).with_timestamp(at))
                        .collect(),
                ),
                style: None,
            },
        )
        .with_timestamp(at)
        .creating()
    }

    #[test]
    fn test_user_edit_applied_on_next_flush() {
        let mut sync = SyncCoordinator::new(SyncConfig::default());
        let mut store = EntityStore::new();
        let entity = EntityId::new();
        sync.submit(stroke(entity, &[(0.0, 0.0), (10.0, 10.0)], 0), 0)
            .unwrap();
        assert_eq!(sync.pending_len(), 1);
        assert!(store.is_empty());

        let report = sync.tick(1, &mut store).unwrap();
        assert_eq!(report.applied.len(), 1);
        assert!(report.applied[0].created);
        assert!(store.entity(entity).is_some());
    }

    #[test]
    fn test_translations_follow_at_handler_deadline() {
        let mut sync = SyncCoordinator::new(SyncConfig::default());
        let mut store = EntityStore::new();
        let entity = EntityId::new();
        sync.submit(stroke(entity, &[(0.0, 0.0), (50.0, 20.0), (100.0, 0.0)], 0), 0)
            .unwrap();
        sync.tick(1, &mut store).unwrap();
        assert_eq!(sync.next_deadline(), Some(16));

        let report = sync.tick(16, &mut store).unwrap();
        assert_eq!(report.applied.len(), 3);
        let entity = store.entity(entity).unwrap();
        assert_eq!(entity.populated_modes().count(), 4);
    }

    #[test]
    fn test_removal_blocks_late_translations() {
        let mut sync = SyncCoordinator::new(SyncConfig::default());
        let mut store = EntityStore::new();
        let entity = EntityId::new();
        sync.submit(stroke(entity, &[(0.0, 0.0), (30.0, 30.0)], 0), 0)
            .unwrap();
        sync.tick(1, &mut store).unwrap();
        sync.submit(Change::removal(entity, EditMode::Draw), 2)
            .unwrap();
        assert_eq!(sync.stats().pending_batches, 0);

        let report = sync.tick(16, &mut store).unwrap();
        assert_eq!(report.applied.len(), 1);
        assert!(report.applied[0].removed);
        assert!(store.entity(entity).is_none());
    }

    #[test]
    fn test_failed_change_is_isolated() {
        let mut sync = SyncCoordinator::new(SyncConfig::default());
        let mut store = EntityStore::new();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        sync.subscribe(move |e| {
            if let EngineEvent::Error { source, .. } = e {
                sink.lock().unwrap().push(*source);
            }
        });

        let missing = Change::removal(EntityId::new(), EditMode::Draw);
        let good = stroke(EntityId::new(), &[(0.0, 0.0), (5.0, 5.0)], 0);
        sync.submit(missing, 0).unwrap();
        sync.submit(good, 0).unwrap();
        let report = sync.tick(1, &mut store).unwrap();

        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(*errors.lock().unwrap(), vec![ErrorSource::Apply]);
    }

    #[test]
    fn test_same_target_conflict_is_resolved() {
        let mut sync = SyncCoordinator::new(SyncConfig::default());
        let mut store = EntityStore::new();
        let entity = EntityId::new();
        let first = stroke(entity, &[(0.0, 0.0), (5.0, 5.0)], 0);
        let second = stroke(entity, &[(10.0, 10.0), (20.0, 5.0)], 1);
        sync.submit(first, 0).unwrap();
        sync.submit(second, 1).unwrap();
        let report = sync.tick(2, &mut store).unwrap();
        assert_eq!(report.conflicts, 1);
        assert_eq!(report.applied.len(), 1);
        assert_eq!(sync.conflict_history().len(), 1);
    }

    #[test]
    fn test_empty_tick_is_a_no_op() {
        let mut sync = SyncCoordinator::new(SyncConfig::default());
        let mut store = EntityStore::new();
        let report = sync.tick(100, &mut store).unwrap();
        assert!(report.is_empty());
        assert_eq!(sync.stats().flushes, 1);
    }

    #[test]
    fn test_invalid_change_rejected_at_submit() {
        let mut sync = SyncCoordinator::new(SyncConfig::default());
        let mut change = stroke(EntityId::new(), &[(0.0, f64::NAN)], 0);
        assert!(sync.submit(change.clone(), 0).is_err());
        change.source_mode = EditMode::Code;
        assert!(sync.submit(change, 0).is_err());
        assert_eq!(sync.stats().submitted, 0);
    }

    #[test]
    fn test_destroy() {
        let mut sync = SyncCoordinator::new(SyncConfig::default());
        let mut store = EntityStore::new();
        sync.submit(stroke(EntityId::new(), &[(0.0, 0.0), (5.0, 5.0)], 0), 0)
            .unwrap();
        sync.destroy();
        sync.destroy();
        assert!(sync.is_destroyed());
        assert_eq!(sync.pending_len(), 0);
        assert_eq!(sync.next_deadline(), None);
        assert!(matches!(
            sync.tick(16, &mut store),
            Err(SyncError::Destroyed)
        ));
        assert!(matches!(
            sync.submit(Change::removal(EntityId::new(), EditMode::Draw), 0),
            Err(SyncError::Destroyed)
        ));
    }
}
