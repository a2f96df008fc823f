//! Deterministic resolution of changes competing for the same target.
//!
//! Precedence is ascending priority, then descending timestamp. A group of
//! changes of one kind is merged into a single change; a mixed group yields
//! its highest-precedence change unmodified.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::change::{Change, ChangeId, ChangeKind, TargetIntent};
use crate::entity::{EditMode, EntityId};
use crate::error::{SyncError, SyncResult};

/// Default number of resolutions remembered for diagnostics.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// How a conflict group was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionOutcome {
    /// Payloads of one kind were merged into the winner.
    Merged,
    /// Kinds differed; the highest-precedence change was kept as is.
    Picked,
}

/// Diagnostic record of one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Change whose identity the result carries.
    pub winner: ChangeId,
    /// Entity the group targeted.
    pub entity: EntityId,
    /// Mode the winner writes, if any.
    pub mode: Option<EditMode>,
    /// Kind of the winner.
    pub kind: ChangeKind,
    /// Number of competing changes.
    pub candidates: usize,
    /// How the group was settled.
    pub outcome: ResolutionOutcome,
}

/// Settles groups of competing changes and keeps a bounded history.
///
/// The history is advisory only; it never influences an outcome.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    history: VecDeque<Resolution>,
    history_limit: usize,
}

impl ConflictResolver {
    /// Create a resolver remembering the default number of resolutions.
    #[must_use]
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Create a resolver remembering at most `limit` distinct winners.
    #[must_use]
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            history: VecDeque::new(),
            history_limit: limit,
        }
    }

    /// Resolve a group of changes targeting one entity into one change.
    ///
    /// When every change has the same kind their payloads are folded from
    /// lowest to highest precedence, so the winner's fields override. The
    /// result keeps the winner's identity, takes the group's minimum
    /// priority and latest timestamp, and may create the entity if any
    /// member could.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::EmptyConflictGroup`] for an empty group and
    /// [`SyncError::InvalidChange`] if the changes target different
    /// entities or a payload merge fails.
    pub fn resolve(&mut self, mut changes: Vec<Change>) -> SyncResult<Change> {
        let first = changes.first().ok_or(SyncError::EmptyConflictGroup)?;
        let entity = first.entity;
        if changes.iter().any(|c| c.entity != entity) {
            return Err(SyncError::InvalidChange(
                "conflict group spans several entities".to_string(),
            ));
        }
        let candidates = changes.len();
        if candidates == 1 {
            return changes.pop().ok_or(SyncError::EmptyConflictGroup);
        }

        // Stable: equal keys keep submission order.
        changes.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.timestamp_ms.cmp(&a.timestamp_ms))
        });

        let same_kind = changes.iter().all(|c| c.kind() == changes[0].kind());
        let (resolved, outcome) = if same_kind {
            (Self::merge(changes)?, ResolutionOutcome::Merged)
        } else {
            changes.truncate(1);
            let winner = changes.pop().ok_or(SyncError::EmptyConflictGroup)?;
            (winner, ResolutionOutcome::Picked)
        };

        debug!(
            entity = %entity,
            kind = %resolved.kind(),
            candidates,
            ?outcome,
            "Resolved conflict"
        );
        self.record(Resolution {
            winner: resolved.id,
            entity,
            mode: resolved.target_mode(),
            kind: resolved.kind(),
            candidates,
            outcome,
        });
        Ok(resolved)
    }

    /// Fold a precedence-sorted, same-kind group into its winner.
    fn merge(sorted: Vec<Change>) -> SyncResult<Change> {
        let priority = sorted.iter().map(|c| c.priority).min().unwrap_or_default();
        let timestamp_ms = sorted.iter().map(|c| c.timestamp_ms).max().unwrap_or_default();
        let creates = sorted.iter().any(|c| c.intent == TargetIntent::Create);
        let confidence = sorted
            .iter()
            .filter_map(|c| c.confidence)
            .reduce(f64::min);

        let mut by_precedence = sorted.into_iter().rev();
        let mut merged = by_precedence.next().ok_or(SyncError::EmptyConflictGroup)?;
        for later in by_precedence {
            let payload = merged.payload.merge(later.payload)?;
            merged = Change { payload, ..later };
        }
        merged.priority = priority;
        merged.timestamp_ms = timestamp_ms;
        merged.confidence = confidence;
        if creates {
            merged.intent = TargetIntent::Create;
        }
        Ok(merged)
    }

    fn record(&mut self, resolution: Resolution) {
        if self.history_limit == 0 {
            return;
        }
        self.history.retain(|r| r.winner != resolution.winner);
        if self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(resolution);
    }

    /// Recent resolutions, oldest first.
    #[must_use]
    pub fn history(&self) -> &VecDeque<Resolution> {
        &self.history
    }

    /// Forget the history.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new()
    }
}
