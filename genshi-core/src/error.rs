//! Error types for synchronization operations.

use thiserror::Error;

use crate::entity::{EditMode, EntityId};

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while translating, resolving or applying changes.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Entity not found in the model.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// The change cannot be applied as described.
    #[error("Invalid change: {0}")]
    InvalidChange(String),

    /// A translation handler could not derive a target representation.
    #[error("Translation from {from} to {to} failed: {reason}")]
    Translation {
        /// Mode the edit originated in.
        from: EditMode,
        /// Mode the handler was synthesizing for.
        to: EditMode,
        /// What went wrong.
        reason: String,
    },

    /// The conflict resolver was handed an empty group.
    #[error("Conflict group is empty")]
    EmptyConflictGroup,

    /// The coordinator was used after `destroy()`.
    #[error("Coordinator has been destroyed")]
    Destroyed,

    /// Model serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Shorthand for a translation failure.
    #[must_use]
    pub fn translation(from: EditMode, to: EditMode, reason: impl Into<String>) -> Self {
        Self::Translation {
            from,
            to,
            reason: reason.into(),
        }
    }
}
