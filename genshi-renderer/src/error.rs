//! Renderer error types.

use genshi_core::EditMode;
use thiserror::Error;

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors that can occur during rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Surface allocation failed. Fatal at initialization.
    #[error("Surface error: {0}")]
    Surface(String),

    /// Viewport has non-finite or non-positive values.
    #[error("Invalid viewport: {0}")]
    InvalidViewport(String),

    /// The pattern generator could not produce pixels.
    #[error("Pattern generation failed: {0}")]
    Pattern(String),

    /// A mode renderer failed mid-frame.
    #[error("Frame render failed for {mode}: {reason}")]
    Frame {
        /// Mode whose renderer failed.
        mode: EditMode,
        /// What went wrong.
        reason: String,
    },

    /// The canvas was used before `initialize`.
    #[error("Canvas not initialized")]
    NotInitialized,
}

impl RenderError {
    /// Shorthand for a [`RenderError::Frame`].
    #[must_use]
    pub fn frame(mode: EditMode, reason: impl Into<String>) -> Self {
        Self::Frame {
            mode,
            reason: reason.into(),
        }
    }
}
