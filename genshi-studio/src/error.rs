//! Studio error types.

use std::path::PathBuf;

use genshi_core::SyncError;
use genshi_renderer::RenderError;
use thiserror::Error;

/// Result type for studio operations.
pub type StudioResult<T> = Result<T, StudioError>;

/// Errors surfaced by the studio host.
#[derive(Debug, Error)]
pub enum StudioError {
    /// Synchronization failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Rendering failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Configuration is unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// PNG encoding failed.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// The driver task has stopped.
    #[error("Studio driver is not running")]
    DriverClosed,
}

impl StudioError {
    /// Shorthand for an [`StudioError::Io`].
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
