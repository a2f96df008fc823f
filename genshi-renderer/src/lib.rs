//! # Genshi Renderer
//!
//! Software renderer for Genshi Studio, built on tiny-skia so it runs
//! headless and produces identical pixels everywhere.
//!
//! ## Frame Pipeline
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      CanvasManager                         │
//! │  entities ──► SpatialIndex ──► visible set (culling)       │
//! ├──────────────┬───────────────┬──────────────┬──────────────┤
//! │ Vector       │ Parametric    │ Procedural   │ Organic      │
//! │ (draw)       │ (pattern)     │ (code)       │ (growth)     │
//! │        per-entity tiles memoized in RenderCache            │
//! ├──────────────┴───────────────┴──────────────┴──────────────┤
//! │  Compositor: growth ▸ code ▸ parametric ▸ draw ──► output  │
//! └────────────────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod canvas;
pub mod compositor;
pub mod error;
pub mod pattern;
pub mod render_cache;
pub mod renderers;
pub mod spatial;
pub mod surface;
pub mod viewport;

pub use canvas::{
    CanvasConfig, CanvasManager, FrameReport, MemoryUsage, PerformanceMetrics, RenderStats,
};
pub use compositor::{Compositor, Layer, ModeState};
pub use error::{RenderError, RenderResult};
pub use pattern::{MotifGenerator, PatternGenerator};
pub use render_cache::{cache_key, CachedTile, RenderCache, RenderCacheConfig, RenderCacheStats};
pub use renderers::{
    ModeRenderer, OrganicRenderer, ParametricRenderer, ProceduralRenderer, TileContext,
    VectorRenderer,
};
pub use spatial::SpatialIndex;
pub use surface::Surface;
pub use viewport::{LodLevel, Viewport, ViewportThresholds, ViewportUpdate};

/// Genshi renderer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
