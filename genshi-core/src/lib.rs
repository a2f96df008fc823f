//! # Genshi Core
//!
//! Entity model and multi-modal synchronization for Genshi Studio.
//!
//! Every entity carries four parallel representations: vector strokes,
//! a parametric pattern, procedural source and growth seeds. An edit made
//! in one mode is submitted as a [`Change`]; the [`SyncCoordinator`] applies
//! it, hands it to the [`TranslationHandler`] of its mode, and applies the
//! translated changes for the other three modes once their batch is due.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   SyncCoordinator                    │
//! │  pending[(entity, mode, kind)]   ConflictResolver    │
//! ├──────────────┬───────────────┬──────────┬────────────┤
//! │ DrawHandler  │ Parametric... │ Code...  │ Growth...  │
//! │  batching (debounce / throttle) + TranslationCache   │
//! ├──────────────┴───────────────┴──────────┴────────────┤
//! │  analysis: Douglas–Peucker, features, script codec   │
//! ├──────────────────────────────────────────────────────┤
//! │  EntityModel  (EntityStore, or the canvas manager)   │
//! └──────────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod analysis;
pub mod apply;
pub mod change;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod event;
pub mod geometry;
pub mod resolver;
pub mod store;
pub mod translate;

pub use apply::{apply_change, AppliedChange};
pub use change::{
    now_ms, Change, ChangeId, ChangeKind, ChangeOrigin, ChangePayload, TargetIntent,
    TRANSLATION_PRIORITY, USER_PRIORITY,
};
pub use coordinator::{FlushReport, SyncConfig, SyncCoordinator, SyncStats};
pub use entity::{
    BlendMode, Color, EditMode, Entity, EntityId, ExecutionResult, GrowthSeed, OrganicRepr,
    ParamMap, ParamValue, ParametricRepr, PatternType, ProceduralRepr, Representations, Stroke,
    StrokeId, StrokePoint, Style, VectorRepr,
};
pub use error::{SyncError, SyncResult};
pub use event::{EngineEvent, ErrorSource, EventBus, Listener, SubscriptionId};
pub use geometry::{Bounds, Point};
pub use resolver::{ConflictResolver, Resolution, ResolutionOutcome};
pub use store::{stroke_records, EntityModel, EntityStore, StrokeRecord};
pub use translate::{
    default_handlers, CacheStats, CodeHandler, DrawHandler, GrowthHandler, ParametricHandler,
    TranslationConfig, TranslationHandler,
};

/// Genshi core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
