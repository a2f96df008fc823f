//! Engine notifications and the observer list that delivers them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::apply::AppliedChange;
use crate::entity::{BlendMode, EditMode, EntityId};

/// Component that reported an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSource {
    /// A translation handler.
    Translation,
    /// The conflict resolver.
    Resolution,
    /// Applying a change to the model.
    Apply,
    /// A per-mode renderer.
    Render,
}

/// Notification emitted by the coordinator or the canvas manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum EngineEvent {
    /// A change was applied to the entity model.
    #[serde(rename = "change:applied")]
    ChangeApplied(AppliedChange),

    /// An entity was created, mutated or removed.
    #[serde(rename = "entity:updated")]
    EntityUpdated {
        /// The entity.
        entity_id: EntityId,
        /// Whether it was removed.
        removed: bool,
    },

    /// A mode's visibility, opacity or blend setting changed.
    #[serde(rename = "mode:state-changed")]
    ModeStateChanged {
        /// The mode.
        mode: EditMode,
        /// Whether the mode participates in rendering.
        enabled: bool,
        /// Whether the mode's layer is shown.
        visible: bool,
        /// Layer opacity.
        opacity: f64,
        /// Layer blend mode.
        blend: BlendMode,
    },

    /// A frame finished compositing.
    #[serde(rename = "frame:rendered")]
    FrameRendered {
        /// Frame counter.
        frame: u64,
        /// Time spent on the frame, in milliseconds.
        frame_time_ms: f64,
        /// Entities inside the viewport.
        visible_entities: usize,
        /// Entities culled by the viewport.
        culled_entities: usize,
    },

    /// A non-fatal error was isolated.
    #[serde(rename = "error")]
    Error {
        /// Component that failed.
        source: ErrorSource,
        /// Human-readable description.
        message: String,
    },
}

impl EngineEvent {
    /// Event name, as serialized.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ChangeApplied(_) => "change:applied",
            Self::EntityUpdated { .. } => "entity:updated",
            Self::ModeStateChanged { .. } => "mode:state-changed",
            Self::FrameRendered { .. } => "frame:rendered",
            Self::Error { .. } => "error",
        }
    }

    /// Shorthand for an error notification.
    #[must_use]
    pub fn error(source: ErrorSource, message: impl Into<String>) -> Self {
        Self::Error {
            source,
            message: message.into(),
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Boxed event listener.
pub type Listener = Box<dyn FnMut(&EngineEvent) + Send>;

/// Synchronous observer list.
///
/// Listeners run in subscription order on the emitting thread.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&EngineEvent) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    /// Deliver an event to every listener.
    pub fn emit(&mut self, event: &EngineEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    /// Drop every listener.
    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    /// Number of listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether there are no listeners.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
