//! Changes - the only unit exchanged between the coordinator, the
//! translation handlers and the conflict resolver.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{
    EditMode, EntityId, ExecutionResult, GrowthSeed, ParamMap, ParamValue, PatternType, Stroke,
    Style,
};
use crate::error::{SyncError, SyncResult};
use crate::geometry::Bounds;

/// Priority assigned to user edits. Lower numbers win conflicts.
pub const USER_PRIORITY: u8 = 1;

/// Priority assigned to changes synthesized by translation.
pub const TRANSLATION_PRIORITY: u8 = 2;

/// Current time in milliseconds since the Unix epoch.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // Timestamps won't exceed u64 for billions of years
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Unique identifier for a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeId(Uuid);

impl ChangeId {
    /// Create a new unique change ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a change does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    /// A stroke was drawn or extended.
    StrokeAdded,
    /// Pattern parameters were applied.
    PatternApplied,
    /// Procedural source was executed.
    CodeExecuted,
    /// The growth simulation advanced.
    GrowthUpdated,
    /// The entity was deleted.
    EntityRemoved,
}

impl ChangeKind {
    /// Mode whose representation this kind of change writes.
    #[must_use]
    pub const fn mode(self) -> Option<EditMode> {
        match self {
            Self::StrokeAdded => Some(EditMode::Draw),
            Self::PatternApplied => Some(EditMode::Parametric),
            Self::CodeExecuted => Some(EditMode::Code),
            Self::GrowthUpdated => Some(EditMode::Growth),
            Self::EntityRemoved => None,
        }
    }

    /// Name as serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StrokeAdded => "stroke-added",
            Self::PatternApplied => "pattern-applied",
            Self::CodeExecuted => "code-executed",
            Self::GrowthUpdated => "growth-updated",
            Self::EntityRemoved => "entity-removed",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who produced a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOrigin {
    /// A direct user edit.
    User,
    /// Derived by a translation handler from an edit in another mode.
    Translation,
}

/// Whether the target entity must already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetIntent {
    /// The entity must exist; applying to a missing entity fails.
    #[default]
    Existing,
    /// Create the entity if it does not exist yet.
    Create,
}

/// Kind-specific payload of a change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "kebab-case")]
pub enum ChangePayload {
    /// Stroke points, either a new stroke or a continuation of one.
    StrokeAdded {
        /// The stroke, identified by its ID.
        stroke: Stroke,
        /// Style to set on the entity, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<Style>,
    },
    /// Parametric pattern parameters.
    PatternApplied {
        /// Pattern instance identifier.
        pattern_id: String,
        /// Pattern classification, if known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern_type: Option<PatternType>,
        /// Parameters to set. Unlisted parameters keep their value.
        #[serde(default)]
        parameters: ParamMap,
        /// Region the pattern fills, if changed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<Bounds>,
    },
    /// Procedural source and its execution result.
    CodeExecuted {
        /// Program source.
        source: String,
        /// Execution result, if the program was run.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<ExecutionResult>,
    },
    /// New growth simulation state.
    GrowthUpdated {
        /// All seeds.
        seeds: Vec<GrowthSeed>,
        /// Simulation generation.
        generation: u32,
    },
    /// Remove the entity.
    EntityRemoved,
}

impl ChangePayload {
    /// Kind of this payload.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        match self {
            Self::StrokeAdded { .. } => ChangeKind::StrokeAdded,
            Self::PatternApplied { .. } => ChangeKind::PatternApplied,
            Self::CodeExecuted { .. } => ChangeKind::CodeExecuted,
            Self::GrowthUpdated { .. } => ChangeKind::GrowthUpdated,
            Self::EntityRemoved => ChangeKind::EntityRemoved,
        }
    }

    /// Mode whose representation this payload writes.
    #[must_use]
    pub const fn target_mode(&self) -> Option<EditMode> {
        self.kind().mode()
    }

    /// Shallow union with a later payload of the same kind. Fields present
    /// in `later` override those in `self`.
    ///
    /// Stroke payloads for the same stroke concatenate their points; for a
    /// different stroke the later one replaces the earlier.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidChange`] if the kinds differ.
    pub fn merge(self, later: Self) -> SyncResult<Self> {
        match (self, later) {
            (
                Self::StrokeAdded {
                    mut stroke,
                    style: earlier_style,
                },
                Self::StrokeAdded {
                    stroke: later_stroke,
                    style,
                },
            ) => {
                let stroke = if stroke.id == later_stroke.id {
                    stroke.absorb(later_stroke);
                    stroke
                } else {
                    later_stroke
                };
                Ok(Self::StrokeAdded {
                    stroke,
                    style: style.or(earlier_style),
                })
            }
            (
                Self::PatternApplied {
                    pattern_type: earlier_type,
                    mut parameters,
                    region: earlier_region,
                    ..
                },
                Self::PatternApplied {
                    pattern_id,
                    pattern_type,
                    parameters: later_parameters,
                    region,
                },
            ) => {
                parameters.extend(later_parameters);
                Ok(Self::PatternApplied {
                    pattern_id,
                    pattern_type: pattern_type.or(earlier_type),
                    parameters,
                    region: region.or(earlier_region),
                })
            }
            (Self::CodeExecuted { .. }, later @ Self::CodeExecuted { .. })
            | (Self::GrowthUpdated { .. }, later @ Self::GrowthUpdated { .. })
            | (Self::EntityRemoved, later @ Self::EntityRemoved) => Ok(later),
            (earlier, later) => Err(SyncError::InvalidChange(format!(
                "cannot merge {} into {}",
                later.kind(),
                earlier.kind()
            ))),
        }
    }

    /// Check that every number in the payload is finite.
    fn check_finite(&self) -> Result<(), String> {
        let ok = match self {
            Self::StrokeAdded { stroke, style } => {
                stroke.points.iter().all(|p| p.is_finite())
                    && style.map_or(true, |s| s.stroke_width.is_finite() && s.opacity.is_finite())
            }
            Self::PatternApplied {
                parameters, region, ..
            } => {
                parameters
                    .values()
                    .filter_map(ParamValue::as_number)
                    .all(f64::is_finite)
                    && region.map_or(true, |r| r.is_finite())
            }
            Self::CodeExecuted { result, .. } => result
                .as_ref()
                .map_or(true, |r| r.points.iter().all(|p| p.is_finite())),
            Self::GrowthUpdated { seeds, .. } => seeds.iter().all(GrowthSeed::is_finite),
            Self::EntityRemoved => true,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("{} payload contains non-finite numbers", self.kind()))
        }
    }
}

/// A timestamped, typed description of one requested mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Unique identifier.
    pub id: ChangeId,
    /// Target entity.
    pub entity: EntityId,
    /// Whether the entity may be created.
    #[serde(default)]
    pub intent: TargetIntent,
    /// Mode the edit originated in.
    pub source_mode: EditMode,
    /// Who produced the change.
    pub origin: ChangeOrigin,
    /// Conflict precedence. Lower wins.
    pub priority: u8,
    /// Creation time in milliseconds.
    pub timestamp_ms: u64,
    /// How faithfully a translated change reproduces its source, in
    /// `0.0..=1.0`. User edits carry none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// What to do.
    pub payload: ChangePayload,
}

impl Change {
    /// A user edit made in `source_mode`.
    #[must_use]
    pub fn new(entity: EntityId, source_mode: EditMode, payload: ChangePayload) -> Self {
        Self {
            id: ChangeId::new(),
            entity,
            intent: TargetIntent::Existing,
            source_mode,
            origin: ChangeOrigin::User,
            priority: USER_PRIORITY,
            timestamp_ms: now_ms(),
            confidence: None,
            payload,
        }
    }

    /// A user deletion of `entity`, issued from `source_mode`.
    #[must_use]
    pub fn removal(entity: EntityId, source_mode: EditMode) -> Self {
        Self::new(entity, source_mode, ChangePayload::EntityRemoved)
    }

    /// A change synthesized by translating an edit from `source_mode`.
    #[must_use]
    pub fn translation(
        entity: EntityId,
        intent: TargetIntent,
        source_mode: EditMode,
        payload: ChangePayload,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            id: ChangeId::new(),
            entity,
            intent,
            source_mode,
            origin: ChangeOrigin::Translation,
            priority: TRANSLATION_PRIORITY,
            timestamp_ms,
            confidence: None,
            payload,
        }
    }

    /// Allow the change to create its entity.
    #[must_use]
    pub fn creating(mut self) -> Self {
        self.intent = TargetIntent::Create;
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Set the translation confidence, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    /// Set the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// Kind of the change.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        self.payload.kind()
    }

    /// Mode whose representation the change writes.
    #[must_use]
    pub const fn target_mode(&self) -> Option<EditMode> {
        self.payload.target_mode()
    }

    /// Whether the change was made directly by the user.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.origin == ChangeOrigin::User
    }

    /// Check the change is well formed.
    ///
    /// A user edit must write its own source mode, and all numbers must be
    /// finite.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidChange`] describing the first problem.
    pub fn validate(&self) -> SyncResult<()> {
        if self.is_user() {
            if let Some(target) = self.target_mode() {
                if target != self.source_mode {
                    return Err(SyncError::InvalidChange(format!(
                        "{} edit submitted from {} mode",
                        self.kind(),
                        self.source_mode
                    )));
                }
            }
        }
        if let Some(confidence) = self.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(SyncError::InvalidChange(format!(
                    "confidence {confidence} outside 0..=1"
                )));
            }
        }
        self.payload.check_finite().map_err(SyncError::InvalidChange)
    }
}
