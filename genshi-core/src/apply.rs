//! Applying resolved changes to the entity model.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::change::{Change, ChangeId, ChangeKind, ChangeOrigin, ChangePayload, TargetIntent};
use crate::entity::{
    EditMode, Entity, EntityId, OrganicRepr, ParamValue, ParametricRepr, PatternType,
    ProceduralRepr,
};
use crate::error::{SyncError, SyncResult};
use crate::geometry::Bounds;
use crate::store::EntityModel;

/// Summary of one applied change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppliedChange {
    /// The change that was applied.
    pub change_id: ChangeId,
    /// Entity it touched.
    pub entity: EntityId,
    /// Mode representation that was written, if any.
    pub mode: Option<EditMode>,
    /// Kind of change.
    pub kind: ChangeKind,
    /// Whether the entity was created by this change.
    pub created: bool,
    /// Whether the entity was removed by this change.
    pub removed: bool,
    /// Translation confidence, for translated changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Apply one change to the model.
///
/// User strokes extend a stroke with the same ID; translated strokes
/// replace it. Pattern parameters are merged into the existing pattern when
/// the pattern ID matches. Bounds and modification time are refreshed.
///
/// # Errors
///
/// Returns [`SyncError::EntityNotFound`] when the entity is missing and the
/// change does not allow creating it.
pub fn apply_change(model: &mut dyn EntityModel, change: &Change) -> SyncResult<AppliedChange> {
    let mut applied = AppliedChange {
        change_id: change.id,
        entity: change.entity,
        mode: change.target_mode(),
        kind: change.kind(),
        created: false,
        removed: false,
        confidence: change.confidence,
    };

    if matches!(change.payload, ChangePayload::EntityRemoved) {
        model
            .remove_entity(change.entity)
            .ok_or(SyncError::EntityNotFound(change.entity))?;
        applied.removed = true;
        trace!(entity = %change.entity, "Removed entity");
        return Ok(applied);
    }

    let mut entity = match (model.entity(change.entity), change.intent) {
        (Some(existing), _) => existing.clone(),
        (None, TargetIntent::Create) => {
            applied.created = true;
            Entity::new(change.entity)
        }
        (None, TargetIntent::Existing) => return Err(SyncError::EntityNotFound(change.entity)),
    };

    match &change.payload {
        ChangePayload::StrokeAdded { stroke, style } => {
            if change.origin == ChangeOrigin::User {
                entity.reprs.vector.absorb_stroke(stroke.clone());
            } else {
                entity.reprs.vector.upsert_stroke(stroke.clone());
            }
            if let Some(style) = style {
                entity.style = *style;
            }
        }
        ChangePayload::PatternApplied {
            pattern_id,
            pattern_type,
            parameters,
            region,
        } => {
            let fallback_region = entity.content_bounds();
            let repr = match entity.reprs.parametric.take() {
                Some(mut existing) if existing.pattern_id == *pattern_id => {
                    existing.parameters.extend(parameters.clone());
                    if let Some(kind) = pattern_type {
                        existing.pattern_type = kind.clone();
                    }
                    if let Some(region) = region {
                        existing.region = *region;
                    }
                    existing
                }
                previous => ParametricRepr {
                    pattern_id: pattern_id.clone(),
                    pattern_type: pattern_type
                        .clone()
                        .unwrap_or_else(|| PatternType::Named(pattern_id.clone())),
                    parameters: parameters.clone(),
                    region: region
                        .or(previous.map(|p| p.region))
                        .or(fallback_region)
                        .or_else(|| {
                            let size = parameters.get("size").and_then(ParamValue::as_number)?;
                            Some(Bounds::from_origin_size(0.0, 0.0, size, size))
                        })
                        .unwrap_or_default(),
                },
            };
            entity.reprs.parametric = Some(repr);
        }
        ChangePayload::CodeExecuted { source, result } => {
            entity.reprs.procedural = Some(ProceduralRepr::new(source.clone(), result.clone()));
        }
        ChangePayload::GrowthUpdated { seeds, generation } => {
            entity.reprs.organic = OrganicRepr {
                seeds: seeds.clone(),
                generation: *generation,
            };
        }
        ChangePayload::EntityRemoved => {}
    }

    entity.modified_at_ms = change.timestamp_ms;
    entity.refresh_bounds();
    trace!(
        entity = %entity.id,
        kind = %change.kind(),
        created = applied.created,
        "Applied change"
    );
    model.update_entity(entity);
    Ok(applied)
}
