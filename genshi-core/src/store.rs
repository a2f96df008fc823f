//! Entity storage.
//!
//! [`EntityModel`] is the seam between the coordinator, which decides what
//! to write, and whoever owns the entity table. The canvas manager in the
//! renderer implements it directly; [`EntityStore`] is the plain in-memory
//! version used headless and in tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityId, Stroke, Style};
use crate::error::SyncResult;

/// Read/write access to the shared entity table.
pub trait EntityModel {
    /// Look up an entity.
    fn entity(&self, id: EntityId) -> Option<&Entity>;

    /// Insert or replace an entity.
    fn update_entity(&mut self, entity: Entity);

    /// Remove an entity, returning it if it existed.
    fn remove_entity(&mut self, id: EntityId) -> Option<Entity>;

    /// IDs of every stored entity.
    fn entity_ids(&self) -> Vec<EntityId>;
}

/// Vector-mode content of one entity as plain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeRecord {
    /// Entity the strokes belong to.
    pub entity: EntityId,
    /// Entity style.
    pub style: Style,
    /// Strokes in drawing order.
    pub strokes: Vec<Stroke>,
}

/// Collect the vector-mode content of every entity that has any, ordered
/// by entity ID.
pub fn stroke_records(model: &dyn EntityModel) -> Vec<StrokeRecord> {
    let mut ids = model.entity_ids();
    ids.sort();
    ids.into_iter()
        .filter_map(|id| model.entity(id))
        .filter(|e| !e.reprs.vector.is_empty())
        .map(|e| StrokeRecord {
            entity: e.id,
            style: e.style,
            strokes: e.reprs.vector.strokes.clone(),
        })
        .collect()
}

/// In-memory entity table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityStore {
    entities: HashMap<EntityId, Entity>,
}

impl EntityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterate over all entities.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Serialize the store to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize a store from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl EntityModel for EntityStore {
    fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    fn update_entity(&mut self, entity: Entity) {
        self.entities.insert(entity.id, entity);
    }

    fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::StrokePoint;

    #[test]
    fn test_store_crud_and_json() {
        let mut store = EntityStore::new();
        let mut entity = Entity::new(EntityId::new());
        entity.reprs.vector.strokes.push(Stroke::new(vec![
            StrokePoint::new(0.0, 0.0),
            StrokePoint::new(5.0, 5.0),
        ]));
        let id = entity.id;
        store.update_entity(entity);
        store.update_entity(Entity::new(EntityId::new()));
        assert_eq!(store.len(), 2);

        let records = stroke_records(&store);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entity, id);

        let restored = EntityStore::from_json(&store.to_json().unwrap()).unwrap();
        assert_eq!(restored.entity(id), store.entity(id));

        assert!(store.remove_entity(id).is_some());
        assert!(store.remove_entity(id).is_none());
        assert_eq!(store.len(), 1);
    }
}
