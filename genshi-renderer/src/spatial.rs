//! Uniform-grid spatial index for viewport culling.
//!
//! Each entity is registered in every grid cell its bounds touch. Entities
//! spanning more than [`MAX_CELLS_PER_ENTRY`] cells go into a small
//! overflow list that every query scans.

use std::collections::{HashMap, HashSet};

use genshi_core::{Bounds, EntityId};

/// Default cell edge in world units.
pub const DEFAULT_CELL_SIZE: f64 = 256.0;

/// Cells an entry may occupy before it is kept in the overflow list.
pub const MAX_CELLS_PER_ENTRY: i64 = 1024;

type Cell = (i64, i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellRange {
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
}

impl CellRange {
    fn count(self) -> i64 {
        let w = self.x1.saturating_sub(self.x0).saturating_add(1);
        let h = self.y1.saturating_sub(self.y0).saturating_add(1);
        w.saturating_mul(h)
    }

    fn cells(self) -> impl Iterator<Item = Cell> {
        (self.y0..=self.y1).flat_map(move |y| (self.x0..=self.x1).map(move |x| (x, y)))
    }
}

#[derive(Debug, Clone)]
struct Entry {
    bounds: Bounds,
    range: Option<CellRange>,
}

/// Maps entity IDs to bounds and answers rectangle queries.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    cell_size: f64,
    entries: HashMap<EntityId, Entry>,
    cells: HashMap<Cell, HashSet<EntityId>>,
    overflow: HashSet<EntityId>,
}

impl SpatialIndex {
    /// Create an index with [`DEFAULT_CELL_SIZE`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_cell_size(DEFAULT_CELL_SIZE)
    }

    /// Create an index with a custom cell size. Non-positive sizes fall
    /// back to the default.
    #[must_use]
    pub fn with_cell_size(cell_size: f64) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            DEFAULT_CELL_SIZE
        };
        Self {
            cell_size,
            entries: HashMap::new(),
            cells: HashMap::new(),
            overflow: HashSet::new(),
        }
    }

    /// Cell edge in world units.
    #[must_use]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    #[allow(clippy::cast_possible_truncation)]
    fn range(&self, bounds: &Bounds) -> CellRange {
        let cell = |v: f64| (v / self.cell_size).floor() as i64;
        CellRange {
            x0: cell(bounds.min_x),
            y0: cell(bounds.min_y),
            x1: cell(bounds.max_x),
            y1: cell(bounds.max_y),
        }
    }

    /// Insert or move an entity. Non-finite bounds remove it instead.
    ///
    /// Returns `true` if the entity is indexed afterwards.
    pub fn insert(&mut self, id: EntityId, bounds: Bounds) -> bool {
        self.remove(id);
        if !bounds.is_finite() {
            return false;
        }
        let range = self.range(&bounds);
        let range = if range.count() > MAX_CELLS_PER_ENTRY {
            self.overflow.insert(id);
            None
        } else {
            for cell in range.cells() {
                self.cells.entry(cell).or_default().insert(id);
            }
            Some(range)
        };
        self.entries.insert(id, Entry { bounds, range });
        true
    }

    /// Remove an entity, returning its bounds.
    pub fn remove(&mut self, id: EntityId) -> Option<Bounds> {
        let entry = self.entries.remove(&id)?;
        match entry.range {
            Some(range) => {
                for cell in range.cells() {
                    if let Some(ids) = self.cells.get_mut(&cell) {
                        ids.remove(&id);
                        if ids.is_empty() {
                            self.cells.remove(&cell);
                        }
                    }
                }
            }
            None => {
                self.overflow.remove(&id);
            }
        }
        Some(entry.bounds)
    }

    /// Indexed bounds of an entity.
    #[must_use]
    pub fn bounds(&self, id: EntityId) -> Option<Bounds> {
        self.entries.get(&id).map(|e| e.bounds)
    }

    /// Whether an entity is indexed.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.contains_key(&id)
    }

    /// IDs of every entity whose bounds intersect `region`, sorted.
    #[must_use]
    pub fn query(&self, region: &Bounds) -> Vec<EntityId> {
        if !region.is_finite() {
            return Vec::new();
        }
        let range = self.range(region);
        let occupied = i64::try_from(self.cells.len()).unwrap_or(i64::MAX);
        let mut found: Vec<EntityId> =
            if range.count() > MAX_CELLS_PER_ENTRY || range.count() > occupied {
                // Fewer occupied cells than cells in the region: scan entries.
                self.entries
                    .iter()
                    .filter(|(_, e)| e.bounds.intersects(region))
                    .map(|(id, _)| *id)
                    .collect()
            } else {
                let mut candidates: HashSet<EntityId> = self.overflow.iter().copied().collect();
                for cell in range.cells() {
                    if let Some(ids) = self.cells.get(&cell) {
                        candidates.extend(ids.iter().copied());
                    }
                }
                candidates
                    .into_iter()
                    .filter(|id| self.entries.get(id).is_some_and(|e| e.bounds.intersects(region)))
                    .collect()
            };
        found.sort_unstable();
        found
    }

    /// Number of indexed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cells.clear();
        self.overflow.clear();
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_query_finds_intersecting_entities() {
        let mut index = SpatialIndex::new();
        let near = EntityId::new();
        let far = EntityId::new();
        index.insert(near, Bounds::new(10.0, 10.0, 50.0, 50.0));
        index.insert(far, Bounds::new(5000.0, 5000.0, 5100.0, 5100.0));

        let hits = index.query(&Bounds::new(0.0, 0.0, 800.0, 600.0));
        assert_eq!(hits, vec![near]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_move_and_remove() {
        let mut index = SpatialIndex::new();
        let id = EntityId::new();
        index.insert(id, Bounds::new(0.0, 0.0, 10.0, 10.0));
        index.insert(id, Bounds::new(1000.0, 1000.0, 1010.0, 1010.0));
        assert!(index.query(&Bounds::new(0.0, 0.0, 20.0, 20.0)).is_empty());
        assert_eq!(index.len(), 1);

        assert_eq!(
            index.remove(id),
            Some(Bounds::new(1000.0, 1000.0, 1010.0, 1010.0))
        );
        assert!(index.is_empty());
        assert!(index.cells.is_empty());
    }

    #[test]
    fn test_negative_coordinates() {
        let mut index = SpatialIndex::new();
        let id = EntityId::new();
        index.insert(id, Bounds::new(-300.0, -300.0, -260.0, -260.0));
        assert_eq!(index.query(&Bounds::new(-280.0, -280.0, -270.0, -270.0)), vec![id]);
        assert!(index.query(&Bounds::new(-250.0, -250.0, 0.0, 0.0)).is_empty());
    }

    #[test]
    fn test_huge_entity_goes_to_overflow() {
        let mut index = SpatialIndex::new();
        let id = EntityId::new();
        index.insert(id, Bounds::new(-1e7, -1e7, 1e7, 1e7));
        assert!(index.overflow.contains(&id));
        assert_eq!(index.query(&Bounds::new(0.0, 0.0, 1.0, 1.0)), vec![id]);
        index.remove(id);
        assert!(index.overflow.is_empty());
    }

    #[test]
    fn test_non_finite_bounds_are_not_indexed() {
        let mut index = SpatialIndex::new();
        let id = EntityId::new();
        let bounds = Bounds {
            max_x: f64::NAN,
            ..Bounds::new(0.0, 0.0, 1.0, 1.0)
        };
        assert!(!index.insert(id, bounds));
        assert!(!index.contains(id));
    }

    proptest! {
        #[test]
        fn prop_query_matches_linear_scan(
            boxes in prop::collection::vec(
                (-2000.0_f64..2000.0, -2000.0_f64..2000.0, 0.0_f64..600.0, 0.0_f64..600.0),
                0..40
            ),
            view in (-2000.0_f64..2000.0, -2000.0_f64..2000.0, 1.0_f64..1500.0, 1.0_f64..1500.0)
        ) {
            let mut index = SpatialIndex::new();
            let mut all = Vec::new();
            for (x, y, w, h) in boxes {
                let id = EntityId::new();
                let b = Bounds::from_origin_size(x, y, w, h);
                index.insert(id, b);
                all.push((id, b));
            }
            let region = Bounds::from_origin_size(view.0, view.1, view.2, view.3);
            let mut expected: Vec<EntityId> = all
                .iter()
                .filter(|(_, b)| b.intersects(&region))
                .map(|(id, _)| *id)
                .collect();
            expected.sort_unstable();
            prop_assert_eq!(index.query(&region), expected);
        }
    }
}
