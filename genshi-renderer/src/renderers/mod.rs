//! Per-mode renderers.
//!
//! A [`ModeRenderer`] draws one entity's representation for its mode into
//! a world-aligned tile. [`render_layer`] memoizes those tiles in the
//! [`RenderCache`] and places them on the mode's render target through the
//! viewport transform.

pub mod organic;
pub mod parametric;
pub mod procedural;
pub mod vector;

pub use organic::OrganicRenderer;
pub use parametric::ParametricRenderer;
pub use procedural::ProceduralRenderer;
pub use vector::VectorRenderer;

use genshi_core::{EditMode, Entity, Point};
use tiny_skia::{Path, PathBuilder, Transform};
use tracing::trace;

use crate::error::{RenderError, RenderResult};
use crate::render_cache::{cache_key, CachedTile, RenderCache};
use crate::surface::Surface;
use crate::viewport::LodLevel;

/// Where a tile sits in the world and how finely it is rasterized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileContext {
    /// World position of the tile's top-left pixel.
    pub origin: Point,
    /// Tile pixels per world unit.
    pub scale: f64,
    /// Level of detail to draw at.
    pub lod: LodLevel,
    /// Whether to anti-alias.
    pub anti_alias: bool,
}

impl TileContext {
    /// World to tile pixel transform.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn transform(&self) -> Transform {
        let s = self.scale as f32;
        Transform::from_row(
            s,
            0.0,
            0.0,
            s,
            (-self.origin.x * self.scale) as f32,
            (-self.origin.y * self.scale) as f32,
        )
    }
}

/// Draws one mode's representation of an entity.
pub trait ModeRenderer: Send {
    /// Mode this renderer draws.
    fn mode(&self) -> EditMode;

    /// World margin to add around the mode's bounds so nothing is clipped.
    fn margin(&self, entity: &Entity) -> f64 {
        entity.style.stroke_width.max(0.0) / 2.0
    }

    /// Draw the entity into `tile`, using `ctx.transform()` for world
    /// coordinates.
    ///
    /// # Errors
    ///
    /// Returns an error if the representation cannot be drawn.
    fn draw_entity(&self, entity: &Entity, ctx: &TileContext, tile: &mut Surface)
        -> RenderResult<()>;
}

/// Per-frame inputs shared by every tile of a layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerContext {
    /// World to target pixel transform.
    pub view: Transform,
    /// Target pixels per world unit (zoom times device pixel ratio).
    pub scale: f64,
    /// Level of detail for the frame.
    pub lod: LodLevel,
    /// Largest tile edge in pixels.
    pub max_tile_px: u32,
    /// Whether to anti-alias.
    pub anti_alias: bool,
}

/// Counters for one rendered layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerStats {
    /// Entities placed on the target.
    pub drawn: usize,
    /// Tiles served from the cache.
    pub cache_hits: usize,
    /// Tiles rendered fresh.
    pub cache_misses: usize,
}

/// Render `entities` into `target`, reusing cached tiles.
///
/// # Errors
///
/// Returns the first error a tile fails with; `target` is then partially
/// drawn and should be discarded.
pub fn render_layer(
    renderer: &dyn ModeRenderer,
    entities: &[&Entity],
    layer: &LayerContext,
    cache: &mut RenderCache,
    target: &mut Surface,
) -> RenderResult<LayerStats> {
    let mode = renderer.mode();
    let mut stats = LayerStats::default();
    for entity in entities {
        let key = cache_key(entity.id, mode);
        if let Some(tile) = cache.get(&key) {
            place_tile(target, tile, entity, layer);
            stats.cache_hits += 1;
        } else {
            stats.cache_misses += 1;
            let Some(tile) = render_tile(renderer, entity, layer)? else {
                continue;
            };
            place_tile(target, &tile, entity, layer);
            cache.insert(key, tile);
        }
        stats.drawn += 1;
    }
    trace!(
        mode = %mode,
        drawn = stats.drawn,
        hits = stats.cache_hits,
        misses = stats.cache_misses,
        "Layer rendered"
    );
    Ok(stats)
}

#[allow(clippy::cast_possible_truncation)]
fn place_tile(target: &mut Surface, tile: &CachedTile, entity: &Entity, layer: &LayerContext) {
    let inv = (1.0 / tile.scale) as f32;
    let transform = layer
        .view
        .pre_translate(tile.origin.x as f32, tile.origin.y as f32)
        .pre_scale(inv, inv);
    target.draw_transformed(
        &tile.surface,
        entity.style.opacity,
        entity.style.blend,
        transform,
    );
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn render_tile(
    renderer: &dyn ModeRenderer,
    entity: &Entity,
    layer: &LayerContext,
) -> RenderResult<Option<CachedTile>> {
    let mode = renderer.mode();
    let Some(bounds) = entity.mode_bounds(mode) else {
        return Ok(None);
    };
    let world = bounds.expand(renderer.margin(entity));
    if !world.is_finite() {
        return Err(RenderError::frame(
            mode,
            format!("non-finite bounds for entity {}", entity.id),
        ));
    }

    let max_px = layer.max_tile_px.max(16);
    let extent = world.width().max(world.height()).max(f64::EPSILON);
    // Leave room for the padding pixels and rounding.
    let scale = layer.scale.min(f64::from(max_px - 4) / extent);
    let pad = 1.0 / scale;
    let origin = Point::new(world.min_x - pad, world.min_y - pad);
    let width = (world.width() * scale).ceil() as u32 + 2;
    let height = (world.height() * scale).ceil() as u32 + 2;

    let mut surface =
        Surface::new(width, height).map_err(|e| RenderError::frame(mode, e.to_string()))?;
    let ctx = TileContext {
        origin,
        scale,
        lod: layer.lod,
        anti_alias: layer.anti_alias,
    };
    renderer.draw_entity(entity, &ctx, &mut surface)?;
    Ok(Some(CachedTile {
        surface,
        origin,
        scale,
    }))
}

/// Every `lod.stride()`-th item, always keeping the last one.
#[must_use]
pub fn lod_points<T: Copy>(points: &[T], lod: LodLevel) -> Vec<T> {
    let stride = lod.stride();
    if stride <= 1 || points.len() <= 2 {
        return points.to_vec();
    }
    let mut out: Vec<T> = points.iter().step_by(stride).copied().collect();
    if (points.len() - 1) % stride != 0 {
        if let Some(last) = points.last() {
            out.push(*last);
        }
    }
    out
}

/// Open polyline through `points`, or `None` for fewer than two points.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn polyline<I>(points: I) -> Option<Path>
where
    I: IntoIterator<Item = Point>,
{
    let mut iter = points.into_iter();
    let first = iter.next()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first.x as f32, first.y as f32);
    for p in iter {
        pb.line_to(p.x as f32, p.y as f32);
    }
    pb.finish()
}

#[cfg(test)]
mod tests {
    use genshi_core::{Stroke, StrokePoint};

    use super::*;

    fn layer() -> LayerContext {
        LayerContext {
            view: Transform::identity(),
            scale: 1.0,
            lod: LodLevel::FULL,
            max_tile_px: 2048,
            anti_alias: true,
        }
    }

    fn line_entity() -> Entity {
        let mut entity = Entity::new(genshi_core::EntityId::new());
        entity.reprs.vector.strokes.push(Stroke::new(vec![
            StrokePoint::new(10.0, 10.0),
            StrokePoint::new(60.0, 40.0),
        ]));
        entity.refresh_bounds();
        entity
    }

    #[test]
    fn test_lod_points_keeps_endpoints() {
        let points: Vec<u32> = (0..10).collect();
        assert_eq!(lod_points(&points, LodLevel::FULL), points);
        let coarse = lod_points(&points, LodLevel::from_zoom(0.3));
        assert_eq!(coarse, vec![0, 4, 8, 9]);
        assert_eq!(lod_points(&[1, 2], LodLevel::COARSEST), vec![1, 2]);
    }

    #[test]
    fn test_polyline_needs_two_points() {
        assert!(polyline([Point::new(0.0, 0.0)]).is_none());
        assert!(polyline([Point::new(0.0, 0.0), Point::new(5.0, 5.0)]).is_some());
    }

    #[test]
    fn test_render_layer_caches_tiles() {
        let entity = line_entity();
        let mut cache = RenderCache::new();
        let mut target = Surface::new(100, 100).unwrap();
        let entities = [&entity];

        let first = render_layer(&VectorRenderer, &entities, &layer(), &mut cache, &mut target)
            .unwrap();
        assert_eq!(first.cache_misses, 1);
        assert_eq!(first.drawn, 1);
        assert!(!target.is_blank());

        let mut again = Surface::new(100, 100).unwrap();
        let second = render_layer(&VectorRenderer, &entities, &layer(), &mut cache, &mut again)
            .unwrap();
        assert_eq!(second.cache_hits, 1);
        assert_eq!(again, target);
    }

    #[test]
    fn test_tiles_are_capped() {
        let entity = line_entity();
        let zoomed = LayerContext {
            scale: 500.0,
            max_tile_px: 256,
            ..layer()
        };
        let tile = render_tile(&VectorRenderer, &entity, &zoomed).unwrap().unwrap();
        assert!(tile.surface.width() <= 256);
        assert!(tile.surface.height() <= 256);
        assert!(tile.scale < 500.0);
    }
}
