//! Vector-mode renderer: freehand strokes.

use genshi_core::{EditMode, Entity, StrokePoint};
use tiny_skia::{FillRule, LineCap, LineJoin, Paint, PathBuilder, Stroke};
use tracing::trace;

use super::{lod_points, polyline, ModeRenderer, TileContext};
use crate::error::RenderResult;
use crate::surface::{skia_color, Surface};

/// Strokes each polyline with the entity's color and width. Single-point
/// strokes become dots.
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorRenderer;

impl ModeRenderer for VectorRenderer {
    fn mode(&self) -> EditMode {
        EditMode::Draw
    }

    #[allow(clippy::cast_possible_truncation)]
    fn draw_entity(
        &self,
        entity: &Entity,
        ctx: &TileContext,
        tile: &mut Surface,
    ) -> RenderResult<()> {
        let mut paint = Paint::default();
        paint.set_color(skia_color(entity.style.color, 1.0));
        paint.anti_alias = ctx.anti_alias;
        let width = entity.style.stroke_width.max(0.0);
        let stroke = Stroke {
            width: width as f32,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        let transform = ctx.transform();

        for s in &entity.reprs.vector.strokes {
            let points = lod_points(&s.points, ctx.lod);
            if let Some(path) = polyline(points.iter().map(StrokePoint::position)) {
                tile.pixmap_mut()
                    .stroke_path(&path, &paint, &stroke, transform, None);
            } else if let Some(p) = points.first() {
                let radius = (width / 2.0).max(0.5) as f32;
                if let Some(dot) = PathBuilder::from_circle(p.x as f32, p.y as f32, radius) {
                    tile.pixmap_mut()
                        .fill_path(&dot, &paint, FillRule::Winding, transform, None);
                }
            }
        }
        trace!(
            entity = %entity.id,
            strokes = entity.reprs.vector.strokes.len(),
            lod = ctx.lod.get(),
            "Drew strokes"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use genshi_core::{Color, EntityId, Point};

    use super::*;
    use crate::viewport::LodLevel;

    fn ctx() -> TileContext {
        TileContext {
            origin: Point::new(0.0, 0.0),
            scale: 1.0,
            lod: LodLevel::FULL,
            anti_alias: false,
        }
    }

    #[test]
    fn test_stroke_is_drawn_in_entity_color() {
        let mut entity = Entity::new(EntityId::new());
        entity.style.color = Color::rgb(200, 0, 0);
        entity.style.stroke_width = 4.0;
        entity
            .reprs
            .vector
            .strokes
            .push(genshi_core::Stroke::new(vec![
                StrokePoint::new(2.0, 10.0),
                StrokePoint::new(30.0, 10.0),
            ]));
        let mut tile = Surface::new(32, 20).unwrap();
        VectorRenderer.draw_entity(&entity, &ctx(), &mut tile).unwrap();
        assert_eq!(tile.pixel(16, 10), Some(Color::rgb(200, 0, 0)));
        assert_eq!(tile.pixel(16, 2), Some(Color::TRANSPARENT));
    }

    #[test]
    fn test_single_point_becomes_dot() {
        let mut entity = Entity::new(EntityId::new());
        entity.style.stroke_width = 6.0;
        entity
            .reprs
            .vector
            .strokes
            .push(genshi_core::Stroke::new(vec![StrokePoint::new(8.0, 8.0)]));
        let mut tile = Surface::new(16, 16).unwrap();
        VectorRenderer.draw_entity(&entity, &ctx(), &mut tile).unwrap();
        assert_eq!(tile.pixel(8, 8), Some(Color::BLACK));
    }
}
