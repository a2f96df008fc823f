//! Organic-mode renderer: growth seeds.

use genshi_core::{EditMode, Entity};
use tiny_skia::{FillRule, LineCap, Paint, PathBuilder, Stroke};

use super::{ModeRenderer, TileContext};
use crate::error::RenderResult;
use crate::surface::{skia_color, Surface};

/// Draws each seed as a disc whose radius and opacity follow its energy,
/// with a short stem toward its growth direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrganicRenderer;

impl ModeRenderer for OrganicRenderer {
    fn mode(&self) -> EditMode {
        EditMode::Growth
    }

    fn margin(&self, _entity: &Entity) -> f64 {
        // Seed discs are already part of the mode bounds; stems stay inside.
        1.0
    }

    #[allow(clippy::cast_possible_truncation)]
    fn draw_entity(
        &self,
        entity: &Entity,
        ctx: &TileContext,
        tile: &mut Surface,
    ) -> RenderResult<()> {
        let transform = ctx.transform();
        let color = entity.style.color;
        let stem = Stroke {
            width: (entity.style.stroke_width / 2.0).max(0.5) as f32,
            line_cap: LineCap::Round,
            ..Stroke::default()
        };

        for seed in &entity.reprs.organic.seeds {
            let r = seed.radius();
            let (x, y) = (seed.position.x, seed.position.y);
            let mut paint = Paint::default();
            paint.anti_alias = ctx.anti_alias;
            paint.set_color(skia_color(color, 0.35 + 0.65 * seed.energy.clamp(0.0, 1.0)));
            if let Some(disc) = PathBuilder::from_circle(x as f32, y as f32, r as f32) {
                tile.pixmap_mut()
                    .fill_path(&disc, &paint, FillRule::Winding, transform, None);
            }

            let (sin, cos) = seed.direction.sin_cos();
            let mut pb = PathBuilder::new();
            pb.move_to(x as f32, y as f32);
            pb.line_to((x + cos * r) as f32, (y + sin * r) as f32);
            if let Some(path) = pb.finish() {
                paint.set_color(skia_color(color, 1.0));
                tile.pixmap_mut()
                    .stroke_path(&path, &paint, &stem, transform, None);
            }
        }
        Ok(())
    }
}
