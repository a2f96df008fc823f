//! Procedural-mode renderer: the path a program draws.

use genshi_core::{EditMode, Entity};
use tiny_skia::{LineCap, LineJoin, Paint, Stroke, StrokeDash};

use super::{lod_points, polyline, ModeRenderer, TileContext};
use crate::error::{RenderError, RenderResult};
use crate::surface::{skia_color, Surface};

/// Dash pattern, in multiples of the stroke width.
const DASH: [f64; 2] = [3.0, 1.5];

/// Draws a program's output points as a dashed polyline, so generated
/// geometry reads differently from hand-drawn strokes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProceduralRenderer;

impl ModeRenderer for ProceduralRenderer {
    fn mode(&self) -> EditMode {
        EditMode::Code
    }

    #[allow(clippy::cast_possible_truncation)]
    fn draw_entity(
        &self,
        entity: &Entity,
        ctx: &TileContext,
        tile: &mut Surface,
    ) -> RenderResult<()> {
        let Some(procedural) = &entity.reprs.procedural else {
            return Ok(());
        };
        let points = lod_points(procedural.points(), ctx.lod);
        let Some(path) = polyline(points) else {
            return Ok(());
        };

        let width = entity.style.stroke_width.max(0.5);
        let dash = StrokeDash::new(
            DASH.iter().map(|d| (d * width) as f32).collect(),
            0.0,
        )
        .ok_or_else(|| RenderError::frame(EditMode::Code, "invalid dash pattern"))?;
        let stroke = Stroke {
            width: width as f32,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Round,
            dash: Some(dash),
            ..Stroke::default()
        };
        let mut paint = Paint::default();
        paint.set_color(skia_color(entity.style.color, 1.0));
        paint.anti_alias = ctx.anti_alias;
        tile.pixmap_mut()
            .stroke_path(&path, &paint, &stroke, ctx.transform(), None);
        Ok(())
    }
}
