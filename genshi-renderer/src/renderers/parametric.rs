//! Parametric-mode renderer: generated patterns clipped to their region.

use genshi_core::{BlendMode, EditMode, Entity, ParamMap, ParamValue, ParametricRepr, Style};
use tiny_skia::Transform;

use super::{ModeRenderer, TileContext};
use crate::error::RenderResult;
use crate::pattern::{MotifGenerator, PatternGenerator};
use crate::surface::Surface;

/// Default cap on a generated pattern's edge, in pixels.
pub const DEFAULT_MAX_PATTERN_PX: u32 = 1024;

/// Fills each pattern region with the output of a [`PatternGenerator`].
///
/// Patterns are generated at one pixel per world unit, capped at
/// `max_pattern_px` per edge, then scaled onto the tile.
pub struct ParametricRenderer {
    generator: Box<dyn PatternGenerator>,
    max_pattern_px: u32,
}

impl ParametricRenderer {
    /// Create a renderer using the given generator.
    #[must_use]
    pub fn new(generator: Box<dyn PatternGenerator>) -> Self {
        Self {
            generator,
            max_pattern_px: DEFAULT_MAX_PATTERN_PX,
        }
    }

    /// Override the pattern size cap.
    #[must_use]
    pub fn with_max_pattern_px(mut self, max_pattern_px: u32) -> Self {
        self.max_pattern_px = max_pattern_px.max(1);
        self
    }
}

impl Default for ParametricRenderer {
    fn default() -> Self {
        Self::new(Box::new(MotifGenerator))
    }
}

impl std::fmt::Debug for ParametricRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParametricRenderer")
            .field("max_pattern_px", &self.max_pattern_px)
            .finish_non_exhaustive()
    }
}

/// Flat option mapping for a pattern: its parameters plus style defaults
/// for `color2` and `stroke_width`.
#[must_use]
pub fn pattern_options(pattern: &ParametricRepr, style: &Style) -> ParamMap {
    let mut options = pattern.parameters.clone();
    options
        .entry("color2".to_string())
        .or_insert(ParamValue::Color(style.color));
    options
        .entry("stroke_width".to_string())
        .or_insert(ParamValue::Number(style.stroke_width));
    options
}

impl ModeRenderer for ParametricRenderer {
    fn mode(&self) -> EditMode {
        EditMode::Parametric
    }

    fn margin(&self, _entity: &Entity) -> f64 {
        0.0
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn draw_entity(
        &self,
        entity: &Entity,
        ctx: &TileContext,
        tile: &mut Surface,
    ) -> RenderResult<()> {
        let Some(pattern) = &entity.reprs.parametric else {
            return Ok(());
        };
        let region = pattern.region;
        let cap = f64::from(self.max_pattern_px);
        let width = region.width().round().clamp(1.0, cap) as u32;
        let height = region.height().round().clamp(1.0, cap) as u32;
        let options = pattern_options(pattern, &entity.style);
        let raster = self
            .generator
            .generate(&pattern.pattern_type, width, height, &options)?;

        let sx = region.width() / f64::from(width);
        let sy = region.height() / f64::from(height);
        let transform = ctx
            .transform()
            .pre_translate(region.min_x as f32, region.min_y as f32)
            .pre_concat(Transform::from_scale(sx as f32, sy as f32));
        tile.draw_transformed(&raster, 1.0, BlendMode::Normal, transform);
        Ok(())
    }
}
