//! Pattern generation collaborator.
//!
//! The parametric renderer hands a pattern type, a pixel size and a flat
//! option mapping to a [`PatternGenerator`] and draws whatever raster comes
//! back. [`MotifGenerator`] is the built-in implementation.

use genshi_core::{Color, ParamMap, ParamValue, PatternType};
use tiny_skia::{FillRule, Paint, PathBuilder, Stroke, Transform};

use crate::error::{RenderError, RenderResult};
use crate::surface::{skia_color, Surface};

/// Pure function from pattern description to pixels.
pub trait PatternGenerator: Send {
    /// Generate a `width` x `height` raster.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Pattern`] if the options cannot be rendered.
    fn generate(
        &self,
        pattern: &PatternType,
        width: u32,
        height: u32,
        options: &ParamMap,
    ) -> RenderResult<Surface>;
}

/// Read a numeric option.
#[must_use]
pub fn option_number(options: &ParamMap, name: &str) -> Option<f64> {
    options.get(name).and_then(ParamValue::as_number)
}

/// Read a color option.
#[must_use]
pub fn option_color(options: &ParamMap, name: &str) -> Option<Color> {
    options.get(name).and_then(ParamValue::as_color)
}

/// Simple geometric motifs: stripes, waves, cross-hatching and dots.
///
/// Honors `scale` (motif spacing multiplier), `rotation` (degrees),
/// `color1` (background), `color2` (ink), `complexity` (wave amplitude)
/// and `stroke_width`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MotifGenerator;

/// Base spacing between motif repeats, in pattern pixels.
const BASE_SPACING: f64 = 12.0;

impl MotifGenerator {
    #[allow(clippy::cast_possible_truncation)]
    fn lines(
        surface: &mut Surface,
        spacing: f64,
        amplitude: f64,
        angle: f64,
        paint: &Paint<'_>,
        stroke: &Stroke,
    ) -> RenderResult<()> {
        let w = f64::from(surface.width());
        let h = f64::from(surface.height());
        // Cover the rotated surface: draw over its circumscribed square.
        let reach = w.hypot(h);
        let (cx, cy) = (w / 2.0, h / 2.0);
        let mut pb = PathBuilder::new();
        let mut y = -reach / 2.0;
        while y <= reach / 2.0 {
            let mut x = -reach / 2.0;
            pb.move_to((cx + x) as f32, (cy + y) as f32);
            while x < reach / 2.0 {
                x += 4.0;
                let wave = amplitude * (x / spacing * std::f64::consts::PI).sin();
                pb.line_to((cx + x) as f32, (cy + y + wave) as f32);
            }
            y += spacing;
        }
        let path = pb
            .finish()
            .ok_or_else(|| RenderError::Pattern("empty motif path".to_string()))?;
        let transform = Transform::from_rotate_at(angle as f32, cx as f32, cy as f32);
        surface
            .pixmap_mut()
            .stroke_path(&path, paint, stroke, transform, None);
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn dots(surface: &mut Surface, spacing: f64, radius: f64, paint: &Paint<'_>) -> RenderResult<()> {
        let w = f64::from(surface.width());
        let h = f64::from(surface.height());
        let mut pb = PathBuilder::new();
        let mut row = 0_u32;
        let mut y = spacing / 2.0;
        while y < h + radius {
            let offset = if row % 2 == 0 { 0.0 } else { spacing / 2.0 };
            let mut x = spacing / 2.0 + offset;
            while x < w + radius {
                pb.push_circle(x as f32, y as f32, radius as f32);
                x += spacing;
            }
            y += spacing;
            row += 1;
        }
        let path = pb
            .finish()
            .ok_or_else(|| RenderError::Pattern("empty dot path".to_string()))?;
        surface.pixmap_mut().fill_path(
            &path,
            paint,
            FillRule::Winding,
            Transform::identity(),
            None,
        );
        Ok(())
    }
}

impl PatternGenerator for MotifGenerator {
    #[allow(clippy::cast_possible_truncation)]
    fn generate(
        &self,
        pattern: &PatternType,
        width: u32,
        height: u32,
        options: &ParamMap,
    ) -> RenderResult<Surface> {
        let scale = option_number(options, "scale").unwrap_or(1.0);
        if !scale.is_finite() || scale <= 0.0 {
            return Err(RenderError::Pattern(format!("invalid scale {scale}")));
        }
        let rotation = option_number(options, "rotation")
            .filter(|r| r.is_finite())
            .unwrap_or(0.0);
        let background = option_color(options, "color1").unwrap_or(Color::TRANSPARENT);
        let ink = option_color(options, "color2").unwrap_or(Color::BLACK);
        let complexity = option_number(options, "complexity")
            .filter(|c| c.is_finite())
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);
        let line_width = option_number(options, "stroke_width")
            .filter(|w| w.is_finite() && *w > 0.0)
            .unwrap_or(1.5);

        let mut surface = Surface::new(width, height)
            .map_err(|e| RenderError::Pattern(format!("pattern surface: {e}")))?;
        if background.a > 0 {
            surface.fill(background);
        }

        let mut paint = Paint::default();
        paint.set_color(skia_color(ink, 1.0));
        paint.anti_alias = true;
        let stroke = Stroke {
            width: line_width as f32,
            ..Stroke::default()
        };
        let spacing = (BASE_SPACING * scale).max(2.0);

        match pattern {
            PatternType::Linear | PatternType::Named(_) => {
                Self::lines(&mut surface, spacing, 0.0, rotation, &paint, &stroke)?;
            }
            PatternType::Curve => {
                let amplitude = spacing * (0.15 + 0.35 * complexity);
                Self::lines(&mut surface, spacing, amplitude, rotation, &paint, &stroke)?;
            }
            PatternType::Complex => {
                Self::lines(&mut surface, spacing, 0.0, rotation, &paint, &stroke)?;
                Self::lines(&mut surface, spacing, 0.0, rotation + 90.0, &paint, &stroke)?;
            }
            PatternType::Organic => {
                let radius = spacing * (0.15 + 0.2 * complexity);
                Self::dots(&mut surface, spacing, radius, &paint)?;
            }
        }
        Ok(surface)
    }
}
