//! Raster surfaces backed by `tiny-skia` pixmaps.
//!
//! Pixels are stored premultiplied RGBA, row-major. [`Surface::to_rgba8`]
//! converts back to straight alpha for encoders.

use genshi_core::{BlendMode, Color};
use tiny_skia::{FilterQuality, Pixmap, PixmapPaint, Transform};

use crate::error::{RenderError, RenderResult};

/// Largest width or height a surface may have.
pub const MAX_SURFACE_DIMENSION: u32 = 16_384;

/// An offscreen RGBA raster.
#[derive(Clone, PartialEq)]
pub struct Surface {
    pixmap: Pixmap,
}

impl Surface {
    /// Allocate a transparent surface.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Surface`] if either dimension is zero, exceeds
    /// [`MAX_SURFACE_DIMENSION`], or the allocation is refused.
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::Surface(format!(
                "zero-sized surface {width}x{height}"
            )));
        }
        if width > MAX_SURFACE_DIMENSION || height > MAX_SURFACE_DIMENSION {
            return Err(RenderError::Surface(format!(
                "surface {width}x{height} exceeds {MAX_SURFACE_DIMENSION}px"
            )));
        }
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            RenderError::Surface(format!("failed to allocate {width}x{height} pixmap"))
        })?;
        Ok(Self { pixmap })
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Bytes held by the pixel buffer.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.pixmap.data().len()
    }

    /// Reset every pixel to transparent.
    pub fn clear(&mut self) {
        self.pixmap.fill(tiny_skia::Color::TRANSPARENT);
    }

    /// Fill every pixel with one color.
    pub fn fill(&mut self, color: Color) {
        self.pixmap.fill(skia_color(color, 1.0));
    }

    /// Whether every pixel is fully transparent.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.pixmap.pixels().iter().all(|p| p.alpha() == 0)
    }

    /// Number of pixels with non-zero alpha.
    #[must_use]
    pub fn covered_pixels(&self) -> usize {
        self.pixmap.pixels().iter().filter(|p| p.alpha() > 0).count()
    }

    /// Straight-alpha color of one pixel.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        let c = self.pixmap.pixel(x, y)?.demultiply();
        Some(Color::rgba(c.red(), c.green(), c.blue(), c.alpha()))
    }

    /// Draw `source` over this surface at identity transform.
    pub fn draw(&mut self, source: &Self, opacity: f64, blend: BlendMode) {
        self.draw_transformed(source, opacity, blend, Transform::identity());
    }

    /// Draw `source` through `transform`, which maps source pixels to
    /// pixels of this surface.
    #[allow(clippy::cast_possible_truncation)]
    pub fn draw_transformed(
        &mut self,
        source: &Self,
        opacity: f64,
        blend: BlendMode,
        transform: Transform,
    ) {
        let quality = if is_translation(transform) {
            FilterQuality::Nearest
        } else {
            FilterQuality::Bilinear
        };
        let paint = PixmapPaint {
            opacity: opacity.clamp(0.0, 1.0) as f32,
            blend_mode: skia_blend(blend),
            quality,
        };
        self.pixmap
            .draw_pixmap(0, 0, source.pixmap.as_ref(), &paint, transform, None);
    }

    /// Pixels as straight-alpha RGBA bytes.
    #[must_use]
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for p in self.pixmap.pixels() {
            let c = p.demultiply();
            out.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        out
    }

    /// The underlying pixmap.
    #[must_use]
    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// The underlying pixmap, for drawing.
    pub fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish_non_exhaustive()
    }
}

fn is_translation(t: Transform) -> bool {
    !t.has_scale() && !t.has_skew()
}

/// Map a layer blend mode onto the rasterizer's.
#[must_use]
pub fn skia_blend(blend: BlendMode) -> tiny_skia::BlendMode {
    match blend {
        BlendMode::Normal => tiny_skia::BlendMode::SourceOver,
        BlendMode::Multiply => tiny_skia::BlendMode::Multiply,
        BlendMode::Screen => tiny_skia::BlendMode::Screen,
        BlendMode::Overlay => tiny_skia::BlendMode::Overlay,
        BlendMode::Darken => tiny_skia::BlendMode::Darken,
        BlendMode::Lighten => tiny_skia::BlendMode::Lighten,
        BlendMode::Add => tiny_skia::BlendMode::Plus,
    }
}

/// Convert a color, scaling its alpha by `opacity`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn skia_color(color: Color, opacity: f64) -> tiny_skia::Color {
    let alpha = (f64::from(color.a) * opacity.clamp(0.0, 1.0)).round() as u8;
    tiny_skia::Color::from_rgba8(color.r, color.g, color.b, alpha)
}
