//! Viewport math.
//!
//! A world point `w` lands on screen at
//! `c + R(rotation) * (zoom * (w - pan) - c)`, where `c` is the center of
//! the viewport in CSS pixels. Device pixels are screen pixels times the
//! device pixel ratio.

use genshi_core::{Bounds, Point};
use serde::{Deserialize, Serialize};
use tiny_skia::Transform;

use crate::error::{RenderError, RenderResult};

/// Pan, zoom, rotation and size of the visible region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Viewport {
    /// World x shown at the left edge before rotation.
    pub pan_x: f64,
    /// World y shown at the top edge before rotation.
    pub pan_y: f64,
    /// Screen pixels per world unit.
    pub zoom: f64,
    /// Rotation about the viewport center, in radians.
    pub rotation: f64,
    /// Width in CSS pixels.
    pub width: u32,
    /// Height in CSS pixels.
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan_x: 0.0,
            pan_y: 0.0,
            zoom: 1.0,
            rotation: 0.0,
            width: 800,
            height: 600,
        }
    }
}

impl Viewport {
    /// A viewport of the given size at the world origin.
    #[must_use]
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Check that every field is usable.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidViewport`] for non-finite values, a
    /// non-positive zoom or an empty size.
    pub fn validate(&self) -> RenderResult<()> {
        if !(self.pan_x.is_finite() && self.pan_y.is_finite() && self.rotation.is_finite()) {
            return Err(RenderError::InvalidViewport(
                "pan and rotation must be finite".to_string(),
            ));
        }
        if !self.zoom.is_finite() || self.zoom <= 0.0 {
            return Err(RenderError::InvalidViewport(format!(
                "zoom must be positive, got {}",
                self.zoom
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::InvalidViewport(format!(
                "empty viewport {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    fn center(&self) -> Point {
        Point::new(f64::from(self.width) / 2.0, f64::from(self.height) / 2.0)
    }

    /// World to screen (CSS pixel) coordinates.
    #[must_use]
    pub fn world_to_screen(&self, p: Point) -> Point {
        let c = self.center();
        let (sin, cos) = self.rotation.sin_cos();
        let vx = self.zoom * (p.x - self.pan_x) - c.x;
        let vy = self.zoom * (p.y - self.pan_y) - c.y;
        Point::new(c.x + cos * vx - sin * vy, c.y + sin * vx + cos * vy)
    }

    /// Screen (CSS pixel) to world coordinates.
    #[must_use]
    pub fn screen_to_world(&self, p: Point) -> Point {
        let c = self.center();
        let (sin, cos) = self.rotation.sin_cos();
        let dx = p.x - c.x;
        let dy = p.y - c.y;
        let ux = cos * dx + sin * dy + c.x;
        let uy = -sin * dx + cos * dy + c.y;
        Point::new(self.pan_x + ux / self.zoom, self.pan_y + uy / self.zoom)
    }

    /// Axis-aligned world rectangle covering the whole viewport.
    #[must_use]
    pub fn world_bounds(&self) -> Bounds {
        let w = f64::from(self.width);
        let h = f64::from(self.height);
        let corners = [
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(0.0, h),
            Point::new(w, h),
        ];
        Bounds::from_points(corners.into_iter().map(|p| self.screen_to_world(p)))
            .unwrap_or_default()
    }

    /// World to device pixel transform.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn transform(&self, device_pixel_ratio: f64) -> Transform {
        let c = self.center();
        let (sin, cos) = self.rotation.sin_cos();
        let z = self.zoom;
        let px = z * self.pan_x + c.x;
        let py = z * self.pan_y + c.y;
        let tx = c.x - cos * px + sin * py;
        let ty = c.y - sin * px - cos * py;
        let d = device_pixel_ratio;
        Transform::from_row(
            (d * cos * z) as f32,
            (d * sin * z) as f32,
            (-d * sin * z) as f32,
            (d * cos * z) as f32,
            (d * tx) as f32,
            (d * ty) as f32,
        )
    }

    /// Whether moving from `self` to `next` invalidates cached rasters.
    #[must_use]
    pub fn is_significant_change(&self, next: &Self, thresholds: &ViewportThresholds) -> bool {
        let zoom_ratio = next.zoom / self.zoom;
        let pan = Point::new(self.pan_x, self.pan_y).distance(Point::new(next.pan_x, next.pan_y));
        (zoom_ratio - 1.0).abs() > thresholds.zoom_ratio || pan > thresholds.pan_distance
    }
}

/// Partial viewport change. `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportUpdate {
    /// New pan x.
    pub pan_x: Option<f64>,
    /// New pan y.
    pub pan_y: Option<f64>,
    /// New zoom.
    pub zoom: Option<f64>,
    /// New rotation.
    pub rotation: Option<f64>,
}

impl ViewportUpdate {
    /// Update the pan offset.
    #[must_use]
    pub fn pan(x: f64, y: f64) -> Self {
        Self {
            pan_x: Some(x),
            pan_y: Some(y),
            ..Self::default()
        }
    }

    /// Update the zoom.
    #[must_use]
    pub fn zoom(zoom: f64) -> Self {
        Self {
            zoom: Some(zoom),
            ..Self::default()
        }
    }

    /// Update the rotation.
    #[must_use]
    pub fn rotation(rotation: f64) -> Self {
        Self {
            rotation: Some(rotation),
            ..Self::default()
        }
    }

    /// The viewport after this update.
    #[must_use]
    pub fn apply(&self, viewport: &Viewport) -> Viewport {
        Viewport {
            pan_x: self.pan_x.unwrap_or(viewport.pan_x),
            pan_y: self.pan_y.unwrap_or(viewport.pan_y),
            zoom: self.zoom.unwrap_or(viewport.zoom),
            rotation: self.rotation.unwrap_or(viewport.rotation),
            ..*viewport
        }
    }
}

/// When a viewport change counts as significant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportThresholds {
    /// Relative zoom change, e.g. `0.1` for 10%.
    pub zoom_ratio: f64,
    /// Pan distance in world units.
    pub pan_distance: f64,
}

impl Default for ViewportThresholds {
    fn default() -> Self {
        Self {
            zoom_ratio: 0.1,
            pan_distance: 100.0,
        }
    }
}

/// Level of detail, from full (0) to coarsest (4).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct LodLevel(u8);

impl LodLevel {
    /// Full detail.
    pub const FULL: Self = Self(0);
    /// Coarsest level.
    pub const COARSEST: Self = Self(4);

    /// Level for a zoom factor: one level per halving below 1.0.
    #[must_use]
    pub fn from_zoom(zoom: f64) -> Self {
        let mut level = 0;
        let mut threshold = 1.0;
        while level < Self::COARSEST.0 && zoom < threshold {
            level += 1;
            threshold /= 2.0;
        }
        Self(level)
    }

    /// Numeric level.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Point stride for this level: `2^level`.
    #[must_use]
    pub const fn stride(self) -> usize {
        1 << self.0
    }
}
