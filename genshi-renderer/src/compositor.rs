//! Layer compositor.
//!
//! Merges per-mode render targets into one output in the fixed z-order
//! [`EditMode::Z_ORDER`] (growth at the back, vector at the front).

use genshi_core::{BlendMode, Color, EditMode};
use serde::{Deserialize, Serialize};

use crate::surface::Surface;

/// Visibility and blending of one mode's layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeState {
    /// Whether the mode is rendered at all.
    pub enabled: bool,
    /// Whether the rendered layer is shown.
    pub visible: bool,
    /// Layer opacity in `0.0..=1.0`.
    pub opacity: f64,
    /// How the layer combines with the layers behind it.
    pub blend: BlendMode,
}

impl Default for ModeState {
    fn default() -> Self {
        Self {
            enabled: true,
            visible: true,
            opacity: 1.0,
            blend: BlendMode::Normal,
        }
    }
}

impl ModeState {
    /// Whether the layer contributes to the output.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && self.visible
    }
}

/// One input to [`Compositor::composite`].
#[derive(Debug, Clone, Copy)]
pub struct Layer<'a> {
    /// Mode the layer belongs to.
    pub mode: EditMode,
    /// Rendered pixels, or `None` if the mode has no target.
    pub target: Option<&'a Surface>,
    /// Layer settings.
    pub state: ModeState,
}

/// Draws layers back to front onto an output surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compositor {
    background: Color,
}

impl Compositor {
    /// Create a compositor that starts every frame from `background`.
    #[must_use]
    pub fn new(background: Color) -> Self {
        Self { background }
    }

    /// Background color.
    #[must_use]
    pub fn background(&self) -> Color {
        self.background
    }

    /// Clear `output` and draw every active layer in z-order.
    ///
    /// Layers are drawn at identity transform: targets are already aligned
    /// with the viewport. A missing target counts as an empty layer.
    /// Returns the number of layers drawn.
    pub fn composite(&self, layers: &[Layer<'_>], output: &mut Surface) -> usize {
        output.clear();
        if self.background.a > 0 {
            output.fill(self.background);
        }
        let mut drawn = 0;
        for mode in EditMode::Z_ORDER {
            for layer in layers.iter().filter(|l| l.mode == mode) {
                let Some(target) = layer.target else {
                    continue;
                };
                if !layer.state.is_active() || layer.state.opacity <= 0.0 {
                    continue;
                }
                output.draw(target, layer.state.opacity, layer.state.blend);
                drawn += 1;
            }
        }
        drawn
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(Color::WHITE)
    }
}
