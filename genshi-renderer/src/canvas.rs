//! # Canvas Manager
//!
//! Owns the entity table, spatial index, render cache, viewport and per-mode
//! render targets, and drives the render loop:
//!
//! ```text
//! render_frame()
//!   1. world rect of the viewport ──► SpatialIndex::query (culling)
//!   2. per enabled + visible mode: renderer ──► scratch ──swap──► target
//!      (a failing mode keeps last frame's target and emits `error`)
//!   3. Compositor: targets in z-order ──► output
//!   4. frame timing history, `frame:rendered`
//! ```
//!
//! The canvas implements [`EntityModel`], so the sync coordinator can apply
//! changes to it directly.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use genshi_core::{
    Color, EditMode, EngineEvent, Entity, EntityId, EntityModel, ErrorSource, EventBus,
    SubscriptionId,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::compositor::{Compositor, Layer, ModeState};
use crate::error::{RenderError, RenderResult};
use crate::pattern::PatternGenerator;
use crate::render_cache::{RenderCache, RenderCacheConfig, RenderCacheStats};
use crate::renderers::{
    render_layer, LayerContext, ModeRenderer, OrganicRenderer, ParametricRenderer,
    ProceduralRenderer, VectorRenderer,
};
use crate::spatial::{SpatialIndex, DEFAULT_CELL_SIZE};
use crate::surface::Surface;
use crate::viewport::{LodLevel, Viewport, ViewportThresholds, ViewportUpdate};

/// Canvas configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Viewport width in CSS pixels.
    pub width: u32,
    /// Viewport height in CSS pixels.
    pub height: u32,
    /// Device pixels per CSS pixel.
    pub device_pixel_ratio: f64,
    /// Color the compositor starts each frame from.
    pub background: Color,
    /// Spatial index cell edge in world units.
    pub cell_size: f64,
    /// Frame duration above which a budget warning is raised.
    pub frame_budget_ms: f64,
    /// Frame samples kept for FPS reporting.
    pub frame_history: usize,
    /// Largest cached tile edge in pixels.
    pub max_tile_px: u32,
    /// Anti-alias strokes and shapes.
    pub anti_alias: bool,
    /// When a viewport change clears the render cache.
    pub viewport_thresholds: ViewportThresholds,
    /// Render cache limits.
    pub cache: RenderCacheConfig,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            device_pixel_ratio: 1.0,
            background: Color::WHITE,
            cell_size: DEFAULT_CELL_SIZE,
            frame_budget_ms: 16.0,
            frame_history: 120,
            max_tile_px: 2048,
            anti_alias: true,
            viewport_thresholds: ViewportThresholds::default(),
            cache: RenderCacheConfig::default(),
        }
    }
}

/// Counters describing the render loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderStats {
    /// Frames rendered.
    pub frames: u64,
    /// Duration of the last frame, in milliseconds.
    pub last_frame_ms: f64,
    /// Frames per second over the sample window.
    pub fps: f64,
    /// Entities in the table.
    pub entities: usize,
    /// Entities inside the viewport last frame.
    pub visible_entities: usize,
    /// Indexed entities outside the viewport last frame.
    pub culled_entities: usize,
    /// Culled entities summed over every frame.
    pub total_culled: u64,
    /// Tiles placed on render targets last frame.
    pub draw_calls: usize,
    /// Layers composited last frame.
    pub layers_composited: usize,
    /// Mode renders that failed.
    pub render_errors: u64,
    /// Frames that exceeded the frame budget.
    pub budget_overruns: u64,
    /// Render cache statistics.
    pub cache: RenderCacheStats,
}

/// Bytes held by raster buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// Per-mode render targets plus the scratch surface.
    pub render_targets_bytes: usize,
    /// Composited output.
    pub output_bytes: usize,
    /// Cached tiles.
    pub cache_bytes: usize,
    /// Sum of the above.
    pub total_bytes: usize,
}

/// Frame timing over the sample window, plus memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Frames per second between the first and last sample.
    pub fps: f64,
    /// Mean frame duration, in milliseconds.
    pub average_frame_ms: f64,
    /// Shortest frame, in milliseconds.
    pub min_frame_ms: f64,
    /// Longest frame, in milliseconds.
    pub max_frame_ms: f64,
    /// Samples in the window.
    pub samples: usize,
    /// Raster memory.
    pub memory: MemoryUsage,
}

/// Outcome of one [`CanvasManager::render_frame`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    /// Frame counter.
    pub frame: u64,
    /// Time spent, in milliseconds.
    pub frame_time_ms: f64,
    /// Entities inside the viewport.
    pub visible_entities: usize,
    /// Indexed entities outside the viewport.
    pub culled_entities: usize,
    /// Tiles placed on render targets.
    pub draw_calls: usize,
    /// Layers composited.
    pub layers_composited: usize,
    /// Modes whose renderer failed; their targets kept last frame's pixels.
    pub failed_modes: Vec<EditMode>,
    /// Whether the frame exceeded its budget.
    pub over_budget: bool,
}

#[derive(Debug)]
struct Surfaces {
    targets: Vec<Surface>,
    scratch: Surface,
    output: Surface,
}

impl Surfaces {
    fn allocate(width: u32, height: u32) -> RenderResult<Self> {
        let targets = EditMode::ALL
            .iter()
            .map(|_| Surface::new(width, height))
            .collect::<RenderResult<Vec<_>>>()?;
        Ok(Self {
            targets,
            scratch: Surface::new(width, height)?,
            output: Surface::new(width, height)?,
        })
    }
}

/// Owns everything needed to turn the entity table into a frame.
pub struct CanvasManager {
    config: CanvasConfig,
    viewport: Viewport,
    entities: HashMap<EntityId, Entity>,
    index: SpatialIndex,
    cache: RenderCache,
    renderers: Vec<Box<dyn ModeRenderer>>,
    modes: [ModeState; 4],
    surfaces: Option<Surfaces>,
    compositor: Compositor,
    events: EventBus,
    frame_times: VecDeque<f64>,
    frame_starts: VecDeque<Instant>,
    stats: RenderStats,
}

impl CanvasManager {
    /// Create an uninitialized canvas with the built-in renderers.
    #[must_use]
    pub fn new(config: CanvasConfig) -> Self {
        Self::with_pattern_generator(config, Box::new(crate::pattern::MotifGenerator))
    }

    /// Create an uninitialized canvas whose parametric renderer uses
    /// `generator`.
    #[must_use]
    pub fn with_pattern_generator(
        config: CanvasConfig,
        generator: Box<dyn PatternGenerator>,
    ) -> Self {
        let renderers: Vec<Box<dyn ModeRenderer>> = vec![
            Box::new(VectorRenderer),
            Box::new(ParametricRenderer::new(generator)),
            Box::new(ProceduralRenderer),
            Box::new(OrganicRenderer),
        ];
        Self {
            viewport: Viewport::with_size(config.width, config.height),
            entities: HashMap::new(),
            index: SpatialIndex::with_cell_size(config.cell_size),
            cache: RenderCache::with_config(config.cache.clone()),
            renderers,
            modes: [ModeState::default(); 4],
            surfaces: None,
            compositor: Compositor::new(config.background),
            events: EventBus::new(),
            frame_times: VecDeque::new(),
            frame_starts: VecDeque::new(),
            stats: RenderStats::default(),
            config,
        }
    }

    /// Replace the renderer for the mode it declares.
    pub fn set_renderer(&mut self, renderer: Box<dyn ModeRenderer>) {
        let mode = renderer.mode();
        self.renderers.retain(|r| r.mode() != mode);
        self.renderers.push(renderer);
        self.cache.clear();
    }

    /// Allocate render targets and the output surface.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Surface`] if the size or device pixel ratio is
    /// unusable or allocation fails, and [`RenderError::InvalidViewport`]
    /// for a bad viewport. No mode can render after a failure here.
    pub fn initialize(&mut self) -> RenderResult<()> {
        self.viewport.validate()?;
        let (width, height) = self.device_size()?;
        self.surfaces = Some(Surfaces::allocate(width, height)?);
        info!(
            width = self.viewport.width,
            height = self.viewport.height,
            device_pixel_ratio = self.config.device_pixel_ratio,
            "Canvas initialized"
        );
        Ok(())
    }

    /// Whether `initialize` has succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.surfaces.is_some()
    }

    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    /// Current viewport.
    #[must_use]
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Render target size in device pixels.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Surface`] for a non-positive or non-finite
    /// device pixel ratio.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn device_size(&self) -> RenderResult<(u32, u32)> {
        let dpr = self.config.device_pixel_ratio;
        if !dpr.is_finite() || dpr <= 0.0 {
            return Err(RenderError::Surface(format!(
                "invalid device pixel ratio {dpr}"
            )));
        }
        let scale = |v: u32| (f64::from(v) * dpr).round().max(1.0) as u32;
        Ok((scale(self.viewport.width), scale(self.viewport.height)))
    }

    /// Insert or replace an entity and announce it as `entity:updated`.
    pub fn update_entity(&mut self, entity: Entity) {
        let id = entity.id;
        self.store_entity(entity);
        self.events.emit(&EngineEvent::EntityUpdated {
            entity_id: id,
            removed: false,
        });
    }

    /// Remove an entity and announce it as `entity:updated`.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        let removed = self.evict_entity(id)?;
        self.events.emit(&EngineEvent::EntityUpdated {
            entity_id: id,
            removed: true,
        });
        Some(removed)
    }

    /// Remove every entity.
    pub fn clear_entities(&mut self) {
        self.entities.clear();
        self.index.clear();
        self.cache.clear();
    }

    /// Number of entities in the table.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    fn store_entity(&mut self, mut entity: Entity) {
        entity.refresh_bounds();
        let id = entity.id;
        if entity.is_empty() {
            self.index.remove(id);
        } else {
            self.index.insert(id, entity.bounds);
        }
        let dropped = self.cache.invalidate_entity(id);
        debug!(entity = %id, invalidated = dropped, "Entity stored");
        self.entities.insert(id, entity);
    }

    fn evict_entity(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(&id)?;
        self.index.remove(id);
        self.cache.invalidate_entity(id);
        debug!(entity = %id, "Entity removed");
        Some(entity)
    }

    /// Apply a partial viewport change.
    ///
    /// Returns `true` if the change was significant and cleared the render
    /// cache. Repeating the current values is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidViewport`] and leaves the viewport
    /// unchanged if the result would be invalid.
    pub fn update_viewport(&mut self, update: &ViewportUpdate) -> RenderResult<bool> {
        let next = update.apply(&self.viewport);
        next.validate()?;
        if next == self.viewport {
            return Ok(false);
        }
        let significant = self
            .viewport
            .is_significant_change(&next, &self.config.viewport_thresholds);
        self.viewport = next;
        if significant {
            self.cache.clear();
            debug!(
                zoom = next.zoom,
                pan_x = next.pan_x,
                pan_y = next.pan_y,
                "Significant viewport change; render cache cleared"
            );
        }
        Ok(significant)
    }

    /// Resize the viewport, reallocating every surface at the configured
    /// device pixel ratio and clearing the render cache.
    ///
    /// # Errors
    ///
    /// Returns an error and leaves the canvas unchanged if the new size is
    /// empty or allocation fails.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        let next = Viewport {
            width,
            height,
            ..self.viewport
        };
        next.validate()?;
        let previous = std::mem::replace(&mut self.viewport, next);
        if let Err(e) = self.reallocate() {
            self.viewport = previous;
            return Err(e);
        }
        self.config.width = width;
        self.config.height = height;
        info!(width, height, "Canvas resized");
        Ok(())
    }

    /// Change the device pixel ratio, reallocating every surface.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Surface`] and leaves the canvas unchanged for
    /// an unusable ratio.
    pub fn set_device_pixel_ratio(&mut self, device_pixel_ratio: f64) -> RenderResult<()> {
        let previous = self.config.device_pixel_ratio;
        self.config.device_pixel_ratio = device_pixel_ratio;
        if let Err(e) = self.reallocate() {
            self.config.device_pixel_ratio = previous;
            return Err(e);
        }
        Ok(())
    }

    fn reallocate(&mut self) -> RenderResult<()> {
        let (width, height) = self.device_size()?;
        if self.surfaces.is_some() {
            self.surfaces = Some(Surfaces::allocate(width, height)?);
        }
        self.cache.clear();
        Ok(())
    }

    /// Settings of one mode's layer.
    #[must_use]
    pub fn mode_state(&self, mode: EditMode) -> ModeState {
        self.modes[mode.index()]
    }

    /// Change one mode's layer settings, emitting `mode:state-changed` if
    /// anything differs. Opacity is clamped to `0.0..=1.0`; a non-finite
    /// opacity keeps the current value.
    pub fn set_mode_state(&mut self, mode: EditMode, mut state: ModeState) -> bool {
        let current = self.modes[mode.index()];
        state.opacity = if state.opacity.is_finite() {
            state.opacity.clamp(0.0, 1.0)
        } else {
            current.opacity
        };
        if state == current {
            return false;
        }
        self.modes[mode.index()] = state;
        self.events.emit(&EngineEvent::ModeStateChanged {
            mode,
            enabled: state.enabled,
            visible: state.visible,
            opacity: state.opacity,
            blend: state.blend,
        });
        true
    }

    /// IDs of entities whose bounds intersect the viewport, sorted.
    #[must_use]
    pub fn visible_entities(&self) -> Vec<EntityId> {
        self.index.query(&self.viewport.world_bounds())
    }

    /// Render every active mode and composite the result.
    ///
    /// Renderer failures are isolated per mode: the failing mode keeps its
    /// previous target, an `error` event is emitted and the frame goes on.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::NotInitialized`] before `initialize`.
    pub fn render_frame(&mut self) -> RenderResult<FrameReport> {
        let Some(Surfaces {
            targets,
            scratch,
            output,
        }) = self.surfaces.as_mut()
        else {
            return Err(RenderError::NotInitialized);
        };
        let started = Instant::now();
        let frame = self.stats.frames + 1;
        self.cache.set_frame(frame);

        let visible = self.index.query(&self.viewport.world_bounds());
        let culled = self.index.len().saturating_sub(visible.len());
        let dpr = self.config.device_pixel_ratio;
        let layer_ctx = LayerContext {
            view: self.viewport.transform(dpr),
            scale: self.viewport.zoom * dpr,
            lod: LodLevel::from_zoom(self.viewport.zoom),
            max_tile_px: self.config.max_tile_px,
            anti_alias: self.config.anti_alias,
        };

        let mut draw_calls = 0;
        let mut failed_modes = Vec::new();
        for mode in EditMode::ALL {
            let i = mode.index();
            let renderer = self.renderers.iter().find(|r| r.mode() == mode);
            let Some(renderer) = renderer.filter(|_| self.modes[i].is_active()) else {
                targets[i].clear();
                continue;
            };
            let entities: Vec<&Entity> = visible
                .iter()
                .filter_map(|id| self.entities.get(id))
                .filter(|e| e.has_content(mode))
                .collect();

            scratch.clear();
            match render_layer(renderer.as_ref(), &entities, &layer_ctx, &mut self.cache, scratch) {
                Ok(layer) => {
                    std::mem::swap(&mut targets[i], scratch);
                    draw_calls += layer.drawn;
                }
                Err(e) => {
                    error!(mode = %mode, error = %e, "Mode render failed; keeping previous layer");
                    self.stats.render_errors += 1;
                    failed_modes.push(mode);
                    self.events
                        .emit(&EngineEvent::error(ErrorSource::Render, e.to_string()));
                }
            }
        }

        let layers: Vec<Layer<'_>> = EditMode::ALL
            .iter()
            .map(|&mode| Layer {
                mode,
                target: targets.get(mode.index()),
                state: self.modes[mode.index()],
            })
            .collect();
        let layers_composited = self.compositor.composite(&layers, output);
        self.cache.maintenance();

        let frame_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.record_frame(started, frame_time_ms);
        let over_budget = frame_time_ms > self.config.frame_budget_ms;
        if over_budget {
            warn!(
                frame,
                elapsed_ms = frame_time_ms,
                budget_ms = self.config.frame_budget_ms,
                "Frame exceeded budget"
            );
            self.stats.budget_overruns += 1;
        }

        self.stats.frames = frame;
        self.stats.last_frame_ms = frame_time_ms;
        self.stats.visible_entities = visible.len();
        self.stats.culled_entities = culled;
        self.stats.total_culled += culled as u64;
        self.stats.draw_calls = draw_calls;
        self.stats.layers_composited = layers_composited;

        self.events.emit(&EngineEvent::FrameRendered {
            frame,
            frame_time_ms,
            visible_entities: visible.len(),
            culled_entities: culled,
        });

        Ok(FrameReport {
            frame,
            frame_time_ms,
            visible_entities: visible.len(),
            culled_entities: culled,
            draw_calls,
            layers_composited,
            failed_modes,
            over_budget,
        })
    }

    fn record_frame(&mut self, started: Instant, frame_time_ms: f64) {
        let limit = self.config.frame_history.max(1);
        self.frame_times.push_back(frame_time_ms);
        self.frame_starts.push_back(started);
        while self.frame_times.len() > limit {
            self.frame_times.pop_front();
        }
        while self.frame_starts.len() > limit {
            self.frame_starts.pop_front();
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn fps(&self) -> f64 {
        match (self.frame_starts.front(), self.frame_starts.back()) {
            (Some(first), Some(last)) if self.frame_starts.len() > 1 => {
                let span = last.duration_since(*first).as_secs_f64();
                if span > 0.0 {
                    (self.frame_starts.len() - 1) as f64 / span
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }

    /// Render loop counters.
    #[must_use]
    pub fn render_stats(&self) -> RenderStats {
        RenderStats {
            fps: self.fps(),
            entities: self.entities.len(),
            cache: self.cache.stats(),
            ..self.stats.clone()
        }
    }

    /// Frame timing over the last `frame_history` frames, plus memory.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn performance_metrics(&self) -> PerformanceMetrics {
        let samples = self.frame_times.len();
        let (average, min, max) = if samples == 0 {
            (0.0, 0.0, 0.0)
        } else {
            let sum: f64 = self.frame_times.iter().sum();
            let min = self.frame_times.iter().copied().fold(f64::INFINITY, f64::min);
            let max = self.frame_times.iter().copied().fold(0.0, f64::max);
            (sum / samples as f64, min, max)
        };
        PerformanceMetrics {
            fps: self.fps(),
            average_frame_ms: average,
            min_frame_ms: min,
            max_frame_ms: max,
            samples,
            memory: self.memory_usage(),
        }
    }

    /// Bytes held by raster buffers.
    #[must_use]
    pub fn memory_usage(&self) -> MemoryUsage {
        let (render_targets_bytes, output_bytes) =
            self.surfaces.as_ref().map_or((0, 0), |s| {
                let targets: usize = s.targets.iter().map(Surface::byte_len).sum();
                (targets + s.scratch.byte_len(), s.output.byte_len())
            });
        let cache_bytes = self.cache.size_bytes();
        MemoryUsage {
            render_targets_bytes,
            output_bytes,
            cache_bytes,
            total_bytes: render_targets_bytes + output_bytes + cache_bytes,
        }
    }

    /// The composited output of the last frame.
    #[must_use]
    pub fn output(&self) -> Option<&Surface> {
        self.surfaces.as_ref().map(|s| &s.output)
    }

    /// One mode's render target.
    #[must_use]
    pub fn render_target(&self, mode: EditMode) -> Option<&Surface> {
        self.surfaces.as_ref().and_then(|s| s.targets.get(mode.index()))
    }

    /// The render cache.
    #[must_use]
    pub fn render_cache(&self) -> &RenderCache {
        &self.cache
    }

    /// Register a listener for canvas events.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&EngineEvent) + Send + 'static,
    {
        self.events.subscribe(listener)
    }

    /// Remove a listener.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }
}

/// Mutations made through the trait are silent: the coordinator making
/// them announces `entity:updated` itself.
impl EntityModel for CanvasManager {
    fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    fn update_entity(&mut self, entity: Entity) {
        self.store_entity(entity);
    }

    fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        self.evict_entity(id)
    }

    fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }
}

impl std::fmt::Debug for CanvasManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasManager")
            .field("viewport", &self.viewport)
            .field("entities", &self.entities.len())
            .field("initialized", &self.is_initialized())
            .field("frames", &self.stats.frames)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use genshi_core::{Stroke, StrokePoint};

    use super::*;

    fn small_config() -> CanvasConfig {
        CanvasConfig {
            width: 200,
            height: 100,
            ..CanvasConfig::default()
        }
    }

    fn stroke_entity(x: f64, y: f64) -> Entity {
        let mut entity = Entity::new(EntityId::new());
        entity.reprs.vector.strokes.push(Stroke::new(vec![
            StrokePoint::new(x, y),
            StrokePoint::new(x + 30.0, y + 10.0),
        ]));
        entity
    }

    fn recorded(canvas: &mut CanvasManager) -> Arc<Mutex<Vec<&'static str>>> {
        let names = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&names);
        canvas.subscribe(move |event| sink.lock().unwrap().push(event.name()));
        names
    }

    #[test]
    fn test_render_before_initialize_fails() {
        let mut canvas = CanvasManager::new(small_config());
        assert!(matches!(
            canvas.render_frame(),
            Err(RenderError::NotInitialized)
        ));
    }

    #[test]
    fn test_initialize_rejects_bad_pixel_ratio() {
        let mut canvas = CanvasManager::new(CanvasConfig {
            device_pixel_ratio: 0.0,
            ..small_config()
        });
        assert!(matches!(canvas.initialize(), Err(RenderError::Surface(_))));
        assert!(!canvas.is_initialized());
    }

    #[test]
    fn test_update_entity_indexes_and_announces() {
        let mut canvas = CanvasManager::new(small_config());
        let events = recorded(&mut canvas);
        let entity = stroke_entity(10.0, 10.0);
        let id = entity.id;
        canvas.update_entity(entity);

        assert_eq!(canvas.visible_entities(), vec![id]);
        assert!(canvas.entity(id).unwrap().bounds.width() > 30.0);
        assert!(canvas.remove_entity(id).is_some());
        assert!(canvas.visible_entities().is_empty());
        assert_eq!(
            *events.lock().unwrap(),
            vec!["entity:updated", "entity:updated"]
        );
    }

    #[test]
    fn test_trait_mutations_are_silent() {
        let mut canvas = CanvasManager::new(small_config());
        let events = recorded(&mut canvas);
        let entity = stroke_entity(10.0, 10.0);
        let id = entity.id;
        EntityModel::update_entity(&mut canvas, entity);
        assert_eq!(canvas.entity_ids(), vec![id]);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_frame_draws_visible_strokes() {
        let mut canvas = CanvasManager::new(small_config());
        canvas.initialize().unwrap();
        canvas.update_entity(stroke_entity(20.0, 20.0));
        let report = canvas.render_frame().unwrap();

        assert_eq!(report.frame, 1);
        assert_eq!(report.visible_entities, 1);
        assert_eq!(report.draw_calls, 1);
        assert!(report.failed_modes.is_empty());
        assert!(!canvas.render_target(EditMode::Draw).unwrap().is_blank());
        assert!(canvas.render_target(EditMode::Growth).unwrap().is_blank());
        let output = canvas.output().unwrap();
        assert_eq!(output.pixel(0, 99), Some(Color::WHITE));
    }

    #[test]
    fn test_second_frame_uses_cache() {
        let mut canvas = CanvasManager::new(small_config());
        canvas.initialize().unwrap();
        canvas.update_entity(stroke_entity(20.0, 20.0));
        canvas.render_frame().unwrap();
        canvas.render_frame().unwrap();
        let stats = canvas.render_stats();
        assert_eq!(stats.cache.misses, 1);
        assert_eq!(stats.cache.hits, 1);
        assert_eq!(stats.frames, 2);
    }

    #[test]
    fn test_disabled_mode_is_cleared() {
        let mut canvas = CanvasManager::new(small_config());
        canvas.initialize().unwrap();
        canvas.update_entity(stroke_entity(20.0, 20.0));
        canvas.render_frame().unwrap();

        let hidden = ModeState {
            enabled: false,
            ..ModeState::default()
        };
        assert!(canvas.set_mode_state(EditMode::Draw, hidden));
        assert!(!canvas.set_mode_state(EditMode::Draw, hidden));
        let report = canvas.render_frame().unwrap();
        assert!(canvas.render_target(EditMode::Draw).unwrap().is_blank());
        assert_eq!(report.draw_calls, 0);
    }

    #[test]
    fn test_mode_state_change_is_announced() {
        let mut canvas = CanvasManager::new(small_config());
        let events = recorded(&mut canvas);
        let state = ModeState {
            opacity: 7.0,
            ..ModeState::default()
        };
        // Clamped to 1.0, which is the current value.
        assert!(!canvas.set_mode_state(EditMode::Code, state));
        let faint = ModeState {
            opacity: 0.25,
            ..ModeState::default()
        };
        assert!(canvas.set_mode_state(EditMode::Code, faint));
        assert!((canvas.mode_state(EditMode::Code).opacity - 0.25).abs() < f64::EPSILON);
        assert_eq!(*events.lock().unwrap(), vec!["mode:state-changed"]);
    }

    #[test]
    fn test_performance_metrics_window() {
        let mut canvas = CanvasManager::new(CanvasConfig {
            frame_history: 3,
            ..small_config()
        });
        canvas.initialize().unwrap();
        for _ in 0..5 {
            canvas.render_frame().unwrap();
        }
        let metrics = canvas.performance_metrics();
        assert_eq!(metrics.samples, 3);
        assert!(metrics.min_frame_ms <= metrics.max_frame_ms);
        assert_eq!(metrics.memory.output_bytes, 200 * 100 * 4);
        assert_eq!(metrics.memory.render_targets_bytes, 5 * 200 * 100 * 4);
    }

    #[test]
    fn test_invalid_viewport_update_is_rejected() {
        let mut canvas = CanvasManager::new(small_config());
        let before = *canvas.viewport();
        assert!(canvas.update_viewport(&ViewportUpdate::zoom(-1.0)).is_err());
        assert_eq!(*canvas.viewport(), before);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: CanvasConfig =
            serde_json::from_str(r#"{"width": 1024, "cache": {"max_entries": 10}}"#).unwrap();
        assert_eq!(config.width, 1024);
        assert_eq!(config.height, CanvasConfig::default().height);
        assert_eq!(config.cache.max_entries, 10);
        assert_eq!(
            config.cache.max_size_bytes,
            RenderCacheConfig::default().max_size_bytes
        );
    }
}
