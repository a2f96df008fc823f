//! The studio facade: one coordinator writing into one canvas.

use std::path::Path;

use genshi_core::{
    stroke_records, Change, ChangePayload, EditMode, EngineEvent, FlushReport, StrokeRecord,
    SubscriptionId, SyncCoordinator, SyncStats,
};
use genshi_renderer::{
    CanvasManager, FrameReport, ModeState, PerformanceMetrics, RenderStats, ViewportUpdate,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StudioResult;
use crate::{metrics, snapshot, StudioConfig};

/// Everything the UI shows about engine health.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudioMetrics {
    /// Coordinator counters.
    pub sync: SyncStats,
    /// Render loop counters.
    pub render: RenderStats,
    /// Frame timing and memory.
    pub performance: PerformanceMetrics,
}

/// Owns the coordinator and the canvas it writes into.
///
/// The canvas is the coordinator's entity model, so applied changes update
/// the spatial index and invalidate cached tiles as they land.
#[derive(Debug)]
pub struct Studio {
    config: StudioConfig,
    sync: SyncCoordinator,
    canvas: CanvasManager,
}

impl Studio {
    /// Build the coordinator and canvas and allocate render targets.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the canvas
    /// cannot allocate its surfaces.
    pub fn new(config: StudioConfig) -> StudioResult<Self> {
        config.validate()?;
        let sync = SyncCoordinator::new(config.sync.clone());
        let mut canvas = CanvasManager::new(config.canvas.clone());
        canvas.initialize()?;
        info!(
            width = config.canvas.width,
            height = config.canvas.height,
            flush_interval_ms = config.sync.flush_interval_ms,
            "Studio started"
        );
        Ok(Self {
            config,
            sync,
            canvas,
        })
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    /// The canvas.
    #[must_use]
    pub fn canvas(&self) -> &CanvasManager {
        &self.canvas
    }

    /// The coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.sync
    }

    /// Submit a user edit or a translated change.
    ///
    /// # Errors
    ///
    /// Returns an error if the change is invalid or the studio was
    /// destroyed.
    pub fn submit(&mut self, change: Change, now_ms: u64) -> StudioResult<()> {
        let mode = change.source_mode;
        self.sync.submit(change, now_ms)?;
        metrics::record_submitted(mode);
        Ok(())
    }

    /// Collect due translations and apply everything pending to the canvas.
    ///
    /// # Errors
    ///
    /// Returns an error if the studio was destroyed.
    pub fn tick_sync(&mut self, now_ms: u64) -> StudioResult<FlushReport> {
        let report = self.sync.tick(now_ms, &mut self.canvas)?;
        if !report.is_empty() {
            metrics::record_flush(&report);
        }
        Ok(report)
    }

    /// Render and composite one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the canvas is not initialized.
    pub fn render_frame(&mut self) -> StudioResult<FrameReport> {
        let report = self.canvas.render_frame()?;
        metrics::record_frame(&report);
        Ok(report)
    }

    /// Apply a viewport change. Returns whether the render cache was
    /// cleared.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid viewport.
    pub fn update_viewport(&mut self, update: &ViewportUpdate) -> StudioResult<bool> {
        Ok(self.canvas.update_viewport(update)?)
    }

    /// Resize the canvas.
    ///
    /// # Errors
    ///
    /// Returns an error if the new size is unusable.
    pub fn resize(&mut self, width: u32, height: u32) -> StudioResult<()> {
        self.canvas.resize(width, height)?;
        metrics::set_memory(&self.canvas.memory_usage());
        Ok(())
    }

    /// Change one mode's layer settings.
    pub fn set_mode_state(&mut self, mode: EditMode, state: ModeState) -> bool {
        self.canvas.set_mode_state(mode, state)
    }

    /// Vector-mode content of every entity, for persistence.
    #[must_use]
    pub fn export_strokes(&self) -> Vec<StrokeRecord> {
        stroke_records(&self.canvas)
    }

    /// Submit every stroke in `records` as a user draw edit, so the other
    /// modes are derived as if the strokes had just been drawn. Returns the
    /// number of strokes submitted.
    ///
    /// # Errors
    ///
    /// Returns the first submission error; earlier strokes stay submitted.
    pub fn import_strokes(&mut self, records: Vec<StrokeRecord>, now_ms: u64) -> StudioResult<usize> {
        let mut submitted = 0;
        for record in records {
            for stroke in record.strokes {
                let change = Change::new(
                    record.entity,
                    EditMode::Draw,
                    ChangePayload::StrokeAdded {
                        stroke,
                        style: Some(record.style),
                    },
                )
                .with_timestamp(now_ms)
                .creating();
                self.submit(change, now_ms)?;
                submitted += 1;
            }
        }
        debug!(submitted, "Strokes imported");
        Ok(submitted)
    }

    /// Counters, timing and memory.
    #[must_use]
    pub fn metrics(&self) -> StudioMetrics {
        let performance = self.canvas.performance_metrics();
        metrics::set_memory(&performance.memory);
        StudioMetrics {
            sync: self.sync.stats(),
            render: self.canvas.render_stats(),
            performance,
        }
    }

    /// Write the last composited frame to `path` as PNG.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing has been rendered or writing fails.
    pub fn snapshot(&self, path: &Path) -> StudioResult<()> {
        let output = self
            .canvas
            .output()
            .ok_or(genshi_renderer::RenderError::NotInitialized)?;
        snapshot::write_png(output, path)
    }

    /// Deliver coordinator and canvas events to `listener`.
    ///
    /// Returns the coordinator and canvas subscription handles.
    pub fn subscribe<F>(&mut self, listener: F) -> (SubscriptionId, SubscriptionId)
    where
        F: FnMut(&EngineEvent) + Clone + Send + 'static,
    {
        let sync = self.sync.subscribe(listener.clone());
        let canvas = self.canvas.subscribe(listener);
        (sync, canvas)
    }

    /// Whether `destroy` has been called.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.sync.is_destroyed()
    }

    /// Cancel pending work and drop every entity. Calling it again is a
    /// no-op.
    pub fn destroy(&mut self) {
        if self.sync.is_destroyed() {
            return;
        }
        self.sync.destroy();
        self.canvas.clear_entities();
        info!("Studio destroyed");
    }
}
