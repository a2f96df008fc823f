//! Single-writer async driver.
//!
//! One task owns the [`Studio`] and runs two independent intervals: sync
//! flushes every `sync.flush_interval_ms` and frames every
//! `driver.frame_interval_ms`. Missed ticks are skipped, never replayed.
//! Everything else reaches the studio as a [`Command`] over an mpsc
//! channel, so the entity table has exactly one writer.

use std::path::PathBuf;
use std::time::Duration;

use genshi_core::{Change, EditMode, EngineEvent, StrokeRecord};
use genshi_renderer::{ModeState, ViewportUpdate};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{StudioError, StudioResult};
use crate::studio::{Studio, StudioMetrics};

/// Driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Interval between frames, in milliseconds.
    pub frame_interval_ms: u64,
    /// Commands that may queue before senders wait.
    pub command_capacity: usize,
    /// Events buffered per subscriber before the slowest one lags.
    pub event_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
            command_capacity: 256,
            event_capacity: 1024,
        }
    }
}

type Reply<T> = oneshot::Sender<T>;

/// Requests handled by the driver task.
#[derive(Debug)]
pub enum Command {
    /// Submit a change.
    Submit(Change, Reply<StudioResult<()>>),
    /// Change the viewport.
    UpdateViewport(ViewportUpdate, Reply<StudioResult<bool>>),
    /// Resize the canvas.
    Resize {
        /// New width in CSS pixels.
        width: u32,
        /// New height in CSS pixels.
        height: u32,
        /// Outcome.
        reply: Reply<StudioResult<()>>,
    },
    /// Change a mode's layer settings.
    SetModeState(EditMode, ModeState, Reply<bool>),
    /// Collect stroke records.
    ExportStrokes(Reply<Vec<StrokeRecord>>),
    /// Submit stroke records as draw edits.
    ImportStrokes(Vec<StrokeRecord>, Reply<StudioResult<usize>>),
    /// Read counters.
    Metrics(Reply<StudioMetrics>),
    /// Write the last frame as PNG.
    Snapshot(PathBuf, Reply<StudioResult<()>>),
    /// Destroy the studio and stop, replying with final metrics.
    Shutdown(Reply<StudioMetrics>),
}

/// Client side of a running driver. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StudioHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<EngineEvent>,
}

impl StudioHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> StudioResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| StudioError::DriverClosed)?;
        response.await.map_err(|_| StudioError::DriverClosed)
    }

    /// Receive engine events from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Submit a change, stamped with the driver's clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the change is rejected or the driver stopped.
    pub async fn submit(&self, change: Change) -> StudioResult<()> {
        self.request(|reply| Command::Submit(change, reply)).await?
    }

    /// Change the viewport.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid viewport or if the driver stopped.
    pub async fn update_viewport(&self, update: ViewportUpdate) -> StudioResult<bool> {
        self.request(|reply| Command::UpdateViewport(update, reply))
            .await?
    }

    /// Resize the canvas.
    ///
    /// # Errors
    ///
    /// Returns an error for an unusable size or if the driver stopped.
    pub async fn resize(&self, width: u32, height: u32) -> StudioResult<()> {
        self.request(|reply| Command::Resize {
            width,
            height,
            reply,
        })
        .await?
    }

    /// Change a mode's layer settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver stopped.
    pub async fn set_mode_state(&self, mode: EditMode, state: ModeState) -> StudioResult<bool> {
        self.request(|reply| Command::SetModeState(mode, state, reply))
            .await
    }

    /// Collect stroke records.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver stopped.
    pub async fn export_strokes(&self) -> StudioResult<Vec<StrokeRecord>> {
        self.request(Command::ExportStrokes).await
    }

    /// Submit stroke records as draw edits.
    ///
    /// # Errors
    ///
    /// Returns an error if a stroke is rejected or the driver stopped.
    pub async fn import_strokes(&self, records: Vec<StrokeRecord>) -> StudioResult<usize> {
        self.request(|reply| Command::ImportStrokes(records, reply))
            .await?
    }

    /// Read counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver stopped.
    pub async fn metrics(&self) -> StudioResult<StudioMetrics> {
        self.request(Command::Metrics).await
    }

    /// Write the last frame as PNG.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails or the driver stopped.
    pub async fn snapshot(&self, path: PathBuf) -> StudioResult<()> {
        self.request(|reply| Command::Snapshot(path, reply)).await?
    }

    /// Destroy the studio and stop the driver, returning final metrics.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver already stopped.
    pub async fn shutdown(&self) -> StudioResult<StudioMetrics> {
        self.request(Command::Shutdown).await
    }
}

/// Start the driver on the current tokio runtime.
///
/// The returned join handle completes after `shutdown`, or once every
/// [`StudioHandle`] has been dropped.
#[must_use]
pub fn spawn_driver(mut studio: Studio) -> (StudioHandle, JoinHandle<()>) {
    let config = studio.config().driver.clone();
    let flush_every = Duration::from_millis(studio.config().sync.flush_interval_ms.max(1));
    let frame_every = Duration::from_millis(config.frame_interval_ms.max(1));

    let (commands, mut inbox) = mpsc::channel(config.command_capacity.max(1));
    let (events, _) = broadcast::channel(config.event_capacity.max(1));
    let forward = events.clone();
    studio.subscribe(move |event: &EngineEvent| {
        // No receivers is fine.
        let _ = forward.send(event.clone());
    });

    let task = tokio::spawn(async move {
        let started = Instant::now();
        let now_ms = || u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut flush = interval(flush_every);
        flush.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frame = interval(frame_every);
        frame.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(flush = ?flush_every, frame = ?frame_every, "Driver started");

        loop {
            tokio::select! {
                command = inbox.recv() => {
                    let Some(command) = command else {
                        debug!("All handles dropped");
                        break;
                    };
                    if !handle_command(&mut studio, command, now_ms()) {
                        break;
                    }
                }
                _ = flush.tick() => {
                    if let Err(e) = studio.tick_sync(now_ms()) {
                        warn!(error = %e, "Sync tick failed");
                    }
                }
                _ = frame.tick() => {
                    if let Err(e) = studio.render_frame() {
                        error!(error = %e, "Frame failed");
                    }
                }
            }
        }
        studio.destroy();
        info!("Driver stopped");
    });

    (StudioHandle { commands, events }, task)
}

/// Returns `false` once the driver should stop.
fn handle_command(studio: &mut Studio, command: Command, now_ms: u64) -> bool {
    // A dropped reply receiver means the caller gave up waiting.
    match command {
        Command::Submit(change, reply) => {
            let _ = reply.send(studio.submit(change.with_timestamp(now_ms), now_ms));
        }
        Command::UpdateViewport(update, reply) => {
            let _ = reply.send(studio.update_viewport(&update));
        }
        Command::Resize {
            width,
            height,
            reply,
        } => {
            let _ = reply.send(studio.resize(width, height));
        }
        Command::SetModeState(mode, state, reply) => {
            let _ = reply.send(studio.set_mode_state(mode, state));
        }
        Command::ExportStrokes(reply) => {
            let _ = reply.send(studio.export_strokes());
        }
        Command::ImportStrokes(records, reply) => {
            let _ = reply.send(studio.import_strokes(records, now_ms));
        }
        Command::Metrics(reply) => {
            let _ = reply.send(studio.metrics());
        }
        Command::Snapshot(path, reply) => {
            let _ = reply.send(studio.snapshot(&path));
        }
        Command::Shutdown(reply) => {
            let metrics = studio.metrics();
            studio.destroy();
            let _ = reply.send(metrics);
            return false;
        }
    }
    true
}
