//! # Genshi Studio
//!
//! Host for the Genshi Studio engine: wires the sync coordinator to the
//! canvas manager and drives both from one tokio task.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p genshi-studio -- --import strokes.json --snapshot frame.png
//! ```
//!
//! ## Architecture
//!
//! - `CliArgs` - Command-line arguments parsed with clap
//! - `StudioConfig` - Sync, canvas and driver settings, loadable from JSON
//! - `Studio` - Coordinator + canvas, the single owner of the entity table
//! - `spawn_driver` - Flush and frame intervals plus a command channel

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod driver;
pub mod error;
pub mod metrics;
pub mod snapshot;
pub mod studio;

pub use driver::{spawn_driver, DriverConfig, StudioHandle};
pub use error::{StudioError, StudioResult};
pub use studio::{Studio, StudioMetrics};

use std::path::{Path, PathBuf};

use clap::Parser;
use genshi_core::SyncConfig;
use genshi_renderer::CanvasConfig;
use serde::{Deserialize, Serialize};

/// Command-line arguments for genshi-studio.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "genshi-studio")]
#[command(about = "Genshi Studio multi-modal sync and compositing engine")]
#[command(version)]
pub struct CliArgs {
    /// JSON configuration file
    #[arg(long, env = "GENSHI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Viewport width in CSS pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Viewport height in CSS pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Device pixels per CSS pixel
    #[arg(long, env = "GENSHI_DEVICE_PIXEL_RATIO")]
    pub device_pixel_ratio: Option<f64>,

    /// Sync flush interval in milliseconds
    #[arg(long)]
    pub flush_interval_ms: Option<u64>,

    /// Render interval in milliseconds
    #[arg(long)]
    pub frame_interval_ms: Option<u64>,

    /// Stroke records (JSON) to import at startup
    #[arg(long)]
    pub import: Option<PathBuf>,

    /// Where to write the stroke records (JSON) on exit
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Where to write a PNG of the last frame on exit
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// How long to run the engine, in milliseconds
    #[arg(long, default_value = "1000")]
    pub run_ms: u64,

    /// Print Prometheus metrics on exit
    #[arg(long)]
    pub print_metrics: bool,
}

/// Complete studio configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// Coordinator settings.
    pub sync: SyncConfig,
    /// Canvas settings.
    pub canvas: CanvasConfig,
    /// Driver settings.
    pub driver: DriverConfig,
}

impl StudioConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`StudioError::Json`] for malformed input.
    pub fn from_json(json: &str) -> StudioResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> StudioResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| StudioError::io(path, e))?;
        Self::from_json(&json)
    }

    /// Build the configuration for a run: the file named by `--config`, if
    /// any, with command-line overrides applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the result fails
    /// [`StudioConfig::validate`].
    pub fn load(args: &CliArgs) -> StudioResult<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(args);
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides.
    pub fn apply_overrides(&mut self, args: &CliArgs) {
        if let Some(width) = args.width {
            self.canvas.width = width;
        }
        if let Some(height) = args.height {
            self.canvas.height = height;
        }
        if let Some(dpr) = args.device_pixel_ratio {
            self.canvas.device_pixel_ratio = dpr;
        }
        if let Some(interval) = args.flush_interval_ms {
            self.sync.flush_interval_ms = interval;
        }
        if let Some(interval) = args.frame_interval_ms {
            self.driver.frame_interval_ms = interval;
        }
    }

    /// Reject settings the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`StudioError::Config`] naming the first bad field.
    pub fn validate(&self) -> StudioResult<()> {
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(StudioError::Config(format!(
                "canvas size must be positive, got {}x{}",
                self.canvas.width, self.canvas.height
            )));
        }
        let dpr = self.canvas.device_pixel_ratio;
        if !dpr.is_finite() || dpr <= 0.0 {
            return Err(StudioError::Config(format!(
                "device pixel ratio must be positive, got {dpr}"
            )));
        }
        if self.sync.flush_interval_ms == 0 {
            return Err(StudioError::Config(
                "flush interval must be at least 1 ms".to_string(),
            ));
        }
        if self.driver.frame_interval_ms == 0 {
            return Err(StudioError::Config(
                "frame interval must be at least 1 ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Genshi studio version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
