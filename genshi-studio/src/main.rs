//! # Genshi Studio
//!
//! Headless engine run: import strokes, let the sync and render loops run,
//! then export strokes, write a snapshot and report metrics.

use std::time::Duration;

use clap::Parser;
use genshi_core::StrokeRecord;
use genshi_studio::{metrics, spawn_driver, CliArgs, Studio, StudioConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured tracing.
///
/// Set `RUST_LOG` to control log levels. Set `RUST_LOG_FORMAT=json` for
/// JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("genshi_studio=info,genshi_core=info,genshi_renderer=info")
    });
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let metrics_handle = metrics::init_metrics()
        .map_err(|e| anyhow::anyhow!("Failed to initialize Prometheus metrics: {}", e))?;

    let args = CliArgs::parse();
    let config = StudioConfig::load(&args)?;
    tracing::info!(
        "Canvas {}x{} at {}x, flush every {} ms, frame every {} ms",
        config.canvas.width,
        config.canvas.height,
        config.canvas.device_pixel_ratio,
        config.sync.flush_interval_ms,
        config.driver.frame_interval_ms
    );

    let studio = Studio::new(config)?;
    let (handle, task) = spawn_driver(studio);

    if let Some(path) = &args.import {
        let json = tokio::fs::read_to_string(path).await?;
        let records: Vec<StrokeRecord> = serde_json::from_str(&json)?;
        let submitted = handle.import_strokes(records).await?;
        tracing::info!("Imported {} strokes from {}", submitted, path.display());
    }

    tokio::time::sleep(Duration::from_millis(args.run_ms)).await;

    if let Some(path) = &args.export {
        let records = handle.export_strokes().await?;
        tokio::fs::write(path, serde_json::to_vec_pretty(&records)?).await?;
        tracing::info!("Exported {} entities to {}", records.len(), path.display());
    }
    if let Some(path) = &args.snapshot {
        handle.snapshot(path.clone()).await?;
    }

    let final_metrics = handle.shutdown().await?;
    task.await?;
    tracing::info!(
        "Rendered {} frames ({:.1} fps), applied {} changes, {} conflicts",
        final_metrics.render.frames,
        final_metrics.performance.fps,
        final_metrics.sync.applied,
        final_metrics.sync.conflicts
    );

    if args.print_metrics {
        println!("{}", metrics_handle.render());
    }
    Ok(())
}
