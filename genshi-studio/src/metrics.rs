//! Prometheus metrics for genshi-studio.
//!
//! Recorded through the `metrics` facade; nothing is kept unless the binary
//! installs the Prometheus recorder with [`init_metrics`].

use genshi_core::{EditMode, FlushReport};
use genshi_renderer::{FrameReport, MemoryUsage};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

const CHANGES_SUBMITTED_TOTAL: &str = "genshi_changes_submitted_total";
const CHANGES_APPLIED_TOTAL: &str = "genshi_changes_applied_total";
const CHANGES_DROPPED_TOTAL: &str = "genshi_changes_dropped_total";
const CONFLICTS_TOTAL: &str = "genshi_conflicts_total";
const TRANSLATION_ERRORS_TOTAL: &str = "genshi_translation_errors_total";
const TRANSLATION_CONFIDENCE: &str = "genshi_translation_confidence";
const FLUSH_DURATION: &str = "genshi_flush_duration_seconds";
const FRAME_DURATION: &str = "genshi_frame_duration_seconds";
const ENTITIES_VISIBLE: &str = "genshi_entities_visible";
const ENTITIES_CULLED_TOTAL: &str = "genshi_entities_culled_total";
const RENDER_ERRORS_TOTAL: &str = "genshi_render_errors_total";
const BUDGET_OVERRUNS_TOTAL: &str = "genshi_budget_overruns_total";
const MEMORY_BYTES: &str = "genshi_memory_bytes";

/// Install the Prometheus recorder and return its handle.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record a change accepted by the coordinator.
pub fn record_submitted(mode: EditMode) {
    counter!(CHANGES_SUBMITTED_TOTAL, "mode" => mode.as_str()).increment(1);
}

/// Record the outcome of a sync flush.
pub fn record_flush(report: &FlushReport) {
    for applied in &report.applied {
        let mode = applied.mode.map_or("none", EditMode::as_str);
        counter!(CHANGES_APPLIED_TOTAL, "mode" => mode).increment(1);
        if let Some(confidence) = applied.confidence {
            histogram!(TRANSLATION_CONFIDENCE, "mode" => mode).record(confidence);
        }
    }
    counter!(CHANGES_DROPPED_TOTAL).increment(report.dropped as u64);
    counter!(CONFLICTS_TOTAL).increment(report.conflicts as u64);
    counter!(TRANSLATION_ERRORS_TOTAL).increment(report.translation_errors as u64);
    histogram!(FLUSH_DURATION).record(report.duration_ms / 1000.0);
    if report.over_budget {
        counter!(BUDGET_OVERRUNS_TOTAL, "stage" => "sync").increment(1);
    }
}

/// Record a rendered frame.
#[allow(clippy::cast_precision_loss)]
pub fn record_frame(report: &FrameReport) {
    histogram!(FRAME_DURATION).record(report.frame_time_ms / 1000.0);
    gauge!(ENTITIES_VISIBLE).set(report.visible_entities as f64);
    counter!(ENTITIES_CULLED_TOTAL).increment(report.culled_entities as u64);
    for mode in &report.failed_modes {
        counter!(RENDER_ERRORS_TOTAL, "mode" => mode.as_str()).increment(1);
    }
    if report.over_budget {
        counter!(BUDGET_OVERRUNS_TOTAL, "stage" => "render").increment(1);
    }
}

/// Update raster memory gauges.
#[allow(clippy::cast_precision_loss)]
pub fn set_memory(memory: &MemoryUsage) {
    gauge!(MEMORY_BYTES, "kind" => "render_targets").set(memory.render_targets_bytes as f64);
    gauge!(MEMORY_BYTES, "kind" => "output").set(memory.output_bytes as f64);
    gauge!(MEMORY_BYTES, "kind" => "cache").set(memory.cache_bytes as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_harmless() {
        record_submitted(EditMode::Draw);
        record_flush(&FlushReport::default());
        record_frame(&FrameReport {
            frame: 1,
            frame_time_ms: 2.0,
            visible_entities: 3,
            culled_entities: 1,
            draw_calls: 3,
            layers_composited: 4,
            failed_modes: vec![EditMode::Code],
            over_budget: true,
        });
        set_memory(&MemoryUsage::default());
    }
}
