//! Driver Integration Tests
//!
//! Runs the studio behind its async driver with tokio's paused clock:
//! - Strokes submitted over the handle reach every mode
//! - Events are broadcast to subscribers
//! - Snapshots and stroke export through the handle
//! - Shutdown stops the task

use std::time::Duration;

use genshi_core::{Change, ChangePayload, EditMode, EngineEvent, EntityId, Stroke, StrokePoint};
use genshi_renderer::ViewportUpdate;
use genshi_studio::{spawn_driver, Studio, StudioConfig, StudioError};

fn config() -> StudioConfig {
    let mut config = StudioConfig::default();
    config.canvas.width = 320;
    config.canvas.height = 240;
    config
}

fn wave_change(entity: EntityId) -> Change {
    let points = (0..60)
        .map(|i| {
            let t = f64::from(i);
            StrokePoint::new(t * 4.0, 120.0 + 30.0 * (t * 0.3).sin())
        })
        .collect();
    Change::new(
        entity,
        EditMode::Draw,
        ChangePayload::StrokeAdded {
            stroke: Stroke::new(points),
            style: None,
        },
    )
    .creating()
}

// ============================================================================
// Driver Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_submitted_stroke_is_synced_and_rendered() {
    let (handle, task) = spawn_driver(Studio::new(config()).unwrap());
    let mut events = handle.subscribe();
    let entity = EntityId::new();

    handle.submit(wave_change(entity)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let metrics = handle.metrics().await.unwrap();
    assert_eq!(metrics.sync.submitted, 1);
    assert!(metrics.sync.applied >= 2);
    assert!(metrics.render.frames > 0);
    assert_eq!(metrics.render.entities, 1);

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.name());
    }
    assert!(names.contains(&"change:applied"));
    assert!(names.contains(&"entity:updated"));
    assert!(names.contains(&"frame:rendered"));

    let records = handle.export_strokes().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].entity, entity);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_invalid_viewport_is_reported_to_caller() {
    let (handle, task) = spawn_driver(Studio::new(config()).unwrap());

    let result = handle.update_viewport(ViewportUpdate::zoom(0.0)).await;
    assert!(matches!(result, Err(StudioError::Render(_))));
    assert!(handle
        .update_viewport(ViewportUpdate::zoom(2.0))
        .await
        .unwrap());

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_through_handle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    let (handle, task) = spawn_driver(Studio::new(config()).unwrap());

    handle.submit(wave_change(EntityId::new())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.snapshot(path.clone()).await.unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[1..4], b"PNG");

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_handle_fails_after_shutdown() {
    let (handle, task) = spawn_driver(Studio::new(config()).unwrap());
    let final_metrics = handle.shutdown().await.unwrap();
    assert_eq!(final_metrics.sync.submitted, 0);
    task.await.unwrap();

    let result = handle.submit(wave_change(EntityId::new())).await;
    assert!(matches!(result, Err(StudioError::DriverClosed)));
}

#[tokio::test(start_paused = true)]
async fn test_removal_clears_entity() {
    let (handle, task) = spawn_driver(Studio::new(config()).unwrap());
    let mut events = handle.subscribe();
    let entity = EntityId::new();

    handle.submit(wave_change(entity)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle
        .submit(Change::removal(entity, EditMode::Draw))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(handle.export_strokes().await.unwrap().is_empty());
    let mut removed = false;
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::EntityUpdated { entity_id, removed: true } = event {
            removed |= entity_id == entity;
        }
    }
    assert!(removed);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}
