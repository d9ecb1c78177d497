//! End-to-end tracker behavior driven through a synthetic fix source.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use soundwalk::db::Database;
use soundwalk::geo::GeoFix;
use soundwalk::tracker::{ChannelFixSource, SamplerOptions, SessionController, TrackerStatus};

fn temp_db() -> Database {
    let dir = std::env::temp_dir().join(format!("soundwalk-test-{}", Uuid::new_v4()));
    Database::new(dir.join("walks.sqlite3")).expect("database builds")
}

fn controller_with_source() -> (Arc<ChannelFixSource>, SessionController) {
    let source = Arc::new(ChannelFixSource::new());
    let controller = SessionController::new(source.clone(), SamplerOptions::default(), temp_db());
    (source, controller)
}

fn fix_at(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> GeoFix {
    GeoFix {
        latitude,
        longitude,
        accuracy_m: 5.0,
        altitude_m: None,
        timestamp,
    }
}

// Give the walk loop a moment to drain the event channel.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn stop_without_a_walk_is_not_an_error() {
    let (_source, controller) = controller_with_source();
    assert_eq!(controller.status().await, TrackerStatus::Idle);
    assert!(controller.stop().await.expect("stop succeeds").is_none());
    assert!(controller.snapshot().await.is_none());
}

#[tokio::test]
async fn a_full_walk_accumulates_distance_and_finalizes() {
    let (source, controller) = controller_with_source();

    let started = controller.start().await.expect("walk starts");
    assert_eq!(controller.status().await, TrackerStatus::Active);
    assert!(started.id.starts_with("walk-"));
    assert_eq!(started.cumulative_distance_m, 0.0);

    // Two fixes a minute apart, roughly 111 m north.
    let t0 = Utc::now();
    source.push_fix(fix_at(35.0, 139.0, t0));
    source.push_fix(fix_at(35.001, 139.0, t0 + chrono::Duration::seconds(60)));
    settle().await;

    let live = controller.snapshot().await.expect("live snapshot");
    assert!(live.cumulative_distance_m > 100.0 && live.cumulative_distance_m < 125.0);
    assert!(live.current_speed_kmh > 6.0 && live.current_speed_kmh < 7.5);
    assert!(live.estimated_steps > 140);

    let done = controller
        .stop()
        .await
        .expect("stop succeeds")
        .expect("a walk was running");
    assert_eq!(controller.status().await, TrackerStatus::Stopped);
    assert!(done.end_time.is_some());
    assert_eq!(done.fix_history.len(), 2);
    assert_eq!(done.id, started.id);

    // The finalized snapshot is frozen after stop.
    let after = controller.snapshot().await.expect("snapshot retained");
    assert_eq!(after.cumulative_distance_m, done.cumulative_distance_m);
}

#[tokio::test]
async fn starting_twice_is_rejected() {
    let (_source, controller) = controller_with_source();
    controller.start().await.expect("first start");
    assert!(controller.start().await.is_err());
    controller.stop().await.expect("stop succeeds");

    // A stopped controller can begin a fresh walk.
    let second = controller.start().await.expect("restart after stop");
    assert_eq!(second.cumulative_distance_m, 0.0);
}

#[tokio::test]
async fn pause_retains_totals_and_resume_continues() {
    let (source, controller) = controller_with_source();
    controller.start().await.expect("walk starts");

    let t0 = Utc::now();
    source.push_fix(fix_at(35.0, 139.0, t0));
    source.push_fix(fix_at(35.001, 139.0, t0 + chrono::Duration::seconds(30)));
    settle().await;

    controller.pause().await.expect("pause succeeds");
    assert_eq!(controller.status().await, TrackerStatus::Paused);
    let paused = controller.snapshot().await.expect("snapshot retained");
    assert!(paused.cumulative_distance_m > 100.0);

    // Fixes pushed while paused land nowhere.
    source.push_fix(fix_at(35.002, 139.0, t0 + chrono::Duration::seconds(45)));
    settle().await;
    let still_paused = controller.snapshot().await.expect("snapshot retained");
    assert_eq!(
        still_paused.cumulative_distance_m,
        paused.cumulative_distance_m
    );

    controller.resume().await.expect("resume succeeds");
    assert_eq!(controller.status().await, TrackerStatus::Active);
    source.push_fix(fix_at(35.003, 139.0, t0 + chrono::Duration::seconds(90)));
    settle().await;

    let resumed = controller.snapshot().await.expect("live snapshot");
    assert!(resumed.cumulative_distance_m > paused.cumulative_distance_m);
}

#[tokio::test]
async fn pause_and_resume_require_the_right_state() {
    let (_source, controller) = controller_with_source();
    assert!(controller.pause().await.is_err());
    assert!(controller.resume().await.is_err());

    controller.start().await.expect("walk starts");
    assert!(controller.resume().await.is_err());
}

#[tokio::test]
async fn sensor_errors_halt_sampling_and_surface() {
    let (source, controller) = controller_with_source();
    controller.start().await.expect("walk starts");
    assert!(controller.last_sensor_error().await.is_none());

    source.push_error(soundwalk::error::SensorError::PermissionDenied);
    settle().await;

    assert_eq!(
        controller.last_sensor_error().await,
        Some(soundwalk::error::SensorError::PermissionDenied)
    );

    // The session itself is still controllable.
    let done = controller.stop().await.expect("stop succeeds");
    assert!(done.is_some());
}

#[tokio::test]
async fn jittery_fixes_below_the_noise_floor_add_no_distance() {
    let (source, controller) = controller_with_source();
    controller.start().await.expect("walk starts");

    let t0 = Utc::now();
    source.push_fix(fix_at(35.0, 139.0, t0));
    // ~0.1 m of drift.
    source.push_fix(fix_at(35.000001, 139.0, t0 + chrono::Duration::seconds(1)));
    settle().await;

    let live = controller.snapshot().await.expect("live snapshot");
    assert_eq!(live.cumulative_distance_m, 0.0);
    // The route history still records every accepted fix.
    assert_eq!(live.fix_history.len(), 2);
}
