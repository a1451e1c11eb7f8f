//! Blink window timing on a paused tokio clock.

use std::time::Duration;

use blinkcheck_core::{
    spawn_liveness, ConfirmationSampling, EyeOpenness, FrameSignal, LivenessConfig,
    LivenessHandle, LivenessSnapshot, ServiceError,
};
use tokio::time::Instant;

fn face(left: f32, right: f32) -> FrameSignal {
    FrameSignal::Face(EyeOpenness::new(left, right))
}

fn checkpoint_config() -> LivenessConfig {
    LivenessConfig {
        sampling: ConfirmationSampling::AtCheckpoint,
        ..Default::default()
    }
}

/// Sleep to `ms` after `start` and read the published view.
async fn snapshot_at(handle: &LivenessHandle, start: Instant, ms: u64) -> LivenessSnapshot {
    tokio::time::sleep_until(start + Duration::from_millis(ms)).await;
    handle.snapshot()
}

fn snap(face_detected: bool, blink_detected: bool, user_is_real: bool) -> LivenessSnapshot {
    LivenessSnapshot {
        face_detected,
        blink_detected,
        user_is_real,
    }
}

#[tokio::test(start_paused = true)]
async fn trigger_sampling_opens_and_closes_window_without_confirming() {
    let (handle, _task) = spawn_liveness(LivenessConfig::default());
    let start = Instant::now();

    handle.submit(face(0.9, 0.9)).await.unwrap();
    handle.submit(face(0.05, 0.05)).await.unwrap();

    assert_eq!(snapshot_at(&handle, start, 10).await, snap(true, true, false));
    assert_eq!(snapshot_at(&handle, start, 990).await, snap(true, true, false));
    assert_eq!(snapshot_at(&handle, start, 1010).await, snap(true, true, false));
    assert_eq!(snapshot_at(&handle, start, 2990).await, snap(true, true, false));
    assert_eq!(snapshot_at(&handle, start, 3010).await, snap(true, false, false));
}

#[tokio::test(start_paused = true)]
async fn checkpoint_sampling_confirms_at_one_second_and_closes_at_three() {
    let (handle, _task) = spawn_liveness(checkpoint_config());
    let start = Instant::now();

    handle.submit(face(0.9, 0.9)).await.unwrap();
    handle.submit(face(0.05, 0.05)).await.unwrap();
    tokio::time::sleep_until(start + Duration::from_millis(200)).await;
    handle.submit(face(0.95, 0.9)).await.unwrap();

    assert_eq!(snapshot_at(&handle, start, 990).await, snap(true, true, false));
    assert_eq!(snapshot_at(&handle, start, 1010).await, snap(true, true, true));
    assert_eq!(snapshot_at(&handle, start, 2990).await, snap(true, true, true));
    assert_eq!(snapshot_at(&handle, start, 3010).await, snap(true, false, true));
}

#[tokio::test(start_paused = true)]
async fn checkpoint_sampling_without_reopened_eyes_stays_not_live() {
    let (handle, _task) = spawn_liveness(checkpoint_config());
    let start = Instant::now();

    handle.submit(face(0.02, 0.02)).await.unwrap();
    tokio::time::sleep_until(start + Duration::from_millis(300)).await;
    handle.submit(face(0.5, 0.6)).await.unwrap();

    assert_eq!(snapshot_at(&handle, start, 1010).await, snap(true, true, false));
    assert_eq!(snapshot_at(&handle, start, 3010).await, snap(true, false, false));
}

#[tokio::test(start_paused = true)]
async fn face_loss_mid_window_resets_immediately() {
    let (handle, _task) = spawn_liveness(checkpoint_config());
    let start = Instant::now();

    handle.submit(face(0.05, 0.05)).await.unwrap();
    tokio::time::sleep_until(start + Duration::from_millis(200)).await;
    handle.submit(face(0.9, 0.9)).await.unwrap();
    tokio::time::sleep_until(start + Duration::from_millis(500)).await;
    handle.submit(FrameSignal::NoFace).await.unwrap();

    assert_eq!(snapshot_at(&handle, start, 501).await, LivenessSnapshot::default());
    // The pending checkpoints still fire but find nothing to confirm.
    assert_eq!(snapshot_at(&handle, start, 1010).await, LivenessSnapshot::default());
    assert_eq!(snapshot_at(&handle, start, 3010).await, LivenessSnapshot::default());
}

#[tokio::test(start_paused = true)]
async fn closed_frames_during_window_do_not_extend_it() {
    let (handle, _task) = spawn_liveness(LivenessConfig::default());
    let start = Instant::now();

    handle.submit(face(0.0, 0.0)).await.unwrap();
    tokio::time::sleep_until(start + Duration::from_millis(2500)).await;
    handle.submit(face(0.01, 0.01)).await.unwrap();

    assert_eq!(snapshot_at(&handle, start, 3010).await, snap(true, false, false));

    handle.submit(face(0.01, 0.01)).await.unwrap();
    assert_eq!(snapshot_at(&handle, start, 3020).await, snap(true, true, false));
    assert_eq!(snapshot_at(&handle, start, 6030).await, snap(true, false, false));
}

#[tokio::test(start_paused = true)]
async fn stale_release_closes_window_opened_after_face_loss() {
    let (handle, _task) = spawn_liveness(LivenessConfig::default());
    let start = Instant::now();

    handle.submit(face(0.0, 0.0)).await.unwrap();
    tokio::time::sleep_until(start + Duration::from_millis(500)).await;
    handle.submit(FrameSignal::NoFace).await.unwrap();
    tokio::time::sleep_until(start + Duration::from_millis(1500)).await;
    handle.submit(face(0.0, 0.0)).await.unwrap();

    assert_eq!(snapshot_at(&handle, start, 2990).await, snap(true, true, false));
    // First window's release fires at 3000 and closes the second window.
    assert_eq!(snapshot_at(&handle, start, 3010).await, snap(true, false, false));
}

#[tokio::test(start_paused = true)]
async fn observers_are_notified_only_on_change() {
    let (handle, _task) = spawn_liveness(LivenessConfig::default());
    let mut rx = handle.subscribe();

    for _ in 0..3 {
        handle.submit(face(0.5, 0.5)).await.unwrap();
    }
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), snap(true, false, false));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_cancels_pending_timers() {
    let (handle, task) = spawn_liveness(checkpoint_config());
    let start = Instant::now();

    handle.submit(face(0.0, 0.0)).await.unwrap();
    handle.submit(face(0.9, 0.9)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(handle);

    task.await.unwrap();
    assert!(start.elapsed() < Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn wait_idle_resolves_when_last_window_closes() {
    let (handle, _task) = spawn_liveness(LivenessConfig::default());
    let start = Instant::now();

    handle.submit(face(0.02, 0.04)).await.unwrap();
    let settled = handle.wait_idle().await.unwrap();

    assert_eq!(settled, snap(true, false, false));
    assert!(start.elapsed() >= Duration::from_millis(3000));
}

#[tokio::test(start_paused = true)]
async fn wait_idle_answers_after_queued_signals_when_no_window_is_open() {
    let (handle, _task) = spawn_liveness(LivenessConfig::default());
    let start = Instant::now();

    handle.submit(face(0.5, 0.5)).await.unwrap();
    assert_eq!(handle.wait_idle().await.unwrap(), snap(true, false, false));
    assert!(start.elapsed() < Duration::from_millis(10));
}

#[tokio::test(start_paused = true)]
async fn wait_idle_fails_once_task_is_gone() {
    let (handle, task) = spawn_liveness(LivenessConfig::default());
    task.abort();
    let _ = task.await;

    assert_eq!(handle.wait_idle().await, Err(ServiceError::ChannelClosed));
}
