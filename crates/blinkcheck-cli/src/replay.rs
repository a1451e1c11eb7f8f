//! `blinkcheck replay` — drive the full pipeline from a recorded trace.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use blinkcheck_core::{
    spawn_analyzer, spawn_liveness, AnalyzerError, AnalyzerStats, CameraPermission,
    LivenessSnapshot,
};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::render::render;
use crate::settings::Settings;
use crate::trace::Trace;

#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub permission_granted: bool,
    #[serde(flatten)]
    pub stats: AnalyzerStats,
    pub released: u64,
    pub final_state: LivenessSnapshot,
}

/// Replay `trace` in real time, printing every observer update.
pub async fn run(trace: Trace, settings: &Settings, json: bool) -> Result<ReplayReport> {
    let settle = Duration::from_millis(trace.settle_ms.unwrap_or(settings.settle_ms));
    let permission = CameraPermission::from(trace.camera_permission);

    let (liveness, liveness_task) = spawn_liveness(settings.liveness.clone());
    let start = Instant::now();
    let observer = tokio::spawn(observe(liveness.subscribe(), start, json));

    let releases = Arc::new(AtomicU64::new(0));
    let (frames, detector) = trace.into_replay(releases.clone());
    tracing::info!(frames = frames.len(), ?permission, "replay starting");

    let stats = match spawn_analyzer(permission, detector, liveness.clone()) {
        Ok((sender, analyzer)) => {
            for (at_ms, frame) in frames {
                tokio::time::sleep_until(start + Duration::from_millis(at_ms)).await;
                sender.offer(frame);
            }
            tokio::time::sleep(settle).await;

            let finished = tokio::task::spawn_blocking(move || analyzer.finish())
                .await
                .context("analysis thread join failed")?;
            finished.context("frame analysis failed")?
        }
        // Frames are never handed out, so there is nothing to release.
        Err(AnalyzerError::PermissionDenied) => AnalyzerStats::default(),
        Err(e) => return Err(e).context("failed to start frame analysis"),
    };

    // The last frame may have opened a window that is still running.
    let final_state = liveness
        .wait_idle()
        .await
        .context("liveness task exited before settling")?;
    drop(liveness);
    liveness_task.await.context("liveness task failed")?;
    observer.await.context("observer task failed")?;

    let released = releases.load(Ordering::Relaxed);
    if released != stats.offered {
        bail!(
            "frame leak: {} frame(s) offered but {released} released",
            stats.offered
        );
    }

    tracing::info!(
        offered = stats.offered,
        analyzed = stats.analyzed,
        dropped = stats.dropped,
        "replay complete"
    );

    Ok(ReplayReport {
        permission_granted: permission == CameraPermission::Granted,
        stats,
        released,
        final_state,
    })
}

/// Print the initial view, then every change until the liveness task exits.
async fn observe(mut rx: watch::Receiver<LivenessSnapshot>, start: Instant, json: bool) {
    let initial = *rx.borrow_and_update();
    println!("{}", render(0, &initial, json));

    while rx.changed().await.is_ok() {
        let snapshot = *rx.borrow_and_update();
        let at_ms = start.elapsed().as_millis() as u64;
        println!("{}", render(at_ms, &snapshot, json));
    }
}
