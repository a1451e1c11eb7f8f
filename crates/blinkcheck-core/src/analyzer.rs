//! Frame analysis on a dedicated OS thread.
//!
//! The frame source pushes into a one-deep [`FrameSlot`]; a newer frame
//! replaces (and releases) an older one that has not been picked up yet. The
//! analysis thread takes one frame at a time, runs the detector, and hands
//! the resulting signal to the liveness task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use serde::Serialize;
use thiserror::Error;

use crate::adapter::{analyze_leased, FaceDetector, Frame, FrameLease};
use crate::service::LivenessHandle;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("camera permission denied — frame analysis disabled")]
    PermissionDenied,
    #[error("failed to spawn analysis thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("analysis thread panicked")]
    Panicked,
}

/// Outcome of the platform camera permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraPermission {
    Granted,
    Denied,
}

/// Frame counters, as seen by the slot and the analysis thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalyzerStats {
    pub offered: u64,
    pub dropped: u64,
    pub analyzed: u64,
}

#[derive(Default)]
struct Counters {
    offered: AtomicU64,
    dropped: AtomicU64,
    analyzed: AtomicU64,
}

impl Counters {
    fn stats(&self) -> AnalyzerStats {
        AnalyzerStats {
            offered: self.offered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            analyzed: self.analyzed.load(Ordering::Relaxed),
        }
    }
}

struct SlotState<F: Frame> {
    pending: Option<FrameLease<F>>,
    closed: bool,
}

/// Single-frame hand-off that keeps only the latest frame.
pub struct FrameSlot<F: Frame> {
    state: Mutex<SlotState<F>>,
    ready: Condvar,
    counters: Counters,
}

impl<F: Frame> FrameSlot<F> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                pending: None,
                closed: false,
            }),
            ready: Condvar::new(),
            counters: Counters::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<F>> {
        // Slot state stays consistent across a panic; keep going.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer a frame. Returns `false` if the slot is closed; the frame is
    /// released either way when it is not analysed.
    pub fn offer(&self, frame: F) -> bool {
        let lease = FrameLease::new(frame);
        self.counters.offered.fetch_add(1, Ordering::Relaxed);

        let replaced = {
            let mut state = self.lock();
            if state.closed {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            state.pending.replace(lease)
        };

        if replaced.is_some() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("analysis busy — dropped older frame");
        }
        // `replaced` is released here, outside the lock.
        drop(replaced);
        self.ready.notify_one();
        true
    }

    /// Block until a frame is available. A frame still waiting when the
    /// slot is closed is handed out; after that, `None`.
    pub fn take(&self) -> Option<FrameLease<F>> {
        let mut state = self.lock();
        loop {
            if let Some(lease) = state.pending.take() {
                return Some(lease);
            }
            if state.closed {
                return None;
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stop accepting frames. A frame already waiting is still analysed.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    /// Stop accepting frames and release any frame still waiting.
    pub fn discard(&self) {
        let pending = {
            let mut state = self.lock();
            state.closed = true;
            state.pending.take()
        };
        if pending.is_some() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        }
        drop(pending);
        self.ready.notify_all();
    }

    pub fn stats(&self) -> AnalyzerStats {
        self.counters.stats()
    }
}

impl<F: Frame> Default for FrameSlot<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer side handed to the frame source.
pub struct FrameSender<F: Frame> {
    slot: Arc<FrameSlot<F>>,
}

impl<F: Frame> Clone for FrameSender<F> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<F: Frame> FrameSender<F> {
    pub fn offer(&self, frame: F) -> bool {
        self.slot.offer(frame)
    }
}

/// Owner of the analysis thread.
pub struct Analyzer<F: Frame> {
    slot: Arc<FrameSlot<F>>,
    thread: JoinHandle<()>,
}

impl<F: Frame + 'static> Analyzer<F> {
    /// Stop accepting frames, analyse the one still waiting (if any), wait
    /// for the thread, and report counters.
    pub fn finish(self) -> Result<AnalyzerStats, AnalyzerError> {
        self.slot.close();
        self.thread.join().map_err(|_| AnalyzerError::Panicked)?;
        Ok(self.slot.stats())
    }
}

/// Start frame analysis.
///
/// With [`CameraPermission::Denied`] no thread is started and the liveness
/// task never receives a signal, leaving the verdict at "not live".
pub fn spawn_analyzer<F, D>(
    permission: CameraPermission,
    mut detector: D,
    liveness: LivenessHandle,
) -> Result<(FrameSender<F>, Analyzer<F>), AnalyzerError>
where
    F: Frame + 'static,
    D: FaceDetector + 'static,
{
    if permission == CameraPermission::Denied {
        tracing::error!("camera permission denied — analysis disabled");
        return Err(AnalyzerError::PermissionDenied);
    }

    let slot = Arc::new(FrameSlot::new());
    let worker_slot = slot.clone();

    let thread = std::thread::Builder::new()
        .name("blinkcheck-analyzer".into())
        .spawn(move || {
            tracing::info!("analysis thread started");
            while let Some(lease) = worker_slot.take() {
                let signal = analyze_leased(&mut detector, lease);
                worker_slot.counters.analyzed.fetch_add(1, Ordering::Relaxed);
                if liveness.blocking_submit(signal).is_err() {
                    tracing::warn!("liveness task gone — stopping analysis");
                    worker_slot.discard();
                    break;
                }
            }
            tracing::info!("analysis thread exiting");
        })?;

    Ok((FrameSender { slot: slot.clone() }, Analyzer { slot, thread }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::FrameImage;
    use std::sync::atomic::AtomicUsize;

    struct CountedFrame(Arc<AtomicUsize>);

    impl Frame for CountedFrame {
        fn image(&self) -> Option<FrameImage<'_>> {
            None
        }

        fn release(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn newer_frame_replaces_and_releases_older() {
        let slot = FrameSlot::new();
        let released = Arc::new(AtomicUsize::new(0));

        assert!(slot.offer(CountedFrame(released.clone())));
        assert!(slot.offer(CountedFrame(released.clone())));
        assert!(slot.offer(CountedFrame(released.clone())));
        assert_eq!(released.load(Ordering::SeqCst), 2);

        let lease = slot.take().unwrap();
        drop(lease);
        assert_eq!(released.load(Ordering::SeqCst), 3);

        let stats = slot.stats();
        assert_eq!(stats.offered, 3);
        assert_eq!(stats.dropped, 2);
    }

    #[test]
    fn discarded_slot_rejects_and_releases() {
        let slot = FrameSlot::new();
        let released = Arc::new(AtomicUsize::new(0));

        slot.offer(CountedFrame(released.clone()));
        slot.discard();
        assert_eq!(released.load(Ordering::SeqCst), 1);

        assert!(!slot.offer(CountedFrame(released.clone())));
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert!(slot.take().is_none());
        assert_eq!(slot.stats().dropped, 2);
    }

    #[test]
    fn closed_slot_still_hands_out_waiting_frame() {
        let slot = FrameSlot::new();
        let released = Arc::new(AtomicUsize::new(0));

        slot.offer(CountedFrame(released.clone()));
        slot.close();
        assert!(!slot.offer(CountedFrame(released.clone())));
        assert_eq!(released.load(Ordering::SeqCst), 1);

        let lease = slot.take();
        assert!(lease.is_some());
        drop(lease);
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert!(slot.take().is_none());

        let stats = slot.stats();
        assert_eq!(stats.offered, 2);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn take_wakes_on_offer_from_another_thread() {
        let slot = Arc::new(FrameSlot::new());
        let released = Arc::new(AtomicUsize::new(0));

        let producer = {
            let slot = slot.clone();
            let released = released.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                slot.offer(CountedFrame(released));
            })
        };

        let lease = slot.take();
        assert!(lease.is_some());
        producer.join().unwrap();
        drop(lease);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_wakes_waiting_taker() {
        let slot: Arc<FrameSlot<CountedFrame>> = Arc::new(FrameSlot::new());
        let closer = {
            let slot = slot.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                slot.close();
            })
        };
        assert!(slot.take().is_none());
        closer.join().unwrap();
    }
}
