//! Tokio driver for [`LivenessMachine`].
//!
//! The machine lives on a single owner task. Frame signals arrive over a
//! channel, blink-window timers run as child tasks that post their
//! checkpoints back to the owner, and every state change is published on a
//! `watch` channel. Callers can also wait for the machine to go idle, which
//! resolves once every signal queued before the request has been applied and
//! no blink window is open. Nothing outside the owner task touches the
//! machine, so no lock guards it. When the owner task ends (all handles
//! dropped, or the task aborted) its pending timers are cancelled with it.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::LivenessConfig;
use crate::liveness::{BlinkWindow, LivenessMachine, LivenessSnapshot, Phase};
use crate::signal::FrameSignal;

/// Requests queued ahead of the owner task before `submit` waits.
const REQUEST_QUEUE_DEPTH: usize = 8;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ServiceError {
    #[error("liveness task exited")]
    ChannelClosed,
}

/// Messages sent from handles to the owner task.
enum LivenessRequest {
    Signal(FrameSignal),
    WaitIdle {
        reply: oneshot::Sender<LivenessSnapshot>,
    },
}

enum Checkpoint {
    Confirm(BlinkWindow),
    Release(BlinkWindow),
}

/// Clone-safe handle to the liveness task.
#[derive(Clone)]
pub struct LivenessHandle {
    requests: mpsc::Sender<LivenessRequest>,
    snapshot: watch::Receiver<LivenessSnapshot>,
}

impl LivenessHandle {
    /// Queue a frame signal for the owner task.
    pub async fn submit(&self, signal: FrameSignal) -> Result<(), ServiceError> {
        self.requests
            .send(LivenessRequest::Signal(signal))
            .await
            .map_err(|_| ServiceError::ChannelClosed)
    }

    /// Queue a frame signal from a non-async thread.
    ///
    /// Panics if called from within an async execution context.
    pub fn blocking_submit(&self, signal: FrameSignal) -> Result<(), ServiceError> {
        self.requests
            .blocking_send(LivenessRequest::Signal(signal))
            .map_err(|_| ServiceError::ChannelClosed)
    }

    /// Wait until all signals submitted so far are applied and no blink
    /// window is open, then return the view at that point.
    pub async fn wait_idle(&self) -> Result<LivenessSnapshot, ServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(LivenessRequest::WaitIdle { reply: reply_tx })
            .await
            .map_err(|_| ServiceError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ServiceError::ChannelClosed)
    }

    /// Current observer view.
    pub fn snapshot(&self) -> LivenessSnapshot {
        *self.snapshot.borrow()
    }

    /// Receiver that is notified whenever the observer view changes.
    pub fn subscribe(&self) -> watch::Receiver<LivenessSnapshot> {
        self.snapshot.clone()
    }
}

/// Spawn the liveness owner task on the current tokio runtime.
pub fn spawn_liveness(config: LivenessConfig) -> (LivenessHandle, JoinHandle<()>) {
    let machine = LivenessMachine::new(config);
    let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
    let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());

    let task = tokio::spawn(run(machine, request_rx, snapshot_tx));

    (
        LivenessHandle {
            requests: request_tx,
            snapshot: snapshot_rx,
        },
        task,
    )
}

async fn run(
    mut machine: LivenessMachine,
    mut requests: mpsc::Receiver<LivenessRequest>,
    publisher: watch::Sender<LivenessSnapshot>,
) {
    let (checkpoint_tx, mut checkpoints) = mpsc::unbounded_channel::<Checkpoint>();
    let mut timers = JoinSet::new();
    let mut idle_waiters: Vec<oneshot::Sender<LivenessSnapshot>> = Vec::new();
    let confirm_delay = machine.config().confirm_delay();
    let release_delay = machine.config().release_delay();

    tracing::debug!("liveness task started");

    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(LivenessRequest::Signal(signal)) => {
                    if let Some(window) = machine.on_signal(signal) {
                        timers.spawn(blink_timer(
                            window,
                            confirm_delay,
                            release_delay,
                            checkpoint_tx.clone(),
                        ));
                    }
                }
                Some(LivenessRequest::WaitIdle { reply }) => idle_waiters.push(reply),
                None => break,
            },
            Some(checkpoint) = checkpoints.recv() => match checkpoint {
                Checkpoint::Confirm(window) => machine.on_confirm_checkpoint(&window),
                Checkpoint::Release(window) => machine.on_release_checkpoint(&window),
            },
            Some(_) = timers.join_next(), if !timers.is_empty() => continue,
        }

        let snapshot = machine.snapshot();
        publisher.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });

        if machine.phase() == Phase::Idle && !idle_waiters.is_empty() {
            for reply in idle_waiters.drain(..) {
                let _ = reply.send(snapshot);
            }
        }
    }

    if !timers.is_empty() {
        tracing::debug!(pending = timers.len(), "cancelling blink timers");
    }
    timers.shutdown().await;
    tracing::debug!("liveness task exiting");
}

/// Both checkpoints of one blink window, in order.
async fn blink_timer(
    window: BlinkWindow,
    confirm_delay: Duration,
    release_delay: Duration,
    checkpoints: mpsc::UnboundedSender<Checkpoint>,
) {
    tokio::time::sleep(confirm_delay).await;
    if checkpoints.send(Checkpoint::Confirm(window)).is_err() {
        return;
    }
    tokio::time::sleep(release_delay).await;
    let _ = checkpoints.send(Checkpoint::Release(window));
}
