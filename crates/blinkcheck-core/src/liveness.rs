//! Active liveness detection via a timed blink window.
//!
//! A closed-eyes frame opens a blink window. One confirmation delay later the
//! window is checked for open eyes; if the check passes the user is confirmed
//! live. One release delay after that the window closes unconditionally. A
//! frame without a face drops all progress immediately.
//!
//! [`LivenessMachine`] is the synchronous core: it never sleeps. The caller
//! schedules the two checkpoints for every [`BlinkWindow`] returned by
//! [`LivenessMachine::on_signal`] and feeds them back through
//! [`LivenessMachine::on_confirm_checkpoint`] and
//! [`LivenessMachine::on_release_checkpoint`]. See [`crate::service`] for the
//! tokio driver.
//!
//! # Stale checkpoints
//!
//! Checkpoints are not cancelled when a no-face frame resets the machine.
//! A stale release checkpoint can close a newer window early, and a stale
//! confirmation can still mark the user live after a reset.

use serde::Serialize;

use crate::config::{ConfirmationSampling, LivenessConfig};
use crate::signal::{EyeOpenness, FrameSignal};

/// Coarse state of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    BlinkWindowOpen,
}

/// The two liveness flags owned by the machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LivenessState {
    pub blink_pending: bool,
    pub user_confirmed_live: bool,
}

/// What an observer sees. Republished whenever any field changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LivenessSnapshot {
    pub face_detected: bool,
    pub blink_detected: bool,
    pub user_is_real: bool,
}

/// A blink window opened by a closed-eyes frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkWindow {
    /// Monotonic window number, for logs and stale-checkpoint detection.
    pub id: u64,
    /// Whether the triggering frame also satisfied the eyes-open condition.
    pub eyes_open_at_trigger: bool,
}

#[derive(Debug)]
pub struct LivenessMachine {
    config: LivenessConfig,
    face_detected: bool,
    open_window: Option<u64>,
    user_confirmed_live: bool,
    /// Most recent face frame; cleared by a no-face frame.
    last_eyes: Option<EyeOpenness>,
    next_window: u64,
}

impl LivenessMachine {
    pub fn new(config: LivenessConfig) -> Self {
        Self {
            config,
            face_detected: false,
            open_window: None,
            user_confirmed_live: false,
            last_eyes: None,
            next_window: 1,
        }
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        if self.open_window.is_some() {
            Phase::BlinkWindowOpen
        } else {
            Phase::Idle
        }
    }

    pub fn state(&self) -> LivenessState {
        LivenessState {
            blink_pending: self.open_window.is_some(),
            user_confirmed_live: self.user_confirmed_live,
        }
    }

    pub fn snapshot(&self) -> LivenessSnapshot {
        LivenessSnapshot {
            face_detected: self.face_detected,
            blink_detected: self.open_window.is_some(),
            user_is_real: self.user_confirmed_live,
        }
    }

    /// Apply one frame signal.
    ///
    /// Returns the newly opened window, if this frame opened one. The caller
    /// must schedule both checkpoints for it.
    pub fn on_signal(&mut self, signal: FrameSignal) -> Option<BlinkWindow> {
        match signal {
            FrameSignal::NoFace => {
                if self.open_window.is_some() || self.user_confirmed_live {
                    tracing::info!(
                        window = ?self.open_window,
                        was_live = self.user_confirmed_live,
                        "face lost — liveness reset"
                    );
                }
                self.face_detected = false;
                self.open_window = None;
                self.user_confirmed_live = false;
                self.last_eyes = None;
                None
            }
            FrameSignal::Face(eyes) => {
                self.face_detected = true;
                self.last_eyes = Some(eyes);

                if !eyes.both_below(self.config.closed_threshold) || self.open_window.is_some() {
                    return None;
                }

                let window = BlinkWindow {
                    id: self.next_window,
                    eyes_open_at_trigger: eyes.both_above(self.config.open_threshold),
                };
                self.next_window += 1;
                self.open_window = Some(window.id);
                tracing::info!(
                    window = window.id,
                    left = eyes.left,
                    right = eyes.right,
                    "eyes closed — blink window opened"
                );
                Some(window)
            }
        }
    }

    /// First checkpoint: confirm the user if the eyes-open condition holds.
    pub fn on_confirm_checkpoint(&mut self, window: &BlinkWindow) {
        let eyes_open = match self.config.sampling {
            ConfirmationSampling::AtTrigger => window.eyes_open_at_trigger,
            ConfirmationSampling::AtCheckpoint => self
                .last_eyes
                .is_some_and(|eyes| eyes.both_above(self.config.open_threshold)),
        };

        if !eyes_open {
            tracing::debug!(window = window.id, "confirmation checkpoint: eyes not open");
            return;
        }

        if self.open_window != Some(window.id) {
            tracing::debug!(
                window = window.id,
                current = ?self.open_window,
                "confirmation checkpoint fired for a window no longer open"
            );
        }
        if !self.user_confirmed_live {
            tracing::info!(window = window.id, "user confirmed live");
        }
        self.user_confirmed_live = true;
    }

    /// Second checkpoint: close whatever window is open.
    pub fn on_release_checkpoint(&mut self, window: &BlinkWindow) {
        match self.open_window.take() {
            Some(current) if current == window.id => {
                tracing::debug!(window = window.id, "blink window closed");
            }
            Some(current) => {
                tracing::debug!(
                    window = window.id,
                    closed = current,
                    "stale release checkpoint closed a newer window"
                );
            }
            None => {}
        }
    }
}

impl Default for LivenessMachine {
    fn default() -> Self {
        Self::new(LivenessConfig::default())
    }
}
