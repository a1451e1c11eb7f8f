use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Both eye-open probabilities below this value count as a closed-eyes frame.
pub const DEFAULT_CLOSED_THRESHOLD: f32 = 0.1;
/// Both eye-open probabilities above this value count as an open-eyes frame.
pub const DEFAULT_OPEN_THRESHOLD: f32 = 0.8;
/// Delay from window open to the confirmation checkpoint.
pub const DEFAULT_CONFIRM_DELAY_MS: u64 = 1000;
/// Delay from the confirmation checkpoint to window close.
pub const DEFAULT_RELEASE_DELAY_MS: u64 = 2000;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("threshold {name} = {value} is outside [0, 1]")]
    ThresholdOutOfRange { name: &'static str, value: f32 },
    #[error("closed threshold {closed} must be below open threshold {open}")]
    ThresholdOrder { closed: f32, open: f32 },
    #[error("unknown confirmation sampling '{0}' (expected 'trigger' or 'checkpoint')")]
    UnknownSampling(String),
}

/// Which frame the eyes-open condition is read from at the confirmation checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationSampling {
    /// Use the frame that opened the window. That frame has closed eyes, so
    /// with sane thresholds the user is never confirmed.
    #[default]
    AtTrigger,
    /// Use the most recent face frame seen before the checkpoint fires.
    AtCheckpoint,
}

impl FromStr for ConfirmationSampling {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trigger" | "at_trigger" => Ok(Self::AtTrigger),
            "checkpoint" | "at_checkpoint" => Ok(Self::AtCheckpoint),
            other => Err(ConfigError::UnknownSampling(other.to_string())),
        }
    }
}

/// Thresholds and timing of the blink window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub closed_threshold: f32,
    pub open_threshold: f32,
    pub confirm_delay_ms: u64,
    pub release_delay_ms: u64,
    pub sampling: ConfirmationSampling,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            closed_threshold: DEFAULT_CLOSED_THRESHOLD,
            open_threshold: DEFAULT_OPEN_THRESHOLD,
            confirm_delay_ms: DEFAULT_CONFIRM_DELAY_MS,
            release_delay_ms: DEFAULT_RELEASE_DELAY_MS,
            sampling: ConfirmationSampling::default(),
        }
    }
}

impl LivenessConfig {
    pub fn confirm_delay(&self) -> Duration {
        Duration::from_millis(self.confirm_delay_ms)
    }

    pub fn release_delay(&self) -> Duration {
        Duration::from_millis(self.release_delay_ms)
    }

    /// Reject thresholds that would make the machine meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("closed_threshold", self.closed_threshold),
            ("open_threshold", self.open_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        if self.closed_threshold >= self.open_threshold {
            return Err(ConfigError::ThresholdOrder {
                closed: self.closed_threshold,
                open: self.open_threshold,
            });
        }
        Ok(())
    }
}
