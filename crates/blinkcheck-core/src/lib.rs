//! Blink-based liveness checking.
//!
//! Frames flow from a frame source into the [`analyzer`], which runs an
//! external [`FaceDetector`] and turns each result into a [`FrameSignal`].
//! The [`service`] task feeds those signals to the [`LivenessMachine`] and
//! publishes a [`LivenessSnapshot`] to observers.

pub mod adapter;
pub mod analyzer;
pub mod config;
pub mod liveness;
pub mod service;
pub mod signal;

pub use adapter::{analyze_frame, DetectorError, FaceDetector, Frame, FrameImage, FrameLease};
pub use analyzer::{spawn_analyzer, Analyzer, AnalyzerError, AnalyzerStats, CameraPermission, FrameSender};
pub use config::{ConfigError, ConfirmationSampling, LivenessConfig};
pub use liveness::{BlinkWindow, LivenessMachine, LivenessSnapshot, LivenessState, Phase};
pub use service::{spawn_liveness, LivenessHandle, ServiceError};
pub use signal::{DetectedFace, EyeOpenness, FrameSignal, UNKNOWN_PROBABILITY};
