//! Recorded detection traces, replayed in place of a live camera.
//!
//! ```toml
//! camera_permission = "granted"
//! settle_ms = 3500
//!
//! [[frame]]
//! at_ms = 0
//! faces = [{ left = 0.92, right = 0.95 }]
//!
//! [[frame]]
//! at_ms = 120
//! error = "vision service unavailable"
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use blinkcheck_core::{CameraPermission, DetectedFace, DetectorError, FaceDetector, Frame, FrameImage};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("failed to read trace {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse trace: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("frame {index}: at_ms {at_ms} is earlier than the previous frame ({previous})")]
    OutOfOrder { index: usize, at_ms: u64, previous: u64 },
    #[error("frame {index}: only one of faces, error, unsupported_format, missing_image may be set")]
    Conflicting { index: usize },
    #[error("trace has {0} frames; at most {max} are supported", max = u32::MAX)]
    TooLong(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionSetting {
    #[default]
    Granted,
    Denied,
}

impl From<PermissionSetting> for CameraPermission {
    fn from(setting: PermissionSetting) -> Self {
        match setting {
            PermissionSetting::Granted => CameraPermission::Granted,
            PermissionSetting::Denied => CameraPermission::Denied,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrameSpec {
    pub at_ms: u64,
    #[serde(default)]
    pub faces: Vec<DetectedFace>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub unsupported_format: Option<String>,
    #[serde(default)]
    pub missing_image: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Trace {
    #[serde(default)]
    pub camera_permission: PermissionSetting,
    /// Overrides the configured settle time for this trace.
    pub settle_ms: Option<u64>,
    #[serde(default, rename = "frame")]
    pub frames: Vec<FrameSpec>,
}

impl Trace {
    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let text = std::fs::read_to_string(path).map_err(|source| TraceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, TraceError> {
        let trace: Trace = toml::from_str(text)?;
        trace.validate()?;
        Ok(trace)
    }

    fn validate(&self) -> Result<(), TraceError> {
        if u32::try_from(self.frames.len()).is_err() {
            return Err(TraceError::TooLong(self.frames.len()));
        }

        let mut previous = 0;
        for (index, frame) in self.frames.iter().enumerate() {
            if frame.at_ms < previous {
                return Err(TraceError::OutOfOrder {
                    index,
                    at_ms: frame.at_ms,
                    previous,
                });
            }
            previous = frame.at_ms;

            let set = [
                !frame.faces.is_empty(),
                frame.error.is_some(),
                frame.unsupported_format.is_some(),
                frame.missing_image,
            ];
            if set.iter().filter(|s| **s).count() > 1 {
                return Err(TraceError::Conflicting { index });
            }
        }
        Ok(())
    }

    /// Split into the frames to offer and the detector that answers for them.
    pub fn into_replay(self, releases: Arc<AtomicU64>) -> (Vec<(u64, TraceFrame)>, TraceDetector) {
        let mut frames = Vec::with_capacity(self.frames.len());
        let mut outcomes = Vec::with_capacity(self.frames.len());

        for (index, entry) in self.frames.into_iter().enumerate() {
            // Length checked in `validate`.
            let index = index as u32;
            frames.push((
                entry.at_ms,
                TraceFrame {
                    key: index.to_le_bytes(),
                    has_image: !entry.missing_image,
                    releases: releases.clone(),
                },
            ));
            outcomes.push(match (entry.error, entry.unsupported_format) {
                (Some(message), _) => Outcome::Failed(message),
                (None, Some(format)) => Outcome::Unsupported(format),
                (None, None) => Outcome::Faces(entry.faces),
            });
        }

        (frames, TraceDetector { outcomes })
    }
}

/// A replayed frame. Its image bytes are the frame's index in the trace.
pub struct TraceFrame {
    key: [u8; 4],
    has_image: bool,
    releases: Arc<AtomicU64>,
}

impl Frame for TraceFrame {
    fn image(&self) -> Option<FrameImage<'_>> {
        self.has_image.then(|| FrameImage {
            data: self.key.as_slice(),
            width: 1,
            height: 1,
            rotation_degrees: 0,
        })
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
enum Outcome {
    Faces(Vec<DetectedFace>),
    Failed(String),
    Unsupported(String),
}

/// Answers each trace frame with its recorded detection result.
pub struct TraceDetector {
    outcomes: Vec<Outcome>,
}

impl FaceDetector for TraceDetector {
    fn detect(&mut self, image: &FrameImage<'_>) -> Result<Vec<DetectedFace>, DetectorError> {
        let key: [u8; 4] = image
            .data
            .try_into()
            .map_err(|_| DetectorError::UnsupportedFormat("not a trace frame".into()))?;
        let index = u32::from_le_bytes(key) as usize;

        match self.outcomes.get(index) {
            Some(Outcome::Faces(faces)) => Ok(faces.clone()),
            Some(Outcome::Failed(message)) => Err(DetectorError::Failed(message.clone())),
            Some(Outcome::Unsupported(format)) => {
                Err(DetectorError::UnsupportedFormat(format.clone()))
            }
            None => Err(DetectorError::Failed(format!("no recorded result for frame {index}"))),
        }
    }
}
