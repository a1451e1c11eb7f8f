//! Frame signal adapter: one frame in, one [`FrameSignal`] out.
//!
//! The adapter owns the frame for the duration of the call and returns it to
//! the frame source exactly once, whatever the detector does.

use thiserror::Error;

use crate::signal::{DetectedFace, FrameSignal};

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("frame has no image data")]
    MissingImage,
    #[error("unsupported frame format: {0}")]
    UnsupportedFormat(String),
    #[error("detection failed: {0}")]
    Failed(String),
}

/// Borrowed view of a frame's pixels.
#[derive(Debug, Clone, Copy)]
pub struct FrameImage<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub rotation_degrees: u32,
}

/// A frame handed out by the frame source.
///
/// The source's buffer pool is finite: every frame must be released exactly
/// once. Wrap frames in a [`FrameLease`] rather than calling `release`
/// directly.
pub trait Frame: Send {
    /// Pixel data, or `None` if the frame arrived without a usable image.
    fn image(&self) -> Option<FrameImage<'_>>;

    /// Return the frame's buffer to the source.
    fn release(&mut self);
}

/// Owns a frame and releases it on drop.
pub struct FrameLease<F: Frame> {
    frame: F,
}

impl<F: Frame> FrameLease<F> {
    pub fn new(frame: F) -> Self {
        Self { frame }
    }

    pub fn frame(&self) -> &F {
        &self.frame
    }
}

impl<F: Frame> Drop for FrameLease<F> {
    fn drop(&mut self) {
        self.frame.release();
    }
}

/// External face/eye detector.
///
/// Returns faces ordered by the detector's own ranking; only the first is
/// used downstream.
pub trait FaceDetector: Send {
    fn detect(&mut self, image: &FrameImage<'_>) -> Result<Vec<DetectedFace>, DetectorError>;
}

/// Run detection on one frame and normalize the result.
///
/// Detector failures and frames without image data become
/// [`FrameSignal::NoFace`] and are logged, never returned as errors.
pub fn analyze_frame<F, D>(detector: &mut D, frame: F) -> FrameSignal
where
    F: Frame,
    D: FaceDetector + ?Sized,
{
    analyze_leased(detector, FrameLease::new(frame))
}

/// Same as [`analyze_frame`] for a frame already under lease. The lease is
/// consumed, so the frame is released before this returns.
pub fn analyze_leased<F, D>(detector: &mut D, lease: FrameLease<F>) -> FrameSignal
where
    F: Frame,
    D: FaceDetector + ?Sized,
{
    let result = match lease.frame().image() {
        Some(image) => {
            tracing::trace!(
                width = image.width,
                height = image.height,
                rotation = image.rotation_degrees,
                "running face detection"
            );
            detector.detect(&image)
        }
        None => Err(DetectorError::MissingImage),
    };
    drop(lease);

    match result {
        Ok(faces) => {
            tracing::trace!(faces = faces.len(), "frame analysed");
            FrameSignal::from_faces(&faces)
        }
        Err(DetectorError::MissingImage) => {
            tracing::warn!("frame without image data — treating as no face");
            FrameSignal::NoFace
        }
        Err(e) => {
            tracing::error!(error = %e, "face detection failed");
            FrameSignal::NoFace
        }
    }
}
