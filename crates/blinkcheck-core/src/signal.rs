//! Per-frame eye-openness signals.

use serde::Deserialize;

/// Sentinel for an eye-open probability the detector could not estimate.
pub const UNKNOWN_PROBABILITY: f32 = -1.0;

/// One face as reported by the external detector.
///
/// Eye-open probabilities are `None` when the detector ran without
/// classification or could not see the eye.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct DetectedFace {
    #[serde(default, rename = "left")]
    pub left_eye_open_probability: Option<f32>,
    #[serde(default, rename = "right")]
    pub right_eye_open_probability: Option<f32>,
}

impl DetectedFace {
    pub fn new(left: Option<f32>, right: Option<f32>) -> Self {
        Self {
            left_eye_open_probability: left,
            right_eye_open_probability: right,
        }
    }
}

/// Eye-open probabilities of the primary face, in `[-1, 1]` with `-1` unknown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeOpenness {
    pub left: f32,
    pub right: f32,
}

impl EyeOpenness {
    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    /// Both eyes strictly below `threshold`.
    pub fn both_below(&self, threshold: f32) -> bool {
        self.left < threshold && self.right < threshold
    }

    /// Both eyes strictly above `threshold`.
    pub fn both_above(&self, threshold: f32) -> bool {
        self.left > threshold && self.right > threshold
    }
}

impl From<&DetectedFace> for EyeOpenness {
    fn from(face: &DetectedFace) -> Self {
        Self {
            left: face
                .left_eye_open_probability
                .unwrap_or(UNKNOWN_PROBABILITY),
            right: face
                .right_eye_open_probability
                .unwrap_or(UNKNOWN_PROBABILITY),
        }
    }
}

/// Normalized result of analysing one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameSignal {
    /// No face, a failed detection, or an unusable frame.
    NoFace,
    /// A face was found; carries the first face's eye openness.
    Face(EyeOpenness),
}

impl FrameSignal {
    /// Build a signal from the detector's ordered face list.
    ///
    /// Only the first face is consulted; additional faces are ignored.
    pub fn from_faces(faces: &[DetectedFace]) -> Self {
        match faces.first() {
            Some(face) => FrameSignal::Face(face.into()),
            None => FrameSignal::NoFace,
        }
    }

    pub fn face_detected(&self) -> bool {
        matches!(self, FrameSignal::Face(_))
    }

    pub fn eyes(&self) -> Option<EyeOpenness> {
        match self {
            FrameSignal::Face(eyes) => Some(*eyes),
            FrameSignal::NoFace => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_face_list_is_no_face() {
        assert_eq!(FrameSignal::from_faces(&[]), FrameSignal::NoFace);
    }

    #[test]
    fn only_first_face_is_used() {
        let faces = [
            DetectedFace::new(Some(0.05), Some(0.02)),
            DetectedFace::new(Some(0.95), Some(0.97)),
        ];
        let signal = FrameSignal::from_faces(&faces);
        assert_eq!(signal, FrameSignal::Face(EyeOpenness::new(0.05, 0.02)));
    }

    #[test]
    fn missing_probability_maps_to_unknown() {
        let faces = [DetectedFace::new(None, Some(0.5))];
        let eyes = FrameSignal::from_faces(&faces).eyes().unwrap();
        assert_eq!(eyes.left, UNKNOWN_PROBABILITY);
        assert_eq!(eyes.right, 0.5);
    }

    #[test]
    fn unknown_counts_as_closed() {
        // -1 sits below any closed threshold; the detector gives no better signal.
        let eyes = EyeOpenness::new(UNKNOWN_PROBABILITY, UNKNOWN_PROBABILITY);
        assert!(eyes.both_below(0.1));
        assert!(!eyes.both_above(0.8));
    }

    #[test]
    fn thresholds_are_strict() {
        let eyes = EyeOpenness::new(0.1, 0.8);
        assert!(!eyes.both_below(0.1));
        assert!(!eyes.both_above(0.8));
    }
}
