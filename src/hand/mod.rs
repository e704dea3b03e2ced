//! Hand observation data model
//!
//! A `HandObservation` is what the landmark detector produces for one hand in
//! one frame. Coordinates are pixels in the unmirrored frame, with y growing
//! downwards. Nothing here survives past the frame it was produced for.

pub mod landmarks;
pub mod scale;

use serde::{Deserialize, Serialize};

pub use landmarks::FingerLandmarks;
pub use scale::{HandMetrics, ScaleMethod, ScaleNormalizer};

/// 2D point in frame pixel space
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn midpoint(&self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Landmark vocabulary of the 21-point hand model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkName {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyFingerMcp,
    PinkyFingerPip,
    PinkyFingerDip,
    PinkyFingerTip,
}

impl LandmarkName {
    /// All names in detector output order (index 0 = wrist, 4 = thumb tip, ...)
    pub const ALL: [LandmarkName; 21] = [
        LandmarkName::Wrist,
        LandmarkName::ThumbCmc,
        LandmarkName::ThumbMcp,
        LandmarkName::ThumbIp,
        LandmarkName::ThumbTip,
        LandmarkName::IndexFingerMcp,
        LandmarkName::IndexFingerPip,
        LandmarkName::IndexFingerDip,
        LandmarkName::IndexFingerTip,
        LandmarkName::MiddleFingerMcp,
        LandmarkName::MiddleFingerPip,
        LandmarkName::MiddleFingerDip,
        LandmarkName::MiddleFingerTip,
        LandmarkName::RingFingerMcp,
        LandmarkName::RingFingerPip,
        LandmarkName::RingFingerDip,
        LandmarkName::RingFingerTip,
        LandmarkName::PinkyFingerMcp,
        LandmarkName::PinkyFingerPip,
        LandmarkName::PinkyFingerDip,
        LandmarkName::PinkyFingerTip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wrist => "wrist",
            Self::ThumbCmc => "thumb_cmc",
            Self::ThumbMcp => "thumb_mcp",
            Self::ThumbIp => "thumb_ip",
            Self::ThumbTip => "thumb_tip",
            Self::IndexFingerMcp => "index_finger_mcp",
            Self::IndexFingerPip => "index_finger_pip",
            Self::IndexFingerDip => "index_finger_dip",
            Self::IndexFingerTip => "index_finger_tip",
            Self::MiddleFingerMcp => "middle_finger_mcp",
            Self::MiddleFingerPip => "middle_finger_pip",
            Self::MiddleFingerDip => "middle_finger_dip",
            Self::MiddleFingerTip => "middle_finger_tip",
            Self::RingFingerMcp => "ring_finger_mcp",
            Self::RingFingerPip => "ring_finger_pip",
            Self::RingFingerDip => "ring_finger_dip",
            Self::RingFingerTip => "ring_finger_tip",
            Self::PinkyFingerMcp => "pinky_finger_mcp",
            Self::PinkyFingerPip => "pinky_finger_pip",
            Self::PinkyFingerDip => "pinky_finger_dip",
            Self::PinkyFingerTip => "pinky_finger_tip",
        }
    }
}

impl std::fmt::Display for LandmarkName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single named point on a detected hand
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub name: LandmarkName,
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub const fn new(name: LandmarkName, x: f32, y: f32) -> Self {
        Self { name, x, y }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Which hand the detector believes it saw
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

/// One detected hand for one frame
#[derive(Clone, Debug, PartialEq)]
pub struct HandObservation {
    /// Landmarks in no particular order
    pub landmarks: Vec<Landmark>,
    pub handedness: Handedness,
    /// Detector confidence (0.0-1.0)
    pub score: f32,
}

impl HandObservation {
    pub fn new(landmarks: Vec<Landmark>, handedness: Handedness, score: f32) -> Self {
        Self {
            landmarks,
            handedness,
            score,
        }
    }

    /// First landmark with the given name
    pub fn find(&self, name: LandmarkName) -> Option<&Landmark> {
        self.landmarks.iter().find(|landmark| landmark.name == name)
    }

    /// Same hand with every coordinate multiplied by `factor`
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            landmarks: self
                .landmarks
                .iter()
                .map(|l| Landmark::new(l.name, l.x * factor, l.y * factor))
                .collect(),
            handedness: self.handedness,
            score: self.score,
        }
    }
}

/// Per-hand failures. These never stop the frame loop, the hand is skipped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandError {
    #[error("landmark `{0}` missing from observation")]
    MissingLandmark(LandmarkName),
    #[error("hand geometry is degenerate (measured size {measured})")]
    InvalidGeometry { measured: f32 },
}

/// A hand that has been indexed and measured, ready for classification
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeasuredHand {
    pub handedness: Handedness,
    pub fingers: FingerLandmarks,
    pub metrics: HandMetrics,
}

impl MeasuredHand {
    pub fn from_observation(
        observation: &HandObservation,
        normalizer: &ScaleNormalizer,
    ) -> Result<Self, HandError> {
        let fingers = FingerLandmarks::from_observation(observation)?;
        let metrics = normalizer.measure(observation)?;
        Ok(Self {
            handedness: observation.handedness,
            fingers,
            metrics,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_names_follow_detector_order() {
        assert_eq!(LandmarkName::ALL[0], LandmarkName::Wrist);
        assert_eq!(LandmarkName::ALL[4], LandmarkName::ThumbTip);
        assert_eq!(LandmarkName::ALL[8], LandmarkName::IndexFingerTip);
        assert_eq!(LandmarkName::ALL[17], LandmarkName::PinkyFingerMcp);
        assert_eq!(LandmarkName::ALL[20].as_str(), "pinky_finger_tip");
    }

    #[test]
    fn test_landmark_name_serde_uses_detector_names() {
        let json = serde_json::to_string(&LandmarkName::MiddleFingerMcp).unwrap();
        assert_eq!(json, "\"middle_finger_mcp\"");
    }

    #[test]
    fn test_point_midpoint_and_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(6.0, 8.0);
        assert_eq!(a.distance(b), 10.0);
        assert_eq!(a.midpoint(b), Point::new(3.0, 4.0));
    }

    #[test]
    fn test_scaled_observation_keeps_names() {
        let hand = HandObservation::new(
            vec![Landmark::new(LandmarkName::ThumbTip, 10.0, 20.0)],
            Handedness::Left,
            0.9,
        );
        let doubled = hand.scaled(2.0);
        let tip = doubled.find(LandmarkName::ThumbTip).unwrap();
        assert_eq!((tip.x, tip.y), (20.0, 40.0));
        assert_eq!(doubled.handedness, Handedness::Left);
    }
}
