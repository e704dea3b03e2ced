//! Named fingertip and knuckle lookup
//!
//! Gesture predicates only ever look at ten points: the tip and the MCP
//! (knuckle) joint of each finger. `FingerLandmarks` pulls them out of an
//! unordered observation once, so the predicates work on plain fields.

use super::{HandError, HandObservation, LandmarkName, Point};

/// Tip and MCP joint of every finger
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FingerLandmarks {
    pub thumb_tip: Point,
    pub thumb_mcp: Point,
    pub index_tip: Point,
    pub index_mcp: Point,
    pub middle_tip: Point,
    pub middle_mcp: Point,
    pub ring_tip: Point,
    pub ring_mcp: Point,
    pub pinky_tip: Point,
    pub pinky_mcp: Point,
}

impl FingerLandmarks {
    /// Landmarks the gesture predicates depend on
    pub const REQUIRED: [LandmarkName; 10] = [
        LandmarkName::ThumbTip,
        LandmarkName::ThumbMcp,
        LandmarkName::IndexFingerTip,
        LandmarkName::IndexFingerMcp,
        LandmarkName::MiddleFingerTip,
        LandmarkName::MiddleFingerMcp,
        LandmarkName::RingFingerTip,
        LandmarkName::RingFingerMcp,
        LandmarkName::PinkyFingerTip,
        LandmarkName::PinkyFingerMcp,
    ];

    /// Index the observation. Fails on the first required name that is absent.
    pub fn from_observation(observation: &HandObservation) -> Result<Self, HandError> {
        let get = |name: LandmarkName| {
            observation
                .find(name)
                .map(|landmark| landmark.position())
                .ok_or(HandError::MissingLandmark(name))
        };

        Ok(Self {
            thumb_tip: get(LandmarkName::ThumbTip)?,
            thumb_mcp: get(LandmarkName::ThumbMcp)?,
            index_tip: get(LandmarkName::IndexFingerTip)?,
            index_mcp: get(LandmarkName::IndexFingerMcp)?,
            middle_tip: get(LandmarkName::MiddleFingerTip)?,
            middle_mcp: get(LandmarkName::MiddleFingerMcp)?,
            ring_tip: get(LandmarkName::RingFingerTip)?,
            ring_mcp: get(LandmarkName::RingFingerMcp)?,
            pinky_tip: get(LandmarkName::PinkyFingerTip)?,
            pinky_mcp: get(LandmarkName::PinkyFingerMcp)?,
        })
    }

    /// Tips of the four non-thumb fingers, index first
    pub fn finger_tips(&self) -> [Point; 4] {
        [self.index_tip, self.middle_tip, self.ring_tip, self.pinky_tip]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::fixtures;
    use crate::hand::Handedness;

    #[test]
    fn test_index_finds_named_points_in_any_order() {
        let mut hand = fixtures::peace_sign(Handedness::Right);
        hand.landmarks.reverse();

        let fingers = FingerLandmarks::from_observation(&hand).unwrap();
        assert_eq!(fingers.thumb_tip, Point::new(100.0, 200.0));
        assert_eq!(fingers.middle_tip, Point::new(140.0, 45.0));
        assert_eq!(fingers.pinky_mcp, Point::new(180.0, 130.0));
    }

    #[test]
    fn test_missing_landmark_is_reported_by_name() {
        let mut hand = fixtures::peace_sign(Handedness::Right);
        hand.landmarks
            .retain(|landmark| landmark.name != LandmarkName::RingFingerMcp);

        let err = FingerLandmarks::from_observation(&hand).unwrap_err();
        assert_eq!(err, HandError::MissingLandmark(LandmarkName::RingFingerMcp));
    }

    #[test]
    fn test_extra_landmarks_are_ignored() {
        let mut hand = fixtures::peace_sign(Handedness::Left);
        hand.landmarks
            .push(crate::hand::Landmark::new(LandmarkName::Wrist, 0.0, 0.0));
        assert!(FingerLandmarks::from_observation(&hand).is_ok());
    }
}
