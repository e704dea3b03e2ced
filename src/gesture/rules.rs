//! Rule-based gesture classification
//!
//! Each gesture is a conjunction of geometric predicates over the ten
//! fingertip/knuckle points. Predicates are tried in priority order and the
//! first match wins:
//!
//! 1. Peace sign
//! 2. Cheek heart
//! 3. Finger heart
//!
//! Screen y grows downwards, so "above" means a smaller y.
//!
//! Thresholds are given in pixels for a hand whose landmark bounding box has
//! a longest side of `reference_hand_size`. With `normalize_thresholds` on
//! they are stretched by `extent / reference`, so the verdict does not depend
//! on camera resolution, hand distance or the sprite scale method. With it
//! off, pixel thresholds are used as-is and only the finger-heart distance is
//! multiplied by the scale factor.

use serde::{Deserialize, Serialize};

use super::{Gesture, GestureError, GestureStrategy};
use crate::camera::VideoFrame;
use crate::hand::{FingerLandmarks, HandMetrics, Handedness, MeasuredHand, Point};

/// Predicate thresholds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleThresholds {
    /// How far above its knuckle a tip must be to count as extended
    pub extension_px: f32,
    /// Maximum spread between fingertips that count as aligned
    pub alignment_px: f32,
    /// Maximum thumb-to-index distance for a finger heart
    pub finger_heart_distance_px: f32,
    /// Bounding-box extent the pixel thresholds were tuned for
    pub reference_hand_size: f32,
    /// Scale every threshold by the measured hand size
    pub normalize_thresholds: bool,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            extension_px: 40.0,
            alignment_px: 20.0,
            finger_heart_distance_px: 150.0,
            reference_hand_size: 100.0,
            normalize_thresholds: true,
        }
    }
}

/// Thresholds resolved for one particular hand
#[derive(Clone, Copy, Debug, PartialEq)]
struct Limits {
    extension: f32,
    alignment: f32,
    finger_heart_distance: f32,
}

impl RuleThresholds {
    fn limits_for(&self, metrics: &HandMetrics) -> Limits {
        if self.normalize_thresholds {
            let units = metrics.extent / self.reference_hand_size;
            Limits {
                extension: self.extension_px * units,
                alignment: self.alignment_px * units,
                finger_heart_distance: self.finger_heart_distance_px * units,
            }
        } else {
            Limits {
                extension: self.extension_px,
                alignment: self.alignment_px,
                finger_heart_distance: self.finger_heart_distance_px * metrics.scale_factor,
            }
        }
    }
}

/// Deterministic classifier over landmark geometry
#[derive(Clone, Debug, Default)]
pub struct RuleBasedClassifier {
    thresholds: RuleThresholds,
}

impl RuleBasedClassifier {
    pub fn new(thresholds: RuleThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &RuleThresholds {
        &self.thresholds
    }

    /// Gesture for one hand, or `None` when no predicate holds
    pub fn classify_hand(&self, hand: &MeasuredHand) -> Option<Gesture> {
        let limits = self.thresholds.limits_for(&hand.metrics);
        let fingers = &hand.fingers;

        if is_peace_sign(fingers, &limits) {
            Some(Gesture::PeaceSign)
        } else if is_cheek_heart(fingers, &limits) {
            Some(Gesture::CheekHeart)
        } else if is_finger_heart(fingers, hand.handedness, &limits) {
            Some(Gesture::FingerHeart)
        } else {
            None
        }
    }
}

impl GestureStrategy for RuleBasedClassifier {
    fn name(&self) -> &'static str {
        "rule-based"
    }

    async fn prepare(&mut self) -> Result<(), GestureError> {
        Ok(())
    }

    async fn classify(
        &mut self,
        _frame: &VideoFrame,
        hands: &[MeasuredHand],
    ) -> Result<Vec<Option<Gesture>>, GestureError> {
        Ok(hands.iter().map(|hand| self.classify_hand(hand)).collect())
    }

    fn release(&mut self) {}
}

fn is_bent(tip: Point, mcp: Point) -> bool {
    tip.y > mcp.y
}

fn is_extended(tip: Point, mcp: Point, limits: &Limits) -> bool {
    mcp.y - tip.y > limits.extension
}

fn is_peace_sign(f: &FingerLandmarks, limits: &Limits) -> bool {
    is_bent(f.thumb_tip, f.thumb_mcp)
        && is_extended(f.index_tip, f.index_mcp, limits)
        && is_extended(f.middle_tip, f.middle_mcp, limits)
        && is_bent(f.ring_tip, f.ring_mcp)
        && is_bent(f.pinky_tip, f.pinky_mcp)
}

fn is_cheek_heart(f: &FingerLandmarks, limits: &Limits) -> bool {
    let tips = f.finger_tips();
    if !tips.iter().all(|tip| f.thumb_tip.y > tip.y) {
        return false;
    }

    tips.iter().enumerate().all(|(i, a)| {
        tips[i + 1..].iter().all(|b| {
            (a.x - b.x).abs() < limits.alignment && (a.y - b.y).abs() < limits.alignment
        })
    })
}

fn is_finger_heart(f: &FingerLandmarks, handedness: Handedness, limits: &Limits) -> bool {
    if f.thumb_tip.distance(f.index_tip) >= limits.finger_heart_distance {
        return false;
    }

    let thumb_outside = match handedness {
        Handedness::Right => f.thumb_tip.x > f.index_tip.x,
        Handedness::Left => f.thumb_tip.x < f.index_tip.x,
    };
    if !thumb_outside {
        return false;
    }

    let aligned_x = [f.middle_tip, f.ring_tip, f.pinky_tip]
        .iter()
        .all(|tip| (f.index_tip.x - tip.x).abs() < limits.alignment);

    aligned_x && f.middle_tip.y < f.ring_tip.y && f.ring_tip.y < f.pinky_tip.y
}
