//! Hand scale normalization
//!
//! The apparent size of a hand depends on how far it is from the camera.
//! `ScaleNormalizer` measures it and turns it into a scale factor
//! (`baseline / measured`) so sprites can be sized relative to the hand.

use serde::{Deserialize, Serialize};

use super::{HandError, HandObservation, LandmarkName};

/// Measured sizes below this many pixels are treated as degenerate
pub const MIN_MEASURED_SIZE: f32 = 1.0e-3;

/// How hand size is measured
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ScaleMethod {
    /// Longest side of the axis-aligned box around every landmark
    BoundingBox { baseline_hand_size: f32 },
    /// Distance between index and middle fingertips
    FingerDistance { baseline_finger_distance: f32 },
}

impl ScaleMethod {
    pub fn baseline(&self) -> f32 {
        match *self {
            ScaleMethod::BoundingBox { baseline_hand_size } => baseline_hand_size,
            ScaleMethod::FingerDistance {
                baseline_finger_distance,
            } => baseline_finger_distance,
        }
    }

    /// Same method with a different baseline
    pub fn with_baseline(self, baseline: f32) -> Self {
        match self {
            ScaleMethod::BoundingBox { .. } => ScaleMethod::BoundingBox {
                baseline_hand_size: baseline,
            },
            ScaleMethod::FingerDistance { .. } => ScaleMethod::FingerDistance {
                baseline_finger_distance: baseline,
            },
        }
    }
}

impl Default for ScaleMethod {
    fn default() -> Self {
        ScaleMethod::BoundingBox {
            baseline_hand_size: 100.0,
        }
    }
}

/// Size measurements for one hand
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandMetrics {
    /// Measured size in pixels
    pub size: f32,
    /// `baseline / size`, always finite and positive
    pub scale_factor: f32,
    /// Longest side of the landmark bounding box, whatever the method
    pub extent: f32,
}

/// Derives `HandMetrics` from observations with a fixed method
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScaleNormalizer {
    method: ScaleMethod,
}

impl ScaleNormalizer {
    pub fn new(method: ScaleMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> ScaleMethod {
        self.method
    }

    pub fn measure(&self, observation: &HandObservation) -> Result<HandMetrics, HandError> {
        let extent = bounding_box_size(observation);
        let size = match self.method {
            ScaleMethod::BoundingBox { .. } => extent,
            ScaleMethod::FingerDistance { .. } => finger_distance(observation)?,
        };
        let scale_factor = scale_factor(self.method.baseline(), size)?;
        Ok(HandMetrics {
            size,
            scale_factor,
            extent,
        })
    }
}

/// `baseline / size`, refusing sizes that would blow up the division
pub fn scale_factor(baseline: f32, size: f32) -> Result<f32, HandError> {
    if !size.is_finite() || size < MIN_MEASURED_SIZE {
        return Err(HandError::InvalidGeometry { measured: size });
    }
    Ok(baseline / size)
}

/// max(width, height) of the box around every landmark; 0 for an empty hand
fn bounding_box_size(observation: &HandObservation) -> f32 {
    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;

    for landmark in &observation.landmarks {
        min_x = min_x.min(landmark.x);
        min_y = min_y.min(landmark.y);
        max_x = max_x.max(landmark.x);
        max_y = max_y.max(landmark.y);
    }

    if observation.landmarks.is_empty() {
        return 0.0;
    }
    (max_x - min_x).max(max_y - min_y)
}

fn finger_distance(observation: &HandObservation) -> Result<f32, HandError> {
    let index = observation
        .find(LandmarkName::IndexFingerTip)
        .ok_or(HandError::MissingLandmark(LandmarkName::IndexFingerTip))?;
    let middle = observation
        .find(LandmarkName::MiddleFingerTip)
        .ok_or(HandError::MissingLandmark(LandmarkName::MiddleFingerTip))?;
    Ok(index.position().distance(middle.position()))
}
