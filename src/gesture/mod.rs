//! Gesture classification
//!
//! Two interchangeable strategies turn a frame's measured hands into
//! per-hand gestures:
//! - `RuleBasedClassifier` - geometric predicates on fingertip/knuckle positions
//! - `AppearanceClassifier` - nearest-neighbour vote over image embeddings
//!
//! Exactly one is active for the lifetime of a pipeline; `Strategy` selects
//! it at startup.

pub mod appearance;
pub mod knn;
pub mod rules;

use serde::{Deserialize, Serialize};

use crate::camera::VideoFrame;
use crate::hand::MeasuredHand;
use crate::ml::{DetectorError, FeatureExtractor};

pub use appearance::{AppearanceClassifier, ConfidenceGate};
pub use knn::{ClassifierDataset, DatasetError, KnnClassifier, Prediction};
pub use rules::{RuleBasedClassifier, RuleThresholds};

/// Recognized hand gestures. "No gesture" is `Option::None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    /// Index and middle finger raised, others curled
    PeaceSign,
    /// Four fingertips bunched together above the thumb
    CheekHeart,
    /// Thumb crossed over the index fingertip
    FingerHeart,
    /// Peace sign held against the cheek (appearance strategy only)
    CheekPeace,
}

impl Gesture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PeaceSign => "peace_sign",
            Self::CheekHeart => "cheek_heart",
            Self::FingerHeart => "finger_heart",
            Self::CheekPeace => "cheek_peace",
        }
    }
}

/// Errors from a classification strategy
#[derive(Debug, thiserror::Error)]
pub enum GestureError {
    #[error("classifier dataset: {0}")]
    Dataset(#[from] DatasetError),
    #[error("feature extractor: {0}")]
    Extractor(#[from] DetectorError),
}

/// A classification strategy the frame pipeline can drive
#[allow(async_fn_in_trait)]
pub trait GestureStrategy {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Acquire resources. Failure is fatal to pipeline startup.
    async fn prepare(&mut self) -> Result<(), GestureError>;

    /// One verdict per entry of `hands`, in the same order
    async fn classify(
        &mut self,
        frame: &VideoFrame,
        hands: &[MeasuredHand],
    ) -> Result<Vec<Option<Gesture>>, GestureError>;

    /// Drop anything acquired in `prepare`
    fn release(&mut self);
}

/// The strategy chosen at startup
pub enum Strategy<E> {
    RuleBased(RuleBasedClassifier),
    Appearance(AppearanceClassifier<E>),
}

impl<E: FeatureExtractor> GestureStrategy for Strategy<E> {
    fn name(&self) -> &'static str {
        match self {
            Strategy::RuleBased(classifier) => classifier.name(),
            Strategy::Appearance(classifier) => classifier.name(),
        }
    }

    async fn prepare(&mut self) -> Result<(), GestureError> {
        match self {
            Strategy::RuleBased(classifier) => classifier.prepare().await,
            Strategy::Appearance(classifier) => classifier.prepare().await,
        }
    }

    async fn classify(
        &mut self,
        frame: &VideoFrame,
        hands: &[MeasuredHand],
    ) -> Result<Vec<Option<Gesture>>, GestureError> {
        match self {
            Strategy::RuleBased(classifier) => classifier.classify(frame, hands).await,
            Strategy::Appearance(classifier) => classifier.classify(frame, hands).await,
        }
    }

    fn release(&mut self) {
        match self {
            Strategy::RuleBased(classifier) => classifier.release(),
            Strategy::Appearance(classifier) => classifier.release(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gesture_serde_names() {
        let json = serde_json::to_string(&Gesture::FingerHeart).unwrap();
        assert_eq!(json, "\"finger_heart\"");
        let parsed: Option<Gesture> = serde_json::from_str("null").unwrap();
        assert_eq!(parsed, None);
        assert_eq!(Gesture::CheekPeace.as_str(), "cheek_peace");
    }
}
