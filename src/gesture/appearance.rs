//! Appearance-based gesture classification
//!
//! Embeds a centre crop of the whole frame and classifies the embedding with
//! a nearest-neighbour vote against a trained dataset. The verdict applies to
//! every hand detected in that frame; the landmarks are still needed to place
//! the overlay.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::knn::{ClassifierDataset, DatasetError, KnnClassifier, Prediction};
use super::{Gesture, GestureError, GestureStrategy};
use crate::camera::VideoFrame;
use crate::hand::MeasuredHand;
use crate::ml::FeatureExtractor;

/// Minimum winning confidence for a verdict to count
///
/// The default of 1.0 only accepts unanimous votes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfidenceGate {
    pub threshold: f32,
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self { threshold: 1.0 }
    }
}

impl ConfidenceGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn accepts(&self, prediction: &Prediction) -> bool {
        prediction.confidence() >= self.threshold
    }
}

/// Default label mapping. Covers both the readable labels and the numeric
/// class ids written by the training page.
pub fn default_labels() -> BTreeMap<String, Option<Gesture>> {
    [
        ("normal peace", Some(Gesture::PeaceSign)),
        ("cheek peace", Some(Gesture::CheekPeace)),
        ("finger heart", Some(Gesture::FingerHeart)),
        ("none", None),
        ("0", Some(Gesture::PeaceSign)),
        ("1", Some(Gesture::CheekPeace)),
        ("2", Some(Gesture::FingerHeart)),
        ("3", None),
    ]
    .into_iter()
    .map(|(label, gesture)| (label.to_string(), gesture))
    .collect()
}

/// Embedding + nearest-neighbour strategy
pub struct AppearanceClassifier<E> {
    extractor: E,
    knn: KnnClassifier,
    k: usize,
    dataset_path: Option<PathBuf>,
    gate: ConfidenceGate,
    labels: BTreeMap<String, Option<Gesture>>,
}

impl<E: FeatureExtractor> AppearanceClassifier<E> {
    pub fn new(extractor: E, k: usize) -> Self {
        Self {
            extractor,
            knn: KnnClassifier::new(k),
            k,
            dataset_path: None,
            gate: ConfidenceGate::default(),
            labels: default_labels(),
        }
    }

    /// Load examples from this file in `prepare`
    pub fn with_dataset_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dataset_path = Some(path.into());
        self
    }

    /// Use an already trained classifier
    pub fn with_classifier(mut self, knn: KnnClassifier) -> Self {
        self.knn = knn;
        self
    }

    pub fn with_gate(mut self, gate: ConfidenceGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, Option<Gesture>>) -> Self {
        self.labels = labels;
        self
    }

    pub fn classifier(&self) -> &KnnClassifier {
        &self.knn
    }

    /// Gesture a prediction maps to once it passes the gate
    pub fn gesture_for(&self, prediction: &Prediction) -> Option<Gesture> {
        if !self.gate.accepts(prediction) {
            return None;
        }
        match self.labels.get(&prediction.label) {
            Some(gesture) => *gesture,
            None => {
                tracing::debug!(label = %prediction.label, "Unmapped classifier label");
                None
            }
        }
    }

    /// Embed `frame` and store it as a training example for `label`
    pub async fn add_example(&mut self, label: &str, frame: &VideoFrame) -> Result<(), GestureError> {
        let embedding = self.extractor.embed(&frame.center_crop()).await?;
        self.knn.add_example(label, &embedding)?;
        Ok(())
    }

    /// Current examples in the dataset file format
    pub fn export_dataset(&self) -> ClassifierDataset {
        self.knn.to_dataset()
    }
}

impl<E: FeatureExtractor> GestureStrategy for AppearanceClassifier<E> {
    fn name(&self) -> &'static str {
        "appearance"
    }

    async fn prepare(&mut self) -> Result<(), GestureError> {
        self.extractor.init().await?;

        if let Some(path) = &self.dataset_path {
            let dataset = ClassifierDataset::load(path)?;
            self.knn = KnnClassifier::from_dataset(&dataset, self.k)?;
            tracing::info!(
                path = %path.display(),
                classes = self.knn.num_classes(),
                examples = self.knn.num_examples(),
                "Loaded classifier dataset"
            );
        }

        if self.knn.is_empty() {
            return Err(GestureError::Dataset(DatasetError::Empty));
        }
        Ok(())
    }

    async fn classify(
        &mut self,
        frame: &VideoFrame,
        hands: &[MeasuredHand],
    ) -> Result<Vec<Option<Gesture>>, GestureError> {
        if hands.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.extractor.embed(&frame.center_crop()).await?;
        let prediction = self.knn.predict(&embedding)?;
        let gesture = self.gesture_for(&prediction);

        tracing::trace!(
            label = %prediction.label,
            confidence = prediction.confidence(),
            accepted = gesture.is_some(),
            "Appearance verdict"
        );

        Ok(vec![gesture; hands.len()])
    }

    fn release(&mut self) {
        self.extractor.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::fixtures;
    use crate::hand::{Handedness, ScaleNormalizer};
    use crate::ml::DetectorError;
    use image::RgbaImage;

    /// Returns the configured vectors in order, then repeats the last one
    struct ScriptedExtractor {
        outputs: Vec<Vec<f32>>,
        calls: usize,
        fail_init: bool,
        released: bool,
    }

    impl ScriptedExtractor {
        fn new(outputs: Vec<Vec<f32>>) -> Self {
            Self {
                outputs,
                calls: 0,
                fail_init: false,
                released: false,
            }
        }
    }

    impl FeatureExtractor for ScriptedExtractor {
        async fn init(&mut self) -> Result<(), DetectorError> {
            if self.fail_init {
                return Err(DetectorError::ModelLoad("no model".into()));
            }
            Ok(())
        }

        async fn embed(&mut self, _image: &RgbaImage) -> Result<Vec<f32>, DetectorError> {
            let idx = self.calls.min(self.outputs.len() - 1);
            self.calls += 1;
            Ok(self.outputs[idx].clone())
        }

        fn release(&mut self) {
            self.released = true;
        }
    }

    fn prediction(label: &str, confidences: &[(&str, f32)]) -> Prediction {
        Prediction {
            label: label.to_string(),
            confidences: confidences
                .iter()
                .map(|&(l, c)| (l.to_string(), c))
                .collect(),
        }
    }

    fn hands(count: usize) -> Vec<MeasuredHand> {
        let normalizer = ScaleNormalizer::default();
        (0..count)
            .map(|_| {
                MeasuredHand::from_observation(&fixtures::peace_sign(Handedness::Right), &normalizer)
                    .unwrap()
            })
            .collect()
    }

    fn classifier_with(outputs: Vec<Vec<f32>>) -> AppearanceClassifier<ScriptedExtractor> {
        let mut knn = KnnClassifier::new(3);
        for example in [[1.0, 0.0], [0.95, 0.05], [0.9, 0.1]] {
            knn.add_example("normal peace", &example).unwrap();
        }
        for example in [[0.0, 1.0], [0.05, 0.95]] {
            knn.add_example("finger heart", &example).unwrap();
        }
        AppearanceClassifier::new(ScriptedExtractor::new(outputs), 3).with_classifier(knn)
    }

    #[test]
    fn test_gate_requires_unanimous_vote_by_default() {
        let classifier = classifier_with(vec![vec![1.0, 0.0]]);
        let split = prediction("normal peace", &[("normal peace", 0.6), ("finger heart", 0.4)]);
        let unanimous = prediction("normal peace", &[("normal peace", 1.0)]);

        assert_eq!(classifier.gesture_for(&split), None);
        assert_eq!(classifier.gesture_for(&unanimous), Some(Gesture::PeaceSign));
    }

    #[test]
    fn test_gate_threshold_is_configurable() {
        let classifier = classifier_with(vec![vec![1.0, 0.0]]).with_gate(ConfidenceGate::new(0.5));
        let split = prediction("finger heart", &[("finger heart", 0.6), ("normal peace", 0.4)]);
        assert_eq!(classifier.gesture_for(&split), Some(Gesture::FingerHeart));
    }

    #[test]
    fn test_none_and_unknown_labels_map_to_no_gesture() {
        let classifier = classifier_with(vec![vec![1.0, 0.0]]);
        assert_eq!(classifier.gesture_for(&prediction("none", &[("none", 1.0)])), None);
        assert_eq!(classifier.gesture_for(&prediction("wave", &[("wave", 1.0)])), None);
        assert_eq!(
            classifier.gesture_for(&prediction("1", &[("1", 1.0)])),
            Some(Gesture::CheekPeace)
        );
    }

    #[tokio::test]
    async fn test_verdict_applies_to_every_hand() {
        let mut classifier = classifier_with(vec![vec![1.0, 0.02]]);
        classifier.prepare().await.unwrap();
        let frame = VideoFrame::blank(32, 32, 1);

        let verdicts = classifier.classify(&frame, &hands(2)).await.unwrap();
        assert_eq!(verdicts, vec![Some(Gesture::PeaceSign); 2]);
    }

    #[tokio::test]
    async fn test_split_vote_yields_no_gesture() {
        // nearest three: both finger-heart examples and one peace example
        let mut classifier = classifier_with(vec![vec![0.5, 0.6]]);
        let frame = VideoFrame::blank(32, 32, 1);
        let verdicts = classifier.classify(&frame, &hands(1)).await.unwrap();
        assert_eq!(verdicts, vec![None]);
    }

    #[tokio::test]
    async fn test_no_hands_skips_embedding() {
        let mut classifier = classifier_with(vec![vec![1.0, 0.0]]);
        let frame = VideoFrame::blank(32, 32, 1);
        assert!(classifier.classify(&frame, &[]).await.unwrap().is_empty());
        assert_eq!(classifier.extractor.calls, 0);
    }

    #[tokio::test]
    async fn test_prepare_fails_without_examples() {
        let mut classifier = AppearanceClassifier::new(ScriptedExtractor::new(vec![vec![1.0]]), 3);
        assert!(matches!(
            classifier.prepare().await,
            Err(GestureError::Dataset(DatasetError::Empty))
        ));

        let mut missing = AppearanceClassifier::new(ScriptedExtractor::new(vec![vec![1.0]]), 3)
            .with_dataset_path("/nonexistent/knn-classifier-model.txt");
        assert!(matches!(
            missing.prepare().await,
            Err(GestureError::Dataset(DatasetError::Io(_)))
        ));
    }

    #[tokio::test]
    async fn test_prepare_surfaces_extractor_failure() {
        let mut extractor = ScriptedExtractor::new(vec![vec![1.0]]);
        extractor.fail_init = true;
        let mut classifier = AppearanceClassifier::new(extractor, 3);
        assert!(matches!(
            classifier.prepare().await,
            Err(GestureError::Extractor(_))
        ));
    }

    #[tokio::test]
    async fn test_training_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.txt");

        let mut classifier = AppearanceClassifier::new(
            ScriptedExtractor::new(vec![vec![1.0, 0.0], vec![0.0, 1.0]]),
            1,
        );
        let frame = VideoFrame::blank(16, 16, 0);
        classifier.add_example("normal peace", &frame).await.unwrap();
        classifier.add_example("finger heart", &frame).await.unwrap();
        classifier.export_dataset().save(&path).unwrap();

        let mut reloaded =
            AppearanceClassifier::new(ScriptedExtractor::new(vec![vec![0.1, 0.9]]), 1)
                .with_dataset_path(&path);
        reloaded.prepare().await.unwrap();
        assert_eq!(reloaded.classifier().num_examples(), 2);
        let verdicts = reloaded.classify(&frame, &hands(1)).await.unwrap();
        assert_eq!(verdicts, vec![Some(Gesture::FingerHeart)]);

        reloaded.release();
        assert!(reloaded.extractor.released);
    }
}
