//! Hand landmark detection
//!
//! Runs the MediaPipe 21-point hand landmark model (PINTO Model Zoo ONNX
//! export, 224x224 NHWC input). The model outputs 63 values (x, y, z per
//! landmark in input pixels), a hand presence score and a handedness score.
//!
//! There is no palm detection stage: the whole frame is fed to the model, so
//! at most one hand is reported per frame and it is found best when it fills
//! a good part of the picture.

use std::path::PathBuf;

use image::RgbaImage;

use super::worker::InferenceWorker;
use super::{load_session, preprocess_nhwc, resolve_model_path, run_session};
use super::{DetectorError, HandDetector};
use crate::camera::VideoFrame;
use crate::hand::{HandObservation, Handedness, Landmark, LandmarkName};

const INPUT_SIZE: u32 = 224;
const LANDMARK_VALUES: usize = 63;

/// ONNX-backed `HandDetector`
pub struct OrtHandLandmarker {
    model_path: PathBuf,
    min_hand_score: f32,
    worker: Option<InferenceWorker<RgbaImage, Option<HandObservation>>>,
}

impl OrtHandLandmarker {
    pub fn new(model_path: impl Into<PathBuf>, min_hand_score: f32) -> Self {
        Self {
            model_path: model_path.into(),
            min_hand_score,
            worker: None,
        }
    }
}

impl HandDetector for OrtHandLandmarker {
    async fn init(&mut self) -> Result<(), DetectorError> {
        if self.worker.is_some() {
            return Ok(());
        }

        let path = resolve_model_path(&self.model_path)?;
        let min_hand_score = self.min_hand_score;

        let worker = InferenceWorker::spawn(
            "hand-landmarker",
            move || load_session(&path),
            move |session, image: RgbaImage| {
                let input = preprocess_nhwc(&image, INPUT_SIZE, INPUT_SIZE);
                let outputs = run_session(session, input)?;
                decode_hand(&outputs, image.width(), image.height(), min_hand_score)
            },
        )
        .await?;

        self.worker = Some(worker);
        Ok(())
    }

    async fn estimate(&mut self, frame: &VideoFrame) -> Result<Vec<HandObservation>, DetectorError> {
        let worker = self.worker.as_ref().ok_or(DetectorError::NotRunning)?;
        let hand = worker.submit(frame.image.clone()).await?;
        Ok(hand.into_iter().collect())
    }

    fn release(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }
}

/// Turn raw model outputs into an observation in frame pixels
///
/// Returns `None` when the presence score is below `min_score`. A handedness
/// score above 0.5 means a right hand.
fn decode_hand(
    outputs: &[Vec<f32>],
    frame_width: u32,
    frame_height: u32,
    min_score: f32,
) -> Result<Option<HandObservation>, DetectorError> {
    let coords = outputs
        .iter()
        .find(|output| output.len() == LANDMARK_VALUES)
        .ok_or_else(|| DetectorError::Inference("no landmark output".to_string()))?;

    let scalars: Vec<f32> = outputs
        .iter()
        .filter(|output| output.len() == 1)
        .map(|output| output[0])
        .collect();

    let score = scalars.first().copied().unwrap_or(1.0);
    if score < min_score {
        return Ok(None);
    }

    let handedness = match scalars.get(1) {
        Some(&value) if value <= 0.5 => Handedness::Left,
        _ => Handedness::Right,
    };

    let x_scale = frame_width as f32 / INPUT_SIZE as f32;
    let y_scale = frame_height as f32 / INPUT_SIZE as f32;

    let landmarks = LandmarkName::ALL
        .iter()
        .zip(coords.chunks_exact(3))
        .map(|(&name, xyz)| Landmark::new(name, xyz[0] * x_scale, xyz[1] * y_scale))
        .collect();

    Ok(Some(HandObservation::new(landmarks, handedness, score)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs(presence: f32, handedness: f32) -> Vec<Vec<f32>> {
        let coords = (0..21)
            .flat_map(|i| [i as f32 * 10.0, 112.0, 0.0])
            .collect();
        vec![coords, vec![presence], vec![handedness]]
    }

    #[test]
    fn test_decode_scales_to_frame_pixels() {
        let hand = decode_hand(&outputs(0.9, 0.8), 448, 672, 0.5)
            .unwrap()
            .unwrap();

        assert_eq!(hand.landmarks.len(), 21);
        assert_eq!(hand.handedness, Handedness::Right);
        assert_eq!(hand.score, 0.9);

        let index_tip = hand.find(LandmarkName::IndexFingerTip).unwrap();
        assert_eq!(index_tip.x, 160.0);
        assert_eq!(index_tip.y, 336.0);
        assert_eq!(hand.landmarks[0].name, LandmarkName::Wrist);
    }

    #[test]
    fn test_decode_reads_handedness_and_presence() {
        let left = decode_hand(&outputs(0.9, 0.2), 224, 224, 0.5).unwrap().unwrap();
        assert_eq!(left.handedness, Handedness::Left);

        assert_eq!(decode_hand(&outputs(0.3, 0.8), 224, 224, 0.5).unwrap(), None);
    }

    #[test]
    fn test_decode_requires_landmark_output() {
        let result = decode_hand(&[vec![0.9], vec![0.1]], 224, 224, 0.5);
        assert!(matches!(result, Err(DetectorError::Inference(_))));
    }

    #[tokio::test]
    async fn test_estimate_before_init_fails() {
        let mut detector = OrtHandLandmarker::new("models/hand_landmark.onnx", 0.5);
        let frame = VideoFrame::blank(64, 48, 0);
        assert_eq!(detector.estimate(&frame).await, Err(DetectorError::NotRunning));
        detector.release();
    }

    #[tokio::test]
    async fn test_init_with_missing_model_fails() {
        let mut detector = OrtHandLandmarker::new("models/does-not-exist.onnx", 0.5);
        assert!(matches!(detector.init().await, Err(DetectorError::ModelLoad(_))));
    }
}
