//! Appearance embeddings
//!
//! Runs an image classification backbone (MobileNet style, 224x224 NHWC) and
//! uses its first output, flattened, as the embedding.

use std::path::PathBuf;

use image::RgbaImage;

use super::worker::InferenceWorker;
use super::{load_session, preprocess_nhwc, resolve_model_path, run_session};
use super::{DetectorError, FeatureExtractor};

const INPUT_SIZE: u32 = 224;

/// ONNX-backed `FeatureExtractor`
pub struct OrtFeatureExtractor {
    model_path: PathBuf,
    worker: Option<InferenceWorker<RgbaImage, Vec<f32>>>,
}

impl OrtFeatureExtractor {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            worker: None,
        }
    }
}

impl FeatureExtractor for OrtFeatureExtractor {
    async fn init(&mut self) -> Result<(), DetectorError> {
        if self.worker.is_some() {
            return Ok(());
        }

        let path = resolve_model_path(&self.model_path)?;
        let worker = InferenceWorker::spawn(
            "feature-extractor",
            move || load_session(&path),
            |session, image: RgbaImage| {
                let input = preprocess_nhwc(&image, INPUT_SIZE, INPUT_SIZE);
                first_output(run_session(session, input)?)
            },
        )
        .await?;

        self.worker = Some(worker);
        Ok(())
    }

    async fn embed(&mut self, image: &RgbaImage) -> Result<Vec<f32>, DetectorError> {
        let worker = self.worker.as_ref().ok_or(DetectorError::NotRunning)?;
        worker.submit(image.clone()).await
    }

    fn release(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }
}

fn first_output(outputs: Vec<Vec<f32>>) -> Result<Vec<f32>, DetectorError> {
    outputs
        .into_iter()
        .next()
        .filter(|embedding| !embedding.is_empty())
        .ok_or_else(|| DetectorError::Inference("model produced no embedding".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_output_is_the_embedding() {
        let embedding = first_output(vec![vec![0.1, 0.2], vec![9.0]]).unwrap();
        assert_eq!(embedding, vec![0.1, 0.2]);
        assert!(first_output(Vec::new()).is_err());
        assert!(first_output(vec![Vec::new()]).is_err());
    }

    #[tokio::test]
    async fn test_embed_before_init_fails() {
        let mut extractor = OrtFeatureExtractor::new("models/embedding.onnx");
        let image = RgbaImage::new(8, 8);
        assert_eq!(extractor.embed(&image).await, Err(DetectorError::NotRunning));
    }
}
