//! ML inference module
//!
//! Contracts for the two neural collaborators of the pipeline, the hand
//! landmark detector and the appearance feature extractor, plus their ONNX
//! Runtime implementations. Models run on dedicated inference threads (see
//! `worker`); callers await one request at a time.

pub mod embedding;
pub mod landmarker;
pub mod worker;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use image::RgbaImage;
use ndarray::Array4;

use crate::camera::VideoFrame;
use crate::hand::HandObservation;

pub use embedding::OrtFeatureExtractor;
pub use landmarker::OrtHandLandmarker;
pub use worker::InferenceWorker;

/// Detector and extractor failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectorError {
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("model not initialised")]
    NotRunning,
    #[error("inference queue is full")]
    Busy,
    #[error("inference thread stopped")]
    WorkerStopped,
}

/// Finds hands in a frame
#[allow(async_fn_in_trait)]
pub trait HandDetector {
    /// Load the model. Called once while the pipeline initialises.
    async fn init(&mut self) -> Result<(), DetectorError>;

    /// Hands visible in `frame`, possibly none
    async fn estimate(&mut self, frame: &VideoFrame) -> Result<Vec<HandObservation>, DetectorError>;

    fn release(&mut self);
}

/// Turns an image into an embedding vector
#[allow(async_fn_in_trait)]
pub trait FeatureExtractor {
    async fn init(&mut self) -> Result<(), DetectorError>;

    async fn embed(&mut self, image: &RgbaImage) -> Result<Vec<f32>, DetectorError>;

    fn release(&mut self);
}

/// Initialise ONNX Runtime once per process
pub(crate) fn init_runtime() -> Result<(), DetectorError> {
    static RUNTIME: OnceLock<Result<(), String>> = OnceLock::new();

    RUNTIME
        .get_or_init(|| {
            ort::init()
                .with_name("HandSignOverlay")
                .commit()
                .map(|_| ())
                .map_err(|e| format!("Failed to initialize ORT: {}", e))
        })
        .clone()
        .map_err(DetectorError::ModelLoad)
}

/// Build a session for the model at `path`
pub(crate) fn load_session(path: &Path) -> Result<ort::session::Session, DetectorError> {
    init_runtime()?;

    let session = ort::session::Session::builder()
        .map_err(|e| DetectorError::ModelLoad(format!("Failed to create session builder: {}", e)))?
        .with_intra_threads(2)
        .map_err(|e| DetectorError::ModelLoad(format!("Failed to set threads: {}", e)))?
        .commit_from_file(path)
        .map_err(|e| DetectorError::ModelLoad(format!("{}: {}", path.display(), e)))?;

    tracing::info!("Loaded model from {:?}", path);
    Ok(session)
}

/// Locate a model file
///
/// Relative paths are tried against the working directory first, then next
/// to the executable and two levels above it (`target/<profile>/`).
pub fn resolve_model_path(path: &Path) -> Result<PathBuf, DetectorError> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }

    if path.is_relative() {
        if let Ok(exe_path) = std::env::current_exe() {
            let candidates = exe_path.ancestors().skip(1).take(3);
            for dir in candidates {
                let candidate = dir.join(path);
                if candidate.exists() {
                    return Ok(candidate);
                }
            }
        }
    }

    Err(DetectorError::ModelLoad(format!(
        "model not found: {}",
        path.display()
    )))
}

/// Resize to `width`x`height` (nearest neighbour) and convert to a
/// `[1, height, width, 3]` RGB tensor in `[0, 1]`
pub(crate) fn preprocess_nhwc(image: &RgbaImage, width: u32, height: u32) -> Array4<f32> {
    let mut output = Array4::<f32>::zeros((1, height as usize, width as usize, 3));
    if image.width() == 0 || image.height() == 0 {
        return output;
    }

    let x_ratio = image.width() as f32 / width as f32;
    let y_ratio = image.height() as f32 / height as f32;

    for y in 0..height {
        for x in 0..width {
            let src_x = ((x as f32 * x_ratio) as u32).min(image.width() - 1);
            let src_y = ((y as f32 * y_ratio) as u32).min(image.height() - 1);
            let pixel = image.get_pixel(src_x, src_y);

            for channel in 0..3 {
                output[[0, y as usize, x as usize, channel]] = pixel[channel] as f32 / 255.0;
            }
        }
    }

    output
}

/// Run `session` on one input tensor and copy out every output as a flat
/// vector, in output order
pub(crate) fn run_session(
    session: &mut ort::session::Session,
    input: Array4<f32>,
) -> Result<Vec<Vec<f32>>, DetectorError> {
    let input_tensor = ort::value::Tensor::from_array(input)
        .map_err(|e| DetectorError::Inference(format!("Failed to create tensor: {}", e)))?;

    let outputs = session
        .run(ort::inputs![input_tensor])
        .map_err(|e| DetectorError::Inference(e.to_string()))?;

    let mut flat = Vec::new();
    for output in outputs.iter() {
        let (_shape, data) = output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::Inference(format!("Failed to extract output: {}", e)))?;
        flat.push(data.to_vec());
    }
    Ok(flat)
}
