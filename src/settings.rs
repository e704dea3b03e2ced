//! Application settings
//!
//! Loaded from a JSON file. Every section has defaults, so a partial file (or
//! no file at all) is valid.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::gesture::appearance::default_labels;
use crate::gesture::{
    AppearanceClassifier, ConfidenceGate, Gesture, RuleBasedClassifier, RuleThresholds, Strategy,
};
use crate::hand::{ScaleMethod, ScaleNormalizer};
use crate::ml::FeatureExtractor;
use crate::overlay::{PlacementResolver, DEFAULT_ANCHOR_OFFSET_Y};
use crate::telemetry::LogConfig;

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VideoSourceKind {
    /// Native camera by index
    Camera {
        #[serde(default)]
        index: u32,
    },
    /// Still images from a directory, in file name order
    ImageSequence {
        dir: PathBuf,
        #[serde(default, rename = "loop")]
        looping: bool,
    },
}

impl Default for VideoSourceKind {
    fn default() -> Self {
        VideoSourceKind::Camera { index: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub source: VideoSourceKind,
    /// Requested capture width
    pub width: u32,
    /// Requested capture height
    pub height: u32,
    /// Tick rate of the frame pipeline
    pub fps: u32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            source: VideoSourceKind::default(),
            width: 640,
            height: 480,
            fps: 60,
        }
    }
}

/// Gesture classification strategy, fixed at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    RuleBased,
    Appearance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppearanceSettings {
    /// Trained examples in `[[label, samples, shape], ...]` form
    pub dataset_path: PathBuf,
    pub embedding_model: PathBuf,
    /// Neighbours consulted per prediction
    pub k: usize,
    /// Minimum winning confidence
    pub confidence_gate: ConfidenceGate,
    /// Dataset label to gesture; `null` means "no gesture"
    pub labels: BTreeMap<String, Option<Gesture>>,
}

impl Default for AppearanceSettings {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("models/knn-classifier-model.txt"),
            embedding_model: PathBuf::from("models/mobilenet_v2_embedding.onnx"),
            k: 3,
            confidence_gate: ConfidenceGate::default(),
            labels: default_labels(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    /// Directory holding `star.png`, `peace.png`, `heart01.png` ...
    pub sprite_dir: PathBuf,
    pub anchor_offset_y: f32,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            sprite_dir: PathBuf::from("assets/sprites"),
            anchor_offset_y: DEFAULT_ANCHOR_OFFSET_Y,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    pub landmark_model: PathBuf,
    /// Hands scoring below this are ignored
    pub min_hand_score: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            landmark_model: PathBuf::from("models/hand_landmark.onnx"),
            min_hand_score: 0.5,
        }
    }
}

/// Periodic PNG snapshot of the composed canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    /// Disabled when unset
    pub path: Option<PathBuf>,
    pub every_n_frames: u64,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            path: None,
            every_n_frames: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub video: VideoSettings,
    pub strategy: StrategyKind,
    pub scale: ScaleMethod,
    pub rules: RuleThresholds,
    pub appearance: AppearanceSettings,
    pub overlay: OverlaySettings,
    pub detector: DetectorSettings,
    pub preview: PreviewSettings,
    pub logging: LogConfig,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    /// Load `path`, or use defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |msg: &str| -> Result<(), SettingsError> {
            Err(SettingsError::Invalid(msg.to_string()))
        };

        if self.video.width == 0 || self.video.height == 0 {
            return invalid("video width and height must be positive");
        }
        if !(1..=240).contains(&self.video.fps) {
            return invalid("video fps must be between 1 and 240");
        }
        let baseline = self.scale.baseline();
        if !baseline.is_finite() || baseline <= 0.0 {
            return invalid("scale baseline must be positive");
        }
        let rules = &self.rules;
        let positive = |value: f32| value.is_finite() && value > 0.0;
        if !positive(rules.reference_hand_size) {
            return invalid("rules reference_hand_size must be positive");
        }
        if !positive(rules.extension_px) || !positive(rules.alignment_px) {
            return invalid("rules extension_px and alignment_px must be positive");
        }
        if !positive(rules.finger_heart_distance_px) {
            return invalid("rules finger_heart_distance_px must be positive");
        }
        if self.appearance.k == 0 {
            return invalid("appearance k must be at least 1");
        }
        let gate = self.appearance.confidence_gate.threshold;
        if !(gate > 0.0 && gate <= 1.0) {
            return invalid("appearance confidence_gate must be in (0, 1]");
        }
        if !(0.0..=1.0).contains(&self.detector.min_hand_score) {
            return invalid("detector min_hand_score must be in [0, 1]");
        }
        if self.preview.every_n_frames == 0 {
            return invalid("preview every_n_frames must be at least 1");
        }
        Ok(())
    }

    pub fn normalizer(&self) -> ScaleNormalizer {
        ScaleNormalizer::new(self.scale)
    }

    pub fn resolver(&self) -> PlacementResolver {
        PlacementResolver::new(self.overlay.anchor_offset_y)
    }

    /// The configured gesture strategy. `extractor` is only used by the
    /// appearance strategy.
    pub fn build_strategy<E: FeatureExtractor>(&self, extractor: E) -> Strategy<E> {
        match self.strategy {
            StrategyKind::RuleBased => {
                Strategy::RuleBased(RuleBasedClassifier::new(self.rules.clone()))
            }
            StrategyKind::Appearance => Strategy::Appearance(
                AppearanceClassifier::new(extractor, self.appearance.k)
                    .with_dataset_path(&self.appearance.dataset_path)
                    .with_gate(self.appearance.confidence_gate)
                    .with_labels(self.appearance.labels.clone()),
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}
