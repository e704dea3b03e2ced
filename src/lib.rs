//! Hand Sign Overlay - gesture-triggered sprites on a mirrored camera feed
//!
//! Detects hands in each camera frame, classifies each hand's pose (peace
//! sign, cheek heart, finger heart), and draws a sprite scaled to the hand
//! next to it on the mirrored video.

pub mod camera;
pub mod gesture;
pub mod hand;
pub mod ml;
pub mod overlay;
pub mod pipeline;
pub mod settings;
pub mod telemetry;

pub use pipeline::{FramePipeline, PipelineError, PipelineState, TickReport};
pub use settings::Settings;
