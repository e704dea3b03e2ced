//! Hand Sign Overlay - Main Entry Point
//!
//! Usage: `hand-sign-overlay [settings.json]`
//!
//! Runs the frame pipeline until Ctrl-C, optionally writing the composed
//! canvas to a PNG every few frames.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::sync::watch;

use hand_sign_overlay::camera::{ImageSequenceSource, VideoSource};
use hand_sign_overlay::ml::{OrtFeatureExtractor, OrtHandLandmarker};
use hand_sign_overlay::overlay::{CanvasRenderer, SpriteAtlas};
use hand_sign_overlay::settings::{VideoSettings, VideoSourceKind};
use hand_sign_overlay::telemetry::{init_logging, TickStats};
use hand_sign_overlay::{FramePipeline, Settings};

const DEFAULT_SETTINGS_PATH: &str = "hand-sign-overlay.json";

fn main() -> anyhow::Result<()> {
    let settings_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));

    let settings = Settings::load_or_default(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;

    // Keep the guard alive for the program duration
    let _log_guard = match init_logging(&settings.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    tracing::info!("Hand Sign Overlay v{}", env!("CARGO_PKG_VERSION"));
    settings.validate().context("invalid settings")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(run(settings))
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let atlas = SpriteAtlas::load_dir(&settings.overlay.sprite_dir).context("failed to load sprites")?;
    let renderer = CanvasRenderer::new(atlas, settings.video.width, settings.video.height);

    let detector = OrtHandLandmarker::new(
        &settings.detector.landmark_model,
        settings.detector.min_hand_score,
    );
    let strategy = settings.build_strategy(OrtFeatureExtractor::new(&settings.appearance.embedding_model));

    let mut pipeline = FramePipeline::new(open_source(&settings.video), detector, strategy, renderer)
        .with_normalizer(settings.normalizer())
        .with_resolver(settings.resolver());

    if let Err(e) = pipeline.initialize().await {
        eprintln!("{}", e.user_message());
        return Err(e).context("frame pipeline failed to start");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::warn!("Ctrl-C handler unavailable: {}", e);
                // Keep the sender alive so the pipeline keeps running
                std::future::pending::<()>().await;
            }
        }
    });

    tracing::info!("Press Ctrl-C to exit");

    let preview = settings.preview.clone();
    let mut stats = TickStats::new(Duration::from_secs(1));

    pipeline
        .run_with(settings.video.fps, shutdown_rx, |report, renderer| {
            if let Some(window) = stats.record(report, Instant::now()) {
                tracing::info!(
                    ticks = window.ticks,
                    fps = %format!("{:.1}", window.fps),
                    hands = window.hands,
                    directives = window.directives,
                    skipped_hands = window.skipped_hands,
                    "Pipeline stats"
                );
            }

            if let Some(path) = &preview.path {
                if report.frame_number % preview.every_n_frames == 0 {
                    if let Err(e) = renderer.save_png(path) {
                        tracing::warn!("Failed to write preview {}: {}", path.display(), e);
                    }
                }
            }
        })
        .await;

    Ok(())
}

fn open_source(video: &VideoSettings) -> Box<dyn VideoSource> {
    match &video.source {
        VideoSourceKind::Camera { index } => camera_source(*index, video.width, video.height),
        VideoSourceKind::ImageSequence { dir, looping } => {
            Box::new(ImageSequenceSource::new(dir, *looping))
        }
    }
}

#[cfg(feature = "camera")]
fn camera_source(index: u32, width: u32, height: u32) -> Box<dyn VideoSource> {
    Box::new(hand_sign_overlay::camera::CameraSource::new(index, width, height))
}

#[cfg(not(feature = "camera"))]
fn camera_source(index: u32, _width: u32, _height: u32) -> Box<dyn VideoSource> {
    Box::new(NoCamera { index })
}

/// Stand-in when built without camera support
#[cfg(not(feature = "camera"))]
struct NoCamera {
    index: u32,
}

#[cfg(not(feature = "camera"))]
impl VideoSource for NoCamera {
    fn start(&mut self) -> Result<(u32, u32), hand_sign_overlay::camera::VideoSourceError> {
        Err(hand_sign_overlay::camera::VideoSourceError::DeviceUnavailable(format!(
            "camera {} requested but this build has no camera support (enable the `camera` feature)",
            self.index
        )))
    }

    fn latest_frame(&mut self) -> Option<hand_sign_overlay::camera::VideoFrame> {
        None
    }

    fn stop(&mut self) {}
}
