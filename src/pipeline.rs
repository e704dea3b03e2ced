//! Frame pipeline
//!
//! Owns the video source, hand detector, gesture strategy and renderer for
//! the lifetime of a session and drives them one frame at a time:
//!
//! ```text
//! Idle -> Initializing -> Running -> Stopped
//!                     \-> Stopped (startup failure)
//! ```
//!
//! Each tick takes the newest frame, detects hands, classifies every hand,
//! resolves placements and draws that same frame plus its sprites. The next
//! tick is only scheduled once the current one has finished, so there is
//! never more than one detection or classification request in flight.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::camera::{VideoSource, VideoSourceError};
use crate::gesture::{DatasetError, GestureError, GestureStrategy};
use crate::hand::{MeasuredHand, ScaleNormalizer};
use crate::ml::{DetectorError, HandDetector};
use crate::overlay::{OverlayRenderer, PlacementDirective, PlacementResolver};

/// Lifecycle of a pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Initializing,
    Running,
    /// Terminal
    Stopped,
}

/// Startup failures
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("camera access denied: {0}")]
    PermissionDenied(String),
    #[error("video device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("detector initialisation failed: {0}")]
    DetectorInit(#[source] DetectorError),
    #[error("classifier dataset failed to load: {0}")]
    DatasetLoad(#[source] DatasetError),
    #[error("pipeline cannot initialise from state {0:?}")]
    NotIdle(PipelineState),
}

impl PipelineError {
    /// Text to show the person in front of the camera
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied(_) => {
                "Camera access was denied. Allow camera access and restart.".to_string()
            }
            Self::DeviceUnavailable(_) => {
                "No camera could be opened. Check that one is connected and not in use.".to_string()
            }
            Self::DetectorInit(_) => {
                "The hand tracking model could not be loaded.".to_string()
            }
            Self::DatasetLoad(_) => {
                "The gesture training data could not be loaded.".to_string()
            }
            Self::NotIdle(_) => "The overlay is already running.".to_string(),
        }
    }
}

impl From<VideoSourceError> for PipelineError {
    fn from(e: VideoSourceError) -> Self {
        match e {
            VideoSourceError::PermissionDenied(msg) => Self::PermissionDenied(msg),
            VideoSourceError::DeviceUnavailable(msg) => Self::DeviceUnavailable(msg),
        }
    }
}

impl From<GestureError> for PipelineError {
    fn from(e: GestureError) -> Self {
        match e {
            GestureError::Dataset(e) => Self::DatasetLoad(e),
            GestureError::Extractor(e) => Self::DetectorInit(e),
        }
    }
}

/// Outcome of one tick
#[derive(Clone, Debug, PartialEq)]
pub struct TickReport {
    pub frame_number: u64,
    /// Hands the detector reported
    pub hands: usize,
    /// Placements drawn on this frame
    pub directives: Vec<PlacementDirective>,
    /// Hands skipped for missing landmarks or degenerate geometry
    pub skipped_hands: usize,
}

/// Per-session orchestrator
pub struct FramePipeline<S, D, G, R> {
    source: S,
    detector: D,
    strategy: G,
    renderer: R,
    normalizer: ScaleNormalizer,
    resolver: PlacementResolver,
    state: PipelineState,
}

impl<S, D, G, R> FramePipeline<S, D, G, R>
where
    S: VideoSource,
    D: HandDetector,
    G: GestureStrategy,
    R: OverlayRenderer,
{
    pub fn new(source: S, detector: D, strategy: G, renderer: R) -> Self {
        Self {
            source,
            detector,
            strategy,
            renderer,
            normalizer: ScaleNormalizer::default(),
            resolver: PlacementResolver::default(),
            state: PipelineState::Idle,
        }
    }

    pub fn with_normalizer(mut self, normalizer: ScaleNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_resolver(mut self, resolver: PlacementResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Acquire the video source, detector and strategy resources
    ///
    /// Any failure releases what was acquired and leaves the pipeline
    /// `Stopped`.
    pub async fn initialize(&mut self) -> Result<(), PipelineError> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::NotIdle(self.state));
        }

        self.state = PipelineState::Initializing;
        tracing::info!(strategy = self.strategy.name(), "Initializing frame pipeline");

        match self.acquire().await {
            Ok(()) => {
                self.state = PipelineState::Running;
                tracing::info!("Frame pipeline running");
                Ok(())
            }
            Err(e) => {
                tracing::error!("Frame pipeline failed to start: {}", e);
                self.release();
                self.state = PipelineState::Stopped;
                Err(e)
            }
        }
    }

    async fn acquire(&mut self) -> Result<(), PipelineError> {
        let (width, height) = self.source.start()?;
        tracing::info!(width, height, "Video source started");

        self.detector
            .init()
            .await
            .map_err(PipelineError::DetectorInit)?;
        self.strategy.prepare().await?;
        Ok(())
    }

    /// Process the newest frame
    ///
    /// Returns `None` when not running or when no new frame is available.
    /// Per-hand failures skip that hand; detector, classifier and sprite
    /// failures are logged and the frame is still drawn.
    pub async fn tick(&mut self) -> Option<TickReport> {
        if self.state != PipelineState::Running {
            return None;
        }

        let frame = self.source.latest_frame()?;

        let observations = match self.detector.estimate(&frame).await {
            Ok(observations) => observations,
            Err(e) => {
                tracing::warn!(frame = frame.frame_number, "Hand detection failed: {}", e);
                Vec::new()
            }
        };

        let mut skipped_hands = 0;
        let hands: Vec<MeasuredHand> = observations
            .iter()
            .filter_map(|observation| {
                match MeasuredHand::from_observation(observation, &self.normalizer) {
                    Ok(hand) => Some(hand),
                    Err(e) => {
                        tracing::debug!(frame = frame.frame_number, "Skipping hand: {}", e);
                        skipped_hands += 1;
                        None
                    }
                }
            })
            .collect();

        let gestures = match self.strategy.classify(&frame, &hands).await {
            Ok(gestures) => gestures,
            Err(e) => {
                tracing::warn!(frame = frame.frame_number, "Gesture classification failed: {}", e);
                Vec::new()
            }
        };

        let directives: Vec<PlacementDirective> = hands
            .iter()
            .enumerate()
            .filter_map(|(i, hand)| {
                let gesture = gestures.get(i).copied().flatten();
                self.resolver.resolve(gesture, hand)
            })
            .collect();

        self.renderer.clear();
        self.renderer.draw_mirrored_video_frame(&frame);
        for directive in &directives {
            if let Err(e) = self.renderer.draw_sprite(
                directive.sprite,
                directive.anchor_x,
                directive.anchor_y,
                directive.scale,
            ) {
                tracing::warn!(sprite = %directive.sprite, "Failed to draw sprite: {}", e);
            }
        }

        tracing::trace!(
            frame = frame.frame_number,
            hands = observations.len(),
            directives = directives.len(),
            "Tick"
        );

        Some(TickReport {
            frame_number: frame.frame_number,
            hands: observations.len(),
            directives,
            skipped_hands,
        })
    }

    /// Tick at `fps` until `shutdown` becomes true, then stop
    pub async fn run(&mut self, fps: u32, shutdown: watch::Receiver<bool>) {
        self.run_with(fps, shutdown, |_, _| {}).await
    }

    /// Like `run`, calling `observer` after every completed tick
    ///
    /// A tick still in flight when shutdown is requested is dropped, so its
    /// results are never drawn.
    pub async fn run_with<F>(&mut self, fps: u32, mut shutdown: watch::Receiver<bool>, mut observer: F)
    where
        F: FnMut(&TickReport, &R),
    {
        if self.state != PipelineState::Running {
            tracing::warn!(state = ?self.state, "Frame pipeline is not running");
            return;
        }

        let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = interval.tick() => {}
            }

            let report = tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => {
                    tracing::debug!("Abandoning in-flight tick");
                    break;
                }
                report = self.tick() => report,
            };

            if let Some(report) = report {
                observer(&report, &self.renderer);
            }
        }

        self.stop();
    }

    /// Release the video source, strategy and detector. Idempotent.
    pub fn stop(&mut self) {
        if self.state == PipelineState::Stopped {
            return;
        }
        self.release();
        self.state = PipelineState::Stopped;
        tracing::info!("Frame pipeline stopped");
    }

    fn release(&mut self) {
        self.source.stop();
        self.strategy.release();
        self.detector.release();
    }
}
