//! Native camera capture
//!
//! Captures frames with nokhwa on a background thread and keeps the latest
//! one in a triple buffer for the pipeline to pick up. The camera is opened
//! on the capture thread; `start` waits for that thread to report whether
//! the open succeeded.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use image::RgbaImage;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use parking_lot::Mutex;

use super::{VideoFrame, VideoSource, VideoSourceError};

/// How long `start` waits for the device to open
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

type FrameSlot = Arc<Mutex<Option<VideoFrame>>>;

/// Camera-backed video source
pub struct CameraSource {
    index: u32,
    width: u32,
    height: u32,
    /// Triple buffered latest frames
    frames: [FrameSlot; 3],
    /// Write counter of the latest complete frame
    latest_frame_idx: Arc<AtomicU64>,
    /// Frame number last handed to the pipeline
    last_delivered: Option<u64>,
    running: Arc<AtomicBool>,
    frame_count: Arc<AtomicU64>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl CameraSource {
    /// Camera `index` (0 for the default device) at roughly `width`x`height`
    pub fn new(index: u32, width: u32, height: u32) -> Self {
        Self {
            index,
            width,
            height,
            frames: [
                Arc::new(Mutex::new(None)),
                Arc::new(Mutex::new(None)),
                Arc::new(Mutex::new(None)),
            ],
            latest_frame_idx: Arc::new(AtomicU64::new(0)),
            last_delivered: None,
            running: Arc::new(AtomicBool::new(false)),
            frame_count: Arc::new(AtomicU64::new(0)),
            thread_handle: None,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    fn open_camera(index: u32, width: u32, height: u32) -> Result<Camera, VideoSourceError> {
        let camera_index = CameraIndex::Index(index);

        let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::HighestResolution(
            Resolution::new(width, height),
        ));

        let mut camera = match Camera::new(camera_index.clone(), requested) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Failed to open camera at {}x{}: {}", width, height, e);

                // Let the driver pick any format
                let fallback = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::None);
                Camera::new(camera_index, fallback).map_err(|e| classify_error(&e.to_string()))?
            }
        };

        camera
            .open_stream()
            .map_err(|e| classify_error(&e.to_string()))?;

        Ok(camera)
    }

    fn capture_thread(
        index: u32,
        width: u32,
        height: u32,
        opened: Sender<Result<(u32, u32), VideoSourceError>>,
        frames: [FrameSlot; 3],
        latest_frame_idx: Arc<AtomicU64>,
        running: Arc<AtomicBool>,
        frame_count: Arc<AtomicU64>,
    ) {
        let mut camera = match Self::open_camera(index, width, height) {
            Ok(camera) => camera,
            Err(e) => {
                let _ = opened.send(Err(e));
                return;
            }
        };

        let resolution = camera.resolution();
        tracing::info!(
            "Camera opened: {} ({}x{})",
            camera.info().human_name(),
            resolution.width(),
            resolution.height()
        );
        let _ = opened.send(Ok((resolution.width(), resolution.height())));

        let mut write_idx: u64 = 0;

        while running.load(Ordering::Acquire) {
            let buffer = match camera.frame() {
                Ok(buffer) => buffer,
                Err(e) => {
                    tracing::warn!("Failed to capture frame: {}", e);
                    std::thread::sleep(Duration::from_millis(10));
                    continue;
                }
            };

            let decoded = match buffer.decode_image::<RgbAFormat>() {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::warn!("Failed to decode frame: {}", e);
                    continue;
                }
            };

            let frame_width = buffer.resolution().width();
            let frame_height = buffer.resolution().height();
            let Some(image) = RgbaImage::from_raw(frame_width, frame_height, decoded.into_raw())
            else {
                tracing::warn!("Decoded frame does not match {}x{}", frame_width, frame_height);
                continue;
            };

            let frame_number = frame_count.fetch_add(1, Ordering::Relaxed);
            let slot = (write_idx % 3) as usize;
            *frames[slot].lock() = Some(VideoFrame::new(image, frame_number));

            latest_frame_idx.store(write_idx, Ordering::Release);
            write_idx = write_idx.wrapping_add(1);
        }

        if let Err(e) = camera.stop_stream() {
            tracing::warn!("Failed to stop camera stream: {}", e);
        }
        tracing::info!("Camera capture thread stopped");
    }
}

/// Map a driver error message onto the two startup failure kinds
fn classify_error(message: &str) -> VideoSourceError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        VideoSourceError::PermissionDenied(message.to_string())
    } else {
        VideoSourceError::DeviceUnavailable(message.to_string())
    }
}

impl VideoSource for CameraSource {
    fn start(&mut self) -> Result<(u32, u32), VideoSourceError> {
        if self.thread_handle.is_some() {
            return Ok((self.width, self.height));
        }

        tracing::info!("Starting camera capture (camera {})", self.index);
        self.running.store(true, Ordering::Release);

        let (opened_tx, opened_rx) = crossbeam_channel::bounded(1);
        let (index, width, height) = (self.index, self.width, self.height);
        let frames = self.frames.clone();
        let latest_frame_idx = self.latest_frame_idx.clone();
        let running = self.running.clone();
        let frame_count = self.frame_count.clone();

        let handle = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                Self::capture_thread(
                    index,
                    width,
                    height,
                    opened_tx,
                    frames,
                    latest_frame_idx,
                    running,
                    frame_count,
                );
            })
            .map_err(|e| {
                VideoSourceError::DeviceUnavailable(format!("failed to spawn capture thread: {}", e))
            })?;
        self.thread_handle = Some(handle);

        let opened = opened_rx
            .recv_timeout(OPEN_TIMEOUT)
            .unwrap_or_else(|_| {
                Err(VideoSourceError::DeviceUnavailable(
                    "camera did not open in time".to_string(),
                ))
            });

        match opened {
            Ok((width, height)) => {
                self.width = width;
                self.height = height;
                Ok((width, height))
            }
            Err(e) => {
                self.stop();
                Err(e)
            }
        }
    }

    fn latest_frame(&mut self) -> Option<VideoFrame> {
        let idx = self.latest_frame_idx.load(Ordering::Acquire);
        let slot = (idx % 3) as usize;
        let frame = self.frames[slot].lock().clone()?;

        if self.last_delivered == Some(frame.frame_number) {
            return None;
        }
        self.last_delivered = Some(frame.frame_number);
        Some(frame)
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop();
    }
}
