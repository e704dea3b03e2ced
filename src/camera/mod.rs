//! Video frame sources
//!
//! A `VideoSource` is started once, polled for its latest frame on every
//! pipeline tick, and stopped on shutdown. Two sources are provided:
//! - `CameraSource` - native camera capture (`camera` feature)
//! - `ImageSequenceSource` - frames read from a directory of images

#[cfg(feature = "camera")]
pub mod native;

use std::path::{Path, PathBuf};
use std::time::Instant;

use image::RgbaImage;

#[cfg(feature = "camera")]
pub use native::CameraSource;

/// One captured frame, unmirrored
#[derive(Clone, Debug)]
pub struct VideoFrame {
    /// RGBA pixels
    pub image: RgbaImage,
    /// Monotonic frame counter
    pub frame_number: u64,
    /// Capture time
    pub timestamp: Instant,
}

impl VideoFrame {
    pub fn new(image: RgbaImage, frame_number: u64) -> Self {
        Self {
            image,
            frame_number,
            timestamp: Instant::now(),
        }
    }

    /// Black frame of the given size
    pub fn blank(width: u32, height: u32, frame_number: u64) -> Self {
        Self::new(RgbaImage::new(width, height), frame_number)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Largest centred square of the frame
    pub fn center_crop(&self) -> RgbaImage {
        let side = self.width().min(self.height());
        let x = (self.width() - side) / 2;
        let y = (self.height() - side) / 2;
        image::imageops::crop_imm(&self.image, x, y, side, side).to_image()
    }
}

/// Errors from starting a video source
#[derive(Debug, thiserror::Error)]
pub enum VideoSourceError {
    /// Access to the device was refused
    #[error("camera access denied: {0}")]
    PermissionDenied(String),
    /// No usable device or stream
    #[error("video device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Produces frames for the pipeline
pub trait VideoSource {
    /// Acquire the device. Returns the frame size.
    fn start(&mut self) -> Result<(u32, u32), VideoSourceError>;

    /// Newest frame not yet returned, if any
    fn latest_frame(&mut self) -> Option<VideoFrame>;

    /// Release the device. Safe to call more than once.
    fn stop(&mut self);
}

impl<T: VideoSource + ?Sized> VideoSource for Box<T> {
    fn start(&mut self) -> Result<(u32, u32), VideoSourceError> {
        (**self).start()
    }

    fn latest_frame(&mut self) -> Option<VideoFrame> {
        (**self).latest_frame()
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Replays still images from a directory in file name order
pub struct ImageSequenceSource {
    dir: PathBuf,
    looping: bool,
    paths: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
    running: bool,
}

impl ImageSequenceSource {
    pub fn new(dir: impl Into<PathBuf>, looping: bool) -> Self {
        Self {
            dir: dir.into(),
            looping,
            paths: Vec::new(),
            cursor: 0,
            frame_count: 0,
            running: false,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn list_images(dir: &Path) -> Result<Vec<PathBuf>, VideoSourceError> {
        let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                VideoSourceError::PermissionDenied(format!("{}: {}", dir.display(), e))
            }
            _ => VideoSourceError::DeviceUnavailable(format!("{}: {}", dir.display(), e)),
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();
        Ok(paths)
    }
}

impl VideoSource for ImageSequenceSource {
    fn start(&mut self) -> Result<(u32, u32), VideoSourceError> {
        let paths = Self::list_images(&self.dir)?;
        let first = paths.first().ok_or_else(|| {
            VideoSourceError::DeviceUnavailable(format!("no images in {}", self.dir.display()))
        })?;
        let (width, height) = image::image_dimensions(first).map_err(|e| {
            VideoSourceError::DeviceUnavailable(format!("{}: {}", first.display(), e))
        })?;

        tracing::info!(
            dir = %self.dir.display(),
            images = paths.len(),
            width,
            height,
            "Image sequence opened"
        );

        self.paths = paths;
        self.cursor = 0;
        self.running = true;
        Ok((width, height))
    }

    fn latest_frame(&mut self) -> Option<VideoFrame> {
        while self.running {
            if self.cursor >= self.paths.len() {
                if !self.looping || self.paths.is_empty() {
                    return None;
                }
                self.cursor = 0;
            }

            let path = &self.paths[self.cursor];
            self.cursor += 1;

            match image::open(path) {
                Ok(image) => {
                    let frame = VideoFrame::new(image.to_rgba8(), self.frame_count);
                    self.frame_count += 1;
                    return Some(frame);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Failed to decode frame: {}", e);
                    if self.paths.len() == 1 {
                        return None;
                    }
                }
            }
        }
        None
    }

    fn stop(&mut self) {
        if self.running {
            tracing::info!(dir = %self.dir.display(), frames = self.frame_count, "Image sequence stopped");
        }
        self.running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn write_frames(dir: &Path, count: u8) {
        for i in 0..count {
            let image = RgbaImage::from_pixel(8, 6, Rgba([i * 10, 0, 0, 255]));
            image.save(dir.join(format!("frame_{:03}.png", i))).unwrap();
        }
    }

    #[test]
    fn test_center_crop_is_square() {
        let frame = VideoFrame::blank(640, 480, 0);
        let crop = frame.center_crop();
        assert_eq!(crop.dimensions(), (480, 480));
    }

    #[test]
    fn test_sequence_plays_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 3);
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut source = ImageSequenceSource::new(dir.path(), false);
        assert_eq!(source.start().unwrap(), (8, 6));

        let reds: Vec<u8> = std::iter::from_fn(|| source.latest_frame())
            .map(|frame| frame.image.get_pixel(0, 0)[0])
            .collect();
        assert_eq!(reds, vec![0, 10, 20]);
        assert_eq!(source.frame_count(), 3);
    }

    #[test]
    fn test_sequence_loops_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 2);

        let mut source = ImageSequenceSource::new(dir.path(), true);
        source.start().unwrap();
        let numbers: Vec<u64> = (0..5)
            .filter_map(|_| source.latest_frame())
            .map(|frame| frame.frame_number)
            .collect();
        assert_eq!(numbers, vec![0, 1, 2, 3, 4]);

        source.stop();
        assert!(source.latest_frame().is_none());
    }

    #[test]
    fn test_missing_or_empty_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut empty = ImageSequenceSource::new(dir.path(), false);
        assert!(matches!(
            empty.start(),
            Err(VideoSourceError::DeviceUnavailable(_))
        ));

        let mut missing = ImageSequenceSource::new(dir.path().join("nope"), false);
        assert!(matches!(
            missing.start(),
            Err(VideoSourceError::DeviceUnavailable(_))
        ));
    }
}
