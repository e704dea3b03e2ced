//! 2D overlay rendering
//!
//! `CanvasRenderer` composes each tick into an RGBA canvas: the video frame
//! mirrored horizontally, then each sprite centred on its flipped anchor.
//! A sprite is drawn at its native size divided by the directive scale.

use std::collections::HashMap;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};

use super::SpriteId;
use crate::camera::VideoFrame;

/// Rendering errors
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to load sprite `{sprite}`: {source}")]
    SpriteLoad {
        sprite: SpriteId,
        #[source]
        source: image::ImageError,
    },
    #[error("sprite `{0}` is not loaded")]
    MissingSprite(SpriteId),
    #[error("invalid sprite scale {0}")]
    InvalidScale(f32),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Draw target of the frame pipeline
pub trait OverlayRenderer {
    fn clear(&mut self);

    /// Draw the frame flipped horizontally so the preview acts like a mirror
    fn draw_mirrored_video_frame(&mut self, frame: &VideoFrame);

    /// Draw `sprite` centred on the unmirrored anchor (`x`, `y`)
    fn draw_sprite(&mut self, sprite: SpriteId, x: f32, y: f32, scale: f32) -> Result<(), RenderError>;
}

/// Preloaded sprite images
#[derive(Clone, Debug, Default)]
pub struct SpriteAtlas {
    sprites: HashMap<SpriteId, RgbaImage>,
}

impl SpriteAtlas {
    /// Load `<name>.png` for every sprite in the asset set
    pub fn load_dir(dir: &Path) -> Result<Self, RenderError> {
        let mut sprites = HashMap::new();
        for sprite in SpriteId::ALL {
            let path = dir.join(format!("{}.png", sprite.as_str()));
            let image = image::open(&path)
                .map_err(|source| RenderError::SpriteLoad { sprite, source })?
                .to_rgba8();
            tracing::debug!(%sprite, width = image.width(), height = image.height(), "Loaded sprite");
            sprites.insert(sprite, image);
        }
        tracing::info!("Loaded {} sprites from {:?}", sprites.len(), dir);
        Ok(Self { sprites })
    }

    pub fn from_images(images: impl IntoIterator<Item = (SpriteId, RgbaImage)>) -> Self {
        Self {
            sprites: images.into_iter().collect(),
        }
    }

    pub fn get(&self, sprite: SpriteId) -> Option<&RgbaImage> {
        self.sprites.get(&sprite)
    }
}

/// Software renderer into an RGBA canvas
pub struct CanvasRenderer {
    atlas: SpriteAtlas,
    canvas: RgbaImage,
}

impl CanvasRenderer {
    pub fn new(atlas: SpriteAtlas, width: u32, height: u32) -> Self {
        Self {
            atlas,
            canvas: RgbaImage::new(width, height),
        }
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn save_png(&self, path: &Path) -> Result<(), RenderError> {
        self.canvas.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}

impl OverlayRenderer for CanvasRenderer {
    fn clear(&mut self) {
        for pixel in self.canvas.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    fn draw_mirrored_video_frame(&mut self, frame: &VideoFrame) {
        // The canvas follows the video size
        if self.canvas.dimensions() != frame.image.dimensions() {
            self.canvas = RgbaImage::new(frame.image.width(), frame.image.height());
        }
        let mirrored = imageops::flip_horizontal(&frame.image);
        imageops::overlay(&mut self.canvas, &mirrored, 0, 0);
    }

    fn draw_sprite(&mut self, sprite: SpriteId, x: f32, y: f32, scale: f32) -> Result<(), RenderError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(RenderError::InvalidScale(scale));
        }
        let image = self.atlas.get(sprite).ok_or(RenderError::MissingSprite(sprite))?;

        let width = (image.width() as f32 / scale).round();
        let height = (image.height() as f32 / scale).round();
        if width < 1.0 || height < 1.0 {
            return Ok(());
        }

        let resized = imageops::resize(image, width as u32, height as u32, FilterType::Triangle);

        let flipped_x = self.canvas.width() as f32 - x;
        let left = (flipped_x - width / 2.0).round() as i64;
        let top = (y - height / 2.0).round() as i64;

        imageops::overlay(&mut self.canvas, &resized, left, top);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

    fn atlas(size: u32) -> SpriteAtlas {
        SpriteAtlas::from_images(
            SpriteId::ALL
                .into_iter()
                .map(|id| (id, RgbaImage::from_pixel(size, size, GREEN))),
        )
    }

    #[test]
    fn test_video_is_drawn_over_canvas_until_cleared() {
        let red = VideoFrame::new(RgbaImage::from_pixel(2, 1, Rgba([255, 0, 0, 255])), 0);
        let transparent = VideoFrame::new(RgbaImage::new(2, 1), 1);

        let mut renderer = CanvasRenderer::new(atlas(4), 2, 1);
        renderer.draw_mirrored_video_frame(&red);
        renderer.draw_mirrored_video_frame(&transparent);
        assert_eq!(*renderer.canvas().get_pixel(0, 0), Rgba([255, 0, 0, 255]));

        renderer.clear();
        renderer.draw_mirrored_video_frame(&transparent);
        assert!(renderer.canvas().pixels().all(|p| *p == Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn test_video_is_mirrored() {
        let mut image = RgbaImage::new(4, 2);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let frame = VideoFrame::new(image, 0);

        let mut renderer = CanvasRenderer::new(atlas(4), 1, 1);
        renderer.clear();
        renderer.draw_mirrored_video_frame(&frame);

        assert_eq!(renderer.canvas().dimensions(), (4, 2));
        assert_eq!(renderer.canvas().get_pixel(3, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(renderer.canvas().get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_sprite_centred_on_flipped_anchor() {
        let mut renderer = CanvasRenderer::new(atlas(4), 20, 20);
        renderer.draw_mirrored_video_frame(&VideoFrame::blank(20, 20, 0));

        // 4px sprite at scale 2 is drawn 2px wide, centred on (20 - 5, 10)
        renderer.draw_sprite(SpriteId::Peace, 5.0, 10.0, 2.0).unwrap();

        let canvas = renderer.canvas();
        assert_eq!(canvas.get_pixel(14, 9), &GREEN);
        assert_eq!(canvas.get_pixel(15, 10), &GREEN);
        assert_ne!(canvas.get_pixel(13, 9), &GREEN);
        assert_ne!(canvas.get_pixel(16, 10), &GREEN);
        assert_ne!(canvas.get_pixel(14, 8), &GREEN);
    }

    #[test]
    fn test_small_scale_enlarges_sprite() {
        let mut renderer = CanvasRenderer::new(atlas(4), 40, 40);
        renderer.draw_mirrored_video_frame(&VideoFrame::blank(40, 40, 0));
        renderer.draw_sprite(SpriteId::Heart01, 20.0, 20.0, 0.5).unwrap();

        let green = renderer.canvas().pixels().filter(|p| **p == GREEN).count();
        assert_eq!(green, 64);
    }

    #[test]
    fn test_sprite_off_canvas_is_clipped() {
        let mut renderer = CanvasRenderer::new(atlas(4), 10, 10);
        renderer.draw_mirrored_video_frame(&VideoFrame::blank(10, 10, 0));
        renderer.draw_sprite(SpriteId::Star, -50.0, 5.0, 1.0).unwrap();
        assert!(renderer.canvas().pixels().all(|p| *p != GREEN));
    }

    #[test]
    fn test_invalid_scale_and_missing_sprite() {
        let mut renderer = CanvasRenderer::new(SpriteAtlas::default(), 10, 10);
        assert!(matches!(
            renderer.draw_sprite(SpriteId::Star, 5.0, 5.0, 0.0),
            Err(RenderError::InvalidScale(_))
        ));
        assert!(matches!(
            renderer.draw_sprite(SpriteId::Star, 5.0, 5.0, 1.0),
            Err(RenderError::MissingSprite(SpriteId::Star))
        ));
    }

    #[test]
    fn test_atlas_loads_every_sprite() {
        let dir = tempfile::tempdir().unwrap();
        for sprite in SpriteId::ALL {
            RgbaImage::from_pixel(3, 3, GREEN)
                .save(dir.path().join(format!("{}.png", sprite)))
                .unwrap();
        }
        let loaded = SpriteAtlas::load_dir(dir.path()).unwrap();
        assert_eq!(loaded.get(SpriteId::Heart02).unwrap().dimensions(), (3, 3));

        std::fs::remove_file(dir.path().join("heart02.png")).unwrap();
        assert!(matches!(
            SpriteAtlas::load_dir(dir.path()),
            Err(RenderError::SpriteLoad {
                sprite: SpriteId::Heart02,
                ..
            })
        ));
    }

    #[test]
    fn test_save_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.png");
        let mut renderer = CanvasRenderer::new(atlas(2), 6, 4);
        renderer.draw_mirrored_video_frame(&VideoFrame::blank(6, 4, 0));
        renderer.save_png(&path).unwrap();
        assert_eq!(image::image_dimensions(&path).unwrap(), (6, 4));
    }
}
