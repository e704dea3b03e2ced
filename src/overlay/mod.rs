//! Overlay placement
//!
//! Maps a resolved gesture on a measured hand to the sprite, anchor and
//! scale the renderer should draw. Anchors are in unmirrored frame pixels;
//! the renderer flips x when it draws onto the mirrored video.
//!
//! Fingertip anchors take x from the midpoint of the two tips and y from the
//! index tip, shifted by the anchor offset.

pub mod renderer;

use serde::{Deserialize, Serialize};

use crate::gesture::Gesture;
use crate::hand::{MeasuredHand, Point};

pub use renderer::{CanvasRenderer, OverlayRenderer, RenderError, SpriteAtlas};

/// Default vertical shift applied to fingertip anchors
pub const DEFAULT_ANCHOR_OFFSET_Y: f32 = -30.0;

/// Sprites in the overlay asset set
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpriteId {
    Star,
    Peace,
    Heart01,
    Heart02,
    Heart03,
}

impl SpriteId {
    pub const ALL: [SpriteId; 5] = [
        SpriteId::Star,
        SpriteId::Peace,
        SpriteId::Heart01,
        SpriteId::Heart02,
        SpriteId::Heart03,
    ];

    /// Asset name, also the sprite file stem
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Star => "star",
            Self::Peace => "peace",
            Self::Heart01 => "heart01",
            Self::Heart02 => "heart02",
            Self::Heart03 => "heart03",
        }
    }
}

impl std::fmt::Display for SpriteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to draw for one hand
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacementDirective {
    pub sprite: SpriteId,
    pub anchor_x: f32,
    pub anchor_y: f32,
    pub scale: f32,
}

/// Gesture to placement lookup
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacementResolver {
    anchor_offset_y: f32,
}

impl Default for PlacementResolver {
    fn default() -> Self {
        Self::new(DEFAULT_ANCHOR_OFFSET_Y)
    }
}

impl PlacementResolver {
    pub fn new(anchor_offset_y: f32) -> Self {
        Self { anchor_offset_y }
    }

    pub fn anchor_offset_y(&self) -> f32 {
        self.anchor_offset_y
    }

    /// Placement for `gesture` on `hand`. `None` means nothing is drawn.
    pub fn resolve(&self, gesture: Option<Gesture>, hand: &MeasuredHand) -> Option<PlacementDirective> {
        let fingers = &hand.fingers;
        let scale_factor = hand.metrics.scale_factor;

        let (sprite, anchor, multiplier) = match gesture? {
            Gesture::PeaceSign => (
                SpriteId::Peace,
                self.above_index_tip(fingers.index_tip.midpoint(fingers.middle_tip), fingers.index_tip),
                3.0,
            ),
            Gesture::CheekHeart => (
                SpriteId::Heart01,
                Point::new(fingers.pinky_mcp.x, fingers.middle_mcp.y),
                2.0,
            ),
            Gesture::FingerHeart => (
                SpriteId::Heart03,
                self.above_index_tip(fingers.thumb_tip.midpoint(fingers.index_tip), fingers.index_tip),
                2.0,
            ),
            Gesture::CheekPeace => (
                SpriteId::Star,
                self.offset(Point::new(fingers.pinky_mcp.x, fingers.middle_mcp.y)),
                2.0,
            ),
        };

        Some(PlacementDirective {
            sprite,
            anchor_x: anchor.x,
            anchor_y: anchor.y,
            scale: multiplier * scale_factor,
        })
    }

    fn offset(&self, point: Point) -> Point {
        Point::new(point.x, point.y + self.anchor_offset_y)
    }

    fn above_index_tip(&self, midpoint: Point, index_tip: Point) -> Point {
        self.offset(Point::new(midpoint.x, index_tip.y))
    }
}
