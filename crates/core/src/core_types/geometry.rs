//! Rectangles and colors shared by the engine, scene and overlays.

use super::vec3::{Texel, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle given by two corners (`x1 <= x2`, `y1 <= y2`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Rect {
    /// Create a rectangle from two corners
    #[must_use]
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Rectangle covering `[0, width] × [0, height]`
    #[must_use]
    pub const fn from_size(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    /// Square of half-extent `radius` centered on `center`
    #[must_use]
    pub fn around(center: Vec2, radius: f32) -> Self {
        Self::new(
            center.x - radius,
            center.y - radius,
            center.x + radius,
            center.y + radius,
        )
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    #[must_use]
    pub fn center(&self) -> Vec2 {
        Vec2::new((self.x1 + self.x2) * 0.5, (self.y1 + self.y2) * 0.5)
    }

    /// Whether `p` lies inside the rectangle (edges inclusive)
    #[must_use]
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.x1 && p.x <= self.x2 && p.y >= self.y1 && p.y <= self.y2
    }

    /// Rectangle moved by `offset`
    #[must_use]
    pub fn translated(&self, offset: Vec2) -> Self {
        Self::new(
            self.x1 + offset.x,
            self.y1 + offset.y,
            self.x2 + offset.x,
            self.y2 + offset.y,
        )
    }
}

/// Linear RGB color in `[0, 1]` per channel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0);

    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Exact black check, matching how forces decide whether to inject density
    #[must_use]
    pub fn is_black(&self) -> bool {
        self.r == 0.0 && self.g == 0.0 && self.b == 0.0
    }

    /// Channels as a vector scaled by `amount`
    #[must_use]
    pub fn scaled(&self, amount: f32) -> Vec3 {
        Vec3::new(self.r, self.g, self.b) * amount
    }

    /// Pack into a texel with the given alpha
    #[must_use]
    pub fn to_texel(&self, alpha: f32) -> Texel {
        Texel::new(self.r, self.g, self.b, alpha)
    }
}
