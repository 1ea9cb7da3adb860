//! Line-segment visualization of the velocity field

use crate::core_types::{Texel, Vec2, Vec3};
use crate::timeline::Property;
use serde::{Deserialize, Serialize};

/// Spacing between segment starts, in texels
pub const SEGMENT_SPACING: usize = 2;

/// One drawable line, in window pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Vec2,
    pub end: Vec2,
    pub color: Vec3,
    pub alpha: f32,
}

/// Grid of short horizontal segments bent by the flow
///
/// Each segment spans [`SEGMENT_SPACING`] texels. Both endpoints are pushed along the
/// local velocity by `weight`, and the color blends from white toward the local
/// density by `color_weight`. Hidden while `alpha` is zero, which it is by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowField {
    pub alpha: Property<f32>,
    pub color_weight: Property<f32>,
    /// Distortion applied to the endpoints
    pub weight: Property<f32>,
}

impl Default for FlowField {
    fn default() -> Self {
        Self {
            alpha: Property::new(0.0),
            color_weight: Property::new(0.3),
            weight: Property::new(0.4),
        }
    }
}

impl FlowField {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anything is drawn at `t`
    #[must_use]
    pub fn visible(&self, t: f32) -> bool {
        self.alpha.value_at(t) > 0.0
    }

    /// Segments for time `t` from velocity and density readbacks on a `grid_size`
    /// grid built at `scale`
    ///
    /// Returns nothing while hidden or when the readbacks do not match the grid.
    #[must_use]
    pub fn segments(
        &self,
        t: f32,
        velocity: &[Texel],
        density: &[Texel],
        grid_size: (u32, u32),
        scale: f32,
    ) -> Vec<Segment> {
        let alpha = self.alpha.value_at(t);
        let (width, height) = (grid_size.0 as usize, grid_size.1 as usize);
        let cells = width * height;
        if alpha <= 0.0
            || cells == 0
            || velocity.len() != cells
            || density.len() != cells
            || scale <= 0.0
        {
            return Vec::new();
        }

        let weight = self.weight.value_at(t);
        let color_weight = self.color_weight.value_at(t);
        let to_world = 1.0 / scale;

        let endpoint = |x: usize, y: usize| -> Vec2 {
            let cx = x.min(width - 1);
            let cy = y.min(height - 1);
            let v = velocity[cy * width + cx];
            (Vec2::new(x as f32, y as f32) + Vec2::new(v.x, v.y) * weight) * to_world
        };

        let mut segments = Vec::with_capacity(cells / (SEGMENT_SPACING * SEGMENT_SPACING));
        for y in (0..height).step_by(SEGMENT_SPACING) {
            for x in (0..width).step_by(SEGMENT_SPACING) {
                let d = density[y * width + x];
                let white = Vec3::new(1.0, 1.0, 1.0);
                let color = white + (Vec3::new(d.x, d.y, d.z) - white) * color_weight;
                segments.push(Segment {
                    start: endpoint(x, y),
                    end: endpoint(x + SEGMENT_SPACING, y),
                    color,
                    alpha,
                });
            }
        }
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hidden_by_default() {
        let f = FlowField::new();
        assert!(!f.visible(0.0));
        let v = vec![Texel::zeros(); 16];
        assert!(f.segments(0.0, &v, &v, (4, 4), 1.0).is_empty());
    }

    #[test]
    fn test_segment_layout_and_color() {
        let mut f = FlowField::new();
        f.alpha = Property::new(0.5);
        let velocity = vec![Texel::zeros(); 8 * 4];
        let density = vec![Texel::new(0.0, 1.0, 0.0, 1.0); 8 * 4];

        let segs = f.segments(0.0, &velocity, &density, (8, 4), 0.5);
        assert_eq!(segs.len(), 8);
        assert_eq!(segs[0].start, Vec2::new(0.0, 0.0));
        assert_eq!(segs[0].end, Vec2::new(4.0, 0.0));
        assert_eq!(segs[5].start, Vec2::new(4.0, 4.0));
        assert_relative_eq!(segs[0].color.x, 0.7);
        assert_relative_eq!(segs[0].color.y, 1.0);
        assert_relative_eq!(segs[0].alpha, 0.5);
    }

    #[test]
    fn test_endpoints_follow_velocity() {
        let mut f = FlowField::new();
        f.alpha = Property::new(1.0);
        let velocity = vec![Texel::new(0.0, 10.0, 0.0, 0.0); 4 * 4];
        let density = vec![Texel::zeros(); 4 * 4];

        let segs = f.segments(0.0, &velocity, &density, (4, 4), 1.0);
        assert_relative_eq!(segs[0].start.y, 4.0);
        assert_relative_eq!(segs[0].end.y, 4.0);
    }
}
