//! CPU-side obstacle mask the application draws into
//!
//! The engine hands an [`ObstacleCanvas`] to the obstacle callback whenever the mask
//! is dirty, then uploads the finished canvas into the obstacle surface. Cell centers
//! sit at integer coordinates, matching the stage kernels. Each texel stores
//! `(solid, vx, vy, 0)`.

use crate::core_types::{Rect, Texel, Vec2};
use std::ops::Range;

/// Obstacle mask under construction
#[derive(Debug, Clone, PartialEq)]
pub struct ObstacleCanvas {
    width: usize,
    height: usize,
    texels: Vec<Texel>,
    velocity: Vec2,
}

impl ObstacleCanvas {
    /// Empty canvas (no solid cells)
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            texels: vec![Texel::zeros(); width * height],
            velocity: Vec2::zeros(),
        }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Remove every obstacle and reset the pen velocity
    pub fn clear(&mut self) {
        self.texels.fill(Texel::zeros());
        self.velocity = Vec2::zeros();
    }

    /// Velocity stamped into cells by subsequent fills (zero for static walls)
    pub fn set_velocity(&mut self, velocity: Vec2) {
        self.velocity = velocity;
    }

    /// Mark a single cell; out-of-range coordinates are ignored
    pub fn set(&mut self, x: usize, y: usize, solid: bool) {
        if x >= self.width || y >= self.height {
            return;
        }
        self.texels[y * self.width + x] = if solid {
            Texel::new(1.0, self.velocity.x, self.velocity.y, 0.0)
        } else {
            Texel::zeros()
        };
    }

    #[must_use]
    pub fn is_solid(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.texels[y * self.width + x].x > 0.5
    }

    /// Fill every cell whose center lies inside `rect`
    pub fn fill_rect(&mut self, rect: Rect) {
        self.fill_where(rect.x1, rect.y1, rect.x2, rect.y2, |p| rect.contains(p));
    }

    /// Fill every cell whose center lies within `radius` of `center`
    pub fn fill_circle(&mut self, center: Vec2, radius: f32) {
        let r2 = radius * radius;
        self.fill_where(
            center.x - radius,
            center.y - radius,
            center.x + radius,
            center.y + radius,
            |p| (p - center).norm_squared() <= r2,
        );
    }

    /// Fill a convex quad given by its corners in either winding order
    pub fn fill_quad(&mut self, corners: &[Vec2; 4]) {
        let (mut min, mut max) = (corners[0], corners[0]);
        for c in &corners[1..] {
            min = min.inf(c);
            max = max.sup(c);
        }

        let inside = |p: Vec2| {
            let mut sign = 0.0_f32;
            for i in 0..4 {
                let a = corners[i];
                let b = corners[(i + 1) % 4];
                let edge = b - a;
                let cross = edge.x * (p.y - a.y) - edge.y * (p.x - a.x);
                if cross.abs() <= f32::EPSILON {
                    continue;
                }
                if sign == 0.0 {
                    sign = cross.signum();
                } else if cross.signum() != sign {
                    return false;
                }
            }
            true
        };
        self.fill_where(min.x, min.y, max.x, max.y, inside);
    }

    /// Row-major texels ready for upload
    #[must_use]
    pub fn texels(&self) -> &[Texel] {
        &self.texels
    }

    fn fill_where(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, inside: impl Fn(Vec2) -> bool) {
        let marked = Texel::new(1.0, self.velocity.x, self.velocity.y, 0.0);
        for y in cell_range(y1, y2, self.height) {
            for x in cell_range(x1, x2, self.width) {
                let p = Vec2::new(x as f32, y as f32);
                if inside(p) {
                    self.texels[y * self.width + x] = marked;
                }
            }
        }
    }
}

/// Cells whose centers can fall in `[lo, hi]`, clipped to `0..limit`
fn cell_range(lo: f32, hi: f32, limit: usize) -> Range<usize> {
    if lo.is_nan() || hi.is_nan() || lo > hi || hi < 0.0 || limit == 0 {
        return 0..0;
    }
    let start = lo.ceil().max(0.0) as usize;
    let end = (hi.floor() as usize + 1).min(limit);
    start.min(end)..end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_canvas_is_empty() {
        let canvas = ObstacleCanvas::new(8, 4);
        assert_eq!(canvas.texels().len(), 32);
        assert!((0..4).all(|y| (0..8).all(|x| !canvas.is_solid(x, y))));
    }

    #[test]
    fn test_fill_rect_is_inclusive_and_clipped() {
        let mut canvas = ObstacleCanvas::new(10, 10);
        canvas.fill_rect(Rect::new(8.0, -3.0, 20.0, 1.0));
        assert!(canvas.is_solid(8, 0));
        assert!(canvas.is_solid(9, 1));
        assert!(!canvas.is_solid(7, 0));
        assert!(!canvas.is_solid(8, 2));
    }

    #[test]
    fn test_fill_circle() {
        let mut canvas = ObstacleCanvas::new(16, 16);
        canvas.fill_circle(Vec2::new(8.0, 8.0), 2.0);
        assert!(canvas.is_solid(8, 8));
        assert!(canvas.is_solid(10, 8));
        assert!(!canvas.is_solid(10, 10));
    }

    #[test]
    fn test_fill_quad_both_windings() {
        let ccw = [
            Vec2::new(2.0, 2.0),
            Vec2::new(6.0, 2.0),
            Vec2::new(6.0, 4.0),
            Vec2::new(2.0, 4.0),
        ];
        let mut cw_order = ccw;
        cw_order.reverse();

        for corners in [ccw, cw_order] {
            let mut canvas = ObstacleCanvas::new(8, 8);
            canvas.fill_quad(&corners);
            assert!(canvas.is_solid(4, 3));
            assert!(canvas.is_solid(2, 2));
            assert!(!canvas.is_solid(4, 5));
            assert!(!canvas.is_solid(7, 3));
        }
    }

    #[test]
    fn test_moving_obstacle_velocity_is_stamped() {
        let mut canvas = ObstacleCanvas::new(4, 4);
        canvas.set_velocity(Vec2::new(0.5, -1.0));
        canvas.set(1, 1, true);
        assert_eq!(canvas.texels()[5], Texel::new(1.0, 0.5, -1.0, 0.0));

        canvas.clear();
        assert!(!canvas.is_solid(1, 1));
        canvas.set(1, 1, true);
        assert_eq!(canvas.texels()[5], Texel::new(1.0, 0.0, 0.0, 0.0));
    }
}
