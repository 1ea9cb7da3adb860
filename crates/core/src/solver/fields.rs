//! Field storage for the CPU backend and the format tags shared by both backends
//!
//! Every field is stored as one `vec4<f32>` per texel on both backends; the
//! [`FieldFormat`] records how many channels carry meaning so readbacks and
//! texture blends can ignore the rest.

use crate::core_types::{Texel, Vec2};

/// Channel layout of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldFormat {
    /// Scalar fields: temperature, pressure, divergence
    R32F,
    /// Velocity (xy, z unused) and the obstacle mask (solid, vx, vy)
    RGB32F,
    /// Density color + alpha
    RGBA32F,
}

impl FieldFormat {
    /// Number of meaningful channels
    #[must_use]
    pub const fn channels(self) -> usize {
        match self {
            Self::R32F => 1,
            Self::RGB32F => 3,
            Self::RGBA32F => 4,
        }
    }

    /// Per-channel mask with 1.0 in meaningful channels
    #[must_use]
    pub fn mask(self) -> Texel {
        match self {
            Self::R32F => Texel::new(1.0, 0.0, 0.0, 0.0),
            Self::RGB32F => Texel::new(1.0, 1.0, 1.0, 0.0),
            Self::RGBA32F => Texel::new(1.0, 1.0, 1.0, 1.0),
        }
    }
}

/// Field data container for CPU backend
///
/// Stores 2D field data as a flat `Vec<Texel>` in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldData {
    /// Field values in row-major order (y * width + x)
    pub data: Vec<Texel>,
    /// Grid width in cells
    pub width: usize,
    /// Grid height in cells
    pub height: usize,
    /// Channel layout
    pub format: FieldFormat,
}

impl FieldData {
    /// Create a new field with given dimensions, initialized to zero
    #[must_use]
    pub fn new(width: usize, height: usize, format: FieldFormat) -> Self {
        Self::with_value(width, height, format, Texel::zeros())
    }

    /// Create a new field with every texel set to `value`
    ///
    /// Channels the format does not carry are zeroed.
    #[must_use]
    pub fn with_value(width: usize, height: usize, format: FieldFormat, value: Texel) -> Self {
        Self {
            data: vec![value.component_mul(&format.mask()); width * height],
            width,
            height,
            format,
        }
    }

    /// Get reference to field data
    #[must_use]
    pub fn as_slice(&self) -> &[Texel] {
        &self.data
    }

    /// Get mutable reference to field data
    pub fn as_mut_slice(&mut self) -> &mut [Texel] {
        &mut self.data
    }

    /// Row-major index of a cell
    #[inline]
    #[must_use]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Get value at grid position
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Texel {
        assert!(
            x < self.width && y < self.height,
            "Coordinates out of bounds"
        );
        self.data[y * self.width + x]
    }

    /// Set value at grid position
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    pub fn set(&mut self, x: usize, y: usize, value: Texel) {
        assert!(
            x < self.width && y < self.height,
            "Coordinates out of bounds"
        );
        self.data[y * self.width + x] = value;
    }

    /// Fill entire field with a value
    pub fn fill(&mut self, value: Texel) {
        self.data.fill(value.component_mul(&self.format.mask()));
    }

    /// Bilinear sample at grid position `p`, clamped to the grid
    #[must_use]
    pub fn sample(&self, p: Vec2) -> Texel {
        sample_bilinear(&self.data, self.width, self.height, p)
    }

    /// Sum of the first channel over the grid
    #[must_use]
    pub fn sum_x(&self) -> f64 {
        self.data.iter().map(|t| f64::from(t.x)).sum()
    }

    /// Largest absolute channel value over the grid
    #[must_use]
    pub fn max_abs(&self) -> f32 {
        self.data
            .iter()
            .map(|t| t.abs().max())
            .fold(0.0_f32, f32::max)
    }
}

/// Bilinear sample of a row-major texel grid at `p`, clamped to the edges
///
/// Shared by the CPU advection pass and the overlays, which sample readbacks.
/// `texels` must hold `width * height` entries and neither dimension may be zero.
#[must_use]
pub fn sample_bilinear(texels: &[Texel], width: usize, height: usize, p: Vec2) -> Texel {
    let max_x = width - 1;
    let max_y = height - 1;
    let x0 = (p.x.floor().max(0.0) as usize).min(max_x);
    let y0 = (p.y.floor().max(0.0) as usize).min(max_y);
    let x1 = (x0 + 1).min(max_x);
    let y1 = (y0 + 1).min(max_y);
    let fx = (p.x - x0 as f32).clamp(0.0, 1.0);
    let fy = (p.y - y0 as f32).clamp(0.0, 1.0);

    let a = texels[y0 * width + x0];
    let b = texels[y0 * width + x1];
    let c = texels[y1 * width + x0];
    let d = texels[y1 * width + x1];

    let bottom = a + (b - a) * fx;
    let top = c + (d - c) * fx;
    bottom + (top - bottom) * fy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_creation() {
        let field = FieldData::new(10, 20, FieldFormat::R32F);
        assert_eq!(field.width, 10);
        assert_eq!(field.height, 20);
        assert_eq!(field.data.len(), 200);
        assert!(field.data.iter().all(|&v| v == Texel::zeros()));
    }

    #[test]
    fn test_with_value_masks_unused_channels() {
        let field = FieldData::with_value(4, 4, FieldFormat::R32F, Texel::new(2.0, 3.0, 4.0, 5.0));
        assert_eq!(field.get(1, 1), Texel::new(2.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_field_get_set() {
        let mut field = FieldData::new(10, 10, FieldFormat::RGBA32F);
        let v = Texel::new(0.1, 0.2, 0.3, 1.0);
        field.set(5, 5, v);
        assert_eq!(field.get(5, 5), v);
        assert_eq!(field.get(4, 5), Texel::zeros());
    }

    #[test]
    #[should_panic(expected = "Coordinates out of bounds")]
    fn test_field_bounds_check() {
        let field = FieldData::new(10, 10, FieldFormat::R32F);
        let _ = field.get(10, 5);
    }

    #[test]
    fn test_field_fill_and_stats() {
        let mut field = FieldData::new(4, 4, FieldFormat::RGB32F);
        field.fill(Texel::new(-2.0, 1.0, 0.0, 9.0));
        assert_eq!(field.get(3, 3), Texel::new(-2.0, 1.0, 0.0, 0.0));
        assert_eq!(field.sum_x(), -32.0);
        assert_eq!(field.max_abs(), 2.0);
    }

    #[test]
    fn test_sample_interpolates_and_clamps() {
        let mut field = FieldData::new(2, 2, FieldFormat::R32F);
        field.set(1, 0, Texel::new(4.0, 0.0, 0.0, 0.0));
        field.set(1, 1, Texel::new(4.0, 0.0, 0.0, 0.0));
        assert_eq!(field.sample(Vec2::new(0.5, 0.5)).x, 2.0);
        assert_eq!(field.sample(Vec2::new(-3.0, 0.0)).x, 0.0);
        assert_eq!(field.sample(Vec2::new(9.0, 9.0)).x, 4.0);
    }
}
