//! Vector type aliases for positions, directions and texel values.

use nalgebra::{Vector2, Vector3, Vector4};

/// 2D vector for world/grid positions and velocities.
///
/// Alias for `nalgebra::Vector2<f32>`. World positions are in window pixels,
/// grid positions are in texels (world × scale).
pub type Vec2 = Vector2<f32>;

/// 3D vector, used for impulse values and RGB payloads.
pub type Vec3 = Vector3<f32>;

/// One texel of any field. Unused channels stay zero.
pub type Texel = Vector4<f32>;
