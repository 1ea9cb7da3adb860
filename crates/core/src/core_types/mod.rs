//! Core types and utilities

pub mod geometry;
pub mod vec3;

pub use geometry::{Color, Rect};
pub use vec3::{Texel, Vec2, Vec3};
