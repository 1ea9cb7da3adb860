//! External forces and their persisted record format
//!
//! A [`Force`] injects temperature, density and momentum into the fields with a
//! smooth radial falloff. The engine keeps two queues: constant forces are applied
//! every tick, temporal forces once.
//!
//! Saved force records store the position as a fraction of the window and the radius
//! as the grid radius at [`REFERENCE_SCALE`]. A record loads as a world-space force,
//! which the engine maps into its grid exactly once, so a file authored at one grid
//! scale loads at the same apparent size at any other.

use crate::core_types::{Color, Vec2};
use serde::{Deserialize, Serialize};

/// Grid scale force radii are stored at
pub const REFERENCE_SCALE: f32 = 0.5;

/// One splat of heat, smoke and momentum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Force {
    /// World space when constructed, grid space once queued
    pub position: Vec2,
    pub velocity: Vec2,
    /// Smoke color, injected as `color * density`
    pub color: Color,
    pub radius: f32,
    /// Temperature delta
    pub temperature: f32,
    /// Density delta
    pub density: f32,
}

impl Default for Force {
    fn default() -> Self {
        Self {
            position: Vec2::zeros(),
            velocity: Vec2::zeros(),
            color: Color::BLACK,
            radius: 1.0,
            temperature: 10.0,
            density: 1.0,
        }
    }
}

impl Force {
    #[must_use]
    pub fn new(position: Vec2, velocity: Vec2, color: Color, radius: f32) -> Self {
        Self {
            position,
            velocity,
            color,
            radius,
            ..Self::default()
        }
    }

    /// Copy mapped from world space into a grid at `scale`
    #[must_use]
    pub fn scaled(&self, scale: f32) -> Self {
        Self {
            position: self.position * scale,
            radius: self.radius * scale,
            ..*self
        }
    }
}

/// Constant and temporal force lists, already in grid space
#[derive(Debug, Clone, Default)]
pub struct ForceQueue {
    constant: Vec<Force>,
    temporal: Vec<Force>,
}

impl ForceQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_constant(&mut self, force: Force) {
        self.constant.push(force);
    }

    pub fn push_temporal(&mut self, force: Force) {
        self.temporal.push(force);
    }

    #[must_use]
    pub fn constant(&self) -> &[Force] {
        &self.constant
    }

    #[must_use]
    pub fn temporal(&self) -> &[Force] {
        &self.temporal
    }

    /// Forces for this tick in application order: temporal first, then constant
    pub fn for_tick(&self) -> impl Iterator<Item = &Force> {
        self.temporal.iter().chain(self.constant.iter())
    }

    /// Drop the temporal forces after they have been applied
    pub fn clear_temporal(&mut self) {
        self.temporal.clear();
    }
}

/// Plain `{x, y}` pair as written in force records
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Xy {
    pub x: f32,
    pub y: f32,
}

/// Persisted form of a [`Force`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ForceRecord {
    /// Fraction of the window size
    pub position: Xy,
    pub velocity: Xy,
    pub color: Color,
    /// Radius at [`REFERENCE_SCALE`]
    pub radius: f32,
    pub temperature: f32,
    pub density: f32,
}

impl ForceRecord {
    /// Record a world-space force authored in a window of `size`
    #[must_use]
    pub fn from_force(force: &Force, size: Vec2) -> Self {
        Self {
            position: Xy {
                x: force.position.x / size.x,
                y: force.position.y / size.y,
            },
            velocity: Xy {
                x: force.velocity.x,
                y: force.velocity.y,
            },
            color: force.color,
            radius: force.radius * REFERENCE_SCALE,
            temperature: force.temperature,
            density: force.density,
        }
    }

    /// World-space force for a window of `size`
    #[must_use]
    pub fn to_force(&self, size: Vec2) -> Force {
        Force {
            position: Vec2::new(self.position.x * size.x, self.position.y * size.y),
            velocity: Vec2::new(self.velocity.x, self.velocity.y),
            color: self.color,
            radius: self.radius / REFERENCE_SCALE,
            temperature: self.temperature,
            density: self.density,
        }
    }

    /// Radius in texels of a grid at `scale`
    #[must_use]
    pub fn grid_radius(&self, scale: f32) -> f32 {
        self.radius * (scale / REFERENCE_SCALE)
    }
}
