//! Simulation tunables and the per-stage constants derived from them

use crate::core_types::Vec2;
use crate::timeline::Property;
use serde::{Deserialize, Serialize};

/// Attractors the buoyancy stage can take per tick
pub const MAX_ATTRACTORS: usize = 4;

/// Tunable parameters of the fluid solver
///
/// Mutated freely by the owning application between ticks; the engine samples the
/// keyframed values once at the start of each tick and never validates them.
/// Dissipation outside `[0, 1)` is accepted and will visibly destabilize the flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParameters {
    /// Per-tick damping of the density field
    pub density_dissipation: f32,
    /// Per-tick damping of the velocity field
    pub velocity_dissipation: f32,
    /// Per-tick damping of the temperature field
    pub temperature_dissipation: f32,
    /// Stored for scene compatibility. Pressure restarts from zero every tick, so
    /// no stage reads it.
    pub pressure_dissipation: f32,
    /// Gravity; buoyancy pushes against it
    pub gravity: Property<Vec2>,
    /// Buoyancy coefficient (sigma)
    pub smoke_buoyancy: Property<f32>,
    /// Smoke weight coefficient (kappa)
    pub smoke_weight: Property<f32>,
    /// Temperature with zero buoyancy, also the temperature field's reset value
    pub ambient_temperature: Property<f32>,
    /// Jacobi relaxation steps per tick
    pub jacobi_iterations: u32,
    /// Fixed step used by every stage, independent of wall-clock time
    pub time_step: f32,
    /// Grid spacing `h`
    pub cell_size: f32,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            density_dissipation: 0.99,
            velocity_dissipation: 0.994,
            temperature_dissipation: 0.99,
            pressure_dissipation: 0.9,
            gravity: Property::new(Vec2::new(0.0, -0.98)),
            smoke_buoyancy: Property::new(1.0),
            smoke_weight: Property::new(0.05),
            ambient_temperature: Property::new(0.0),
            jacobi_iterations: 40,
            time_step: 0.125,
            cell_size: 1.25,
        }
    }
}

impl SimulationParameters {
    /// Constants of the projection stages for the current cell size and step
    #[must_use]
    pub fn stage_constants(&self) -> StageConstants {
        StageConstants::new(self.cell_size, self.time_step)
    }

    /// Buoyancy inputs sampled at sequencer time `t`
    ///
    /// Attractors beyond [`MAX_ATTRACTORS`] are dropped.
    #[must_use]
    pub fn buoyancy_at(&self, t: f32, attractors: &[AttractorParams]) -> BuoyancyParams {
        BuoyancyParams {
            time_step: self.time_step,
            ambient_temperature: self.ambient_temperature.value_at(t),
            sigma: self.smoke_buoyancy.value_at(t),
            kappa: self.smoke_weight.value_at(t),
            gravity: self.gravity.value_at(t),
            attractors: attractors.iter().take(MAX_ATTRACTORS).copied().collect(),
        }
    }
}

/// Fixed coefficients of the advection and projection stages
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageConstants {
    pub time_step: f32,
    /// `0.5 / h`, scales central differences in the divergence stage
    pub half_inverse_cell_size: f32,
    /// `0.5 / h`, scales the central-difference pressure gradient
    pub gradient_scale: f32,
    /// `-h²`
    pub alpha: f32,
    /// `1 / 4` for the 5-point stencil
    pub inverse_beta: f32,
}

impl StageConstants {
    #[must_use]
    pub fn new(cell_size: f32, time_step: f32) -> Self {
        Self {
            time_step,
            half_inverse_cell_size: 0.5 / cell_size,
            gradient_scale: 0.5 / cell_size,
            alpha: -cell_size * cell_size,
            inverse_beta: 0.25,
        }
    }
}

/// One attractor in grid space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AttractorParams {
    pub position: Vec2,
    pub radius: f32,
    /// Positive pulls toward `position`, negative pushes away
    pub force: f32,
}

/// Inputs of the buoyancy stage for one tick
#[derive(Debug, Clone, PartialEq)]
pub struct BuoyancyParams {
    pub time_step: f32,
    pub ambient_temperature: f32,
    pub sigma: f32,
    pub kappa: f32,
    pub gravity: Vec2,
    pub attractors: Vec<AttractorParams>,
}

/// Smooth radial falloff: 1 at the center, 0 at `radius`, zero slope at both ends
#[inline]
#[must_use]
pub fn smooth_falloff(distance: f32, radius: f32) -> f32 {
    if radius <= 0.0 {
        return 0.0;
    }
    let t = (1.0 - distance / radius).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_constants() {
        let p = SimulationParameters::default();
        let c = p.stage_constants();
        assert_relative_eq!(c.alpha, -1.5625);
        assert_relative_eq!(c.half_inverse_cell_size, 0.4);
        assert_relative_eq!(c.gradient_scale, 0.4);
        assert_eq!(c.inverse_beta, 0.25);
        assert_eq!(p.jacobi_iterations, 40);
    }

    #[test]
    fn test_buoyancy_truncates_attractors() {
        let p = SimulationParameters::default();
        let many = vec![AttractorParams::default(); 6];
        let b = p.buoyancy_at(0.0, &many);
        assert_eq!(b.attractors.len(), MAX_ATTRACTORS);
        assert_eq!(b.gravity, Vec2::new(0.0, -0.98));
    }

    #[test]
    fn test_smooth_falloff_shape() {
        assert_eq!(smooth_falloff(0.0, 4.0), 1.0);
        assert_eq!(smooth_falloff(4.0, 4.0), 0.0);
        assert_eq!(smooth_falloff(9.0, 4.0), 0.0);
        assert_relative_eq!(smooth_falloff(2.0, 4.0), 0.5);
        assert_eq!(smooth_falloff(1.0, 0.0), 0.0);
    }

    #[test]
    fn test_parameters_partial_json_uses_defaults() {
        let p: SimulationParameters =
            serde_json::from_str(r#"{ "density_dissipation": 0.995 }"#).unwrap();
        assert_eq!(p.density_dissipation, 0.995);
        assert_eq!(p.velocity_dissipation, 0.994);
    }
}
