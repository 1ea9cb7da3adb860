//! Tracer particles carried by the velocity field

use crate::core_types::{Texel, Vec2};
use crate::solver::sample_bilinear;
use crate::timeline::Property;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// One tracer. Position and velocity are in window pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Seconds left before respawning at `origin`
    pub life: f32,
    origin: Vec2,
    initial_life: f32,
}

impl Particle {
    fn spawn(origin: Vec2, life: f32) -> Self {
        Self {
            position: origin,
            velocity: Vec2::zeros(),
            life,
            origin,
            initial_life: life,
        }
    }

    /// Where the particle returns when its life runs out
    #[must_use]
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    /// Remaining life as a fraction of the spawn life
    #[must_use]
    pub fn life_fraction(&self) -> f32 {
        if self.initial_life > 0.0 {
            (self.life / self.initial_life).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Drawable state of one particle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sprite {
    pub position: Vec2,
    pub size: f32,
    pub alpha: f32,
}

/// Keyframed look and motion of the particle layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleSettings {
    pub alpha: Property<f32>,
    /// Fraction of velocity kept per update
    pub velocity_damping: Property<f32>,
    /// Fraction of the sampled fluid velocity added per update
    pub velocity_multiplier: Property<f32>,
    pub max_particle_size: Property<f32>,
}

impl Default for ParticleSettings {
    fn default() -> Self {
        Self {
            alpha: Property::new(1.0),
            velocity_damping: Property::new(0.96),
            velocity_multiplier: Property::new(0.004),
            max_particle_size: Property::new(16.0),
        }
    }
}

/// Square grid of `2^k × 2^k` tracers scattered over the window
///
/// Read-only consumer of the fluid: it samples a velocity readback and never writes
/// back into the engine.
#[derive(Debug, Clone)]
pub struct ParticleOverlay {
    particles: Vec<Particle>,
    resolution: usize,
    pub settings: ParticleSettings,
}

impl ParticleOverlay {
    /// Scatter `2^power × 2^power` particles over a window of `window` pixels
    #[must_use]
    pub fn new(power: u32, window: Vec2) -> Self {
        Self::with_rng(power, window, &mut rand::rng())
    }

    /// Same as [`ParticleOverlay::new`] with a caller-supplied generator
    pub fn with_rng<R: Rng + ?Sized>(power: u32, window: Vec2, rng: &mut R) -> Self {
        let resolution = 1_usize << power;
        let particles = (0..resolution * resolution)
            .map(|_| {
                let origin = Vec2::new(
                    rng.random::<f32>() * window.x,
                    rng.random::<f32>() * window.y,
                );
                Particle::spawn(origin, 1.0 + rng.random_range(0.0..8.0))
            })
            .collect();

        Self {
            particles,
            resolution,
            settings: ParticleSettings::default(),
        }
    }

    /// Particles per side
    #[must_use]
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    #[must_use]
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Advance every particle by one frame of `dt` seconds
    ///
    /// `velocity` is a readback of the velocity field on a `grid_size` grid built at
    /// `scale`. The sampled velocity is converted to pixels before blending:
    /// `vel = vel * damping + field / scale * multiplier`, then `pos += vel`.
    /// With the defaults a particle settles at a tenth of the local flow speed.
    ///
    /// Returns false without touching the particles when the layer is invisible
    /// (alpha or size not positive at `t`) or the readback does not match the grid.
    pub fn update(
        &mut self,
        t: f32,
        dt: f32,
        velocity: &[Texel],
        grid_size: (u32, u32),
        scale: f32,
    ) -> bool {
        let (width, height) = (grid_size.0 as usize, grid_size.1 as usize);
        if self.settings.alpha.value_at(t) <= 0.0
            || self.settings.max_particle_size.value_at(t) <= 0.0
            || width == 0
            || height == 0
            || velocity.len() != width * height
            || scale <= 0.0
        {
            return false;
        }

        let damping = self.settings.velocity_damping.value_at(t);
        let gain = self.settings.velocity_multiplier.value_at(t) / scale;

        self.particles.par_iter_mut().for_each(|p| {
            p.life -= dt;
            if p.life <= 0.0 {
                *p = Particle::spawn(p.origin, p.initial_life);
                return;
            }

            let flow = sample_bilinear(velocity, width, height, p.position * scale);
            p.velocity = p.velocity * damping + Vec2::new(flow.x, flow.y) * gain;
            p.position += p.velocity;
        });

        true
    }

    /// Sprites for drawing at time `t`; size and alpha fade with remaining life
    #[must_use]
    pub fn sprites(&self, t: f32) -> Vec<Sprite> {
        let alpha = self.settings.alpha.value_at(t);
        let size = self.settings.max_particle_size.value_at(t);
        if alpha <= 0.0 || size <= 0.0 {
            return Vec::new();
        }

        self.particles
            .iter()
            .map(|p| {
                let fade = p.life_fraction();
                Sprite {
                    position: p.position,
                    size: size * fade,
                    alpha: alpha * fade,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn overlay(power: u32) -> ParticleOverlay {
        let mut rng = StdRng::seed_from_u64(7);
        ParticleOverlay::with_rng(power, Vec2::new(64.0, 32.0), &mut rng)
    }

    #[test]
    fn test_spawn_layout() {
        let o = overlay(3);
        assert_eq!(o.resolution(), 8);
        assert_eq!(o.particles().len(), 64);
        for p in o.particles() {
            assert!(p.position.x >= 0.0 && p.position.x <= 64.0);
            assert!(p.position.y >= 0.0 && p.position.y <= 32.0);
            assert!(p.life >= 1.0 && p.life <= 9.0);
            assert_eq!(p.velocity, Vec2::zeros());
        }
    }

    #[test]
    fn test_update_follows_flow() {
        let mut o = overlay(2);
        let field = vec![Texel::new(2.0, 0.0, 0.0, 0.0); 32 * 16];
        let before: Vec<Vec2> = o.particles().iter().map(|p| p.position).collect();

        assert!(o.update(0.0, 0.01, &field, (32, 16), 0.5));

        for (p, start) in o.particles().iter().zip(before) {
            // 2 texels/step at scale 0.5 is 4 px, times the 0.004 multiplier
            assert_relative_eq!(p.velocity.x, 0.016, epsilon = 1e-6);
            assert_relative_eq!(p.position.x - start.x, 0.016, epsilon = 1e-5);
            assert_relative_eq!(p.position.y, start.y);
        }
    }

    #[test]
    fn test_expired_particles_respawn() {
        let mut o = overlay(1);
        let field = vec![Texel::new(5.0, 5.0, 0.0, 0.0); 32 * 16];
        o.update(0.0, 0.5, &field, (32, 16), 0.5);
        o.update(0.0, 20.0, &field, (32, 16), 0.5);

        for p in o.particles() {
            assert_eq!(p.position, p.origin());
            assert_eq!(p.velocity, Vec2::zeros());
            assert_relative_eq!(p.life_fraction(), 1.0);
        }
    }

    #[test]
    fn test_invisible_layer_skips_update() {
        let mut o = overlay(1);
        o.settings.alpha = Property::new(0.0);
        let field = vec![Texel::new(5.0, 5.0, 0.0, 0.0); 32 * 16];
        let before = o.particles().to_vec();
        assert!(!o.update(0.0, 0.1, &field, (32, 16), 0.5));
        assert_eq!(o.particles(), before.as_slice());
        assert!(o.sprites(0.0).is_empty());
    }

    #[test]
    fn test_mismatched_readback_is_ignored() {
        let mut o = overlay(1);
        assert!(!o.update(0.0, 0.1, &[Texel::zeros(); 3], (32, 16), 0.5));
    }
}
