//! Stage kernel trait definition
//!
//! This module defines the `StageKernels` trait, the backend-agnostic set of
//! per-texel passes the fluid pipeline is built from. The GPU backend runs them as
//! wgpu compute shaders; the CPU backend runs the same formulas with rayon and is
//! the reference the GPU output is validated against.
//!
//! Every stage reads its inputs and writes one output surface. Apart from
//! `apply_impulse`, which blends into its target in place, an output is never one of
//! the inputs. Callers obtain inputs and outputs from [`PingPong`] stage handles so the
//! borrow checker enforces this.
//!
//! [`PingPong`]: super::PingPong

use super::fields::FieldFormat;
use super::params::{BuoyancyParams, StageConstants};
use crate::core_types::{Texel, Vec2};
use crate::error::EngineError;
use std::borrow::Cow;

/// Backend-agnostic interface for the fluid stage programs
///
/// Surfaces are created by the backend and only meaningful to the backend that
/// created them. All surfaces passed to one call must have the same dimensions; this
/// is a caller obligation and is not checked.
pub trait StageKernels {
    /// Backend-owned storage for one field
    type Surface;

    /// Backend name for logging (adapter name on GPU)
    fn backend_name(&self) -> &str;

    /// Check if this kernel set uses GPU acceleration
    fn is_gpu_accelerated(&self) -> bool;

    /// Allocate a zero-initialized surface
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SurfaceTooLarge`] when the surface exceeds backend limits.
    fn create_surface(
        &self,
        label: &'static str,
        width: u32,
        height: u32,
        format: FieldFormat,
    ) -> Result<Self::Surface, EngineError>;

    /// Set every texel to `value` (unused channels are zeroed)
    fn fill(&self, surface: &mut Self::Surface, value: Texel);

    /// Replace the surface contents with `texels` (row-major, one per cell)
    fn upload(&self, surface: &mut Self::Surface, texels: &[Texel]);

    /// Read the whole surface back in row-major order
    ///
    /// # Returns
    ///
    /// Surface contents. CPU backend returns borrowed slice, GPU backend returns owned Vec.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Readback`] if a GPU staging buffer cannot be mapped.
    fn read<'a>(&self, surface: &'a Self::Surface) -> Result<Cow<'a, [Texel]>, EngineError>;

    /// Surface dimensions `(width, height)`
    fn dimensions(&self, surface: &Self::Surface) -> (u32, u32);

    /// Read a rectangular window `[x, x+w) × [y, y+h)`, clipped to the surface
    ///
    /// # Errors
    ///
    /// Same as [`StageKernels::read`].
    fn read_region(
        &self,
        surface: &Self::Surface,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> Result<Vec<Texel>, EngineError> {
        let (width, height) = self.dimensions(surface);
        let all = self.read(surface)?;
        let x1 = (x + w).min(width);
        let y1 = (y + h).min(height);
        let mut out = Vec::with_capacity((x1.saturating_sub(x) * y1.saturating_sub(y)) as usize);
        for row in y.min(height)..y1 {
            let start = (row * width + x.min(width)) as usize;
            let end = (row * width + x1) as usize;
            out.extend_from_slice(&all[start..end]);
        }
        Ok(out)
    }

    /// Semi-Lagrangian advection of `source` along `velocity`
    ///
    /// Backtraces each texel by `time_step * v` (texel units), samples `source`
    /// bilinearly at the clamped position and multiplies by `dissipation`. Solid texels
    /// output zero; a backtrace that lands in a solid cell keeps the texel's own value
    /// (times `dissipation`) instead of sampling through the wall.
    fn advect(
        &self,
        constants: &StageConstants,
        velocity: &Self::Surface,
        source: &Self::Surface,
        obstacles: &Self::Surface,
        out: &mut Self::Surface,
        dissipation: f32,
    );

    /// Central-difference divergence of `velocity`
    ///
    /// Solid neighbors (and texels outside the grid) contribute the obstacle velocity
    /// stored in the mask instead of the sampled fluid velocity.
    fn compute_divergence(
        &self,
        constants: &StageConstants,
        velocity: &Self::Surface,
        obstacles: &Self::Surface,
        out: &mut Self::Surface,
    );

    /// One Jacobi relaxation step of the pressure Poisson equation
    ///
    /// `p' = (pL + pR + pB + pT + alpha * div) * inverse_beta`, solid neighbors replaced
    /// by the center pressure.
    fn jacobi(
        &self,
        constants: &StageConstants,
        pressure: &Self::Surface,
        divergence: &Self::Surface,
        obstacles: &Self::Surface,
        out: &mut Self::Surface,
    );

    /// Subtract the pressure gradient from `velocity`
    ///
    /// Velocity components facing a solid neighbor are replaced by the obstacle's
    /// velocity component; solid texels output the obstacle velocity.
    fn subtract_gradient(
        &self,
        constants: &StageConstants,
        velocity: &Self::Surface,
        pressure: &Self::Surface,
        obstacles: &Self::Surface,
        out: &mut Self::Surface,
    );

    /// Add `value` with a smooth radial falloff around `point`, in place
    fn apply_impulse(&self, target: &mut Self::Surface, point: Vec2, radius: f32, value: Texel);

    /// Add thermal buoyancy and attractor pull to `velocity`
    fn apply_buoyancy(
        &self,
        params: &BuoyancyParams,
        velocity: &Self::Surface,
        temperature: &Self::Surface,
        density: &Self::Surface,
        out: &mut Self::Surface,
    );

    /// Blend `texture` into `source`: `out = source + weight * texture`
    ///
    /// With `is_velocity` the texture's xy channels are remapped from `[0, 1]` to
    /// `[-1, 1]` first. Channels the output format does not carry stay zero.
    fn apply_texture(
        &self,
        source: &Self::Surface,
        texture: &Self::Surface,
        out: &mut Self::Surface,
        weight: f32,
        is_velocity: bool,
    );
}
