//! CPU reference implementation of the stage kernels
//!
//! This module provides a CPU implementation of the `StageKernels` trait using
//! [`FieldData`] surfaces and Rayon row-parallel passes. It evaluates exactly the
//! formulas of `shaders/fluid_stages.wgsl` and exists for validation, headless runs
//! and machines without a GPU. It is only used when explicitly requested; engine
//! construction never falls back to it.
//!
//! Boundary convention shared with the GPU kernels: texels outside the grid count as
//! solid with zero velocity, so the grid behaves as a closed box.

use super::fields::{FieldData, FieldFormat};
use super::params::{smooth_falloff, BuoyancyParams, StageConstants};
use super::StageKernels;
use crate::core_types::{Texel, Vec2};
use crate::error::EngineError;
use rayon::prelude::*;
use std::borrow::Cow;

// Helper to convert usize to f32, centralizing the intentional precision loss
#[inline]
#[allow(clippy::cast_precision_loss)]
fn usize_to_f32(v: usize) -> f32 {
    v as f32
}

/// Whether the cell is solid; cells outside the grid always are
#[inline]
fn is_solid(obstacles: &FieldData, x: isize, y: isize) -> bool {
    if x < 0 || y < 0 || x >= obstacles.width as isize || y >= obstacles.height as isize {
        return true;
    }
    obstacles.data[y as usize * obstacles.width + x as usize].x > 0.5
}

/// Velocity of the obstacle occupying a cell (zero outside the grid)
#[inline]
fn obstacle_velocity(obstacles: &FieldData, x: isize, y: isize) -> Vec2 {
    if x < 0 || y < 0 || x >= obstacles.width as isize || y >= obstacles.height as isize {
        return Vec2::zeros();
    }
    let t = obstacles.data[y as usize * obstacles.width + x as usize];
    Vec2::new(t.y, t.z)
}

/// Whether the backtrace from `from` to `to` crosses a solid cell
///
/// Walks the segment in steps of at most one texel along its longer axis, so a
/// one-texel wall cannot be skipped however fast the flow is.
#[inline]
fn path_blocked(obstacles: &FieldData, from: Vec2, to: Vec2) -> bool {
    let delta = to - from;
    let steps = delta.x.abs().max(delta.y.abs()).ceil().max(1.0) as usize;
    let step = delta / usize_to_f32(steps);
    (1..=steps).any(|k| {
        let p = from + step * usize_to_f32(k);
        is_solid(obstacles, p.x.round() as isize, p.y.round() as isize)
    })
}

/// CPU stage kernels using Rayon for parallelism
///
/// Stateless: every pass reads its inputs and writes its output surface row by row
/// on the Rayon pool.
#[derive(Debug, Clone, Default)]
pub struct CpuKernels;

impl CpuKernels {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl StageKernels for CpuKernels {
    type Surface = FieldData;

    fn backend_name(&self) -> &str {
        "CPU (rayon)"
    }

    fn is_gpu_accelerated(&self) -> bool {
        false
    }

    fn create_surface(
        &self,
        _label: &'static str,
        width: u32,
        height: u32,
        format: FieldFormat,
    ) -> Result<FieldData, EngineError> {
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidGrid { width, height });
        }
        Ok(FieldData::new(width as usize, height as usize, format))
    }

    fn fill(&self, surface: &mut FieldData, value: Texel) {
        surface.fill(value);
    }

    fn upload(&self, surface: &mut FieldData, texels: &[Texel]) {
        let mask = surface.format.mask();
        for (dst, src) in surface.data.iter_mut().zip(texels) {
            *dst = src.component_mul(&mask);
        }
    }

    fn read<'a>(&self, surface: &'a FieldData) -> Result<Cow<'a, [Texel]>, EngineError> {
        Ok(Cow::Borrowed(surface.as_slice()))
    }

    fn dimensions(&self, surface: &FieldData) -> (u32, u32) {
        (surface.width as u32, surface.height as u32)
    }

    fn advect(
        &self,
        constants: &StageConstants,
        velocity: &FieldData,
        source: &FieldData,
        obstacles: &FieldData,
        out: &mut FieldData,
        dissipation: f32,
    ) {
        let width = out.width;
        let max = Vec2::new(usize_to_f32(width - 1), usize_to_f32(out.height - 1));
        let time_step = constants.time_step;

        out.data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, cell) in row.iter_mut().enumerate() {
                    if is_solid(obstacles, x as isize, y as isize) {
                        *cell = Texel::zeros();
                        continue;
                    }

                    let idx = y * width + x;
                    let here = Vec2::new(usize_to_f32(x), usize_to_f32(y));
                    let back = here - velocity.data[idx].xy() * time_step;
                    let back = Vec2::new(back.x.clamp(0.0, max.x), back.y.clamp(0.0, max.y));

                    // Never pull values from behind or through a wall
                    *cell = if path_blocked(obstacles, here, back) {
                        source.data[idx] * dissipation
                    } else {
                        source.sample(back) * dissipation
                    };
                }
            });
    }

    fn compute_divergence(
        &self,
        constants: &StageConstants,
        velocity: &FieldData,
        obstacles: &FieldData,
        out: &mut FieldData,
    ) {
        let width = out.width;
        let half_inverse_cell_size = constants.half_inverse_cell_size;

        let fetch = |x: isize, y: isize| -> Vec2 {
            if is_solid(obstacles, x, y) {
                obstacle_velocity(obstacles, x, y)
            } else {
                velocity.data[y as usize * width + x as usize].xy()
            }
        };

        out.data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as isize;
                for (x, cell) in row.iter_mut().enumerate() {
                    let x = x as isize;
                    let v_l = fetch(x - 1, y);
                    let v_r = fetch(x + 1, y);
                    let v_b = fetch(x, y - 1);
                    let v_t = fetch(x, y + 1);
                    let div = half_inverse_cell_size * (v_r.x - v_l.x + v_t.y - v_b.y);
                    *cell = Texel::new(div, 0.0, 0.0, 0.0);
                }
            });
    }

    fn jacobi(
        &self,
        constants: &StageConstants,
        pressure: &FieldData,
        divergence: &FieldData,
        obstacles: &FieldData,
        out: &mut FieldData,
    ) {
        let width = out.width;
        let (alpha, inverse_beta) = (constants.alpha, constants.inverse_beta);

        out.data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, cell) in row.iter_mut().enumerate() {
                    let idx = y * width + x;
                    let p_c = pressure.data[idx].x;
                    // Neumann boundary: solid neighbors mirror the center
                    let p = |nx: isize, ny: isize| {
                        if is_solid(obstacles, nx, ny) {
                            p_c
                        } else {
                            pressure.data[ny as usize * width + nx as usize].x
                        }
                    };
                    let (xi, yi) = (x as isize, y as isize);
                    let sum = p(xi - 1, yi) + p(xi + 1, yi) + p(xi, yi - 1) + p(xi, yi + 1);
                    let value = (sum + alpha * divergence.data[idx].x) * inverse_beta;
                    *cell = Texel::new(value, 0.0, 0.0, 0.0);
                }
            });
    }

    fn subtract_gradient(
        &self,
        constants: &StageConstants,
        velocity: &FieldData,
        pressure: &FieldData,
        obstacles: &FieldData,
        out: &mut FieldData,
    ) {
        let width = out.width;
        let gradient_scale = constants.gradient_scale;

        out.data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, cell) in row.iter_mut().enumerate() {
                    let (xi, yi) = (x as isize, y as isize);
                    if is_solid(obstacles, xi, yi) {
                        let v = obstacle_velocity(obstacles, xi, yi);
                        *cell = Texel::new(v.x, v.y, 0.0, 0.0);
                        continue;
                    }

                    let idx = y * width + x;
                    let p_c = pressure.data[idx].x;
                    let mut obstacle_v = Vec2::zeros();
                    let mut mask = Vec2::new(1.0, 1.0);

                    let mut p = |nx: isize, ny: isize, horizontal: bool| {
                        if !is_solid(obstacles, nx, ny) {
                            return pressure.data[ny as usize * width + nx as usize].x;
                        }
                        let v = obstacle_velocity(obstacles, nx, ny);
                        if horizontal {
                            obstacle_v.x = v.x;
                            mask.x = 0.0;
                        } else {
                            obstacle_v.y = v.y;
                            mask.y = 0.0;
                        }
                        p_c
                    };

                    let p_l = p(xi - 1, yi, true);
                    let p_r = p(xi + 1, yi, true);
                    let p_b = p(xi, yi - 1, false);
                    let p_t = p(xi, yi + 1, false);

                    let gradient = Vec2::new(p_r - p_l, p_t - p_b) * gradient_scale;
                    let projected = velocity.data[idx].xy() - gradient;
                    let v = projected.component_mul(&mask) + obstacle_v;
                    *cell = Texel::new(v.x, v.y, 0.0, 0.0);
                }
            });
    }

    fn apply_impulse(&self, target: &mut FieldData, point: Vec2, radius: f32, value: Texel) {
        let width = target.width;
        let value = value.component_mul(&target.format.mask());

        target
            .data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, cell) in row.iter_mut().enumerate() {
                    let distance = (Vec2::new(usize_to_f32(x), usize_to_f32(y)) - point).norm();
                    let weight = smooth_falloff(distance, radius);
                    if weight > 0.0 {
                        *cell += value * weight;
                    }
                }
            });
    }

    fn apply_buoyancy(
        &self,
        params: &BuoyancyParams,
        velocity: &FieldData,
        temperature: &FieldData,
        density: &FieldData,
        out: &mut FieldData,
    ) {
        let width = out.width;
        let up = -params.gravity;

        out.data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, cell) in row.iter_mut().enumerate() {
                    let idx = y * width + x;
                    let t = temperature.data[idx].x;
                    let smoke = density.data[idx];
                    let d = (smoke.x + smoke.y + smoke.z) / 3.0;

                    let lift = params.sigma * (t - params.ambient_temperature) - params.kappa * d;
                    let mut v = velocity.data[idx].xy() + up * (params.time_step * lift);

                    let here = Vec2::new(usize_to_f32(x), usize_to_f32(y));
                    for attractor in &params.attractors {
                        let to = attractor.position - here;
                        let distance = to.norm();
                        if distance > 1e-4 && distance < attractor.radius {
                            let pull = params.time_step
                                * attractor.force
                                * smooth_falloff(distance, attractor.radius);
                            v += to * (pull / distance);
                        }
                    }

                    *cell = Texel::new(v.x, v.y, 0.0, 0.0);
                }
            });
    }

    fn apply_texture(
        &self,
        source: &FieldData,
        texture: &FieldData,
        out: &mut FieldData,
        weight: f32,
        is_velocity: bool,
    ) {
        let mask = out.format.mask();
        out.data
            .par_iter_mut()
            .zip(source.data.par_iter().zip(texture.data.par_iter()))
            .for_each(|(cell, (src, tex))| {
                let tex = if is_velocity {
                    Texel::new(tex.x * 2.0 - 1.0, tex.y * 2.0 - 1.0, 0.0, 0.0)
                } else {
                    *tex
                };
                *cell = (src + tex * weight).component_mul(&mask);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn constants() -> StageConstants {
        StageConstants::new(1.25, 0.125)
    }

    fn field(format: FieldFormat) -> FieldData {
        FieldData::new(16, 16, format)
    }

    #[test]
    fn test_create_surface_rejects_empty_grid() {
        let k = CpuKernels::new();
        assert_eq!(
            k.create_surface("empty", 0, 8, FieldFormat::R32F),
            Err(EngineError::InvalidGrid {
                width: 0,
                height: 8
            })
        );
    }

    #[test]
    fn test_advect_with_zero_velocity_only_dissipates() {
        let k = CpuKernels::new();
        let velocity = field(FieldFormat::RGB32F);
        let obstacles = field(FieldFormat::RGB32F);
        let mut source = field(FieldFormat::R32F);
        source.set(5, 7, Texel::new(2.0, 0.0, 0.0, 0.0));
        let mut out = field(FieldFormat::R32F);

        k.advect(&constants(), &velocity, &source, &obstacles, &mut out, 0.5);
        assert_relative_eq!(out.get(5, 7).x, 1.0);
        assert_relative_eq!(out.sum_x(), 1.0);
    }

    #[test]
    fn test_advect_moves_along_velocity() {
        let k = CpuKernels::new();
        let mut velocity = field(FieldFormat::RGB32F);
        velocity.fill(Texel::new(8.0, 0.0, 0.0, 0.0)); // one texel per step at dt = 0.125
        let obstacles = field(FieldFormat::RGB32F);
        let mut source = field(FieldFormat::R32F);
        source.set(5, 7, Texel::new(1.0, 0.0, 0.0, 0.0));
        let mut out = field(FieldFormat::R32F);

        k.advect(&constants(), &velocity, &source, &obstacles, &mut out, 1.0);
        assert_relative_eq!(out.get(6, 7).x, 1.0);
        assert_relative_eq!(out.get(5, 7).x, 0.0);
    }

    #[test]
    fn test_advect_solid_texel_is_zero() {
        let k = CpuKernels::new();
        let velocity = field(FieldFormat::RGB32F);
        let mut obstacles = field(FieldFormat::RGB32F);
        obstacles.set(3, 3, Texel::new(1.0, 0.0, 0.0, 0.0));
        let source = FieldData::with_value(16, 16, FieldFormat::R32F, Texel::new(4.0, 0.0, 0.0, 0.0));
        let mut out = field(FieldFormat::R32F);

        k.advect(&constants(), &velocity, &source, &obstacles, &mut out, 1.0);
        assert_eq!(out.get(3, 3).x, 0.0);
        assert_eq!(out.get(4, 3).x, 4.0);
    }

    #[test]
    fn test_divergence_of_expanding_field() {
        let k = CpuKernels::new();
        let mut velocity = field(FieldFormat::RGB32F);
        for y in 0..16 {
            for x in 0..16 {
                velocity.set(x, y, Texel::new(usize_to_f32(x), usize_to_f32(y), 0.0, 0.0));
            }
        }
        let obstacles = field(FieldFormat::RGB32F);
        let mut out = field(FieldFormat::R32F);

        k.compute_divergence(&constants(), &velocity, &obstacles, &mut out);
        // Interior: (1 + 1) * 2 * 0.4 = 1.6
        assert_relative_eq!(out.get(8, 8).x, 1.6, epsilon = 1e-5);
    }

    #[test]
    fn test_jacobi_keeps_uniform_pressure_without_divergence() {
        let k = CpuKernels::new();
        let pressure = FieldData::with_value(16, 16, FieldFormat::R32F, Texel::new(3.0, 0.0, 0.0, 0.0));
        let divergence = field(FieldFormat::R32F);
        let obstacles = field(FieldFormat::RGB32F);
        let mut out = field(FieldFormat::R32F);

        k.jacobi(&constants(), &pressure, &divergence, &obstacles, &mut out);
        assert!(out.data.iter().all(|t| (t.x - 3.0).abs() < 1e-6));
    }

    #[test]
    fn test_subtract_gradient_zeroes_wall_normal_component() {
        let k = CpuKernels::new();
        let velocity = FieldData::with_value(16, 16, FieldFormat::RGB32F, Texel::new(1.0, 1.0, 0.0, 0.0));
        let pressure = field(FieldFormat::R32F);
        let obstacles = field(FieldFormat::RGB32F);
        let mut out = field(FieldFormat::RGB32F);

        k.subtract_gradient(&constants(), &velocity, &pressure, &obstacles, &mut out);
        // Left wall blocks x, interior untouched
        assert_eq!(out.get(0, 8), Texel::new(0.0, 1.0, 0.0, 0.0));
        assert_eq!(out.get(8, 8), Texel::new(1.0, 1.0, 0.0, 0.0));
        assert_eq!(out.get(8, 15), Texel::new(1.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_impulse_is_additive_and_local() {
        let k = CpuKernels::new();
        let mut target = field(FieldFormat::R32F);
        let value = Texel::new(2.0, 2.0, 2.0, 0.0);
        k.apply_impulse(&mut target, Vec2::new(8.0, 8.0), 3.0, value);
        k.apply_impulse(&mut target, Vec2::new(8.0, 8.0), 3.0, value);

        assert_relative_eq!(target.get(8, 8).x, 4.0);
        assert_eq!(target.get(8, 8).y, 0.0, "unused channel stays zero");
        assert_eq!(target.get(8, 11).x, 0.0);
        assert_eq!(target.get(0, 0).x, 0.0);
    }

    #[test]
    fn test_buoyancy_lifts_hot_cells_against_gravity() {
        let k = CpuKernels::new();
        let velocity = field(FieldFormat::RGB32F);
        let temperature = FieldData::with_value(16, 16, FieldFormat::R32F, Texel::new(2.0, 0.0, 0.0, 0.0));
        let density = field(FieldFormat::RGBA32F);
        let mut out = field(FieldFormat::RGB32F);
        let params = BuoyancyParams {
            time_step: 0.5,
            ambient_temperature: 0.0,
            sigma: 1.0,
            kappa: 0.05,
            gravity: Vec2::new(0.0, -1.0),
            attractors: Vec::new(),
        };

        k.apply_buoyancy(&params, &velocity, &temperature, &density, &mut out);
        assert_relative_eq!(out.get(4, 4).y, 1.0);
        assert_eq!(out.get(4, 4).x, 0.0);
    }

    #[test]
    fn test_apply_texture_velocity_remap() {
        let k = CpuKernels::new();
        let source = field(FieldFormat::RGB32F);
        let texture = FieldData::with_value(16, 16, FieldFormat::RGBA32F, Texel::new(1.0, 0.5, 0.7, 1.0));
        let mut out = field(FieldFormat::RGB32F);

        k.apply_texture(&source, &texture, &mut out, 2.0, true);
        assert_eq!(out.get(2, 2), Texel::new(2.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_read_region_clips() {
        let k = CpuKernels::new();
        let mut f = field(FieldFormat::R32F);
        f.set(15, 3, Texel::new(7.0, 0.0, 0.0, 0.0));
        let region = k.read_region(&f, 14, 3, 4, 1).unwrap();
        assert_eq!(region.len(), 2);
        assert_eq!(region[1].x, 7.0);
    }
}
