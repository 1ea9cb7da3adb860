//! GPU stage kernels
//!
//! This module provides a GPU implementation of the `StageKernels` trait using
//! wgpu compute shaders and storage buffers. This backend is only available when the
//! `gpu` feature is enabled.
//!
//! # Shader Files
//!
//! All stages live in `shaders/fluid_stages.wgsl`, one entry point per stage, sharing
//! a single bind group layout:
//! - binding 0: `StageParams` uniform
//! - bindings 1-3: read-only inputs (a dummy buffer where a stage has fewer)
//! - binding 4: read-write output
//!
//! # Implementation
//!
//! Each stage writes its uniform, records one compute pass and submits it, so stages
//! execute in call order on the single queue. Surfaces are plain storage buffers of
//! `vec4<f32>` texels; readbacks copy into a staging buffer and block on the map.

use super::context::{GpuContext, TEXEL_BYTES};
use super::fields::FieldFormat;
use super::params::{BuoyancyParams, StageConstants, MAX_ATTRACTORS};
use super::StageKernels;
use crate::core_types::{Texel, Vec2};
use crate::error::EngineError;
use bytemuck::{Pod, Zeroable};
use std::borrow::Cow;
use std::sync::mpsc;

/// Attractor entry of the stage uniform (must match WGSL struct layout)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct AttractorUniform {
    position: [f32; 2],
    radius: f32,
    force: f32,
}

/// Stage parameters (must match WGSL `StageParams` layout, 160 bytes)
///
/// `point` and `gravity` are 8-byte aligned and `value` 16-byte aligned in WGSL;
/// the field order below keeps every member on its natural offset without
/// implicit padding.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct StageUniform {
    width: u32,
    height: u32,
    time_step: f32,
    dissipation: f32,
    half_inverse_cell_size: f32,
    gradient_scale: f32,
    alpha: f32,
    inverse_beta: f32,
    point: [f32; 2],
    radius: f32,
    weight: f32,
    value: [f32; 4],
    gravity: [f32; 2],
    ambient_temperature: f32,
    sigma: f32,
    kappa: f32,
    is_velocity: u32,
    attractor_count: u32,
    _pad: u32,
    attractors: [AttractorUniform; MAX_ATTRACTORS],
}

impl StageUniform {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::zeroed()
        }
    }

    fn with_constants(mut self, constants: &StageConstants) -> Self {
        self.time_step = constants.time_step;
        self.half_inverse_cell_size = constants.half_inverse_cell_size;
        self.gradient_scale = constants.gradient_scale;
        self.alpha = constants.alpha;
        self.inverse_beta = constants.inverse_beta;
        self
    }
}

/// Compute entry points of the stage module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Advect,
    Divergence,
    Jacobi,
    SubtractGradient,
    Impulse,
    Buoyancy,
    Texture,
}

impl Stage {
    const ALL: [Stage; 7] = [
        Stage::Advect,
        Stage::Divergence,
        Stage::Jacobi,
        Stage::SubtractGradient,
        Stage::Impulse,
        Stage::Buoyancy,
        Stage::Texture,
    ];

    fn entry_point(self) -> &'static str {
        match self {
            Stage::Advect => "advect",
            Stage::Divergence => "compute_divergence",
            Stage::Jacobi => "jacobi",
            Stage::SubtractGradient => "subtract_gradient",
            Stage::Impulse => "apply_impulse",
            Stage::Buoyancy => "apply_buoyancy",
            Stage::Texture => "apply_texture",
        }
    }
}

/// Field storage on the GPU
#[derive(Debug)]
pub struct GpuSurface {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    format: FieldFormat,
}

impl GpuSurface {
    fn byte_size(&self) -> u64 {
        TEXEL_BYTES * u64::from(self.width) * u64::from(self.height)
    }

    #[must_use]
    pub fn format(&self) -> FieldFormat {
        self.format
    }
}

/// GPU stage kernels using wgpu compute shaders
///
/// Owns the device, the seven stage pipelines and the shared uniform buffer.
pub struct GpuKernels {
    context: GpuContext,
    pipelines: [wgpu::ComputePipeline; 7],
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    // Bound to inputs a stage does not read
    dummy: wgpu::Buffer,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GpuKernels {
    /// Create pipelines and shared buffers on an initialized context
    #[must_use]
    pub fn new(context: GpuContext) -> Self {
        let device = context.device();

        let shader = device.create_shader_module(wgpu::include_wgsl!("shaders/fluid_stages.wgsl"));

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Stage Params"),
            size: std::mem::size_of::<StageUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let dummy = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Unused Input"),
            size: TEXEL_BYTES,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Fluid Stage Bind Group Layout"),
            entries: &[
                // params (binding 0)
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // input_a, input_b, input_c (bindings 1-3)
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                // output (binding 4)
                storage_entry(4, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Fluid Stage Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipelines = Stage::ALL.map(|stage| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(stage.entry_point()),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: stage.entry_point(),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        });

        Self {
            context,
            pipelines,
            bind_group_layout,
            params_buffer,
            dummy,
        }
    }

    /// Calculate workgroup count for dispatch
    fn workgroup_count(width: u32, height: u32) -> (u32, u32) {
        // Workgroup size is 16x16 (defined in the shader)
        let workgroup_size = 16u32;
        (width.div_ceil(workgroup_size), height.div_ceil(workgroup_size))
    }

    /// Write the uniform, bind `inputs` and `output`, and submit one pass
    fn dispatch(
        &self,
        stage: Stage,
        params: &StageUniform,
        inputs: [Option<&GpuSurface>; 3],
        output: &GpuSurface,
    ) {
        let device = self.context.device();
        let queue = self.context.queue();

        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(params));

        let [a, b, c] = inputs.map(|s| s.map_or(&self.dummy, |s| &s.buffer));
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(stage.entry_point()),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: a.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: b.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: c.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: output.buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Fluid Stage Encoder"),
        });

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(stage.entry_point()),
                timestamp_writes: None,
            });

            compute_pass.set_pipeline(&self.pipelines[stage as usize]);
            compute_pass.set_bind_group(0, &bind_group, &[]);

            let (wg_x, wg_y) = Self::workgroup_count(output.width, output.height);
            compute_pass.dispatch_workgroups(wg_x, wg_y, 1);
        }

        queue.submit(std::iter::once(encoder.finish()));
    }

    fn write_texels(&self, surface: &GpuSurface, texels: impl Iterator<Item = Texel>) {
        let mask = surface.format.mask();
        let raw: Vec<[f32; 4]> = texels.map(|t| t.component_mul(&mask).into()).collect();
        self.context
            .queue()
            .write_buffer(&surface.buffer, 0, bytemuck::cast_slice(&raw));
    }
}

impl StageKernels for GpuKernels {
    type Surface = GpuSurface;

    fn backend_name(&self) -> &str {
        self.context.adapter_name()
    }

    fn is_gpu_accelerated(&self) -> bool {
        true
    }

    fn create_surface(
        &self,
        label: &'static str,
        width: u32,
        height: u32,
        format: FieldFormat,
    ) -> Result<GpuSurface, EngineError> {
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidGrid { width, height });
        }
        self.context.check_surface(width, height)?;

        // wgpu zero-initializes new buffers
        let buffer = self.context.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: TEXEL_BYTES * u64::from(width) * u64::from(height),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        Ok(GpuSurface {
            buffer,
            width,
            height,
            format,
        })
    }

    fn fill(&self, surface: &mut GpuSurface, value: Texel) {
        let count = surface.width as usize * surface.height as usize;
        self.write_texels(surface, std::iter::repeat(value).take(count));
    }

    fn upload(&self, surface: &mut GpuSurface, texels: &[Texel]) {
        let count = surface.width as usize * surface.height as usize;
        self.write_texels(surface, texels.iter().take(count).copied());
    }

    fn read<'a>(&self, surface: &'a GpuSurface) -> Result<Cow<'a, [Texel]>, EngineError> {
        let device = self.context.device();
        let size = surface.byte_size();

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(&surface.buffer, 0, &staging, 0, size);
        self.context.queue().submit(std::iter::once(encoder.finish()));

        // Map and read
        let buffer_slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        let _ = device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| EngineError::Readback(e.to_string()))?
            .map_err(|e| EngineError::Readback(e.to_string()))?;

        let data = buffer_slice.get_mapped_range();
        let texels: Vec<Texel> = bytemuck::cast_slice::<u8, [f32; 4]>(&data)
            .iter()
            .map(|&t| Texel::from(t))
            .collect();
        drop(data);
        staging.unmap();

        Ok(Cow::Owned(texels))
    }

    fn dimensions(&self, surface: &GpuSurface) -> (u32, u32) {
        (surface.width, surface.height)
    }

    fn advect(
        &self,
        constants: &StageConstants,
        velocity: &GpuSurface,
        source: &GpuSurface,
        obstacles: &GpuSurface,
        out: &mut GpuSurface,
        dissipation: f32,
    ) {
        let mut params = StageUniform::new(out.width, out.height).with_constants(constants);
        params.dissipation = dissipation;
        self.dispatch(
            Stage::Advect,
            &params,
            [Some(velocity), Some(source), Some(obstacles)],
            out,
        );
    }

    fn compute_divergence(
        &self,
        constants: &StageConstants,
        velocity: &GpuSurface,
        obstacles: &GpuSurface,
        out: &mut GpuSurface,
    ) {
        let params = StageUniform::new(out.width, out.height).with_constants(constants);
        self.dispatch(
            Stage::Divergence,
            &params,
            [Some(velocity), None, Some(obstacles)],
            out,
        );
    }

    fn jacobi(
        &self,
        constants: &StageConstants,
        pressure: &GpuSurface,
        divergence: &GpuSurface,
        obstacles: &GpuSurface,
        out: &mut GpuSurface,
    ) {
        let params = StageUniform::new(out.width, out.height).with_constants(constants);
        self.dispatch(
            Stage::Jacobi,
            &params,
            [Some(pressure), Some(divergence), Some(obstacles)],
            out,
        );
    }

    fn subtract_gradient(
        &self,
        constants: &StageConstants,
        velocity: &GpuSurface,
        pressure: &GpuSurface,
        obstacles: &GpuSurface,
        out: &mut GpuSurface,
    ) {
        let params = StageUniform::new(out.width, out.height).with_constants(constants);
        self.dispatch(
            Stage::SubtractGradient,
            &params,
            [Some(velocity), Some(pressure), Some(obstacles)],
            out,
        );
    }

    fn apply_impulse(&self, target: &mut GpuSurface, point: Vec2, radius: f32, value: Texel) {
        let mut params = StageUniform::new(target.width, target.height);
        params.point = point.into();
        params.radius = radius;
        params.value = value.component_mul(&target.format.mask()).into();
        self.dispatch(Stage::Impulse, &params, [None, None, None], target);
    }

    fn apply_buoyancy(
        &self,
        buoyancy: &BuoyancyParams,
        velocity: &GpuSurface,
        temperature: &GpuSurface,
        density: &GpuSurface,
        out: &mut GpuSurface,
    ) {
        let mut params = StageUniform::new(out.width, out.height);
        params.time_step = buoyancy.time_step;
        params.gravity = buoyancy.gravity.into();
        params.ambient_temperature = buoyancy.ambient_temperature;
        params.sigma = buoyancy.sigma;
        params.kappa = buoyancy.kappa;

        let attractors = &buoyancy.attractors[..buoyancy.attractors.len().min(MAX_ATTRACTORS)];
        for (slot, a) in params.attractors.iter_mut().zip(attractors) {
            *slot = AttractorUniform {
                position: a.position.into(),
                radius: a.radius,
                force: a.force,
            };
        }
        params.attractor_count = attractors.len() as u32;

        self.dispatch(
            Stage::Buoyancy,
            &params,
            [Some(velocity), Some(temperature), Some(density)],
            out,
        );
    }

    fn apply_texture(
        &self,
        source: &GpuSurface,
        texture: &GpuSurface,
        out: &mut GpuSurface,
        weight: f32,
        is_velocity: bool,
    ) {
        let mut params = StageUniform::new(out.width, out.height);
        params.weight = weight;
        params.is_velocity = u32::from(is_velocity);
        params.value = out.format.mask().into();
        self.dispatch(Stage::Texture, &params, [Some(source), Some(texture), None], out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn kernels() -> Option<GpuKernels> {
        GpuContext::new().ok().map(GpuKernels::new)
    }

    #[test]
    fn test_uniform_layout_matches_shader() {
        assert_eq!(std::mem::size_of::<AttractorUniform>(), 16);
        assert_eq!(std::mem::size_of::<StageUniform>(), 160);
        assert_eq!(std::mem::offset_of!(StageUniform, value), 48);
        assert_eq!(std::mem::offset_of!(StageUniform, attractors), 96);
    }

    #[test]
    fn test_fill_and_read_back() {
        // Only run if GPU is available
        let Some(k) = kernels() else { return };
        let mut s = k.create_surface("test", 20, 10, FieldFormat::R32F).unwrap();
        k.fill(&mut s, Texel::new(3.0, 4.0, 5.0, 6.0));

        let data = k.read(&s).unwrap();
        assert_eq!(data.len(), 200);
        assert!(data.iter().all(|t| *t == Texel::new(3.0, 0.0, 0.0, 0.0)));
        assert_eq!(k.dimensions(&s), (20, 10));
    }

    #[test]
    fn test_impulse_blends_in_place() {
        let Some(k) = kernels() else { return };
        let mut s = k.create_surface("impulse", 32, 32, FieldFormat::RGBA32F).unwrap();
        let value = Texel::new(1.0, 0.5, 0.25, 1.0);
        k.apply_impulse(&mut s, Vec2::new(16.0, 16.0), 4.0, value);
        k.apply_impulse(&mut s, Vec2::new(16.0, 16.0), 4.0, value);

        let data = k.read(&s).unwrap();
        assert_relative_eq!(data[16 * 32 + 16].x, 2.0, epsilon = 1e-5);
        assert_eq!(data[0], Texel::zeros());
    }

    #[test]
    fn test_invalid_surface_size() {
        let Some(k) = kernels() else { return };
        assert!(matches!(
            k.create_surface("empty", 0, 4, FieldFormat::R32F),
            Err(EngineError::InvalidGrid { .. })
        ));
    }
}
