//! Fluid simulation engine
//!
//! [`FluidEngine`] owns every field, the force queue and the obstacle state, and runs
//! the per-tick stable-fluids pipeline on a [`StageKernels`] backend:
//!
//! 1. redraw obstacles when dirty
//! 2. apply forces (temporal, then constant)
//! 3. advect velocity, temperature and density
//! 4. buoyancy
//! 5. divergence
//! 6. clear pressure
//! 7. Jacobi relaxation
//! 8. subtract the pressure gradient
//! 9. latch attractors for the next tick
//!
//! Every producing stage writes a ping-pong destination and is followed by exactly one
//! swap.

use super::fields::FieldFormat;
use super::force::{Force, ForceQueue};
use super::grid::GridConfig;
use super::obstacle::ObstacleCanvas;
use super::params::{AttractorParams, SimulationParameters};
use super::ping_pong::PingPong;
use super::profiler::{StageTimer, TickTimer};
use super::StageKernels;
use crate::core_types::{Rect, Texel, Vec2};
use crate::error::EngineError;
use crate::timeline::FrameContext;
use std::time::Instant;
use tracing::{debug, info};

/// Obstacle render callback: `(bounds, is_display_pass, canvas)`
///
/// Called with the grid bounds and `is_display_pass = false` whenever the mask is
/// enabled and dirty. The canvas is cleared before the call.
pub type ObstacleCallback = Box<dyn FnMut(Rect, bool, &mut ObstacleCanvas)>;

/// Field a texture can be blended into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureTarget {
    Density,
    /// Texture xy in `[0, 1]` is remapped to `[-1, 1]`
    Velocity,
}

/// All simulation fields of one engine
#[derive(Debug)]
pub struct FluidFields<S> {
    pub velocity: PingPong<S>,
    pub density: PingPong<S>,
    pub temperature: PingPong<S>,
    pub pressure: PingPong<S>,
    /// Transient, rewritten every tick
    pub divergence: S,
    pub obstacles: S,
}

impl<S> FluidFields<S> {
    fn new<K>(kernels: &K, width: u32, height: u32) -> Result<Self, EngineError>
    where
        K: StageKernels<Surface = S>,
    {
        let pair = |label: &'static str, format: FieldFormat| {
            PingPong::try_new(|| kernels.create_surface(label, width, height, format))
        };
        Ok(Self {
            velocity: pair("Velocity", FieldFormat::RGB32F)?,
            density: pair("Density", FieldFormat::RGBA32F)?,
            temperature: pair("Temperature", FieldFormat::R32F)?,
            pressure: pair("Pressure", FieldFormat::R32F)?,
            divergence: kernels.create_surface("Divergence", width, height, FieldFormat::R32F)?,
            obstacles: kernels.create_surface("Obstacles", width, height, FieldFormat::RGB32F)?,
        })
    }
}

/// 2D smoke simulation on a fixed grid
pub struct FluidEngine<K: StageKernels> {
    kernels: K,
    fields: FluidFields<K::Surface>,
    forces: ForceQueue,
    /// Tunables, sampled at the start of every tick
    pub params: SimulationParameters,
    grid: GridConfig,
    grid_size: (u32, u32),
    obstacles_enabled: bool,
    obstacles_dirty: bool,
    obstacle_callback: Option<ObstacleCallback>,
    canvas: ObstacleCanvas,
    // Latched at the end of a tick, consumed by the next buoyancy pass
    attractors: Vec<AttractorParams>,
    timer: TickTimer,
}

/// Engine on the CPU reference backend
pub type CpuFluidEngine = FluidEngine<super::CpuKernels>;

/// Engine on the wgpu backend
#[cfg(feature = "gpu")]
pub type GpuFluidEngine = FluidEngine<super::GpuKernels>;

impl<K: StageKernels> FluidEngine<K> {
    /// Allocate all fields for `grid` and reset them
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidGrid`] for an empty grid and any surface
    /// allocation failure of the backend.
    pub fn new(
        kernels: K,
        grid: GridConfig,
        params: SimulationParameters,
    ) -> Result<Self, EngineError> {
        let (width, height) = grid.grid_dimensions()?;
        let fields = FluidFields::new(&kernels, width, height)?;

        info!(
            "Fluid engine created: {}x{} cells at scale {} on {}",
            width,
            height,
            grid.scale,
            kernels.backend_name()
        );

        let mut engine = Self {
            kernels,
            fields,
            forces: ForceQueue::new(),
            params,
            grid,
            grid_size: (width, height),
            obstacles_enabled: true,
            obstacles_dirty: false,
            obstacle_callback: None,
            canvas: ObstacleCanvas::new(width as usize, height as usize),
            attractors: Vec::new(),
            timer: TickTimer::new(),
        };
        engine.clear();
        Ok(engine)
    }

    /// Advance the simulation by one fixed step
    pub fn tick(&mut self, frame: &FrameContext) {
        let started = Instant::now();
        let t = frame.time;
        let constants = self.params.stage_constants();

        self.redraw_obstacles();

        {
            let _scope = StageTimer::new("forces");
            self.apply_forces();
        }

        let kernels = &self.kernels;
        let fields = &mut self.fields;

        {
            let _scope = StageTimer::new("advect");

            {
                let (src, mut dst) = fields.velocity.stage();
                kernels.advect(
                    &constants,
                    &src,
                    &src,
                    &fields.obstacles,
                    dst.target(),
                    self.params.velocity_dissipation,
                );
            }
            fields.velocity.swap();

            {
                let (src, mut dst) = fields.temperature.stage();
                kernels.advect(
                    &constants,
                    fields.velocity.source(),
                    &src,
                    &fields.obstacles,
                    dst.target(),
                    self.params.temperature_dissipation,
                );
            }
            fields.temperature.swap();

            {
                let (src, mut dst) = fields.density.stage();
                kernels.advect(
                    &constants,
                    fields.velocity.source(),
                    &src,
                    &fields.obstacles,
                    dst.target(),
                    self.params.density_dissipation,
                );
            }
            fields.density.swap();
        }

        {
            let _scope = StageTimer::new("buoyancy");
            let buoyancy = self.params.buoyancy_at(t, &self.attractors);
            {
                let (src, mut dst) = fields.velocity.stage();
                kernels.apply_buoyancy(
                    &buoyancy,
                    &src,
                    fields.temperature.source(),
                    fields.density.source(),
                    dst.target(),
                );
            }
            fields.velocity.swap();
        }

        {
            let _scope = StageTimer::new("projection");

            kernels.compute_divergence(
                &constants,
                fields.velocity.source(),
                &fields.obstacles,
                &mut fields.divergence,
            );

            kernels.fill(fields.pressure.source_mut(), Texel::zeros());
            for _ in 0..self.params.jacobi_iterations {
                {
                    let (src, mut dst) = fields.pressure.stage();
                    kernels.jacobi(
                        &constants,
                        &src,
                        &fields.divergence,
                        &fields.obstacles,
                        dst.target(),
                    );
                }
                fields.pressure.swap();
            }

            {
                let (src, mut dst) = fields.velocity.stage();
                kernels.subtract_gradient(
                    &constants,
                    &src,
                    fields.pressure.source(),
                    &fields.obstacles,
                    dst.target(),
                );
            }
            fields.velocity.swap();
        }

        self.update_attractors(frame);

        self.timer
            .record(started.elapsed().as_secs_f64() * 1000.0);
        if self.timer.ticks() % 300 == 0 {
            debug!(
                "Tick {}: {:.2} ms (avg {:.2} ms)",
                self.timer.ticks(),
                self.timer.last_tick_ms(),
                self.timer.average_tick_ms()
            );
        }
    }

    fn redraw_obstacles(&mut self) {
        if !(self.obstacles_enabled && self.obstacles_dirty) {
            return;
        }
        let Some(callback) = self.obstacle_callback.as_mut() else {
            return;
        };

        let (width, height) = self.grid_size;
        let bounds = Rect::from_size(width as f32, height as f32);

        self.canvas.clear();
        callback(bounds, false, &mut self.canvas);
        self.kernels
            .upload(&mut self.fields.obstacles, self.canvas.texels());
        self.obstacles_dirty = false;
        debug!("Obstacle mask redrawn");
    }

    fn apply_forces(&mut self) {
        let kernels = &self.kernels;
        let fields = &mut self.fields;

        for force in self.forces.for_tick() {
            kernels.apply_impulse(
                fields.temperature.source_mut(),
                force.position,
                force.radius,
                Texel::new(force.temperature, 0.0, 0.0, 0.0),
            );

            if !force.color.is_black() {
                let color = force.color.scaled(force.density);
                kernels.apply_impulse(
                    fields.density.source_mut(),
                    force.position,
                    force.radius,
                    Texel::new(color.x, color.y, color.z, force.density),
                );
            }

            if force.velocity != Vec2::zeros() {
                kernels.apply_impulse(
                    fields.velocity.source_mut(),
                    force.position,
                    force.radius,
                    Texel::new(force.velocity.x, force.velocity.y, 0.0, 0.0),
                );
            }
        }

        self.forces.clear_temporal();
    }

    fn update_attractors(&mut self, frame: &FrameContext) {
        let scale = self.grid.scale;
        self.attractors = frame
            .attractors
            .iter()
            .map(|a| AttractorParams {
                position: a.position * scale,
                radius: a.radius * scale,
                force: a.force,
            })
            .collect();
    }

    /// Queue a force applied every tick; position and radius are in world units
    pub fn add_constant_force(&mut self, force: Force) {
        self.forces.push_constant(force.scaled(self.grid.scale));
    }

    /// Queue a force applied on the next tick only
    pub fn add_temporal_force(&mut self, force: Force) {
        self.forces.push_temporal(force.scaled(self.grid.scale));
    }

    /// Constant forces in grid space
    #[must_use]
    pub fn constant_forces(&self) -> &[Force] {
        self.forces.constant()
    }

    /// Temporal forces waiting for the next tick, in grid space
    #[must_use]
    pub fn pending_temporal_forces(&self) -> &[Force] {
        self.forces.temporal()
    }

    /// Reset every field; temperature returns to the ambient temperature
    pub fn clear(&mut self) {
        let ambient = self.params.ambient_temperature.initial_value();
        let kernels = &self.kernels;
        let fields = &mut self.fields;

        fields.density.for_each_mut(|s| kernels.fill(s, Texel::zeros()));
        fields.velocity.for_each_mut(|s| kernels.fill(s, Texel::zeros()));
        fields.pressure.for_each_mut(|s| kernels.fill(s, Texel::zeros()));
        fields
            .temperature
            .for_each_mut(|s| kernels.fill(s, Texel::new(ambient, 0.0, 0.0, 0.0)));
        kernels.fill(&mut fields.divergence, Texel::zeros());
        kernels.fill(&mut fields.obstacles, Texel::zeros());
        self.canvas.clear();

        info!("Fluid fields cleared (ambient temperature {})", ambient);
    }

    /// Toggle obstacles; disabling clears the mask
    pub fn enable_obstacles(&mut self, enabled: bool) {
        self.obstacles_enabled = enabled;
        if !enabled {
            self.kernels.fill(&mut self.fields.obstacles, Texel::zeros());
            self.canvas.clear();
        }
        info!("Obstacles {}", if enabled { "enabled" } else { "disabled" });
    }

    #[must_use]
    pub fn obstacles_enabled(&self) -> bool {
        self.obstacles_enabled
    }

    /// Request a redraw of the obstacle mask on the next tick
    pub fn mark_obstacles_dirty(&mut self) {
        self.obstacles_dirty = true;
    }

    /// Install the obstacle callback; the mask is redrawn on the next tick
    pub fn set_obstacle_callback(
        &mut self,
        callback: impl FnMut(Rect, bool, &mut ObstacleCanvas) + 'static,
    ) {
        self.set_boxed_obstacle_callback(Box::new(callback));
    }

    /// Same as [`FluidEngine::set_obstacle_callback`] for an already boxed callback
    pub fn set_boxed_obstacle_callback(&mut self, callback: ObstacleCallback) {
        self.obstacle_callback = Some(callback);
        self.obstacles_dirty = true;
    }

    /// Grid-sized RGBA surface holding `texels`, for [`FluidEngine::apply_texture`]
    ///
    /// # Errors
    ///
    /// Propagates surface allocation failures.
    pub fn create_texture(&self, texels: &[Texel]) -> Result<K::Surface, EngineError> {
        let (width, height) = self.grid_size;
        let mut surface =
            self.kernels
                .create_surface("Texture", width, height, FieldFormat::RGBA32F)?;
        self.kernels.upload(&mut surface, texels);
        Ok(surface)
    }

    /// Blend `texture` into density or velocity: `field += weight * texture`
    pub fn apply_texture(&mut self, target: TextureTarget, texture: &K::Surface, weight: f32) {
        let kernels = &self.kernels;
        let (field, is_velocity) = match target {
            TextureTarget::Density => (&mut self.fields.density, false),
            TextureTarget::Velocity => (&mut self.fields.velocity, true),
        };
        {
            let (src, mut dst) = field.stage();
            kernels.apply_texture(&src, texture, dst.target(), weight, is_velocity);
        }
        field.swap();
    }

    /// Current velocity surface
    #[must_use]
    pub fn velocity(&self) -> &K::Surface {
        self.fields.velocity.source()
    }

    /// Current density surface
    #[must_use]
    pub fn density(&self) -> &K::Surface {
        self.fields.density.source()
    }

    /// Current temperature surface
    #[must_use]
    pub fn temperature(&self) -> &K::Surface {
        self.fields.temperature.source()
    }

    /// Read-only access to every field
    #[must_use]
    pub fn fields(&self) -> &FluidFields<K::Surface> {
        &self.fields
    }

    /// Blocking readback of the velocity field
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Readback`] if the GPU readback fails.
    pub fn read_velocity(&self) -> Result<Vec<Texel>, EngineError> {
        Ok(self.kernels.read(self.fields.velocity.source())?.into_owned())
    }

    /// Blocking readback of the density field
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Readback`] if the GPU readback fails.
    pub fn read_density(&self) -> Result<Vec<Texel>, EngineError> {
        Ok(self.kernels.read(self.fields.density.source())?.into_owned())
    }

    /// Blocking readback of the temperature field
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Readback`] if the GPU readback fails.
    pub fn read_temperature(&self) -> Result<Vec<Texel>, EngineError> {
        Ok(self
            .kernels
            .read(self.fields.temperature.source())?
            .into_owned())
    }

    /// Density along the right edge as RGBA8, two texels wide
    ///
    /// `y0` and `y1` are fractions of the height measured from the top, so rows
    /// `(1 - y1) * h .. (1 - y0) * h` are returned in increasing row order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Readback`] if the GPU readback fails.
    pub fn density_edge(&self, y0: f32, y1: f32) -> Result<Vec<u8>, EngineError> {
        let (width, height) = self.grid_size;
        let h = height as f32;
        let row = |fraction: f32| ((1.0 - fraction.clamp(0.0, 1.0)) * h).round() as u32;
        let (top, bottom) = (row(y1), row(y0));

        let texels = self.kernels.read_region(
            self.fields.density.source(),
            width.saturating_sub(2),
            top,
            2,
            bottom.saturating_sub(top),
        )?;

        let to_byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        Ok(texels
            .iter()
            .flat_map(|t| [to_byte(t.x), to_byte(t.y), to_byte(t.z), to_byte(t.w)])
            .collect())
    }

    /// Window size in world units
    #[must_use]
    pub fn size(&self) -> Vec2 {
        self.grid.window_size()
    }

    /// Grid cells per world unit
    #[must_use]
    pub fn scale(&self) -> f32 {
        self.grid.scale
    }

    /// Grid dimensions `(width, height)`
    #[must_use]
    pub fn grid_size(&self) -> (u32, u32) {
        self.grid_size
    }

    /// Backend the engine runs on
    #[must_use]
    pub fn kernels(&self) -> &K {
        &self.kernels
    }

    /// Tick duration statistics
    #[must_use]
    pub fn timer(&self) -> &TickTimer {
        &self.timer
    }
}
