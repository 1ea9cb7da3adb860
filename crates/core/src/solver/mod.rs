//! Stable-fluids solver
//!
//! The per-tick pipeline lives in [`FluidEngine`]; the numerical stages are provided by
//! a [`StageKernels`] backend. Both backends evaluate the same formulas.
//!
//! # Feature Flags
//!
//! - `gpu` (default): wgpu compute backend. Disable with `--no-default-features`
//!   for environments without GPU access.
//!
//! # Backend Selection
//!
//! The backend is chosen explicitly through [`Backend`]. A failed GPU initialization
//! is reported as an [`EngineError`]; the caller decides whether to retry on the CPU.
//!
//! # Example
//!
//! ```rust,ignore
//! use fluid_sim_core::solver::{create_engine, Backend, GridConfig, ScalePreset};
//! use fluid_sim_core::timeline::FrameContext;
//!
//! let grid = GridConfig::from_preset(1280, 720, ScalePreset::Medium);
//! let mut engine = create_engine(Backend::Cpu, grid, Default::default())?;
//! engine.tick(&FrameContext::default());
//! ```

mod cpu;
mod engine;
mod fields;
mod force;
mod grid;
mod obstacle;
mod params;
mod ping_pong;
pub mod profiler;
#[allow(clippy::module_name_repetitions)]
mod r#trait;

#[cfg(feature = "gpu")]
mod context;
#[cfg(feature = "gpu")]
mod gpu;

// Re-exports
pub use cpu::CpuKernels;
pub use engine::{
    CpuFluidEngine, FluidEngine, FluidFields, ObstacleCallback, TextureTarget,
};
pub use fields::{sample_bilinear, FieldData, FieldFormat};
pub use force::{Force, ForceQueue, ForceRecord, REFERENCE_SCALE};
pub use grid::{GridConfig, ScalePreset};
pub use obstacle::ObstacleCanvas;
pub use params::{
    smooth_falloff, AttractorParams, BuoyancyParams, SimulationParameters, StageConstants,
    MAX_ATTRACTORS,
};
pub use ping_pong::{Destination, PingPong, Source};
pub use profiler::{StageTimer, TickTimer};
pub use r#trait::StageKernels;

#[cfg(feature = "gpu")]
pub use context::GpuContext;
#[cfg(feature = "gpu")]
pub use engine::GpuFluidEngine;
#[cfg(feature = "gpu")]
pub use gpu::{GpuKernels, GpuSurface};

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Compute backend for a new engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Backend {
    /// Rayon reference kernels
    Cpu,
    /// wgpu compute kernels
    #[default]
    Gpu,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Cpu => write!(f, "cpu"),
            Backend::Gpu => write!(f, "gpu"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Backend::Cpu),
            "gpu" => Ok(Backend::Gpu),
            other => Err(format!("unknown backend '{other}', expected cpu or gpu")),
        }
    }
}

/// Engine on either backend behind one type
///
/// The surfaces of the two backends differ, so the engine is held per backend rather
/// than as a trait object.
pub enum AnyEngine {
    Cpu(CpuFluidEngine),
    #[cfg(feature = "gpu")]
    Gpu(GpuFluidEngine),
}

/// Forward a call to whichever engine is held
macro_rules! with_engine {
    ($self:expr, $engine:ident => $body:expr) => {
        match $self {
            AnyEngine::Cpu($engine) => $body,
            #[cfg(feature = "gpu")]
            AnyEngine::Gpu($engine) => $body,
        }
    };
}

impl AnyEngine {
    #[must_use]
    pub fn backend(&self) -> Backend {
        match self {
            AnyEngine::Cpu(_) => Backend::Cpu,
            #[cfg(feature = "gpu")]
            AnyEngine::Gpu(_) => Backend::Gpu,
        }
    }

    pub fn tick(&mut self, frame: &crate::timeline::FrameContext) {
        with_engine!(self, e => e.tick(frame));
    }

    pub fn add_constant_force(&mut self, force: Force) {
        with_engine!(self, e => e.add_constant_force(force));
    }

    pub fn add_temporal_force(&mut self, force: Force) {
        with_engine!(self, e => e.add_temporal_force(force));
    }

    pub fn clear(&mut self) {
        with_engine!(self, e => e.clear());
    }

    pub fn enable_obstacles(&mut self, enabled: bool) {
        with_engine!(self, e => e.enable_obstacles(enabled));
    }

    pub fn mark_obstacles_dirty(&mut self) {
        with_engine!(self, e => e.mark_obstacles_dirty());
    }

    pub fn set_obstacle_callback(&mut self, callback: ObstacleCallback) {
        with_engine!(self, e => e.set_boxed_obstacle_callback(callback));
    }

    #[must_use]
    pub fn params(&self) -> &SimulationParameters {
        with_engine!(self, e => &e.params)
    }

    pub fn params_mut(&mut self) -> &mut SimulationParameters {
        with_engine!(self, e => &mut e.params)
    }

    pub fn read_velocity(&self) -> Result<Vec<crate::core_types::Texel>, EngineError> {
        with_engine!(self, e => e.read_velocity())
    }

    pub fn read_density(&self) -> Result<Vec<crate::core_types::Texel>, EngineError> {
        with_engine!(self, e => e.read_density())
    }

    pub fn read_temperature(&self) -> Result<Vec<crate::core_types::Texel>, EngineError> {
        with_engine!(self, e => e.read_temperature())
    }

    pub fn density_edge(&self, y0: f32, y1: f32) -> Result<Vec<u8>, EngineError> {
        with_engine!(self, e => e.density_edge(y0, y1))
    }

    #[must_use]
    pub fn grid_size(&self) -> (u32, u32) {
        with_engine!(self, e => e.grid_size())
    }

    #[must_use]
    pub fn scale(&self) -> f32 {
        with_engine!(self, e => e.scale())
    }

    #[must_use]
    pub fn size(&self) -> crate::core_types::Vec2 {
        with_engine!(self, e => e.size())
    }

    #[must_use]
    pub fn timer(&self) -> &TickTimer {
        with_engine!(self, e => e.timer())
    }
}

/// Create an engine on the CPU reference backend
///
/// # Errors
///
/// Returns [`EngineError::InvalidGrid`] when the grid has no cells.
pub fn create_cpu_engine(
    grid: GridConfig,
    params: SimulationParameters,
) -> Result<CpuFluidEngine, EngineError> {
    info!("Using CPU backend");
    FluidEngine::new(CpuKernels::new(), grid, params)
}

/// Create an engine on the wgpu backend
///
/// # Errors
///
/// Returns the adapter, device or allocation failure. There is no automatic fallback
/// to the CPU.
#[cfg(feature = "gpu")]
pub fn create_gpu_engine(
    grid: GridConfig,
    params: SimulationParameters,
) -> Result<GpuFluidEngine, EngineError> {
    let (width, height) = grid.grid_dimensions()?;
    let context = match GpuContext::new() {
        Ok(context) => context,
        Err(e) => {
            tracing::warn!("GPU initialization failed: {}", e);
            return Err(e);
        }
    };
    context.check_surface(width, height)?;
    info!(
        "Using GPU backend: {} ({}x{} grid)",
        context.adapter_name(),
        width,
        height
    );
    FluidEngine::new(GpuKernels::new(context), grid, params)
}

/// Create an engine on the requested backend
///
/// # Errors
///
/// Propagates construction failures. Requesting [`Backend::Gpu`] in a build without
/// the `gpu` feature returns [`EngineError::NoAdapter`].
pub fn create_engine(
    backend: Backend,
    grid: GridConfig,
    params: SimulationParameters,
) -> Result<AnyEngine, EngineError> {
    match backend {
        Backend::Cpu => create_cpu_engine(grid, params).map(AnyEngine::Cpu),
        #[cfg(feature = "gpu")]
        Backend::Gpu => create_gpu_engine(grid, params).map(AnyEngine::Gpu),
        #[cfg(not(feature = "gpu"))]
        Backend::Gpu => {
            tracing::warn!("GPU feature disabled, cannot create a GPU engine");
            Err(EngineError::NoAdapter)
        }
    }
}
