//! Fluid Simulation Core Library
//!
//! Real-time 2D smoke simulation on a regular grid using the stable-fluids method:
//! semi-Lagrangian advection, thermal buoyancy and a Jacobi pressure projection,
//! with every field double-buffered so each stage reads one buffer and writes the other.
//!
//! ## Layout
//!
//! - [`solver`]: the engine, the force queue, obstacles and the CPU/GPU stage kernels
//! - [`timeline`]: keyframed properties, scene elements and the looping sequencer
//! - [`overlay`]: tracer particles and the flow-field lines read from the fields

// Core types and utilities
pub mod core_types;
pub mod error;

pub mod overlay;
pub mod solver;
pub mod timeline;

// Re-export core types
pub use core_types::{Color, Rect, Texel, Vec2, Vec3};
pub use error::{EngineError, SceneError};

// Re-export engine types
pub use solver::{
    create_cpu_engine, create_engine, AnyEngine, Backend, CpuFluidEngine, FluidEngine, Force,
    GridConfig, ObstacleCanvas, ScalePreset, SimulationParameters, TextureTarget,
};

#[cfg(feature = "gpu")]
pub use solver::{create_gpu_engine, GpuFluidEngine};

// Re-export timeline types
pub use timeline::{FrameContext, Property, SceneDocument, SceneElement, Sequencer};

pub use overlay::{FlowField, ParticleOverlay};
