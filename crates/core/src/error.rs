//! Error types for engine construction and scene persistence
//!
//! Two families are kept apart:
//! - [`EngineError`]: resource failures while building an engine. These are fatal,
//!   an engine never runs partially initialized.
//! - [`SceneError`]: configuration failures at the load/save boundary. The caller
//!   keeps its previous state when one of these is returned.

use std::fmt;

/// Fatal errors raised while creating compute resources
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// No compatible GPU adapter was found
    NoAdapter,
    /// Adapter found but the device could not be created
    DeviceRequest {
        /// Name of the adapter that failed
        adapter_name: String,
        /// Driver error message
        error: String,
    },
    /// A surface of this size exceeds the device limits
    SurfaceTooLarge { width: u32, height: u32 },
    /// Grid dimensions of zero (window too small for the scale)
    InvalidGrid { width: u32, height: u32 },
    /// Mapping a staging buffer for readback failed
    Readback(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NoAdapter => write!(f, "No compatible GPU adapter found"),
            EngineError::DeviceRequest {
                adapter_name,
                error,
            } => write!(f, "GPU '{adapter_name}' failed to initialize: {error}"),
            EngineError::SurfaceTooLarge { width, height } => {
                write!(f, "Surface {width}x{height} exceeds device limits")
            }
            EngineError::InvalidGrid { width, height } => {
                write!(f, "Invalid grid dimensions {width}x{height}")
            }
            EngineError::Readback(msg) => write!(f, "Failed to read back surface: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Errors at the scene/force persistence boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// Failed to read file
    Read(String),
    /// Failed to parse file contents
    Parse(String),
    /// Failed to serialize scene
    Serialize(String),
    /// Failed to write file
    Write(String),
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneError::Read(msg) => write!(f, "Failed to read scene: {msg}"),
            SceneError::Parse(msg) => write!(f, "Failed to parse scene: {msg}"),
            SceneError::Serialize(msg) => write!(f, "Failed to serialize scene: {msg}"),
            SceneError::Write(msg) => write!(f, "Failed to write scene: {msg}"),
        }
    }
}

impl std::error::Error for SceneError {}
