//! GPU context and initialization
//!
//! This module handles GPU device initialization and capability detection.
//! It distinguishes between "no GPU found" and "GPU found but failed to
//! initialize" (potential driver issue). Both are fatal to engine construction;
//! the caller decides whether to build a CPU engine instead.

use crate::error::EngineError;
use tracing::{debug, info};

/// Bytes per texel: every field is stored as `vec4<f32>`
pub(crate) const TEXEL_BYTES: u64 = 16;

/// GPU context managing device and queue
///
/// Wraps wgpu device and queue along with adapter information.
#[derive(Debug)]
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Initialize GPU context
    ///
    /// Attempts to create a wgpu device and queue for compute work.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NoAdapter`] - No compatible GPU adapter
    /// - [`EngineError::DeviceRequest`] - Adapter found but the device request failed
    pub fn new() -> Result<Self, EngineError> {
        info!("Attempting to initialize GPU context");

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let Some(adapter) =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            }))
        else {
            debug!("No GPU adapter found");
            return Err(EngineError::NoAdapter);
        };

        let adapter_info = adapter.get_info();
        let adapter_name = adapter_info.name.clone();
        debug!("Found GPU adapter: {}", adapter_name);

        // Device creation can fail even with a valid adapter
        let limits = wgpu::Limits::default().using_resolution(adapter.limits());
        match pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Fluid Sim GPU"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        )) {
            Ok((device, queue)) => {
                info!("GPU context initialized successfully: {}", adapter_name);
                Ok(Self {
                    device,
                    queue,
                    adapter_info,
                })
            }
            Err(e) => {
                debug!("Failed to create GPU device: {}", e);
                Err(EngineError::DeviceRequest {
                    adapter_name,
                    error: e.to_string(),
                })
            }
        }
    }

    /// Get adapter name for logging
    ///
    /// # Returns
    ///
    /// GPU adapter name (e.g., "NVIDIA `GeForce` GTX 1660")
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        &self.adapter_info.name
    }

    /// Check that one field surface of the given size fits the device limits
    ///
    /// A surface is a single storage buffer of `width × height` texels and is
    /// dispatched in 16×16 workgroups.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SurfaceTooLarge`] when the buffer or the dispatch would
    /// exceed a limit.
    pub fn check_surface(&self, width: u32, height: u32) -> Result<(), EngineError> {
        let bytes = TEXEL_BYTES * u64::from(width) * u64::from(height);
        let limits = self.device.limits();
        let max_binding = u64::from(limits.max_storage_buffer_binding_size);
        let max_groups = limits.max_compute_workgroups_per_dimension;

        if bytes > limits.max_buffer_size.min(max_binding)
            || width.div_ceil(16) > max_groups
            || height.div_ceil(16) > max_groups
        {
            return Err(EngineError::SurfaceTooLarge { width, height });
        }
        Ok(())
    }

    /// Get reference to wgpu device
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get reference to wgpu queue
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_init_returns_valid_result() {
        // Which variant comes back depends on hardware availability
        match GpuContext::new() {
            Ok(ctx) => assert!(!ctx.adapter_name().is_empty()),
            Err(EngineError::NoAdapter) => {}
            Err(EngineError::DeviceRequest {
                adapter_name,
                error,
            }) => {
                assert!(!adapter_name.is_empty());
                assert!(!error.is_empty());
            }
            Err(other) => panic!("unexpected init error: {other}"),
        }
    }

    #[test]
    fn test_check_surface() {
        let Ok(ctx) = GpuContext::new() else {
            return;
        };
        assert!(ctx.check_surface(512, 512).is_ok());
        assert_eq!(
            ctx.check_surface(65536, 65536),
            Err(EngineError::SurfaceTooLarge {
                width: 65536,
                height: 65536
            })
        );
    }
}
