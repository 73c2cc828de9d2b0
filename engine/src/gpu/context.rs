//! GPU Context
//!
//! Headless device and queue shared by the GPU baker, tracer, and froxel
//! renderer. Hosts that already own a device can wrap it with
//! [`GpuContext::from_device`] instead of requesting a new one.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::error::{Result, ToasterError};
use crate::grid::{GridStorage, VoxelGrid};

/// Shared GPU resources
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

/// Configuration for GPU context creation
#[derive(Clone, Debug)]
pub struct GpuContextConfig {
    /// Prefer high-performance GPU
    pub high_performance: bool,
    /// Accept a software adapter when no hardware adapter exists
    pub allow_fallback_adapter: bool,
}

impl Default for GpuContextConfig {
    fn default() -> Self {
        Self {
            high_performance: true,
            allow_fallback_adapter: false,
        }
    }
}

impl GpuContext {
    /// Request an adapter and device without a surface.
    pub fn new(config: GpuContextConfig) -> Result<Arc<Self>> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: if config.high_performance {
                wgpu::PowerPreference::HighPerformance
            } else {
                wgpu::PowerPreference::LowPower
            },
            compatible_surface: None,
            force_fallback_adapter: config.allow_fallback_adapter,
        }))
        .map_err(|e| ToasterError::GpuUnavailable(e.to_string()))?;

        let info = adapter.get_info();
        log::info!("[GpuContext] Using adapter '{}' ({:?})", info.name, info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Toaster Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))
        .map_err(|e| ToasterError::GpuUnavailable(e.to_string()))?;

        Ok(Arc::new(Self { device, queue }))
    }

    /// Wrap a device the host already created.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Arc<Self> {
        Arc::new(Self { device, queue })
    }

    /// Create a uniform buffer with initial data
    pub fn create_uniform_buffer<T: bytemuck::Pod>(&self, label: &str, data: &T) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(data),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
    }

    /// Create a read-only storage buffer from a slice. Empty slices get one
    /// zeroed element so the binding stays valid.
    pub fn create_storage_buffer<T: bytemuck::Pod>(&self, label: &str, data: &[T]) -> wgpu::Buffer {
        if data.is_empty() {
            return self.create_zeroed_storage_buffer(label, std::mem::size_of::<T>().max(4) as u64);
        }
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            })
    }

    /// Create a zeroed read-write storage buffer of `size` bytes.
    pub fn create_zeroed_storage_buffer(&self, label: &str, size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size.max(16),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    /// Storage buffer holding `grid`'s texels. Device grids are shared,
    /// host grids are uploaded.
    pub fn grid_buffer(&self, label: &str, grid: &VoxelGrid) -> wgpu::Buffer {
        match grid.storage() {
            GridStorage::Device(buffer) => buffer.clone(),
            GridStorage::Host(texels) => self.create_storage_buffer(label, texels),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_prefers_hardware() {
        let config = GpuContextConfig::default();
        assert!(config.high_performance);
        assert!(!config.allow_fallback_adapter);
    }
}
