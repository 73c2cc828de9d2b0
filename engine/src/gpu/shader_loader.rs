//! Shader Modules
//!
//! Compute and composite shaders are embedded at compile time. Every GPU
//! backend also has a `with_shader(s)` constructor taking WGSL source, so a
//! host can hand in an edited copy without rebuilding.

/// Create a wgpu shader module from WGSL source.
pub fn create_shader_module(device: &wgpu::Device, label: &str, source: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

/// Embedded shaders that are compiled into the binary.
pub mod embedded {
    /// Clear / accumulate / finalize kernels for voxel baking.
    pub const VOXELIZE: &str = include_str!("../../../shaders/voxelize.wgsl");
    /// Direct / surface / volumetric kernels for light tracing.
    pub const TRACER: &str = include_str!("../../../shaders/tracer.wgsl");
    /// Clear / inject / integrate kernels for froxel fog.
    pub const FROXEL: &str = include_str!("../../../shaders/froxel.wgsl");
    /// Fullscreen composite of the integrated froxel buffer.
    pub const FROXEL_COMPOSITE: &str = include_str!("../../../shaders/froxel_composite.wgsl");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_entry_points() {
        assert!(embedded::VOXELIZE.contains("fn accumulate"));
        assert!(embedded::TRACER.contains("fn volumetric"));
        assert!(embedded::FROXEL.contains("fn integrate"));
        assert!(embedded::FROXEL_COMPOSITE.contains("fn fs_main"));
    }
}
