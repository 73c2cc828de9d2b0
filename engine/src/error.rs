//! Error Types
//!
//! Failures that abort a bake, trace, or setup call. Every variant leaves the
//! previously produced grids and buffers untouched.

use thiserror::Error;

/// Errors produced by the baking, tracing, and froxel subsystems.
#[derive(Error, Debug)]
pub enum ToasterError {
    /// A GPU pipeline, buffer, or input grid the operation depends on is absent.
    #[error("missing required resource: {0}")]
    MissingResource(&'static str),

    /// Bounds or voxel size cannot produce a non-empty grid.
    #[error("invalid grid extent: bounds {bounds:?}, voxel size {voxel_size}")]
    InvalidGridExtent {
        /// Requested bounds size in world units.
        bounds: [f32; 3],
        /// Requested voxel edge length.
        voxel_size: f32,
    },

    /// Two grids that must line up voxel-for-voxel do not.
    #[error("grid resolution mismatch: expected {expected:?}, got {actual:?}")]
    ResolutionMismatch {
        /// Resolution the operation was configured for.
        expected: [u32; 3],
        /// Resolution of the grid that was supplied.
        actual: [u32; 3],
    },

    /// A grid stored on one backend was handed to the other.
    #[error("grid lives on the {found} backend, {wanted} backend required")]
    WrongBackend {
        /// Backend the caller needs.
        wanted: &'static str,
        /// Backend the grid is stored on.
        found: &'static str,
    },

    /// Froxel resolution has a zero axis.
    #[error("invalid froxel resolution {0:?}")]
    InvalidFroxelResolution([u32; 3]),

    /// No usable GPU adapter or device.
    #[error("gpu unavailable: {0}")]
    GpuUnavailable(String),

    /// Jitter texture could not be decoded.
    #[error("failed to load jitter texture: {0}")]
    JitterTexture(#[from] image::ImageError),

    /// Settings file could not be read.
    #[error("failed to read config: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// Settings file is not valid JSON for [`crate::config::ToasterConfig`].
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ToasterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_resource_message() {
        let err = ToasterError::MissingResource("voxelizer pipeline");
        assert_eq!(err.to_string(), "missing required resource: voxelizer pipeline");
    }

    #[test]
    fn test_invalid_extent_message_mentions_voxel_size() {
        let err = ToasterError::InvalidGridExtent {
            bounds: [1.0, 0.0, 1.0],
            voxel_size: 0.25,
        };
        assert!(err.to_string().contains("0.25"));
    }
}
