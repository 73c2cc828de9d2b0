//! Voxel Grid Storage
//!
//! Dense 3D grids of RGBA texels shared by the baker, the tracer, and the
//! froxel injector. Texels are laid out x-fastest, then y, then z, matching
//! the `array<vec4<f32>>` storage buffers the compute shaders address.
//!
//! A grid lives either in host memory (CPU fallback path) or in a GPU storage
//! buffer. Grids are immutable once produced and shared as `Arc<VoxelGrid>`;
//! every grid carries a process-unique id so device-side consumers can tell
//! when a cached upload is stale.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::{UVec3, Vec3, Vec4};

use crate::error::{Result, ToasterError};

static NEXT_GRID_ID: AtomicU64 = AtomicU64::new(1);

/// World-space placement of a voxel grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridExtent {
    /// Minimum corner in world space.
    pub min: Vec3,
    /// Edge length of one voxel.
    pub voxel_size: f32,
    /// Number of voxels along each axis.
    pub resolution: UVec3,
}

impl GridExtent {
    /// Build an extent centered on `center` covering `bounds_size`.
    pub fn centered(center: Vec3, bounds_size: Vec3, voxel_size: f32) -> Result<Self> {
        let resolution = grid_resolution(bounds_size, voxel_size)?;
        Ok(Self {
            min: center - bounds_size * 0.5,
            voxel_size,
            resolution,
        })
    }

    /// Maximum corner of the voxelized region (may exceed the requested bounds
    /// by up to one voxel when the size is not a multiple of `voxel_size`).
    pub fn max(&self) -> Vec3 {
        self.min + self.resolution.as_vec3() * self.voxel_size
    }

    /// Total voxel count.
    pub fn voxel_count(&self) -> usize {
        self.resolution.x as usize * self.resolution.y as usize * self.resolution.z as usize
    }

    /// World-space center of voxel `(x, y, z)`.
    #[inline]
    pub fn voxel_center(&self, x: u32, y: u32, z: u32) -> Vec3 {
        self.min + (UVec3::new(x, y, z).as_vec3() + Vec3::splat(0.5)) * self.voxel_size
    }

    /// Continuous voxel-space coordinate of a world position.
    #[inline]
    pub fn world_to_voxel(&self, p: Vec3) -> Vec3 {
        (p - self.min) / self.voxel_size
    }
}

/// Grid resolution implied by a bounds size and voxel size: `ceil(size / voxel)`.
pub fn grid_resolution(bounds_size: Vec3, voxel_size: f32) -> Result<UVec3> {
    let invalid = || ToasterError::InvalidGridExtent {
        bounds: bounds_size.to_array(),
        voxel_size,
    };
    if !(voxel_size > 0.0) || !bounds_size.is_finite() || bounds_size.min_element() <= 0.0 {
        return Err(invalid());
    }
    let res = (bounds_size / voxel_size).ceil();
    if res.max_element() > u32::MAX as f32 {
        return Err(invalid());
    }
    Ok(res.as_uvec3().max(UVec3::ONE))
}

/// Linear texel index for `(x, y, z)` in a grid of `resolution`.
#[inline]
pub fn texel_index(resolution: UVec3, x: u32, y: u32, z: u32) -> usize {
    (z as usize * resolution.y as usize + y as usize) * resolution.x as usize + x as usize
}

/// Where a grid's texels live.
pub enum GridStorage {
    /// Host memory, produced by the CPU fallback path.
    Host(Vec<Vec4>),
    /// GPU storage buffer of `vec4<f32>` texels.
    Device(wgpu::Buffer),
}

/// A dense RGBA voxel grid (albedo/occupancy or lighting).
pub struct VoxelGrid {
    id: u64,
    resolution: UVec3,
    storage: GridStorage,
}

impl std::fmt::Debug for VoxelGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoxelGrid")
            .field("id", &self.id)
            .field("resolution", &self.resolution)
            .field("backend", &self.backend_name())
            .finish()
    }
}

impl VoxelGrid {
    /// Wrap host texels. `texels.len()` must equal the resolution's voxel count.
    pub fn from_host(resolution: UVec3, texels: Vec<Vec4>) -> Result<Self> {
        let expected = resolution.x as usize * resolution.y as usize * resolution.z as usize;
        if texels.len() != expected {
            return Err(ToasterError::ResolutionMismatch {
                expected: resolution.to_array(),
                actual: [texels.len() as u32, 1, 1],
            });
        }
        Ok(Self {
            id: NEXT_GRID_ID.fetch_add(1, Ordering::Relaxed),
            resolution,
            storage: GridStorage::Host(texels),
        })
    }

    /// A host grid cleared to zero.
    pub fn zeroed(resolution: UVec3) -> Self {
        let count = resolution.x as usize * resolution.y as usize * resolution.z as usize;
        Self {
            id: NEXT_GRID_ID.fetch_add(1, Ordering::Relaxed),
            resolution,
            storage: GridStorage::Host(vec![Vec4::ZERO; count]),
        }
    }

    /// Wrap a GPU storage buffer holding `resolution` texels.
    pub fn from_device(resolution: UVec3, buffer: wgpu::Buffer) -> Self {
        Self {
            id: NEXT_GRID_ID.fetch_add(1, Ordering::Relaxed),
            resolution,
            storage: GridStorage::Device(buffer),
        }
    }

    /// Process-unique identity of this grid's contents.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Voxel counts per axis.
    pub fn resolution(&self) -> UVec3 {
        self.resolution
    }

    /// Total voxel count.
    pub fn voxel_count(&self) -> usize {
        self.resolution.x as usize * self.resolution.y as usize * self.resolution.z as usize
    }

    /// Size in bytes of the texel payload.
    pub fn byte_size(&self) -> u64 {
        (self.voxel_count() * std::mem::size_of::<Vec4>()) as u64
    }

    /// Storage backing the texels.
    pub fn storage(&self) -> &GridStorage {
        &self.storage
    }

    /// `"host"` or `"device"`.
    pub fn backend_name(&self) -> &'static str {
        match self.storage {
            GridStorage::Host(_) => "host",
            GridStorage::Device(_) => "device",
        }
    }

    /// Host texels, if the grid lives in host memory.
    pub fn texels(&self) -> Option<&[Vec4]> {
        match &self.storage {
            GridStorage::Host(texels) => Some(texels),
            GridStorage::Device(_) => None,
        }
    }

    /// Host texels or a backend error.
    pub fn host_texels(&self) -> Result<&[Vec4]> {
        self.texels().ok_or(ToasterError::WrongBackend {
            wanted: "host",
            found: self.backend_name(),
        })
    }

    /// GPU buffer, if the grid lives on the device.
    pub fn buffer(&self) -> Option<&wgpu::Buffer> {
        match &self.storage {
            GridStorage::Device(buffer) => Some(buffer),
            GridStorage::Host(_) => None,
        }
    }

    /// Texel at `(x, y, z)`; `None` when out of range or not host-resident.
    pub fn texel(&self, x: u32, y: u32, z: u32) -> Option<Vec4> {
        if x >= self.resolution.x || y >= self.resolution.y || z >= self.resolution.z {
            return None;
        }
        self.texels()
            .map(|t| t[texel_index(self.resolution, x, y, z)])
    }

    /// Trilinear clamp-to-edge sample at normalized `uvw`. Device grids read as zero.
    pub fn sample_trilinear(&self, uvw: Vec3) -> Vec4 {
        match &self.storage {
            GridStorage::Host(texels) => sample_trilinear(texels, self.resolution, uvw),
            GridStorage::Device(_) => Vec4::ZERO,
        }
    }
}

/// Trilinear clamp-to-edge sample of a texel array at normalized `uvw`.
///
/// Texel centers sit at `(i + 0.5) / res`, the same convention the WGSL
/// `sample_grid` helpers use.
pub fn sample_trilinear(texels: &[Vec4], resolution: UVec3, uvw: Vec3) -> Vec4 {
    let res = resolution.as_vec3();
    let p = (uvw * res - Vec3::splat(0.5)).clamp(Vec3::ZERO, res - Vec3::ONE);
    let p0 = p.floor();
    let f = p - p0;
    let i0 = p0.as_uvec3();
    let i1 = (i0 + UVec3::ONE).min(resolution - UVec3::ONE);

    let fetch = |x: u32, y: u32, z: u32| texels[texel_index(resolution, x, y, z)];

    let c00 = fetch(i0.x, i0.y, i0.z).lerp(fetch(i1.x, i0.y, i0.z), f.x);
    let c10 = fetch(i0.x, i1.y, i0.z).lerp(fetch(i1.x, i1.y, i0.z), f.x);
    let c01 = fetch(i0.x, i0.y, i1.z).lerp(fetch(i1.x, i0.y, i1.z), f.x);
    let c11 = fetch(i0.x, i1.y, i1.z).lerp(fetch(i1.x, i1.y, i1.z), f.x);

    let c0 = c00.lerp(c10, f.y);
    let c1 = c01.lerp(c11, f.y);
    c0.lerp(c1, f.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_resolution() {
        let res = grid_resolution(Vec3::new(12.0, 8.0, 12.0), 0.25).unwrap();
        assert_eq!(res, UVec3::new(48, 32, 48));
        assert_eq!(res.x * res.y * res.z, 73_728);
    }

    #[test]
    fn test_resolution_rounds_up() {
        let res = grid_resolution(Vec3::new(1.1, 1.0, 0.3), 0.25).unwrap();
        assert_eq!(res, UVec3::new(5, 4, 2));
    }

    #[test]
    fn test_invalid_extent_rejected() {
        assert!(grid_resolution(Vec3::new(1.0, 1.0, 1.0), 0.0).is_err());
        assert!(grid_resolution(Vec3::new(1.0, -1.0, 1.0), 0.5).is_err());
        assert!(grid_resolution(Vec3::new(1.0, 1.0, 1.0), f32::NAN).is_err());
    }

    #[test]
    fn test_texel_index_is_x_fastest() {
        let res = UVec3::new(4, 3, 2);
        assert_eq!(texel_index(res, 1, 0, 0), 1);
        assert_eq!(texel_index(res, 0, 1, 0), 4);
        assert_eq!(texel_index(res, 0, 0, 1), 12);
        assert_eq!(texel_index(res, 3, 2, 1), 23);
    }

    #[test]
    fn test_extent_voxel_center() {
        let extent = GridExtent::centered(Vec3::ZERO, Vec3::new(12.0, 8.0, 12.0), 0.25).unwrap();
        assert_eq!(extent.min, Vec3::new(-6.0, -4.0, -6.0));
        assert_eq!(extent.voxel_center(0, 0, 0), Vec3::new(-5.875, -3.875, -5.875));
        assert_eq!(extent.max(), Vec3::new(6.0, 4.0, 6.0));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = VoxelGrid::zeroed(UVec3::ONE);
        let b = VoxelGrid::zeroed(UVec3::ONE);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_from_host_rejects_wrong_length() {
        assert!(VoxelGrid::from_host(UVec3::new(2, 2, 2), vec![Vec4::ZERO; 7]).is_err());
    }

    #[test]
    fn test_trilinear_at_texel_center_is_exact() {
        let res = UVec3::new(2, 1, 1);
        let texels = vec![Vec4::new(1.0, 0.0, 0.0, 1.0), Vec4::new(0.0, 1.0, 0.0, 1.0)];
        let s = sample_trilinear(&texels, res, Vec3::new(0.25, 0.5, 0.5));
        assert_eq!(s, texels[0]);
        let mid = sample_trilinear(&texels, res, Vec3::new(0.5, 0.5, 0.5));
        assert!((mid - Vec4::new(0.5, 0.5, 0.0, 1.0)).abs().max_element() < 1e-6);
    }

    #[test]
    fn test_trilinear_clamps_outside() {
        let res = UVec3::new(2, 1, 1);
        let texels = vec![Vec4::splat(2.0), Vec4::splat(4.0)];
        assert_eq!(sample_trilinear(&texels, res, Vec3::new(-1.0, 0.5, 0.5)), Vec4::splat(2.0));
        assert_eq!(sample_trilinear(&texels, res, Vec3::new(3.0, 0.5, 0.5)), Vec4::splat(4.0));
    }
}
