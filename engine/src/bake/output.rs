//! Shared Bake Output
//!
//! The placement and grids produced for one baked region. A baker owns the
//! region and publishes its albedo grid here; a tracer bound to the same
//! region publishes its lighting grid; volumes read both every frame. Grids
//! are replaced wholesale, never mutated in place, so readers holding an
//! `Arc<VoxelGrid>` keep a consistent copy for as long as they need it.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use glam::Vec3;

use crate::grid::{GridExtent, VoxelGrid};

#[derive(Clone, Debug, Default)]
struct BakedState {
    center: Vec3,
    bounds_size: Vec3,
    extent: Option<GridExtent>,
    albedo: Option<Arc<VoxelGrid>>,
    lighting: Option<Arc<VoxelGrid>>,
    surface_lighting: Option<Arc<VoxelGrid>>,
}

/// Thread-safe handle to a baked region.
#[derive(Debug, Default)]
pub struct BakedVolume {
    state: RwLock<BakedState>,
}

impl BakedVolume {
    pub fn new(center: Vec3, bounds_size: Vec3) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(BakedState {
                center,
                bounds_size,
                ..Default::default()
            }),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, BakedState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BakedState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current world-space center of the region.
    pub fn center(&self) -> Vec3 {
        self.read().center
    }

    pub fn set_center(&self, center: Vec3) {
        self.write().center = center;
    }

    pub fn bounds_size(&self) -> Vec3 {
        self.read().bounds_size
    }

    pub fn set_bounds_size(&self, bounds_size: Vec3) {
        self.write().bounds_size = bounds_size;
    }

    /// `(min, max)` corners derived from the current center and size.
    pub fn world_bounds(&self) -> (Vec3, Vec3) {
        let s = self.read();
        let half = s.bounds_size * 0.5;
        (s.center - half, s.center + half)
    }

    /// Extent of the last successful bake.
    pub fn extent(&self) -> Option<GridExtent> {
        self.read().extent
    }

    pub fn albedo(&self) -> Option<Arc<VoxelGrid>> {
        self.read().albedo.clone()
    }

    /// Authoritative lighting grid from the last trace.
    pub fn lighting(&self) -> Option<Arc<VoxelGrid>> {
        self.read().lighting.clone()
    }

    /// Surface-pass lighting from the last trace, kept for inspection.
    pub fn surface_lighting(&self) -> Option<Arc<VoxelGrid>> {
        self.read().surface_lighting.clone()
    }

    /// Grid a fog volume should sample: lighting if traced, else albedo.
    pub fn preferred_grid(&self) -> Option<Arc<VoxelGrid>> {
        let s = self.read();
        s.lighting.clone().or_else(|| s.albedo.clone())
    }

    /// Install a fresh albedo grid. Lighting traced from the previous albedo
    /// no longer matches and is dropped.
    pub fn publish_albedo(&self, extent: GridExtent, grid: Arc<VoxelGrid>) {
        let mut s = self.write();
        s.extent = Some(extent);
        s.albedo = Some(grid);
        s.lighting = None;
        s.surface_lighting = None;
    }

    pub fn publish_lighting(&self, lighting: Arc<VoxelGrid>, surface: Arc<VoxelGrid>) {
        let mut s = self.write();
        s.lighting = Some(lighting);
        s.surface_lighting = Some(surface);
    }

    /// Drop lighting only.
    pub fn clear_lighting(&self) {
        let mut s = self.write();
        s.lighting = None;
        s.surface_lighting = None;
    }

    /// Drop every grid; placement is kept.
    pub fn clear(&self) {
        let mut s = self.write();
        s.extent = None;
        s.albedo = None;
        s.lighting = None;
        s.surface_lighting = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::UVec3;

    fn extent() -> GridExtent {
        GridExtent {
            min: Vec3::ZERO,
            voxel_size: 1.0,
            resolution: UVec3::ONE,
        }
    }

    #[test]
    fn test_preferred_grid_falls_back_to_albedo() {
        let out = BakedVolume::new(Vec3::ZERO, Vec3::ONE);
        assert!(out.preferred_grid().is_none());

        let albedo = Arc::new(VoxelGrid::zeroed(UVec3::ONE));
        out.publish_albedo(extent(), albedo.clone());
        assert_eq!(out.preferred_grid().unwrap().id(), albedo.id());

        let lit = Arc::new(VoxelGrid::zeroed(UVec3::ONE));
        let surf = Arc::new(VoxelGrid::zeroed(UVec3::ONE));
        out.publish_lighting(lit.clone(), surf);
        assert_eq!(out.preferred_grid().unwrap().id(), lit.id());
    }

    #[test]
    fn test_rebake_drops_stale_lighting() {
        let out = BakedVolume::new(Vec3::ZERO, Vec3::ONE);
        out.publish_albedo(extent(), Arc::new(VoxelGrid::zeroed(UVec3::ONE)));
        out.publish_lighting(
            Arc::new(VoxelGrid::zeroed(UVec3::ONE)),
            Arc::new(VoxelGrid::zeroed(UVec3::ONE)),
        );
        out.publish_albedo(extent(), Arc::new(VoxelGrid::zeroed(UVec3::ONE)));
        assert!(out.lighting().is_none());
    }

    #[test]
    fn test_world_bounds_follow_center() {
        let out = BakedVolume::new(Vec3::ZERO, Vec3::new(12.0, 8.0, 12.0));
        out.set_center(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(
            out.world_bounds(),
            (Vec3::new(-5.0, -4.0, -6.0), Vec3::new(7.0, 4.0, 6.0))
        );
    }
}
