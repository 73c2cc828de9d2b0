//! Volume Registry
//!
//! The set of active fog volumes. Hosts insert a volume when its owner
//! becomes active and remove it when deactivated; the froxel renderer takes a
//! snapshot once per frame.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec3;

use super::fog_volume::{Volume, VolumeId};
use crate::grid::VoxelGrid;

/// A volume resolved for one frame.
#[derive(Clone, Debug)]
pub struct ResolvedVolume {
    pub id: VolumeId,
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
    pub density: f32,
    pub intensity: f32,
    pub edge_falloff: f32,
    pub grid: Arc<VoxelGrid>,
}

/// Per-frame view of the registry.
#[derive(Clone, Debug, Default)]
pub struct VolumeSnapshot {
    /// Valid volumes in id order, at most the requested limit.
    pub volumes: Vec<ResolvedVolume>,
    /// Registered volume count.
    pub total: usize,
    /// Volumes without a source region.
    pub skipped_no_source: usize,
    /// Volumes whose source has no grid yet.
    pub skipped_no_grid: usize,
}

impl VolumeSnapshot {
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct VolumeRegistry {
    volumes: BTreeMap<VolumeId, Volume>,
}

impl VolumeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate `volume`. Returns `false` (and keeps the existing entry) if a
    /// volume with the same id is already registered.
    pub fn insert(&mut self, volume: Volume) -> bool {
        let id = volume.id();
        if self.volumes.contains_key(&id) {
            return false;
        }
        self.volumes.insert(id, volume);
        log::info!("[VolumeRegistry] Volume {} activated ({} active)", id, self.volumes.len());
        true
    }

    /// Deactivate and hand back the volume.
    pub fn remove(&mut self, id: VolumeId) -> Option<Volume> {
        let removed = self.volumes.remove(&id);
        if removed.is_some() {
            log::info!("[VolumeRegistry] Volume {} deactivated ({} active)", id, self.volumes.len());
        }
        removed
    }

    pub fn contains(&self, id: VolumeId) -> bool {
        self.volumes.contains_key(&id)
    }

    pub fn get(&self, id: VolumeId) -> Option<&Volume> {
        self.volumes.get(&id)
    }

    pub fn get_mut(&mut self, id: VolumeId) -> Option<&mut Volume> {
        self.volumes.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = VolumeId> + '_ {
        self.volumes.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Volume> {
        self.volumes.values()
    }

    /// Resolve bounds and grids of up to `limit` valid volumes.
    pub fn snapshot(&self, limit: usize) -> VolumeSnapshot {
        let mut snap = VolumeSnapshot {
            total: self.volumes.len(),
            ..Default::default()
        };
        for volume in self.volumes.values() {
            if snap.volumes.len() >= limit {
                break;
            }
            let Some((bounds_min, bounds_max)) = volume.world_bounds() else {
                snap.skipped_no_source += 1;
                continue;
            };
            if volume.source().is_none() {
                snap.skipped_no_source += 1;
                continue;
            }
            let Some(grid) = volume.grid() else {
                snap.skipped_no_grid += 1;
                continue;
            };
            snap.volumes.push(ResolvedVolume {
                id: volume.id(),
                bounds_min,
                bounds_max,
                density: volume.density_multiplier(),
                intensity: volume.intensity_multiplier(),
                edge_falloff: volume.edge_falloff(),
                grid,
            });
        }
        snap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::BakedVolume;
    use crate::grid::GridExtent;
    use glam::UVec3;

    fn baked() -> Arc<BakedVolume> {
        let out = BakedVolume::new(Vec3::ZERO, Vec3::ONE);
        let extent = GridExtent::centered(Vec3::ZERO, Vec3::ONE, 0.5).unwrap();
        out.publish_albedo(extent, Arc::new(VoxelGrid::zeroed(UVec3::splat(2))));
        out
    }

    #[test]
    fn test_no_duplicates() {
        let mut reg = VolumeRegistry::new();
        let v = Volume::new(baked());
        let copy = v.clone();
        assert!(reg.insert(v));
        assert!(!reg.insert(copy));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_snapshot_skips_invalid() {
        let mut reg = VolumeRegistry::new();
        reg.insert(Volume::new(baked()));
        reg.insert(Volume::unbound());
        reg.insert(Volume::new(BakedVolume::new(Vec3::ZERO, Vec3::ONE)));
        let snap = reg.snapshot(8);
        assert_eq!(snap.total, 3);
        assert_eq!(snap.volumes.len(), 1);
        assert_eq!(snap.skipped_no_source, 1);
        assert_eq!(snap.skipped_no_grid, 1);
    }

    #[test]
    fn test_snapshot_respects_limit() {
        let mut reg = VolumeRegistry::new();
        for _ in 0..10 {
            reg.insert(Volume::new(baked()));
        }
        assert_eq!(reg.snapshot(8).volumes.len(), 8);
    }
}
