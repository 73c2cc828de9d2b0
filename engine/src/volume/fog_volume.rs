//! Fog Volume
//!
//! Binds a world-space box to a baked region's grid, with per-volume density,
//! intensity and edge-falloff controls for froxel injection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec3;

use crate::bake::BakedVolume;
use crate::grid::VoxelGrid;

static NEXT_VOLUME_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique volume identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VolumeId(u64);

impl VolumeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_VOLUME_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for VolumeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Upper bound of the density and intensity multipliers.
pub const MAX_MULTIPLIER: f32 = 10.0;

/// Upper bound of the edge falloff, in UVW units.
pub const MAX_EDGE_FALLOFF: f32 = 0.5;

#[derive(Clone, Debug)]
pub struct Volume {
    id: VolumeId,
    source: Option<Arc<BakedVolume>>,
    /// Follow the source region's placement every frame.
    pub auto_match_bounds: bool,
    pinned_min: Vec3,
    pinned_max: Vec3,
    density_multiplier: f32,
    intensity_multiplier: f32,
    edge_falloff: f32,
}

impl Volume {
    /// Volume tracking `source`'s bounds.
    pub fn new(source: Arc<BakedVolume>) -> Self {
        let (min, max) = source.world_bounds();
        Self {
            id: VolumeId::next(),
            source: Some(source),
            auto_match_bounds: true,
            pinned_min: min,
            pinned_max: max,
            density_multiplier: 1.0,
            intensity_multiplier: 1.0,
            edge_falloff: 0.1,
        }
    }

    /// Volume with no source yet; it is skipped until one is assigned.
    pub fn unbound() -> Self {
        Self {
            id: VolumeId::next(),
            source: None,
            auto_match_bounds: true,
            pinned_min: Vec3::ZERO,
            pinned_max: Vec3::ZERO,
            density_multiplier: 1.0,
            intensity_multiplier: 1.0,
            edge_falloff: 0.1,
        }
    }

    pub fn id(&self) -> VolumeId {
        self.id
    }

    pub fn source(&self) -> Option<&Arc<BakedVolume>> {
        self.source.as_ref()
    }

    pub fn set_source(&mut self, source: Option<Arc<BakedVolume>>) {
        self.source = source;
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.set_density_multiplier(density);
        self
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.set_intensity_multiplier(intensity);
        self
    }

    pub fn with_edge_falloff(mut self, falloff: f32) -> Self {
        self.set_edge_falloff(falloff);
        self
    }

    /// Stop following the source and use fixed bounds.
    pub fn with_pinned_bounds(mut self, min: Vec3, max: Vec3) -> Self {
        self.pin_bounds(min, max);
        self
    }

    pub fn density_multiplier(&self) -> f32 {
        self.density_multiplier
    }

    pub fn set_density_multiplier(&mut self, v: f32) {
        self.density_multiplier = v.clamp(0.0, MAX_MULTIPLIER);
    }

    pub fn intensity_multiplier(&self) -> f32 {
        self.intensity_multiplier
    }

    pub fn set_intensity_multiplier(&mut self, v: f32) {
        self.intensity_multiplier = v.clamp(0.0, MAX_MULTIPLIER);
    }

    pub fn edge_falloff(&self) -> f32 {
        self.edge_falloff
    }

    pub fn set_edge_falloff(&mut self, v: f32) {
        self.edge_falloff = v.clamp(0.0, MAX_EDGE_FALLOFF);
    }

    pub fn pin_bounds(&mut self, min: Vec3, max: Vec3) {
        self.auto_match_bounds = false;
        self.pinned_min = min.min(max);
        self.pinned_max = min.max(max);
    }

    /// Current world bounds: re-derived from the source when auto-matching,
    /// the pinned box otherwise.
    pub fn world_bounds(&self) -> Option<(Vec3, Vec3)> {
        match (&self.source, self.auto_match_bounds) {
            (Some(source), true) => Some(source.world_bounds()),
            (None, true) => None,
            (_, false) => Some((self.pinned_min, self.pinned_max)),
        }
    }

    /// Grid to inject: traced lighting if present, else baked albedo.
    pub fn grid(&self) -> Option<Arc<VoxelGrid>> {
        self.source.as_ref().and_then(|s| s.preferred_grid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(Volume::unbound().id(), Volume::unbound().id());
    }

    #[test]
    fn test_controls_clamp() {
        let v = Volume::unbound()
            .with_density(20.0)
            .with_intensity(-1.0)
            .with_edge_falloff(0.9);
        assert_eq!(v.density_multiplier(), 10.0);
        assert_eq!(v.intensity_multiplier(), 0.0);
        assert_eq!(v.edge_falloff(), 0.5);
    }

    #[test]
    fn test_auto_bounds_follow_source() {
        let source = BakedVolume::new(Vec3::ZERO, Vec3::new(2.0, 2.0, 2.0));
        let v = Volume::new(source.clone());
        source.set_center(Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(
            v.world_bounds(),
            Some((Vec3::new(9.0, -1.0, -1.0), Vec3::new(11.0, 1.0, 1.0)))
        );

        let pinned = Volume::new(source).with_pinned_bounds(Vec3::ONE, Vec3::ZERO);
        assert_eq!(pinned.world_bounds(), Some((Vec3::ZERO, Vec3::ONE)));
    }
}
