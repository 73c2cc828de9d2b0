//! Registry Tests - Volume Lifecycle and Per-Frame Snapshots
//!
//! Tests for how fog volumes enter and leave the registry and how their
//! bounds and grids are resolved for each frame.

use std::sync::Arc;

use glam::{UVec3, Vec3};
use toaster_engine::bake::{BakedVolume, VoxelBaker};
use toaster_engine::config::BakeSettings;
use toaster_engine::grid::{GridExtent, VoxelGrid};
use toaster_engine::volume::{Volume, VolumeRegistry};

fn baked_region(center: Vec3) -> Arc<BakedVolume> {
    let out = BakedVolume::new(center, Vec3::splat(2.0));
    let extent = GridExtent::centered(center, Vec3::splat(2.0), 1.0).unwrap();
    out.publish_albedo(extent, Arc::new(VoxelGrid::zeroed(UVec3::splat(2))));
    out
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[test]
fn test_insert_and_remove() {
    let mut registry = VolumeRegistry::new();
    let volume = Volume::new(baked_region(Vec3::ZERO));
    let id = volume.id();
    assert!(registry.insert(volume));
    assert!(registry.contains(id));

    let removed = registry.remove(id).unwrap();
    assert_eq!(removed.id(), id);
    assert!(registry.is_empty());
    assert!(registry.remove(id).is_none());
}

#[test]
fn test_snapshot_in_insertion_order() {
    let mut registry = VolumeRegistry::new();
    let ids: Vec<_> = (0..3)
        .map(|i| {
            let v = Volume::new(baked_region(Vec3::new(i as f32 * 5.0, 0.0, 0.0)));
            let id = v.id();
            registry.insert(v);
            id
        })
        .collect();
    let snap = registry.snapshot(8);
    let seen: Vec<_> = snap.volumes.iter().map(|v| v.id).collect();
    assert_eq!(seen, ids);
}

// ============================================================================
// Snapshot Resolution Tests
// ============================================================================

#[test]
fn test_bounds_follow_moved_source() {
    let source = baked_region(Vec3::ZERO);
    let mut registry = VolumeRegistry::new();
    registry.insert(Volume::new(source.clone()));

    source.set_center(Vec3::new(3.0, 0.0, 0.0));
    let snap = registry.snapshot(8);
    assert_eq!(snap.volumes[0].bounds_min, Vec3::new(2.0, -1.0, -1.0));
    assert_eq!(snap.volumes[0].bounds_max, Vec3::new(4.0, 1.0, 1.0));
}

#[test]
fn test_pinned_bounds_ignore_source() {
    let source = baked_region(Vec3::ZERO);
    let mut registry = VolumeRegistry::new();
    registry.insert(Volume::new(source.clone()).with_pinned_bounds(Vec3::ONE, Vec3::NEG_ONE));

    source.set_center(Vec3::splat(10.0));
    let snap = registry.snapshot(8);
    assert_eq!(snap.volumes[0].bounds_min, Vec3::NEG_ONE);
    assert_eq!(snap.volumes[0].bounds_max, Vec3::ONE);
}

#[test]
fn test_multipliers_are_clamped_into_snapshot() {
    let mut registry = VolumeRegistry::new();
    registry.insert(
        Volume::new(baked_region(Vec3::ZERO))
            .with_density(-2.0)
            .with_intensity(3.0)
            .with_edge_falloff(0.9),
    );
    let v = &registry.snapshot(8).volumes[0];
    assert_eq!(v.density, 0.0);
    assert_eq!(v.intensity, 3.0);
    assert_eq!(v.edge_falloff, 0.5);
}

#[test]
fn test_volume_prefers_lighting_grid() {
    let source = baked_region(Vec3::ZERO);
    let albedo = source.albedo().unwrap().id();
    let mut registry = VolumeRegistry::new();
    registry.insert(Volume::new(source.clone()));
    assert_eq!(registry.snapshot(8).volumes[0].grid.id(), albedo);

    let lighting = Arc::new(VoxelGrid::zeroed(UVec3::splat(2)));
    let lighting_id = lighting.id();
    source.publish_lighting(lighting, Arc::new(VoxelGrid::zeroed(UVec3::splat(2))));
    assert_eq!(registry.snapshot(8).volumes[0].grid.id(), lighting_id);
}

#[test]
fn test_rebake_clears_stale_lighting() {
    let mut baker = VoxelBaker::new(Vec3::ZERO, BakeSettings::default());
    baker.bake(&[]).unwrap();
    let source = baker.output();
    source.publish_lighting(
        Arc::new(VoxelGrid::zeroed(UVec3::splat(2))),
        Arc::new(VoxelGrid::zeroed(UVec3::splat(2))),
    );
    baker.bake(&[]).unwrap();
    assert!(source.lighting().is_none());

    let mut registry = VolumeRegistry::new();
    registry.insert(Volume::new(source.clone()));
    let snap = registry.snapshot(8);
    assert_eq!(snap.volumes[0].grid.id(), source.albedo().unwrap().id());
}
