//! Froxel Tests - Slicing, Integration, Temporal Blending and Frame Skips
//!
//! End-to-end tests for the CPU froxel renderer plus the depth slicing and
//! column integration it is built from.

use std::sync::Arc;

use glam::{UVec3, Vec3, Vec4};
use toaster_engine::bake::BakedVolume;
use toaster_engine::config::FroxelSettings;
use toaster_engine::froxel::integrate::integrate_column;
use toaster_engine::froxel::{DepthSlicing, FrameOutcome, FrameTarget, FroxelRenderer, SkipReason};
use toaster_engine::grid::{GridExtent, VoxelGrid, texel_index};
use toaster_engine::scene::{CameraKind, CameraView, Light};
use toaster_engine::volume::{Volume, VolumeRegistry};

const FOG_DENSITY: f32 = 0.03;

/// A 100m box of empty albedo around the origin, so every froxel of a
/// 20m-deep frustum sees the same medium.
fn uniform_fog() -> VolumeRegistry {
    let source = BakedVolume::new(Vec3::ZERO, Vec3::splat(100.0));
    let extent = GridExtent::centered(Vec3::ZERO, Vec3::splat(100.0), 50.0).unwrap();
    source.publish_albedo(extent, Arc::new(VoxelGrid::zeroed(UVec3::splat(2))));
    let mut registry = VolumeRegistry::new();
    registry.insert(Volume::new(source).with_edge_falloff(0.0));
    registry
}

fn settings() -> FroxelSettings {
    FroxelSettings {
        resolution: UVec3::new(4, 4, 8),
        near_plane: 0.3,
        max_distance: 20.0,
        depth_uniformity: 1.0,
        fog_density: FOG_DENSITY,
        ..Default::default()
    }
}

fn camera() -> CameraView {
    CameraView::look_at(Vec3::ZERO, Vec3::NEG_Z, 60f32.to_radians(), 1.0, 0.1, 100.0)
}

fn frame() -> FrameTarget {
    FrameTarget::filled(8, 8, Vec4::new(0.5, 0.5, 0.5, 1.0), 1.0)
}

// ============================================================================
// Depth Slicing Tests
// ============================================================================

#[test]
fn test_logarithmic_slice_boundaries() {
    let s = FroxelSettings {
        depth_uniformity: 0.0,
        ..Default::default()
    };
    assert_eq!(s.resolution, UVec3::new(160, 90, 128));
    let slicing = DepthSlicing::new(s.near_plane, s.max_distance, s.depth_uniformity, s.resolution.z);
    for k in [0, 1, 16, 64, 127, 128] {
        let expected = 0.3 * (200.0f32 / 0.3).powf(k as f32 / 128.0);
        let actual = slicing.depth_at(k as f32 / 128.0);
        assert!(
            (actual - expected).abs() <= expected * 1e-4,
            "slice {}: {} vs {}",
            k,
            actual,
            expected
        );
    }
}

#[test]
fn test_slice_thicknesses_sum_to_range() {
    for uniformity in [0.0, 0.5, 1.0] {
        let slicing = DepthSlicing::new(0.3, 200.0, uniformity, 128);
        let total: f32 = slicing.thicknesses().iter().sum();
        assert!((total - 199.7).abs() < 1e-2, "uniformity {}: {}", uniformity, total);
    }
}

// ============================================================================
// Integration Tests
// ============================================================================

#[test]
fn test_uniform_medium_matches_closed_form() {
    let slicing = DepthSlicing::new(0.3, 200.0, 1.0, 128);
    let r = Vec3::new(0.2, 0.1, 0.05);
    let k = 0.01;
    let cells = vec![r.extend(k); 128];
    let mut out = vec![Vec4::ZERO; 128];
    integrate_column(&cells, &slicing.thicknesses(), &mut out);

    let length = 200.0 - 0.3;
    let expected_t = (-k * length).exp();
    let expected_l = r * (1.0 - expected_t) / k;
    let last = out[127];
    assert!((last.w - expected_t).abs() < 1e-4, "{} vs {}", last.w, expected_t);
    assert!((last.truncate() - expected_l).abs().max_element() < expected_l.max_element() * 1e-3);
}

// ============================================================================
// Renderer Tests
// ============================================================================

#[test]
fn test_uniform_fog_renders() {
    let registry = uniform_fog();
    let mut renderer = FroxelRenderer::new(settings()).unwrap().with_workers(2);
    let mut target = frame();
    let outcome = renderer.render(&camera(), &registry, &[], &mut target);

    match outcome {
        FrameOutcome::Rendered(stats) => {
            assert_eq!(stats.volume_count, 1);
            assert_eq!(stats.light_count, 0);
            assert_eq!(stats.frame_index, 0);
        }
        other => panic!("expected a rendered frame, got {:?}", other),
    }
    assert_eq!(renderer.frame_index(), 1);

    let res = settings().resolution;
    let scattering = renderer.scattering().unwrap();
    for cell in scattering {
        assert!((cell.w - FOG_DENSITY).abs() < 1e-6);
    }
    let integrated = renderer.integrated().unwrap();
    let far = integrated[texel_index(res, 1, 1, res.z - 1)];
    assert!((far.w - (-FOG_DENSITY * 19.7).exp()).abs() < 1e-4);

    // Far-plane pixels are attenuated and gain in-scattered ambient.
    let pixel = target.pixel(4, 4);
    assert!(pixel.x < 0.5);
    assert!(pixel.z > pixel.x);
    assert_eq!(pixel.w, 1.0);
}

#[test]
fn test_temporal_blend_converges() {
    let registry = uniform_fog();
    let alpha = 0.25;
    let mut renderer = FroxelRenderer::new(FroxelSettings {
        enable_temporal: true,
        temporal_blend_alpha: alpha,
        ..settings()
    })
    .unwrap();
    let cam = camera();
    let res = settings().resolution;
    let probe = texel_index(res, 2, 2, 4);

    for n in 1..=6 {
        let mut target = frame();
        assert!(renderer.render(&cam, &registry, &[], &mut target).is_rendered());
        // The blended frame has been swapped into history.
        let blended = renderer.history().unwrap()[probe];
        let expected = FOG_DENSITY * (1.0 - (1.0 - alpha).powi(n));
        assert!(
            (blended.w - expected).abs() < 1e-6,
            "frame {}: {} vs {}",
            n,
            blended.w,
            expected
        );
    }
}

#[test]
fn test_height_fog_thins_with_altitude() {
    let registry = uniform_fog();
    let mut renderer = FroxelRenderer::new(FroxelSettings {
        enable_height_fog: true,
        height_fog_base: -1.0,
        height_fog_top: 0.0,
        ..settings()
    })
    .unwrap();
    renderer.render(&camera(), &registry, &[], &mut frame());

    let res = settings().resolution;
    let scattering = renderer.scattering().unwrap();
    // Froxel rows run bottom to top.
    let low = scattering[texel_index(res, 1, 0, res.z - 1)];
    let high = scattering[texel_index(res, 1, res.y - 1, res.z - 1)];
    assert!((low.w - FOG_DENSITY).abs() < 1e-6);
    assert_eq!(high, Vec4::ZERO);
}

#[test]
fn test_point_light_brightens_nearby_fog() {
    let registry = uniform_fog();
    let mut renderer = FroxelRenderer::new(settings()).unwrap();
    let lamp = Light::point(Vec3::new(0.0, 0.0, -5.0), 10.0, Vec3::ONE, 4.0);

    renderer.render(&camera(), &registry, &[], &mut frame());
    let dark = renderer.integrated().unwrap().to_vec();
    renderer.render(&camera(), &registry, &[lamp], &mut frame());
    let lit = renderer.integrated().unwrap();

    let res = settings().resolution;
    let i = texel_index(res, 2, 2, res.z - 1);
    assert!(lit[i].x > dark[i].x);
    assert!(lit[i].w < dark[i].w);
}

// ============================================================================
// Skip Tests
// ============================================================================

#[test]
fn test_preview_camera_is_skipped() {
    let registry = uniform_fog();
    let mut renderer = FroxelRenderer::new(settings()).unwrap();
    let mut target = frame();
    let cam = camera().with_kind(CameraKind::Preview);
    assert_eq!(
        renderer.render(&cam, &registry, &[], &mut target),
        FrameOutcome::Skipped(SkipReason::Camera(CameraKind::Preview))
    );
    assert_eq!(target, frame());
    assert_eq!(renderer.frame_index(), 0);
}

#[test]
fn test_no_valid_volumes_is_skipped() {
    let mut registry = VolumeRegistry::new();
    registry.insert(Volume::unbound());
    registry.insert(Volume::new(BakedVolume::new(Vec3::ZERO, Vec3::ONE)));
    let mut renderer = FroxelRenderer::new(settings()).unwrap();
    let mut target = frame();
    let outcome = renderer.render(&camera(), &registry, &[], &mut target);
    assert_eq!(
        outcome,
        FrameOutcome::Skipped(SkipReason::NoVolumes {
            total: 2,
            missing_source: 1,
            missing_grid: 1,
        })
    );
    assert_eq!(target, frame());
}

#[test]
fn test_released_renderer_is_skipped() {
    let registry = uniform_fog();
    let mut renderer = FroxelRenderer::new(settings()).unwrap();
    renderer.release();
    let mut target = frame();
    assert_eq!(
        renderer.render(&camera(), &registry, &[], &mut target),
        FrameOutcome::Skipped(SkipReason::MissingResource("froxel buffers"))
    );
    assert!(renderer.integrated().is_none());

    renderer.set_settings(settings()).unwrap();
    assert!(renderer.render(&camera(), &registry, &[], &mut target).is_rendered());
}
