//! Bake Tests - Voxelization Coverage and Determinism
//!
//! Tests for the CPU voxel baker: which voxels a mesh lands in, how
//! overlapping samples are averaged, and that results do not depend on the
//! number of worker threads.

use glam::{Mat4, UVec3, Vec3, Vec4};
use toaster_engine::bake::VoxelBaker;
use toaster_engine::config::{BakeSettings, QualityPreset};
use toaster_engine::grid::texel_index;
use toaster_engine::scene::{Material, SceneMesh};

fn red_cube() -> SceneMesh {
    SceneMesh::cuboid("cube", Vec3::ONE, Material::flat("red", Vec4::new(1.0, 0.0, 0.0, 1.0)))
}

fn flat_triangle(name: &str, color: Vec4) -> SceneMesh {
    SceneMesh::new(
        name,
        vec![
            Vec3::new(-1.0, 0.1, -1.0),
            Vec3::new(1.0, 0.1, -1.0),
            Vec3::new(0.0, 0.1, 1.0),
        ],
        vec![0, 1, 2],
        Material::flat(name, color),
    )
}

fn bake(meshes: &[SceneMesh], workers: usize) -> (UVec3, Vec<Vec4>) {
    let mut baker = VoxelBaker::new(Vec3::ZERO, BakeSettings::default()).with_workers(workers);
    let stats = baker.bake(meshes).unwrap();
    let grid = baker.grid().unwrap();
    (stats.resolution, grid.texels().unwrap().to_vec())
}

// ============================================================================
// Coverage Tests
// ============================================================================

#[test]
fn test_unit_cube_occupies_only_its_voxels() {
    let (res, texels) = bake(&[red_cube()], 4);
    assert_eq!(res, UVec3::new(48, 32, 48));

    let mut occupied = 0;
    for z in 0..res.z {
        for y in 0..res.y {
            for x in 0..res.x {
                let t = texels[texel_index(res, x, y, z)];
                let inside = (22..=25).contains(&x) && (14..=17).contains(&y) && (22..=25).contains(&z);
                if t.w > 0.0 {
                    occupied += 1;
                    assert!(inside, "voxel ({}, {}, {}) should be empty", x, y, z);
                    assert_eq!(t, Vec4::new(1.0, 0.0, 0.0, 1.0));
                }
            }
        }
    }
    // The shell of a 4x4x4 block
    assert_eq!(occupied, 4 * 4 * 4 - 2 * 2 * 2);
}

#[test]
fn test_translated_mesh_moves_voxels() {
    let mut cube = red_cube();
    cube.local_to_world = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
    let (res, texels) = bake(&[cube], 2);
    assert_eq!(texels[texel_index(res, 26, 16, 24)].w, 1.0);
    assert_eq!(texels[texel_index(res, 29, 16, 24)].w, 1.0);
    assert_eq!(texels[texel_index(res, 30, 16, 24)].w, 0.0);
    assert_eq!(texels[texel_index(res, 25, 16, 24)].w, 0.0);
    assert_eq!(texels[texel_index(res, 22, 16, 24)].w, 0.0);
}

#[test]
fn test_fog_surfaces_are_not_baked() {
    let mut cube = red_cube();
    cube.is_fog_surface = true;
    let (_, texels) = bake(&[cube], 2);
    assert!(texels.iter().all(|t| *t == Vec4::ZERO));
}

#[test]
fn test_cube_fills_symmetric_extents() {
    // Faces on voxel boundaries land on the inside at both ends of each axis.
    let (res, texels) = bake(&[red_cube()], 2);
    let occupied = |x: u32, y: u32, z: u32| texels[texel_index(res, x, y, z)].w > 0.0;
    for (inside, outside) in [(22, 21), (25, 26)] {
        assert!(occupied(inside, 16, 24));
        assert!(!occupied(outside, 16, 24));
        assert!(occupied(24, 16, inside));
        assert!(!occupied(24, 16, outside));
    }
    assert!(occupied(24, 14, 24));
    assert!(!occupied(24, 13, 24));
    assert!(occupied(24, 17, 24));
    assert!(!occupied(24, 18, 24));
}

// ============================================================================
// Accumulation Tests
// ============================================================================

#[test]
fn test_overlapping_triangles_average() {
    let red = flat_triangle("red", Vec4::new(1.0, 0.0, 0.0, 1.0));
    let blue = flat_triangle("blue", Vec4::new(0.0, 0.0, 1.0, 1.0));
    let (_, texels) = bake(&[red, blue], 4);

    let hits: Vec<&Vec4> = texels.iter().filter(|t| t.w > 0.0).collect();
    assert!(!hits.is_empty());
    for t in hits {
        assert_eq!(*t, Vec4::new(0.5, 0.0, 0.5, 1.0));
    }
}

#[test]
fn test_emission_adds_to_albedo() {
    let glow = SceneMesh::cuboid(
        "glow",
        Vec3::ONE,
        Material::flat("glow", Vec4::new(0.25, 0.25, 0.25, 1.0)).with_emission(Vec3::new(1.0, 0.0, 0.0)),
    );
    let (res, texels) = bake(&[glow], 2);
    let t = texels[texel_index(res, 22, 16, 24)];
    assert!((t.x - 1.25).abs() < 1e-5);
    assert!((t.y - 0.25).abs() < 1e-5);
}

// ============================================================================
// Determinism Tests
// ============================================================================

#[test]
fn test_bake_is_bit_identical_across_worker_counts() {
    let meshes = [
        red_cube(),
        flat_triangle("red", Vec4::new(0.9, 0.3, 0.1, 1.0)),
        flat_triangle("blue", Vec4::new(0.1, 0.2, 0.7, 1.0)),
    ];
    let (_, single) = bake(&meshes, 1);
    let (_, many) = bake(&meshes, 8);
    assert_eq!(single.len(), many.len());
    for (a, b) in single.iter().zip(&many) {
        assert_eq!(a.to_array().map(f32::to_bits), b.to_array().map(f32::to_bits));
    }
}

#[test]
fn test_quality_preset_overwrites_voxel_size() {
    let settings = BakeSettings {
        quality: Some(QualityPreset::Raw),
        ..Default::default()
    };
    let mut baker = VoxelBaker::new(Vec3::ZERO, settings);
    let stats = baker.bake(&[]).unwrap();
    let longest = stats.resolution.max_element();
    assert_eq!(longest, QualityPreset::Raw.voxels_along_longest_axis());
}
