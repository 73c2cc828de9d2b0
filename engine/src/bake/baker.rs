//! CPU Voxel Baker
//!
//! Software voxelizer with the same stages as the GPU path: clear the
//! accumulation arena, rasterize each submesh's meta scratch, accumulate
//! per-triangle voxel samples from worker threads, then finalize the means.

use std::sync::Arc;
use std::time::Instant;

use glam::{UVec3, Vec3};

use super::accumulation::AccumulationArena;
use super::meta::MetaScratch;
use super::output::BakedVolume;
use super::voxelize::{closest_point_barycentric, for_each_overlapped_voxel};
use crate::config::BakeSettings;
use crate::error::Result;
use crate::grid::{GridExtent, VoxelGrid, texel_index};
use crate::scene::{Material, SceneMesh, SubMesh};

/// Summary of a finished bake.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BakeStats {
    pub resolution: UVec3,
    /// Meshes that passed the filter.
    pub object_count: u32,
    pub triangle_count: u32,
    /// Submeshes skipped because their material lacks a meta pass.
    pub skipped_submeshes: u32,
    /// Voxels that received at least one sample. Only known for host grids.
    pub occupied_voxels: Option<u32>,
}

impl BakeStats {
    pub fn voxel_count(&self) -> u64 {
        self.resolution.x as u64 * self.resolution.y as u64 * self.resolution.z as u64
    }
}

/// One submesh ready for voxelization.
pub(crate) struct BakeItem<'a> {
    pub mesh: &'a SceneMesh,
    pub submesh: &'a SubMesh,
    pub material: &'a Material,
}

/// Resolve the grid extent for a bake, applying the quality preset first.
pub(crate) fn plan_extent(settings: &mut BakeSettings, center: Vec3) -> Result<GridExtent> {
    settings.apply_quality_preset();
    GridExtent::centered(center, settings.bounds_size, settings.voxel_size)
}

/// Collect bakeable submeshes, warning about materials without a meta pass.
/// Returns the items plus `(object_count, skipped_submeshes)`.
pub(crate) fn collect_items<'a>(
    meshes: &'a [SceneMesh],
    settings: &BakeSettings,
) -> (Vec<BakeItem<'a>>, u32, u32) {
    let mut items = Vec::new();
    let mut objects = 0;
    let mut skipped = 0;
    for mesh in meshes.iter().filter(|m| settings.filter.accepts(m)) {
        objects += 1;
        for submesh in &mesh.submeshes {
            let Some(material) = mesh.material_for(submesh) else {
                log::warn!("[VoxelBaker] Mesh '{}' has no materials, skipping submesh", mesh.name);
                skipped += 1;
                continue;
            };
            if !material.has_meta_pass {
                log::warn!(
                    "[VoxelBaker] Material '{}' has no meta pass, skipping",
                    material.name
                );
                skipped += 1;
                continue;
            }
            items.push(BakeItem {
                mesh,
                submesh,
                material,
            });
        }
    }
    (items, objects, skipped)
}

/// Accumulate every voxel sample of one triangle into `arena`.
pub(crate) fn accumulate_triangle(
    arena: &AccumulationArena,
    extent: &GridExtent,
    item: &BakeItem<'_>,
    scratch: &MetaScratch,
    tri: u32,
) {
    let Some(corners) = item.mesh.triangle_indices(item.submesh, tri) else {
        return;
    };
    let Some(world) = item.mesh.world_triangle(item.submesh, tri) else {
        return;
    };
    let layout = item.mesh.layout_uvs();
    for_each_overlapped_voxel(extent, &world, |v| {
        let color = match layout {
            Some(uvs) if scratch.is_rasterized() => {
                let center = extent.voxel_center(v.x, v.y, v.z);
                let w = closest_point_barycentric(center, world[0], world[1], world[2]);
                let uv = uvs[corners[0]] * w.x + uvs[corners[1]] * w.y + uvs[corners[2]] * w.z;
                scratch.sample(uv)
            }
            _ => scratch.flat_color(),
        };
        arena.add(texel_index(extent.resolution, v.x, v.y, v.z), color);
    });
}

/// Software voxel baker producing host-resident albedo/occupancy grids.
pub struct VoxelBaker {
    settings: BakeSettings,
    output: Arc<BakedVolume>,
    workers: usize,
}

impl VoxelBaker {
    /// Baker for the box of `settings.bounds_size` centered on `center`.
    pub fn new(center: Vec3, settings: BakeSettings) -> Self {
        let workers = std::thread::available_parallelism().map_or(4, |n| n.get());
        Self {
            output: BakedVolume::new(center, settings.bounds_size),
            settings,
            workers,
        }
    }

    /// Override the worker thread count (minimum 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn settings(&self) -> &BakeSettings {
        &self.settings
    }

    /// Mutate settings; the bounds size is republished to the output.
    pub fn update_settings(&mut self, f: impl FnOnce(&mut BakeSettings)) {
        f(&mut self.settings);
        self.output.set_bounds_size(self.settings.bounds_size);
    }

    /// Shared output handle for tracers and volumes.
    pub fn output(&self) -> Arc<BakedVolume> {
        Arc::clone(&self.output)
    }

    pub fn set_center(&self, center: Vec3) {
        self.output.set_center(center);
    }

    /// Albedo grid of the last successful bake.
    pub fn grid(&self) -> Option<Arc<VoxelGrid>> {
        self.output.albedo()
    }

    pub fn bake(&mut self, meshes: &[SceneMesh]) -> Result<BakeStats> {
        self.bake_with_progress(meshes, &mut |_| {})
    }

    /// Bake `meshes`, reporting coarse progress in `[0, 1]`.
    pub fn bake_with_progress(
        &mut self,
        meshes: &[SceneMesh],
        progress: &mut dyn FnMut(f32),
    ) -> Result<BakeStats> {
        let started = Instant::now();
        progress(0.0);
        let extent = plan_extent(&mut self.settings, self.output.center())?;
        self.output.set_bounds_size(self.settings.bounds_size);
        let res = extent.resolution;
        log::info!(
            "[VoxelBaker] Baking voxel grid: {}x{}x{} ({} voxels)",
            res.x,
            res.y,
            res.z,
            extent.voxel_count()
        );

        let arena = AccumulationArena::new(extent.voxel_count());
        let (items, object_count, skipped_submeshes) = collect_items(meshes, &self.settings);
        progress(0.1);

        let mut triangle_count = 0;
        for (i, item) in items.iter().enumerate() {
            let scratch = MetaScratch::rasterize(item.mesh, item.submesh, item.material);
            let tris = item.submesh.triangle_count();
            self.accumulate_parallel(&arena, &extent, item, &scratch, tris);
            triangle_count += tris;
            progress(0.1 + 0.8 * (i + 1) as f32 / items.len() as f32);
        }

        let texels = arena.finalize();
        let occupied_voxels = texels.iter().filter(|t| t.w > 0.0).count() as u32;
        let grid = Arc::new(VoxelGrid::from_host(res, texels)?);
        self.output.publish_albedo(extent, grid);
        progress(1.0);

        log::info!(
            "[VoxelBaker] Bake complete! {} objects, {} triangles, {} occupied voxels ({:.1} ms)",
            object_count,
            triangle_count,
            occupied_voxels,
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(BakeStats {
            resolution: res,
            object_count,
            triangle_count,
            skipped_submeshes,
            occupied_voxels: Some(occupied_voxels),
        })
    }

    fn accumulate_parallel(
        &self,
        arena: &AccumulationArena,
        extent: &GridExtent,
        item: &BakeItem<'_>,
        scratch: &MetaScratch,
        tris: u32,
    ) {
        let workers = (self.workers as u32).min(tris.div_ceil(64)).max(1);
        if workers == 1 {
            for tri in 0..tris {
                accumulate_triangle(arena, extent, item, scratch, tri);
            }
            return;
        }
        let chunk = tris.div_ceil(workers);
        std::thread::scope(|s| {
            for w in 0..workers {
                let start = w * chunk;
                let end = (start + chunk).min(tris);
                s.spawn(move || {
                    for tri in start..end {
                        accumulate_triangle(arena, extent, item, scratch, tri);
                    }
                });
            }
        });
    }

    /// Drop the baked grid (and any lighting traced from it).
    pub fn release(&mut self) {
        self.output.clear();
    }
}
