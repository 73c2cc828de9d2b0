//! GPU Voxel Baker
//!
//! Dispatches `shaders/voxelize.wgsl`: one clear pass over the accumulation
//! arena, one accumulate pass per bakeable submesh (one thread per triangle),
//! then a finalize pass writing the albedo grid. Everything is recorded on a
//! single encoder and submitted once, so stages run strictly in order.

use std::sync::Arc;
use std::time::Instant;

use glam::{Vec2, Vec3, Vec4};
use static_assertions::assert_eq_size;

use super::baker::{BakeItem, BakeStats, collect_items, plan_extent};
use super::meta::MetaScratch;
use super::output::BakedVolume;
use crate::config::BakeSettings;
use crate::error::{Result, ToasterError};
use crate::gpu::compute::{storage_entry, uniform_entry};
use crate::gpu::shader_loader::{create_shader_module, embedded};
use crate::gpu::{ComputeStage, GpuContext, linear_dispatch};
use crate::grid::{GridExtent, VoxelGrid};
use crate::scene::SceneMesh;

const WORKGROUP_SIZE: u32 = 64;

/// Uniforms for every voxelize kernel. Matches `VoxelizeParams` in
/// voxelize.wgsl.
///
/// Layout (128 bytes):
/// - local_to_world: mat4x4<f32>                          (64 bytes)
/// - grid_min: vec3<f32> + voxel_size: f32                (16 bytes)
/// - grid_res: vec3<u32> + index_offset: u32              (16 bytes)
/// - triangle_count, has_layout_uv, meta_rasterized, voxel_count (16 bytes)
/// - flat_color: vec3<f32> + _pad: f32                    (16 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuVoxelizeParams {
    pub local_to_world: [[f32; 4]; 4],
    pub grid_min: [f32; 3],
    pub voxel_size: f32,
    pub grid_res: [u32; 3],
    pub index_offset: u32,
    pub triangle_count: u32,
    pub has_layout_uv: u32,
    pub meta_rasterized: u32,
    pub voxel_count: u32,
    pub flat_color: [f32; 3],
    pub _pad: f32,
}

assert_eq_size!(GpuVoxelizeParams, [u8; 128]);

impl GpuVoxelizeParams {
    /// Params for the grid-wide clear and finalize passes.
    fn for_grid(extent: &GridExtent) -> Self {
        Self {
            local_to_world: glam::Mat4::IDENTITY.to_cols_array_2d(),
            grid_min: extent.min.to_array(),
            voxel_size: extent.voxel_size,
            grid_res: extent.resolution.to_array(),
            index_offset: 0,
            triangle_count: 0,
            has_layout_uv: 0,
            meta_rasterized: 0,
            voxel_count: extent.voxel_count() as u32,
            flat_color: [0.0; 3],
            _pad: 0.0,
        }
    }

    fn for_item(extent: &GridExtent, item: &BakeItem<'_>, scratch: &MetaScratch) -> Self {
        Self {
            local_to_world: item.mesh.local_to_world.to_cols_array_2d(),
            index_offset: item.submesh.index_start,
            triangle_count: item.submesh.triangle_count(),
            has_layout_uv: item.mesh.layout_uvs().is_some() as u32,
            meta_rasterized: scratch.is_rasterized() as u32,
            flat_color: scratch.flat_color().to_array(),
            ..Self::for_grid(extent)
        }
    }
}

/// Clear, accumulate and finalize pipelines.
struct VoxelizerStages {
    clear: ComputeStage,
    accumulate: ComputeStage,
    finalize: ComputeStage,
}

impl VoxelizerStages {
    fn new(device: &wgpu::Device, source: &str) -> Self {
        let module = create_shader_module(device, "voxelize_shader", source);
        let entries = [
            uniform_entry(0),
            storage_entry(1, true),
            storage_entry(2, true),
            storage_entry(3, true),
            storage_entry(4, true),
            storage_entry(5, false),
            storage_entry(6, false),
        ];
        Self {
            clear: ComputeStage::new(device, "voxelize_clear", &module, "clear", &entries),
            accumulate: ComputeStage::new(
                device,
                "voxelize_accumulate",
                &module,
                "accumulate",
                &entries,
            ),
            finalize: ComputeStage::new(device, "voxelize_finalize", &module, "finalize", &entries),
        }
    }
}

/// Buffers for one submesh's accumulate dispatch.
struct ItemBuffers {
    params: wgpu::Buffer,
    positions: wgpu::Buffer,
    layout_uvs: wgpu::Buffer,
    indices: wgpu::Buffer,
    meta: wgpu::Buffer,
}

/// Hardware voxel baker producing a device-resident albedo grid.
pub struct GpuVoxelBaker {
    ctx: Arc<GpuContext>,
    stages: Option<VoxelizerStages>,
    settings: BakeSettings,
    output: Arc<BakedVolume>,
}

impl GpuVoxelBaker {
    pub fn new(ctx: Arc<GpuContext>, center: Vec3, settings: BakeSettings) -> Self {
        Self::with_shader(ctx, center, settings, embedded::VOXELIZE)
    }

    /// Build the pipelines from caller-supplied WGSL.
    pub fn with_shader(
        ctx: Arc<GpuContext>,
        center: Vec3,
        settings: BakeSettings,
        source: &str,
    ) -> Self {
        let stages = VoxelizerStages::new(&ctx.device, source);
        Self {
            ctx,
            stages: Some(stages),
            output: BakedVolume::new(center, settings.bounds_size),
            settings,
        }
    }

    pub fn settings(&self) -> &BakeSettings {
        &self.settings
    }

    pub fn update_settings(&mut self, f: impl FnOnce(&mut BakeSettings)) {
        f(&mut self.settings);
        self.output.set_bounds_size(self.settings.bounds_size);
    }

    pub fn output(&self) -> Arc<BakedVolume> {
        Arc::clone(&self.output)
    }

    pub fn set_center(&self, center: Vec3) {
        self.output.set_center(center);
    }

    pub fn grid(&self) -> Option<Arc<VoxelGrid>> {
        self.output.albedo()
    }

    pub fn bake(&mut self, meshes: &[SceneMesh]) -> Result<BakeStats> {
        self.bake_with_progress(meshes, &mut |_| {})
    }

    pub fn bake_with_progress(
        &mut self,
        meshes: &[SceneMesh],
        progress: &mut dyn FnMut(f32),
    ) -> Result<BakeStats> {
        let Some(stages) = self.stages.as_ref() else {
            log::warn!("[VoxelBaker] Voxelizer pipeline missing, bake aborted");
            return Err(ToasterError::MissingResource("voxelizer pipeline"));
        };
        let started = Instant::now();
        progress(0.0);

        let extent = plan_extent(&mut self.settings, self.output.center())?;
        self.output.set_bounds_size(self.settings.bounds_size);
        let res = extent.resolution;
        let voxel_count = extent.voxel_count() as u32;
        log::info!(
            "[VoxelBaker] Baking voxel grid on GPU: {}x{}x{} ({} voxels)",
            res.x,
            res.y,
            res.z,
            voxel_count
        );

        let ctx = &self.ctx;
        let device = &ctx.device;
        let accum = ctx.create_zeroed_storage_buffer("voxel_accumulation", voxel_count as u64 * 16);
        let grid = ctx.create_zeroed_storage_buffer("voxel_albedo_grid", voxel_count as u64 * 16);

        // Clear and finalize touch only params, accum and grid.
        let grid_params =
            ctx.create_uniform_buffer("voxelize_grid_params", &GpuVoxelizeParams::for_grid(&extent));
        let dummy = ctx.create_zeroed_storage_buffer("voxelize_dummy", 16);
        let grid_bindings = |stage: &ComputeStage, label: &str| {
            stage.bind(
                device,
                label,
                &[
                    (0, grid_params.as_entire_binding()),
                    (1, dummy.as_entire_binding()),
                    (2, dummy.as_entire_binding()),
                    (3, dummy.as_entire_binding()),
                    (4, dummy.as_entire_binding()),
                    (5, accum.as_entire_binding()),
                    (6, grid.as_entire_binding()),
                ],
            )
        };

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("voxel_bake_encoder"),
        });

        let clear_group = grid_bindings(&stages.clear, "voxelize_clear_bind_group");
        stages.clear.dispatch(
            &mut encoder,
            "voxelize_clear",
            &clear_group,
            linear_dispatch(voxel_count, WORKGROUP_SIZE),
        );

        let (items, object_count, skipped_submeshes) = collect_items(meshes, &self.settings);
        progress(0.1);

        let mut triangle_count = 0;
        for (i, item) in items.iter().enumerate() {
            let scratch = MetaScratch::rasterize(item.mesh, item.submesh, item.material);
            let tris = item.submesh.triangle_count();
            let buffers = upload_item(ctx, &extent, item, &scratch);
            let group = stages.accumulate.bind(
                device,
                "voxelize_accumulate_bind_group",
                &[
                    (0, buffers.params.as_entire_binding()),
                    (1, buffers.positions.as_entire_binding()),
                    (2, buffers.layout_uvs.as_entire_binding()),
                    (3, buffers.indices.as_entire_binding()),
                    (4, buffers.meta.as_entire_binding()),
                    (5, accum.as_entire_binding()),
                    (6, grid.as_entire_binding()),
                ],
            );
            log::debug!(
                "[VoxelBaker] Accumulating '{}' ({} triangles)",
                item.mesh.name,
                tris
            );
            stages.accumulate.dispatch(
                &mut encoder,
                "voxelize_accumulate",
                &group,
                linear_dispatch(tris, WORKGROUP_SIZE),
            );
            triangle_count += tris;
            progress(0.1 + 0.8 * (i + 1) as f32 / items.len() as f32);
        }

        let finalize_group = grid_bindings(&stages.finalize, "voxelize_finalize_bind_group");
        stages.finalize.dispatch(
            &mut encoder,
            "voxelize_finalize",
            &finalize_group,
            linear_dispatch(voxel_count, WORKGROUP_SIZE),
        );
        ctx.queue.submit(Some(encoder.finish()));

        self.output
            .publish_albedo(extent, Arc::new(VoxelGrid::from_device(res, grid)));
        progress(1.0);

        log::info!(
            "[VoxelBaker] GPU bake submitted: {} objects, {} triangles ({:.1} ms)",
            object_count,
            triangle_count,
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(BakeStats {
            resolution: res,
            object_count,
            triangle_count,
            skipped_submeshes,
            occupied_voxels: None,
        })
    }

    /// Drop pipelines and grids. Later bakes fail with a missing-resource error.
    pub fn release(&mut self) {
        self.stages = None;
        self.output.clear();
    }
}

fn upload_item(
    ctx: &GpuContext,
    extent: &GridExtent,
    item: &BakeItem<'_>,
    scratch: &MetaScratch,
) -> ItemBuffers {
    let mesh = item.mesh;
    let positions: Vec<Vec4> = mesh.positions.iter().map(|p| p.extend(1.0)).collect();
    let layout_uvs: &[Vec2] = mesh.layout_uvs().unwrap_or(&[]);
    let params = GpuVoxelizeParams::for_item(extent, item, scratch);
    ItemBuffers {
        params: ctx.create_uniform_buffer("voxelize_params", &params),
        positions: ctx.create_storage_buffer("voxelize_positions", &positions),
        layout_uvs: ctx.create_storage_buffer("voxelize_layout_uvs", layout_uvs),
        indices: ctx.create_storage_buffer("voxelize_indices", &mesh.indices),
        meta: ctx.create_storage_buffer("voxelize_meta", scratch.texels()),
    }
}
