//! GPU Light Tracer
//!
//! Runs the direct, surface and volumetric kernels of `shaders/tracer.wgsl`
//! back to back on one encoder. The shader draws its random numbers from a
//! PCG hash of the seed and voxel index, so a GPU trace matches the CPU
//! trace in expectation only.

use std::sync::Arc;
use std::time::Instant;

use static_assertions::assert_eq_size;

use super::lights::pack_trace_lights;
use super::tracer::{TraceStats, source_grid};
use crate::bake::BakedVolume;
use crate::config::TraceSettings;
use crate::error::{Result, ToasterError};
use crate::gpu::compute::{storage_entry, uniform_entry};
use crate::gpu::shader_loader::{create_shader_module, embedded};
use crate::gpu::{ComputeStage, GpuContext, linear_dispatch};
use crate::grid::{GridExtent, VoxelGrid};
use crate::scene::Light;

const WORKGROUP_SIZE: u32 = 64;

/// Uniforms shared by the tracer kernels. Matches `TraceParams` in
/// tracer.wgsl.
///
/// Layout (64 bytes):
/// - grid_min: vec3<f32> + voxel_size: f32                          (16 bytes)
/// - grid_res: vec3<u32> + light_count: u32                         (16 bytes)
/// - rays_per_voxel, max_bounces, light_falloff, voxel_count        (16 bytes)
/// - seed_lo, seed_hi, max_distance, _pad                           (16 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuTraceParams {
    pub grid_min: [f32; 3],
    pub voxel_size: f32,
    pub grid_res: [u32; 3],
    pub light_count: u32,
    pub rays_per_voxel: u32,
    pub max_bounces: u32,
    pub light_falloff: f32,
    pub voxel_count: u32,
    pub seed_lo: u32,
    pub seed_hi: u32,
    pub max_distance: f32,
    pub _pad: u32,
}

assert_eq_size!(GpuTraceParams, [u8; 64]);

impl GpuTraceParams {
    pub fn new(extent: &GridExtent, settings: &TraceSettings, light_count: u32, seed: u64) -> Self {
        Self {
            grid_min: extent.min.to_array(),
            voxel_size: extent.voxel_size,
            grid_res: extent.resolution.to_array(),
            light_count,
            rays_per_voxel: settings.rays_per_voxel,
            max_bounces: settings.max_bounces,
            light_falloff: settings.light_falloff,
            voxel_count: extent.voxel_count() as u32,
            seed_lo: seed as u32,
            seed_hi: (seed >> 32) as u32,
            max_distance: extent.resolution.as_vec3().length() * extent.voxel_size,
            _pad: 0,
        }
    }
}

struct TracerStages {
    direct: ComputeStage,
    surface: ComputeStage,
    volumetric: ComputeStage,
}

impl TracerStages {
    fn new(device: &wgpu::Device, source: &str) -> Self {
        let module = create_shader_module(device, "tracer_shader", source);
        let entries = [
            uniform_entry(0),
            storage_entry(1, true),
            storage_entry(2, true),
            storage_entry(3, false),
            storage_entry(4, false),
            storage_entry(5, false),
        ];
        Self {
            direct: ComputeStage::new(device, "trace_direct", &module, "direct", &entries),
            surface: ComputeStage::new(device, "trace_surface", &module, "surface", &entries),
            volumetric: ComputeStage::new(device, "trace_volumetric", &module, "volumetric", &entries),
        }
    }
}

/// Hardware light tracer bound to one baked region.
pub struct GpuLightTracer {
    ctx: Arc<GpuContext>,
    stages: Option<TracerStages>,
    settings: TraceSettings,
    source: Arc<BakedVolume>,
}

impl GpuLightTracer {
    pub fn new(ctx: Arc<GpuContext>, source: Arc<BakedVolume>, settings: TraceSettings) -> Self {
        Self::with_shader(ctx, source, settings, embedded::TRACER)
    }

    pub fn with_shader(
        ctx: Arc<GpuContext>,
        source: Arc<BakedVolume>,
        settings: TraceSettings,
        shader: &str,
    ) -> Self {
        let stages = TracerStages::new(&ctx.device, shader);
        Self {
            ctx,
            stages: Some(stages),
            settings,
            source,
        }
    }

    pub fn settings(&self) -> &TraceSettings {
        &self.settings
    }

    pub fn update_settings(&mut self, f: impl FnOnce(&mut TraceSettings)) {
        f(&mut self.settings);
    }

    pub fn source(&self) -> &Arc<BakedVolume> {
        &self.source
    }

    pub fn lighting(&self) -> Option<Arc<VoxelGrid>> {
        self.source.lighting()
    }

    pub fn trace(&mut self, lights: &[Light]) -> Result<TraceStats> {
        self.trace_with_progress(lights, &mut |_| {})
    }

    pub fn trace_with_progress(
        &mut self,
        lights: &[Light],
        progress: &mut dyn FnMut(f32),
    ) -> Result<TraceStats> {
        let Some(stages) = self.stages.as_ref() else {
            log::warn!("[LightTracer] No tracer pipeline, trace aborted");
            return Err(ToasterError::MissingResource("tracer pipeline"));
        };
        let (extent, albedo) = source_grid(&self.source)?;
        let started = Instant::now();
        let settings = self.settings.sanitized();
        let seed = settings.seed.unwrap_or_else(rand::random);
        let res = extent.resolution;
        progress(0.0);
        log::info!(
            "[LightTracer] Tracing lighting on GPU: {}x{}x{}, {} rays/voxel, {} bounces",
            res.x,
            res.y,
            res.z,
            settings.rays_per_voxel,
            settings.max_bounces
        );

        let ctx = &self.ctx;
        let packed = pack_trace_lights(lights);
        let params = GpuTraceParams::new(&extent, &settings, packed.count, seed);
        let voxel_count = params.voxel_count;
        let grid_bytes = voxel_count as u64 * 16;

        let params_buffer = ctx.create_uniform_buffer("trace_params", &params);
        let albedo_buffer = ctx.grid_buffer("trace_albedo", &albedo);
        let light_buffer = ctx.create_storage_buffer("trace_lights", &packed.lights);
        let direct = ctx.create_zeroed_storage_buffer("trace_direct_grid", grid_bytes);
        let surface = ctx.create_zeroed_storage_buffer("trace_surface_grid", grid_bytes);
        let lighting = ctx.create_zeroed_storage_buffer("trace_lighting_grid", grid_bytes);
        progress(0.1);

        let bind = |stage: &ComputeStage, label: &str| {
            stage.bind(
                &ctx.device,
                label,
                &[
                    (0, params_buffer.as_entire_binding()),
                    (1, albedo_buffer.as_entire_binding()),
                    (2, light_buffer.as_entire_binding()),
                    (3, direct.as_entire_binding()),
                    (4, surface.as_entire_binding()),
                    (5, lighting.as_entire_binding()),
                ],
            )
        };
        let workgroups = linear_dispatch(voxel_count, WORKGROUP_SIZE);
        log::debug!("[LightTracer] Dispatching {:?} workgroups per stage", workgroups);

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("light_trace_encoder"),
        });
        let group = bind(&stages.direct, "trace_direct_bind_group");
        stages.direct.dispatch(&mut encoder, "trace_direct", &group, workgroups);
        progress(0.3);

        let group = bind(&stages.surface, "trace_surface_bind_group");
        stages.surface.dispatch(&mut encoder, "trace_surface", &group, workgroups);
        progress(0.6);

        // Authoritative: overwrites solids with opaque black.
        let group = bind(&stages.volumetric, "trace_volumetric_bind_group");
        stages.volumetric.dispatch(&mut encoder, "trace_volumetric", &group, workgroups);
        ctx.queue.submit(Some(encoder.finish()));
        progress(0.9);

        self.source.publish_lighting(
            Arc::new(VoxelGrid::from_device(res, lighting)),
            Arc::new(VoxelGrid::from_device(res, surface)),
        );
        progress(1.0);

        log::info!(
            "[LightTracer] GPU trace submitted: {} lights, seed {:#x} ({:.1} ms)",
            packed.count,
            seed,
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(TraceStats {
            resolution: res,
            light_count: packed.count,
            dummy_light: packed.is_dummy(),
            seed,
            rays_cast: None,
        })
    }

    /// Drop pipelines and traced lighting. Later traces fail with a
    /// missing-resource error.
    pub fn release(&mut self) {
        self.stages = None;
        self.source.clear_lighting();
    }
}
