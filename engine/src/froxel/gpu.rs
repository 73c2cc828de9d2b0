//! GPU Froxel Renderer
//!
//! Records the clear, inject and integrate kernels of `shaders/froxel.wgsl`
//! and the fullscreen composite of `shaders/froxel_composite.wgsl` into the
//! host's command encoder. Volume grids are packed into one atlas buffer that
//! is rebuilt only when the set of grids changes.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut fog = GpuFroxelRenderer::new(ctx.clone(), FroxelSettings::default(), surface_format)?;
//!
//! // Each frame
//! let targets = GpuFrameTargets {
//!     scene_color: &scene_color_view,
//!     scene_depth: &depth_view,
//!     output: &output_view,
//! };
//! let outcome = fog.render(&mut encoder, &camera, &registry, &lights, &targets);
//! queue.submit(Some(encoder.finish()));
//! ```

use std::sync::Arc;

use glam::UVec3;

use super::buffers::{
    FrameInputs, FroxelLight, FroxelParams, FroxelVolume, MAX_FROXEL_VOLUMES,
    collect_froxel_lights, pack_volumes, volumes_within_budget,
};
use super::renderer::{FrameOutcome, FrameState, SkipReason, no_volumes, validate_resolution};
use crate::config::{FroxelSettings, MAX_FROXEL_LIGHTS};
use crate::error::Result;
use crate::gpu::compute::{storage_entry, texture_2d_entry, uniform_entry};
use crate::gpu::shader_loader::{create_shader_module, embedded};
use crate::gpu::{ComputeStage, GpuContext, linear_dispatch, workgroup_count};
use crate::grid::GridStorage;
use crate::jitter::JitterTexture;
use crate::scene::{CameraView, Light};
use crate::volume::{ResolvedVolume, VolumeRegistry};

const CLEAR_WORKGROUP_SIZE: u32 = 64;
const TILE_SIZE: u32 = 8;
const TEXEL_BYTES: u64 = 16;

/// Views the composite reads from and writes to. `output` must not alias
/// `scene_color`.
pub struct GpuFrameTargets<'a> {
    pub scene_color: &'a wgpu::TextureView,
    pub scene_depth: &'a wgpu::TextureView,
    pub output: &'a wgpu::TextureView,
}

struct FroxelStages {
    clear: ComputeStage,
    inject: ComputeStage,
    integrate: ComputeStage,
}

impl FroxelStages {
    fn new(device: &wgpu::Device, source: &str) -> Self {
        let module = create_shader_module(device, "froxel_shader", source);
        let entries = [
            uniform_entry(0),
            storage_entry(1, true),
            storage_entry(2, true),
            storage_entry(3, true),
            storage_entry(4, false),
            storage_entry(5, true),
            storage_entry(6, false),
            texture_2d_entry(7),
        ];
        Self {
            clear: ComputeStage::new(device, "froxel_clear", &module, "clear", &entries),
            inject: ComputeStage::new(device, "froxel_inject", &module, "inject", &entries),
            integrate: ComputeStage::new(device, "froxel_integrate", &module, "integrate", &entries),
        }
    }
}

fn fragment_entry(binding: u32, ty: wgpu::BindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty,
        count: None,
    }
}

fn fragment_storage(binding: u32) -> wgpu::BindGroupLayoutEntry {
    fragment_entry(
        binding,
        wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
    )
}

/// Fullscreen composite pipeline.
struct CompositePass {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl CompositePass {
    fn new(device: &wgpu::Device, source: &str, output_format: wgpu::TextureFormat) -> Self {
        let shader = create_shader_module(device, "froxel_composite_shader", source);

        // Binding 0: FroxelParams uniform
        // Binding 1: integrated froxels
        // Binding 2: scattering froxels (debug views)
        // Binding 3: scene color
        // Binding 4: scene depth
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("froxel_composite_bind_group_layout"),
            entries: &[
                fragment_entry(
                    0,
                    wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                ),
                fragment_storage(1),
                fragment_storage(2),
                fragment_entry(
                    3,
                    wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                ),
                fragment_entry(
                    4,
                    wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                ),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("froxel_composite_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("froxel_composite"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: output_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            bind_group_layout,
        }
    }
}

/// Froxel buffers plus the fixed-size per-frame inputs.
struct FroxelTargets {
    resolution: UVec3,
    params: wgpu::Buffer,
    volumes: wgpu::Buffer,
    lights: wgpu::Buffer,
    scattering: wgpu::Buffer,
    history: wgpu::Buffer,
    integrated: wgpu::Buffer,
}

impl FroxelTargets {
    fn new(ctx: &GpuContext, resolution: UVec3) -> Self {
        let bytes = resolution.x as u64 * resolution.y as u64 * resolution.z as u64 * TEXEL_BYTES;
        Self {
            resolution,
            params: ctx.create_uniform_buffer("froxel_params", &<FroxelParams as bytemuck::Zeroable>::zeroed()),
            volumes: ctx.create_storage_buffer("froxel_volumes", &[FroxelVolume::default(); MAX_FROXEL_VOLUMES]),
            lights: ctx.create_storage_buffer(
                "froxel_lights",
                &[FroxelLight::default(); MAX_FROXEL_LIGHTS as usize],
            ),
            scattering: ctx.create_zeroed_storage_buffer("froxel_scattering", bytes),
            history: ctx.create_zeroed_storage_buffer("froxel_history", bytes),
            integrated: ctx.create_zeroed_storage_buffer("froxel_integrated", bytes),
        }
    }
}

/// Packed volume grids, keyed by the grid ids they were built from.
struct VolumeAtlas {
    grid_ids: Vec<u64>,
    buffer: wgpu::Buffer,
}

struct JitterBinding {
    size: Option<[u32; 2]>,
    view: wgpu::TextureView,
}

impl JitterBinding {
    fn upload(ctx: &GpuContext, width: u32, height: u32, texels: &[u8], active: bool) -> Self {
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("froxel_jitter"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            texels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width),
                rows_per_image: Some(height),
            },
            extent,
        );
        Self {
            size: active.then_some([width, height]),
            view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
        }
    }
}

/// Hardware froxel fog renderer.
pub struct GpuFroxelRenderer {
    ctx: Arc<GpuContext>,
    settings: FroxelSettings,
    stages: Option<FroxelStages>,
    composite: Option<CompositePass>,
    targets: Option<FroxelTargets>,
    atlas: Option<VolumeAtlas>,
    jitter: JitterBinding,
    state: FrameState,
    temporal_active: bool,
    /// Volumes left out of the last frame's atlas.
    over_budget: usize,
}

impl GpuFroxelRenderer {
    pub fn new(ctx: Arc<GpuContext>, settings: FroxelSettings, output_format: wgpu::TextureFormat) -> Result<Self> {
        Self::with_shaders(
            ctx,
            settings,
            output_format,
            embedded::FROXEL,
            embedded::FROXEL_COMPOSITE,
        )
    }

    pub fn with_shaders(
        ctx: Arc<GpuContext>,
        settings: FroxelSettings,
        output_format: wgpu::TextureFormat,
        froxel_shader: &str,
        composite_shader: &str,
    ) -> Result<Self> {
        let settings = settings.sanitized();
        validate_resolution(&settings)?;
        let stages = FroxelStages::new(&ctx.device, froxel_shader);
        let composite = CompositePass::new(&ctx.device, composite_shader, output_format);
        let targets = FroxelTargets::new(&ctx, settings.resolution);
        let jitter = JitterBinding::upload(&ctx, 1, 1, &[128], false);
        log::info!(
            "[FroxelRenderer] GPU froxels {}x{}x{} ({:?} output)",
            settings.resolution.x,
            settings.resolution.y,
            settings.resolution.z,
            output_format
        );
        Ok(Self {
            ctx,
            settings,
            stages: Some(stages),
            composite: Some(composite),
            targets: Some(targets),
            atlas: None,
            jitter,
            state: FrameState::default(),
            temporal_active: false,
            over_budget: 0,
        })
    }

    pub fn settings(&self) -> &FroxelSettings {
        &self.settings
    }

    /// Replace the settings; froxel buffers are reallocated only when the
    /// resolution changes.
    pub fn set_settings(&mut self, settings: FroxelSettings) -> Result<()> {
        let settings = settings.sanitized();
        validate_resolution(&settings)?;
        let resized = self
            .targets
            .as_ref()
            .is_none_or(|t| t.resolution != settings.resolution);
        if resized {
            log::info!(
                "[FroxelRenderer] Reallocating GPU froxels at {}x{}x{}",
                settings.resolution.x,
                settings.resolution.y,
                settings.resolution.z
            );
            self.targets = Some(FroxelTargets::new(&self.ctx, settings.resolution));
            self.state.reset_history();
            self.temporal_active = false;
        }
        self.settings = settings;
        Ok(())
    }

    pub fn set_jitter(&mut self, jitter: Option<&JitterTexture>) {
        self.jitter = match jitter {
            Some(tex) => JitterBinding::upload(&self.ctx, tex.width(), tex.height(), tex.as_bytes(), true),
            None => JitterBinding::upload(&self.ctx, 1, 1, &[128], false),
        };
    }

    pub fn frame_index(&self) -> u32 {
        self.state.frame_index()
    }

    /// Integrated radiance/transmittance buffer, while allocated.
    pub fn integrated_buffer(&self) -> Option<&wgpu::Buffer> {
        self.targets.as_ref().map(|t| &t.integrated)
    }

    /// Largest atlas the device can bind as one storage buffer.
    fn atlas_limit(&self) -> u64 {
        let limits = self.ctx.device.limits();
        (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size)
    }

    /// Reuse the atlas when the grids are unchanged, else rebuild it.
    fn atlas_for(&mut self, encoder: &mut wgpu::CommandEncoder, volumes: &[ResolvedVolume], texels: u64) -> wgpu::Buffer {
        let ids: Vec<u64> = volumes.iter().map(|v| v.grid.id()).collect();
        if let Some(atlas) = self.atlas.as_ref().filter(|a| a.grid_ids == ids) {
            return atlas.buffer.clone();
        }
        log::debug!("[FroxelRenderer] Rebuilding volume atlas ({} texels)", texels);
        let buffer = self.ctx.create_zeroed_storage_buffer("froxel_volume_atlas", texels * TEXEL_BYTES);
        let mut offset = 0u64;
        for v in volumes {
            let size = v.grid.byte_size();
            match v.grid.storage() {
                GridStorage::Device(src) => encoder.copy_buffer_to_buffer(src, 0, &buffer, offset, size),
                GridStorage::Host(data) => self.ctx.queue.write_buffer(&buffer, offset, bytemuck::cast_slice(data)),
            }
            offset += size;
        }
        self.atlas = Some(VolumeAtlas {
            grid_ids: ids,
            buffer: buffer.clone(),
        });
        buffer
    }

    /// Record the froxel pass for one frame. Skipped frames record nothing.
    pub fn render(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        camera: &CameraView,
        registry: &VolumeRegistry,
        lights: &[Light],
        frame: &GpuFrameTargets<'_>,
    ) -> FrameOutcome {
        if !camera.kind.receives_fog() {
            return self.state.skip(SkipReason::Camera(camera.kind));
        }
        if self.stages.is_none() || self.composite.is_none() {
            return self.state.skip(SkipReason::MissingResource("froxel pipelines"));
        }
        if self.targets.is_none() {
            return self.state.skip(SkipReason::MissingResource("froxel buffers"));
        }

        let snap = registry.snapshot(MAX_FROXEL_VOLUMES);
        if snap.is_empty() {
            return self.state.skip(no_volumes(&snap, 0));
        }
        let limit = self.atlas_limit();
        let fit = volumes_within_budget(&snap.volumes, limit);
        if fit == 0 {
            return self.state.skip(SkipReason::AtlasBudget {
                required: snap.volumes.first().map_or(0, |v| v.grid.byte_size()),
                limit,
            });
        }
        let dropped = snap.volumes.len() - fit;
        if dropped != self.over_budget {
            if dropped > 0 {
                log::warn!(
                    "[FroxelRenderer] {} volume(s) exceed the {} byte atlas limit and are not rendered",
                    dropped,
                    limit
                );
            }
            self.over_budget = dropped;
        }
        let volumes = &snap.volumes[..fit];
        self.state.note_volumes(volumes.len());

        let (packed, texels) = pack_volumes(volumes);
        let atlas = self.atlas_for(encoder, volumes, texels);
        let froxel_lights = collect_froxel_lights(lights, self.settings.max_lights);

        let (Some(stages), Some(composite), Some(targets)) =
            (self.stages.as_ref(), self.composite.as_ref(), self.targets.as_mut())
        else {
            return self.state.skip(SkipReason::MissingResource("froxel pipelines"));
        };
        let ctx = &self.ctx;
        let settings = &self.settings;

        if settings.enable_temporal && !self.temporal_active {
            encoder.clear_buffer(&targets.history, 0, None);
        }
        self.temporal_active = settings.enable_temporal;

        let view_proj = camera.view_proj();
        let params = FroxelParams::new(
            settings,
            camera,
            FrameInputs {
                prev_view_proj: self.state.prev_view_proj(view_proj),
                frame_index: self.state.frame_index(),
                volume_count: packed.len() as u32,
                light_count: froxel_lights.len() as u32,
                jitter_size: self.jitter.size,
            },
        );
        ctx.queue.write_buffer(&targets.params, 0, bytemuck::bytes_of(&params));
        ctx.queue.write_buffer(&targets.volumes, 0, bytemuck::cast_slice(&packed));
        if !froxel_lights.is_empty() {
            ctx.queue.write_buffer(&targets.lights, 0, bytemuck::cast_slice(&froxel_lights));
        }

        let group = stages.clear.bind(
            &ctx.device,
            "froxel_bind_group",
            &[
                (0, targets.params.as_entire_binding()),
                (1, targets.volumes.as_entire_binding()),
                (2, atlas.as_entire_binding()),
                (3, targets.lights.as_entire_binding()),
                (4, targets.scattering.as_entire_binding()),
                (5, targets.history.as_entire_binding()),
                (6, targets.integrated.as_entire_binding()),
                (7, wgpu::BindingResource::TextureView(&self.jitter.view)),
            ],
        );

        let res = targets.resolution;
        let froxels = res.x * res.y * res.z;
        let tiles = [workgroup_count(res.x, TILE_SIZE), workgroup_count(res.y, TILE_SIZE)];
        log::debug!(
            "[FroxelRenderer] Dispatching {} froxels, {} volume(s), {} light(s)",
            froxels,
            packed.len(),
            froxel_lights.len()
        );
        stages.clear.dispatch(
            encoder,
            "froxel_clear",
            &group,
            linear_dispatch(froxels, CLEAR_WORKGROUP_SIZE),
        );
        stages.inject.dispatch(encoder, "froxel_inject", &group, [tiles[0], tiles[1], res.z]);
        stages.integrate.dispatch(encoder, "froxel_integrate", &group, [tiles[0], tiles[1], 1]);

        let composite_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("froxel_composite_bind_group"),
            layout: &composite.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: targets.params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: targets.integrated.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: targets.scattering.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(frame.scene_color),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(frame.scene_depth),
                },
            ],
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("froxel_composite"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: frame.output,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&composite.pipeline);
            pass.set_bind_group(0, &composite_group, &[]);
            pass.draw(0..3, 0..1);
        }

        if settings.enable_temporal {
            std::mem::swap(&mut targets.scattering, &mut targets.history);
        }
        self.state.advance(view_proj, packed.len(), froxel_lights.len())
    }

    /// Drop pipelines, froxel buffers and the atlas. Later frames are skipped.
    pub fn release(&mut self) {
        self.stages = None;
        self.composite = None;
        self.targets = None;
        self.atlas = None;
        self.state.reset_history();
        self.temporal_active = false;
    }
}
