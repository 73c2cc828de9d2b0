//! Froxel Renderer
//!
//! Per-frame volumetric fog on the CPU: snapshot volumes and lights, clear
//! and inject the scattering buffer, integrate each column front to back,
//! composite into the frame, then advance the temporal state. The GPU
//! renderer runs the same sequence with compute kernels and shares the
//! frame bookkeeping defined here.

use glam::{Mat4, UVec3, Vec4};

use super::buffers::{
    FrameInputs, FroxelParams, MAX_FROXEL_VOLUMES, collect_froxel_lights, pack_volumes,
};
use super::composite::{Compositor, FrameTarget};
use super::inject::{InjectVolume, Injector};
use super::integrate::integrate_column;
use crate::config::FroxelSettings;
use crate::error::{Result, ToasterError};
use crate::grid::texel_index;
use crate::jitter::JitterTexture;
use crate::parallel::{default_workers, fill_parallel};
use crate::scene::{CameraKind, CameraView, Light};
use crate::volume::{VolumeRegistry, VolumeSnapshot};

/// Why a frame left the scene color untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Preview and reflection cameras never receive fog.
    Camera(CameraKind),
    /// A buffer or pipeline was released.
    MissingResource(&'static str),
    /// No registered volume had bounds and a grid.
    NoVolumes {
        total: usize,
        missing_source: usize,
        missing_grid: usize,
    },
    /// The first volume grid alone exceeds the device's storage buffer limit.
    AtlasBudget { required: u64, limit: u64 },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Camera(kind) => write!(f, "{:?} cameras receive no fog", kind),
            SkipReason::MissingResource(what) => write!(f, "missing {}", what),
            SkipReason::NoVolumes {
                total,
                missing_source,
                missing_grid,
            } => write!(
                f,
                "{} volume(s) found but 0 have valid grids ({} missing baker, {} missing grid)",
                total, missing_source, missing_grid
            ),
            SkipReason::AtlasBudget { required, limit } => write!(
                f,
                "volume grid needs {} bytes but storage buffers are limited to {}",
                required, limit
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameStats {
    pub volume_count: usize,
    pub light_count: usize,
    /// Index of the frame just rendered.
    pub frame_index: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered(FrameStats),
    Skipped(SkipReason),
}

impl FrameOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, FrameOutcome::Rendered(_))
    }
}

/// Cross-frame bookkeeping shared by both renderers.
#[derive(Debug, Default)]
pub(crate) struct FrameState {
    prev_view_proj: Option<Mat4>,
    frame_index: u32,
    last_skip: Option<SkipReason>,
    last_volume_count: Option<usize>,
}

impl FrameState {
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    /// Previous frame's view-projection; the current one on the first frame.
    pub fn prev_view_proj(&self, current: Mat4) -> Mat4 {
        self.prev_view_proj.unwrap_or(current)
    }

    /// Record a skipped frame, warning only when the reason changes.
    pub fn skip(&mut self, reason: SkipReason) -> FrameOutcome {
        if self.last_skip != Some(reason) {
            log::warn!("[FroxelRenderer] Skipping froxel pass: {}", reason);
            self.last_skip = Some(reason);
        }
        if matches!(reason, SkipReason::NoVolumes { .. }) {
            self.last_volume_count = Some(0);
        }
        FrameOutcome::Skipped(reason)
    }

    pub fn note_volumes(&mut self, count: usize) {
        if self.last_volume_count != Some(count) {
            log::info!("[FroxelRenderer] Injecting {} volume(s)", count);
            self.last_volume_count = Some(count);
        }
    }

    /// Close out a rendered frame.
    pub fn advance(&mut self, view_proj: Mat4, stats_volumes: usize, stats_lights: usize) -> FrameOutcome {
        if self.last_skip.take().is_some() {
            log::info!("[FroxelRenderer] Froxel pass resumed");
        }
        let stats = FrameStats {
            volume_count: stats_volumes,
            light_count: stats_lights,
            frame_index: self.frame_index,
        };
        self.prev_view_proj = Some(view_proj);
        self.frame_index = self.frame_index.wrapping_add(1);
        FrameOutcome::Rendered(stats)
    }

    /// Forget reprojection history (resolution change, temporal toggled on).
    pub fn reset_history(&mut self) {
        self.prev_view_proj = None;
    }
}

pub(crate) fn validate_resolution(settings: &FroxelSettings) -> Result<()> {
    if settings.resolution.cmpeq(UVec3::ZERO).any() {
        return Err(ToasterError::InvalidFroxelResolution(settings.resolution.to_array()));
    }
    Ok(())
}

pub(crate) fn no_volumes(snap: &VolumeSnapshot, extra_missing_grid: usize) -> SkipReason {
    SkipReason::NoVolumes {
        total: snap.total,
        missing_source: snap.skipped_no_source,
        missing_grid: snap.skipped_no_grid + extra_missing_grid,
    }
}

struct FroxelBuffers {
    resolution: UVec3,
    scattering: Vec<Vec4>,
    history: Vec<Vec4>,
    integrated: Vec<Vec4>,
}

impl FroxelBuffers {
    fn new(resolution: UVec3) -> Self {
        let count = resolution.x as usize * resolution.y as usize * resolution.z as usize;
        Self {
            resolution,
            scattering: vec![Vec4::ZERO; count],
            history: vec![Vec4::ZERO; count],
            integrated: vec![Vec4::ZERO; count],
        }
    }
}

/// Software froxel fog renderer.
pub struct FroxelRenderer {
    settings: FroxelSettings,
    buffers: Option<FroxelBuffers>,
    jitter: Option<JitterTexture>,
    state: FrameState,
    temporal_active: bool,
    workers: usize,
}

impl FroxelRenderer {
    pub fn new(settings: FroxelSettings) -> Result<Self> {
        let settings = settings.sanitized();
        validate_resolution(&settings)?;
        log::info!(
            "[FroxelRenderer] Allocating {}x{}x{} froxels",
            settings.resolution.x,
            settings.resolution.y,
            settings.resolution.z
        );
        Ok(Self {
            buffers: Some(FroxelBuffers::new(settings.resolution)),
            settings,
            jitter: None,
            state: FrameState::default(),
            temporal_active: false,
            workers: default_workers(),
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn settings(&self) -> &FroxelSettings {
        &self.settings
    }

    /// Replace the settings. Buffers are reallocated, and history dropped,
    /// only when the resolution changes.
    pub fn set_settings(&mut self, settings: FroxelSettings) -> Result<()> {
        let settings = settings.sanitized();
        validate_resolution(&settings)?;
        let resized = self
            .buffers
            .as_ref()
            .is_none_or(|b| b.resolution != settings.resolution);
        if resized {
            log::info!(
                "[FroxelRenderer] Reallocating froxels at {}x{}x{}",
                settings.resolution.x,
                settings.resolution.y,
                settings.resolution.z
            );
            self.buffers = Some(FroxelBuffers::new(settings.resolution));
            self.state.reset_history();
            self.temporal_active = false;
        }
        self.settings = settings;
        Ok(())
    }

    pub fn set_jitter(&mut self, jitter: Option<JitterTexture>) {
        self.jitter = jitter;
    }

    /// Frames rendered so far.
    pub fn frame_index(&self) -> u32 {
        self.state.frame_index()
    }

    /// Current frame's injected scattering (rgb) and extinction (a). After a
    /// temporal swap this is the buffer the next frame overwrites.
    pub fn scattering(&self) -> Option<&[Vec4]> {
        self.buffers.as_ref().map(|b| b.scattering.as_slice())
    }

    /// Previous frame's scattering, read by temporal blending.
    pub fn history(&self) -> Option<&[Vec4]> {
        self.buffers.as_ref().map(|b| b.history.as_slice())
    }

    /// Integrated radiance (rgb) and transmittance (a).
    pub fn integrated(&self) -> Option<&[Vec4]> {
        self.buffers.as_ref().map(|b| b.integrated.as_slice())
    }

    /// Render fog into `target`. Skipped frames leave `target` and all
    /// cross-frame state untouched.
    pub fn render(
        &mut self,
        camera: &CameraView,
        registry: &VolumeRegistry,
        lights: &[Light],
        target: &mut FrameTarget,
    ) -> FrameOutcome {
        if !camera.kind.receives_fog() {
            return self.state.skip(SkipReason::Camera(camera.kind));
        }
        let Some(buffers) = self.buffers.as_mut() else {
            return self.state.skip(SkipReason::MissingResource("froxel buffers"));
        };

        let snap = registry.snapshot(MAX_FROXEL_VOLUMES);
        let host: Vec<_> = snap.volumes.iter().filter(|v| v.grid.texels().is_some()).cloned().collect();
        let device_only = snap.volumes.len() - host.len();
        if device_only > 0 {
            log::debug!("[FroxelRenderer] {} device-resident volume(s) ignored by the CPU path", device_only);
        }
        if host.is_empty() {
            return self.state.skip(no_volumes(&snap, device_only));
        }
        self.state.note_volumes(host.len());

        let settings = &self.settings;
        let froxel_lights = collect_froxel_lights(lights, settings.max_lights);

        if settings.enable_temporal && !self.temporal_active {
            buffers.history.fill(Vec4::ZERO);
        }
        self.temporal_active = settings.enable_temporal;

        let view_proj = camera.view_proj();
        let (packed, _) = pack_volumes(&host);
        let params = FroxelParams::new(
            settings,
            camera,
            FrameInputs {
                prev_view_proj: self.state.prev_view_proj(view_proj),
                frame_index: self.state.frame_index(),
                volume_count: packed.len() as u32,
                light_count: froxel_lights.len() as u32,
                jitter_size: self.jitter.as_ref().map(|j| [j.width(), j.height()]),
            },
        );
        let inject_volumes: Vec<InjectVolume<'_>> = packed
            .iter()
            .zip(&host)
            .filter_map(|(volume, resolved)| {
                resolved.grid.texels().map(|texels| InjectVolume {
                    volume: *volume,
                    texels,
                })
            })
            .collect();

        let FroxelBuffers {
            resolution,
            scattering,
            history,
            integrated,
        } = buffers;
        let res = *resolution;

        // Clear, then inject.
        scattering.fill(Vec4::ZERO);
        let injector = Injector {
            params: &params,
            volumes: &inject_volumes,
            lights: &froxel_lights,
            history: settings.enable_temporal.then_some(history.as_slice()),
            jitter: self.jitter.as_ref(),
        };
        fill_parallel(scattering, self.workers, |i| injector.cell(i));

        // Integrate columns near to far.
        let slicing = params.slicing();
        let thickness = slicing.thicknesses();
        let mut columns = vec![Vec::new(); res.x as usize * res.y as usize];
        let scattering_ref: &[Vec4] = scattering;
        fill_parallel(&mut columns, self.workers, |c| {
            let (x, y) = (c as u32 % res.x, c as u32 / res.x);
            let cells: Vec<Vec4> = (0..res.z)
                .map(|z| scattering_ref[texel_index(res, x, y, z)])
                .collect();
            let mut out = vec![Vec4::ZERO; res.z as usize];
            integrate_column(&cells, &thickness, &mut out);
            out
        });
        for (c, column) in columns.iter().enumerate() {
            let (x, y) = (c as u32 % res.x, c as u32 / res.x);
            for (z, value) in column.iter().enumerate() {
                integrated[texel_index(res, x, y, z as u32)] = *value;
            }
        }

        Compositor {
            integrated,
            scattering,
            resolution: res,
            slicing,
            debug_mode: settings.debug_mode,
        }
        .apply(camera, target);

        if settings.enable_temporal {
            std::mem::swap(scattering, history);
        }
        self.state.advance(view_proj, packed.len(), froxel_lights.len())
    }

    /// Drop the froxel buffers. Later frames are skipped until
    /// [`Self::set_settings`] reallocates them.
    pub fn release(&mut self) {
        self.buffers = None;
        self.state.reset_history();
        self.temporal_active = false;
    }
}
