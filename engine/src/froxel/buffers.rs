//! Froxel GPU Buffer Structures
//!
//! Per-frame inputs of the froxel kernels: the frame uniform, the packed
//! light list and the packed volume list. The CPU renderer reads the same
//! structs, so both backends see identical snapshots.
//!
//! ## Memory Layout
//!
//! FroxelParams: 256 bytes, one per frame
//! FroxelLight:   64 bytes × at most 32 lights
//! FroxelVolume:  64 bytes × at most 8 volumes
//! Volume grids are concatenated into one `vec4<f32>` atlas buffer; each
//! `FroxelVolume` records its grid's offset and resolution inside the atlas.

use glam::{Mat4, Vec3};
use static_assertions::assert_eq_size;

use super::slicing::DepthSlicing;
use crate::config::FroxelSettings;
use crate::scene::{CameraView, Light, LightKind};
use crate::volume::ResolvedVolume;

/// Volumes injected per frame.
pub const MAX_FROXEL_VOLUMES: usize = 8;

pub const LIGHT_KIND_POINT: u32 = 0;
pub const LIGHT_KIND_SPOT: u32 = 1;
pub const LIGHT_KIND_DIRECTIONAL: u32 = 2;

pub const FLAG_HEIGHT_FOG: u32 = 1;
pub const FLAG_TEMPORAL: u32 = 1 << 1;
pub const FLAG_JITTER: u32 = 1 << 2;

// ============================================================================
// FroxelParams - per-frame uniform
// ============================================================================

/// Frame uniform shared by the clear, inject, integrate and composite stages.
///
/// WGSL Layout (256 bytes):
///   offset   0: inv_view_proj (mat4x4<f32>)
///   offset  64: prev_view_proj (mat4x4<f32>)
///   offset 128: camera_pos (vec3<f32>) + near (f32)
///   offset 144: camera_forward (vec3<f32>) + far (f32)
///   offset 160: resolution (vec3<u32>) + frame_index (u32)
///   offset 176: ambient (vec3<f32>) + fog_density (f32)
///   offset 192: fog_intensity, scattering_albedo, depth_uniformity, anisotropy
///   offset 208: light_density_boost, height_fog_base, height_fog_top, temporal_alpha
///   offset 224: volume_count, light_count, flags, debug_mode
///   offset 240: jitter_size (vec2<u32>), froxel_count, _pad
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FroxelParams {
    pub inv_view_proj: [[f32; 4]; 4],
    pub prev_view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 3],
    pub near: f32,
    pub camera_forward: [f32; 3],
    pub far: f32,
    pub resolution: [u32; 3],
    pub frame_index: u32,
    pub ambient: [f32; 3],
    pub fog_density: f32,
    pub fog_intensity: f32,
    pub scattering_albedo: f32,
    pub depth_uniformity: f32,
    pub anisotropy: f32,
    pub light_density_boost: f32,
    pub height_fog_base: f32,
    pub height_fog_top: f32,
    pub temporal_alpha: f32,
    pub volume_count: u32,
    pub light_count: u32,
    pub flags: u32,
    pub debug_mode: u32,
    pub jitter_size: [u32; 2],
    pub froxel_count: u32,
    pub _pad: u32,
}

assert_eq_size!(FroxelParams, [u8; 256]);

/// Inputs of [`FroxelParams::new`] that change every frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameInputs {
    pub prev_view_proj: Mat4,
    pub frame_index: u32,
    pub volume_count: u32,
    pub light_count: u32,
    /// Jitter tile size, when a jitter texture is bound.
    pub jitter_size: Option<[u32; 2]>,
}

impl FroxelParams {
    pub fn new(settings: &FroxelSettings, camera: &CameraView, frame: FrameInputs) -> Self {
        let mut flags = 0;
        if settings.enable_height_fog {
            flags |= FLAG_HEIGHT_FOG;
        }
        if settings.enable_temporal {
            flags |= FLAG_TEMPORAL;
        }
        if frame.jitter_size.is_some() {
            flags |= FLAG_JITTER;
        }
        Self {
            inv_view_proj: camera.inv_view_proj().to_cols_array_2d(),
            prev_view_proj: frame.prev_view_proj.to_cols_array_2d(),
            camera_pos: camera.position.to_array(),
            near: settings.near_plane,
            camera_forward: camera.forward.to_array(),
            far: settings.max_distance,
            resolution: settings.resolution.to_array(),
            frame_index: frame.frame_index,
            ambient: settings.ambient_color.to_array(),
            fog_density: settings.fog_density,
            fog_intensity: settings.fog_intensity,
            scattering_albedo: settings.scattering_albedo,
            depth_uniformity: settings.depth_uniformity,
            anisotropy: settings.scatter_anisotropy,
            light_density_boost: settings.light_density_boost,
            height_fog_base: settings.height_fog_base,
            height_fog_top: settings.height_fog_top,
            temporal_alpha: settings.temporal_blend_alpha,
            volume_count: frame.volume_count,
            light_count: frame.light_count,
            flags,
            debug_mode: settings.debug_mode.code(),
            jitter_size: frame.jitter_size.unwrap_or([1, 1]),
            froxel_count: settings.froxel_count() as u32,
            _pad: 0,
        }
    }

    pub fn slicing(&self) -> DepthSlicing {
        DepthSlicing::new(self.near, self.far, self.depth_uniformity, self.resolution[2])
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}

// ============================================================================
// FroxelLight - packed scene light
// ============================================================================

/// WGSL Layout (64 bytes):
///   Row 0: position (vec3<f32>) + range (f32)
///   Row 1: color (vec3<f32>) + intensity (f32)
///   Row 2: direction (vec3<f32>) + cos_outer (f32)
///   Row 3: kind (u32), cos_inner (f32), _pad (vec2<u32>)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FroxelLight {
    pub position_range: [f32; 4],
    pub color_intensity: [f32; 4],
    pub direction_cos_outer: [f32; 4],
    pub kind: u32,
    pub cos_inner: f32,
    pub _pad: [u32; 2],
}

assert_eq_size!(FroxelLight, [u8; 64]);

impl FroxelLight {
    /// Pack a scene light. Area lights have no froxel representation.
    pub fn from_light(light: &Light) -> Option<Self> {
        let kind = match light.kind {
            LightKind::Point => LIGHT_KIND_POINT,
            LightKind::Spot => LIGHT_KIND_SPOT,
            LightKind::Directional => LIGHT_KIND_DIRECTIONAL,
            LightKind::Area => return None,
        };
        let (cos_outer, cos_inner) = match light.kind {
            LightKind::Spot => light.spot_cosines(),
            _ => (-1.0, -1.0),
        };
        let range = if light.range.is_finite() { light.range } else { 0.0 };
        Some(Self {
            position_range: light.position.extend(range).to_array(),
            color_intensity: light.color.extend(light.intensity).to_array(),
            direction_cos_outer: light.direction.extend(cos_outer).to_array(),
            kind,
            cos_inner,
            _pad: [0; 2],
        })
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_slice(&self.position_range[..3])
    }

    pub fn range(&self) -> f32 {
        self.position_range[3]
    }

    pub fn direction(&self) -> Vec3 {
        Vec3::from_slice(&self.direction_cos_outer[..3])
    }

    pub fn cos_outer(&self) -> f32 {
        self.direction_cos_outer[3]
    }

    /// Color times intensity.
    pub fn radiance(&self) -> Vec3 {
        Vec3::from_slice(&self.color_intensity[..3]) * self.color_intensity[3]
    }
}

/// Enabled, non-area lights with positive intensity, in scene order, capped
/// at `max_lights`.
pub fn collect_froxel_lights(lights: &[Light], max_lights: u32) -> Vec<FroxelLight> {
    lights
        .iter()
        .filter(|l| l.enabled && l.intensity > 0.0)
        .filter_map(FroxelLight::from_light)
        .take(max_lights as usize)
        .collect()
}

// ============================================================================
// FroxelVolume - packed fog volume
// ============================================================================

/// WGSL Layout (64 bytes):
///   Row 0: bounds_min (vec3<f32>) + edge_falloff (f32)
///   Row 1: bounds_max (vec3<f32>) + density (f32)
///   Row 2: grid_res (vec3<u32>) + atlas_offset (u32)
///   Row 3: intensity (f32), slot (u32), _pad (vec2<u32>)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FroxelVolume {
    pub bounds_min: [f32; 3],
    pub edge_falloff: f32,
    pub bounds_max: [f32; 3],
    pub density: f32,
    pub grid_res: [u32; 3],
    /// First texel of this volume's grid in the atlas.
    pub atlas_offset: u32,
    pub intensity: f32,
    pub slot: u32,
    pub _pad: [u32; 2],
}

assert_eq_size!(FroxelVolume, [u8; 64]);

/// Pack resolved volumes and lay their grids out back to back. Returns the
/// packed list and the atlas size in texels.
pub fn pack_volumes(volumes: &[ResolvedVolume]) -> (Vec<FroxelVolume>, u64) {
    let mut offset = 0u64;
    let packed = volumes
        .iter()
        .take(MAX_FROXEL_VOLUMES)
        .enumerate()
        .map(|(slot, v)| {
            let res = v.grid.resolution();
            let entry = FroxelVolume {
                bounds_min: v.bounds_min.to_array(),
                edge_falloff: v.edge_falloff,
                bounds_max: v.bounds_max.to_array(),
                density: v.density,
                grid_res: res.to_array(),
                atlas_offset: offset as u32,
                intensity: v.intensity,
                slot: slot as u32,
                _pad: [0; 2],
            };
            offset += v.grid.voxel_count() as u64;
            entry
        })
        .collect();
    (packed, offset)
}

/// Number of leading volumes whose grids fit together in an atlas of at
/// most `max_bytes`. Volumes past the first that overflows are dropped.
pub fn volumes_within_budget(volumes: &[ResolvedVolume], max_bytes: u64) -> usize {
    let mut total = 0u64;
    volumes
        .iter()
        .take(MAX_FROXEL_VOLUMES)
        .take_while(|v| {
            total += v.grid.byte_size();
            total <= max_bytes
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::VoxelGrid;
    use crate::volume::VolumeId;
    use glam::UVec3;
    use std::mem::offset_of;
    use std::sync::Arc;

    #[test]
    fn test_params_offsets() {
        assert_eq!(offset_of!(FroxelParams, prev_view_proj), 64);
        assert_eq!(offset_of!(FroxelParams, camera_pos), 128);
        assert_eq!(offset_of!(FroxelParams, resolution), 160);
        assert_eq!(offset_of!(FroxelParams, ambient), 176);
        assert_eq!(offset_of!(FroxelParams, fog_intensity), 192);
        assert_eq!(offset_of!(FroxelParams, light_density_boost), 208);
        assert_eq!(offset_of!(FroxelParams, volume_count), 224);
        assert_eq!(offset_of!(FroxelParams, jitter_size), 240);
    }

    #[test]
    fn test_light_filter() {
        let lights = [
            Light::point(Vec3::ZERO, 5.0, Vec3::ONE, 1.0),
            Light::point(Vec3::ZERO, 5.0, Vec3::ONE, 0.0),
            Light::point(Vec3::ZERO, 5.0, Vec3::ONE, 1.0).disabled(),
            Light::area(Vec3::ZERO, Vec3::ONE, 1.0),
            Light::directional(Vec3::NEG_Y, Vec3::ONE, 1.0),
            Light::spot(Vec3::ZERO, Vec3::NEG_Y, 5.0, Vec3::ONE, 1.0, 60.0, 30.0),
        ];
        let packed = collect_froxel_lights(&lights, 32);
        let kinds: Vec<u32> = packed.iter().map(|l| l.kind).collect();
        assert_eq!(kinds, vec![LIGHT_KIND_POINT, LIGHT_KIND_DIRECTIONAL, LIGHT_KIND_SPOT]);
        assert_eq!(collect_froxel_lights(&lights, 1).len(), 1);
        assert_eq!(packed[1].range(), 0.0);
    }

    #[test]
    fn test_spot_cosines_packed() {
        let spot = Light::spot(Vec3::ZERO, Vec3::NEG_Y, 5.0, Vec3::ONE, 2.0, 60.0, 30.0);
        let packed = FroxelLight::from_light(&spot).unwrap();
        let (outer, inner) = spot.spot_cosines();
        assert_eq!(packed.cos_outer(), outer);
        assert_eq!(packed.cos_inner, inner);
        assert_eq!(packed.radiance(), Vec3::splat(2.0));
    }

    #[test]
    fn test_pack_volumes_atlas_offsets() {
        let resolved = |res: UVec3| ResolvedVolume {
            id: VolumeId::next(),
            bounds_min: Vec3::ZERO,
            bounds_max: Vec3::ONE,
            density: 1.0,
            intensity: 1.0,
            edge_falloff: 0.1,
            grid: Arc::new(VoxelGrid::zeroed(res)),
        };
        let volumes = vec![resolved(UVec3::new(2, 2, 2)), resolved(UVec3::new(4, 1, 1))];
        let (packed, texels) = pack_volumes(&volumes);
        assert_eq!(packed[0].atlas_offset, 0);
        assert_eq!(packed[1].atlas_offset, 8);
        assert_eq!(packed[1].slot, 1);
        assert_eq!(texels, 12);
    }

    #[test]
    fn test_atlas_budget_drops_trailing_volumes() {
        let resolved = |res: UVec3| ResolvedVolume {
            id: VolumeId::next(),
            bounds_min: Vec3::ZERO,
            bounds_max: Vec3::ONE,
            density: 1.0,
            intensity: 1.0,
            edge_falloff: 0.1,
            grid: Arc::new(VoxelGrid::zeroed(res)),
        };
        // 128 + 64 + 128 bytes
        let volumes = vec![
            resolved(UVec3::new(2, 2, 2)),
            resolved(UVec3::new(4, 1, 1)),
            resolved(UVec3::new(2, 2, 2)),
        ];
        assert_eq!(volumes_within_budget(&volumes, u64::MAX), 3);
        assert_eq!(volumes_within_budget(&volumes, 320), 3);
        assert_eq!(volumes_within_budget(&volumes, 319), 2);
        assert_eq!(volumes_within_budget(&volumes, 192), 2);
        assert_eq!(volumes_within_budget(&volumes, 191), 1);
        assert_eq!(volumes_within_budget(&volumes, 127), 0);
        assert_eq!(volumes_within_budget(&[], 0), 0);
    }
}
