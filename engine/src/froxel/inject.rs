//! Froxel Injection
//!
//! Per-cell evaluation of the participating medium: reconstruct the froxel's
//! world position, accumulate every containing volume's grid, add single
//! scattering from the collected lights plus ambient, apply height fog, and
//! optionally blend with the reprojected history. Output texels hold
//! in-scattered radiance in `rgb` and the extinction coefficient in `a`.

use glam::{Mat4, UVec3, Vec2, Vec3, Vec4, Vec4Swizzles};

use super::buffers::{
    FLAG_HEIGHT_FOG, FLAG_JITTER, FLAG_TEMPORAL, FroxelLight, FroxelParams, FroxelVolume,
    LIGHT_KIND_DIRECTIONAL, LIGHT_KIND_SPOT,
};
use super::media::{
    SOLID_ABSORPTION, edge_weight, height_fog_factor, henyey_greenstein, range_attenuation,
    spot_factor,
};
use super::slicing::DepthSlicing;
use crate::grid::sample_trilinear;
use crate::jitter::JitterTexture;

/// A packed volume together with its host texels.
#[derive(Clone, Copy, Debug)]
pub struct InjectVolume<'a> {
    pub volume: FroxelVolume,
    pub texels: &'a [Vec4],
}

impl InjectVolume<'_> {
    fn bounds(&self) -> (Vec3, Vec3) {
        (
            Vec3::from_array(self.volume.bounds_min),
            Vec3::from_array(self.volume.bounds_max),
        )
    }

    /// UVW of `p` inside the bounds, or `None` outside.
    fn uvw(&self, p: Vec3) -> Option<Vec3> {
        let (min, max) = self.bounds();
        if p.cmplt(min).any() || p.cmpgt(max).any() {
            return None;
        }
        let size = (max - min).max(Vec3::splat(1.0e-6));
        Some((p - min) / size)
    }
}

/// World position of a froxel sample: the camera ray through `uv` (froxel
/// space, y up) at view depth `depth`.
pub fn froxel_world_position(
    inv_view_proj: Mat4,
    camera_pos: Vec3,
    camera_forward: Vec3,
    uv: Vec2,
    depth: f32,
) -> Vec3 {
    let ndc = uv * 2.0 - Vec2::ONE;
    let on_ray = inv_view_proj.project_point3(ndc.extend(0.5));
    let dir = (on_ray - camera_pos).normalize_or(camera_forward);
    let cos = dir.dot(camera_forward).max(1.0e-4);
    camera_pos + dir * (depth / cos)
}

/// Froxel UVW of `p` in the frame rendered with `view_proj`, or `None` when
/// it falls outside that frame's froxel volume.
pub fn reproject(view_proj: Mat4, slicing: &DepthSlicing, p: Vec3) -> Option<Vec3> {
    let clip = view_proj * p.extend(1.0);
    if clip.w <= 1.0e-6 {
        return None;
    }
    let ndc = clip.xy() / clip.w;
    let uv = ndc * 0.5 + Vec2::splat(0.5);
    // clip.w is the view depth for a perspective projection.
    if clip.w < slicing.near || clip.w > slicing.far {
        return None;
    }
    let w = slicing.slice_coord(clip.w);
    let uvw = uv.extend(w);
    if uvw.cmplt(Vec3::ZERO).any() || uvw.cmpgt(Vec3::ONE).any() {
        return None;
    }
    Some(uvw)
}

/// Everything the inject stage reads for one frame.
pub struct Injector<'a> {
    pub params: &'a FroxelParams,
    pub volumes: &'a [InjectVolume<'a>],
    pub lights: &'a [FroxelLight],
    /// Previous frame's scattering, read when temporal blending is on.
    pub history: Option<&'a [Vec4]>,
    pub jitter: Option<&'a JitterTexture>,
}

impl Injector<'_> {
    fn resolution(&self) -> UVec3 {
        UVec3::from_array(self.params.resolution)
    }

    /// World position sampled by froxel `(x, y, z)` this frame.
    pub fn sample_position(&self, x: u32, y: u32, z: u32) -> Vec3 {
        let res = self.resolution();
        let offset = match self.jitter {
            Some(tex) if self.params.has_flag(FLAG_JITTER) => tex.offset(x, y, self.params.frame_index),
            _ => 0.5,
        };
        let depth = self.params.slicing().sample_depth(z, offset);
        let uv = Vec2::new(
            (x as f32 + 0.5) / res.x as f32,
            (y as f32 + 0.5) / res.y as f32,
        );
        froxel_world_position(
            Mat4::from_cols_array_2d(&self.params.inv_view_proj),
            Vec3::from_array(self.params.camera_pos),
            Vec3::from_array(self.params.camera_forward),
            uv,
            depth,
        )
    }

    /// Scattering and extinction of the medium at `p`, before temporal blending.
    pub fn medium(&self, p: Vec3) -> Vec4 {
        let params = self.params;
        let height = if params.has_flag(FLAG_HEIGHT_FOG) {
            height_fog_factor(p.y, params.height_fog_base, params.height_fog_top)
        } else {
            1.0
        };

        let mut sigma = 0.0;
        let mut grid_scatter = Vec3::ZERO;
        let mut solid = 0.0;
        for v in self.volumes {
            let Some(uvw) = v.uvw(p) else {
                continue;
            };
            let weight = edge_weight(uvw, v.volume.edge_falloff);
            let sigma_v = params.fog_density * v.volume.density * weight * height;
            if sigma_v <= 0.0 {
                continue;
            }
            let s = sample_trilinear(v.texels, UVec3::from_array(v.volume.grid_res), uvw);
            grid_scatter += sigma_v * s.xyz() * v.volume.intensity;
            solid += sigma_v * s.w;
            sigma += sigma_v;
        }
        if sigma <= 0.0 {
            return Vec4::ZERO;
        }

        let view_dir = (p - Vec3::from_array(params.camera_pos)).normalize_or_zero();
        let mut lit = Vec3::ZERO;
        let mut boost = 0.0;
        for light in self.lights {
            let (to_light, atten) = if light.kind == LIGHT_KIND_DIRECTIONAL {
                (-light.direction(), 1.0)
            } else {
                let to = light.position() - p;
                let d = to.length();
                let dir = to / d.max(1.0e-6);
                let mut atten = range_attenuation(d, light.range());
                if light.kind == LIGHT_KIND_SPOT {
                    atten *= spot_factor(light.direction().dot(-dir), light.cos_outer(), light.cos_inner);
                }
                boost += atten;
                (dir, atten)
            };
            if atten <= 0.0 {
                continue;
            }
            let phase = henyey_greenstein(to_light.dot(view_dir), params.anisotropy);
            lit += light.radiance() * atten * phase;
        }

        let sigma_boosted = sigma * (1.0 + params.light_density_boost * boost);
        let sigma_s = sigma_boosted * params.scattering_albedo;
        let ambient = Vec3::from_array(params.ambient);
        let scatter = params.fog_intensity
            * (params.scattering_albedo * grid_scatter + sigma_s * (lit + ambient));
        let extinction = sigma_boosted + solid * SOLID_ABSORPTION;
        scatter.extend(extinction)
    }

    /// Final value of froxel `index` (x-fastest, then y, then z).
    pub fn cell(&self, index: usize) -> Vec4 {
        let res = self.resolution();
        let (x, y, z) = (
            index as u32 % res.x,
            (index as u32 / res.x) % res.y,
            index as u32 / (res.x * res.y),
        );
        let p = self.sample_position(x, y, z);
        let fresh = self.medium(p);
        if !self.params.has_flag(FLAG_TEMPORAL) {
            return fresh;
        }
        let Some(history) = self.history else {
            return fresh;
        };
        let prev = Mat4::from_cols_array_2d(&self.params.prev_view_proj);
        match reproject(prev, &self.params.slicing(), p) {
            Some(uvw) => sample_trilinear(history, res, uvw).lerp(fresh, self.params.temporal_alpha),
            None => fresh,
        }
    }
}
