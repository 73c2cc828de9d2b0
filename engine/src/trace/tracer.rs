//! CPU Light Tracer
//!
//! Three per-voxel stages over a baked albedo grid:
//!
//! 1. **Direct**: shadowed direct light on every surface voxel, with the
//!    surface normal taken from the occupancy gradient.
//! 2. **Surface**: stochastic gather. Each occupied voxel casts
//!    `rays_per_voxel` rays, follows up to `max_bounces` hits through the
//!    grid, and collects the direct light of every voxel struck, weighted by
//!    the struck albedo and distance falloff.
//! 3. **Volumetric**: shadowed direct light at every air voxel. Solid voxels
//!    are written as opaque black `(0, 0, 0, 1)`.
//!
//! The volumetric result is the published lighting grid; the surface result
//! is kept alongside it as `surface_lighting`.

use std::sync::Arc;
use std::time::Instant;

use glam::{IVec3, UVec3, Vec3, Vec4};

use super::lights::{PackedLights, TraceLight, pack_trace_lights, trace_falloff};
use super::sampling::{scatter_direction, voxel_rng};
use super::traversal::{first_solid, visible};
use crate::bake::BakedVolume;
use crate::config::TraceSettings;
use crate::error::{Result, ToasterError};
use crate::grid::{GridExtent, VoxelGrid, texel_index};
use crate::parallel::{default_workers, fill_parallel};
use crate::scene::Light;

/// Summary of a finished trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceStats {
    pub resolution: UVec3,
    /// Lights actually traced (0 when the placeholder was bound).
    pub light_count: u32,
    pub dummy_light: bool,
    /// Seed the stochastic pass used; pass it back in to reproduce a trace.
    pub seed: u64,
    /// Primary rays cast by the surface pass. Only known on the CPU path.
    pub rays_cast: Option<u64>,
}

/// `(x, y, z)` of linear voxel index `i`.
#[inline]
pub(crate) fn voxel_coords(resolution: UVec3, i: usize) -> UVec3 {
    let x = i % resolution.x as usize;
    let y = (i / resolution.x as usize) % resolution.y as usize;
    let z = i / (resolution.x as usize * resolution.y as usize);
    UVec3::new(x as u32, y as u32, z as u32)
}

/// Read-only inputs shared by every stage.
pub(crate) struct TraceScene<'a> {
    pub extent: GridExtent,
    pub albedo: &'a [Vec4],
    pub lights: &'a [TraceLight],
    pub light_falloff: f32,
}

impl TraceScene<'_> {
    #[inline]
    fn texel(&self, v: UVec3) -> Vec4 {
        self.albedo[texel_index(self.extent.resolution, v.x, v.y, v.z)]
    }

    #[inline]
    fn is_solid(&self, v: UVec3) -> bool {
        self.texel(v).w > 0.0
    }

    fn max_distance(&self) -> f32 {
        self.extent.resolution.as_vec3().length() * self.extent.voxel_size
    }

    /// Outward surface normal: negated occupancy gradient. Zero inside
    /// uniform regions.
    pub fn normal(&self, v: UVec3) -> Vec3 {
        let res = self.extent.resolution.as_ivec3();
        let c = v.as_ivec3();
        let alpha = |o: IVec3| {
            let p = (c + o).clamp(IVec3::ZERO, res - IVec3::ONE).as_uvec3();
            self.texel(p).w
        };
        let g = Vec3::new(
            alpha(IVec3::X) - alpha(IVec3::NEG_X),
            alpha(IVec3::Y) - alpha(IVec3::NEG_Y),
            alpha(IVec3::Z) - alpha(IVec3::NEG_Z),
        );
        if g.length_squared() < 1e-12 { Vec3::ZERO } else { -g.normalize() }
    }

    /// Shadowed light arriving at `p` from every light. `normal`, when
    /// non-zero, applies the cosine term and culls back-facing lights.
    fn incident(&self, p: Vec3, normal: Vec3) -> Vec3 {
        let mut sum = Vec3::ZERO;
        for light in self.lights {
            let to = light.position() - p;
            let d = to.length();
            let atten = trace_falloff(d, light.range(), self.light_falloff);
            if atten <= 0.0 {
                continue;
            }
            let cos = if normal == Vec3::ZERO {
                1.0
            } else {
                normal.dot(to / d.max(1e-6))
            };
            if cos <= 0.0 {
                continue;
            }
            if !visible(&self.extent, p, light.position(), |v| self.is_solid(v)) {
                continue;
            }
            sum += light.radiance() * atten * cos;
        }
        sum
    }

    /// Direct light on a surface voxel (zero for air and interior voxels).
    pub fn direct(&self, i: usize) -> Vec3 {
        let v = voxel_coords(self.extent.resolution, i);
        if !self.is_solid(v) {
            return Vec3::ZERO;
        }
        let n = self.normal(v);
        if n == Vec3::ZERO {
            return Vec3::ZERO;
        }
        self.incident(self.extent.voxel_center(v.x, v.y, v.z), n)
    }

    /// Surface gather for one voxel, given the direct-light grid.
    pub fn surface(&self, i: usize, direct: &[Vec3], seed: u64, rays: u32, bounces: u32) -> Vec4 {
        let res = self.extent.resolution;
        let v = voxel_coords(res, i);
        let albedo = self.texel(v);
        if albedo.w <= 0.0 {
            return Vec4::ZERO;
        }
        let max_distance = self.max_distance();
        let mut rng = voxel_rng(seed, i);
        let mut gathered = Vec3::ZERO;

        for _ in 0..rays {
            let mut cell = v;
            let mut normal = self.normal(v);
            let mut throughput = Vec3::ONE;
            for _ in 0..bounces {
                let origin = self.extent.voxel_center(cell.x, cell.y, cell.z);
                let dir = scatter_direction(normal, &mut rng);
                let Some(hit) = first_solid(&self.extent, origin, dir, max_distance, |c| {
                    self.is_solid(c)
                }) else {
                    break;
                };
                let struck = self.texel(hit.voxel).truncate();
                throughput *= struck * trace_falloff(hit.distance, f32::INFINITY, self.light_falloff);
                gathered += throughput * direct[texel_index(res, hit.voxel.x, hit.voxel.y, hit.voxel.z)];
                cell = hit.voxel;
                normal = self.normal(cell);
            }
        }

        let indirect = if rays > 0 { gathered / rays as f32 } else { Vec3::ZERO };
        (albedo.truncate() * (direct[i] + indirect)).extend(1.0)
    }

    /// Air voxels get shadowed direct light with alpha 0; solid voxels are
    /// opaque black.
    pub fn volumetric(&self, i: usize) -> Vec4 {
        let v = voxel_coords(self.extent.resolution, i);
        if self.is_solid(v) {
            return Vec4::new(0.0, 0.0, 0.0, 1.0);
        }
        self.incident(self.extent.voxel_center(v.x, v.y, v.z), Vec3::ZERO)
            .extend(0.0)
    }
}

/// Software light tracer bound to one baked region.
pub struct LightTracer {
    settings: TraceSettings,
    source: Arc<BakedVolume>,
    workers: usize,
}

impl LightTracer {
    pub fn new(source: Arc<BakedVolume>, settings: TraceSettings) -> Self {
        Self {
            settings,
            source,
            workers: default_workers(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
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

    /// Lighting grid of the last successful trace.
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
        let (extent, albedo) = source_grid(&self.source)?;
        let texels = albedo.host_texels()?;
        let started = Instant::now();
        let settings = self.settings.sanitized();
        let seed = settings.seed.unwrap_or_else(rand::random);
        let res = extent.resolution;
        progress(0.0);
        log::info!(
            "[LightTracer] Tracing lighting: {}x{}x{}, {} rays/voxel, {} bounces",
            res.x,
            res.y,
            res.z,
            settings.rays_per_voxel,
            settings.max_bounces
        );

        let packed: PackedLights = pack_trace_lights(lights);
        let scene = TraceScene {
            extent,
            albedo: texels,
            lights: packed.active(),
            light_falloff: settings.light_falloff,
        };
        let count = extent.voxel_count();
        progress(0.1);

        let mut direct = vec![Vec3::ZERO; count];
        fill_parallel(&mut direct, self.workers, |i| scene.direct(i));
        progress(0.3);

        let mut surface = vec![Vec4::ZERO; count];
        fill_parallel(&mut surface, self.workers, |i| {
            scene.surface(i, &direct, seed, settings.rays_per_voxel, settings.max_bounces)
        });
        progress(0.6);

        let mut lighting = vec![Vec4::ZERO; count];
        fill_parallel(&mut lighting, self.workers, |i| scene.volumetric(i));
        progress(0.9);

        let occupied = texels.iter().filter(|t| t.w > 0.0).count() as u64;
        let surface = Arc::new(VoxelGrid::from_host(res, surface)?);
        let lighting = Arc::new(VoxelGrid::from_host(res, lighting)?);
        self.source.publish_lighting(lighting, surface);
        progress(1.0);

        log::info!(
            "[LightTracer] Lighting trace complete! {} lights, seed {:#x} ({:.1} ms)",
            packed.count,
            seed,
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(TraceStats {
            resolution: res,
            light_count: packed.count,
            dummy_light: packed.is_dummy(),
            seed,
            rays_cast: Some(occupied * settings.rays_per_voxel as u64),
        })
    }

    /// Drop the traced lighting; the baked albedo is untouched.
    pub fn release(&mut self) {
        self.source.clear_lighting();
    }
}

/// Extent and albedo grid of `source`, or a missing-resource error.
pub(crate) fn source_grid(source: &BakedVolume) -> Result<(GridExtent, Arc<VoxelGrid>)> {
    let (Some(extent), Some(albedo)) = (source.extent(), source.albedo()) else {
        log::warn!("[LightTracer] VoxelBaker has no baked grid. Bake first!");
        return Err(ToasterError::MissingResource("albedo grid"));
    };
    if albedo.resolution() != extent.resolution {
        return Err(ToasterError::ResolutionMismatch {
            expected: extent.resolution.to_array(),
            actual: albedo.resolution().to_array(),
        });
    }
    Ok((extent, albedo))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent() -> GridExtent {
        GridExtent {
            min: Vec3::ZERO,
            voxel_size: 1.0,
            resolution: UVec3::new(8, 8, 8),
        }
    }

    /// Solid white floor at y == 0.
    fn floor_texels() -> Vec<Vec4> {
        let e = extent();
        (0..e.voxel_count())
            .map(|i| {
                if voxel_coords(e.resolution, i).y == 0 {
                    Vec4::ONE
                } else {
                    Vec4::ZERO
                }
            })
            .collect()
    }

    #[test]
    fn test_voxel_coords_round_trip() {
        let res = UVec3::new(3, 4, 5);
        for i in 0..60 {
            let v = voxel_coords(res, i);
            assert_eq!(texel_index(res, v.x, v.y, v.z), i);
        }
    }

    #[test]
    fn test_floor_normal_points_up() {
        let texels = floor_texels();
        let scene = TraceScene {
            extent: extent(),
            albedo: &texels,
            lights: &[],
            light_falloff: 0.5,
        };
        assert_eq!(scene.normal(UVec3::new(4, 0, 4)), Vec3::Y);
        assert_eq!(scene.normal(UVec3::new(4, 4, 4)), Vec3::ZERO);
    }

    #[test]
    fn test_volumetric_marks_solids_and_lights_air() {
        let texels = floor_texels();
        let light = pack_trace_lights(&[Light::point(Vec3::new(4.5, 6.5, 4.5), 20.0, Vec3::ONE, 1.0)]);
        let scene = TraceScene {
            extent: extent(),
            albedo: &texels,
            lights: light.active(),
            light_falloff: 0.5,
        };
        let e = extent();
        let floor = texel_index(e.resolution, 4, 0, 4);
        let air = texel_index(e.resolution, 4, 3, 4);
        assert_eq!(scene.volumetric(floor), Vec4::new(0.0, 0.0, 0.0, 1.0));
        let lit = scene.volumetric(air);
        assert_eq!(lit.w, 0.0);
        // d = 3, falloff = 1 / 4
        assert!((lit.x - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_direct_lights_floor_top() {
        let texels = floor_texels();
        let light = pack_trace_lights(&[Light::point(Vec3::new(4.5, 4.5, 4.5), 20.0, Vec3::ONE, 2.0)]);
        let scene = TraceScene {
            extent: extent(),
            albedo: &texels,
            lights: light.active(),
            light_falloff: 0.5,
        };
        let direct = scene.direct(texel_index(extent().resolution, 4, 0, 4));
        // d = 4, cos = 1, falloff = 1 / 5
        assert!((direct.x - 2.0 / 5.0).abs() < 1e-5);
    }

    /// White floor at y == 0 and a red wall along x == 0 above it.
    fn corner_texels() -> Vec<Vec4> {
        let e = extent();
        (0..e.voxel_count())
            .map(|i| match voxel_coords(e.resolution, i) {
                v if v.y == 0 => Vec4::ONE,
                v if v.x == 0 => Vec4::new(1.0, 0.0, 0.0, 1.0),
                _ => Vec4::ZERO,
            })
            .collect()
    }

    fn direct_grid(scene: &TraceScene<'_>) -> Vec<Vec3> {
        (0..scene.extent.voxel_count()).map(|i| scene.direct(i)).collect()
    }

    #[test]
    fn test_red_wall_bleeds_onto_floor() {
        let texels = corner_texels();
        let light = pack_trace_lights(&[Light::point(Vec3::new(4.5, 4.5, 4.5), 20.0, Vec3::ONE, 2.0)]);
        let scene = TraceScene {
            extent: extent(),
            albedo: &texels,
            lights: light.active(),
            light_falloff: 0.5,
        };
        let direct = direct_grid(&scene);
        let i = texel_index(extent().resolution, 1, 0, 4);
        assert!(direct[i].x > 0.0);

        let lit = scene.surface(i, &direct, 3, 32, 2);
        assert!(lit.x > lit.y, "no red bounce light: {:?}", lit);
        assert!((lit.y - lit.z).abs() < 1e-6);
        assert_eq!(lit.w, 1.0);
    }

    #[test]
    fn test_zero_bounces_is_direct_only() {
        let texels = corner_texels();
        let light = pack_trace_lights(&[Light::point(Vec3::new(4.5, 4.5, 4.5), 20.0, Vec3::ONE, 2.0)]);
        let scene = TraceScene {
            extent: extent(),
            albedo: &texels,
            lights: light.active(),
            light_falloff: 0.5,
        };
        let direct = direct_grid(&scene);
        let i = texel_index(extent().resolution, 1, 0, 4);
        assert_eq!(scene.surface(i, &direct, 3, 32, 0), direct[i].extend(1.0));
        assert_ne!(scene.surface(i, &direct, 3, 32, 1), direct[i].extend(1.0));
    }

    #[test]
    fn test_air_has_no_surface_lighting() {
        let texels = corner_texels();
        let scene = TraceScene {
            extent: extent(),
            albedo: &texels,
            lights: &[],
            light_falloff: 0.5,
        };
        let direct = vec![Vec3::ONE; extent().voxel_count()];
        let air = texel_index(extent().resolution, 4, 4, 4);
        assert_eq!(scene.surface(air, &direct, 1, 8, 3), Vec4::ZERO);
    }

    #[test]
    fn test_trace_without_bake_is_missing_resource() {
        let source = BakedVolume::new(Vec3::ZERO, Vec3::ONE);
        let mut tracer = LightTracer::new(source, TraceSettings::default());
        assert!(matches!(
            tracer.trace(&[]),
            Err(ToasterError::MissingResource(_))
        ));
    }
}
