//! Grid Traversal
//!
//! Amanatides-Woo DDA through a dense occupancy grid. Rays are expressed in
//! world space; the walk happens in voxel space and distances are reported
//! back in world units. The voxel containing the ray origin is never
//! reported, so rays can start at the center of the voxel they leave.

use glam::{IVec3, UVec3, Vec3};

use crate::grid::GridExtent;

/// First solid voxel struck by a ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    pub voxel: UVec3,
    /// World-space distance from the origin to the voxel entry point.
    pub distance: f32,
}

/// Ray/box slab test against `[0, res]` in voxel space. Returns `(t_enter, t_exit)`.
fn clip_to_grid(origin: Vec3, dir: Vec3, res: Vec3) -> Option<(f32, f32)> {
    let inv = dir.recip();
    let t0 = (Vec3::ZERO - origin) * inv;
    let t1 = (res - origin) * inv;
    // NaN from 0 * inf means the ray is parallel and inside that slab.
    let tmin = t0.min(t1);
    let tmax = t0.max(t1);
    let enter = [tmin.x, tmin.y, tmin.z]
        .into_iter()
        .filter(|t| !t.is_nan())
        .fold(0.0f32, f32::max);
    let exit = [tmax.x, tmax.y, tmax.z]
        .into_iter()
        .filter(|t| !t.is_nan())
        .fold(f32::INFINITY, f32::min);
    (enter <= exit).then_some((enter, exit))
}

/// Walk from `origin` along unit `dir` for at most `max_distance` world
/// units and return the first voxel for which `solid` holds.
pub fn first_solid(
    extent: &GridExtent,
    origin: Vec3,
    dir: Vec3,
    max_distance: f32,
    solid: impl Fn(UVec3) -> bool,
) -> Option<Hit> {
    let vs = extent.voxel_size;
    let res = extent.resolution.as_ivec3();
    let p = extent.world_to_voxel(origin);
    let origin_cell = p.floor().as_ivec3();
    let max_t = max_distance / vs;

    let (enter, exit) = clip_to_grid(p, dir, res.as_vec3())?;
    let exit = exit.min(max_t);
    if enter > exit {
        return None;
    }

    let start = p + dir * enter;
    let mut cell = start.floor().as_ivec3().clamp(IVec3::ZERO, res - IVec3::ONE);
    let step = IVec3::new(
        if dir.x >= 0.0 { 1 } else { -1 },
        if dir.y >= 0.0 { 1 } else { -1 },
        if dir.z >= 0.0 { 1 } else { -1 },
    );
    let next_boundary = cell.as_vec3() + step.max(IVec3::ZERO).as_vec3();
    let delta = dir.abs().recip();
    let mut t_max = Vec3::new(
        if dir.x != 0.0 { enter + (next_boundary.x - start.x) / dir.x } else { f32::INFINITY },
        if dir.y != 0.0 { enter + (next_boundary.y - start.y) / dir.y } else { f32::INFINITY },
        if dir.z != 0.0 { enter + (next_boundary.z - start.z) / dir.z } else { f32::INFINITY },
    );
    let mut t = enter;

    let max_steps = (res.x + res.y + res.z) as u32 + 3;
    for _ in 0..max_steps {
        if t > exit {
            return None;
        }
        if cell != origin_cell {
            let voxel = cell.as_uvec3();
            if solid(voxel) {
                return Some(Hit {
                    voxel,
                    distance: t * vs,
                });
            }
        }
        if t_max.x < t_max.y && t_max.x < t_max.z {
            cell.x += step.x;
            t = t_max.x;
            t_max.x += delta.x;
        } else if t_max.y < t_max.z {
            cell.y += step.y;
            t = t_max.y;
            t_max.y += delta.y;
        } else {
            cell.z += step.z;
            t = t_max.z;
            t_max.z += delta.z;
        }
        if cell.cmplt(IVec3::ZERO).any() || cell.cmpge(res).any() {
            return None;
        }
    }
    None
}

/// Whether `target` is visible from `origin` through the grid.
pub fn visible(extent: &GridExtent, origin: Vec3, target: Vec3, solid: impl Fn(UVec3) -> bool) -> bool {
    let to = target - origin;
    let distance = to.length();
    if distance <= f32::EPSILON {
        return true;
    }
    first_solid(extent, origin, to / distance, distance, solid).is_none()
}
