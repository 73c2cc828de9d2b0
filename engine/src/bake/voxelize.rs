//! Triangle Voxelization
//!
//! Conservative triangle/voxel overlap via the separating axis theorem
//! (Akenine-Möller). Each voxel box is inset slightly on every face, and the
//! triangle is nudged against its front-face normal before testing. A face
//! lying exactly on a shared voxel boundary therefore lands in the voxel on
//! its back side only, so a closed mesh with outward (counter-clockwise)
//! winding fills exactly the voxels it encloses on both ends of each axis.
//!
//! `shaders/voxelize.wgsl` mirrors these functions line for line.

use glam::{UVec3, Vec3};

use crate::grid::GridExtent;

/// Fraction of a voxel trimmed from every face of the test box.
pub const FACE_INSET: f32 = 1e-3;

/// Fraction of a voxel a triangle is moved against its normal. Larger than
/// `FACE_INSET` so a boundary face clears the inset of the voxel behind it.
pub const INWARD_BIAS: f32 = 2e-3;

/// Inclusive voxel range covered by the triangle's bounding box, clamped to
/// the grid. `None` when the triangle lies outside the grid.
pub fn triangle_voxel_range(extent: &GridExtent, tri: &[Vec3; 3]) -> Option<(UVec3, UVec3)> {
    let lo = extent.world_to_voxel(tri[0].min(tri[1]).min(tri[2])).floor();
    let hi = extent.world_to_voxel(tri[0].max(tri[1]).max(tri[2])).floor();
    let res = extent.resolution.as_vec3();
    if hi.cmplt(Vec3::ZERO).any() || lo.cmpge(res).any() || !lo.is_finite() || !hi.is_finite() {
        return None;
    }
    let max = res - Vec3::ONE;
    Some((
        lo.clamp(Vec3::ZERO, max).as_uvec3(),
        hi.clamp(Vec3::ZERO, max).as_uvec3(),
    ))
}

/// Call `f` once for every voxel the triangle overlaps.
pub fn for_each_overlapped_voxel(extent: &GridExtent, tri: &[Vec3; 3], mut f: impl FnMut(UVec3)) {
    let vs = extent.voxel_size;
    let inward = -(tri[1] - tri[0]).cross(tri[2] - tri[0]).normalize_or_zero() * (vs * INWARD_BIAS);
    let tri = [tri[0] + inward, tri[1] + inward, tri[2] + inward];
    let Some((lo, hi)) = triangle_voxel_range(extent, &tri) else {
        return;
    };
    let half = Vec3::splat(vs * (0.5 - FACE_INSET));
    for z in lo.z..=hi.z {
        for y in lo.y..=hi.y {
            for x in lo.x..=hi.x {
                let center = extent.min + (UVec3::new(x, y, z).as_vec3() + 0.5) * vs;
                if triangle_box_overlap(center, half, &tri) {
                    f(UVec3::new(x, y, z));
                }
            }
        }
    }
}

/// Separating-axis overlap test between a triangle and an axis-aligned box.
pub fn triangle_box_overlap(center: Vec3, half: Vec3, tri: &[Vec3; 3]) -> bool {
    let v0 = tri[0] - center;
    let v1 = tri[1] - center;
    let v2 = tri[2] - center;

    // Box face normals
    let tmin = v0.min(v1).min(v2);
    let tmax = v0.max(v1).max(v2);
    if tmin.cmpgt(half).any() || tmax.cmplt(-half).any() {
        return false;
    }

    // Triangle plane
    let e0 = v1 - v0;
    let e1 = v2 - v1;
    let e2 = v0 - v2;
    let n = e0.cross(e1);
    if n.dot(v0).abs() > half.dot(n.abs()) {
        return false;
    }

    // Edge cross products
    for e in [e0, e1, e2] {
        for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
            let a = axis.cross(e);
            let p0 = a.dot(v0);
            let p1 = a.dot(v1);
            let p2 = a.dot(v2);
            let r = half.dot(a.abs());
            if p0.min(p1).min(p2) > r || p0.max(p1).max(p2) < -r {
                return false;
            }
        }
    }
    true
}

/// Barycentric weights `(wa, wb, wc)` of the point on triangle `abc` closest to `p`.
pub fn closest_point_barycentric(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return Vec3::X;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return Vec3::Y;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return Vec3::new(1.0 - v, v, 0.0);
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return Vec3::Z;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return Vec3::new(1.0 - w, 0.0, w);
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return Vec3::new(0.0, 1.0 - w, w);
    }

    let denom = va + vb + vc;
    if denom.abs() < f32::MIN_POSITIVE {
        return Vec3::X;
    }
    let v = vb / denom;
    let w = vc / denom;
    Vec3::new(1.0 - v - w, v, w)
}
