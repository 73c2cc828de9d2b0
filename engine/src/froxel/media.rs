//! Participating-media terms evaluated per froxel: phase function, light
//! attenuation, volume edge fade and height fog. The inject shader carries the
//! same formulas.

use glam::Vec3;

/// Extra extinction per unit of solid occupancy sampled from a lighting grid.
pub const SOLID_ABSORPTION: f32 = 8.0;

/// Below this extinction a slice integrates as pure emission.
pub const EXTINCTION_EPSILON: f32 = 1.0e-6;

/// Henyey-Greenstein phase function.
///
/// `cos_theta` is the cosine between the light's travel direction and the
/// view ray; positive `g` favours forward scattering.
pub fn henyey_greenstein(cos_theta: f32, g: f32) -> f32 {
    let g2 = g * g;
    let denom = (1.0 + g2 - 2.0 * g * cos_theta).max(1.0e-6);
    (1.0 - g2) / (4.0 * std::f32::consts::PI * denom * denom.sqrt())
}

/// Hermite smoothstep, `0` at `edge0` and `1` at `edge1`.
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge1 == edge0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Height fog multiplier: 1 at or below `base`, 0 at or above `top`,
/// `sqrt(1 - t)` in between.
pub fn height_fog_factor(y: f32, base: f32, top: f32) -> f32 {
    if y <= base {
        return 1.0;
    }
    if y >= top {
        return 0.0;
    }
    let t = (y - base) / (top - base);
    (1.0 - t).sqrt()
}

/// Fade toward the faces of a volume's UVW box. `falloff` is the fade width
/// in UVW units; zero disables the fade.
pub fn edge_weight(uvw: Vec3, falloff: f32) -> f32 {
    if falloff <= 0.0 {
        return 1.0;
    }
    let d = uvw.min(Vec3::ONE - uvw);
    smoothstep(0.0, falloff, d.min_element())
}

/// Distance attenuation of a local light: a smooth window that reaches zero
/// at `range`, divided by `1 + d²`.
pub fn range_attenuation(distance: f32, range: f32) -> f32 {
    if range <= 0.0 || distance >= range {
        return 0.0;
    }
    let r = distance / range;
    let window = (1.0 - r * r * r * r).clamp(0.0, 1.0);
    window * window / (1.0 + distance * distance)
}

/// Spot cone factor for `cos_angle` between the spot axis and the direction
/// to the sample.
pub fn spot_factor(cos_angle: f32, cos_outer: f32, cos_inner: f32) -> f32 {
    smoothstep(cos_outer, cos_inner, cos_angle)
}
