//! Front-to-back integration of one froxel column.
//!
//! Within a slice of thickness `Δs`, extinction `k` and in-scattering `S` are
//! constant, so the slice contributes `S·(1 - e^(-kΔs))/k` of radiance
//! (`S·Δs` when `k` vanishes) attenuated by the transmittance in front of it.
//! Each output cell stores the running radiance in `rgb` and transmittance in
//! `a`.

use glam::{Vec4, Vec4Swizzles};

use super::media::EXTINCTION_EPSILON;

/// Integrate `cells` (near to far) into `out`. `thickness[i]` is the depth
/// extent of slice `i`.
pub fn integrate_column(cells: &[Vec4], thickness: &[f32], out: &mut [Vec4]) {
    let mut radiance = glam::Vec3::ZERO;
    let mut transmittance = 1.0f32;
    for ((cell, &ds), dst) in cells.iter().zip(thickness).zip(out.iter_mut()) {
        let k = cell.w.max(0.0);
        let scatter = cell.xyz();
        let slice_t = (-k * ds).exp();
        let contribution = if k > EXTINCTION_EPSILON {
            scatter * ((1.0 - slice_t) / k)
        } else {
            scatter * ds
        };
        radiance += transmittance * contribution;
        transmittance *= slice_t;
        *dst = radiance.extend(transmittance);
    }
}
