//! Ray sampling helpers for the stochastic surface pass.

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// SplitMix64 finalizer. Decorrelates neighboring voxel indices.
#[inline]
pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Independent generator for one voxel. Results depend only on
/// `(seed, index)`, never on which worker handles the voxel.
pub fn voxel_rng(seed: u64, index: usize) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed ^ splitmix64(index as u64))
}

/// Cosine-weighted direction in the hemisphere around unit `normal`.
pub fn cosine_hemisphere(normal: Vec3, rng: &mut impl Rng) -> Vec3 {
    let u1: f32 = rng.gen_range(0.0..1.0);
    let u2: f32 = rng.gen_range(0.0..1.0);
    let r = u1.sqrt();
    let phi = std::f32::consts::TAU * u2;
    let (t, b) = normal.any_orthonormal_pair();
    let local = Vec3::new(r * phi.cos(), r * phi.sin(), (1.0 - u1).max(0.0).sqrt());
    (t * local.x + b * local.y + normal * local.z).normalize_or(normal)
}

/// Uniform direction on the unit sphere.
pub fn uniform_sphere(rng: &mut impl Rng) -> Vec3 {
    let z: f32 = rng.gen_range(-1.0..1.0);
    let phi = std::f32::consts::TAU * rng.gen_range(0.0f32..1.0);
    let r = (1.0 - z * z).max(0.0).sqrt();
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

/// Cosine hemisphere when a normal is known, uniform sphere otherwise.
pub fn scatter_direction(normal: Vec3, rng: &mut impl Rng) -> Vec3 {
    if normal == Vec3::ZERO {
        uniform_sphere(rng)
    } else {
        cosine_hemisphere(normal, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voxel_rng_is_reproducible() {
        let a: Vec<u32> = (0..4).map(|_| voxel_rng(7, 12).gen_range(0..1000)).collect();
        let mut rng = voxel_rng(7, 12);
        let first: u32 = rng.gen_range(0..1000);
        assert!(a.iter().all(|v| *v == first));
        assert_ne!(splitmix64(1), splitmix64(2));
    }

    #[test]
    fn test_hemisphere_stays_above_surface() {
        let mut rng = voxel_rng(1, 0);
        let n = Vec3::new(0.0, 0.6, 0.8);
        for _ in 0..256 {
            let d = cosine_hemisphere(n, &mut rng);
            assert!(d.dot(n) >= -1e-5);
            assert!((d.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_sphere_is_unit() {
        let mut rng = voxel_rng(2, 3);
        for _ in 0..64 {
            assert!((uniform_sphere(&mut rng).length() - 1.0).abs() < 1e-4);
        }
    }
}
