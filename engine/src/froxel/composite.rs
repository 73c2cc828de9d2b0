//! Composite of the integrated froxel buffer over a frame.
//!
//! Each pixel's hardware depth is linearized, mapped to a slice coordinate
//! through the same [`DepthSlicing`] the inject stage used, and the
//! integrated (radiance, transmittance) pair at that point is applied as
//! `scene · T + L`.

use glam::{UVec3, Vec2, Vec3, Vec4, Vec4Swizzles};

use super::slicing::DepthSlicing;
use crate::config::FroxelDebugMode;
use crate::error::{Result, ToasterError};
use crate::grid::sample_trilinear;
use crate::scene::CameraView;

/// Color and depth of a rendered frame. Rows run top to bottom; depth holds
/// hardware depth in `0..1`.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameTarget {
    width: u32,
    height: u32,
    pub color: Vec<Vec4>,
    pub depth: Vec<f32>,
}

impl FrameTarget {
    pub fn new(width: u32, height: u32, color: Vec<Vec4>, depth: Vec<f32>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if color.len() != expected || depth.len() != expected {
            return Err(ToasterError::ResolutionMismatch {
                expected: [width, height, 1],
                actual: [color.len() as u32, depth.len() as u32, 1],
            });
        }
        Ok(Self {
            width,
            height,
            color,
            depth,
        })
    }

    /// A frame filled with one color at one depth.
    pub fn filled(width: u32, height: u32, color: Vec4, depth: f32) -> Self {
        let count = width as usize * height as usize;
        Self {
            width,
            height,
            color: vec![color; count],
            depth: vec![depth; count],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Vec4 {
        self.color[(y * self.width + x) as usize]
    }
}

/// Reads the froxel buffers of one frame for compositing.
pub struct Compositor<'a> {
    pub integrated: &'a [Vec4],
    pub scattering: &'a [Vec4],
    pub resolution: UVec3,
    pub slicing: DepthSlicing,
    pub debug_mode: FroxelDebugMode,
}

impl Compositor<'_> {
    /// Shade one pixel. `uv` is in image space (y down); `view_depth` is the
    /// linear depth of the surface behind the pixel.
    pub fn shade(&self, scene: Vec4, uv: Vec2, view_depth: f32) -> Vec4 {
        let w = self.slicing.slice_coord(view_depth);
        let uvw = Vec3::new(uv.x, 1.0 - uv.y, w);
        let out = match self.debug_mode {
            FroxelDebugMode::None => {
                let fog = sample_trilinear(self.integrated, self.resolution, uvw);
                scene.xyz() * fog.w + fog.xyz()
            }
            FroxelDebugMode::Scattering => sample_trilinear(self.scattering, self.resolution, uvw).xyz(),
            FroxelDebugMode::Extinction => {
                Vec3::splat(sample_trilinear(self.scattering, self.resolution, uvw).w)
            }
            FroxelDebugMode::Transmittance => {
                Vec3::splat(sample_trilinear(self.integrated, self.resolution, uvw).w)
            }
            FroxelDebugMode::DepthSlice => Vec3::splat(w),
        };
        out.extend(scene.w)
    }

    /// Composite every pixel of `target` in place.
    pub fn apply(&self, camera: &CameraView, target: &mut FrameTarget) {
        let (width, height) = (target.width, target.height);
        for y in 0..height {
            for x in 0..width {
                let i = (y * width + x) as usize;
                let uv = Vec2::new(
                    (x as f32 + 0.5) / width as f32,
                    (y as f32 + 0.5) / height as f32,
                );
                let view_depth = camera.linearize_depth(target.depth[i]);
                target.color[i] = self.shade(target.color[i], uv, view_depth);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(integrated: Vec4) -> (Vec<Vec4>, Vec<Vec4>) {
        (vec![integrated; 8], vec![Vec4::new(0.3, 0.2, 0.1, 0.7); 8])
    }

    #[test]
    fn test_frame_target_checks_sizes() {
        assert!(FrameTarget::new(2, 2, vec![Vec4::ZERO; 4], vec![0.0; 3]).is_err());
        assert!(FrameTarget::new(2, 2, vec![Vec4::ZERO; 4], vec![0.0; 4]).is_ok());
    }

    #[test]
    fn test_blend() {
        let (integrated, scattering) = uniform(Vec4::new(0.1, 0.2, 0.3, 0.5));
        let c = Compositor {
            integrated: &integrated,
            scattering: &scattering,
            resolution: UVec3::splat(2),
            slicing: DepthSlicing::new(0.3, 200.0, 0.0, 2),
            debug_mode: FroxelDebugMode::None,
        };
        let out = c.shade(Vec4::new(1.0, 1.0, 1.0, 0.8), Vec2::splat(0.5), 10.0);
        assert!((out - Vec4::new(0.6, 0.7, 0.8, 0.8)).abs().max_element() < 1e-6);
    }

    #[test]
    fn test_debug_modes() {
        let (integrated, scattering) = uniform(Vec4::new(0.1, 0.2, 0.3, 0.5));
        let mut c = Compositor {
            integrated: &integrated,
            scattering: &scattering,
            resolution: UVec3::splat(2),
            slicing: DepthSlicing::new(1.0, 11.0, 1.0, 2),
            debug_mode: FroxelDebugMode::Scattering,
        };
        let scene = Vec4::ONE;
        assert_eq!(c.shade(scene, Vec2::splat(0.5), 6.0).x, 0.3);
        c.debug_mode = FroxelDebugMode::Extinction;
        assert_eq!(c.shade(scene, Vec2::splat(0.5), 6.0).x, 0.7);
        c.debug_mode = FroxelDebugMode::Transmittance;
        assert_eq!(c.shade(scene, Vec2::splat(0.5), 6.0).x, 0.5);
        c.debug_mode = FroxelDebugMode::DepthSlice;
        assert!((c.shade(scene, Vec2::splat(0.5), 6.0).x - 0.5).abs() < 1e-6);
    }
}
