//! Camera Inputs
//!
//! Per-frame camera data read by the froxel renderer. Projections follow the
//! wgpu clip convention: right-handed view space, depth in `0..1`, no vertical
//! flip between NDC and froxel space.

use glam::{Mat4, Vec3};

/// Which kind of view a camera renders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CameraKind {
    Game,
    SceneView,
    /// Asset/material thumbnails. Never receives froxel fog.
    Preview,
    /// Reflection probes. Never receives froxel fog.
    Reflection,
}

impl CameraKind {
    /// Whether the froxel pass runs for this camera.
    pub fn receives_fog(self) -> bool {
        matches!(self, CameraKind::Game | CameraKind::SceneView)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraView {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
    pub forward: Vec3,
    pub near: f32,
    pub far: f32,
    pub kind: CameraKind,
}

impl CameraView {
    /// Perspective game camera looking from `eye` toward `target`.
    pub fn look_at(eye: Vec3, target: Vec3, fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Self {
        let forward = (target - eye).normalize_or(Vec3::NEG_Z);
        let up = if forward.abs().y > 0.999 { Vec3::Z } else { Vec3::Y };
        Self {
            view: Mat4::look_to_rh(eye, forward, up),
            projection: Mat4::perspective_rh(fov_y_radians, aspect, near, far),
            position: eye,
            forward,
            near,
            far,
            kind: CameraKind::Game,
        }
    }

    pub fn with_kind(mut self, kind: CameraKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view
    }

    pub fn inv_view_proj(&self) -> Mat4 {
        self.view_proj().inverse()
    }

    /// Distance along `forward` of the surface behind a hardware depth value.
    pub fn linearize_depth(&self, ndc_depth: f32) -> f32 {
        let p = self.projection.inverse() * glam::Vec4::new(0.0, 0.0, ndc_depth, 1.0);
        if p.w.abs() < f32::EPSILON {
            return self.far;
        }
        -p.z / p.w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_and_reflection_excluded() {
        assert!(CameraKind::Game.receives_fog());
        assert!(CameraKind::SceneView.receives_fog());
        assert!(!CameraKind::Preview.receives_fog());
        assert!(!CameraKind::Reflection.receives_fog());
    }

    #[test]
    fn test_linearize_depth_endpoints() {
        let cam = CameraView::look_at(Vec3::ZERO, Vec3::NEG_Z, 1.0, 1.0, 0.5, 100.0);
        assert!((cam.linearize_depth(0.0) - 0.5).abs() < 1e-4);
        assert!((cam.linearize_depth(1.0) - 100.0).abs() < 0.05);
    }

    #[test]
    fn test_look_at_forward() {
        let cam = CameraView::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 1.0, 1.0, 0.1, 10.0);
        assert_eq!(cam.forward, Vec3::NEG_Z);
        let clip = cam.view_proj() * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((clip.w - 5.0).abs() < 1e-5);
    }
}
