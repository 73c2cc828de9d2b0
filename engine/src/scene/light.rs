//! Scene Lights
//!
//! Light descriptors are re-collected from the host scene for every trace and
//! every frame; they carry no persistent identity.

use glam::Vec3;

/// Light shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightKind {
    Point,
    Spot,
    Directional,
    /// Rectangle/disc emitters. Ignored by the tracer and the froxel pass.
    Area,
}

/// A scene light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    /// World position (unused for directional lights).
    pub position: Vec3,
    /// Direction the light travels (spot axis, or sun direction).
    pub direction: Vec3,
    /// Influence radius in world units.
    pub range: f32,
    /// Linear RGB color.
    pub color: Vec3,
    pub intensity: f32,
    /// Full outer cone angle in degrees.
    pub spot_angle: f32,
    /// Full inner cone angle in degrees.
    pub inner_spot_angle: f32,
    pub enabled: bool,
}

impl Light {
    pub fn point(position: Vec3, range: f32, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Point,
            position,
            direction: Vec3::NEG_Y,
            range,
            color,
            intensity,
            spot_angle: 30.0,
            inner_spot_angle: 21.8,
            enabled: true,
        }
    }

    pub fn spot(
        position: Vec3,
        direction: Vec3,
        range: f32,
        color: Vec3,
        intensity: f32,
        spot_angle: f32,
        inner_spot_angle: f32,
    ) -> Self {
        Self {
            kind: LightKind::Spot,
            direction: direction.normalize_or(Vec3::NEG_Y),
            spot_angle,
            inner_spot_angle: inner_spot_angle.min(spot_angle),
            ..Self::point(position, range, color, intensity)
        }
    }

    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Directional,
            direction: direction.normalize_or(Vec3::NEG_Y),
            range: f32::INFINITY,
            ..Self::point(Vec3::ZERO, 0.0, color, intensity)
        }
    }

    pub fn area(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Area,
            ..Self::point(position, 10.0, color, intensity)
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Cosines of the half outer and half inner cone angles.
    pub fn spot_cosines(&self) -> (f32, f32) {
        let outer = (self.spot_angle * 0.5).to_radians().cos();
        let inner = (self.inner_spot_angle * 0.5).to_radians().cos();
        (outer, inner.max(outer))
    }
}
