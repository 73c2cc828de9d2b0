//! Trace Light Upload
//!
//! Scene lights packed as two vec4 rows per light: `(position, range)` and
//! `(color, intensity)`. Spot lights trace as point lights. Directional
//! lights become distant point lights placed along their inverse direction.

use glam::{Vec3, Vec4};
use static_assertions::assert_eq_size;

use crate::scene::{Light, LightKind};

/// Distance at which a directional light's stand-in point light is placed.
pub const DIRECTIONAL_DISTANCE: f32 = 1000.0;

/// Range given to the stand-in point light.
pub const DIRECTIONAL_RANGE: f32 = 2000.0;

/// Intensity scale for the stand-in point light.
pub const DIRECTIONAL_INTENSITY_SCALE: f32 = 0.5;

/// One light as seen by the tracer kernels (32 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TraceLight {
    /// xyz = world position, w = range.
    pub position_range: [f32; 4],
    /// rgb = linear color, a = intensity.
    pub color_intensity: [f32; 4],
}

assert_eq_size!(TraceLight, [u8; 32]);

impl TraceLight {
    pub fn position(&self) -> Vec3 {
        Vec4::from_array(self.position_range).truncate()
    }

    pub fn range(&self) -> f32 {
        self.position_range[3]
    }

    /// Color premultiplied by intensity.
    pub fn radiance(&self) -> Vec3 {
        Vec4::from_array(self.color_intensity).truncate() * self.color_intensity[3]
    }

    fn from_light(light: &Light) -> Option<Self> {
        if !light.enabled {
            return None;
        }
        match light.kind {
            LightKind::Point | LightKind::Spot => Some(Self {
                position_range: light.position.extend(light.range).to_array(),
                color_intensity: light.color.extend(light.intensity).to_array(),
            }),
            LightKind::Directional => {
                let position = -light.direction.normalize_or(Vec3::NEG_Y) * DIRECTIONAL_DISTANCE;
                Some(Self {
                    position_range: position.extend(DIRECTIONAL_RANGE).to_array(),
                    color_intensity: light
                        .color
                        .extend(light.intensity * DIRECTIONAL_INTENSITY_SCALE)
                        .to_array(),
                })
            }
            LightKind::Area => None,
        }
    }
}

/// Light list ready for binding. `lights` is never empty; when the scene has
/// no eligible light it holds a single zeroed entry and `count` is 0.
#[derive(Clone, Debug, PartialEq)]
pub struct PackedLights {
    pub lights: Vec<TraceLight>,
    pub count: u32,
}

impl PackedLights {
    /// Whether `lights` holds only the placeholder entry.
    pub fn is_dummy(&self) -> bool {
        self.count == 0
    }

    /// The real lights (empty for the placeholder).
    pub fn active(&self) -> &[TraceLight] {
        &self.lights[..self.count as usize]
    }
}

/// Pack the eligible scene lights.
pub fn pack_trace_lights(lights: &[Light]) -> PackedLights {
    let packed: Vec<TraceLight> = lights.iter().filter_map(TraceLight::from_light).collect();
    if packed.is_empty() {
        log::warn!("[LightTracer] No lights found in scene for tracing, result will be unlit");
        return PackedLights {
            lights: vec![TraceLight::default()],
            count: 0,
        };
    }
    let count = packed.len() as u32;
    PackedLights {
        lights: packed,
        count,
    }
}

/// Distance attenuation used by every trace stage: `(1 + d)^(-2 * falloff)`,
/// zero beyond `range`.
#[inline]
pub fn trace_falloff(distance: f32, range: f32, light_falloff: f32) -> f32 {
    if distance > range {
        return 0.0;
    }
    (1.0 + distance).powf(-2.0 * light_falloff)
}
