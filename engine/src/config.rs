//! Toaster Configuration
//!
//! Typed settings for the three stages (bake, trace, froxel fog). Every struct
//! carries its reference values in `Default`, and `sanitized()` clamps ranged
//! fields back into their documented range. [`ToasterConfig`] bundles all
//! three and round-trips through JSON so hosts can keep presets on disk.

use std::path::Path;

use glam::{UVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::scene::SceneMesh;

// ============================================================================
// Bake
// ============================================================================

/// Discrete resolution tiers. The preset value is the voxel count along the
/// longest bounds axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityPreset {
    Raw,
    Light,
    Burnt,
}

impl QualityPreset {
    pub fn voxels_along_longest_axis(self) -> u32 {
        match self {
            QualityPreset::Raw => 32,
            QualityPreset::Light => 64,
            QualityPreset::Burnt => 128,
        }
    }

    /// Voxel size the preset implies for `bounds_size`.
    pub fn voxel_size_for(self, bounds_size: Vec3) -> f32 {
        bounds_size.max_element() / self.voxels_along_longest_axis() as f32
    }
}

/// Which meshes take part in a bake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BakeFilter {
    /// Skip meshes whose `include_in_bake` flag is off.
    pub respect_include_flag: bool,
    /// Skip surfaces that render the fog itself.
    pub exclude_fog_surfaces: bool,
}

impl Default for BakeFilter {
    fn default() -> Self {
        Self {
            respect_include_flag: true,
            exclude_fog_surfaces: true,
        }
    }
}

impl BakeFilter {
    pub fn accepts(&self, mesh: &SceneMesh) -> bool {
        if self.respect_include_flag && !mesh.include_in_bake {
            return false;
        }
        if self.exclude_fog_surfaces && mesh.is_fog_surface {
            return false;
        }
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BakeSettings {
    /// Voxel edge length in world units.
    pub voxel_size: f32,
    /// Size of the baked box, centered on the baker's position.
    pub bounds_size: Vec3,
    /// When set, overwrites `voxel_size` at the start of every bake.
    pub quality: Option<QualityPreset>,
    pub filter: BakeFilter,
}

impl Default for BakeSettings {
    fn default() -> Self {
        Self {
            voxel_size: 0.25,
            bounds_size: Vec3::new(12.0, 8.0, 12.0),
            quality: None,
            filter: BakeFilter::default(),
        }
    }
}

impl BakeSettings {
    /// Apply the quality preset, if any, to the stored voxel size.
    pub fn apply_quality_preset(&mut self) {
        if let Some(preset) = self.quality {
            self.voxel_size = preset.voxel_size_for(self.bounds_size);
        }
    }
}

// ============================================================================
// Trace
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraceSettings {
    /// Stochastic rays per occupied voxel (4..=256).
    pub rays_per_voxel: u32,
    /// Secondary bounces per ray (1..=5).
    pub max_bounces: u32,
    /// Distance falloff exponent; 1.0 is inverse-square (0.01..=2).
    pub light_falloff: f32,
    /// Fixed seed for reproducible traces; a fresh seed is drawn when `None`.
    pub seed: Option<u64>,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            rays_per_voxel: 64,
            max_bounces: 3,
            light_falloff: 0.5,
            seed: None,
        }
    }
}

impl TraceSettings {
    pub fn sanitized(mut self) -> Self {
        self.rays_per_voxel = self.rays_per_voxel.clamp(4, 256);
        self.max_bounces = self.max_bounces.clamp(1, 5);
        self.light_falloff = self.light_falloff.clamp(0.01, 2.0);
        self
    }
}

// ============================================================================
// Froxel fog
// ============================================================================

/// Alternate outputs of the composite step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FroxelDebugMode {
    #[default]
    None,
    /// Raw per-frame in-scattered radiance.
    Scattering,
    /// Raw per-frame extinction coefficient.
    Extinction,
    /// Accumulated transmittance.
    Transmittance,
    /// Normalized depth-slice coordinate.
    DepthSlice,
}

impl FroxelDebugMode {
    /// Integer code shared with the composite shader.
    pub fn code(self) -> u32 {
        match self {
            FroxelDebugMode::None => 0,
            FroxelDebugMode::Scattering => 1,
            FroxelDebugMode::Extinction => 2,
            FroxelDebugMode::Transmittance => 3,
            FroxelDebugMode::DepthSlice => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FroxelSettings {
    /// Froxel grid size (screen x, screen y, depth slices).
    pub resolution: UVec3,
    pub near_plane: f32,
    pub max_distance: f32,
    /// 0 = logarithmic slices, 1 = linear slices.
    pub depth_uniformity: f32,
    pub fog_density: f32,
    pub fog_intensity: f32,
    pub scattering_albedo: f32,
    pub ambient_color: Vec3,
    /// Scene lights injected per frame (0..=32).
    pub max_lights: u32,
    /// Henyey-Greenstein g, kept inside (-0.99, 0.99).
    pub scatter_anisotropy: f32,
    /// Extra density near lights, producing glow halos.
    pub light_density_boost: f32,
    pub enable_height_fog: bool,
    pub height_fog_base: f32,
    pub height_fog_top: f32,
    pub enable_temporal: bool,
    /// Weight of the fresh sample when blending with history (0.01..=1).
    pub temporal_blend_alpha: f32,
    pub debug_mode: FroxelDebugMode,
}

impl Default for FroxelSettings {
    fn default() -> Self {
        Self {
            resolution: UVec3::new(160, 90, 128),
            near_plane: 0.3,
            max_distance: 200.0,
            depth_uniformity: 0.5,
            fog_density: 0.03,
            fog_intensity: 1.0,
            scattering_albedo: 1.0,
            ambient_color: Vec3::new(0.02, 0.02, 0.04),
            max_lights: 16,
            scatter_anisotropy: 0.3,
            light_density_boost: 0.5,
            enable_height_fog: false,
            height_fog_base: 0.0,
            height_fog_top: 10.0,
            enable_temporal: false,
            temporal_blend_alpha: 0.05,
            debug_mode: FroxelDebugMode::None,
        }
    }
}

/// Upper bound on lights a frame can inject.
pub const MAX_FROXEL_LIGHTS: u32 = 32;

impl FroxelSettings {
    pub fn sanitized(mut self) -> Self {
        self.near_plane = self.near_plane.max(1e-3);
        self.max_distance = self.max_distance.max(self.near_plane + 1e-3);
        self.depth_uniformity = self.depth_uniformity.clamp(0.0, 1.0);
        self.fog_density = self.fog_density.max(0.0);
        self.fog_intensity = self.fog_intensity.max(0.0);
        self.scattering_albedo = self.scattering_albedo.clamp(0.0, 1.0);
        self.ambient_color = self.ambient_color.max(Vec3::ZERO);
        self.max_lights = self.max_lights.min(MAX_FROXEL_LIGHTS);
        self.scatter_anisotropy = self.scatter_anisotropy.clamp(-0.99, 0.99);
        self.light_density_boost = self.light_density_boost.max(0.0);
        self.height_fog_top = self.height_fog_top.max(self.height_fog_base);
        self.temporal_blend_alpha = self.temporal_blend_alpha.clamp(0.01, 1.0);
        self
    }

    pub fn froxel_count(&self) -> usize {
        self.resolution.x as usize * self.resolution.y as usize * self.resolution.z as usize
    }
}

// ============================================================================
// Aggregate
// ============================================================================

/// All tunables in one serializable document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToasterConfig {
    pub bake: BakeSettings,
    pub trace: TraceSettings,
    pub froxel: FroxelSettings,
}

impl ToasterConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn sanitized(self) -> Self {
        Self {
            bake: self.bake,
            trace: self.trace.sanitized(),
            froxel: self.froxel.sanitized(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Material;
    use glam::Vec4;

    #[test]
    fn test_quality_presets() {
        let bounds = Vec3::new(12.0, 8.0, 12.0);
        assert_eq!(QualityPreset::Raw.voxel_size_for(bounds), 12.0 / 32.0);
        assert_eq!(QualityPreset::Light.voxel_size_for(bounds), 12.0 / 64.0);
        assert_eq!(QualityPreset::Burnt.voxel_size_for(bounds), 12.0 / 128.0);
    }

    #[test]
    fn test_preset_overwrites_voxel_size() {
        let mut settings = BakeSettings {
            voxel_size: 0.1,
            quality: Some(QualityPreset::Raw),
            ..Default::default()
        };
        settings.apply_quality_preset();
        assert_eq!(settings.voxel_size, 0.375);
    }

    #[test]
    fn test_filter() {
        let mesh = SceneMesh::cuboid("c", Vec3::ONE, Material::flat("m", Vec4::ONE));
        let filter = BakeFilter::default();
        assert!(filter.accepts(&mesh));

        let mut excluded = mesh.clone();
        excluded.include_in_bake = false;
        assert!(!filter.accepts(&excluded));

        let mut fog = mesh.clone();
        fog.is_fog_surface = true;
        assert!(!filter.accepts(&fog));

        let permissive = BakeFilter {
            respect_include_flag: false,
            exclude_fog_surfaces: false,
        };
        assert!(permissive.accepts(&excluded));
        assert!(permissive.accepts(&fog));
    }

    #[test]
    fn test_trace_sanitized() {
        let s = TraceSettings {
            rays_per_voxel: 1000,
            max_bounces: 0,
            light_falloff: 5.0,
            seed: Some(3),
        }
        .sanitized();
        assert_eq!(s.rays_per_voxel, 256);
        assert_eq!(s.max_bounces, 1);
        assert_eq!(s.light_falloff, 2.0);
        assert_eq!(s.seed, Some(3));
    }

    #[test]
    fn test_froxel_sanitized() {
        let s = FroxelSettings {
            max_lights: 99,
            scatter_anisotropy: 1.0,
            temporal_blend_alpha: 0.0,
            depth_uniformity: 2.0,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(s.max_lights, 32);
        assert_eq!(s.scatter_anisotropy, 0.99);
        assert_eq!(s.temporal_blend_alpha, 0.01);
        assert_eq!(s.depth_uniformity, 1.0);
    }

    #[test]
    fn test_json_missing_fields_default() {
        let config = ToasterConfig::from_json_str(r#"{ "trace": { "rays_per_voxel": 8 } }"#).unwrap();
        assert_eq!(config.trace.rays_per_voxel, 8);
        assert_eq!(config.trace.max_bounces, 3);
        assert_eq!(config.froxel, FroxelSettings::default());
        assert_eq!(config.bake, BakeSettings::default());
    }

    #[test]
    fn test_json_unknown_field_rejected() {
        assert!(ToasterConfig::from_json_str(r#"{ "froxel": { "fog_colour": 1 } }"#).is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = ToasterConfig::default();
        config.bake.quality = Some(QualityPreset::Burnt);
        config.froxel.debug_mode = FroxelDebugMode::Transmittance;
        let json = config.to_json_string().unwrap();
        assert_eq!(ToasterConfig::from_json_str(&json).unwrap(), config);
    }
}
