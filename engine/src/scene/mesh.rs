//! Scene Geometry Inputs
//!
//! Read-only mesh and material data handed to the voxel baker. Meshes keep
//! their vertices in local space; `local_to_world` places them in the scene.

use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3, Vec4};

/// A small RGBA albedo texture sampled with repeat addressing.
#[derive(Clone, Debug)]
pub struct Texture2d {
    pub width: u32,
    pub height: u32,
    /// Linear RGBA texels, row-major, `width * height` entries.
    pub texels: Vec<Vec4>,
}

impl Texture2d {
    /// Build a texture from raw texels. Returns `None` on a size mismatch.
    pub fn new(width: u32, height: u32, texels: Vec<Vec4>) -> Option<Self> {
        if width == 0 || height == 0 || texels.len() != (width * height) as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            texels,
        })
    }

    /// A 1x1 texture of a single color.
    pub fn solid(color: Vec4) -> Self {
        Self {
            width: 1,
            height: 1,
            texels: vec![color],
        }
    }

    /// Nearest-texel sample with repeat wrapping.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let u = uv.x - uv.x.floor();
        let v = uv.y - uv.y.floor();
        let x = ((u * self.width as f32) as u32).min(self.width - 1);
        let y = ((v * self.height as f32) as u32).min(self.height - 1);
        self.texels[(y * self.width + x) as usize]
    }
}

/// Surface description used by the meta-pass emulation.
#[derive(Clone, Debug)]
pub struct Material {
    pub name: String,
    /// Linear base color; alpha is ignored by the baker.
    pub base_color: Vec4,
    /// Linear emitted radiance added on top of albedo.
    pub emission: Vec3,
    /// Optional albedo texture, sampled with UV0.
    pub albedo_texture: Option<Arc<Texture2d>>,
    /// Whether the material can be rendered in albedo/emission (meta) mode.
    /// Submeshes whose material lacks it are skipped during baking.
    pub has_meta_pass: bool,
}

impl Material {
    /// Opaque material with a flat base color.
    pub fn flat(name: impl Into<String>, base_color: Vec4) -> Self {
        Self {
            name: name.into(),
            base_color,
            emission: Vec3::ZERO,
            albedo_texture: None,
            has_meta_pass: true,
        }
    }

    pub fn with_emission(mut self, emission: Vec3) -> Self {
        self.emission = emission;
        self
    }

    pub fn with_texture(mut self, texture: Arc<Texture2d>) -> Self {
        self.albedo_texture = Some(texture);
        self
    }

    pub fn without_meta_pass(mut self) -> Self {
        self.has_meta_pass = false;
        self
    }

    /// Albedo times base color plus emission at texture coordinate `uv`.
    pub fn shade(&self, uv: Vec2) -> Vec3 {
        let albedo = match &self.albedo_texture {
            Some(tex) => tex.sample(uv) * self.base_color,
            None => self.base_color,
        };
        albedo.truncate() + self.emission
    }

    /// Color used when no UV layout is available.
    pub fn flat_color(&self) -> Vec3 {
        self.base_color.truncate() + self.emission
    }
}

/// A contiguous index range drawn with one material.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubMesh {
    /// First index (not triangle) of the range.
    pub index_start: u32,
    /// Number of indices; a multiple of three.
    pub index_count: u32,
    /// Index into [`SceneMesh::materials`]; clamped to the last material.
    pub material: usize,
}

impl SubMesh {
    pub fn triangle_count(&self) -> u32 {
        self.index_count / 3
    }
}

/// Triangle mesh plus its materials and placement.
#[derive(Clone, Debug)]
pub struct SceneMesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub uv0: Option<Vec<Vec2>>,
    /// Lightmap layout; used for the meta raster when present.
    pub uv2: Option<Vec<Vec2>>,
    pub indices: Vec<u32>,
    pub submeshes: Vec<SubMesh>,
    pub materials: Vec<Material>,
    pub local_to_world: Mat4,
    /// Caller-decided participation in baking.
    pub include_in_bake: bool,
    /// Surfaces that render the fog itself; never voxelized.
    pub is_fog_surface: bool,
}

impl SceneMesh {
    /// Single-submesh mesh with one material and no UVs.
    pub fn new(
        name: impl Into<String>,
        positions: Vec<Vec3>,
        indices: Vec<u32>,
        material: Material,
    ) -> Self {
        let index_count = indices.len() as u32;
        Self {
            name: name.into(),
            positions,
            normals: None,
            uv0: None,
            uv2: None,
            indices,
            submeshes: vec![SubMesh {
                index_start: 0,
                index_count,
                material: 0,
            }],
            materials: vec![material],
            local_to_world: Mat4::IDENTITY,
            include_in_bake: true,
            is_fog_surface: false,
        }
    }

    /// Axis-aligned box of `size` centered on the origin (24 vertices, 12 triangles).
    pub fn cuboid(name: impl Into<String>, size: Vec3, material: Material) -> Self {
        let h = size * 0.5;
        // (normal, tangent u, tangent v) per face
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        let mut positions = Vec::with_capacity(24);
        let mut normals = Vec::with_capacity(24);
        let mut uvs = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (n, u, v) in faces {
            let base = positions.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                positions.push((n + u * su + v * sv) * h);
                normals.push(n);
                uvs.push(Vec2::new((su + 1.0) * 0.5, (sv + 1.0) * 0.5));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        let mut mesh = Self::new(name, positions, indices, material);
        mesh.normals = Some(normals);
        mesh.uv0 = Some(uvs);
        mesh
    }

    pub fn with_transform(mut self, local_to_world: Mat4) -> Self {
        self.local_to_world = local_to_world;
        self
    }

    pub fn with_uv0(mut self, uv0: Vec<Vec2>) -> Self {
        self.uv0 = Some(uv0);
        self
    }

    pub fn with_uv2(mut self, uv2: Vec<Vec2>) -> Self {
        self.uv2 = Some(uv2);
        self
    }

    /// UV set used to lay out the meta raster: UV2 if present, else UV0.
    pub fn layout_uvs(&self) -> Option<&[Vec2]> {
        self.uv2
            .as_deref()
            .filter(|uv| uv.len() == self.positions.len())
            .or_else(|| {
                self.uv0
                    .as_deref()
                    .filter(|uv| uv.len() == self.positions.len())
            })
    }

    /// Material for a submesh, clamping the index to the last material.
    pub fn material_for(&self, submesh: &SubMesh) -> Option<&Material> {
        if self.materials.is_empty() {
            return None;
        }
        self.materials.get(submesh.material.min(self.materials.len() - 1))
    }

    /// World-space corners of triangle `tri` within `submesh`, or `None` if
    /// any index is out of range.
    pub fn world_triangle(&self, submesh: &SubMesh, tri: u32) -> Option<[Vec3; 3]> {
        let [a, b, c] = self.triangle_indices(submesh, tri)?;
        let m = self.local_to_world;
        Some([
            m.transform_point3(self.positions[a]),
            m.transform_point3(self.positions[b]),
            m.transform_point3(self.positions[c]),
        ])
    }

    /// Vertex indices of triangle `tri` within `submesh`, bounds-checked.
    pub fn triangle_indices(&self, submesh: &SubMesh, tri: u32) -> Option<[usize; 3]> {
        let start = (submesh.index_start + tri * 3) as usize;
        let idx = self.indices.get(start..start + 3)?;
        let out = [idx[0] as usize, idx[1] as usize, idx[2] as usize];
        if out.iter().any(|&i| i >= self.positions.len()) {
            return None;
        }
        Some(out)
    }

    pub fn triangle_count(&self) -> usize {
        self.submeshes
            .iter()
            .map(|s| s.triangle_count() as usize)
            .sum()
    }
}
