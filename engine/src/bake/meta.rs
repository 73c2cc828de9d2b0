//! Meta-Pass Scratch Raster
//!
//! Renders a submesh's albedo and emission into a small 2D buffer laid out by
//! its lightmap UVs (UV2, else UV0). The voxelizer later looks colors up in
//! this buffer at the interpolated layout UV of each voxel's closest surface
//! point. Texels the raster did not reach carry zero alpha and read back as
//! the material's flat color.

use glam::{Vec2, Vec3, Vec4};

use crate::scene::{Material, SceneMesh, SubMesh};

/// Edge length of the scratch buffer in texels.
pub const META_SIZE: u32 = 256;

/// Dilation passes run after rasterization to close UV seams.
const DILATE_PASSES: u32 = 2;

/// RGBA scratch buffer. Alpha marks covered texels.
pub struct MetaScratch {
    texels: Vec<Vec4>,
    flat_color: Vec3,
}

impl MetaScratch {
    /// Buffer holding only the material's flat color (no UV layout available).
    pub fn flat(material: &Material) -> Self {
        Self {
            texels: Vec::new(),
            flat_color: material.flat_color(),
        }
    }

    /// Rasterize `submesh` of `mesh` in layout-UV space. Falls back to
    /// [`MetaScratch::flat`] when the mesh has no usable UVs.
    pub fn rasterize(mesh: &SceneMesh, submesh: &SubMesh, material: &Material) -> Self {
        let Some(layout) = mesh.layout_uvs() else {
            return Self::flat(material);
        };
        // Material textures are addressed with UV0 even when UV2 drives layout.
        let shading_uvs = mesh
            .uv0
            .as_deref()
            .filter(|uv| uv.len() == mesh.positions.len())
            .unwrap_or(layout);

        let size = META_SIZE as usize;
        let mut texels = vec![Vec4::ZERO; size * size];

        for tri in 0..submesh.triangle_count() {
            let Some([a, b, c]) = mesh.triangle_indices(submesh, tri) else {
                continue;
            };
            let p = [layout[a], layout[b], layout[c]].map(|uv| uv * META_SIZE as f32);
            let s = [shading_uvs[a], shading_uvs[b], shading_uvs[c]];
            raster_triangle(&mut texels, p, |w| {
                let uv = s[0] * w.x + s[1] * w.y + s[2] * w.z;
                material.shade(uv).extend(1.0)
            });
        }

        for _ in 0..DILATE_PASSES {
            dilate(&mut texels);
        }

        Self {
            texels,
            flat_color: material.flat_color(),
        }
    }

    /// Whether this scratch came from a real raster.
    pub fn is_rasterized(&self) -> bool {
        !self.texels.is_empty()
    }

    pub fn flat_color(&self) -> Vec3 {
        self.flat_color
    }

    /// Raw texels (empty for flat scratches).
    pub fn texels(&self) -> &[Vec4] {
        &self.texels
    }

    /// Color at layout UV `uv` (nearest texel, clamped). Uncovered texels and
    /// flat scratches return the flat color.
    pub fn sample(&self, uv: Vec2) -> Vec3 {
        if self.texels.is_empty() {
            return self.flat_color;
        }
        let max = (META_SIZE - 1) as f32;
        let x = (uv.x * META_SIZE as f32).floor().clamp(0.0, max) as usize;
        let y = (uv.y * META_SIZE as f32).floor().clamp(0.0, max) as usize;
        let t = self.texels[y * META_SIZE as usize + x];
        if t.w > 0.0 { t.truncate() } else { self.flat_color }
    }
}

/// Fill every texel whose center lies inside the triangle `p` (texel units).
/// `shade` receives the barycentric weights of the texel center.
fn raster_triangle(texels: &mut [Vec4], p: [Vec2; 3], shade: impl Fn(Vec3) -> Vec4) {
    let area = edge(p[0], p[1], p[2]);
    if area.abs() < 1e-12 {
        return;
    }
    let max = META_SIZE as f32;
    let lo = p[0].min(p[1]).min(p[2]).floor().max(Vec2::ZERO);
    let hi = p[0].max(p[1]).max(p[2]).ceil().min(Vec2::splat(max));

    for y in lo.y as u32..hi.y as u32 {
        for x in lo.x as u32..hi.x as u32 {
            let c = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let w = Vec3::new(
                edge(p[1], p[2], c) / area,
                edge(p[2], p[0], c) / area,
                edge(p[0], p[1], c) / area,
            );
            if w.min_element() >= 0.0 {
                texels[(y * META_SIZE + x) as usize] = shade(w);
            }
        }
    }
}

#[inline]
fn edge(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b - a).perp_dot(c - a)
}

/// Copy covered neighbors into uncovered texels (one ring per call).
fn dilate(texels: &mut [Vec4]) {
    let size = META_SIZE as i32;
    let src = texels.to_vec();
    for y in 0..size {
        for x in 0..size {
            let i = (y * size + x) as usize;
            if src[i].w > 0.0 {
                continue;
            }
            let mut sum = Vec4::ZERO;
            for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= size || ny >= size {
                    continue;
                }
                let n = src[(ny * size + nx) as usize];
                if n.w > 0.0 {
                    sum += n.truncate().extend(1.0);
                }
            }
            if sum.w > 0.0 {
                texels[i] = (sum.truncate() / sum.w).extend(1.0);
            }
        }
    }
}
