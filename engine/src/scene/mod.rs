//! Scene inputs supplied by the host: meshes, materials, lights, and cameras.

pub mod camera;
pub mod light;
pub mod mesh;

pub use camera::{CameraKind, CameraView};
pub use light::{Light, LightKind};
pub use mesh::{Material, SceneMesh, SubMesh, Texture2d};
