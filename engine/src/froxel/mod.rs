//! Froxel Volumetric Fog
//!
//! Camera-aligned froxel grid: inject fog volume media and scene lights per
//! froxel, integrate each column front to back, then composite over the
//! scene. [`FroxelRenderer`] runs on the CPU; [`GpuFroxelRenderer`] records
//! the same passes as compute kernels and a fullscreen draw.

pub mod buffers;
pub mod composite;
pub mod gpu;
pub mod inject;
pub mod integrate;
pub mod media;
pub mod renderer;
pub mod slicing;

pub use buffers::{
    FrameInputs, FroxelLight, FroxelParams, FroxelVolume, MAX_FROXEL_VOLUMES, collect_froxel_lights,
    pack_volumes,
};
pub use composite::{Compositor, FrameTarget};
pub use gpu::{GpuFrameTargets, GpuFroxelRenderer};
pub use renderer::{FrameOutcome, FrameStats, FroxelRenderer, SkipReason};
pub use slicing::DepthSlicing;
