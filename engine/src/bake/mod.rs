//! Voxel Baking
//!
//! Turns scene meshes into a dense albedo/occupancy grid. Both backends share
//! the same stages: clear the accumulation arena, rasterize each submesh's
//! meta scratch, accumulate per-triangle voxel samples, finalize the means.

pub mod accumulation;
pub mod baker;
pub mod gpu;
pub mod meta;
pub mod output;
pub mod voxelize;

pub use accumulation::{AccumulationArena, FIXED_POINT_SCALE};
pub use baker::{BakeStats, VoxelBaker};
pub use gpu::{GpuVoxelBaker, GpuVoxelizeParams};
pub use meta::{META_SIZE, MetaScratch};
pub use output::BakedVolume;
