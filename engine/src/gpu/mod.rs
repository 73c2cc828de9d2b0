//! GPU plumbing shared by the compute backends: device context, embedded
//! shaders, and compute pipeline helpers.

pub mod compute;
pub mod context;
pub mod shader_loader;

pub use compute::{ComputeStage, linear_dispatch, workgroup_count};
pub use context::{GpuContext, GpuContextConfig};
