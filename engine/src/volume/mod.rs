//! Fog volumes and the registry the froxel renderer reads each frame.

pub mod fog_volume;
pub mod registry;

pub use fog_volume::{Volume, VolumeId};
pub use registry::{ResolvedVolume, VolumeRegistry, VolumeSnapshot};
