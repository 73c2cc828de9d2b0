//! Toaster Engine Library
//!
//! Voxel-baked participating media for real-time renderers. Three stages
//! feed each other:
//!
//! - [`bake`] - Voxelize scene meshes into an albedo/occupancy grid
//! - [`trace`] - Stochastic light tracing into a lighting grid
//! - [`volume`] - Fog volumes and the registry the renderer snapshots
//! - [`froxel`] - Per-frame froxel fog: inject, integrate, composite
//!
//! Each stage has a CPU backend and a wgpu compute backend that share the
//! same settings ([`config`]) and grid type ([`grid`]).
//!
//! # Example
//!
//! ```ignore
//! use toaster_engine::bake::VoxelBaker;
//! use toaster_engine::config::{BakeSettings, FroxelSettings, TraceSettings};
//! use toaster_engine::froxel::{FrameTarget, FroxelRenderer};
//! use toaster_engine::trace::LightTracer;
//! use toaster_engine::volume::{Volume, VolumeRegistry};
//!
//! // Bake and light a volume once
//! let mut baker = VoxelBaker::new(center, BakeSettings::default());
//! baker.bake(&meshes)?;
//! let mut tracer = LightTracer::new(baker.output(), TraceSettings::default());
//! tracer.trace(&lights)?;
//!
//! // Register it for the froxel renderer
//! let mut registry = VolumeRegistry::new();
//! registry.insert(Volume::new(baker.output()).with_density(2.0));
//!
//! // Every frame
//! let mut fog = FroxelRenderer::new(FroxelSettings::default())?;
//! let mut frame = FrameTarget::new(width, height, color, depth)?;
//! fog.render(&camera, &registry, &lights, &mut frame);
//! ```

pub mod bake;
pub mod config;
pub mod error;
pub mod froxel;
pub mod gpu;
pub mod grid;
pub mod jitter;
pub mod parallel;
pub mod scene;
pub mod trace;
pub mod volume;

pub use config::{BakeSettings, FroxelSettings, ToasterConfig, TraceSettings};
pub use error::{Result, ToasterError};
pub use grid::VoxelGrid;
