//! Light Tracing
//!
//! Computes a lighting grid from a baked albedo grid and the scene's lights.

pub mod gpu;
pub mod lights;
pub mod sampling;
pub mod tracer;
pub mod traversal;

pub use gpu::{GpuLightTracer, GpuTraceParams};
pub use lights::{PackedLights, TraceLight, pack_trace_lights};
pub use tracer::{LightTracer, TraceStats};
