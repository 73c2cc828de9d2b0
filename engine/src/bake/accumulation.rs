//! Voxel Accumulation Arena
//!
//! Per-voxel `(sum R, sum G, sum B, count)` counters updated with atomic adds
//! from any number of worker threads. Colors are stored as fixed-point
//! integers so that summation is exact and order-independent: two bakes of the
//! same scene finalize to bit-identical grids no matter how triangles were
//! scheduled.
//!
//! The GPU voxelizer uses the same encoding (`atomic<u32>` x4 per voxel).

use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Vec3, Vec4};

/// Fixed-point scale for color sums (10 fractional bits).
pub const FIXED_POINT_SCALE: f32 = 1024.0;

/// Largest channel value a single sample may contribute.
pub const MAX_SAMPLE_VALUE: f32 = 64.0;

/// Encode one color channel as fixed point, clamped to `[0, MAX_SAMPLE_VALUE]`.
#[inline]
pub fn encode_channel(c: f32) -> u32 {
    let c = if c.is_finite() { c } else { 0.0 };
    (c.clamp(0.0, MAX_SAMPLE_VALUE) * FIXED_POINT_SCALE + 0.5).floor() as u32
}

/// Atomic accumulation buffer, one cell per voxel.
pub struct AccumulationArena {
    cells: Vec<[AtomicU32; 4]>,
}

impl AccumulationArena {
    /// Allocate `voxel_count` zeroed cells.
    pub fn new(voxel_count: usize) -> Self {
        let mut cells = Vec::with_capacity(voxel_count);
        cells.resize_with(voxel_count, Default::default);
        Self { cells }
    }

    /// Number of voxel cells in the arena.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True for an arena sized for an empty grid.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Add one color sample to voxel `index`. Out-of-range indices are ignored.
    #[inline]
    pub fn add(&self, index: usize, color: Vec3) {
        let Some(cell) = self.cells.get(index) else {
            return;
        };
        cell[0].fetch_add(encode_channel(color.x), Ordering::Relaxed);
        cell[1].fetch_add(encode_channel(color.y), Ordering::Relaxed);
        cell[2].fetch_add(encode_channel(color.z), Ordering::Relaxed);
        cell[3].fetch_add(1, Ordering::Relaxed);
    }

    /// Sample count recorded for voxel `index`.
    pub fn count(&self, index: usize) -> u32 {
        self.cells
            .get(index)
            .map_or(0, |c| c[3].load(Ordering::Relaxed))
    }

    /// Divide sums by counts. Voxels with no samples stay at the cleared value
    /// `(0, 0, 0, 0)`; sampled voxels get full occupancy.
    pub fn finalize(self) -> Vec<Vec4> {
        self.cells
            .into_iter()
            .map(|[r, g, b, n]| {
                let n = n.into_inner();
                if n == 0 {
                    return Vec4::ZERO;
                }
                let denom = n as f32 * FIXED_POINT_SCALE;
                Vec4::new(
                    r.into_inner() as f32 / denom,
                    g.into_inner() as f32 / denom,
                    b.into_inner() as f32 / denom,
                    1.0,
                )
            })
            .collect()
    }
}
