//! Depth Jitter Texture
//!
//! A small single-channel tile (usually blue noise) that offsets each froxel's
//! sample depth inside its slice. The tile is rotated every frame by the golden
//! ratio so temporal accumulation sees a low-discrepancy sequence.

use std::path::Path;

use crate::error::Result;

/// Fractional part of the golden ratio.
pub const GOLDEN_RATIO_FRACT: f32 = 0.618_034;

#[derive(Clone, Debug, PartialEq)]
pub struct JitterTexture {
    width: u32,
    height: u32,
    values: Vec<u8>,
}

impl JitterTexture {
    /// Wrap raw R8 values. Returns `None` when the size does not match.
    pub fn from_raw(width: u32, height: u32, values: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 || values.len() != (width * height) as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            values,
        })
    }

    /// Decode an encoded image (PNG), keeping the luminance channel.
    pub fn from_image_bytes(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes)?.into_luma8();
        let (width, height) = img.dimensions();
        Ok(Self {
            width,
            height,
            values: img.into_raw(),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let img = image::open(path)?.into_luma8();
        let (width, height) = img.dimensions();
        Ok(Self {
            width,
            height,
            values: img.into_raw(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.values
    }

    /// Offset in `[0, 1)` for froxel column `(x, y)` on `frame`.
    pub fn offset(&self, x: u32, y: u32, frame: u32) -> f32 {
        let v = self.values[((y % self.height) * self.width + (x % self.width)) as usize];
        let base = v as f32 / 256.0;
        frame_rotation(base, frame)
    }
}

/// Rotate a jitter value by `frame` steps of the golden ratio, wrapped to `[0, 1)`.
pub fn frame_rotation(value: f32, frame: u32) -> f32 {
    let rotated = value + (frame % 1024) as f32 * GOLDEN_RATIO_FRACT;
    rotated - rotated.floor()
}
