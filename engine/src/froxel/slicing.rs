//! Froxel Depth Slicing
//!
//! Maps normalized slice coordinates `t ∈ [0, 1]` to view depth between the
//! near plane and the maximum fog distance. The mapping blends logarithmic and
//! linear spacing:
//!
//! ```text
//! depth(t) = lerp(near * (far / near)^t, near + (far - near) * t, uniformity)
//! ```
//!
//! Uniformity 0 places more slices near the camera where detail matters; 1
//! gives equal-thickness slices. The inject and composite stages must agree on
//! this mapping, so both go through [`DepthSlicing`].

/// Iterations used by the inverse mapping when no closed form applies.
const INVERSE_ITERATIONS: u32 = 32;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthSlicing {
    pub near: f32,
    pub far: f32,
    /// 0 = logarithmic, 1 = linear.
    pub uniformity: f32,
    pub slices: u32,
}

impl DepthSlicing {
    pub fn new(near: f32, far: f32, uniformity: f32, slices: u32) -> Self {
        Self {
            near,
            far,
            uniformity: uniformity.clamp(0.0, 1.0),
            slices: slices.max(1),
        }
    }

    /// View depth at normalized slice coordinate `t`.
    pub fn depth_at(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        let log = self.near * (self.far / self.near).powf(t);
        let linear = self.near + (self.far - self.near) * t;
        log + (linear - log) * self.uniformity
    }

    /// Normalized slice coordinate of view depth `depth`, clamped to `[0, 1]`.
    ///
    /// `depth_at` is strictly increasing, so the mixed case is solved by
    /// bisection; the pure log and pure linear ends use their closed forms.
    pub fn slice_coord(&self, depth: f32) -> f32 {
        if depth <= self.near {
            return 0.0;
        }
        if depth >= self.far {
            return 1.0;
        }
        if self.uniformity <= 0.0 {
            return (depth / self.near).ln() / (self.far / self.near).ln();
        }
        if self.uniformity >= 1.0 {
            return (depth - self.near) / (self.far - self.near);
        }
        let (mut lo, mut hi) = (0.0f32, 1.0f32);
        for _ in 0..INVERSE_ITERATIONS {
            let mid = 0.5 * (lo + hi);
            if self.depth_at(mid) < depth {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }

    /// Near and far depth bounds of `slice`.
    ///
    /// # Example
    ///
    /// ```
    /// use toaster_engine::froxel::DepthSlicing;
    ///
    /// let slicing = DepthSlicing::new(0.3, 200.0, 0.0, 128);
    /// let (near, far) = slicing.slice_bounds(0);
    /// assert!((near - 0.3).abs() < 1e-6);
    /// assert!(far > near);
    /// ```
    pub fn slice_bounds(&self, slice: u32) -> (f32, f32) {
        let n = self.slices as f32;
        (
            self.depth_at(slice as f32 / n),
            self.depth_at((slice + 1) as f32 / n),
        )
    }

    /// Depth extent of `slice`.
    pub fn thickness(&self, slice: u32) -> f32 {
        let (a, b) = self.slice_bounds(slice);
        b - a
    }

    /// Depth of a sample placed `offset ∈ [0, 1)` of the way through `slice`.
    pub fn sample_depth(&self, slice: u32, offset: f32) -> f32 {
        self.depth_at((slice as f32 + offset) / self.slices as f32)
    }

    /// Thickness of every slice, near to far.
    pub fn thicknesses(&self) -> Vec<f32> {
        (0..self.slices).map(|s| self.thickness(s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        for u in [0.0, 0.5, 1.0] {
            let s = DepthSlicing::new(0.3, 200.0, u, 128);
            assert!((s.depth_at(0.0) - 0.3).abs() < 1e-5);
            assert!((s.depth_at(1.0) - 200.0).abs() < 1e-2);
        }
    }

    #[test]
    fn test_continuity() {
        let s = DepthSlicing::new(0.1, 1000.0, 0.25, 24);
        for i in 0..23 {
            let (_, this_far) = s.slice_bounds(i);
            let (next_near, _) = s.slice_bounds(i + 1);
            assert!(
                (this_far - next_near).abs() < 1e-4,
                "Slice {} far ({}) should match slice {} near ({})",
                i,
                this_far,
                i + 1,
                next_near
            );
        }
    }

    #[test]
    fn test_log_slices_grow() {
        let s = DepthSlicing::new(0.1, 1000.0, 0.0, 24);
        assert!(
            s.thickness(23) > s.thickness(0) * 10.0,
            "last slice ({}) should be much thicker than the first ({})",
            s.thickness(23),
            s.thickness(0)
        );
    }

    #[test]
    fn test_linear_slices_equal() {
        let s = DepthSlicing::new(1.0, 101.0, 1.0, 10);
        for i in 0..10 {
            assert!((s.thickness(i) - 10.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_inverse_matches_forward() {
        for u in [0.0, 0.3, 0.7, 1.0] {
            let s = DepthSlicing::new(0.3, 200.0, u, 128);
            for k in 0..=20 {
                let t = k as f32 / 20.0;
                let back = s.slice_coord(s.depth_at(t));
                assert!((back - t).abs() < 1e-4, "u={u} t={t} back={back}");
            }
        }
    }

    #[test]
    fn test_inverse_clamps() {
        let s = DepthSlicing::new(0.3, 200.0, 0.5, 128);
        assert_eq!(s.slice_coord(0.0), 0.0);
        assert_eq!(s.slice_coord(1.0e6), 1.0);
    }
}
