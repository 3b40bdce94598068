use crate::DVec3;

/// A geometric ray with origin and direction.
///
/// This is the bare line used by per-block geometry tests. The renderer's
/// tracing state (colour, materials, depth) wraps one of these.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
}

impl Ray {
    /// Create a new ray.
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self { origin, direction }
    }

    /// Get the point along the ray at parameter t.
    ///
    /// Returns: origin + t * direction
    #[inline]
    pub fn at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }

    /// The same line expressed relative to `offset`.
    #[inline]
    pub fn translated(&self, offset: DVec3) -> Ray {
        Ray::new(self.origin - offset, self.direction)
    }
}
