//! Voxen math - shared geometric types.
//!
//! Re-exports glam and adds the small set of double precision primitives
//! used by voxel traversal and per-block geometry: [`Ray`], [`Interval`]
//! and [`Aabb`].

// Re-export glam for convenience
pub use glam::*;

mod aabb;
mod interval;
mod ray;

pub use aabb::{Aabb, AabbHit};
pub use interval::Interval;
pub use ray::Ray;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dvec3_floor_to_ivec() {
        let p = DVec3::new(-0.5, 1.999, 3.0);
        let cell = p.floor().as_ivec3();
        assert_eq!(cell, IVec3::new(-1, 1, 3));
    }

    #[test]
    fn test_dvec3_operations() {
        let a = DVec3::new(1.0, 2.0, 3.0);
        let b = DVec3::new(4.0, 5.0, 6.0);
        assert_eq!(a + b, DVec3::new(5.0, 7.0, 9.0));
        assert_eq!(a.dot(b), 32.0);
    }
}
