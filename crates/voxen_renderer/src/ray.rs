//! Tracing state carried along a path.
//!
//! Besides origin and direction a ray remembers which material it is in,
//! which one it came from, the colour and emittance picked up at its last
//! hit, and how deep in the path it is.

use voxen_core::geometry::OFFSET;
use voxen_core::voxel::AIR;
use voxen_math::{DVec3, DVec4};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Current position.
    pub o: DVec3,
    /// Direction (unit length).
    pub d: DVec3,
    /// Normal at the last hit, facing the incoming direction.
    pub n: DVec3,
    /// Distance travelled since the ray was spawned.
    pub distance: f64,
    /// Colour at the last hit; `w` is the texture alpha.
    pub color: DVec4,
    pub emittance: DVec3,
    /// Voxel value the ray left at its last hit.
    pub prev_material: u32,
    /// Voxel value the ray is in. `None` until the first voxel is visited.
    pub current_material: Option<u32>,
    pub depth: u32,
    pub u: f64,
    pub v: f64,
    /// Arrived by specular reflection (or is a primary ray).
    pub specular: bool,
    pub hit: bool,
}

impl Ray {
    pub fn new(o: DVec3, d: DVec3) -> Self {
        Self {
            o,
            d,
            n: DVec3::ZERO,
            distance: 0.0,
            color: DVec4::ZERO,
            emittance: DVec3::ZERO,
            prev_material: AIR,
            current_material: None,
            depth: 0,
            u: 0.0,
            v: 0.0,
            specular: true,
            hit: false,
        }
    }

    /// A child ray continuing from this one's hit, one level deeper.
    pub fn spawn(&self) -> Ray {
        Ray {
            o: self.o,
            d: self.d,
            n: self.n,
            distance: 0.0,
            color: DVec4::ZERO,
            emittance: DVec3::ZERO,
            prev_material: self.prev_material,
            current_material: self.current_material,
            depth: self.depth + 1,
            u: 0.0,
            v: 0.0,
            specular: self.specular,
            hit: false,
        }
    }

    /// Material the ray is in, air before the first voxel.
    #[inline]
    pub fn current(&self) -> u32 {
        self.current_material.unwrap_or(AIR)
    }

    /// Move forward by `t`, counting the distance.
    #[inline]
    pub fn advance(&mut self, t: f64) {
        self.o += self.d * t;
        self.distance += t;
    }

    /// Step just past the boundary the ray is on.
    #[inline]
    pub fn nudge(&mut self) {
        self.o += self.d * OFFSET;
    }

    /// Voxel the ray is about to enter.
    #[inline]
    pub fn next_voxel(&self) -> (i32, i32, i32) {
        let p = (self.o + self.d * OFFSET).floor();
        (p.x as i32, p.y as i32, p.z as i32)
    }

    /// The bare line, relative to the corner of voxel (x, y, z).
    pub fn local(&self, x: i32, y: i32, z: i32) -> voxen_math::Ray {
        voxen_math::Ray::new(
            self.o - DVec3::new(x as f64, y as f64, z as f64),
            self.d,
        )
    }

    /// Advance to the far side of a cell of `size` voxels at `corner`,
    /// setting the normal of the plane crossed.
    ///
    /// Returns `false` if no boundary lies ahead.
    pub fn exit_cell(&mut self, corner: DVec3, size: f64) -> bool {
        let mut t_min = f64::INFINITY;
        let mut axis = None;
        for i in 0..3 {
            let t = if self.d[i] > 0.0 {
                (corner[i] + size - self.o[i]) / self.d[i]
            } else if self.d[i] < 0.0 {
                (corner[i] - self.o[i]) / self.d[i]
            } else {
                continue;
            };
            if t > voxen_core::EPSILON && t < t_min {
                t_min = t;
                axis = Some(i);
            }
        }
        match axis {
            Some(i) => {
                self.n = voxen_math::Aabb::face_normal(i, self.d);
                self.advance(t_min);
                true
            }
            None => false,
        }
    }
}

impl Default for Ray {
    fn default() -> Self {
        Self::new(DVec3::ZERO, DVec3::Z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_resets_and_deepens() {
        let mut ray = Ray::new(DVec3::ZERO, DVec3::X);
        ray.color = DVec4::ONE;
        ray.distance = 4.0;
        ray.hit = true;
        ray.prev_material = 3;
        ray.current_material = Some(1);

        let child = ray.spawn();
        assert_eq!(child.depth, 1);
        assert_eq!(child.distance, 0.0);
        assert_eq!(child.color, DVec4::ZERO);
        assert!(!child.hit);
        assert_eq!(child.prev_material, 3);
        assert_eq!(child.current(), 1);
    }

    #[test]
    fn test_exit_cell() {
        let mut ray = Ray::new(DVec3::new(0.5, 0.25, 0.5), DVec3::new(0.0, 1.0, 0.0));
        assert!(ray.exit_cell(DVec3::ZERO, 1.0));
        assert!((ray.o.y - 1.0).abs() < 1e-12);
        assert!((ray.distance - 0.75).abs() < 1e-12);
        assert_eq!(ray.n, -DVec3::Y);
        assert_eq!(ray.next_voxel(), (0, 1, 0));
    }

    #[test]
    fn test_exit_larger_cell_diagonal() {
        let d = DVec3::new(1.0, 0.0, -1.0).normalize();
        let mut ray = Ray::new(DVec3::new(1.0, 1.0, 2.0), d);
        assert!(ray.exit_cell(DVec3::ZERO, 4.0));
        // z reaches 0 before x reaches 4
        assert!(ray.o.z.abs() < 1e-9);
        assert_eq!(ray.n, DVec3::Z);
    }

    #[test]
    fn test_current_defaults_to_air() {
        let ray = Ray::default();
        assert_eq!(ray.current(), AIR);
        assert!(ray.current_material.is_none());
        assert!(ray.specular);
    }
}
