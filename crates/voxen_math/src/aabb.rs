use crate::{DVec3, Interval, Ray};

/// Axis-aligned box used for octree bounds and block sub-geometry.
///
/// An AABB is defined by three intervals (one per axis) that bound a 3D volume.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub x: Interval,
    pub y: Interval,
    pub z: Interval,
}

/// Entry and exit parameters of a ray crossing an [`Aabb`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AabbHit {
    /// Ray parameter where the ray enters the box (may be negative if the
    /// origin is inside).
    pub t_enter: f64,
    /// Ray parameter where the ray leaves the box.
    pub t_exit: f64,
    /// Axis of the entry face (0=X, 1=Y, 2=Z).
    pub enter_axis: usize,
    /// Axis of the exit face.
    pub exit_axis: usize,
}

impl Aabb {
    /// Create a new AABB from three intervals.
    pub fn new(x: Interval, y: Interval, z: Interval) -> Self {
        Self { x, y, z }
    }

    /// Create an AABB from two corner points.
    pub fn from_points(a: DVec3, b: DVec3) -> Self {
        Self {
            x: Interval::new(a.x.min(b.x), a.x.max(b.x)),
            y: Interval::new(a.y.min(b.y), a.y.max(b.y)),
            z: Interval::new(a.z.min(b.z), a.z.max(b.z)),
        }
    }

    /// The unit cube [0, 1]^3.
    pub fn unit() -> Self {
        Self::from_points(DVec3::ZERO, DVec3::ONE)
    }

    /// Get the interval for a specific axis (0=X, 1=Y, 2=Z).
    pub fn axis_interval(&self, n: usize) -> Interval {
        match n {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// True if the point lies inside or on the boundary.
    pub fn contains(&self, p: DVec3) -> bool {
        self.x.contains(p.x) && self.y.contains(p.y) && self.z.contains(p.z)
    }

    /// Test if a ray intersects this AABB within the given interval.
    pub fn hit(&self, r: &Ray, ray_t: Interval) -> bool {
        self.intersect(r)
            .map(|h| h.t_enter.max(ray_t.min) < h.t_exit.min(ray_t.max))
            .unwrap_or(false)
    }

    /// Slab test returning the unclipped entry and exit parameters.
    ///
    /// Returns `None` when the line misses the box or the box lies
    /// entirely behind the origin.
    pub fn intersect(&self, r: &Ray) -> Option<AabbHit> {
        let mut hit = AabbHit {
            t_enter: f64::NEG_INFINITY,
            t_exit: f64::INFINITY,
            enter_axis: 0,
            exit_axis: 0,
        };

        for axis in 0..3 {
            let slab = self.axis_interval(axis);
            let origin = r.origin[axis];
            let dir = r.direction[axis];

            if dir == 0.0 {
                if !slab.contains(origin) {
                    return None;
                }
                continue;
            }

            let adinv = 1.0 / dir;
            let mut t0 = (slab.min - origin) * adinv;
            let mut t1 = (slab.max - origin) * adinv;
            if adinv < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }
            if t0 > hit.t_enter {
                hit.t_enter = t0;
                hit.enter_axis = axis;
            }
            if t1 < hit.t_exit {
                hit.t_exit = t1;
                hit.exit_axis = axis;
            }
            if hit.t_exit < hit.t_enter {
                return None;
            }
        }

        if hit.t_exit < 0.0 {
            return None;
        }
        Some(hit)
    }

    /// Unit normal of a face on `axis`, oriented against `direction`.
    pub fn face_normal(axis: usize, direction: DVec3) -> DVec3 {
        let mut n = DVec3::ZERO;
        n[axis] = if direction[axis] > 0.0 { -1.0 } else { 1.0 };
        n
    }
}
