//! Sub-voxel geometry for blocks that do not fill their cell.
//!
//! Every test runs in block-local coordinates: the voxel occupies the unit
//! cube and the ray origin has already been translated. Hits report the
//! normal facing the incoming ray.

use glam::Vec4;
use voxen_math::{Aabb, DVec3, Ray};

use crate::material::Material;
use crate::voxel;

/// Smallest ray parameter accepted as a forward hit.
pub const EPSILON: f64 = 0.000005;

/// Step used to nudge a ray across a boundary it has just reached.
pub const OFFSET: f64 = 0.0001;

/// A hit on sub-voxel geometry.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LocalHit {
    /// Distance along the (unnormalized) ray direction.
    pub t: f64,
    pub normal: DVec3,
    pub u: f64,
    pub v: f64,
    /// Texture colour at the hit, alpha included.
    pub color: Vec4,
}

/// Signature of a per-block intersection routine.
pub type LocalIntersect = fn(&Material, &Ray, u32) -> Option<LocalHit>;

/// Texture coordinates of a point on an axis-aligned face.
pub fn face_uv(p: DVec3, normal: DVec3) -> (f64, f64) {
    if normal.y != 0.0 {
        (p.x, p.z)
    } else if normal.x != 0.0 {
        (p.z, p.y)
    } else {
        (p.x, p.y)
    }
}

/// Double-sided Möller-Trumbore test. Returns the ray parameter.
pub fn triangle(ray: &Ray, v0: DVec3, v1: DVec3, v2: DVec3) -> Option<f64> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let h = ray.direction.cross(edge2);
    let a = edge1.dot(h);

    // Ray is parallel to triangle
    if a.abs() < 1e-12 {
        return None;
    }

    let f = 1.0 / a;
    let s = ray.origin - v0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * ray.direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(q);
    (t > EPSILON).then_some(t)
}

fn facing(normal: DVec3, direction: DVec3) -> DVec3 {
    if normal.dot(direction) > 0.0 {
        -normal
    } else {
        normal
    }
}

/// Solid box, hit from outside only.
fn solid_box(material: &Material, ray: &Ray, bounds: Aabb) -> Option<LocalHit> {
    let hit = bounds.intersect(ray)?;
    if hit.t_enter < -EPSILON {
        return None;
    }
    let t = hit.t_enter.max(0.0);
    let normal = Aabb::face_normal(hit.enter_axis, ray.direction);
    let p = ray.at(t);
    let (u, v) = face_uv(p, normal);
    Some(LocalHit {
        t,
        normal,
        u,
        v,
        color: material.face_texture(normal).sample(u, v),
    })
}

/// Half block; metadata bit 3 selects the upper half.
pub fn slab(material: &Material, ray: &Ray, value: u32) -> Option<LocalHit> {
    let (y0, y1) = if voxel::data(value) & 8 != 0 {
        (0.5, 1.0)
    } else {
        (0.0, 0.5)
    };
    solid_box(
        material,
        ray,
        Aabb::from_points(DVec3::new(0.0, y0, 0.0), DVec3::new(1.0, y1, 1.0)),
    )
}

/// Thin upright stick.
pub fn torch(material: &Material, ray: &Ray, _value: u32) -> Option<LocalHit> {
    solid_box(
        material,
        ray,
        Aabb::from_points(
            DVec3::new(7.0 / 16.0, 0.0, 7.0 / 16.0),
            DVec3::new(9.0 / 16.0, 10.0 / 16.0, 9.0 / 16.0),
        ),
    )
}

/// Two diagonal alpha-tested quads.
pub fn cross(material: &Material, ray: &Ray, _value: u32) -> Option<LocalHit> {
    let texture = material.face_texture(DVec3::X);
    let planes = [
        // x == z
        (DVec3::new(1.0, 0.0, -1.0) * std::f64::consts::FRAC_1_SQRT_2, 0.0),
        // x == 1 - z
        (DVec3::new(1.0, 0.0, 1.0) * std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2),
    ];

    let mut best: Option<LocalHit> = None;
    for (n, offset) in planes {
        let denom = n.dot(ray.direction);
        if denom.abs() < 1e-12 {
            continue;
        }
        let t = (offset - n.dot(ray.origin)) / denom;
        if t <= EPSILON || best.map_or(false, |b| t >= b.t) {
            continue;
        }
        let p = ray.at(t);
        if !(0.0..=1.0).contains(&p.x) || !(0.0..=1.0).contains(&p.y) || !(0.0..=1.0).contains(&p.z) {
            continue;
        }
        let (u, v) = (p.x, p.y);
        let color = texture.sample(u, v);
        if color.w > EPSILON as f32 {
            best = Some(LocalHit {
                t,
                normal: facing(n, ray.direction),
                u,
                v,
                color,
            });
        }
    }
    best
}

/// Surface height of a liquid corner level.
pub fn liquid_height(level: u32) -> f64 {
    (14.0 - 1.75 * level.min(voxel::MAX_CORNER_LEVEL) as f64) / 16.0
}

/// (x, z) of each corner in [`voxel::CORNER_SHIFTS`] order.
const CORNERS: [(f64, f64); 4] = [(0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)];

/// Water or lava: a full cube, or a sloped surface over four corner heights.
///
/// Double sided, so it also finds the way out of a liquid voxel.
pub fn liquid(material: &Material, ray: &Ray, value: u32) -> Option<LocalHit> {
    let color = material.texture.average();

    if voxel::is_full_block(value) {
        let hit = Aabb::unit().intersect(ray)?;
        let (t, axis) = if hit.t_enter > EPSILON {
            (hit.t_enter, hit.enter_axis)
        } else if hit.t_exit > EPSILON {
            (hit.t_exit, hit.exit_axis)
        } else {
            return None;
        };
        let normal = Aabb::face_normal(axis, ray.direction);
        let (u, v) = face_uv(ray.at(t), normal);
        return Some(LocalHit {
            t,
            normal,
            u,
            v,
            color,
        });
    }

    let top: [DVec3; 4] = std::array::from_fn(|i| {
        let (x, z) = CORNERS[i];
        DVec3::new(x, liquid_height(voxel::corner(value, i)), z)
    });
    let bottom: [DVec3; 4] = std::array::from_fn(|i| DVec3::new(top[i].x, 0.0, top[i].z));

    let mut faces: Vec<[DVec3; 3]> = vec![
        // surface
        [top[1], top[2], top[0]],
        [top[3], top[0], top[2]],
        // floor
        [bottom[0], bottom[1], bottom[2]],
        [bottom[2], bottom[3], bottom[0]],
    ];
    // walls between consecutive corners
    for i in 0..4 {
        let j = (i + 1) % 4;
        faces.push([bottom[i], bottom[j], top[j]]);
        faces.push([top[j], top[i], bottom[i]]);
    }

    let mut best: Option<(f64, [DVec3; 3])> = None;
    for tri in faces {
        if let Some(t) = triangle(ray, tri[0], tri[1], tri[2]) {
            if best.map_or(true, |(bt, _)| t < bt) {
                best = Some((t, tri));
            }
        }
    }
    let (t, tri) = best?;
    let normal = facing((tri[1] - tri[0]).cross(tri[2] - tri[0]).normalize(), ray.direction);
    let p = ray.at(t);
    let (u, v) = face_uv(p, normal);
    Some(LocalHit {
        t,
        normal,
        u,
        v,
        color,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::MaterialRegistry;
    use crate::material::ids;

    fn registry() -> MaterialRegistry {
        MaterialRegistry::standard()
    }

    #[test]
    fn test_triangle_hit_and_backface() {
        let v0 = DVec3::new(-1.0, -1.0, -1.0);
        let v1 = DVec3::new(1.0, -1.0, -1.0);
        let v2 = DVec3::new(0.0, 1.0, -1.0);

        let ray = Ray::new(DVec3::ZERO, -DVec3::Z);
        let t = triangle(&ray, v0, v1, v2).unwrap();
        assert!((t - 1.0).abs() < 1e-9);

        // from behind: still a hit
        let ray = Ray::new(DVec3::new(0.0, 0.0, -2.0), DVec3::Z);
        assert!(triangle(&ray, v0, v1, v2).is_some());

        // pointing away
        let ray = Ray::new(DVec3::ZERO, DVec3::Z);
        assert!(triangle(&ray, v0, v1, v2).is_none());
    }

    #[test]
    fn test_bottom_slab() {
        let reg = registry();
        let slab_mat = reg.get(ids::STONE_SLAB as u32);

        // from above, lands on the half-height top
        let ray = Ray::new(DVec3::new(0.5, 1.0, 0.5), -DVec3::Y);
        let hit = slab(slab_mat, &ray, ids::STONE_SLAB as u32).unwrap();
        assert!((hit.t - 0.5).abs() < 1e-9);
        assert_eq!(hit.normal, DVec3::Y);

        // passes over the bottom slab sideways
        let ray = Ray::new(DVec3::new(0.0, 0.75, 0.5), DVec3::X);
        assert!(slab(slab_mat, &ray, ids::STONE_SLAB as u32).is_none());

        // upper slab is hit by the same ray
        let upper = voxel::pack(ids::STONE_SLAB, 8);
        assert!(slab(slab_mat, &ray, upper).is_some());
    }

    #[test]
    fn test_full_liquid_exits_from_inside() {
        let reg = registry();
        let water = reg.get(ids::WATER as u32);
        let value = ids::WATER as u32 | voxel::FULL_BLOCK;

        let ray = Ray::new(DVec3::new(0.5, 0.5, 0.5), DVec3::Y);
        let hit = liquid(water, &ray, value).unwrap();
        assert!((hit.t - 0.5).abs() < 1e-9);
        assert_eq!(hit.normal, -DVec3::Y);
    }

    #[test]
    fn test_liquid_surface_height() {
        let reg = registry();
        let water = reg.get(ids::WATER as u32);
        // all corners at level 0: flat surface at 14/16
        let value = voxel::with_corners(ids::WATER as u32, [0; 4]);

        let ray = Ray::new(DVec3::new(0.3, 2.0, 0.6), -DVec3::Y);
        let hit = liquid(water, &ray, value).unwrap();
        assert!((ray.at(hit.t).y - 14.0 / 16.0).abs() < 1e-9);
        assert!(hit.normal.y > 0.99);

        // lowest level
        let value = voxel::with_corners(ids::WATER as u32, [7; 4]);
        let hit = liquid(water, &ray, value).unwrap();
        assert!((ray.at(hit.t).y - liquid_height(7)).abs() < 1e-9);
    }

    #[test]
    fn test_cross_sprite_is_alpha_tested() {
        let reg = registry();
        let grass = reg.get(ids::TALL_GRASS as u32);
        // Straight down the diagonal plane never meets a quad face-on
        let ray = Ray::new(DVec3::new(-1.0, 0.05, 0.5), DVec3::X);
        if let Some(hit) = cross(grass, &ray, ids::TALL_GRASS as u32) {
            assert!(hit.color.w > 0.0);
            assert!(hit.normal.dot(ray.direction) <= 0.0);
        }
    }

    #[test]
    fn test_face_uv() {
        let p = DVec3::new(0.25, 0.5, 0.75);
        assert_eq!(face_uv(p, DVec3::Y), (0.25, 0.75));
        assert_eq!(face_uv(p, -DVec3::X), (0.75, 0.5));
        assert_eq!(face_uv(p, DVec3::Z), (0.25, 0.5));
    }
}
