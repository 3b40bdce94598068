//! Ray traversal of the voxel octree and the preview tracer.

use std::f64::consts::TAU;

use voxen_core::geometry::{face_uv, liquid_height, EPSILON, OFFSET};
use voxen_core::material::ids;
use voxen_core::voxel::{self, AIR};
use voxen_core::{Material, Tint};
use voxen_math::{Aabb, DVec3, DVec4, Interval};

use crate::{Ray, Scene};

/// Biome used for tints when biome colours are disabled.
const DEFAULT_BIOME: u8 = 1;

/// The flat water plane sits this far below the configured water height.
const WATER_PLANE_OFFSET: f64 = 0.125;

impl Scene {
    /// Advance the ray to the next material boundary inside the octree.
    ///
    /// Returns `false` if the ray leaves the octree (or never enters it)
    /// without hitting anything. On a hit the ray is positioned at the
    /// boundary with `n`, `color`, `prev_material` and `current_material`
    /// describing it.
    pub fn intersect(&self, ray: &mut Ray) -> bool {
        let mut first = true;
        loop {
            let (x, y, z) = ray.next_voxel();
            let Some(leaf) = self.octree.locate(x, y, z) else {
                ray.current_material = Some(AIR);
                if first && self.enter_octree(ray) {
                    first = false;
                    continue;
                }
                return false;
            };
            first = false;

            let value = leaf.value;
            let prev_value = *ray.current_material.get_or_insert(value);
            ray.prev_material = prev_value;
            ray.current_material = Some(value);
            let current = self.materials.get(value);
            let prev = self.materials.get(prev_value);

            if current.local.is_some() {
                if current.is_water() && prev.is_water() {
                    return self.exit_water(ray);
                }
                if current.is_liquid()
                    && prev.id != current.id
                    && enters_below_surface(ray, value, x, y, z)
                {
                    self.intersection_color(ray, x, y, z);
                    return true;
                }
                if self.local_hit(current, ray, value, x, y, z) {
                    if prev.id != current.id {
                        return true;
                    }
                    ray.nudge();
                } else {
                    ray.current_material = Some(AIR);
                    if !ray.exit_cell(voxel_corner(x, y, z), 1.0) {
                        return false;
                    }
                }
                continue;
            }

            if current.id != prev.id {
                self.intersection_color(ray, x, y, z);
                return true;
            }

            let level = leaf.level;
            let corner = voxel_corner(x >> level << level, y >> level << level, z >> level << level);
            if !ray.exit_cell(corner, (1u32 << level) as f64) {
                return false;
            }
        }
    }

    /// Move a ray that starts outside the octree onto its boundary.
    fn enter_octree(&self, ray: &mut Ray) -> bool {
        let size = self.octree.size() as f64;
        let bounds = Aabb::new(
            Interval::new(0.0, size),
            Interval::new(0.0, size),
            Interval::new(0.0, size),
        );
        match bounds.intersect(&voxen_math::Ray::new(ray.o, ray.d)) {
            Some(hit) if hit.t_enter > EPSILON => {
                ray.advance(hit.t_enter);
                ray.n = Aabb::face_normal(hit.enter_axis, ray.d);
                true
            }
            _ => false,
        }
    }

    /// Find where a ray inside water leaves it.
    fn exit_water(&self, ray: &mut Ray) -> bool {
        loop {
            let (x, y, z) = ray.next_voxel();
            let Some(leaf) = self.octree.locate(x, y, z) else {
                ray.prev_material = ray.current();
                ray.current_material = Some(AIR);
                ray.color = DVec4::new(1.0, 1.0, 1.0, 0.0);
                return true;
            };
            let value = leaf.value;
            let material = self.materials.get(value);

            if !material.is_water() {
                // left through a cell face
                ray.prev_material = ray.current();
                ray.current_material = Some(value);
                if material.local.is_some() {
                    if self.local_hit(material, ray, value, x, y, z) {
                        return true;
                    }
                    ray.current_material = Some(AIR);
                    ray.color = DVec4::new(1.0, 1.0, 1.0, 0.0);
                    return true;
                }
                self.intersection_color(ray, x, y, z);
                return true;
            }

            ray.current_material = Some(value);
            if self.local_hit(material, ray, value, x, y, z) {
                let p = (ray.o + ray.d * OFFSET).floor();
                if (p.x as i32, p.y as i32, p.z as i32) == (x, y, z) {
                    // through the free surface into the air above it
                    ray.prev_material = value;
                    ray.current_material = Some(AIR);
                    ray.color = DVec4::new(1.0, 1.0, 1.0, 0.0);
                    return true;
                }
                continue;
            }
            if !ray.exit_cell(voxel_corner(x, y, z), 1.0) {
                return false;
            }
        }
    }

    /// Run the sub-voxel geometry of `material` for voxel (x, y, z) and move
    /// the ray to the hit.
    fn local_hit(&self, material: &Material, ray: &mut Ray, value: u32, x: i32, y: i32, z: i32) -> bool {
        let Some(local) = material.local else {
            return false;
        };
        let Some(hit) = local(material, &ray.local(x, y, z), value) else {
            return false;
        };
        ray.advance(hit.t);
        ray.n = hit.normal;
        ray.u = hit.u;
        ray.v = hit.v;
        ray.color = hit.color.as_dvec4();
        self.apply_tint(material, x, z, ray);
        true
    }

    /// Colour of a full block face the ray has just reached.
    fn intersection_color(&self, ray: &mut Ray, x: i32, y: i32, z: i32) {
        if ray.current() == AIR {
            ray.color = DVec4::new(1.0, 1.0, 1.0, 0.0);
            return;
        }
        let material = self.materials.get(ray.current());
        let local = (ray.o - voxel_corner(x, y, z)).clamp(DVec3::ZERO, DVec3::ONE);
        let (u, v) = face_uv(local, ray.n);
        ray.u = u;
        ray.v = v;
        ray.color = material.face_texture(ray.n).sample(u, v).as_dvec4();
        self.apply_tint(material, x, z, ray);
    }

    /// Multiply in the grass or foliage colour of the column.
    fn apply_tint(&self, material: &Material, x: i32, z: i32, ray: &mut Ray) {
        let Some(tint) = material.tinted(ray.n) else {
            return;
        };
        let color = match (tint, self.biome_colors) {
            (Tint::Grass, true) => self.grass_texture.get(x, z),
            (Tint::Foliage, true) => self.foliage_texture.get(x, z),
            (Tint::Grass, false) => self.biomes.grass(DEFAULT_BIOME),
            (Tint::Foliage, false) => self.biomes.foliage(DEFAULT_BIOME),
            (Tint::None, _) => return,
        };
        ray.color.x *= color[0] as f64;
        ray.color.y *= color[1] as f64;
        ray.color.z *= color[2] as f64;
    }

    /// Height of the flat water plane in octree coordinates, if enabled.
    pub(crate) fn water_plane(&self) -> Option<f64> {
        (self.water_height > 0)
            .then(|| (self.water_height - self.origin.y) as f64 - WATER_PLANE_OFFSET)
    }

    /// Hit the flat water plane after a miss, if the ray is above it and
    /// heading down.
    pub(crate) fn water_plane_intersect(&self, ray: &mut Ray) -> bool {
        let Some(plane) = self.water_plane() else {
            return false;
        };
        if ray.d.y >= 0.0 || ray.o.y <= plane {
            return false;
        }
        let t = (plane - ray.o.y) / ray.d.y;
        ray.advance(t);
        let water = ids::WATER as u32;
        ray.prev_material = AIR;
        ray.current_material = Some(water);
        ray.n = DVec3::Y;
        let (u, v) = (ray.o.x.rem_euclid(1.0), ray.o.z.rem_euclid(1.0));
        ray.u = u;
        ray.v = v;
        ray.color = self.materials.get(water).texture.average().as_dvec4();
        true
    }

    /// Preview shading: first visible surface lit by the sun, or the sky.
    ///
    /// The ray origin is in world coordinates.
    pub fn quick_trace(&self, ray: &mut Ray) {
        ray.o -= self.origin.as_dvec3();

        loop {
            if !self.intersect(ray) {
                self.water_plane_intersect(ray);
                break;
            }
            let current = ray.current();
            if self.materials.get(current).is_water() || (current != AIR && ray.color.w > 0.0) {
                break;
            }
            ray.nudge();
        }

        if ray.current() == AIR {
            self.sky.specular_color(ray, &self.sun, self.sun_enabled, false);
        } else {
            ray.hit = true;
            self.sun.flat_shading(ray);
        }
    }
}

/// True if a ray on the boundary of liquid voxel (x, y, z) passes into the
/// liquid body through a cell face rather than through the free surface.
fn enters_below_surface(ray: &Ray, value: u32, x: i32, y: i32, z: i32) -> bool {
    if voxel::is_full_block(value) {
        return true;
    }
    // highest corner level is the lowest point of the surface
    let level = (0..4).map(|i| voxel::corner(value, i)).max().unwrap_or(0);
    let p = ray.o + ray.d * OFFSET - voxel_corner(x, y, z);
    let inside = |v: f64| (0.0..=1.0).contains(&v);
    inside(p.x) && inside(p.z) && p.y < liquid_height(level)
}

#[inline]
fn voxel_corner(x: i32, y: i32, z: i32) -> DVec3 {
    DVec3::new(x as f64, y as f64, z as f64)
}

/// Perturb the normal of a horizontal water surface with procedural ripples.
///
/// Two octaves: one repeating every 16 blocks, one every 2 blocks.
pub(crate) fn water_displacement(ray: &mut Ray) {
    let (x1, z1) = ripple(ray.o.x / 16.0, ray.o.z / 16.0);
    let (x2, z2) = ripple(ray.o.x / 2.0, ray.o.z / 2.0);
    let up = if ray.n.y < 0.0 { -0.15 } else { 0.15 };
    ray.n = DVec3::new(x1 + x2 / 2.0, up, z1 + z2 / 2.0).normalize();
}

/// Slope of a periodic height field at (x, z), period 1.
fn ripple(x: f64, z: f64) -> (f64, f64) {
    let a = TAU * x.rem_euclid(1.0);
    let b = TAU * z.rem_euclid(1.0);
    let dx = 0.5 * a.cos() * b.sin() + 0.5 * (2.0 * a + b).cos();
    let dz = 0.5 * a.sin() * b.cos() + 0.25 * (2.0 * a + b).cos() + 0.25 * (3.0 * b - a).cos();
    (0.06 * dx, 0.06 * dz)
}
