//! Monte Carlo path tracing over the voxel scene.

use rand::{Rng, RngCore};
use voxen_core::geometry::OFFSET;
use voxen_core::voxel::AIR;
use voxen_math::{DVec3, DVec4};

use crate::intersect::water_displacement;
use crate::scatter::{self, Scatter, ScatterProbabilities, SUB_SURFACE_PROBABILITY};
use crate::{Ray, Scene};

/// Brightness of sunlight scattered by volumetric fog.
const FOG_SCATTER: f64 = 50.0;

impl Scene {
    /// Estimate the radiance arriving along `ray` and store it in
    /// `ray.color`.
    ///
    /// The ray origin is in world coordinates.
    pub fn path_trace(&self, ray: &mut Ray, rng: &mut dyn RngCore) {
        ray.o -= self.origin.as_dvec3();
        let origin = ray.o;
        let direction = ray.d;

        let first_hit = self.trace_path(ray, rng, 1.0, true);

        if let Some(s) = first_hit.filter(|s| *s > 0.0) {
            if self.atmosphere {
                let fex = self.sun.extinction(s);
                ray.color.x *= fex;
                ray.color.y *= fex;
                ray.color.z *= fex;
                if !self.volumetric_fog {
                    let fin = self.sun.inscatter(fex, self.sun.theta(direction));
                    let light = self.sun.emittance() * self.sun.intensity() * fin;
                    ray.color += light.extend(0.0);
                }
            }
            if self.volumetric_fog {
                self.add_fog(ray, origin, direction, s, rng);
            }
        }
    }

    /// Single scattered sun contribution at a random point of the primary
    /// segment.
    fn add_fog(&self, ray: &mut Ray, origin: DVec3, direction: DVec3, s: f64, rng: &mut dyn RngCore) {
        let s = (s - OFFSET) * rng.gen::<f64>();
        let mut shadow = Ray::new(origin + direction * s, self.sun.random_direction(rng));
        shadow.current_material = Some(AIR);
        let attenuation = self.direct_light_attenuation(&mut shadow);
        let fex = self.sun.extinction(s);
        let fin = self.sun.inscatter(fex, self.sun.theta(direction));
        let light = self.sun.emittance() * self.sun.intensity() * fin * attenuation.w * FOG_SCATTER;
        ray.color += light.extend(0.0);
    }

    /// Recursive integrator. Returns the distance to the first surface
    /// when `first` is set and something was hit.
    fn trace_path(&self, ray: &mut Ray, rng: &mut dyn RngCore, add_emitted: f64, first: bool) -> Option<f64> {
        let mut hit = false;
        let mut first_hit = None;

        loop {
            if !self.intersect(ray) && !self.water_plane_intersect(ray) {
                self.sky_color(ray);
                hit = true;
                break;
            }
            let current = self.materials.get(ray.current());
            let prev = self.materials.get(ray.prev_material);

            if !self.still_water
                && ray.n.y != 0.0
                && ((current.is_water() && prev.is_air()) || (current.is_air() && prev.is_water()))
            {
                water_displacement(ray);
            }

            let n1 = prev.ior as f64;
            let n2 = current.ior as f64;
            let alpha = ray.color.w;
            let probabilities = ScatterProbabilities::new(current, alpha);

            if probabilities.is_empty() && n1 == n2 {
                continue;
            }
            if first && first_hit.is_none() {
                first_hit = Some(ray.distance);
            }

            let mut emittance = 0.0;
            if self.emitters_enabled && current.emitter {
                emittance = add_emitted;
                let c = ray.color.truncate();
                ray.emittance = c * c * self.emitter_intensity;
                hit = true;
            }

            match probabilities.choose(rng.gen(), n1, n2) {
                Scatter::Specular => {
                    let mut reflected = self.specular_child(ray);
                    if self.survives(&reflected, rng) && self.trace_path(&mut reflected, rng, 1.0, false).is_some() {
                        ray.emittance = ray.color.truncate() * reflected.emittance;
                        ray.color *= reflected.color;
                        hit = true;
                    }
                }
                Scatter::Diffuse => {
                    hit = true;
                    let direct = if self.sun_enabled {
                        self.sample_sun(ray, current.sub_surface_scattering, rng)
                    } else {
                        0.0
                    };

                    let mut reflected = ray.spawn();
                    reflected.d = scatter::diffuse_direction(ray.n, rng);
                    reflected.o = ray.o + reflected.d * OFFSET;
                    reflected.current_material = Some(ray.prev_material);
                    reflected.specular = false;

                    let sun = self.sun.emittance() * direct;
                    let mut bounce = DVec3::ZERO;
                    if self.survives(&reflected, rng) && self.trace_path(&mut reflected, rng, 0.0, false).is_some() {
                        bounce = reflected.color.truncate() + reflected.emittance;
                    }
                    let light = DVec3::splat(emittance) + sun + bounce;
                    ray.color = (ray.color.truncate() * light).extend(ray.color.w);
                }
                Scatter::Interface => {
                    hit |= self.interface(ray, n1, n2, alpha, current.refracts() || prev.refracts(), rng);
                }
                Scatter::Transmit => {
                    let mut transmitted = ray.spawn();
                    transmitted.o = ray.o + ray.d * OFFSET;
                    if self.survives(&transmitted, rng)
                        && self.trace_path(&mut transmitted, rng, 1.0, false).is_some()
                    {
                        blend_transmitted(ray, alpha, &transmitted);
                        hit = true;
                    }
                }
            }

            if !self.clear_water && prev.is_water() {
                let a = ray.distance / self.water_visibility;
                let attenuation = 1.0 - (a * a).min(1.0);
                ray.color.x *= attenuation;
                ray.color.y *= attenuation;
                ray.color.z *= attenuation;
                hit = true;
            }
            break;
        }

        if !hit {
            ray.color = DVec4::new(0.0, 0.0, 0.0, 1.0);
            return None;
        }
        Some(first_hit.unwrap_or(0.0))
    }

    /// Sky radiance for a ray that left the scene.
    fn sky_color(&self, ray: &mut Ray) {
        let black_below = self.water_height > 0;
        if ray.depth == 0 {
            self.sky.direct_color(ray, &self.sun, self.sun_enabled, black_below);
        } else if ray.specular {
            self.sky.specular_color(ray, &self.sun, self.sun_enabled, black_below);
        } else {
            self.sky.diffuse_color(ray, &self.sun, black_below);
        }
    }

    /// Russian roulette past the configured depth.
    fn survives(&self, child: &Ray, rng: &mut dyn RngCore) -> bool {
        child.depth < self.ray_depth || rng.gen::<f64>() >= 0.5
    }

    fn specular_child(&self, ray: &Ray) -> Ray {
        let mut reflected = ray.spawn();
        reflected.d = scatter::reflect(ray.d, ray.n);
        reflected.o = ray.o + reflected.d * OFFSET;
        reflected.current_material = Some(ray.prev_material);
        reflected.specular = true;
        reflected
    }

    /// Direct sunlight at a diffuse hit, as a cosine weighted visibility.
    fn sample_sun(&self, ray: &Ray, sub_surface: bool, rng: &mut dyn RngCore) -> f64 {
        let d = self.sun.random_direction(rng);
        let cos_theta = d.dot(ray.n);
        let front_light = cos_theta > 0.0;
        if !front_light && !(sub_surface && rng.gen::<f64>() < SUB_SURFACE_PROBABILITY) {
            return 0.0;
        }

        let mut shadow = ray.spawn();
        shadow.d = d;
        shadow.o = if front_light { ray.o } else { ray.o - ray.n * OFFSET };
        shadow.current_material = Some(ray.prev_material);
        let attenuation = self.direct_light_attenuation(&mut shadow);
        if attenuation.w > 0.0 {
            attenuation.w * cos_theta.abs()
        } else {
            0.0
        }
    }

    /// Transmittance towards the sun along `ray`, through translucent
    /// surfaces and water fog.
    pub(crate) fn direct_light_attenuation(&self, ray: &mut Ray) -> DVec4 {
        let mut attenuation = DVec4::ONE;
        while attenuation.w > 0.0 {
            ray.nudge();
            if !self.intersect(ray) {
                break;
            }
            let alpha = ray.color.w;
            let mult = 1.0 - alpha;
            attenuation.x *= ray.color.x * alpha + mult;
            attenuation.y *= ray.color.y * alpha + mult;
            attenuation.z *= ray.color.z * alpha + mult;
            attenuation.w *= mult;
            if !self.clear_water && self.materials.get(ray.prev_material).is_water() {
                let a = ray.distance / self.water_visibility;
                attenuation.w *= 1.0 - (a * a).min(1.0);
            }
        }
        attenuation
    }

    /// Reflect or refract at a boundary between media.
    fn interface(&self, ray: &mut Ray, n1: f64, n2: f64, alpha: f64, refraction: bool, rng: &mut dyn RngCore) -> bool {
        let n1n2 = n1 / n2;
        let cos_theta = -ray.n.dot(ray.d);
        let refracted = if refraction {
            scatter::refract(ray.d, ray.n, n1n2)
        } else {
            Some(ray.d)
        };

        let Some(direction) = refracted else {
            // total internal reflection
            let mut reflected = self.specular_child(ray);
            if self.survives(&reflected, rng) && self.trace_path(&mut reflected, rng, 1.0, false).is_some() {
                ray.color = reflected.color;
                return true;
            }
            return false;
        };

        if rng.gen::<f64>() < scatter::schlick(n1n2, cos_theta) {
            let mut reflected = self.specular_child(ray);
            if self.survives(&reflected, rng) && self.trace_path(&mut reflected, rng, 1.0, false).is_some() {
                ray.color = reflected.color;
                return true;
            }
            return false;
        }

        let mut transmitted = ray.spawn();
        transmitted.d = direction;
        transmitted.o = ray.o + direction * OFFSET;
        if self.survives(&transmitted, rng) && self.trace_path(&mut transmitted, rng, 1.0, false).is_some() {
            blend_transmitted(ray, alpha, &transmitted);
            return true;
        }
        false
    }
}

/// Filter the light coming through a partly transparent surface by its
/// colour.
fn blend_transmitted(ray: &mut Ray, alpha: f64, child: &Ray) {
    let filter = ray.color.truncate() * alpha + DVec3::splat(1.0 - alpha);
    ray.color = (filter * child.color.truncate()).extend(ray.color.w);
    ray.emittance = filter * child.emittance;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;
    use voxen_core::material::ids;
    use voxen_core::Octree;

    fn ground_scene() -> Scene {
        let mut octree = Octree::new(4);
        for x in 0..16 {
            for z in 0..16 {
                octree.set(x, 0, z, ids::STONE as u32);
            }
        }
        let mut scene = Scene::new();
        scene.octree = Arc::new(octree);
        scene
    }

    #[test]
    fn test_empty_scene_is_direct_sky() {
        let mut scene = Scene::new();
        scene.octree = Arc::new(Octree::new(3));
        let mut rng = StdRng::seed_from_u64(1);

        for d in [DVec3::Y, DVec3::new(0.3, 0.2, -0.9).normalize(), DVec3::new(-1.0, -0.4, 0.0).normalize()] {
            let mut ray = Ray::new(DVec3::new(4.0, 4.0, 4.0), d);
            scene.path_trace(&mut ray, &mut rng);

            let mut expected = Ray::new(DVec3::ZERO, d);
            scene.sky().direct_color(&mut expected, scene.sun(), scene.sun_enabled(), false);
            assert!((ray.color - expected.color).length() < 1e-12, "{:?}", d);
        }
    }

    #[test]
    fn test_lit_ground_is_bright() {
        let scene = ground_scene();
        let mut rng = StdRng::seed_from_u64(2);
        let mut sum = DVec3::ZERO;
        for _ in 0..64 {
            let mut ray = Ray::new(DVec3::new(8.5, 8.0, 8.5), DVec3::NEG_Y);
            scene.path_trace(&mut ray, &mut rng);
            assert!(ray.color.is_finite());
            assert!(ray.color.truncate().min_element() >= 0.0);
            sum += ray.color.truncate();
        }
        assert!(sum.max_element() > 0.0);
    }

    #[test]
    fn test_variance_falls_with_samples() {
        let scene = ground_scene();
        let mut rng = StdRng::seed_from_u64(3);

        let estimate = |spp: usize, rng: &mut StdRng| {
            let mut sum = 0.0;
            for _ in 0..spp {
                let mut ray = Ray::new(DVec3::new(8.5, 8.0, 8.5), DVec3::new(0.2, -1.0, 0.1).normalize());
                scene.path_trace(&mut ray, rng);
                sum += ray.color.x;
            }
            sum / spp as f64
        };

        let variance = |spp: usize, rng: &mut StdRng| {
            let runs: Vec<f64> = (0..24).map(|_| estimate(spp, rng)).collect();
            let mean = runs.iter().sum::<f64>() / runs.len() as f64;
            runs.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / runs.len() as f64
        };

        let coarse = variance(2, &mut rng);
        let fine = variance(64, &mut rng);
        assert!(fine < coarse, "{} >= {}", fine, coarse);
    }

    #[test]
    fn test_shadowed_sun_sample() {
        let mut octree = Octree::new(4);
        for x in 0..16 {
            for z in 0..16 {
                octree.set(x, 0, z, ids::STONE as u32);
                octree.set(x, 4, z, ids::STONE as u32);
            }
        }
        let mut scene = Scene::new();
        scene.octree = Arc::new(octree);
        let mut rng = StdRng::seed_from_u64(4);

        let mut ray = Ray::new(DVec3::new(8.5, 1.0, 8.5), DVec3::NEG_Y);
        ray.n = DVec3::Y;
        ray.current_material = Some(AIR);
        for _ in 0..32 {
            assert_eq!(scene.sample_sun(&ray, false, &mut rng), 0.0);
        }
    }

    #[test]
    fn test_first_hit_skips_pass_through_boundary() {
        let mut octree = Octree::new(4);
        for x in 0..16 {
            for z in 0..16 {
                octree.set(x, 0, z, ids::STONE as u32);
                octree.set(x, 4, z, ids::STONE as u32);
            }
        }
        let mut scene = Scene::new();
        scene.octree = Arc::new(octree);
        let mut rng = StdRng::seed_from_u64(6);

        // starts inside the floor, so the first boundary is stone to air
        let mut ray = Ray::new(DVec3::new(8.5, 0.5, 8.5), DVec3::Y);
        let s = scene.trace_path(&mut ray, &mut rng, 1.0, true).unwrap();
        assert!((s - 3.5).abs() < 1e-3, "{}", s);
    }

    #[test]
    fn test_water_fog_keeps_surface_color() {
        let mut octree = Octree::new(4);
        for x in 0..16 {
            for z in 0..16 {
                for y in 0..4 {
                    octree.set(x, y, z, ids::WATER as u32 | voxen_core::voxel::FULL_BLOCK);
                }
            }
        }
        let mut scene = Scene::new();
        scene.octree = Arc::new(octree);
        scene.set_still_water(true);
        let mut rng = StdRng::seed_from_u64(7);

        // past the roulette depth, about half of the children die
        for _ in 0..32 {
            let mut ray = Ray::new(DVec3::new(8.5, 1.5, 8.5), DVec3::Y);
            ray.depth = scene.ray_depth() + 10;
            assert!(scene.trace_path(&mut ray, &mut rng, 1.0, false).is_some());
            assert!(ray.color.truncate().min_element() >= 0.0);
        }
    }

    #[test]
    fn test_roulette_only_past_depth() {
        let scene = Scene::new();
        let mut rng = StdRng::seed_from_u64(5);
        let mut ray = Ray::default();
        ray.depth = scene.ray_depth() - 1;
        assert!((0..100).all(|_| scene.survives(&ray, &mut rng)));
        ray.depth = scene.ray_depth() + 3;
        assert!(!(0..100).all(|_| scene.survives(&ray, &mut rng)));
    }
}
