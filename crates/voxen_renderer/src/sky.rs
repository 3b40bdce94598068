//! Sky colour: simulated skylight or a panoramic skymap, plus ground colour
//! below the horizon.

use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::path::Path;
use std::sync::Arc;

use voxen_core::description::SkyDescription;
use voxen_core::geometry::EPSILON;
use voxen_core::texture::TextureResult;
use voxen_core::Texture;
use voxen_math::{DVec3, DVec4};

use crate::sun::Sun;
use crate::Ray;

#[derive(Debug, Clone)]
pub struct Sky {
    skymap: Option<Arc<Texture>>,
    skymap_path: Option<String>,
    /// Rotation of the skymap around the vertical axis.
    rotation: f64,
    /// Mirror the sky below the horizon instead of using the ground colour.
    mirrored: bool,
    ground_color: DVec3,
}

impl Sky {
    pub fn new() -> Self {
        Self {
            skymap: None,
            skymap_path: None,
            rotation: 0.0,
            mirrored: true,
            ground_color: DVec3::new(0.0, 0.0, 1.0),
        }
    }

    /// Build from a description. A skymap that fails to load is logged and
    /// the simulated sky is used instead.
    pub fn from_description(desc: &SkyDescription) -> Self {
        let mut sky = Sky::new();
        sky.rotation = desc.rotation;
        sky.mirrored = desc.mirrored;
        sky.ground_color = DVec3::from_array(desc.ground_color);
        if let Some(path) = &desc.skymap {
            if let Err(err) = sky.load_skymap(Path::new(path)) {
                log::warn!("Could not load skymap {}: {}", path, err);
            }
        }
        sky
    }

    pub fn to_description(&self) -> SkyDescription {
        SkyDescription {
            skymap: self.skymap_path.clone(),
            rotation: self.rotation,
            mirrored: self.mirrored,
            ground_color: self.ground_color.to_array(),
        }
    }

    pub fn load_skymap(&mut self, path: &Path) -> TextureResult<()> {
        log::info!("Loading sky map: {}", path.display());
        let texture = Texture::load(path)?;
        self.set_skymap(texture, Some(path.display().to_string()));
        Ok(())
    }

    pub fn set_skymap(&mut self, texture: Texture, path: Option<String>) {
        self.skymap = Some(Arc::new(texture));
        self.skymap_path = path;
    }

    pub fn unload_skymap(&mut self) {
        self.skymap = None;
        self.skymap_path = None;
    }

    pub fn has_skymap(&self) -> bool {
        self.skymap.is_some()
    }

    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: f64) {
        self.rotation = rotation;
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    pub fn set_mirrored(&mut self, mirrored: bool) {
        self.mirrored = mirrored;
    }

    pub fn ground_color(&self) -> DVec3 {
        self.ground_color
    }

    pub fn set_ground_color(&mut self, color: DVec3) {
        self.ground_color = color;
    }

    /// Sky colour for diffuse paths; the sun disc is not included.
    pub fn diffuse_color(&self, ray: &mut Ray, sun: &Sun, black_below_horizon: bool) {
        if self.ground(ray, black_below_horizon) {
            return;
        }
        ray.color = match &self.skymap {
            None => sun.skylight(ray.d),
            Some(skymap) => {
                let (u, v) = self.panorama_uv(ray.d);
                skymap.sample(u, v).as_dvec4()
            }
        };
        ray.hit = true;
    }

    /// Sky colour seen directly, with bilinear skymap filtering and the sun
    /// disc added on top when `sun_disc` is set.
    pub fn direct_color(&self, ray: &mut Ray, sun: &Sun, sun_disc: bool, black_below_horizon: bool) {
        if self.ground(ray, black_below_horizon) {
            return;
        }
        let disc = sun_disc.then(|| disc_color(ray, sun)).flatten();
        ray.color = match &self.skymap {
            None => sun.skylight(ray.d),
            Some(skymap) => {
                let (u, v) = self.panorama_uv(ray.d);
                skymap.sample_bilinear(u, v).as_dvec4()
            }
        };
        if let Some(disc) = disc {
            ray.color += DVec4::new(disc.x, disc.y, disc.z, 0.0);
        }
        ray.hit = true;
    }

    /// Sky colour for specular paths: diffuse sky plus the sun disc.
    pub fn specular_color(&self, ray: &mut Ray, sun: &Sun, sun_disc: bool, black_below_horizon: bool) {
        let disc = sun_disc.then(|| disc_color(ray, sun)).flatten();
        self.diffuse_color(ray, sun, black_below_horizon);
        if let Some(disc) = disc {
            ray.color += DVec4::new(disc.x, disc.y, disc.z, 0.0);
            ray.hit = true;
        }
    }

    fn ground(&self, ray: &mut Ray, black_below_horizon: bool) -> bool {
        if black_below_horizon && ray.d.y < 0.0 {
            ray.color = DVec4::new(0.0, 0.0, 0.0, 1.0);
        } else if !self.mirrored && ray.d.y < 0.0 {
            ray.color = self.ground_color.extend(1.0);
        } else {
            return false;
        }
        ray.hit = true;
        true
    }

    /// Panorama coordinates: `u` is the rotated heading, `v` the elevation
    /// from the horizon (0) to the zenith (1).
    fn panorama_uv(&self, d: DVec3) -> (f64, f64) {
        let r = d.z * d.z + d.x * d.x;
        let mut theta = if r > EPSILON { (d.z / r.sqrt()).asin() } else { 0.0 };
        if d.x < 0.0 {
            theta = PI - theta;
        }
        theta = (theta + self.rotation).rem_euclid(TAU);
        let phi = d.y.clamp(-1.0, 1.0).asin().abs();
        (theta / TAU, phi / FRAC_PI_2)
    }
}

fn disc_color(ray: &Ray, sun: &Sun) -> Option<DVec4> {
    let mut probe = *ray;
    sun.intersect(&mut probe).then_some(probe.color)
}

impl Default for Sky {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_color_when_not_mirrored() {
        let mut sky = Sky::new();
        sky.set_mirrored(false);
        let sun = Sun::new();

        let mut ray = Ray::new(DVec3::ZERO, DVec3::NEG_Y);
        sky.diffuse_color(&mut ray, &sun, false);
        assert!(ray.hit);
        assert_eq!(ray.color, DVec4::new(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn test_black_below_horizon() {
        let sky = Sky::new();
        let sun = Sun::new();
        let mut ray = Ray::new(DVec3::ZERO, DVec3::new(0.0, -0.5, 0.5).normalize());
        sky.direct_color(&mut ray, &sun, true, true);
        assert_eq!(ray.color, DVec4::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_simulated_sky_matches_skylight() {
        let sky = Sky::new();
        let sun = Sun::new();
        let d = DVec3::new(1.0, 0.3, 0.0).normalize();
        let mut ray = Ray::new(DVec3::ZERO, d);
        sky.diffuse_color(&mut ray, &sun, false);
        assert_eq!(ray.color, sun.skylight(d));
    }

    #[test]
    fn test_sun_disc_adds_to_sky() {
        let sky = Sky::new();
        let sun = Sun::new();
        let mut plain = Ray::new(DVec3::ZERO, sun.direction());
        sky.diffuse_color(&mut plain, &sun, false);
        let mut lit = Ray::new(DVec3::ZERO, sun.direction());
        sky.specular_color(&mut lit, &sun, true, false);
        assert!(lit.color.x > plain.color.x);
    }

    #[test]
    fn test_skymap_lookup() {
        let mut sky = Sky::new();
        // top half red, bottom half green
        let skymap = Texture::from_fn(4, 4, |_, v| {
            if v > 0.5 { [1.0, 0.0, 0.0, 1.0] } else { [0.0, 1.0, 0.0, 1.0] }
        });
        sky.set_skymap(skymap, None);
        let sun = Sun::new();

        let mut up = Ray::new(DVec3::ZERO, DVec3::new(0.1, 0.99, 0.0).normalize());
        sky.diffuse_color(&mut up, &sun, false);
        assert_eq!(up.color, DVec4::new(1.0, 0.0, 0.0, 1.0));

        let mut level = Ray::new(DVec3::ZERO, DVec3::new(1.0, 0.01, 0.0).normalize());
        sky.diffuse_color(&mut level, &sun, false);
        assert_eq!(level.color, DVec4::new(0.0, 1.0, 0.0, 1.0));
    }
}
