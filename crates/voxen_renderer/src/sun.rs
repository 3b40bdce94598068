//! Sun model: direction, disc, Perez skylight and atmospheric scattering.

use std::f64::consts::{FRAC_PI_2, PI};

use rand::{Rng, RngCore};
use voxen_core::description::SunDescription;
use voxen_core::geometry::EPSILON;
use voxen_math::{DVec3, DVec4};

use crate::Ray;

pub const DEFAULT_INTENSITY: f64 = 1.5;
pub const MIN_INTENSITY: f64 = 0.0;
pub const MAX_INTENSITY: f64 = 10.0;

/// Angular radius of the sun.
pub const RADIUS: f64 = 0.03;

/// Gamma used for sun colour and intensity.
pub const GAMMA: f64 = 2.2;

const AMBIENT: f64 = 0.3;
const TURBIDITY: f64 = 2.5;

// Atmosphere coefficients.
const BR: f64 = 0.0002;
const BM: f64 = 0.0009;
const G: f64 = -0.0007;

const X_ZENITH_CHROMA: [[f64; 4]; 3] = [
    [0.00166, -0.00375, 0.00209, 0.0],
    [-0.02903, 0.06377, -0.03203, 0.00394],
    [0.11693, -0.21196, 0.06052, 0.25886],
];
const Y_ZENITH_CHROMA: [[f64; 4]; 3] = [
    [0.00275, -0.00610, 0.00317, 0.0],
    [-0.04214, 0.08970, -0.04153, 0.00516],
    [0.15346, -0.26756, 0.06670, 0.26688],
];
const MD_X: [[f64; 2]; 5] = [
    [-0.0193, -0.2592],
    [-0.0665, 0.0008],
    [-0.0004, 0.2125],
    [-0.0641, -0.8989],
    [-0.0033, 0.0452],
];
const MD_Y: [[f64; 2]; 5] = [
    [-0.0167, -0.2608],
    [-0.0950, 0.0092],
    [-0.0079, 0.2102],
    [-0.0441, -1.6537],
    [-0.0109, 0.0529],
];
const MD_LUM: [[f64; 2]; 5] = [
    [0.1787, -1.4630],
    [-0.3554, 0.4275],
    [-0.0227, 5.3251],
    [0.1206, -2.5771],
    [-0.0670, 0.3703],
];

/// Perez distribution coefficients A..E, one per channel (x, y, Y).
fn perez_coefficients() -> [DVec3; 5] {
    std::array::from_fn(|i| {
        DVec3::new(
            MD_X[i][0] * TURBIDITY + MD_X[i][1],
            MD_Y[i][0] * TURBIDITY + MD_Y[i][1],
            MD_LUM[i][0] * TURBIDITY + MD_LUM[i][1],
        )
    })
}

fn perez(cos_theta: f64, gamma: f64, cos2_gamma: f64, c: &[DVec3; 5], channel: usize) -> f64 {
    let [a, b, cc, d, e] = c.map(|v| v[channel]);
    (1.0 + a * (b / cos_theta).exp()) * (1.0 + cc * (d * gamma).exp() + e * cos2_gamma)
}

fn chroma(sun_theta: f64, m: &[[f64; 4]; 3]) -> f64 {
    let t1 = sun_theta;
    let t2 = t1 * t1;
    let t3 = t1 * t2;
    let row = |r: &[f64; 4]| r[0] * t3 + r[1] * t2 + r[2] * t1 + r[3];
    TURBIDITY * TURBIDITY * row(&m[0]) + TURBIDITY * row(&m[1]) + row(&m[2])
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sun {
    /// Elevation above the horizon.
    altitude: f64,
    /// Rotation around the vertical axis.
    azimuth: f64,
    intensity: f64,
    /// Linear colour.
    color: DVec3,

    su: DVec3,
    sv: DVec3,
    sw: DVec3,
    emittance: DVec3,
    coefficients: [DVec3; 5],
    zenith: DVec3,
    f0: DVec3,
}

impl Sun {
    pub fn new() -> Self {
        let mut sun = Self {
            altitude: PI / 3.0,
            azimuth: PI / 2.5,
            intensity: DEFAULT_INTENSITY,
            color: DVec3::ONE,
            su: DVec3::X,
            sv: DVec3::Z,
            sw: DVec3::Y,
            emittance: DVec3::ONE,
            coefficients: perez_coefficients(),
            zenith: DVec3::ZERO,
            f0: DVec3::ONE,
        };
        sun.update();
        sun
    }

    pub fn from_description(desc: &SunDescription) -> Self {
        let mut sun = Sun::new();
        sun.altitude = desc.altitude;
        sun.azimuth = desc.azimuth;
        sun.intensity = desc.intensity.clamp(MIN_INTENSITY, MAX_INTENSITY);
        sun.color = DVec3::from_array(desc.color);
        sun.update();
        sun
    }

    pub fn to_description(&self) -> SunDescription {
        SunDescription {
            altitude: self.altitude,
            azimuth: self.azimuth,
            intensity: self.intensity,
            color: self.color.to_array(),
        }
    }

    fn update(&mut self) {
        let mut sw = DVec3::new(self.azimuth.cos(), self.altitude.sin(), self.azimuth.sin());
        let r = (sw.x * sw.x + sw.z * sw.z).sqrt();
        let r = (self.altitude.cos() / r).abs();
        sw.x *= r;
        sw.z *= r;

        let su = if sw.x.abs() > 0.1 { DVec3::Y } else { DVec3::X };
        self.sv = sw.cross(su).normalize();
        self.su = self.sv.cross(sw);
        self.sw = sw;

        self.emittance = self.color * self.intensity.powf(GAMMA);
        self.update_skylight();
    }

    fn update_skylight(&mut self) {
        let sun_theta = FRAC_PI_2 - self.altitude;
        let cos_theta = sun_theta.cos();
        let cos2_theta = cos_theta * cos_theta;
        let chi = (4.0 / 9.0 - TURBIDITY / 120.0) * (PI - 2.0 * sun_theta);
        let zenith_lum =
            ((4.0453 * TURBIDITY - 4.9710) * chi.tan() - 0.2155 * TURBIDITY + 2.4192).abs();
        self.zenith = DVec3::new(
            chroma(sun_theta, &X_ZENITH_CHROMA),
            chroma(sun_theta, &Y_ZENITH_CHROMA),
            zenith_lum,
        );
        let c = &self.coefficients;
        self.f0 = DVec3::new(
            1.0 / perez(1.0, sun_theta, cos2_theta, c, 0),
            1.0 / perez(1.0, sun_theta, cos2_theta, c, 1),
            1.0 / perez(1.0, sun_theta, cos2_theta, c, 2),
        );
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn azimuth(&self) -> f64 {
        self.azimuth
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    pub fn color(&self) -> DVec3 {
        self.color
    }

    /// Unit vector towards the sun.
    pub fn direction(&self) -> DVec3 {
        self.sw
    }

    pub fn emittance(&self) -> DVec3 {
        self.emittance
    }

    pub fn set_altitude(&mut self, altitude: f64) {
        self.altitude = altitude;
        self.update();
    }

    pub fn set_azimuth(&mut self, azimuth: f64) {
        self.azimuth = azimuth;
        self.update();
    }

    pub fn set_intensity(&mut self, intensity: f64) {
        self.intensity = intensity.clamp(MIN_INTENSITY, MAX_INTENSITY);
        self.update();
    }

    /// Set the colour from sRGB components in [0, 1].
    pub fn set_color(&mut self, rgb: [f64; 3]) {
        self.color = DVec3::from_array(rgb).powf(GAMMA);
        self.update();
    }

    /// Clear-sky radiance in the direction of `d`.
    ///
    /// Directions below the horizon are mirrored.
    pub fn skylight(&self, d: DVec3) -> DVec4 {
        let d = DVec3::new(d.x, d.y.abs(), d.z);
        let cos_theta = d.y;
        let cos_gamma = d.dot(self.sw).clamp(-1.0, 1.0);
        let gamma = cos_gamma.acos();
        let cos2_gamma = cos_gamma * cos_gamma;
        let c = &self.coefficients;

        let x = self.zenith.x * perez(cos_theta, gamma, cos2_gamma, c, 0) * self.f0.x;
        let y = self.zenith.y * perez(cos_theta, gamma, cos2_gamma, c, 1) * self.f0.y;
        let lum = self.zenith.z * perez(cos_theta, gamma, cos2_gamma, c, 2) * self.f0.z;
        let lum = 1.0 - (-lum / 17.0).exp();

        if y <= EPSILON {
            return DVec4::new(0.0, 0.0, 0.0, 1.0);
        }

        // xyY to XYZ to linear RGB
        let f = lum / y;
        let (cx, cy, cz) = (x * f, lum, (1.0 - x - y) * f);
        DVec4::new(
            3.2410 * cx - 1.5374 * cy - 0.4986 * cz,
            -0.9692 * cx + 1.8760 * cy + 0.0416 * cz,
            0.0556 * cx - 0.2040 * cy + 1.0570 * cz,
            1.0,
        )
    }

    /// Test the ray against the sun disc. On a hit the ray colour is set
    /// to the disc radiance.
    pub fn intersect(&self, ray: &mut Ray) -> bool {
        if ray.d.dot(self.sw) < 0.5 {
            return false;
        }

        let width = RADIUS * 4.0;
        let width2 = width * 2.0;
        let a = FRAC_PI_2 - ray.d.dot(self.su).clamp(-1.0, 1.0).acos() + width;
        if !(0.0..width2).contains(&a) {
            return false;
        }
        let b = FRAC_PI_2 - ray.d.dot(self.sv).clamp(-1.0, 1.0).acos() + width;
        if !(0.0..width2).contains(&b) {
            return false;
        }

        let glow = disc_texture(a / width2, b / width2);
        let e = self.emittance * 10.0 * glow;
        ray.color = DVec4::new(e.x, e.y, e.z, 1.0);
        ray.hit = true;
        true
    }

    /// Scale the ray colour by a clamped Lambert term towards the sun.
    pub fn flat_shading(&self, ray: &mut Ray) {
        let shading = ray.n.dot(self.sw).max(AMBIENT);
        let e = self.emittance * shading;
        ray.color.x *= e.x;
        ray.color.y *= e.y;
        ray.color.z *= e.z;
    }

    /// Uniformly sample a direction inside the sun's solid angle.
    pub fn random_direction(&self, rng: &mut dyn RngCore) -> DVec3 {
        let x1: f64 = rng.gen();
        let x2: f64 = rng.gen();
        let cos_a = 1.0 - x1 + x1 * RADIUS.cos();
        let sin_a = (1.0 - cos_a * cos_a).sqrt();
        let phi = 2.0 * PI * x2;
        (self.su * (phi.cos() * sin_a) + self.sv * (phi.sin() * sin_a) + self.sw * cos_a)
            .normalize()
    }

    /// Atmospheric extinction over distance `s`.
    pub fn extinction(&self, s: f64) -> f64 {
        (-(BR + BM) * s).exp()
    }

    /// Inscattered fraction given the extinction and the cosine between the
    /// view direction and the sun.
    pub fn inscatter(&self, extinction: f64, cos_theta: f64) -> f64 {
        let cos2_theta = cos_theta * cos_theta;
        let brt = (3.0 / (16.0 * PI)) * BR * (1.0 + cos2_theta);
        let bmt = (1.0 / (4.0 * PI)) * BM * ((1.0 - G) * (1.0 - G))
            / (1.0 + G * G + 2.0 * G * cos_theta).powf(1.5);
        ((brt + bmt) / (BR + BM)) * (1.0 - extinction)
    }

    /// Cosine of the angle between `d` and the sun direction.
    pub fn theta(&self, d: DVec3) -> f64 {
        d.dot(self.sw)
    }
}

impl Default for Sun {
    fn default() -> Self {
        Self::new()
    }
}

/// Brightness of the sun sprite at (u, v) in [0, 1]: a solid core with a
/// short glow falling off towards the edge of the sprite.
fn disc_texture(u: f64, v: f64) -> f64 {
    let r = ((u - 0.5).powi(2) + (v - 0.5).powi(2)).sqrt();
    let core = 0.125;
    if r <= core {
        1.0
    } else {
        let t = (r - core) / (0.5 - core);
        (1.0 - t).max(0.0).powi(4) * 0.25
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_direction_is_unit_and_basis_orthonormal() {
        let sun = Sun::new();
        assert!((sun.sw.length() - 1.0).abs() < 1e-12);
        assert!((sun.sw.y - (PI / 3.0).sin()).abs() < 1e-12);
        assert!(sun.su.dot(sun.sw).abs() < 1e-12);
        assert!(sun.sv.dot(sun.sw).abs() < 1e-12);
        assert!(sun.su.dot(sun.sv).abs() < 1e-12);
    }

    #[test]
    fn test_emittance_follows_intensity() {
        let mut sun = Sun::new();
        sun.set_intensity(1.0);
        assert_eq!(sun.emittance(), DVec3::ONE);
        sun.set_intensity(100.0);
        assert_eq!(sun.intensity(), MAX_INTENSITY);
    }

    #[test]
    fn test_intersect_disc() {
        let sun = Sun::new();
        let mut ray = Ray::new(DVec3::ZERO, sun.direction());
        assert!(sun.intersect(&mut ray));
        assert!(ray.hit);
        assert!(ray.color.x > 0.0);

        let mut away = Ray::new(DVec3::ZERO, -sun.direction());
        assert!(!sun.intersect(&mut away));
        assert!(!away.hit);
    }

    #[test]
    fn test_random_direction_within_radius() {
        let sun = Sun::new();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let d = sun.random_direction(&mut rng);
            assert!(d.dot(sun.direction()) >= RADIUS.cos() - 1e-12);
        }
    }

    #[test]
    fn test_skylight_is_finite_and_mirrored() {
        let sun = Sun::new();
        let up = sun.skylight(DVec3::new(0.0, 0.7, 0.7).normalize());
        let down = sun.skylight(DVec3::new(0.0, -0.7, 0.7).normalize());
        assert!(up.is_finite());
        assert!(up.truncate().length() > 0.0);
        assert!((up - down).length() < 1e-12);
    }

    #[test]
    fn test_inscatter_bounds() {
        let sun = Sun::new();
        assert_eq!(sun.extinction(0.0), 1.0);
        let fex = sun.extinction(100.0);
        assert!(fex < 1.0 && fex > 0.0);
        let fin = sun.inscatter(fex, 1.0);
        assert!(fin > 0.0 && fin < 1.0);
    }
}
