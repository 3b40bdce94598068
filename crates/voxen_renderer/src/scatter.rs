//! Surface scattering for the path tracer.
//!
//! Every hit picks one of four events with a single uniform draw:
//! specular reflection, diffuse reflection, a refractive interface
//! (Fresnel split between reflection and refraction) or plain
//! transmission through the texture's transparent part.

use std::f64::consts::TAU;

use rand::{Rng, RngCore};
use voxen_core::Material;
use voxen_math::DVec3;

/// Chance of a mirror bounce off water.
pub const WATER_SPECULAR: f64 = 0.46;

/// Chance of a mirror bounce off other shiny materials.
pub const SHINY_SPECULAR: f64 = 0.31;

/// Chance a back-lit sub-surface material still samples the sun.
pub const SUB_SURFACE_PROBABILITY: f64 = 0.3;

/// What happens to a ray at a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scatter {
    Specular,
    Diffuse,
    /// The surface separates media with different indices of refraction.
    Interface,
    /// Straight through the transparent part of the texture.
    Transmit,
}

/// Event probabilities at one hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScatterProbabilities {
    pub specular: f64,
    /// Share of the draw that scatters diffusely, already scaled by
    /// what is left after the specular share.
    pub diffuse: f64,
}

impl ScatterProbabilities {
    /// Probabilities for `material` where the texture alpha is `alpha`.
    pub fn new(material: &Material, alpha: f64) -> Self {
        let specular = if material.is_water() {
            WATER_SPECULAR
        } else if material.shiny {
            SHINY_SPECULAR
        } else {
            0.0
        };
        Self {
            specular,
            diffuse: (1.0 - specular) * alpha.clamp(0.0, 1.0),
        }
    }

    /// True if nothing at this hit can scatter the ray.
    pub fn is_empty(&self) -> bool {
        self.specular + self.diffuse < voxen_core::EPSILON
    }

    /// Pick the event for a uniform draw `r` in [0, 1).
    pub fn choose(&self, r: f64, n1: f64, n2: f64) -> Scatter {
        if r < self.specular {
            Scatter::Specular
        } else if r < self.specular + self.diffuse {
            Scatter::Diffuse
        } else if n1 != n2 {
            Scatter::Interface
        } else {
            Scatter::Transmit
        }
    }
}

/// Mirror `d` about `n`.
#[inline]
pub fn reflect(d: DVec3, n: DVec3) -> DVec3 {
    d - 2.0 * d.dot(n) * n
}

/// Cosine-weighted direction in the hemisphere around `n`.
pub fn diffuse_direction(n: DVec3, rng: &mut dyn RngCore) -> DVec3 {
    let x1: f64 = rng.gen();
    let x2: f64 = rng.gen();
    let r = x1.sqrt();
    let theta = TAU * x2;

    let tx = r * theta.cos();
    let ty = r * theta.sin();
    let tz = (1.0 - x1).sqrt();

    // tangent frame
    let helper = if n.x.abs() > 0.1 { DVec3::Y } else { DVec3::X };
    let u = helper.cross(n).normalize();
    let v = n.cross(u);

    (u * tx + v * ty + n * tz).normalize()
}

/// Schlick's approximation of the Fresnel reflectance.
pub fn schlick(n1n2: f64, cos_theta: f64) -> f64 {
    let r0 = ((n1n2 - 1.0) / (n1n2 + 1.0)).powi(2);
    r0 + (1.0 - r0) * (1.0 - cos_theta).max(0.0).powi(5)
}

/// Refract `d` through a surface with normal `n` facing the incoming ray,
/// where `n1n2` is the ratio of the indices of refraction.
///
/// Returns `None` on total internal reflection.
pub fn refract(d: DVec3, n: DVec3, n1n2: f64) -> Option<DVec3> {
    let cos_theta = -n.dot(d);
    let radicand = 1.0 - n1n2 * n1n2 * (1.0 - cos_theta * cos_theta);
    if radicand < voxen_core::EPSILON {
        return None;
    }
    Some((n1n2 * d + (n1n2 * cos_theta - radicand.sqrt()) * n).normalize())
}
