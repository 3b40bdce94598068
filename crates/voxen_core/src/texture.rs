//! Block and sky textures.
//!
//! Pixels are stored as linear RGBA floats. Block textures are sampled
//! nearest-neighbour; sky maps use bilinear filtering.

use std::path::Path;

use glam::Vec4;
use thiserror::Error;

/// Errors that can occur during texture loading.
#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Failed to load texture: {0}")]
    LoadError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decoding error: {0}")]
    ImageError(#[from] image::ImageError),
}

pub type TextureResult<T> = Result<T, TextureError>;

/// A texture with pixel data and a precomputed average colour.
#[derive(Clone, Debug)]
pub struct Texture {
    /// Texture width in pixels
    pub width: u32,

    /// Texture height in pixels
    pub height: u32,

    /// Pixel data in RGBA format (linear, 0-1 range), row-major, top row first
    pub pixels: Vec<[f32; 4]>,

    average: Vec4,
}

impl Texture {
    /// Create a new texture from pixel data.
    ///
    /// Missing pixels are padded with opaque black.
    pub fn new(width: u32, height: u32, mut pixels: Vec<[f32; 4]>) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        pixels.resize((width * height) as usize, [0.0, 0.0, 0.0, 1.0]);
        let sum = pixels
            .iter()
            .fold(Vec4::ZERO, |acc, p| acc + Vec4::from_array(*p));
        let average = sum / pixels.len() as f32;
        Self {
            width,
            height,
            pixels,
            average,
        }
    }

    /// Create a solid color texture (1x1).
    pub fn solid_color(rgba: [f32; 4]) -> Self {
        Self::new(1, 1, vec![rgba])
    }

    /// Build a texture from a function of normalized pixel-centre coordinates.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(f32, f32) -> [f32; 4]) -> Self {
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let u = (x as f32 + 0.5) / width as f32;
                let v = 1.0 - (y as f32 + 0.5) / height as f32;
                pixels.push(f(u, v));
            }
        }
        Self::new(width, height, pixels)
    }

    /// Load a texture from an image file, converting sRGB to linear.
    pub fn load(path: &Path) -> TextureResult<Texture> {
        let img = image::open(path).map_err(|e| {
            TextureError::LoadError(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        let pixels: Vec<[f32; 4]> = rgba
            .pixels()
            .map(|p| {
                [
                    srgb_to_linear(p[0]),
                    srgb_to_linear(p[1]),
                    srgb_to_linear(p[2]),
                    p[3] as f32 / 255.0, // Alpha is linear
                ]
            })
            .collect();

        log::debug!("Loaded texture: {} ({}x{})", path.display(), width, height);
        Ok(Texture::new(width, height, pixels))
    }

    /// Mean of all pixels, alpha included.
    pub fn average(&self) -> Vec4 {
        self.average
    }

    /// Nearest-neighbour lookup at UV coordinates.
    ///
    /// UV coordinates are in [0, 1] range, with (0, 0) at bottom-left.
    pub fn sample(&self, u: f64, v: f64) -> Vec4 {
        let x = ((u * self.width as f64 - 1e-6).max(0.0) as u32).min(self.width - 1);
        let y = (((1.0 - v) * self.height as f64 - 1e-6).max(0.0) as u32).min(self.height - 1);
        Vec4::from_array(self.get_pixel(x, y))
    }

    /// Sample the texture at UV coordinates (bilinear filtering).
    pub fn sample_bilinear(&self, u: f64, v: f64) -> Vec4 {
        let u = u.rem_euclid(1.0) as f32;
        let v = v.clamp(0.0, 1.0) as f32;

        // Convert to pixel coordinates
        let x = u * (self.width as f32 - 1.0);
        let y = (1.0 - v) * (self.height as f32 - 1.0); // Flip V for image coordinates

        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);

        let fx = x.fract();
        let fy = y.fract();

        let p00 = Vec4::from_array(self.get_pixel(x0, y0));
        let p10 = Vec4::from_array(self.get_pixel(x1, y0));
        let p01 = Vec4::from_array(self.get_pixel(x0, y1));
        let p11 = Vec4::from_array(self.get_pixel(x1, y1));

        let top = p00.lerp(p10, fx);
        let bottom = p01.lerp(p11, fx);
        top.lerp(bottom, fy)
    }

    /// Get pixel at integer coordinates.
    fn get_pixel(&self, x: u32, y: u32) -> [f32; 4] {
        let idx = (y * self.width + x) as usize;
        self.pixels
            .get(idx)
            .copied()
            .unwrap_or([0.0, 0.0, 0.0, 1.0])
    }
}

/// Convert sRGB byte value to linear float.
pub fn srgb_to_linear(value: u8) -> f32 {
    let v = value as f32 / 255.0;
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// Linear colour from an sRGB hex triple such as `0x7f9f5a`.
pub fn linear_rgb(hex: u32) -> [f32; 3] {
    [
        srgb_to_linear((hex >> 16) as u8),
        srgb_to_linear((hex >> 8) as u8),
        srgb_to_linear(hex as u8),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_color_texture() {
        let tex = Texture::solid_color([1.0, 0.5, 0.0, 1.0]);
        assert_eq!(tex.width, 1);
        assert_eq!(tex.height, 1);

        let sample = tex.sample(0.5, 0.5);
        assert!((sample.x - 1.0).abs() < 0.001);
        assert!((sample.y - 0.5).abs() < 0.001);
        assert_eq!(tex.average(), sample);
    }

    #[test]
    fn test_nearest_sample_orientation() {
        // top row red, bottom row blue
        let tex = Texture::from_fn(2, 2, |_, v| {
            if v > 0.5 {
                [1.0, 0.0, 0.0, 1.0]
            } else {
                [0.0, 0.0, 1.0, 1.0]
            }
        });
        assert_eq!(tex.sample(0.25, 0.9).x, 1.0);
        assert_eq!(tex.sample(0.25, 0.1).z, 1.0);
        // edges clamp
        assert_eq!(tex.sample(1.0, 1.0).x, 1.0);
        assert_eq!(tex.sample(0.0, 0.0).z, 1.0);
        assert!((tex.average().x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_bilinear_midpoint() {
        let tex = Texture::new(2, 1, vec![[0.0, 0.0, 0.0, 1.0], [1.0, 1.0, 1.0, 1.0]]);
        let mid = tex.sample_bilinear(0.5, 0.5);
        assert!((mid.x - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_srgb_to_linear() {
        assert!((srgb_to_linear(0) - 0.0).abs() < 0.001);
        assert!((srgb_to_linear(255) - 1.0).abs() < 0.001);

        // Mid-gray is darker in linear
        let mid = srgb_to_linear(128);
        assert!(mid < 0.5);
        assert!(mid > 0.1);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Texture::load(Path::new("/nonexistent/sky.png")).is_err());
    }
}
