//! Turning accumulated radiance into display pixels.

use voxen_core::Postprocess;

/// Display gamma.
pub const DEFAULT_GAMMA: f64 = 2.2;

/// Filmic curve from John Hable's "Filmic Tonemapping Operators".
#[inline]
pub fn tonemap1(x: f64) -> f64 {
    let x = (x - 0.004).max(0.0);
    (x * (6.2 * x + 0.5)) / (x * (6.2 * x + 1.7) + 0.06)
}

#[inline]
pub fn linear_to_gamma(linear: f64) -> f64 {
    if linear > 0.0 {
        linear.powf(1.0 / DEFAULT_GAMMA)
    } else {
        0.0
    }
}

#[inline]
pub fn clamp_01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Convert one channel in [0, 1] to a byte, rounding to nearest.
#[inline]
fn to_byte(x: f64) -> u8 {
    (255.0 * clamp_01(x) + 0.5) as u8
}

/// Finalize an accumulated sample into 8-bit RGBA.
///
/// Exposure is applied first. Path-traced frames use the selected
/// post-process mode; previews use a square-root gamma.
pub fn finalize(sample: [f64; 3], exposure: f64, mode: Postprocess, path_trace: bool) -> [u8; 4] {
    let mapped = sample.map(|c| {
        let c = c * exposure;
        if path_trace {
            match mode {
                Postprocess::None => c,
                Postprocess::Tonemap1 => tonemap1(c),
                Postprocess::Gamma => linear_to_gamma(c),
            }
        } else {
            c.max(0.0).sqrt()
        }
    });
    [to_byte(mapped[0]), to_byte(mapped[1]), to_byte(mapped[2]), 255]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_to_gamma() {
        assert_eq!(linear_to_gamma(0.0), 0.0);
        assert_eq!(linear_to_gamma(-1.0), 0.0);
        assert!((linear_to_gamma(1.0) - 1.0).abs() < 1e-12);
        assert!(linear_to_gamma(0.5) > 0.5);
    }

    #[test]
    fn test_tonemap_is_monotonic_and_bounded() {
        assert_eq!(tonemap1(0.0), 0.0);
        let mut last = 0.0;
        for i in 1..100 {
            let v = tonemap1(i as f64 * 0.1);
            assert!(v >= last);
            assert!(v < 1.0);
            last = v;
        }
    }

    #[test]
    fn test_finalize_modes() {
        let grey = [0.25, 0.25, 0.25];
        assert_eq!(finalize(grey, 1.0, Postprocess::None, true), [64, 64, 64, 255]);
        // preview uses sqrt
        assert_eq!(finalize(grey, 1.0, Postprocess::None, false), [128, 128, 128, 255]);
        // exposure before mapping, clamped to white
        assert_eq!(finalize(grey, 8.0, Postprocess::None, true), [255, 255, 255, 255]);
        assert_eq!(finalize([-1.0, 0.0, 0.0], 1.0, Postprocess::Gamma, true), [0, 0, 0, 255]);
    }
}
