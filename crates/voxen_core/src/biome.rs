//! Biome colour lookup.

use crate::texture::linear_rgb;

/// Linear grass and foliage colours per biome id.
pub trait BiomeColors: Send + Sync {
    fn grass(&self, biome: u8) -> [f32; 3];
    fn foliage(&self, biome: u8) -> [f32; 3];
}

/// A handful of common biomes; unknown ids fall back to plains.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardBiomes;

const PLAINS: (u32, u32) = (0x91bd59, 0x77ab2f);

fn palette(biome: u8) -> (u32, u32) {
    match biome {
        0 => (0x8eb971, 0x71a74d), // ocean
        1 => PLAINS,
        2 => (0xbfb755, 0xaea42a), // desert
        3 => (0x8ab689, 0x6da36b), // extreme hills
        4 => (0x79c05a, 0x59ae30), // forest
        5 => (0x86b783, 0x68a464), // taiga
        6 => (0x6a7039, 0x6a7039), // swamp
        _ => PLAINS,
    }
}

impl BiomeColors for StandardBiomes {
    fn grass(&self, biome: u8) -> [f32; 3] {
        linear_rgb(palette(biome).0)
    }

    fn foliage(&self, biome: u8) -> [f32; 3] {
        linear_rgb(palette(biome).1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_biome_is_plains() {
        let biomes = StandardBiomes;
        assert_eq!(biomes.grass(200), biomes.grass(1));
        assert_ne!(biomes.grass(2), biomes.grass(1));
        assert!(biomes.foliage(4).iter().all(|c| (0.0..=1.0).contains(c)));
    }
}
