//! Block materials.
//!
//! A closed set of block kinds with their optical flags, textures and
//! optional sub-voxel geometry, looked up by the low byte of a voxel value.
//! The registry is immutable once built and shared by reference.

use glam::DVec3;

use crate::geometry::{self, LocalIntersect};
use crate::texture::{linear_rgb, Texture};

/// Block ids used by the built-in registry.
pub mod ids {
    pub const AIR: u8 = 0;
    pub const STONE: u8 = 1;
    pub const GRASS: u8 = 2;
    pub const DIRT: u8 = 3;
    pub const COBBLESTONE: u8 = 4;
    pub const PLANKS: u8 = 5;
    pub const BEDROCK: u8 = 7;
    pub const WATER: u8 = 8;
    pub const STATIONARY_WATER: u8 = 9;
    pub const LAVA: u8 = 10;
    pub const STATIONARY_LAVA: u8 = 11;
    pub const SAND: u8 = 12;
    pub const GRAVEL: u8 = 13;
    pub const LOG: u8 = 17;
    pub const LEAVES: u8 = 18;
    pub const GLASS: u8 = 20;
    pub const TALL_GRASS: u8 = 31;
    pub const STONE_SLAB: u8 = 44;
    pub const TORCH: u8 = 50;
    pub const ICE: u8 = 79;
    pub const SNOW: u8 = 80;
    pub const GLOWSTONE: u8 = 89;
    pub const BARRIER: u8 = 166;
}

/// Broad category of a block, used where behaviour depends on identity
/// rather than flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Air,
    Solid,
    Water,
    Lava,
    Ice,
    Glass,
    Leaves,
    Plant,
    Slab,
    Torch,
    Unknown,
}

/// Which ambient biome texture tints a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tint {
    None,
    /// Top face only, from the grass texture.
    Grass,
    /// Every face, from the foliage texture.
    Foliage,
}

#[derive(Debug, Clone)]
pub struct Material {
    pub id: u8,
    pub name: &'static str,
    pub kind: BlockKind,
    /// Side texture, and the fallback for top and bottom.
    pub texture: Texture,
    pub top: Option<Texture>,
    pub bottom: Option<Texture>,
    pub tint: Tint,
    /// Index of refraction.
    pub ior: f32,
    /// Fills its cell and blocks light.
    pub opaque: bool,
    /// Supports liquid corner heights next to it.
    pub solid: bool,
    pub emitter: bool,
    pub shiny: bool,
    pub sub_surface_scattering: bool,
    /// Stored as air when chunks are loaded.
    pub invisible: bool,
    /// Sub-voxel geometry; `None` means the whole cell.
    pub local: Option<LocalIntersect>,
}

/// Index of refraction of air.
pub const AIR_IOR: f32 = 1.000293;

impl Material {
    /// An opaque, solid full block.
    pub fn new(id: u8, name: &'static str, kind: BlockKind, texture: Texture) -> Self {
        Self {
            id,
            name,
            kind,
            texture,
            top: None,
            bottom: None,
            tint: Tint::None,
            ior: AIR_IOR,
            opaque: true,
            solid: true,
            emitter: false,
            shiny: false,
            sub_surface_scattering: false,
            invisible: false,
            local: None,
        }
    }

    pub fn air() -> Self {
        let mut air = Self::new(ids::AIR, "air", BlockKind::Air, Texture::solid_color([1.0; 4]));
        air.opaque = false;
        air.solid = false;
        air
    }

    /// Placeholder for ids the registry does not know.
    pub fn unknown(id: u8) -> Self {
        Self::new(id, "unknown", BlockKind::Unknown, solid(0x808080))
    }

    pub fn with_top(mut self, texture: Texture) -> Self {
        self.top = Some(texture);
        self
    }

    pub fn with_bottom(mut self, texture: Texture) -> Self {
        self.bottom = Some(texture);
        self
    }

    pub fn with_tint(mut self, tint: Tint) -> Self {
        self.tint = tint;
        self
    }

    pub fn with_ior(mut self, ior: f32) -> Self {
        self.ior = ior;
        self
    }

    pub fn with_local(mut self, local: LocalIntersect) -> Self {
        self.local = Some(local);
        self
    }

    /// Light passes through (partially) or the block does not fill its cell.
    pub fn transparent(mut self) -> Self {
        self.opaque = false;
        self
    }

    pub fn non_solid(mut self) -> Self {
        self.opaque = false;
        self.solid = false;
        self
    }

    pub fn emitter(mut self) -> Self {
        self.emitter = true;
        self
    }

    pub fn shiny(mut self) -> Self {
        self.shiny = true;
        self
    }

    pub fn sub_surface(mut self) -> Self {
        self.sub_surface_scattering = true;
        self
    }

    pub fn invisible(mut self) -> Self {
        self.invisible = true;
        self
    }

    /// Texture for a face, selected by its normal.
    pub fn face_texture(&self, normal: DVec3) -> &Texture {
        if normal.y > 0.0 {
            self.top.as_ref().unwrap_or(&self.texture)
        } else if normal.y < 0.0 {
            self.bottom.as_ref().unwrap_or(&self.texture)
        } else {
            &self.texture
        }
    }

    /// Whether the face with this normal takes the biome tint.
    pub fn tinted(&self, normal: DVec3) -> Option<Tint> {
        match self.tint {
            Tint::None => None,
            Tint::Grass if normal.y > 0.0 => Some(Tint::Grass),
            Tint::Grass => None,
            Tint::Foliage => Some(Tint::Foliage),
        }
    }

    pub fn is_air(&self) -> bool {
        self.kind == BlockKind::Air
    }

    pub fn is_water(&self) -> bool {
        self.kind == BlockKind::Water
    }

    pub fn is_liquid(&self) -> bool {
        matches!(self.kind, BlockKind::Water | BlockKind::Lava)
    }

    /// Materials whose interface bends light rather than just passing it.
    pub fn refracts(&self) -> bool {
        matches!(self.kind, BlockKind::Water | BlockKind::Ice)
    }
}

/// Immutable lookup table of all 256 block ids.
#[derive(Debug, Clone)]
pub struct MaterialRegistry {
    materials: Vec<Material>,
}

impl MaterialRegistry {
    /// Build a registry; ids without a material get [`Material::unknown`].
    pub fn from_materials(materials: impl IntoIterator<Item = Material>) -> Self {
        let mut table: Vec<Material> = (0..=255u8).map(Material::unknown).collect();
        table[0] = Material::air();
        for material in materials {
            let id = material.id as usize;
            table[id] = material;
        }
        Self { materials: table }
    }

    /// The built-in block set.
    pub fn standard() -> Self {
        use ids::*;
        use BlockKind as K;

        let water = Material::new(WATER, "water", K::Water, Texture::solid_color(rgba(0x2f5fd0, 0.3)))
            .non_solid()
            .shiny()
            .with_ior(1.333)
            .with_local(geometry::liquid);
        let lava = Material::new(LAVA, "lava", K::Lava, speckled(0xcf5b14, 0.15, 3))
            .non_solid()
            .emitter()
            .with_local(geometry::liquid);

        let mut stationary_water = water.clone();
        stationary_water.id = STATIONARY_WATER;
        let mut stationary_lava = lava.clone();
        stationary_lava.id = STATIONARY_LAVA;

        Self::from_materials([
            Material::new(STONE, "stone", K::Solid, speckled(0x7d7d7d, 0.08, 1)),
            Material::new(GRASS, "grass", K::Solid, speckled(0x866043, 0.1, 2))
                .with_top(speckled(0x9a9a9a, 0.1, 4))
                .with_bottom(speckled(0x866043, 0.1, 5))
                .with_tint(Tint::Grass),
            Material::new(DIRT, "dirt", K::Solid, speckled(0x866043, 0.1, 5)),
            Material::new(COBBLESTONE, "cobblestone", K::Solid, speckled(0x7a7a7a, 0.2, 6)),
            Material::new(PLANKS, "planks", K::Solid, speckled(0x9c7f4e, 0.1, 7)),
            Material::new(BEDROCK, "bedrock", K::Solid, speckled(0x545454, 0.3, 8)),
            water,
            stationary_water,
            lava,
            stationary_lava,
            Material::new(SAND, "sand", K::Solid, speckled(0xdbd3a0, 0.05, 9)),
            Material::new(GRAVEL, "gravel", K::Solid, speckled(0x857f7f, 0.2, 10)),
            Material::new(LOG, "log", K::Solid, speckled(0x665132, 0.1, 11))
                .with_top(speckled(0x9a7b4f, 0.1, 12))
                .with_bottom(speckled(0x9a7b4f, 0.1, 12)),
            Material::new(LEAVES, "leaves", K::Leaves, holes(0x9a9a9a, 0.3, 13))
                .transparent()
                .with_tint(Tint::Foliage)
                .sub_surface(),
            Material::new(GLASS, "glass", K::Glass, framed(0xd0e8f0))
                .transparent()
                .with_ior(1.52),
            Material::new(TALL_GRASS, "tall grass", K::Plant, blades(0x8a8a8a))
                .non_solid()
                .with_tint(Tint::Foliage)
                .sub_surface()
                .with_local(geometry::cross),
            Material::new(STONE_SLAB, "stone slab", K::Slab, speckled(0x9f9f9f, 0.05, 14))
                .transparent()
                .with_local(geometry::slab),
            Material::new(TORCH, "torch", K::Torch, solid(0xffd080))
                .non_solid()
                .emitter()
                .with_local(geometry::torch),
            Material::new(ICE, "ice", K::Ice, Texture::solid_color(rgba(0x7dadff, 0.6)))
                .transparent()
                .shiny()
                .with_ior(1.31),
            Material::new(SNOW, "snow", K::Solid, speckled(0xf0fbfb, 0.03, 15)),
            Material::new(GLOWSTONE, "glowstone", K::Solid, speckled(0xf9d49c, 0.15, 16)).emitter(),
            Material::new(BARRIER, "barrier", K::Solid, solid(0xff0000))
                .non_solid()
                .invisible(),
        ])
    }

    /// Material for a packed voxel value.
    #[inline]
    pub fn get(&self, value: u32) -> &Material {
        &self.materials[(value & 0xFF) as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        self.materials.iter()
    }
}

impl Default for MaterialRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn rgba(hex: u32, alpha: f32) -> [f32; 4] {
    let [r, g, b] = linear_rgb(hex);
    [r, g, b, alpha]
}

fn solid(hex: u32) -> Texture {
    Texture::solid_color(rgba(hex, 1.0))
}

/// Cheap deterministic per-texel hash in [0, 1).
fn hash(x: u32, y: u32, seed: u32) -> f32 {
    let mut h = x
        .wrapping_mul(374_761_393)
        .wrapping_add(y.wrapping_mul(668_265_263))
        .wrapping_add(seed.wrapping_mul(2_246_822_519));
    h = (h ^ (h >> 13)).wrapping_mul(1_274_126_177);
    h ^= h >> 16;
    (h & 0xFFFF) as f32 / 65536.0
}

fn texel(u: f32, v: f32) -> (u32, u32) {
    ((u * 16.0) as u32, (v * 16.0) as u32)
}

/// 16x16 texture with brightness noise.
fn speckled(hex: u32, variation: f32, seed: u32) -> Texture {
    let [r, g, b] = linear_rgb(hex);
    Texture::from_fn(16, 16, |u, v| {
        let (x, y) = texel(u, v);
        let k = 1.0 + variation * (hash(x, y, seed) * 2.0 - 1.0);
        [r * k, g * k, b * k, 1.0]
    })
}

/// Speckled texture with fully transparent texels.
fn holes(hex: u32, fraction: f32, seed: u32) -> Texture {
    let base = speckled(hex, 0.1, seed);
    let pixels = base
        .pixels
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let open = hash(i as u32, 0, seed + 100) < fraction;
            [p[0], p[1], p[2], if open { 0.0 } else { 1.0 }]
        })
        .collect();
    Texture::new(16, 16, pixels)
}

/// Transparent pane with an opaque border.
fn framed(hex: u32) -> Texture {
    let [r, g, b] = linear_rgb(hex);
    Texture::from_fn(16, 16, |u, v| {
        let (x, y) = texel(u, v);
        let edge = x == 0 || y == 0 || x == 15 || y == 15;
        [r, g, b, if edge { 1.0 } else { 0.0 }]
    })
}

/// Vertical blades of uneven height.
fn blades(hex: u32) -> Texture {
    let [r, g, b] = linear_rgb(hex);
    Texture::from_fn(16, 16, |u, v| {
        let (x, y) = texel(u, v);
        let height = 6 + (hash(x, 0, 31) * 10.0) as u32;
        let filled = x % 2 == 0 && y < height;
        [r, g, b, if filled { 1.0 } else { 0.0 }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_every_id() {
        let registry = MaterialRegistry::standard();
        assert_eq!(registry.iter().count(), 256);
        assert!(registry.get(0).is_air());
        assert_eq!(registry.get(200).kind, BlockKind::Unknown);
        assert!(registry.get(200).opaque);
    }

    #[test]
    fn test_lookup_ignores_high_bits() {
        let registry = MaterialRegistry::standard();
        let value = ids::WATER as u32 | (5 << 8) | crate::voxel::FULL_BLOCK | (3 << 16);
        assert!(registry.get(value).is_water());
    }

    #[test]
    fn test_texture_alpha_is_a_probability() {
        let registry = MaterialRegistry::standard();
        for material in registry.iter() {
            for p in &material.texture.pixels {
                assert!((0.0..=1.0).contains(&p[3]), "{} alpha {}", material.name, p[3]);
            }
        }
    }

    #[test]
    fn test_face_textures_and_tint() {
        let registry = MaterialRegistry::standard();
        let grass = registry.get(ids::GRASS as u32);
        assert_eq!(grass.tinted(DVec3::Y), Some(Tint::Grass));
        assert_eq!(grass.tinted(DVec3::X), None);
        assert!(std::ptr::eq(grass.face_texture(DVec3::X), &grass.texture));
        assert!(!std::ptr::eq(grass.face_texture(DVec3::Y), &grass.texture));
    }

    #[test]
    fn test_liquids_and_refraction() {
        let registry = MaterialRegistry::standard();
        let water = registry.get(ids::STATIONARY_WATER as u32);
        assert!(water.is_water());
        assert!(water.refracts());
        assert!(water.local.is_some());
        assert!(registry.get(ids::ICE as u32).refracts());
        assert!(!registry.get(ids::GLASS as u32).refracts());
        assert!(registry.get(ids::LAVA as u32).emitter);
    }
}
