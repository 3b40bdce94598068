//! Sparse per-column colour map, used for biome tints.
//!
//! Stored as 16 x 16 tiles keyed by chunk, in octree-local coordinates.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use crate::binary::{invalid_data, read_f32, read_i32, write_f32, write_i32};

type Tile = Box<[[f32; 3]; 256]>;

/// Colour for columns with no tile.
const DEFAULT_COLOR: [f32; 3] = [1.0, 1.0, 1.0];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldTexture {
    tiles: HashMap<(i32, i32), Tile>,
}

#[inline]
fn tile_key(x: i32, z: i32) -> ((i32, i32), usize) {
    ((x >> 4, z >> 4), ((z & 15) * 16 + (x & 15)) as usize)
}

impl WorldTexture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, x: i32, z: i32) -> [f32; 3] {
        let (key, index) = tile_key(x, z);
        self.tiles.get(&key).map_or(DEFAULT_COLOR, |tile| tile[index])
    }

    pub fn set(&mut self, x: i32, z: i32, color: [f32; 3]) {
        let (key, index) = tile_key(x, z);
        let tile = self
            .tiles
            .entry(key)
            .or_insert_with(|| Box::new([DEFAULT_COLOR; 256]));
        tile[index] = color;
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Tile count, then per tile: x, z, 256 RGB triples.
    pub fn store<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let mut keys: Vec<_> = self.tiles.keys().copied().collect();
        keys.sort_unstable();
        write_i32(out, keys.len() as i32)?;
        for key in keys {
            write_i32(out, key.0)?;
            write_i32(out, key.1)?;
            for texel in self.tiles[&key].iter() {
                for channel in texel {
                    write_f32(out, *channel)?;
                }
            }
        }
        Ok(())
    }

    pub fn load<R: Read + ?Sized>(input: &mut R) -> io::Result<WorldTexture> {
        let count = read_i32(input)?;
        if count < 0 {
            return Err(invalid_data(format!("negative tile count {}", count)));
        }
        let mut texture = WorldTexture::new();
        for _ in 0..count {
            let x = read_i32(input)?;
            let z = read_i32(input)?;
            let mut tile: Tile = Box::new([DEFAULT_COLOR; 256]);
            for texel in tile.iter_mut() {
                for channel in texel.iter_mut() {
                    *channel = read_f32(input)?;
                }
            }
            texture.tiles.insert((x, z), tile);
        }
        Ok(texture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_get_default_and_set() {
        let mut texture = WorldTexture::new();
        assert_eq!(texture.get(5, 5), DEFAULT_COLOR);

        texture.set(17, 3, [0.1, 0.2, 0.3]);
        assert_eq!(texture.get(17, 3), [0.1, 0.2, 0.3]);
        assert_eq!(texture.get(16, 3), DEFAULT_COLOR);
        assert_eq!(texture.tile_count(), 1);
    }

    #[test]
    fn test_store_and_load() {
        let mut texture = WorldTexture::new();
        texture.set(0, 0, [0.5, 0.25, 1.0]);
        texture.set(40, 70, [0.0, 1.0, 0.0]);

        let mut bytes = Vec::new();
        texture.store(&mut bytes).unwrap();
        let loaded = WorldTexture::load(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(loaded, texture);
    }
}
