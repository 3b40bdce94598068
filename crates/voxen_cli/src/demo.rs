//! A small generated world for renders without a saved scene.

use voxen_core::chunk::{CHUNK_HEIGHT, CHUNK_WIDTH};
use voxen_core::material::ids;
use voxen_core::{ChunkData, ChunkPosition, MemoryWorld};

pub const SEA_LEVEL: i32 = 62;

const PLAINS: u8 = 1;
const SWAMP: u8 = 6;

/// Rolling hills around a lake, with a few trees and a glowstone beacon at
/// the origin. Covers `radius` chunks in every direction from the origin.
pub fn demo_world(radius: i32) -> MemoryWorld {
    let mut world = MemoryWorld::new();
    for cx in -radius..radius {
        for cz in -radius..radius {
            world.insert(ChunkPosition::new(cx, cz), demo_chunk(cx, cz));
        }
    }
    world
}

/// Terrain height at a world column.
pub fn height(x: i32, z: i32) -> i32 {
    let (x, z) = (x as f64, z as f64);
    let hills = 6.0 * (x / 11.0).sin() + 5.0 * (z / 13.0).cos() + 3.0 * ((x + z) / 7.0).sin();
    // a bowl around the origin holds the lake
    let bowl = ((x * x + z * z).sqrt() / 4.0).min(14.0);
    (SEA_LEVEL as f64 - 10.0 + bowl + hills).round() as i32
}

fn demo_chunk(cx: i32, cz: i32) -> ChunkData {
    let mut chunk = ChunkData::new();
    for lx in 0..CHUNK_WIDTH {
        for lz in 0..CHUNK_WIDTH {
            let (x, z) = (cx * CHUNK_WIDTH + lx, cz * CHUNK_WIDTH + lz);
            let h = height(x, z).clamp(1, CHUNK_HEIGHT - 16);

            chunk.set_block(lx, 0, lz, ids::BEDROCK, 0);
            for y in 1..=h {
                let id = if y == h {
                    if h <= SEA_LEVEL + 1 {
                        ids::SAND
                    } else {
                        ids::GRASS
                    }
                } else if y >= h - 3 {
                    ids::DIRT
                } else {
                    ids::STONE
                };
                chunk.set_block(lx, y, lz, id, 0);
            }
            for y in h + 1..=SEA_LEVEL {
                chunk.set_block(lx, y, lz, ids::STATIONARY_WATER, 0);
            }

            let biome = if x < 0 && z < 0 { SWAMP } else { PLAINS };
            chunk.set_biome(lx, lz, biome);

            if h > SEA_LEVEL + 1 {
                decorate(&mut chunk, lx, h, lz, column_hash(x, z));
            }
        }
    }
    if cx == 0 && cz == 0 {
        let h = height(0, 0).max(SEA_LEVEL);
        for y in h + 1..h + 5 {
            chunk.set_block(0, y, 0, ids::GLOWSTONE, 0);
        }
    }
    chunk
}

/// Grass tufts everywhere, trees where they fit inside the chunk.
fn decorate(chunk: &mut ChunkData, lx: i32, h: i32, lz: i32, hash: u32) {
    let inside = (2..CHUNK_WIDTH - 2).contains(&lx) && (2..CHUNK_WIDTH - 2).contains(&lz);
    if inside && hash % 61 == 0 {
        for dy in -2..=2 {
            for dx in -2..=2 {
                for dz in -2..=2 {
                    if dx * dx + dy * dy + dz * dz <= 5 {
                        chunk.set_block(lx + dx, h + 5 + dy, lz + dz, ids::LEAVES, 0);
                    }
                }
            }
        }
        for y in h + 1..h + 6 {
            chunk.set_block(lx, y, lz, ids::LOG, 0);
        }
    } else if hash % 7 == 0 && chunk.block(lx, h + 1, lz) == ids::AIR {
        chunk.set_block(lx, h + 1, lz, ids::TALL_GRASS, 1);
    }
}

fn column_hash(x: i32, z: i32) -> u32 {
    let mut h = (x as u32).wrapping_mul(0x27d4_eb2d) ^ (z as u32).wrapping_mul(0x1656_67b1);
    h ^= h >> 15;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^ (h >> 13)
}
