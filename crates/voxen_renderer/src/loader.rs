//! Building the octree from chunk columns.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rayon::prelude::*;
use voxen_core::chunk::{CHUNK_HEIGHT, CHUNK_WIDTH};
use voxen_core::material::ids;
use voxen_core::voxel::{self, AIR, FULL_BLOCK};
use voxen_core::{BiomeColors, ChunkPosition, ChunkSource, MaterialRegistry, Octree, WorldTexture};
use voxen_math::IVec3;

use crate::status::RenderStatusListener;
use crate::Scene;

type BiomeMap = HashMap<ChunkPosition, [u8; 256]>;

/// Neighbouring columns touching each liquid corner, in
/// [`voxel::CORNER_SHIFTS`] order.
const CORNER_NEIGHBOURS: [[(i32, i32); 3]; 4] = [
    [(-1, 0), (-1, 1), (0, 1)],
    [(0, 1), (1, 1), (1, 0)],
    [(1, 0), (1, -1), (0, -1)],
    [(0, -1), (-1, -1), (-1, 0)],
];

impl Scene {
    /// Replace the octree with the given chunks of `world`.
    ///
    /// Chunks that fail to load are logged and left out. The scene is
    /// refreshed afterwards.
    pub fn load_chunks(
        &mut self,
        world: Arc<dyn ChunkSource>,
        chunks: &[ChunkPosition],
        listener: &dyn RenderStatusListener,
    ) {
        self.world = Some(Arc::clone(&world));
        if chunks.is_empty() {
            return;
        }

        let (depth, origin) = octree_origin(chunks);
        self.origin = origin;
        let mut octree = Octree::new(depth);
        if self.water_height > 0 {
            fill_water(&mut octree, origin, self.water_height);
        }

        let materials = Arc::clone(&self.materials);
        let mut loaded = HashSet::new();
        let mut biome_ids = BiomeMap::new();
        let target = chunks.len();

        for (done, &pos) in chunks.iter().enumerate() {
            listener.set_progress("Loading chunks", done, 0, target);
            if loaded.contains(&pos) {
                continue;
            }
            let chunk = match world.load_chunk(pos) {
                Ok(chunk) => chunk,
                Err(e) => {
                    log::warn!("Skipping chunk {}: {}", pos, e);
                    continue;
                }
            };
            loaded.insert(pos);

            let mut biomes = [0u8; 256];
            for cz in 0..CHUNK_WIDTH {
                for cx in 0..CHUNK_WIDTH {
                    biomes[(cz * CHUNK_WIDTH + cx) as usize] = chunk.biome(cx, cz);
                }
            }
            biome_ids.insert(pos, biomes);

            for cy in 0..CHUNK_HEIGHT {
                for cz in 0..CHUNK_WIDTH {
                    let z = pos.z * CHUNK_WIDTH + cz - origin.z;
                    for cx in 0..CHUNK_WIDTH {
                        let x = pos.x * CHUNK_WIDTH + cx - origin.x;
                        let y = cy - origin.y;
                        let id = fold_stationary(chunk.block(cx, cy, cz));
                        let material = materials.get(id as u32);

                        if material.id != ids::STONE && material.opaque && is_interior(cx, cy, cz) {
                            let hidden = [
                                (cx - 1, cy, cz),
                                (cx + 1, cy, cz),
                                (cx, cy - 1, cz),
                                (cx, cy + 1, cz),
                                (cx, cy, cz - 1),
                                (cx, cy, cz + 1),
                            ]
                            .iter()
                            .all(|&(nx, ny, nz)| materials.get(chunk.block(nx, ny, nz) as u32).opaque);
                            if hidden {
                                octree.set(x, y, z, ids::STONE as u32);
                                continue;
                            }
                        }

                        if material.invisible {
                            octree.set(x, y, z, AIR);
                            continue;
                        }

                        let mut value = voxel::pack(id, chunk.data(cx, cy, cz));
                        if material.is_liquid() && cy + 1 < CHUNK_HEIGHT {
                            let above = fold_stationary(chunk.block(cx, cy + 1, cz));
                            if above == id {
                                value |= FULL_BLOCK;
                            }
                        }
                        octree.set(x, y, z, value);
                    }
                }
            }
        }

        listener.set_progress("Finalizing octree", 0, 0, target);
        let mut positions: Vec<ChunkPosition> = loaded.iter().copied().collect();
        positions.sort();
        for pos in &positions {
            finalize_chunk(&mut octree, &materials, origin, *pos);
        }

        let (grass, foliage) = blend_biomes(&positions, &biome_ids, self.biomes.as_ref(), origin);

        log::info!(
            "Loaded {} chunks into an octree of depth {} ({} nodes)",
            loaded.len(),
            depth,
            octree.node_count()
        );
        listener.chunks_loaded(loaded.len());

        self.octree = Arc::new(octree);
        self.grass_texture = Arc::new(grass);
        self.foliage_texture = Arc::new(foliage);
        self.loaded_chunks = Arc::new(loaded);
        self.refresh();
    }

    /// Load the same chunks again from the current world.
    pub fn reload_chunks(&mut self, listener: &dyn RenderStatusListener) {
        let Some(world) = self.world.clone() else {
            log::warn!("Can not reload chunks: no world loaded");
            return;
        };
        let mut chunks: Vec<ChunkPosition> = self.loaded_chunks.iter().copied().collect();
        chunks.sort();
        self.load_chunks(world, &chunks, listener);
    }
}

/// Octree depth and world position of voxel (0, 0, 0) that fit all
/// `chunks`, centred in the cube.
pub(crate) fn octree_origin(chunks: &[ChunkPosition]) -> (u32, IVec3) {
    let xmin = chunks.iter().map(|c| c.x).min().unwrap_or(0) * CHUNK_WIDTH;
    let xmax = (chunks.iter().map(|c| c.x).max().unwrap_or(0) + 1) * CHUNK_WIDTH;
    let zmin = chunks.iter().map(|c| c.z).min().unwrap_or(0) * CHUNK_WIDTH;
    let zmax = (chunks.iter().map(|c| c.z).max().unwrap_or(0) + 1) * CHUNK_WIDTH;

    let extent = CHUNK_HEIGHT.max(xmax - xmin).max(zmax - zmin) as u32;
    let depth = extent.next_power_of_two().trailing_zeros();
    let size = 1i32 << depth;

    let xroom = size - (xmax - xmin);
    let yroom = size - CHUNK_HEIGHT;
    let zroom = size - (zmax - zmin);
    (depth, IVec3::new(xmin - xroom / 2, -yroom / 2, zmin - zroom / 2))
}

/// Fill every column of the octree with water up to `water_height`
/// (world y, exclusive).
fn fill_water(octree: &mut Octree, origin: IVec3, water_height: i32) {
    let size = octree.size();
    let bottom = -origin.y;
    let top = bottom + water_height - 1;
    let full = ids::WATER as u32 | FULL_BLOCK;
    for x in 0..size {
        for z in 0..size {
            for y in bottom..top {
                octree.set(x, y, z, full);
            }
            octree.set(x, top, z, ids::WATER as u32);
        }
    }
}

fn fold_stationary(id: u8) -> u8 {
    match id {
        ids::STATIONARY_WATER => ids::WATER,
        ids::STATIONARY_LAVA => ids::LAVA,
        _ => id,
    }
}

/// Away from the column walls, top and bottom.
fn is_interior(cx: i32, cy: i32, cz: i32) -> bool {
    (1..CHUNK_WIDTH - 1).contains(&cx)
        && (1..CHUNK_WIDTH - 1).contains(&cz)
        && (1..CHUNK_HEIGHT - 1).contains(&cy)
}

/// Second pass over a chunk once all its neighbours are in the octree:
/// merge hidden wall blocks into stone and compute liquid corner heights.
fn finalize_chunk(octree: &mut Octree, materials: &MaterialRegistry, origin: IVec3, pos: ChunkPosition) {
    for cy in 0..CHUNK_HEIGHT {
        let y = cy - origin.y;
        for cz in 0..CHUNK_WIDTH {
            let z = pos.z * CHUNK_WIDTH + cz - origin.z;
            for cx in 0..CHUNK_WIDTH {
                let x = pos.x * CHUNK_WIDTH + cx - origin.x;
                let value = octree.get(x, y, z);
                let material = materials.get(value);

                let on_wall = cx == 0 || cx == CHUNK_WIDTH - 1 || cz == 0 || cz == CHUNK_WIDTH - 1;
                let inner_layer = cy > 0 && cy < CHUNK_HEIGHT - 1;
                if on_wall && inner_layer && material.id != ids::STONE && material.opaque {
                    let view: &Octree = octree;
                    let opaque = |x: i32, y: i32, z: i32| materials.get(view.get(x, y, z)).opaque;
                    let hidden = opaque(x - 1, y, z)
                        && opaque(x + 1, y, z)
                        && opaque(x, y - 1, z)
                        && opaque(x, y + 1, z)
                        && opaque(x, y, z - 1)
                        && opaque(x, y, z + 1);
                    if hidden {
                        octree.set(x, y, z, ids::STONE as u32);
                        continue;
                    }
                }

                if material.is_liquid() && !voxel::is_full_block(value) {
                    let corners = liquid_corners(octree, materials, x, y, z, value);
                    octree.set(x, y, z, voxel::with_corners(value, corners));
                }
            }
        }
    }
}

/// Corner levels of a partial liquid block, averaged with the three other
/// columns sharing each corner.
fn liquid_corners(octree: &Octree, materials: &MaterialRegistry, x: i32, y: i32, z: i32, value: u32) -> [u32; 4] {
    let id = voxel::block_id(value);
    let level0 = 8 - voxel::data(value) as i32;

    let level = |dx: i32, dz: i32| -> i32 {
        let other = octree.get(x + dx, y, z + dz);
        let material = materials.get(other);
        if material.id == id {
            let full = voxel::is_full_block(other) as i32;
            8 - (1 - full) * (7 & voxel::data(other) as i32)
        } else if !material.solid {
            0
        } else {
            level0
        }
    };

    CORNER_NEIGHBOURS.map(|neighbours| {
        let sum: i32 = level0 + neighbours.iter().map(|&(dx, dz)| level(dx, dz)).sum::<i32>();
        (8 - sum / 4).clamp(0, voxel::MAX_CORNER_LEVEL as i32) as u32
    })
}

/// Grass and foliage textures, each column the 3x3 average of the biome
/// colours of loaded columns around it.
fn blend_biomes(
    positions: &[ChunkPosition],
    biome_ids: &BiomeMap,
    biomes: &dyn BiomeColors,
    origin: IVec3,
) -> (WorldTexture, WorldTexture) {
    let biome_at = |wx: i32, wz: i32| -> Option<u8> {
        let tile = biome_ids.get(&ChunkPosition::of_block(wx, wz))?;
        Some(tile[((wz & 15) * CHUNK_WIDTH + (wx & 15)) as usize])
    };

    let tiles: Vec<(ChunkPosition, Vec<([f32; 3], [f32; 3])>)> = positions
        .par_iter()
        .map(|&pos| {
            let mut texels = Vec::with_capacity(256);
            for z in 0..CHUNK_WIDTH {
                for x in 0..CHUNK_WIDTH {
                    let mut grass = [0.0f32; 3];
                    let mut foliage = [0.0f32; 3];
                    let mut count = 0;
                    for sx in x - 1..=x + 1 {
                        for sz in z - 1..=z + 1 {
                            let Some(biome) = biome_at(pos.x * CHUNK_WIDTH + sx, pos.z * CHUNK_WIDTH + sz) else {
                                continue;
                            };
                            count += 1;
                            let (g, f) = (biomes.grass(biome), biomes.foliage(biome));
                            for i in 0..3 {
                                grass[i] += g[i];
                                foliage[i] += f[i];
                            }
                        }
                    }
                    let n = count.max(1) as f32;
                    texels.push((grass.map(|c| c / n), foliage.map(|c| c / n)));
                }
            }
            (pos, texels)
        })
        .collect();

    let mut grass = WorldTexture::new();
    let mut foliage = WorldTexture::new();
    for (pos, texels) in tiles {
        for (i, (g, f)) in texels.into_iter().enumerate() {
            let (x, z) = (i as i32 % CHUNK_WIDTH, i as i32 / CHUNK_WIDTH);
            let wx = pos.x * CHUNK_WIDTH + x - origin.x;
            let wz = pos.z * CHUNK_WIDTH + z - origin.z;
            grass.set(wx, wz, g);
            foliage.set(wx, wz, f);
        }
    }
    (grass, foliage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::LogStatusListener;
    use voxen_core::{ChunkData, MemoryWorld, StandardBiomes};

    fn block(scene: &Scene, x: i32, y: i32, z: i32) -> u32 {
        let o = scene.origin();
        scene.octree().get(x - o.x, y - o.y, z - o.z)
    }

    fn layered_chunk(top: i32, id: u8) -> ChunkData {
        let mut chunk = ChunkData::new();
        for y in 0..=top {
            for z in 0..16 {
                for x in 0..16 {
                    chunk.set_block(x, y, z, id, 0);
                }
            }
        }
        chunk
    }

    fn two_chunk_world() -> (Arc<MemoryWorld>, Vec<ChunkPosition>) {
        let mut world = MemoryWorld::new();
        world.insert(ChunkPosition::new(0, 0), layered_chunk(4, ids::DIRT));
        let mut second = layered_chunk(4, ids::DIRT);
        second.set_block(5, 5, 5, ids::STATIONARY_WATER, 0);
        second.set_block(6, 5, 5, ids::BARRIER, 0);
        second.set_biome(3, 3, 6);
        world.insert(ChunkPosition::new(1, 0), second);
        let positions = world.positions();
        (Arc::new(world), positions)
    }

    #[test]
    fn test_octree_origin() {
        let (depth, origin) = octree_origin(&[ChunkPosition::new(0, 0)]);
        assert_eq!(depth, 8);
        assert_eq!(origin, IVec3::new(-120, 0, -120));

        let chunks: Vec<_> = (-10..10).map(|x| ChunkPosition::new(x, 3)).collect();
        let (depth, origin) = octree_origin(&chunks);
        assert_eq!(depth, 9);
        assert_eq!(origin, IVec3::new(-160 - 96, -128, 48 - 248));
    }

    #[test]
    fn test_reload_is_idempotent() {
        let (world, positions) = two_chunk_world();
        let mut scene = Scene::new();
        scene.load_chunks(world, &positions, &LogStatusListener);
        let first = Arc::clone(scene.octree());

        scene.reload_chunks(&LogStatusListener);
        assert_eq!(*first, **scene.octree());
        assert_eq!(scene.loaded_chunks().len(), 2);
    }

    #[test]
    fn test_hidden_blocks_become_stone() {
        let (world, positions) = two_chunk_world();
        let mut scene = Scene::new();
        scene.load_chunks(world, &positions, &LogStatusListener);

        // interior and the shared chunk wall
        assert_eq!(block(&scene, 5, 2, 5), ids::STONE as u32);
        assert_eq!(block(&scene, 15, 2, 5), ids::STONE as u32);
        assert_eq!(block(&scene, 16, 2, 5), ids::STONE as u32);
        // exposed faces keep their material
        assert_eq!(block(&scene, 5, 4, 5), ids::DIRT as u32);
        assert_eq!(block(&scene, 0, 2, 5), ids::DIRT as u32);
    }

    #[test]
    fn test_stationary_and_invisible_blocks() {
        let (world, positions) = two_chunk_world();
        let mut scene = Scene::new();
        scene.load_chunks(world, &positions, &LogStatusListener);

        let water = block(&scene, 21, 5, 5);
        assert_eq!(voxel::block_id(water), ids::WATER);
        assert!(!voxel::is_full_block(water));
        assert_eq!(block(&scene, 22, 5, 5), AIR);
    }

    #[test]
    fn test_liquid_corners() {
        let materials = MaterialRegistry::standard();
        let mut octree = Octree::new(3);
        for x in 0..8 {
            for z in 0..8 {
                octree.set(x, 0, z, ids::STONE as u32);
                octree.set(x, 1, z, ids::STONE as u32);
            }
        }
        let water = ids::WATER as u32;
        octree.set(3, 1, 3, water);

        // enclosed by stone: every corner at the top level
        assert_eq!(liquid_corners(&octree, &materials, 3, 1, 3, water), [0, 0, 0, 0]);

        // open to the -x side
        octree.set(2, 1, 3, AIR);
        let corners = liquid_corners(&octree, &materials, 3, 1, 3, water);
        assert_eq!(corners, [2, 0, 0, 2]);
    }

    #[test]
    fn test_water_plane_fill() {
        let (world, positions) = two_chunk_world();
        let mut scene = Scene::new();
        scene.set_water_height(3);
        scene.load_chunks(world, &positions, &LogStatusListener);

        // outside the loaded chunks
        let below = block(&scene, -20, 1, -20);
        assert_eq!(below, ids::WATER as u32 | FULL_BLOCK);
        let surface = block(&scene, -20, 2, -20);
        assert_eq!(voxel::block_id(surface), ids::WATER);
        assert!(!voxel::is_full_block(surface));
        assert_eq!(block(&scene, -20, 3, -20), AIR);
    }

    #[test]
    fn test_biome_blend() {
        let (world, positions) = two_chunk_world();
        let mut scene = Scene::new();
        scene.load_chunks(world, &positions, &LogStatusListener);
        let o = scene.origin();

        let close = |a: [f32; 3], b: [f32; 3]| (0..3).all(|i| (a[i] - b[i]).abs() < 1e-5);
        let ocean = StandardBiomes.grass(0);
        let far = scene.grass_texture().get(2 - o.x, 12 - o.z);
        assert!(close(far, ocean));

        // column next to the swamp one is a mix
        let near = scene.grass_texture().get(16 + 4 - o.x, 3 - o.z);
        assert!(!close(near, ocean));
        assert!(!close(near, StandardBiomes.grass(6)));
    }
}
