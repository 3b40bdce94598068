//! Chunk columns consumed by the scene loader.
//!
//! A chunk is a 16 x 256 x 16 column of block ids, metadata nibbles and a
//! 16 x 16 biome map. Where chunks come from is up to the [`ChunkSource`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CHUNK_WIDTH: i32 = 16;
pub const CHUNK_HEIGHT: i32 = 256;

const COLUMN_VOXELS: usize = (CHUNK_WIDTH * CHUNK_HEIGHT * CHUNK_WIDTH) as usize;

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Chunk {0} is not present in the world")]
    Missing(ChunkPosition),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt chunk {pos}: {reason}")]
    Corrupt { pos: ChunkPosition, reason: String },
}

pub type ChunkResult<T> = Result<T, ChunkError>;

/// Horizontal chunk coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPosition {
    pub x: i32,
    pub z: i32,
}

impl ChunkPosition {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing a world block column.
    pub fn of_block(x: i32, z: i32) -> Self {
        Self::new(x >> 4, z >> 4)
    }

    /// Pack as `(x << 32) | z`.
    pub fn to_long(self) -> i64 {
        ((self.x as i64) << 32) | (self.z as u32 as i64)
    }

    pub fn from_long(packed: i64) -> Self {
        Self::new((packed >> 32) as i32, packed as i32)
    }
}

impl std::fmt::Display for ChunkPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

/// Block data of one chunk column.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkData {
    blocks: Vec<u8>,
    data: Vec<u8>,
    biomes: Vec<u8>,
}

#[inline]
fn column_index(x: i32, y: i32, z: i32) -> Option<usize> {
    let inside = (0..CHUNK_WIDTH).contains(&x)
        && (0..CHUNK_HEIGHT).contains(&y)
        && (0..CHUNK_WIDTH).contains(&z);
    inside.then(|| ((y * CHUNK_WIDTH + z) * CHUNK_WIDTH + x) as usize)
}

impl ChunkData {
    /// An empty (all air) column.
    pub fn new() -> Self {
        Self {
            blocks: vec![0; COLUMN_VOXELS],
            data: vec![0; COLUMN_VOXELS],
            biomes: vec![0; (CHUNK_WIDTH * CHUNK_WIDTH) as usize],
        }
    }

    /// Block id at chunk-local coordinates, air outside the column.
    pub fn block(&self, x: i32, y: i32, z: i32) -> u8 {
        column_index(x, y, z).map_or(0, |i| self.blocks[i])
    }

    /// Metadata nibble at chunk-local coordinates.
    pub fn data(&self, x: i32, y: i32, z: i32) -> u8 {
        column_index(x, y, z).map_or(0, |i| self.data[i])
    }

    pub fn set_block(&mut self, x: i32, y: i32, z: i32, id: u8, data: u8) {
        if let Some(i) = column_index(x, y, z) {
            self.blocks[i] = id;
            self.data[i] = data & 0xF;
        }
    }

    pub fn biome(&self, x: i32, z: i32) -> u8 {
        self.biomes[((z & 15) * CHUNK_WIDTH + (x & 15)) as usize]
    }

    pub fn set_biome(&mut self, x: i32, z: i32, biome: u8) {
        self.biomes[((z & 15) * CHUNK_WIDTH + (x & 15)) as usize] = biome;
    }
}

impl Default for ChunkData {
    fn default() -> Self {
        Self::new()
    }
}

/// Provider of chunk columns, typically backed by a world directory.
pub trait ChunkSource: Send + Sync {
    fn load_chunk(&self, pos: ChunkPosition) -> ChunkResult<Arc<ChunkData>>;

    /// World directory, if the source has one.
    fn path(&self) -> Option<&Path> {
        None
    }

    /// Dimension id within the world.
    fn dimension(&self) -> i32 {
        0
    }
}

/// Chunks held in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryWorld {
    chunks: HashMap<ChunkPosition, Arc<ChunkData>>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pos: ChunkPosition, chunk: ChunkData) {
        self.chunks.insert(pos, Arc::new(chunk));
    }

    /// All stored positions, sorted.
    pub fn positions(&self) -> Vec<ChunkPosition> {
        let mut positions: Vec<_> = self.chunks.keys().copied().collect();
        positions.sort();
        positions
    }
}

impl ChunkSource for MemoryWorld {
    fn load_chunk(&self, pos: ChunkPosition) -> ChunkResult<Arc<ChunkData>> {
        self.chunks.get(&pos).cloned().ok_or(ChunkError::Missing(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_position_packing() {
        for pos in [
            ChunkPosition::new(0, 0),
            ChunkPosition::new(-1, 5),
            ChunkPosition::new(12, -300),
            ChunkPosition::new(i32::MIN, i32::MAX),
        ] {
            assert_eq!(ChunkPosition::from_long(pos.to_long()), pos);
        }
        assert_eq!(ChunkPosition::of_block(-1, 17), ChunkPosition::new(-1, 1));
    }

    #[test]
    fn test_chunk_data_access() {
        let mut chunk = ChunkData::new();
        chunk.set_block(3, 64, 15, 4, 0x1F);
        chunk.set_biome(3, 15, 6);

        assert_eq!(chunk.block(3, 64, 15), 4);
        assert_eq!(chunk.data(3, 64, 15), 0xF);
        assert_eq!(chunk.block(3, 65, 15), 0);
        assert_eq!(chunk.block(16, 0, 0), 0);
        assert_eq!(chunk.biome(3, 15), 6);
    }

    #[test]
    fn test_memory_world() {
        let mut world = MemoryWorld::new();
        world.insert(ChunkPosition::new(1, 0), ChunkData::new());
        world.insert(ChunkPosition::new(0, 0), ChunkData::new());

        assert_eq!(world.positions()[0], ChunkPosition::new(0, 0));
        assert!(world.load_chunk(ChunkPosition::new(1, 0)).is_ok());
        assert!(matches!(
            world.load_chunk(ChunkPosition::new(9, 9)),
            Err(ChunkError::Missing(_))
        ));
    }
}
