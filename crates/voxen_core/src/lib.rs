//! Voxen Core - voxel world data for the renderer.
//!
//! This crate provides:
//!
//! - **Octree**: the sparse voxel index and its binary format
//! - **Materials**: the block registry, textures and sub-voxel geometry
//! - **World input**: chunk columns, biome colours, ambient colour maps
//! - **Scene description**: the versioned JSON settings file
//!
//! # Example
//!
//! ```
//! use voxen_core::{MaterialRegistry, Octree};
//! use voxen_core::material::ids;
//!
//! let registry = MaterialRegistry::standard();
//! let mut octree = Octree::new(4);
//! octree.set(1, 2, 3, ids::STONE as u32);
//! assert_eq!(registry.get(octree.get(1, 2, 3)).name, "stone");
//! ```

pub mod binary;
pub mod biome;
pub mod chunk;
pub mod description;
pub mod geometry;
pub mod material;
pub mod octree;
pub mod texture;
pub mod voxel;
pub mod world_texture;

// Re-export commonly used types
pub use biome::{BiomeColors, StandardBiomes};
pub use chunk::{ChunkData, ChunkError, ChunkPosition, ChunkSource, MemoryWorld};
pub use description::{Postprocess, SceneDescription, SceneFormatError};
pub use geometry::{LocalHit, EPSILON, OFFSET};
pub use material::{BlockKind, Material, MaterialRegistry, Tint};
pub use octree::{LeafRef, Octree};
pub use texture::{Texture, TextureError};
pub use world_texture::WorldTexture;
