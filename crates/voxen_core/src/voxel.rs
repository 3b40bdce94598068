//! Packed voxel values.
//!
//! A leaf of the octree stores one `u32` per voxel:
//!
//! | bits   | meaning                                   |
//! |--------|-------------------------------------------|
//! | 0..8   | block id                                  |
//! | 8..12  | block metadata nibble                     |
//! | 12     | full liquid block (liquid above)          |
//! | 16..32 | four liquid corner heights, 4 bits each   |
//!
//! The top bit is never set, so a value always fits a non-negative `i32`.

/// Block id of empty space.
pub const AIR: u32 = 0;

pub const BLOCK_MASK: u32 = 0xFF;
pub const DATA_SHIFT: u32 = 8;
pub const DATA_MASK: u32 = 0xF;

/// Set on a liquid voxel whose upper neighbour is the same liquid.
pub const FULL_BLOCK: u32 = 1 << 12;

/// Bit offsets of the liquid corner heights, in the order
/// (x=0, z=1), (x=1, z=1), (x=1, z=0), (x=0, z=0).
pub const CORNER_SHIFTS: [u32; 4] = [16, 20, 24, 28];
const CORNER_MASK: u32 = 0xF;

/// Highest corner level; level 0 is the tallest surface.
pub const MAX_CORNER_LEVEL: u32 = 7;

/// Combine a block id and metadata nibble.
#[inline]
pub fn pack(id: u8, data: u8) -> u32 {
    id as u32 | ((data as u32 & DATA_MASK) << DATA_SHIFT)
}

#[inline]
pub fn block_id(value: u32) -> u8 {
    (value & BLOCK_MASK) as u8
}

#[inline]
pub fn data(value: u32) -> u32 {
    (value >> DATA_SHIFT) & DATA_MASK
}

#[inline]
pub fn is_full_block(value: u32) -> bool {
    value & FULL_BLOCK != 0
}

/// Corner height level `i` (see [`CORNER_SHIFTS`]).
#[inline]
pub fn corner(value: u32, i: usize) -> u32 {
    (value >> CORNER_SHIFTS[i]) & CORNER_MASK
}

/// Replace all four corner levels, clamping each to [`MAX_CORNER_LEVEL`].
pub fn with_corners(value: u32, corners: [u32; 4]) -> u32 {
    let mut value = value & 0xFFFF;
    for (level, shift) in corners.iter().zip(CORNER_SHIFTS) {
        value |= (*level).min(MAX_CORNER_LEVEL) << shift;
    }
    value
}
