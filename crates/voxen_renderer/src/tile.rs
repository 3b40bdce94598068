//! Tiling of the canvas into render jobs.
//!
//! Tiles are handed out centre first, so a preview fills in from the middle
//! of the image outwards.

/// A rectangular region of the canvas rendered as one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// X coordinate of the tile's top-left corner
    pub x: u32,
    /// Y coordinate of the tile's top-left corner
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Job id of this tile
    pub index: usize,
}

impl Tile {
    pub fn new(x: u32, y: u32, width: u32, height: u32, index: usize) -> Self {
        Self { x, y, width, height, index }
    }

    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    /// Offset of canvas pixel (x, y) inside this tile's row-major storage.
    #[inline]
    pub fn offset(&self, x: u32, y: u32) -> usize {
        ((y - self.y) * self.width + (x - self.x)) as usize
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// Default tile side in pixels.
pub const DEFAULT_TILE_WIDTH: u32 = 32;

/// Number of tiles covering a canvas.
pub fn tile_count(width: u32, height: u32, tile_width: u32) -> usize {
    let tile_width = tile_width.max(1);
    (width.div_ceil(tile_width) * height.div_ceil(tile_width)) as usize
}

/// Split a canvas into tiles, sorted in spiral order from the centre.
pub fn generate_tiles(width: u32, height: u32, tile_width: u32) -> Vec<Tile> {
    let tile_width = tile_width.max(1);
    let mut tiles = Vec::with_capacity(tile_count(width, height, tile_width));

    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            let tw = tile_width.min(width - x);
            let th = tile_width.min(height - y);
            tiles.push(Tile::new(x, y, tw, th, tiles.len()));
            x += tile_width;
        }
        y += tile_width;
    }

    sort_spiral(&mut tiles, width, height);

    for (i, tile) in tiles.iter_mut().enumerate() {
        tile.index = i;
    }
    tiles
}

/// Sort tiles by distance of their centre from the canvas centre.
fn sort_spiral(tiles: &mut [Tile], width: u32, height: u32) {
    let center_x = width as f64 / 2.0;
    let center_y = height as f64 / 2.0;
    let distance = |t: &Tile| {
        let dx = t.x as f64 + t.width as f64 / 2.0 - center_x;
        let dy = t.y as f64 + t.height as f64 / 2.0 - center_y;
        dx * dx + dy * dy
    };

    // stable sort keeps row-major order among equidistant tiles
    tiles.sort_by(|a, b| {
        distance(a)
            .partial_cmp(&distance(b))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
