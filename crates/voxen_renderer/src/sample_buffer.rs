//! Per-tile accumulation buffers and the finalized front buffer.
//!
//! Workers own one tile at a time, so each tile sits behind its own mutex
//! and there is no contention inside a frame. The front buffer is rebuilt
//! from the tiles after the frame barrier.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};

use image::error::{ImageError, ImageResult, ParameterError, ParameterErrorKind};
use image::RgbaImage;
use rayon::prelude::*;

use crate::tile::{generate_tiles, Tile};

const BLACK: [u8; 4] = [0, 0, 0, 255];

/// Samples and pixels of one tile, row-major within the tile.
#[derive(Debug, Clone)]
pub struct TileBuffer {
    pub tile: Tile,
    /// Running mean of traced radiance.
    pub samples: Vec<[f64; 3]>,
    /// Finalized pixels, not yet visible.
    pub pixels: Vec<[u8; 4]>,
}

impl TileBuffer {
    fn new(tile: Tile) -> Self {
        let n = tile.pixel_count() as usize;
        Self {
            tile,
            samples: vec![[0.0; 3]; n],
            pixels: vec![BLACK; n],
        }
    }
}

#[derive(Debug)]
pub struct SampleBuffer {
    width: u32,
    height: u32,
    tile_width: u32,
    /// Indexed by job id.
    tiles: Vec<Mutex<TileBuffer>>,
    /// Job id of each tile in row-major grid order.
    grid: Vec<usize>,
    front: RwLock<Vec<[u8; 4]>>,
}

impl SampleBuffer {
    pub fn new(width: u32, height: u32, tile_width: u32) -> Self {
        let tile_width = tile_width.max(1);
        let tiles = generate_tiles(width, height, tile_width);
        let columns = width.div_ceil(tile_width);
        let mut grid = vec![0; tiles.len()];
        for tile in &tiles {
            let cell = (tile.y / tile_width) * columns + tile.x / tile_width;
            grid[cell as usize] = tile.index;
        }
        Self {
            width,
            height,
            tile_width,
            tiles: tiles.into_iter().map(|t| Mutex::new(TileBuffer::new(t))).collect(),
            grid,
            front: RwLock::new(vec![BLACK; (width * height) as usize]),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    /// Number of jobs in one frame.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Lock the tile for a job id.
    pub fn tile(&self, job: usize) -> Option<MutexGuard<'_, TileBuffer>> {
        self.tiles
            .get(job)
            .map(|t| t.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn tile_at(&self, x: u32, y: u32) -> MutexGuard<'_, TileBuffer> {
        let columns = self.width.div_ceil(self.tile_width);
        let cell = (y / self.tile_width) * columns + x / self.tile_width;
        self.tiles[self.grid[cell as usize]]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Accumulated sample at a canvas pixel.
    pub fn sample(&self, x: u32, y: u32) -> [f64; 3] {
        let tile = self.tile_at(x, y);
        tile.samples[tile.tile.offset(x, y)]
    }

    /// Publish the finalized pixels of every tile.
    pub fn flip(&self) {
        let mut front = self.front.write().unwrap_or_else(PoisonError::into_inner);
        for tile in &self.tiles {
            let tile = tile.lock().unwrap_or_else(PoisonError::into_inner);
            let t = tile.tile;
            for row in 0..t.height {
                let src = (row * t.width) as usize;
                let dst = ((t.y + row) * self.width + t.x) as usize;
                front[dst..dst + t.width as usize]
                    .copy_from_slice(&tile.pixels[src..src + t.width as usize]);
            }
        }
    }

    /// The last published frame, row-major RGBA.
    pub fn front(&self) -> RwLockReadGuard<'_, Vec<[u8; 4]>> {
        self.front.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn to_image(&self) -> ImageResult<RgbaImage> {
        let front = self.front();
        let bytes: &[u8] = bytemuck::cast_slice(front.as_slice());
        RgbaImage::from_raw(self.width, self.height, bytes.to_vec()).ok_or_else(|| {
            ImageError::Parameter(ParameterError::from_kind(ParameterErrorKind::DimensionMismatch))
        })
    }

    /// Write the front buffer as a PNG.
    pub fn save_png(&self, path: &Path) -> ImageResult<()> {
        self.to_image()?.save_with_format(path, image::ImageFormat::Png)
    }

    /// All samples in row-major canvas order.
    pub fn samples(&self) -> Vec<[f64; 3]> {
        let mut out = vec![[0.0; 3]; (self.width * self.height) as usize];
        for tile in &self.tiles {
            let tile = tile.lock().unwrap_or_else(PoisonError::into_inner);
            let t = tile.tile;
            for row in 0..t.height {
                let src = (row * t.width) as usize;
                let dst = ((t.y + row) * self.width + t.x) as usize;
                out[dst..dst + t.width as usize]
                    .copy_from_slice(&tile.samples[src..src + t.width as usize]);
            }
        }
        out
    }

    /// Replace all samples from row-major canvas order.
    ///
    /// Returns `false` and leaves the buffer untouched if the size is wrong.
    pub fn set_samples(&self, samples: &[[f64; 3]]) -> bool {
        if samples.len() != (self.width * self.height) as usize {
            return false;
        }
        for tile in &self.tiles {
            let mut tile = tile.lock().unwrap_or_else(PoisonError::into_inner);
            let t = tile.tile;
            for row in 0..t.height {
                let dst = (row * t.width) as usize;
                let src = ((t.y + row) * self.width + t.x) as usize;
                tile.samples[dst..dst + t.width as usize]
                    .copy_from_slice(&samples[src..src + t.width as usize]);
            }
        }
        true
    }

    /// Re-finalize every pixel, then publish.
    pub fn finalize_all<F>(&self, finalize: F)
    where
        F: Fn([f64; 3]) -> [u8; 4] + Sync,
    {
        self.tiles.par_iter().for_each(|tile| {
            let mut tile = tile.lock().unwrap_or_else(PoisonError::into_inner);
            let TileBuffer { samples, pixels, .. } = &mut *tile;
            for (pixel, sample) in pixels.iter_mut().zip(samples.iter()) {
                *pixel = finalize(*sample);
            }
        });
        self.flip();
    }

    /// Zero all samples.
    pub fn clear(&self) {
        self.tiles.par_iter().for_each(|tile| {
            let mut tile = tile.lock().unwrap_or_else(PoisonError::into_inner);
            tile.samples.fill([0.0; 3]);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiles_cover_canvas() {
        let buffer = SampleBuffer::new(70, 40, 32);
        assert_eq!(buffer.tile_count(), 3 * 2);
        let total: usize = (0..buffer.tile_count())
            .map(|i| buffer.tile(i).map(|t| t.samples.len()).unwrap_or(0))
            .sum();
        assert_eq!(total, 70 * 40);
        assert!(buffer.tile(6).is_none());
    }

    #[test]
    fn test_samples_roundtrip_row_major() {
        let buffer = SampleBuffer::new(37, 19, 8);
        let samples: Vec<[f64; 3]> = (0..37 * 19).map(|i| [i as f64, 0.5, -1.0]).collect();
        assert!(buffer.set_samples(&samples));
        assert_eq!(buffer.samples(), samples);
        assert_eq!(buffer.sample(5, 2), [(2 * 37 + 5) as f64, 0.5, -1.0]);
        assert!(!buffer.set_samples(&samples[1..]));
    }

    #[test]
    fn test_flip_publishes_pixels() {
        let buffer = SampleBuffer::new(20, 20, 16);
        {
            let mut tile = buffer.tile(0).unwrap();
            let (x, y) = (tile.tile.x, tile.tile.y);
            let offset = tile.tile.offset(x, y);
            tile.pixels[offset] = [1, 2, 3, 255];
        }
        assert!(buffer.front().iter().all(|p| *p == BLACK));
        buffer.flip();
        assert_eq!(buffer.front().iter().filter(|p| **p == [1, 2, 3, 255]).count(), 1);
    }

    #[test]
    fn test_finalize_all_and_image() {
        let buffer = SampleBuffer::new(4, 3, 2);
        buffer.finalize_all(|_| [9, 8, 7, 255]);
        let image = buffer.to_image().unwrap();
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(image.get_pixel(3, 2).0, [9, 8, 7, 255]);
    }
}
