//! Render dumps: the accumulated samples of an unfinished render.
//!
//! Layout (big-endian, gzip compressed by the caller): i32 width, i32
//! height, i32 spp, i64 render time in milliseconds, then one RGB triple of
//! f64 per pixel with x in the outer loop.

use std::io::{self, Read, Write};

use voxen_core::binary::{invalid_data, read_f64, read_i32, read_i64, write_f64, write_i32, write_i64};

/// Largest canvas side accepted from a dump.
const MAX_DUMP_SIDE: i32 = 1 << 15;

/// Samples reserved up front when reading a dump.
const INITIAL_CAPACITY: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderDump {
    pub width: u32,
    pub height: u32,
    pub spp: u32,
    /// Milliseconds.
    pub render_time: u64,
    /// Per pixel sample means, row-major.
    pub samples: Vec<[f64; 3]>,
}

impl RenderDump {
    pub fn store<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        if self.samples.len() != (self.width * self.height) as usize {
            return Err(invalid_data("sample count does not match dump size"));
        }
        write_i32(out, self.width as i32)?;
        write_i32(out, self.height as i32)?;
        write_i32(out, self.spp as i32)?;
        write_i64(out, self.render_time as i64)?;
        for x in 0..self.width {
            for y in 0..self.height {
                let sample = self.samples[(y * self.width + x) as usize];
                for channel in sample {
                    write_f64(out, channel)?;
                }
            }
        }
        Ok(())
    }

    pub fn load<R: Read + ?Sized>(input: &mut R) -> io::Result<RenderDump> {
        Self::load_checked(input, None)
    }

    /// Load a dump only if it was made for a `width` x `height` canvas.
    ///
    /// The header is checked before any samples are read.
    pub fn load_for_canvas<R: Read + ?Sized>(
        input: &mut R,
        width: u32,
        height: u32,
    ) -> io::Result<RenderDump> {
        Self::load_checked(input, Some((width, height)))
    }

    fn load_checked<R: Read + ?Sized>(
        input: &mut R,
        canvas: Option<(u32, u32)>,
    ) -> io::Result<RenderDump> {
        let width = read_i32(input)?;
        let height = read_i32(input)?;
        if !(1..=MAX_DUMP_SIDE).contains(&width) || !(1..=MAX_DUMP_SIDE).contains(&height) {
            return Err(invalid_data(format!("bad dump size {}x{}", width, height)));
        }
        let (width, height) = (width as u32, height as u32);
        if let Some((w, h)) = canvas {
            if (w, h) != (width, height) {
                return Err(invalid_data(format!(
                    "dump is {}x{} but the canvas is {}x{}",
                    width, height, w, h
                )));
            }
        }
        let spp = read_i32(input)?;
        let render_time = read_i64(input)?;
        if spp < 0 || render_time < 0 {
            return Err(invalid_data("negative dump progress"));
        }

        // The header alone does not prove the payload exists, so grow with
        // the data actually read.
        let count = width as usize * height as usize;
        let mut columns = Vec::with_capacity(count.min(INITIAL_CAPACITY));
        for _ in 0..count {
            columns.push([read_f64(input)?, read_f64(input)?, read_f64(input)?]);
        }

        let mut samples = vec![[0.0; 3]; count];
        for (i, sample) in columns.into_iter().enumerate() {
            let (x, y) = (i / height as usize, i % height as usize);
            samples[y * width as usize + x] = sample;
        }
        Ok(RenderDump {
            width,
            height,
            spp: spp as u32,
            render_time: render_time as u64,
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_store_load() {
        let dump = RenderDump {
            width: 3,
            height: 2,
            spp: 48,
            render_time: 12_345,
            samples: (0..6).map(|i| [i as f64, 0.5 * i as f64, -1.0 / (i + 1) as f64]).collect(),
        };
        let mut bytes = Vec::new();
        dump.store(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 4 * 3 + 8 + 6 * 3 * 8);

        let loaded = RenderDump::load(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(loaded, dump);
    }

    #[test]
    fn test_x_major_order() {
        let dump = RenderDump {
            width: 2,
            height: 2,
            spp: 1,
            render_time: 0,
            samples: vec![[0.0; 3], [1.0; 3], [2.0; 3], [3.0; 3]],
        };
        let mut bytes = Vec::new();
        dump.store(&mut bytes).unwrap();

        // second stored pixel is (x=0, y=1)
        let mut cursor = Cursor::new(&bytes[20 + 24..]);
        assert_eq!(read_f64(&mut cursor).unwrap(), 2.0);
    }

    #[test]
    fn test_rejects_truncated_and_bad_sizes() {
        let dump = RenderDump {
            width: 2,
            height: 1,
            spp: 1,
            render_time: 0,
            samples: vec![[0.0; 3]; 2],
        };
        let mut bytes = Vec::new();
        dump.store(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(RenderDump::load(&mut Cursor::new(bytes)).is_err());

        let mut bad = Vec::new();
        write_i32(&mut bad, 0).unwrap();
        write_i32(&mut bad, 10).unwrap();
        assert!(RenderDump::load(&mut Cursor::new(bad)).is_err());
    }

    #[test]
    fn test_oversized_header_without_samples() {
        let mut bytes = Vec::new();
        write_i32(&mut bytes, MAX_DUMP_SIDE).unwrap();
        write_i32(&mut bytes, MAX_DUMP_SIDE).unwrap();
        write_i32(&mut bytes, 1).unwrap();
        write_i64(&mut bytes, 0).unwrap();
        assert!(RenderDump::load(&mut Cursor::new(&bytes)).is_err());
        assert!(RenderDump::load_for_canvas(&mut Cursor::new(&bytes), 400, 300).is_err());
    }

    #[test]
    fn test_load_for_canvas() {
        let dump = RenderDump {
            width: 3,
            height: 2,
            spp: 4,
            render_time: 10,
            samples: (0..6).map(|i| [i as f64; 3]).collect(),
        };
        let mut bytes = Vec::new();
        dump.store(&mut bytes).unwrap();
        assert_eq!(RenderDump::load_for_canvas(&mut Cursor::new(&bytes), 3, 2).unwrap(), dump);
        assert!(RenderDump::load_for_canvas(&mut Cursor::new(&bytes), 2, 3).is_err());
    }
}
