//! Saving and loading scenes with their companion files.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use image::ImageResult;
use thiserror::Error;
use voxen_core::{ChunkPosition, Octree, SceneDescription, SceneFormatError, WorldTexture};

use crate::context::{RenderContext, DUMP_SUFFIX, FOLIAGE_SUFFIX, GRASS_SUFFIX, OCTREE_SUFFIX};
use crate::dump::RenderDump;
use crate::postprocess;
use crate::status::RenderStatusListener;
use crate::Scene;

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Format(#[from] SceneFormatError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type SceneResult<T> = Result<T, SceneError>;

impl Scene {
    /// Write the description and every companion file.
    pub fn save_scene(&self, context: &RenderContext, listener: &dyn RenderStatusListener) -> SceneResult<()> {
        let name = self.name.as_str();
        listener.set_progress("Saving scene", 0, 0, 4);
        self.save_description(context)?;

        if self.have_loaded_chunks() {
            listener.set_progress("Saving octree", 1, 0, 4);
            self.save_octree(context)?;
            listener.set_progress("Saving grass texture", 2, 0, 4);
            context.write_gzip(&context.file(name, GRASS_SUFFIX), |w| self.grass_texture.store(w))?;
            listener.set_progress("Saving foliage texture", 3, 0, 4);
            context.write_gzip(&context.file(name, FOLIAGE_SUFFIX), |w| self.foliage_texture.store(w))?;
        }
        if self.spp > 0 {
            self.save_dump(context)?;
        }
        listener.set_progress("Saving scene", 4, 0, 4);
        log::info!("Saved scene {} to {}", name, context.scene_dir().display());
        Ok(())
    }

    pub fn save_description(&self, context: &RenderContext) -> SceneResult<()> {
        let mut out = context.create(&context.scene_file(&self.name))?;
        self.to_description().write(&mut out)?;
        out.flush()?;
        Ok(())
    }

    pub fn save_octree(&self, context: &RenderContext) -> io::Result<()> {
        let path = context.file(&self.name, OCTREE_SUFFIX);
        context.write_gzip(&path, |w| self.octree.store(w))?;
        log::info!("Octree saved to {}", path.display());
        Ok(())
    }

    pub fn save_dump(&self, context: &RenderContext) -> io::Result<()> {
        let path = context.file(&self.name, DUMP_SUFFIX);
        context.write_gzip(&path, |w| self.render_dump().store(w))?;
        log::info!("Render dump saved to {}", path.display());
        Ok(())
    }

    /// Write the current front buffer as a PNG.
    pub fn save_frame(&self, path: &Path) -> ImageResult<()> {
        self.buffer.save_png(path)?;
        log::info!("Saved frame to {}", path.display());
        Ok(())
    }

    /// Load the scene called `name`.
    ///
    /// A missing or incompatible description is an error. Missing or
    /// unreadable companion files are not: the octree falls back to
    /// reloading chunks from the current world, missing biome textures
    /// turn biome colours off, and a missing dump starts a fresh render.
    pub fn load_scene(
        &mut self,
        context: &RenderContext,
        name: &str,
        listener: &dyn RenderStatusListener,
    ) -> SceneResult<()> {
        let file = std::fs::File::open(context.scene_file(name))?;
        let desc = SceneDescription::read(io::BufReader::new(file))?;
        self.apply_description(&desc);
        let chunks: Vec<ChunkPosition> = desc.chunk_list.iter().map(|&c| ChunkPosition::from_long(c)).collect();

        listener.set_progress("Loading octree", 0, 0, 3);
        match context.read_gzip(&context.file(name, OCTREE_SUFFIX), |r| Octree::load(r)) {
            Ok(octree) => {
                log::info!("Loaded octree of depth {}", octree.depth());
                self.octree = Arc::new(octree);
                self.loaded_chunks = Arc::new(chunks.iter().copied().collect());
            }
            Err(e) => {
                log::warn!("Could not load octree: {}", e);
                match self.world.clone() {
                    Some(world) => {
                        log::info!("Reloading {} chunks", chunks.len());
                        self.load_chunks(world, &chunks, listener);
                    }
                    None => log::warn!("No world to reload chunks from"),
                }
            }
        }

        listener.set_progress("Loading biome textures", 1, 0, 3);
        let grass = context.read_gzip(&context.file(name, GRASS_SUFFIX), |r| WorldTexture::load(r));
        let foliage = context.read_gzip(&context.file(name, FOLIAGE_SUFFIX), |r| WorldTexture::load(r));
        match (grass, foliage) {
            (Ok(grass), Ok(foliage)) => {
                self.grass_texture = Arc::new(grass);
                self.foliage_texture = Arc::new(foliage);
            }
            (Err(e), _) | (_, Err(e)) => {
                if self.grass_texture.is_empty() {
                    log::warn!("Could not load biome textures ({}), disabling biome colors", e);
                    self.biome_colors = false;
                }
            }
        }

        listener.set_progress("Loading render dump", 2, 0, 3);
        if self.path_trace || self.spp > 0 {
            self.load_dump(context);
        }
        listener.set_progress("Loading scene", 3, 0, 3);

        // keep the restored progress
        self.soft_refresh();
        log::info!("Loaded scene {}", name);
        Ok(())
    }

    /// Resume accumulation from the dump file, if it matches the canvas.
    ///
    /// On failure the render starts over.
    pub fn load_dump(&mut self, context: &RenderContext) -> bool {
        let path = context.file(&self.name, DUMP_SUFFIX);
        let (width, height) = (self.width, self.height);
        let loaded = match context.read_gzip(&path, |r| RenderDump::load_for_canvas(r, width, height)) {
            Ok(dump) => self.apply_dump(dump),
            Err(e) => {
                log::warn!("Could not load render dump {}: {}", path.display(), e);
                false
            }
        };
        if !loaded {
            self.spp = 0;
            self.render_time = 0;
            self.buffer.clear();
        }
        loaded
    }

    pub fn render_dump(&self) -> RenderDump {
        RenderDump {
            width: self.width,
            height: self.height,
            spp: self.spp,
            render_time: self.render_time,
            samples: self.buffer.samples(),
        }
    }

    /// Take over the samples of a dump. Dumps for another canvas size are
    /// discarded.
    pub fn apply_dump(&mut self, dump: RenderDump) -> bool {
        if dump.width != self.width || dump.height != self.height {
            log::warn!(
                "Render dump is {}x{} but the canvas is {}x{}, discarding it",
                dump.width,
                dump.height,
                self.width,
                self.height
            );
            return false;
        }
        if !self.buffer.set_samples(&dump.samples) {
            return false;
        }
        self.spp = dump.spp;
        self.render_time = dump.render_time;
        log::info!("Render dump loaded: {} spp", dump.spp);
        self.finalize_all_pixels();
        true
    }

    /// Tone map every pixel of the sample buffer and show the result.
    pub fn finalize_all_pixels(&self) {
        let exposure = self.exposure;
        let mode = self.postprocess;
        let path_trace = self.path_trace;
        self.buffer
            .finalize_all(|sample| postprocess::finalize(sample, exposure, mode, path_trace));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::LogStatusListener;
    use tempfile::tempdir;
    use voxen_core::material::ids;
    use voxen_core::{ChunkData, MemoryWorld};

    fn world() -> (Arc<MemoryWorld>, Vec<ChunkPosition>) {
        let mut world = MemoryWorld::new();
        let mut chunk = ChunkData::new();
        for x in 0..16 {
            for z in 0..16 {
                chunk.set_block(x, 0, z, ids::GRASS, 0);
            }
        }
        chunk.set_biome(4, 4, 4);
        world.insert(ChunkPosition::new(2, -1), chunk);
        let positions = world.positions();
        (Arc::new(world), positions)
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let context = RenderContext::new(dir.path());
        let (world, positions) = world();

        let mut scene = Scene::new();
        scene.set_name("roundtrip");
        scene.set_canvas_size(24, 20);
        scene.load_chunks(world, &positions, &LogStatusListener);
        scene.start_render();
        scene.spp = 16;
        scene.render_time = 4_000;
        let samples: Vec<[f64; 3]> = (0..24 * 20).map(|i| [i as f64 / 480.0, 0.25, 0.5]).collect();
        assert!(scene.buffer.set_samples(&samples));
        scene.save_scene(&context, &LogStatusListener).unwrap();

        let mut loaded = Scene::new();
        loaded.load_scene(&context, "roundtrip", &LogStatusListener).unwrap();
        assert_eq!(**loaded.octree(), **scene.octree());
        assert_eq!(*loaded.grass_texture(), *scene.grass_texture());
        assert_eq!(loaded.loaded_chunks(), scene.loaded_chunks());
        assert_eq!(loaded.origin(), scene.origin());
        assert_eq!(loaded.spp(), 16);
        assert_eq!(loaded.render_time(), 4_000);
        assert_eq!(loaded.buffer().samples(), samples);
        assert!(loaded.is_path_tracing());
        assert!(loaded.biome_colors());
    }

    #[test]
    fn test_missing_companions_are_soft() {
        let dir = tempdir().unwrap();
        let context = RenderContext::new(dir.path());

        let mut scene = Scene::new();
        scene.set_name("bare");
        scene.spp = 10;
        scene.path_trace = true;
        scene.save_description(&context).unwrap();

        let mut loaded = Scene::new();
        loaded.load_scene(&context, "bare", &LogStatusListener).unwrap();
        assert_eq!(loaded.spp(), 0);
        assert!(!loaded.biome_colors());
    }

    #[test]
    fn test_missing_description_is_an_error() {
        let dir = tempdir().unwrap();
        let context = RenderContext::new(dir.path());
        let mut scene = Scene::new();
        let result = scene.load_scene(&context, "nothing", &LogStatusListener);
        assert!(matches!(result, Err(SceneError::Io(_))));
    }

    #[test]
    fn test_incompatible_version_is_an_error() {
        let dir = tempdir().unwrap();
        let context = RenderContext::new(dir.path());
        std::fs::write(context.scene_file("old"), r#"{"version": 0, "name": "old"}"#).unwrap();

        let mut scene = Scene::new();
        let result = scene.load_scene(&context, "old", &LogStatusListener);
        assert!(matches!(
            result,
            Err(SceneError::Format(SceneFormatError::IncompatibleVersion { found: 0, .. }))
        ));
    }

    #[test]
    fn test_dump_of_other_size_is_discarded() {
        let mut scene = Scene::new();
        scene.set_canvas_size(30, 30);
        let dump = RenderDump {
            width: 20,
            height: 20,
            spp: 5,
            render_time: 10,
            samples: vec![[1.0; 3]; 400],
        };
        assert!(!scene.apply_dump(dump));
        assert_eq!(scene.spp(), 0);
    }

    #[test]
    fn test_corrupt_dump_starts_fresh() {
        use voxen_core::binary::{write_i32, write_i64};

        let dir = tempdir().unwrap();
        let context = RenderContext::new(dir.path());
        let mut scene = Scene::new();
        scene.set_name("corrupt");
        scene.set_canvas_size(24, 20);
        scene.spp = 3;

        // header claims a huge canvas with no samples behind it
        let path = context.file("corrupt", DUMP_SUFFIX);
        context
            .write_gzip(&path, |w| {
                write_i32(w, 1 << 15)?;
                write_i32(w, 1 << 15)?;
                write_i32(w, 1)?;
                write_i64(w, 0)
            })
            .unwrap();

        assert!(!scene.load_dump(&context));
        assert_eq!(scene.spp(), 0);
        assert_eq!(scene.buffer().samples().len(), 24 * 20);
    }
}
