//! The renderable scene: voxel data, view, lighting and render settings.
//!
//! A `Scene` is cheap to clone. The octree, textures and sample buffer are
//! shared behind `Arc`s and replaced wholesale, never edited in place, so the
//! manager can snapshot the live scene into the buffered one each frame.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use voxen_core::description::{
    CanvasDescription, LightingDescription, RenderDescription, SceneDescription, WorldDescription,
};
use voxen_core::{
    BiomeColors, ChunkPosition, ChunkSource, MaterialRegistry, Octree, Postprocess, StandardBiomes,
    WorldTexture,
};
use voxen_math::{DVec3, IVec3};

use crate::camera::Camera;
use crate::sample_buffer::SampleBuffer;
use crate::sky::Sky;
use crate::sun::Sun;
use crate::tile::DEFAULT_TILE_WIDTH;
use crate::Ray;

pub const DEFAULT_EXPOSURE: f64 = 1.0;
pub const MIN_EXPOSURE: f64 = 0.001;
pub const MAX_EXPOSURE: f64 = 1000.0;

pub const DEFAULT_EMITTER_INTENSITY: f64 = 13.0;
pub const MIN_EMITTER_INTENSITY: f64 = 0.01;
pub const MAX_EMITTER_INTENSITY: f64 = 1000.0;

pub const DEFAULT_RAY_DEPTH: u32 = 5;
pub const MAX_RAY_DEPTH: u32 = 25;

pub const DEFAULT_WATER_VISIBILITY: f64 = 9.0;
pub const DEFAULT_SPP_TARGET: u32 = 1000;
pub const DEFAULT_DUMP_FREQUENCY: u32 = 500;

pub const DEFAULT_CANVAS_WIDTH: u32 = 400;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 400;
pub const MIN_CANVAS_WIDTH: u32 = 20;
pub const MIN_CANVAS_HEIGHT: u32 = 20;

/// Octree depth used before any chunks are loaded.
const EMPTY_OCTREE_DEPTH: u32 = 8;

/// Camera height used when no chunks are loaded.
const CENTER_CAMERA_Y: f64 = 128.0;

#[derive(Clone)]
pub struct Scene {
    pub(crate) name: String,

    // World
    pub(crate) octree: Arc<Octree>,
    pub(crate) materials: Arc<MaterialRegistry>,
    pub(crate) biomes: Arc<dyn BiomeColors>,
    pub(crate) grass_texture: Arc<WorldTexture>,
    pub(crate) foliage_texture: Arc<WorldTexture>,
    pub(crate) loaded_chunks: Arc<HashSet<ChunkPosition>>,
    pub(crate) world: Option<Arc<dyn ChunkSource>>,
    /// World coordinates of octree voxel (0, 0, 0).
    pub(crate) origin: IVec3,

    pub(crate) camera: Camera,
    pub(crate) sun: Sun,
    pub(crate) sky: Sky,

    // Canvas
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) tile_width: u32,
    pub(crate) buffer: Arc<SampleBuffer>,
    pub(crate) exposure: f64,
    pub(crate) postprocess: Postprocess,

    // Lighting
    pub(crate) sun_enabled: bool,
    pub(crate) emitters_enabled: bool,
    pub(crate) emitter_intensity: f64,
    pub(crate) still_water: bool,
    pub(crate) clear_water: bool,
    pub(crate) water_height: i32,
    pub(crate) water_visibility: f64,
    pub(crate) biome_colors: bool,
    pub(crate) atmosphere: bool,
    pub(crate) volumetric_fog: bool,
    pub(crate) ray_depth: u32,

    // Render state
    pub(crate) path_trace: bool,
    pub(crate) paused: bool,
    pub(crate) refresh: bool,
    pub(crate) finalize_buffer: bool,
    pub(crate) spp: u32,
    pub(crate) spp_target: u32,
    /// Milliseconds spent rendering the current accumulation.
    pub(crate) render_time: u64,
    pub(crate) dump_frequency: u32,
    pub(crate) save_dumps: bool,
}

impl Scene {
    pub fn new() -> Self {
        Self::with_materials(Arc::new(MaterialRegistry::standard()))
    }

    pub fn with_materials(materials: Arc<MaterialRegistry>) -> Self {
        Self {
            name: "default".to_string(),
            octree: Arc::new(Octree::new(EMPTY_OCTREE_DEPTH)),
            materials,
            biomes: Arc::new(StandardBiomes),
            grass_texture: Arc::new(WorldTexture::new()),
            foliage_texture: Arc::new(WorldTexture::new()),
            loaded_chunks: Arc::new(HashSet::new()),
            world: None,
            origin: IVec3::ZERO,
            camera: Camera::new().with_position(DVec3::new(0.0, CENTER_CAMERA_Y, 0.0)),
            sun: Sun::new(),
            sky: Sky::new(),
            width: DEFAULT_CANVAS_WIDTH,
            height: DEFAULT_CANVAS_HEIGHT,
            tile_width: DEFAULT_TILE_WIDTH,
            buffer: Arc::new(SampleBuffer::new(
                DEFAULT_CANVAS_WIDTH,
                DEFAULT_CANVAS_HEIGHT,
                DEFAULT_TILE_WIDTH,
            )),
            exposure: DEFAULT_EXPOSURE,
            postprocess: Postprocess::default(),
            sun_enabled: true,
            emitters_enabled: false,
            emitter_intensity: DEFAULT_EMITTER_INTENSITY,
            still_water: false,
            clear_water: false,
            water_height: 0,
            water_visibility: DEFAULT_WATER_VISIBILITY,
            biome_colors: true,
            atmosphere: false,
            volumetric_fog: false,
            ray_depth: DEFAULT_RAY_DEPTH,
            path_trace: false,
            paused: false,
            refresh: false,
            finalize_buffer: true,
            spp: 0,
            spp_target: DEFAULT_SPP_TARGET,
            render_time: 0,
            dump_frequency: DEFAULT_DUMP_FREQUENCY,
            save_dumps: true,
        }
    }

    /// Copy the settings that may change mid-render without a restart.
    pub fn copy_transients(&mut self, other: &Scene) {
        self.name.clone_from(&other.name);
        self.exposure = other.exposure;
        self.postprocess = other.postprocess;
        self.spp_target = other.spp_target;
        self.dump_frequency = other.dump_frequency;
        self.save_dumps = other.save_dumps;
    }

    // --- render state -----------------------------------------------------

    /// Restart rendering from scratch.
    pub fn refresh(&mut self) {
        self.refresh = true;
        self.paused = false;
        self.spp = 0;
        self.render_time = 0;
    }

    /// Request a new frame without discarding the accumulated samples.
    pub fn soft_refresh(&mut self) {
        self.refresh = true;
    }

    pub fn should_refresh(&self) -> bool {
        self.refresh
    }

    pub(crate) fn clear_refresh(&mut self) {
        self.refresh = false;
    }

    /// Switch from preview to path tracing.
    pub fn start_render(&mut self) {
        if !self.path_trace {
            self.path_trace = true;
            self.refresh();
        }
    }

    pub fn pause_render(&mut self) {
        self.paused = true;
    }

    pub fn resume_render(&mut self) {
        self.paused = false;
    }

    /// Stop path tracing and go back to preview.
    pub fn halt_render(&mut self) {
        if self.path_trace {
            self.path_trace = false;
            self.refresh();
        }
    }

    pub fn toggle_path_trace(&mut self) {
        self.path_trace = !self.path_trace;
        self.refresh();
    }

    pub fn is_path_tracing(&self) -> bool {
        self.path_trace
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn spp(&self) -> u32 {
        self.spp
    }

    pub fn render_time(&self) -> u64 {
        self.render_time
    }

    pub fn set_finalize_buffer(&mut self, finalize: bool) {
        self.finalize_buffer = finalize;
    }

    // --- accessors --------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn octree(&self) -> &Arc<Octree> {
        &self.octree
    }

    pub fn materials(&self) -> &MaterialRegistry {
        &self.materials
    }

    pub fn origin(&self) -> IVec3 {
        self.origin
    }

    pub fn set_biome_source(&mut self, biomes: Arc<dyn BiomeColors>) {
        self.biomes = biomes;
    }

    pub fn grass_texture(&self) -> &WorldTexture {
        &self.grass_texture
    }

    pub fn foliage_texture(&self) -> &WorldTexture {
        &self.foliage_texture
    }

    pub fn loaded_chunks(&self) -> &HashSet<ChunkPosition> {
        &self.loaded_chunks
    }

    pub fn have_loaded_chunks(&self) -> bool {
        !self.loaded_chunks.is_empty()
    }

    pub fn world(&self) -> Option<&Arc<dyn ChunkSource>> {
        self.world.as_ref()
    }

    /// World to reload chunks from when a saved octree is missing.
    pub fn set_world(&mut self, world: Arc<dyn ChunkSource>) {
        self.world = Some(world);
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Mutable camera access; the view changes, so rendering restarts.
    pub fn camera_mut(&mut self) -> &mut Camera {
        self.refresh();
        &mut self.camera
    }

    pub fn sun(&self) -> &Sun {
        &self.sun
    }

    pub fn sun_mut(&mut self) -> &mut Sun {
        self.refresh();
        &mut self.sun
    }

    pub fn sky(&self) -> &Sky {
        &self.sky
    }

    pub fn sky_mut(&mut self) -> &mut Sky {
        self.refresh();
        &mut self.sky
    }

    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
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

    /// Resize the canvas; sizes below the minimum are raised to it.
    pub fn set_canvas_size(&mut self, width: u32, height: u32) {
        self.width = width.max(MIN_CANVAS_WIDTH);
        self.height = height.max(MIN_CANVAS_HEIGHT);
        self.buffer = Arc::new(SampleBuffer::new(self.width, self.height, self.tile_width));
        self.refresh();
    }

    /// Re-tile the sample buffer. Accumulated samples and progress are
    /// kept; a running render picks the new tiles up on its next refresh.
    pub fn set_tile_width(&mut self, tile_width: u32) {
        let tile_width = tile_width.max(1);
        if tile_width != self.tile_width {
            let buffer = SampleBuffer::new(self.width, self.height, tile_width);
            buffer.set_samples(&self.buffer.samples());
            self.tile_width = tile_width;
            self.buffer = Arc::new(buffer);
            self.finalize_all_pixels();
        }
    }

    pub fn exposure(&self) -> f64 {
        self.exposure
    }

    pub fn set_exposure(&mut self, exposure: f64) {
        self.exposure = exposure.clamp(MIN_EXPOSURE, MAX_EXPOSURE);
    }

    pub fn postprocess(&self) -> Postprocess {
        self.postprocess
    }

    pub fn set_postprocess(&mut self, postprocess: Postprocess) {
        self.postprocess = postprocess;
    }

    pub fn spp_target(&self) -> u32 {
        self.spp_target
    }

    pub fn set_spp_target(&mut self, target: u32) {
        self.spp_target = target.max(1);
    }

    pub fn dump_frequency(&self) -> u32 {
        self.dump_frequency
    }

    pub fn set_dump_frequency(&mut self, frequency: u32) {
        self.dump_frequency = frequency.max(1);
    }

    pub fn save_dumps(&self) -> bool {
        self.save_dumps
    }

    pub fn set_save_dumps(&mut self, save: bool) {
        self.save_dumps = save;
    }

    pub fn sun_enabled(&self) -> bool {
        self.sun_enabled
    }

    pub fn set_sun_enabled(&mut self, enabled: bool) {
        if enabled != self.sun_enabled {
            self.sun_enabled = enabled;
            self.refresh();
        }
    }

    pub fn emitters_enabled(&self) -> bool {
        self.emitters_enabled
    }

    pub fn set_emitters_enabled(&mut self, enabled: bool) {
        if enabled != self.emitters_enabled {
            self.emitters_enabled = enabled;
            self.refresh();
        }
    }

    pub fn emitter_intensity(&self) -> f64 {
        self.emitter_intensity
    }

    pub fn set_emitter_intensity(&mut self, intensity: f64) {
        self.emitter_intensity = intensity.clamp(MIN_EMITTER_INTENSITY, MAX_EMITTER_INTENSITY);
        self.refresh();
    }

    pub fn still_water(&self) -> bool {
        self.still_water
    }

    pub fn set_still_water(&mut self, still: bool) {
        if still != self.still_water {
            self.still_water = still;
            self.refresh();
        }
    }

    pub fn clear_water(&self) -> bool {
        self.clear_water
    }

    pub fn set_clear_water(&mut self, clear: bool) {
        if clear != self.clear_water {
            self.clear_water = clear;
            self.refresh();
        }
    }

    /// World height of the water plane; zero disables it.
    pub fn water_height(&self) -> i32 {
        self.water_height
    }

    /// Changing the water height only takes effect on the next chunk reload.
    pub fn set_water_height(&mut self, height: i32) {
        self.water_height = height.max(0);
    }

    pub fn water_visibility(&self) -> f64 {
        self.water_visibility
    }

    pub fn set_water_visibility(&mut self, visibility: f64) {
        self.water_visibility = visibility.max(0.01);
        self.refresh();
    }

    pub fn biome_colors(&self) -> bool {
        self.biome_colors
    }

    pub fn set_biome_colors(&mut self, enabled: bool) {
        if enabled != self.biome_colors {
            self.biome_colors = enabled;
            self.refresh();
        }
    }

    pub fn atmosphere(&self) -> bool {
        self.atmosphere
    }

    pub fn set_atmosphere(&mut self, enabled: bool) {
        if enabled != self.atmosphere {
            self.atmosphere = enabled;
            self.refresh();
        }
    }

    pub fn volumetric_fog(&self) -> bool {
        self.volumetric_fog
    }

    pub fn set_volumetric_fog(&mut self, enabled: bool) {
        if enabled != self.volumetric_fog {
            self.volumetric_fog = enabled;
            self.refresh();
        }
    }

    pub fn ray_depth(&self) -> u32 {
        self.ray_depth
    }

    pub fn set_ray_depth(&mut self, depth: u32) {
        let depth = depth.clamp(1, MAX_RAY_DEPTH);
        if depth != self.ray_depth {
            self.ray_depth = depth;
            self.refresh();
        }
    }

    // --- camera helpers ---------------------------------------------------

    /// World position above the centre of the loaded chunks.
    pub fn center_camera_position(&self) -> DVec3 {
        if self.loaded_chunks.is_empty() {
            return DVec3::new(0.0, CENTER_CAMERA_Y, 0.0);
        }
        let (mut xmin, mut xmax) = (i32::MAX, i32::MIN);
        let (mut zmin, mut zmax) = (i32::MAX, i32::MIN);
        for pos in self.loaded_chunks.iter() {
            xmin = xmin.min(pos.x);
            xmax = xmax.max(pos.x);
            zmin = zmin.min(pos.z);
            zmax = zmax.max(pos.z);
        }
        let (xmin, xmax) = (xmin * 16, (xmax + 1) * 16);
        let (zmin, zmax) = (zmin * 16, (zmax + 1) * 16);
        DVec3::new(
            ((xmin + xmax) / 2) as f64,
            CENTER_CAMERA_Y,
            ((zmin + zmax) / 2) as f64,
        )
    }

    pub fn move_camera_to_center(&mut self) {
        let center = self.center_camera_position();
        self.camera_mut().set_position(center);
    }

    /// Follow the centre view ray until it hits something that is not air.
    ///
    /// The returned ray is in octree coordinates.
    pub fn trace(&self, ray: &mut Ray) {
        ray.o = self.camera.position() - self.origin.as_dvec3();
        ray.d = self.camera.view_direction();
        while self.intersect(ray) {
            if ray.current() != voxen_core::voxel::AIR {
                ray.hit = true;
                break;
            }
        }
    }

    /// Focus the camera on whatever is in the centre of the view.
    pub fn auto_focus(&mut self) {
        let mut ray = Ray::default();
        self.trace(&mut ray);
        let camera = self.camera_mut();
        if ray.hit {
            camera.set_focal_offset(ray.distance);
            camera.set_dof(ray.distance);
            camera.set_infinite_dof(false);
        } else {
            camera.set_infinite_dof(true);
        }
    }

    // --- description ------------------------------------------------------

    /// Settings of this scene as a description, chunk list sorted.
    pub fn to_description(&self) -> SceneDescription {
        let mut chunks: Vec<ChunkPosition> = self.loaded_chunks.iter().copied().collect();
        chunks.sort();
        let mut desc = SceneDescription::new(self.name.clone());
        desc.canvas = CanvasDescription {
            width: self.width,
            height: self.height,
            exposure: self.exposure,
            postprocess: self.postprocess,
        };
        desc.camera = self.camera.to_description();
        desc.sun = self.sun.to_description();
        desc.sky = self.sky.to_description();
        desc.world = WorldDescription {
            path: self
                .world
                .as_ref()
                .and_then(|w| w.path())
                .map(|p| p.display().to_string()),
            dimension: self.world.as_ref().map_or(0, |w| w.dimension()),
            origin: self.origin.to_array(),
        };
        desc.render = RenderDescription {
            path_trace: self.path_trace,
            paused: self.paused,
            spp: self.spp,
            spp_target: self.spp_target,
            render_time_ms: self.render_time,
            dump_frequency: self.dump_frequency,
            save_dumps: self.save_dumps,
            ray_depth: self.ray_depth,
        };
        desc.lighting = LightingDescription {
            sun_enabled: self.sun_enabled,
            emitters_enabled: self.emitters_enabled,
            emitter_intensity: self.emitter_intensity,
            still_water: self.still_water,
            clear_water: self.clear_water,
            water_height: self.water_height,
            water_visibility: self.water_visibility,
            biome_colors: self.biome_colors,
            atmosphere: self.atmosphere,
            volumetric_fog: self.volumetric_fog,
        };
        desc.chunk_list = chunks.iter().map(|c| c.to_long()).collect();
        desc
    }

    /// Apply the settings of a description. World data is not touched.
    pub fn apply_description(&mut self, desc: &SceneDescription) {
        self.name.clone_from(&desc.name);
        if desc.canvas.width != self.width || desc.canvas.height != self.height {
            self.set_canvas_size(desc.canvas.width, desc.canvas.height);
        }
        self.set_exposure(desc.canvas.exposure);
        self.postprocess = desc.canvas.postprocess;
        self.camera = Camera::from_description(&desc.camera);
        self.sun = Sun::from_description(&desc.sun);
        self.sky = Sky::from_description(&desc.sky);
        self.origin = IVec3::from_array(desc.world.origin);

        let render = &desc.render;
        self.path_trace = render.path_trace;
        self.paused = render.paused;
        self.spp = render.spp;
        self.spp_target = render.spp_target.max(1);
        self.render_time = render.render_time_ms;
        self.dump_frequency = render.dump_frequency.max(1);
        self.save_dumps = render.save_dumps;
        self.ray_depth = render.ray_depth.clamp(1, MAX_RAY_DEPTH);

        let lighting = &desc.lighting;
        self.sun_enabled = lighting.sun_enabled;
        self.emitters_enabled = lighting.emitters_enabled;
        self.emitter_intensity = lighting
            .emitter_intensity
            .clamp(MIN_EMITTER_INTENSITY, MAX_EMITTER_INTENSITY);
        self.still_water = lighting.still_water;
        self.clear_water = lighting.clear_water;
        self.water_height = lighting.water_height.max(0);
        self.water_visibility = lighting.water_visibility.max(0.01);
        self.biome_colors = lighting.biome_colors;
        self.atmosphere = lighting.atmosphere;
        self.volumetric_fog = lighting.volumetric_fog;
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("octree_depth", &self.octree.depth())
            .field("origin", &self.origin)
            .field("chunks", &self.loaded_chunks.len())
            .field("canvas", &(self.width, self.height))
            .field("path_trace", &self.path_trace)
            .field("paused", &self.paused)
            .field("spp", &self.spp)
            .finish_non_exhaustive()
    }
}
