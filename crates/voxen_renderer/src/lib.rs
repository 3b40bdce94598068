//! Voxen Renderer - CPU path tracing of voxel octrees.
//!
//! A [`Scene`] holds the octree built from world chunks together with the
//! camera, sun and sky. It can be rendered interactively with the cheap
//! [`Scene::quick_trace`] preview or accumulated with the Monte Carlo
//! [`Scene::path_trace`] integrator. [`RenderManager`] runs either over a
//! pool of worker threads, one tile at a time, and writes checkpoints that
//! let a render resume later.

mod camera;
mod context;
mod dump;
mod intersect;
mod jobs;
mod loader;
mod manager;
mod path_tracer;
mod ray;
mod sample_buffer;
mod scene;
mod scene_io;
mod sky;
mod status;
mod sun;
mod worker;

pub mod postprocess;
pub mod scatter;
pub mod tile;

pub use camera::Camera;
pub use context::{
    backup_file, RenderContext, BACKUP_SUFFIX, DUMP_SUFFIX, FOLIAGE_SUFFIX, GRASS_SUFFIX, OCTREE_SUFFIX,
    SCENE_SUFFIX,
};
pub use dump::RenderDump;
pub use manager::{RenderConfig, RenderManager, SharedScene};
pub use ray::Ray;
pub use sample_buffer::{SampleBuffer, TileBuffer};
pub use scene::{
    Scene, DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH, DEFAULT_DUMP_FREQUENCY, DEFAULT_EXPOSURE,
    DEFAULT_RAY_DEPTH, DEFAULT_SPP_TARGET, MAX_RAY_DEPTH,
};
pub use scene_io::{SceneError, SceneResult};
pub use sky::Sky;
pub use status::{format_duration, LogStatusListener, RenderState, RenderStatusListener};
pub use sun::Sun;
pub use tile::{Tile, DEFAULT_TILE_WIDTH};
pub use worker::RenderWorker;

/// Re-export the world and math crates the renderer is built on
pub use voxen_core;
pub use voxen_math;
