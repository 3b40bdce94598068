//! Render worker threads.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use voxen_math::DVec3;

use crate::jobs::{Job, JobQueue, Pass};
use crate::postprocess;
use crate::sample_buffer::TileBuffer;
use crate::Scene;

/// One thread of the render pool.
///
/// Workers read the buffered scene and write only the tile they claimed.
pub struct RenderWorker {
    id: usize,
    handle: JoinHandle<()>,
}

impl RenderWorker {
    pub(crate) fn spawn(
        id: usize,
        seed: u64,
        queue: Arc<JobQueue>,
        scene: Arc<RwLock<Scene>>,
    ) -> io::Result<Self> {
        let handle = thread::Builder::new()
            .name(format!("render-worker-{}", id))
            .spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(id as u64));
                work(id, &queue, &scene, &mut rng);
            })?;
        Ok(Self { id, handle })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn join(self) {
        if self.handle.join().is_err() {
            log::error!("Render worker {} exited abnormally", self.id);
        }
    }
}

fn work(id: usize, queue: &JobQueue, scene: &RwLock<Scene>, rng: &mut StdRng) {
    while let Some(job) = queue.next_job() {
        {
            let scene = scene.read().unwrap_or_else(PoisonError::into_inner);
            let result = panic::catch_unwind(AssertUnwindSafe(|| render_job(&scene, job, rng)));
            if let Err(payload) = result {
                // the tile keeps whatever it had; the frame still completes
                log::error!(
                    "Render worker {} panicked on tile {}: {}",
                    id,
                    job.id,
                    panic_message(payload.as_ref())
                );
            }
        }
        queue.job_done();
    }
    log::debug!("Render worker {} stopped", id);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

pub(crate) fn render_job(scene: &Scene, job: Job, rng: &mut dyn RngCore) {
    let Some(mut tile) = scene.buffer.tile(job.id) else {
        log::warn!("No tile for job {}", job.id);
        return;
    };
    match job.pass {
        Pass::Preview { first } => preview_tile(scene, &mut tile, first, rng),
        Pass::PathTrace { samples, finalize } => path_trace_tile(scene, &mut tile, samples, finalize, rng),
    }
}

/// Normalized view coordinates of a canvas position.
fn view_coords(scene: &Scene, x: f64, y: f64) -> (f64, f64) {
    let height = scene.height as f64;
    let half_width = scene.width as f64 / (2.0 * height);
    (-half_width + x / height, -0.5 + y / height)
}

fn preview_tile(scene: &Scene, buffer: &mut TileBuffer, first: bool, rng: &mut dyn RngCore) {
    let TileBuffer { tile, samples, pixels } = buffer;
    let skipped = |x: u32, y: u32| first && (x + y) % 2 == 1;

    for y in tile.y..tile.y + tile.height {
        for x in tile.x..tile.x + tile.width {
            // the checkerboard leaves a neighbour on at least one side
            if skipped(x, y) && tile.width > 1 {
                continue;
            }
            let (vx, vy) = view_coords(scene, x as f64 + 0.5, y as f64 + 0.5);
            let mut ray = scene.camera.calc_view_ray(vx, vy, rng);
            scene.quick_trace(&mut ray);
            let sample = ray.color.truncate().to_array();
            let i = tile.offset(x, y);
            samples[i] = sample;
            pixels[i] = postprocess::finalize(sample, scene.exposure, scene.postprocess, false);
        }
    }

    if first && tile.width > 1 {
        for y in tile.y..tile.y + tile.height {
            for x in tile.x..tile.x + tile.width {
                if !skipped(x, y) {
                    continue;
                }
                let neighbour = if x > tile.x { x - 1 } else { x + 1 };
                let (i, j) = (tile.offset(x, y), tile.offset(neighbour, y));
                samples[i] = samples[j];
                pixels[i] = pixels[j];
            }
        }
    }
}

fn path_trace_tile(scene: &Scene, buffer: &mut TileBuffer, spp: u32, finalize: bool, rng: &mut dyn RngCore) {
    let TileBuffer { tile, samples, pixels } = buffer;
    let prev = scene.spp as f64;
    let pass = spp as f64;

    for y in tile.y..tile.y + tile.height {
        for x in tile.x..tile.x + tile.width {
            let mut sum = DVec3::ZERO;
            for _ in 0..spp {
                let jx: f64 = rng.gen();
                let jy: f64 = rng.gen();
                let (vx, vy) = view_coords(scene, x as f64 + jx, y as f64 + jy);
                let mut ray = scene.camera.calc_view_ray(vx, vy, rng);
                scene.path_trace(&mut ray, rng);
                sum += ray.color.truncate();
            }

            let i = tile.offset(x, y);
            let mean = (DVec3::from_array(samples[i]) * prev + sum) / (prev + pass);
            samples[i] = mean.to_array();
            if finalize {
                pixels[i] = postprocess::finalize(samples[i], scene.exposure, scene.postprocess, true);
            }
        }
    }
}
