//! The render manager: one conductor thread driving a pool of workers.
//!
//! The live scene is edited by the caller. Before every frame the conductor
//! copies it into the buffered scene, which the workers read while they
//! trace. A refresh on the live scene makes the conductor start over from a
//! fresh copy once the current frame is done.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::context::RenderContext;
use crate::jobs::{JobQueue, Pass};
use crate::status::{format_duration, RenderState, RenderStatusListener};
use crate::tile::DEFAULT_TILE_WIDTH;
use crate::worker::RenderWorker;
use crate::Scene;

/// Render pool settings.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Number of worker threads.
    pub threads: usize,
    /// Side of a square tile in pixels.
    pub tile_width: u32,
    /// Samples per pixel added by one path-trace frame.
    pub samples_per_pass: u32,
    /// Frames rendered after a refresh in preview mode.
    pub preview_passes: u32,
    /// Worker `i` seeds its generator with `seed + i`.
    pub seed: u64,
    /// Stop the conductor once the target SPP is reached.
    pub oneshot: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            threads: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            tile_width: DEFAULT_TILE_WIDTH,
            samples_per_pass: 1,
            preview_passes: 2,
            seed: 0,
            oneshot: false,
        }
    }
}

/// The live scene and the signal that wakes the conductor when it changes.
pub struct SharedScene {
    scene: Mutex<Scene>,
    changed: Condvar,
}

impl SharedScene {
    fn new(scene: Scene) -> Self {
        Self {
            scene: Mutex::new(scene),
            changed: Condvar::new(),
        }
    }

    /// Lock the live scene for reading.
    ///
    /// Edits should go through [`SharedScene::update`] so the conductor
    /// notices them.
    pub fn lock(&self) -> MutexGuard<'_, Scene> {
        self.scene.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Edit the live scene and wake the conductor.
    pub fn update<R>(&self, edit: impl FnOnce(&mut Scene) -> R) -> R {
        let result = edit(&mut self.lock());
        self.changed.notify_all();
        result
    }
}

pub struct RenderManager {
    live: Arc<SharedScene>,
    queue: Arc<JobQueue>,
    stop: Arc<AtomicBool>,
    conductor: Option<JoinHandle<()>>,
    workers: Vec<RenderWorker>,
}

impl RenderManager {
    /// Spawn the conductor and `config.threads` workers.
    pub fn start(
        mut scene: Scene,
        config: RenderConfig,
        context: RenderContext,
        listener: Arc<dyn RenderStatusListener>,
    ) -> io::Result<Self> {
        scene.set_tile_width(config.tile_width);
        let buffered = Arc::new(RwLock::new(scene.clone()));
        let live = Arc::new(SharedScene::new(scene));
        let queue = Arc::new(JobQueue::new());
        let stop = Arc::new(AtomicBool::new(false));

        let mut manager = Self {
            live: live.clone(),
            queue: queue.clone(),
            stop: stop.clone(),
            conductor: None,
            workers: Vec::with_capacity(config.threads),
        };

        for id in 0..config.threads.max(1) {
            let worker = RenderWorker::spawn(id, config.seed, queue.clone(), buffered.clone())?;
            manager.workers.push(worker);
        }
        log::info!("Started {} render workers", manager.workers.len());

        let conductor = Conductor {
            live,
            buffered,
            queue,
            stop,
            config,
            context,
            listener,
        };
        manager.conductor = Some(
            thread::Builder::new()
                .name("render-manager".into())
                .spawn(move || conductor.run())?,
        );
        Ok(manager)
    }

    /// The live scene.
    pub fn scene(&self) -> &Arc<SharedScene> {
        &self.live
    }

    /// Wait for the conductor to return, then stop the workers.
    ///
    /// Only returns on its own in oneshot mode.
    pub fn join(mut self) {
        if let Some(conductor) = self.conductor.take() {
            if conductor.join().is_err() {
                log::error!("Render manager exited abnormally");
            }
        }
        self.shutdown();
    }

    /// Stop rendering after the current frame.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // under the lock so the conductor cannot miss the wakeup
        drop(self.live.lock());
        self.live.changed.notify_all();
        self.queue.shutdown();

        if let Some(conductor) = self.conductor.take() {
            if conductor.join().is_err() {
                log::error!("Render manager exited abnormally");
            }
        }
        for worker in self.workers.drain(..) {
            worker.join();
        }
    }
}

impl Drop for RenderManager {
    fn drop(&mut self) {
        if self.conductor.is_some() || !self.workers.is_empty() {
            self.shutdown();
        }
    }
}

struct Conductor {
    live: Arc<SharedScene>,
    buffered: Arc<RwLock<Scene>>,
    queue: Arc<JobQueue>,
    stop: Arc<AtomicBool>,
    config: RenderConfig,
    context: RenderContext,
    listener: Arc<dyn RenderStatusListener>,
}

impl Conductor {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn buffered(&self) -> RwLockWriteGuard<'_, Scene> {
        self.buffered.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self) {
        while let Some(path_trace) = self.wait_for_work() {
            if !path_trace {
                self.preview();
            } else if self.path_trace() && self.config.oneshot {
                break;
            }
        }
        log::debug!("Render manager stopped");
    }

    /// Block until there is something to render and take a fresh copy of the
    /// live scene. Returns whether the copy is in path-trace mode, or `None`
    /// when stopping.
    fn wait_for_work(&self) -> Option<bool> {
        let mut live = self.live.lock();
        loop {
            if self.stopped() {
                return None;
            }
            if live.should_refresh() || (live.is_path_tracing() && !live.is_paused()) {
                break;
            }
            live = self.live.changed.wait(live).unwrap_or_else(PoisonError::into_inner);
        }

        let mut buffered = self.buffered();
        if live.should_refresh() {
            live.clear_refresh();
            *buffered = live.clone();
        } else {
            buffered.copy_transients(&live);
        }
        Some(buffered.is_path_tracing())
    }

    fn refresh_pending(&self) -> bool {
        self.stopped() || self.live.lock().should_refresh()
    }

    /// Run one frame over every tile and show it.
    fn run_frame(&self, pass: Pass) -> bool {
        let num_jobs = self.buffered().buffer.tile_count();
        self.queue.publish(num_jobs, pass);
        if !self.queue.wait_done() {
            return false;
        }
        self.buffered().buffer.flip();
        true
    }

    fn preview(&self) {
        self.listener.render_state_changed(RenderState::Preview);
        for pass in 0..self.config.preview_passes {
            if self.refresh_pending() {
                return;
            }
            if !self.run_frame(Pass::Preview { first: pass == 0 }) {
                return;
            }
        }
    }

    /// Accumulate until the target is reached, or the live scene is
    /// refreshed, paused or halted. Returns `true` on reaching the target.
    fn path_trace(&self) -> bool {
        self.listener.render_state_changed(RenderState::Rendering);
        let samples = self.config.samples_per_pass.max(1);

        loop {
            let (dump_next, finalize, target) = {
                let live = self.live.lock();
                if self.stopped() || live.should_refresh() || live.is_paused() || !live.is_path_tracing() {
                    return false;
                }
                let mut buffered = self.buffered();
                buffered.copy_transients(&live);
                let next = buffered.spp + samples;
                let dump_next = next >= buffered.spp_target
                    || (buffered.save_dumps
                        && buffered.dump_frequency > 0
                        && next % buffered.dump_frequency == 0);
                (dump_next, buffered.finalize_buffer || dump_next, buffered.spp_target)
            };

            let start = Instant::now();
            if !self.run_frame(Pass::PathTrace { samples, finalize }) {
                return false;
            }
            let frame_millis = start.elapsed().as_millis() as u64;

            let (spp, render_time, pixels) = {
                let mut live = self.live.lock();
                let mut buffered = self.buffered();
                buffered.spp += samples;
                buffered.render_time += frame_millis;
                if !live.should_refresh() {
                    live.spp = buffered.spp;
                    live.render_time = buffered.render_time;
                }
                (buffered.spp, buffered.render_time, buffered.width as u64 * buffered.height as u64)
            };

            let sps = pixels * samples as u64 * 1000 / frame_millis.max(1);
            self.listener.set_spp(spp);
            self.listener.set_render_time(render_time);
            self.listener.set_samples_per_second(sps);
            let remaining = target.saturating_sub(spp) as u64;
            let eta = render_time / spp.max(1) as u64 * remaining;
            self.listener
                .set_progress_eta("Rendering", spp as usize, 0, target as usize, &format_duration(eta));

            if dump_next {
                self.checkpoint();
            }

            if spp >= target {
                self.live.update(|live| live.pause_render());
                self.listener.render_state_changed(RenderState::Paused);
                let average = pixels * spp as u64 * 1000 / render_time.max(1);
                self.listener.render_job_finished(render_time, average);
                return true;
            }
        }
    }

    /// Write a snapshot and the scene files. Failures are logged and
    /// rendering goes on.
    fn checkpoint(&self) {
        let _live = self.live.lock();
        let buffered = self.buffered();
        let snapshot = self.context.snapshot_file(buffered.name(), buffered.spp);
        if let Err(e) = buffered.save_frame(&snapshot) {
            log::error!("Failed to save snapshot {}: {}", snapshot.display(), e);
        }
        if let Err(e) = buffered.save_scene(&self.context, self.listener.as_ref()) {
            log::error!("Failed to save scene {}: {}", buffered.name(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DUMP_SUFFIX;
    use crate::status::LogStatusListener;
    use std::sync::atomic::AtomicU32;
    use tempfile::tempdir;

    fn config() -> RenderConfig {
        RenderConfig {
            threads: 3,
            tile_width: 8,
            samples_per_pass: 1,
            preview_passes: 2,
            seed: 42,
            oneshot: true,
        }
    }

    fn scene(name: &str, target: u32) -> Scene {
        let mut scene = Scene::new();
        scene.set_name(name);
        scene.set_canvas_size(30, 20);
        scene.set_spp_target(target);
        scene.set_save_dumps(false);
        scene.start_render();
        scene
    }

    #[derive(Default)]
    struct Counting {
        frames: AtomicU32,
        finished: AtomicBool,
    }

    impl RenderStatusListener for Counting {
        fn set_spp(&self, _spp: u32) {
            self.frames.fetch_add(1, Ordering::SeqCst);
        }

        fn render_job_finished(&self, _millis: u64, _sps: u64) {
            self.finished.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_oneshot_render_writes_checkpoint() {
        let dir = tempdir().unwrap();
        let context = RenderContext::new(dir.path());
        let listener = Arc::new(Counting::default());

        let manager = RenderManager::start(scene("oneshot", 3), config(), context.clone(), listener.clone()).unwrap();
        let live = manager.scene().clone();
        manager.join();

        assert_eq!(listener.frames.load(Ordering::SeqCst), 3);
        assert!(listener.finished.load(Ordering::SeqCst));

        let scene = live.lock();
        assert_eq!(scene.spp(), 3);
        assert!(scene.is_paused());
        assert!(context.scene_file("oneshot").exists());
        assert!(context.file("oneshot", DUMP_SUFFIX).exists());
        assert!(context.snapshot_file("oneshot", 3).exists());

        let samples = scene.buffer().samples();
        assert_eq!(samples.len(), 30 * 20);
        assert!(samples.iter().all(|s| s.iter().all(|c| c.is_finite() && *c >= 0.0)));
    }

    #[test]
    fn test_periodic_dumps() {
        let dir = tempdir().unwrap();
        let context = RenderContext::new(dir.path());
        let mut scene = scene("periodic", 4);
        scene.set_save_dumps(true);
        scene.set_dump_frequency(2);

        let manager =
            RenderManager::start(scene, config(), context.clone(), Arc::new(LogStatusListener)).unwrap();
        manager.join();

        assert!(context.snapshot_file("periodic", 2).exists());
        assert!(!context.snapshot_file("periodic", 3).exists());
        assert!(context.snapshot_file("periodic", 4).exists());
    }

    #[test]
    fn test_preview_then_stop() {
        let dir = tempdir().unwrap();
        let mut scene = scene("preview", 10);
        scene.halt_render();

        let mut config = config();
        config.oneshot = false;
        let manager =
            RenderManager::start(scene, config, RenderContext::new(dir.path()), Arc::new(LogStatusListener))
                .unwrap();

        // the conductor picks up the refresh, renders the preview and waits
        let live = manager.scene().clone();
        let deadline = Instant::now() + std::time::Duration::from_secs(30);
        while live.lock().should_refresh() && Instant::now() < deadline {
            thread::yield_now();
        }
        manager.stop();

        let scene = live.lock();
        assert!(!scene.should_refresh());
        assert_eq!(scene.spp(), 0);
    }

    #[test]
    fn test_resume_with_other_tile_width() {
        let dir = tempdir().unwrap();
        let context = RenderContext::new(dir.path());
        let listener = Arc::new(Counting::default());

        let mut scene = scene("resumed", 6);
        assert_ne!(scene.tile_width(), config().tile_width);
        scene.spp = 5;
        scene.render_time = 1234;
        assert!(scene.buffer.set_samples(&vec![[0.5; 3]; 30 * 20]));
        scene.soft_refresh();

        let manager = RenderManager::start(scene, config(), context, listener.clone()).unwrap();
        let live = manager.scene().clone();
        manager.join();

        assert_eq!(listener.frames.load(Ordering::SeqCst), 1);
        let scene = live.lock();
        assert_eq!(scene.spp(), 6);
        assert!(scene.render_time() >= 1234);
        // five of the six samples per pixel were 0.5
        assert!(scene
            .buffer()
            .samples()
            .iter()
            .all(|s| s.iter().all(|c| *c >= 2.5 / 6.0 - 1e-12)));
    }
}
