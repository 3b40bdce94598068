//! Voxen - headless voxel path tracer.
//!
//! Renders the built-in demo world, or resumes a saved scene, to a target
//! sample count and writes the final frame as a PNG.

mod demo;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use voxen_core::{MemoryWorld, Postprocess};
use voxen_renderer::{LogStatusListener, RenderConfig, RenderContext, RenderManager, Scene};

#[derive(Debug, Parser)]
#[command(name = "voxen", version, about = "Path trace voxel worlds")]
struct Args {
    /// Directory holding scene files, dumps and snapshots.
    #[arg(long, short = 'd', default_value = ".")]
    scene_dir: PathBuf,

    /// Scene name; companion files are named after it.
    #[arg(long, short = 'n', default_value = "demo")]
    name: String,

    /// Resume the saved scene called NAME instead of building the demo.
    #[arg(long)]
    load: bool,

    /// Canvas width in pixels.
    #[arg(long, default_value_t = 400)]
    width: u32,

    /// Canvas height in pixels.
    #[arg(long, default_value_t = 300)]
    height: u32,

    /// Target samples per pixel.
    #[arg(long, default_value_t = 64)]
    spp: u32,

    /// Samples per pixel added by each frame.
    #[arg(long, default_value_t = 1)]
    samples_per_pass: u32,

    /// Worker threads (defaults to the number of cores).
    #[arg(long, short = 'j')]
    threads: Option<usize>,

    #[arg(long, default_value_t = voxen_renderer::DEFAULT_TILE_WIDTH)]
    tile_width: u32,

    /// Base seed of the worker generators.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Write a checkpoint every N samples (0 to only save at the end).
    #[arg(long, default_value_t = 0)]
    dump_frequency: u32,

    #[arg(long, value_enum, default_value_t = PostprocessArg::Tonemap1)]
    postprocess: PostprocessArg,

    #[arg(long, default_value_t = voxen_renderer::DEFAULT_EXPOSURE)]
    exposure: f64,

    /// Demo world size in chunks from the origin.
    #[arg(long, default_value_t = 2)]
    radius: i32,

    /// Fill the flat water plane below this height (0 disables it).
    #[arg(long, default_value_t = 0)]
    water_height: i32,

    #[arg(long)]
    atmosphere: bool,

    #[arg(long)]
    fog: bool,

    #[arg(long)]
    emitters: bool,

    /// Output PNG, `<scene-dir>/<name>.png` by default.
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum PostprocessArg {
    None,
    Tonemap1,
    Gamma,
}

impl From<PostprocessArg> for Postprocess {
    fn from(arg: PostprocessArg) -> Self {
        match arg {
            PostprocessArg::None => Postprocess::None,
            PostprocessArg::Tonemap1 => Postprocess::Tonemap1,
            PostprocessArg::Gamma => Postprocess::Gamma,
        }
    }
}

impl Args {
    fn render_config(&self) -> RenderConfig {
        let defaults = RenderConfig::default();
        RenderConfig {
            threads: self.threads.unwrap_or(defaults.threads),
            tile_width: self.tile_width,
            samples_per_pass: self.samples_per_pass,
            seed: self.seed,
            oneshot: true,
            ..defaults
        }
    }

    /// Settings given on the command line override saved ones.
    fn apply(&self, scene: &mut Scene) {
        scene.set_name(self.name.as_str());
        scene.set_spp_target(self.spp);
        scene.set_save_dumps(self.dump_frequency > 0);
        if self.dump_frequency > 0 {
            scene.set_dump_frequency(self.dump_frequency);
        }
        scene.set_postprocess(self.postprocess.into());
        scene.set_exposure(self.exposure);
    }
}

fn demo_scene(args: &Args, world: Arc<MemoryWorld>) -> Scene {
    let mut scene = Scene::new();
    scene.set_canvas_size(args.width, args.height);
    scene.set_water_height(args.water_height);
    scene.set_atmosphere(args.atmosphere);
    scene.set_volumetric_fog(args.fog);
    scene.set_emitters_enabled(args.emitters);

    let positions = world.positions();
    scene.load_chunks(world, &positions, &LogStatusListener);

    let mut position = scene.center_camera_position();
    position.y = (demo::SEA_LEVEL + 24) as f64;
    position.z -= 40.0;
    let camera = scene.camera_mut();
    camera.set_position(position);
    // facing +z, tilted down towards the lake
    camera.set_view(std::f64::consts::FRAC_PI_2, -1.15);
    scene
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();
    log::info!("Starting Voxen");

    std::fs::create_dir_all(&args.scene_dir)
        .with_context(|| format!("creating {}", args.scene_dir.display()))?;
    let context = RenderContext::new(&args.scene_dir);
    let world = Arc::new(demo::demo_world(args.radius));

    let mut scene = if args.load {
        let mut scene = Scene::new();
        scene.set_world(world);
        scene
            .load_scene(&context, &args.name, &LogStatusListener)
            .with_context(|| format!("loading scene {}", args.name))?;
        scene
    } else {
        demo_scene(&args, world)
    };
    args.apply(&mut scene);
    if scene.spp() >= args.spp {
        log::warn!("Scene already has {} spp, rendering one more frame", scene.spp());
    }
    scene.start_render();
    scene.resume_render();

    let manager = RenderManager::start(
        scene,
        args.render_config(),
        context.clone(),
        Arc::new(LogStatusListener),
    )
    .context("starting render workers")?;
    let live = manager.scene().clone();
    manager.join();

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| context.file(&args.name, ".png"));
    let scene = live.lock();
    scene
        .save_frame(&output)
        .with_context(|| format!("writing {}", output.display()))?;
    log::info!(
        "Rendered {} spp in {}",
        scene.spp(),
        voxen_renderer::format_duration(scene.render_time())
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["voxen"]);
        assert_eq!(args.name, "demo");
        assert_eq!(args.spp, 64);
        assert!(!args.load);
        let config = args.render_config();
        assert!(config.oneshot);
        assert!(config.threads >= 1);
    }

    #[test]
    fn test_args_apply() {
        let args = Args::parse_from([
            "voxen",
            "--name",
            "lake",
            "--spp",
            "8",
            "--dump-frequency",
            "4",
            "--postprocess",
            "gamma",
        ]);
        let mut scene = Scene::new();
        args.apply(&mut scene);
        assert_eq!(scene.name(), "lake");
        assert_eq!(scene.spp_target(), 8);
        assert_eq!(scene.dump_frequency(), 4);
        assert!(scene.save_dumps());
        assert_eq!(scene.postprocess(), Postprocess::Gamma);
    }

    #[test]
    fn test_demo_scene_sees_terrain() {
        let dir = tempdir().unwrap();
        let args = Args::parse_from([
            "voxen",
            "--width",
            "32",
            "--height",
            "24",
            "--radius",
            "1",
            "--scene-dir",
            dir.path().to_str().unwrap(),
        ]);
        let scene = demo_scene(&args, Arc::new(demo::demo_world(args.radius)));
        assert_eq!(scene.loaded_chunks().len(), 4);

        let mut ray = voxen_renderer::Ray::default();
        scene.trace(&mut ray);
        assert!(ray.hit);
    }
}
