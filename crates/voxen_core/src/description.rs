//! Scene description file.
//!
//! A versioned JSON document holding everything needed to rebuild a scene
//! apart from the bulk data (octree, biome textures, sample dump), which
//! live in binary companion files next to it.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current scene description format version.
pub const SCENE_FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum SceneFormatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed scene description: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Scene description has no version field")]
    MissingVersion,

    #[error("Incompatible scene description version {found} (expected {expected})")]
    IncompatibleVersion { found: u64, expected: u32 },
}

pub type SceneFormatResult<T> = Result<T, SceneFormatError>;

/// Tone mapping applied when finalizing path traced pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Postprocess {
    None,
    /// Filmic curve.
    #[default]
    Tonemap1,
    /// Plain gamma 2.2.
    Gamma,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasDescription {
    pub width: u32,
    pub height: u32,
    pub exposure: f64,
    pub postprocess: Postprocess,
}

impl Default for CanvasDescription {
    fn default() -> Self {
        Self {
            width: 400,
            height: 400,
            exposure: 1.0,
            postprocess: Postprocess::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraDescription {
    pub position: [f64; 3],
    pub yaw: f64,
    pub pitch: f64,
    pub fov: f64,
    pub dof: f64,
    pub infinite_dof: bool,
    pub focal_offset: f64,
}

impl Default for CameraDescription {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            yaw: -std::f64::consts::FRAC_PI_2,
            pitch: 0.0,
            fov: 70.0,
            dof: 8.0,
            infinite_dof: true,
            focal_offset: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SunDescription {
    /// Elevation above the horizon, radians.
    pub altitude: f64,
    /// Angle around the vertical axis, radians.
    pub azimuth: f64,
    pub intensity: f64,
    pub color: [f64; 3],
}

impl Default for SunDescription {
    fn default() -> Self {
        Self {
            altitude: std::f64::consts::PI / 3.0,
            azimuth: std::f64::consts::PI / 2.5,
            intensity: 1.5,
            color: [1.0; 3],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkyDescription {
    pub skymap: Option<String>,
    pub rotation: f64,
    pub mirrored: bool,
    pub ground_color: [f64; 3],
}

impl Default for SkyDescription {
    fn default() -> Self {
        Self {
            skymap: None,
            rotation: 0.0,
            mirrored: true,
            ground_color: [0.0, 0.0, 1.0],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldDescription {
    /// Absolute world directory path.
    pub path: Option<String>,
    pub dimension: i32,
    /// Octree origin in world coordinates.
    pub origin: [i32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderDescription {
    pub path_trace: bool,
    pub paused: bool,
    pub spp: u32,
    pub spp_target: u32,
    pub render_time_ms: u64,
    pub dump_frequency: u32,
    pub save_dumps: bool,
    pub ray_depth: u32,
}

impl Default for RenderDescription {
    fn default() -> Self {
        Self {
            path_trace: false,
            paused: false,
            spp: 0,
            spp_target: 1000,
            render_time_ms: 0,
            dump_frequency: 500,
            save_dumps: true,
            ray_depth: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingDescription {
    pub sun_enabled: bool,
    pub emitters_enabled: bool,
    pub emitter_intensity: f64,
    pub still_water: bool,
    pub clear_water: bool,
    pub water_height: i32,
    pub water_visibility: f64,
    pub biome_colors: bool,
    pub atmosphere: bool,
    pub volumetric_fog: bool,
}

impl Default for LightingDescription {
    fn default() -> Self {
        Self {
            sun_enabled: true,
            emitters_enabled: false,
            emitter_intensity: 13.0,
            still_water: false,
            clear_water: false,
            water_height: 0,
            water_visibility: 9.0,
            biome_colors: true,
            atmosphere: false,
            volumetric_fog: false,
        }
    }
}

/// Everything persisted about a scene in its description file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub canvas: CanvasDescription,
    #[serde(default)]
    pub camera: CameraDescription,
    #[serde(default)]
    pub sun: SunDescription,
    #[serde(default)]
    pub sky: SkyDescription,
    #[serde(default)]
    pub world: WorldDescription,
    #[serde(default)]
    pub render: RenderDescription,
    #[serde(default)]
    pub lighting: LightingDescription,
    /// Loaded chunks, packed with `ChunkPosition::to_long`.
    #[serde(default)]
    pub chunk_list: Vec<i64>,
}

impl SceneDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: SCENE_FORMAT_VERSION,
            name: name.into(),
            canvas: CanvasDescription::default(),
            camera: CameraDescription::default(),
            sun: SunDescription::default(),
            sky: SkyDescription::default(),
            world: WorldDescription::default(),
            render: RenderDescription::default(),
            lighting: LightingDescription::default(),
            chunk_list: Vec::new(),
        }
    }

    /// Parse a description, rejecting any other format version.
    pub fn read<R: Read>(input: R) -> SceneFormatResult<SceneDescription> {
        let value: serde_json::Value = serde_json::from_reader(input)?;
        match value.get("version").and_then(|v| v.as_u64()) {
            None => return Err(SceneFormatError::MissingVersion),
            Some(found) if found != SCENE_FORMAT_VERSION as u64 => {
                return Err(SceneFormatError::IncompatibleVersion {
                    found,
                    expected: SCENE_FORMAT_VERSION,
                })
            }
            Some(_) => {}
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn write<W: Write>(&self, out: W) -> SceneFormatResult<()> {
        serde_json::to_writer_pretty(out, self)?;
        Ok(())
    }
}
