//! Session configuration loaded from TOML.

use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;

use crate::calibration::{detect_profile, HmdInfo};
use crate::distortion::DistortionProfile;
use crate::frame::DEFAULT_EYE_SEPARATION;
use crate::program::ProgramSource;
use crate::scene::SceneKind;
use crate::{RenderError, Result};

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub display: SurfaceSize,
    pub offscreen: OffscreenSize,
    pub stereo: StereoSettings,
    pub scene: SceneKind,
    /// Calibrated headset; absent means no device.
    pub hmd: Option<HmdInfo>,
    /// Explicit profile, taking precedence over `hmd`.
    pub distortion: Option<DistortionSettings>,
    pub shaders: ShaderPaths,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl Default for SurfaceSize {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct OffscreenSize {
    pub width: u32,
    pub height: u32,
}

impl Default for OffscreenSize {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct StereoSettings {
    pub eye_base_separation: f32,
    pub separation_step: f32,
}

impl Default for StereoSettings {
    fn default() -> Self {
        Self {
            eye_base_separation: DEFAULT_EYE_SEPARATION,
            separation_step: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DistortionSettings {
    #[serde(default)]
    pub lens_center_offset_x: f32,
    pub scale: f32,
    pub warp_coeffs: [f32; 4],
    #[serde(default = "no_aberration")]
    pub chromatic_aberration: [f32; 4],
}

fn no_aberration() -> [f32; 4] {
    [1.0, 0.0, 0.0, 0.0]
}

impl DistortionSettings {
    pub fn to_profile(&self) -> Result<DistortionProfile> {
        DistortionProfile::new(
            self.lens_center_offset_x,
            self.scale,
            self.warp_coeffs,
            self.chromatic_aberration,
        )
    }
}

/// Optional on-disk replacements for the built-in WGSL programs.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ShaderPaths {
    pub scene_vertex: Option<PathBuf>,
    pub scene_fragment: Option<PathBuf>,
    pub distortion_vertex: Option<PathBuf>,
    pub distortion_fragment: Option<PathBuf>,
}

impl ShaderPaths {
    pub fn scene_program(&self) -> Result<ProgramSource> {
        load_program(
            ProgramSource::scene(),
            self.scene_vertex.as_deref(),
            self.scene_fragment.as_deref(),
        )
    }

    pub fn distortion_program(&self) -> Result<ProgramSource> {
        load_program(
            ProgramSource::distortion(),
            self.distortion_vertex.as_deref(),
            self.distortion_fragment.as_deref(),
        )
    }
}

fn load_program(
    builtin: ProgramSource,
    vertex: Option<&Path>,
    fragment: Option<&Path>,
) -> Result<ProgramSource> {
    match (vertex, fragment) {
        (None, None) => Ok(builtin),
        (Some(vs), Some(fs)) => ProgramSource::from_files(&builtin.label, vs, fs),
        _ => Err(RenderError::Config(format!(
            "program '{}' needs both a vertex and a fragment shader path",
            builtin.label
        ))),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| RenderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.display.width < 2 || self.display.height == 0 {
            return Err(RenderError::Config(format!(
                "display must be at least 2x1, got {}x{}",
                self.display.width, self.display.height
            )));
        }
        if self.offscreen.width == 0 || self.offscreen.height == 0 {
            return Err(RenderError::Config(format!(
                "offscreen target must be non-empty, got {}x{}",
                self.offscreen.width, self.offscreen.height
            )));
        }
        if !(self.stereo.separation_step > 0.0) {
            return Err(RenderError::Config(format!(
                "separation_step must be positive, got {}",
                self.stereo.separation_step
            )));
        }
        if let Some(distortion) = &self.distortion {
            distortion.to_profile()?;
        }
        Ok(())
    }

    /// The explicit `[distortion]` override if present, otherwise whatever the
    /// `[hmd]` table calibrates to (identity without one).
    pub fn profile(&self) -> Result<DistortionProfile> {
        match &self.distortion {
            Some(settings) => {
                info!("Using distortion profile from config");
                settings.to_profile()
            }
            None => Ok(detect_profile(&self.hmd, self.present_size())),
        }
    }

    pub fn present_size(&self) -> (u32, u32) {
        (self.display.width, self.display.height)
    }

    pub fn offscreen_size(&self) -> (u32, u32) {
        (self.offscreen.width, self.offscreen.height)
    }
}
