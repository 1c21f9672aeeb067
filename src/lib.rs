//! VR Stereo - two-pass stereo renderer with per-eye lens correction
//!
//! Each frame renders the scene for one eye into an offscreen color target,
//! then samples that image through a radial/chromatic inverse warp into the
//! eye's half of the presentation target. The same is repeated for the other
//! eye before presenting.
//!
//! The pipeline is driven by [`StereoFrameDriver`] over a [`StereoBackend`]:
//! [`WgpuBackend`] renders on the GPU, [`SoftwareBackend`] runs the identical
//! math on the CPU for headless checks.

use thiserror::Error;

pub mod calibration;
pub mod config;
pub mod distortion;
pub mod driver;
pub mod eye;
pub mod frame;
pub mod input;
pub mod program;
pub mod renderer;
pub mod scene;
pub mod software;
pub mod trackball;

pub use calibration::{detect_profile, profile_from_hmd, HmdInfo, HmdProbe, NoHmd};
pub use config::Config;
pub use distortion::{ChannelCoords, DistortionProfile, DistortionUniforms, EffectiveDistortion};
pub use driver::{FramePhase, RenderSession, StereoBackend, StereoFrameDriver};
pub use eye::{Eye, EyeViewport};
pub use frame::{FrameState, SeparationStep};
pub use program::{ProgramInterface, ProgramSource, ShaderStage};
pub use renderer::WgpuBackend;
pub use scene::{SceneContent, SceneKind, SceneParams};
pub use software::{Image, SoftwareBackend};

/// Rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Device error: {0}")]
    Device(String),

    #[error("Surface error: {0}")]
    Surface(String),

    #[error("{call} failed: {message}")]
    Allocation { call: &'static str, message: String },

    #[error("Failed to compile {stage} shader of program '{label}':\n{log}")]
    ShaderCompile {
        label: String,
        stage: ShaderStage,
        log: String,
    },

    #[error("Failed to link program '{label}': {reason}")]
    ShaderLink { label: String, reason: String },

    #[error("Program '{program}' has no uniform named '{name}'")]
    UnknownUniform { program: String, name: &'static str },

    #[error("Invalid distortion profile: {0}")]
    InvalidProfile(String),

    #[error("Offscreen image for the {eye:?} eye was not rendered before compositing")]
    StaleOffscreen { eye: Eye },

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Everything except a lost/outdated presentation surface ends the session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RenderError::Surface(_))
    }
}

/// Result type for rendering operations
pub type Result<T> = std::result::Result<T, RenderError>;
