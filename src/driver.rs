//! Stereo frame orchestration
//!
//! One [`StereoFrameDriver::render_frame`] call is one displayed frame:
//! clear the presentation target, then for each eye render into the offscreen
//! surface and composite it through the lens warp, then present.

use glam::Mat4;
use log::{debug, info};

use crate::distortion::{DistortionProfile, DistortionUniforms};
use crate::eye::Eye;
use crate::frame::{FrameState, SeparationStep};
use crate::scene::{SceneKind, SceneParams};
use crate::Result;

/// A device able to run the two passes of the stereo pipeline.
///
/// Every call blocks until its work is done; the driver never issues two
/// calls concurrently.
pub trait StereoBackend {
    /// Size of the presentation target, fixed for the session.
    fn present_size(&self) -> (u32, u32);

    /// Size of the offscreen color target, fixed for the session.
    fn offscreen_size(&self) -> (u32, u32);

    /// Acquire and clear the presentation target.
    fn begin_frame(&mut self) -> Result<()>;

    /// Bind the offscreen surface, draw the scene into it, unbind and wait
    /// for the write to finish.
    fn render_eye(&mut self, params: &SceneParams) -> Result<()>;

    /// Sample the offscreen image through the warp into `eye`'s half of the
    /// presentation target.
    fn composite_eye(&mut self, eye: Eye, uniforms: &DistortionUniforms) -> Result<()>;

    fn present(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    PresentTargetCleared,
    OffscreenWrite(Eye),
    Composite(Eye),
    Presented,
    /// The presentation target could not be acquired; nothing was drawn.
    Skipped,
}

/// Session state shared by every pass, replacing a global render config.
#[derive(Debug, Clone)]
pub struct RenderSession {
    profile: DistortionProfile,
    profile_epoch: u64,
    pub frame: FrameState,
    pub view: Mat4,
    pub scene: SceneKind,
    pub separation_step: f32,
}

impl RenderSession {
    pub fn new(profile: DistortionProfile, frame: FrameState, scene: SceneKind) -> Self {
        Self {
            profile,
            profile_epoch: 0,
            frame,
            view: Mat4::IDENTITY,
            scene,
            separation_step: 0.01,
        }
    }

    pub fn profile(&self) -> &DistortionProfile {
        &self.profile
    }

    /// Number of times the profile has been replaced.
    pub fn profile_epoch(&self) -> u64 {
        self.profile_epoch
    }

    pub fn replace_profile(&mut self, profile: DistortionProfile) {
        self.profile = profile;
        self.profile_epoch += 1;
        info!("Distortion profile replaced (epoch {})", self.profile_epoch);
    }

    pub fn set_view(&mut self, view: Mat4) {
        self.view = view;
    }

    pub fn adjust_separation(&mut self, step: SeparationStep) {
        self.frame.adjust_separation(step, self.separation_step);
    }

    pub fn scene_params(&self, eye: Eye, offscreen_size: (u32, u32)) -> SceneParams {
        SceneParams::new(eye, &self.frame, offscreen_size, self.view, &self.scene)
    }

    pub fn distortion_uniforms(&self, eye: Eye, present_size: (u32, u32)) -> DistortionUniforms {
        self.profile.uniforms(eye, present_size.0, present_size.1)
    }
}

pub struct StereoFrameDriver<B> {
    backend: B,
    session: RenderSession,
    phase: FramePhase,
}

impl<B: StereoBackend> StereoFrameDriver<B> {
    pub fn new(backend: B, session: RenderSession) -> Self {
        let (w, h) = backend.present_size();
        let (ow, oh) = backend.offscreen_size();
        info!("Stereo driver ready: present {}x{}, offscreen {}x{}", w, h, ow, oh);
        Self {
            backend,
            session,
            phase: FramePhase::PresentTargetCleared,
        }
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn session(&self) -> &RenderSession {
        &self.session
    }

    /// Mutable session access; only reachable between frames.
    pub fn session_mut(&mut self) -> &mut RenderSession {
        &mut self.session
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Render and present one stereo frame, returning its frame index.
    pub fn render_frame(&mut self) -> Result<u64> {
        let present_size = self.backend.present_size();
        let offscreen_size = self.backend.offscreen_size();

        if let Err(e) = self.backend.begin_frame() {
            debug!("Frame {} skipped: {}", self.session.frame.frame_index(), e);
            self.phase = FramePhase::Skipped;
            return Err(e);
        }
        self.phase = FramePhase::PresentTargetCleared;

        for eye in Eye::ALL {
            self.phase = FramePhase::OffscreenWrite(eye);
            let params = self.session.scene_params(eye, offscreen_size);
            self.backend.render_eye(&params)?;

            self.phase = FramePhase::Composite(eye);
            let uniforms = self.session.distortion_uniforms(eye, present_size);
            self.backend.composite_eye(eye, &uniforms)?;
        }

        self.backend.present()?;
        self.phase = FramePhase::Presented;

        let index = self.session.frame.frame_index();
        self.session.frame.advance();
        debug!("Presented frame {}", index);
        Ok(index)
    }
}
