//! Per-frame counters shared by both eye passes.

use log::info;

/// Seconds of scene time per presented frame.
pub const TIME_PER_FRAME: f32 = 0.01;

/// Default eye separation; a hand-tuned parallax heuristic, not an IPD.
pub const DEFAULT_EYE_SEPARATION: f32 = 6.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeparationStep {
    Increase,
    Decrease,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameState {
    frame_index: u64,
    pub eye_base_separation: f32,
}

impl FrameState {
    pub fn new(eye_base_separation: f32) -> Self {
        Self {
            frame_index: 0,
            eye_base_separation,
        }
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn time(&self) -> f32 {
        self.frame_index as f32 * TIME_PER_FRAME
    }

    /// Signed horizontal offset for `eye`'s scene camera.
    pub fn eye_offset(&self, eye: crate::Eye) -> f32 {
        eye.mirror_sign() * self.eye_base_separation
    }

    pub fn adjust_separation(&mut self, step: SeparationStep, amount: f32) {
        match step {
            SeparationStep::Increase => self.eye_base_separation += amount,
            SeparationStep::Decrease => self.eye_base_separation -= amount,
        }
        info!("eo = {:.6}", self.eye_base_separation);
    }

    /// Called once per presented frame.
    pub(crate) fn advance(&mut self) {
        self.frame_index += 1;
    }
}

impl Default for FrameState {
    fn default() -> Self {
        Self::new(DEFAULT_EYE_SEPARATION)
    }
}
