//! Headset calibration
//!
//! Turns a headset's display description into a [`DistortionProfile`]. When
//! no headset is found the identity profile is used; that is never an error.

use log::{info, warn};
use serde::Deserialize;

use crate::distortion::DistortionProfile;
use crate::eye::stereo_aspect;

/// Physical description of a head-mounted display.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct HmdInfo {
    pub h_resolution: u32,
    pub v_resolution: u32,
    /// Meters.
    pub h_screen_size: f32,
    pub v_screen_size: f32,
    pub v_screen_center: f32,
    pub eye_to_screen_distance: f32,
    pub lens_separation_distance: f32,
    pub interpupillary_distance: f32,
    pub distortion_k: [f32; 4],
    /// `(red_scale, red_radial, blue_scale, blue_radial)` as reported by the device.
    pub chroma_ab_correction: [f32; 4],
}

impl HmdInfo {
    /// 7" development kit panel.
    pub fn dk1() -> Self {
        Self {
            h_resolution: 1280,
            v_resolution: 800,
            h_screen_size: 0.14976,
            v_screen_size: 0.0936,
            v_screen_center: 0.0468,
            eye_to_screen_distance: 0.041,
            lens_separation_distance: 0.0635,
            interpupillary_distance: 0.064,
            distortion_k: [1.0, 0.22, 0.24, 0.0],
            chroma_ab_correction: [0.996, -0.004, 1.014, 0.0],
        }
    }

    /// Point in viewport space the distortion is scaled to reach: the left
    /// edge for 7" panels, the top edge for smaller ones.
    pub fn fit_point(&self) -> (f32, f32) {
        if self.h_screen_size > 0.140 {
            (-1.0, 0.0)
        } else if self.h_screen_size > 0.0 {
            (0.0, 1.0)
        } else {
            (-1.0, 0.0)
        }
    }

    /// Horizontal lens center offset in eye-viewport units.
    pub fn x_center_offset(&self) -> f32 {
        let lens_offset = self.lens_separation_distance * 0.5;
        let lens_shift = self.h_screen_size * 0.25 - lens_offset;
        4.0 * lens_shift / self.h_screen_size
    }

    fn distortion_fn(&self, r: f32) -> f32 {
        let k = self.distortion_k;
        let r_sq = r * r;
        r * (k[0] + k[1] * r_sq + k[2] * r_sq * r_sq + k[3] * r_sq * r_sq * r_sq)
    }
}

/// Source of headset display information.
pub trait HmdProbe {
    fn probe(&self) -> Option<HmdInfo>;
}

/// Probe that never finds a headset.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHmd;

impl HmdProbe for NoHmd {
    fn probe(&self) -> Option<HmdInfo> {
        None
    }
}

impl HmdProbe for Option<HmdInfo> {
    fn probe(&self) -> Option<HmdInfo> {
        *self
    }
}

/// Derive the (left-eye, mirrored for right) profile for a `width` x `height` target.
pub fn profile_from_hmd(hmd: &HmdInfo, present_size: (u32, u32)) -> crate::Result<DistortionProfile> {
    let x_center_offset = hmd.x_center_offset();
    let (fit_x, fit_y) = hmd.fit_point();
    let aspect = stereo_aspect(present_size.0, present_size.1);

    let dx = fit_x - x_center_offset;
    let dy = fit_y / aspect;
    let fit_radius = (dx * dx + dy * dy).sqrt();
    let scale = if fit_radius > 0.0 {
        hmd.distortion_fn(fit_radius) / fit_radius
    } else {
        1.0
    };

    let [r0, r1, b0, b1] = hmd.chroma_ab_correction;
    DistortionProfile::new(x_center_offset, scale, hmd.distortion_k, [r0, r1, b0 - r0, b1])
}

/// Resolve the session's profile from whatever the probe reports.
pub fn detect_profile(probe: &dyn HmdProbe, present_size: (u32, u32)) -> DistortionProfile {
    let Some(hmd) = probe.probe() else {
        info!("No HMD detected, using identity distortion");
        return DistortionProfile::identity();
    };

    info!(
        "HMD found: {}x{}, screen {:.5}m x {:.5}m",
        hmd.h_resolution, hmd.v_resolution, hmd.h_screen_size, hmd.v_screen_size
    );
    match profile_from_hmd(&hmd, present_size) {
        Ok(profile) => profile,
        Err(e) => {
            warn!("HMD calibration unusable ({}), using identity distortion", e);
            DistortionProfile::identity()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_device_gives_identity() {
        assert_eq!(detect_profile(&NoHmd, (1280, 800)), DistortionProfile::identity());
        assert_eq!(detect_profile(&None::<HmdInfo>, (1280, 800)), DistortionProfile::identity());
    }

    #[test]
    fn dk1_derivation() {
        let profile = detect_profile(&Some(HmdInfo::dk1()), (1280, 800));
        // lens shift = 0.03744 - 0.03175
        assert!((profile.lens_center_offset_x() - 0.151_979).abs() < 1e-4);
        assert!(profile.scale() > 1.0);
        assert_eq!(profile.warp_coeffs(), [1.0, 0.22, 0.24, 0.0]);

        let ca = profile.chromatic_aberration();
        assert_eq!(ca[0], 0.996);
        assert!((ca[0] + ca[2] - 1.014).abs() < 1e-6);
    }

    #[test]
    fn dk1_scale_matches_fit_radius() {
        let hmd = HmdInfo::dk1();
        let profile = profile_from_hmd(&hmd, (1280, 800)).unwrap();
        let r = -1.0 - hmd.x_center_offset();
        let r_sq = r * r;
        let expected = 1.0 + 0.22 * r_sq + 0.24 * r_sq * r_sq;
        assert!((profile.scale() - expected).abs() < 1e-4);
    }

    #[test]
    fn small_panel_fits_to_top_edge() {
        let mut hmd = HmdInfo::dk1();
        hmd.h_screen_size = 0.12;
        assert_eq!(hmd.fit_point(), (0.0, 1.0));
        hmd.h_screen_size = 0.0;
        assert_eq!(hmd.fit_point(), (-1.0, 0.0));
    }

    #[test]
    fn degenerate_calibration_falls_back() {
        let mut hmd = HmdInfo::dk1();
        hmd.distortion_k = [-1.0, 0.0, 0.0, 0.0];
        assert_eq!(detect_profile(&Some(hmd), (1280, 800)), DistortionProfile::identity());
    }
}
