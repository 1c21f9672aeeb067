//! Lens distortion parameters
//!
//! A [`DistortionProfile`] holds the calibrated lens coefficients. Resolving it
//! for an eye yields the values the compositor uploads; [`DistortionUniforms::lookup`]
//! is the CPU form of the fragment stage's inverse warp, used by the software
//! backend and by tests.

use glam::{Vec2, Vec4};
use log::info;

use crate::eye::{stereo_aspect, Eye};
use crate::{RenderError, Result};

/// Slack on the eye-rectangle test so texels exactly on the edge survive rounding.
pub const EDGE_EPSILON: f32 = 1e-5;

/// Per-eye lens correction coefficients.
///
/// One profile serves both eyes: the right eye mirrors the lens center offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionProfile {
    lens_center_offset_x: f32,
    scale: f32,
    // 1/scale, taken once at construction
    inv_scale: f32,
    warp_coeffs: [f32; 4],
    // [red_scale, red_radial, blue_minus_red, blue_radial]
    chromatic_aberration: [f32; 4],
}

impl DistortionProfile {
    pub fn new(
        lens_center_offset_x: f32,
        scale: f32,
        warp_coeffs: [f32; 4],
        chromatic_aberration: [f32; 4],
    ) -> Result<Self> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(RenderError::InvalidProfile(format!(
                "scale must be finite and positive, got {scale}"
            )));
        }
        let all_finite = std::iter::once(lens_center_offset_x)
            .chain(warp_coeffs)
            .chain(chromatic_aberration)
            .all(f32::is_finite);
        if !all_finite {
            return Err(RenderError::InvalidProfile(
                "coefficients must be finite".to_string(),
            ));
        }

        Ok(Self {
            lens_center_offset_x,
            scale,
            inv_scale: 1.0 / scale,
            warp_coeffs,
            chromatic_aberration,
        })
    }

    /// No-op distortion used when no headset calibration is available.
    pub fn identity() -> Self {
        Self {
            lens_center_offset_x: 0.0,
            scale: 1.0,
            inv_scale: 1.0,
            warp_coeffs: [1.0, 0.0, 0.0, 0.0],
            chromatic_aberration: [1.0, 0.0, 0.0, 0.0],
        }
    }

    pub fn lens_center_offset_x(&self) -> f32 {
        self.lens_center_offset_x
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn warp_coeffs(&self) -> [f32; 4] {
        self.warp_coeffs
    }

    pub fn chromatic_aberration(&self) -> [f32; 4] {
        self.chromatic_aberration
    }

    /// Resolve the warp parameters for `eye`, where `aspect` is the aspect
    /// ratio of one eye's half of the presentation target.
    pub fn resolve(&self, eye: Eye, aspect: f32) -> EffectiveDistortion {
        let viewport = eye.viewport();
        let half_width = viewport.width_fraction * 0.5;
        let origin = viewport.origin_x_fraction;

        let lens_center = Vec2::new(
            origin + half_width + eye.mirror_sign() * self.lens_center_offset_x * half_width,
            0.5,
        );
        let screen_center = Vec2::new(origin + half_width, 0.5);
        let scale = Vec2::new(
            half_width * self.inv_scale,
            half_width * self.inv_scale * aspect,
        );
        let scale_in = Vec2::new(1.0 / half_width, 1.0 / (half_width * aspect));

        EffectiveDistortion {
            lens_center,
            screen_center,
            scale,
            scale_in,
            warp_coeffs: Vec4::from_array(self.warp_coeffs),
            chromatic_aberration: Vec4::from_array(self.chromatic_aberration),
        }
    }

    /// Everything the compositor needs for `eye` on a `width` x `height` target.
    pub fn uniforms(&self, eye: Eye, width: u32, height: u32) -> DistortionUniforms {
        let viewport = eye.viewport();
        DistortionUniforms {
            effective: self.resolve(eye, stereo_aspect(width, height)),
            viewport_origin: viewport.origin_x_fraction,
            viewport_width: viewport.width_fraction,
        }
    }

    pub fn log_summary(&self) {
        info!("XCenterOffset: {:.6}", self.lens_center_offset_x);
        info!("Scale        : {:.6}", self.scale);
        info!("K: {:?}", self.warp_coeffs);
        info!("ChromaticAberration: {:?}", self.chromatic_aberration);
    }
}

impl Default for DistortionProfile {
    fn default() -> Self {
        Self::identity()
    }
}

/// Warp parameters resolved for one eye, in full-target normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveDistortion {
    pub lens_center: Vec2,
    pub screen_center: Vec2,
    pub scale: Vec2,
    pub scale_in: Vec2,
    pub warp_coeffs: Vec4,
    pub chromatic_aberration: Vec4,
}

/// Source texture coordinates for each color channel of one destination texel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelCoords {
    pub red: Vec2,
    pub green: Vec2,
    pub blue: Vec2,
}

/// The compositor's uniform set for one eye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionUniforms {
    pub effective: EffectiveDistortion,
    pub viewport_origin: f32,
    pub viewport_width: f32,
}

impl DistortionUniforms {
    /// Inverse-distortion lookup for viewport-local `uv` in [0,1]².
    ///
    /// Returns `None` when any channel lands outside the eye's source image;
    /// such texels are written fully transparent.
    pub fn lookup(&self, uv: Vec2) -> Option<ChannelCoords> {
        let e = &self.effective;
        let screen = Vec2::new(self.viewport_origin + uv.x * self.viewport_width, uv.y);

        let theta = (screen - e.lens_center) * e.scale_in;
        let r_sq = theta.length_squared();
        let k = e.warp_coeffs;
        let warped = theta * (k.x + k.y * r_sq + k.z * r_sq * r_sq + k.w * r_sq * r_sq * r_sq);

        let ca = e.chromatic_aberration;
        let red = warped * (ca.x + ca.y * r_sq);
        let blue = warped * (ca.x + ca.z + ca.w * r_sq);

        Some(ChannelCoords {
            red: self.to_source(red)?,
            green: self.to_source(warped)?,
            blue: self.to_source(blue)?,
        })
    }

    fn to_source(&self, theta: Vec2) -> Option<Vec2> {
        let e = &self.effective;
        let screen = e.lens_center + e.scale * theta;

        let half_extent = Vec2::new(self.viewport_width * 0.5, 0.5) + EDGE_EPSILON;
        let d = (screen - e.screen_center).abs();
        if d.x > half_extent.x || d.y > half_extent.y {
            return None;
        }

        Some(Vec2::new(
            ((screen.x - self.viewport_origin) / self.viewport_width).clamp(0.0, 1.0),
            screen.y.clamp(0.0, 1.0),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f32 = 1e-5;

    fn dk1_like() -> DistortionProfile {
        DistortionProfile::new(0.1453, 1.7146, [1.0, 0.22, 0.24, 0.0], [0.996, -0.004, 0.018, 0.0])
            .unwrap()
    }

    #[test]
    fn rejects_non_positive_scale() {
        assert!(matches!(
            DistortionProfile::new(0.0, 0.0, [1.0, 0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0]),
            Err(RenderError::InvalidProfile(_))
        ));
        assert!(DistortionProfile::new(0.0, -2.0, [1.0, 0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0]).is_err());
        assert!(DistortionProfile::new(0.0, f32::NAN, [1.0, 0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn resolve_matches_reference_values() {
        let profile = DistortionProfile::new(0.2, 2.0, [1.0, 0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0]).unwrap();
        let aspect = stereo_aspect(1280, 800);

        let left = profile.resolve(Eye::Left, aspect);
        assert!((left.lens_center.x - (0.25 + 0.2 * 0.25)).abs() < EPS);
        assert_eq!(left.lens_center.y, 0.5);
        assert_eq!(left.screen_center, Vec2::new(0.25, 0.5));
        assert!((left.scale.x - 0.125).abs() < EPS);
        assert!((left.scale.y - 0.125 * aspect).abs() < EPS);
        assert!((left.scale_in.x - 4.0).abs() < EPS);
        assert!((left.scale_in.y - 4.0 / aspect).abs() < EPS);

        let right = profile.resolve(Eye::Right, aspect);
        assert!((right.lens_center.x - (0.75 - 0.2 * 0.25)).abs() < EPS);
        assert_eq!(right.screen_center, Vec2::new(0.75, 0.5));
    }

    #[test]
    fn resolve_is_idempotent() {
        let profile = dk1_like();
        for eye in Eye::ALL {
            let a = profile.resolve(eye, 0.8);
            let b = profile.resolve(eye, 0.8);
            assert_eq!(a.lens_center.x.to_bits(), b.lens_center.x.to_bits());
            assert_eq!(a.scale.y.to_bits(), b.scale.y.to_bits());
            assert_eq!(a, b);
        }
    }

    #[test]
    fn strong_warp_pushes_corners_out_of_range() {
        let uniforms = dk1_like().uniforms(Eye::Left, 1280, 800);
        assert!(uniforms.lookup(Vec2::new(0.0, 0.0)).is_none());
        assert!(uniforms.lookup(Vec2::new(0.5 + 0.1453 * 0.5, 0.5)).is_some());
    }

    #[test]
    fn chromatic_correction_separates_channels() {
        let uniforms = dk1_like().uniforms(Eye::Left, 1280, 800);
        let coords = uniforms.lookup(Vec2::new(0.6, 0.55)).unwrap();
        assert_ne!(coords.red, coords.green);
        assert_ne!(coords.blue, coords.green);
    }

    proptest! {
        #[test]
        fn identity_coefficients_give_identity_lookup(
            offset in -0.5f32..0.5,
            u in 0.0f32..=1.0,
            v in 0.0f32..=1.0,
        ) {
            let profile = DistortionProfile::new(offset, 1.0, [1.0, 0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0]).unwrap();
            for eye in Eye::ALL {
                let uniforms = profile.uniforms(eye, 1280, 800);
                let coords = uniforms.lookup(Vec2::new(u, v));
                prop_assert!(coords.is_some());
                let coords = coords.unwrap();
                for c in [coords.red, coords.green, coords.blue] {
                    prop_assert!((c.x - u).abs() < 1e-4, "x {} vs {}", c.x, u);
                    prop_assert!((c.y - v).abs() < 1e-4, "y {} vs {}", c.y, v);
                }
            }
        }

        #[test]
        fn eyes_are_mirror_images(offset in -1.0f32..1.0, scale in 0.1f32..4.0) {
            let profile = DistortionProfile::new(offset, scale, [1.0, 0.22, 0.24, 0.0], [1.0, 0.0, 0.0, 0.0]).unwrap();
            let left = profile.resolve(Eye::Left, 0.8);
            let right = profile.resolve(Eye::Right, 0.8);
            prop_assert!(((right.lens_center.x - 0.5) - (0.5 - left.lens_center.x)).abs() < EPS);
            prop_assert_eq!(left.scale, right.scale);
            prop_assert_eq!(left.scale_in, right.scale_in);
        }

        #[test]
        fn scale_stays_positive(scale in 1e-3f32..1e3, aspect in 0.1f32..4.0) {
            let profile = DistortionProfile::new(0.0, scale, [1.0, 0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0]).unwrap();
            prop_assert!((profile.inv_scale - 1.0 / scale).abs() <= f32::EPSILON * profile.inv_scale);
            for eye in Eye::ALL {
                let e = profile.resolve(eye, aspect);
                prop_assert!(e.scale.x > 0.0);
                prop_assert!(e.scale.y > 0.0);
            }
        }
    }
}
