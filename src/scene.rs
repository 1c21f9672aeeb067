//! Scene content for the offscreen pass
//!
//! The procedural scene is a small ambient-occlusion bench: three spheres over
//! a ground plane, bobbing with time, seen from a camera shifted sideways by the
//! signed eye offset. `shaders/aobench.wgsl` is the GPU version of [`shade`];
//! the two must stay in step.

use glam::{Mat4, Vec2, Vec3, Vec4};
use serde::Deserialize;

use crate::eye::Eye;
use crate::frame::FrameState;

/// Camera units per unit of eye offset.
pub const PARALLAX_SCALE: f32 = 0.01;

const SPHERE_RADIUS: f32 = 0.5;
const PLANE_Y: f32 = -0.5;
const AO_STRATA: u32 = 4;
const AO_BIAS: f32 = 1e-4;
const NO_HIT: f32 = 1e17;

/// What the offscreen pass draws, as selected in the config.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SceneKind {
    AoBench,
    Solid { color: [f32; 4] },
    EyeColors { left: [f32; 4], right: [f32; 4] },
}

impl Default for SceneKind {
    fn default() -> Self {
        SceneKind::AoBench
    }
}

impl SceneKind {
    pub fn content_for(&self, eye: Eye) -> SceneContent {
        match *self {
            SceneKind::AoBench => SceneContent::AoBench,
            SceneKind::Solid { color } => SceneContent::Solid(Vec4::from_array(color)),
            SceneKind::EyeColors { left, right } => match eye {
                Eye::Left => SceneContent::Solid(Vec4::from_array(left)),
                Eye::Right => SceneContent::Solid(Vec4::from_array(right)),
            },
        }
    }
}

/// Content resolved for a single eye pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SceneContent {
    AoBench,
    Solid(Vec4),
}

impl SceneContent {
    /// Value of the shader's `mode` uniform.
    pub fn mode(&self) -> u32 {
        match self {
            SceneContent::AoBench => 0,
            SceneContent::Solid(_) => 1,
        }
    }

    pub fn solid_color(&self) -> Vec4 {
        match self {
            SceneContent::AoBench => Vec4::ZERO,
            SceneContent::Solid(color) => *color,
        }
    }
}

/// Inputs of one offscreen render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneParams {
    pub eye: Eye,
    pub time: f32,
    pub eye_offset: f32,
    pub resolution: Vec2,
    /// Rotation-only view transform.
    pub view: Mat4,
    pub content: SceneContent,
}

impl SceneParams {
    pub fn new(
        eye: Eye,
        frame: &FrameState,
        resolution: (u32, u32),
        view: Mat4,
        kind: &SceneKind,
    ) -> Self {
        Self {
            eye,
            time: frame.time(),
            eye_offset: frame.eye_offset(eye),
            resolution: Vec2::new(resolution.0 as f32, resolution.1 as f32),
            view,
            content: kind.content_for(eye),
        }
    }
}

#[derive(Clone, Copy)]
struct Hit {
    t: f32,
    p: Vec3,
    n: Vec3,
}

fn sphere_center(index: usize, time: f32) -> Vec3 {
    const BASE: [Vec3; 3] = [
        Vec3::new(-2.0, 0.0, -3.5),
        Vec3::new(-0.5, 0.0, -3.0),
        Vec3::new(1.0, 0.0, -2.2),
    ];
    let fi = index as f32;
    BASE[index] + Vec3::new(0.0, 0.2 * (2.0 * time + fi).sin(), 0.0)
}

fn intersect_sphere(center: Vec3, ro: Vec3, rd: Vec3, best: Option<Hit>) -> Option<Hit> {
    let rs = ro - center;
    let b = rs.dot(rd);
    let c = rs.dot(rs) - SPHERE_RADIUS * SPHERE_RADIUS;
    let d = b * b - c;
    if d > 0.0 {
        let t = -b - d.sqrt();
        let limit = best.map_or(NO_HIT, |h| h.t);
        if t > 0.0 && t < limit {
            let p = ro + rd * t;
            return Some(Hit {
                t,
                p,
                n: (p - center).normalize(),
            });
        }
    }
    best
}

fn intersect_plane(ro: Vec3, rd: Vec3, best: Option<Hit>) -> Option<Hit> {
    if rd.y.abs() < 1e-17 {
        return best;
    }
    let t = -(ro.y - PLANE_Y) / rd.y;
    let limit = best.map_or(NO_HIT, |h| h.t);
    if t > 0.0 && t < limit {
        return Some(Hit {
            t,
            p: ro + rd * t,
            n: Vec3::Y,
        });
    }
    best
}

fn trace(ro: Vec3, rd: Vec3, time: f32) -> Option<Hit> {
    let mut hit = None;
    for i in 0..3 {
        hit = intersect_sphere(sphere_center(i, time), ro, rd, hit);
    }
    intersect_plane(ro, rd, hit)
}

fn ortho_basis(n: Vec3) -> [Vec3; 3] {
    let up = if n.x < 0.6 && n.x > -0.6 {
        Vec3::X
    } else if n.y < 0.6 && n.y > -0.6 {
        Vec3::Y
    } else if n.z < 0.6 && n.z > -0.6 {
        Vec3::Z
    } else {
        Vec3::X
    };
    let b0 = up.cross(n).normalize();
    let b1 = n.cross(b0).normalize();
    [b0, b1, n]
}

/// Fraction of the hemisphere above `hit` that is not blocked by scene geometry.
fn ambient_occlusion(hit: &Hit, time: f32) -> f32 {
    let [b0, b1, b2] = ortho_basis(hit.n);
    let origin = hit.p + hit.n * AO_BIAS;
    let mut occluded = 0.0;
    for i in 0..AO_STRATA {
        for j in 0..AO_STRATA {
            let r = ((i as f32 + 0.5) / AO_STRATA as f32).sqrt();
            let phi = std::f32::consts::TAU * (j as f32 + 0.5) / AO_STRATA as f32;
            let local = Vec3::new(phi.cos() * r, phi.sin() * r, (1.0 - r * r).sqrt());
            let dir = b0 * local.x + b1 * local.y + b2 * local.z;
            if trace(origin, dir, time).is_some() {
                occluded += 1.0;
            }
        }
    }
    let total = (AO_STRATA * AO_STRATA) as f32;
    (total - occluded) / total
}

/// Color of the offscreen texel at `uv` (origin top left).
pub fn shade(params: &SceneParams, uv: Vec2) -> Vec4 {
    if let SceneContent::Solid(color) = params.content {
        return color;
    }

    let aspect = params.resolution.x / params.resolution.y;
    let ndc = Vec2::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0);
    let local = Vec3::new(ndc.x * aspect, ndc.y, -1.0).normalize();
    let rd = params.view.transpose().transform_vector3(local);
    let ro = Vec3::new(params.eye_offset * PARALLAX_SCALE, 0.0, 0.0);

    match trace(ro, rd, params.time) {
        Some(hit) => {
            let ao = ambient_occlusion(&hit, params.time);
            Vec4::new(ao, ao, ao, 1.0)
        }
        None => Vec4::new(0.0, 0.0, 0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(eye: Eye, kind: SceneKind) -> SceneParams {
        SceneParams::new(eye, &FrameState::default(), (64, 64), Mat4::IDENTITY, &kind)
    }

    #[test]
    fn eye_colors_pick_per_eye() {
        let kind = SceneKind::EyeColors {
            left: [1.0, 0.0, 0.0, 1.0],
            right: [0.0, 1.0, 0.0, 1.0],
        };
        assert_eq!(shade(&params(Eye::Left, kind), Vec2::splat(0.5)), Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(shade(&params(Eye::Right, kind), Vec2::splat(0.5)), Vec4::new(0.0, 1.0, 0.0, 1.0));
    }

    #[test]
    fn ground_plane_is_lit_and_sky_is_black() {
        let p = params(Eye::Left, SceneKind::AoBench);
        let ground = shade(&p, Vec2::new(0.5, 0.98));
        assert!(ground.x > 0.0 && ground.w == 1.0);
        let sky = shade(&p, Vec2::new(0.5, 0.0));
        assert_eq!(sky, Vec4::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn eye_offset_shifts_the_camera() {
        let left = params(Eye::Left, SceneKind::AoBench);
        let right = params(Eye::Right, SceneKind::AoBench);
        assert_eq!(left.eye_offset, -right.eye_offset);
        let differs = (0..32).any(|i| {
            let uv = Vec2::new(i as f32 / 32.0, 0.6);
            shade(&left, uv) != shade(&right, uv)
        });
        assert!(differs);
    }

    #[test]
    fn scene_kind_parses_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            scene: SceneKind,
        }
        let parsed: Wrapper = toml::from_str("[scene]\nkind = \"solid\"\ncolor = [1.0, 0.0, 0.0, 1.0]\n").unwrap();
        assert_eq!(parsed.scene, SceneKind::Solid { color: [1.0, 0.0, 0.0, 1.0] });
    }
}
