//! Virtual trackball for the view rotation
//!
//! Mouse drags are projected onto a sphere that turns into a hyperbolic sheet
//! away from the center, and the rotation between consecutive points is
//! accumulated into a quaternion.

use glam::{Mat4, Quat, Vec2, Vec3};

/// Sphere radius in normalized window units.
pub const TRACKBALL_SIZE: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trackball {
    rotation: Quat,
    last: Option<Vec2>,
}

impl Default for Trackball {
    fn default() -> Self {
        Self::new()
    }
}

impl Trackball {
    pub fn new() -> Self {
        Self {
            rotation: Quat::IDENTITY,
            last: None,
        }
    }

    pub fn begin_drag(&mut self, point: Vec2) {
        self.last = Some(point);
    }

    /// Rotate by the motion from the previous drag point to `point`. Ignored
    /// when no drag is in progress.
    pub fn drag_to(&mut self, point: Vec2) {
        let Some(last) = self.last else {
            return;
        };
        let delta = rotation_between(last, point);
        self.rotation = (delta * self.rotation).normalize();
        self.last = Some(point);
    }

    pub fn end_drag(&mut self) {
        self.last = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.last.is_some()
    }

    pub fn recenter(&mut self) {
        self.rotation = Quat::IDENTITY;
        self.last = None;
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_quat(self.rotation)
    }
}

/// Window pixel position to [-1,1]² with +y up.
pub fn to_normalized(position: (f64, f64), window_size: (u32, u32)) -> Vec2 {
    let (w, h) = (window_size.0.max(1) as f32, window_size.1.max(1) as f32);
    let (x, y) = (position.0 as f32, position.1 as f32);
    Vec2::new((2.0 * x - w) / w, (h - 2.0 * y) / h)
}

fn project_to_sphere(r: f32, p: Vec2) -> f32 {
    let d = p.length();
    if d < r * std::f32::consts::FRAC_1_SQRT_2 {
        (r * r - d * d).sqrt()
    } else {
        let t = r * std::f32::consts::FRAC_1_SQRT_2;
        t * t / d
    }
}

/// Rotation that carries `from` to `to` on the trackball surface.
pub fn rotation_between(from: Vec2, to: Vec2) -> Quat {
    if from == to {
        return Quat::IDENTITY;
    }

    let p1 = Vec3::new(from.x, from.y, project_to_sphere(TRACKBALL_SIZE, from));
    let p2 = Vec3::new(to.x, to.y, project_to_sphere(TRACKBALL_SIZE, to));
    let axis = p1.cross(p2);
    if axis.length_squared() <= f32::EPSILON {
        return Quat::IDENTITY;
    }

    let t = ((p1 - p2).length() / (2.0 * TRACKBALL_SIZE)).clamp(-1.0, 1.0);
    let phi = 2.0 * t.asin();
    Quat::from_axis_angle(axis.normalize(), phi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_motion_no_rotation() {
        assert_eq!(rotation_between(Vec2::new(0.3, 0.1), Vec2::new(0.3, 0.1)), Quat::IDENTITY);
    }

    #[test]
    fn horizontal_drag_turns_about_y() {
        let q = rotation_between(Vec2::ZERO, Vec2::new(0.2, 0.0));
        let (axis, angle) = q.to_axis_angle();
        assert!(angle > 0.0);
        assert!((axis - Vec3::Y).length() < 1e-5);
        // the point under the cursor follows it
        assert!((q * Vec3::Z).x > 0.0);
    }

    #[test]
    fn outside_sphere_uses_hyperbola() {
        let r = TRACKBALL_SIZE;
        let far = Vec2::new(2.0, 0.0);
        let z = project_to_sphere(r, far);
        assert!((z - r * r * 0.5 / 2.0).abs() < 1e-6);
        // continuous at the switch radius
        let edge = r * std::f32::consts::FRAC_1_SQRT_2;
        let inside = project_to_sphere(r, Vec2::new(edge - 1e-4, 0.0));
        let outside = project_to_sphere(r, Vec2::new(edge + 1e-4, 0.0));
        assert!((inside - outside).abs() < 1e-3);
    }

    #[test]
    fn drags_accumulate_and_recenter_resets() {
        let mut ball = Trackball::new();
        ball.drag_to(Vec2::new(0.5, 0.0));
        assert_eq!(ball.rotation(), Quat::IDENTITY);

        ball.begin_drag(Vec2::ZERO);
        ball.drag_to(Vec2::new(0.1, 0.0));
        let once = ball.rotation();
        ball.drag_to(Vec2::new(0.2, 0.0));
        assert!(ball.rotation().angle_between(Quat::IDENTITY) > once.angle_between(Quat::IDENTITY));
        assert!((ball.rotation().length() - 1.0).abs() < 1e-5);
        ball.end_drag();
        assert!(!ball.is_dragging());

        ball.recenter();
        assert_eq!(ball.view_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn window_coordinates_normalize() {
        assert_eq!(to_normalized((640.0, 400.0), (1280, 800)), Vec2::ZERO);
        assert_eq!(to_normalized((0.0, 0.0), (1280, 800)), Vec2::new(-1.0, 1.0));
        assert_eq!(to_normalized((1280.0, 800.0), (1280, 800)), Vec2::new(1.0, -1.0));
    }
}
