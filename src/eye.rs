//! Eye identity and side-by-side viewport layout.

/// Which half of the side-by-side target a pass belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    /// Render order within one stereo frame.
    pub const ALL: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn viewport(self) -> EyeViewport {
        match self {
            Eye::Left => EyeViewport {
                origin_x_fraction: 0.0,
                width_fraction: 0.5,
                mirror_x: false,
            },
            Eye::Right => EyeViewport {
                origin_x_fraction: 0.5,
                width_fraction: 0.5,
                mirror_x: true,
            },
        }
    }

    /// -1 for the mirrored eye, +1 otherwise.
    pub fn mirror_sign(self) -> f32 {
        if self.viewport().mirror_x {
            -1.0
        } else {
            1.0
        }
    }
}

/// Horizontal region of the presentation target assigned to one eye,
/// in fractions of the full target width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeViewport {
    pub origin_x_fraction: f32,
    pub width_fraction: f32,
    pub mirror_x: bool,
}

impl EyeViewport {
    /// Pixel rectangle `(x, y, width, height)` inside a `width` x `height` target.
    pub fn pixel_rect(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let half = width / 2;
        let x = if self.origin_x_fraction > 0.0 { half } else { 0 };
        (x, 0, half, height)
    }
}

/// Aspect ratio of one eye's half of a `width` x `height` target.
pub fn stereo_aspect(width: u32, height: u32) -> f32 {
    (0.5 * width as f32) / height as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn right_eye_is_mirrored_and_offset() {
        let left = Eye::Left.viewport();
        let right = Eye::Right.viewport();
        assert_eq!(left.origin_x_fraction, 0.0);
        assert_eq!(right.origin_x_fraction, 0.5);
        assert!(!left.mirror_x);
        assert!(right.mirror_x);
        assert_eq!(Eye::Right.mirror_sign(), -1.0);
    }

    #[test]
    fn pixel_rects_split_at_half_width() {
        assert_eq!(Eye::Left.viewport().pixel_rect(1280, 800), (0, 0, 640, 800));
        assert_eq!(Eye::Right.viewport().pixel_rect(1280, 800), (640, 0, 640, 800));
    }

    #[test]
    fn stereo_aspect_uses_half_width() {
        assert_eq!(stereo_aspect(1280, 800), 0.8);
    }
}
