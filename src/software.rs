//! CPU reference backend
//!
//! Runs the same scene shading and inverse-warp lookup as the GPU shaders on
//! plain float images. Used for headless verification of the pipeline.

use glam::{Vec2, Vec4};
use log::debug;

use crate::distortion::DistortionUniforms;
use crate::driver::StereoBackend;
use crate::eye::Eye;
use crate::scene::{self, SceneContent, SceneParams};
use crate::{RenderError, Result};

/// Linear RGBA float image, row-major, origin top left.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<Vec4>,
}

impl Image {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::Allocation {
                call: "Image::new",
                message: format!("empty image {width}x{height}"),
            });
        }
        Ok(Self {
            width,
            height,
            pixels: vec![Vec4::ZERO; (width * height) as usize],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fill(&mut self, color: Vec4) {
        self.pixels.fill(color);
    }

    pub fn get(&self, x: u32, y: u32) -> Vec4 {
        self.pixels[(y * self.width + x) as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, color: Vec4) {
        self.pixels[(y * self.width + x) as usize] = color;
    }

    /// Bilinear sample with clamp-to-edge addressing, `uv` in [0,1]².
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let x = uv.x * self.width as f32 - 0.5;
        let y = uv.y * self.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;

        let texel = |tx: f32, ty: f32| {
            let cx = (tx as i64).clamp(0, self.width as i64 - 1) as u32;
            let cy = (ty as i64).clamp(0, self.height as i64 - 1) as u32;
            self.get(cx, cy)
        };

        let top = texel(x0, y0).lerp(texel(x0 + 1.0, y0), fx);
        let bottom = texel(x0, y0 + 1.0).lerp(texel(x0 + 1.0, y0 + 1.0), fx);
        top.lerp(bottom, fy)
    }

    /// Pixels as 8-bit RGBA.
    pub fn to_rgba8(&self) -> Vec<[u8; 4]> {
        self.pixels
            .iter()
            .map(|p| {
                let c = (p.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
                [c.x as u8, c.y as u8, c.z as u8, c.w as u8]
            })
            .collect()
    }
}

/// Offscreen image plus its render-target binding state.
pub struct SoftwareSurface {
    image: Image,
    bound: bool,
}

impl SoftwareSurface {
    pub fn create(width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            image: Image::new(width, height)?,
            bound: false,
        })
    }

    /// Bind as the render target; the contents are cleared to transparent
    /// black. Dropping the binding unbinds.
    pub fn bind(&mut self) -> SoftwareBinding<'_> {
        self.bound = true;
        self.image.fill(Vec4::ZERO);
        SoftwareBinding { surface: self }
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn image(&self) -> &Image {
        &self.image
    }
}

pub struct SoftwareBinding<'a> {
    surface: &'a mut SoftwareSurface,
}

impl SoftwareBinding<'_> {
    pub fn image_mut(&mut self) -> &mut Image {
        &mut self.surface.image
    }
}

impl Drop for SoftwareBinding<'_> {
    fn drop(&mut self) {
        self.surface.bound = false;
    }
}

pub struct SoftwareBackend {
    present: Image,
    offscreen: SoftwareSurface,
    // eye whose image currently sits in the offscreen surface, until composited
    written_for: Option<Eye>,
    frames_presented: u64,
}

impl SoftwareBackend {
    pub fn new(present_size: (u32, u32), offscreen_size: (u32, u32)) -> Result<Self> {
        Ok(Self {
            present: Image::new(present_size.0, present_size.1)?,
            offscreen: SoftwareSurface::create(offscreen_size.0, offscreen_size.1)?,
            written_for: None,
            frames_presented: 0,
        })
    }

    /// The presentation target as of the last call.
    pub fn present_image(&self) -> &Image {
        &self.present
    }

    pub fn offscreen(&self) -> &SoftwareSurface {
        &self.offscreen
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

impl StereoBackend for SoftwareBackend {
    fn present_size(&self) -> (u32, u32) {
        (self.present.width, self.present.height)
    }

    fn offscreen_size(&self) -> (u32, u32) {
        (self.offscreen.image.width, self.offscreen.image.height)
    }

    fn begin_frame(&mut self) -> Result<()> {
        self.present.fill(Vec4::ZERO);
        self.written_for = None;
        Ok(())
    }

    fn render_eye(&mut self, params: &SceneParams) -> Result<()> {
        {
            let mut binding = self.offscreen.bind();
            let image = binding.image_mut();
            match params.content {
                SceneContent::Solid(color) => image.fill(color),
                SceneContent::AoBench => {
                    let (w, h) = (image.width, image.height);
                    for y in 0..h {
                        for x in 0..w {
                            let uv = Vec2::new((x as f32 + 0.5) / w as f32, (y as f32 + 0.5) / h as f32);
                            image.set(x, y, scene::shade(params, uv));
                        }
                    }
                }
            }
        }
        self.written_for = Some(params.eye);
        debug!("Software offscreen written for {:?}", params.eye);
        Ok(())
    }

    fn composite_eye(&mut self, eye: Eye, uniforms: &DistortionUniforms) -> Result<()> {
        if self.offscreen.is_bound() || self.written_for != Some(eye) {
            return Err(RenderError::StaleOffscreen { eye });
        }

        let source = &self.offscreen.image;
        let (x0, y0, vw, vh) = eye.viewport().pixel_rect(self.present.width, self.present.height);
        for py in 0..vh {
            for px in 0..vw {
                let uv = Vec2::new((px as f32 + 0.5) / vw as f32, (py as f32 + 0.5) / vh as f32);
                let color = match uniforms.lookup(uv) {
                    Some(coords) => Vec4::new(
                        source.sample(coords.red).x,
                        source.sample(coords.green).y,
                        source.sample(coords.blue).z,
                        1.0,
                    ),
                    None => Vec4::ZERO,
                };
                self.present.set(x0 + px, y0 + py, color);
            }
        }

        self.written_for = None;
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.frames_presented += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilinear_sample_blends_neighbours() {
        let mut image = Image::new(2, 1).unwrap();
        image.set(0, 0, Vec4::ZERO);
        image.set(1, 0, Vec4::ONE);
        let mid = image.sample(Vec2::new(0.5, 0.5));
        assert!((mid.x - 0.5).abs() < 1e-6);
        assert_eq!(image.sample(Vec2::new(0.0, 0.5)), Vec4::ZERO);
        assert_eq!(image.sample(Vec2::new(1.0, 0.5)), Vec4::ONE);
    }

    #[test]
    fn binding_clears_and_unbinds_on_drop() {
        let mut surface = SoftwareSurface::create(4, 4).unwrap();
        {
            let mut binding = surface.bind();
            binding.image_mut().fill(Vec4::ONE);
        }
        assert!(!surface.is_bound());
        assert_eq!(surface.image().get(3, 3), Vec4::ONE);
        drop(surface.bind());
        assert_eq!(surface.image().get(3, 3), Vec4::ZERO);
    }

    #[test]
    fn compositing_without_render_is_rejected() {
        let mut backend = SoftwareBackend::new((8, 4), (4, 4)).unwrap();
        backend.begin_frame().unwrap();
        let uniforms = crate::DistortionProfile::identity().uniforms(Eye::Left, 8, 4);
        assert!(matches!(
            backend.composite_eye(Eye::Left, &uniforms),
            Err(RenderError::StaleOffscreen { eye: Eye::Left })
        ));
    }

    #[test]
    fn zero_sized_surface_fails_allocation() {
        assert!(matches!(
            SoftwareBackend::new((0, 800), (512, 512)),
            Err(RenderError::Allocation { .. })
        ));
    }
}
