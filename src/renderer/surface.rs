//! Offscreen color target

use crate::{RenderError, Result};

/// A single color texture the scene is drawn into and the compositor samples.
pub struct OffscreenSurface {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
}

impl OffscreenSurface {
    pub fn create(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let fail = |message: String| RenderError::Allocation {
            call: "create_texture",
            message,
        };
        if width == 0 || height == 0 {
            return Err(fail(format!("empty offscreen target {width}x{height}")));
        }

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        if let Some(e) = validation.or(out_of_memory) {
            return Err(fail(e.to_string()));
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        log::debug!("Offscreen surface {}x{} {:?}", width, height, format);
        Ok(Self {
            texture,
            view,
            format,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Start a pass targeting this surface, cleared to transparent black.
    pub fn bind<'e>(&self, encoder: &'e mut wgpu::CommandEncoder) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Offscreen Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }

    /// Submit the recorded writes and block until the GPU has finished them,
    /// so the next sampler read sees the complete image.
    pub fn unbind(&self, device: &wgpu::Device, queue: &wgpu::Queue, encoder: wgpu::CommandEncoder) {
        queue.submit(Some(encoder.finish()));
        device.poll(wgpu::Maintain::Wait);
    }
}
