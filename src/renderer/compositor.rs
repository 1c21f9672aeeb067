//! Lens distortion compositor
//!
//! Samples the offscreen image through the inverse warp into one eye's half of
//! the presentation target. The other half is left untouched (`LoadOp::Load`).

use crate::distortion::DistortionUniforms;
use crate::eye::Eye;
use crate::program::{DistortionUniform, ProgramSource, UniformLayout};
use crate::renderer::shader::GpuProgram;
use crate::renderer::surface::OffscreenSurface;
use crate::Result;

const DISTORTION_GROUP: u32 = 0;
const TEXTURE_BINDING: u32 = 0;
const SAMPLER_BINDING: u32 = 1;
const UNIFORM_BINDING: u32 = 2;

pub struct DistortionCompositor {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    uniforms: UniformLayout<DistortionUniform>,
}

impl DistortionCompositor {
    pub fn new(
        device: &wgpu::Device,
        source: &ProgramSource,
        present_format: wgpu::TextureFormat,
        offscreen: &OffscreenSurface,
    ) -> Result<Self> {
        let program = GpuProgram::create(device, source)?;
        let uniforms: UniformLayout<DistortionUniform> =
            program.interface.uniforms(DISTORTION_GROUP, UNIFORM_BINDING)?;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Distortion Buffer"),
            size: uniforms.span() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Distortion Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: TEXTURE_BINDING,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: SAMPLER_BINDING,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: UNIFORM_BINDING,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Distortion Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: TEXTURE_BINDING,
                    resource: wgpu::BindingResource::TextureView(offscreen.view()),
                },
                wgpu::BindGroupEntry {
                    binding: SAMPLER_BINDING,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
                wgpu::BindGroupEntry {
                    binding: UNIFORM_BINDING,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Distortion Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = program.pipeline(device, &pipeline_layout, present_format)?;

        Ok(Self {
            pipeline,
            bind_group,
            uniform_buffer,
            uniforms,
        })
    }

    fn upload(&self, queue: &wgpu::Queue, uniforms: &DistortionUniforms) {
        let e = &uniforms.effective;
        let mut block = self.uniforms.block();
        block
            .set_f32s(DistortionUniform::LensCenter, &e.lens_center.to_array())
            .set_f32s(DistortionUniform::ScreenCenter, &e.screen_center.to_array())
            .set_f32s(DistortionUniform::Scale, &e.scale.to_array())
            .set_f32s(DistortionUniform::ScaleIn, &e.scale_in.to_array())
            .set_f32s(DistortionUniform::HmdWarpParam, &e.warp_coeffs.to_array())
            .set_f32s(DistortionUniform::ChromAbParam, &e.chromatic_aberration.to_array())
            .set_f32s(
                DistortionUniform::Viewport,
                &[uniforms.viewport_origin, uniforms.viewport_width],
            );
        queue.write_buffer(&self.uniform_buffer, 0, block.as_bytes());
    }

    /// Record the warp of the offscreen image into `eye`'s half of
    /// `present_view`. The caller flushes with a submit.
    pub fn composite(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        present_view: &wgpu::TextureView,
        present_size: (u32, u32),
        eye: Eye,
        uniforms: &DistortionUniforms,
    ) {
        self.upload(queue, uniforms);

        let (x, y, width, height) = eye.viewport().pixel_rect(present_size.0, present_size.1);
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Distortion Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: present_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_viewport(x as f32, y as f32, width as f32, height as f32, 0.0, 1.0);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.draw(0..6, 0..1);
    }
}
