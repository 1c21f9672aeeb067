//! Offscreen scene pass

use crate::program::{ProgramSource, SceneUniform, UniformLayout};
use crate::renderer::shader::GpuProgram;
use crate::renderer::surface::OffscreenSurface;
use crate::scene::SceneParams;
use crate::Result;

const SCENE_GROUP: u32 = 0;
const SCENE_BINDING: u32 = 0;

pub struct SceneRenderer {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    uniforms: UniformLayout<SceneUniform>,
}

impl SceneRenderer {
    pub fn new(
        device: &wgpu::Device,
        source: &ProgramSource,
        target_format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let program = GpuProgram::create(device, source)?;
        let uniforms: UniformLayout<SceneUniform> =
            program.interface.uniforms(SCENE_GROUP, SCENE_BINDING)?;

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Scene Uniform Buffer"),
            size: uniforms.span() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: SCENE_BINDING,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: SCENE_BINDING,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = program.pipeline(device, &pipeline_layout, target_format)?;

        Ok(Self {
            pipeline,
            bind_group,
            uniform_buffer,
            uniforms,
        })
    }

    fn upload(&self, queue: &wgpu::Queue, params: &SceneParams) {
        let mut block = self.uniforms.block();
        block
            .set_f32s(SceneUniform::View, &params.view.to_cols_array())
            .set_f32s(SceneUniform::Resolution, &params.resolution.to_array())
            .set_f32s(SceneUniform::Time, &[params.time])
            .set_f32s(SceneUniform::EyeOffset, &[params.eye_offset])
            .set_f32s(SceneUniform::SolidColor, &params.content.solid_color().to_array())
            .set_u32(SceneUniform::Mode, params.content.mode());
        queue.write_buffer(&self.uniform_buffer, 0, block.as_bytes());
    }

    /// Clear `target` and draw one eye's scene into it. The uniforms take
    /// effect at the next submit, which is the target's unbind.
    pub fn render(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &OffscreenSurface,
        params: &SceneParams,
    ) {
        self.upload(queue, params);

        let (width, height) = target.size();
        let mut pass = target.bind(encoder);
        pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.draw(0..6, 0..1);
    }
}
