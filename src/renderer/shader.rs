//! Program creation on the device
//!
//! Sources are reflected with naga first, then handed to wgpu. Module and
//! pipeline creation run inside validation error scopes so a bad shader
//! surfaces as a `RenderError` rather than an uncaptured device error.

use std::borrow::Cow;

use log::info;

use crate::program::{ProgramInterface, ProgramSource, ShaderStage, FRAGMENT_ENTRY, VERTEX_ENTRY};
use crate::{RenderError, Result};

pub struct GpuProgram {
    pub interface: ProgramInterface,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
}

impl GpuProgram {
    pub fn create(device: &wgpu::Device, source: &ProgramSource) -> Result<Self> {
        let interface = ProgramInterface::compile(source)?;
        let vertex = create_module(device, source, ShaderStage::Vertex)?;
        let fragment = create_module(device, source, ShaderStage::Fragment)?;
        Ok(Self {
            interface,
            vertex,
            fragment,
        })
    }

    pub fn label(&self) -> &str {
        &self.interface.label
    }

    /// Full-screen pipeline with a single color target and no depth.
    pub fn pipeline(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        format: wgpu::TextureFormat,
    ) -> Result<wgpu::RenderPipeline> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(self.label()),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: &self.vertex,
                entry_point: Some(VERTEX_ENTRY),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.fragment,
                entry_point: Some(FRAGMENT_ENTRY),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        if let Some(e) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::ShaderLink {
                label: self.label().to_string(),
                reason: e.to_string(),
            });
        }
        info!("Pipeline for program '{}' OK", self.label());
        Ok(pipeline)
    }
}

fn create_module(
    device: &wgpu::Device,
    source: &ProgramSource,
    stage: ShaderStage,
) -> Result<wgpu::ShaderModule> {
    let label = format!("{} ({})", source.label, stage);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&label),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source.stage(stage))),
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(e) => Err(RenderError::ShaderCompile {
            label: source.label.clone(),
            stage,
            log: e.to_string(),
        }),
        None => Ok(module),
    }
}
