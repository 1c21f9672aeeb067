//! wgpu backend
//!
//! Owns the device, the presentation target (a window surface or a headless
//! texture), the offscreen surface and both passes. Every pass is submitted
//! and waited on before the next begins.

mod compositor;
mod scene_pass;
mod shader;
mod surface;

use std::sync::Arc;

use log::{debug, info, warn};
use winit::window::Window;

use crate::config::Config;
use crate::distortion::DistortionUniforms;
use crate::driver::StereoBackend;
use crate::eye::Eye;
use crate::program::ProgramSource;
use crate::scene::SceneParams;
use crate::{RenderError, Result};

pub use compositor::DistortionCompositor;
pub use scene_pass::SceneRenderer;
pub use shader::GpuProgram;
pub use surface::OffscreenSurface;

const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const HEADLESS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

enum PresentTarget {
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Texture(wgpu::Texture),
}

struct AcquiredFrame {
    // None for the headless target
    surface_texture: Option<wgpu::SurfaceTexture>,
    view: wgpu::TextureView,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    target: PresentTarget,
    present_size: (u32, u32),
    frame: Option<AcquiredFrame>,
    offscreen: OffscreenSurface,
    written_for: Option<Eye>,
    scene: SceneRenderer,
    compositor: DistortionCompositor,
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::from_env().unwrap_or(wgpu::Backends::PRIMARY),
        ..Default::default()
    })
}

async fn request_device(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'_>>,
) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue)> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| RenderError::Device("No adapter found".to_string()))?;

    let info = adapter.get_info();
    info!("Selected adapter: {} ({:?})", info.name, info.backend);

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("VR Stereo Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                ..Default::default()
            },
            None,
        )
        .await
        .map_err(|e| RenderError::Device(e.to_string()))?;

    info!("Device created successfully");
    Ok((adapter, device, queue))
}

impl WgpuBackend {
    /// Backend presenting to `window`, sized and configured from `config`.
    pub async fn new_windowed(window: Arc<Window>, config: &Config) -> Result<Self> {
        let instance = create_instance();
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| RenderError::Device(format!("Failed to create surface: {e}")))?;
        let (adapter, device, queue) = request_device(&instance, Some(&surface)).await?;

        let size = window.inner_size();
        let (width, height) = if size.width > 0 && size.height > 0 {
            (size.width, size.height)
        } else {
            config.present_size()
        };
        if (width, height) != config.present_size() {
            warn!(
                "Window is {}x{}, configured display is {}x{}; using the window size",
                width,
                height,
                config.display.width,
                config.display.height
            );
        }

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .first()
            .copied()
            .ok_or_else(|| RenderError::Device("Surface is not supported by the adapter".to_string()))?;
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);
        info!("Surface configured: {}x{} {:?}", width, height, format);

        let target = PresentTarget::Window {
            surface,
            config: surface_config,
        };
        Self::assemble(
            adapter.get_info(),
            device,
            queue,
            target,
            (width, height),
            format,
            config.offscreen_size(),
            &config.shaders.scene_program()?,
            &config.shaders.distortion_program()?,
        )
    }

    /// Backend presenting into an RGBA8 texture that can be read back.
    pub async fn new_headless(
        present_size: (u32, u32),
        offscreen_size: (u32, u32),
        scene: &ProgramSource,
        distortion: &ProgramSource,
    ) -> Result<Self> {
        let instance = create_instance();
        let (adapter, device, queue) = request_device(&instance, None).await?;

        let (width, height) = present_size;
        if width == 0 || height == 0 {
            return Err(RenderError::Allocation {
                call: "create_texture",
                message: format!("empty presentation target {width}x{height}"),
            });
        }
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Headless Present Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: HEADLESS_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        Self::assemble(
            adapter.get_info(),
            device,
            queue,
            PresentTarget::Texture(texture),
            present_size,
            HEADLESS_FORMAT,
            offscreen_size,
            scene,
            distortion,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        adapter_info: wgpu::AdapterInfo,
        device: wgpu::Device,
        queue: wgpu::Queue,
        target: PresentTarget,
        present_size: (u32, u32),
        present_format: wgpu::TextureFormat,
        offscreen_size: (u32, u32),
        scene: &ProgramSource,
        distortion: &ProgramSource,
    ) -> Result<Self> {
        let offscreen = OffscreenSurface::create(&device, offscreen_size.0, offscreen_size.1, OFFSCREEN_FORMAT)?;
        let scene = SceneRenderer::new(&device, scene, offscreen.format())?;
        let compositor = DistortionCompositor::new(&device, distortion, present_format, &offscreen)?;

        Ok(Self {
            device,
            queue,
            adapter_info,
            target,
            present_size,
            frame: None,
            offscreen,
            written_for: None,
            scene,
            compositor,
        })
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    fn acquire(&self) -> Result<AcquiredFrame> {
        match &self.target {
            PresentTarget::Window { surface, config } => match surface.get_current_texture() {
                Ok(output) => {
                    let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
                    Ok(AcquiredFrame {
                        surface_texture: Some(output),
                        view,
                    })
                }
                Err(e) => {
                    surface.configure(&self.device, config);
                    Err(RenderError::Surface(e.to_string()))
                }
            },
            PresentTarget::Texture(texture) => Ok(AcquiredFrame {
                surface_texture: None,
                view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
            }),
        }
    }

    /// Copy the headless presentation texture back as RGBA8, row-major from
    /// the top left.
    pub fn read_present_pixels(&self) -> Result<Vec<[u8; 4]>> {
        let PresentTarget::Texture(texture) = &self.target else {
            return Err(RenderError::Device(
                "Window surfaces cannot be read back".to_string(),
            ));
        };

        const ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let (width, height) = self.present_size;
        let unpadded_bytes_per_row = width * 4;
        let padded_bytes_per_row = (unpadded_bytes_per_row + ALIGNMENT - 1) & !(ALIGNMENT - 1);

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded_bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| RenderError::Device(e.to_string()))?
            .map_err(|e| RenderError::Device(format!("Readback failed: {e}")))?;

        let pixels: Vec<[u8; 4]> = {
            let data = slice.get_mapped_range();
            data.chunks(padded_bytes_per_row as usize)
                .flat_map(|row| row[..unpadded_bytes_per_row as usize].chunks_exact(4))
                .map(|px| [px[0], px[1], px[2], px[3]])
                .collect()
        };
        buffer.unmap();
        Ok(pixels)
    }
}

impl StereoBackend for WgpuBackend {
    fn present_size(&self) -> (u32, u32) {
        self.present_size
    }

    fn offscreen_size(&self) -> (u32, u32) {
        self.offscreen.size()
    }

    fn begin_frame(&mut self) -> Result<()> {
        self.written_for = None;
        let frame = self.acquire()?;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Clear Encoder"),
        });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.queue.submit(Some(encoder.finish()));
        self.frame = Some(frame);
        Ok(())
    }

    fn render_eye(&mut self, params: &SceneParams) -> Result<()> {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Scene Encoder"),
        });
        self.scene.render(&self.queue, &mut encoder, &self.offscreen, params);
        self.offscreen.unbind(&self.device, &self.queue, encoder);
        self.written_for = Some(params.eye);
        debug!("Offscreen written for {:?}", params.eye);
        Ok(())
    }

    fn composite_eye(&mut self, eye: Eye, uniforms: &DistortionUniforms) -> Result<()> {
        if self.written_for != Some(eye) {
            return Err(RenderError::StaleOffscreen { eye });
        }
        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| RenderError::Surface("No presentation frame acquired".to_string()))?;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Distortion Encoder"),
        });
        self.compositor
            .composite(&self.queue, &mut encoder, &frame.view, self.present_size, eye, uniforms);
        self.queue.submit(Some(encoder.finish()));
        self.written_for = None;
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        if let Some(frame) = self.frame.take() {
            if let Some(output) = frame.surface_texture {
                output.present();
            }
        }
        self.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }
}
