//! vr-stereo: windowed host for the stereo distortion pipeline.
//!
//! Usage: `vr-stereo [config.toml]`

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowId};

use vr_stereo::input::HostAction;
use vr_stereo::trackball::{self, Trackball};
use vr_stereo::{Config, FrameState, RenderError, RenderSession, StereoFrameDriver, WgpuBackend};

struct StereoApp {
    config: Config,
    window: Option<Arc<Window>>,
    driver: Option<StereoFrameDriver<WgpuBackend>>,
    trackball: Trackball,
    cursor: (f64, f64),
    failure: Option<RenderError>,
}

impl StereoApp {
    fn new(config: Config) -> Self {
        Self {
            config,
            window: None,
            driver: None,
            trackball: Trackball::new(),
            cursor: (0.0, 0.0),
            failure: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> vr_stereo::Result<()> {
        let (width, height) = self.config.present_size();
        let attrs = Window::default_attributes()
            .with_title("VR Stereo")
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(false);
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .map_err(|e| RenderError::Device(format!("Failed to create window: {e}")))?,
        );

        let backend = pollster::block_on(WgpuBackend::new_windowed(window.clone(), &self.config))?;
        info!("Renderer initialized");

        let profile = self.config.profile()?;
        profile.log_summary();

        let mut session = RenderSession::new(
            profile,
            FrameState::new(self.config.stereo.eye_base_separation),
            self.config.scene,
        );
        session.separation_step = self.config.stereo.separation_step;

        self.driver = Some(StereoFrameDriver::new(backend, session));
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: RenderError) {
        error!("{}", e);
        self.failure = Some(e);
        event_loop.exit();
    }

    fn handle_action(&mut self, event_loop: &ActiveEventLoop, action: HostAction) {
        match action {
            HostAction::Quit => event_loop.exit(),
            HostAction::Recenter => {
                self.trackball.recenter();
                self.sync_view();
            }
            HostAction::IncreaseSeparation | HostAction::DecreaseSeparation => {
                if let (Some(step), Some(driver)) = (action.separation_step(), &mut self.driver) {
                    driver.session_mut().adjust_separation(step);
                }
            }
        }
    }

    fn cursor_normalized(&self) -> Option<glam::Vec2> {
        let window = self.window.as_ref()?;
        let size = window.inner_size();
        Some(trackball::to_normalized(self.cursor, (size.width, size.height)))
    }

    fn sync_view(&mut self) {
        if let Some(driver) = &mut self.driver {
            driver.session_mut().set_view(self.trackball.view_matrix());
        }
    }
}

impl ApplicationHandler for StereoApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.driver.is_some() {
            return;
        }
        info!("App resumed - creating window");
        if let Err(e) = self.start(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                info!("Resize to {}x{} ignored, target size is fixed", size.width, size.height);
            }

            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                if let Some(action) = HostAction::from_key(&event.logical_key) {
                    self.handle_action(event_loop, action);
                }
            }

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => {
                    if let Some(point) = self.cursor_normalized() {
                        self.trackball.begin_drag(point);
                    }
                }
                ElementState::Released => self.trackball.end_drag(),
            },

            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x, position.y);
                if self.trackball.is_dragging() {
                    if let Some(point) = self.cursor_normalized() {
                        self.trackball.drag_to(point);
                        self.sync_view();
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                let Some(driver) = &mut self.driver else {
                    return;
                };
                match driver.render_frame() {
                    Ok(_) => {}
                    Err(e) if !e.is_fatal() => warn!("Skipping frame: {}", e),
                    Err(e) => {
                        self.fail(event_loop, e);
                        return;
                    }
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }

            _ => {}
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => match Config::load(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    info!("VR Stereo starting...");

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            error!("Failed to create event loop: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut app = StereoApp::new(config);
    if let Err(e) = event_loop.run_app(&mut app) {
        error!("Event loop failed: {}", e);
        return ExitCode::FAILURE;
    }

    match app.failure {
        Some(_) => ExitCode::FAILURE,
        None => ExitCode::SUCCESS,
    }
}
