//! Window management and the run loop using winit

use std::sync::Arc;
use winit::{
    dpi::PhysicalSize,
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    window::{Window as WinitWindow, WindowBuilder},
};

use crate::backend::wgpu_backend::WgpuBackend;
use crate::error::{RendererError, RendererResult};
use crate::input::{InputState, Key};
use crate::renderer::Renderer;
use crate::timer::FrameTimer;
use crate::RendererConfig;

/// Wrapper around winit window with additional state
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
}

impl Window {
    /// Create a new window with the given title and dimensions
    pub fn new(
        event_loop: &EventLoop<()>,
        title: &str,
        width: u32,
        height: u32,
    ) -> RendererResult<Self> {
        let window = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .build(event_loop)
            .map_err(|e| RendererError::Window(e.to_string()))?;

        Ok(Self {
            window: Arc::new(window),
            width,
            height,
        })
    }

    pub fn window(&self) -> &WinitWindow {
        &self.window
    }

    /// Get arc reference to window for backend initialization
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Track size changes; returns the new size on resize.
    pub fn handle_event(&mut self, event: &WindowEvent) -> Option<(u32, u32)> {
        match event {
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
                Some((size.width, size.height))
            }
            _ => None,
        }
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

/// Open a window and render until it is closed or Escape is released.
///
/// The first error from the renderer stops the loop and is returned.
pub fn run(config: RendererConfig) -> RendererResult<()> {
    config.validate()?;

    let event_loop = EventLoop::new().map_err(|e| RendererError::Window(e.to_string()))?;
    let mut window = Window::new(&event_loop, &config.title, config.width, config.height)?;
    let backend = WgpuBackend::new(window.window_arc(), config.vsync)?;
    let mut renderer = Renderer::new(backend, config)?;

    let mut input = InputState::new();
    let mut timer = FrameTimer::new();
    let mut failure: Option<RendererError> = None;

    event_loop
        .run(|event, elwt: &EventLoopWindowTarget<()>| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, .. } => {
                    input.handle_window_event(&event);

                    if let Some((width, height)) = window.handle_event(&event) {
                        if let Err(e) = renderer.resize(width, height) {
                            failure = Some(e);
                            elwt.exit();
                        }
                    }

                    match event {
                        WindowEvent::CloseRequested => elwt.exit(),
                        WindowEvent::RedrawRequested => {
                            timer.tick();
                            renderer.update(timer.delta_seconds(), &mut input);
                            if input.keyboard.was_released(Key::Escape) {
                                elwt.exit();
                            }
                            if let Err(e) = renderer.render() {
                                failure = Some(e);
                                elwt.exit();
                            }
                            input.end_frame();
                        }
                        _ => {}
                    }
                }
                Event::DeviceEvent { event, .. } => input.handle_device_event(&event),
                Event::AboutToWait => window.request_redraw(),
                _ => {}
            }
        })
        .map_err(|e| RendererError::Window(e.to_string()))?;

    failure.map_or(Ok(()), Err)
}
