// =============================================================================
// WINDOW - winit event loop driven by pumping
// =============================================================================
//
// pump_app_events keeps the loop on main's stack instead of handing control
// to winit, so the device, swap chain and renderer can borrow each other in
// plain construction order.

use anyhow::{anyhow, Context, Result};
use ash::vk;
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowAttributes, WindowId},
};

use crate::config::WindowConfig;
use crate::renderer::RenderWindow;

/// Event handler state shared with winit while pumping
struct WindowState {
    attributes: WindowAttributes,
    created: Option<Window>,
    window_requested: bool,
    creation_error: Option<String>,
    close_requested: bool,
    resized: bool,
}

impl WindowState {
    fn new(attributes: WindowAttributes) -> Self {
        Self {
            attributes,
            created: None,
            window_requested: false,
            creation_error: None,
            close_requested: false,
            resized: false,
        }
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window_requested {
            return;
        }
        self.window_requested = true;

        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => self.created = Some(window),
            Err(e) => {
                self.creation_error = Some(e.to_string());
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.close_requested = true;
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.resized = true;
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    self.close_requested = true;
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }
}

/// Fields drop in order: the window goes before its event loop
pub struct AppWindow {
    window: Window,
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl AppWindow {
    /// Create the event loop and pump it until the window exists
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let mut event_loop = EventLoop::new().context("Failed to create event loop")?;

        let attributes = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(config.width, config.height));
        let mut state = WindowState::new(attributes);

        let window = loop {
            let status = event_loop.pump_app_events(Some(Duration::ZERO), &mut state);

            if let Some(window) = state.created.take() {
                break window;
            }
            if let Some(e) = state.creation_error.take() {
                return Err(anyhow!("Failed to create window: {}", e));
            }
            if let PumpStatus::Exit(code) = status {
                return Err(anyhow!("Event loop exited with code {} before the window opened", code));
            }
        };

        log::info!(
            "Window: {}x{} ({})",
            config.width,
            config.height,
            config.title
        );

        Ok(Self {
            window,
            state,
            event_loop,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Dispatch pending events without blocking
    pub fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    pub fn should_close(&self) -> bool {
        self.state.close_requested
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if let PumpStatus::Exit(_) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            self.state.close_requested = true;
        }
    }
}

impl RenderWindow for AppWindow {
    fn extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    fn was_resized(&self) -> bool {
        self.state.resized
    }

    fn reset_resized_flag(&mut self) {
        self.state.resized = false;
    }

    fn wait_events(&mut self) -> bool {
        if !self.state.close_requested {
            self.pump(None);
        }
        !self.state.close_requested
    }
}
