// SPDX-License-Identifier: CEPL-1.0
//! winit window driven by explicit polling, so the frame loop stays in
//! charge of when events are processed.
#![deny(unsafe_op_in_unsafe_fn)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use anito_render::{RenderSize, WindowSource};
use anyhow::{bail, Result};
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowAttributes, WindowId};

pub use winit;

/// Key presses collected while pumping events, shared with whoever
/// consumes them (the menu overlay).
#[derive(Clone, Debug, Default)]
pub struct KeyQueue(Rc<RefCell<VecDeque<KeyCode>>>);

impl KeyQueue {
    pub fn push(&self, key: KeyCode) {
        self.0.borrow_mut().push_back(key);
    }

    pub fn pop(&self) -> Option<KeyCode> {
        self.0.borrow_mut().pop_front()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

struct WindowState {
    attributes: WindowAttributes,
    window: Option<Window>,
    size: RenderSize,
    close_requested: bool,
    create_error: Option<String>,
    keys: KeyQueue,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => {
                let size = window.inner_size();
                self.size = RenderSize::new(size.width, size.height);
                info!("window created ({}x{})", size.width, size.height);
                self.window = Some(window);
            }
            Err(e) => {
                error!("create_window failed: {e}");
                self.create_error = Some(e.to_string());
                self.close_requested = true;
            }
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.close_requested = true;
            }
            WindowEvent::Resized(new_size) => {
                self.size = RenderSize::new(new_size.width, new_size.height);
                debug!("Resized → {}x{}", new_size.width, new_size.height);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => self.keys.push(code),
            _ => {}
        }
    }
}

pub struct PlatformWindow {
    // Declared first: the window must close before its event loop.
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl PlatformWindow {
    /// Opens a window and pumps the event loop until it exists.
    pub fn open(title: &str, width: u32, height: u32) -> Result<Self> {
        let event_loop = EventLoop::new()?;
        let attributes = Window::default_attributes()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height));
        let mut platform = PlatformWindow {
            state: WindowState {
                attributes,
                window: None,
                size: RenderSize::new(width, height),
                close_requested: false,
                create_error: None,
                keys: KeyQueue::default(),
            },
            event_loop,
        };

        // Some platforms only deliver `resumed` after a few pumps.
        for _ in 0..64 {
            platform.pump(Some(Duration::from_millis(5)));
            if platform.state.window.is_some() {
                return Ok(platform);
            }
            if let Some(e) = platform.state.create_error.take() {
                bail!("failed to create window: {e}");
            }
        }
        bail!("event loop never resumed, no window was created")
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            debug!("event loop exited with {code}");
            self.state.close_requested = true;
        }
    }

    pub fn keys(&self) -> KeyQueue {
        self.state.keys.clone()
    }

    pub fn set_title(&self, title: &str) {
        if let Some(window) = &self.state.window {
            window.set_title(title);
        }
    }
}

impl WindowSource for PlatformWindow {
    fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    fn should_close(&self) -> bool {
        self.state.close_requested
    }

    fn current_extent(&self) -> RenderSize {
        self.state.size
    }
}

impl HasWindowHandle for PlatformWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.state
            .window
            .as_ref()
            .ok_or(HandleError::Unavailable)?
            .window_handle()
    }
}

impl HasDisplayHandle for PlatformWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.event_loop.display_handle()
    }
}
