// SPDX-License-Identifier: CEPL-1.0
use std::num::NonZeroU32;

pub use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        RenderSize { width, height }
    }

    /// A minimised window reports a zero-sized client area.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Renderer choice reported by the menu overlay once per frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Selection {
    /// Nothing chosen yet, keep looping.
    #[default]
    Pending,
    /// The 1-based index of the chosen renderer.
    Renderer(NonZeroU32),
    /// The explicit "None" entry was chosen.
    Dismissed,
}

impl Selection {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Selection::Pending,
            r if r > 0 => Selection::Renderer(NonZeroU32::new(r as u32).unwrap_or(NonZeroU32::MIN)),
            _ => Selection::Dismissed,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Selection::Pending => 0,
            Selection::Renderer(k) => k.get() as i32,
            Selection::Dismissed => -1,
        }
    }

    pub fn is_final(self) -> bool {
        self != Selection::Pending
    }
}

/// What the frame loop needs from the windowing layer.
///
/// Surface creation additionally needs the native handles, which callers pass
/// separately through [`HasWindowHandle`] and [`HasDisplayHandle`].
pub trait WindowSource {
    fn poll_events(&mut self);
    fn should_close(&self) -> bool;
    fn current_extent(&self) -> RenderSize;
}
