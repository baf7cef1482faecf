// SPDX-License-Identifier: CEPL-1.0
use std::num::NonZeroU32;

use anito_platform::winit::keyboard::KeyCode;
use anito_platform::KeyQueue;
use anito_render::Selection;
use anito_render_vk::{OverlayFrame, UiOverlay};

pub const RENDERERS: [&str; 3] = ["BGFX", "Ogre3D", "Diligent Engine"];

/// Keyboard renderer picker: `1..=K` choose a renderer, `0` or Escape
/// choose none.
pub struct MenuOverlay {
    keys: KeyQueue,
    entries: &'static [&'static str],
}

impl MenuOverlay {
    pub fn new(entries: &'static [&'static str], keys: KeyQueue) -> Self {
        MenuOverlay { keys, entries }
    }

    pub fn describe(&self) -> String {
        let mut out: Vec<String> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, name)| format!("[{}] {name}", i + 1))
            .collect();
        out.push("[0/Esc] None".to_owned());
        out.join("  ")
    }

    pub fn entry(&self, selection: Selection) -> Option<&'static str> {
        match selection {
            Selection::Renderer(k) => self.entries.get(k.get() as usize - 1).copied(),
            _ => None,
        }
    }

    fn selection_for(&self, key: KeyCode) -> Option<Selection> {
        let digit = match key {
            KeyCode::Escape | KeyCode::Digit0 | KeyCode::Numpad0 => {
                return Some(Selection::Dismissed)
            }
            KeyCode::Digit1 | KeyCode::Numpad1 => 1,
            KeyCode::Digit2 | KeyCode::Numpad2 => 2,
            KeyCode::Digit3 | KeyCode::Numpad3 => 3,
            KeyCode::Digit4 | KeyCode::Numpad4 => 4,
            KeyCode::Digit5 | KeyCode::Numpad5 => 5,
            KeyCode::Digit6 | KeyCode::Numpad6 => 6,
            KeyCode::Digit7 | KeyCode::Numpad7 => 7,
            KeyCode::Digit8 | KeyCode::Numpad8 => 8,
            KeyCode::Digit9 | KeyCode::Numpad9 => 9,
            _ => return None,
        };
        if digit as usize > self.entries.len() {
            return None;
        }
        NonZeroU32::new(digit).map(Selection::Renderer)
    }
}

impl UiOverlay for MenuOverlay {
    // Only the clear is recorded; the menu itself lives in the log and title.
    fn draw(&mut self, _frame: &OverlayFrame) -> Selection {
        while let Some(key) = self.keys.pop() {
            if let Some(selection) = self.selection_for(key) {
                return selection;
            }
        }
        Selection::Pending
    }
}
