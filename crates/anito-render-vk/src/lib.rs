// SPDX-License-Identifier: CEPL-1.0
//! Vulkan bring-up and the clear-and-present frame loop.
//!
//! [`GraphicsContext`] owns instance, device and queue. A
//! [`PresentationSurface`] borrows it, and a [`FrameLoop`] borrows both,
//! so Rust's drop order mirrors Vulkan's destruction order.
#![deny(unsafe_op_in_unsafe_fn)]

mod context;
mod device;
mod error;
mod frame_loop;
mod render_target;
mod surface;
mod swapchain;
mod sync;

#[cfg(test)]
mod mock;

pub use context::{
    fmt_version, select_device, ContextDesc, DeviceCandidate, DeviceRequirements, GraphicsContext,
};
pub use device::{Device, SurfaceSource, SurfaceSupport};
pub use error::{InitError, RenderError};
pub use frame_loop::{
    FrameLoop, FrameLoopDesc, FrameOutcome, FrameState, LoopExit, OverlayFrame, UiOverlay,
};
pub use render_target::RenderTargets;
pub use surface::{required_window_extensions, PresentationSurface};
pub use swapchain::{
    choose_image_count, choose_present_mode, extent_from_caps, pick_surface_format, AcquiredImage,
    PresentStatus, SwapchainDesc, SwapchainManager, VkVsyncMode,
};
pub use sync::{FrameSlot, FrameSynchronizer};

pub use ash::vk;

/// Frames the CPU may record ahead of the GPU.
pub const FRAMES_IN_FLIGHT: usize = 2;
