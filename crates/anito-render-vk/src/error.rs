// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

/// Startup failures. None of these are retried.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to load the Vulkan loader: {0}")]
    Loader(String),
    #[error("Vulkan {required} required, loader offers {available}")]
    ApiVersion { required: String, available: String },
    #[error("required extension {0} is not available")]
    MissingExtension(String),
    #[error("no suitable physical device: {0}")]
    NoSuitableDevice(String),
    #[error("surface creation failed: {0}")]
    SurfaceCreation(String),
    #[error("queue family {0} cannot present to this surface")]
    PresentUnsupported(u32),
    #[error("{call} failed: {result}")]
    Vk {
        call: &'static str,
        result: vk::Result,
    },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Init(#[from] InitError),
    /// Out-of-date swapchain; handled by recreation inside the frame loop.
    #[error("swapchain generation {generation} is out of date")]
    SwapchainStale { generation: u64 },
    #[error("image token from swapchain generation {found} used with generation {expected}")]
    StaleGeneration { expected: u64, found: u64 },
    #[error("acquired image {index} but only {count} images are tracked")]
    ImageOutOfRange { index: u32, count: usize },
    #[error("device lost")]
    DeviceLost,
    #[error("acquire_next_image failed: {0}")]
    Acquire(vk::Result),
    #[error("queue_submit failed: {0}")]
    Submission(vk::Result),
    #[error("queue_present failed: {0}")]
    Present(vk::Result),
    #[error("{call} failed: {result}")]
    Vk {
        call: &'static str,
        result: vk::Result,
    },
    #[error("surface extent is 0x0")]
    ZeroExtent,
    #[error("frame loop halted after a fatal error")]
    Halted,
}

impl RenderError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RenderError::SwapchainStale { .. })
    }

    pub fn is_device_lost(&self) -> bool {
        matches!(self, RenderError::DeviceLost)
    }
}

/// `map_err` adaptor that keeps device loss distinguishable from ordinary
/// call failures.
pub(crate) fn vk_err(call: &'static str) -> impl FnOnce(vk::Result) -> RenderError {
    move |result| match result {
        vk::Result::ERROR_DEVICE_LOST => RenderError::DeviceLost,
        result => RenderError::Vk { call, result },
    }
}

pub(crate) fn init_err(call: &'static str) -> impl FnOnce(vk::Result) -> InitError {
    move |result| InitError::Vk { call, result }
}
