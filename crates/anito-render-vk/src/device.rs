// SPDX-License-Identifier: CEPL-1.0
//! The calls the frame core makes against a logical device and its
//! swapchain loader.
//!
//! [`crate::GraphicsContext`] implements [`Device`] on top of `ash`. Callers
//! only ever hand an implementation handles that the same implementation
//! created, and destroy each handle once, after the GPU is done with it.

use ash::prelude::VkResult;
use ash::vk;

use crate::error::RenderError;

pub trait Device {
    fn wait_idle(&self) -> VkResult<()>;

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR<'_>) -> VkResult<vk::SwapchainKHR>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo<'_>) -> VkResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo<'_>) -> VkResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    /// Pool bound to the graphics queue family.
    fn create_command_pool(&self, flags: vk::CommandPoolCreateFlags) -> VkResult<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);

    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// Blocks without timeout.
    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo<'_>);
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);

    /// Submits to the graphics queue.
    fn queue_submit(&self, submit: &vk::SubmitInfo<'_>, fence: vk::Fence) -> VkResult<()>;
    /// Unbounded timeout. `Ok((index, suboptimal))`.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;
    /// Presents on the graphics queue. `Ok(suboptimal)`.
    fn queue_present(&self, info: &vk::PresentInfoKHR<'_>) -> VkResult<bool>;
}

/// Everything the swapchain needs to know about a surface, queried fresh
/// before every (re)creation.
#[derive(Clone, Debug, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

pub trait SurfaceSource {
    fn handle(&self) -> vk::SurfaceKHR;
    fn support(&self) -> Result<SurfaceSupport, RenderError>;
}
