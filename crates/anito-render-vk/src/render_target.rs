// SPDX-License-Identifier: CEPL-1.0
//! Clear-only render pass plus one framebuffer per swapchain image.

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{vk_err, RenderError};
use crate::swapchain::SwapchainManager;

pub struct RenderTargets<'d, D: Device> {
    device: &'d D,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
    generation: u64,
}

impl<'d, D: Device> RenderTargets<'d, D> {
    pub fn build(device: &'d D, swapchain: &SwapchainManager<'_, D>) -> Result<Self, RenderError> {
        let mut targets = RenderTargets {
            device,
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
            extent: swapchain.extent(),
            generation: swapchain.generation(),
        };
        targets.create(swapchain)?;
        Ok(targets)
    }

    fn create(&mut self, swapchain: &SwapchainManager<'_, D>) -> Result<(), RenderError> {
        let color_attachment = vk::AttachmentDescription {
            format: swapchain.format(),
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        };
        let color_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &color_ref,
            ..Default::default()
        };
        // Layout transition waits for the acquire semaphore's stage.
        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ..Default::default()
        };
        let rp_info = vk::RenderPassCreateInfo {
            s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &color_attachment,
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: 1,
            p_dependencies: &dependency,
            ..Default::default()
        };
        self.render_pass = self
            .device
            .create_render_pass(&rp_info)
            .map_err(vk_err("vkCreateRenderPass"))?;

        let extent = swapchain.extent();
        for view in swapchain.views() {
            let fb_info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass: self.render_pass,
                attachment_count: 1,
                p_attachments: view,
                width: extent.width,
                height: extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = self
                .device
                .create_framebuffer(&fb_info)
                .map_err(vk_err("vkCreateFramebuffer"))?;
            self.framebuffers.push(fb);
        }
        self.extent = extent;
        self.generation = swapchain.generation();
        debug!(
            "render targets gen {}: {} framebuffers at {}x{}",
            self.generation,
            self.framebuffers.len(),
            extent.width,
            extent.height
        );
        Ok(())
    }

    /// Destroys framebuffers before the render pass they were made against.
    pub fn release(&mut self) {
        for fb in self.framebuffers.drain(..) {
            self.device.destroy_framebuffer(fb);
        }
        if self.render_pass != vk::RenderPass::null() {
            self.device.destroy_render_pass(self.render_pass);
            self.render_pass = vk::RenderPass::null();
        }
    }

    pub fn rebuild(&mut self, swapchain: &SwapchainManager<'_, D>) -> Result<(), RenderError> {
        self.release();
        self.create(swapchain)
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Swapchain generation these targets were built against.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<D: Device> Drop for RenderTargets<'_, D> {
    fn drop(&mut self) {
        self.release();
    }
}
