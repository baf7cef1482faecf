// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::info;

use crate::device::{Device, SurfaceSource, SurfaceSupport};
use crate::error::{vk_err, InitError, RenderError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VkVsyncMode {
    #[default]
    Fifo,      // Target monitor refresh rate
    Mailbox,   // Smart vsync, fps uncapped
    Immediate, // No vsync, may tear
}

#[derive(Clone, Copy, Debug)]
pub struct SwapchainDesc {
    pub extent: vk::Extent2D,
    /// At least 2; the surface may raise or cap it.
    pub image_count: u32,
    pub vsync: VkVsyncMode,
}

/// One acquired image. Only valid with the swapchain generation that
/// produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcquiredImage {
    pub index: u32,
    pub suboptimal: bool,
    pub generation: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    Suboptimal,
}

// Info only
fn fmt_name(f: vk::Format) -> &'static str {
    match f {
        vk::Format::B8G8R8A8_UNORM => "B8G8R8A8_UNORM",
        vk::Format::B8G8R8A8_SRGB => "B8G8R8A8_SRGB",
        vk::Format::R8G8B8A8_SRGB => "R8G8B8A8_SRGB",
        vk::Format::R8G8B8A8_UNORM => "R8G8B8A8_UNORM",
        vk::Format::A2B10G10R10_UNORM_PACK32 => "A2B10G10R10_UNORM",
        vk::Format::R16G16B16A16_SFLOAT => "R16G16B16A16_SFLOAT",
        _ => "OTHER",
    }
}

fn pm_name(m: vk::PresentModeKHR) -> &'static str {
    match m {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}

/// Prefers an 8-bit sRGB format, otherwise the first one the surface lists.
pub fn pick_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Option<(vk::SurfaceFormatKHR, &'static str)> {
    // A lone UNDEFINED entry means the surface takes anything.
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            let f = vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            };
            return Some((f, "sdr_unconstrained"));
        }
    }

    let find = |want: vk::Format| {
        formats.iter().copied().find(|f| {
            f.format == want && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
    };
    if let Some(f) = find(vk::Format::B8G8R8A8_SRGB) {
        return Some((f, "sdr_bgra8_srgb"));
    }
    if let Some(f) = find(vk::Format::R8G8B8A8_SRGB) {
        return Some((f, "sdr_rgba8_srgb"));
    }
    if let Some(f) = find(vk::Format::B8G8R8A8_UNORM) {
        return Some((f, "sdr_bgra8_unorm_srgbcs"));
    }

    formats.first().map(|&f| (f, "driver_default"))
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR], mode: VkVsyncMode) -> vk::PresentModeKHR {
    let order: &[vk::PresentModeKHR] = match mode {
        VkVsyncMode::Fifo => &[vk::PresentModeKHR::FIFO],
        VkVsyncMode::Mailbox => &[vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO],
        VkVsyncMode::Immediate => &[
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ],
    };
    order
        .iter()
        .copied()
        .find(|m| modes.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

pub fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// `max_image_count == 0` means the surface sets no upper bound.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, desired: u32) -> u32 {
    let count = desired.max(2).max(caps.min_image_count);
    if caps.max_image_count == 0 {
        count
    } else {
        count.min(caps.max_image_count)
    }
}

/// Swapchain, its images and one view per image.
///
/// Every successful [`SwapchainManager::recreate`] bumps the generation;
/// anything derived from an older generation must be rebuilt before use.
pub struct SwapchainManager<'d, D: Device> {
    device: &'d D,
    handle: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    desc: SwapchainDesc,
    generation: u64,
}

impl<'d, D: Device> SwapchainManager<'d, D> {
    pub fn create(
        device: &'d D,
        surface: &impl SurfaceSource,
        desc: SwapchainDesc,
    ) -> Result<Self, RenderError> {
        let mut sc = SwapchainManager {
            device,
            handle: vk::SwapchainKHR::null(),
            format: vk::SurfaceFormatKHR::default(),
            extent: desc.extent,
            images: Vec::new(),
            views: Vec::new(),
            desc: SwapchainDesc {
                image_count: desc.image_count.max(2),
                ..desc
            },
            generation: 0,
        };
        let support = surface.support()?;
        sc.build(surface.handle(), &support)?;
        Ok(sc)
    }

    /// Rebuilds for `extent`, handing the current swapchain to the driver as
    /// `old_swapchain`. A zero surface extent leaves everything untouched.
    pub fn recreate(
        &mut self,
        surface: &impl SurfaceSource,
        extent: vk::Extent2D,
    ) -> Result<(), RenderError> {
        let support = surface.support()?;
        let resolved = extent_from_caps(&support.capabilities, extent);
        if resolved.width == 0 || resolved.height == 0 {
            return Err(RenderError::ZeroExtent);
        }

        self.device
            .wait_idle()
            .map_err(vk_err("vkDeviceWaitIdle"))?;
        self.release_views();
        self.desc.extent = extent;
        self.build(surface.handle(), &support)?;
        self.generation += 1;
        Ok(())
    }

    fn build(
        &mut self,
        surface: vk::SurfaceKHR,
        support: &SurfaceSupport,
    ) -> Result<(), RenderError> {
        let caps = &support.capabilities;
        let extent = extent_from_caps(caps, self.desc.extent);
        if extent.width == 0 || extent.height == 0 {
            return Err(RenderError::ZeroExtent);
        }
        let (surf_format, pick_reason) = pick_surface_format(&support.formats).ok_or_else(|| {
            InitError::SurfaceCreation("surface reports no formats".to_owned())
        })?;
        let present_mode = choose_present_mode(&support.present_modes, self.desc.vsync);
        let image_count = choose_image_count(caps, self.desc.image_count);

        // Prefer IDENTITY if supported, otherwise use current to avoid extra blits.
        let pre_transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };

        let old_swapchain = self.handle;
        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface,
            min_image_count: image_count,
            image_format: surf_format.format,
            image_color_space: surf_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            old_swapchain,
            ..Default::default()
        };
        let created = self.device.create_swapchain(&swap_info);
        // The old swapchain is retired whether or not creation succeeded.
        if old_swapchain != vk::SwapchainKHR::null() {
            self.device.destroy_swapchain(old_swapchain);
            self.handle = vk::SwapchainKHR::null();
        }
        self.handle = created.map_err(vk_err("vkCreateSwapchainKHR"))?;
        self.format = surf_format;
        self.extent = extent;
        self.images = self
            .device
            .swapchain_images(self.handle)
            .map_err(vk_err("vkGetSwapchainImagesKHR"))?;

        for i in 0..self.images.len() {
            let iv_info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image: self.images[i],
                view_type: vk::ImageViewType::TYPE_2D,
                format: surf_format.format,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            let view = self
                .device
                .create_image_view(&iv_info)
                .map_err(vk_err("vkCreateImageView"))?;
            self.views.push(view);
        }

        info!(
            "swapchain gen {}: reason: {}, format: {}, present_mode: {}, extent: {}x{}, images(min={} → picked={} → got={})",
            self.generation + u64::from(old_swapchain != vk::SwapchainKHR::null()),
            pick_reason,
            fmt_name(surf_format.format),
            pm_name(present_mode),
            extent.width,
            extent.height,
            caps.min_image_count,
            image_count,
            self.images.len()
        );
        Ok(())
    }

    fn release_views(&mut self) {
        for view in self.views.drain(..) {
            self.device.destroy_image_view(view);
        }
    }

    /// Requests the next presentable image, signalling `signal` when it is
    /// ready to be rendered to.
    pub fn acquire(&self, signal: vk::Semaphore) -> Result<AcquiredImage, RenderError> {
        match self.device.acquire_next_image(self.handle, signal) {
            Ok((index, suboptimal)) => Ok(AcquiredImage {
                index,
                suboptimal,
                generation: self.generation,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RenderError::SwapchainStale {
                generation: self.generation,
            }),
            Err(vk::Result::ERROR_DEVICE_LOST) => Err(RenderError::DeviceLost),
            Err(e) => Err(RenderError::Acquire(e)),
        }
    }

    pub fn present(
        &self,
        image: AcquiredImage,
        wait: vk::Semaphore,
    ) -> Result<PresentStatus, RenderError> {
        if image.generation != self.generation {
            return Err(RenderError::StaleGeneration {
                expected: self.generation,
                found: image.generation,
            });
        }
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &self.handle,
            p_image_indices: &image.index,
            ..Default::default()
        };
        match self.device.queue_present(&present) {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RenderError::SwapchainStale {
                generation: self.generation,
            }),
            Err(vk::Result::ERROR_DEVICE_LOST) => Err(RenderError::DeviceLost),
            Err(e) => Err(RenderError::Present(e)),
        }
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<D: Device> Drop for SwapchainManager<'_, D> {
    fn drop(&mut self) {
        self.release_views();
        if self.handle != vk::SwapchainKHR::null() {
            self.device.destroy_swapchain(self.handle);
        }
    }
}
