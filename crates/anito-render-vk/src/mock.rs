// SPDX-License-Identifier: CEPL-1.0
//! In-memory [`Device`] and [`SurfaceSource`] for tests.
//!
//! Submitted work stays pending until someone waits on its fence or the
//! device idles. Misuse that a validation layer would report (resetting
//! busy fences or command buffers, waits that could never return, leaking
//! handles) is collected in [`MockDevice::violations`].

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};

use anito_render::{RenderSize, Selection, WindowSource};
use ash::prelude::VkResult;
use ash::vk::{self, Handle};

use crate::device::{Device, SurfaceSource, SurfaceSupport};
use crate::error::RenderError;
use crate::frame_loop::{OverlayFrame, UiOverlay};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Swapchain,
    ImageView,
    RenderPass,
    Framebuffer,
    CommandPool,
    CommandBuffer,
    Semaphore,
    Fence,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    Pending,
}

#[derive(Clone, Copy, Debug)]
pub enum AcquireStep {
    Image(u32),
    Suboptimal(u32),
    OutOfDate,
    DeviceLost,
}

#[derive(Clone, Copy, Debug)]
pub enum PresentStep {
    Optimal,
    Suboptimal,
    OutOfDate,
    DeviceLost,
}

#[derive(Default)]
struct State {
    next_handle: u64,
    live: HashMap<Kind, HashSet<u64>>,
    fences: HashMap<u64, FenceState>,
    semaphores: HashMap<u64, bool>,
    cmd_fence: HashMap<u64, u64>,
    swapchain_images: HashMap<u64, Vec<vk::Image>>,
    acquire_cursor: HashMap<u64, u32>,
    view_image: HashMap<u64, vk::Image>,
    fb_attachments: HashMap<u64, Vec<vk::ImageView>>,
    acquire_script: VecDeque<AcquireStep>,
    present_script: VecDeque<PresentStep>,
    last_old_swapchain: vk::SwapchainKHR,
    wait_idle_count: usize,
    presented: Vec<u32>,
    violations: Vec<String>,
}

impl State {
    fn mint(&mut self, kind: Kind) -> u64 {
        self.next_handle += 1;
        let raw = self.next_handle;
        self.live.entry(kind).or_default().insert(raw);
        raw
    }

    fn retire(&mut self, kind: Kind, raw: u64) {
        let gone = self.live.get_mut(&kind).is_some_and(|set| set.remove(&raw));
        if !gone {
            self.violations.push(format!("destroying unknown or dead {kind:?} {raw:#x}"));
        }
    }

    fn cmd_in_flight(&self, cmd: u64) -> bool {
        self.cmd_fence
            .get(&cmd)
            .and_then(|f| self.fences.get(f))
            .is_some_and(|s| *s == FenceState::Pending)
    }

    fn complete_all(&mut self) {
        for state in self.fences.values_mut() {
            if *state == FenceState::Pending {
                *state = FenceState::Signaled;
            }
        }
    }
}

#[derive(Default)]
pub struct MockDevice {
    state: RefCell<State>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_acquire(&self, steps: impl IntoIterator<Item = AcquireStep>) {
        self.state.borrow_mut().acquire_script.extend(steps);
    }

    pub fn script_acquire_out_of_date(&self) {
        self.script_acquire([AcquireStep::OutOfDate]);
    }

    pub fn script_present(&self, steps: impl IntoIterator<Item = PresentStep>) {
        self.state.borrow_mut().present_script.extend(steps);
    }

    /// Marks `fence` as guarding pending work that used `cmd`.
    pub fn fake_submit(&self, cmd: vk::CommandBuffer, fence: vk::Fence) {
        let mut st = self.state.borrow_mut();
        st.fences.insert(fence.as_raw(), FenceState::Pending);
        st.cmd_fence.insert(cmd.as_raw(), fence.as_raw());
    }

    pub fn fence_signaled(&self, fence: vk::Fence) -> bool {
        self.state.borrow().fences.get(&fence.as_raw()) == Some(&FenceState::Signaled)
    }

    pub fn live(&self, kind: Kind) -> usize {
        self.state.borrow().live.get(&kind).map_or(0, HashSet::len)
    }

    pub fn live_total(&self) -> usize {
        self.state.borrow().live.values().map(HashSet::len).sum()
    }

    pub fn is_live(&self, kind: Kind, raw: u64) -> bool {
        self.state
            .borrow()
            .live
            .get(&kind)
            .is_some_and(|set| set.contains(&raw))
    }

    pub fn view_image(&self, view: vk::ImageView) -> Option<vk::Image> {
        self.state.borrow().view_image.get(&view.as_raw()).copied()
    }

    pub fn framebuffer_attachments(&self, fb: vk::Framebuffer) -> Vec<vk::ImageView> {
        self.state
            .borrow()
            .fb_attachments
            .get(&fb.as_raw())
            .cloned()
            .unwrap_or_default()
    }

    pub fn last_old_swapchain(&self) -> vk::SwapchainKHR {
        self.state.borrow().last_old_swapchain
    }

    pub fn wait_idle_count(&self) -> usize {
        self.state.borrow().wait_idle_count
    }

    pub fn presented(&self) -> Vec<u32> {
        self.state.borrow().presented.clone()
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.borrow().violations.clone()
    }
}

impl Device for MockDevice {
    fn wait_idle(&self) -> VkResult<()> {
        let mut st = self.state.borrow_mut();
        st.wait_idle_count += 1;
        st.complete_all();
        Ok(())
    }

    fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR> {
        let mut st = self.state.borrow_mut();
        st.last_old_swapchain = info.old_swapchain;
        let raw = st.mint(Kind::Swapchain);
        let images = (0..info.min_image_count)
            .map(|_| {
                st.next_handle += 1;
                vk::Image::from_raw(st.next_handle)
            })
            .collect();
        st.swapchain_images.insert(raw, images);
        Ok(vk::SwapchainKHR::from_raw(raw))
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut st = self.state.borrow_mut();
        st.retire(Kind::Swapchain, swapchain.as_raw());
        st.swapchain_images.remove(&swapchain.as_raw());
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        self.state
            .borrow()
            .swapchain_images
            .get(&swapchain.as_raw())
            .cloned()
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView> {
        let mut st = self.state.borrow_mut();
        let raw = st.mint(Kind::ImageView);
        st.view_image.insert(raw, info.image);
        Ok(vk::ImageView::from_raw(raw))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut st = self.state.borrow_mut();
        if st.fb_attachments.values().any(|views| views.contains(&view)) {
            let msg = format!("destroying view {:#x} still used by a framebuffer", view.as_raw());
            st.violations.push(msg);
        }
        st.retire(Kind::ImageView, view.as_raw());
    }

    fn create_render_pass(&self, _info: &vk::RenderPassCreateInfo<'_>) -> VkResult<vk::RenderPass> {
        let raw = self.state.borrow_mut().mint(Kind::RenderPass);
        Ok(vk::RenderPass::from_raw(raw))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state.borrow_mut().retire(Kind::RenderPass, render_pass.as_raw());
    }

    fn create_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo<'_>,
    ) -> VkResult<vk::Framebuffer> {
        // SAFETY: callers build `p_attachments` from a live slice of
        // `attachment_count` views.
        let attachments = unsafe {
            std::slice::from_raw_parts(info.p_attachments, info.attachment_count as usize)
        }
        .to_vec();
        let mut st = self.state.borrow_mut();
        let raw = st.mint(Kind::Framebuffer);
        st.fb_attachments.insert(raw, attachments);
        Ok(vk::Framebuffer::from_raw(raw))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        let mut st = self.state.borrow_mut();
        st.retire(Kind::Framebuffer, framebuffer.as_raw());
        st.fb_attachments.remove(&framebuffer.as_raw());
    }

    fn create_command_pool(&self, _flags: vk::CommandPoolCreateFlags) -> VkResult<vk::CommandPool> {
        let raw = self.state.borrow_mut().mint(Kind::CommandPool);
        Ok(vk::CommandPool::from_raw(raw))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.state.borrow_mut().retire(Kind::CommandPool, pool.as_raw());
    }

    fn allocate_command_buffers(
        &self,
        _pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut st = self.state.borrow_mut();
        Ok((0..count)
            .map(|_| vk::CommandBuffer::from_raw(st.mint(Kind::CommandBuffer)))
            .collect())
    }

    fn free_command_buffers(&self, _pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut st = self.state.borrow_mut();
        for cmd in buffers {
            if st.cmd_in_flight(cmd.as_raw()) {
                st.violations.push(format!("freeing in-flight command buffer {:#x}", cmd.as_raw()));
            }
            st.retire(Kind::CommandBuffer, cmd.as_raw());
            st.cmd_fence.remove(&cmd.as_raw());
        }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut st = self.state.borrow_mut();
        let raw = st.mint(Kind::Semaphore);
        st.semaphores.insert(raw, false);
        Ok(vk::Semaphore::from_raw(raw))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut st = self.state.borrow_mut();
        st.retire(Kind::Semaphore, semaphore.as_raw());
        st.semaphores.remove(&semaphore.as_raw());
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut st = self.state.borrow_mut();
        let raw = st.mint(Kind::Fence);
        let state = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        st.fences.insert(raw, state);
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut st = self.state.borrow_mut();
        if st.fences.get(&fence.as_raw()) == Some(&FenceState::Pending) {
            st.violations.push(format!("destroying pending fence {:#x}", fence.as_raw()));
        }
        st.retire(Kind::Fence, fence.as_raw());
        st.fences.remove(&fence.as_raw());
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut st = self.state.borrow_mut();
        match st.fences.get(&fence.as_raw()).copied() {
            Some(FenceState::Signaled) => {}
            Some(FenceState::Pending) => {
                st.fences.insert(fence.as_raw(), FenceState::Signaled);
            }
            Some(FenceState::Unsignaled) => st.violations.push(format!(
                "wait on fence {:#x} with nothing submitted would never return",
                fence.as_raw()
            )),
            None => st.violations.push(format!("wait on unknown fence {:#x}", fence.as_raw())),
        }
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut st = self.state.borrow_mut();
        if st.fences.get(&fence.as_raw()) == Some(&FenceState::Pending) {
            st.violations.push(format!("resetting pending fence {:#x}", fence.as_raw()));
        }
        st.fences.insert(fence.as_raw(), FenceState::Unsignaled);
        Ok(())
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut st = self.state.borrow_mut();
        if st.cmd_in_flight(cmd.as_raw()) {
            st.violations.push(format!("resetting in-flight command buffer {:#x}", cmd.as_raw()));
        }
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut st = self.state.borrow_mut();
        if st.cmd_in_flight(cmd.as_raw()) {
            st.violations.push(format!("recording in-flight command buffer {:#x}", cmd.as_raw()));
        }
        Ok(())
    }

    fn end_command_buffer(&self, _cmd: vk::CommandBuffer) -> VkResult<()> {
        Ok(())
    }

    fn cmd_begin_render_pass(&self, _cmd: vk::CommandBuffer, _info: &vk::RenderPassBeginInfo<'_>) {}

    fn cmd_end_render_pass(&self, _cmd: vk::CommandBuffer) {}

    fn queue_submit(&self, submit: &vk::SubmitInfo<'_>, fence: vk::Fence) -> VkResult<()> {
        // SAFETY: single-element pointers built from locals by the caller.
        let (wait, signal, cmd) = unsafe {
            (
                *submit.p_wait_semaphores,
                *submit.p_signal_semaphores,
                *submit.p_command_buffers,
            )
        };
        let mut st = self.state.borrow_mut();
        if st.semaphores.get(&wait.as_raw()) != Some(&true) {
            let msg = format!("submit waits on unsignaled semaphore {:#x}", wait.as_raw());
            st.violations.push(msg);
        }
        st.semaphores.insert(wait.as_raw(), false);
        st.semaphores.insert(signal.as_raw(), true);
        if st.fences.get(&fence.as_raw()) != Some(&FenceState::Unsignaled) {
            st.violations.push(format!("submit with fence {:#x} not reset", fence.as_raw()));
        }
        st.fences.insert(fence.as_raw(), FenceState::Pending);
        st.cmd_fence.insert(cmd.as_raw(), fence.as_raw());
        Ok(())
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut st = self.state.borrow_mut();
        let Some(count) = st.swapchain_images.get(&swapchain.as_raw()).map(Vec::len) else {
            st.violations.push(format!("acquire from dead swapchain {:#x}", swapchain.as_raw()));
            return Err(vk::Result::ERROR_SURFACE_LOST_KHR);
        };
        let step = st.acquire_script.pop_front().unwrap_or_else(|| {
            let cursor = st.acquire_cursor.entry(swapchain.as_raw()).or_insert(0);
            let index = *cursor % count as u32;
            *cursor += 1;
            AcquireStep::Image(index)
        });
        let (index, suboptimal) = match step {
            AcquireStep::Image(i) => (i, false),
            AcquireStep::Suboptimal(i) => (i, true),
            AcquireStep::OutOfDate => return Err(vk::Result::ERROR_OUT_OF_DATE_KHR),
            AcquireStep::DeviceLost => return Err(vk::Result::ERROR_DEVICE_LOST),
        };
        if st.semaphores.get(&signal.as_raw()) == Some(&true) {
            let msg = format!("acquire signals signaled semaphore {:#x}", signal.as_raw());
            st.violations.push(msg);
        }
        st.semaphores.insert(signal.as_raw(), true);
        Ok((index, suboptimal))
    }

    fn queue_present(&self, info: &vk::PresentInfoKHR<'_>) -> VkResult<bool> {
        // SAFETY: as in `queue_submit`.
        let (wait, swapchain, index) = unsafe {
            (
                *info.p_wait_semaphores,
                *info.p_swapchains,
                *info.p_image_indices,
            )
        };
        let mut st = self.state.borrow_mut();
        if !st.swapchain_images.contains_key(&swapchain.as_raw()) {
            st.violations.push(format!("present to dead swapchain {:#x}", swapchain.as_raw()));
        }
        if st.semaphores.get(&wait.as_raw()) != Some(&true) {
            let msg = format!("present waits on unsignaled semaphore {:#x}", wait.as_raw());
            st.violations.push(msg);
        }
        st.semaphores.insert(wait.as_raw(), false);
        match st.present_script.pop_front().unwrap_or(PresentStep::Optimal) {
            PresentStep::Optimal => {
                st.presented.push(index);
                Ok(false)
            }
            PresentStep::Suboptimal => {
                st.presented.push(index);
                Ok(true)
            }
            PresentStep::OutOfDate => Err(vk::Result::ERROR_OUT_OF_DATE_KHR),
            PresentStep::DeviceLost => Err(vk::Result::ERROR_DEVICE_LOST),
        }
    }
}

pub struct MockSurface {
    support: RefCell<SurfaceSupport>,
}

impl MockSurface {
    pub fn new(width: u32, height: u32) -> Self {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D { width, height },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 8192, height: 8192 },
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        };
        let formats = [vk::Format::B8G8R8A8_UNORM, vk::Format::B8G8R8A8_SRGB]
            .into_iter()
            .map(|format| vk::SurfaceFormatKHR {
                format,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            })
            .collect();
        MockSurface {
            support: RefCell::new(SurfaceSupport {
                capabilities,
                formats,
                present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            }),
        }
    }

    pub fn set_extent(&self, width: u32, height: u32) {
        self.support.borrow_mut().capabilities.current_extent = vk::Extent2D { width, height };
    }
}

impl SurfaceSource for MockSurface {
    fn handle(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0x5afe)
    }

    fn support(&self) -> Result<SurfaceSupport, RenderError> {
        Ok(self.support.borrow().clone())
    }
}

/// Window that closes itself after a number of polls and can be resized
/// at given polls. Resizes are mirrored onto the surface.
pub struct MockWindow<'s> {
    surface: &'s MockSurface,
    extent: RenderSize,
    polls: usize,
    close_after: Option<usize>,
    resizes: VecDeque<(usize, RenderSize)>,
}

impl<'s> MockWindow<'s> {
    pub fn new(surface: &'s MockSurface, width: u32, height: u32) -> Self {
        MockWindow {
            surface,
            extent: RenderSize::new(width, height),
            polls: 0,
            close_after: None,
            resizes: VecDeque::new(),
        }
    }

    pub fn close_after(mut self, polls: usize) -> Self {
        self.close_after = Some(polls);
        self
    }

    pub fn resize_at(mut self, poll: usize, width: u32, height: u32) -> Self {
        self.resizes.push_back((poll, RenderSize::new(width, height)));
        self
    }
}

impl WindowSource for MockWindow<'_> {
    fn poll_events(&mut self) {
        self.polls += 1;
        while let Some(&(at, size)) = self.resizes.front() {
            if at > self.polls {
                break;
            }
            self.resizes.pop_front();
            self.extent = size;
            self.surface.set_extent(size.width, size.height);
        }
    }

    fn should_close(&self) -> bool {
        self.close_after.is_some_and(|n| self.polls > n)
    }

    fn current_extent(&self) -> RenderSize {
        self.extent
    }
}

/// Returns scripted selections, then `Pending`, and records every frame.
#[derive(Default)]
pub struct ScriptedOverlay {
    pub selections: VecDeque<Selection>,
    pub frames: Vec<OverlayFrame>,
    draws: usize,
}

impl ScriptedOverlay {
    pub fn selecting_at(frame: usize, selection: Selection) -> Self {
        let mut selections: VecDeque<_> =
            std::iter::repeat(Selection::Pending).take(frame).collect();
        selections.push_back(selection);
        ScriptedOverlay {
            selections,
            ..Default::default()
        }
    }

    pub fn draws(&self) -> usize {
        self.draws
    }

    pub fn images(&self) -> Vec<u32> {
        self.frames.iter().map(|f| f.image_index).collect()
    }

    pub fn slots(&self) -> Vec<usize> {
        self.frames.iter().map(|f| f.frame_slot).collect()
    }
}

impl UiOverlay for ScriptedOverlay {
    fn draw(&mut self, frame: &OverlayFrame) -> Selection {
        self.draws += 1;
        self.frames.push(*frame);
        self.selections.pop_front().unwrap_or(Selection::Pending)
    }
}
