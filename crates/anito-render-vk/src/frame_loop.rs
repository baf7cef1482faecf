// SPDX-License-Identifier: CEPL-1.0
//! Per-frame state machine: acquire, record, submit, present, and swapchain
//! recreation when the surface changes under us.

use std::time::{Duration, Instant};

use anito_render::{RenderSize, Selection, WindowSource};
use ash::vk;
use tracing::{debug, error, info, trace, warn};

use crate::device::{Device, SurfaceSource};
use crate::error::{vk_err, RenderError};
use crate::render_target::RenderTargets;
use crate::swapchain::{PresentStatus, SwapchainDesc, SwapchainManager, VkVsyncMode};
use crate::sync::FrameSynchronizer;
use crate::FRAMES_IN_FLIGHT;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Recording,
    Submitting,
    Presenting,
    Recreating,
    /// Terminal. Every later call fails with [`RenderError::Halted`].
    Halted,
}

impl FrameState {
    pub fn can_transition_to(self, next: FrameState) -> bool {
        use FrameState::*;
        match (self, next) {
            (Halted, _) => false,
            (_, Halted) => true,
            (Idle, Idle | Acquiring | Recreating) => true,
            (Acquiring, Recording | Recreating) => true,
            (Recording, Submitting) => true,
            (Submitting, Presenting) => true,
            (Presenting, Idle | Recreating) => true,
            (Recreating, Idle | Acquiring) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FrameLoopDesc {
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub vsync: VkVsyncMode,
    pub clear_color: [f32; 4],
}

/// What an overlay gets while the frame's render pass is open.
#[derive(Clone, Copy, Debug)]
pub struct OverlayFrame {
    pub command_buffer: vk::CommandBuffer,
    pub extent: vk::Extent2D,
    pub image_index: u32,
    pub frame_slot: usize,
    pub frame_number: u64,
}

/// Drawn inside the clear pass every frame. The returned selection ends the
/// loop once it is final.
pub trait UiOverlay {
    fn draw(&mut self, frame: &OverlayFrame) -> Selection;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopExit {
    Closed,
    Selected(Selection),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented(Selection),
    Recreated,
    /// Zero-sized window, nothing was done.
    Paused,
}

/// Fields drop top to bottom, after [`Drop::drop`] has idled the device.
pub struct FrameLoop<'a, D: Device, S: SurfaceSource> {
    targets: RenderTargets<'a, D>,
    sync: FrameSynchronizer<'a, D>,
    swapchain: SwapchainManager<'a, D>,
    device: &'a D,
    surface: &'a S,
    clear_color: [f32; 4],
    state: FrameState,
    slot: usize,
    frame_number: u64,
    needs_recreate: bool,
}

impl<'a, D: Device, S: SurfaceSource> FrameLoop<'a, D, S> {
    pub fn new(device: &'a D, surface: &'a S, desc: FrameLoopDesc) -> Result<Self, RenderError> {
        let swapchain = SwapchainManager::create(
            device,
            surface,
            SwapchainDesc {
                extent: desc.extent,
                image_count: desc.image_count,
                vsync: desc.vsync,
            },
        )?;
        let sync = FrameSynchronizer::create(
            device,
            FRAMES_IN_FLIGHT,
            swapchain.image_count(),
            swapchain.generation(),
        )?;
        let targets = RenderTargets::build(device, &swapchain)?;
        Ok(FrameLoop {
            targets,
            sync,
            swapchain,
            device,
            surface,
            clear_color: desc.clear_color,
            state: FrameState::Idle,
            slot: 0,
            frame_number: 0,
            needs_recreate: false,
        })
    }

    /// Polls `window` and renders until it closes or `overlay` makes a final
    /// selection.
    pub fn run(
        &mut self,
        window: &mut impl WindowSource,
        overlay: &mut impl UiOverlay,
    ) -> Result<LoopExit, RenderError> {
        let mut last_extent = window.current_extent();
        let mut fps_timer = Instant::now();
        let mut fps_frames = 0u32;

        loop {
            window.poll_events();
            if window.should_close() {
                info!("window closed after {} frames", self.frame_number);
                return Ok(LoopExit::Closed);
            }
            let extent = window.current_extent();
            if extent != last_extent {
                debug!("window resized to {}x{}", extent.width, extent.height);
                self.notify_resized();
                last_extent = extent;
            }

            match self.frame(extent, overlay)? {
                FrameOutcome::Presented(selection) => {
                    fps_frames += 1;
                    if selection.is_final() {
                        info!("selection {} made, leaving frame loop", selection.as_raw());
                        return Ok(LoopExit::Selected(selection));
                    }
                }
                FrameOutcome::Recreated => {}
                FrameOutcome::Paused => std::thread::sleep(Duration::from_millis(16)),
            }

            let dt = fps_timer.elapsed();
            if dt >= Duration::from_secs(1) {
                debug!("fps ~ {}", (fps_frames as f32 / dt.as_secs_f32()).round());
                fps_timer = Instant::now();
                fps_frames = 0;
            }
        }
    }

    /// Runs one iteration for a window of `extent`. Fatal errors halt the
    /// loop for good.
    pub fn frame(
        &mut self,
        extent: RenderSize,
        overlay: &mut impl UiOverlay,
    ) -> Result<FrameOutcome, RenderError> {
        if self.state == FrameState::Halted {
            return Err(RenderError::Halted);
        }
        match self.step(extent, overlay) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!("frame {} failed: {e}", self.frame_number);
                self.state = FrameState::Halted;
                Err(e)
            }
        }
    }

    fn step(
        &mut self,
        extent: RenderSize,
        overlay: &mut impl UiOverlay,
    ) -> Result<FrameOutcome, RenderError> {
        if extent.is_empty() {
            self.enter(FrameState::Idle);
            return Ok(FrameOutcome::Paused);
        }
        let generation = self.swapchain.generation();
        if self.targets.generation() != generation
            || self.sync.generation() != generation
            || self.targets.is_empty()
        {
            warn!("derived resources lag swapchain generation {generation}, rebuilding");
            self.needs_recreate = true;
        }
        if self.needs_recreate {
            return self.recreate(extent);
        }

        self.enter(FrameState::Acquiring);
        let slot = self.slot;
        self.sync.wait_slot(slot)?;
        let image = match self.swapchain.acquire(self.sync.slot(slot).image_available) {
            Ok(image) => image,
            Err(RenderError::SwapchainStale { generation }) => {
                debug!("acquire: swapchain gen {generation} out of date");
                return self.recreate(extent);
            }
            Err(e) => return Err(e),
        };
        if image.suboptimal {
            // Still presentable; render it and rebuild before the next acquire.
            self.needs_recreate = true;
        }

        self.enter(FrameState::Recording);
        let cmd = self.sync.begin_frame(slot, image.index)?;
        let selection = self.record(cmd, image.index, overlay)?;

        self.enter(FrameState::Submitting);
        let sync = self.sync.slot(slot);
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &sync.image_available,
            p_wait_dst_stage_mask: &wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &sync.render_finished,
            ..Default::default()
        };
        self.device
            .queue_submit(&submit, sync.in_flight)
            .map_err(|e| match e {
                vk::Result::ERROR_DEVICE_LOST => RenderError::DeviceLost,
                e => RenderError::Submission(e),
            })?;

        self.enter(FrameState::Presenting);
        let status = self.swapchain.present(image, sync.render_finished);
        self.slot = self.sync.advance(slot);
        self.frame_number += 1;
        match status {
            Ok(PresentStatus::Optimal) => {}
            Ok(PresentStatus::Suboptimal) => self.needs_recreate = true,
            Err(RenderError::SwapchainStale { generation }) => {
                debug!("present: swapchain gen {generation} out of date");
                self.needs_recreate = true;
                if !selection.is_final() {
                    self.recreate(extent)?;
                    return Ok(FrameOutcome::Presented(selection));
                }
            }
            Err(e) => return Err(e),
        }

        self.enter(FrameState::Idle);
        Ok(FrameOutcome::Presented(selection))
    }

    fn record(
        &mut self,
        cmd: vk::CommandBuffer,
        image_index: u32,
        overlay: &mut impl UiOverlay,
    ) -> Result<Selection, RenderError> {
        let framebuffer = self.targets.framebuffer(image_index).ok_or(RenderError::StaleGeneration {
            expected: self.swapchain.generation(),
            found: self.targets.generation(),
        })?;
        let extent = self.swapchain.extent();

        self.device
            .begin_command_buffer(cmd)
            .map_err(vk_err("vkBeginCommandBuffer"))?;
        let clear = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        };
        let rp_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: self.targets.render_pass(),
            framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            clear_value_count: 1,
            p_clear_values: &clear,
            ..Default::default()
        };
        self.device.cmd_begin_render_pass(cmd, &rp_begin);
        let selection = overlay.draw(&OverlayFrame {
            command_buffer: cmd,
            extent,
            image_index,
            frame_slot: self.slot,
            frame_number: self.frame_number,
        });
        self.device.cmd_end_render_pass(cmd);
        self.device
            .end_command_buffer(cmd)
            .map_err(vk_err("vkEndCommandBuffer"))?;
        Ok(selection)
    }

    /// Rebuilds the swapchain and everything derived from it. A surface
    /// that has shrunk to nothing leaves the rebuild pending.
    fn recreate(&mut self, extent: RenderSize) -> Result<FrameOutcome, RenderError> {
        self.enter(FrameState::Recreating);
        let want = vk::Extent2D {
            width: extent.width,
            height: extent.height,
        };
        // Framebuffers go before the views they reference.
        self.device
            .wait_idle()
            .map_err(vk_err("vkDeviceWaitIdle"))?;
        self.targets.release();
        match self.swapchain.recreate(self.surface, want) {
            Ok(()) => {}
            Err(RenderError::ZeroExtent) => {
                self.needs_recreate = true;
                self.enter(FrameState::Idle);
                return Ok(FrameOutcome::Paused);
            }
            Err(e) => return Err(e),
        }
        let generation = self.swapchain.generation();
        self.sync.rebuild(self.swapchain.image_count(), generation)?;
        self.targets.rebuild(&self.swapchain)?;
        self.needs_recreate = false;
        self.enter(FrameState::Idle);
        info!(
            "recreated swapchain gen {}: {}x{}, {} images",
            generation,
            self.swapchain.extent().width,
            self.swapchain.extent().height,
            self.swapchain.image_count()
        );
        Ok(FrameOutcome::Recreated)
    }

    /// Window size changed; rebuild before the next acquire.
    pub fn notify_resized(&mut self) {
        self.needs_recreate = true;
    }

    fn enter(&mut self, next: FrameState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal frame transition {:?} -> {:?}",
            self.state,
            next
        );
        if self.state != next {
            trace!("frame {}: {:?} -> {:?}", self.frame_number, self.state, next);
        }
        self.state = next;
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Slot the next frame will use.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn swapchain(&self) -> &SwapchainManager<'a, D> {
        &self.swapchain
    }

    pub fn targets(&self) -> &RenderTargets<'a, D> {
        &self.targets
    }

    pub fn synchronizer(&self) -> &FrameSynchronizer<'a, D> {
        &self.sync
    }
}

impl<D: Device, S: SurfaceSource> Drop for FrameLoop<'_, D, S> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            warn!("wait_idle before teardown failed: {e}");
        }
    }
}
