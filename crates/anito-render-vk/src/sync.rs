// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{vk_err, RenderError};

/// Sync objects owned by one frame in flight.
#[derive(Clone, Copy, Debug)]
pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

/// Frame-in-flight slots plus one command buffer per swapchain image.
///
/// Slots and images rotate independently, so the synchronizer remembers
/// which slot last submitted each image's command buffer. Reusing that
/// buffer from another slot first waits on the owner's fence.
pub struct FrameSynchronizer<'d, D: Device> {
    device: &'d D,
    slots: Vec<FrameSlot>,
    waited: Vec<bool>,
    pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
    image_owner: Vec<Option<usize>>,
    generation: u64,
}

impl<'d, D: Device> FrameSynchronizer<'d, D> {
    pub fn create(
        device: &'d D,
        frames_in_flight: usize,
        image_count: usize,
        generation: u64,
    ) -> Result<Self, RenderError> {
        let mut sync = FrameSynchronizer {
            device,
            slots: Vec::with_capacity(frames_in_flight),
            waited: vec![false; frames_in_flight],
            pool: vk::CommandPool::null(),
            command_buffers: Vec::new(),
            image_owner: Vec::new(),
            generation,
        };
        // RESET_COMMAND_BUFFER: each image's buffer is re-recorded every frame.
        sync.pool = device
            .create_command_pool(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .map_err(vk_err("vkCreateCommandPool"))?;
        sync.create_slots(frames_in_flight)?;
        sync.allocate(image_count)?;
        Ok(sync)
    }

    fn create_slots(&mut self, count: usize) -> Result<(), RenderError> {
        for _ in 0..count {
            let image_available = self
                .device
                .create_semaphore()
                .map_err(vk_err("vkCreateSemaphore"))?;
            let render_finished = match self.device.create_semaphore() {
                Ok(s) => s,
                Err(e) => {
                    self.device.destroy_semaphore(image_available);
                    return Err(vk_err("vkCreateSemaphore")(e));
                }
            };
            // Signaled so the first wait on every slot returns at once.
            let in_flight = match self.device.create_fence(true) {
                Ok(f) => f,
                Err(e) => {
                    self.device.destroy_semaphore(image_available);
                    self.device.destroy_semaphore(render_finished);
                    return Err(vk_err("vkCreateFence")(e));
                }
            };
            self.slots.push(FrameSlot {
                image_available,
                render_finished,
                in_flight,
            });
        }
        self.waited = vec![false; count];
        Ok(())
    }

    fn destroy_slots(&mut self) {
        for slot in self.slots.drain(..) {
            self.device.destroy_semaphore(slot.image_available);
            self.device.destroy_semaphore(slot.render_finished);
            self.device.destroy_fence(slot.in_flight);
        }
    }

    fn allocate(&mut self, image_count: usize) -> Result<(), RenderError> {
        self.command_buffers = self
            .device
            .allocate_command_buffers(self.pool, image_count as u32)
            .map_err(vk_err("vkAllocateCommandBuffers"))?;
        self.image_owner = vec![None; image_count];
        Ok(())
    }

    fn free(&mut self) {
        if !self.command_buffers.is_empty() {
            self.device.free_command_buffers(self.pool, &self.command_buffers);
            self.command_buffers.clear();
        }
        self.image_owner.clear();
    }

    /// Blocks until the slot's previous submission has retired. Does not
    /// reset the fence; that happens in [`Self::begin_frame`] once an image
    /// is actually in hand.
    pub fn wait_slot(&mut self, slot: usize) -> Result<(), RenderError> {
        if !self.waited[slot] {
            self.device
                .wait_for_fence(self.slots[slot].in_flight)
                .map_err(vk_err("vkWaitForFences"))?;
            self.waited[slot] = true;
        }
        Ok(())
    }

    /// Claims `image`'s command buffer for `slot` and returns it reset and
    /// ready to record.
    pub fn begin_frame(
        &mut self,
        slot: usize,
        image: u32,
    ) -> Result<vk::CommandBuffer, RenderError> {
        let Some(&cmd) = self.command_buffers.get(image as usize) else {
            return Err(RenderError::ImageOutOfRange {
                index: image,
                count: self.command_buffers.len(),
            });
        };
        let image = image as usize;
        self.wait_slot(slot)?;

        if let Some(owner) = self.image_owner[image] {
            if owner != slot {
                debug!("image {image} last used by slot {owner}, waiting before slot {slot}");
                self.device
                    .wait_for_fence(self.slots[owner].in_flight)
                    .map_err(vk_err("vkWaitForFences"))?;
                self.waited[owner] = true;
            }
        }

        self.device
            .reset_fence(self.slots[slot].in_flight)
            .map_err(vk_err("vkResetFences"))?;
        self.waited[slot] = false;
        self.device
            .reset_command_buffer(cmd)
            .map_err(vk_err("vkResetCommandBuffer"))?;
        self.image_owner[image] = Some(slot);
        Ok(cmd)
    }

    /// Rebuilds against a recreated swapchain. The device must be idle.
    ///
    /// Semaphores are recreated too: an out-of-date present may or may not
    /// have consumed its wait semaphore.
    pub fn rebuild(&mut self, image_count: usize, generation: u64) -> Result<(), RenderError> {
        let slots = self.slots.len();
        self.free();
        self.destroy_slots();
        self.create_slots(slots)?;
        self.allocate(image_count)?;
        self.generation = generation;
        Ok(())
    }

    pub fn slot(&self, slot: usize) -> FrameSlot {
        self.slots[slot]
    }

    pub fn advance(&self, slot: usize) -> usize {
        (slot + 1) % self.slots.len()
    }

    pub fn command_buffer(&self, image: u32) -> Option<vk::CommandBuffer> {
        self.command_buffers.get(image as usize).copied()
    }

    pub fn image_owner(&self, image: u32) -> Option<usize> {
        self.image_owner.get(image as usize).copied().flatten()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<D: Device> Drop for FrameSynchronizer<'_, D> {
    fn drop(&mut self) {
        // Nothing below may still be referenced by queued work.
        let _ = self.device.wait_idle();
        self.free();
        self.destroy_slots();
        if self.pool != vk::CommandPool::null() {
            self.device.destroy_command_pool(self.pool);
        }
    }
}
