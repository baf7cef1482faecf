// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, CStr, CString};

use ash::ext::debug_utils;
use ash::khr::swapchain;
use ash::prelude::VkResult;
use ash::{vk, Entry, Instance};
use tracing::{debug, error, info, trace, warn};

use crate::device::Device;
use crate::error::{init_err, InitError};

const ENGINE_NAME: &CStr = c"Anito3D";
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Parameters for [`GraphicsContext::create`].
#[derive(Clone, Debug)]
pub struct ContextDesc<'a> {
    pub app_name: &'a str,
    /// Instance extensions the window system needs, see
    /// [`crate::surface::required_window_extensions`].
    pub required_extensions: &'a [&'static CStr],
    pub min_api_version: u32,
    pub validation: bool,
}

/// What device selection knows about one physical device.
#[derive(Clone, Debug)]
pub struct DeviceCandidate {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub extensions: Vec<String>,
    pub graphics_family: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct DeviceRequirements {
    pub min_api_version: u32,
    pub extensions: Vec<String>,
}

impl DeviceRequirements {
    pub fn new(min_api_version: u32) -> Self {
        DeviceRequirements {
            min_api_version,
            extensions: vec![swapchain::NAME.to_string_lossy().into_owned()],
        }
    }

    fn rejection(&self, c: &DeviceCandidate) -> Option<String> {
        if c.api_version < self.min_api_version {
            return Some(format!(
                "{}: Vulkan {} < {}",
                c.name,
                fmt_version(c.api_version),
                fmt_version(self.min_api_version)
            ));
        }
        if let Some(missing) = self.extensions.iter().find(|e| !c.extensions.contains(e)) {
            return Some(format!("{}: missing {missing}", c.name));
        }
        if c.graphics_family.is_none() {
            return Some(format!("{}: no graphics queue family", c.name));
        }
        None
    }
}

fn type_rank(t: vk::PhysicalDeviceType) -> u32 {
    match t {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

/// Index of the best qualifying candidate; ties go to the first enumerated.
pub fn select_device(
    candidates: &[DeviceCandidate],
    req: &DeviceRequirements,
) -> Result<usize, InitError> {
    let mut best: Option<(usize, u32)> = None;
    let mut reasons = Vec::new();
    for (i, c) in candidates.iter().enumerate() {
        if let Some(why) = req.rejection(c) {
            reasons.push(why);
            continue;
        }
        let rank = type_rank(c.device_type);
        if best.map_or(true, |(_, r)| rank > r) {
            best = Some((i, rank));
        }
    }
    match best {
        Some((i, _)) => Ok(i),
        None if candidates.is_empty() => Err(InitError::NoSuitableDevice(
            "no physical devices enumerated".into(),
        )),
        None => Err(InitError::NoSuitableDevice(reasons.join("; "))),
    }
}

pub fn fmt_version(v: u32) -> String {
    format!("{}.{}", vk::api_version_major(v), vk::api_version_minor(v))
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() || unsafe { (*data).p_message.is_null() } {
        return vk::FALSE;
    }
    let msg = unsafe { CStr::from_ptr((*data).p_message) }.to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(?types, "[vulkan] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(?types, "[vulkan] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!(?types, "[vulkan] {msg}");
    } else {
        trace!(?types, "[vulkan] {msg}");
    }
    vk::FALSE
}

// Instance plus its debug messenger. Dropped after the logical device.
struct InstanceOwner {
    entry: Entry,
    instance: Instance,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Drop for InstanceOwner {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn has_extension(props: &[vk::ExtensionProperties], name: &CStr) -> bool {
    props
        .iter()
        .any(|p| p.extension_name_as_c_str().is_ok_and(|n| n == name))
}

unsafe fn create_instance(desc: &ContextDesc<'_>) -> Result<InstanceOwner, InitError> {
    let entry = unsafe { Entry::load() }.map_err(|e| InitError::Loader(e.to_string()))?;

    let loader_version = unsafe { entry.try_enumerate_instance_version() }
        .map_err(init_err("vkEnumerateInstanceVersion"))?
        .unwrap_or(vk::API_VERSION_1_0);
    if loader_version < desc.min_api_version {
        return Err(InitError::ApiVersion {
            required: fmt_version(desc.min_api_version),
            available: fmt_version(loader_version),
        });
    }

    let available = unsafe { entry.enumerate_instance_extension_properties(None) }
        .map_err(init_err("vkEnumerateInstanceExtensionProperties"))?;
    for &ext in desc.required_extensions {
        if !has_extension(&available, ext) {
            return Err(InitError::MissingExtension(ext.to_string_lossy().into_owned()));
        }
    }

    let mut ext_ptrs: Vec<*const c_char> =
        desc.required_extensions.iter().map(|e| e.as_ptr()).collect();
    let mut layer_ptrs: Vec<*const c_char> = Vec::new();

    let validation = desc.validation && {
        let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        let has_layer = layers
            .iter()
            .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == VALIDATION_LAYER));
        let has_debug_utils = has_extension(&available, debug_utils::NAME);
        if !(has_layer && has_debug_utils) {
            warn!("validation requested but {VALIDATION_LAYER:?} or debug utils is unavailable");
        }
        has_layer && has_debug_utils
    };
    if validation {
        ext_ptrs.push(debug_utils::NAME.as_ptr());
        layer_ptrs.push(VALIDATION_LAYER.as_ptr());
    }

    let app_name = CString::new(desc.app_name.replace('\0', "")).unwrap_or_default();
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app_name.as_ptr(),
        application_version: 0,
        p_engine_name: ENGINE_NAME.as_ptr(),
        engine_version: 0,
        api_version: desc.min_api_version,
        ..Default::default()
    };
    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: ext_ptrs.len() as u32,
        pp_enabled_extension_names: ext_ptrs.as_ptr(),
        enabled_layer_count: layer_ptrs.len() as u32,
        pp_enabled_layer_names: layer_ptrs.as_ptr(),
        ..Default::default()
    };
    let instance = unsafe { entry.create_instance(&create_info, None) }
        .map_err(init_err("vkCreateInstance"))?;
    let mut owner = InstanceOwner {
        entry,
        instance,
        debug: None,
    };

    if validation {
        let loader = debug_utils::Instance::new(&owner.entry, &owner.instance);
        let ci = vk::DebugUtilsMessengerCreateInfoEXT {
            s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
            message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            pfn_user_callback: Some(debug_callback),
            ..Default::default()
        };
        match unsafe { loader.create_debug_utils_messenger(&ci, None) } {
            Ok(messenger) => owner.debug = Some((loader, messenger)),
            Err(e) => warn!("debug messenger unavailable: {e}"),
        }
    }

    info!(
        "Vulkan instance ready (loader {}, validation={})",
        fmt_version(loader_version),
        owner.debug.is_some()
    );
    Ok(owner)
}

unsafe fn describe_device(instance: &Instance, phys: vk::PhysicalDevice) -> DeviceCandidate {
    let props = unsafe { instance.get_physical_device_properties(phys) };
    let name = props
        .device_name_as_c_str()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed device>".to_owned());
    let extensions = unsafe { instance.enumerate_device_extension_properties(phys) }
        .unwrap_or_default()
        .iter()
        .filter_map(|e| e.extension_name_as_c_str().ok())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    let graphics_family = unsafe { instance.get_physical_device_queue_family_properties(phys) }
        .iter()
        .position(|q| q.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32);
    DeviceCandidate {
        name,
        device_type: props.device_type,
        api_version: props.api_version,
        extensions,
        graphics_family,
    }
}

/// Instance, chosen physical device, logical device and its graphics queue.
///
/// Everything created from the context must be dropped before it.
pub struct GraphicsContext {
    device: ash::Device,
    swapchain_loader: swapchain::Device,
    queue: vk::Queue,
    queue_family: u32,
    phys: vk::PhysicalDevice,
    device_name: String,
    instance: InstanceOwner,
}

impl GraphicsContext {
    pub fn create(desc: &ContextDesc<'_>) -> Result<Self, InitError> {
        let owner = unsafe { create_instance(desc)? };

        let physical = unsafe { owner.instance.enumerate_physical_devices() }
            .map_err(init_err("vkEnumeratePhysicalDevices"))?;
        let candidates: Vec<DeviceCandidate> = physical
            .iter()
            .map(|&p| unsafe { describe_device(&owner.instance, p) })
            .collect();
        let chosen = select_device(&candidates, &DeviceRequirements::new(desc.min_api_version))?;
        let phys = physical[chosen];
        let candidate = &candidates[chosen];
        let queue_family = candidate
            .graphics_family
            .ok_or_else(|| InitError::NoSuitableDevice(candidate.name.clone()))?;

        let priorities = [1.0_f32];
        let qinfo = vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: queue_family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        };
        let device_exts = [swapchain::NAME.as_ptr()];
        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: 1,
            p_queue_create_infos: &qinfo,
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            ..Default::default()
        };
        let device = unsafe { owner.instance.create_device(phys, &dinfo, None) }
            .map_err(init_err("vkCreateDevice"))?;
        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        let swapchain_loader = swapchain::Device::new(&owner.instance, &device);

        info!(
            "device: {} ({:?}, Vulkan {}), graphics queue family {}",
            candidate.name,
            candidate.device_type,
            fmt_version(candidate.api_version),
            queue_family
        );

        Ok(GraphicsContext {
            device,
            swapchain_loader,
            queue,
            queue_family,
            phys,
            device_name: candidate.name.clone(),
            instance: owner,
        })
    }

    pub fn entry(&self) -> &Entry {
        &self.instance.entry
    }

    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.phys
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl Drop for GraphicsContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_device(None);
        }
        info!("graphics context destroyed");
    }
}

impl Device for GraphicsContext {
    fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR> {
        unsafe { self.swapchain_loader.create_swapchain(info, None) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView> {
        unsafe { self.device.create_image_view(info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo<'_>) -> VkResult<vk::RenderPass> {
        unsafe { self.device.create_render_pass(info, None) }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo<'_>,
    ) -> VkResult<vk::Framebuffer> {
        unsafe { self.device.create_framebuffer(info, None) }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn create_command_pool(&self, flags: vk::CommandPoolCreateFlags) -> VkResult<vk::CommandPool> {
        let info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags,
            queue_family_index: self.queue_family,
            ..Default::default()
        };
        unsafe { self.device.create_command_pool(&info, None) }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        unsafe { self.device.allocate_command_buffers(&info) }
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        if !buffers.is_empty() {
            unsafe { self.device.free_command_buffers(pool, buffers) }
        }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        unsafe { self.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        unsafe { self.device.create_fence(&info, None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        unsafe { self.device.begin_command_buffer(cmd, &begin) }
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(cmd) }
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo<'_>) {
        unsafe {
            self.device
                .cmd_begin_render_pass(cmd, info, vk::SubpassContents::INLINE)
        }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) }
    }

    fn queue_submit(&self, submit: &vk::SubmitInfo<'_>, fence: vk::Fence) -> VkResult<()> {
        unsafe {
            self.device
                .queue_submit(self.queue, std::slice::from_ref(submit), fence)
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, u64::MAX, signal, vk::Fence::null())
        }
    }

    fn queue_present(&self, info: &vk::PresentInfoKHR<'_>) -> VkResult<bool> {
        unsafe { self.swapchain_loader.queue_present(self.queue, info) }
    }
}
