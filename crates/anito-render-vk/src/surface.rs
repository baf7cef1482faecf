// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CStr;

use ash::khr::surface;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::info;

use crate::context::GraphicsContext;
use crate::device::{SurfaceSource, SurfaceSupport};
use crate::error::{vk_err, InitError, RenderError};

/// Instance extensions the platform needs to create a surface for this
/// display.
pub fn required_window_extensions(
    display: &impl HasDisplayHandle,
) -> Result<Vec<&'static CStr>, InitError> {
    let raw = display
        .display_handle()
        .map_err(|e| InitError::SurfaceCreation(e.to_string()))?
        .as_raw();
    let names = ash_window::enumerate_required_extensions(raw)
        .map_err(|result| InitError::Vk {
            call: "enumerate_required_extensions",
            result,
        })?;
    // The returned pointers reference static extension-name constants.
    Ok(names.iter().map(|&p| unsafe { CStr::from_ptr(p) }).collect())
}

/// A window surface owned by the context's instance.
///
/// The borrow keeps the instance alive for as long as the surface exists;
/// the window itself must also outlive it.
pub struct PresentationSurface<'c> {
    context: &'c GraphicsContext,
    loader: surface::Instance,
    handle: vk::SurfaceKHR,
}

impl<'c> PresentationSurface<'c> {
    pub fn bind<W>(context: &'c GraphicsContext, window: &W) -> Result<Self, InitError>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        let dh = window
            .display_handle()
            .map_err(|e| InitError::SurfaceCreation(e.to_string()))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| InitError::SurfaceCreation(e.to_string()))?
            .as_raw();

        let handle = unsafe {
            ash_window::create_surface(context.entry(), context.instance(), dh, wh, None)
        }
        .map_err(|e| InitError::SurfaceCreation(e.to_string()))?;
        let bound = PresentationSurface {
            context,
            loader: surface::Instance::new(context.entry(), context.instance()),
            handle,
        };

        let family = context.queue_family_index();
        let can_present = unsafe {
            bound.loader.get_physical_device_surface_support(
                context.physical_device(),
                family,
                handle,
            )
        }
        .map_err(|result| InitError::Vk {
            call: "vkGetPhysicalDeviceSurfaceSupportKHR",
            result,
        })?;
        if !can_present {
            return Err(InitError::PresentUnsupported(family));
        }

        info!("surface bound on {}", context.device_name());
        Ok(bound)
    }
}

impl SurfaceSource for PresentationSurface<'_> {
    fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    fn support(&self) -> Result<SurfaceSupport, RenderError> {
        let phys = self.context.physical_device();
        unsafe {
            Ok(SurfaceSupport {
                capabilities: self
                    .loader
                    .get_physical_device_surface_capabilities(phys, self.handle)
                    .map_err(vk_err("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))?,
                formats: self
                    .loader
                    .get_physical_device_surface_formats(phys, self.handle)
                    .map_err(vk_err("vkGetPhysicalDeviceSurfaceFormatsKHR"))?,
                present_modes: self
                    .loader
                    .get_physical_device_surface_present_modes(phys, self.handle)
                    .map_err(vk_err("vkGetPhysicalDeviceSurfacePresentModesKHR"))?,
            })
        }
    }
}

impl Drop for PresentationSurface<'_> {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}
