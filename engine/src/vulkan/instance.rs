use std::collections::HashSet;
use std::ffi::CStr;
use std::os::raw::{c_char, c_void};

use anyhow::{anyhow, Result};
use log::*;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::{self, ExtDebugUtilsExtension, Handle, KhrSurfaceExtension};
use vulkanalia::window as vk_window;
use vulkanalia::{Entry, Instance};
use winit::window::Window;

use super::constants;
use super::context::VulkanContext;

#[derive(Debug)]
pub struct VulkanInstance {
    pub vk_instance: Instance,
}

impl VulkanInstance {
    /// Creates the instance and, with validation on, the messenger that
    /// forwards layer output to the log.
    pub unsafe fn new(
        window: &Window,
        entry: &Entry,
        context: &mut VulkanContext,
    ) -> Result<VulkanInstance> {
        let application_info = vk::ApplicationInfo::builder()
            .application_name(b"Textured Triangle\0")
            .application_version(vk::make_version(1, 0, 0))
            .engine_name(b"triangle\0")
            .engine_version(vk::make_version(1, 0, 0))
            .api_version(vk::make_version(1, 0, 0));

        let available_layers = entry
            .enumerate_instance_layer_properties()?
            .iter()
            .map(|l| l.layer_name)
            .collect::<HashSet<_>>();
        let layers = requested_layers(&available_layers)?;

        let mut extensions = vk_window::get_required_instance_extensions(window)
            .iter()
            .map(|e| e.as_ptr())
            .collect::<Vec<_>>();
        let flags = portability_flags(entry, &mut extensions)?;
        if constants::VALIDATION_ENABLED {
            extensions.push(vk::EXT_DEBUG_UTILS_EXTENSION.name.as_ptr());
        }

        let mut info = vk::InstanceCreateInfo::builder()
            .application_info(&application_info)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions)
            .flags(flags);

        // Chained so instance creation and destruction are reported too.
        let mut debug_info = messenger_info();
        if constants::VALIDATION_ENABLED {
            info = info.push_next(&mut debug_info);
        }

        let instance = entry.create_instance(&info, None)?;
        info!(
            "Created Vulkan instance ({} layer(s), {} extension(s)).",
            layers.len(),
            extensions.len()
        );

        if constants::VALIDATION_ENABLED {
            context.messenger = instance.create_debug_utils_messenger_ext(&debug_info, None)?;
        }

        Ok(VulkanInstance {
            vk_instance: instance,
        })
    }

    pub unsafe fn create_surface(&self, window: &Window, context: &mut VulkanContext) -> Result<()> {
        context.surface = vk_window::create_surface(&self.vk_instance, window, window)?;
        Ok(())
    }

    pub unsafe fn destroy_surface(&self, context: &mut VulkanContext) {
        self.vk_instance.destroy_surface_khr(context.surface, None);
        context.surface = vk::SurfaceKHR::null();
    }

    pub unsafe fn destroy_messenger(&self, context: &mut VulkanContext) {
        if !context.messenger.is_null() {
            self.vk_instance
                .destroy_debug_utils_messenger_ext(context.messenger, None);
            context.messenger = vk::DebugUtilsMessengerEXT::null();
        }
    }

    pub unsafe fn destroy(&mut self) {
        self.vk_instance.destroy_instance(None);
    }
}

fn requested_layers(available: &HashSet<vk::ExtensionName>) -> Result<Vec<*const c_char>> {
    if !constants::VALIDATION_ENABLED {
        return Ok(Vec::new());
    }
    if !available.contains(&constants::VALIDATION_LAYER) {
        return Err(anyhow!("Validation layer requested but not supported."));
    }
    Ok(vec![constants::VALIDATION_LAYER.as_ptr()])
}

/// Required by Vulkan SDK on macOS since 1.3.216.
unsafe fn portability_flags(
    entry: &Entry,
    extensions: &mut Vec<*const c_char>,
) -> Result<vk::InstanceCreateFlags> {
    if cfg!(target_os = "macos") && entry.version()? >= constants::PORTABILITY_MACOS_VERSION {
        info!("Enabling extensions for macOS portability.");
        extensions.push(vk::KHR_GET_PHYSICAL_DEVICE_PROPERTIES2_EXTENSION.name.as_ptr());
        extensions.push(vk::KHR_PORTABILITY_ENUMERATION_EXTENSION.name.as_ptr());
        Ok(vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR)
    } else {
        Ok(vk::InstanceCreateFlags::empty())
    }
}

fn messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXTBuilder<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(vk::DebugUtilsMessageSeverityFlagsEXT::all())
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .user_callback(Some(debug_callback))
}

fn log_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        Level::Error
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        Level::Warn
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        Level::Debug
    } else {
        Level::Trace
    }
}

extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    type_: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _: *mut c_void,
) -> vk::Bool32 {
    let data = unsafe { *data };
    let message = unsafe { CStr::from_ptr(data.message) }.to_string_lossy();
    log!(target: "vulkan", log_level(severity), "({:?}) {}", type_, message);
    vk::FALSE
}
