use std::collections::HashSet;

use anyhow::{anyhow, Result};
use log::*;
use thiserror::Error;
use vulkanalia::{
    vk::{self, DeviceV1_0, HasBuilder, InstanceV1_0, KhrSurfaceExtension},
    Device, Entry,
};

use super::{constants, context::VulkanContext, instance::VulkanInstance};

#[derive(Debug)]
pub struct VulkanDevice {
    pub vk_device: Device,
}

#[derive(Debug, Error)]
#[error("Missing {0}.")]
pub struct SuitabilityError(pub &'static str);

impl VulkanDevice {
    unsafe fn pick_physical_device(
        instance: &VulkanInstance,
        context: &mut VulkanContext,
    ) -> Result<()> {
        for physical_device in instance.vk_instance.enumerate_physical_devices()? {
            let properties = instance
                .vk_instance
                .get_physical_device_properties(physical_device);

            if let Err(error) =
                VulkanDevice::check_physical_device(instance, context, physical_device)
            {
                warn!(
                    "Skipping physical device (`{}`): {}",
                    properties.device_name, error
                );
            } else {
                info!("Selected physical device (`{}`).", properties.device_name);
                context.physical_device = physical_device;
                return Ok(());
            }
        }
        Err(anyhow!("Failed to find suitable physical device."))
    }

    unsafe fn check_physical_device(
        instance: &VulkanInstance,
        context: &VulkanContext,
        physical_device: vk::PhysicalDevice,
    ) -> Result<()> {
        QueueFamilyIndices::get(instance, context, physical_device)?;

        let extensions = instance
            .vk_instance
            .enumerate_device_extension_properties(physical_device, None)?
            .iter()
            .map(|e| e.extension_name)
            .collect::<HashSet<_>>();
        if !constants::DEVICE_EXTENSIONS
            .iter()
            .all(|e| extensions.contains(e))
        {
            return Err(anyhow!(SuitabilityError(
                "required device extensions"
            )));
        }

        let formats = instance
            .vk_instance
            .get_physical_device_surface_formats_khr(physical_device, context.surface)?;
        if formats.is_empty() {
            return Err(anyhow!(SuitabilityError("surface formats")));
        }

        Ok(())
    }

    pub unsafe fn new(
        entry: &Entry,
        instance: &VulkanInstance,
        context: &mut VulkanContext,
    ) -> Result<VulkanDevice> {
        VulkanDevice::pick_physical_device(instance, context)?;

        let indices = QueueFamilyIndices::get(instance, context, context.physical_device)?;
        context.queue_family_index = indices.graphics;
        context.memory_properties = instance
            .vk_instance
            .get_physical_device_memory_properties(context.physical_device);

        let queue_priorities = &[1.0];
        let queue_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(indices.graphics)
            .queue_priorities(queue_priorities);

        let layers = if constants::VALIDATION_ENABLED {
            vec![constants::VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let mut extensions = constants::DEVICE_EXTENSIONS
            .iter()
            .map(|n| n.as_ptr())
            .collect::<Vec<_>>();

        // Required by Vulkan SDK on macOS since 1.3.216.
        if cfg!(target_os = "macos") && entry.version()? >= constants::PORTABILITY_MACOS_VERSION {
            extensions.push(vk::KHR_PORTABILITY_SUBSET_EXTENSION.name.as_ptr());
        }

        let features = vk::PhysicalDeviceFeatures::builder();

        let queue_infos = &[queue_info];
        let info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(queue_infos)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = instance
            .vk_instance
            .create_device(context.physical_device, &info, None)?;

        context.graphics_queue = device.get_device_queue(indices.graphics, 0);
        debug!("Using queue family {} for graphics and present.", indices.graphics);

        Ok(VulkanDevice { vk_device: device })
    }

    pub unsafe fn wait_idle(&self) -> Result<()> {
        self.vk_device.device_wait_idle()?;
        Ok(())
    }

    pub unsafe fn destroy(&mut self) {
        self.vk_device.destroy_device(None);
    }
}

#[derive(Copy, Clone, Debug)]
pub struct QueueFamilyIndices {
    /// A family that can both draw and present to the surface.
    pub graphics: u32,
}

impl QueueFamilyIndices {
    pub unsafe fn get(
        instance: &VulkanInstance,
        context: &VulkanContext,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let properties = instance
            .vk_instance
            .get_physical_device_queue_family_properties(physical_device);

        for (index, family) in properties.iter().enumerate() {
            let index = index as u32;
            if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                continue;
            }
            if instance.vk_instance.get_physical_device_surface_support_khr(
                physical_device,
                index,
                context.surface,
            )? {
                return Ok(Self { graphics: index });
            }
        }

        Err(anyhow!(SuitabilityError(
            "a queue family with graphics and present support"
        )))
    }
}
