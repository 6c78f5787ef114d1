use anyhow::{anyhow, Result};
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder, KhrSurfaceExtension, KhrSwapchainExtension};
use winit::window::Window;

use super::{context::VulkanContext, device::VulkanDevice, image, instance::VulkanInstance};

#[derive(Debug)]
pub struct VulkanSwapchain;

impl VulkanSwapchain {
    pub unsafe fn create(
        window: &Window,
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let formats = instance
            .vk_instance
            .get_physical_device_surface_formats_khr(context.physical_device, context.surface)?;
        let format = choose_surface_format(&formats)
            .ok_or_else(|| anyhow!("No compatible surface format."))?;

        let capabilities = instance
            .vk_instance
            .get_physical_device_surface_capabilities_khr(context.physical_device, context.surface)?;

        let size = window.inner_size();
        let extent = choose_extent(&capabilities, size.width, size.height);
        let composite_alpha = choose_composite_alpha(capabilities.supported_composite_alpha)
            .ok_or_else(|| anyhow!("No supported composite alpha mode."))?;

        let queue_family_indices = &[context.queue_family_index];
        let info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface)
            .min_image_count(capabilities.min_image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(queue_family_indices)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(composite_alpha)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        context.swapchain = device.vk_device.create_swapchain_khr(&info, None)?;
        context.swapchain_images = device.vk_device.get_swapchain_images_khr(context.swapchain)?;
        context.swapchain_format = format.format;
        context.swapchain_extent = extent;

        info!(
            "Created swapchain: {} image(s), {}x{}, {:?}.",
            context.swapchain_images.len(),
            extent.width,
            extent.height,
            format.format
        );

        Ok(())
    }

    pub unsafe fn create_image_views(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        context.swapchain_image_views = context
            .swapchain_images
            .iter()
            .map(|i| {
                let info = vk::ImageViewCreateInfo::builder()
                    .image(*i)
                    .view_type(vk::ImageViewType::_2D)
                    .format(context.swapchain_format)
                    .components(vk::ComponentMapping::default())
                    .subresource_range(image::color_subresource_range());

                device.vk_device.create_image_view(&info, None)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(())
    }

    pub unsafe fn destroy_image_views(device: &VulkanDevice, context: &mut VulkanContext) {
        context
            .swapchain_image_views
            .drain(..)
            .for_each(|v| device.vk_device.destroy_image_view(v, None));
    }

    /// The images belong to the presentation engine and go with the swapchain.
    pub unsafe fn destroy(device: &VulkanDevice, context: &mut VulkanContext) {
        device
            .vk_device
            .destroy_swapchain_khr(context.swapchain, None);
        context.swapchain = vk::SwapchainKHR::null();
        context.swapchain_images.clear();
    }
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    [vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM]
        .iter()
        .find_map(|wanted| formats.iter().find(|f| f.format == *wanted))
        .or_else(|| formats.first())
        .copied()
}

pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D::builder()
        .width(width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ))
        .height(height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ))
        .build()
}

pub fn choose_composite_alpha(
    supported: vk::CompositeAlphaFlagsKHR,
) -> Option<vk::CompositeAlphaFlagsKHR> {
    [
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|mode| supported.contains(*mode))
}
