use anyhow::Result;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

use super::{context::VulkanContext, device::VulkanDevice, texture::Texture};

pub struct VulkanDescriptors;

impl VulkanDescriptors {
    /// One combined image sampler binding holding every texture, read by the
    /// fragment stage.
    pub unsafe fn create_layout(device: &VulkanDevice, context: &mut VulkanContext) -> Result<()> {
        let binding = vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(context.textures.len() as u32)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT);

        let bindings = &[binding];
        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);

        context.descriptor_set_layout = device
            .vk_device
            .create_descriptor_set_layout(&info, None)?;
        Ok(())
    }

    /// Allocates the single descriptor set and points it at the textures,
    /// each in the layout it was left in by its upload.
    pub unsafe fn create_set(device: &VulkanDevice, context: &mut VulkanContext) -> Result<()> {
        let pool_size = vk::DescriptorPoolSize::builder()
            .type_(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(context.textures.len() as u32);

        let pool_sizes = &[pool_size];
        let info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(pool_sizes)
            .max_sets(1);
        context.descriptor_pool = device.vk_device.create_descriptor_pool(&info, None)?;

        let layouts = &[context.descriptor_set_layout];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(context.descriptor_pool)
            .set_layouts(layouts);
        context.descriptor_set = device.vk_device.allocate_descriptor_sets(&info)?[0];

        let image_info = image_infos(&context.textures);
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(context.descriptor_set)
            .dst_binding(0)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info);

        device
            .vk_device
            .update_descriptor_sets(&[write], &[] as &[vk::CopyDescriptorSet]);
        Ok(())
    }

    pub unsafe fn destroy(device: &VulkanDevice, context: &mut VulkanContext) {
        // Freeing the pool frees the set.
        device
            .vk_device
            .destroy_descriptor_pool(context.descriptor_pool, None);
        device
            .vk_device
            .destroy_descriptor_set_layout(context.descriptor_set_layout, None);
        context.descriptor_set = vk::DescriptorSet::null();
        context.descriptor_pool = vk::DescriptorPool::null();
        context.descriptor_set_layout = vk::DescriptorSetLayout::null();
    }
}

fn image_infos(textures: &[Texture]) -> Vec<vk::DescriptorImageInfo> {
    textures
        .iter()
        .map(|t| {
            vk::DescriptorImageInfo::builder()
                .sampler(t.sampler)
                .image_view(t.view)
                .image_layout(t.image.layout().to_vk())
                .build()
        })
        .collect()
}
