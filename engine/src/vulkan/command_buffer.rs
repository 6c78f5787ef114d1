use anyhow::Result;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

use super::{
    context::VulkanContext,
    device::VulkanDevice,
    image::{set_image_layout, ImageLayout},
};

#[derive(Debug)]
pub struct VulkanCommandBuffer;

impl VulkanCommandBuffer {
    pub unsafe fn create_command_pool(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(context.queue_family_index);

        context.command_pool = device.vk_device.create_command_pool(&info, None)?;

        Ok(())
    }

    /// Records one command buffer per framebuffer. Buffer `i` draws into
    /// swapchain image `i` and is submitted whenever that image is acquired.
    pub unsafe fn create_command_buffers(
        device: &VulkanDevice,
        context: &mut VulkanContext,
        clear_color: [f32; 4],
    ) -> Result<()> {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(context.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(context.framebuffers.len() as u32);

        context.command_buffers = device.vk_device.allocate_command_buffers(&allocate_info)?;

        for (i, command_buffer) in context.command_buffers.iter().enumerate() {
            let info = vk::CommandBufferBeginInfo::builder();

            device
                .vk_device
                .begin_command_buffer(*command_buffer, &info)?;

            // Contents from the last present are not needed.
            set_image_layout(
                device,
                *command_buffer,
                context.swapchain_images[i],
                ImageLayout::Undefined,
                ImageLayout::ColorAttachment,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            );

            let render_area = vk::Rect2D::builder()
                .offset(vk::Offset2D::default())
                .extent(context.swapchain_extent);

            let color_clear_value = vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            };

            let clear_values = &[color_clear_value];
            let info = vk::RenderPassBeginInfo::builder()
                .render_pass(context.render_pass)
                .framebuffer(context.framebuffers[i])
                .render_area(render_area)
                .clear_values(clear_values);

            device.vk_device.cmd_begin_render_pass(
                *command_buffer,
                &info,
                vk::SubpassContents::INLINE,
            );

            device.vk_device.cmd_bind_pipeline(
                *command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                context.pipeline,
            );
            device.vk_device.cmd_bind_descriptor_sets(
                *command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                context.pipeline_layout,
                0,
                &[context.descriptor_set],
                &[],
            );
            device
                .vk_device
                .cmd_bind_vertex_buffers(*command_buffer, 0, &[context.vertex_buffer], &[0]);

            device.vk_device.cmd_draw(*command_buffer, 3, 1, 0, 0);
            device.vk_device.cmd_end_render_pass(*command_buffer);

            device.vk_device.end_command_buffer(*command_buffer)?;
        }

        Ok(())
    }

    pub unsafe fn free_command_buffers(device: &VulkanDevice, context: &mut VulkanContext) {
        if !context.command_buffers.is_empty() {
            device
                .vk_device
                .free_command_buffers(context.command_pool, &context.command_buffers);
        }
        context.command_buffers.clear();
    }

    pub unsafe fn destroy_command_pool(device: &VulkanDevice, context: &mut VulkanContext) {
        device
            .vk_device
            .destroy_command_pool(context.command_pool, None);
        context.command_pool = vk::CommandPool::null();
        context.command_buffers.clear();
    }
}
