use std::mem::size_of_val;
use std::ptr::copy_nonoverlapping as memcpy;

use anyhow::Result;
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

use super::{constants, context::VulkanContext, device::VulkanDevice, memory};

pub struct VulkanBuffer;

impl VulkanBuffer {
    /// Creates the host-visible vertex buffer and writes the triangle into it.
    pub unsafe fn create_vertex_buffer(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let vertices = &constants::TRIANGLE_VERTICES;
        let size = size_of_val(vertices) as vk::DeviceSize;

        let queue_family_indices = &[context.queue_family_index];
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(vk::BufferUsageFlags::VERTEX_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(queue_family_indices);

        let buffer = device.vk_device.create_buffer(&buffer_info, None)?;
        let requirements = device.vk_device.get_buffer_memory_requirements(buffer);

        let memory_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory::find_memory_type_index(
                &context.memory_properties,
                requirements.memory_type_bits,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?);

        let buffer_memory = device.vk_device.allocate_memory(&memory_info, None)?;

        let data = device.vk_device.map_memory(
            buffer_memory,
            0,
            requirements.size,
            vk::MemoryMapFlags::empty(),
        )?;
        memcpy(vertices.as_ptr(), data.cast(), vertices.len());
        device.vk_device.unmap_memory(buffer_memory);

        device
            .vk_device
            .bind_buffer_memory(buffer, buffer_memory, 0)?;

        context.vertex_buffer = buffer;
        context.vertex_buffer_memory = buffer_memory;
        debug!("Uploaded {} byte(s) of vertex data.", size);

        Ok(())
    }

    pub unsafe fn destroy(device: &VulkanDevice, context: &mut VulkanContext) {
        device.vk_device.destroy_buffer(context.vertex_buffer, None);
        device
            .vk_device
            .free_memory(context.vertex_buffer_memory, None);
        context.vertex_buffer = vk::Buffer::null();
        context.vertex_buffer_memory = vk::DeviceMemory::null();
    }
}
