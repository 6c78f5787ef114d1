use std::mem::take;
use std::slice;

use anyhow::{anyhow, Result};
use log::*;
use thiserror::Error;
use vulkanalia::vk::{self, DeviceV1_0, HasBuilder, InstanceV1_0};

use super::{
    constants,
    context::VulkanContext,
    device::VulkanDevice,
    image::{color_subresource_range, CommandRecorder, ImageLayout, TrackedImage},
    instance::VulkanInstance,
    memory,
};
use crate::assets::{decode_png, AssetSource, RgbaImage};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TextureError {
    #[error("texture format {0:?} cannot be sampled with any tiling")]
    FormatNotSamplable(vk::Format),
    #[error("staging memory holds {available} byte(s), {required} needed")]
    StagingTooSmall { available: usize, required: usize },
}

/// A sampled image and the objects needed to bind it.
#[derive(Copy, Clone, Debug)]
pub struct Texture {
    pub sampler: vk::Sampler,
    pub image: TrackedImage,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub width: u32,
    pub height: u32,
}

/// Whether linear images of the texture format have to be copied into an
/// optimally tiled image before they can be sampled.
pub fn needs_blit(properties: &vk::FormatProperties) -> Result<bool, TextureError> {
    let sampled = vk::FormatFeatureFlags::SAMPLED_IMAGE;
    if properties.linear_tiling_features.contains(sampled) {
        Ok(false)
    } else if properties.optimal_tiling_features.contains(sampled) {
        Ok(true)
    } else {
        Err(TextureError::FormatNotSamplable(constants::TEXTURE_FORMAT))
    }
}

/// Copies tightly packed RGBA rows into mapped image memory whose rows start
/// `row_pitch` bytes apart.
pub fn write_pixels(
    dst: &mut [u8],
    offset: usize,
    row_pitch: usize,
    image: &RgbaImage,
) -> Result<(), TextureError> {
    let row_bytes = image.width as usize * constants::TEXTURE_BYTES_PER_PIXEL;
    let required = if image.height == 0 {
        offset
    } else {
        offset + row_pitch * (image.height as usize - 1) + row_bytes
    };
    if row_pitch < row_bytes || dst.len() < required {
        return Err(TextureError::StagingTooSmall {
            available: dst.len(),
            required: required.max(offset + row_bytes * image.height as usize),
        });
    }

    for (y, row) in image.pixels.chunks_exact(row_bytes).enumerate() {
        let start = offset + y * row_pitch;
        dst[start..start + row_bytes].copy_from_slice(row);
    }
    Ok(())
}

/// Records the transition that makes a host-written linear image samplable.
pub unsafe fn record_direct_upload<R: CommandRecorder + ?Sized>(
    recorder: &R,
    command_buffer: vk::CommandBuffer,
    texture: &mut TrackedImage,
) {
    texture.transition(
        recorder,
        command_buffer,
        ImageLayout::ShaderReadOnly,
        vk::PipelineStageFlags::HOST,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
    );
}

/// Records the copy of a host-written linear `staging` image into the
/// optimally tiled `texture`, leaving `texture` ready for sampling.
pub unsafe fn record_blit_upload<R: CommandRecorder + ?Sized>(
    recorder: &R,
    command_buffer: vk::CommandBuffer,
    staging: &mut TrackedImage,
    texture: &mut TrackedImage,
    width: u32,
    height: u32,
) {
    staging.transition(
        recorder,
        command_buffer,
        ImageLayout::TransferSrc,
        vk::PipelineStageFlags::HOST,
        vk::PipelineStageFlags::TRANSFER,
    );
    texture.transition(
        recorder,
        command_buffer,
        ImageLayout::TransferDst,
        vk::PipelineStageFlags::HOST,
        vk::PipelineStageFlags::TRANSFER,
    );

    let subresource = vk::ImageSubresourceLayers::builder()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(0)
        .base_array_layer(0)
        .layer_count(1)
        .build();
    let region = vk::ImageCopy::builder()
        .src_subresource(subresource)
        .src_offset(vk::Offset3D::default())
        .dst_subresource(subresource)
        .dst_offset(vk::Offset3D::default())
        .extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        })
        .build();
    recorder.copy_image(
        command_buffer,
        staging.handle(),
        staging.layout(),
        texture.handle(),
        texture.layout(),
        &region,
    );

    texture.transition(
        recorder,
        command_buffer,
        ImageLayout::ShaderReadOnly,
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
    );
}

/// Everything created while loading one texture. Handles that were never
/// created stay null, and destroying a null handle is a no-op.
#[derive(Debug, Default)]
struct UploadObjects {
    pool: vk::CommandPool,
    fence: vk::Fence,
    linear_image: vk::Image,
    linear_memory: vk::DeviceMemory,
    optimal_image: vk::Image,
    optimal_memory: vk::DeviceMemory,
    sampler: vk::Sampler,
    view: vk::ImageView,
}

impl UploadObjects {
    /// Moves the objects the texture keeps out, leaving only staging objects.
    fn take_texture(&mut self, blit: bool, layout: ImageLayout, width: u32, height: u32) -> Texture {
        let (image, memory) = if blit {
            (take(&mut self.optimal_image), take(&mut self.optimal_memory))
        } else {
            (take(&mut self.linear_image), take(&mut self.linear_memory))
        };
        Texture {
            sampler: take(&mut self.sampler),
            image: TrackedImage::new(image, layout),
            memory,
            view: take(&mut self.view),
            width,
            height,
        }
    }

    /// The device must no longer be using any of the objects.
    unsafe fn destroy(&mut self, device: &VulkanDevice) {
        let vk_device = &device.vk_device;
        vk_device.destroy_image_view(take(&mut self.view), None);
        vk_device.destroy_sampler(take(&mut self.sampler), None);
        // Destroying the pool frees its command buffer.
        vk_device.destroy_command_pool(take(&mut self.pool), None);
        vk_device.destroy_fence(take(&mut self.fence), None);
        vk_device.destroy_image(take(&mut self.optimal_image), None);
        vk_device.free_memory(take(&mut self.optimal_memory), None);
        vk_device.destroy_image(take(&mut self.linear_image), None);
        vk_device.free_memory(take(&mut self.linear_memory), None);
    }
}

pub struct VulkanTexture;

impl VulkanTexture {
    pub unsafe fn load(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &VulkanContext,
        assets: &dyn AssetSource,
        path: &str,
        upload_timeout: u64,
    ) -> Result<Texture> {
        let bytes = assets.read(path)?;
        let pixels = decode_png(path, &bytes)?;

        let properties = instance
            .vk_instance
            .get_physical_device_format_properties(context.physical_device, constants::TEXTURE_FORMAT);
        let blit = needs_blit(&properties)?;

        let mut objects = UploadObjects::default();
        let layout = match VulkanTexture::upload(
            device,
            context,
            &pixels,
            blit,
            upload_timeout,
            &mut objects,
        ) {
            Ok(layout) => layout,
            Err(e) => {
                // The one-shot submission may still be pending.
                if let Err(idle) = device.wait_idle() {
                    warn!("Device did not go idle after a failed upload: {}", idle);
                }
                objects.destroy(device);
                return Err(e.context(format!("Uploading `{}`", path)));
            }
        };

        let texture = objects.take_texture(blit, layout, pixels.width, pixels.height);
        objects.destroy(device);

        debug!(
            "Uploaded `{}` through the {} path.",
            path,
            if blit { "blit" } else { "linear" }
        );
        Ok(texture)
    }

    /// Creates, fills and transitions the images and waits for the transfer.
    /// Returns the layout the sampled image ends up in.
    unsafe fn upload(
        device: &VulkanDevice,
        context: &VulkanContext,
        pixels: &RgbaImage,
        blit: bool,
        upload_timeout: u64,
        objects: &mut UploadObjects,
    ) -> Result<ImageLayout> {
        // Host-written source image. Sampled directly unless the device needs a blit.
        let linear_usage = if blit {
            vk::ImageUsageFlags::TRANSFER_SRC
        } else {
            vk::ImageUsageFlags::SAMPLED
        };
        create_image(
            device,
            context,
            pixels.width,
            pixels.height,
            vk::ImageTiling::LINEAR,
            linear_usage,
            ImageLayout::Preinitialized,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            &mut objects.linear_image,
            &mut objects.linear_memory,
        )?;
        let mut linear = TrackedImage::new(objects.linear_image, ImageLayout::Preinitialized);

        let subresource = vk::ImageSubresource::builder()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .mip_level(0)
            .array_layer(0);
        let layout = device
            .vk_device
            .get_image_subresource_layout(objects.linear_image, &subresource);

        let requirements = device
            .vk_device
            .get_image_memory_requirements(objects.linear_image);
        let mapped = device.vk_device.map_memory(
            objects.linear_memory,
            0,
            requirements.size,
            vk::MemoryMapFlags::empty(),
        )?;
        let staging = slice::from_raw_parts_mut(mapped.cast::<u8>(), requirements.size as usize);
        let written = write_pixels(
            staging,
            layout.offset as usize,
            layout.row_pitch as usize,
            pixels,
        );
        device.vk_device.unmap_memory(objects.linear_memory);
        written?;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(context.queue_family_index);
        objects.pool = device.vk_device.create_command_pool(&pool_info, None)?;

        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(objects.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = device.vk_device.allocate_command_buffers(&allocate_info)?[0];

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device
            .vk_device
            .begin_command_buffer(command_buffer, &begin_info)?;

        let sampled = if blit {
            create_image(
                device,
                context,
                pixels.width,
                pixels.height,
                vk::ImageTiling::OPTIMAL,
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                ImageLayout::Undefined,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
                &mut objects.optimal_image,
                &mut objects.optimal_memory,
            )?;
            let mut optimal = TrackedImage::new(objects.optimal_image, ImageLayout::Undefined);
            record_blit_upload(
                device,
                command_buffer,
                &mut linear,
                &mut optimal,
                pixels.width,
                pixels.height,
            );
            optimal
        } else {
            record_direct_upload(device, command_buffer, &mut linear);
            linear
        };

        device.vk_device.end_command_buffer(command_buffer)?;

        let fence_info = vk::FenceCreateInfo::builder();
        objects.fence = device.vk_device.create_fence(&fence_info, None)?;

        let command_buffers = &[command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(command_buffers);
        device
            .vk_device
            .queue_submit(context.graphics_queue, &[submit_info], objects.fence)?;

        let waited = device
            .vk_device
            .wait_for_fences(&[objects.fence], true, upload_timeout)?;
        if waited == vk::SuccessCode::TIMEOUT {
            return Err(anyhow!("Transfer did not finish in time."));
        }

        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .mip_lod_bias(0.0)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .compare_enable(false)
            .compare_op(vk::CompareOp::NEVER)
            .min_lod(0.0)
            .max_lod(0.0)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
            .unnormalized_coordinates(false);
        objects.sampler = device.vk_device.create_sampler(&sampler_info, None)?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(sampled.handle())
            .view_type(vk::ImageViewType::_2D)
            .format(constants::TEXTURE_FORMAT)
            .components(vk::ComponentMapping::default())
            .subresource_range(color_subresource_range());
        objects.view = device.vk_device.create_image_view(&view_info, None)?;

        Ok(sampled.layout())
    }

    pub unsafe fn destroy(device: &VulkanDevice, context: &mut VulkanContext) {
        for texture in context.textures.drain(..) {
            device.vk_device.destroy_sampler(texture.sampler, None);
            device.vk_device.destroy_image_view(texture.view, None);
            device.vk_device.destroy_image(texture.image.handle(), None);
            device.vk_device.free_memory(texture.memory, None);
        }
    }
}

/// Creates a 2D texture-format image bound to fresh memory. Each handle is
/// stored as soon as it exists so a later failure can release it.
unsafe fn create_image(
    device: &VulkanDevice,
    context: &VulkanContext,
    width: u32,
    height: u32,
    tiling: vk::ImageTiling,
    usage: vk::ImageUsageFlags,
    initial_layout: ImageLayout,
    properties: vk::MemoryPropertyFlags,
    image: &mut vk::Image,
    image_memory: &mut vk::DeviceMemory,
) -> Result<()> {
    let queue_family_indices = &[context.queue_family_index];
    let info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::_2D)
        .format(constants::TEXTURE_FORMAT)
        .extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::_1)
        .tiling(tiling)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .queue_family_indices(queue_family_indices)
        .initial_layout(initial_layout.to_vk());

    *image = device.vk_device.create_image(&info, None)?;
    let requirements = device.vk_device.get_image_memory_requirements(*image);

    let memory_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory::find_memory_type_index(
            &context.memory_properties,
            requirements.memory_type_bits,
            properties,
        )?);

    *image_memory = device.vk_device.allocate_memory(&memory_info, None)?;
    device.vk_device.bind_image_memory(*image, *image_memory, 0)?;

    Ok(())
}
