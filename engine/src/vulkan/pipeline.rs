use std::mem::size_of;

use anyhow::{anyhow, Context, Result};
use log::*;
use vulkanalia::bytecode::Bytecode;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

use super::{constants, context::VulkanContext, device::VulkanDevice};
use crate::assets::AssetSource;

#[derive(Debug)]
pub struct VulkanPipeline;

impl VulkanPipeline {
    /// Builds the pipeline layout, cache and graphics pipeline for the
    /// current render pass and swapchain extent.
    pub unsafe fn create(
        device: &VulkanDevice,
        context: &mut VulkanContext,
        assets: &dyn AssetSource,
    ) -> Result<()> {
        let vert = assets.read(constants::VERTEX_SHADER)?;
        let frag = assets.read(constants::FRAGMENT_SHADER)?;

        let vertex_shader_module = VulkanPipeline::create_shader_module(device, &vert)
            .with_context(|| format!("Loading `{}`", constants::VERTEX_SHADER))?;
        let fragment_shader_module = VulkanPipeline::create_shader_module(device, &frag)
            .with_context(|| format!("Loading `{}`", constants::FRAGMENT_SHADER))?;

        let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_shader_module)
            .name(b"main\0");

        let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment_shader_module)
            .name(b"main\0");

        let binding_descriptions = &[vertex_binding()];
        let attribute_descriptions = vertex_attributes();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport = vk::Viewport::builder()
            .x(0.0)
            .y(0.0)
            .width(context.swapchain_extent.width as f32)
            .height(context.swapchain_extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0);

        let scissor = vk::Rect2D::builder()
            .offset(vk::Offset2D { x: 0, y: 0 })
            .extent(context.swapchain_extent);

        let viewports = &[viewport];
        let scissors = &[scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(viewports)
            .scissors(scissors);

        // The triangle is seen from both sides.
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::_1);

        let attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::all())
            .blend_enable(false);

        let attachments = &[attachment];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(attachments)
            .blend_constants([0.0, 0.0, 0.0, 0.0]);

        let set_layouts = &[context.descriptor_set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
        context.pipeline_layout = device
            .vk_device
            .create_pipeline_layout(&layout_info, None)?;

        let cache_info = vk::PipelineCacheCreateInfo::builder();
        context.pipeline_cache = device
            .vk_device
            .create_pipeline_cache(&cache_info, None)?;

        let stages = &[vert_stage, frag_stage];
        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .layout(context.pipeline_layout)
            .render_pass(context.render_pass)
            .subpass(0);

        let created = device
            .vk_device
            .create_graphics_pipelines(context.pipeline_cache, &[info], None);

        device
            .vk_device
            .destroy_shader_module(vertex_shader_module, None);
        device
            .vk_device
            .destroy_shader_module(fragment_shader_module, None);

        context.pipeline = created?.0[0];
        debug!("Created graphics pipeline.");

        Ok(())
    }

    unsafe fn create_shader_module(
        device: &VulkanDevice,
        bytecode: &[u8],
    ) -> Result<vk::ShaderModule> {
        let bytecode = Bytecode::new(bytecode).map_err(|e| anyhow!("Invalid SPIR-V: {}", e))?;
        let info = vk::ShaderModuleCreateInfo::builder()
            .code_size(bytecode.code_size())
            .code(bytecode.code());

        Ok(device.vk_device.create_shader_module(&info, None)?)
    }

    pub unsafe fn destroy(device: &VulkanDevice, context: &mut VulkanContext) {
        device.vk_device.destroy_pipeline(context.pipeline, None);
        device
            .vk_device
            .destroy_pipeline_cache(context.pipeline_cache, None);
        device
            .vk_device
            .destroy_pipeline_layout(context.pipeline_layout, None);
        context.pipeline = vk::Pipeline::null();
        context.pipeline_cache = vk::PipelineCache::null();
        context.pipeline_layout = vk::PipelineLayout::null();
    }
}

/// Interleaved vertices: xyz position then uv.
fn vertex_binding() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription::builder()
        .binding(0)
        .stride((constants::VERTEX_FLOATS * size_of::<f32>()) as u32)
        .input_rate(vk::VertexInputRate::VERTEX)
        .build()
}

fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 2] {
    let position = vk::VertexInputAttributeDescription::builder()
        .binding(0)
        .location(0)
        .format(vk::Format::R32G32B32_SFLOAT)
        .offset(0)
        .build();
    let texcoord = vk::VertexInputAttributeDescription::builder()
        .binding(0)
        .location(1)
        .format(vk::Format::R32G32_SFLOAT)
        .offset((3 * size_of::<f32>()) as u32)
        .build();
    [position, texcoord]
}
