use anyhow::{anyhow, Result};
use buffer::VulkanBuffer;
use command_buffer::VulkanCommandBuffer;
use context::VulkanContext;
use descriptor::VulkanDescriptors;
use device::VulkanDevice;
use framebuffer::VulkanFramebuffer;
use instance::VulkanInstance;
use log::*;
use pipeline::VulkanPipeline;
use render_pass::VulkanRenderPass;
use swapchain::VulkanSwapchain;
use sync::{after_frame, FrameOutcome, FrameSync, SwapchainQueue};
use teardown::{release_plan, TeardownStage};
use texture::VulkanTexture;
use vulkanalia::{
    loader::{LibloadingLoader, LIBRARY},
    Entry,
};
use winit::window::Window;

use crate::assets::DirectoryAssets;
use crate::config::RendererConfig;

mod buffer;
mod command_buffer;
mod constants;
mod context;
mod descriptor;
mod device;
mod framebuffer;
mod image;
mod instance;
mod memory;
mod pipeline;
mod render_pass;
mod swapchain;
mod sync;
mod teardown;
mod texture;

pub struct VulkanRenderer {
    _entry: Entry,
    instance: VulkanInstance,
    device: VulkanDevice,
    context: VulkanContext,
    sync: FrameSync,
    assets: DirectoryAssets,
    config: RendererConfig,
    resized: bool,
}

impl VulkanRenderer {
    /// Creates every object needed to draw: instance, surface, device,
    /// swapchain, render pass, framebuffers, textures, vertex buffer,
    /// descriptors, pipeline, command buffers and frame slots. Whatever was
    /// created before a failure is released again.
    pub unsafe fn new(window: &Window, config: RendererConfig) -> Result<VulkanRenderer> {
        config.validate()?;

        let loader = LibloadingLoader::new(LIBRARY)?;
        let entry = Entry::new(loader).map_err(|b| anyhow!("{}", b))?;
        let assets = DirectoryAssets::new(&config.asset_root);

        let mut context = VulkanContext::default();
        let mut instance = VulkanInstance::new(window, &entry, &mut context)?;

        let mut device =
            match VulkanRenderer::create_device(window, &entry, &instance, &mut context) {
                Ok(device) => device,
                Err(e) => {
                    release(&mut instance, None, &mut context, None);
                    return Err(e);
                }
            };

        let sync = match VulkanRenderer::create_resources(
            window,
            &instance,
            &device,
            &mut context,
            &assets,
            &config,
        ) {
            Ok(sync) => sync,
            Err(e) => {
                release(&mut instance, Some(&mut device), &mut context, None);
                return Err(e);
            }
        };
        info!(
            "Renderer ready with {} frame(s) in flight.",
            sync.frames_in_flight()
        );

        Ok(VulkanRenderer {
            _entry: entry,
            instance,
            device,
            context,
            sync,
            assets,
            config,
            resized: false,
        })
    }

    unsafe fn create_device(
        window: &Window,
        entry: &Entry,
        instance: &VulkanInstance,
        context: &mut VulkanContext,
    ) -> Result<VulkanDevice> {
        instance.create_surface(window, context)?;
        VulkanDevice::new(entry, instance, context)
    }

    unsafe fn create_resources(
        window: &Window,
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
        assets: &DirectoryAssets,
        config: &RendererConfig,
    ) -> Result<FrameSync> {
        VulkanSwapchain::create(window, instance, device, context)?;
        VulkanSwapchain::create_image_views(device, context)?;
        VulkanRenderPass::create(device, context)?;
        VulkanFramebuffer::create(device, context)?;

        for path in &config.textures {
            let texture =
                VulkanTexture::load(instance, device, context, assets, path, config.upload_timeout)?;
            info!(
                "Loaded texture `{}` ({}x{}).",
                path, texture.width, texture.height
            );
            context.textures.push(texture);
        }
        VulkanBuffer::create_vertex_buffer(device, context)?;

        VulkanDescriptors::create_layout(device, context)?;
        VulkanPipeline::create(device, context, assets)?;
        VulkanDescriptors::create_set(device, context)?;

        VulkanCommandBuffer::create_command_pool(device, context)?;
        VulkanCommandBuffer::create_command_buffers(device, context, config.clear_color)?;

        Ok(FrameSync::create(
            device,
            config.frames_in_flight,
            context.swapchain_images.len(),
            config.acquire_timeout,
            config.fence_timeout,
        )?)
    }

    /// Draws and presents one frame, rebuilding the swapchain when it no
    /// longer matches the surface.
    pub unsafe fn render(&mut self, window: &Window) -> Result<()> {
        let mut queue = SwapchainQueue {
            device: &self.device,
            queue: self.context.graphics_queue,
            swapchain: self.context.swapchain,
        };

        let result = self.sync.draw_frame(&mut queue, &self.context.command_buffers);
        match &result {
            Ok(presented) if presented.suboptimal => debug!(
                "Image {} presented to a suboptimal swapchain.",
                presented.image_index
            ),
            Err(e) if e.is_recoverable() => {
                warn!("{} on frame slot {}, rebuilding.", e, self.sync.current_slot())
            }
            _ => {}
        }

        match after_frame(result, self.resized)? {
            FrameOutcome::Presented => Ok(()),
            FrameOutcome::RebuildSwapchain => self.recreate_swapchain(window),
        }
    }

    /// Marks the swapchain stale. It is rebuilt after the next frame.
    pub fn resized(&mut self) {
        self.resized = true;
    }

    unsafe fn recreate_swapchain(&mut self, window: &Window) -> Result<()> {
        self.resized = false;
        self.device.wait_idle()?;
        self.destroy_swapchain();

        VulkanSwapchain::create(window, &self.instance, &self.device, &mut self.context)?;
        VulkanSwapchain::create_image_views(&self.device, &mut self.context)?;
        VulkanRenderPass::create(&self.device, &mut self.context)?;
        VulkanFramebuffer::create(&self.device, &mut self.context)?;
        VulkanPipeline::create(&self.device, &mut self.context, &self.assets)?;
        VulkanCommandBuffer::create_command_buffers(
            &self.device,
            &mut self.context,
            self.config.clear_color,
        )?;

        self.sync.reset_images(self.context.swapchain_images.len());

        Ok(())
    }

    /// Releases everything that depends on the swapchain extent or images.
    unsafe fn destroy_swapchain(&mut self) {
        VulkanCommandBuffer::free_command_buffers(&self.device, &mut self.context);
        VulkanFramebuffer::destroy(&self.device, &mut self.context);
        VulkanPipeline::destroy(&self.device, &mut self.context);
        VulkanRenderPass::destroy(&self.device, &mut self.context);
        VulkanSwapchain::destroy_image_views(&self.device, &mut self.context);
        VulkanSwapchain::destroy(&self.device, &mut self.context);
    }

    pub unsafe fn destroy(&mut self) {
        release(
            &mut self.instance,
            Some(&mut self.device),
            &mut self.context,
            Some(&mut self.sync),
        );
        info!("Renderer destroyed.");
    }
}

/// Releases, in teardown order, everything in `context` plus the frame slots
/// and device if given. Handles that were never created are null and skipped
/// by the driver, so this also unwinds a partially built renderer.
unsafe fn release(
    instance: &mut VulkanInstance,
    mut device: Option<&mut VulkanDevice>,
    context: &mut VulkanContext,
    mut sync: Option<&mut FrameSync>,
) {
    if let Some(device) = device.as_deref() {
        if let Err(e) = device.wait_idle() {
            warn!("Device did not go idle before teardown: {}", e);
        }
    }

    for stage in release_plan(device.is_some()) {
        debug!("Releasing {:?}.", stage);
        match (stage, device.as_deref_mut()) {
            (TeardownStage::Surface, _) => instance.destroy_surface(context),
            (TeardownStage::DebugMessenger, _) => instance.destroy_messenger(context),
            (TeardownStage::Instance, _) => instance.destroy(),
            // The plan holds no device stages without a device.
            (_, None) => {}
            (TeardownStage::SyncObjects, Some(device)) => {
                if let Some(sync) = sync.as_deref_mut() {
                    sync.destroy(device);
                }
            }
            (TeardownStage::CommandPool, Some(device)) => {
                VulkanCommandBuffer::destroy_command_pool(device, context)
            }
            (TeardownStage::Framebuffers, Some(device)) => VulkanFramebuffer::destroy(device, context),
            (TeardownStage::Pipeline, Some(device)) => VulkanPipeline::destroy(device, context),
            (TeardownStage::RenderPass, Some(device)) => VulkanRenderPass::destroy(device, context),
            (TeardownStage::SwapchainViews, Some(device)) => {
                VulkanSwapchain::destroy_image_views(device, context)
            }
            (TeardownStage::Swapchain, Some(device)) => VulkanSwapchain::destroy(device, context),
            (TeardownStage::Descriptors, Some(device)) => VulkanDescriptors::destroy(device, context),
            (TeardownStage::Textures, Some(device)) => VulkanTexture::destroy(device, context),
            (TeardownStage::VertexBuffer, Some(device)) => VulkanBuffer::destroy(device, context),
            (TeardownStage::Device, Some(device)) => device.destroy(),
        }
    }
}
