use anyhow::{anyhow, Result};
use log::*;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::config::RendererConfig;
use crate::vulkan::VulkanRenderer;

/// Lifecycle wrapper around the Vulkan backend. Created empty, brought up
/// against a window by `initialize`.
pub struct Renderer {
    config: RendererConfig,
    vk_renderer: Option<VulkanRenderer>,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            vk_renderer: None,
        }
    }

    /// Creates our Vulkan objects for `window`.
    pub unsafe fn initialize(&mut self, window: &Window) -> Result<()> {
        if self.vk_renderer.is_some() {
            return Err(anyhow!("Renderer is already initialized."));
        }
        self.vk_renderer = Some(VulkanRenderer::new(window, self.config.clone())?);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.vk_renderer.is_some()
    }

    /// Renders a frame. Minimized windows are skipped.
    pub unsafe fn render(&mut self, window: &Window) -> Result<()> {
        let vk_renderer = self
            .vk_renderer
            .as_mut()
            .ok_or_else(|| anyhow!("Renderer is not initialized."))?;

        if !has_area(window.inner_size()) {
            return Ok(());
        }

        vk_renderer.render(window)
    }

    pub fn resized(&mut self) {
        if let Some(vk_renderer) = self.vk_renderer.as_mut() {
            vk_renderer.resized();
        }
    }

    /// Destroys our Vulkan objects. Does nothing if there are none.
    pub unsafe fn destroy(&mut self) {
        if let Some(mut vk_renderer) = self.vk_renderer.take() {
            vk_renderer.destroy();
        } else {
            debug!("Renderer destroyed before initialization.");
        }
    }
}

/// A minimized window has no area and no swapchain can be built for it.
fn has_area(size: PhysicalSize<u32>) -> bool {
    size.width > 0 && size.height > 0
}
