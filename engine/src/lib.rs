#![allow(clippy::too_many_arguments, clippy::missing_safety_doc)]

use anyhow::Result;
use log::*;
use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::EventLoop;
use winit::window::{Window, WindowBuilder};

pub mod assets;
pub mod config;
mod renderer;
mod vulkan;

pub use config::RendererConfig;
pub use renderer::Renderer;

pub struct Engine {
    window: Window,
    renderer: Renderer,
    event_loop: EventLoop<()>,
}

impl Engine {
    pub fn new(config: RendererConfig) -> Result<Engine> {
        config.validate()?;

        // Window
        let event_loop = EventLoop::new()?;
        let window = WindowBuilder::new()
            .with_title("Textured Triangle")
            .with_inner_size(LogicalSize::new(1024, 768))
            .build(&event_loop)?;

        let mut renderer = Renderer::new(config);
        unsafe { renderer.initialize(&window)? };

        Ok(Engine {
            window,
            renderer,
            event_loop,
        })
    }

    /// Runs the event loop until the window is closed or a frame fails.
    pub fn run(self) -> Result<()> {
        let Engine {
            window,
            mut renderer,
            event_loop,
        } = self;
        let mut failure = None;

        event_loop.run(|event, elwt| match event {
            // Request a redraw when all events were processed.
            Event::AboutToWait => window.request_redraw(),
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::Resized(_) => renderer.resized(),
                // Render a frame if our Vulkan app is not being destroyed.
                WindowEvent::RedrawRequested if !elwt.exiting() => {
                    if let Err(e) = unsafe { renderer.render(&window) } {
                        error!("Frame failed: {:#}", e);
                        failure = Some(e);
                        elwt.exit();
                    }
                }
                WindowEvent::CloseRequested => elwt.exit(),
                _ => {}
            },
            Event::LoopExiting => unsafe { renderer.destroy() },
            _ => {}
        })?;

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
