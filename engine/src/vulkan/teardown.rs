/// Groups of Vulkan objects released together when the renderer shuts down.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TeardownStage {
    SyncObjects,
    CommandPool,
    Framebuffers,
    Pipeline,
    RenderPass,
    SwapchainViews,
    Swapchain,
    Descriptors,
    Textures,
    VertexBuffer,
    Device,
    Surface,
    DebugMessenger,
    Instance,
}

/// Release order. Nothing is destroyed while an object created from it, or
/// recorded against it, still exists.
pub const TEARDOWN_ORDER: [TeardownStage; 14] = [
    TeardownStage::SyncObjects,
    TeardownStage::CommandPool,
    TeardownStage::Framebuffers,
    TeardownStage::Pipeline,
    TeardownStage::RenderPass,
    TeardownStage::SwapchainViews,
    TeardownStage::Swapchain,
    TeardownStage::Descriptors,
    TeardownStage::Textures,
    TeardownStage::VertexBuffer,
    TeardownStage::Device,
    TeardownStage::Surface,
    TeardownStage::DebugMessenger,
    TeardownStage::Instance,
];

impl TeardownStage {
    /// The stages whose objects this stage's objects were created from or
    /// hold handles to.
    pub fn references(self) -> &'static [TeardownStage] {
        use TeardownStage::*;
        match self {
            SyncObjects => &[Device],
            // Recorded buffers name every object used while drawing.
            CommandPool => &[
                Framebuffers,
                Pipeline,
                RenderPass,
                Descriptors,
                VertexBuffer,
                Swapchain,
                Device,
            ],
            Framebuffers => &[RenderPass, SwapchainViews, Device],
            Pipeline => &[RenderPass, Descriptors, Device],
            RenderPass => &[Device],
            SwapchainViews => &[Swapchain, Device],
            Swapchain => &[Surface, Device],
            Descriptors => &[Textures, Device],
            Textures => &[Device],
            VertexBuffer => &[Device],
            Device => &[Instance],
            Surface => &[Instance],
            DebugMessenger => &[Instance],
            Instance => &[],
        }
    }

    /// Whether releasing this stage needs a live logical device.
    pub fn needs_device(self) -> bool {
        self == TeardownStage::Device || self.references().contains(&TeardownStage::Device)
    }
}

/// The stages to release, in order, for a renderer whose setup got as far as
/// creating the logical device or stopped before it.
pub fn release_plan(device_created: bool) -> impl Iterator<Item = TeardownStage> {
    TEARDOWN_ORDER
        .into_iter()
        .filter(move |stage| device_created || !stage.needs_device())
}
