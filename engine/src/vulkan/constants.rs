use vulkanalia::{vk, Version};

pub const PORTABILITY_MACOS_VERSION: Version = Version::new(1, 3, 216);
pub const VALIDATION_ENABLED: bool = cfg!(debug_assertions);
pub const VALIDATION_LAYER: vk::ExtensionName =
    vk::ExtensionName::from_bytes(b"VK_LAYER_KHRONOS_validation");
pub const DEVICE_EXTENSIONS: &[vk::ExtensionName] = &[vk::KHR_SWAPCHAIN_EXTENSION.name];

/// Pixel format of every texture uploaded by the renderer.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
pub const TEXTURE_BYTES_PER_PIXEL: usize = 4;

pub const VERTEX_SHADER: &str = "shaders/tri.vert.spv";
pub const FRAGMENT_SHADER: &str = "shaders/tri.frag.spv";

/// Interleaved position (xyz) and texture coordinate (uv).
pub const VERTEX_FLOATS: usize = 5;
pub const TRIANGLE_VERTICES: [f32; 3 * VERTEX_FLOATS] = [
    -1.0, -1.0, 0.0, 0.0, 0.0, //
    1.0, -1.0, 0.0, 1.0, 0.0, //
    0.0, 1.0, 0.0, 0.5, 1.0,
];
