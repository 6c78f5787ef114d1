use thiserror::Error;
use vulkanalia::vk;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("No memory type in {type_bits:#034b} provides {required:?}.")]
pub struct MemoryTypeError {
    pub type_bits: u32,
    pub required: vk::MemoryPropertyFlags,
}

/// Returns the first memory type allowed by `type_bits` whose property flags
/// contain every flag in `required`.
pub fn find_memory_type_index(
    memory: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32, MemoryTypeError> {
    (0..memory.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32))
        .find(|i| {
            let allowed = type_bits & (1 << i) != 0;
            allowed
                && memory.memory_types[*i as usize]
                    .property_flags
                    .contains(required)
        })
        .ok_or(MemoryTypeError {
            type_bits,
            required,
        })
}
