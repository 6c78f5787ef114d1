use vulkanalia::vk::{self, DeviceV1_0, HasBuilder};

use super::device::VulkanDevice;

/// Image layouts the renderer moves images through.
///
/// The barrier access masks are declared per variant, so a layout either has
/// an entry in both lookup tables or does not exist.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    General,
    Preinitialized,
    TransferSrc,
    TransferDst,
    ShaderReadOnly,
    ColorAttachment,
    DepthStencilAttachment,
    PresentSrc,
}

impl ImageLayout {
    #[cfg(test)]
    pub const ALL: [ImageLayout; 9] = [
        ImageLayout::Undefined,
        ImageLayout::General,
        ImageLayout::Preinitialized,
        ImageLayout::TransferSrc,
        ImageLayout::TransferDst,
        ImageLayout::ShaderReadOnly,
        ImageLayout::ColorAttachment,
        ImageLayout::DepthStencilAttachment,
        ImageLayout::PresentSrc,
    ];

    pub fn to_vk(self) -> vk::ImageLayout {
        match self {
            ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
            ImageLayout::General => vk::ImageLayout::GENERAL,
            ImageLayout::Preinitialized => vk::ImageLayout::PREINITIALIZED,
            ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ImageLayout::DepthStencilAttachment => {
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            }
            ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }

    /// Writes that must be finished before an image leaves this layout.
    pub fn src_access_mask(self) -> vk::AccessFlags {
        match self {
            ImageLayout::ColorAttachment => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ImageLayout::TransferDst => vk::AccessFlags::TRANSFER_WRITE,
            ImageLayout::Preinitialized => vk::AccessFlags::HOST_WRITE,
            // Stage ordering only.
            ImageLayout::Undefined
            | ImageLayout::General
            | ImageLayout::TransferSrc
            | ImageLayout::ShaderReadOnly
            | ImageLayout::DepthStencilAttachment
            | ImageLayout::PresentSrc => vk::AccessFlags::empty(),
        }
    }

    /// Accesses that wait on the transition into this layout.
    pub fn dst_access_mask(self) -> vk::AccessFlags {
        match self {
            ImageLayout::TransferDst => vk::AccessFlags::TRANSFER_WRITE,
            ImageLayout::TransferSrc => vk::AccessFlags::TRANSFER_READ,
            ImageLayout::ShaderReadOnly => vk::AccessFlags::SHADER_READ,
            ImageLayout::ColorAttachment => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ImageLayout::DepthStencilAttachment => {
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
            }
            // The presentation engine's reads are opaque to us.
            ImageLayout::PresentSrc => vk::AccessFlags::MEMORY_READ,
            ImageLayout::Undefined | ImageLayout::General | ImageLayout::Preinitialized => {
                vk::AccessFlags::empty()
            }
        }
    }

    /// Every access an image in this layout may legally see.
    #[cfg(test)]
    pub fn permitted_accesses(self) -> vk::AccessFlags {
        match self {
            ImageLayout::Undefined => vk::AccessFlags::empty(),
            ImageLayout::General => {
                vk::AccessFlags::MEMORY_READ
                    | vk::AccessFlags::MEMORY_WRITE
                    | vk::AccessFlags::HOST_READ
                    | vk::AccessFlags::HOST_WRITE
                    | vk::AccessFlags::TRANSFER_READ
                    | vk::AccessFlags::TRANSFER_WRITE
                    | vk::AccessFlags::SHADER_READ
                    | vk::AccessFlags::SHADER_WRITE
                    | vk::AccessFlags::COLOR_ATTACHMENT_READ
                    | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            }
            ImageLayout::Preinitialized => {
                vk::AccessFlags::HOST_READ | vk::AccessFlags::HOST_WRITE
            }
            ImageLayout::TransferSrc => vk::AccessFlags::TRANSFER_READ,
            ImageLayout::TransferDst => vk::AccessFlags::TRANSFER_WRITE,
            ImageLayout::ShaderReadOnly => {
                vk::AccessFlags::SHADER_READ | vk::AccessFlags::INPUT_ATTACHMENT_READ
            }
            ImageLayout::ColorAttachment => {
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            }
            ImageLayout::DepthStencilAttachment => {
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
            }
            ImageLayout::PresentSrc => vk::AccessFlags::MEMORY_READ,
        }
    }
}

pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::builder()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
        .build()
}

/// Builds the barrier that moves the color subresource of `image` from `old`
/// to `new`.
pub fn layout_barrier(
    image: vk::Image,
    old: ImageLayout,
    new: ImageLayout,
) -> vk::ImageMemoryBarrier {
    vk::ImageMemoryBarrier::builder()
        .old_layout(old.to_vk())
        .new_layout(new.to_vk())
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_subresource_range())
        .src_access_mask(old.src_access_mask())
        .dst_access_mask(new.dst_access_mask())
        .build()
}

/// The recording side of the transfer and transition commands, so the
/// protocols built on it can run against something other than a driver.
pub trait CommandRecorder {
    unsafe fn pipeline_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stages: vk::PipelineStageFlags,
        dst_stages: vk::PipelineStageFlags,
        barrier: &vk::ImageMemoryBarrier,
    );

    unsafe fn copy_image(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Image,
        src_layout: ImageLayout,
        dst: vk::Image,
        dst_layout: ImageLayout,
        region: &vk::ImageCopy,
    );
}

impl CommandRecorder for VulkanDevice {
    unsafe fn pipeline_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stages: vk::PipelineStageFlags,
        dst_stages: vk::PipelineStageFlags,
        barrier: &vk::ImageMemoryBarrier,
    ) {
        self.vk_device.cmd_pipeline_barrier(
            command_buffer,
            src_stages,
            dst_stages,
            vk::DependencyFlags::empty(),
            &[] as &[vk::MemoryBarrier],
            &[] as &[vk::BufferMemoryBarrier],
            &[*barrier],
        );
    }

    unsafe fn copy_image(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Image,
        src_layout: ImageLayout,
        dst: vk::Image,
        dst_layout: ImageLayout,
        region: &vk::ImageCopy,
    ) {
        self.vk_device.cmd_copy_image(
            command_buffer,
            src,
            src_layout.to_vk(),
            dst,
            dst_layout.to_vk(),
            &[*region],
        );
    }
}

/// Records a layout transition of `image` into `command_buffer`.
///
/// Nothing happens until the buffer executes. The caller is responsible for
/// `image` actually being in `old`; see [`TrackedImage`] for the variant that
/// does the bookkeeping.
pub unsafe fn set_image_layout<R: CommandRecorder + ?Sized>(
    recorder: &R,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    old: ImageLayout,
    new: ImageLayout,
    src_stages: vk::PipelineStageFlags,
    dst_stages: vk::PipelineStageFlags,
) {
    let barrier = layout_barrier(image, old, new);
    recorder.pipeline_barrier(command_buffer, src_stages, dst_stages, &barrier);
}

/// An image handle together with the layout it will be in once everything
/// recorded so far has executed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TrackedImage {
    handle: vk::Image,
    layout: ImageLayout,
}

impl TrackedImage {
    pub fn new(handle: vk::Image, layout: ImageLayout) -> Self {
        Self { handle, layout }
    }

    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    pub unsafe fn transition<R: CommandRecorder + ?Sized>(
        &mut self,
        recorder: &R,
        command_buffer: vk::CommandBuffer,
        new: ImageLayout,
        src_stages: vk::PipelineStageFlags,
        dst_stages: vk::PipelineStageFlags,
    ) {
        set_image_layout(
            recorder,
            command_buffer,
            self.handle,
            self.layout,
            new,
            src_stages,
            dst_stages,
        );
        self.layout = new;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;

    use vulkanalia::vk::Handle;

    use super::*;

    #[derive(Clone, Debug)]
    pub(crate) struct RecordedBarrier {
        pub command_buffer: vk::CommandBuffer,
        pub src_stages: vk::PipelineStageFlags,
        pub dst_stages: vk::PipelineStageFlags,
        pub barrier: vk::ImageMemoryBarrier,
    }

    #[derive(Default)]
    pub(crate) struct BarrierLog {
        pub barriers: RefCell<Vec<RecordedBarrier>>,
    }

    impl CommandRecorder for BarrierLog {
        unsafe fn pipeline_barrier(
            &self,
            command_buffer: vk::CommandBuffer,
            src_stages: vk::PipelineStageFlags,
            dst_stages: vk::PipelineStageFlags,
            barrier: &vk::ImageMemoryBarrier,
        ) {
            self.barriers.borrow_mut().push(RecordedBarrier {
                command_buffer,
                src_stages,
                dst_stages,
                barrier: *barrier,
            });
        }

        unsafe fn copy_image(
            &self,
            _: vk::CommandBuffer,
            _: vk::Image,
            _: ImageLayout,
            _: vk::Image,
            _: ImageLayout,
            _: &vk::ImageCopy,
        ) {
            panic!("unexpected copy");
        }
    }

    #[test]
    fn src_access_table() {
        use ImageLayout::*;
        let expected = [
            (ColorAttachment, vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
            (TransferDst, vk::AccessFlags::TRANSFER_WRITE),
            (Preinitialized, vk::AccessFlags::HOST_WRITE),
            (Undefined, vk::AccessFlags::empty()),
            (General, vk::AccessFlags::empty()),
            (TransferSrc, vk::AccessFlags::empty()),
            (ShaderReadOnly, vk::AccessFlags::empty()),
            (DepthStencilAttachment, vk::AccessFlags::empty()),
            (PresentSrc, vk::AccessFlags::empty()),
        ];
        assert_eq!(expected.len(), ImageLayout::ALL.len());
        for (layout, access) in expected {
            assert_eq!(layout.src_access_mask(), access, "{:?}", layout);
        }
    }

    #[test]
    fn dst_access_table() {
        use ImageLayout::*;
        let expected = [
            (TransferDst, vk::AccessFlags::TRANSFER_WRITE),
            (TransferSrc, vk::AccessFlags::TRANSFER_READ),
            (ShaderReadOnly, vk::AccessFlags::SHADER_READ),
            (ColorAttachment, vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
            (DepthStencilAttachment, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE),
            (PresentSrc, vk::AccessFlags::MEMORY_READ),
            (Undefined, vk::AccessFlags::empty()),
            (General, vk::AccessFlags::empty()),
            (Preinitialized, vk::AccessFlags::empty()),
        ];
        assert_eq!(expected.len(), ImageLayout::ALL.len());
        for (layout, access) in expected {
            assert_eq!(layout.dst_access_mask(), access, "{:?}", layout);
        }
    }

    #[test]
    fn barrier_is_deterministic_for_every_pair() {
        let image = vk::Image::from_raw(42);
        for old in ImageLayout::ALL {
            for new in ImageLayout::ALL {
                let a = layout_barrier(image, old, new);
                let b = layout_barrier(image, old, new);
                assert_eq!(a.src_access_mask, b.src_access_mask);
                assert_eq!(a.dst_access_mask, b.dst_access_mask);
                assert_eq!(a.src_access_mask, old.src_access_mask());
                assert_eq!(a.dst_access_mask, new.dst_access_mask());
                assert_eq!(a.old_layout, old.to_vk());
                assert_eq!(a.new_layout, new.to_vk());
                assert_eq!(a.image, image);
                assert_eq!(a.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
                assert_eq!(a.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
                assert_eq!(a.subresource_range.level_count, 1);
                assert_eq!(a.subresource_range.layer_count, 1);
            }
        }
    }

    #[test]
    fn round_trip_stays_within_each_layouts_access_set() {
        for a in ImageLayout::ALL {
            for b in ImageLayout::ALL {
                let forward = layout_barrier(vk::Image::null(), a, b);
                let back = layout_barrier(vk::Image::null(), b, a);
                assert!(a.permitted_accesses().contains(forward.src_access_mask), "{:?}", a);
                assert!(b.permitted_accesses().contains(forward.dst_access_mask), "{:?}", b);
                assert!(b.permitted_accesses().contains(back.src_access_mask), "{:?}", b);
                assert!(a.permitted_accesses().contains(back.dst_access_mask), "{:?}", a);
            }
        }
    }

    #[test]
    fn layouts_map_to_distinct_vulkan_layouts() {
        let mut seen = std::collections::HashSet::new();
        for layout in ImageLayout::ALL {
            assert!(seen.insert(layout.to_vk()), "{:?}", layout);
        }
    }

    #[test]
    fn set_image_layout_records_one_barrier_with_stages() {
        let log = BarrierLog::default();
        let command_buffer = vk::CommandBuffer::from_raw(3);
        unsafe {
            set_image_layout(
                &log,
                command_buffer,
                vk::Image::from_raw(9),
                ImageLayout::TransferDst,
                ImageLayout::ShaderReadOnly,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            );
        }

        let barriers = log.barriers.borrow();
        assert_eq!(barriers.len(), 1);
        let recorded = &barriers[0];
        assert_eq!(recorded.command_buffer, command_buffer);
        assert_eq!(recorded.src_stages, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(recorded.dst_stages, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(recorded.barrier.src_access_mask, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(recorded.barrier.dst_access_mask, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn tracked_image_follows_its_transitions() {
        let log = BarrierLog::default();
        let command_buffer = vk::CommandBuffer::from_raw(1);
        let mut image = TrackedImage::new(vk::Image::from_raw(5), ImageLayout::Undefined);

        unsafe {
            image.transition(
                &log,
                command_buffer,
                ImageLayout::TransferDst,
                vk::PipelineStageFlags::HOST,
                vk::PipelineStageFlags::TRANSFER,
            );
            image.transition(
                &log,
                command_buffer,
                ImageLayout::ShaderReadOnly,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            );
        }

        assert_eq!(image.layout(), ImageLayout::ShaderReadOnly);
        let barriers = log.barriers.borrow();
        assert_eq!(barriers[0].barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barriers[0].barrier.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(barriers[1].barrier.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(barriers[1].barrier.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }
}
