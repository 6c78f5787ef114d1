use std::fmt;

use log::*;
use thiserror::Error;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder, KhrSwapchainExtension};

use super::device::VulkanDevice;

/// The step of the frame protocol a failure came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameStage {
    Acquire,
    ResetFence,
    Submit,
    WaitFence,
    Present,
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameStage::Acquire => "acquire",
            FrameStage::ResetFence => "fence reset",
            FrameStage::Submit => "submit",
            FrameStage::WaitFence => "fence wait",
            FrameStage::Present => "present",
        };
        f.write_str(name)
    }
}

#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The surface changed under the swapchain. Rebuilding it recovers.
    #[error("swapchain is out of date")]
    SwapchainOutOfDate,
    #[error("{stage} timed out")]
    Timeout { stage: FrameStage },
    #[error("device lost during {stage}")]
    DeviceLost { stage: FrameStage },
    #[error("no command buffer recorded for image {image_index} ({count} recorded)")]
    MissingCommandBuffer { image_index: u32, count: usize },
    #[error("{stage} failed: {code}")]
    Vulkan {
        stage: FrameStage,
        code: vk::ErrorCode,
    },
}

impl FrameError {
    fn from_code(stage: FrameStage, code: vk::ErrorCode) -> Self {
        match code {
            vk::ErrorCode::OUT_OF_DATE_KHR => FrameError::SwapchainOutOfDate,
            vk::ErrorCode::DEVICE_LOST => FrameError::DeviceLost { stage },
            code => FrameError::Vulkan { stage, code },
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::SwapchainOutOfDate)
    }
}

/// What a completed frame reports back to the caller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FramePresented {
    pub image_index: u32,
    /// The swapchain still works but no longer matches the surface exactly.
    pub suboptimal: bool,
}

/// What the renderer has to do once a frame has been attempted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    RebuildSwapchain,
}

/// Sorts the result of [`FrameSync::draw_frame`] into the renderer's next
/// step. `resized` is a pending window resize notification. Unrecoverable
/// errors are passed through.
pub fn after_frame(
    result: Result<FramePresented, FrameError>,
    resized: bool,
) -> Result<FrameOutcome, FrameError> {
    match result {
        Ok(presented) if presented.suboptimal || resized => Ok(FrameOutcome::RebuildSwapchain),
        Ok(_) => Ok(FrameOutcome::Presented),
        Err(e) if e.is_recoverable() => Ok(FrameOutcome::RebuildSwapchain),
        Err(e) => Err(e),
    }
}

/// Queue and swapchain operations the frame protocol is built from.
pub trait FrameQueue {
    unsafe fn acquire_next_image(
        &mut self,
        signal: vk::Semaphore,
        timeout: u64,
    ) -> Result<(u32, vk::SuccessCode), vk::ErrorCode>;

    unsafe fn reset_fence(&mut self, fence: vk::Fence) -> Result<(), vk::ErrorCode>;

    unsafe fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<(), vk::ErrorCode>;

    unsafe fn wait_for_fence(
        &mut self,
        fence: vk::Fence,
        timeout: u64,
    ) -> Result<vk::SuccessCode, vk::ErrorCode>;

    unsafe fn present(
        &mut self,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<vk::SuccessCode, vk::ErrorCode>;
}

/// The graphics queue of a device paired with the swapchain it presents to.
pub struct SwapchainQueue<'a> {
    pub device: &'a VulkanDevice,
    pub queue: vk::Queue,
    pub swapchain: vk::SwapchainKHR,
}

impl FrameQueue for SwapchainQueue<'_> {
    unsafe fn acquire_next_image(
        &mut self,
        signal: vk::Semaphore,
        timeout: u64,
    ) -> Result<(u32, vk::SuccessCode), vk::ErrorCode> {
        self.device
            .vk_device
            .acquire_next_image_khr(self.swapchain, timeout, signal, vk::Fence::null())
    }

    unsafe fn reset_fence(&mut self, fence: vk::Fence) -> Result<(), vk::ErrorCode> {
        self.device.vk_device.reset_fences(&[fence])
    }

    unsafe fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<(), vk::ErrorCode> {
        let wait_semaphores = &[wait];
        let wait_stages = &[wait_stage];
        let command_buffers = &[command_buffer];
        let signal_semaphores = &[signal];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(signal_semaphores);

        self.device
            .vk_device
            .queue_submit(self.queue, &[submit_info], fence)
    }

    unsafe fn wait_for_fence(
        &mut self,
        fence: vk::Fence,
        timeout: u64,
    ) -> Result<vk::SuccessCode, vk::ErrorCode> {
        self.device.vk_device.wait_for_fences(&[fence], true, timeout)
    }

    unsafe fn present(
        &mut self,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<vk::SuccessCode, vk::ErrorCode> {
        let wait_semaphores = &[wait];
        let swapchains = &[self.swapchain];
        let image_indices = &[image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(swapchains)
            .image_indices(image_indices);

        self.device
            .vk_device
            .queue_present_khr(self.queue, &present_info)
    }
}

/// One slot of synchronization objects.
#[derive(Copy, Clone, Debug, Default)]
pub struct FrameSlot {
    /// Signaled by the presentation engine when the acquired image may be written.
    pub image_available: vk::Semaphore,
    /// Signaled by the queue when the frame's commands have executed.
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

/// Stores each handle as soon as it exists, so a failed slot can still be
/// released by [`destroy_slot`].
unsafe fn fill_slot(device: &VulkanDevice, slot: &mut FrameSlot) -> Result<(), vk::ErrorCode> {
    let semaphore_info = vk::SemaphoreCreateInfo::builder();
    let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

    slot.image_available = device.vk_device.create_semaphore(&semaphore_info, None)?;
    slot.render_finished = device.vk_device.create_semaphore(&semaphore_info, None)?;
    slot.in_flight = device.vk_device.create_fence(&fence_info, None)?;
    Ok(())
}

/// Null members are skipped by the driver.
unsafe fn destroy_slot(device: &VulkanDevice, slot: FrameSlot) {
    device.vk_device.destroy_fence(slot.in_flight, None);
    device.vk_device.destroy_semaphore(slot.render_finished, None);
    device.vk_device.destroy_semaphore(slot.image_available, None);
}

/// Fence/semaphore slots and the acquire, submit, wait, present sequence
/// run against them.
///
/// With a single slot the host waits for the frame's fence before
/// presenting, so at most one frame of device work is ever outstanding.
/// With more slots a slot's fence is waited on when the slot comes round
/// again, and a per-image table keeps a pre-recorded command buffer from
/// being resubmitted while an older submission of it is still pending.
#[derive(Clone, Debug)]
pub struct FrameSync {
    slots: Vec<FrameSlot>,
    images_in_flight: Vec<vk::Fence>,
    frame: usize,
    acquire_timeout: u64,
    fence_timeout: u64,
}

impl FrameSync {
    pub fn new(
        slots: Vec<FrameSlot>,
        image_count: usize,
        acquire_timeout: u64,
        fence_timeout: u64,
    ) -> Self {
        assert!(!slots.is_empty(), "at least one frame slot is required");
        Self {
            slots,
            images_in_flight: vec![vk::Fence::null(); image_count],
            frame: 0,
            acquire_timeout,
            fence_timeout,
        }
    }

    /// Creates `count` slots. Fences start signaled so the first wait on a
    /// slot returns immediately. On failure nothing created here survives.
    pub unsafe fn create(
        device: &VulkanDevice,
        count: usize,
        image_count: usize,
        acquire_timeout: u64,
        fence_timeout: u64,
    ) -> Result<Self, vk::ErrorCode> {
        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            let mut slot = FrameSlot::default();
            let filled = fill_slot(device, &mut slot);
            slots.push(slot);
            if let Err(code) = filled {
                slots
                    .drain(..)
                    .for_each(|slot| destroy_slot(device, slot));
                return Err(code);
            }
        }
        debug!("Created {} frame slot(s) for {} image(s).", count, image_count);

        Ok(Self::new(slots, image_count, acquire_timeout, fence_timeout))
    }

    pub unsafe fn destroy(&mut self, device: &VulkanDevice) {
        self.slots
            .drain(..)
            .for_each(|slot| destroy_slot(device, slot));
        self.images_in_flight.clear();
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Index of the slot the next frame will use.
    pub fn current_slot(&self) -> usize {
        self.frame
    }

    /// Forgets which images were last rendered by which slot. Needed after
    /// the swapchain has been rebuilt, possibly with a different image count.
    pub fn reset_images(&mut self, image_count: usize) {
        self.images_in_flight.clear();
        self.images_in_flight.resize(image_count, vk::Fence::null());
    }

    unsafe fn wait<Q: FrameQueue>(&self, queue: &mut Q, fence: vk::Fence) -> Result<(), FrameError> {
        match queue.wait_for_fence(fence, self.fence_timeout) {
            Ok(vk::SuccessCode::TIMEOUT) => Err(FrameError::Timeout {
                stage: FrameStage::WaitFence,
            }),
            Ok(_) => Ok(()),
            Err(code) => Err(FrameError::from_code(FrameStage::WaitFence, code)),
        }
    }

    /// Runs the protocol once, submitting `command_buffers[i]` for acquired
    /// image `i`.
    pub unsafe fn draw_frame<Q: FrameQueue>(
        &mut self,
        queue: &mut Q,
        command_buffers: &[vk::CommandBuffer],
    ) -> Result<FramePresented, FrameError> {
        let slot = self.slots[self.frame];
        let pipelined = self.slots.len() > 1;

        if pipelined {
            self.wait(queue, slot.in_flight)?;
        }

        let (image_index, acquired) = match queue
            .acquire_next_image(slot.image_available, self.acquire_timeout)
        {
            Ok((_, vk::SuccessCode::TIMEOUT)) | Ok((_, vk::SuccessCode::NOT_READY)) => {
                return Err(FrameError::Timeout {
                    stage: FrameStage::Acquire,
                })
            }
            Ok(result) => result,
            Err(code) => return Err(FrameError::from_code(FrameStage::Acquire, code)),
        };
        let command_buffer = *command_buffers
            .get(image_index as usize)
            .ok_or(FrameError::MissingCommandBuffer {
                image_index,
                count: command_buffers.len(),
            })?;

        if pipelined {
            let previous = self.images_in_flight[image_index as usize];
            if !previous.is_null() && previous != slot.in_flight {
                self.wait(queue, previous)?;
            }
            self.images_in_flight[image_index as usize] = slot.in_flight;
        }

        queue
            .reset_fence(slot.in_flight)
            .map_err(|code| FrameError::from_code(FrameStage::ResetFence, code))?;

        queue
            .submit(
                command_buffer,
                slot.image_available,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                slot.render_finished,
                slot.in_flight,
            )
            .map_err(|code| FrameError::from_code(FrameStage::Submit, code))?;

        if !pipelined {
            self.wait(queue, slot.in_flight)?;
        }

        let presented = queue
            .present(image_index, slot.render_finished)
            .map_err(|code| FrameError::from_code(FrameStage::Present, code))?;

        self.frame = (self.frame + 1) % self.slots.len();

        let suboptimal = acquired == vk::SuccessCode::SUBOPTIMAL_KHR
            || presented == vk::SuccessCode::SUBOPTIMAL_KHR;

        Ok(FramePresented {
            image_index,
            suboptimal,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet, VecDeque};

    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Acquire(vk::Semaphore),
        Reset(vk::Fence),
        Submit {
            command_buffer: vk::CommandBuffer,
            wait: vk::Semaphore,
            wait_stage: vk::PipelineStageFlags,
            signal: vk::Semaphore,
            fence: vk::Fence,
        },
        Wait(vk::Fence),
        Present { image_index: u32, wait: vk::Semaphore },
    }

    /// Simulates a FIFO swapchain on a queue that completes work when its
    /// fence is waited on.
    struct FakeQueue {
        image_count: u32,
        next_image: u32,
        calls: Vec<Call>,
        signaled: HashSet<vk::Fence>,
        pending: HashMap<vk::Fence, vk::CommandBuffer>,
        acquire_results: VecDeque<Result<vk::SuccessCode, vk::ErrorCode>>,
        present_results: VecDeque<Result<vk::SuccessCode, vk::ErrorCode>>,
        wait_result: Option<Result<vk::SuccessCode, vk::ErrorCode>>,
        presented_while_executing: bool,
    }

    impl FakeQueue {
        fn new(image_count: u32, fences: &[vk::Fence]) -> Self {
            Self {
                image_count,
                next_image: 0,
                calls: Vec::new(),
                signaled: fences.iter().copied().collect(),
                pending: HashMap::new(),
                acquire_results: VecDeque::new(),
                present_results: VecDeque::new(),
                wait_result: None,
                presented_while_executing: false,
            }
        }

        fn presented_indices(&self) -> Vec<u32> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Present { image_index, .. } => Some(*image_index),
                    _ => None,
                })
                .collect()
        }
    }

    impl FrameQueue for FakeQueue {
        unsafe fn acquire_next_image(
            &mut self,
            signal: vk::Semaphore,
            _timeout: u64,
        ) -> Result<(u32, vk::SuccessCode), vk::ErrorCode> {
            self.calls.push(Call::Acquire(signal));
            let code = self
                .acquire_results
                .pop_front()
                .unwrap_or(Ok(vk::SuccessCode::SUCCESS))?;
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok((index, code))
        }

        unsafe fn reset_fence(&mut self, fence: vk::Fence) -> Result<(), vk::ErrorCode> {
            assert!(!self.pending.contains_key(&fence), "fence reset while its work is in flight");
            self.calls.push(Call::Reset(fence));
            self.signaled.remove(&fence);
            Ok(())
        }

        unsafe fn submit(
            &mut self,
            command_buffer: vk::CommandBuffer,
            wait: vk::Semaphore,
            wait_stage: vk::PipelineStageFlags,
            signal: vk::Semaphore,
            fence: vk::Fence,
        ) -> Result<(), vk::ErrorCode> {
            assert!(!self.signaled.contains(&fence), "submitted with a signaled fence");
            self.pending.insert(fence, command_buffer);
            self.calls.push(Call::Submit {
                command_buffer,
                wait,
                wait_stage,
                signal,
                fence,
            });
            Ok(())
        }

        unsafe fn wait_for_fence(
            &mut self,
            fence: vk::Fence,
            _timeout: u64,
        ) -> Result<vk::SuccessCode, vk::ErrorCode> {
            self.calls.push(Call::Wait(fence));
            if let Some(result) = self.wait_result {
                return result;
            }
            self.pending.remove(&fence);
            self.signaled.insert(fence);
            Ok(vk::SuccessCode::SUCCESS)
        }

        unsafe fn present(
            &mut self,
            image_index: u32,
            wait: vk::Semaphore,
        ) -> Result<vk::SuccessCode, vk::ErrorCode> {
            if !self.pending.is_empty() {
                self.presented_while_executing = true;
            }
            self.calls.push(Call::Present { image_index, wait });
            self.present_results
                .pop_front()
                .unwrap_or(Ok(vk::SuccessCode::SUCCESS))
        }
    }

    fn slot(base: u64) -> FrameSlot {
        FrameSlot {
            image_available: vk::Semaphore::from_raw(base),
            render_finished: vk::Semaphore::from_raw(base + 1),
            in_flight: vk::Fence::from_raw(base + 2),
        }
    }

    fn command_buffers(count: usize) -> Vec<vk::CommandBuffer> {
        (0..count).map(|i| vk::CommandBuffer::from_raw(100 + i)).collect()
    }

    #[test]
    fn single_slot_runs_steps_in_protocol_order() {
        let slot = slot(1);
        let buffers = command_buffers(2);
        let mut sync = FrameSync::new(vec![slot], 2, u64::MAX, u64::MAX);
        let mut queue = FakeQueue::new(2, &[slot.in_flight]);

        let presented = unsafe { sync.draw_frame(&mut queue, &buffers) }.unwrap();

        assert_eq!(presented, FramePresented { image_index: 0, suboptimal: false });
        assert_eq!(
            queue.calls,
            vec![
                Call::Acquire(slot.image_available),
                Call::Reset(slot.in_flight),
                Call::Submit {
                    command_buffer: buffers[0],
                    wait: slot.image_available,
                    wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    signal: slot.render_finished,
                    fence: slot.in_flight,
                },
                Call::Wait(slot.in_flight),
                Call::Present { image_index: 0, wait: slot.render_finished },
            ]
        );
    }

    #[test]
    fn fence_is_signaled_and_nothing_executes_after_each_frame() {
        let slot = slot(1);
        let buffers = command_buffers(3);
        let mut sync = FrameSync::new(vec![slot], 3, u64::MAX, u64::MAX);
        let mut queue = FakeQueue::new(3, &[slot.in_flight]);

        for _ in 0..5 {
            unsafe { sync.draw_frame(&mut queue, &buffers) }.unwrap();
            assert!(queue.signaled.contains(&slot.in_flight));
            assert!(queue.pending.is_empty());
        }
        assert!(!queue.presented_while_executing);
    }

    #[test]
    fn two_images_alternate_and_never_present_unfinished_work() {
        let slot = slot(1);
        let buffers = command_buffers(2);
        let mut sync = FrameSync::new(vec![slot], 2, u64::MAX, u64::MAX);
        let mut queue = FakeQueue::new(2, &[slot.in_flight]);

        let indices = (0..3)
            .map(|_| unsafe { sync.draw_frame(&mut queue, &buffers) }.unwrap().image_index)
            .collect::<Vec<_>>();

        assert_eq!(indices, vec![0, 1, 0]);
        assert_eq!(queue.presented_indices(), vec![0, 1, 0]);
        assert!(!queue.presented_while_executing);

        // Every present is preceded by the completion wait of its own submission.
        for (i, call) in queue.calls.iter().enumerate() {
            if let Call::Present { .. } = call {
                assert_eq!(queue.calls[i - 1], Call::Wait(slot.in_flight));
                assert!(matches!(queue.calls[i - 2], Call::Submit { .. }));
            }
        }
    }

    #[test]
    fn submitted_buffer_matches_acquired_index() {
        let slot = slot(1);
        let buffers = command_buffers(3);
        let mut sync = FrameSync::new(vec![slot], 3, u64::MAX, u64::MAX);
        let mut queue = FakeQueue::new(3, &[slot.in_flight]);

        for _ in 0..7 {
            let presented = unsafe { sync.draw_frame(&mut queue, &buffers) }.unwrap();
            let submitted = queue
                .calls
                .iter()
                .rev()
                .find_map(|c| match c {
                    Call::Submit { command_buffer, .. } => Some(*command_buffer),
                    _ => None,
                })
                .unwrap();
            assert_eq!(submitted, buffers[presented.image_index as usize]);
        }
    }

    #[test]
    fn out_of_date_acquire_is_recoverable_and_submits_nothing() {
        let slot = slot(1);
        let buffers = command_buffers(2);
        let mut sync = FrameSync::new(vec![slot], 2, u64::MAX, u64::MAX);
        let mut queue = FakeQueue::new(2, &[slot.in_flight]);
        queue.acquire_results.push_back(Err(vk::ErrorCode::OUT_OF_DATE_KHR));

        let err = unsafe { sync.draw_frame(&mut queue, &buffers) }.unwrap_err();

        assert_eq!(err, FrameError::SwapchainOutOfDate);
        assert!(err.is_recoverable());
        assert_eq!(queue.calls, vec![Call::Acquire(slot.image_available)]);
        // The fence was never reset, so the next frame can proceed.
        assert!(queue.signaled.contains(&slot.in_flight));
    }

    #[test]
    fn out_of_date_present_is_recoverable() {
        let slot = slot(1);
        let buffers = command_buffers(2);
        let mut sync = FrameSync::new(vec![slot], 2, u64::MAX, u64::MAX);
        let mut queue = FakeQueue::new(2, &[slot.in_flight]);
        queue.present_results.push_back(Err(vk::ErrorCode::OUT_OF_DATE_KHR));

        let err = unsafe { sync.draw_frame(&mut queue, &buffers) }.unwrap_err();
        assert_eq!(err, FrameError::SwapchainOutOfDate);
        assert!(queue.pending.is_empty());
    }

    #[test]
    fn suboptimal_is_reported_but_presented() {
        let slot = slot(1);
        let buffers = command_buffers(2);
        let mut sync = FrameSync::new(vec![slot], 2, u64::MAX, u64::MAX);
        let mut queue = FakeQueue::new(2, &[slot.in_flight]);
        queue.acquire_results.push_back(Ok(vk::SuccessCode::SUBOPTIMAL_KHR));

        let presented = unsafe { sync.draw_frame(&mut queue, &buffers) }.unwrap();
        assert!(presented.suboptimal);
        assert_eq!(queue.presented_indices(), vec![0]);
    }

    #[test]
    fn device_loss_and_timeouts_are_fatal() {
        let slot = slot(1);
        let buffers = command_buffers(2);

        let mut sync = FrameSync::new(vec![slot], 2, u64::MAX, 1_000);
        let mut queue = FakeQueue::new(2, &[slot.in_flight]);
        queue.wait_result = Some(Ok(vk::SuccessCode::TIMEOUT));
        let err = unsafe { sync.draw_frame(&mut queue, &buffers) }.unwrap_err();
        assert_eq!(err, FrameError::Timeout { stage: FrameStage::WaitFence });
        assert!(!err.is_recoverable());
        assert!(queue.presented_indices().is_empty());

        let mut queue = FakeQueue::new(2, &[slot.in_flight]);
        queue.acquire_results.push_back(Err(vk::ErrorCode::DEVICE_LOST));
        let err = unsafe { sync.draw_frame(&mut queue, &buffers) }.unwrap_err();
        assert_eq!(err, FrameError::DeviceLost { stage: FrameStage::Acquire });
        assert!(!err.is_recoverable());
    }

    #[test]
    fn two_slots_rotate_and_wait_before_reuse() {
        let slots = vec![slot(1), slot(10)];
        let buffers = command_buffers(3);
        let mut sync = FrameSync::new(slots.clone(), 3, u64::MAX, u64::MAX);
        let mut queue = FakeQueue::new(3, &[slots[0].in_flight, slots[1].in_flight]);

        for frame in 0..4 {
            assert_eq!(sync.current_slot(), frame % 2);
            unsafe { sync.draw_frame(&mut queue, &buffers) }.unwrap();
        }

        // Each frame starts by waiting on its own slot's fence, and only
        // resets it after that wait.
        let mut frame = 0;
        for (i, call) in queue.calls.iter().enumerate() {
            if let Call::Reset(fence) = call {
                let expected = slots[frame % 2].in_flight;
                assert_eq!(*fence, expected);
                assert!(queue.calls[..i].contains(&Call::Wait(expected)));
                frame += 1;
            }
        }
        assert_eq!(frame, 4);
        assert_eq!(queue.presented_indices(), vec![0, 1, 2, 0]);
    }

    #[test]
    fn reacquired_image_waits_for_the_slot_that_last_used_it() {
        let slots = vec![slot(1), slot(10)];
        let buffers = command_buffers(1);
        let mut sync = FrameSync::new(slots.clone(), 1, u64::MAX, u64::MAX);
        let mut queue = FakeQueue::new(1, &[slots[0].in_flight, slots[1].in_flight]);

        unsafe { sync.draw_frame(&mut queue, &buffers) }.unwrap();
        queue.calls.clear();
        unsafe { sync.draw_frame(&mut queue, &buffers) }.unwrap();

        // Image 0 was last submitted with slot 0's fence.
        assert_eq!(queue.calls[0], Call::Wait(slots[1].in_flight));
        assert_eq!(queue.calls[1], Call::Acquire(slots[1].image_available));
        assert_eq!(queue.calls[2], Call::Wait(slots[0].in_flight));
    }

    #[test]
    fn short_command_buffer_list_is_an_error() {
        let slot = slot(1);
        let mut sync = FrameSync::new(vec![slot], 2, u64::MAX, u64::MAX);
        let mut queue = FakeQueue::new(2, &[slot.in_flight]);
        queue.next_image = 1;

        let err = unsafe { sync.draw_frame(&mut queue, &command_buffers(1)) }.unwrap_err();
        assert_eq!(err, FrameError::MissingCommandBuffer { image_index: 1, count: 1 });
        assert!(!queue.calls.iter().any(|c| matches!(c, Call::Submit { .. })));
    }

    #[test]
    fn reset_images_clears_the_image_table() {
        let mut sync = FrameSync::new(vec![slot(1), slot(10)], 2, u64::MAX, u64::MAX);
        sync.images_in_flight[1] = vk::Fence::from_raw(3);
        sync.reset_images(4);
        assert_eq!(sync.images_in_flight, vec![vk::Fence::null(); 4]);
    }

    fn presented(suboptimal: bool) -> Result<FramePresented, FrameError> {
        Ok(FramePresented {
            image_index: 0,
            suboptimal,
        })
    }

    #[test]
    fn clean_frame_needs_nothing_more() {
        assert_eq!(after_frame(presented(false), false), Ok(FrameOutcome::Presented));
    }

    #[test]
    fn suboptimal_or_resized_frames_rebuild_the_swapchain() {
        assert_eq!(
            after_frame(presented(true), false),
            Ok(FrameOutcome::RebuildSwapchain)
        );
        assert_eq!(
            after_frame(presented(false), true),
            Ok(FrameOutcome::RebuildSwapchain)
        );
    }

    #[test]
    fn out_of_date_rebuilds_instead_of_failing() {
        assert_eq!(
            after_frame(Err(FrameError::SwapchainOutOfDate), false),
            Ok(FrameOutcome::RebuildSwapchain)
        );
    }

    #[test]
    fn fatal_frame_errors_propagate_even_when_resized() {
        let lost = FrameError::DeviceLost {
            stage: FrameStage::Submit,
        };
        assert_eq!(after_frame(Err(lost), true), Err(lost));

        let timeout = FrameError::Timeout {
            stage: FrameStage::WaitFence,
        };
        assert_eq!(after_frame(Err(timeout), false), Err(timeout));
    }

    #[test]
    fn out_of_date_acquire_leads_to_a_rebuild() {
        let slot = slot(1);
        let buffers = command_buffers(2);
        let mut sync = FrameSync::new(vec![slot], 2, u64::MAX, u64::MAX);
        let mut queue = FakeQueue::new(2, &[slot.in_flight]);
        queue.acquire_results.push_back(Err(vk::ErrorCode::OUT_OF_DATE_KHR));

        let result = unsafe { sync.draw_frame(&mut queue, &buffers) };
        assert_eq!(after_frame(result, false), Ok(FrameOutcome::RebuildSwapchain));
    }
}
