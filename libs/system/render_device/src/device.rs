//! Two logical queues (graphics, compute) progressing independently, each
//! tracked by its own monotonic fence.

use tracing::{trace, warn};

use crate::command_list::CommandList;
use crate::error::RenderDeviceError;
use crate::fence::FenceValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Graphics,
    Compute,
}

enum QueueSink {
    Null,
    Wgpu(wgpu::Queue),
}

struct QueueState {
    sink: QueueSink,
    next_fence: u64,
    last_signaled: FenceValue,
}

impl QueueState {
    fn null() -> Self {
        Self { sink: QueueSink::Null, next_fence: 1, last_signaled: FenceValue::NONE }
    }

    fn wgpu(queue: wgpu::Queue) -> Self {
        Self { sink: QueueSink::Wgpu(queue), next_fence: 1, last_signaled: FenceValue::NONE }
    }
}

/// Wraps a real `wgpu::Device` with two logical queues multiplexed onto the
/// physical queues handed to [`Device::new_wgpu`]. A single physical queue
/// already executes submissions in program order, so a cross-queue wait in
/// this backend never blocks the host; it exists as a bookkeeping seam a
/// future multi-physical-queue backend can turn into a real GPU wait.
///
/// [`Device::new_null`] builds a device with no backing `wgpu::Device` at
/// all, for render-graph scheduling tests that never touch a GPU.
pub struct Device {
    wgpu_device: Option<wgpu::Device>,
    graphics: QueueState,
    compute: QueueState,
}

impl Device {
    pub fn new_null() -> Self {
        Self { wgpu_device: None, graphics: QueueState::null(), compute: QueueState::null() }
    }

    pub fn new_wgpu(wgpu_device: wgpu::Device, graphics_queue: wgpu::Queue, compute_queue: wgpu::Queue) -> Self {
        Self { wgpu_device: Some(wgpu_device), graphics: QueueState::wgpu(graphics_queue), compute: QueueState::wgpu(compute_queue) }
    }

    pub fn wgpu_device(&self) -> Option<&wgpu::Device> {
        self.wgpu_device.as_ref()
    }

    fn queue_state(&self, kind: QueueKind) -> &QueueState {
        match kind {
            QueueKind::Graphics => &self.graphics,
            QueueKind::Compute => &self.compute,
        }
    }

    fn queue_state_mut(&mut self, kind: QueueKind) -> &mut QueueState {
        match kind {
            QueueKind::Graphics => &mut self.graphics,
            QueueKind::Compute => &mut self.compute,
        }
    }

    pub fn open_command_list(&self, kind: QueueKind, label: &str) -> CommandList {
        match &self.wgpu_device {
            Some(device) => CommandList::wgpu(kind, device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })),
            None => CommandList::null(kind),
        }
    }

    pub fn last_signaled(&self, kind: QueueKind) -> FenceValue {
        self.queue_state(kind).last_signaled
    }

    /// Finish and submit one queue's accumulated command lists as a single
    /// batch, returning the fence value marking their completion. Every list
    /// must have been opened for `kind`.
    pub fn submit(&mut self, kind: QueueKind, lists: Vec<CommandList>) -> Result<FenceValue, RenderDeviceError> {
        for list in &lists {
            if list.queue_kind() != kind {
                return Err(RenderDeviceError::QueueMismatch { expected: kind, actual: list.queue_kind() });
            }
        }
        if lists.is_empty() {
            return Ok(self.queue_state(kind).last_signaled);
        }

        let state = self.queue_state_mut(kind);
        if let QueueSink::Wgpu(queue) = &state.sink {
            let buffers: Vec<wgpu::CommandBuffer> = lists.into_iter().filter_map(CommandList::finish).collect();
            queue.submit(buffers);
        }

        let fence = FenceValue::from_raw(state.next_fence);
        if fence.is_none() {
            return Err(RenderDeviceError::NoFenceValue(kind));
        }
        state.next_fence += 1;
        state.last_signaled = fence;
        trace!(?kind, fence = fence.raw(), "submitted command list batch");
        Ok(fence)
    }

    /// Assert that `source` has signaled at least `fence` before `waiting`
    /// proceeds. See the struct docs for why this never blocks the host in
    /// the single-physical-queue backend.
    pub fn queue_wait_for_cmdlist(&self, waiting: QueueKind, source: QueueKind, fence: FenceValue) {
        let signaled = self.queue_state(source).last_signaled;
        if signaled < fence {
            warn!(?waiting, ?source, requested = fence.raw(), signaled = signaled.raw(), "cross-queue wait requested for a fence not yet signaled");
        }
    }

    pub fn wait_for_idle(&self) {
        if let Some(device) = &self.wgpu_device {
            device.poll(wgpu::Maintain::Wait);
        }
    }

    /// Reclaims transient per-frame resources. wgpu resources free
    /// themselves on drop, so there is nothing to walk yet; kept as the seam
    /// the main-frame loop calls after every submit batch (Section 4.4).
    pub fn collect_garbage(&mut self) {}
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fence_values_increase_monotonically_per_queue() {
        let mut device = Device::new_null();
        let a = device.submit(QueueKind::Graphics, vec![device.open_command_list(QueueKind::Graphics, "a")]).unwrap();
        let b = device.submit(QueueKind::Graphics, vec![device.open_command_list(QueueKind::Graphics, "b")]).unwrap();
        assert!(b > a);
    }

    #[test]
    fn queues_track_independent_fences() {
        let mut device = Device::new_null();
        device.submit(QueueKind::Graphics, vec![device.open_command_list(QueueKind::Graphics, "a")]).unwrap();
        let compute_fence = device.submit(QueueKind::Compute, vec![device.open_command_list(QueueKind::Compute, "b")]).unwrap();
        assert_eq!(device.last_signaled(QueueKind::Compute), compute_fence);
        assert_ne!(device.last_signaled(QueueKind::Graphics), FenceValue::NONE);
    }

    #[test]
    fn submitting_a_list_on_the_wrong_queue_is_an_error() {
        let mut device = Device::new_null();
        let list = device.open_command_list(QueueKind::Compute, "wrong-queue");
        let result = device.submit(QueueKind::Graphics, vec![list]);
        assert!(matches!(result, Err(RenderDeviceError::QueueMismatch { expected: QueueKind::Graphics, actual: QueueKind::Compute })));
    }

    #[test]
    fn submitting_an_empty_batch_returns_the_previous_fence() {
        let mut device = Device::new_null();
        let first = device.submit(QueueKind::Graphics, vec![device.open_command_list(QueueKind::Graphics, "a")]).unwrap();
        let unchanged = device.submit(QueueKind::Graphics, vec![]).unwrap();
        assert_eq!(first, unchanged);
    }
}
