//! One recorded, not-yet-submitted unit of GPU work for a single queue.

use crate::device::QueueKind;

enum Body {
    Null,
    Wgpu(wgpu::CommandEncoder),
}

/// A command list opened against one [`QueueKind`]. Passes record into it
/// through [`CommandList::encoder_mut`]; the render graph only opens,
/// hands it to a pass's `execute`, and submits.
pub struct CommandList {
    queue_kind: QueueKind,
    body: Body,
}

impl CommandList {
    pub(crate) fn null(queue_kind: QueueKind) -> Self {
        Self { queue_kind, body: Body::Null }
    }

    pub(crate) fn wgpu(queue_kind: QueueKind, encoder: wgpu::CommandEncoder) -> Self {
        Self { queue_kind, body: Body::Wgpu(encoder) }
    }

    pub fn queue_kind(&self) -> QueueKind {
        self.queue_kind
    }

    /// `None` for a command list opened against a null [`crate::Device`] —
    /// there is no encoder to record into.
    pub fn encoder_mut(&mut self) -> Option<&mut wgpu::CommandEncoder> {
        match &mut self.body {
            Body::Wgpu(encoder) => Some(encoder),
            Body::Null => None,
        }
    }

    pub(crate) fn finish(self) -> Option<wgpu::CommandBuffer> {
        match self.body {
            Body::Wgpu(encoder) => Some(encoder.finish()),
            Body::Null => None,
        }
    }
}
