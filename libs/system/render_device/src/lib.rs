//! Logical Device/Queue/Fence/CommandList layer the render graph schedules
//! against: two independently progressing queues (graphics, compute), each
//! with its own monotonic fence, atop either a real `wgpu::Device` or a
//! null backend for scheduling tests that never touch a GPU.

pub mod command_list;
pub mod device;
pub mod error;
pub mod fence;

pub use command_list::CommandList;
pub use device::{Device, QueueKind};
pub use error::RenderDeviceError;
pub use fence::FenceValue;
