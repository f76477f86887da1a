use thiserror::Error;

use crate::device::QueueKind;

#[derive(Debug, Error)]
pub enum RenderDeviceError {
    #[error("submit on the {0:?} queue returned no fence value")]
    NoFenceValue(QueueKind),

    #[error("command list recorded for the {expected:?} queue was submitted to the {actual:?} queue")]
    QueueMismatch { expected: QueueKind, actual: QueueKind },
}
