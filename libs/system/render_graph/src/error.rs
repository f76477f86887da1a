use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderGraphError {
    #[error("render graph has a cycle: only {ordered} of {total} passes could be topologically ordered")]
    Cycle { ordered: usize, total: usize },

    #[error("resource cache has no entry named {0:?}")]
    MissingResource(String),

    #[error("pass {pass_id:?} failed during {stage}: {source}")]
    PassFailed { pass_id: crate::pass::PassId, stage: &'static str, source: anyhow::Error },

    #[error(transparent)]
    Device(#[from] render_device::RenderDeviceError),
}
