//! The render-pass trait and the handles that identify a registered pass.

use render_device::{CommandList, Device, QueueKind};

use crate::resource_cache::ResourceCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassType {
    Graphics,
    Compute,
}

impl From<PassType> for QueueKind {
    fn from(pass_type: PassType) -> Self {
        match pass_type {
            PassType::Graphics => QueueKind::Graphics,
            PassType::Compute => QueueKind::Compute,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassPhase {
    Precompute,
    Main,
}

#[derive(Debug, Clone, Copy)]
pub struct PassKind {
    pub pass_type: PassType,
    pub phase: PassPhase,
    /// A precompute pass flagged `immediately` resubmits its command list
    /// every frame instead of running once and being excluded.
    pub immediately: bool,
}

/// One node's fixed operation triple (Section 9's "render-pass
/// polymorphism"): `compile` runs once per `RenderGraph::compile`,
/// `execute` records into the pass's allocated command list, `finish_pass`
/// releases transient CPU-side state after submission.
pub trait RenderPass: Send + Sync {
    fn kind(&self) -> PassKind;

    fn compile(&self, device: &Device, cache: &mut ResourceCache) -> anyhow::Result<()>;

    fn execute(&self, cmdlist: &mut CommandList, cache: &ResourceCache) -> anyhow::Result<()>;

    fn finish_pass(&self, cache: &mut ResourceCache) -> anyhow::Result<()>;
}

/// A registered pass's identity: which cohort it was registered into
/// (precompute or main) and its index within that cohort's pass array.
/// Edges between ids from different cohorts are not meaningful and are
/// dropped (Section 9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassId {
    pub(crate) phase: PassPhase,
    pub(crate) index: usize,
}
