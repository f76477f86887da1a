//! The render-pass DAG: registration, topological ordering, compile,
//! precompute-once execution, and main-frame batched submission with
//! cross-queue fence waits.

use std::sync::Arc;

use render_device::{CommandList, Device, FenceValue, QueueKind};
use tracing::{info_span, warn};

use crate::async_type::AsyncType;
use crate::error::RenderGraphError;
use crate::pass::{PassId, PassKind, PassPhase, PassType, RenderPass};
use crate::resource_cache::ResourceCache;

struct PassNode {
    pass: Arc<dyn RenderPass>,
    predecessors: Vec<usize>,
    successors: Vec<usize>,
    excluded: bool,
    async_type: AsyncType,
    command_list: Option<CommandList>,
}

impl PassNode {
    fn new(pass: Arc<dyn RenderPass>) -> Self {
        Self { pass, predecessors: Vec::new(), successors: Vec::new(), excluded: false, async_type: AsyncType::empty(), command_list: None }
    }
}

/// A DAG of render passes split into a precompute cohort (run to completion
/// once, before the main loop begins) and a main cohort (run every frame,
/// scheduled across the graphics and compute queues).
#[derive(Default)]
pub struct RenderGraph {
    precompute: Vec<PassNode>,
    main: Vec<PassNode>,
    compiled: bool,
}

fn cohort_mut(graph: &mut RenderGraph, phase: PassPhase) -> &mut Vec<PassNode> {
    match phase {
        PassPhase::Precompute => &mut graph.precompute,
        PassPhase::Main => &mut graph.main,
    }
}

fn cohort(graph: &RenderGraph, phase: PassPhase) -> &Vec<PassNode> {
    match phase {
        PassPhase::Precompute => &graph.precompute,
        PassPhase::Main => &graph.main,
    }
}

impl RenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pass, returning the handle used to declare edges and
    /// (after `compile`) to reason about its position in the schedule.
    /// Precompute-typed and main-typed passes are kept in separate cohorts
    /// with independent index spaces.
    pub fn add_pass(&mut self, pass: Arc<dyn RenderPass>) -> PassId {
        let phase = pass.kind().phase;
        let nodes = cohort_mut(self, phase);
        let index = nodes.len();
        nodes.push(PassNode::new(pass));
        self.compiled = false;
        PassId { phase, index }
    }

    /// `a` runs before `b`. Edges crossing cohorts (precompute vs. main) are
    /// not meaningful here and are dropped with a warning rather than
    /// panicking or corrupting the topological sort.
    pub fn precede(&mut self, a: PassId, b: PassId) {
        if a.phase != b.phase {
            warn!(?a, ?b, "dropped precede edge between passes in different cohorts");
            return;
        }
        cohort_mut(self, a.phase)[a.index].successors.push(b.index);
        cohort_mut(self, a.phase)[b.index].predecessors.push(a.index);
        self.compiled = false;
    }

    /// `a` runs after `b` — equivalent to `b.precede(a)`.
    pub fn succeed(&mut self, a: PassId, b: PassId) {
        self.precede(b, a);
    }

    fn topological_order(nodes: &[PassNode]) -> Result<Vec<usize>, RenderGraphError> {
        let mut in_degree: Vec<usize> = nodes.iter().map(|n| n.predecessors.len()).collect();
        let mut queue: std::collections::VecDeque<usize> = in_degree.iter().enumerate().filter(|&(_, &d)| d == 0).map(|(i, _)| i).collect();
        let mut order = Vec::with_capacity(nodes.len());

        while let Some(i) = queue.pop_front() {
            order.push(i);
            for &succ in &nodes[i].successors {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    queue.push_back(succ);
                }
            }
        }

        if order.len() != nodes.len() {
            return Err(RenderGraphError::Cycle { ordered: order.len(), total: nodes.len() });
        }
        Ok(order)
    }

    fn reorder_cohort(nodes: Vec<PassNode>, order: &[usize]) -> Vec<PassNode> {
        let mut new_position = vec![0usize; nodes.len()];
        for (new_pos, &old_pos) in order.iter().enumerate() {
            new_position[old_pos] = new_pos;
        }

        let mut by_old_index: Vec<Option<PassNode>> = nodes.into_iter().map(Some).collect();
        order
            .iter()
            .map(|&old_pos| {
                let mut node = by_old_index[old_pos].take().expect("each old index visited once");
                node.predecessors = node.predecessors.iter().map(|&p| new_position[p]).collect();
                node.successors = node.successors.iter().map(|&s| new_position[s]).collect();
                node
            })
            .collect()
    }

    fn assign_async_types(nodes: &mut [PassNode]) -> Result<(), RenderGraphError> {
        let pass_types: Vec<PassType> = nodes.iter().map(|n| n.pass.kind().pass_type).collect();
        for (i, node) in nodes.iter_mut().enumerate() {
            let this_type = pass_types[i];
            let mut async_type = AsyncType::empty();
            if node.predecessors.iter().any(|&p| pass_types[p] != this_type) {
                async_type |= AsyncType::WAIT;
            }
            if node.successors.iter().any(|&s| pass_types[s] != this_type) {
                async_type |= AsyncType::SIGNAL;
            }
            node.async_type = async_type;
        }
        Ok(())
    }

    /// Topologically order both cohorts, invoke every pass's `compile`,
    /// allocate its command list, and compute its `async_type`.
    pub fn compile(&mut self, device: &Device, cache: &mut ResourceCache) -> Result<(), RenderGraphError> {
        let span = info_span!("render_graph_compile");
        let _enter = span.enter();

        let precompute_order = Self::topological_order(&self.precompute)?;
        self.precompute = Self::reorder_cohort(std::mem::take(&mut self.precompute), &precompute_order);

        let main_order = Self::topological_order(&self.main)?;
        self.main = Self::reorder_cohort(std::mem::take(&mut self.main), &main_order);

        for (index, node) in self.precompute.iter_mut().enumerate() {
            let pass_id = PassId { phase: PassPhase::Precompute, index };
            node.pass.compile(device, cache).map_err(|source| RenderGraphError::PassFailed { pass_id, stage: "compile", source })?;
            node.command_list = Some(device.open_command_list(QueueKind::Graphics, "precompute"));
        }

        for (index, node) in self.main.iter_mut().enumerate() {
            let pass_id = PassId { phase: PassPhase::Main, index };
            node.pass.compile(device, cache).map_err(|source| RenderGraphError::PassFailed { pass_id, stage: "compile", source })?;
            let queue_kind: QueueKind = match node.pass.kind().pass_type {
                PassType::Graphics => QueueKind::Graphics,
                PassType::Compute => QueueKind::Compute,
            };
            node.command_list = Some(device.open_command_list(queue_kind, "main"));
        }
        Self::assign_async_types(&mut self.main)?;

        self.compiled = true;
        Ok(())
    }

    /// Run every not-yet-excluded precompute pass to completion on the
    /// graphics queue, then mark it excluded unless flagged `immediately`.
    /// Safe to call every frame: already-excluded passes are skipped.
    pub fn run_precompute(&mut self, device: &mut Device, cache: &mut ResourceCache) -> Result<(), RenderGraphError> {
        let mut batch = Vec::new();
        for (index, node) in self.precompute.iter_mut().enumerate().filter(|(_, n)| !n.excluded) {
            let pass_id = PassId { phase: PassPhase::Precompute, index };
            let mut command_list = node.command_list.take().expect("precompute pass command list allocated at compile time");
            node.pass.execute(&mut command_list, cache).map_err(|source| RenderGraphError::PassFailed { pass_id, stage: "execute", source })?;
            batch.push(command_list);
        }
        if !batch.is_empty() {
            device.submit(QueueKind::Graphics, batch)?;
            device.wait_for_idle();
        }

        for (index, node) in self.precompute.iter_mut().enumerate().filter(|(_, n)| !n.excluded) {
            let pass_id = PassId { phase: PassPhase::Precompute, index };
            node.pass.finish_pass(cache).map_err(|source| RenderGraphError::PassFailed { pass_id, stage: "finish_pass", source })?;
            if node.pass.kind().immediately {
                node.command_list = Some(device.open_command_list(QueueKind::Graphics, "precompute-immediately"));
            } else {
                node.excluded = true;
            }
        }
        Ok(())
    }

    /// One main-frame submission: execute every pass in topological order,
    /// batching consecutive same-queue command lists and inserting a
    /// cross-queue wait wherever `async_type` demands it, then wait idle,
    /// collect garbage, and invoke `present`.
    pub fn execute(&mut self, device: &mut Device, cache: &mut ResourceCache, present: impl FnOnce()) -> Result<(), RenderGraphError> {
        let span = info_span!("render_graph_execute", frame = cache.frame_index());
        let _enter = span.enter();

        let mut graphics_batch: Vec<CommandList> = Vec::new();
        let mut compute_batch: Vec<CommandList> = Vec::new();
        let mut graphics_signal = FenceValue::NONE;
        let mut compute_signal = FenceValue::NONE;

        for index in 0..self.main.len() {
            let pass_id = PassId { phase: PassPhase::Main, index };
            let pass_type = self.main[index].pass.kind().pass_type;
            let async_type = self.main[index].async_type;
            let mut command_list = self.main[index].command_list.take().expect("main pass command list allocated at compile time");
            self.main[index]
                .pass
                .execute(&mut command_list, cache)
                .map_err(|source| RenderGraphError::PassFailed { pass_id, stage: "execute", source })?;

            match pass_type {
                PassType::Graphics => {
                    if async_type.contains(AsyncType::WAIT) {
                        device.queue_wait_for_cmdlist(QueueKind::Graphics, QueueKind::Compute, compute_signal);
                    }
                    graphics_batch.push(command_list);
                    if async_type.contains(AsyncType::SIGNAL) {
                        graphics_signal = device.submit(QueueKind::Graphics, std::mem::take(&mut graphics_batch))?;
                    }
                }
                PassType::Compute => {
                    if async_type.contains(AsyncType::WAIT) {
                        device.queue_wait_for_cmdlist(QueueKind::Compute, QueueKind::Graphics, graphics_signal);
                    }
                    compute_batch.push(command_list);
                    if async_type.contains(AsyncType::SIGNAL) {
                        compute_signal = device.submit(QueueKind::Compute, std::mem::take(&mut compute_batch))?;
                    }
                }
            }
        }

        if !graphics_batch.is_empty() {
            device.submit(QueueKind::Graphics, graphics_batch)?;
        }
        if !compute_batch.is_empty() {
            device.submit(QueueKind::Compute, compute_batch)?;
        }

        for (index, node) in self.main.iter().enumerate() {
            let pass_id = PassId { phase: PassPhase::Main, index };
            node.pass.finish_pass(cache).map_err(|source| RenderGraphError::PassFailed { pass_id, stage: "finish_pass", source })?;
        }

        device.wait_for_idle();
        device.collect_garbage();
        present();
        cache.advance_frame();

        // Command lists are one-shot; reopen each pass's for the next frame.
        for node in &mut self.main {
            let queue_kind: QueueKind = node.pass.kind().pass_type.into();
            node.command_list = Some(device.open_command_list(queue_kind, "main"));
        }

        Ok(())
    }

    /// Clear queued fence bookkeeping, async-type assignments, and cached
    /// command lists (not persistent resources in the caller's
    /// `ResourceCache`). Used on explicit teardown or swapchain rebuild; a
    /// subsequent `compile` is required before `execute` again.
    pub fn reset(&mut self) {
        for node in self.precompute.iter_mut().chain(self.main.iter_mut()) {
            node.async_type = AsyncType::empty();
            node.command_list = None;
        }
        self.compiled = false;
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    pub fn main_pass_count(&self) -> usize {
        self.main.len()
    }

    pub fn precompute_pass_count(&self) -> usize {
        self.precompute.len()
    }

    pub fn main_kind(&self, id: PassId) -> Option<PassKind> {
        cohort(self, id.phase).get(id.index).map(|n| n.pass.kind())
    }

    pub fn async_type_of(&self, id: PassId) -> Option<AsyncType> {
        cohort(self, id.phase).get(id.index).map(|n| n.async_type)
    }
}
