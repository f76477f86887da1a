//! A DAG of render passes topologically ordered and partitioned onto the
//! graphics and compute queues, with cross-queue fence synchronization and a
//! distinct precompute phase that runs to completion before the main loop.

pub mod async_type;
pub mod error;
pub mod graph;
pub mod pass;
pub mod resource_cache;

pub use async_type::AsyncType;
pub use error::RenderGraphError;
pub use graph::RenderGraph;
pub use pass::{PassId, PassKind, PassPhase, PassType, RenderPass};
pub use resource_cache::ResourceCache;

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use render_device::{CommandList, Device};

    use super::*;

    struct RecordingPass {
        pass_type: PassType,
        phase: PassPhase,
        immediately: bool,
        execute_count: AtomicUsize,
        finish_count: AtomicUsize,
    }

    impl RecordingPass {
        fn new(pass_type: PassType, phase: PassPhase) -> Arc<Self> {
            Arc::new(Self { pass_type, phase, immediately: false, execute_count: AtomicUsize::new(0), finish_count: AtomicUsize::new(0) })
        }

        fn immediately(pass_type: PassType, phase: PassPhase) -> Arc<Self> {
            Arc::new(Self { pass_type, phase, immediately: true, execute_count: AtomicUsize::new(0), finish_count: AtomicUsize::new(0) })
        }
    }

    impl RenderPass for RecordingPass {
        fn kind(&self) -> PassKind {
            PassKind { pass_type: self.pass_type, phase: self.phase, immediately: self.immediately }
        }

        fn compile(&self, _device: &Device, _cache: &mut ResourceCache) -> anyhow::Result<()> {
            Ok(())
        }

        fn execute(&self, _cmdlist: &mut CommandList, _cache: &ResourceCache) -> anyhow::Result<()> {
            self.execute_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn finish_pass(&self, _cache: &mut ResourceCache) -> anyhow::Result<()> {
            self.finish_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn three_pass_chain_gets_expected_async_types() {
        let mut graph = RenderGraph::new();
        let mut device = Device::new_null();
        let mut cache = ResourceCache::new();

        let a = RecordingPass::new(PassType::Graphics, PassPhase::Main);
        let b = RecordingPass::new(PassType::Compute, PassPhase::Main);
        let c = RecordingPass::new(PassType::Graphics, PassPhase::Main);

        let id_a = graph.add_pass(a.clone());
        let id_b = graph.add_pass(b.clone());
        let id_c = graph.add_pass(c.clone());
        id_a.clone_into_precede(&mut graph, id_b);
        id_b.clone_into_precede(&mut graph, id_c);

        graph.compile(&device, &mut cache).unwrap();

        assert_eq!(graph.async_type_of(id_a).unwrap(), AsyncType::SIGNAL);
        assert_eq!(graph.async_type_of(id_b).unwrap(), AsyncType::WAIT | AsyncType::SIGNAL);
        assert_eq!(graph.async_type_of(id_c).unwrap(), AsyncType::WAIT);

        graph.execute(&mut device, &mut cache, || {}).unwrap();
        assert_eq!(a.execute_count.load(Ordering::SeqCst), 1);
        assert_eq!(b.execute_count.load(Ordering::SeqCst), 1);
        assert_eq!(c.execute_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn precompute_passes_run_exactly_once_unless_immediately() {
        let mut graph = RenderGraph::new();
        let mut device = Device::new_null();
        let mut cache = ResourceCache::new();

        let p0 = RecordingPass::new(PassType::Graphics, PassPhase::Precompute);
        let p1 = RecordingPass::new(PassType::Graphics, PassPhase::Precompute);
        let id0 = graph.add_pass(p0.clone());
        let id1 = graph.add_pass(p1.clone());
        id0.clone_into_precede(&mut graph, id1);

        graph.compile(&device, &mut cache).unwrap();
        graph.run_precompute(&mut device, &mut cache).unwrap();
        graph.run_precompute(&mut device, &mut cache).unwrap();

        assert_eq!(p0.execute_count.load(Ordering::SeqCst), 1);
        assert_eq!(p0.finish_count.load(Ordering::SeqCst), 1);
        assert_eq!(p1.execute_count.load(Ordering::SeqCst), 1);
        assert_eq!(graph.precompute_pass_count(), 2);
    }

    #[test]
    fn immediately_flagged_precompute_pass_reruns_every_call() {
        let mut graph = RenderGraph::new();
        let mut device = Device::new_null();
        let mut cache = ResourceCache::new();

        let pass = RecordingPass::immediately(PassType::Graphics, PassPhase::Precompute);
        graph.add_pass(pass.clone());

        graph.compile(&device, &mut cache).unwrap();
        graph.run_precompute(&mut device, &mut cache).unwrap();
        graph.run_precompute(&mut device, &mut cache).unwrap();
        graph.run_precompute(&mut device, &mut cache).unwrap();

        assert_eq!(pass.execute_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn cyclic_graph_fails_to_compile() {
        let mut graph = RenderGraph::new();
        let device = Device::new_null();
        let mut cache = ResourceCache::new();

        let a = RecordingPass::new(PassType::Graphics, PassPhase::Main);
        let b = RecordingPass::new(PassType::Graphics, PassPhase::Main);
        let id_a = graph.add_pass(a);
        let id_b = graph.add_pass(b);
        id_a.clone_into_precede(&mut graph, id_b);
        graph.precede(id_b, id_a);

        let result = graph.compile(&device, &mut cache);
        assert!(matches!(result, Err(RenderGraphError::Cycle { .. })));
    }

    #[test]
    fn cross_cohort_edge_is_dropped_not_panicking() {
        let mut graph = RenderGraph::new();
        let device = Device::new_null();
        let mut cache = ResourceCache::new();

        let main_pass = RecordingPass::new(PassType::Graphics, PassPhase::Main);
        let precompute_pass = RecordingPass::new(PassType::Graphics, PassPhase::Precompute);
        let id_main = graph.add_pass(main_pass);
        let id_pre = graph.add_pass(precompute_pass);

        graph.precede(id_pre, id_main);
        assert!(graph.compile(&device, &mut cache).is_ok());
    }

    trait TestPrecede {
        fn clone_into_precede(&self, graph: &mut RenderGraph, b: PassId);
    }

    impl TestPrecede for PassId {
        fn clone_into_precede(&self, graph: &mut RenderGraph, b: PassId) {
            graph.precede(*self, b);
        }
    }
}
