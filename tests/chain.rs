//! S2 — a chain of 1 000 nodes, each depending on the next. Verifies
//! correctness under an inherently serial critical path (no two nodes in
//! this DAG can ever run concurrently).

use nabbit::{DynamicParallelEngine, DynamicSerialEngine, DynamicTask, EngineConfig, RayonScheduler};

const CHAIN_LEN: u64 = 1_000;

struct ChainTask;

impl DynamicTask for ChainTask {
    type Value = u64;

    fn init(&self, key: u64, add_predecessor: &mut dyn FnMut(u64)) {
        if key + 1 < CHAIN_LEN {
            add_predecessor(key + 1);
        }
    }

    fn compute(&self, _key: u64, predecessors: &[u64]) -> u64 {
        1 + predecessors.first().copied().unwrap_or(0)
    }
}

#[test]
fn dynamic_serial_chain() {
    let engine = DynamicSerialEngine::new(ChainTask, EngineConfig::new()).unwrap();
    engine.run(&[0]);
    assert_eq!(engine.result(0), Some(CHAIN_LEN));
}

#[test]
fn dynamic_parallel_chain_matches_serial() {
    let scheduler = RayonScheduler::new(4);
    let engine = DynamicParallelEngine::new(ChainTask, scheduler, EngineConfig::new()).unwrap();
    engine.run(&[0]);
    assert_eq!(engine.result(0), Some(CHAIN_LEN));
}
