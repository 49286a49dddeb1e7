//! S6 — a root node whose `Generate` step emits three new root keys; each
//! child generates nothing further. Exactly four nodes should reach
//! COMPLETED.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nabbit::{DynamicParallelEngine, DynamicTask, EngineConfig, RayonScheduler};

const ROOT: u64 = 0;
const CHILDREN: [u64; 3] = [1, 2, 3];

struct GeneratingTask {
    completions: Arc<AtomicUsize>,
}

impl DynamicTask for GeneratingTask {
    type Value = u64;

    fn init(&self, _key: u64, _add_predecessor: &mut dyn FnMut(u64)) {}

    fn compute(&self, key: u64, _predecessors: &[u64]) -> u64 {
        self.completions.fetch_add(1, Ordering::SeqCst);
        key
    }

    fn generate(&self, key: u64, _value: &u64, emit: &mut dyn FnMut(u64)) {
        if key == ROOT {
            for child in CHILDREN {
                emit(child);
            }
        }
    }
}

#[test]
fn exactly_four_nodes_complete() {
    let completions = Arc::new(AtomicUsize::new(0));
    let scheduler = RayonScheduler::new(4);
    let engine = DynamicParallelEngine::new(
        GeneratingTask {
            completions: Arc::clone(&completions),
        },
        scheduler,
        EngineConfig::new(),
    )
    .unwrap();

    engine.run(&[ROOT]);

    assert_eq!(completions.load(Ordering::SeqCst), 4);
    for key in std::iter::once(ROOT).chain(CHILDREN) {
        assert_eq!(engine.result(key), Some(key));
    }
}
