//! The dynamic serial engine: the same discovered-DAG protocol as
//! [`super::dynamic_parallel`], collapsed onto a single thread. Used as the
//! deterministic oracle that the parallel flavor's results are checked
//! against.
//!
//! Grounded on `dynamic_serial_node.h`: no blocking lock is needed (a
//! serial executor never races with itself), spawns become direct calls,
//! and the final status transition is unconditional.

use std::sync::Arc;
use std::time::Instant;

use smallvec::SmallVec;

use crate::config::EngineConfig;
use crate::diagnostics::{ComputeRecord, Diagnostics};
use crate::directory::Directory;
use crate::engine::DynamicTask;
use crate::error::Result;
use crate::node::{Node, Status};

/// Runs a [`DynamicTask`] over a graph discovered on the fly, on the
/// calling thread only.
pub struct DynamicSerialEngine<T: DynamicTask> {
    directory: Directory<T::Value>,
    task: T,
    diagnostics: Diagnostics,
}

impl<T: DynamicTask> DynamicSerialEngine<T> {
    pub fn new(task: T, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(DynamicSerialEngine {
            directory: Directory::new(
                config.bucket_count,
                config.initial_vec_capacity,
                config.retry_budget,
            ),
            task,
            diagnostics: Diagnostics::enabled(config.bucket_count),
        })
    }

    pub fn diagnostics(&self) -> Vec<ComputeRecord> {
        self.diagnostics.records()
    }

    pub fn run(&self, roots: &[u64]) {
        for &key in roots {
            self.init_root_and_compute(key);
        }
    }

    pub fn result(&self, key: u64) -> Option<T::Value> {
        self.directory
            .get_task(key)
            .filter(|n| n.status() >= Status::Computed)
            .map(|n| n.payload().clone())
    }

    fn init_root_and_compute(&self, key: u64) {
        let claim = self.directory.insert_task_if_absent(key);
        if claim.is_claimed() {
            self.init_node_and_compute(Arc::clone(claim.node()));
        }
    }

    fn init_node_and_compute(&self, node: Arc<Node<T::Value>>) {
        let mut pred_keys: SmallVec<[u64; 4]> = SmallVec::new();
        self.task.init(node.key, &mut |k| pred_keys.push(k));
        node.mark_expanded();

        for pred_key in pred_keys {
            node.add_join_counter(1);
            self.try_init_pred_and_compute(Arc::clone(&node), pred_key);
        }

        if node.add_join_counter(-1) == 0 {
            self.compute_and_notify(node);
        }
    }

    fn try_init_pred_and_compute(&self, node: Arc<Node<T::Value>>, pred_key: u64) {
        let claim = self.directory.insert_task_if_absent(pred_key);
        if claim.is_claimed() {
            self.init_node_and_compute(Arc::clone(claim.node()));
        }
        let pred_node = Arc::clone(claim.node());

        let pred_finished = pred_node.status() >= Status::Computed;
        if !pred_finished {
            pred_node.successors.append(Arc::downgrade(&node));
        }
        node.predecessors.append(Arc::clone(&pred_node));

        if pred_finished && node.add_join_counter(-1) == 0 {
            self.compute_and_notify(node);
        }
    }

    fn compute_and_notify(&self, node: Arc<Node<T::Value>>) {
        let npreds = node.predecessors.size_estimate();
        let values: Vec<T::Value> = (0..npreds)
            .map(|i| node.predecessors.get(i).payload().clone())
            .collect();

        let started_at = Instant::now();
        let value = self.task.compute(node.key, &values);
        self.diagnostics.record(ComputeRecord {
            key: node.key,
            worker_id: 0,
            started_at,
            finished_at: Instant::now(),
        });
        node.set_payload(value.clone());
        node.mark_computed();

        let mut generated: SmallVec<[u64; 4]> = SmallVec::new();
        self.task.generate(node.key, &value, &mut |k| generated.push(k));
        for key in generated {
            node.generated_tasks.append(key);
            self.init_root_and_compute(key);
        }

        let end = node.successors.size_estimate();
        for i in 0..end {
            let succ = node.successor(i);
            if succ.add_join_counter(-1) == 0 {
                self.compute_and_notify(succ);
            }
        }
        node.set_notify_counter(end);
        if !node.try_mark_completed() {
            crate::error::protocol_violation(
                node.key,
                "serial engine: completion should never race with itself",
            );
        }
    }
}
