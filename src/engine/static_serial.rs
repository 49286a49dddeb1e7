//! The static serial engine: the deterministic oracle a known DAG is
//! checked against. Depth-first post-order traversal on a single thread.
//!
//! Grounded on `static_serial_node.h`: plain (non-atomic) join counters,
//! direct recursive calls instead of spawn/sync.

use std::sync::Arc;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::diagnostics::{ComputeRecord, Diagnostics};
use crate::engine::StaticTask;
use crate::error::{Error, Result};
use crate::node::Node;

/// A fully-declared static DAG, executed depth-first on the calling
/// thread. Identical edge-declaration API to
/// [`super::static_parallel::StaticGraph`].
pub struct StaticGraph<T: StaticTask> {
    nodes: Vec<Arc<Node<T::Value>>>,
    task: T,
    diagnostics: Diagnostics,
}

impl<T: StaticTask> StaticGraph<T> {
    pub fn new(task: T, n: usize, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        if n == 0 {
            return Err(Error::InvalidConfig {
                field: "n",
                reason: "a static graph needs at least one node".to_string(),
            });
        }
        let nodes: Vec<_> = (0..n)
            .map(|i| {
                let node = Node::new(i as u64, config.initial_vec_capacity, config.retry_budget);
                // No `Init` phase exists to release the self-ticket after;
                // the full edge set is already known at construction.
                node.add_join_counter(-1);
                Arc::new(node)
            })
            .collect();
        let diagnostics = Diagnostics::enabled(n);
        Ok(StaticGraph {
            nodes,
            task,
            diagnostics,
        })
    }

    pub fn diagnostics(&self) -> Vec<ComputeRecord> {
        self.diagnostics.records()
    }

    pub fn add_dep(&self, pred: usize, succ: usize) {
        self.nodes[succ].add_join_counter(1);
        self.nodes[pred]
            .successors
            .append(Arc::downgrade(&self.nodes[succ]));
        self.nodes[succ]
            .predecessors
            .append(Arc::clone(&self.nodes[pred]));
    }

    pub fn run(&self, source: usize) {
        for node in &self.nodes {
            node.mark_expanded_for_static();
        }
        self.compute_and_notify(Arc::clone(&self.nodes[source]));
    }

    pub fn result(&self, index: usize) -> T::Value {
        self.nodes[index].payload().clone()
    }

    fn compute_and_notify(&self, node: Arc<Node<T::Value>>) {
        let npreds = node.predecessors.size_estimate();
        let values: Vec<T::Value> = (0..npreds)
            .map(|i| node.predecessors.get(i).payload().clone())
            .collect();
        let started_at = Instant::now();
        let value = self.task.compute(node.key as usize, &values);
        self.diagnostics.record(ComputeRecord {
            key: node.key,
            worker_id: 0,
            started_at,
            finished_at: Instant::now(),
        });
        node.set_payload(value);
        node.mark_computed();

        let successor_count = node.successors.size_estimate();
        for i in 0..successor_count {
            let succ = node.successor(i);
            if succ.add_join_counter(-1) == 0 {
                self.compute_and_notify(succ);
            }
        }
        node.set_notify_counter(successor_count);
        if !node.try_mark_completed() {
            crate::error::protocol_violation(node.key, "serial graph never re-registers successors");
        }
    }
}
