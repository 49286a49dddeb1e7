//! The static parallel engine: the DAG is fully known before execution
//! starts (built via [`StaticGraph::add_dep`]), so no directory or
//! blocking-lock dance is needed — just the join-counter protocol driven
//! by the `rayon`-backed [`Scheduler`].
//!
//! Grounded on `static_nabbit_node.h`'s `add_dep` / `source_compute` /
//! `compute_and_notify`.

use std::sync::Arc;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::diagnostics::{ComputeRecord, Diagnostics};
use crate::engine::StaticTask;
use crate::error::{Error, Result};
use crate::node::Node;
use crate::scheduler::Scheduler;

/// A fully-declared static DAG of `N` nodes, indexed `0..N`.
pub struct StaticGraph<T: StaticTask> {
    nodes: Vec<Arc<Node<T::Value>>>,
    task: Arc<T>,
    diagnostics: Arc<Diagnostics>,
}

impl<T: StaticTask> StaticGraph<T> {
    /// Builds a graph of `n` nodes, none of which have any edges yet.
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
                // The static flavors have no `Init` phase to release the
                // self-ticket after; every edge is already known, so a
                // node becomes ready the moment all of its (possibly
                // zero) declared predecessors have notified it.
                node.add_join_counter(-1);
                Arc::new(node)
            })
            .collect();
        let diagnostics = Diagnostics::enabled(n);
        Ok(StaticGraph {
            nodes,
            task: Arc::new(task),
            diagnostics: Arc::new(diagnostics),
        })
    }

    pub fn diagnostics(&self) -> Vec<ComputeRecord> {
        self.diagnostics.records()
    }

    /// Declares an edge `pred -> succ`: `succ`'s join counter is
    /// incremented and `succ` is appended to `pred`'s successor list.
    /// Must be called before [`Self::run`].
    pub fn add_dep(&self, pred: usize, succ: usize) {
        self.nodes[succ].add_join_counter(1);
        self.nodes[pred]
            .successors
            .append(Arc::downgrade(&self.nodes[succ]));
        self.nodes[succ]
            .predecessors
            .append(Arc::clone(&self.nodes[pred]));
    }

    /// Runs the graph to completion starting from `source`, which must
    /// have no predecessors (a join counter of the self-ticket only).
    /// Blocks until every reachable node has completed.
    pub fn run<S: Scheduler>(&self, source: usize, scheduler: &S) {
        for node in &self.nodes {
            node.mark_expanded_for_static();
        }
        let node = Arc::clone(&self.nodes[source]);
        compute_and_notify(node, Arc::clone(&self.task), Arc::clone(&self.diagnostics), scheduler);
    }

    pub fn result(&self, index: usize) -> T::Value {
        self.nodes[index].payload().clone()
    }
}

fn compute_and_notify<T: StaticTask, S: Scheduler>(
    node: Arc<Node<T::Value>>,
    task: Arc<T>,
    diagnostics: Arc<Diagnostics>,
    scheduler: &S,
) {
    let npreds = node.predecessors.size_estimate();
    let values: Vec<T::Value> = (0..npreds)
        .map(|i| node.predecessors.get(i).payload().clone())
        .collect();
    let started_at = Instant::now();
    let value = task.compute(node.key as usize, &values);
    diagnostics.record(ComputeRecord {
        key: node.key,
        worker_id: scheduler.worker_id(),
        started_at,
        finished_at: Instant::now(),
    });
    node.set_payload(value);
    node.mark_computed();

    let successor_count = node.successors.size_estimate();
    let mut ready = Vec::new();
    for i in 0..successor_count {
        let succ = node.successor(i);
        if succ.add_join_counter(-1) == 0 {
            ready.push(succ);
        }
    }
    node.set_notify_counter(successor_count);
    if !node.try_mark_completed() {
        crate::error::protocol_violation(node.key, "static graph never re-registers successors");
    }

    match ready.len() {
        0 => {}
        1 => {
            let succ = ready.pop().unwrap();
            compute_and_notify(succ, task, diagnostics, scheduler);
        }
        _ => {
            let mut rest = ready;
            let first = rest.remove(0);
            let task_a = Arc::clone(&task);
            let diagnostics_a = Arc::clone(&diagnostics);
            scheduler.join(
                || compute_and_notify(first, task_a, diagnostics_a, scheduler),
                || {
                    for succ in rest {
                        compute_and_notify(succ, Arc::clone(&task), Arc::clone(&diagnostics), scheduler);
                    }
                },
            );
        }
    }
}
