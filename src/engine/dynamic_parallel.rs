//! The dynamic parallel engine: the DAG is discovered at traversal time,
//! nodes are deduplicated by key through the [`Directory`], and work is
//! driven by the `rayon`-backed [`Scheduler`].
//!
//! Grounded directly on `dynamic_nabbit_node.h`'s
//! `init_root_and_compute` / `init_node_and_compute` /
//! `try_init_pred_and_compute` / `compute_and_notify` quartet.

use std::sync::Arc;
use std::time::Instant;

use log::trace;
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;

use crate::config::EngineConfig;
use crate::diagnostics::{ComputeRecord, Diagnostics};
use crate::directory::Directory;
use crate::engine::DynamicTask;
use crate::error::Result;
use crate::node::{Node, Status};
use crate::scheduler::Scheduler;

struct Inner<T: DynamicTask, S: Scheduler> {
    directory: Directory<T::Value>,
    task: T,
    scheduler: S,
    diagnostics: Diagnostics,
    outstanding: std::sync::atomic::AtomicUsize,
    completion: (Mutex<bool>, Condvar),
}

/// Runs a [`DynamicTask`] over a graph discovered on the fly, in parallel.
pub struct DynamicParallelEngine<T: DynamicTask, S: Scheduler> {
    inner: Arc<Inner<T, S>>,
}

impl<T, S> DynamicParallelEngine<T, S>
where
    T: DynamicTask + 'static,
    S: Scheduler + 'static,
{
    pub fn new(task: T, scheduler: S, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(DynamicParallelEngine {
            inner: Arc::new(Inner {
                directory: Directory::new(
                    config.bucket_count,
                    config.initial_vec_capacity,
                    config.retry_budget,
                ),
                task,
                scheduler,
                diagnostics: Diagnostics::enabled(config.bucket_count),
                outstanding: std::sync::atomic::AtomicUsize::new(0),
                completion: (Mutex::new(false), Condvar::new()),
            }),
        })
    }

    /// Traverses every key in `roots` to completion and blocks until the
    /// entire reachable graph — predecessors, successors, and generated
    /// tasks alike — has reached COMPLETED.
    pub fn run(&self, roots: &[u64]) {
        for &key in roots {
            init_root_and_compute(&self.inner, key);
        }
        let (lock, cvar) = &self.inner.completion;
        let mut done = lock.lock();
        while !*done {
            cvar.wait(&mut done);
        }
    }

    /// The value computed for `key`, if that key was ever visited.
    pub fn result(&self, key: u64) -> Option<T::Value> {
        self.inner
            .directory
            .get_task(key)
            .filter(|n| n.status() >= Status::Computed)
            .map(|n| n.payload().clone())
    }

    /// The current status of `key`'s node, if it has been visited at all.
    pub fn status(&self, key: u64) -> Option<Status> {
        self.inner.directory.get_task(key).map(|n| n.status())
    }

    pub fn diagnostics(&self) -> Vec<ComputeRecord> {
        self.inner.diagnostics.records()
    }
}

fn track_spawn<T: DynamicTask, S: Scheduler>(inner: &Arc<Inner<T, S>>) {
    inner
        .outstanding
        .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
}

fn track_completion<T: DynamicTask, S: Scheduler>(inner: &Arc<Inner<T, S>>) {
    let remaining = inner
        .outstanding
        .fetch_sub(1, std::sync::atomic::Ordering::SeqCst)
        - 1;
    if remaining == 0 {
        let (lock, cvar) = &inner.completion;
        *lock.lock() = true;
        cvar.notify_all();
    }
}

fn init_root_and_compute<T, S>(inner: &Arc<Inner<T, S>>, key: u64)
where
    T: DynamicTask + 'static,
    S: Scheduler + 'static,
{
    let claim = inner.directory.insert_task_if_absent(key);
    if claim.is_claimed() {
        track_spawn(inner);
        let inner = Arc::clone(inner);
        let node = Arc::clone(claim.node());
        inner.scheduler.spawn(move || init_node_and_compute(&inner, node));
    }
}

fn init_node_and_compute<T, S>(inner: &Arc<Inner<T, S>>, node: Arc<Node<T::Value>>)
where
    T: DynamicTask + 'static,
    S: Scheduler + 'static,
{
    let mut pred_keys: SmallVec<[u64; 4]> = SmallVec::new();
    inner.task.init(node.key, &mut |k| pred_keys.push(k));
    node.mark_expanded();
    trace!("node {}: init declared {} predecessors", node.key, pred_keys.len());

    for pred_key in pred_keys {
        node.add_join_counter(1);
        let inner = Arc::clone(inner);
        let node = Arc::clone(&node);
        inner
            .scheduler
            .spawn(move || try_init_pred_and_compute(&inner, node, pred_key));
    }

    // Release the self-ticket held since construction.
    if node.add_join_counter(-1) == 0 {
        compute_and_notify(inner, node);
    }
}

fn try_init_pred_and_compute<T, S>(inner: &Arc<Inner<T, S>>, node: Arc<Node<T::Value>>, pred_key: u64)
where
    T: DynamicTask + 'static,
    S: Scheduler + 'static,
{
    let claim = inner.directory.insert_task_if_absent(pred_key);
    if claim.is_claimed() {
        track_spawn(inner);
        let inner2 = Arc::clone(inner);
        let pred_node = Arc::clone(claim.node());
        inner
            .scheduler
            .spawn(move || init_node_and_compute(&inner2, pred_node));
    }
    let pred_node = Arc::clone(claim.node());

    // Registering as a waiter and checking the predecessor's status must
    // happen atomically (invariant I6); otherwise a predecessor could
    // finish between the check and the append and this node would wait
    // forever.
    let pred_finished = loop {
        let registered = pred_node.with_blocking_lock(|status| {
            if status < Status::Computed {
                Some(pred_node.successors.try_append(Arc::downgrade(&node)))
            } else {
                None
            }
        });
        match registered {
            Some(Some(_)) => break false,
            Some(None) => continue, // successor list's retry budget was exhausted
            None => break true,
        }
    };

    loop {
        if node.predecessors.try_append(Arc::clone(&pred_node)).is_some() {
            break;
        }
    }

    if pred_finished && node.add_join_counter(-1) == 0 {
        compute_and_notify(inner, node);
    }
}

fn compute_and_notify<T, S>(inner: &Arc<Inner<T, S>>, node: Arc<Node<T::Value>>)
where
    T: DynamicTask + 'static,
    S: Scheduler + 'static,
{
    let npreds = node.predecessors.size_estimate();
    let values: Vec<T::Value> = (0..npreds)
        .map(|i| node.predecessors.get(i).payload().clone())
        .collect();

    let started_at = Instant::now();
    let value = inner.task.compute(node.key, &values);
    inner.diagnostics.record(ComputeRecord {
        key: node.key,
        worker_id: inner.scheduler.worker_id(),
        started_at,
        finished_at: Instant::now(),
    });

    node.set_payload(value.clone());
    node.mark_computed();

    let mut generated: SmallVec<[u64; 4]> = SmallVec::new();
    inner.task.generate(node.key, &value, &mut |k| generated.push(k));
    for key in generated {
        node.generated_tasks.append(key);
        init_root_and_compute(inner, key);
    }

    loop {
        let end = node.successors.size_estimate();
        let start = node.notify_counter();
        for i in start..end {
            let succ = node.successor(i);
            if succ.add_join_counter(-1) == 0 {
                let inner = Arc::clone(inner);
                inner.scheduler.spawn(move || compute_and_notify(&inner, succ));
            }
        }
        node.set_notify_counter(end);

        let done = node.with_blocking_lock(|_| node.notify_counter() == node.successors.size_estimate());
        if done {
            if node.try_mark_completed() {
                break;
            }
        }
    }

    track_completion(inner);
}
