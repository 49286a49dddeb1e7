//! The node state machine shared by all four engine flavors: status,
//! join counter, notify counter, and the blocking lock used by the dynamic
//! parallel flavor's successor-registration race.
//!
//! Grounded on `dynamic_nabbit_node.h`'s field layout (`status`,
//! `join_counter` starting at 1, `succ_to_notify`, `notify_counter`,
//! `blocking_lock`) and on `derived/slot.rs`'s `QueryState`, which is the
//! teacher's closest precedent for a CAS-guarded per-unit-of-work status
//! word.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_utils::atomic::AtomicCell;
use parking_lot::RwLock;

use crate::error::protocol_violation;
use crate::vec::GrowableVec;

/// A node's position in its life cycle. Transitions only ever move down
/// this list; see invariant I1 in the design notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    Unvisited,
    Visited,
    Expanded,
    Computed,
    Completed,
}

/// A minimal spinlock built on [`lock_api::RawMutex`], used for the short
/// critical section in the dynamic parallel engine where a predecessor's
/// successor list is checked and appended to atomically with its status.
pub struct RawSpinlock(AtomicBool);

unsafe impl lock_api::RawMutex for RawSpinlock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: RawSpinlock = RawSpinlock(AtomicBool::new(false));

    type GuardMarker = lock_api::GuardSend;

    fn lock(&self) {
        while self
            .0
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.0.load(Ordering::Relaxed) {
                std::hint::spin_loop();
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A mutex over `T` backed by [`RawSpinlock`].
pub type Spinlock<T> = lock_api::Mutex<RawSpinlock, T>;

/// A task-graph node. Generic over `P`, the user payload type produced by
/// `Compute` and read by successors.
pub struct Node<P> {
    /// Identity: a key in the dynamic flavors, a debug tag in the static
    /// ones.
    pub key: u64,
    status: AtomicCell<Status>,
    join_counter: AtomicI64,
    notify_counter: AtomicUsize,
    /// Resolved predecessor handles. Populated directly by `StaticGraph::add_dep`
    /// in the static flavors, and by the engine (after resolving each key
    /// `Init` declared through the directory) in the dynamic flavors.
    pub predecessors: GrowableVec<Arc<Node<P>>>,
    /// Successor handles: declared up front by `StaticGraph::add_dep` in the
    /// static flavors, or grown as a "waiters" list under `blocking_lock` in
    /// the dynamic parallel flavor. Held as `Weak` (unlike `predecessors`,
    /// which holds `Arc`) so that predecessor -> successor edges don't form
    /// a reference cycle with the mutual successor -> predecessor edge: a
    /// node's strong references always point toward its predecessors, so the
    /// strong-reference graph is a DAG (matching the task graph itself) and
    /// frees normally once the owning directory is dropped. A successor is
    /// always alive while this node's compute step observes it, since the
    /// owning `Directory`/`StaticGraph` keeps every node's master `Arc` alive
    /// for the lifetime of the run.
    pub successors: GrowableVec<Weak<Node<P>>>,
    /// Keys produced by `Generate` (dynamic flavors only).
    pub generated_tasks: GrowableVec<u64>,
    blocking_lock: Spinlock<()>,
    payload: RwLock<Option<P>>,
}

impl<P> Node<P> {
    pub fn new(key: u64, initial_vec_capacity: usize, retry_budget: u32) -> Self {
        Node {
            key,
            status: AtomicCell::new(Status::Unvisited),
            // The self-ticket: released once `Init`/`InitNode` has returned.
            join_counter: AtomicI64::new(1),
            notify_counter: AtomicUsize::new(0),
            predecessors: GrowableVec::with_retry_budget(initial_vec_capacity, retry_budget),
            successors: GrowableVec::with_retry_budget(initial_vec_capacity, retry_budget),
            generated_tasks: GrowableVec::with_retry_budget(initial_vec_capacity, retry_budget),
            blocking_lock: Spinlock::new(()),
            payload: RwLock::new(None),
        }
    }

    pub fn status(&self) -> Status {
        self.status.load()
    }

    /// Attempts the UNVISITED -> VISITED transition. Returns `true` iff
    /// this call performed it; the caller is then the unique claimer
    /// responsible for `Init`/`InitNode` and predecessor discovery.
    pub fn try_mark_visited(&self) -> bool {
        self.status
            .compare_exchange(Status::Unvisited, Status::Visited)
            .is_ok()
    }

    /// VISITED -> EXPANDED, after `Init`/`InitNode` has returned. Only the
    /// claimer calls this; a mismatch is a protocol bug.
    pub fn mark_expanded(&self) {
        if self
            .status
            .compare_exchange(Status::Visited, Status::Expanded)
            .is_err()
        {
            protocol_violation(self.key, "mark_expanded called outside VISITED");
        }
        log::trace!("node {}: VISITED -> EXPANDED", self.key);
    }

    /// The static flavors fold UNVISITED -> VISITED -> EXPANDED into graph
    /// construction: the full predecessor/successor set is already known
    /// before `StaticGraph::run` starts, so there is no separate discovery
    /// phase to wait for.
    pub fn mark_expanded_for_static(&self) {
        debug_assert!(self.try_mark_visited());
        self.mark_expanded();
    }

    /// EXPANDED -> COMPUTED, immediately after `Compute` returns.
    pub fn mark_computed(&self) {
        if self
            .status
            .compare_exchange(Status::Expanded, Status::Computed)
            .is_err()
        {
            protocol_violation(self.key, "mark_computed called outside EXPANDED");
        }
        log::trace!("node {}: EXPANDED -> COMPUTED", self.key);
    }

    /// COMPUTED -> COMPLETED, once every successor known at this point has
    /// been notified. Returns `false` if the precondition doesn't hold yet
    /// (more successors were registered since the last notify pass); the
    /// caller is expected to hold `blocking_lock` across the check that
    /// decides whether to call this (see the dynamic parallel engine).
    pub fn try_mark_completed(&self) -> bool {
        let ok = self
            .status
            .compare_exchange(Status::Computed, Status::Completed)
            .is_ok();
        if ok {
            log::trace!("node {}: COMPUTED -> COMPLETED", self.key);
        }
        ok
    }

    /// Adds `delta` (possibly negative) to the join counter and returns the
    /// new value. A caller that drives the counter to exactly zero is the
    /// unique thread responsible for spawning this node's compute step.
    pub fn add_join_counter(&self, delta: i64) -> i64 {
        self.join_counter.fetch_add(delta, Ordering::AcqRel) + delta
    }

    pub fn join_counter(&self) -> i64 {
        self.join_counter.load(Ordering::Acquire)
    }

    pub fn notify_counter(&self) -> usize {
        self.notify_counter.load(Ordering::Acquire)
    }

    pub fn set_notify_counter(&self, value: usize) {
        self.notify_counter.store(value, Ordering::Release);
    }

    /// Upgrades successor index `i` to a strong handle. The owning
    /// directory/graph keeps every node alive for the run's duration, so a
    /// dead weak reference here is a protocol bug, not an expected outcome.
    pub fn successor(&self, i: usize) -> Arc<Node<P>> {
        self.successors
            .get(i)
            .upgrade()
            .unwrap_or_else(|| protocol_violation(self.key, "successor dropped while graph still running"))
    }

    /// Runs `f` with the predecessor's blocking lock held and its current
    /// status visible, matching `dynamic_nabbit_node.h`'s
    /// `acquire_blocking_lock` / status-check / `release_blocking_lock`
    /// sequence used when registering as a successor.
    pub fn with_blocking_lock<R>(&self, f: impl FnOnce(Status) -> R) -> R {
        let _guard = self.blocking_lock.lock();
        f(self.status())
    }

    pub fn set_payload(&self, value: P) {
        *self.payload.write() = Some(value);
    }

    /// Borrows the computed payload. Panics if called before the node has
    /// reached COMPUTED; callers only reach this after observing the
    /// predecessor's status via the join-counter protocol, which happens
    /// only after `mark_computed`.
    pub fn payload(&self) -> parking_lot::MappedRwLockReadGuard<'_, P> {
        parking_lot::RwLockReadGuard::map(self.payload.read(), |p| {
            p.as_ref()
                .unwrap_or_else(|| protocol_violation(self.key, "payload read before COMPUTED"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_in_order() {
        let node: Node<u64> = Node::new(1, 4, 10);
        assert_eq!(node.status(), Status::Unvisited);
        assert!(node.try_mark_visited());
        assert!(!node.try_mark_visited());
        node.mark_expanded();
        node.mark_computed();
        node.set_notify_counter(0);
        assert!(node.try_mark_completed());
        assert_eq!(node.status(), Status::Completed);
    }

    #[test]
    fn join_counter_self_ticket_release() {
        let node: Node<u64> = Node::new(1, 4, 10);
        assert_eq!(node.join_counter(), 1);
        assert_eq!(node.add_join_counter(3), 4);
        assert_eq!(node.add_join_counter(-1), 3);
    }
}
