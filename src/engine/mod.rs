//! The four engine flavors: `{static, dynamic}` × `{serial, parallel}`.
//!
//! All four share the node state machine in [`crate::node`] and differ only
//! in synchronization strength, matching the redesign direction in the
//! design notes: one family of engines parameterised by how much
//! concurrency they allow, not a class hierarchy per flavor.

pub mod dynamic_parallel;
pub mod dynamic_serial;
pub mod static_parallel;
pub mod static_serial;

pub use dynamic_parallel::DynamicParallelEngine;
pub use dynamic_serial::DynamicSerialEngine;
pub use static_parallel::StaticGraph as StaticParallelGraph;
pub use static_serial::StaticGraph as StaticSerialGraph;

/// User contract for the dynamic engine flavors (`DynamicSerial` and
/// `DynamicParallel`). A single implementation is shared by every node in
/// the traversal; `key` distinguishes which node is being asked.
///
/// Grounded on `dynamic_nabbit_node.h`'s virtual `Init` / `Compute` /
/// `Generate` methods.
pub trait DynamicTask: Send + Sync {
    /// The value a node's `Compute` produces, readable by its successors.
    type Value: Clone + Send + Sync;

    /// Declares `key`'s predecessor keys by calling `add_predecessor` once
    /// per predecessor. Must not perform any computation.
    fn init(&self, key: u64, add_predecessor: &mut dyn FnMut(u64));

    /// Computes `key`'s value from its predecessors' values, in the order
    /// they were resolved (not necessarily the order `init` declared them
    /// in, under concurrent discovery — see `DESIGN.md`).
    fn compute(&self, key: u64, predecessors: &[Self::Value]) -> Self::Value;

    /// Optionally emits new root keys to traverse once `compute` has run.
    /// The default implementation generates nothing.
    fn generate(&self, key: u64, value: &Self::Value, emit: &mut dyn FnMut(u64)) {
        let _ = (key, value, emit);
    }
}

/// User contract for the static engine flavors (`StaticSerial` and
/// `StaticParallel`). The graph's edges are declared up front via
/// `StaticGraph::add_dep` before execution starts; nodes are identified by
/// their index in the graph rather than by key.
///
/// Grounded on `static_nabbit_node.h`'s `Compute` override.
pub trait StaticTask: Send + Sync {
    /// The value a node's `Compute` produces, readable by its successors.
    type Value: Clone + Send + Sync;

    /// Computes this node's value from its predecessors' values, in the
    /// order `add_dep` declared them.
    fn compute(&self, index: usize, predecessors: &[Self::Value]) -> Self::Value;
}
