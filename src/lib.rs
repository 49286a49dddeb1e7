//! Nabbit is a fork/join task-graph execution engine: it evaluates DAGs of
//! user-defined computations, in parallel, whether the DAG's edges are
//! known in full up front (the "static" flavors) or discovered as nodes
//! are visited (the "dynamic" flavors).
//!
//! Four engine flavors cover `{static, dynamic}` × `{serial, parallel}`.
//! The serial flavors are deterministic oracles used to check the parallel
//! flavors' results; the parallel flavors extract as much concurrency as
//! the critical path permits, without ever serializing discovery or
//! traversal through a single global lock.
//!
//! ```text
//! StaticGraph    (static_serial / static_parallel) — edges declared up front
//! DynamicEngine  (dynamic_serial / dynamic_parallel) — edges discovered via Init
//! ```
//!
//! See [`engine`] for the four entry points, [`node`] for the shared state
//! machine every flavor drives, and [`directory`] for the content-addressable
//! deduplication the dynamic flavors rely on.

#![warn(rust_2018_idioms)]
#![warn(missing_docs)]

pub mod config;
pub mod diagnostics;
pub mod directory;
pub mod engine;
pub mod error;
pub mod hash_table;
pub mod lock_free_list;
pub mod node;
pub mod scheduler;
pub mod vec;

pub use config::EngineConfig;
pub use engine::{
    DynamicParallelEngine, DynamicSerialEngine, DynamicTask, StaticParallelGraph,
    StaticSerialGraph, StaticTask,
};
pub use error::{Error, Result};
pub use node::Status;
pub use scheduler::{RayonScheduler, Scheduler, SerialScheduler};
