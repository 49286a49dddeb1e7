//! The fork/join, work-stealing scheduler facade the parallel engine
//! flavors are built against.
//!
//! The teacher (`rowanfr-gluon-salsa`) has no fork/join scheduler of its
//! own — `Runtime` resolves concurrent queries by blocking on
//! `parking_lot` locks, never by spawning work. `rayon` is pulled in from
//! the rest of the retrieved corpus to fill that gap; see `DESIGN.md`.

use rayon::{ThreadPool, ThreadPoolBuilder};

/// Spawn/join/identity primitives an engine needs from its runtime.
/// Implemented once here over `rayon`; kept as a trait so the serial
/// engine flavors can run against a trivial same-thread implementation
/// without linking rayon's pool machinery into the hot path.
pub trait Scheduler: Send + Sync {
    /// Runs `a` and `b`, potentially in parallel, and returns both results.
    fn join<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send;

    /// Spawns `task` to run asynchronously with respect to the caller.
    /// The engine only ever spawns fire-and-forget continuations and
    /// relies on its own join-counter protocol for synchronization, not on
    /// waiting for this spawn specifically.
    fn spawn(&self, task: impl FnOnce() + Send + 'static);

    /// Index of the calling worker thread, if known.
    fn worker_id(&self) -> usize;

    /// Number of worker threads in the pool.
    fn num_workers(&self) -> usize;
}

/// A `rayon`-backed scheduler: `join` uses `rayon::join`, `spawn` uses
/// `rayon::spawn`, both within this instance's own thread pool so a caller
/// can size the pool independently of rayon's global default.
pub struct RayonScheduler {
    pool: ThreadPool,
}

impl RayonScheduler {
    pub fn new(num_workers: usize) -> Self {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .build()
            .expect("failed to start rayon thread pool");
        RayonScheduler { pool }
    }
}

impl Scheduler for RayonScheduler {
    fn join<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        self.pool.install(|| rayon::join(a, b))
    }

    fn spawn(&self, task: impl FnOnce() + Send + 'static) {
        self.pool.spawn(task);
    }

    fn worker_id(&self) -> usize {
        rayon::current_thread_index().unwrap_or(0)
    }

    fn num_workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

/// Runs everything on the calling thread. Backs the two serial (reference)
/// engine flavors, which never need real parallelism.
pub struct SerialScheduler;

impl Scheduler for SerialScheduler {
    fn join<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        let ra = a();
        let rb = b();
        (ra, rb)
    }

    fn spawn(&self, task: impl FnOnce() + Send + 'static) {
        task();
    }

    fn worker_id(&self) -> usize {
        0
    }

    fn num_workers(&self) -> usize {
        1
    }
}
