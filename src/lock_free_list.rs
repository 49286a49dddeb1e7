//! A singly-linked, insert-if-absent, append-only lock-free list keyed by
//! `u64`. One list backs each bucket of the [`crate::hash_table::HashTable`].
//!
//! Grounded on `concurrent_linked_list.h`: a sentinel head node, bounded-retry
//! CAS on `head.next` for insertion, and a `DEAD` status reserved for a
//! delete extension this crate never implements (see the directory's Open
//! Question notes in `DESIGN.md`).

use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

/// Outcome of a list operation that may hit contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    /// The key was already present; no mutation happened.
    Found,
    /// The key was not present.
    NotFound,
    /// A new cell was inserted for the key.
    Inserted,
    /// The retry budget was exhausted; the caller should retry the whole
    /// operation.
    Failed,
}

/// Reserved for a future delete extension. No code path in this crate ever
/// constructs `Dead`; `search` treats it as invisible should it ever appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellStatus {
    Valid,
    #[allow(dead_code)]
    Dead,
}

struct Cell<V> {
    key: u64,
    // `None` only for the sentinel head; every linked-in cell carries `Some`.
    value: Option<V>,
    status: CellStatus,
    next: AtomicPtr<Cell<V>>,
}

/// A lock-free, insert-if-absent linked list mapping `u64` keys to `V`.
///
/// `V` is expected to be cheap to clone (typically an `Arc<Node>`); every
/// successful lookup returns an owned clone rather than a borrow, since the
/// list has no lifetime tying reads to writers.
pub struct LockFreeList<V> {
    head: AtomicPtr<Cell<V>>,
    retry_budget: u32,
}

impl<V: Clone> LockFreeList<V> {
    pub fn new(retry_budget: u32) -> Self {
        // The sentinel carries no real key; `u64::MAX` is never a task key
        // in practice but is not load-bearing — `search`/`insert_if_absent`
        // always start from `head.next`, never read the sentinel's fields.
        let sentinel = Box::into_raw(Box::new(Cell {
            key: 0,
            value: None,
            status: CellStatus::Valid,
            next: AtomicPtr::new(std::ptr::null_mut()),
        }));
        LockFreeList {
            head: AtomicPtr::new(sentinel),
            retry_budget: retry_budget.max(1),
        }
    }

    /// Searches for `key`. Returns `Found` with a clone of the stored value,
    /// `NotFound`, or `Failed` if the retry budget was exhausted by a
    /// concurrent resize of the bucket the list belongs to (in practice the
    /// list itself never resizes; `Failed` surfaces only from the traversal
    /// retry bound, matching the source's defensive retry loop).
    pub fn search(&self, key: u64) -> (OpStatus, Option<V>) {
        for _ in 0..self.retry_budget {
            // Safety: nodes are never freed once linked; the list is
            // append-only for its lifetime.
            let mut current = unsafe { &*self.head.load(Ordering::Acquire) }
                .next
                .load(Ordering::Acquire);
            loop {
                if current.is_null() {
                    return (OpStatus::NotFound, None);
                }
                let cell = unsafe { &*current };
                if cell.key == key && cell.status == CellStatus::Valid {
                    return (OpStatus::Found, cell.value.clone());
                }
                current = cell.next.load(Ordering::Acquire);
            }
        }
        (OpStatus::Failed, None)
    }

    /// Inserts `value` for `key` if no live entry exists yet. Returns
    /// `Found` with the existing value if another caller got there first,
    /// `Inserted` with the value this caller supplied on success, or
    /// `Failed` once the retry budget is exhausted.
    pub fn insert_if_absent(&self, key: u64, value: V) -> (OpStatus, V) {
        for _ in 0..self.retry_budget {
            if let (OpStatus::Found, Some(existing)) = self.search(key) {
                return (OpStatus::Found, existing);
            }
            let head_cell = self.head.load(Ordering::Acquire);
            let observed_next = unsafe { &*head_cell }.next.load(Ordering::Acquire);
            let new_cell = Box::into_raw(Box::new(Cell {
                key,
                value: Some(value.clone()),
                status: CellStatus::Valid,
                next: AtomicPtr::new(observed_next),
            }));
            match unsafe { &*head_cell }.next.compare_exchange(
                observed_next,
                new_cell,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return (OpStatus::Inserted, value),
                Err(_) => {
                    // Safety: the CAS lost, so `new_cell` was never linked
                    // into the list and no other thread can see it.
                    unsafe { drop(Box::from_raw(new_cell)) };
                    continue;
                }
            }
        }
        (OpStatus::Failed, value)
    }

    /// Single-threaded snapshot of every live key. Callers must ensure no
    /// concurrent inserts are in flight, or accept a best-effort snapshot.
    pub fn keys(&self) -> Vec<u64> {
        let mut out = Vec::new();
        let mut current = unsafe { &*self.head.load(Ordering::Acquire) }
            .next
            .load(Ordering::Acquire);
        while !current.is_null() {
            let cell = unsafe { &*current };
            if cell.status == CellStatus::Valid {
                out.push(cell.key);
            }
            current = cell.next.load(Ordering::Acquire);
        }
        out
    }
}

impl<V> Drop for LockFreeList<V> {
    fn drop(&mut self) {
        let mut current = self.head.load(Ordering::Relaxed);
        while !current.is_null() {
            // Safety: exclusive access during drop, list is append-only so
            // this walks every node exactly once.
            let cell = unsafe { Box::from_raw(current) };
            current = cell.next.load(Ordering::Relaxed);
        }
    }
}

// Safety: `Cell<V>` is only ever accessed through atomics and is never
// mutated after being linked in, aside from the sentinel's `next` pointer.
unsafe impl<V: Send> Send for LockFreeList<V> {}
unsafe impl<V: Send> Sync for LockFreeList<V> {}

/// Convenience wrapper so callers can share a list across threads.
pub type SharedList<V> = Arc<LockFreeList<V>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::thread;

    #[test]
    fn insert_then_search() {
        let list: LockFreeList<u64> = LockFreeList::new(10);
        let (status, value) = list.insert_if_absent(1, 100);
        assert_eq!(status, OpStatus::Inserted);
        assert_eq!(value, 100);
        let (status, value) = list.search(1);
        assert_eq!(status, OpStatus::Found);
        assert_eq!(value, Some(100));
    }

    #[test]
    fn concurrent_insert_is_idempotent() {
        let list = StdArc::new(LockFreeList::<u64>::new(10));
        let winners: Vec<_> = (0..16)
            .map(|t| {
                let list = StdArc::clone(&list);
                thread::spawn(move || list.insert_if_absent(42, t))
            })
            .map(|h| h.join().unwrap())
            .collect();
        let inserted: Vec<_> = winners
            .iter()
            .filter(|(status, _)| *status == OpStatus::Inserted)
            .collect();
        assert_eq!(inserted.len(), 1);
        let winning_value = inserted[0].1;
        for (_, value) in &winners {
            assert_eq!(*value, winning_value);
        }
    }
}
