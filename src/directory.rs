//! The task-graph directory: a content-addressable table mapping keys to
//! node handles, with the "claimer" CAS that the dynamic engines use to
//! deduplicate concurrently discovered tasks.
//!
//! Grounded on `task_graph_hash_table.h`'s usage inside
//! `dynamic_nabbit_node.h` (not itself present in the retrieved source, its
//! shape is inferred entirely from call sites: `insert_task_if_absent`
//! returning whether *this* caller must run `Init`), layered over
//! [`crate::hash_table::HashTable`]. Also the closest analogue to the
//! teacher's `InternTables`/`Slot<K>` in `interned.rs`, which performs the
//! same "allocate once, dedupe on key" role for interned query keys.

use std::sync::Arc;

use log::trace;

use crate::hash_table::HashTable;
use crate::lock_free_list::OpStatus;
use crate::node::Node;

/// Claim outcome of [`Directory::insert_task_if_absent`].
pub enum Claim<P> {
    /// This call is the unique claimer: it must run `Init`/`InitNode` and
    /// spawn predecessor discovery for the returned node.
    Claimed(Arc<Node<P>>),
    /// A node for this key already existed (or another caller claimed it
    /// concurrently); the returned handle may still be UNVISITED for a
    /// brief window if the claimer hasn't run yet.
    Existing(Arc<Node<P>>),
}

impl<P> Claim<P> {
    pub fn node(&self) -> &Arc<Node<P>> {
        match self {
            Claim::Claimed(n) | Claim::Existing(n) => n,
        }
    }

    pub fn is_claimed(&self) -> bool {
        matches!(self, Claim::Claimed(_))
    }
}

/// Maps task keys to node handles for the dynamic engine flavors.
pub struct Directory<P> {
    table: HashTable<Arc<Node<P>>>,
    initial_vec_capacity: usize,
    retry_budget: u32,
}

impl<P> Directory<P> {
    pub fn new(num_buckets: usize, initial_vec_capacity: usize, retry_budget: u32) -> Self {
        Directory {
            table: HashTable::new(num_buckets, retry_budget),
            initial_vec_capacity,
            retry_budget,
        }
    }

    /// Returns the node for `key` if one has already been inserted,
    /// regardless of its status.
    pub fn get_task(&self, key: u64) -> Option<Arc<Node<P>>> {
        match self.table.search(key) {
            (OpStatus::Found, node) => node,
            _ => None,
        }
    }

    /// Ensures a node exists for `key`, allocating one via a fresh
    /// `Node::new` if this is the first observation of the key, then
    /// attempts the UNVISITED -> VISITED transition. The single caller that
    /// wins that transition is reported as [`Claim::Claimed`].
    pub fn insert_task_if_absent(&self, key: u64) -> Claim<P> {
        let fresh = Arc::new(Node::new(key, self.initial_vec_capacity, self.retry_budget));
        let (status, node) = self.table.insert_if_absent(key, fresh);
        match status {
            OpStatus::Inserted => {
                trace!("directory: key {} inserted fresh", key);
                debug_assert!(node.try_mark_visited());
                Claim::Claimed(node)
            }
            OpStatus::Found => {
                if node.try_mark_visited() {
                    trace!("directory: key {} claimed on existing record", key);
                    Claim::Claimed(node)
                } else {
                    Claim::Existing(node)
                }
            }
            OpStatus::Failed => {
                // The lock-free list's bounded retry was exhausted; retry
                // the whole operation rather than surface contention.
                self.insert_task_if_absent(key)
            }
            OpStatus::NotFound => unreachable!("insert_if_absent never returns NotFound"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn exactly_one_claimer_per_key() {
        let directory = StdArc::new(Directory::<u64>::new(8, 4, 10));
        let claims = StdArc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let directory = StdArc::clone(&directory);
                let claims = StdArc::clone(&claims);
                thread::spawn(move || {
                    if directory.insert_task_if_absent(7).is_claimed() {
                        claims.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(claims.load(Ordering::SeqCst), 1);
    }
}
