//! Fixed-bucket concurrent hash table, dispatching to one
//! [`crate::lock_free_list::LockFreeList`] per bucket.
//!
//! Grounded on `concurrent_hash_table.h`: buckets are created lazily on
//! first insert via a CAS on the bucket's slot, `hashcode` is `key mod
//! num_buckets`, and `keys()` aggregates across every bucket in a
//! single-threaded snapshot pass.

use std::sync::atomic::{AtomicPtr, Ordering};

use log::warn;

use crate::lock_free_list::{LockFreeList, OpStatus};

struct Bucket<V> {
    list: LockFreeList<V>,
}

/// A hash table keyed by `u64`, built from a fixed array of lazily-created
/// bucket lists.
pub struct HashTable<V> {
    buckets: Box<[AtomicPtr<Bucket<V>>]>,
    retry_budget: u32,
}

impl<V: Clone> HashTable<V> {
    pub fn new(num_buckets: usize, retry_budget: u32) -> Self {
        let num_buckets = num_buckets.max(1);
        let mut buckets = Vec::with_capacity(num_buckets);
        buckets.resize_with(num_buckets, || AtomicPtr::new(std::ptr::null_mut()));
        HashTable {
            buckets: buckets.into_boxed_slice(),
            retry_budget: retry_budget.max(1),
        }
    }

    fn hashcode(&self, key: u64) -> usize {
        (key % self.buckets.len() as u64) as usize
    }

    fn bucket(&self, key: u64) -> &LockFreeList<V> {
        let index = self.hashcode(key);
        let slot = &self.buckets[index];
        loop {
            let existing = slot.load(Ordering::Acquire);
            if !existing.is_null() {
                // Safety: bucket pointers are set once and never replaced
                // or freed before the table itself drops.
                return unsafe { &(*existing).list };
            }
            let created = Box::into_raw(Box::new(Bucket {
                list: LockFreeList::new(self.retry_budget),
            }));
            match slot.compare_exchange(
                std::ptr::null_mut(),
                created,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    // Safety: this thread just linked `created` in.
                    return unsafe { &(*created).list };
                }
                Err(_) => {
                    // Safety: the CAS lost, `created` was never published.
                    unsafe { drop(Box::from_raw(created)) };
                    warn!("hash_table: lost race creating bucket {}", index);
                    continue;
                }
            }
        }
    }

    pub fn search(&self, key: u64) -> (OpStatus, Option<V>) {
        self.bucket(key).search(key)
    }

    pub fn insert_if_absent(&self, key: u64, value: V) -> (OpStatus, V) {
        self.bucket(key).insert_if_absent(key, value)
    }

    /// Snapshot of every key present across every bucket. Single-threaded
    /// use only (or best-effort under concurrent writers).
    pub fn keys(&self) -> Vec<u64> {
        let mut out = Vec::new();
        for slot in self.buckets.iter() {
            let ptr = slot.load(Ordering::Acquire);
            if ptr.is_null() {
                continue;
            }
            // Safety: bucket pointers are never freed before the table
            // itself drops.
            out.extend(unsafe { &(*ptr).list }.keys());
        }
        out
    }
}

impl<V> Drop for HashTable<V> {
    fn drop(&mut self) {
        for slot in self.buckets.iter() {
            let ptr = slot.load(Ordering::Relaxed);
            if !ptr.is_null() {
                // Safety: exclusive access during drop.
                unsafe { drop(Box::from_raw(ptr)) };
            }
        }
    }
}

unsafe impl<V: Send> Send for HashTable<V> {}
unsafe impl<V: Send> Sync for HashTable<V> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn insert_and_search() {
        let table: HashTable<u64> = HashTable::new(8, 10);
        assert_eq!(
            table.insert_if_absent(5, 500),
            (OpStatus::Inserted, 500)
        );
        assert_eq!(table.search(5), (OpStatus::Found, Some(500)));
        assert_eq!(table.search(6), (OpStatus::NotFound, None));
    }

    #[test]
    fn insert_storm_covers_key_range() {
        let table = Arc::new(HashTable::<u64>::new(16, 10));
        let range: u64 = 200;
        let handles: Vec<_> = (0..20)
            .map(|t| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    let mut rng = oorandom::Rand64::new(t as u128);
                    for _ in 0..(range as usize * 5) {
                        let key = rng.rand_range(0..range);
                        table.insert_if_absent(key, key);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for key in 0..range {
            table.insert_if_absent(key, key);
        }
        let mut keys = table.keys();
        keys.sort_unstable();
        keys.dedup();
        let expected: Vec<u64> = (0..range).collect();
        assert_eq!(keys, expected);
    }
}
