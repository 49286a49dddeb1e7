//! Growable, append-only vector used for a node's predecessor, successor,
//! and generated-task lists.
//!
//! Concurrent append reserves a slot by advancing an atomic counter, writes
//! the payload into that slot, then advances a second "published" counter.
//! `get` spins until `published` has advanced past the requested index.
//! Growth doubles capacity, copies existing entries into the new buffer, and
//! keeps the old buffer alive via `Arc` for as long as any reader still holds
//! a clone of it — an `Arc`-based restatement of the source's retired-buffer
//! list, which simply never freed old buffers at all.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::protocol_violation;

struct Slot<T>(UnsafeCell<MaybeUninit<T>>);

// Safety: access to a `Slot` is only ever performed through `GrowableVec`,
// which guarantees a slot is written at most once before being read.
unsafe impl<T: Send> Sync for Slot<T> {}

impl<T> Slot<T> {
    fn uninit() -> Self {
        Slot(UnsafeCell::new(MaybeUninit::uninit()))
    }

    unsafe fn write(&self, value: T) {
        (*self.0.get()).write(value);
    }

    unsafe fn read(&self) -> &T {
        (*self.0.get()).assume_init_ref()
    }

    unsafe fn drop_in_place(&self) {
        (*self.0.get()).assume_init_drop();
    }
}

struct Buffer<T> {
    capacity: usize,
    slots: Box<[Slot<T>]>,
}

impl<T> Buffer<T> {
    fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::uninit);
        Buffer {
            capacity,
            slots: slots.into_boxed_slice(),
        }
    }
}

/// A growable, append-only, concurrently-readable vector.
///
/// Never shrinks and never removes entries; `size_estimate` is a lower
/// bound on the number of entries a reader is guaranteed to be able to see.
pub struct GrowableVec<T> {
    retry_budget: u32,
    current: RwLock<Arc<Buffer<T>>>,
    reserved: AtomicUsize,
    published: AtomicUsize,
}

impl<T> GrowableVec<T> {
    /// Creates an empty vector with room for `initial_capacity` entries
    /// before the first grow.
    pub fn new(initial_capacity: usize) -> Self {
        GrowableVec::with_retry_budget(initial_capacity, 10)
    }

    pub(crate) fn with_retry_budget(initial_capacity: usize, retry_budget: u32) -> Self {
        let capacity = initial_capacity.max(1);
        GrowableVec {
            retry_budget,
            current: RwLock::new(Arc::new(Buffer::with_capacity(capacity))),
            reserved: AtomicUsize::new(0),
            published: AtomicUsize::new(0),
        }
    }

    /// Appends a value without any concurrency: the caller already has
    /// exclusive access (e.g. during a node's single-threaded `Init`).
    pub fn append(&self, value: T) -> usize {
        let index = self.reserved.fetch_add(1, Ordering::Relaxed);
        self.write_reserved(index, value);
        self.published.fetch_add(1, Ordering::Release);
        index
    }

    /// Appends a value under concurrency, retrying the slot reservation up
    /// to the configured budget. Returns the index written on success.
    pub fn try_append(&self, value: T) -> Option<usize> {
        let mut value = Some(value);
        for _ in 0..self.retry_budget.max(1) {
            let index = self.reserved.load(Ordering::Relaxed);
            self.ensure_capacity(index + 1);
            match self.reserved.compare_exchange(
                index,
                index + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.write_reserved(index, value.take().unwrap());
                    self.published.fetch_add(1, Ordering::Release);
                    return Some(index);
                }
                Err(_) => continue,
            }
        }
        None
    }

    fn write_reserved(&self, index: usize, value: T) {
        let buffer = self.current.read().clone();
        debug_assert!(index < buffer.capacity, "slot reserved without capacity");
        // Safety: `index` was exclusively reserved by this caller via the
        // CAS above (or owned outright in `append`), so no other writer can
        // touch this slot.
        unsafe { buffer.slots[index].write(value) };
    }

    fn ensure_capacity(&self, needed: usize) {
        if needed <= self.current.read().capacity {
            return;
        }
        let mut guard = self.current.write();
        if needed <= guard.capacity {
            return;
        }
        let mut new_capacity = guard.capacity.max(1);
        while new_capacity < needed {
            new_capacity *= 2;
        }
        let grown = Buffer::with_capacity(new_capacity);
        for i in 0..self.published.load(Ordering::Acquire).min(guard.capacity) {
            // Safety: indices below the published count were written before
            // this grow started.
            let value = unsafe { std::ptr::read(guard.slots[i].read() as *const T) };
            unsafe { grown.slots[i].write(value) };
        }
        *guard = Arc::new(grown);
    }

    /// Reads the entry at `index`, spinning until a writer has published it.
    ///
    /// Panics if `index` is beyond anything this vector will ever hold
    /// (i.e. `index >= reserved` and no writer is in flight) — callers are
    /// expected to only request indices they know were reserved.
    pub fn get(&self, index: usize) -> Ref<'_, T> {
        let mut spins = 0u32;
        loop {
            if self.published.load(Ordering::Acquire) > index {
                let buffer = self.current.read().clone();
                return Ref {
                    buffer,
                    index,
                    _marker: std::marker::PhantomData,
                };
            }
            spins += 1;
            if spins > 1_000_000 && self.reserved.load(Ordering::Relaxed) <= index {
                protocol_violation(index as u64, "get() on an index that was never reserved");
            }
            std::hint::spin_loop();
        }
    }

    /// A lower bound on the number of published entries.
    pub fn size_estimate(&self) -> usize {
        self.published.load(Ordering::Acquire)
    }
}

impl<T> Drop for GrowableVec<T> {
    fn drop(&mut self) {
        // Every grow forwards the previously published entries into the new
        // buffer (see `ensure_capacity`), so only the current buffer's
        // published range still owns live values; retired buffers hold
        // bitwise copies that must NOT be dropped again. `&mut self` means
        // no `Ref` can be outstanding (they all borrow `self`), so the
        // current buffer's `Arc` is uniquely held here.
        let published = *self.published.get_mut();
        if let Some(buffer) = Arc::get_mut(self.current.get_mut()) {
            for slot in &buffer.slots[..published.min(buffer.capacity)] {
                unsafe { slot.drop_in_place() };
            }
        }
    }
}

// Safety: `GrowableVec<T>` only ever hands out a `Ref` once a slot is known
// to be initialized, and initialization happens-before any reader observes
// it via the `published` counter's acquire/release pair.
unsafe impl<T: Send> Send for GrowableVec<T> {}
unsafe impl<T: Send + Sync> Sync for GrowableVec<T> {}

/// A handle to a published entry. Keeps the backing buffer alive for as
/// long as the reference is held, even if the vector has since grown past
/// it.
pub struct Ref<'a, T> {
    buffer: Arc<Buffer<T>>,
    index: usize,
    // ties the lifetime to the `GrowableVec` borrow, matching `get`'s
    // signature even though the data itself is kept alive by the `Arc`.
    _marker: std::marker::PhantomData<&'a GrowableVec<T>>,
}

impl<'a, T> std::ops::Deref for Ref<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: `buffer.slots[index]` was written before this `Ref` was
        // constructed in `GrowableVec::get`.
        unsafe { self.buffer.slots[self.index].read() }
    }
}
