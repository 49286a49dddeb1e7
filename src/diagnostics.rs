//! Optional per-node diagnostics: which worker ran `Compute`, and when it
//! started and finished. In-memory only, no wire format, gated behind the
//! `diagnostics` Cargo feature (default-on). All four engine flavors record
//! through this type; with the feature off, `Diagnostics` compiles down to a
//! zero-sized no-op rather than merely defaulting its collection to empty.

use std::time::Instant;

use rustc_hash::FxHashMap;

/// One node's compute-step record.
#[derive(Debug, Clone, Copy)]
pub struct ComputeRecord {
    pub key: u64,
    pub worker_id: usize,
    pub started_at: Instant,
    pub finished_at: Instant,
}

#[cfg(feature = "diagnostics")]
mod enabled_impl {
    use super::ComputeRecord;
    use crate::vec::GrowableVec;
    use rustc_hash::FxHashMap;

    /// Accumulates [`ComputeRecord`]s for a single engine run. Uses the same
    /// growable vector that backs predecessor/successor storage, since the
    /// access pattern — many concurrent appends, one final serial read — is
    /// identical.
    #[derive(Default)]
    pub struct Diagnostics {
        records: Option<GrowableVec<ComputeRecord>>,
    }

    impl Diagnostics {
        pub fn enabled(expected_nodes: usize) -> Self {
            Diagnostics {
                records: Some(GrowableVec::new(expected_nodes.max(1))),
            }
        }

        pub fn disabled() -> Self {
            Diagnostics { records: None }
        }

        pub fn record(&self, record: ComputeRecord) {
            if let Some(records) = &self.records {
                let _ = records.try_append(record);
            }
        }

        /// Snapshot of every record collected so far, in append order.
        pub fn records(&self) -> Vec<ComputeRecord> {
            match &self.records {
                Some(records) => (0..records.size_estimate())
                    .map(|i| *records.get(i))
                    .collect(),
                None => Vec::new(),
            }
        }

        /// Groups the collected records by node key, for callers that want to
        /// spot a key that was computed more than once (which would itself be
        /// a protocol violation, but is cheap to check for here).
        pub fn by_key(&self) -> FxHashMap<u64, Vec<ComputeRecord>> {
            let mut grouped: FxHashMap<u64, Vec<ComputeRecord>> = FxHashMap::default();
            for record in self.records() {
                grouped.entry(record.key).or_default().push(record);
            }
            grouped
        }
    }
}

#[cfg(not(feature = "diagnostics"))]
mod disabled_impl {
    use super::ComputeRecord;
    use rustc_hash::FxHashMap;

    /// The `diagnostics` feature is off: no collection storage exists at all,
    /// every call is a no-op, and the type itself is zero-sized.
    #[derive(Default)]
    pub struct Diagnostics;

    impl Diagnostics {
        pub fn enabled(_expected_nodes: usize) -> Self {
            Diagnostics
        }

        pub fn disabled() -> Self {
            Diagnostics
        }

        pub fn record(&self, _record: ComputeRecord) {}

        pub fn records(&self) -> Vec<ComputeRecord> {
            Vec::new()
        }

        pub fn by_key(&self) -> FxHashMap<u64, Vec<ComputeRecord>> {
            FxHashMap::default()
        }
    }
}

#[cfg(feature = "diagnostics")]
pub use enabled_impl::Diagnostics;

#[cfg(not(feature = "diagnostics"))]
pub use disabled_impl::Diagnostics;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_key_groups_records_for_the_same_node() {
        let diagnostics = Diagnostics::enabled(4);
        let now = Instant::now();
        diagnostics.record(ComputeRecord {
            key: 7,
            worker_id: 0,
            started_at: now,
            finished_at: now,
        });
        diagnostics.record(ComputeRecord {
            key: 7,
            worker_id: 1,
            started_at: now,
            finished_at: now,
        });
        diagnostics.record(ComputeRecord {
            key: 9,
            worker_id: 0,
            started_at: now,
            finished_at: now,
        });

        let grouped = diagnostics.by_key();
        #[cfg(feature = "diagnostics")]
        {
            assert_eq!(grouped.len(), 2);
            assert_eq!(grouped[&7].len(), 2);
            assert_eq!(grouped[&9].len(), 1);
        }
        #[cfg(not(feature = "diagnostics"))]
        {
            assert!(grouped.is_empty());
        }
    }

    #[test]
    fn disabled_diagnostics_records_nothing() {
        let diagnostics = Diagnostics::disabled();
        diagnostics.record(ComputeRecord {
            key: 1,
            worker_id: 0,
            started_at: Instant::now(),
            finished_at: Instant::now(),
        });
        assert!(diagnostics.records().is_empty());
    }
}
