use crate::error::{Error, Result};

/// Default number of buckets in the task-graph directory's hash table when
/// the caller hasn't hinted at an expected node count.
const DEFAULT_BUCKET_COUNT: usize = 1024;

/// Default capacity a node's predecessor/successor vector starts at.
const DEFAULT_VEC_CAPACITY: usize = 4;

/// Default number of times a lock-free CAS loop retries before surfacing
/// contention to its caller.
const DEFAULT_RETRY_BUDGET: u32 = 10;

/// Construction-time knobs for an engine.
///
/// Mirrors the teacher's constructor-by-builder style: `EngineConfig::default()`
/// is the zero-configuration path, `with_expected_nodes` sizes the directory
/// up front to avoid bucket-list contention under the dynamic flavors.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub(crate) bucket_count: usize,
    pub(crate) initial_vec_capacity: usize,
    pub(crate) retry_budget: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            bucket_count: DEFAULT_BUCKET_COUNT,
            initial_vec_capacity: DEFAULT_VEC_CAPACITY,
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

impl EngineConfig {
    /// Starts from the defaults.
    pub fn new() -> Self {
        EngineConfig::default()
    }

    /// Sizes the directory's hash table for roughly `n` distinct keys.
    /// Picks the next power of two at least `n / 4` so that each bucket's
    /// lock-free list stays short under typical fan-out.
    pub fn with_expected_nodes(mut self, n: usize) -> Self {
        let target = (n / 4).max(1);
        self.bucket_count = target.next_power_of_two();
        self
    }

    /// Overrides the initial capacity of per-node predecessor/successor/
    /// generated-task vectors.
    pub fn with_initial_vec_capacity(mut self, capacity: usize) -> Self {
        self.initial_vec_capacity = capacity;
        self
    }

    /// Overrides the bounded-retry budget used by the lock-free list, hash
    /// table, and growable vector's concurrent append.
    pub fn with_retry_budget(mut self, retries: u32) -> Self {
        self.retry_budget = retries;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.bucket_count == 0 {
            return Err(Error::InvalidConfig {
                field: "bucket_count",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry_budget == 0 {
            return Err(Error::InvalidConfig {
                field: "retry_budget",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_nodes_sizes_bucket_count_as_power_of_two() {
        let config = EngineConfig::new().with_expected_nodes(10_000);
        assert!(config.bucket_count.is_power_of_two());
        assert!(config.bucket_count >= 10_000 / 4);
    }

    #[test]
    fn zero_retry_budget_is_invalid() {
        let config = EngineConfig::new().with_retry_budget(0);
        assert!(config.validate().is_err());
    }
}
