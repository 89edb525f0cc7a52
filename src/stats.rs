use crate::batch::Trigger;

/// Counters describing one loader's lifetime, reported when it is dropped.
#[derive(Debug, Default)]
pub(crate) struct LoaderStats {
    /// Number of load registrations received (cache hits included).
    requests: u64,
    /// Requests answered straight from the thunk cache.
    cache_hits: u64,
    /// Batches dispatched because the wait window elapsed.
    time_dispatches: u64,
    /// Batches dispatched because the key ceiling was reached.
    size_dispatches: u64,
    /// Total keys across dispatched batches.
    keys_fetched: u64,
    /// Largest batch dispatched.
    max_batch: u64,
    /// Smallest batch dispatched.
    min_batch: u64,
}

impl LoaderStats {
    pub(crate) fn new() -> Self {
        Self {
            min_batch: u64::MAX,
            ..Default::default()
        }
    }

    pub(crate) fn record_request(&mut self) {
        self.requests += 1;
    }

    pub(crate) fn record_cache_hit(&mut self) {
        self.cache_hits += 1;
    }

    pub(crate) fn record_dispatch(&mut self, size: usize, trigger: Trigger) {
        match trigger {
            Trigger::TimeLimit => self.time_dispatches += 1,
            Trigger::KeyLimit => self.size_dispatches += 1,
        }
        self.keys_fetched += size as u64;
        self.max_batch = self.max_batch.max(size as u64);
        self.min_batch = self.min_batch.min(size as u64);
    }
}

impl Drop for LoaderStats {
    fn drop(&mut self) {
        tracing::debug!(loader_stats = ?self);
    }
}
